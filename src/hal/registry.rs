use anyhow::{anyhow, Result};
use log::{info, warn};
use std::collections::BTreeMap;
use std::sync::Arc;

use super::lifecycle::FactoryLock;
use super::traits::{Device, HardwareDriver};
use super::types::Kwargs;

/// Static driver registration, collected by `HardwareRegistry::with_registered`
pub struct DriverRegistration {
    pub factory: fn() -> Arc<dyn HardwareDriver>,
}

impl DriverRegistration {
    pub const fn new(factory: fn() -> Arc<dyn HardwareDriver>) -> Self {
        Self { factory }
    }
}

inventory::collect!(DriverRegistration);

/// Registry of available hardware drivers
pub struct HardwareRegistry {
    drivers: BTreeMap<String, Arc<dyn HardwareDriver>>,
    factory_lock: FactoryLock,
}

impl HardwareRegistry {
    pub fn new() -> Self {
        Self {
            drivers: BTreeMap::new(),
            factory_lock: FactoryLock::global(),
        }
    }

    /// Registry holding every driver submitted with `inventory::submit!`
    pub fn with_registered() -> Self {
        let mut registry = Self::new();
        for registration in inventory::iter::<DriverRegistration> {
            registry.register_arc((registration.factory)());
        }
        registry
    }

    /// Register a driver, replacing any driver with the same id
    pub fn register(&mut self, driver: impl HardwareDriver + 'static) {
        self.register_arc(Arc::new(driver));
    }

    pub fn register_arc(&mut self, driver: Arc<dyn HardwareDriver>) {
        self.drivers.insert(driver.driver_id().to_string(), driver);
    }

    /// List registered driver ids in sorted order
    pub fn list_drivers(&self) -> Vec<String> {
        self.drivers.keys().cloned().collect()
    }

    pub fn driver(&self, driver_id: &str) -> Option<Arc<dyn HardwareDriver>> {
        self.drivers.get(driver_id).cloned()
    }

    /// Process-wide critical section for creating and destroying devices
    pub fn factory_lock(&self) -> &FactoryLock {
        &self.factory_lock
    }

    /// Discover devices across drivers.
    ///
    /// A `driver` key restricts the search to that driver. Every result
    /// carries the `driver` key of the driver that produced it. A driver that
    /// fails enumeration is logged and skipped.
    pub async fn discover_all(&self, args: &Kwargs) -> Result<Vec<Kwargs>> {
        let selected: Vec<Arc<dyn HardwareDriver>> = match args.get("driver") {
            Some(id) => self.driver(id).into_iter().collect(),
            None => self.drivers.values().cloned().collect(),
        };

        let mut devices = Vec::new();
        for driver in selected {
            match driver.discover_devices(args, self).await {
                Ok(found) => {
                    for mut result in found {
                        result
                            .entry("driver".to_string())
                            .or_insert_with(|| driver.driver_id().to_string());
                        devices.push(result);
                    }
                }
                Err(e) => warn!("Discovery failed for driver '{}': {:#}", driver.driver_id(), e),
            }
        }

        Ok(devices)
    }

    /// Create a device. `args` must name its driver with a `driver` key.
    ///
    /// Leaf drivers run inside the factory lock. Composite drivers make
    /// their members through this registry, so they run outside it. Hand
    /// the device back to `unmake` to destroy it under the same rules.
    pub fn make(&self, args: &Kwargs) -> Result<Box<dyn Device>> {
        let driver_id = args
            .get("driver")
            .ok_or_else(|| anyhow!("Device arguments have no 'driver' key"))?;
        let driver = self
            .driver(driver_id)
            .ok_or_else(|| anyhow!("Unknown driver: {}", driver_id))?;

        info!("Making device with driver '{}'", driver_id);
        if driver.is_composite() {
            driver.create_device(args, self)
        } else {
            self.factory_lock.make(|| driver.create_device(args, self))
        }
    }

    /// Destroy a device made by `make`
    pub fn unmake(&self, device: Box<dyn Device>) {
        info!("Releasing device {}", device.hardware_key());
        if device.is_composite() {
            drop(device);
        } else {
            self.factory_lock.release(device);
        }
    }
}

impl Default for HardwareRegistry {
    fn default() -> Self {
        Self::new()
    }
}
