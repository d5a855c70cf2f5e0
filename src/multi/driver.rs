use anyhow::Result;
use async_trait::async_trait;
use log::{debug, info};
use std::sync::Arc;

use super::args::{max_index, merge_discovered, translate, GUARD_KEY};
use super::device::MultiDevice;
use crate::error::AggregateError;
use crate::hal::registry::{DriverRegistration, HardwareRegistry};
use crate::hal::traits::{Device, HardwareDriver};
use crate::hal::types::Kwargs;

/// Driver registered as `"multi"`, building aggregates out of other drivers' devices.
///
/// Discovery only answers requests that carry indexed keys, so single
/// devices are never advertised as aggregates.
#[derive(Debug, Default)]
pub struct MultiDriver;

impl MultiDriver {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl HardwareDriver for MultiDriver {
    fn driver_id(&self) -> &str {
        "multi"
    }

    async fn discover_devices(
        &self,
        args: &Kwargs,
        registry: &HardwareRegistry,
    ) -> Result<Vec<Kwargs>> {
        if args.contains_key(GUARD_KEY) || max_index(args).is_none() {
            return Ok(Vec::new());
        }

        let per_device = translate(args)?;
        let mut found = Vec::with_capacity(per_device.len());
        for (index, device_args) in per_device.iter().enumerate() {
            let candidates = registry.discover_all(device_args).await?;
            debug!("Device {} of aggregate: {} candidate(s)", index, candidates.len());
            if candidates.is_empty() {
                return Ok(Vec::new());
            }
            found.push(candidates);
        }

        Ok(merge_discovered(&found).into_iter().collect())
    }

    fn create_device(
        &self,
        args: &Kwargs,
        registry: &HardwareRegistry,
    ) -> Result<Box<dyn Device>> {
        if args.contains_key(GUARD_KEY) {
            return Err(AggregateError::Recursion(GUARD_KEY.to_string()).into());
        }

        let device = MultiDevice::from_args(args, registry)?;
        info!(
            "Created multi-device over {} device(s): {}",
            device.num_devices(),
            device.hardware_key()
        );
        Ok(Box::new(device))
    }

    fn is_composite(&self) -> bool {
        true
    }
}

fn multi_driver() -> Arc<dyn HardwareDriver> {
    Arc::new(MultiDriver::new())
}

inventory::submit! {
    DriverRegistration::new(multi_driver)
}
