use anyhow::{bail, Result};
use async_trait::async_trait;
use crossbeam_channel::{unbounded, Receiver, Sender};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use super::device::MockDevice;
use crate::hal::registry::{DriverRegistration, HardwareRegistry};
use crate::hal::traits::{Device, HardwareDriver};
use crate::hal::types::Kwargs;

/// Samples written to a mock output stream, one capture per channel per call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxCapture {
    pub serial: String,
    pub channel: usize,
    pub data: Vec<u8>,
}

/// Shared record of everything the mock devices of one driver did
pub struct MockProbe {
    events: Mutex<Vec<String>>,
    live: AtomicUsize,
    unlocked_lifecycle: AtomicUsize,
    tx_sender: Sender<TxCapture>,
    tx_receiver: Receiver<TxCapture>,
}

impl MockProbe {
    pub fn new() -> Self {
        let (tx_sender, tx_receiver) = unbounded();
        Self {
            events: Mutex::new(Vec::new()),
            live: AtomicUsize::new(0),
            unlocked_lifecycle: AtomicUsize::new(0),
            tx_sender,
            tx_receiver,
        }
    }

    pub(crate) fn record(&self, serial: &str, event: impl AsRef<str>) {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(format!("{}:{}", serial, event.as_ref()));
    }

    /// Every recorded event as `serial:event`, oldest first
    pub fn events(&self) -> Vec<String> {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Recorded events whose operation part starts with `op`
    pub fn events_for(&self, op: &str) -> Vec<String> {
        self.events()
            .into_iter()
            .filter(|e| e.split_once(':').map_or(false, |(_, rest)| rest.starts_with(op)))
            .collect()
    }

    pub fn clear_events(&self) {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clear();
    }

    /// Number of mock devices currently alive
    pub fn live_devices(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    /// Constructions or destructions that ran outside the factory lock
    pub fn unlocked_lifecycle_calls(&self) -> usize {
        self.unlocked_lifecycle.load(Ordering::SeqCst)
    }

    /// Drain samples written to mock output streams so far
    pub fn tx_captures(&self) -> Vec<TxCapture> {
        self.tx_receiver.try_iter().collect()
    }

    pub(crate) fn device_created(&self, lock_held: bool) {
        self.live.fetch_add(1, Ordering::SeqCst);
        if !lock_held {
            self.unlocked_lifecycle.fetch_add(1, Ordering::SeqCst);
        }
    }

    pub(crate) fn device_dropped(&self, lock_held: bool) {
        self.live.fetch_sub(1, Ordering::SeqCst);
        if !lock_held {
            self.unlocked_lifecycle.fetch_add(1, Ordering::SeqCst);
        }
    }

    pub(crate) fn capture(&self, capture: TxCapture) {
        let _ = self.tx_sender.send(capture);
    }
}

impl Default for MockProbe {
    fn default() -> Self {
        Self::new()
    }
}

/// Driver producing simulated devices, registered as `"mock"`.
///
/// Discovery yields one candidate per configured serial (filtered by a
/// `serial` key when given). Device behaviour is scripted entirely through
/// the creation arguments, see `MockDevice`.
pub struct MockDriver {
    probe: Arc<MockProbe>,
    serials: Vec<String>,
}

impl MockDriver {
    pub fn new() -> Self {
        Self::with_probe(Arc::new(MockProbe::new()))
    }

    pub fn with_probe(probe: Arc<MockProbe>) -> Self {
        Self {
            probe,
            serials: vec!["MOCK0".to_string(), "MOCK1".to_string()],
        }
    }

    pub fn with_serials(mut self, serials: &[&str]) -> Self {
        self.serials = serials.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn probe(&self) -> Arc<MockProbe> {
        self.probe.clone()
    }
}

impl Default for MockDriver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HardwareDriver for MockDriver {
    fn driver_id(&self) -> &str {
        "mock"
    }

    async fn discover_devices(
        &self,
        args: &Kwargs,
        _registry: &HardwareRegistry,
    ) -> Result<Vec<Kwargs>> {
        let wanted = args.get("serial");
        Ok(self
            .serials
            .iter()
            .filter(|serial| wanted.map_or(true, |w| w == *serial))
            .map(|serial| {
                let mut result = Kwargs::new();
                result.insert("serial".to_string(), serial.clone());
                result.insert("label".to_string(), format!("Mock Device {}", serial));
                result.insert("type".to_string(), "simulated".to_string());
                result
            })
            .collect())
    }

    fn create_device(
        &self,
        args: &Kwargs,
        registry: &HardwareRegistry,
    ) -> Result<Box<dyn Device>> {
        let serial = args.get("serial").map(String::as_str).unwrap_or("MOCK");
        if args.contains_key("fail_make") {
            self.probe.record(serial, "make_failed");
            bail!("mock device {} refused to open", serial);
        }

        let device = MockDevice::from_args(args, self.probe.clone(), registry.factory_lock().clone())?;
        Ok(Box::new(device))
    }
}

fn mock_driver() -> Arc<dyn HardwareDriver> {
    Arc::new(MockDriver::new())
}

inventory::submit! {
    DriverRegistration::new(mock_driver)
}
