pub mod device;
pub mod driver;

pub use device::MockDevice;
pub use driver::{MockDriver, MockProbe, TxCapture};
