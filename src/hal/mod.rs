pub mod lifecycle;
pub mod mock;
pub mod registry;
pub mod traits;
pub mod types;

pub use lifecycle::{FactoryGuard, FactoryLock};
pub use registry::{DriverRegistration, HardwareRegistry};
pub use traits::{Device, HardwareDriver};
pub use types::{
    format_size, ArgInfo, ArgType, Direction, Kwargs, Range, ReadBuffer, ReadResult, StatusEvent,
    StreamFlags, StreamHandle, WriteBuffer, WriteResult,
};
