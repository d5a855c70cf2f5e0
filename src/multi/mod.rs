pub mod args;
pub mod channel_map;
pub mod device;
pub mod driver;
pub mod names;
mod settings;
pub mod stream;

pub use args::{max_index, merge_discovered, translate, GUARD_KEY, LOCAL_PREFIX, MAX_DEVICES};
pub use channel_map::{ChannelMap, ChannelMapEntry};
pub use device::MultiDevice;
pub use driver::MultiDriver;
pub use names::{csv_join, csv_split, decode, encode, is_indexed};
pub use stream::{group_channels, ChannelGroup};
