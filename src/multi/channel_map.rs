use anyhow::Result;

use crate::error::AggregateError;
use crate::hal::traits::Device;
use crate::hal::types::Direction;

/// Where one global channel lives: the owning device's index in the
/// aggregate and the channel number on that device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelMapEntry {
    pub local: usize,
    pub device: usize,
}

/// Global channel index to (device, local channel), per direction.
///
/// Devices contribute their channels in device order, so global channel
/// `i` is the `i`-th channel counting device 0's channels first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelMap {
    input: Vec<ChannelMapEntry>,
    output: Vec<ChannelMapEntry>,
}

impl ChannelMap {
    /// Build both directions from the devices' current channel counts
    pub fn rebuild(devices: &[Box<dyn Device>]) -> Self {
        Self {
            input: Self::direction_entries(devices, Direction::Input),
            output: Self::direction_entries(devices, Direction::Output),
        }
    }

    /// Build from explicit per-device channel counts
    pub fn from_counts(input: &[usize], output: &[usize]) -> Self {
        Self {
            input: Self::entries(input.iter().copied()),
            output: Self::entries(output.iter().copied()),
        }
    }

    pub fn direction_entries(devices: &[Box<dyn Device>], direction: Direction) -> Vec<ChannelMapEntry> {
        Self::entries(devices.iter().map(|d| d.num_channels(direction)))
    }

    fn entries(counts: impl IntoIterator<Item = usize>) -> Vec<ChannelMapEntry> {
        counts
            .into_iter()
            .enumerate()
            .flat_map(|(device, count)| (0..count).map(move |local| ChannelMapEntry { local, device }))
            .collect()
    }

    pub fn entries_for(&self, direction: Direction) -> &[ChannelMapEntry] {
        match direction {
            Direction::Input => &self.input,
            Direction::Output => &self.output,
        }
    }

    /// Number of global channels in one direction
    pub fn len(&self, direction: Direction) -> usize {
        self.entries_for(direction).len()
    }

    pub fn is_empty(&self, direction: Direction) -> bool {
        self.entries_for(direction).is_empty()
    }

    /// Resolve a global channel, failing with `IndexOutOfRange` past the end
    pub fn resolve(&self, direction: Direction, channel: usize) -> Result<ChannelMapEntry> {
        let entries = self.entries_for(direction);
        entries
            .get(channel)
            .copied()
            .ok_or_else(|| AggregateError::out_of_range("channel", channel, entries.len()).into())
    }
}
