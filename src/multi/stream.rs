use anyhow::Result;
use log::{debug, info, warn};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::channel_map::ChannelMap;
use super::device::MultiDevice;
use crate::error::{AggregateError, StreamCode};
use crate::hal::traits::Device;
use crate::hal::types::{
    Direction, Kwargs, ReadResult, StatusEvent, StreamFlags, StreamHandle, WriteResult,
};

/// A run of requested channels owned by one device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelGroup {
    pub device: usize,
    /// Local channel numbers on `device`, in request order
    pub channels: Vec<usize>,
}

/// One native stream opened on a member device
struct SubStream {
    device: usize,
    stream: StreamHandle,
    channels: Vec<usize>,
}

/// Aggregate stream: one sub-stream per channel group, in request order
pub(super) struct MultiStream {
    direction: Direction,
    groups: Vec<SubStream>,
}

impl MultiStream {
    fn num_channels(&self) -> usize {
        self.groups.iter().map(|g| g.channels.len()).sum()
    }
}

/// Open aggregate streams keyed by the token inside their `StreamHandle`.
///
/// The map lock only covers lookups and inserts. Device calls run on a
/// cloned `Arc` after the lock is released.
#[derive(Default)]
pub(super) struct StreamArena {
    streams: RwLock<HashMap<u64, Arc<MultiStream>>>,
    next_id: AtomicU64,
}

impl StreamArena {
    fn read(&self) -> RwLockReadGuard<'_, HashMap<u64, Arc<MultiStream>>> {
        self.streams
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<u64, Arc<MultiStream>>> {
        self.streams
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn insert(&self, stream: MultiStream) -> StreamHandle {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.write().insert(id, Arc::new(stream));
        StreamHandle::new(id)
    }

    fn get(&self, handle: &StreamHandle) -> Option<Arc<MultiStream>> {
        self.read().get(&handle.id()).cloned()
    }

    fn remove(&self, handle: &StreamHandle) -> Option<Arc<MultiStream>> {
        self.write().remove(&handle.id())
    }

    /// Remove every stream, oldest first
    fn drain(&self) -> Vec<(u64, Arc<MultiStream>)> {
        let mut streams: Vec<_> = self.write().drain().collect();
        streams.sort_by_key(|(id, _)| *id);
        streams
    }

    fn len(&self) -> usize {
        self.read().len()
    }
}

/// Split requested global channels into maximal runs owned by one device.
///
/// Request order is preserved, so a device can appear in several groups
/// when its channels are interleaved with another device's. An empty
/// request means channel 0.
pub fn group_channels(
    map: &ChannelMap,
    direction: Direction,
    channels: &[usize],
) -> Result<Vec<ChannelGroup>> {
    let default = [0];
    let channels = if channels.is_empty() { &default[..] } else { channels };

    let mut groups: Vec<ChannelGroup> = Vec::new();
    for &channel in channels {
        let entry = map.resolve(direction, channel)?;
        match groups.last_mut() {
            Some(group) if group.device == entry.device => group.channels.push(entry.local),
            _ => groups.push(ChannelGroup {
                device: entry.device,
                channels: vec![entry.local],
            }),
        }
    }
    Ok(groups)
}

impl MultiDevice {
    /// Number of aggregate streams currently open
    pub fn open_streams(&self) -> usize {
        self.streams.len()
    }

    /// Device and local channels behind each sub-stream of an open stream
    pub fn stream_groups(&self, handle: &StreamHandle) -> Result<Vec<ChannelGroup>> {
        self.with_stream(handle, |stream| {
            Ok(stream
                .groups
                .iter()
                .map(|g| ChannelGroup {
                    device: g.device,
                    channels: g.channels.clone(),
                })
                .collect())
        })
    }

    fn with_stream<T>(
        &self,
        handle: &StreamHandle,
        f: impl FnOnce(&MultiStream) -> Result<T>,
    ) -> Result<T> {
        let stream = self
            .streams
            .get(handle)
            .ok_or(AggregateError::UnknownStream(handle.id()))?;
        f(stream.as_ref())
    }

    fn member(&self, group: &SubStream) -> &dyn Device {
        self.devices[group.device].as_ref()
    }

    /// Open one sub-stream per channel group. Local channels are resolved
    /// now and never again for this stream.
    pub(super) fn open_multi_stream(
        &self,
        direction: Direction,
        format: &str,
        channels: &[usize],
        args: &Kwargs,
    ) -> Result<StreamHandle> {
        let groups = group_channels(&self.map(), direction, channels)?;

        let mut opened: Vec<SubStream> = Vec::with_capacity(groups.len());
        for group in groups {
            let device = self.devices[group.device].as_ref();
            match device.setup_stream(direction, format, &group.channels, args) {
                Ok(stream) => opened.push(SubStream {
                    device: group.device,
                    stream,
                    channels: group.channels,
                }),
                Err(e) => {
                    warn!(
                        "Opening {} stream on device {} failed, closing {} sub-stream(s)",
                        direction,
                        group.device,
                        opened.len()
                    );
                    for sub in opened {
                        self.devices[sub.device].close_stream(sub.stream);
                    }
                    return Err(e);
                }
            }
        }

        let num_groups = opened.len();
        let handle = self.streams.insert(MultiStream {
            direction,
            groups: opened,
        });
        info!(
            "Opened {} stream {} ({}) across {} sub-stream(s)",
            direction,
            handle.id(),
            format,
            num_groups
        );
        Ok(handle)
    }

    pub(super) fn close_multi_stream(&self, handle: StreamHandle) {
        match self.streams.remove(&handle) {
            Some(stream) => {
                info!("Closing {} stream {}", stream.direction, handle.id());
                self.close_groups(handle.id(), stream);
            }
            None => warn!("Close of unknown stream {}", handle.id()),
        }
    }

    fn close_groups(&self, id: u64, stream: Arc<MultiStream>) {
        // Closing consumes the handle, so no call can still be using the stream.
        match Arc::try_unwrap(stream) {
            Ok(stream) => {
                for sub in stream.groups {
                    self.devices[sub.device].close_stream(sub.stream);
                }
            }
            Err(_) => warn!("Stream {} still in use, sub-streams left open", id),
        }
    }

    /// Close streams the caller never closed
    pub(super) fn close_all_streams(&self) {
        for (id, stream) in self.streams.drain() {
            warn!("Stream {} still open at teardown, closing it", id);
            self.close_groups(id, stream);
        }
    }

    pub(super) fn min_stream_mtu(&self, handle: &StreamHandle) -> Result<usize> {
        self.with_stream(handle, |stream| {
            let mut mtu = usize::MAX;
            for group in &stream.groups {
                mtu = mtu.min(self.member(group).stream_mtu(&group.stream)?);
            }
            Ok(mtu)
        })
    }

    /// Activate every group in order. The first failure is returned at once
    /// and later groups stay inactive.
    pub(super) fn activate_groups(
        &self,
        handle: &StreamHandle,
        flags: StreamFlags,
        time_ns: i64,
        num_elems: usize,
    ) -> Result<()> {
        self.with_stream(handle, |stream| {
            for group in &stream.groups {
                self.member(group)
                    .activate_stream(&group.stream, flags, time_ns, num_elems)?;
            }
            Ok(())
        })
    }

    pub(super) fn deactivate_groups(
        &self,
        handle: &StreamHandle,
        flags: StreamFlags,
        time_ns: i64,
    ) -> Result<()> {
        self.with_stream(handle, |stream| {
            for group in &stream.groups {
                self.member(group)
                    .deactivate_stream(&group.stream, flags, time_ns)?;
            }
            Ok(())
        })
    }

    /// Read every group in order, each into its slice of `buffs`.
    ///
    /// Every group gets the caller's input flags. Output flags and the
    /// timestamp come from the first group; the element count is the last
    /// group's. Devices are assumed to deliver identical counts and times;
    /// differences are only logged, not reconciled. A group returning zero
    /// elements ends the read there.
    pub(super) fn read_groups(
        &self,
        handle: &StreamHandle,
        buffs: &mut [&mut [u8]],
        num_elems: usize,
        flags: StreamFlags,
        timeout_us: i64,
    ) -> Result<ReadResult> {
        self.with_stream(handle, |stream| {
            check_buffers(stream, buffs.len())?;

            let mut offset = 0;
            let mut merged: Option<ReadResult> = None;
            for group in &stream.groups {
                let count = group.channels.len();
                let result = self.member(group).read_stream(
                    &group.stream,
                    &mut buffs[offset..offset + count],
                    num_elems,
                    flags,
                    timeout_us,
                )?;
                offset += count;

                let next = match merged {
                    None => result,
                    Some(lead) => {
                        if result.elems != lead.elems || result.time_ns != lead.time_ns {
                            debug!(
                                "Read on device {} diverged: {} elems at {} ns, first group {} elems at {} ns",
                                group.device, result.elems, result.time_ns, lead.elems, lead.time_ns
                            );
                        }
                        ReadResult {
                            elems: result.elems,
                            ..lead
                        }
                    }
                };
                merged = Some(next);

                if result.elems == 0 {
                    break;
                }
            }
            merged.ok_or_else(|| StreamCode::StreamError.into())
        })
    }

    /// Write every group in order from its slice of `buffs`, with the same
    /// result rules as `read_groups`
    pub(super) fn write_groups(
        &self,
        handle: &StreamHandle,
        buffs: &[&[u8]],
        num_elems: usize,
        flags: StreamFlags,
        time_ns: i64,
        timeout_us: i64,
    ) -> Result<WriteResult> {
        self.with_stream(handle, |stream| {
            check_buffers(stream, buffs.len())?;

            let mut offset = 0;
            let mut merged: Option<WriteResult> = None;
            for group in &stream.groups {
                let count = group.channels.len();
                let result = self.member(group).write_stream(
                    &group.stream,
                    &buffs[offset..offset + count],
                    num_elems,
                    flags,
                    time_ns,
                    timeout_us,
                )?;
                offset += count;

                let next = match merged {
                    None => result,
                    Some(lead) => {
                        if result.elems != lead.elems {
                            debug!(
                                "Write on device {} diverged: {} elems, first group {} elems",
                                group.device, result.elems, lead.elems
                            );
                        }
                        WriteResult {
                            elems: result.elems,
                            ..lead
                        }
                    }
                };
                merged = Some(next);

                if result.elems == 0 {
                    break;
                }
            }
            merged.ok_or_else(|| StreamCode::StreamError.into())
        })
    }

    /// Poll groups in order until one reports an event.
    ///
    /// Each group's channel bits are shifted to its global channel offset
    /// and OR-ed into `chan_mask`, including for groups that fail. When no
    /// group reports, the last group's error is returned.
    pub(super) fn read_status_groups(
        &self,
        handle: &StreamHandle,
        chan_mask: &mut u64,
        timeout_us: i64,
    ) -> Result<StatusEvent> {
        self.with_stream(handle, |stream| {
            let mut offset = 0u32;
            let mut last_error = None;
            for group in &stream.groups {
                let mut local_mask = 0u64;
                let status = self
                    .member(group)
                    .read_stream_status(&group.stream, &mut local_mask, timeout_us);
                *chan_mask |= local_mask.checked_shl(offset).unwrap_or(0);
                offset += group.channels.len() as u32;

                match status {
                    Ok(event) => return Ok(event),
                    Err(e) => last_error = Some(e),
                }
            }
            Err(last_error.unwrap_or_else(|| StreamCode::NotSupported.into()))
        })
    }

    /// Run a direct buffer call on the only sub-stream of `handle`
    pub(super) fn with_single_group<T>(
        &self,
        handle: &StreamHandle,
        f: impl FnOnce(&dyn Device, &StreamHandle) -> Result<T>,
    ) -> Result<T> {
        self.with_stream(handle, |stream| match stream.groups.as_slice() {
            [group] => f(self.member(group), &group.stream),
            groups => Err(AggregateError::UnsupportedMultiDevice {
                groups: groups.len(),
            }
            .into()),
        })
    }
}

fn check_buffers(stream: &MultiStream, supplied: usize) -> Result<()> {
    let expected = stream.num_channels();
    if supplied < expected {
        return Err(AggregateError::ChannelCountMismatch {
            expected,
            actual: supplied,
        }
        .into());
    }
    Ok(())
}
