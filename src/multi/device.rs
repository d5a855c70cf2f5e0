use anyhow::Result;
use log::{debug, info, warn};
use num_complex::Complex64;
use std::ptr::NonNull;
use std::sync::{RwLock, RwLockReadGuard};

use super::args::translate;
use super::channel_map::ChannelMap;
use super::names::{csv_join, csv_split, encode};
use super::stream::StreamArena;
use crate::error::AggregateError;
use crate::hal::lifecycle::FactoryLock;
use crate::hal::registry::HardwareRegistry;
use crate::hal::traits::Device;
use crate::hal::types::{
    ArgInfo, Direction, Kwargs, Range, ReadBuffer, ReadResult, StatusEvent, StreamFlags,
    StreamHandle, WriteBuffer, WriteResult,
};

/// Several devices presented as one, with a single channel space.
///
/// Global channels are numbered device by device in index order. Channel
/// calls are forwarded to the owning device with the local channel number.
/// Device-wide setters go to every device in index order and stop at the
/// first failure. Named resources (sensors, registers, settings, GPIO
/// banks, UARTs) are listed and addressed as `name[device]`.
pub struct MultiDevice {
    /// Member devices in index order, never empty
    pub(super) devices: Vec<Box<dyn Device>>,

    /// Current global channel layout, swapped as a whole on rebuild
    channel_map: RwLock<ChannelMap>,

    /// Open aggregate streams
    pub(super) streams: StreamArena,

    /// Shared with the registry; held around every member make and drop
    factory_lock: FactoryLock,
}

impl MultiDevice {
    /// Create one member device per argument map, in order.
    ///
    /// Each member is made by the registry inside the process-wide factory
    /// lock. When a member fails, the members already made are released
    /// (also under the lock) before the error is returned.
    pub fn new(args_list: Vec<Kwargs>, registry: &HardwareRegistry) -> Result<Self> {
        if args_list.is_empty() {
            return Err(AggregateError::NoIndexedArgs.into());
        }

        let lock = registry.factory_lock().clone();
        let mut devices: Vec<Box<dyn Device>> = Vec::with_capacity(args_list.len());

        for (index, args) in args_list.iter().enumerate() {
            info!("Making device {} of {}", index, args_list.len());
            match registry.make(args) {
                Ok(device) => devices.push(device),
                Err(e) => {
                    warn!(
                        "Making device {} failed, releasing {} device(s) already made",
                        index,
                        devices.len()
                    );
                    for device in devices.drain(..) {
                        lock.release(device);
                    }
                    return Err(e);
                }
            }
        }

        let channel_map = ChannelMap::rebuild(&devices);
        debug!(
            "Channel map built: {} input, {} output channels",
            channel_map.len(Direction::Input),
            channel_map.len(Direction::Output)
        );

        Ok(Self {
            devices,
            channel_map: RwLock::new(channel_map),
            streams: StreamArena::default(),
            factory_lock: lock,
        })
    }

    /// Translate one flat argument map and create the members it describes
    pub fn from_args(args: &Kwargs, registry: &HardwareRegistry) -> Result<Self> {
        let args_list = translate(args)?;
        if args_list.is_empty() {
            return Err(AggregateError::NoIndexedArgs.into());
        }
        Self::new(args_list, registry)
    }

    pub fn num_devices(&self) -> usize {
        self.devices.len()
    }

    /// Member device by index
    pub fn device(&self, index: usize) -> Result<&dyn Device> {
        self.devices
            .get(index)
            .map(|d| d.as_ref())
            .ok_or_else(|| AggregateError::out_of_range("device", index, self.devices.len()).into())
    }

    /// Snapshot of the current channel layout
    pub fn channel_map(&self) -> ChannelMap {
        self.map().clone()
    }

    pub(super) fn map(&self) -> RwLockReadGuard<'_, ChannelMap> {
        self.channel_map
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Recompute the channel layout from the members' channel counts
    pub fn reload_channel_map(&self) {
        let rebuilt = ChannelMap::rebuild(&self.devices);
        debug!(
            "Channel map rebuilt: {} input, {} output channels",
            rebuilt.len(Direction::Input),
            rebuilt.len(Direction::Output)
        );
        *self
            .channel_map
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = rebuilt;
    }

    fn first(&self) -> &dyn Device {
        self.devices[0].as_ref()
    }

    /// Resolve a global channel and run `f` on its device with the local channel
    fn on_channel<T>(
        &self,
        direction: Direction,
        channel: usize,
        f: impl FnOnce(&dyn Device, usize) -> Result<T>,
    ) -> Result<T> {
        let entry = self.map().resolve(direction, channel)?;
        f(self.devices[entry.device].as_ref(), entry.local)
    }

    /// Apply a setter to every device in index order, stopping at the first error
    fn broadcast(&self, f: impl Fn(&dyn Device) -> Result<()>) -> Result<()> {
        self.devices.iter().try_for_each(|d| f(d.as_ref()))
    }

    fn joined(&self, f: impl Fn(&dyn Device) -> String) -> String {
        let values: Vec<String> = self.devices.iter().map(|d| f(d.as_ref())).collect();
        csv_join(&values)
    }
}

impl Drop for MultiDevice {
    fn drop(&mut self) {
        self.close_all_streams();
        info!("Releasing {} device(s)", self.devices.len());
        for device in self.devices.drain(..) {
            self.factory_lock.release(device);
        }
    }
}

impl Device for MultiDevice {
    // Identification

    fn driver_key(&self) -> String {
        self.joined(|d| d.driver_key())
    }

    fn hardware_key(&self) -> String {
        self.joined(|d| d.hardware_key())
    }

    fn hardware_info(&self) -> Kwargs {
        let mut info = Kwargs::new();
        for (index, device) in self.devices.iter().enumerate() {
            for (key, value) in device.hardware_info() {
                info.insert(encode(&key, index), value);
            }
        }
        info
    }

    fn is_composite(&self) -> bool {
        true
    }

    // Channels

    fn set_frontend_mapping(&self, direction: Direction, mapping: &str) -> Result<()> {
        let parts = csv_split(mapping);
        if parts.len() != self.devices.len() {
            return Err(AggregateError::Format(mapping.to_string()).into());
        }

        let result = self
            .devices
            .iter()
            .zip(&parts)
            .try_for_each(|(device, part)| device.set_frontend_mapping(direction, part));
        self.reload_channel_map();
        result
    }

    fn frontend_mapping(&self, direction: Direction) -> String {
        self.joined(|d| d.frontend_mapping(direction))
    }

    fn num_channels(&self, direction: Direction) -> usize {
        self.map().len(direction)
    }

    fn channel_info(&self, direction: Direction, channel: usize) -> Result<Kwargs> {
        self.on_channel(direction, channel, |d, ch| d.channel_info(direction, ch))
    }

    fn full_duplex(&self, direction: Direction, channel: usize) -> Result<bool> {
        self.on_channel(direction, channel, |d, ch| d.full_duplex(direction, ch))
    }

    // Streams

    fn stream_formats(&self, direction: Direction, channel: usize) -> Result<Vec<String>> {
        self.on_channel(direction, channel, |d, ch| d.stream_formats(direction, ch))
    }

    fn native_stream_format(&self, direction: Direction, channel: usize) -> Result<(String, f64)> {
        self.on_channel(direction, channel, |d, ch| d.native_stream_format(direction, ch))
    }

    fn stream_args_info(&self, direction: Direction, channel: usize) -> Result<Vec<ArgInfo>> {
        self.on_channel(direction, channel, |d, ch| d.stream_args_info(direction, ch))
    }

    fn setup_stream(
        &self,
        direction: Direction,
        format: &str,
        channels: &[usize],
        args: &Kwargs,
    ) -> Result<StreamHandle> {
        self.open_multi_stream(direction, format, channels, args)
    }

    fn close_stream(&self, stream: StreamHandle) {
        self.close_multi_stream(stream)
    }

    fn stream_mtu(&self, stream: &StreamHandle) -> Result<usize> {
        self.min_stream_mtu(stream)
    }

    fn activate_stream(
        &self,
        stream: &StreamHandle,
        flags: StreamFlags,
        time_ns: i64,
        num_elems: usize,
    ) -> Result<()> {
        self.activate_groups(stream, flags, time_ns, num_elems)
    }

    fn deactivate_stream(&self, stream: &StreamHandle, flags: StreamFlags, time_ns: i64) -> Result<()> {
        self.deactivate_groups(stream, flags, time_ns)
    }

    fn read_stream(
        &self,
        stream: &StreamHandle,
        buffs: &mut [&mut [u8]],
        num_elems: usize,
        flags: StreamFlags,
        timeout_us: i64,
    ) -> Result<ReadResult> {
        self.read_groups(stream, buffs, num_elems, flags, timeout_us)
    }

    fn write_stream(
        &self,
        stream: &StreamHandle,
        buffs: &[&[u8]],
        num_elems: usize,
        flags: StreamFlags,
        time_ns: i64,
        timeout_us: i64,
    ) -> Result<WriteResult> {
        self.write_groups(stream, buffs, num_elems, flags, time_ns, timeout_us)
    }

    fn read_stream_status(
        &self,
        stream: &StreamHandle,
        chan_mask: &mut u64,
        timeout_us: i64,
    ) -> Result<StatusEvent> {
        self.read_status_groups(stream, chan_mask, timeout_us)
    }

    // Direct buffer access (single device streams only)

    fn num_direct_access_buffers(&self, stream: &StreamHandle) -> Result<usize> {
        self.with_single_group(stream, |d, s| d.num_direct_access_buffers(s))
    }

    fn direct_access_buffer_addrs(&self, stream: &StreamHandle, handle: usize) -> Result<Vec<NonNull<u8>>> {
        self.with_single_group(stream, |d, s| d.direct_access_buffer_addrs(s, handle))
    }

    fn acquire_read_buffer(&self, stream: &StreamHandle, timeout_us: i64) -> Result<ReadBuffer> {
        self.with_single_group(stream, |d, s| d.acquire_read_buffer(s, timeout_us))
    }

    fn release_read_buffer(&self, stream: &StreamHandle, handle: usize) {
        let released = self.with_single_group(stream, |d, s| {
            d.release_read_buffer(s, handle);
            Ok(())
        });
        if let Err(e) = released {
            warn!("Read buffer {} not released: {:#}", handle, e);
        }
    }

    fn acquire_write_buffer(&self, stream: &StreamHandle, timeout_us: i64) -> Result<WriteBuffer> {
        self.with_single_group(stream, |d, s| d.acquire_write_buffer(s, timeout_us))
    }

    fn release_write_buffer(
        &self,
        stream: &StreamHandle,
        handle: usize,
        num_elems: usize,
        flags: StreamFlags,
        time_ns: i64,
    ) {
        let released = self.with_single_group(stream, |d, s| {
            d.release_write_buffer(s, handle, num_elems, flags, time_ns);
            Ok(())
        });
        if let Err(e) = released {
            warn!("Write buffer {} not released: {:#}", handle, e);
        }
    }

    // Antenna

    fn list_antennas(&self, direction: Direction, channel: usize) -> Result<Vec<String>> {
        self.on_channel(direction, channel, |d, ch| d.list_antennas(direction, ch))
    }

    fn set_antenna(&self, direction: Direction, channel: usize, name: &str) -> Result<()> {
        self.on_channel(direction, channel, |d, ch| d.set_antenna(direction, ch, name))
    }

    fn antenna(&self, direction: Direction, channel: usize) -> Result<String> {
        self.on_channel(direction, channel, |d, ch| d.antenna(direction, ch))
    }

    // Frontend corrections

    fn has_dc_offset_mode(&self, direction: Direction, channel: usize) -> Result<bool> {
        self.on_channel(direction, channel, |d, ch| d.has_dc_offset_mode(direction, ch))
    }

    fn set_dc_offset_mode(&self, direction: Direction, channel: usize, automatic: bool) -> Result<()> {
        self.on_channel(direction, channel, |d, ch| d.set_dc_offset_mode(direction, ch, automatic))
    }

    fn dc_offset_mode(&self, direction: Direction, channel: usize) -> Result<bool> {
        self.on_channel(direction, channel, |d, ch| d.dc_offset_mode(direction, ch))
    }

    fn has_dc_offset(&self, direction: Direction, channel: usize) -> Result<bool> {
        self.on_channel(direction, channel, |d, ch| d.has_dc_offset(direction, ch))
    }

    fn set_dc_offset(&self, direction: Direction, channel: usize, offset: Complex64) -> Result<()> {
        self.on_channel(direction, channel, |d, ch| d.set_dc_offset(direction, ch, offset))
    }

    fn dc_offset(&self, direction: Direction, channel: usize) -> Result<Complex64> {
        self.on_channel(direction, channel, |d, ch| d.dc_offset(direction, ch))
    }

    fn has_iq_balance(&self, direction: Direction, channel: usize) -> Result<bool> {
        self.on_channel(direction, channel, |d, ch| d.has_iq_balance(direction, ch))
    }

    fn set_iq_balance(&self, direction: Direction, channel: usize, balance: Complex64) -> Result<()> {
        self.on_channel(direction, channel, |d, ch| d.set_iq_balance(direction, ch, balance))
    }

    fn iq_balance(&self, direction: Direction, channel: usize) -> Result<Complex64> {
        self.on_channel(direction, channel, |d, ch| d.iq_balance(direction, ch))
    }

    fn has_frequency_correction(&self, direction: Direction, channel: usize) -> Result<bool> {
        self.on_channel(direction, channel, |d, ch| d.has_frequency_correction(direction, ch))
    }

    fn set_frequency_correction(&self, direction: Direction, channel: usize, ppm: f64) -> Result<()> {
        self.on_channel(direction, channel, |d, ch| d.set_frequency_correction(direction, ch, ppm))
    }

    fn frequency_correction(&self, direction: Direction, channel: usize) -> Result<f64> {
        self.on_channel(direction, channel, |d, ch| d.frequency_correction(direction, ch))
    }

    // Gain

    fn list_gains(&self, direction: Direction, channel: usize) -> Result<Vec<String>> {
        self.on_channel(direction, channel, |d, ch| d.list_gains(direction, ch))
    }

    fn has_gain_mode(&self, direction: Direction, channel: usize) -> Result<bool> {
        self.on_channel(direction, channel, |d, ch| d.has_gain_mode(direction, ch))
    }

    fn set_gain_mode(&self, direction: Direction, channel: usize, automatic: bool) -> Result<()> {
        self.on_channel(direction, channel, |d, ch| d.set_gain_mode(direction, ch, automatic))
    }

    fn gain_mode(&self, direction: Direction, channel: usize) -> Result<bool> {
        self.on_channel(direction, channel, |d, ch| d.gain_mode(direction, ch))
    }

    fn set_gain(&self, direction: Direction, channel: usize, value: f64) -> Result<()> {
        self.on_channel(direction, channel, |d, ch| d.set_gain(direction, ch, value))
    }

    fn set_gain_element(&self, direction: Direction, channel: usize, name: &str, value: f64) -> Result<()> {
        self.on_channel(direction, channel, |d, ch| d.set_gain_element(direction, ch, name, value))
    }

    fn gain(&self, direction: Direction, channel: usize) -> Result<f64> {
        self.on_channel(direction, channel, |d, ch| d.gain(direction, ch))
    }

    fn gain_element(&self, direction: Direction, channel: usize, name: &str) -> Result<f64> {
        self.on_channel(direction, channel, |d, ch| d.gain_element(direction, ch, name))
    }

    fn gain_range(&self, direction: Direction, channel: usize) -> Result<Range> {
        self.on_channel(direction, channel, |d, ch| d.gain_range(direction, ch))
    }

    fn gain_element_range(&self, direction: Direction, channel: usize, name: &str) -> Result<Range> {
        self.on_channel(direction, channel, |d, ch| d.gain_element_range(direction, ch, name))
    }

    // Frequency

    fn set_frequency(&self, direction: Direction, channel: usize, frequency: f64, args: &Kwargs) -> Result<()> {
        self.on_channel(direction, channel, |d, ch| d.set_frequency(direction, ch, frequency, args))
    }

    fn set_frequency_component(
        &self,
        direction: Direction,
        channel: usize,
        name: &str,
        frequency: f64,
        args: &Kwargs,
    ) -> Result<()> {
        self.on_channel(direction, channel, |d, ch| {
            d.set_frequency_component(direction, ch, name, frequency, args)
        })
    }

    fn frequency(&self, direction: Direction, channel: usize) -> Result<f64> {
        self.on_channel(direction, channel, |d, ch| d.frequency(direction, ch))
    }

    fn frequency_component(&self, direction: Direction, channel: usize, name: &str) -> Result<f64> {
        self.on_channel(direction, channel, |d, ch| d.frequency_component(direction, ch, name))
    }

    fn list_frequencies(&self, direction: Direction, channel: usize) -> Result<Vec<String>> {
        self.on_channel(direction, channel, |d, ch| d.list_frequencies(direction, ch))
    }

    fn frequency_range(&self, direction: Direction, channel: usize) -> Result<Vec<Range>> {
        self.on_channel(direction, channel, |d, ch| d.frequency_range(direction, ch))
    }

    fn frequency_component_range(&self, direction: Direction, channel: usize, name: &str) -> Result<Vec<Range>> {
        self.on_channel(direction, channel, |d, ch| d.frequency_component_range(direction, ch, name))
    }

    fn frequency_args_info(&self, direction: Direction, channel: usize) -> Result<Vec<ArgInfo>> {
        self.on_channel(direction, channel, |d, ch| d.frequency_args_info(direction, ch))
    }

    // Sample rate and bandwidth

    fn set_sample_rate(&self, direction: Direction, channel: usize, rate: f64) -> Result<()> {
        self.on_channel(direction, channel, |d, ch| d.set_sample_rate(direction, ch, rate))
    }

    fn sample_rate(&self, direction: Direction, channel: usize) -> Result<f64> {
        self.on_channel(direction, channel, |d, ch| d.sample_rate(direction, ch))
    }

    fn list_sample_rates(&self, direction: Direction, channel: usize) -> Result<Vec<f64>> {
        self.on_channel(direction, channel, |d, ch| d.list_sample_rates(direction, ch))
    }

    fn sample_rate_range(&self, direction: Direction, channel: usize) -> Result<Vec<Range>> {
        self.on_channel(direction, channel, |d, ch| d.sample_rate_range(direction, ch))
    }

    fn set_bandwidth(&self, direction: Direction, channel: usize, bandwidth: f64) -> Result<()> {
        self.on_channel(direction, channel, |d, ch| d.set_bandwidth(direction, ch, bandwidth))
    }

    fn bandwidth(&self, direction: Direction, channel: usize) -> Result<f64> {
        self.on_channel(direction, channel, |d, ch| d.bandwidth(direction, ch))
    }

    fn bandwidth_range(&self, direction: Direction, channel: usize) -> Result<Vec<Range>> {
        self.on_channel(direction, channel, |d, ch| d.bandwidth_range(direction, ch))
    }

    // Clocking and time: setters broadcast, getters read device 0

    fn set_master_clock_rate(&self, rate: f64) -> Result<()> {
        self.broadcast(|d| d.set_master_clock_rate(rate))
    }

    fn master_clock_rate(&self) -> f64 {
        self.first().master_clock_rate()
    }

    fn master_clock_rates(&self) -> Vec<Range> {
        self.first().master_clock_rates()
    }

    fn list_clock_sources(&self) -> Vec<String> {
        self.first().list_clock_sources()
    }

    fn set_clock_source(&self, source: &str) -> Result<()> {
        self.broadcast(|d| d.set_clock_source(source))
    }

    fn clock_source(&self) -> String {
        self.joined(|d| d.clock_source())
    }

    fn list_time_sources(&self) -> Vec<String> {
        self.first().list_time_sources()
    }

    fn set_time_source(&self, source: &str) -> Result<()> {
        self.broadcast(|d| d.set_time_source(source))
    }

    fn time_source(&self) -> String {
        self.joined(|d| d.time_source())
    }

    fn has_hardware_time(&self, what: &str) -> bool {
        self.first().has_hardware_time(what)
    }

    fn hardware_time(&self, what: &str) -> Result<i64> {
        self.first().hardware_time(what)
    }

    fn set_hardware_time(&self, time_ns: i64, what: &str) -> Result<()> {
        self.broadcast(|d| d.set_hardware_time(time_ns, what))
    }

    fn set_command_time(&self, time_ns: i64, what: &str) -> Result<()> {
        self.broadcast(|d| d.set_command_time(time_ns, what))
    }

    // Sensors

    fn list_sensors(&self) -> Vec<String> {
        self.list_encoded(|d| d.list_sensors())
    }

    fn sensor_info(&self, key: &str) -> Result<ArgInfo> {
        self.route_named(key, |d, name| d.sensor_info(name))
    }

    fn read_sensor(&self, key: &str) -> Result<String> {
        self.route_named(key, |d, name| d.read_sensor(name))
    }

    fn list_channel_sensors(&self, direction: Direction, channel: usize) -> Result<Vec<String>> {
        self.on_channel(direction, channel, |d, ch| d.list_channel_sensors(direction, ch))
    }

    fn channel_sensor_info(&self, direction: Direction, channel: usize, key: &str) -> Result<ArgInfo> {
        self.on_channel(direction, channel, |d, ch| d.channel_sensor_info(direction, ch, key))
    }

    fn read_channel_sensor(&self, direction: Direction, channel: usize, key: &str) -> Result<String> {
        self.on_channel(direction, channel, |d, ch| d.read_channel_sensor(direction, ch, key))
    }

    // Registers

    fn register_interfaces(&self) -> Vec<String> {
        self.list_encoded(|d| d.register_interfaces())
    }

    fn write_named_register(&self, name: &str, addr: u32, value: u32) -> Result<()> {
        self.route_named(name, |d, name| d.write_named_register(name, addr, value))
    }

    fn read_named_register(&self, name: &str, addr: u32) -> Result<u32> {
        self.route_named(name, |d, name| d.read_named_register(name, addr))
    }

    fn write_named_registers(&self, name: &str, addr: u32, values: &[u32]) -> Result<()> {
        self.route_named(name, |d, name| d.write_named_registers(name, addr, values))
    }

    fn read_named_registers(&self, name: &str, addr: u32, length: usize) -> Result<Vec<u32>> {
        self.route_named(name, |d, name| d.read_named_registers(name, addr, length))
    }

    fn write_register(&self, addr: u32, value: u32) -> Result<()> {
        self.first().write_register(addr, value)
    }

    fn read_register(&self, addr: u32) -> Result<u32> {
        self.first().read_register(addr)
    }

    // Settings

    fn setting_info(&self) -> Vec<ArgInfo> {
        self.encoded_setting_info()
    }

    fn write_setting(&self, key: &str, value: &str) -> Result<()> {
        self.route_named(key, |d, name| d.write_setting(name, value))
    }

    fn read_setting(&self, key: &str) -> Result<String> {
        self.route_named(key, |d, name| d.read_setting(name))
    }

    fn channel_setting_info(&self, direction: Direction, channel: usize) -> Result<Vec<ArgInfo>> {
        self.on_channel(direction, channel, |d, ch| d.channel_setting_info(direction, ch))
    }

    fn write_channel_setting(&self, direction: Direction, channel: usize, key: &str, value: &str) -> Result<()> {
        self.on_channel(direction, channel, |d, ch| d.write_channel_setting(direction, ch, key, value))
    }

    fn read_channel_setting(&self, direction: Direction, channel: usize, key: &str) -> Result<String> {
        self.on_channel(direction, channel, |d, ch| d.read_channel_setting(direction, ch, key))
    }

    // GPIO

    fn list_gpio_banks(&self) -> Vec<String> {
        self.list_encoded(|d| d.list_gpio_banks())
    }

    fn write_gpio(&self, bank: &str, value: u32) -> Result<()> {
        self.route_named(bank, |d, bank| d.write_gpio(bank, value))
    }

    fn write_gpio_masked(&self, bank: &str, value: u32, mask: u32) -> Result<()> {
        self.route_named(bank, |d, bank| d.write_gpio_masked(bank, value, mask))
    }

    fn read_gpio(&self, bank: &str) -> Result<u32> {
        self.route_named(bank, |d, bank| d.read_gpio(bank))
    }

    fn write_gpio_dir(&self, bank: &str, dir: u32) -> Result<()> {
        self.route_named(bank, |d, bank| d.write_gpio_dir(bank, dir))
    }

    fn write_gpio_dir_masked(&self, bank: &str, dir: u32, mask: u32) -> Result<()> {
        self.route_named(bank, |d, bank| d.write_gpio_dir_masked(bank, dir, mask))
    }

    fn read_gpio_dir(&self, bank: &str) -> Result<u32> {
        self.route_named(bank, |d, bank| d.read_gpio_dir(bank))
    }

    // Low-level buses: I2C and SPI have no name to route on

    fn write_i2c(&self, addr: i32, data: &[u8]) -> Result<()> {
        self.first().write_i2c(addr, data)
    }

    fn read_i2c(&self, addr: i32, num_bytes: usize) -> Result<Vec<u8>> {
        self.first().read_i2c(addr, num_bytes)
    }

    fn transact_spi(&self, addr: i32, data: u32, num_bits: usize) -> Result<u32> {
        self.first().transact_spi(addr, data, num_bits)
    }

    fn list_uarts(&self) -> Vec<String> {
        self.list_encoded(|d| d.list_uarts())
    }

    fn write_uart(&self, which: &str, data: &str) -> Result<()> {
        self.route_named(which, |d, which| d.write_uart(which, data))
    }

    fn read_uart(&self, which: &str, timeout_us: i64) -> Result<String> {
        self.route_named(which, |d, which| d.read_uart(which, timeout_us))
    }
}
