use anyhow::{bail, Result};
use async_trait::async_trait;
use num_complex::Complex64;
use std::ptr::NonNull;

use super::registry::HardwareRegistry;
use super::types::{
    ArgInfo, Direction, Kwargs, Range, ReadBuffer, ReadResult, StatusEvent, StreamFlags,
    StreamHandle, WriteBuffer, WriteResult,
};
use crate::error::StreamCode;

/// Trait implemented by hardware drivers for device discovery and creation
#[async_trait]
pub trait HardwareDriver: Send + Sync {
    /// Unique driver identifier, matched against the `driver` key (e.g. "mock", "multi")
    fn driver_id(&self) -> &str;

    /// Discover devices matching `args`. Each result is an argument map that
    /// `create_device` accepts. The registry is passed so composite drivers
    /// can enumerate through other drivers.
    async fn discover_devices(
        &self,
        args: &Kwargs,
        registry: &HardwareRegistry,
    ) -> Result<Vec<Kwargs>>;

    /// Create device instance from arguments
    fn create_device(&self, args: &Kwargs, registry: &HardwareRegistry)
        -> Result<Box<dyn Device>>;

    /// Composite drivers build devices out of other drivers' devices and
    /// take the factory lock per member themselves
    fn is_composite(&self) -> bool {
        false
    }
}

fn unsupported<T>(what: &str) -> Result<T> {
    bail!("{} not supported by this device", what)
}

fn stream_unsupported<T>() -> Result<T> {
    Err(StreamCode::NotSupported.into())
}

/// Trait implemented by device instances.
///
/// Every method takes `&self`: a device guards its own state and may be
/// called from several threads. Only identification, channel counts and
/// the core stream calls are required; everything else defaults to an empty
/// answer or a "not supported" error.
pub trait Device: Send + Sync {
    // Identification

    fn driver_key(&self) -> String;

    fn hardware_key(&self) -> String;

    fn hardware_info(&self) -> Kwargs {
        Kwargs::new()
    }

    /// True for devices made of other devices, see `HardwareDriver::is_composite`
    fn is_composite(&self) -> bool {
        false
    }

    // Channels

    fn set_frontend_mapping(&self, _direction: Direction, _mapping: &str) -> Result<()> {
        unsupported("frontend mapping")
    }

    fn frontend_mapping(&self, _direction: Direction) -> String {
        String::new()
    }

    fn num_channels(&self, direction: Direction) -> usize;

    fn channel_info(&self, _direction: Direction, _channel: usize) -> Result<Kwargs> {
        Ok(Kwargs::new())
    }

    fn full_duplex(&self, _direction: Direction, _channel: usize) -> Result<bool> {
        Ok(false)
    }

    // Streams

    fn stream_formats(&self, _direction: Direction, _channel: usize) -> Result<Vec<String>> {
        Ok(Vec::new())
    }

    /// Native format and its full-scale value
    fn native_stream_format(&self, _direction: Direction, _channel: usize) -> Result<(String, f64)> {
        unsupported("native stream format")
    }

    fn stream_args_info(&self, _direction: Direction, _channel: usize) -> Result<Vec<ArgInfo>> {
        Ok(Vec::new())
    }

    fn setup_stream(
        &self,
        direction: Direction,
        format: &str,
        channels: &[usize],
        args: &Kwargs,
    ) -> Result<StreamHandle>;

    fn close_stream(&self, stream: StreamHandle);

    fn stream_mtu(&self, _stream: &StreamHandle) -> Result<usize> {
        Ok(1024)
    }

    fn activate_stream(
        &self,
        stream: &StreamHandle,
        flags: StreamFlags,
        time_ns: i64,
        num_elems: usize,
    ) -> Result<()>;

    fn deactivate_stream(&self, stream: &StreamHandle, flags: StreamFlags, time_ns: i64)
        -> Result<()>;

    /// Read up to `num_elems` elements into one buffer per stream channel
    fn read_stream(
        &self,
        _stream: &StreamHandle,
        _buffs: &mut [&mut [u8]],
        _num_elems: usize,
        _flags: StreamFlags,
        _timeout_us: i64,
    ) -> Result<ReadResult> {
        stream_unsupported()
    }

    /// Write up to `num_elems` elements from one buffer per stream channel
    fn write_stream(
        &self,
        _stream: &StreamHandle,
        _buffs: &[&[u8]],
        _num_elems: usize,
        _flags: StreamFlags,
        _time_ns: i64,
        _timeout_us: i64,
    ) -> Result<WriteResult> {
        stream_unsupported()
    }

    /// Poll for a status event. Bits for the channels concerned are OR-ed
    /// into `chan_mask`, also when an error is returned.
    fn read_stream_status(
        &self,
        _stream: &StreamHandle,
        _chan_mask: &mut u64,
        _timeout_us: i64,
    ) -> Result<StatusEvent> {
        stream_unsupported()
    }

    // Direct buffer access

    fn num_direct_access_buffers(&self, _stream: &StreamHandle) -> Result<usize> {
        Ok(0)
    }

    /// Per-channel addresses of a device-owned buffer. Dereferencing them is
    /// only valid between acquire and release of `handle`.
    fn direct_access_buffer_addrs(
        &self,
        _stream: &StreamHandle,
        _handle: usize,
    ) -> Result<Vec<NonNull<u8>>> {
        stream_unsupported()
    }

    fn acquire_read_buffer(&self, _stream: &StreamHandle, _timeout_us: i64) -> Result<ReadBuffer> {
        stream_unsupported()
    }

    fn release_read_buffer(&self, _stream: &StreamHandle, _handle: usize) {}

    fn acquire_write_buffer(&self, _stream: &StreamHandle, _timeout_us: i64) -> Result<WriteBuffer> {
        stream_unsupported()
    }

    fn release_write_buffer(
        &self,
        _stream: &StreamHandle,
        _handle: usize,
        _num_elems: usize,
        _flags: StreamFlags,
        _time_ns: i64,
    ) {
    }

    // Antenna

    fn list_antennas(&self, _direction: Direction, _channel: usize) -> Result<Vec<String>> {
        Ok(Vec::new())
    }

    fn set_antenna(&self, _direction: Direction, _channel: usize, _name: &str) -> Result<()> {
        unsupported("antenna selection")
    }

    fn antenna(&self, _direction: Direction, _channel: usize) -> Result<String> {
        Ok(String::new())
    }

    // Frontend corrections

    fn has_dc_offset_mode(&self, _direction: Direction, _channel: usize) -> Result<bool> {
        Ok(false)
    }

    fn set_dc_offset_mode(&self, _direction: Direction, _channel: usize, _automatic: bool) -> Result<()> {
        unsupported("automatic DC offset")
    }

    fn dc_offset_mode(&self, _direction: Direction, _channel: usize) -> Result<bool> {
        Ok(false)
    }

    fn has_dc_offset(&self, _direction: Direction, _channel: usize) -> Result<bool> {
        Ok(false)
    }

    fn set_dc_offset(&self, _direction: Direction, _channel: usize, _offset: Complex64) -> Result<()> {
        unsupported("DC offset correction")
    }

    fn dc_offset(&self, _direction: Direction, _channel: usize) -> Result<Complex64> {
        Ok(Complex64::new(0.0, 0.0))
    }

    fn has_iq_balance(&self, _direction: Direction, _channel: usize) -> Result<bool> {
        Ok(false)
    }

    fn set_iq_balance(&self, _direction: Direction, _channel: usize, _balance: Complex64) -> Result<()> {
        unsupported("IQ balance correction")
    }

    fn iq_balance(&self, _direction: Direction, _channel: usize) -> Result<Complex64> {
        Ok(Complex64::new(0.0, 0.0))
    }

    fn has_frequency_correction(&self, _direction: Direction, _channel: usize) -> Result<bool> {
        Ok(false)
    }

    fn set_frequency_correction(&self, _direction: Direction, _channel: usize, _ppm: f64) -> Result<()> {
        unsupported("frequency correction")
    }

    fn frequency_correction(&self, _direction: Direction, _channel: usize) -> Result<f64> {
        Ok(0.0)
    }

    // Gain

    fn list_gains(&self, _direction: Direction, _channel: usize) -> Result<Vec<String>> {
        Ok(Vec::new())
    }

    fn has_gain_mode(&self, _direction: Direction, _channel: usize) -> Result<bool> {
        Ok(false)
    }

    fn set_gain_mode(&self, _direction: Direction, _channel: usize, _automatic: bool) -> Result<()> {
        unsupported("automatic gain")
    }

    fn gain_mode(&self, _direction: Direction, _channel: usize) -> Result<bool> {
        Ok(false)
    }

    fn set_gain(&self, _direction: Direction, _channel: usize, _value: f64) -> Result<()> {
        unsupported("gain control")
    }

    fn set_gain_element(&self, _direction: Direction, _channel: usize, _name: &str, _value: f64) -> Result<()> {
        unsupported("gain elements")
    }

    fn gain(&self, _direction: Direction, _channel: usize) -> Result<f64> {
        Ok(0.0)
    }

    fn gain_element(&self, _direction: Direction, _channel: usize, _name: &str) -> Result<f64> {
        unsupported("gain elements")
    }

    fn gain_range(&self, _direction: Direction, _channel: usize) -> Result<Range> {
        Ok(Range::new(0.0, 0.0))
    }

    fn gain_element_range(&self, _direction: Direction, _channel: usize, _name: &str) -> Result<Range> {
        unsupported("gain elements")
    }

    // Frequency

    fn set_frequency(&self, _direction: Direction, _channel: usize, _frequency: f64, _args: &Kwargs) -> Result<()> {
        unsupported("frequency tuning")
    }

    fn set_frequency_component(
        &self,
        _direction: Direction,
        _channel: usize,
        _name: &str,
        _frequency: f64,
        _args: &Kwargs,
    ) -> Result<()> {
        unsupported("frequency components")
    }

    fn frequency(&self, _direction: Direction, _channel: usize) -> Result<f64> {
        Ok(0.0)
    }

    fn frequency_component(&self, _direction: Direction, _channel: usize, _name: &str) -> Result<f64> {
        unsupported("frequency components")
    }

    fn list_frequencies(&self, _direction: Direction, _channel: usize) -> Result<Vec<String>> {
        Ok(Vec::new())
    }

    fn frequency_range(&self, _direction: Direction, _channel: usize) -> Result<Vec<Range>> {
        Ok(Vec::new())
    }

    fn frequency_component_range(&self, _direction: Direction, _channel: usize, _name: &str) -> Result<Vec<Range>> {
        unsupported("frequency components")
    }

    fn frequency_args_info(&self, _direction: Direction, _channel: usize) -> Result<Vec<ArgInfo>> {
        Ok(Vec::new())
    }

    // Sample rate and bandwidth

    fn set_sample_rate(&self, _direction: Direction, _channel: usize, _rate: f64) -> Result<()> {
        unsupported("sample rate control")
    }

    fn sample_rate(&self, _direction: Direction, _channel: usize) -> Result<f64> {
        Ok(0.0)
    }

    fn list_sample_rates(&self, _direction: Direction, _channel: usize) -> Result<Vec<f64>> {
        Ok(Vec::new())
    }

    fn sample_rate_range(&self, _direction: Direction, _channel: usize) -> Result<Vec<Range>> {
        Ok(Vec::new())
    }

    fn set_bandwidth(&self, _direction: Direction, _channel: usize, _bandwidth: f64) -> Result<()> {
        unsupported("bandwidth control")
    }

    fn bandwidth(&self, _direction: Direction, _channel: usize) -> Result<f64> {
        Ok(0.0)
    }

    fn bandwidth_range(&self, _direction: Direction, _channel: usize) -> Result<Vec<Range>> {
        Ok(Vec::new())
    }

    // Clocking and time

    fn set_master_clock_rate(&self, _rate: f64) -> Result<()> {
        unsupported("master clock rate")
    }

    fn master_clock_rate(&self) -> f64 {
        0.0
    }

    fn master_clock_rates(&self) -> Vec<Range> {
        Vec::new()
    }

    fn list_clock_sources(&self) -> Vec<String> {
        Vec::new()
    }

    fn set_clock_source(&self, _source: &str) -> Result<()> {
        unsupported("clock source selection")
    }

    fn clock_source(&self) -> String {
        String::new()
    }

    fn list_time_sources(&self) -> Vec<String> {
        Vec::new()
    }

    fn set_time_source(&self, _source: &str) -> Result<()> {
        unsupported("time source selection")
    }

    fn time_source(&self) -> String {
        String::new()
    }

    fn has_hardware_time(&self, _what: &str) -> bool {
        false
    }

    fn hardware_time(&self, _what: &str) -> Result<i64> {
        unsupported("hardware time")
    }

    fn set_hardware_time(&self, _time_ns: i64, _what: &str) -> Result<()> {
        unsupported("hardware time")
    }

    fn set_command_time(&self, _time_ns: i64, _what: &str) -> Result<()> {
        unsupported("timed commands")
    }

    // Sensors

    fn list_sensors(&self) -> Vec<String> {
        Vec::new()
    }

    fn sensor_info(&self, key: &str) -> Result<ArgInfo> {
        bail!("unknown sensor '{}'", key)
    }

    fn read_sensor(&self, key: &str) -> Result<String> {
        bail!("unknown sensor '{}'", key)
    }

    fn list_channel_sensors(&self, _direction: Direction, _channel: usize) -> Result<Vec<String>> {
        Ok(Vec::new())
    }

    fn channel_sensor_info(&self, _direction: Direction, _channel: usize, key: &str) -> Result<ArgInfo> {
        bail!("unknown channel sensor '{}'", key)
    }

    fn read_channel_sensor(&self, _direction: Direction, _channel: usize, key: &str) -> Result<String> {
        bail!("unknown channel sensor '{}'", key)
    }

    // Registers

    fn register_interfaces(&self) -> Vec<String> {
        Vec::new()
    }

    fn write_named_register(&self, name: &str, _addr: u32, _value: u32) -> Result<()> {
        bail!("unknown register interface '{}'", name)
    }

    fn read_named_register(&self, name: &str, _addr: u32) -> Result<u32> {
        bail!("unknown register interface '{}'", name)
    }

    fn write_named_registers(&self, name: &str, addr: u32, values: &[u32]) -> Result<()> {
        for (offset, value) in values.iter().enumerate() {
            self.write_named_register(name, addr + offset as u32, *value)?;
        }
        Ok(())
    }

    fn read_named_registers(&self, name: &str, addr: u32, length: usize) -> Result<Vec<u32>> {
        (0..length)
            .map(|offset| self.read_named_register(name, addr + offset as u32))
            .collect()
    }

    fn write_register(&self, _addr: u32, _value: u32) -> Result<()> {
        unsupported("register access")
    }

    fn read_register(&self, _addr: u32) -> Result<u32> {
        unsupported("register access")
    }

    // Settings

    fn setting_info(&self) -> Vec<ArgInfo> {
        Vec::new()
    }

    fn write_setting(&self, key: &str, _value: &str) -> Result<()> {
        bail!("unknown setting '{}'", key)
    }

    fn read_setting(&self, key: &str) -> Result<String> {
        bail!("unknown setting '{}'", key)
    }

    fn channel_setting_info(&self, _direction: Direction, _channel: usize) -> Result<Vec<ArgInfo>> {
        Ok(Vec::new())
    }

    fn write_channel_setting(&self, _direction: Direction, _channel: usize, key: &str, _value: &str) -> Result<()> {
        bail!("unknown channel setting '{}'", key)
    }

    fn read_channel_setting(&self, _direction: Direction, _channel: usize, key: &str) -> Result<String> {
        bail!("unknown channel setting '{}'", key)
    }

    // GPIO

    fn list_gpio_banks(&self) -> Vec<String> {
        Vec::new()
    }

    fn write_gpio(&self, bank: &str, _value: u32) -> Result<()> {
        bail!("unknown GPIO bank '{}'", bank)
    }

    fn write_gpio_masked(&self, bank: &str, value: u32, mask: u32) -> Result<()> {
        let current = self.read_gpio(bank)?;
        self.write_gpio(bank, (current & !mask) | (value & mask))
    }

    fn read_gpio(&self, bank: &str) -> Result<u32> {
        bail!("unknown GPIO bank '{}'", bank)
    }

    fn write_gpio_dir(&self, bank: &str, _dir: u32) -> Result<()> {
        bail!("unknown GPIO bank '{}'", bank)
    }

    fn write_gpio_dir_masked(&self, bank: &str, dir: u32, mask: u32) -> Result<()> {
        let current = self.read_gpio_dir(bank)?;
        self.write_gpio_dir(bank, (current & !mask) | (dir & mask))
    }

    fn read_gpio_dir(&self, bank: &str) -> Result<u32> {
        bail!("unknown GPIO bank '{}'", bank)
    }

    // Low-level buses

    fn write_i2c(&self, _addr: i32, _data: &[u8]) -> Result<()> {
        unsupported("I2C")
    }

    fn read_i2c(&self, _addr: i32, _num_bytes: usize) -> Result<Vec<u8>> {
        unsupported("I2C")
    }

    fn transact_spi(&self, _addr: i32, _data: u32, _num_bits: usize) -> Result<u32> {
        unsupported("SPI")
    }

    fn list_uarts(&self) -> Vec<String> {
        Vec::new()
    }

    fn write_uart(&self, which: &str, _data: &str) -> Result<()> {
        bail!("unknown UART '{}'", which)
    }

    fn read_uart(&self, which: &str, _timeout_us: i64) -> Result<String> {
        bail!("unknown UART '{}'", which)
    }
}
