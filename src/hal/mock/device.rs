use anyhow::{anyhow, bail, Context, Result};
use num_complex::Complex64;
use std::collections::{BTreeMap, HashMap};
use std::ptr::NonNull;
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use super::driver::{MockProbe, TxCapture};
use crate::error::StreamCode;
use crate::hal::lifecycle::FactoryLock;
use crate::hal::traits::Device;
use crate::hal::types::{
    format_size, ArgInfo, ArgType, Direction, Kwargs, Range, ReadBuffer, ReadResult, StatusEvent,
    StreamFlags, StreamHandle, WriteBuffer, WriteResult,
};

/// Behaviour scripted through creation arguments
#[derive(Debug, Clone)]
struct Script {
    activate_error: Option<StreamCode>,
    deactivate_error: Option<StreamCode>,
    read_error: Option<StreamCode>,
    write_error: Option<StreamCode>,
    status_error: Option<StreamCode>,
    status_mask: u64,
    read_elems: Option<usize>,
    write_elems: Option<usize>,
    read_flags: StreamFlags,
    read_delay: Option<Duration>,
    setup_error: bool,
    time_ns: i64,
    fill: u8,
    mtu: usize,
    dma_buffers: usize,
    temperature: String,
    clock_sources: Vec<String>,
}

struct MockStream {
    direction: Direction,
    channels: Vec<usize>,
    elem_size: usize,
    active: bool,
    /// [buffer][channel]
    dma: Vec<Vec<Vec<u8>>>,
    next_dma: usize,
}

type ChannelKey = (Direction, usize);
type NamedChannelKey = (Direction, usize, String);

#[derive(Default)]
struct MockState {
    mapping: HashMap<Direction, Vec<String>>,
    gains: HashMap<ChannelKey, f64>,
    gain_elements: HashMap<NamedChannelKey, f64>,
    gain_modes: HashMap<ChannelKey, bool>,
    frequencies: HashMap<ChannelKey, f64>,
    frequency_components: HashMap<NamedChannelKey, f64>,
    sample_rates: HashMap<ChannelKey, f64>,
    bandwidths: HashMap<ChannelKey, f64>,
    antennas: HashMap<ChannelKey, String>,
    dc_offset_modes: HashMap<ChannelKey, bool>,
    dc_offsets: HashMap<ChannelKey, Complex64>,
    iq_balances: HashMap<ChannelKey, Complex64>,
    frequency_corrections: HashMap<ChannelKey, f64>,
    channel_settings: HashMap<NamedChannelKey, String>,
    master_clock_rate: f64,
    clock_source: String,
    time_source: String,
    hardware_time: i64,
    command_time: Option<i64>,
    settings: BTreeMap<String, String>,
    registers: HashMap<(String, u32), u32>,
    gpio: HashMap<String, u32>,
    gpio_dir: HashMap<String, u32>,
    uart: HashMap<String, String>,
    i2c: HashMap<i32, Vec<u8>>,
    streams: HashMap<u64, MockStream>,
    next_stream: u64,
}

/// Simulated device with fully scripted behaviour.
///
/// Recognised creation arguments (all optional):
/// `serial`, `rx_channels`, `tx_channels`, `fill` (byte written into read
/// buffers, plus the local channel index), `time_ns`, `mtu`, `dma_buffers`,
/// `read_elems`/`write_elems` (short transfers), `read_flags` (bits OR-ed
/// into read output flags), `read_delay_ms` (blocks each read before it
/// touches the device state), `status_mask`, `temp`, `clock_sources` (csv),
/// `setup_error`, and `activate_error`/`deactivate_error`/`read_error`/
/// `write_error`/`status_error` naming a `StreamCode` (e.g. `timeout`).
pub struct MockDevice {
    serial: String,
    script: Script,
    state: Mutex<MockState>,
    probe: Arc<MockProbe>,
    lock: FactoryLock,
}

fn code_arg(args: &Kwargs, key: &str) -> Result<Option<StreamCode>> {
    args.get(key)
        .map(|v| {
            StreamCode::from_name(v).ok_or_else(|| anyhow!("Unknown stream code '{}' for {}", v, key))
        })
        .transpose()
}

fn num_arg<T>(args: &Kwargs, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    args.get(key)
        .map(|v| v.trim().parse::<T>().with_context(|| format!("Invalid value '{}' for {}", v, key)))
        .transpose()
}

impl MockDevice {
    pub fn from_args(args: &Kwargs, probe: Arc<MockProbe>, lock: FactoryLock) -> Result<Self> {
        let serial = args.get("serial").cloned().unwrap_or_else(|| "MOCK".to_string());
        let rx_channels = num_arg::<usize>(args, "rx_channels")?.unwrap_or(2);
        let tx_channels = num_arg::<usize>(args, "tx_channels")?.unwrap_or(2);

        let script = Script {
            activate_error: code_arg(args, "activate_error")?,
            deactivate_error: code_arg(args, "deactivate_error")?,
            read_error: code_arg(args, "read_error")?,
            write_error: code_arg(args, "write_error")?,
            status_error: code_arg(args, "status_error")?,
            status_mask: num_arg(args, "status_mask")?.unwrap_or(0),
            read_elems: num_arg(args, "read_elems")?,
            write_elems: num_arg(args, "write_elems")?,
            read_flags: StreamFlags::from_bits_truncate(num_arg(args, "read_flags")?.unwrap_or(0)),
            read_delay: num_arg(args, "read_delay_ms")?.map(Duration::from_millis),
            setup_error: args.contains_key("setup_error"),
            time_ns: num_arg(args, "time_ns")?.unwrap_or(0),
            fill: num_arg(args, "fill")?.unwrap_or(0),
            mtu: num_arg(args, "mtu")?.unwrap_or(1024),
            dma_buffers: num_arg(args, "dma_buffers")?.unwrap_or(2),
            temperature: args.get("temp").cloned().unwrap_or_else(|| "25.0".to_string()),
            clock_sources: args
                .get("clock_sources")
                .map(|s| s.split(',').map(|c| c.trim().to_string()).collect())
                .unwrap_or_else(|| vec!["internal".to_string(), "external".to_string()]),
        };

        let mut state = MockState {
            master_clock_rate: 32e6,
            clock_source: "internal".to_string(),
            time_source: "none".to_string(),
            ..MockState::default()
        };
        state.mapping.insert(
            Direction::Input,
            (0..rx_channels).map(|i| format!("RX{}", i)).collect(),
        );
        state.mapping.insert(
            Direction::Output,
            (0..tx_channels).map(|i| format!("TX{}", i)).collect(),
        );

        probe.device_created(lock.is_held());
        probe.record(&serial, "make");

        Ok(Self {
            serial,
            script,
            state: Mutex::new(state),
            probe,
            lock,
        })
    }

    pub fn serial(&self) -> &str {
        &self.serial
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn record(&self, event: impl AsRef<str>) {
        self.probe.record(&self.serial, event);
    }

    fn check_channel(&self, state: &MockState, direction: Direction, channel: usize) -> Result<()> {
        let count = state.mapping.get(&direction).map_or(0, Vec::len);
        if channel >= count {
            bail!(
                "{} channel {} out of range on {} ({} channels)",
                direction,
                channel,
                self.serial,
                count
            );
        }
        Ok(())
    }

    fn checked(&self, direction: Direction, channel: usize) -> Result<MutexGuard<'_, MockState>> {
        let state = self.state();
        self.check_channel(&state, direction, channel)?;
        Ok(state)
    }
}

fn fail(code: Option<StreamCode>) -> Result<()> {
    match code {
        Some(code) => Err(code.into()),
        None => Ok(()),
    }
}

fn stream_mut<'a>(state: &'a mut MockState, stream: &StreamHandle) -> Result<&'a mut MockStream> {
    state
        .streams
        .get_mut(&stream.id())
        .ok_or_else(|| StreamCode::StreamError.into())
}

impl Drop for MockDevice {
    fn drop(&mut self) {
        self.record("unmake");
        self.probe.device_dropped(self.lock.is_held());
    }
}

impl Device for MockDevice {
    fn driver_key(&self) -> String {
        "mock".to_string()
    }

    fn hardware_key(&self) -> String {
        self.serial.clone()
    }

    fn hardware_info(&self) -> Kwargs {
        let mut info = Kwargs::new();
        info.insert("serial".to_string(), self.serial.clone());
        info.insert("version".to_string(), "1.0".to_string());
        info
    }

    fn set_frontend_mapping(&self, direction: Direction, mapping: &str) -> Result<()> {
        let frontends: Vec<String> = mapping.split_whitespace().map(str::to_string).collect();
        if frontends.is_empty() {
            bail!("Empty frontend mapping for {}", self.serial);
        }
        self.record(format!("frontend {} {}", direction, mapping));
        self.state().mapping.insert(direction, frontends);
        Ok(())
    }

    fn frontend_mapping(&self, direction: Direction) -> String {
        self.state()
            .mapping
            .get(&direction)
            .map(|m| m.join(" "))
            .unwrap_or_default()
    }

    fn num_channels(&self, direction: Direction) -> usize {
        self.state().mapping.get(&direction).map_or(0, Vec::len)
    }

    fn channel_info(&self, direction: Direction, channel: usize) -> Result<Kwargs> {
        let state = self.checked(direction, channel)?;
        let mut info = Kwargs::new();
        info.insert("frontend".to_string(), state.mapping[&direction][channel].clone());
        info.insert("serial".to_string(), self.serial.clone());
        Ok(info)
    }

    fn full_duplex(&self, direction: Direction, channel: usize) -> Result<bool> {
        self.checked(direction, channel)?;
        Ok(true)
    }

    // Streams

    fn stream_formats(&self, direction: Direction, channel: usize) -> Result<Vec<String>> {
        self.checked(direction, channel)?;
        Ok(vec!["CS16".to_string(), "CF32".to_string()])
    }

    fn native_stream_format(&self, direction: Direction, channel: usize) -> Result<(String, f64)> {
        self.checked(direction, channel)?;
        Ok(("CS16".to_string(), 2048.0))
    }

    fn stream_args_info(&self, direction: Direction, channel: usize) -> Result<Vec<ArgInfo>> {
        self.checked(direction, channel)?;
        Ok(vec![ArgInfo::new("buffer_size", "1024", ArgType::Int)
            .with_description("Transfer buffer size in elements")])
    }

    fn setup_stream(
        &self,
        direction: Direction,
        format: &str,
        channels: &[usize],
        _args: &Kwargs,
    ) -> Result<StreamHandle> {
        self.record(format!("setup {} {} {:?}", direction, format, channels));
        if self.script.setup_error {
            bail!("mock {} cannot open a stream", self.serial);
        }
        let elem_size =
            format_size(format).ok_or_else(|| anyhow!("Unsupported stream format '{}'", format))?;
        let channels = if channels.is_empty() { vec![0] } else { channels.to_vec() };

        let mut state = self.state();
        for &channel in &channels {
            self.check_channel(&state, direction, channel)?;
        }

        let id = state.next_stream;
        state.next_stream += 1;
        let dma = vec![vec![vec![0u8; self.script.mtu * elem_size]; channels.len()]; self.script.dma_buffers];
        state.streams.insert(
            id,
            MockStream {
                direction,
                channels,
                elem_size,
                active: false,
                dma,
                next_dma: 0,
            },
        );
        Ok(StreamHandle::new(id))
    }

    fn close_stream(&self, stream: StreamHandle) {
        self.record(format!("close {}", stream.id()));
        self.state().streams.remove(&stream.id());
    }

    fn stream_mtu(&self, stream: &StreamHandle) -> Result<usize> {
        stream_mut(&mut self.state(), stream)?;
        Ok(self.script.mtu)
    }

    fn activate_stream(
        &self,
        stream: &StreamHandle,
        _flags: StreamFlags,
        _time_ns: i64,
        _num_elems: usize,
    ) -> Result<()> {
        self.record("activate");
        fail(self.script.activate_error)?;
        stream_mut(&mut self.state(), stream)?.active = true;
        Ok(())
    }

    fn deactivate_stream(&self, stream: &StreamHandle, _flags: StreamFlags, _time_ns: i64) -> Result<()> {
        self.record("deactivate");
        fail(self.script.deactivate_error)?;
        stream_mut(&mut self.state(), stream)?.active = false;
        Ok(())
    }

    fn read_stream(
        &self,
        stream: &StreamHandle,
        buffs: &mut [&mut [u8]],
        num_elems: usize,
        flags: StreamFlags,
        _timeout_us: i64,
    ) -> Result<ReadResult> {
        self.record(format!("read flags={}", flags.bits()));
        if let Some(delay) = self.script.read_delay {
            std::thread::sleep(delay);
        }
        fail(self.script.read_error)?;

        let mut state = self.state();
        let s = stream_mut(&mut state, stream)?;
        if !s.active || s.direction != Direction::Input || buffs.len() < s.channels.len() {
            return Err(StreamCode::StreamError.into());
        }

        let capacity = buffs
            .iter()
            .take(s.channels.len())
            .map(|b| b.len() / s.elem_size)
            .min()
            .unwrap_or(0);
        let elems = num_elems
            .min(self.script.read_elems.unwrap_or(usize::MAX))
            .min(capacity);

        for (buff, &channel) in buffs.iter_mut().zip(&s.channels) {
            buff[..elems * s.elem_size].fill(self.script.fill.wrapping_add(channel as u8));
        }

        Ok(ReadResult {
            elems,
            flags: flags | StreamFlags::HAS_TIME | self.script.read_flags,
            time_ns: self.script.time_ns,
        })
    }

    fn write_stream(
        &self,
        stream: &StreamHandle,
        buffs: &[&[u8]],
        num_elems: usize,
        flags: StreamFlags,
        _time_ns: i64,
        _timeout_us: i64,
    ) -> Result<WriteResult> {
        self.record(format!("write flags={}", flags.bits()));
        fail(self.script.write_error)?;

        let mut state = self.state();
        let s = stream_mut(&mut state, stream)?;
        if !s.active || s.direction != Direction::Output || buffs.len() < s.channels.len() {
            return Err(StreamCode::StreamError.into());
        }

        let elems = num_elems.min(self.script.write_elems.unwrap_or(usize::MAX));
        for (buff, &channel) in buffs.iter().zip(&s.channels) {
            let len = (elems * s.elem_size).min(buff.len());
            self.probe.capture(TxCapture {
                serial: self.serial.clone(),
                channel,
                data: buff[..len].to_vec(),
            });
        }

        Ok(WriteResult { elems, flags })
    }

    fn read_stream_status(
        &self,
        stream: &StreamHandle,
        chan_mask: &mut u64,
        _timeout_us: i64,
    ) -> Result<StatusEvent> {
        self.record("status");
        stream_mut(&mut self.state(), stream)?;
        *chan_mask |= self.script.status_mask;
        fail(self.script.status_error)?;
        Ok(StatusEvent {
            flags: StreamFlags::END_BURST | StreamFlags::HAS_TIME,
            time_ns: self.script.time_ns,
        })
    }

    fn num_direct_access_buffers(&self, stream: &StreamHandle) -> Result<usize> {
        Ok(stream_mut(&mut self.state(), stream)?.dma.len())
    }

    fn direct_access_buffer_addrs(&self, stream: &StreamHandle, handle: usize) -> Result<Vec<NonNull<u8>>> {
        let mut state = self.state();
        let s = stream_mut(&mut state, stream)?;
        let buffer = s
            .dma
            .get_mut(handle)
            .ok_or_else(|| anyhow::Error::from(StreamCode::StreamError))?;
        buffer
            .iter_mut()
            .map(|b| {
                NonNull::new(b.as_mut_ptr())
                    .ok_or_else(|| anyhow::Error::from(StreamCode::StreamError))
            })
            .collect()
    }

    fn acquire_read_buffer(&self, stream: &StreamHandle, _timeout_us: i64) -> Result<ReadBuffer> {
        let mut state = self.state();
        let s = stream_mut(&mut state, stream)?;
        if s.dma.is_empty() {
            return Err(StreamCode::NotSupported.into());
        }
        let handle = s.next_dma % s.dma.len();
        s.next_dma += 1;
        drop(state);

        self.record(format!("acquire_read {}", handle));
        Ok(ReadBuffer {
            handle,
            elems: self.script.mtu,
            flags: StreamFlags::HAS_TIME,
            time_ns: self.script.time_ns,
        })
    }

    fn release_read_buffer(&self, _stream: &StreamHandle, handle: usize) {
        self.record(format!("release_read {}", handle));
    }

    fn acquire_write_buffer(&self, stream: &StreamHandle, _timeout_us: i64) -> Result<WriteBuffer> {
        let mut state = self.state();
        let s = stream_mut(&mut state, stream)?;
        if s.dma.is_empty() {
            return Err(StreamCode::NotSupported.into());
        }
        let handle = s.next_dma % s.dma.len();
        s.next_dma += 1;
        drop(state);

        self.record(format!("acquire_write {}", handle));
        Ok(WriteBuffer {
            handle,
            elems: self.script.mtu,
        })
    }

    fn release_write_buffer(
        &self,
        _stream: &StreamHandle,
        handle: usize,
        num_elems: usize,
        _flags: StreamFlags,
        _time_ns: i64,
    ) {
        self.record(format!("release_write {} {}", handle, num_elems));
    }

    // Antenna and corrections

    fn list_antennas(&self, direction: Direction, channel: usize) -> Result<Vec<String>> {
        self.checked(direction, channel)?;
        Ok(vec!["TX/RX".to_string(), "RX2".to_string()])
    }

    fn set_antenna(&self, direction: Direction, channel: usize, name: &str) -> Result<()> {
        let mut state = self.checked(direction, channel)?;
        if name != "TX/RX" && name != "RX2" {
            bail!("Unknown antenna '{}' on {}", name, self.serial);
        }
        state.antennas.insert((direction, channel), name.to_string());
        Ok(())
    }

    fn antenna(&self, direction: Direction, channel: usize) -> Result<String> {
        let state = self.checked(direction, channel)?;
        Ok(state
            .antennas
            .get(&(direction, channel))
            .cloned()
            .unwrap_or_else(|| "TX/RX".to_string()))
    }

    fn has_dc_offset_mode(&self, direction: Direction, channel: usize) -> Result<bool> {
        self.checked(direction, channel)?;
        Ok(true)
    }

    fn set_dc_offset_mode(&self, direction: Direction, channel: usize, automatic: bool) -> Result<()> {
        self.checked(direction, channel)?
            .dc_offset_modes
            .insert((direction, channel), automatic);
        Ok(())
    }

    fn dc_offset_mode(&self, direction: Direction, channel: usize) -> Result<bool> {
        let state = self.checked(direction, channel)?;
        Ok(state.dc_offset_modes.get(&(direction, channel)).copied().unwrap_or(false))
    }

    fn has_dc_offset(&self, direction: Direction, channel: usize) -> Result<bool> {
        self.checked(direction, channel)?;
        Ok(true)
    }

    fn set_dc_offset(&self, direction: Direction, channel: usize, offset: Complex64) -> Result<()> {
        self.checked(direction, channel)?
            .dc_offsets
            .insert((direction, channel), offset);
        Ok(())
    }

    fn dc_offset(&self, direction: Direction, channel: usize) -> Result<Complex64> {
        let state = self.checked(direction, channel)?;
        Ok(state.dc_offsets.get(&(direction, channel)).copied().unwrap_or_default())
    }

    fn has_iq_balance(&self, direction: Direction, channel: usize) -> Result<bool> {
        self.checked(direction, channel)?;
        Ok(true)
    }

    fn set_iq_balance(&self, direction: Direction, channel: usize, balance: Complex64) -> Result<()> {
        self.checked(direction, channel)?
            .iq_balances
            .insert((direction, channel), balance);
        Ok(())
    }

    fn iq_balance(&self, direction: Direction, channel: usize) -> Result<Complex64> {
        let state = self.checked(direction, channel)?;
        Ok(state.iq_balances.get(&(direction, channel)).copied().unwrap_or_default())
    }

    fn has_frequency_correction(&self, direction: Direction, channel: usize) -> Result<bool> {
        self.checked(direction, channel)?;
        Ok(true)
    }

    fn set_frequency_correction(&self, direction: Direction, channel: usize, ppm: f64) -> Result<()> {
        self.checked(direction, channel)?
            .frequency_corrections
            .insert((direction, channel), ppm);
        Ok(())
    }

    fn frequency_correction(&self, direction: Direction, channel: usize) -> Result<f64> {
        let state = self.checked(direction, channel)?;
        Ok(state.frequency_corrections.get(&(direction, channel)).copied().unwrap_or(0.0))
    }

    // Gain, frequency, rate, bandwidth

    fn list_gains(&self, direction: Direction, channel: usize) -> Result<Vec<String>> {
        self.checked(direction, channel)?;
        Ok(vec!["LNA".to_string(), "PGA".to_string()])
    }

    fn has_gain_mode(&self, direction: Direction, channel: usize) -> Result<bool> {
        self.checked(direction, channel)?;
        Ok(true)
    }

    fn set_gain_mode(&self, direction: Direction, channel: usize, automatic: bool) -> Result<()> {
        self.checked(direction, channel)?
            .gain_modes
            .insert((direction, channel), automatic);
        Ok(())
    }

    fn gain_mode(&self, direction: Direction, channel: usize) -> Result<bool> {
        let state = self.checked(direction, channel)?;
        Ok(state.gain_modes.get(&(direction, channel)).copied().unwrap_or(false))
    }

    fn set_gain(&self, direction: Direction, channel: usize, value: f64) -> Result<()> {
        let mut state = self.checked(direction, channel)?;
        if !Range::new(0.0, 60.0).contains(value) {
            bail!("Gain {} dB out of range on {}", value, self.serial);
        }
        state.gains.insert((direction, channel), value);
        Ok(())
    }

    fn set_gain_element(&self, direction: Direction, channel: usize, name: &str, value: f64) -> Result<()> {
        self.checked(direction, channel)?
            .gain_elements
            .insert((direction, channel, name.to_string()), value);
        Ok(())
    }

    fn gain(&self, direction: Direction, channel: usize) -> Result<f64> {
        let state = self.checked(direction, channel)?;
        Ok(state.gains.get(&(direction, channel)).copied().unwrap_or(0.0))
    }

    fn gain_element(&self, direction: Direction, channel: usize, name: &str) -> Result<f64> {
        let state = self.checked(direction, channel)?;
        Ok(state
            .gain_elements
            .get(&(direction, channel, name.to_string()))
            .copied()
            .unwrap_or(0.0))
    }

    fn gain_range(&self, direction: Direction, channel: usize) -> Result<Range> {
        self.checked(direction, channel)?;
        Ok(Range::new(0.0, 60.0).with_step(1.0))
    }

    fn gain_element_range(&self, direction: Direction, channel: usize, _name: &str) -> Result<Range> {
        self.checked(direction, channel)?;
        Ok(Range::new(0.0, 30.0).with_step(1.0))
    }

    fn set_frequency(&self, direction: Direction, channel: usize, frequency: f64, _args: &Kwargs) -> Result<()> {
        let mut state = self.checked(direction, channel)?;
        if !Range::new(1e6, 6e9).contains(frequency) {
            bail!("Frequency {} Hz out of range on {}", frequency, self.serial);
        }
        state.frequencies.insert((direction, channel), frequency);
        Ok(())
    }

    fn set_frequency_component(
        &self,
        direction: Direction,
        channel: usize,
        name: &str,
        frequency: f64,
        _args: &Kwargs,
    ) -> Result<()> {
        self.checked(direction, channel)?
            .frequency_components
            .insert((direction, channel, name.to_string()), frequency);
        Ok(())
    }

    fn frequency(&self, direction: Direction, channel: usize) -> Result<f64> {
        let state = self.checked(direction, channel)?;
        Ok(state.frequencies.get(&(direction, channel)).copied().unwrap_or(100e6))
    }

    fn frequency_component(&self, direction: Direction, channel: usize, name: &str) -> Result<f64> {
        let state = self.checked(direction, channel)?;
        Ok(state
            .frequency_components
            .get(&(direction, channel, name.to_string()))
            .copied()
            .unwrap_or(0.0))
    }

    fn list_frequencies(&self, direction: Direction, channel: usize) -> Result<Vec<String>> {
        self.checked(direction, channel)?;
        Ok(vec!["RF".to_string(), "BB".to_string()])
    }

    fn frequency_range(&self, direction: Direction, channel: usize) -> Result<Vec<Range>> {
        self.checked(direction, channel)?;
        Ok(vec![Range::new(1e6, 6e9)])
    }

    fn frequency_component_range(&self, direction: Direction, channel: usize, _name: &str) -> Result<Vec<Range>> {
        self.checked(direction, channel)?;
        Ok(vec![Range::new(-30e6, 30e6)])
    }

    fn set_sample_rate(&self, direction: Direction, channel: usize, rate: f64) -> Result<()> {
        self.checked(direction, channel)?
            .sample_rates
            .insert((direction, channel), rate);
        Ok(())
    }

    fn sample_rate(&self, direction: Direction, channel: usize) -> Result<f64> {
        let state = self.checked(direction, channel)?;
        Ok(state.sample_rates.get(&(direction, channel)).copied().unwrap_or(1e6))
    }

    fn list_sample_rates(&self, direction: Direction, channel: usize) -> Result<Vec<f64>> {
        self.checked(direction, channel)?;
        Ok(vec![1e6, 2e6, 4e6])
    }

    fn sample_rate_range(&self, direction: Direction, channel: usize) -> Result<Vec<Range>> {
        self.checked(direction, channel)?;
        Ok(vec![Range::new(1e5, 61.44e6)])
    }

    fn set_bandwidth(&self, direction: Direction, channel: usize, bandwidth: f64) -> Result<()> {
        self.checked(direction, channel)?
            .bandwidths
            .insert((direction, channel), bandwidth);
        Ok(())
    }

    fn bandwidth(&self, direction: Direction, channel: usize) -> Result<f64> {
        let state = self.checked(direction, channel)?;
        Ok(state.bandwidths.get(&(direction, channel)).copied().unwrap_or(1e6))
    }

    fn bandwidth_range(&self, direction: Direction, channel: usize) -> Result<Vec<Range>> {
        self.checked(direction, channel)?;
        Ok(vec![Range::new(2e5, 56e6)])
    }

    // Clocking and time

    fn set_master_clock_rate(&self, rate: f64) -> Result<()> {
        self.record(format!("master_clock_rate {}", rate));
        self.state().master_clock_rate = rate;
        Ok(())
    }

    fn master_clock_rate(&self) -> f64 {
        self.state().master_clock_rate
    }

    fn master_clock_rates(&self) -> Vec<Range> {
        vec![Range::new(1e6, 61.44e6)]
    }

    fn list_clock_sources(&self) -> Vec<String> {
        self.script.clock_sources.clone()
    }

    fn set_clock_source(&self, source: &str) -> Result<()> {
        self.record(format!("clock_source {}", source));
        if !self.script.clock_sources.iter().any(|s| s == source) {
            bail!("Clock source '{}' not available on {}", source, self.serial);
        }
        self.state().clock_source = source.to_string();
        Ok(())
    }

    fn clock_source(&self) -> String {
        self.state().clock_source.clone()
    }

    fn list_time_sources(&self) -> Vec<String> {
        vec!["none".to_string(), "pps".to_string()]
    }

    fn set_time_source(&self, source: &str) -> Result<()> {
        self.record(format!("time_source {}", source));
        if source != "none" && source != "pps" {
            bail!("Time source '{}' not available on {}", source, self.serial);
        }
        self.state().time_source = source.to_string();
        Ok(())
    }

    fn time_source(&self) -> String {
        self.state().time_source.clone()
    }

    fn has_hardware_time(&self, what: &str) -> bool {
        what.is_empty()
    }

    fn hardware_time(&self, what: &str) -> Result<i64> {
        if !what.is_empty() {
            bail!("Unknown time register '{}'", what);
        }
        Ok(self.state().hardware_time)
    }

    fn set_hardware_time(&self, time_ns: i64, what: &str) -> Result<()> {
        if !what.is_empty() {
            bail!("Unknown time register '{}'", what);
        }
        self.record(format!("hardware_time {}", time_ns));
        self.state().hardware_time = time_ns;
        Ok(())
    }

    fn set_command_time(&self, time_ns: i64, _what: &str) -> Result<()> {
        self.record(format!("command_time {}", time_ns));
        self.state().command_time = Some(time_ns);
        Ok(())
    }

    // Sensors, registers, settings

    fn list_sensors(&self) -> Vec<String> {
        vec!["temp".to_string()]
    }

    fn sensor_info(&self, key: &str) -> Result<ArgInfo> {
        match key {
            "temp" => Ok(ArgInfo::new("temp", self.script.temperature.clone(), ArgType::Float)
                .with_description("Board temperature")),
            _ => bail!("Unknown sensor '{}' on {}", key, self.serial),
        }
    }

    fn read_sensor(&self, key: &str) -> Result<String> {
        match key {
            "temp" => Ok(self.script.temperature.clone()),
            _ => bail!("Unknown sensor '{}' on {}", key, self.serial),
        }
    }

    fn list_channel_sensors(&self, direction: Direction, channel: usize) -> Result<Vec<String>> {
        self.checked(direction, channel)?;
        Ok(vec!["rssi".to_string()])
    }

    fn channel_sensor_info(&self, direction: Direction, channel: usize, key: &str) -> Result<ArgInfo> {
        self.checked(direction, channel)?;
        match key {
            "rssi" => Ok(ArgInfo::new("rssi", "-50", ArgType::Float)),
            _ => bail!("Unknown channel sensor '{}'", key),
        }
    }

    fn read_channel_sensor(&self, direction: Direction, channel: usize, key: &str) -> Result<String> {
        self.checked(direction, channel)?;
        match key {
            "rssi" => Ok(format!("{}", -50 - channel as i64)),
            _ => bail!("Unknown channel sensor '{}'", key),
        }
    }

    fn register_interfaces(&self) -> Vec<String> {
        vec!["RFIC".to_string()]
    }

    fn write_named_register(&self, name: &str, addr: u32, value: u32) -> Result<()> {
        if name != "RFIC" {
            bail!("Unknown register interface '{}' on {}", name, self.serial);
        }
        self.state().registers.insert((name.to_string(), addr), value);
        Ok(())
    }

    fn read_named_register(&self, name: &str, addr: u32) -> Result<u32> {
        if name != "RFIC" {
            bail!("Unknown register interface '{}' on {}", name, self.serial);
        }
        Ok(self.state().registers.get(&(name.to_string(), addr)).copied().unwrap_or(0))
    }

    fn write_register(&self, addr: u32, value: u32) -> Result<()> {
        self.state().registers.insert((String::new(), addr), value);
        Ok(())
    }

    fn read_register(&self, addr: u32) -> Result<u32> {
        Ok(self.state().registers.get(&(String::new(), addr)).copied().unwrap_or(0))
    }

    fn setting_info(&self) -> Vec<ArgInfo> {
        vec![ArgInfo::new("mode", "normal", ArgType::String).with_description("Operating mode")]
    }

    fn write_setting(&self, key: &str, value: &str) -> Result<()> {
        self.state().settings.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn read_setting(&self, key: &str) -> Result<String> {
        match (self.state().settings.get(key), key) {
            (Some(value), _) => Ok(value.clone()),
            (None, "mode") => Ok("normal".to_string()),
            (None, _) => bail!("Unknown setting '{}' on {}", key, self.serial),
        }
    }

    fn channel_setting_info(&self, direction: Direction, channel: usize) -> Result<Vec<ArgInfo>> {
        self.checked(direction, channel)?;
        Ok(vec![ArgInfo::new("lo_offset", "0", ArgType::Float)])
    }

    fn write_channel_setting(&self, direction: Direction, channel: usize, key: &str, value: &str) -> Result<()> {
        self.checked(direction, channel)?
            .channel_settings
            .insert((direction, channel, key.to_string()), value.to_string());
        Ok(())
    }

    fn read_channel_setting(&self, direction: Direction, channel: usize, key: &str) -> Result<String> {
        let state = self.checked(direction, channel)?;
        match (state.channel_settings.get(&(direction, channel, key.to_string())), key) {
            (Some(value), _) => Ok(value.clone()),
            (None, "lo_offset") => Ok("0".to_string()),
            (None, _) => bail!("Unknown channel setting '{}'", key),
        }
    }

    // GPIO, buses, UART

    fn list_gpio_banks(&self) -> Vec<String> {
        vec!["MAIN".to_string()]
    }

    fn write_gpio(&self, bank: &str, value: u32) -> Result<()> {
        if bank != "MAIN" {
            bail!("Unknown GPIO bank '{}' on {}", bank, self.serial);
        }
        self.state().gpio.insert(bank.to_string(), value);
        Ok(())
    }

    fn read_gpio(&self, bank: &str) -> Result<u32> {
        if bank != "MAIN" {
            bail!("Unknown GPIO bank '{}' on {}", bank, self.serial);
        }
        Ok(self.state().gpio.get(bank).copied().unwrap_or(0))
    }

    fn write_gpio_dir(&self, bank: &str, dir: u32) -> Result<()> {
        if bank != "MAIN" {
            bail!("Unknown GPIO bank '{}' on {}", bank, self.serial);
        }
        self.state().gpio_dir.insert(bank.to_string(), dir);
        Ok(())
    }

    fn read_gpio_dir(&self, bank: &str) -> Result<u32> {
        if bank != "MAIN" {
            bail!("Unknown GPIO bank '{}' on {}", bank, self.serial);
        }
        Ok(self.state().gpio_dir.get(bank).copied().unwrap_or(0))
    }

    fn write_i2c(&self, addr: i32, data: &[u8]) -> Result<()> {
        self.state().i2c.insert(addr, data.to_vec());
        Ok(())
    }

    fn read_i2c(&self, addr: i32, num_bytes: usize) -> Result<Vec<u8>> {
        let mut data = self.state().i2c.get(&addr).cloned().unwrap_or_default();
        data.resize(num_bytes, 0);
        Ok(data)
    }

    fn transact_spi(&self, addr: i32, data: u32, num_bits: usize) -> Result<u32> {
        self.record(format!("spi {} {:#x} {}", addr, data, num_bits));
        Ok(data)
    }

    fn list_uarts(&self) -> Vec<String> {
        vec!["CONSOLE".to_string()]
    }

    fn write_uart(&self, which: &str, data: &str) -> Result<()> {
        if which != "CONSOLE" {
            bail!("Unknown UART '{}' on {}", which, self.serial);
        }
        self.state().uart.entry(which.to_string()).or_default().push_str(data);
        Ok(())
    }

    fn read_uart(&self, which: &str, _timeout_us: i64) -> Result<String> {
        if which != "CONSOLE" {
            bail!("Unknown UART '{}' on {}", which, self.serial);
        }
        Ok(self.state().uart.remove(which).unwrap_or_default())
    }
}
