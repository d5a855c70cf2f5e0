use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Flat string-keyed argument map used for construction, discovery and
/// stream/frequency options.
pub type Kwargs = BTreeMap<String, String>;

/// Stream direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Input,
    Output,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Input => write!(f, "input"),
            Direction::Output => write!(f, "output"),
        }
    }
}

/// Numeric range with optional step (0.0 = continuous)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Range {
    pub minimum: f64,
    pub maximum: f64,
    pub step: f64,
}

impl Range {
    pub fn new(minimum: f64, maximum: f64) -> Self {
        Self {
            minimum,
            maximum,
            step: 0.0,
        }
    }

    pub fn with_step(mut self, step: f64) -> Self {
        self.step = step;
        self
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.minimum && value <= self.maximum
    }
}

/// Value type of a described argument
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArgType {
    Bool,
    Int,
    Float,
    String,
}

/// Description of a setting or stream argument
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArgInfo {
    pub key: String,
    pub value: String,
    pub name: String,
    pub description: String,
    pub units: String,
    pub arg_type: ArgType,
    pub range: Option<Range>,
    pub options: Vec<String>,
}

impl ArgInfo {
    pub fn new(key: impl Into<String>, value: impl Into<String>, arg_type: ArgType) -> Self {
        let key = key.into();
        Self {
            name: key.clone(),
            key,
            value: value.into(),
            description: String::new(),
            units: String::new(),
            arg_type,
            range: None,
            options: Vec::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

bitflags! {
    /// In/out flags carried by stream calls.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct StreamFlags: u32 {
        /// Last buffer of a burst.
        const END_BURST      = 1 << 1;
        /// The time argument is valid.
        const HAS_TIME       = 1 << 2;
        /// Burst ended abruptly (overflow/underflow).
        const END_ABRUPT     = 1 << 3;
        /// Transfer at most one packet.
        const ONE_PACKET     = 1 << 4;
        /// More fragments of this packet follow.
        const MORE_FRAGMENTS = 1 << 5;
        /// Wait for an external trigger.
        const WAIT_TRIGGER   = 1 << 6;
    }
}

/// Opaque stream token handed out by `Device::setup_stream`.
///
/// Owned by whoever opened the stream; `Device::close_stream` consumes it.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct StreamHandle(u64);

impl StreamHandle {
    /// Wrap a device-chosen token. Only device implementations create handles.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn id(&self) -> u64 {
        self.0
    }
}

/// Outcome of a successful read call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadResult {
    /// Elements read per channel (0 means nothing was transferred)
    pub elems: usize,
    pub flags: StreamFlags,
    pub time_ns: i64,
}

/// Outcome of a successful write call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteResult {
    pub elems: usize,
    pub flags: StreamFlags,
}

/// A stream status event (burst ack, late packet, ...)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatusEvent {
    pub flags: StreamFlags,
    pub time_ns: i64,
}

/// A direct-access read buffer acquired from a stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadBuffer {
    pub handle: usize,
    pub elems: usize,
    pub flags: StreamFlags,
    pub time_ns: i64,
}

/// A direct-access write buffer acquired from a stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteBuffer {
    pub handle: usize,
    pub elems: usize,
}

/// Size in bytes of one element of a stream format string (`"CF32"`, `"CS16"`, ...)
pub fn format_size(format: &str) -> Option<usize> {
    let (complex, rest) = match format.strip_prefix('C') {
        Some(rest) => (true, rest),
        None => (false, format),
    };
    let bits: usize = rest
        .trim_start_matches(|c: char| c.is_ascii_alphabetic())
        .parse()
        .ok()?;
    let total_bits = if complex { bits * 2 } else { bits };
    if total_bits == 0 || total_bits % 8 != 0 {
        return None;
    }
    Some(total_bits / 8)
}
