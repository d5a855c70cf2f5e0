//! Error kinds raised by the aggregation layer itself.
//!
//! Failures reported by an underlying device are never wrapped: they travel
//! back to the caller as the same `anyhow::Error` the device produced. The
//! types here cover what the aggregate detects on its own (bad names, bad
//! indexes, recursion) and the stream return codes every device speaks.
//! Both are `std::error::Error`, so they ride inside `anyhow::Error` and can
//! be recovered with `downcast_ref`.

use thiserror::Error;

/// Failures detected by the aggregate before or around a forwarded call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AggregateError {
    /// A name was expected in `name[index]` form but was not.
    #[error("'{0}' is not in name[index] format")]
    Format(String),

    /// A channel, device or buffer index is past the end of its sequence.
    #[error("{what} index {index} out of range (0..{len})")]
    IndexOutOfRange {
        what: &'static str,
        index: usize,
        len: usize,
    },

    /// The recursion guard key was already present in the arguments.
    #[error("arguments already expanded for a multi-device (guard key '{0}' present)")]
    Recursion(String),

    /// Construction was requested without any `name[index]` keys.
    #[error("no indexed arguments: a multi-device needs keys of the form name[index]")]
    NoIndexedArgs,

    /// Direct buffer access only works when one device backs the stream.
    #[error("direct buffer access is not supported across {groups} device streams")]
    UnsupportedMultiDevice { groups: usize },

    /// The stream handle does not belong to this aggregate or was closed.
    #[error("unknown stream handle {0}")]
    UnknownStream(u64),

    /// The caller supplied fewer buffers than the stream has channels.
    #[error("stream has {expected} channels but {actual} buffers were supplied")]
    ChannelCountMismatch { expected: usize, actual: usize },
}

impl AggregateError {
    pub(crate) fn out_of_range(what: &'static str, index: usize, len: usize) -> Self {
        AggregateError::IndexOutOfRange { what, index, len }
    }
}

/// Stream return codes shared by every device.
///
/// The integer values are the ones carried over C-style stream APIs and are
/// stable: a device bridging such an API can convert in both directions.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamCode {
    #[error("stream timeout")]
    Timeout,
    #[error("stream error")]
    StreamError,
    #[error("stream corruption")]
    Corruption,
    #[error("stream overflow")]
    Overflow,
    #[error("operation not supported")]
    NotSupported,
    #[error("stream time error")]
    TimeError,
    #[error("stream underflow")]
    Underflow,
}

impl StreamCode {
    pub fn code(self) -> i32 {
        match self {
            StreamCode::Timeout => -1,
            StreamCode::StreamError => -2,
            StreamCode::Corruption => -3,
            StreamCode::Overflow => -4,
            StreamCode::NotSupported => -5,
            StreamCode::TimeError => -6,
            StreamCode::Underflow => -7,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            -1 => Some(StreamCode::Timeout),
            -2 => Some(StreamCode::StreamError),
            -3 => Some(StreamCode::Corruption),
            -4 => Some(StreamCode::Overflow),
            -5 => Some(StreamCode::NotSupported),
            -6 => Some(StreamCode::TimeError),
            -7 => Some(StreamCode::Underflow),
            _ => None,
        }
    }

    /// Parse the lowercase name used in configuration maps (`"timeout"`, ...).
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "timeout" => Some(StreamCode::Timeout),
            "stream_error" | "error" => Some(StreamCode::StreamError),
            "corruption" => Some(StreamCode::Corruption),
            "overflow" => Some(StreamCode::Overflow),
            "not_supported" => Some(StreamCode::NotSupported),
            "time_error" => Some(StreamCode::TimeError),
            "underflow" => Some(StreamCode::Underflow),
            _ => None,
        }
    }
}

/// Stream code carried by an error, if it is one.
pub fn stream_code(err: &anyhow::Error) -> Option<StreamCode> {
    err.downcast_ref::<StreamCode>().copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_codes_are_stable() {
        for code in [
            StreamCode::Timeout,
            StreamCode::StreamError,
            StreamCode::Corruption,
            StreamCode::Overflow,
            StreamCode::NotSupported,
            StreamCode::TimeError,
            StreamCode::Underflow,
        ] {
            assert!(code.code() < 0);
            assert_eq!(StreamCode::from_code(code.code()), Some(code));
        }
        assert_eq!(StreamCode::from_code(0), None);
        assert_eq!(StreamCode::from_name("Overflow"), Some(StreamCode::Overflow));
    }

    #[test]
    fn test_kinds_survive_anyhow() {
        let err: anyhow::Error = AggregateError::NoIndexedArgs.into();
        assert_eq!(
            err.downcast_ref::<AggregateError>(),
            Some(&AggregateError::NoIndexedArgs)
        );

        let err: anyhow::Error = StreamCode::Timeout.into();
        assert_eq!(stream_code(&err), Some(StreamCode::Timeout));
    }
}
