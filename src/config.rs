use anyhow::{bail, Context, Result};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::hal::types::{Direction, Kwargs};

/// Stream section of a run: what to open on the aggregate and how much to read
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    pub direction: Direction,
    pub format: String,
    /// Global channels; empty selects every channel of the aggregate
    pub channels: Vec<usize>,
    pub num_elems: usize,
    pub reads: usize,
    pub timeout_us: i64,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            direction: Direction::Input,
            format: "CS16".to_string(),
            channels: Vec::new(),
            num_elems: 1024,
            reads: 4,
            timeout_us: 100_000,
        }
    }
}

/// One demo run: the flat aggregate arguments plus the stream to exercise
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    #[serde(deserialize_with = "stringified_args")]
    pub args: Kwargs,
    #[serde(default)]
    pub stream: StreamConfig,
}

/// Accept numbers and booleans in the argument map, storing their text
fn stringified_args<'de, D>(deserializer: D) -> std::result::Result<Kwargs, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = BTreeMap::<String, serde_json::Value>::deserialize(deserializer)?;
    raw.into_iter()
        .map(|(key, value)| {
            let text = match value {
                serde_json::Value::String(s) => s,
                serde_json::Value::Number(n) => n.to_string(),
                serde_json::Value::Bool(b) => b.to_string(),
                serde_json::Value::Null => String::new(),
                other => {
                    return Err(serde::de::Error::custom(format!(
                        "argument '{}' must be a scalar, got {}",
                        key, other
                    )))
                }
            };
            Ok((key, text))
        })
        .collect()
}

impl RunConfig {
    pub fn from_json(value: serde_json::Value) -> Result<Self> {
        let config: RunConfig =
            serde_json::from_value(value).context("Failed to parse run configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Load a run configuration from a JSON file
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = fs::read_to_string(path)
            .context(format!("Failed to read run configuration from {:?}", path))?;
        let value: serde_json::Value = serde_json::from_str(&json)
            .context(format!("Invalid JSON in {:?}", path))?;
        Self::from_json(value)
    }

    fn validate(&self) -> Result<()> {
        if self.stream.num_elems == 0 {
            bail!("stream.num_elems must be positive");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    #[test]
    fn test_scalars_are_stringified() {
        let config = RunConfig::from_json(json!({
            "args": {"driver[0]": "mock", "rx_channels[0]": 3, "setup_error": true}
        }))
        .unwrap();

        assert_eq!(config.args["rx_channels[0]"], "3");
        assert_eq!(config.args["setup_error"], "true");
        assert_eq!(config.stream, StreamConfig::default());
    }

    #[test]
    fn test_nested_args_are_rejected() {
        let result = RunConfig::from_json(json!({"args": {"driver[0]": ["mock"]}}));
        assert!(result.is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"args": {{"driver[0]": "mock"}}, "stream": {{"direction": "output", "reads": 2}}}}"#
        )
        .unwrap();

        let config = RunConfig::from_json_file(file.path()).unwrap();
        assert_eq!(config.stream.direction, Direction::Output);
        assert_eq!(config.stream.reads, 2);
        assert_eq!(config.stream.format, "CS16");
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(RunConfig::from_json_file(dir.path().join("absent.json")).is_err());
    }
}
