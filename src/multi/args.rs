use anyhow::Result;

use super::names::{decode, encode, is_indexed};
use crate::error::AggregateError;
use crate::hal::types::Kwargs;

/// Inserted into every per-device map so the multi driver never expands
/// the same arguments twice
pub const GUARD_KEY: &str = "multi_no_deeper";

/// Keys with this prefix are meant for the member devices, not the aggregate
pub const LOCAL_PREFIX: &str = "multi:";

/// Most member devices one aggregate may name; `key[i]` needs `i` below this
pub const MAX_DEVICES: usize = 64;

/// Keys that select the aggregate itself and are never forwarded as-is
const FILTER_KEYS: [&str; 2] = ["driver", "type"];

/// The per-device index a key targets, looking through the local prefix
fn key_index(key: &str) -> Option<usize> {
    let key = key.strip_prefix(LOCAL_PREFIX).unwrap_or(key);
    if is_indexed(key) {
        decode(key).ok().map(|(_, index)| index)
    } else {
        None
    }
}

/// Highest device index named by any `key[index]` entry
pub fn max_index(args: &Kwargs) -> Option<usize> {
    args.keys().filter_map(|key| key_index(key)).max()
}

/// Split one flat argument map into one map per device.
///
/// Returns an empty list when no key is indexed, and `IndexOutOfRange`
/// when an index reaches `MAX_DEVICES`. Within each output map
/// the most specific entry wins: plain keys first, then `multi:` keys with
/// the prefix stripped, then `key[i]` entries for that device. `driver` and
/// `type` are dropped unless prefixed or indexed. Every map carries
/// `GUARD_KEY`.
pub fn translate(args: &Kwargs) -> Result<Vec<Kwargs>> {
    if args.contains_key(GUARD_KEY) {
        return Err(AggregateError::Recursion(GUARD_KEY.to_string()).into());
    }
    let count = match max_index(args) {
        Some(max) if max < MAX_DEVICES => max + 1,
        Some(max) => {
            return Err(AggregateError::out_of_range("device", max, MAX_DEVICES).into())
        }
        None => return Ok(Vec::new()),
    };

    let mut globals = Kwargs::new();
    let mut overrides = Kwargs::new();
    let mut indexed: Vec<(usize, String, String)> = Vec::new();

    for (key, value) in args {
        let (local, name) = match key.strip_prefix(LOCAL_PREFIX) {
            Some(stripped) => (true, stripped),
            None => (false, key.as_str()),
        };

        if is_indexed(name) {
            let (base, index) = decode(name)?;
            indexed.push((index, base, value.clone()));
        } else if local {
            overrides.insert(name.to_string(), value.clone());
        } else if !FILTER_KEYS.contains(&name) {
            globals.insert(name.to_string(), value.clone());
        }
    }

    let mut translated = vec![globals; count];
    for device_args in translated.iter_mut() {
        device_args.extend(overrides.iter().map(|(k, v)| (k.clone(), v.clone())));
    }
    for (index, base, value) in indexed {
        translated[index].insert(base, value);
    }
    for device_args in translated.iter_mut() {
        device_args.insert(GUARD_KEY.to_string(), String::new());
    }

    Ok(translated)
}

/// Fold per-device discovery results into one aggregate candidate.
///
/// `results[i]` holds the candidates found for device `i`; the first one
/// is used. Any device without a candidate discards the aggregate.
/// `driver` and `type` come back as `multi:driver` and `multi:type` so the
/// merged map can be fed straight back into construction.
pub fn merge_discovered(results: &[Vec<Kwargs>]) -> Option<Kwargs> {
    if results.is_empty() {
        return None;
    }

    let mut merged = Kwargs::new();
    for (index, candidates) in results.iter().enumerate() {
        let first = candidates.first()?;
        for (key, value) in first {
            if key == GUARD_KEY {
                continue;
            }
            let key = if FILTER_KEYS.contains(&key.as_str()) {
                format!("{}{}", LOCAL_PREFIX, key)
            } else {
                key.clone()
            };
            merged.insert(encode(&key, index), value.clone());
        }
    }
    Some(merged)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kwargs(pairs: &[(&str, &str)]) -> Kwargs {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_indexed_beats_override_beats_global() {
        let args = kwargs(&[("rate", "1"), ("multi:rate", "2"), ("rate[1]", "3")]);
        let translated = translate(&args).unwrap();
        assert_eq!(translated.len(), 2);
        assert_eq!(translated[0]["rate"], "2");
        assert_eq!(translated[1]["rate"], "3");
    }

    #[test]
    fn test_prefixed_indexed_key_routes_to_its_device() {
        let args = kwargs(&[("multi:driver[0]", "mock"), ("serial[1]", "B")]);
        let translated = translate(&args).unwrap();
        assert_eq!(translated[0].get("driver").map(String::as_str), Some("mock"));
        assert!(!translated[1].contains_key("driver"));
        assert_eq!(max_index(&args), Some(1));
    }

    #[test]
    fn test_merge_requires_every_index() {
        let found = vec![kwargs(&[("serial", "A")])];
        assert!(merge_discovered(&[found.clone(), Vec::new()]).is_none());
        assert!(merge_discovered(&[]).is_none());

        let merged = merge_discovered(&[found.clone(), found]).unwrap();
        assert_eq!(merged, kwargs(&[("serial[0]", "A"), ("serial[1]", "A")]));
    }
}
