use anyhow::Result;

use crate::error::AggregateError;

/// Positions of the last `[` and the last `]` when they enclose a
/// non-empty run of decimal digits
fn bracket_span(name: &str) -> Option<(usize, usize)> {
    let open = name.rfind('[')?;
    let close = name.rfind(']')?;
    if close <= open + 1 {
        return None;
    }
    let digits = &name[open + 1..close];
    if digits.bytes().all(|b| b.is_ascii_digit()) {
        Some((open, close))
    } else {
        None
    }
}

/// Encode a per-device name as `name[index]`
pub fn encode(name: &str, index: usize) -> String {
    format!("{}[{}]", name, index)
}

/// True when `name` ends its last bracket pair with only digits inside,
/// e.g. `gain[2]`. `name[]` is not indexed.
pub fn is_indexed(name: &str) -> bool {
    bracket_span(name).is_some()
}

/// Split `name[index]` into its base name and index
pub fn decode(name: &str) -> Result<(String, usize)> {
    let (open, close) =
        bracket_span(name).ok_or_else(|| AggregateError::Format(name.to_string()))?;
    let index = name[open + 1..close]
        .parse::<usize>()
        .map_err(|_| AggregateError::Format(name.to_string()))?;
    Ok((name[..open].to_string(), index))
}

/// Split a comma separated list, trimming whitespace around each field.
///
/// Interior empty fields are kept. A lone trailing separator does not
/// produce an empty last field.
pub fn csv_split(input: &str) -> Vec<String> {
    let mut fields: Vec<&str> = input.split(',').collect();
    if fields.last().map_or(false, |last| last.is_empty()) {
        fields.pop();
    }
    fields.into_iter().map(|f| f.trim().to_string()).collect()
}

/// Join values as a comma separated list with `", "`
pub fn csv_join<S: AsRef<str>>(values: &[S]) -> String {
    values
        .iter()
        .map(AsRef::as_ref)
        .collect::<Vec<_>>()
        .join(", ")
}
