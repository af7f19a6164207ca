//! Minimal reader for the INI-style `transformations` column.

use std::collections::HashMap;

use crate::error::{Error, Result};

pub type Section = HashMap<String, String>;

/// Parse `[section]` headers and `key=value` lines. Blank lines and `;`/`#`
/// comments are skipped; lines before the first header are ignored.
pub fn parse_sections(text: &str) -> Result<HashMap<String, Section>> {
    let mut sections: HashMap<String, Section> = HashMap::new();
    let mut current: Option<String> = None;

    for (number, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with(';') || line.starts_with('#') {
            continue;
        }

        if let Some(header) = line.strip_prefix('[') {
            let name = header.strip_suffix(']').ok_or_else(|| {
                Error::MalformedDescriptor(format!("line {}: unterminated section header", number + 1))
            })?;
            let name = name.trim().to_string();
            sections.entry(name.clone()).or_default();
            current = Some(name);
            continue;
        }

        let (key, value) = line.split_once('=').ok_or_else(|| {
            Error::MalformedDescriptor(format!("line {}: expected key=value, got {:?}", number + 1, line))
        })?;

        if let Some(section) = current.as_ref().and_then(|name| sections.get_mut(name)) {
            section.insert(key.trim().to_string(), value.trim().to_string());
        }
    }

    Ok(sections)
}

pub fn required<'a>(section: &'a Section, name: &str, key: &str) -> Result<&'a str> {
    section
        .get(key)
        .map(String::as_str)
        .ok_or_else(|| Error::MalformedDescriptor(format!("[{}] is missing {:?}", name, key)))
}

pub fn required_int(section: &Section, name: &str, key: &str) -> Result<i64> {
    let value = required(section, name, key)?;
    value.parse().map_err(|_| {
        Error::MalformedDescriptor(format!("[{}] {} is not an integer: {:?}", name, key, value))
    })
}

/// Parse a `(x, y)` coordinate pair.
pub fn point(value: &str) -> Result<(i64, i64)> {
    let malformed = || Error::MalformedDescriptor(format!("bad point {:?}", value));

    let inner = value
        .trim()
        .strip_prefix('(')
        .and_then(|v| v.strip_suffix(')'))
        .ok_or_else(malformed)?;
    let (x, y) = inner.split_once(',').ok_or_else(malformed)?;
    let x = x.trim().parse().map_err(|_| malformed())?;
    let y = y.trim().parse().map_err(|_| malformed())?;
    Ok((x, y))
}
