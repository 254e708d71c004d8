//! Batch files: several builds described in one TOML document.
//!
//! ```toml
//! [DEFAULT]
//! app = "geolocate"
//! version = "1.3.0"
//! source_git = "https://github.com/dante-signal31/${app}, master"
//!
//! [Ubuntu-package]
//! profile = "ubuntu-trusty"
//!
//! [Centos7-package]
//! profile = "centos7"
//! ```
//!
//! Keys of `[DEFAULT]` are inherited by every other section. `${key}` expands
//! to another key of the same section, `${section:key}` to a key of another
//! section, and `$$` is a literal `$`.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::config::{RawParameters, RawValue};
use crate::error::{ConfigError, IoContext, Result};

/// Name of the section inherited by all others.
pub const DEFAULT_SECTION: &str = "DEFAULT";

const MAX_INTERPOLATION_DEPTH: usize = 10;

/// One section of a batch file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchEntry {
    pub section: String,
    pub parameters: RawParameters,
}

/// Read and parse a batch file.
pub fn read(path: &Path) -> Result<Vec<BatchEntry>> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("reading batch file '{}'", path.display()))?;
    Ok(parse(&text)?)
}

/// Parse batch file text; sections are returned in file order.
pub fn parse(text: &str) -> std::result::Result<Vec<BatchEntry>, ConfigError> {
    let document: toml::Table =
        toml::from_str(text).map_err(|e| ConfigError::Batch(e.to_string()))?;

    let mut defaults = RawParameters::new();
    let mut sections: Vec<(String, RawParameters)> = Vec::new();
    for (name, value) in document {
        let toml::Value::Table(table) = value else {
            return Err(ConfigError::Batch(format!(
                "top-level key '{name}' must be a section table"
            )));
        };
        let parameters = table
            .into_iter()
            .map(|(key, value)| {
                let raw = raw_value(&name, &key, value)?;
                Ok((key, raw))
            })
            .collect::<std::result::Result<RawParameters, ConfigError>>()?;
        if name == DEFAULT_SECTION {
            defaults = parameters;
        } else {
            sections.push((name, parameters));
        }
    }

    let merged: Vec<(String, RawParameters)> = sections
        .into_iter()
        .map(|(name, parameters)| {
            let mut all = defaults.clone();
            all.extend(parameters);
            (name, all)
        })
        .collect();

    let mut lookup: BTreeMap<&str, &RawParameters> =
        merged.iter().map(|(name, p)| (name.as_str(), p)).collect();
    lookup.insert(DEFAULT_SECTION, &defaults);

    merged
        .iter()
        .map(|(name, parameters)| {
            let expanded = parameters
                .iter()
                .map(|(key, value)| {
                    let value = expand_value(value, name, &lookup, 0)?;
                    Ok((key.clone(), value))
                })
                .collect::<std::result::Result<RawParameters, ConfigError>>()?;
            Ok(BatchEntry {
                section: name.clone(),
                parameters: expanded,
            })
        })
        .collect()
}

fn raw_value(
    section: &str,
    key: &str,
    value: toml::Value,
) -> std::result::Result<RawValue, ConfigError> {
    let invalid = |what: &str| {
        ConfigError::Batch(format!("[{section}] {key}: {what}"))
    };
    match value {
        toml::Value::String(text) => Ok(RawValue::Text(text)),
        toml::Value::Boolean(flag) => Ok(RawValue::Flag(flag)),
        toml::Value::Integer(number) => Ok(RawValue::Text(number.to_string())),
        toml::Value::Array(items) => items
            .into_iter()
            .map(|item| match item {
                toml::Value::String(text) => Ok(text),
                _ => Err(invalid("list items must be strings")),
            })
            .collect::<std::result::Result<Vec<_>, _>>()
            .map(RawValue::List),
        toml::Value::Float(_) => Err(invalid("floating point values are ambiguous, quote them")),
        toml::Value::Datetime(_) | toml::Value::Table(_) => {
            Err(invalid("expected a string, boolean or list of strings"))
        }
    }
}

fn expand_value(
    value: &RawValue,
    section: &str,
    lookup: &BTreeMap<&str, &RawParameters>,
    depth: usize,
) -> std::result::Result<RawValue, ConfigError> {
    match value {
        RawValue::Flag(_) => Ok(value.clone()),
        RawValue::Text(text) => Ok(RawValue::Text(expand_text(text, section, lookup, depth)?)),
        RawValue::List(items) => items
            .iter()
            .map(|item| expand_text(item, section, lookup, depth))
            .collect::<std::result::Result<Vec<_>, _>>()
            .map(RawValue::List),
    }
}

fn expand_text(
    text: &str,
    section: &str,
    lookup: &BTreeMap<&str, &RawParameters>,
    depth: usize,
) -> std::result::Result<String, ConfigError> {
    if depth > MAX_INTERPOLATION_DEPTH {
        return Err(ConfigError::Batch(format!(
            "[{section}] interpolation deeper than {MAX_INTERPOLATION_DEPTH} levels in '{text}'"
        )));
    }

    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(pos) = rest.find('$') {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + 1..];
        if let Some(tail) = after.strip_prefix('$') {
            out.push('$');
            rest = tail;
        } else if let Some(tail) = after.strip_prefix('{') {
            let end = tail.find('}').ok_or_else(|| {
                ConfigError::Batch(format!("[{section}] unterminated reference in '{text}'"))
            })?;
            let reference = &tail[..end];
            let (target_section, key) = reference.split_once(':').unwrap_or((section, reference));
            let target = lookup.get(target_section).ok_or_else(|| {
                ConfigError::Batch(format!("[{section}] unknown section in '${{{reference}}}'"))
            })?;
            let referenced = target.get(key).ok_or_else(|| {
                ConfigError::Batch(format!("[{section}] unknown key in '${{{reference}}}'"))
            })?;
            let expanded = expand_value(referenced, target_section, lookup, depth + 1)?;
            out.push_str(&flatten(&expanded));
            rest = &tail[end + 1..];
        } else {
            return Err(ConfigError::Batch(format!(
                "[{section}] '$' must be followed by '$' or '{{' in '{text}'"
            )));
        }
    }
    out.push_str(rest);
    Ok(out)
}

fn flatten(value: &RawValue) -> String {
    match value {
        RawValue::Flag(flag) => flag.to_string(),
        RawValue::Text(text) => text.clone(),
        RawValue::List(items) => items.join(", "),
    }
}
