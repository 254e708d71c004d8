//! `{NAME}` environment placeholders in configuration values.
//!
//! `{{` and `}}` produce literal braces. Substitution happens once, when a
//! build specification is constructed, against a snapshot of the process
//! environment taken at that moment.

use std::collections::BTreeMap;

use crate::error::ConfigError;

/// Frozen copy of environment variables.
#[derive(Debug, Clone, Default)]
pub struct EnvSnapshot {
    vars: BTreeMap<String, String>,
}

impl EnvSnapshot {
    /// Capture the current process environment. Non-UTF-8 entries are skipped.
    pub fn capture() -> Self {
        let vars = std::env::vars_os()
            .filter_map(|(key, value)| Some((key.into_string().ok()?, value.into_string().ok()?)))
            .collect();
        Self { vars }
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            vars: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.vars.get(name).map(String::as_str)
    }
}

/// Replace every `{NAME}` in `value` with the variable's value.
pub fn interpolate(
    field: &'static str,
    value: &str,
    env: &EnvSnapshot,
) -> Result<String, ConfigError> {
    let unbalanced = || ConfigError::UnbalancedPlaceholder {
        field,
        value: value.to_string(),
    };

    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                out.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                out.push('}');
            }
            '{' => {
                let mut name = String::new();
                loop {
                    match chars.next() {
                        Some('}') => break,
                        Some('{') | None => return Err(unbalanced()),
                        Some(ch) => name.push(ch),
                    }
                }
                let resolved =
                    env.get(&name)
                        .ok_or_else(|| ConfigError::UnknownEnvironmentVariable {
                            field,
                            variable: name.clone(),
                        })?;
                out.push_str(resolved);
            }
            '}' => return Err(unbalanced()),
            other => out.push(other),
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env() -> EnvSnapshot {
        EnvSnapshot::from_pairs([("BUILD_NUMBER", "42"), ("HOME", "/home/ci")])
    }

    #[test]
    fn test_plain_value_unchanged() {
        assert_eq!(interpolate("version", "1.0", &env()).unwrap(), "1.0");
    }

    #[test]
    fn test_substitutes_variables() {
        assert_eq!(
            interpolate("version", "1.0.{BUILD_NUMBER}", &env()).unwrap(),
            "1.0.42"
        );
        assert_eq!(
            interpolate("working_dir", "{HOME}/src/{BUILD_NUMBER}", &env()).unwrap(),
            "/home/ci/src/42"
        );
    }

    #[test]
    fn test_escaped_braces() {
        assert_eq!(
            interpolate("pip_args", "--opt={{x}}", &env()).unwrap(),
            "--opt={x}"
        );
    }

    #[test]
    fn test_unset_variable_is_error() {
        let err = interpolate("version", "{NOPE}", &env()).unwrap_err();
        assert_eq!(
            err,
            ConfigError::UnknownEnvironmentVariable {
                field: "version",
                variable: "NOPE".to_string()
            }
        );
    }

    #[test]
    fn test_unbalanced_braces_are_errors() {
        assert!(matches!(
            interpolate("version", "{BUILD_NUMBER", &env()),
            Err(ConfigError::UnbalancedPlaceholder { .. })
        ));
        assert!(matches!(
            interpolate("version", "1.0}", &env()),
            Err(ConfigError::UnbalancedPlaceholder { .. })
        ));
    }
}
