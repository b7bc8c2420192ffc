//! Environment-backed configuration helpers.
//!
//! Services build their config struct once at startup from an [`Env`] and pass it
//! down explicitly. [`Env::from_lookup`] lets tests supply variables without touching
//! the process environment.

use std::str::FromStr;

/// Errors raised while loading configuration. These are the only fatal startup errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required env var {0}")]
    Missing(String),
    #[error("invalid value for {name}: {reason}")]
    Invalid { name: String, reason: String },
}

/// Source of configuration variables.
pub struct Env<F>
where
    F: Fn(&str) -> Option<String>,
{
    lookup: F,
}

impl Env<fn(&str) -> Option<String>> {
    /// Read from the process environment.
    pub fn process() -> Self {
        Self {
            lookup: |name| std::env::var(name).ok(),
        }
    }
}

impl<F> Env<F>
where
    F: Fn(&str) -> Option<String>,
{
    pub fn from_lookup(lookup: F) -> Self {
        Self { lookup }
    }

    /// Value of `name`, treating empty strings as unset.
    pub fn optional(&self, name: &str) -> Option<String> {
        (self.lookup)(name).filter(|v| !v.trim().is_empty())
    }

    pub fn required(&self, name: &str) -> Result<String, ConfigError> {
        self.optional(name)
            .ok_or_else(|| ConfigError::Missing(name.to_owned()))
    }

    pub fn string_or(&self, name: &str, default: &str) -> String {
        self.optional(name).unwrap_or_else(|| default.to_owned())
    }

    /// Parse `name` if set, otherwise return `default`. A set but unparsable value is an error.
    pub fn parse_or<T>(&self, name: &str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.optional(name) {
            Some(raw) => parse_value(name, &raw),
            None => Ok(default),
        }
    }

    /// Required comma-separated list; blank entries are skipped.
    pub fn required_list<T>(&self, name: &str) -> Result<Vec<T>, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        let raw = self.required(name)?;
        let items = raw
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| parse_value(name, s))
            .collect::<Result<Vec<T>, _>>()?;
        if items.is_empty() {
            return Err(ConfigError::Missing(name.to_owned()));
        }
        Ok(items)
    }
}

fn parse_value<T>(name: &str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
        name: name.to_owned(),
        reason: format!("{raw:?}: {e}"),
    })
}
