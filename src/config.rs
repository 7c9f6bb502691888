//! Opaque key/value configuration
//!
//! Keys are case-insensitive. Values are kept as strings and interpreted
//! by typed getters at the point of use.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while reading configuration values
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
	/// Required key is absent
	#[error("Missing configuration value for '{key}'")]
	MissingValue { key: String },

	/// Value cannot be interpreted as the requested type
	#[error("Invalid value '{value}' for '{key}': expected {expected}")]
	InvalidValue {
		key: String,
		value: String,
		expected: &'static str,
	},

	/// Argument is not in `key=value` form
	#[error("Malformed configuration argument '{argument}'")]
	MalformedArgument { argument: String },
}

impl ConfigError {
	/// Creates a new MissingValue error
	pub fn missing_value(key: impl Into<String>) -> Self {
		Self::MissingValue { key: key.into() }
	}

	/// Creates a new InvalidValue error
	pub fn invalid_value(
		key: impl Into<String>,
		value: impl Into<String>,
		expected: &'static str,
	) -> Self {
		Self::InvalidValue {
			key: key.into(),
			value: value.into(),
			expected,
		}
	}
}

/// Case-insensitive key to string lookup.
///
/// ```
/// use gmsec_core::Config;
///
/// let config = Config::from_args(["mw-id=loopback", "GMSEC-USE-MSG-BINS=true"]).unwrap();
/// assert_eq!(config.get("MW-ID"), Some("loopback"));
/// assert!(config.get_bool("gmsec-use-msg-bins", false).unwrap());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
	values: BTreeMap<String, String>,
}

impl Config {
	pub fn new() -> Self {
		Self::default()
	}

	/// Builds a config from `key=value` arguments.
	///
	/// Arguments without `=` are rejected.
	pub fn from_args<I, S>(args: I) -> Result<Self, ConfigError>
	where
		I: IntoIterator<Item = S>,
		S: AsRef<str>,
	{
		let mut config = Self::new();
		for arg in args {
			let arg = arg.as_ref();
			let (key, value) = arg.split_once('=').ok_or_else(|| {
				ConfigError::MalformedArgument {
					argument: arg.to_string(),
				}
			})?;
			if key.trim().is_empty() {
				return Err(ConfigError::MalformedArgument {
					argument: arg.to_string(),
				});
			}
			config.set(key, value);
		}
		Ok(config)
	}

	/// Builds a config from a whitespace-separated `key=value` list.
	pub fn parse(line: &str) -> Result<Self, ConfigError> {
		Self::from_args(line.split_whitespace())
	}

	pub fn set(
		&mut self,
		key: impl AsRef<str>,
		value: impl Into<String>,
	) -> &mut Self {
		self.values
			.insert(normalize(key.as_ref()), value.into().trim().to_string());
		self
	}

	/// Builder-style setter.
	pub fn with(mut self, key: impl AsRef<str>, value: impl Into<String>) -> Self {
		self.set(key, value);
		self
	}

	pub fn get(&self, key: &str) -> Option<&str> {
		self.values.get(&normalize(key)).map(String::as_str)
	}

	pub fn remove(&mut self, key: &str) -> Option<String> {
		self.values.remove(&normalize(key))
	}

	pub fn contains(&self, key: &str) -> bool {
		self.values.contains_key(&normalize(key))
	}

	pub fn len(&self) -> usize {
		self.values.len()
	}

	pub fn is_empty(&self) -> bool {
		self.values.is_empty()
	}

	pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
		self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
	}

	pub fn require(&self, key: &str) -> Result<&str, ConfigError> {
		self.get(key).ok_or_else(|| ConfigError::missing_value(key))
	}

	/// Boolean lookup. Accepts `true/false`, `yes/no`, `on/off`, `1/0`.
	pub fn get_bool(&self, key: &str, default: bool) -> Result<bool, ConfigError> {
		match self.get(key) {
			| None => Ok(default),
			| Some(value) => parse_bool(value)
				.ok_or_else(|| ConfigError::invalid_value(key, value, "boolean")),
		}
	}

	pub fn get_u64(&self, key: &str, default: u64) -> Result<u64, ConfigError> {
		self.get_parsed(key, default, "unsigned integer")
	}

	pub fn get_i64(&self, key: &str, default: i64) -> Result<i64, ConfigError> {
		self.get_parsed(key, default, "integer")
	}

	pub fn get_usize(
		&self,
		key: &str,
		default: usize,
	) -> Result<usize, ConfigError> {
		self.get_parsed(key, default, "unsigned integer")
	}

	/// Millisecond duration lookup.
	pub fn get_millis(
		&self,
		key: &str,
		default: Duration,
	) -> Result<Duration, ConfigError> {
		match self.get(key) {
			| None => Ok(default),
			| Some(_) => self
				.get_u64(key, 0)
				.map(Duration::from_millis),
		}
	}

	/// Values of `<prefix>1`, `<prefix>2`, ... in index order, stopping at
	/// the first missing index.
	pub fn indexed_values(&self, prefix: &str) -> Vec<&str> {
		(1 ..)
			.map_while(|index| self.get(&format!("{prefix}{index}")))
			.collect()
	}

	fn get_parsed<T: FromStr>(
		&self,
		key: &str,
		default: T,
		expected: &'static str,
	) -> Result<T, ConfigError> {
		match self.get(key) {
			| None => Ok(default),
			| Some(value) => value
				.parse()
				.map_err(|_| ConfigError::invalid_value(key, value, expected)),
		}
	}
}

fn normalize(key: &str) -> String {
	key.trim().to_ascii_lowercase()
}

fn parse_bool(value: &str) -> Option<bool> {
	match value.to_ascii_lowercase().as_str() {
		| "true" | "yes" | "on" | "1" => Some(true),
		| "false" | "no" | "off" | "0" => Some(false),
		| _ => None,
	}
}

impl fmt::Display for Config {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		for (i, (key, value)) in self.values.iter().enumerate() {
			if i > 0 {
				f.write_str(" ")?;
			}
			write!(f, "{key}={value}")?;
		}
		Ok(())
	}
}

impl<K: AsRef<str>, V: Into<String>> FromIterator<(K, V)> for Config {
	fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
		let mut config = Self::new();
		for (key, value) in iter {
			config.set(key, value);
		}
		config
	}
}
