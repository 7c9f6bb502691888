//! Connection settings read from a [`Config`]

use std::num::NonZeroUsize;
use std::time::Duration;

use crate::config::{Config, ConfigError};
use crate::subject::SubjectPattern;

/// Configuration keys consumed by the connection core
pub mod keys {
	pub const USE_MSG_BINS: &str = "gmsec-use-msg-bins";
	pub const MSG_BIN_SIZE: &str = "gmsec-msg-bin-size";
	pub const MSG_BIN_TIMEOUT: &str = "gmsec-msg-bin-timeout";
	pub const MSG_BIN_SUBJECT_PREFIX: &str = "gmsec-msg-bin-subject-";
	pub const MSG_BIN_EXCLUDE_SUBJECT_PREFIX: &str =
		"gmsec-msg-bin-exclude-subject-";
	pub const MSG_BIN_CODEC: &str = "gmsec-msg-bin-codec";
	pub const CONTENT_VALIDATE: &str = "gmsec-msg-content-validate";
	pub const CONTENT_VALIDATE_ALL: &str = "gmsec-msg-content-validate-all";
	pub const CONTENT_VALIDATE_SEND: &str = "gmsec-msg-content-validate-send";
	pub const CONTENT_VALIDATE_RECV: &str = "gmsec-msg-content-validate-recv";
	pub const MULTI_RESPONSE: &str = "mw-multi-resp";
	pub const SUBSCRIBE_FOR_RESPONSE: &str = "mw-subscribe-for-resp";
	pub const REQUEST_REPUBLISH_MS: &str = "gmsec-req-republish-ms";
	pub const DISPATCH_POLL_MS: &str = "gmsec-dispatch-poll-ms";
	pub const SUBJECT_CACHE_SIZE: &str = "gmsec-subject-cache-size";
}

/// Message binning settings
#[derive(Debug, Clone)]
pub struct BinSettings {
	/// Messages per envelope before a bin is flushed
	pub size: usize,
	/// Maximum age of a bin's first message before it is flushed
	pub timeout: Duration,
	/// Subjects that are binned; empty means every subject
	pub include: Vec<SubjectPattern>,
	/// Subjects that bypass binning
	pub exclude: Vec<SubjectPattern>,
}

impl Default for BinSettings {
	fn default() -> Self {
		Self {
			size: 100,
			timeout: Duration::from_millis(5000),
			include: Vec::new(),
			exclude: Vec::new(),
		}
	}
}

/// Which direction content validation applies to
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ValidationSettings {
	pub send: bool,
	pub recv: bool,
}

/// Connection-level behavior settings
#[derive(Debug, Clone)]
pub struct ConnectionSettings {
	/// Requests accept several replies, ended by a terminal status
	pub multi_response: bool,
	/// Subscribe to the derived response subject when requesting
	pub subscribe_for_response: bool,
	/// Republish interval used for `Republish::Default`
	pub default_republish: Option<Duration>,
	/// Upper bound on a single transport receive
	pub dispatch_poll_interval: Duration,
	/// Size of the parsed-subject cache (must be > 0)
	pub subject_cache_size: NonZeroUsize,
	pub validation: ValidationSettings,
	/// `None` disables binning
	pub binning: Option<BinSettings>,
	/// Codec for aggregated envelopes
	pub bin_codec: String,
}

impl Default for ConnectionSettings {
	fn default() -> Self {
		Self {
			multi_response: false,
			subscribe_for_response: true,
			default_republish: None,
			dispatch_poll_interval: Duration::from_millis(250),
			subject_cache_size: NonZeroUsize::new(100).unwrap_or(NonZeroUsize::MIN),
			validation: ValidationSettings::default(),
			binning: None,
			bin_codec: "bincode".to_string(),
		}
	}
}

impl ConnectionSettings {
	/// Reads every connection key from `config`, falling back to defaults.
	pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
		let defaults = Self::default();

		let validate_all = config.get_bool(keys::CONTENT_VALIDATE_ALL, false)?;
		let validate_send = config.get_bool(keys::CONTENT_VALIDATE, false)?
			|| config.get_bool(keys::CONTENT_VALIDATE_SEND, false)?;
		let validate_recv = config.get_bool(keys::CONTENT_VALIDATE_RECV, false)?;

		let republish_ms = config.get_i64(keys::REQUEST_REPUBLISH_MS, -1)?;
		let default_republish = u64::try_from(republish_ms)
			.ok()
			.filter(|ms| *ms > 0)
			.map(Duration::from_millis);

		let cache_size = config
			.get_usize(keys::SUBJECT_CACHE_SIZE, defaults.subject_cache_size.get())?;
		let subject_cache_size = NonZeroUsize::new(cache_size).ok_or_else(|| {
			ConfigError::invalid_value(
				keys::SUBJECT_CACHE_SIZE,
				cache_size.to_string(),
				"positive integer",
			)
		})?;

		let dispatch_poll_interval = config
			.get_millis(keys::DISPATCH_POLL_MS, defaults.dispatch_poll_interval)?
			.max(Duration::from_millis(1));

		let binning = if config.get_bool(keys::USE_MSG_BINS, false)? {
			Some(BinSettings::from_config(config)?)
		} else {
			None
		};

		Ok(Self {
			multi_response: config.get_bool(keys::MULTI_RESPONSE, false)?,
			subscribe_for_response: config
				.get_bool(keys::SUBSCRIBE_FOR_RESPONSE, defaults.subscribe_for_response)?,
			default_republish,
			dispatch_poll_interval,
			subject_cache_size,
			validation: ValidationSettings {
				send: validate_all || validate_send,
				recv: validate_all || validate_recv,
			},
			binning,
			bin_codec: config
				.get(keys::MSG_BIN_CODEC)
				.unwrap_or(&defaults.bin_codec)
				.to_string(),
		})
	}
}

impl BinSettings {
	pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
		let defaults = Self::default();
		let size = config.get_usize(keys::MSG_BIN_SIZE, defaults.size)?.max(1);
		let timeout = config.get_millis(keys::MSG_BIN_TIMEOUT, defaults.timeout)?;

		Ok(Self {
			size,
			timeout,
			include: patterns(config, keys::MSG_BIN_SUBJECT_PREFIX)?,
			exclude: patterns(config, keys::MSG_BIN_EXCLUDE_SUBJECT_PREFIX)?,
		})
	}
}

fn patterns(config: &Config, prefix: &str) -> Result<Vec<SubjectPattern>, ConfigError> {
	config
		.indexed_values(prefix)
		.into_iter()
		.map(|value| {
			SubjectPattern::new(value).map_err(|_| {
				ConfigError::invalid_value(prefix, value, "subject pattern")
			})
		})
		.collect()
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_defaults() {
		let settings = ConnectionSettings::from_config(&Config::new()).unwrap();

		assert!(!settings.multi_response);
		assert!(settings.subscribe_for_response);
		assert!(settings.binning.is_none());
		assert_eq!(settings.default_republish, None);
		assert_eq!(settings.dispatch_poll_interval, Duration::from_millis(250));
		assert_eq!(settings.validation, ValidationSettings::default());
	}

	#[test]
	fn test_binning_keys() {
		let config = Config::parse(
			"gmsec-use-msg-bins=true gmsec-msg-bin-size=3 \
			 gmsec-msg-bin-timeout=750 gmsec-msg-bin-subject-1=GMSEC.LOG.> \
			 gmsec-msg-bin-exclude-subject-1=GMSEC.LOG.CRIT.>",
		)
		.unwrap();
		let bins = ConnectionSettings::from_config(&config)
			.unwrap()
			.binning
			.unwrap();

		assert_eq!(bins.size, 3);
		assert_eq!(bins.timeout, Duration::from_millis(750));
		assert_eq!(bins.include[0].as_str(), "GMSEC.LOG.>");
		assert_eq!(bins.exclude[0].as_str(), "GMSEC.LOG.CRIT.>");
	}

	#[test]
	fn test_malformed_bin_pattern_is_configuration_error() {
		let config = Config::parse(
			"gmsec-use-msg-bins=true gmsec-msg-bin-subject-1=A.>.B",
		)
		.unwrap();
		assert!(matches!(
			ConnectionSettings::from_config(&config),
			Err(ConfigError::InvalidValue { .. })
		));
	}

	#[test]
	fn test_validation_modes() {
		let all = Config::new().with(keys::CONTENT_VALIDATE_ALL, "true");
		let recv = Config::new().with(keys::CONTENT_VALIDATE_RECV, "true");
		let send = Config::new().with(keys::CONTENT_VALIDATE, "true");

		let v = |c: &Config| ConnectionSettings::from_config(c).unwrap().validation;
		assert_eq!(v(&all), ValidationSettings { send: true, recv: true });
		assert_eq!(v(&recv), ValidationSettings { send: false, recv: true });
		assert_eq!(v(&send), ValidationSettings { send: true, recv: false });
	}

	#[test]
	fn test_republish_and_multi_response() {
		let config = Config::parse("mw-multi-resp=on gmsec-req-republish-ms=300")
			.unwrap();
		let settings = ConnectionSettings::from_config(&config).unwrap();

		assert!(settings.multi_response);
		assert_eq!(settings.default_republish, Some(Duration::from_millis(300)));
		assert!(ConnectionSettings::from_config(
			&Config::new().with(keys::SUBJECT_CACHE_SIZE, "0")
		)
		.is_err());
	}
}
