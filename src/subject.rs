//! Subject handling module
//!
//! Subjects are dot-delimited strings (`GMSEC.MISSION.SAT.MSG.HB`). Patterns
//! add three wildcard tokens:
//!
//! - `*` matches exactly one token
//! - `>` is only valid as the final token and matches one or more tokens
//! - `+` is only valid as the final token and matches zero or more tokens
//!
//! The same matching rules drive subscription routing and subject
//! exclusion.

pub mod error;
pub mod subject_matcher;
pub mod subject_path;
pub mod subject_pattern;
pub mod subject_token;

#[cfg(test)]
mod subject_pattern_tests;
#[cfg(test)]
mod subject_token_tests;

pub use error::{SubjectError, SubjectResult, limits, validation};
pub use subject_matcher::{Len, SubjectMatcherError, SubjectMatcherNode};
pub use subject_path::SubjectPath;
pub use subject_pattern::SubjectPattern;
pub use subject_token::SubjectToken;

/// Returns `true` when `subject` matches `pattern`.
///
/// Malformed patterns never match anything. The subject is split on `.`
/// without further validation, so a received subject that would be rejected
/// for publishing can still be tested against a pattern.
///
/// ```
/// use gmsec_core::subject::matches;
///
/// assert!(matches("GMSEC.*.EVT", "GMSEC.MISSION.EVT"));
/// assert!(!matches("GMSEC.*.EVT", "GMSEC.MISSION.SAT.EVT"));
/// assert!(matches("GMSEC.>", "GMSEC.A.B.C"));
/// assert!(!matches("GMSEC.>", "GMSEC"));
/// ```
pub fn matches(pattern: &str, subject: &str) -> bool {
	match SubjectPattern::new(pattern) {
		| Ok(pattern) => pattern.matches(&SubjectPath::new(subject)),
		| Err(_) => false,
	}
}
