//! Message value object consumed by the connection core
//!
//! A [`Message`] is a subject, a [`Kind`] and a set of named, typed fields.
//! Callbacks receive messages by reference; anything that must outlive the
//! callback is retained through `Clone`, which is a deep copy.

use std::collections::BTreeMap;
use std::fmt;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Reserved field names read or written by the core
pub mod fields {
	/// Correlation id carried by requests and echoed by replies
	pub const REQUEST_ID: &str = "REQUEST-ID";
	/// Identity of the requesting connection, echoed by replies
	pub const REPLY_UNIQUE_ID: &str = "GMSEC-REPLY-UNIQUE-ID";
	/// Multi-response status signal on replies
	pub const RESPONSE_STATUS: &str = "RESPONSE-STATUS";
	/// Component that produced the message
	pub const COMPONENT: &str = "COMPONENT";
	/// Component the message is addressed to
	pub const DESTINATION_COMPONENT: &str = "DESTINATION-COMPONENT";
	/// Publish rate, in seconds, of a periodic message
	pub const PUB_RATE: &str = "PUB-RATE";
	/// Per-publish counter of a periodic message
	pub const COUNTER: &str = "COUNTER";
	/// Marks an aggregated (binned) envelope
	pub const AGGREGATED_MSG: &str = "GMSEC-AGGREGATED-MSG";
	/// Number of messages packed into an aggregated envelope
	pub const NUM_MESSAGES: &str = "NUM-MESSAGES";
	/// Length-prefixed encoded messages of an aggregated envelope
	pub const MSG_DATA: &str = "MSG-DATA";
}

/// Message kind
#[derive(
	Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default,
)]
pub enum Kind {
	#[default]
	Publish,
	Request,
	Reply,
}

impl fmt::Display for Kind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let name = match self {
			| Kind::Publish => "PUBLISH",
			| Kind::Request => "REQUEST",
			| Kind::Reply => "REPLY",
		};
		f.write_str(name)
	}
}

/// Status values carried in `RESPONSE-STATUS`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i16)]
pub enum ResponseStatus {
	Acknowledgement = 1,
	WorkingKeepAlive = 2,
	SuccessfulCompletion = 3,
	FailedCompletion = 4,
	InvalidRequest = 5,
	FinalMessage = 6,
}

impl ResponseStatus {
	pub fn from_code(code: i64) -> Option<Self> {
		match code {
			| 1 => Some(Self::Acknowledgement),
			| 2 => Some(Self::WorkingKeepAlive),
			| 3 => Some(Self::SuccessfulCompletion),
			| 4 => Some(Self::FailedCompletion),
			| 5 => Some(Self::InvalidRequest),
			| 6 => Some(Self::FinalMessage),
			| _ => None,
		}
	}

	pub fn code(self) -> i16 {
		self as i16
	}

	/// Whether a reply with this status ends a multi-response exchange.
	pub fn is_terminal(self) -> bool {
		!matches!(self, Self::Acknowledgement | Self::WorkingKeepAlive)
	}
}

/// Typed field value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FieldValue {
	Bool(bool),
	I16(i16),
	U16(u16),
	I32(i32),
	U32(u32),
	I64(i64),
	U64(u64),
	F64(f64),
	String(String),
	Binary(Bytes),
}

impl FieldValue {
	/// Integer view of any integral field, if it fits in `i64`.
	pub fn as_i64(&self) -> Option<i64> {
		match *self {
			| FieldValue::I16(v) => Some(v.into()),
			| FieldValue::U16(v) => Some(v.into()),
			| FieldValue::I32(v) => Some(v.into()),
			| FieldValue::U32(v) => Some(v.into()),
			| FieldValue::I64(v) => Some(v),
			| FieldValue::U64(v) => i64::try_from(v).ok(),
			| _ => None,
		}
	}

	/// Integer view of any non-negative integral field. Numeric strings
	/// are accepted too.
	pub fn as_u64(&self) -> Option<u64> {
		match self {
			| FieldValue::U64(v) => Some(*v),
			| FieldValue::String(s) => s.trim().parse().ok(),
			| other => other.as_i64().and_then(|v| u64::try_from(v).ok()),
		}
	}

	pub fn as_f64(&self) -> Option<f64> {
		match self {
			| FieldValue::F64(v) => Some(*v),
			| other => other.as_i64().map(|v| v as f64),
		}
	}

	pub fn as_str(&self) -> Option<&str> {
		match self {
			| FieldValue::String(s) => Some(s),
			| _ => None,
		}
	}

	pub fn as_bool(&self) -> Option<bool> {
		match self {
			| FieldValue::Bool(b) => Some(*b),
			| _ => None,
		}
	}

	pub fn as_bytes(&self) -> Option<&Bytes> {
		match self {
			| FieldValue::Binary(b) => Some(b),
			| _ => None,
		}
	}
}

macro_rules! impl_from_for_field_value {
	($($ty:ty => $variant:ident),* $(,)?) => {
		$(
			impl From<$ty> for FieldValue {
				fn from(value: $ty) -> Self {
					FieldValue::$variant(value)
				}
			}
		)*
	};
}

impl_from_for_field_value! {
	bool => Bool,
	i16 => I16,
	u16 => U16,
	i32 => I32,
	u32 => U32,
	i64 => I64,
	u64 => U64,
	f64 => F64,
	String => String,
	Bytes => Binary,
}

impl From<&str> for FieldValue {
	fn from(value: &str) -> Self {
		FieldValue::String(value.to_string())
	}
}

impl fmt::Display for FieldValue {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			| FieldValue::Bool(v) => write!(f, "{v}"),
			| FieldValue::I16(v) => write!(f, "{v}"),
			| FieldValue::U16(v) => write!(f, "{v}"),
			| FieldValue::I32(v) => write!(f, "{v}"),
			| FieldValue::U32(v) => write!(f, "{v}"),
			| FieldValue::I64(v) => write!(f, "{v}"),
			| FieldValue::U64(v) => write!(f, "{v}"),
			| FieldValue::F64(v) => write!(f, "{v}"),
			| FieldValue::String(v) => f.write_str(v),
			| FieldValue::Binary(v) => write!(f, "<{} bytes>", v.len()),
		}
	}
}

/// A named field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
	pub name: String,
	pub value: FieldValue,
}

impl Field {
	pub fn new(name: impl Into<String>, value: impl Into<FieldValue>) -> Self {
		Self {
			name: name.into(),
			value: value.into(),
		}
	}
}

/// Subject, kind and named fields.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Message {
	subject: String,
	kind: Kind,
	fields: BTreeMap<String, FieldValue>,
}

impl Message {
	pub fn new(subject: impl Into<String>, kind: Kind) -> Self {
		Self {
			subject: subject.into(),
			kind,
			fields: BTreeMap::new(),
		}
	}

	/// Builder-style field setter.
	pub fn with_field(
		mut self,
		name: impl Into<String>,
		value: impl Into<FieldValue>,
	) -> Self {
		self.set_field(name, value);
		self
	}

	pub fn subject(&self) -> &str {
		&self.subject
	}

	pub fn set_subject(&mut self, subject: impl Into<String>) {
		self.subject = subject.into();
	}

	pub fn kind(&self) -> Kind {
		self.kind
	}

	pub fn set_kind(&mut self, kind: Kind) {
		self.kind = kind;
	}

	/// Sets a field, returning the previous value if there was one.
	pub fn set_field(
		&mut self,
		name: impl Into<String>,
		value: impl Into<FieldValue>,
	) -> Option<FieldValue> {
		self.fields.insert(name.into(), value.into())
	}

	pub fn add_field(&mut self, field: Field) -> Option<FieldValue> {
		self.fields.insert(field.name, field.value)
	}

	pub fn field(&self, name: &str) -> Option<&FieldValue> {
		self.fields.get(name)
	}

	pub fn has_field(&self, name: &str) -> bool {
		self.fields.contains_key(name)
	}

	pub fn clear_field(&mut self, name: &str) -> Option<FieldValue> {
		self.fields.remove(name)
	}

	pub fn field_count(&self) -> usize {
		self.fields.len()
	}

	pub fn fields(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
		self.fields.iter().map(|(name, value)| (name.as_str(), value))
	}

	pub fn string_value(&self, name: &str) -> Option<&str> {
		self.field(name).and_then(FieldValue::as_str)
	}

	pub fn i64_value(&self, name: &str) -> Option<i64> {
		self.field(name).and_then(FieldValue::as_i64)
	}

	/// The `REQUEST-ID` field as a correlation id.
	pub fn request_id(&self) -> Option<u64> {
		self.field(fields::REQUEST_ID).and_then(FieldValue::as_u64)
	}

	pub fn set_request_id(&mut self, id: u64) {
		self.set_field(fields::REQUEST_ID, id);
	}

	/// The `RESPONSE-STATUS` field, `None` when absent or unrecognised.
	pub fn response_status(&self) -> Option<ResponseStatus> {
		self.i64_value(fields::RESPONSE_STATUS)
			.and_then(ResponseStatus::from_code)
	}

	pub fn set_response_status(&mut self, status: ResponseStatus) {
		self.set_field(fields::RESPONSE_STATUS, status.code());
	}

	/// True for envelopes produced by message binning.
	pub fn is_aggregated(&self) -> bool {
		self.field(fields::AGGREGATED_MSG)
			.and_then(FieldValue::as_bool)
			.unwrap_or(false)
	}
}

impl fmt::Display for Message {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{} {} {{", self.kind, self.subject)?;
		for (i, (name, value)) in self.fields.iter().enumerate() {
			if i > 0 {
				write!(f, ",")?;
			}
			write!(f, " {name}={value}")?;
		}
		write!(f, " }}")
	}
}
