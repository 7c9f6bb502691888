use crate::message::Message;

/// Content validation hook.
///
/// Installed with [`Connection::set_validator`](super::Connection::set_validator)
/// and consulted on send and/or receive according to the
/// `gmsec-msg-content-validate*` keys. The returned string explains a
/// rejection.
pub trait MessageValidator: Send + Sync + 'static {
	fn validate(&self, message: &Message) -> Result<(), String>;
}

impl<F> MessageValidator for F
where F: Fn(&Message) -> Result<(), String> + Send + Sync + 'static
{
	fn validate(&self, message: &Message) -> Result<(), String> {
		self(message)
	}
}
