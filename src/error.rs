use crate::connection::{ConnectionStringError, TransportError};
use crate::trigger::{HandlerFault, ListenerState};

/// Errors surfaced by bindings
#[derive(Debug, thiserror::Error)]
pub enum BindingError {
	/// Connection string could not be parsed; the binding cannot be set up
	#[error("Malformed connection string: {0}")]
	MalformedConnectionString(#[from] ConnectionStringError),

	/// Transport failure while connecting, publishing or subscribing
	#[error("Connection error: {0}")]
	Connection(#[from] TransportError),

	/// Handler fault that ended a subscription
	#[error("Handler fault: {0}")]
	Handler(#[from] HandlerFault),

	/// Lifecycle operation not allowed in the listener's current state
	#[error("Cannot {operation} a listener that is {state}")]
	InvalidTransition {
		/// Requested operation
		operation: &'static str,
		/// State at the time of the request
		state: ListenerState,
	},

	/// Invalid binding configuration value
	#[error("Invalid configuration value: {0}")]
	ConfigurationValue(String),
}

impl BindingError {
	/// True for failures that happened while setting a binding up.
	pub fn is_setup_error(&self) -> bool {
		matches!(
			self,
			Self::MalformedConnectionString(_)
				| Self::ConfigurationValue(_)
				| Self::Connection(TransportError::Connect { .. })
				| Self::Connection(TransportError::Timeout { .. })
		)
	}
}
