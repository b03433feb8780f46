//! Declarative binding configuration
//!
//! A binding names the environment variable that holds its connection
//! string, never the connection string itself, so that credentials stay out
//! of function metadata.

use std::time::Duration;

use serde::Deserialize;
use tracing::warn;

use crate::BindingError;

/// Client-level behavior shared by every connection a registry creates
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BindingSettings {
	/// Upper bound for establishing a session, in milliseconds
	pub connect_timeout_millis: u64,
	/// Client name announced to the broker
	pub client_name: String,
	/// Messages buffered per subscription on the transport side
	pub subscription_capacity: usize,
}

impl Default for BindingSettings {
	fn default() -> Self {
		Self {
			connect_timeout_millis: 5_000,
			client_name: "nats-bindings".to_string(),
			subscription_capacity: 64,
		}
	}
}

impl BindingSettings {
	pub fn connect_timeout(&self) -> Duration {
		Duration::from_millis(self.connect_timeout_millis)
	}
}

/// Trigger binding: subscribe and invoke a handler per message
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerConfig {
	/// Name of the environment variable holding the connection string
	pub connection: String,
	/// Subject to subscribe to
	#[serde(alias = "channel")]
	pub subject: String,
	/// Queue group to join; absent or empty means broadcast delivery
	#[serde(default)]
	pub queue_group: Option<String>,
}

impl TriggerConfig {
	pub fn new(connection: impl Into<String>, subject: impl Into<String>) -> Self {
		Self {
			connection: connection.into(),
			subject: subject.into(),
			queue_group: None,
		}
	}

	pub fn with_queue_group(mut self, queue_group: impl Into<String>) -> Self {
		self.queue_group = Some(queue_group.into());
		self
	}

	/// Queue group with empty names folded into `None`.
	pub fn queue_group(&self) -> Option<&str> {
		self.queue_group.as_deref().filter(|group| !group.is_empty())
	}

	/// Resolve the connection string from the environment.
	pub fn connection_string(&self) -> String {
		resolve_connection_string(&self.connection)
	}

	pub(crate) fn validate(&self) -> Result<(), BindingError> {
		validate_subject(&self.subject)
	}
}

/// Output binding: publish values to a subject
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputConfig {
	/// Name of the environment variable holding the connection string
	pub connection: String,
	/// Subject to publish to
	#[serde(alias = "channel")]
	pub subject: String,
}

impl OutputConfig {
	pub fn new(connection: impl Into<String>, subject: impl Into<String>) -> Self {
		Self {
			connection: connection.into(),
			subject: subject.into(),
		}
	}

	/// Resolve the connection string from the environment.
	pub fn connection_string(&self) -> String {
		resolve_connection_string(&self.connection)
	}

	pub(crate) fn validate(&self) -> Result<(), BindingError> {
		validate_subject(&self.subject)
	}
}

/// Unset variables resolve to an empty string, which fails parsing later.
fn resolve_connection_string(variable: &str) -> String {
	match std::env::var(variable) {
		| Ok(value) => value,
		| Err(err) => {
			warn!(variable, error = %err, "Connection string variable is not set");
			String::new()
		}
	}
}

fn validate_subject(subject: &str) -> Result<(), BindingError> {
	if subject.is_empty() {
		return Err(BindingError::ConfigurationValue(
			"subject must not be empty".to_string(),
		));
	}
	if subject.chars().any(char::is_whitespace) {
		return Err(BindingError::ConfigurationValue(format!(
			"subject '{subject}' must not contain whitespace"
		)));
	}
	Ok(())
}
