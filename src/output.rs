//! Output binding
//!
//! A [`Publisher`] is an append-style sink bound to one subject. It holds a
//! cached connection, so every publisher created for the same connection
//! string writes through the same session.

use arcstr::ArcStr;
use bytes::Bytes;
use tracing::{debug, trace};

use crate::{BindingError, Connection};

/// Publishes values to a configured subject.
///
/// Created via [`BindingRegistry::output`](crate::BindingRegistry::output).
/// Every call is sent immediately; publishes issued concurrently through the
/// same connection are ordered only as the connection's write stream orders
/// them.
#[derive(Debug, Clone)]
pub struct Publisher {
	connection: Connection,
	subject: ArcStr,
}

impl Publisher {
	pub fn new(connection: Connection, subject: impl Into<ArcStr>) -> Self {
		Self {
			connection,
			subject: subject.into(),
		}
	}

	/// Subject this publisher writes to.
	pub fn subject(&self) -> &ArcStr {
		&self.subject
	}

	/// Connection shared with other publishers of the same connection string.
	pub fn connection(&self) -> &Connection {
		&self.connection
	}

	/// Publish `value` to the configured subject.
	pub async fn add(
		&self,
		value: impl Into<String>,
	) -> Result<(), BindingError> {
		self.publish(&self.subject, value, None).await
	}

	/// Publish `value` with a reply address.
	pub async fn add_with_reply(
		&self,
		value: impl Into<String>,
		reply_to: &str,
	) -> Result<(), BindingError> {
		self.publish(&self.subject, value, Some(reply_to)).await
	}

	/// Publish to an explicit subject through this publisher's connection.
	pub async fn publish(
		&self,
		subject: &str,
		payload: impl Into<String>,
		reply_to: Option<&str>,
	) -> Result<(), BindingError> {
		let payload = Bytes::from(payload.into());
		trace!(subject, payload_size = payload.len(), "Publishing message");
		self.connection
			.publish(subject, payload, reply_to)
			.await
			.inspect_err(|err| {
				debug!(subject, error = %err, "Publish failed");
			})
			.map_err(BindingError::from)
	}

	/// Nothing is buffered, so there is nothing to flush.
	pub async fn flush(&self) -> Result<(), BindingError> {
		Ok(())
	}
}
