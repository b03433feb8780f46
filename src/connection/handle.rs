use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;

use super::error::TransportError;
use super::params::ConnectionParams;
use super::transport::{BrokerSession, InboundStream};

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Live broker connection
///
/// Cloning is cheap and every clone refers to the same session. A
/// connection is owned either by a [`ConnectionCache`](super::ConnectionCache)
/// entry or by one [`Listener`](crate::Listener), never by both.
#[derive(Clone)]
pub struct Connection {
	id: u64,
	params: Arc<ConnectionParams>,
	session: Arc<dyn BrokerSession>,
}

impl Connection {
	pub(crate) fn new(
		params: ConnectionParams,
		session: Arc<dyn BrokerSession>,
	) -> Self {
		Self {
			id: NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed),
			params: Arc::new(params),
			session,
		}
	}

	/// Process-unique identifier of the underlying session.
	pub fn id(&self) -> u64 {
		self.id
	}

	pub fn params(&self) -> &ConnectionParams {
		&self.params
	}

	/// True when both handles share one session.
	pub fn is_same(&self, other: &Connection) -> bool {
		self.id == other.id
	}

	pub async fn publish(
		&self,
		subject: &str,
		payload: impl Into<Bytes>,
		reply_to: Option<&str>,
	) -> Result<(), TransportError> {
		self.session.publish(subject, payload.into(), reply_to).await
	}

	pub async fn subscribe(
		&self,
		subject: &str,
		queue_group: Option<&str>,
	) -> Result<InboundStream, TransportError> {
		self.session.subscribe(subject, queue_group).await
	}

	pub async fn flush(&self) -> Result<(), TransportError> {
		self.session.flush().await
	}

	/// Close the session for every clone of this handle.
	pub async fn disconnect(&self) {
		self.session.disconnect().await
	}

	/// Close the session without waiting for cleanup to finish. Delivery to
	/// its subscriptions stops before this returns.
	pub fn close(&self) {
		self.session.close()
	}

	pub fn is_closed(&self) -> bool {
		self.session.is_closed()
	}
}

impl fmt::Debug for Connection {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Connection")
			.field("id", &self.id)
			.field("endpoint", &self.params.to_string())
			.field("closed", &self.is_closed())
			.finish()
	}
}
