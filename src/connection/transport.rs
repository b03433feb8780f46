//! Broker client primitives
//!
//! The lifecycle engine only needs four operations from a broker client:
//! connect, publish, subscribe and disconnect. They are modelled as two
//! traits so that the production NATS client and the in-process
//! [`MemoryBroker`](super::memory_broker::MemoryBroker) are interchangeable.

use std::sync::Arc;

use arcstr::ArcStr;
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;

use super::error::TransportError;
use super::params::ConnectionParams;
use crate::config::BindingSettings;

/// Message delivered by a subscription stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
	/// Subject the message was published to
	pub subject: ArcStr,
	/// Raw payload
	pub payload: Bytes,
	/// Reply address set by the publisher
	pub reply_to: Option<ArcStr>,
}

impl InboundMessage {
	pub fn new(subject: impl Into<ArcStr>, payload: impl Into<Bytes>) -> Self {
		Self {
			subject: subject.into(),
			payload: payload.into(),
			reply_to: None,
		}
	}

	pub fn with_reply_to(mut self, reply_to: impl Into<ArcStr>) -> Self {
		self.reply_to = Some(reply_to.into());
		self
	}

	/// Payload decoded as UTF-8, invalid sequences replaced.
	pub fn payload_as_str(&self) -> String {
		String::from_utf8_lossy(&self.payload).into_owned()
	}
}

/// Stream of messages for one subscription. Dropping it unsubscribes.
pub type InboundStream = BoxStream<'static, InboundMessage>;

/// Establishes broker sessions
#[async_trait]
pub trait BrokerTransport: Send + Sync + 'static {
	/// Open a session and return once it is ready for use.
	async fn connect(
		&self,
		params: &ConnectionParams,
		settings: &BindingSettings,
	) -> Result<Arc<dyn BrokerSession>, TransportError>;
}

/// One open network session to a broker endpoint
#[async_trait]
pub trait BrokerSession: Send + Sync + 'static {
	/// Send a message. Resolves once the session accepted it.
	async fn publish(
		&self,
		subject: &str,
		payload: Bytes,
		reply_to: Option<&str>,
	) -> Result<(), TransportError>;

	/// Subscribe to `subject`. A non-empty `queue_group` joins the group so
	/// that each message is delivered to one member only.
	async fn subscribe(
		&self,
		subject: &str,
		queue_group: Option<&str>,
	) -> Result<InboundStream, TransportError>;

	/// Wait until previously published messages are written out.
	async fn flush(&self) -> Result<(), TransportError>;

	/// Close the session. Idempotent; subscription streams end afterwards.
	async fn disconnect(&self);

	/// Close the session without waiting. The broker stops routing to it
	/// before this returns; releasing the network resources may finish in
	/// the background. Idempotent, and a later `disconnect` is a no-op.
	fn close(&self);

	fn is_closed(&self) -> bool;
}
