//! Handler contract between a listener and the host

use std::future::Future;

use arcstr::ArcStr;
use async_trait::async_trait;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::connection::InboundMessage;

/// Value handed to the handler for one inbound message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerData {
	/// Message payload as a string
	pub value: String,
	/// Subject the message arrived on
	pub subject: ArcStr,
	/// Reply address set by the publisher
	pub reply_to: Option<ArcStr>,
}

impl From<InboundMessage> for TriggerData {
	fn from(message: InboundMessage) -> Self {
		Self {
			value: message.payload_as_str(),
			subject: message.subject,
			reply_to: message.reply_to,
		}
	}
}

/// Failure reported by a handler invocation
///
/// The listener never retries. `Failed` is logged and delivery continues;
/// `Fatal` and `Panicked` end the subscription and surface from
/// [`Listener::stop`](super::Listener::stop) or
/// [`Listener::wait`](super::Listener::wait).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HandlerFault {
	/// Invocation failed; the host has reported it
	#[error("handler failed: {0}")]
	Failed(String),
	/// Invocation failed in a way the subscription cannot survive
	#[error("unrecoverable handler fault: {0}")]
	Fatal(String),
	/// Handler panicked
	#[error("handler panicked: {0}")]
	Panicked(String),
}

impl HandlerFault {
	pub fn failed(reason: impl Into<String>) -> Self {
		Self::Failed(reason.into())
	}

	pub fn fatal(reason: impl Into<String>) -> Self {
		Self::Fatal(reason.into())
	}

	/// True if the fault terminates the subscription.
	pub fn is_fatal(&self) -> bool {
		!matches!(self, Self::Failed(_))
	}
}

/// Function executed for every inbound message.
///
/// The cancellation token is independent of the listener: stopping or
/// canceling a listener never cancels an invocation already in progress.
#[async_trait]
pub trait TriggerHandler: Send + Sync + 'static {
	async fn execute(
		&self,
		data: TriggerData,
		cancellation: CancellationToken,
	) -> Result<(), HandlerFault>;
}

#[async_trait]
impl<F, Fut> TriggerHandler for F
where
	F: Fn(TriggerData, CancellationToken) -> Fut + Send + Sync + 'static,
	Fut: Future<Output = Result<(), HandlerFault>> + Send + 'static,
{
	async fn execute(
		&self,
		data: TriggerData,
		cancellation: CancellationToken,
	) -> Result<(), HandlerFault> {
		(self)(data, cancellation).await
	}
}
