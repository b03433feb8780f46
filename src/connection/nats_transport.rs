//! Production transport backed by `async-nats`

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use arcstr::ArcStr;
use async_nats::{Client, ConnectOptions};
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use tokio::runtime::Handle;
use tracing::{debug, warn};

use super::error::TransportError;
use super::params::ConnectionParams;
use super::transport::{
	BrokerSession, BrokerTransport, InboundMessage, InboundStream,
};
use crate::config::BindingSettings;

/// Connects to a real NATS server over TCP.
#[derive(Debug, Clone, Copy, Default)]
pub struct NatsTransport;

#[async_trait]
impl BrokerTransport for NatsTransport {
	async fn connect(
		&self,
		params: &ConnectionParams,
		settings: &BindingSettings,
	) -> Result<Arc<dyn BrokerSession>, TransportError> {
		let mut options = ConnectOptions::new()
			.name(&settings.client_name)
			.connection_timeout(settings.connect_timeout())
			.subscription_capacity(settings.subscription_capacity);

		if let (true, Some(user), Some(password)) =
			(params.has_credentials(), params.username(), params.password())
		{
			options =
				options.user_and_password(user.to_string(), password.to_string());
		}

		let endpoint = params.endpoint();
		let client = options.connect(endpoint.as_str()).await.map_err(|err| {
			TransportError::Connect {
				endpoint: endpoint.clone(),
				reason: err.to_string(),
			}
		})?;
		debug!(endpoint = %params, "NATS session established");

		Ok(Arc::new(NatsSession {
			client: Mutex::new(Some(client)),
			closed: AtomicBool::new(false),
		}))
	}
}

struct NatsSession {
	client: Mutex<Option<Client>>,
	closed: AtomicBool,
}

impl NatsSession {
	fn slot(&self) -> MutexGuard<'_, Option<Client>> {
		self.client.lock().unwrap_or_else(PoisonError::into_inner)
	}

	fn client(&self) -> Result<Client, TransportError> {
		self.slot().clone().ok_or(TransportError::Closed)
	}
}

impl From<async_nats::Message> for InboundMessage {
	fn from(message: async_nats::Message) -> Self {
		Self {
			subject: ArcStr::from(message.subject.as_str()),
			payload: message.payload,
			reply_to: message.reply.map(|reply| ArcStr::from(reply.as_str())),
		}
	}
}

#[async_trait]
impl BrokerSession for NatsSession {
	async fn publish(
		&self,
		subject: &str,
		payload: Bytes,
		reply_to: Option<&str>,
	) -> Result<(), TransportError> {
		let client = self.client()?;
		let result = match reply_to {
			| Some(reply_to) => {
				client
					.publish_with_reply(
						subject.to_string(),
						reply_to.to_string(),
						payload,
					)
					.await
			}
			| None => client.publish(subject.to_string(), payload).await,
		};
		result.map_err(|err| TransportError::Publish {
			subject: subject.to_string(),
			reason: err.to_string(),
		})
	}

	async fn subscribe(
		&self,
		subject: &str,
		queue_group: Option<&str>,
	) -> Result<InboundStream, TransportError> {
		let client = self.client()?;
		let subscriber = match queue_group {
			| Some(group) => {
				client
					.queue_subscribe(subject.to_string(), group.to_string())
					.await
			}
			| None => client.subscribe(subject.to_string()).await,
		}
		.map_err(|err| TransportError::Subscribe {
			subject: subject.to_string(),
			reason: err.to_string(),
		})?;

		Ok(subscriber.map(InboundMessage::from).boxed())
	}

	async fn flush(&self) -> Result<(), TransportError> {
		self.client()?
			.flush()
			.await
			.map_err(|err| TransportError::Flush(err.to_string()))
	}

	async fn disconnect(&self) {
		if self.closed.swap(true, Ordering::AcqRel) {
			return;
		}
		// Dropping the last client handle closes the TCP connection once
		// outstanding subscriptions are gone.
		let client = self.slot().take();
		if let Some(client) = client {
			flush_before_drop(client).await;
		}
		debug!("NATS session disconnected");
	}

	fn close(&self) {
		if self.closed.swap(true, Ordering::AcqRel) {
			return;
		}
		let client = self.slot().take();
		if let (Some(client), Ok(runtime)) = (client, Handle::try_current()) {
			runtime.spawn(flush_before_drop(client));
		}
		debug!("NATS session closed");
	}

	fn is_closed(&self) -> bool {
		self.closed.load(Ordering::Acquire)
	}
}

async fn flush_before_drop(client: Client) {
	if let Err(err) = client.flush().await {
		warn!(error = %err, "Failed to flush NATS session before disconnect");
	}
}
