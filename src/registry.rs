//! Binding registry
//!
//! Turns declarative configuration into publishers and listeners. Output
//! bindings share connections through the registry's [`ConnectionCache`];
//! trigger bindings always get a dedicated connection of their own, opened
//! when the listener starts.

use std::sync::Arc;

use tracing::{debug, info};

use crate::connection::{
	BrokerTransport, ConnectionCache, ConnectionFactory, ConnectionParams,
};
use crate::trigger::{Listener, TriggerHandler};
use crate::{
	BindingError, BindingSettings, OutputConfig, Publisher, TriggerConfig,
};

/// Creates bindings against one transport, owning the shared connection
/// cache.
pub struct BindingRegistry {
	factory: ConnectionFactory,
	cache: ConnectionCache,
}

impl BindingRegistry {
	pub fn new(
		transport: Arc<dyn BrokerTransport>,
		settings: BindingSettings,
	) -> Self {
		let factory = ConnectionFactory::new(transport, settings);
		Self {
			cache: ConnectionCache::new(factory.clone()),
			factory,
		}
	}

	/// Registry connecting to real NATS servers.
	pub fn nats(settings: BindingSettings) -> Self {
		let factory = ConnectionFactory::nats(settings);
		Self {
			cache: ConnectionCache::new(factory.clone()),
			factory,
		}
	}

	pub fn factory(&self) -> &ConnectionFactory {
		&self.factory
	}

	pub fn cache(&self) -> &ConnectionCache {
		&self.cache
	}

	/// Build a publisher for an output binding.
	///
	/// The connection is created on first use of the connection string and
	/// reused afterwards, so setup failures surface here.
	pub async fn output(
		&self,
		config: &OutputConfig,
	) -> Result<Publisher, BindingError> {
		config.validate()?;
		let connection = self
			.cache
			.get_or_create(&config.connection_string())
			.await?;
		debug!(
			subject = %config.subject,
			connection_id = connection.id(),
			"Output binding ready"
		);
		Ok(Publisher::new(connection, config.subject.as_str()))
	}

	/// Build a listener for a trigger binding.
	///
	/// The connection string is parsed now so that malformed configuration
	/// is reported at registration; connecting happens in
	/// [`Listener::start`].
	pub fn trigger(
		&self,
		config: &TriggerConfig,
		handler: impl TriggerHandler,
	) -> Result<Listener, BindingError> {
		self.trigger_with_handler(config, Arc::new(handler))
	}

	/// Same as [`trigger`](Self::trigger) with a shared handler.
	pub fn trigger_with_handler(
		&self,
		config: &TriggerConfig,
		handler: Arc<dyn TriggerHandler>,
	) -> Result<Listener, BindingError> {
		config.validate()?;
		let params = ConnectionParams::parse(&config.connection_string())?;
		debug!(
			subject = %config.subject,
			queue_group = ?config.queue_group(),
			endpoint = %params,
			"Trigger binding registered"
		);
		Ok(Listener::new(
			self.factory.clone(),
			params,
			config.subject.as_str(),
			config.queue_group(),
			handler,
		))
	}

	/// Disconnect every cached output connection.
	pub async fn shutdown(&self) {
		info!("Shutting down binding registry");
		self.cache.shutdown().await;
	}
}

impl std::fmt::Debug for BindingRegistry {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("BindingRegistry")
			.field("cache", &self.cache)
			.finish()
	}
}
