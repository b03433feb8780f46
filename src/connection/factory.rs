use std::sync::Arc;

use tracing::{debug, warn};

use super::error::TransportError;
use super::handle::Connection;
use super::nats_transport::NatsTransport;
use super::params::ConnectionParams;
use super::transport::BrokerTransport;
use crate::{BindingError, BindingSettings};

/// Builds connected [`Connection`]s from connection strings.
///
/// Creation resolves only after the session is established, so callers
/// always receive a connection that is ready to publish or subscribe.
#[derive(Clone)]
pub struct ConnectionFactory {
	transport: Arc<dyn BrokerTransport>,
	settings: Arc<BindingSettings>,
}

impl ConnectionFactory {
	pub fn new(
		transport: Arc<dyn BrokerTransport>,
		settings: BindingSettings,
	) -> Self {
		Self {
			transport,
			settings: Arc::new(settings),
		}
	}

	/// Factory dialing real NATS servers.
	pub fn nats(settings: BindingSettings) -> Self {
		Self::new(Arc::new(NatsTransport), settings)
	}

	pub fn settings(&self) -> &BindingSettings {
		&self.settings
	}

	/// Parse `connection_string` and connect.
	///
	/// # Errors
	/// `MalformedConnectionString` for unparsable input, `Connection` when
	/// the session cannot be established within the connect timeout.
	pub async fn create(
		&self,
		connection_string: &str,
	) -> Result<Connection, BindingError> {
		let params = ConnectionParams::parse(connection_string)?;
		self.connect(params).await
	}

	/// Connect with already parsed parameters.
	pub async fn connect(
		&self,
		params: ConnectionParams,
	) -> Result<Connection, BindingError> {
		let timeout = self.settings.connect_timeout();
		let session = tokio::time::timeout(
			timeout,
			self.transport.connect(&params, &self.settings),
		)
		.await
		.map_err(|_| TransportError::Timeout {
			endpoint: params.endpoint(),
			timeout_millis: self.settings.connect_timeout_millis,
		})
		.and_then(|connected| connected)
		.inspect_err(|err| {
			warn!(endpoint = %params, error = %err, "Failed to establish connection");
		})?;

		let connection = Connection::new(params, session);
		debug!(
			connection_id = connection.id(),
			endpoint = %connection.params(),
			authenticated = connection.params().has_credentials(),
			"Connection established"
		);
		Ok(connection)
	}
}
