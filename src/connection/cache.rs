use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::OnceCell;
use tracing::{debug, info};

use super::factory::ConnectionFactory;
use super::handle::Connection;
use crate::BindingError;

type Slot = Arc<OnceCell<Connection>>;

/// Connections shared by output bindings, keyed by connection string.
///
/// Each key owns a single-flight slot: concurrent first callers wait on the
/// same creation and exactly one session is opened. A failed creation
/// leaves the slot empty so a later call retries. Entries are never evicted.
pub struct ConnectionCache {
	factory: ConnectionFactory,
	slots: DashMap<String, Slot>,
}

impl ConnectionCache {
	pub fn new(factory: ConnectionFactory) -> Self {
		Self {
			factory,
			slots: DashMap::new(),
		}
	}

	/// Return the cached connection for `connection_string`, creating it on
	/// first use.
	pub async fn get_or_create(
		&self,
		connection_string: &str,
	) -> Result<Connection, BindingError> {
		let slot = self.slot(connection_string);
		let connection = slot
			.get_or_try_init(|| async {
				debug!("Creating cached connection");
				self.factory.create(connection_string).await
			})
			.await?;
		Ok(connection.clone())
	}

	// The shard guard is released before any await.
	fn slot(&self, connection_string: &str) -> Slot {
		if let Some(slot) = self.slots.get(connection_string) {
			return Arc::clone(slot.value());
		}
		Arc::clone(
			self.slots
				.entry(connection_string.to_string())
				.or_default()
				.value(),
		)
	}

	/// True if a live connection is cached for `connection_string`.
	pub fn contains(&self, connection_string: &str) -> bool {
		self.slots
			.get(connection_string)
			.is_some_and(|slot| slot.value().initialized())
	}

	/// Number of cached connections.
	pub fn len(&self) -> usize {
		self.slots
			.iter()
			.filter(|slot| slot.value().initialized())
			.count()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// Disconnect and forget every cached connection.
	pub async fn shutdown(&self) {
		let connections: Vec<Connection> = self
			.slots
			.iter()
			.filter_map(|slot| slot.value().get().cloned())
			.collect();
		self.slots.clear();

		for connection in &connections {
			connection.disconnect().await;
		}
		info!(count = connections.len(), "Connection cache shut down");
	}
}

impl std::fmt::Debug for ConnectionCache {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("ConnectionCache")
			.field("connections", &self.len())
			.finish()
	}
}
