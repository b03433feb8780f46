use thiserror::Error;

/// Connection string does not follow `nats://[user[:password]@]host[:port]`
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectionStringError {
	/// Nothing to parse, usually an unset environment variable
	#[error("connection string is empty")]
	Empty,
	/// Scheme, credential segment or host does not match the grammar
	#[error(
		"connection string does not match \
		 `nats://[user[:password]@]host[:port]`"
	)]
	Malformed,
	/// Port digits do not fit a TCP port
	#[error("port `{0}` is out of range")]
	InvalidPort(String),
}

/// Transport-level failures reported by a broker session
#[derive(Debug, Clone, Error)]
pub enum TransportError {
	/// Host unreachable or authentication rejected
	#[error("failed to connect to {endpoint}: {reason}")]
	Connect {
		/// `host:port` that was dialed
		endpoint: String,
		/// Reason reported by the broker client
		reason: String,
	},

	/// Connection establishment did not finish in time
	#[error("connection to {endpoint} timed out after {timeout_millis}ms")]
	Timeout {
		/// `host:port` that was dialed
		endpoint: String,
		/// Configured connect timeout
		timeout_millis: u64,
	},

	/// Publish was rejected by the session
	#[error("failed to publish to '{subject}': {reason}")]
	Publish {
		/// Target subject
		subject: String,
		/// Reason reported by the broker client
		reason: String,
	},

	/// Subscribe was rejected by the session
	#[error("failed to subscribe to '{subject}': {reason}")]
	Subscribe {
		/// Subject that was subscribed
		subject: String,
		/// Reason reported by the broker client
		reason: String,
	},

	/// Flushing pending writes failed
	#[error("failed to flush connection: {0}")]
	Flush(String),

	/// Session was already disconnected
	#[error("connection is closed")]
	Closed,
}
