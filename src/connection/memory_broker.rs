//! In-process broker with NATS delivery semantics
//!
//! Plain subscriptions receive every message published to a matching
//! subject. Subscriptions sharing a queue group receive each message once
//! per group, handed out round-robin. Every subscription owns a bounded
//! buffer, and publishers wait for room, so a slow consumer throttles the
//! subject instead of losing messages.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use arcstr::ArcStr;
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use futures::stream;
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, trace};

use super::error::TransportError;
use super::params::ConnectionParams;
use super::transport::{
	BrokerSession, BrokerTransport, InboundMessage, InboundStream,
};
use crate::config::BindingSettings;

/// Shared in-process broker. Clones refer to the same broker.
#[derive(Clone, Default)]
pub struct MemoryBroker {
	inner: Arc<BrokerInner>,
}

#[derive(Default)]
struct BrokerInner {
	routes: Mutex<Routes>,
	connect_calls: AtomicUsize,
	next_session_id: AtomicU64,
	unreachable: AtomicBool,
	credentials: Option<(String, String)>,
	connect_delay: Option<Duration>,
}

#[derive(Default)]
struct Routes {
	subscriptions: Vec<Route>,
	group_cursors: HashMap<(ArcStr, ArcStr), usize>,
}

struct Route {
	session_id: u64,
	session_closed: Arc<AtomicBool>,
	pattern: ArcStr,
	queue_group: Option<ArcStr>,
	sender: mpsc::Sender<InboundMessage>,
}

impl MemoryBroker {
	pub fn new() -> Self {
		Self::default()
	}

	/// Reject sessions that do not present exactly these credentials.
	pub fn with_credentials(
		username: impl Into<String>,
		password: impl Into<String>,
	) -> Self {
		Self {
			inner: Arc::new(BrokerInner {
				credentials: Some((username.into(), password.into())),
				..BrokerInner::default()
			}),
		}
	}

	/// Delay every connect call, widening race windows in tests.
	pub fn with_connect_delay(delay: Duration) -> Self {
		Self {
			inner: Arc::new(BrokerInner {
				connect_delay: Some(delay),
				..BrokerInner::default()
			}),
		}
	}

	/// Make subsequent connect attempts fail as if the host were down.
	pub fn set_reachable(&self, reachable: bool) {
		self.inner.unreachable.store(!reachable, Ordering::Release);
	}

	/// Number of connect calls seen, successful or not.
	pub fn connect_count(&self) -> usize {
		self.inner.connect_calls.load(Ordering::Acquire)
	}

	/// Number of live subscriptions on `subject`.
	pub async fn subscription_count(&self, subject: &str) -> usize {
		let mut routes = self.inner.routes.lock().await;
		routes.prune_closed();
		routes
			.subscriptions
			.iter()
			.filter(|route| route.pattern.as_str() == subject)
			.count()
	}
}

#[async_trait]
impl BrokerTransport for MemoryBroker {
	async fn connect(
		&self,
		params: &ConnectionParams,
		settings: &BindingSettings,
	) -> Result<Arc<dyn BrokerSession>, TransportError> {
		self.inner.connect_calls.fetch_add(1, Ordering::AcqRel);
		if let Some(delay) = self.inner.connect_delay {
			tokio::time::sleep(delay).await;
		}

		if self.inner.unreachable.load(Ordering::Acquire) {
			return Err(TransportError::Connect {
				endpoint: params.endpoint(),
				reason: "host unreachable".to_string(),
			});
		}

		if let Some((username, password)) = &self.inner.credentials {
			let accepted = params.has_credentials()
				&& params.username() == Some(username.as_str())
				&& params.password() == Some(password.as_str());
			if !accepted {
				return Err(TransportError::Connect {
					endpoint: params.endpoint(),
					reason: "authorization violation".to_string(),
				});
			}
		}

		let session_id = self.inner.next_session_id.fetch_add(1, Ordering::AcqRel);
		debug!(session_id, endpoint = %params, "Memory session opened");
		Ok(Arc::new(MemorySession {
			broker: Arc::clone(&self.inner),
			session_id,
			capacity: settings.subscription_capacity.max(1),
			closed: Arc::new(AtomicBool::new(false)),
		}))
	}
}

struct MemorySession {
	broker: Arc<BrokerInner>,
	session_id: u64,
	capacity: usize,
	closed: Arc<AtomicBool>,
}

impl MemorySession {
	fn ensure_open(&self) -> Result<(), TransportError> {
		if self.is_closed() {
			Err(TransportError::Closed)
		} else {
			Ok(())
		}
	}
}

#[async_trait]
impl BrokerSession for MemorySession {
	async fn publish(
		&self,
		subject: &str,
		payload: Bytes,
		reply_to: Option<&str>,
	) -> Result<(), TransportError> {
		self.ensure_open()?;
		if subject.is_empty() {
			return Err(TransportError::Publish {
				subject: subject.to_string(),
				reason: "subject is empty".to_string(),
			});
		}

		let mut message = InboundMessage::new(subject, payload);
		if let Some(reply_to) = reply_to {
			message = message.with_reply_to(reply_to);
		}

		let targets = self.broker.routes.lock().await.targets(subject);
		trace!(subject, targets = targets.len(), "Routing message");
		// Sending outside the lock: a full buffer must not block other
		// publishers or subscribers from updating routes.
		for target in targets {
			if target.send(message.clone()).await.is_err() {
				trace!(subject, "Subscriber went away before delivery");
			}
		}
		Ok(())
	}

	async fn subscribe(
		&self,
		subject: &str,
		queue_group: Option<&str>,
	) -> Result<InboundStream, TransportError> {
		self.ensure_open()?;
		if subject.is_empty() {
			return Err(TransportError::Subscribe {
				subject: subject.to_string(),
				reason: "subject is empty".to_string(),
			});
		}

		let (sender, mut receiver) = mpsc::channel(self.capacity);
		self.broker.routes.lock().await.subscriptions.push(Route {
			session_id: self.session_id,
			session_closed: Arc::clone(&self.closed),
			pattern: ArcStr::from(subject),
			queue_group: queue_group
				.filter(|group| !group.is_empty())
				.map(ArcStr::from),
			sender,
		});

		Ok(stream::poll_fn(move |cx| receiver.poll_recv(cx)).boxed())
	}

	async fn flush(&self) -> Result<(), TransportError> {
		self.ensure_open()
	}

	async fn disconnect(&self) {
		self.close();
		let session_id = self.session_id;
		self.broker
			.routes
			.lock()
			.await
			.subscriptions
			.retain(|route| route.session_id != session_id);
	}

	fn close(&self) {
		if !self.closed.swap(true, Ordering::AcqRel) {
			debug!(session_id = self.session_id, "Memory session closed");
		}
	}

	fn is_closed(&self) -> bool {
		self.closed.load(Ordering::Acquire)
	}
}

impl Routes {
	/// Drop routes whose stream went away or whose session was closed.
	fn prune_closed(&mut self) {
		self.subscriptions.retain(|route| {
			!route.sender.is_closed()
				&& !route.session_closed.load(Ordering::Acquire)
		});
	}

	/// Resolve the senders that should receive a message on `subject`.
	fn targets(&mut self, subject: &str) -> Vec<mpsc::Sender<InboundMessage>> {
		self.prune_closed();

		let mut targets = Vec::new();
		let mut groups: HashMap<(ArcStr, ArcStr), Vec<usize>> = HashMap::new();
		for (index, route) in self.subscriptions.iter().enumerate() {
			if !subject_matches(&route.pattern, subject) {
				continue;
			}
			match &route.queue_group {
				| Some(group) => groups
					.entry((route.pattern.clone(), group.clone()))
					.or_default()
					.push(index),
				| None => targets.push(route.sender.clone()),
			}
		}

		for (key, members) in groups {
			let cursor = self.group_cursors.entry(key).or_insert(0);
			let chosen = members[*cursor % members.len()];
			*cursor = cursor.wrapping_add(1);
			targets.push(self.subscriptions[chosen].sender.clone());
		}
		targets
	}
}

/// NATS subject matching: `*` matches one token, a trailing `>` matches one
/// or more tokens.
pub(crate) fn subject_matches(pattern: &str, subject: &str) -> bool {
	let mut pattern_tokens = pattern.split('.');
	let mut subject_tokens = subject.split('.');
	loop {
		match (pattern_tokens.next(), subject_tokens.next()) {
			| (Some(">"), Some(_)) => return pattern_tokens.next().is_none(),
			| (Some("*"), Some(_)) => {}
			| (Some(expected), Some(actual)) if expected == actual => {}
			| (None, None) => return true,
			| _ => return false,
		}
	}
}
