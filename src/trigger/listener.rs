//! Trigger listener
//!
//! A listener owns one dedicated connection and drives a single dispatch
//! task that pulls messages from the subscription stream and awaits the
//! handler for each one before pulling the next. The transport buffer
//! therefore fills up behind a slow handler, throttling the subject (or
//! this member's share of a queue group) instead of piling up work.
//!
//! ```text
//! Created --start--> Started --stop---> Stopped --.
//!    |                  |                          |
//!    '------cancel------+--cancel--> Canceled -----+--dispose--> Disposed
//! ```
//!
//! `dispose` is accepted in every state and `stop` before `start` changes
//! nothing. `cancel`, `dispose` and dropping a started listener close its
//! connection on the spot, even while a handler is still running. No
//! transition leads back to `Started`: a new listener is needed to listen
//! again.

use std::any::Any;
use std::fmt;
use std::future::Future;
use std::mem;
use std::sync::Arc;

use arcstr::ArcStr;
use futures::StreamExt;
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use super::handler::{HandlerFault, TriggerData, TriggerHandler};
use crate::connection::{
	Connection, ConnectionFactory, ConnectionParams, InboundStream,
};
use crate::BindingError;

/// Observable lifecycle state of a [`Listener`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ListenerState {
	Created,
	Started,
	Stopped,
	Canceled,
	Disposed,
}

impl fmt::Display for ListenerState {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let name = match self {
			| Self::Created => "created",
			| Self::Started => "started",
			| Self::Stopped => "stopped",
			| Self::Canceled => "canceled",
			| Self::Disposed => "disposed",
		};
		f.write_str(name)
	}
}

enum Lifecycle {
	Created,
	Started(Running),
	Stopped,
	Canceled,
	Disposed,
}

impl Lifecycle {
	fn state(&self) -> ListenerState {
		match self {
			| Self::Created => ListenerState::Created,
			| Self::Started(_) => ListenerState::Started,
			| Self::Stopped => ListenerState::Stopped,
			| Self::Canceled => ListenerState::Canceled,
			| Self::Disposed => ListenerState::Disposed,
		}
	}
}

/// Resources held while started. Dropping it closes the connection and
/// signals the dispatch task, which leaves its loop once any in-progress
/// handler returns.
struct Running {
	connection: Connection,
	stop: CancellationToken,
	dispatch: JoinHandle<Result<(), HandlerFault>>,
}

impl Running {
	/// Stop delivery, disconnect and wait for the dispatch task.
	async fn shutdown(mut self) -> Result<(), HandlerFault> {
		self.stop.cancel();
		self.connection.disconnect().await;
		join_dispatch(&mut self.dispatch).await
	}
}

impl Drop for Running {
	fn drop(&mut self) {
		self.stop.cancel();
		self.connection.close();
	}
}

/// Subscription bound to a handler, with explicit lifecycle control.
///
/// Created via [`BindingRegistry::trigger`](crate::BindingRegistry::trigger).
pub struct Listener {
	factory: ConnectionFactory,
	params: ConnectionParams,
	subject: ArcStr,
	queue_group: Option<ArcStr>,
	handler: Arc<dyn TriggerHandler>,
	lifecycle: Lifecycle,
}

impl Listener {
	pub fn new(
		factory: ConnectionFactory,
		params: ConnectionParams,
		subject: impl Into<ArcStr>,
		queue_group: Option<&str>,
		handler: Arc<dyn TriggerHandler>,
	) -> Self {
		Self {
			factory,
			params,
			subject: subject.into(),
			queue_group: queue_group
				.filter(|group| !group.is_empty())
				.map(ArcStr::from),
			handler,
			lifecycle: Lifecycle::Created,
		}
	}

	pub fn state(&self) -> ListenerState {
		self.lifecycle.state()
	}

	pub fn subject(&self) -> &ArcStr {
		&self.subject
	}

	pub fn queue_group(&self) -> Option<&ArcStr> {
		self.queue_group.as_ref()
	}

	/// Dedicated connection, present only while started.
	pub fn connection(&self) -> Option<&Connection> {
		match &self.lifecycle {
			| Lifecycle::Started(running) => Some(&running.connection),
			| _ => None,
		}
	}

	/// True while started and the dispatch task is still receiving.
	pub fn is_running(&self) -> bool {
		match &self.lifecycle {
			| Lifecycle::Started(running) => !running.dispatch.is_finished(),
			| _ => false,
		}
	}

	/// Open a dedicated connection, subscribe and start dispatching.
	///
	/// Resolves once the subscription is registered. On failure the
	/// listener stays `Created` and no connection is left open.
	pub async fn start(&mut self) -> Result<(), BindingError> {
		if !matches!(self.lifecycle, Lifecycle::Created) {
			return Err(self.invalid_transition("start"));
		}

		let connection = self.factory.connect(self.params.clone()).await?;
		let stream = match connection
			.subscribe(&self.subject, self.queue_group.as_deref())
			.await
		{
			| Ok(stream) => stream,
			| Err(err) => {
				error!(subject = %self.subject, error = %err, "Failed to subscribe");
				connection.disconnect().await;
				return Err(err.into());
			}
		};

		let stop = CancellationToken::new();
		let dispatch = tokio::spawn(dispatch(
			stream,
			Arc::clone(&self.handler),
			connection.clone(),
			stop.clone(),
			self.subject.clone(),
		));
		info!(
			subject = %self.subject,
			queue_group = ?self.queue_group,
			connection_id = connection.id(),
			"Listener started"
		);

		self.lifecycle = Lifecycle::Started(Running {
			connection,
			stop,
			dispatch,
		});
		Ok(())
	}

	/// Disconnect and wait for the dispatch task to finish.
	///
	/// A handler invocation already in progress runs to completion first.
	/// Returns the fault that ended the subscription, if any. No-op when
	/// nothing is connected: a listener that was never started stays
	/// `Created`, a canceled one stays `Canceled`.
	pub async fn stop(&mut self) -> Result<(), BindingError> {
		match mem::replace(&mut self.lifecycle, Lifecycle::Stopped) {
			| Lifecycle::Started(running) => {
				debug!(subject = %self.subject, "Stopping listener");
				let outcome = running.shutdown().await;
				info!(subject = %self.subject, "Listener stopped");
				outcome.map_err(BindingError::from)
			}
			| Lifecycle::Stopped => Ok(()),
			| Lifecycle::Created => {
				self.lifecycle = Lifecycle::Created;
				Ok(())
			}
			| Lifecycle::Canceled => {
				self.lifecycle = Lifecycle::Canceled;
				Ok(())
			}
			| Lifecycle::Disposed => {
				self.lifecycle = Lifecycle::Disposed;
				Err(self.invalid_transition("stop"))
			}
		}
	}

	/// Abrupt shutdown without waiting.
	///
	/// The connection is closed before this returns, so no further message
	/// is routed to this listener. A handler invocation already in progress
	/// still runs to completion in the background. Safe before `start`.
	pub fn cancel(&mut self) {
		match mem::replace(&mut self.lifecycle, Lifecycle::Canceled) {
			| Lifecycle::Started(running) => {
				info!(subject = %self.subject, "Listener canceled");
				drop(running);
			}
			| Lifecycle::Created | Lifecycle::Canceled => {}
			| Lifecycle::Stopped => self.lifecycle = Lifecycle::Stopped,
			| Lifecycle::Disposed => self.lifecycle = Lifecycle::Disposed,
		}
	}

	/// Release everything the listener holds. Terminal; repeated calls and
	/// calls before `start` are no-ops.
	pub fn dispose(&mut self) {
		match mem::replace(&mut self.lifecycle, Lifecycle::Disposed) {
			| Lifecycle::Started(running) => {
				warn!(
					subject = %self.subject,
					"Disposing a started listener without stop()"
				);
				drop(running);
			}
			| Lifecycle::Disposed => {
				debug!(subject = %self.subject, "Listener already disposed");
			}
			| Lifecycle::Created | Lifecycle::Stopped | Lifecycle::Canceled => {}
		}
	}

	/// Wait until the dispatch task ends on its own, either because the
	/// broker closed the subscription or because of a fatal handler fault.
	/// The listener is `Stopped` afterwards. Returns immediately when not
	/// started.
	pub async fn wait(&mut self) -> Result<(), BindingError> {
		let Lifecycle::Started(running) = &mut self.lifecycle else {
			return Ok(());
		};
		let outcome = join_dispatch(&mut running.dispatch).await;
		let connection = running.connection.clone();
		self.lifecycle = Lifecycle::Stopped;
		connection.disconnect().await;
		outcome.map_err(BindingError::from)
	}

	fn invalid_transition(&self, operation: &'static str) -> BindingError {
		BindingError::InvalidTransition {
			operation,
			state: self.state(),
		}
	}
}

impl fmt::Debug for Listener {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Listener")
			.field("subject", &self.subject)
			.field("queue_group", &self.queue_group)
			.field("endpoint", &self.params.to_string())
			.field("state", &self.state())
			.finish()
	}
}

impl Drop for Listener {
	fn drop(&mut self) {
		if let Lifecycle::Started(_) = self.lifecycle {
			error!(
				subject = %self.subject,
				"Listener dropped while started. Call stop() or cancel() \
				 before dropping."
			);
		}
	}
}

async fn dispatch(
	mut stream: InboundStream,
	handler: Arc<dyn TriggerHandler>,
	connection: Connection,
	stop: CancellationToken,
	subject: ArcStr,
) -> Result<(), HandlerFault> {
	let outcome = loop {
		let message = tokio::select! {
			biased;
			_ = stop.cancelled() => {
				debug!(%subject, "Stop requested, leaving dispatch loop");
				break Ok(());
			}
			next = stream.next() => match next {
				| Some(message) => message,
				| None => {
					info!(%subject, "Subscription closed by broker");
					break Ok(());
				}
			},
		};

		trace!(
			%subject,
			payload_size = message.payload.len(),
			"Dispatching message"
		);
		let mut invocation =
			handler.execute(TriggerData::from(message), CancellationToken::new());
		let finished = tokio::select! {
			biased;
			result = &mut invocation => Some(result),
			_ = stop.cancelled() => None,
		};
		let result = match finished {
			| Some(result) => result,
			| None => {
				// Unsubscribe now; the handler itself is never interrupted.
				debug!(%subject, "Stop requested during invocation, unsubscribing");
				drop(stream);
				break settle(invocation.await, &subject);
			}
		};
		if let Err(fault) = settle(result, &subject) {
			break Err(fault);
		}
	};

	connection.disconnect().await;
	outcome
}

/// Log a failed invocation. Only fatal faults end the subscription.
fn settle(
	result: Result<(), HandlerFault>,
	subject: &ArcStr,
) -> Result<(), HandlerFault> {
	match result {
		| Ok(()) => Ok(()),
		| Err(fault) if fault.is_fatal() => {
			error!(%subject, error = %fault, "Handler fault ends subscription");
			Err(fault)
		}
		| Err(fault) => {
			warn!(%subject, error = %fault, "Handler invocation failed");
			Ok(())
		}
	}
}

async fn join_dispatch<F>(dispatch: F) -> Result<(), HandlerFault>
where F: Future<Output = Result<Result<(), HandlerFault>, JoinError>> {
	match dispatch.await {
		| Ok(outcome) => outcome,
		| Err(err) if err.is_panic() => {
			Err(HandlerFault::Panicked(panic_message(err.into_panic())))
		}
		| Err(_) => Ok(()),
	}
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
	match payload.downcast::<String>() {
		| Ok(message) => *message,
		| Err(payload) => payload
			.downcast_ref::<&'static str>()
			.map(|message| (*message).to_string())
			.unwrap_or_else(|| "unknown panic payload".to_string()),
	}
}
