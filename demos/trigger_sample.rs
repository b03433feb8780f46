//! # Trigger sample
//!
//! Listens on `SampleChannel` as a member of the `SampleGroup` queue group
//! and logs every message. Start several copies to watch the broker spread
//! messages across the group.
//!
//! ```bash
//! NatsConnection=nats://localhost:4222 cargo run --example trigger_sample
//! ```

mod shared;

use nats_bindings::prelude::*;
use tracing::info;

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
	shared::tracing::setup(None);
	shared::config::require_connection()?;

	let registry =
		BindingRegistry::nats(shared::config::settings("trigger_sample"));
	let config =
		TriggerConfig::new(shared::config::CONNECTION_VARIABLE, "SampleChannel")
			.with_queue_group("SampleGroup");

	let mut listener = registry.trigger(
		&config,
		|data: TriggerData, _cancel: CancellationToken| async move {
			info!(message = %data.value, "Message received from SampleChannel");
			Ok::<(), HandlerFault>(())
		},
	)?;
	listener.start().await?;
	info!("Listening on SampleChannel, press Ctrl+C to stop");

	let interrupted = tokio::select! {
		result = listener.wait() => {
			result?;
			info!("Subscription closed by the server");
			false
		}
		_ = tokio::signal::ctrl_c() => true,
	};
	if interrupted {
		listener.stop().await?;
	}

	listener.dispose();
	Ok(())
}
