//! # Output binding sample
//!
//! Publishes the command-line arguments to `SampleChannelOut`, one message
//! per argument. Run `trigger_sample` with a matching subject, or
//! `nats sub SampleChannelOut`, to see them arrive.
//!
//! ```bash
//! NatsConnection=nats://localhost:4222 cargo run --example bindings_sample -- hello world
//! ```

mod shared;

use nats_bindings::prelude::*;
use tracing::info;

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
	shared::tracing::setup(None);
	shared::config::require_connection()?;

	let registry =
		BindingRegistry::nats(shared::config::settings("bindings_sample"));
	let config =
		OutputConfig::new(shared::config::CONNECTION_VARIABLE, "SampleChannelOut");
	let publisher = registry.output(&config).await?;

	let mut messages: Vec<String> = std::env::args().skip(1).collect();
	if messages.is_empty() {
		messages.push("hello from nats-bindings".to_string());
	}
	for message in &messages {
		publisher.add(message.as_str()).await?;
		info!(subject = %publisher.subject(), %message, "Published");
	}

	// Cached connections write asynchronously; flush before tearing down.
	publisher.connection().flush().await?;
	registry.shutdown().await;
	Ok(())
}
