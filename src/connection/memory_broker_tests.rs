//! Tests for the in-process broker

use std::time::Duration;

use bytes::Bytes;
use futures::StreamExt;

use super::error::TransportError;
use super::memory_broker::{MemoryBroker, subject_matches};
use super::params::ConnectionParams;
use super::transport::{BrokerSession, BrokerTransport};
use crate::config::BindingSettings;

async fn open(broker: &MemoryBroker) -> std::sync::Arc<dyn BrokerSession> {
	broker
		.connect(&ConnectionParams::new("localhost", 4222), &BindingSettings::default())
		.await
		.unwrap()
}

#[test]
fn test_subject_matching() {
	assert!(subject_matches("orders", "orders"));
	assert!(!subject_matches("orders", "orders.created"));
	assert!(subject_matches("orders.*", "orders.created"));
	assert!(!subject_matches("orders.*", "orders"));
	assert!(!subject_matches("orders.*", "orders.created.eu"));
	assert!(subject_matches("orders.>", "orders.created.eu"));
	assert!(!subject_matches("orders.>", "orders"));
	assert!(subject_matches("*.created", "orders.created"));
	assert!(!subject_matches("orders.>.eu", "orders.created.eu"));
}

#[tokio::test]
async fn test_plain_subscribers_all_receive() {
	let broker = MemoryBroker::new();
	let session = open(&broker).await;
	let mut first = session.subscribe("echo", None).await.unwrap();
	let mut second = session.subscribe("echo", Some("")).await.unwrap();

	session
		.publish("echo", Bytes::from_static(b"hello"), Some("inbox.1"))
		.await
		.unwrap();

	let a = first.next().await.unwrap();
	let b = second.next().await.unwrap();
	assert_eq!(a.payload_as_str(), "hello");
	assert_eq!(a.reply_to.as_deref(), Some("inbox.1"));
	assert_eq!(b.subject.as_str(), "echo");
}

#[tokio::test]
async fn test_queue_group_delivers_once_per_group() {
	let broker = MemoryBroker::new();
	let session = open(&broker).await;
	let mut first = session.subscribe("orders", Some("workers")).await.unwrap();
	let mut second = session.subscribe("orders", Some("workers")).await.unwrap();

	for i in 0 .. 10 {
		session
			.publish("orders", Bytes::from(format!("order-{i}")), None)
			.await
			.unwrap();
	}
	session.disconnect().await;

	let first: Vec<_> = first.collect().await;
	let second: Vec<_> = second.collect().await;
	assert_eq!(first.len() + second.len(), 10);
	assert_eq!(first.len(), 5);
	assert_eq!(second.len(), 5);
}

#[tokio::test]
async fn test_disconnect_ends_streams_and_rejects_operations() {
	let broker = MemoryBroker::new();
	let session = open(&broker).await;
	let mut stream = session.subscribe("echo", None).await.unwrap();
	assert_eq!(broker.subscription_count("echo").await, 1);

	session.disconnect().await;
	session.disconnect().await;

	assert!(session.is_closed());
	assert!(stream.next().await.is_none());
	assert_eq!(broker.subscription_count("echo").await, 0);
	assert!(matches!(
		session.publish("echo", Bytes::new(), None).await,
		Err(TransportError::Closed)
	));
	assert!(matches!(
		session.subscribe("echo", None).await,
		Err(TransportError::Closed)
	));
}

#[tokio::test]
async fn test_close_stops_routing_before_returning() {
	let broker = MemoryBroker::new();
	let closing = open(&broker).await;
	let staying = open(&broker).await;
	let mut closed_stream =
		closing.subscribe("orders", Some("workers")).await.unwrap();
	let remaining = staying.subscribe("orders", Some("workers")).await.unwrap();

	closing.close();
	closing.close();
	assert!(closing.is_closed());
	assert_eq!(broker.subscription_count("orders").await, 1);

	for i in 0 .. 6 {
		staying
			.publish("orders", Bytes::from(format!("order-{i}")), None)
			.await
			.unwrap();
	}
	staying.disconnect().await;

	let received: Vec<String> = remaining
		.map(|message| message.payload_as_str())
		.collect()
		.await;
	assert_eq!(received.len(), 6);
	assert_eq!(received[0], "order-0");
	assert!(closed_stream.next().await.is_none());

	// disconnect after close has nothing left to do
	closing.disconnect().await;
	assert!(closing.is_closed());
}

#[tokio::test]
async fn test_dropped_stream_is_unsubscribed() {
	let broker = MemoryBroker::new();
	let session = open(&broker).await;
	let stream = session.subscribe("echo", None).await.unwrap();
	drop(stream);

	assert_eq!(broker.subscription_count("echo").await, 0);
	session
		.publish("echo", Bytes::from_static(b"nobody"), None)
		.await
		.unwrap();
}

#[tokio::test]
async fn test_credentials_are_enforced() {
	let broker = MemoryBroker::with_credentials("alice", "secret");
	let settings = BindingSettings::default();

	let anonymous = broker
		.connect(&ConnectionParams::new("localhost", 4222), &settings)
		.await;
	assert!(matches!(anonymous, Err(TransportError::Connect { .. })));

	let wrong = ConnectionParams::new("localhost", 4222)
		.with_credentials("alice", "guess");
	assert!(broker.connect(&wrong, &settings).await.is_err());

	let right = ConnectionParams::new("localhost", 4222)
		.with_credentials("alice", "secret");
	assert!(broker.connect(&right, &settings).await.is_ok());
	assert_eq!(broker.connect_count(), 3);
}

#[tokio::test]
async fn test_unreachable_broker() {
	let broker = MemoryBroker::new();
	broker.set_reachable(false);
	let result = broker
		.connect(&ConnectionParams::new("localhost", 4222), &BindingSettings::default())
		.await;
	assert!(matches!(result, Err(TransportError::Connect { .. })));

	broker.set_reachable(true);
	assert!(open(&broker).await.flush().await.is_ok());
}

#[tokio::test]
async fn test_full_buffer_throttles_publisher() {
	let broker = MemoryBroker::new();
	let settings = BindingSettings {
		subscription_capacity: 1,
		..BindingSettings::default()
	};
	let session = broker
		.connect(&ConnectionParams::new("localhost", 4222), &settings)
		.await
		.unwrap();
	let mut stream = session.subscribe("slow", None).await.unwrap();

	session.publish("slow", Bytes::from_static(b"1"), None).await.unwrap();
	let blocked = tokio::time::timeout(
		Duration::from_millis(50),
		session.publish("slow", Bytes::from_static(b"2"), None),
	)
	.await;
	assert!(blocked.is_err(), "second publish should wait for buffer room");

	assert_eq!(stream.next().await.unwrap().payload_as_str(), "1");
}
