//! Broker connections
//!
//! Parsing connection strings, establishing sessions and sharing them
//! between output bindings.

pub mod cache;
/// Connection string and transport error types
pub mod error;
pub mod factory;
/// Connection handle shared by publishers and listeners
pub mod handle;
pub mod memory_broker;
pub mod nats_transport;
pub mod params;
pub mod transport;

#[cfg(test)]
mod memory_broker_tests;

pub use cache::ConnectionCache;
pub use error::{ConnectionStringError, TransportError};
pub use factory::ConnectionFactory;
pub use handle::Connection;
pub use memory_broker::MemoryBroker;
pub use nats_transport::NatsTransport;
pub use params::{ConnectionParams, DEFAULT_PORT};
pub use transport::{
	BrokerSession, BrokerTransport, InboundMessage, InboundStream,
};
