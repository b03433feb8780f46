//! Trigger bindings
//!
//! Subscribing to a subject and invoking a handler for every message, one at
//! a time.

pub mod handler;
pub mod listener;


pub use handler::{HandlerFault, TriggerData, TriggerHandler};
pub use listener::{Listener, ListenerState};
