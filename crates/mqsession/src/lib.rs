//! mqsession - Durable client sessions for a QoS 0/1 broker.
//!
//! The crate is the session core of a publish/subscribe broker. It knows
//! nothing about sockets or packet encoding; the connection layer drives it:
//!
//! - [`Manager::connect`] / [`Manager::disconnect`] on client (dis)connect.
//! - [`Session::subscribe`] / [`Session::unsubscribe`] for SUBSCRIBE and
//!   UNSUBSCRIBE.
//! - [`MemoryExchange::route`] (or [`Session::push`]) for inbound publishes.
//! - [`Session::next_qos0`] / [`Session::next_qos1`] to drain deliveries,
//!   and [`Session::acknowledge`] for PUBACK.
//!
//! State for non-clean sessions lives in a fjall database so it survives
//! disconnects and restarts.

pub mod auth;
pub mod cache;
pub mod config;
pub mod error;
pub mod exchange;
pub mod manager;
pub mod persistence;
pub mod queue;
pub mod session;

pub use auth::{Action, Authorize};
pub use crate::config::Config;
pub use error::{Error, Result};
pub use exchange::{Exchange, MemoryExchange};
pub use manager::Manager;
pub use queue::{Delivery, Queue, QueueError};
pub use session::{Info, Session, Subscription};

pub use mqsession_core::{Event, Message, QoS};
