//! Stream channel: push records demultiplexed to subscribers
//!
//! A [`StreamClient`] owns its own connection, separate from the call
//! channel's. It needs the session id returned by `ApiClient::login`.

pub mod client;
pub mod codec;
pub mod registry;
pub mod types;

pub use client::{DispatcherState, StreamClient, Subscription};
pub use registry::{Consumer, SubscriptionKey};
pub use types::*;
