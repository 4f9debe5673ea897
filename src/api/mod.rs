//! Call channel: request/response commands over a single connection
//!
//! Typed operations live in `account`, `market_data` and `trading` as
//! methods on [`ApiClient`].

pub mod account;
pub mod client;
pub mod codec;
pub mod market_data;
pub mod trading;
pub mod types;

pub use client::ApiClient;
pub use types::*;
