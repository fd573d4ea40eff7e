//! Core context state machine driving one PubNub transaction at a
//! time: DNS resolution, transport, HTTP, crypto and response parsing,
//! wired together by `Context` the way the original C core's
//! `pubnub_context` structure does, but expressed as Rust collaborator
//! traits (`Clock`, `Resolver`, `Transport`, `Prng`) the caller can
//! substitute — for tests, or for a platform without `std::net`.

pub mod clock;
pub mod config;
pub mod crypto;
pub mod dns;
pub mod error;
pub mod http;
mod json_scan;
pub mod message;
pub mod operations;
pub mod parser;
pub mod pool;
pub mod state_machine;
pub mod transport;

pub use config::PubnubConfig;
pub use error::ResultCode;
pub use message::{Message, MessageType, Timetoken};
pub use state_machine::Context;
