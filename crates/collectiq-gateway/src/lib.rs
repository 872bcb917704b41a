//! Carrier-facing gateway for CollectIQ voice calls.
//!
//! Serves the voice webhook that points an answered call at our media-stream
//! websocket, then runs one [`session::CallSession`] per stream: inbound
//! audio goes to live transcription, debounced caller turns go to the
//! dialogue engine, and each response is synthesized and paced back onto
//! the call before its action is carried out.

pub mod carrier;
pub mod connection;
pub mod executor;
#[cfg(feature = "metrics")]
pub mod metrics;
pub mod server;
pub mod session;
pub mod sink;
pub mod speaker;
pub mod state;
pub mod twiml;

pub use executor::CallOutcome;
pub use server::{router, start_gateway};
pub use state::{CallServices, GatewayState, SessionSettings};
