//! `opflow` Client — REST client for opflow services.
//!
//! Wraps the envelope contract from `opflow-core`: [`Client`] performs
//! requests and decodes sync/async/error envelopes, [`EventListener`]
//! consumes the WebSocket event stream, and [`RemoteOperation`] tracks a
//! background operation through events with wait/cancel semantics
//! mirroring the server's lifecycle.

pub mod client;
pub mod error;
pub mod event_listener;
pub mod operation;
pub mod operations;

pub use client::{Client, ClientBuilder, DEFAULT_TRANSPORT_TIMEOUT};
pub use error::{Error, Result};
pub use event_listener::{EventListener, HandlerId};
pub use operation::RemoteOperation;
