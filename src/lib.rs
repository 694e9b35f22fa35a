//! A single long-lived, multiplexed HTTP/2 client connection specialized
//! for APNs-style traffic: small JSON POSTs, issued concurrently by many
//! callers, each with its own deadline, all riding one TLS+HTTP/2 socket.
//!
//! The connection pool, JWT/credential construction, and the APNs payload
//! schema are all out of scope here — see [`Connection`] for the one thing
//! this crate does: own the socket, the HTTP/2 engine, and the per-stream
//! bookkeeping that makes concurrent `post` calls safe.

mod connection;
mod error;
mod proto;
mod request;
mod response;
mod tls;

pub use connection::{Connection, State};
pub use error::{Error, Result};
pub use request::{Request, RequestError, MAX_NOTIFICATION_PAYLOAD_SIZE};
pub use response::Response;
pub use tls::default_tls_config;

pub use proto::{CONNECTION_WINDOW_SIZE, MAX_RESPONSE_SIZE, REQUIRED_FREE_SPACE};
