//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Upgrade request
//!     → dial.rs (TCP, or TLS via tls.rs, to the target authority)
//!     → connection.rs (tunnel ID + active tunnel count)
//!     → Hand off to relay::transfer
//! ```

pub mod connection;
pub mod dial;
pub mod tls;

pub use connection::{TunnelGuard, TunnelId, TunnelTracker};
pub use dial::{dial, BoxedStream, RawStream};
