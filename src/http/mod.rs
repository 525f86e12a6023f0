//! HTTP host subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request ID, tracing)
//!     → plugin chain (each plugin told whether the request was already serviced)
//!     → plugin response, or 502 from response.rs
//!     → Send to client
//! ```

pub mod request;
pub mod response;
pub mod server;

pub use request::RequestIdExt;
pub use response::plain_error;
pub use server::HttpServer;
