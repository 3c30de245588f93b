//! Network layer helpers.
//!
//! # Data Flow
//! ```text
//! Configured address
//!     → addr.rs (":8080" or "host:port" → SocketAddr)
//!     → driver binds it
//!     → tls.rs (optional certificate loading before bind)
//! ```
//!
//! # Design Decisions
//! - Certificate problems surface before any socket is opened
//! - TLS is optional and handled by the driver

pub mod addr;
pub mod tls;

pub use addr::parse_listen_addr;
