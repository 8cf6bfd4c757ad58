//! Local read interface: decrypted content over HTTP, gated by per-content
//! tokens, plus the raw block endpoint peers fetch from.

pub mod api;
pub mod auth;
pub mod error;

pub use api::{build_blocks_router, build_router, serve, serve_blocks, GatewayState};
pub use auth::GatewayAuth;
pub use error::GatewayError;
