//! Caller identity.
//!
//! Authentication happens upstream; the gateway forwards the verified user
//! id in the `x-user-id` header.

pub mod context;
pub mod middleware;

pub use context::AuthContext;
pub use middleware::RequireUser;
