//! Domain types and DTOs
//!
//! A vendor's category lives only on the vendor record; plan items reach it
//! through their vendor.

pub mod plans;
pub mod recommendation;
pub mod vendors;
