//! Protocol message types.
//!
//! Logout and artifact messages with their canonical XML form, status codes,
//! name identifiers and the requested authentication context of an
//! authentication request.

mod artifact;
mod authn_context;
mod constants;
mod logout;
mod message;
mod name_id;
mod status;

pub use artifact::*;
pub use authn_context::*;
pub use constants::*;
pub use logout::{LogoutRequest, LogoutResponse};
pub use message::*;
pub use name_id::*;
pub use status::*;
