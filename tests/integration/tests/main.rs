//! End-to-end integration tests.
//!
//! Each test starts the real server on an ephemeral port, federated with a
//! mock service provider, and drives it over HTTP.

mod artifact;
mod common;
mod health;
mod metadata;
mod single_logout;
