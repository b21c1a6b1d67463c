//! gatekeep - Streaming chat relay with inline DLP screening
//!
//! This crate provides an HTTP relay that forwards chat conversations to a
//! remote generation gateway, streams the model output back, and screens
//! that output for policy-trigger terms on the way through.

pub mod chat;
pub mod config;
pub mod error;
pub mod policy;
pub mod relay;
pub mod server;
pub mod upstream;

pub use error::RelayError;
