//! Channel Handlers
//!
//! The protocol core: per-role packet handlers for the provider and
//! consumer channels, plus the shared authorization check.

pub mod auth;
pub mod consumer;
pub mod provider;
