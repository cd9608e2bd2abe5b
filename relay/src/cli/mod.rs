//! CLI support
//!
//! Configuration loading for the relay binary.

pub mod config;
