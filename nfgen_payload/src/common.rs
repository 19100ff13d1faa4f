//! Common elements shared between payload modules.

pub mod config;
