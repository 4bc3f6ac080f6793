//! Command-line interface for running a misbehaving server by hand.

pub mod args;
pub mod commands;
