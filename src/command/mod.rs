//! Command execution for the power control worker
//!
//! This module handles:
//! - Dispatching dequeued commands to their handlers
//! - Signing and sending output power requests
//! - Retry and session recovery for each output command

pub mod control;
mod executor;
pub mod handlers;

pub use executor::{CommandExecutor, CommandOutcome};
