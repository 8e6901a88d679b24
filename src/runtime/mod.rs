//! Runtimes - the two interpreters the bridge connects
//!
//! Design: Neither runtime knows about the other. Each exposes:
//! - a value model with a `Foreign` variant for values owned elsewhere
//! - a trait (`HostForeign` / `GuestForeign`) the interop layer implements
//! - the shared `Signature` binder used for every call

pub mod signature;
pub mod host;
pub mod guest;

pub use signature::{CallArgs, CallFrame, Param, Signature};
