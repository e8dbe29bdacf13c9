#![cfg_attr(docsrs, feature(doc_cfg))]
#![cfg_attr(docsrs, allow(unused_attributes))]

//! # circuit-guard
//!
//! An in-process circuit breaker that wraps an arbitrary fallible operation and
//! stops hammering a dependency that is currently failing, giving it time to
//! recover.
//!
//! The guard is a three-state machine: `Closed` (calls pass through), `Open`
//! (calls are rejected without touching the operation), and `HalfOpen` (a
//! single trial call probes whether the dependency has recovered). Failures
//! are counted consecutively since the last success; reaching the configured
//! threshold opens the circuit, and after the reset timeout has elapsed the
//! next call attempt is admitted as a trial.
//!
//! Generally, there are several steps when using the guard:
//! 1. Build a [`GuardConfig`] (or take the defaults).
//! 2. Construct a [`CircuitGuard`], optionally injecting
//!    [`StateChangeListener`]s for observability.
//! 3. Route every invocation of the protected operation through
//!    [`CircuitGuard::execute`].
//!
//! ```rust
//! use circuit_guard::{CircuitGuard, GuardConfig, GuardError};
//!
//! let guard = CircuitGuard::new(GuardConfig {
//!     failure_threshold: 3,
//!     reset_timeout_ms: 10_000,
//! })
//! .unwrap();
//!
//! match guard.execute(|| remote_call()) {
//!     Ok(value) => {
//!         // The operation ran and succeeded.
//!     }
//!     Err(GuardError::Inner(err)) => {
//!         // The operation ran and failed; `err` is the original error.
//!     }
//!     Err(GuardError::Rejected) => {
//!         // The circuit is open; the operation was not invoked.
//!     }
//! }
//! ```
//!
//! The guard performs no retries and imposes no timeout on the wrapped
//! operation; both are the caller's responsibility, layered on top.
//!
//! Optional features:
//! - `async`: adds [`CircuitGuard::execute_async`] for future-returning
//!   operations.
//! - `logger_env`: use `env_logger` to initialize logging.
//! - `logger_log4rs`: use `log4rs` to initialize logging.

pub mod core;
pub mod logging;
pub mod utils;

pub use crate::core::*;

pub type Result<T> = anyhow::Result<T>;
pub type Error = anyhow::Error;
