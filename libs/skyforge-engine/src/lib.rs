//! Execution engine for SkyForge.
//!
//! Turns a `(language, source)` pair into a normalized `ExecutionResult`:
//! the local Docker sandbox first, then remote providers when the daemon is
//! unreachable.

pub mod command;
pub mod error;
pub mod orchestrator;
pub mod providers;
pub mod registry;
pub mod runtime;
pub mod sandbox;
pub mod tier;

pub use error::{ExecutionError, ProviderError, RuntimeError};
pub use orchestrator::Orchestrator;
pub use sandbox::{Sandbox, SandboxSettings};
pub use tier::{ExecutionTier, TierOutput};
