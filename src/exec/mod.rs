//! The tool execution pipeline: per-tool failure isolation (breaker),
//! subprocess supervision, and the orchestrating runner.

pub mod breaker;
pub mod runner;
pub mod supervisor;

pub use breaker::{BreakerConfig, BreakerState, CircuitBreaker};
pub use runner::ToolRunner;
pub use supervisor::OutputLimits;
