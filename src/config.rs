//! Subsystem configuration handed in by the host's configuration layer.
//!
//! Registration of the underlying configuration variables lives with the
//! host process bootstrap; this struct only carries the resolved values.

#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Signature of a routine to run once when a principal's context is
    /// first created.
    pub start_proc: Option<String>,
    /// Per-call evaluator step budget; `None` keeps the engine default.
    pub step_limit: Option<u64>,
}
