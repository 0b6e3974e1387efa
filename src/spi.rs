//! Query-execution collaborator interface and the logging pass-through.
//!
//! The subsystem never executes SQL itself; nested queries, prepared plans,
//! cursors and transaction control all go through [`QueryBackend`],
//! implemented by the host engine. Calls are synchronous and blocking by
//! design.

use crate::catalog::{Oid, RowDescriptor};
use crate::errors::PlScriptError;
use crate::storage::tuple::{Datum, RowValue};

/// Handle to a prepared plan owned by the backend.
pub type PlanId = u32;

/// Result of one statement executed through the backend.
#[derive(Debug, Clone, Default)]
pub struct SpiResult {
    pub processed: u64,
    /// Present when the statement returned rows.
    pub row_desc: Option<RowDescriptor>,
    pub rows: Vec<RowValue>,
}

/// The query-execution collaborator.
///
/// `connect`/`finish` bracket one routine invocation;
/// `begin_subtransaction`/`release_subtransaction`/`rollback_subtransaction`
/// manage the nested savepoints opened around every entry into the script
/// engine and every script-issued statement.
pub trait QueryBackend {
    fn connect(&mut self) -> Result<(), PlScriptError>;
    fn finish(&mut self);

    fn begin_subtransaction(&mut self) -> Result<(), PlScriptError>;
    fn release_subtransaction(&mut self) -> Result<(), PlScriptError>;
    fn rollback_subtransaction(&mut self);

    fn execute(&mut self, sql: &str, params: &[(Oid, Datum)])
    -> Result<SpiResult, PlScriptError>;

    fn prepare(&mut self, sql: &str, param_types: &[Oid]) -> Result<PlanId, PlScriptError>;
    fn plan_param_types(&self, plan: PlanId) -> Result<Vec<Oid>, PlScriptError>;
    fn execute_plan(
        &mut self,
        plan: PlanId,
        params: &[(Oid, Datum)],
    ) -> Result<SpiResult, PlScriptError>;
    fn free_plan(&mut self, plan: PlanId);

    fn cursor_open(
        &mut self,
        plan: PlanId,
        params: &[(Oid, Datum)],
    ) -> Result<String, PlScriptError>;
    fn cursor_fetch(
        &mut self,
        cursor: &str,
        forward: bool,
        count: u32,
    ) -> Result<SpiResult, PlScriptError>;
    fn cursor_move(&mut self, cursor: &str, forward: bool, count: u32)
    -> Result<(), PlScriptError>;
    fn cursor_close(&mut self, cursor: &str) -> Result<(), PlScriptError>;

    fn commit(&mut self) -> Result<(), PlScriptError>;
    fn rollback(&mut self) -> Result<(), PlScriptError>;
}

/// Severity for the script-side `log` pass-through, with the host engine's
/// numeric codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Debug5,
    Debug4,
    Debug3,
    Debug2,
    Debug1,
    Log,
    Info,
    Notice,
    Warning,
    Error,
}

impl LogLevel {
    pub fn code(self) -> i32 {
        match self {
            Self::Debug5 => 10,
            Self::Debug4 => 11,
            Self::Debug3 => 12,
            Self::Debug2 => 13,
            Self::Debug1 => 14,
            Self::Log => 15,
            Self::Info => 17,
            Self::Notice => 18,
            Self::Warning => 19,
            Self::Error => 21,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        Some(match code {
            10 => Self::Debug5,
            11 => Self::Debug4,
            12 => Self::Debug3,
            13 => Self::Debug2,
            14 => Self::Debug1,
            15 => Self::Log,
            17 => Self::Info,
            18 => Self::Notice,
            19 => Self::Warning,
            21 => Self::Error,
            _ => return None,
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Debug5 => "DEBUG5",
            Self::Debug4 => "DEBUG4",
            Self::Debug3 => "DEBUG3",
            Self::Debug2 => "DEBUG2",
            Self::Debug1 => "DEBUG1",
            Self::Log => "LOG",
            Self::Info => "INFO",
            Self::Notice => "NOTICE",
            Self::Warning => "WARNING",
            Self::Error => "ERROR",
        }
    }
}

/// Plain logging pass-through to the host's standard error channel.
pub trait MessageSink {
    fn emit(&mut self, level: LogLevel, message: &str);
}

/// Default sink writing to stderr.
#[derive(Debug, Default)]
pub struct StderrSink;

impl MessageSink for StderrSink {
    fn emit(&mut self, level: LogLevel, message: &str) {
        eprintln!("{}: {}", level.name(), message);
    }
}

#[cfg(test)]
mod tests {
    use super::LogLevel;

    #[test]
    fn level_codes_round_trip() {
        for level in [
            LogLevel::Debug5,
            LogLevel::Debug1,
            LogLevel::Log,
            LogLevel::Info,
            LogLevel::Notice,
            LogLevel::Warning,
            LogLevel::Error,
        ] {
            assert_eq!(LogLevel::from_code(level.code()), Some(level));
        }
        assert_eq!(LogLevel::from_code(16), None);
    }
}
