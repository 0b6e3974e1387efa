//! plscript: a trusted procedural-language subsystem for a relational
//! engine.
//!
//! Routines written in a small JavaScript-like scripting language are
//! compiled once per security principal, cached, and invoked through a
//! dispatcher covering plain, trigger, inline-block and set-returning
//! calls, with full bidirectional value marshaling between the engine's
//! typed values and script values.

#![allow(
    clippy::module_name_repetitions,
    clippy::too_many_lines,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_possible_wrap,
    clippy::cast_precision_loss,
    clippy::cast_lossless,
    clippy::match_same_arms,
    clippy::missing_errors_doc,
    clippy::must_use_candidate
)]

pub mod cache;
pub mod catalog;
pub mod config;
pub mod dispatch;
pub mod errors;
pub mod marshal;
pub mod modules;
pub mod namespace;
pub mod script;
pub mod spi;
pub mod storage;
pub mod utils;
pub mod window;

pub use cache::{CompiledFunctionEntry, ContextCache, ExecutionContext};
pub use catalog::{Catalog, MemoryCatalog, Oid, RoutineDescriptor, RowDescriptor, TypeDescriptor};
pub use config::Config;
pub use dispatch::{CallResult, CallSite, Runtime, TriggerEvent};
pub use errors::PlScriptError;
pub use script::{InterruptFlag, ScriptValue};
pub use spi::{LogLevel, MessageSink, QueryBackend, SpiResult};
pub use storage::tuple::{Datum, RowValue, Tuplestore};
pub use window::{WindowLocalStorage, WindowPartition};
