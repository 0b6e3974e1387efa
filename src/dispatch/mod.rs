//! Call dispatch: the state machine driving routine resolution, context and
//! function caching, compilation, execution and result conversion across
//! the four invocation modes.
//!
//! Every invoking branch opens the query-execution connection and a nested
//! savepoint before entering the script engine; on error the savepoint is
//! rolled back and the connection released before the error propagates.

use crate::cache::{CompiledFunctionEntry, ContextCache, ExecutionContext};
use crate::catalog::{
    Catalog, Oid, RECORDOID, ResultClass, RoutineDescriptor, RowAttribute, RowDescriptor,
    resolve_type,
};
use crate::config::Config;
use crate::errors::PlScriptError;
use crate::marshal::{
    check_column_coverage, datum_to_script, script_to_datum, script_to_row, script_to_row_into,
    tuple_to_script,
};
use crate::namespace::{self, CallHost};
use crate::script::compiler::parse_program;
use crate::script::executor::{Evaluator, InterruptFlag, NullHost};
use crate::script::value::{FuncId, ScriptValue};
use crate::spi::{MessageSink, QueryBackend, StderrSink};
use crate::storage::tuple::{Datum, RowValue, Tuplestore};
use crate::window::WindowPartition;

pub mod compile;


/// Accumulates rows for one set-returning call.
#[derive(Debug)]
pub struct ReturnState {
    pub store: Tuplestore,
    pub is_composite: bool,
}

/// Ephemeral per-invocation state, created on entry and destroyed on every
/// exit path. Published to natives through the call host so the emit-row
/// primitive can reach the return state.
#[derive(Debug, Default)]
pub struct CallFrame {
    pub routine: Option<RoutineDescriptor>,
    pub return_state: Option<ReturnState>,
}

/// Declared result shape at the call site.
#[derive(Debug, Clone, Default)]
pub struct CallSite {
    /// Concrete row descriptor for record-typed results, resolved from the
    /// call site's declared result type.
    pub result_row: Option<RowDescriptor>,
    /// Whether the call site can accept a materialized result set.
    pub accepts_set: bool,
}

impl CallSite {
    pub fn accepting_set() -> Self {
        Self {
            result_row: None,
            accepts_set: true,
        }
    }
}

/// Outcome of a dispatched call.
#[derive(Debug, Clone, PartialEq)]
pub enum CallResult {
    Value(Datum),
    Set {
        row_desc: RowDescriptor,
        rows: Vec<RowValue>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerTiming {
    Before,
    After,
}

impl TriggerTiming {
    fn name(self) -> &'static str {
        match self {
            Self::Before => "BEFORE",
            Self::After => "AFTER",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerLevel {
    Row,
    Statement,
}

impl TriggerLevel {
    fn name(self) -> &'static str {
        match self {
            Self::Row => "ROW",
            Self::Statement => "STATEMENT",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerOp {
    Insert,
    Update,
    Delete,
    Truncate,
}

impl TriggerOp {
    fn name(self) -> &'static str {
        match self {
            Self::Insert => "INSERT",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
            Self::Truncate => "TRUNCATE",
        }
    }
}

/// Event metadata for one trigger firing.
#[derive(Debug, Clone)]
pub struct TriggerEvent {
    pub name: String,
    pub timing: TriggerTiming,
    pub level: TriggerLevel,
    pub op: TriggerOp,
    pub relation_id: Oid,
    pub relation_name: String,
    pub schema_name: String,
    pub args: Vec<String>,
    /// Row descriptor of the relation the trigger fired on.
    pub row_desc: RowDescriptor,
    pub old_row: Option<RowValue>,
    pub new_row: Option<RowValue>,
}

/// The dispatcher: owns the execution-context cache and drives every call.
pub struct Runtime<'a> {
    catalog: &'a dyn Catalog,
    cache: ContextCache,
    config: Config,
    interrupt: InterruptFlag,
    sink: Box<dyn MessageSink>,
}

impl<'a> Runtime<'a> {
    pub fn new(catalog: &'a dyn Catalog, config: Config) -> Self {
        Self::with_sink(catalog, config, Box::new(StderrSink))
    }

    pub fn with_sink(
        catalog: &'a dyn Catalog,
        config: Config,
        sink: Box<dyn MessageSink>,
    ) -> Self {
        Self {
            catalog,
            cache: ContextCache::new(),
            config,
            interrupt: InterruptFlag::new(),
            sink,
        }
    }

    /// Handle for delivering a cooperative interrupt to a running call.
    pub fn interrupt(&self) -> InterruptFlag {
        self.interrupt.clone()
    }

    pub fn cache(&self) -> &ContextCache {
        &self.cache
    }

    /// Plain and set-returning calls.
    pub fn call(
        &mut self,
        spi: &mut dyn QueryBackend,
        routine_id: Oid,
        args: &[Datum],
        site: &CallSite,
    ) -> Result<CallResult, PlScriptError> {
        self.call_internal(spi, routine_id, args, site, None)
    }

    /// Window-function variant of the plain call: the partition surface is
    /// attached to the frame for the duration of the invocation.
    pub fn call_window(
        &mut self,
        spi: &mut dyn QueryBackend,
        routine_id: Oid,
        args: &[Datum],
        window: &mut dyn WindowPartition,
    ) -> Result<Datum, PlScriptError> {
        match self.call_internal(spi, routine_id, args, &CallSite::default(), Some(window))? {
            CallResult::Value(datum) => Ok(datum),
            CallResult::Set { .. } => Err(PlScriptError::resource(
                "window routine unexpectedly produced a row set",
            )),
        }
    }

    fn call_internal(
        &mut self,
        spi: &mut dyn QueryBackend,
        routine_id: Oid,
        args: &[Datum],
        site: &CallSite,
        window: Option<&mut dyn WindowPartition>,
    ) -> Result<CallResult, PlScriptError> {
        let routine = self.catalog.lookup_routine(routine_id)?;
        routine.validate()?;
        if routine.is_trigger {
            return Err(PlScriptError::resource(format!(
                "routine {} is a trigger and must be fired by a trigger event",
                routine.name
            )));
        }

        let principal = self.catalog.current_principal();
        self.ensure_context(spi, principal)?;
        let func = self.function_for(principal, &routine)?;
        let script_args = self.decode_args(&routine, args)?;

        if routine.is_set_returning {
            if !site.accepts_set {
                return Err(PlScriptError::resource(format!(
                    "set-returning routine {} called in a context that cannot accept a set",
                    routine.name
                )));
            }
            let (row_desc, is_composite) = self.set_result_descriptor(&routine, site)?;
            let mut frame = CallFrame {
                routine: Some(routine.clone()),
                return_state: Some(ReturnState {
                    store: Tuplestore::new(row_desc),
                    is_composite,
                }),
            };
            let result = self.invoke(spi, principal, func, &mut frame, &script_args, window)?;
            let mut state = frame.return_state.take().expect("return state set above");
            // A non-nullish return value is appended after the emitted
            // rows; an array return appends one row per element.
            if !result.is_nullish() {
                match result {
                    ScriptValue::Array(items) => {
                        for item in &items {
                            self.append_result_row(item, &mut state)?;
                        }
                    }
                    other => self.append_result_row(&other, &mut state)?,
                }
            }
            Ok(CallResult::Set {
                row_desc: state.store.row_desc().clone(),
                rows: state.store.into_rows(),
            })
        } else {
            let mut frame = CallFrame {
                routine: Some(routine.clone()),
                return_state: None,
            };
            let result = self.invoke(spi, principal, func, &mut frame, &script_args, window)?;
            let datum = if routine.return_type == RECORDOID {
                // Record-typed returns resolve a concrete row descriptor
                // from the call site first.
                let desc = site
                    .result_row
                    .clone()
                    .or_else(|| self.catalog.row_descriptor(routine.return_type))
                    .ok_or_else(|| {
                        PlScriptError::resource(format!(
                            "record-returning routine {} requires a declared result row",
                            routine.name
                        ))
                    })?;
                let (row, is_null) = script_to_row(&result, &desc, self.catalog)?;
                if is_null { Datum::Null } else { Datum::Row(row) }
            } else {
                let (datum, is_null) = script_to_datum(&result, routine.return_type, self.catalog)?;
                if is_null { Datum::Null } else { datum }
            };
            Ok(CallResult::Value(datum))
        }
    }

    /// Trigger calls: builds the ten trigger arguments from event metadata.
    /// A null or undefined result leaves the triggering row unmodified;
    /// any other result is decoded as a composite row and substituted.
    pub fn call_trigger(
        &mut self,
        spi: &mut dyn QueryBackend,
        routine_id: Oid,
        event: &TriggerEvent,
    ) -> Result<Option<RowValue>, PlScriptError> {
        let routine = self.catalog.lookup_routine(routine_id)?;
        routine.validate()?;
        if !routine.is_trigger {
            return Err(PlScriptError::resource(format!(
                "routine {} is not a trigger",
                routine.name
            )));
        }

        let principal = self.catalog.current_principal();
        self.ensure_context(spi, principal)?;
        let func = self.function_for(principal, &routine)?;
        let args = self.trigger_args(event)?;

        let mut frame = CallFrame {
            routine: Some(routine),
            return_state: None,
        };
        let result = self.invoke(spi, principal, func, &mut frame, &args, None)?;
        if result.is_nullish() {
            return Ok(None);
        }
        let (row, is_null) = script_to_row(&result, &event.row_desc, self.catalog)?;
        Ok(if is_null { None } else { Some(row) })
    }

    /// Inline (anonymous) blocks: wrap, compile, invoke with no arguments,
    /// discard the result.
    pub fn run_inline(
        &mut self,
        spi: &mut dyn QueryBackend,
        source: &str,
    ) -> Result<(), PlScriptError> {
        let principal = self.catalog.current_principal();
        self.ensure_context(spi, principal)?;
        let program = parse_program(&compile::synthesize_inline_source(source))?;

        let mut frame = CallFrame::default();
        let context = self
            .cache
            .get_mut(principal)
            .expect("context ensured above");
        let ExecutionContext {
            script, functions, ..
        } = context;

        spi.connect()?;
        if let Err(err) = spi.begin_subtransaction() {
            spi.finish();
            return Err(err);
        }
        let mut host = CallHost {
            catalog: self.catalog,
            spi: &mut *spi,
            sink: &mut *self.sink,
            frame: &mut frame,
            functions,
            window: None,
        };
        let result = Evaluator::new(script, &mut host).eval_program(&program);
        drop(host);
        finish_invocation(spi, result).map(|_| ())
    }

    /// Compile-only validation: the synthesized source is parsed in
    /// isolation and no cache entry is created or mutated.
    pub fn validate(&self, routine_id: Oid) -> Result<(), PlScriptError> {
        let routine = self.catalog.lookup_routine(routine_id)?;
        routine.validate()?;
        parse_program(&compile::synthesize_function_source(&routine))?;
        Ok(())
    }

    /// Drops one principal's compiled-function table.
    pub fn invalidate(&mut self, principal: Oid) {
        self.cache.invalidate(principal);
    }

    /// Drops every context and cache entry; used after any routine
    /// (re)definition so no stale compiled body survives.
    pub fn invalidate_all(&mut self) {
        self.cache.invalidate_all();
    }

    fn ensure_context(
        &mut self,
        spi: &mut dyn QueryBackend,
        principal: Oid,
    ) -> Result<(), PlScriptError> {
        if self.cache.contains(principal) {
            return Ok(());
        }
        let mut context = ExecutionContext::new(principal, self.interrupt.clone(), &self.config);
        namespace::install(&mut context.script);
        if let Some(signature) = self.config.start_proc.clone() {
            // A failed bootstrap discards the partially built context and
            // leaves the cache unmodified.
            self.run_bootstrap(spi, &mut context, &signature)
                .map_err(|err| {
                    PlScriptError::resource(format!(
                        "bootstrap routine {signature} failed: {err}"
                    ))
                })?;
        }
        self.cache.insert(context)
    }

    fn run_bootstrap(
        &mut self,
        spi: &mut dyn QueryBackend,
        context: &mut ExecutionContext,
        signature: &str,
    ) -> Result<(), PlScriptError> {
        let routine_id = self.catalog.resolve_routine(signature).ok_or_else(|| {
            PlScriptError::resource(format!("bootstrap routine {signature} does not exist"))
        })?;
        let routine = self.catalog.lookup_routine(routine_id)?;
        let func = compile::compile_routine(&mut context.script, &mut NullHost, &routine)?;
        context.functions.insert(
            routine_id,
            CompiledFunctionEntry {
                routine: routine.clone(),
                func,
            },
        );

        let mut frame = CallFrame {
            routine: Some(routine),
            return_state: None,
        };
        let ExecutionContext {
            script, functions, ..
        } = context;

        spi.connect()?;
        if let Err(err) = spi.begin_subtransaction() {
            spi.finish();
            return Err(err);
        }
        let mut host = CallHost {
            catalog: self.catalog,
            spi: &mut *spi,
            sink: &mut *self.sink,
            frame: &mut frame,
            functions,
            window: None,
        };
        let result = Evaluator::new(script, &mut host).call(func, &[]);
        drop(host);
        finish_invocation(spi, result).map(|_| ())
    }

    /// Cache hit returns the existing entry; a miss compiles and stores the
    /// entry all-or-nothing, so a failed compile mutates nothing.
    fn function_for(
        &mut self,
        principal: Oid,
        routine: &RoutineDescriptor,
    ) -> Result<FuncId, PlScriptError> {
        let context = self.cache.get_mut(principal).ok_or_else(|| {
            PlScriptError::resource(format!("no execution context for principal {principal}"))
        })?;
        if let Some(entry) = context.function(routine.routine_id) {
            return Ok(entry.func);
        }
        let ExecutionContext {
            script, functions, ..
        } = context;
        let func = compile::compile_routine(script, &mut NullHost, routine)?;
        functions.insert(
            routine.routine_id,
            CompiledFunctionEntry {
                routine: routine.clone(),
                func,
            },
        );
        Ok(func)
    }

    fn decode_args(
        &self,
        routine: &RoutineDescriptor,
        args: &[Datum],
    ) -> Result<Vec<ScriptValue>, PlScriptError> {
        let in_args: Vec<(usize, Oid, Option<&str>)> = routine.in_args().collect();
        if in_args.len() != args.len() {
            return Err(PlScriptError::resource(format!(
                "routine {} expected {} arguments but got {}",
                routine.name,
                in_args.len(),
                args.len()
            )));
        }
        let mut script_args = Vec::with_capacity(args.len());
        for ((_, type_oid, _), datum) in in_args.iter().zip(args) {
            if datum.is_null() {
                script_args.push(ScriptValue::Null);
            } else {
                let desc = resolve_type(self.catalog, *type_oid)?;
                script_args.push(datum_to_script(datum, &desc, self.catalog)?);
            }
        }
        Ok(script_args)
    }

    /// Result-buffer shape for a set-returning call: the call site's
    /// declared row, the routine's composite return type, or a one-column
    /// wrap of its scalar return type.
    fn set_result_descriptor(
        &self,
        routine: &RoutineDescriptor,
        site: &CallSite,
    ) -> Result<(RowDescriptor, bool), PlScriptError> {
        if let Some(desc) = &site.result_row {
            return Ok((desc.clone(), true));
        }
        if let Some(desc) = self.catalog.row_descriptor(routine.return_type) {
            return Ok((desc, true));
        }
        if routine.result_class == ResultClass::Composite {
            return Err(PlScriptError::resource(format!(
                "set-returning routine {} requires a declared result row",
                routine.name
            )));
        }
        Ok((
            RowDescriptor::new(vec![RowAttribute::new(
                routine.name.clone(),
                routine.return_type,
            )]),
            false,
        ))
    }

    fn append_result_row(
        &self,
        value: &ScriptValue,
        state: &mut ReturnState,
    ) -> Result<(), PlScriptError> {
        if state.is_composite {
            check_column_coverage(value, state.store.row_desc())?;
            script_to_row_into(value, self.catalog, &mut state.store)
        } else {
            let column = state.store.row_desc().attrs[0].clone();
            let (datum, is_null) = script_to_datum(value, column.type_oid, self.catalog)?;
            state
                .store
                .put_row(RowValue::new(vec![if is_null { Datum::Null } else { datum }]))
        }
    }

    fn trigger_args(&self, event: &TriggerEvent) -> Result<Vec<ScriptValue>, PlScriptError> {
        let decode = |row: &Option<RowValue>| -> Result<ScriptValue, PlScriptError> {
            match row {
                Some(row) => tuple_to_script(row, &event.row_desc, self.catalog),
                None => Ok(ScriptValue::Undefined),
            }
        };
        let (new_value, old_value) = if event.level == TriggerLevel::Row {
            match event.op {
                TriggerOp::Insert => (decode(&event.new_row)?, ScriptValue::Undefined),
                TriggerOp::Delete => (ScriptValue::Undefined, decode(&event.old_row)?),
                TriggerOp::Update => (decode(&event.new_row)?, decode(&event.old_row)?),
                TriggerOp::Truncate => (ScriptValue::Undefined, ScriptValue::Undefined),
            }
        } else {
            (ScriptValue::Undefined, ScriptValue::Undefined)
        };
        Ok(vec![
            new_value,
            old_value,
            ScriptValue::String(event.name.clone()),
            ScriptValue::String(event.timing.name().to_string()),
            ScriptValue::String(event.level.name().to_string()),
            ScriptValue::String(event.op.name().to_string()),
            ScriptValue::Number(f64::from(event.relation_id)),
            ScriptValue::String(event.relation_name.clone()),
            ScriptValue::String(event.schema_name.clone()),
            ScriptValue::Array(
                event
                    .args
                    .iter()
                    .map(|arg| ScriptValue::String(arg.clone()))
                    .collect(),
            ),
        ])
    }

    fn invoke(
        &mut self,
        spi: &mut dyn QueryBackend,
        principal: Oid,
        func: FuncId,
        frame: &mut CallFrame,
        args: &[ScriptValue],
        mut window: Option<&mut dyn WindowPartition>,
    ) -> Result<ScriptValue, PlScriptError> {
        let context = self.cache.get_mut(principal).ok_or_else(|| {
            PlScriptError::resource(format!("no execution context for principal {principal}"))
        })?;
        let ExecutionContext {
            script, functions, ..
        } = context;

        spi.connect()?;
        if let Err(err) = spi.begin_subtransaction() {
            spi.finish();
            return Err(err);
        }
        let mut host = CallHost {
            catalog: self.catalog,
            spi: &mut *spi,
            sink: &mut *self.sink,
            frame,
            functions,
            window: window.as_deref_mut(),
        };
        let result = Evaluator::new(script, &mut host).call(func, args);
        drop(host);
        finish_invocation(spi, result)
    }
}

/// Closes out one entry into the script engine: the savepoint is released
/// on success and rolled back on error, and the connection is released on
/// every path before the result propagates.
fn finish_invocation(
    spi: &mut dyn QueryBackend,
    result: Result<ScriptValue, PlScriptError>,
) -> Result<ScriptValue, PlScriptError> {
    match result {
        Ok(value) => {
            let released = spi.release_subtransaction();
            spi.finish();
            released.map(|()| value)
        }
        Err(err) => {
            spi.rollback_subtransaction();
            spi.finish();
            Err(err)
        }
    }
}
