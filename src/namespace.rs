//! The embedding namespace exposed to script code, and the native-function
//! dispatch behind it.
//!
//! Every context gets a global `plscript` object carrying logging, query
//! access, transaction control, routine lookup, set-returning emission and
//! the window surface. Natives never recover call state from ambient
//! globals: the active [`CallFrame`] and the collaborators are threaded in
//! explicitly through [`CallHost`].

use std::collections::{BTreeMap, HashMap};

use crate::cache::CompiledFunctionEntry;
use crate::catalog::{
    BOOLOID, BYTEAOID, Catalog, INT4OID, INT8OID, JSONBOID, Oid, TEXTOID, TIMESTAMPTZOID,
    resolve_type, type_oid_from_name,
};
use crate::dispatch::CallFrame;
use crate::dispatch::compile;
use crate::errors::PlScriptError;
use crate::marshal::{
    check_column_coverage, datum_to_script, script_to_datum, script_to_row_into, tuple_to_script,
};
use crate::script::executor::{NativeHost, NullHost, ScriptContext};
use crate::script::value::{NativeTag, ScriptValue};
use crate::spi::{LogLevel, MessageSink, PlanId, QueryBackend, SpiResult};
use crate::storage::tuple::{Datum, RowValue};
use crate::window::{SEEK_CURRENT, SEEK_HEAD, SEEK_TAIL, SeekOrigin, WindowPartition};

/// Name of the namespace global installed into every context.
pub const NAMESPACE_GLOBAL: &str = "plscript";

/// Installs the namespace object and the log-level constants into a fresh
/// context.
pub fn install(ctx: &mut ScriptContext) {
    let mut ns = BTreeMap::new();
    ns.insert(
        "toString".to_string(),
        ScriptValue::Native(NativeTag::NamespaceToString),
    );
    ns.insert(
        "version".to_string(),
        ScriptValue::String(env!("CARGO_PKG_VERSION").to_string()),
    );
    ns.insert("log".to_string(), ScriptValue::Native(NativeTag::Log));
    ns.insert("execute".to_string(), ScriptValue::Native(NativeTag::Execute));
    ns.insert("prepare".to_string(), ScriptValue::Native(NativeTag::Prepare));
    ns.insert("commit".to_string(), ScriptValue::Native(NativeTag::Commit));
    ns.insert("rollback".to_string(), ScriptValue::Native(NativeTag::Rollback));
    ns.insert(
        "findRoutine".to_string(),
        ScriptValue::Native(NativeTag::FindRoutine),
    );
    ns.insert("emitRow".to_string(), ScriptValue::Native(NativeTag::EmitRow));
    ns.insert(
        "windowHandle".to_string(),
        ScriptValue::Native(NativeTag::WindowHandle),
    );
    ctx.set_global(NAMESPACE_GLOBAL, ScriptValue::Object(ns));

    for level in [
        LogLevel::Debug5,
        LogLevel::Debug4,
        LogLevel::Debug3,
        LogLevel::Debug2,
        LogLevel::Debug1,
        LogLevel::Log,
        LogLevel::Info,
        LogLevel::Notice,
        LogLevel::Warning,
        LogLevel::Error,
    ] {
        ctx.set_global(level.name(), ScriptValue::Number(f64::from(level.code())));
    }
}

/// Host state for one invocation, threaded into every native call.
pub struct CallHost<'a, 'w> {
    pub catalog: &'a dyn Catalog,
    pub spi: &'a mut dyn QueryBackend,
    pub sink: &'a mut dyn MessageSink,
    pub frame: &'a mut CallFrame,
    pub functions: &'a mut HashMap<Oid, CompiledFunctionEntry>,
    pub window: Option<&'a mut (dyn WindowPartition + 'w)>,
}

impl NativeHost for CallHost<'_, '_> {
    fn call_native(
        &mut self,
        ctx: &mut ScriptContext,
        tag: NativeTag,
        this: &ScriptValue,
        args: &[ScriptValue],
    ) -> Result<ScriptValue, PlScriptError> {
        match tag {
            NativeTag::NamespaceToString => {
                Ok(ScriptValue::String("[object plscript]".to_string()))
            }
            NativeTag::PlanToString => Ok(ScriptValue::String("[object Plan]".to_string())),
            NativeTag::CursorToString => Ok(ScriptValue::String("[object Cursor]".to_string())),
            NativeTag::WinToString => Ok(ScriptValue::String("[object Window]".to_string())),
            NativeTag::Log => self.native_log(args),
            NativeTag::Execute => self.native_execute(args),
            NativeTag::Prepare => self.native_prepare(args),
            NativeTag::Commit => {
                self.spi.commit()?;
                Ok(ScriptValue::Undefined)
            }
            NativeTag::Rollback => {
                self.spi.rollback()?;
                Ok(ScriptValue::Undefined)
            }
            NativeTag::FindRoutine => self.native_find_routine(ctx, args),
            NativeTag::EmitRow => self.native_emit_row(args),
            NativeTag::WindowHandle => self.native_window_handle(),
            NativeTag::PlanExecute => self.native_plan_execute(this, args),
            NativeTag::PlanCursor => self.native_plan_cursor(this, args),
            NativeTag::PlanFree => {
                let plan = plan_of(this)?;
                self.spi.free_plan(plan);
                // 0 kept for compatibility with the historic plan API.
                Ok(ScriptValue::Number(0.0))
            }
            NativeTag::CursorFetch => self.native_cursor_fetch(this, args),
            NativeTag::CursorMove => self.native_cursor_move(this, args),
            NativeTag::CursorClose => {
                let name = cursor_of(this)?;
                self.spi.cursor_close(&name)?;
                Ok(ScriptValue::Number(1.0))
            }
            NativeTag::WinGetPartitionLocal => self.native_win_get_partition_local(args),
            NativeTag::WinSetPartitionLocal => self.native_win_set_partition_local(args),
            NativeTag::WinGetCurrentPosition => {
                let window = self.window()?;
                Ok(ScriptValue::Number(window.current_position() as f64))
            }
            NativeTag::WinGetPartitionRowCount => {
                let window = self.window()?;
                Ok(ScriptValue::Number(window.partition_row_count() as f64))
            }
            NativeTag::WinSetMarkPosition => {
                let position = integer_arg(args, 0, "setMarkPosition")?;
                let window = self.window()?;
                window.set_mark_position(position)?;
                Ok(ScriptValue::Undefined)
            }
            NativeTag::WinRowsArePeers => {
                if args.len() < 2 {
                    return Ok(ScriptValue::Undefined);
                }
                let pos1 = integer_arg(args, 0, "rowsArePeers")?;
                let pos2 = integer_arg(args, 1, "rowsArePeers")?;
                let window = self.window()?;
                Ok(ScriptValue::Bool(window.rows_are_peers(pos1, pos2)?))
            }
            NativeTag::WinGetArgInPartition => self.native_win_arg(args, true),
            NativeTag::WinGetArgInFrame => self.native_win_arg(args, false),
            NativeTag::WinGetArgCurrent => self.native_win_arg_current(args),
        }
    }
}

impl<'w> CallHost<'_, 'w> {
    fn window(&mut self) -> Result<&mut (dyn WindowPartition + 'w), PlScriptError> {
        self.window.as_deref_mut().ok_or_else(|| {
            PlScriptError::execution("windowHandle called in a non-window context")
        })
    }

    fn native_log(&mut self, args: &[ScriptValue]) -> Result<ScriptValue, PlScriptError> {
        let Some(first) = args.first() else {
            return Ok(ScriptValue::Undefined);
        };
        let code = first
            .as_number()
            .ok_or_else(|| PlScriptError::execution("invalid log level"))?;
        let level = LogLevel::from_code(code as i32)
            .ok_or_else(|| PlScriptError::execution("invalid log level"))?;
        let message = args[1..]
            .iter()
            .map(ScriptValue::display_string)
            .collect::<Vec<_>>()
            .join(" ");
        if level == LogLevel::Error {
            return Err(PlScriptError::execution(message));
        }
        self.sink.emit(level, &message);
        Ok(ScriptValue::Undefined)
    }

    fn native_execute(&mut self, args: &[ScriptValue]) -> Result<ScriptValue, PlScriptError> {
        let Some(sql) = args.first() else {
            return Ok(ScriptValue::Undefined);
        };
        let sql = sql.display_string();
        let params = collect_params(args, 1);
        let encoded = encode_params(&params, None, self.catalog)?;

        self.spi.begin_subtransaction()?;
        match self.spi.execute(&sql, &encoded) {
            Ok(result) => {
                self.spi.release_subtransaction()?;
                spi_result_to_script(&result, self.catalog)
            }
            Err(err) => {
                self.spi.rollback_subtransaction();
                Err(err)
            }
        }
    }

    fn native_prepare(&mut self, args: &[ScriptValue]) -> Result<ScriptValue, PlScriptError> {
        let Some(sql) = args.first() else {
            return Ok(ScriptValue::Undefined);
        };
        let sql = sql.display_string();
        let type_names = collect_params(args, 1);
        let mut param_types = Vec::with_capacity(type_names.len());
        for name in &type_names {
            let text = name.display_string();
            let oid = type_oid_from_name(&text).ok_or_else(|| {
                PlScriptError::execution(format!("unknown parameter type: {text}"))
            })?;
            param_types.push(oid);
        }
        let plan = self.spi.prepare(&sql, &param_types)?;

        let mut obj = BTreeMap::new();
        obj.insert("plan".to_string(), ScriptValue::Number(f64::from(plan)));
        obj.insert(
            "execute".to_string(),
            ScriptValue::Native(NativeTag::PlanExecute),
        );
        obj.insert(
            "cursor".to_string(),
            ScriptValue::Native(NativeTag::PlanCursor),
        );
        obj.insert("free".to_string(), ScriptValue::Native(NativeTag::PlanFree));
        obj.insert(
            "toString".to_string(),
            ScriptValue::Native(NativeTag::PlanToString),
        );
        Ok(ScriptValue::Object(obj))
    }

    fn plan_params(
        &mut self,
        this: &ScriptValue,
        args: &[ScriptValue],
    ) -> Result<(PlanId, Vec<(Oid, Datum)>), PlScriptError> {
        let plan = plan_of(this)?;
        let params = collect_params(args, 0);
        let declared = self.spi.plan_param_types(plan)?;
        if declared.len() != params.len() {
            return Err(PlScriptError::execution(format!(
                "plan expected {} arguments but {} were passed instead",
                declared.len(),
                params.len()
            )));
        }
        let encoded = encode_params(&params, Some(&declared), self.catalog)?;
        Ok((plan, encoded))
    }

    fn native_plan_execute(
        &mut self,
        this: &ScriptValue,
        args: &[ScriptValue],
    ) -> Result<ScriptValue, PlScriptError> {
        let (plan, encoded) = self.plan_params(this, args)?;
        self.spi.begin_subtransaction()?;
        match self.spi.execute_plan(plan, &encoded) {
            Ok(result) => {
                self.spi.release_subtransaction()?;
                spi_result_to_script(&result, self.catalog)
            }
            Err(err) => {
                self.spi.rollback_subtransaction();
                Err(err)
            }
        }
    }

    fn native_plan_cursor(
        &mut self,
        this: &ScriptValue,
        args: &[ScriptValue],
    ) -> Result<ScriptValue, PlScriptError> {
        let (plan, encoded) = self.plan_params(this, args)?;
        let name = self.spi.cursor_open(plan, &encoded)?;

        let mut obj = BTreeMap::new();
        obj.insert("name".to_string(), ScriptValue::String(name));
        obj.insert(
            "fetch".to_string(),
            ScriptValue::Native(NativeTag::CursorFetch),
        );
        obj.insert(
            "move".to_string(),
            ScriptValue::Native(NativeTag::CursorMove),
        );
        obj.insert(
            "close".to_string(),
            ScriptValue::Native(NativeTag::CursorClose),
        );
        obj.insert(
            "toString".to_string(),
            ScriptValue::Native(NativeTag::CursorToString),
        );
        Ok(ScriptValue::Object(obj))
    }

    fn native_cursor_fetch(
        &mut self,
        this: &ScriptValue,
        args: &[ScriptValue],
    ) -> Result<ScriptValue, PlScriptError> {
        let name = cursor_of(this)?;
        let want_array = !args.is_empty();
        let mut count: i64 = 1;
        if want_array {
            count = integer_arg(args, 0, "fetch")?;
        }
        let forward = count >= 0;
        let result = self
            .spi
            .cursor_fetch(&name, forward, count.unsigned_abs().min(u32::MAX as u64) as u32)?;
        if result.rows.is_empty() {
            return Ok(ScriptValue::Undefined);
        }
        if want_array {
            spi_result_to_script(&result, self.catalog)
        } else {
            let desc = result
                .row_desc
                .as_ref()
                .ok_or_else(|| PlScriptError::execution("cursor fetch returned no descriptor"))?;
            tuple_to_script(&result.rows[0], desc, self.catalog)
        }
    }

    fn native_cursor_move(
        &mut self,
        this: &ScriptValue,
        args: &[ScriptValue],
    ) -> Result<ScriptValue, PlScriptError> {
        let name = cursor_of(this)?;
        if args.is_empty() {
            return Ok(ScriptValue::Undefined);
        }
        let count = integer_arg(args, 0, "move")?;
        let forward = count >= 0;
        self.spi
            .cursor_move(&name, forward, count.unsigned_abs().min(u32::MAX as u64) as u32)?;
        Ok(ScriptValue::Undefined)
    }

    fn native_find_routine(
        &mut self,
        ctx: &mut ScriptContext,
        args: &[ScriptValue],
    ) -> Result<ScriptValue, PlScriptError> {
        let Some(signature) = args.first() else {
            return Ok(ScriptValue::Undefined);
        };
        let signature = signature.display_string();
        let Some(routine_id) = self.catalog.resolve_routine(&signature) else {
            return Err(PlScriptError::execution(format!(
                "script function is not found for \"{signature}\""
            )));
        };
        if let Some(entry) = self.functions.get(&routine_id) {
            return Ok(ScriptValue::Function(entry.func));
        }
        let routine = self.catalog.lookup_routine(routine_id)?;
        let func = compile::compile_routine(ctx, &mut NullHost, &routine)?;
        self.functions
            .insert(routine_id, CompiledFunctionEntry { routine, func });
        Ok(ScriptValue::Function(func))
    }

    fn native_emit_row(&mut self, args: &[ScriptValue]) -> Result<ScriptValue, PlScriptError> {
        let Some(state) = self.frame.return_state.as_mut() else {
            return Err(PlScriptError::execution(
                "emitRow called in a context that cannot accept a set",
            ));
        };
        let value = args.first().cloned().unwrap_or(ScriptValue::Undefined);
        if state.is_composite {
            if !matches!(value, ScriptValue::Object(_)) {
                return Err(PlScriptError::type_mismatch(
                    "emitRow argument must be an object",
                ));
            }
            check_column_coverage(&value, state.store.row_desc())?;
            script_to_row_into(&value, self.catalog, &mut state.store)?;
        } else {
            let column = state.store.row_desc().attrs[0].clone();
            let (datum, is_null) = script_to_datum(&value, column.type_oid, self.catalog)?;
            let datum = if is_null { Datum::Null } else { datum };
            state.store.put_row(RowValue::new(vec![datum]))?;
        }
        Ok(ScriptValue::Undefined)
    }

    fn native_window_handle(&mut self) -> Result<ScriptValue, PlScriptError> {
        if self.window.is_none() {
            return Err(PlScriptError::execution(
                "windowHandle called in a non-window context",
            ));
        }
        let mut obj = BTreeMap::new();
        obj.insert(
            "getPartitionLocal".to_string(),
            ScriptValue::Native(NativeTag::WinGetPartitionLocal),
        );
        obj.insert(
            "setPartitionLocal".to_string(),
            ScriptValue::Native(NativeTag::WinSetPartitionLocal),
        );
        obj.insert(
            "getCurrentPosition".to_string(),
            ScriptValue::Native(NativeTag::WinGetCurrentPosition),
        );
        obj.insert(
            "getPartitionRowCount".to_string(),
            ScriptValue::Native(NativeTag::WinGetPartitionRowCount),
        );
        obj.insert(
            "setMarkPosition".to_string(),
            ScriptValue::Native(NativeTag::WinSetMarkPosition),
        );
        obj.insert(
            "rowsArePeers".to_string(),
            ScriptValue::Native(NativeTag::WinRowsArePeers),
        );
        obj.insert(
            "getArgInPartition".to_string(),
            ScriptValue::Native(NativeTag::WinGetArgInPartition),
        );
        obj.insert(
            "getArgInFrame".to_string(),
            ScriptValue::Native(NativeTag::WinGetArgInFrame),
        );
        obj.insert(
            "getArgCurrent".to_string(),
            ScriptValue::Native(NativeTag::WinGetArgCurrent),
        );
        obj.insert(
            "toString".to_string(),
            ScriptValue::Native(NativeTag::WinToString),
        );
        obj.insert(
            "SEEK_CURRENT".to_string(),
            ScriptValue::Number(f64::from(SEEK_CURRENT)),
        );
        obj.insert(
            "SEEK_HEAD".to_string(),
            ScriptValue::Number(f64::from(SEEK_HEAD)),
        );
        obj.insert(
            "SEEK_TAIL".to_string(),
            ScriptValue::Number(f64::from(SEEK_TAIL)),
        );
        Ok(ScriptValue::Object(obj))
    }

    fn native_win_get_partition_local(
        &mut self,
        args: &[ScriptValue],
    ) -> Result<ScriptValue, PlScriptError> {
        // Storage defaults to 1000 bytes on first allocation.
        let mut size = 1000usize;
        if let Some(arg) = args.first() {
            let requested = arg
                .as_number()
                .ok_or_else(|| PlScriptError::execution("allocation size must be a number"))?;
            if requested < 0.0 {
                return Err(PlScriptError::execution(
                    "allocation size cannot be negative",
                ));
            }
            if requested > 0.0 {
                size = requested as usize;
            }
        }
        let window = self.window()?;
        let storage = window.local_storage(size)?;
        storage.reserve(size);
        let Some(payload) = storage.payload() else {
            return Ok(ScriptValue::Undefined);
        };
        let parsed: serde_json::Value = serde_json::from_slice(payload)
            .map_err(|e| PlScriptError::execution(format!("stored window value is corrupt: {e}")))?;
        Ok(ScriptValue::from_json(&parsed))
    }

    fn native_win_set_partition_local(
        &mut self,
        args: &[ScriptValue],
    ) -> Result<ScriptValue, PlScriptError> {
        let Some(value) = args.first() else {
            return Ok(ScriptValue::Undefined);
        };
        let payload = value.to_json().to_string();
        let window = self.window()?;
        let storage = window.local_storage(payload.len())?;
        storage.set_payload(payload.as_bytes())?;
        Ok(ScriptValue::Undefined)
    }

    fn native_win_arg(
        &mut self,
        args: &[ScriptValue],
        in_partition: bool,
    ) -> Result<ScriptValue, PlScriptError> {
        // Undefined is reserved for the out-of-partition case, so short
        // argument lists raise instead.
        if args.len() < 4 {
            return Err(PlScriptError::execution(
                "not enough arguments for window argument access",
            ));
        }
        let argno = integer_arg(args, 0, "argno")? as usize;
        let relpos = integer_arg(args, 1, "relpos")? as i32;
        let seek_code = integer_arg(args, 2, "seektype")? as i32;
        let seek = SeekOrigin::from_code(seek_code)
            .ok_or_else(|| PlScriptError::execution("invalid seek type"))?;
        let set_mark = args[3].truthy();

        let arg_type = self.frame_arg_type(argno)?;
        let window = self.window()?;
        let fetched = if in_partition {
            window.arg_in_partition(argno, relpos, seek, set_mark)?
        } else {
            window.arg_in_frame(argno, relpos, seek, set_mark)?
        };
        match fetched {
            None => Ok(ScriptValue::Undefined),
            Some(datum) => {
                let desc = resolve_type(self.catalog, arg_type)?;
                datum_to_script(&datum, &desc, self.catalog)
            }
        }
    }

    fn native_win_arg_current(
        &mut self,
        args: &[ScriptValue],
    ) -> Result<ScriptValue, PlScriptError> {
        if args.is_empty() {
            return Ok(ScriptValue::Undefined);
        }
        let argno = integer_arg(args, 0, "argno")? as usize;
        let arg_type = self.frame_arg_type(argno)?;
        let window = self.window()?;
        let datum = window.arg_current(argno)?;
        let desc = resolve_type(self.catalog, arg_type)?;
        datum_to_script(&datum, &desc, self.catalog)
    }

    fn frame_arg_type(&self, argno: usize) -> Result<Oid, PlScriptError> {
        let routine = self
            .frame
            .routine
            .as_ref()
            .ok_or_else(|| PlScriptError::execution("window access outside a routine call"))?;
        routine
            .arg_types
            .get(argno)
            .copied()
            .ok_or_else(|| PlScriptError::execution(format!("argument {argno} is out of range")))
    }
}

/// Parameter lists accept either one array argument or trailing loose
/// arguments, which are consumed as an array.
fn collect_params(args: &[ScriptValue], start: usize) -> Vec<ScriptValue> {
    match args.get(start) {
        None => Vec::new(),
        Some(ScriptValue::Array(items)) => items.clone(),
        Some(_) => args[start..].to_vec(),
    }
}

/// Infers a parameter's type oid from its script shape when the statement
/// carries no declared types.
fn infer_param_oid(value: &ScriptValue) -> Oid {
    match value {
        ScriptValue::Bool(_) => BOOLOID,
        ScriptValue::BigInt(_) => INT8OID,
        ScriptValue::Number(n) if n.fract() == 0.0 && n.abs() < 2_147_483_648.0 => INT4OID,
        ScriptValue::Number(_) => crate::catalog::FLOAT8OID,
        ScriptValue::Date(_) => TIMESTAMPTZOID,
        ScriptValue::Bytes(_) | ScriptValue::TypedArray { .. } => BYTEAOID,
        ScriptValue::Object(_) | ScriptValue::Array(_) => JSONBOID,
        _ => TEXTOID,
    }
}

fn encode_params(
    params: &[ScriptValue],
    declared: Option<&[Oid]>,
    catalog: &dyn Catalog,
) -> Result<Vec<(Oid, Datum)>, PlScriptError> {
    let mut encoded = Vec::with_capacity(params.len());
    for (i, value) in params.iter().enumerate() {
        let oid = declared
            .and_then(|types| types.get(i).copied())
            .filter(|oid| *oid != 0)
            .unwrap_or_else(|| infer_param_oid(value));
        let (datum, is_null) = script_to_datum(value, oid, catalog)?;
        encoded.push((oid, if is_null { Datum::Null } else { datum }));
    }
    Ok(encoded)
}

/// Query results surface as an array of row objects, or the processed-row
/// count for statements that return no rows.
fn spi_result_to_script(
    result: &SpiResult,
    catalog: &dyn Catalog,
) -> Result<ScriptValue, PlScriptError> {
    match &result.row_desc {
        Some(desc) => {
            let mut rows = Vec::with_capacity(result.rows.len());
            for row in &result.rows {
                rows.push(tuple_to_script(row, desc, catalog)?);
            }
            Ok(ScriptValue::Array(rows))
        }
        None => Ok(ScriptValue::Number(result.processed as f64)),
    }
}

fn plan_of(this: &ScriptValue) -> Result<PlanId, PlScriptError> {
    let ScriptValue::Object(map) = this else {
        return Err(PlScriptError::execution("invalid plan"));
    };
    match map.get("plan") {
        Some(ScriptValue::Number(id)) => Ok(*id as PlanId),
        _ => Err(PlScriptError::execution("invalid plan")),
    }
}

fn cursor_of(this: &ScriptValue) -> Result<String, PlScriptError> {
    let ScriptValue::Object(map) = this else {
        return Err(PlScriptError::execution("unable to find cursor"));
    };
    match map.get("name") {
        Some(ScriptValue::String(name)) => Ok(name.clone()),
        _ => Err(PlScriptError::execution("unable to find cursor")),
    }
}

fn integer_arg(args: &[ScriptValue], idx: usize, what: &str) -> Result<i64, PlScriptError> {
    args.get(idx)
        .and_then(ScriptValue::as_number)
        .map(|n| n as i64)
        .ok_or_else(|| PlScriptError::execution(format!("{what} expects an integer argument")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::executor::InterruptFlag;

    #[test]
    fn install_exposes_namespace_and_levels() {
        let mut ctx = ScriptContext::new(InterruptFlag::new());
        install(&mut ctx);
        let Some(ScriptValue::Object(ns)) = ctx.global(NAMESPACE_GLOBAL) else {
            panic!("namespace global missing");
        };
        for key in [
            "log",
            "execute",
            "prepare",
            "commit",
            "rollback",
            "findRoutine",
            "emitRow",
            "windowHandle",
        ] {
            assert!(ns.contains_key(key), "namespace missing {key}");
        }
        assert_eq!(
            ctx.global("ERROR"),
            Some(&ScriptValue::Number(f64::from(LogLevel::Error.code())))
        );
    }

    #[test]
    fn param_inference_covers_value_shapes() {
        assert_eq!(infer_param_oid(&ScriptValue::Bool(true)), BOOLOID);
        assert_eq!(infer_param_oid(&ScriptValue::BigInt(1)), INT8OID);
        assert_eq!(infer_param_oid(&ScriptValue::Number(5.0)), INT4OID);
        assert_eq!(
            infer_param_oid(&ScriptValue::Number(5.5)),
            crate::catalog::FLOAT8OID
        );
        assert_eq!(
            infer_param_oid(&ScriptValue::String("x".to_string())),
            TEXTOID
        );
        assert_eq!(
            infer_param_oid(&ScriptValue::Object(Default::default())),
            JSONBOID
        );
    }

    #[test]
    fn collect_params_accepts_array_or_trailing_args() {
        let array_form = [
            ScriptValue::String("sql".to_string()),
            ScriptValue::Array(vec![ScriptValue::Number(1.0)]),
        ];
        assert_eq!(
            collect_params(&array_form, 1),
            vec![ScriptValue::Number(1.0)]
        );
        let trailing_form = [
            ScriptValue::String("sql".to_string()),
            ScriptValue::Number(1.0),
            ScriptValue::Number(2.0),
        ];
        assert_eq!(
            collect_params(&trailing_form, 1),
            vec![ScriptValue::Number(1.0), ScriptValue::Number(2.0)]
        );
        assert!(collect_params(&trailing_form, 3).is_empty());
    }
}
