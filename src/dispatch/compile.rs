//! Routine compilation: synthesizing script function source from routine
//! metadata and evaluating it into a compiled function handle.

use crate::catalog::RoutineDescriptor;
use crate::errors::PlScriptError;
use crate::script::compiler::parse_program;
use crate::script::executor::{Evaluator, NativeHost, ScriptContext};
use crate::script::value::{FuncId, ScriptValue};

/// Fixed trailing parameters appended to every trigger routine.
const TRIGGER_PARAMS: &str = "NEW, OLD, TG_NAME, TG_WHEN, TG_LEVEL, TG_OP, \
TG_RELID, TG_TABLE_NAME, TG_TABLE_SCHEMA, TG_ARGV";

/// Builds the function-declaration source for a routine: the name, the
/// input parameter list (named when declared, positional `$N` placeholders
/// otherwise, OUT-only arguments skipped), the trigger parameters when
/// applicable, the body verbatim, and a trailing reference expression so
/// evaluation yields the declared function.
pub fn synthesize_function_source(routine: &RoutineDescriptor) -> String {
    let mut src = format!("function {} (", routine.name);

    let mut in_count = 0usize;
    for (i, (_, _, name)) in routine.in_args().enumerate() {
        if i > 0 {
            src.push(',');
        }
        match name {
            Some(name) => src.push_str(name),
            None => src.push_str(&format!("${}", i + 1)),
        }
        in_count += 1;
    }

    if routine.is_trigger {
        if in_count > 0 {
            src.push_str(", ");
        }
        src.push_str(TRIGGER_PARAMS);
    }

    src.push_str(&format!(
        ") {{\n{}\n}}\n{};\n",
        routine.source, routine.name
    ));
    src
}

/// Wraps raw inline-block source in an immediately-invoked function so the
/// block runs with no arguments and its result is discarded.
pub fn synthesize_inline_source(source: &str) -> String {
    format!("(function () {{\n{source}\n}})();")
}

/// Compiles a routine into the given context, returning the compiled
/// function handle. Nothing is registered anywhere on failure.
pub fn compile_routine(
    ctx: &mut ScriptContext,
    host: &mut dyn NativeHost,
    routine: &RoutineDescriptor,
) -> Result<FuncId, PlScriptError> {
    let source = synthesize_function_source(routine);
    let program = parse_program(&source)?;
    let value = Evaluator::new(ctx, host).eval_program(&program)?;
    match value {
        ScriptValue::Function(id) => Ok(id),
        other => Err(PlScriptError::Compile {
            message: format!(
                "routine {} did not evaluate to a function (got {})",
                routine.name,
                other.type_name()
            ),
            line: 0,
            column: 0,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{ArgMode, INT4OID, ResultClass, TEXTOID, TRIGGEROID};

    fn routine(arg_modes: Vec<ArgMode>, arg_names: Vec<Option<String>>, trigger: bool) -> RoutineDescriptor {
        RoutineDescriptor {
            routine_id: 1,
            principal_id: 10,
            name: "sample".to_string(),
            source: "return 1;".to_string(),
            arg_types: vec![INT4OID; arg_modes.len()],
            arg_modes,
            arg_names,
            return_type: if trigger { TRIGGEROID } else { INT4OID },
            is_set_returning: false,
            is_trigger: trigger,
            result_class: ResultClass::Scalar,
        }
    }

    #[test]
    fn synthesizes_named_and_positional_parameters() {
        let source = synthesize_function_source(&routine(
            vec![ArgMode::In, ArgMode::In],
            vec![Some("a".to_string()), None],
            false,
        ));
        assert!(source.starts_with("function sample (a,$2) {"));
        assert!(source.trim_end().ends_with("sample;"));
    }

    #[test]
    fn out_only_parameters_are_skipped() {
        let source = synthesize_function_source(&routine(
            vec![ArgMode::In, ArgMode::Out, ArgMode::InOut],
            vec![
                Some("a".to_string()),
                Some("b".to_string()),
                Some("c".to_string()),
            ],
            false,
        ));
        assert!(source.starts_with("function sample (a,c) {"));
        assert!(!source.contains("b,"));
    }

    #[test]
    fn trigger_routines_get_the_ten_trailing_parameters() {
        let source = synthesize_function_source(&routine(
            vec![],
            vec![],
            true,
        ));
        assert!(source.contains(
            "(NEW, OLD, TG_NAME, TG_WHEN, TG_LEVEL, TG_OP, TG_RELID, TG_TABLE_NAME, TG_TABLE_SCHEMA, TG_ARGV)"
        ));
    }

    #[test]
    fn inline_source_is_wrapped_in_an_iife() {
        let source = synthesize_inline_source("plscript.log(NOTICE, 'hi');");
        assert!(source.starts_with("(function () {\n"));
        assert!(source.ends_with("})();"));
    }

    #[test]
    fn compile_failure_reports_compile_error() {
        use crate::script::executor::{InterruptFlag, NullHost, ScriptContext};
        let mut ctx = ScriptContext::new(InterruptFlag::new());
        let mut bad = routine(vec![], vec![], false);
        bad.source = "return (;".to_string();
        let err = compile_routine(&mut ctx, &mut NullHost, &bad)
            .expect_err("bad source should not compile");
        assert!(matches!(err, PlScriptError::Compile { .. }));
    }

    #[test]
    fn text_argument_types_do_not_change_synthesis() {
        let mut r = routine(vec![ArgMode::In], vec![None], false);
        r.arg_types = vec![TEXTOID];
        let source = synthesize_function_source(&r);
        assert!(source.starts_with("function sample ($1) {"));
    }
}
