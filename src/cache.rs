//! Execution-context cache: one script context per security principal, with
//! a nested per-routine compiled-function table.
//!
//! The cache is an injectable value owned by the dispatcher — there is no
//! process-global state — and all access is serialized by the host's
//! one-call-at-a-time execution model, so no locking is needed.

use std::collections::HashMap;

use crate::catalog::{Oid, RoutineDescriptor};
use crate::config::Config;
use crate::errors::PlScriptError;
use crate::script::executor::{InterruptFlag, ScriptContext};
use crate::script::value::FuncId;

/// One cached compiled routine: the descriptor snapshot taken at compile
/// time plus the handle into the owning context's function table.
#[derive(Debug, Clone)]
pub struct CompiledFunctionEntry {
    pub routine: RoutineDescriptor,
    pub func: FuncId,
}

/// Per-principal execution state: the script context and its
/// compiled-function table. Dropping the table releases every compiled
/// function at once.
#[derive(Debug)]
pub struct ExecutionContext {
    pub principal: Oid,
    pub script: ScriptContext,
    pub functions: HashMap<Oid, CompiledFunctionEntry>,
}

impl ExecutionContext {
    pub fn new(principal: Oid, interrupt: InterruptFlag, config: &Config) -> Self {
        let mut script = ScriptContext::new(interrupt);
        if let Some(limit) = config.step_limit {
            script.set_step_limit(limit);
        }
        Self {
            principal,
            script,
            functions: HashMap::new(),
        }
    }

    pub fn function(&self, routine_id: Oid) -> Option<&CompiledFunctionEntry> {
        self.functions.get(&routine_id)
    }

    /// Drops every compiled-function entry, releasing the underlying
    /// function handles from the script context.
    pub fn drop_functions(&mut self) {
        for (_, entry) in self.functions.drain() {
            self.script.release_function(entry.func);
        }
    }
}

/// Process-wide cache of per-principal contexts, created lazily and never
/// duplicated.
#[derive(Debug, Default)]
pub struct ContextCache {
    contexts: HashMap<Oid, ExecutionContext>,
}

impl ContextCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, principal: Oid) -> bool {
        self.contexts.contains_key(&principal)
    }

    pub fn get(&self, principal: Oid) -> Option<&ExecutionContext> {
        self.contexts.get(&principal)
    }

    pub fn get_mut(&mut self, principal: Oid) -> Option<&mut ExecutionContext> {
        self.contexts.get_mut(&principal)
    }

    pub fn len(&self) -> usize {
        self.contexts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contexts.is_empty()
    }

    /// Registers a freshly built context. A second registration for the
    /// same principal is an error, not a replacement.
    pub fn insert(&mut self, context: ExecutionContext) -> Result<(), PlScriptError> {
        if self.contexts.contains_key(&context.principal) {
            return Err(PlScriptError::resource(format!(
                "execution context for principal {} already exists",
                context.principal
            )));
        }
        self.contexts.insert(context.principal, context);
        Ok(())
    }

    /// Drops one principal's compiled-function table. The context itself
    /// survives; a lookup miss afterwards is not an error.
    pub fn invalidate(&mut self, principal: Oid) {
        if let Some(context) = self.contexts.get_mut(&principal) {
            context.drop_functions();
        }
    }

    /// Drops every context and every cache entry, so no stale compiled body
    /// survives a routine (re)definition.
    pub fn invalidate_all(&mut self) {
        self.contexts.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context(principal: Oid) -> ExecutionContext {
        ExecutionContext::new(principal, InterruptFlag::new(), &Config::default())
    }

    fn entry(routine_id: Oid, ctx: &mut ExecutionContext) -> CompiledFunctionEntry {
        use crate::script::compiler::FunctionDef;
        use std::rc::Rc;
        let func = ctx.script.register_function(Rc::new(FunctionDef {
            name: Some("f".to_string()),
            params: Vec::new(),
            body: Vec::new(),
        }));
        CompiledFunctionEntry {
            routine: crate::catalog::RoutineDescriptor {
                routine_id,
                principal_id: ctx.principal,
                name: "f".to_string(),
                source: String::new(),
                arg_types: Vec::new(),
                arg_modes: Vec::new(),
                arg_names: Vec::new(),
                return_type: crate::catalog::VOIDOID,
                is_set_returning: false,
                is_trigger: false,
                result_class: crate::catalog::ResultClass::Scalar,
            },
            func,
        }
    }

    #[test]
    fn duplicate_context_creation_is_an_error() {
        let mut cache = ContextCache::new();
        cache.insert(context(10)).expect("first insert should work");
        let err = cache.insert(context(10)).expect_err("duplicate should fail");
        assert!(matches!(err, PlScriptError::Resource { .. }));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn invalidate_drops_functions_but_keeps_context() {
        let mut cache = ContextCache::new();
        let mut ctx = context(10);
        let entry = entry(500, &mut ctx);
        let func = entry.func;
        ctx.functions.insert(500, entry);
        cache.insert(ctx).expect("insert should work");

        cache.invalidate(10);
        let ctx = cache.get(10).expect("context should survive");
        assert!(ctx.functions.is_empty());
        assert!(ctx.script.function(func).is_none());
    }

    #[test]
    fn invalidate_all_clears_every_principal() {
        let mut cache = ContextCache::new();
        cache.insert(context(10)).expect("insert should work");
        cache.insert(context(11)).expect("insert should work");
        cache.invalidate_all();
        assert!(cache.is_empty());
        assert!(!cache.contains(10));
        assert!(!cache.contains(11));
    }

    #[test]
    fn invalidating_missing_principal_is_not_an_error() {
        let mut cache = ContextCache::new();
        cache.invalidate(42);
        assert!(cache.is_empty());
    }
}
