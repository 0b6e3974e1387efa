//! Catalog-facing metadata: type descriptors, routine descriptors, row
//! descriptors and the catalog collaborator trait.
//!
//! The subsystem never reads host catalog storage directly; everything it
//! needs arrives through [`Catalog`]. Built-in scalar and array types are
//! resolved from a static table so the hot marshaling path avoids a
//! collaborator round trip.

use std::cell::Cell;
use std::collections::HashMap;

use crate::errors::PlScriptError;

pub type Oid = u32;

pub const INVALID_OID: Oid = 0;

pub const BOOLOID: Oid = 16;
pub const BYTEAOID: Oid = 17;
pub const NAMEOID: Oid = 19;
pub const INT8OID: Oid = 20;
pub const INT2OID: Oid = 21;
pub const INT4OID: Oid = 23;
pub const TEXTOID: Oid = 25;
pub const OIDOID: Oid = 26;
pub const JSONOID: Oid = 114;
pub const XMLOID: Oid = 142;
pub const XMLARRAYOID: Oid = 143;
pub const JSONARRAYOID: Oid = 199;
pub const FLOAT4OID: Oid = 700;
pub const FLOAT8OID: Oid = 701;
pub const BOOLARRAYOID: Oid = 1000;
pub const BYTEAARRAYOID: Oid = 1001;
pub const NAMEARRAYOID: Oid = 1003;
pub const INT2ARRAYOID: Oid = 1005;
pub const INT4ARRAYOID: Oid = 1007;
pub const TEXTARRAYOID: Oid = 1009;
pub const BPCHARARRAYOID: Oid = 1014;
pub const VARCHARARRAYOID: Oid = 1015;
pub const INT8ARRAYOID: Oid = 1016;
pub const FLOAT4ARRAYOID: Oid = 1021;
pub const FLOAT8ARRAYOID: Oid = 1022;
pub const OIDARRAYOID: Oid = 1028;
pub const BPCHAROID: Oid = 1042;
pub const VARCHAROID: Oid = 1043;
pub const DATEOID: Oid = 1082;
pub const TIMESTAMPOID: Oid = 1114;
pub const TIMESTAMPARRAYOID: Oid = 1115;
pub const DATEARRAYOID: Oid = 1182;
pub const TIMESTAMPTZOID: Oid = 1184;
pub const TIMESTAMPTZARRAYOID: Oid = 1185;
pub const NUMERICARRAYOID: Oid = 1231;
pub const NUMERICOID: Oid = 1700;
pub const RECORDOID: Oid = 2249;
pub const VOIDOID: Oid = 2278;
pub const TRIGGEROID: Oid = 2279;
pub const JSONBOID: Oid = 3802;
pub const JSONBARRAYOID: Oid = 3807;

/// First oid available to user-defined objects, matching the host engine's
/// reserved range.
pub const FIRST_NORMAL_OID: Oid = 16_384;

/// Structural category of a resolved type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeCategory {
    Scalar,
    Array,
    Composite,
    Pseudo,
}

/// Physical length of a type's storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeLength {
    Fixed(i16),
    Variable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeAlignment {
    Char,
    Short,
    Int,
    Double,
}

/// Resolved structural descriptor for a relational type.
///
/// For arrays, `type_oid` holds the *element* oid and `len`/`by_value`/
/// `alignment` describe the element; `category` stays `Array` so callers can
/// still route on the container shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypeDescriptor {
    pub type_oid: Oid,
    pub category: TypeCategory,
    pub len: TypeLength,
    pub by_value: bool,
    pub alignment: TypeAlignment,
    pub is_composite: bool,
}

struct BuiltinType {
    category: TypeCategory,
    len: TypeLength,
    by_value: bool,
    alignment: TypeAlignment,
}

fn builtin_type(oid: Oid) -> Option<BuiltinType> {
    let (category, len, by_value, alignment) = match oid {
        BOOLOID => (
            TypeCategory::Scalar,
            TypeLength::Fixed(1),
            true,
            TypeAlignment::Char,
        ),
        INT2OID => (
            TypeCategory::Scalar,
            TypeLength::Fixed(2),
            true,
            TypeAlignment::Short,
        ),
        INT4OID | OIDOID | DATEOID | FLOAT4OID => (
            TypeCategory::Scalar,
            TypeLength::Fixed(4),
            true,
            TypeAlignment::Int,
        ),
        INT8OID | TIMESTAMPOID | TIMESTAMPTZOID | FLOAT8OID => (
            TypeCategory::Scalar,
            TypeLength::Fixed(8),
            true,
            TypeAlignment::Double,
        ),
        NAMEOID => (
            TypeCategory::Scalar,
            TypeLength::Fixed(64),
            false,
            TypeAlignment::Char,
        ),
        TEXTOID | VARCHAROID | BPCHAROID | XMLOID | JSONOID | JSONBOID | BYTEAOID | NUMERICOID => (
            TypeCategory::Scalar,
            TypeLength::Variable,
            false,
            TypeAlignment::Int,
        ),
        RECORDOID => (
            TypeCategory::Composite,
            TypeLength::Variable,
            false,
            TypeAlignment::Double,
        ),
        VOIDOID | TRIGGEROID => (
            TypeCategory::Pseudo,
            TypeLength::Fixed(4),
            true,
            TypeAlignment::Int,
        ),
        _ => return None,
    };
    Some(BuiltinType {
        category,
        len,
        by_value,
        alignment,
    })
}

/// Element oid for built-in array types.
pub fn builtin_array_element(oid: Oid) -> Option<Oid> {
    Some(match oid {
        BOOLARRAYOID => BOOLOID,
        BYTEAARRAYOID => BYTEAOID,
        NAMEARRAYOID => NAMEOID,
        INT2ARRAYOID => INT2OID,
        INT4ARRAYOID => INT4OID,
        TEXTARRAYOID => TEXTOID,
        BPCHARARRAYOID => BPCHAROID,
        VARCHARARRAYOID => VARCHAROID,
        INT8ARRAYOID => INT8OID,
        FLOAT4ARRAYOID => FLOAT4OID,
        FLOAT8ARRAYOID => FLOAT8OID,
        OIDARRAYOID => OIDOID,
        DATEARRAYOID => DATEOID,
        TIMESTAMPARRAYOID => TIMESTAMPOID,
        TIMESTAMPTZARRAYOID => TIMESTAMPTZOID,
        NUMERICARRAYOID => NUMERICOID,
        JSONARRAYOID => JSONOID,
        JSONBARRAYOID => JSONBOID,
        XMLARRAYOID => XMLOID,
        _ => return None,
    })
}

/// Array oid whose element is `oid`, for the built-in set.
pub fn builtin_array_of(oid: Oid) -> Option<Oid> {
    Some(match oid {
        BOOLOID => BOOLARRAYOID,
        BYTEAOID => BYTEAARRAYOID,
        NAMEOID => NAMEARRAYOID,
        INT2OID => INT2ARRAYOID,
        INT4OID => INT4ARRAYOID,
        TEXTOID => TEXTARRAYOID,
        BPCHAROID => BPCHARARRAYOID,
        VARCHAROID => VARCHARARRAYOID,
        INT8OID => INT8ARRAYOID,
        FLOAT4OID => FLOAT4ARRAYOID,
        FLOAT8OID => FLOAT8ARRAYOID,
        OIDOID => OIDARRAYOID,
        DATEOID => DATEARRAYOID,
        TIMESTAMPOID => TIMESTAMPARRAYOID,
        TIMESTAMPTZOID => TIMESTAMPTZARRAYOID,
        NUMERICOID => NUMERICARRAYOID,
        JSONOID => JSONARRAYOID,
        JSONBOID => JSONBARRAYOID,
        XMLOID => XMLARRAYOID,
        _ => return None,
    })
}

/// Parses a type name as accepted by the script-side `prepare` parameter
/// list. A trailing `[]` selects the corresponding array type.
pub fn type_oid_from_name(name: &str) -> Option<Oid> {
    let trimmed = name.trim();
    if let Some(elem_name) = trimmed.strip_suffix("[]") {
        return builtin_array_of(type_oid_from_name(elem_name)?);
    }
    Some(match trimmed.to_ascii_lowercase().as_str() {
        "bool" | "boolean" => BOOLOID,
        "bytea" => BYTEAOID,
        "name" => NAMEOID,
        "int8" | "bigint" => INT8OID,
        "int2" | "smallint" => INT2OID,
        "int4" | "int" | "integer" => INT4OID,
        "text" => TEXTOID,
        "oid" => OIDOID,
        "json" => JSONOID,
        "xml" => XMLOID,
        "float4" | "real" => FLOAT4OID,
        "float8" | "double precision" => FLOAT8OID,
        "bpchar" | "char" | "character" => BPCHAROID,
        "varchar" | "character varying" => VARCHAROID,
        "date" => DATEOID,
        "timestamp" => TIMESTAMPOID,
        "timestamptz" | "timestamp with time zone" => TIMESTAMPTZOID,
        "numeric" | "decimal" => NUMERICOID,
        "jsonb" => JSONBOID,
        "void" => VOIDOID,
        _ => return None,
    })
}

/// User-defined type metadata served by the catalog collaborator.
#[derive(Debug, Clone, PartialEq)]
pub enum UserType {
    Composite(RowDescriptor),
    Scalar {
        len: TypeLength,
        by_value: bool,
        alignment: TypeAlignment,
    },
    ArrayOf(Oid),
}

/// Resolves a type oid into a structural descriptor.
///
/// Arrays are resolved to their element type; an array whose element type
/// cannot be determined is fatal. Types neither built in nor known to the
/// catalog are conservatively marked composite so callers route them through
/// the safer composite path.
pub fn resolve_type(catalog: &dyn Catalog, type_oid: Oid) -> Result<TypeDescriptor, PlScriptError> {
    if let Some(elem) = builtin_array_element(type_oid) {
        return resolve_array_element(catalog, type_oid, elem);
    }

    if let Some(builtin) = builtin_type(type_oid) {
        return Ok(TypeDescriptor {
            type_oid,
            category: builtin.category,
            len: builtin.len,
            by_value: builtin.by_value,
            alignment: builtin.alignment,
            is_composite: builtin.category == TypeCategory::Composite,
        });
    }

    match catalog.user_type(type_oid) {
        Some(UserType::Composite(_)) => Ok(TypeDescriptor {
            type_oid,
            category: TypeCategory::Composite,
            len: TypeLength::Variable,
            by_value: false,
            alignment: TypeAlignment::Double,
            is_composite: true,
        }),
        Some(UserType::Scalar {
            len,
            by_value,
            alignment,
        }) => Ok(TypeDescriptor {
            type_oid,
            category: TypeCategory::Scalar,
            len,
            by_value,
            alignment,
            is_composite: false,
        }),
        Some(UserType::ArrayOf(elem)) => resolve_array_element(catalog, type_oid, elem),
        None => Ok(TypeDescriptor {
            type_oid,
            category: TypeCategory::Pseudo,
            len: TypeLength::Variable,
            by_value: false,
            alignment: TypeAlignment::Int,
            is_composite: true,
        }),
    }
}

fn resolve_array_element(
    catalog: &dyn Catalog,
    array_oid: Oid,
    elem_oid: Oid,
) -> Result<TypeDescriptor, PlScriptError> {
    if elem_oid == INVALID_OID {
        return Err(PlScriptError::resource(format!(
            "cannot determine element type of array: {array_oid}"
        )));
    }
    let elem = resolve_type(catalog, elem_oid)?;
    Ok(TypeDescriptor {
        type_oid: elem_oid,
        category: TypeCategory::Array,
        len: elem.len,
        by_value: elem.by_value,
        alignment: elem.alignment,
        is_composite: elem.category == TypeCategory::Composite,
    })
}

/// Declared mode of a routine argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgMode {
    In,
    Out,
    InOut,
    Variadic,
}

impl ArgMode {
    /// OUT-only arguments are excluded from the compiled parameter list.
    pub fn is_input(self) -> bool {
        !matches!(self, Self::Out)
    }
}

/// Broad class of a routine's declared result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultClass {
    Scalar,
    Composite,
}

/// One column of a composite type or relation row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowAttribute {
    pub name: String,
    pub type_oid: Oid,
    pub dropped: bool,
}

impl RowAttribute {
    pub fn new(name: impl Into<String>, type_oid: Oid) -> Self {
        Self {
            name: name.into(),
            type_oid,
            dropped: false,
        }
    }

    pub fn dropped(name: impl Into<String>, type_oid: Oid) -> Self {
        Self {
            name: name.into(),
            type_oid,
            dropped: true,
        }
    }
}

/// Ordered column metadata for a composite relational value.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RowDescriptor {
    pub attrs: Vec<RowAttribute>,
}

impl RowDescriptor {
    pub fn new(attrs: Vec<RowAttribute>) -> Self {
        Self { attrs }
    }

    pub fn natts(&self) -> usize {
        self.attrs.len()
    }

    /// Non-dropped attributes with their positional index.
    pub fn live(&self) -> impl Iterator<Item = (usize, &RowAttribute)> {
        self.attrs
            .iter()
            .enumerate()
            .filter(|(_, attr)| !attr.dropped)
    }
}

/// Calling metadata plus source for one routine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutineDescriptor {
    pub routine_id: Oid,
    pub principal_id: Oid,
    pub name: String,
    pub source: String,
    pub arg_types: Vec<Oid>,
    pub arg_modes: Vec<ArgMode>,
    pub arg_names: Vec<Option<String>>,
    pub return_type: Oid,
    pub is_set_returning: bool,
    pub is_trigger: bool,
    pub result_class: ResultClass,
}

impl RoutineDescriptor {
    pub fn total_arg_count(&self) -> usize {
        self.arg_types.len()
    }

    pub fn in_arg_count(&self) -> usize {
        self.arg_modes.iter().filter(|m| m.is_input()).count()
    }

    /// Input arguments in declaration order: (position, type oid, name).
    pub fn in_args(&self) -> impl Iterator<Item = (usize, Oid, Option<&str>)> {
        self.arg_types
            .iter()
            .enumerate()
            .filter(|(i, _)| self.arg_modes.get(*i).is_none_or(|m| m.is_input()))
            .map(|(i, oid)| (i, *oid, self.arg_names.get(i).and_then(|n| n.as_deref())))
    }

    /// Checks the descriptor's internal shape invariants.
    pub fn validate(&self) -> Result<(), PlScriptError> {
        if self.arg_modes.len() != self.arg_types.len()
            || self.arg_names.len() != self.arg_types.len()
        {
            return Err(PlScriptError::resource(format!(
                "routine {} has inconsistent argument metadata",
                self.name
            )));
        }
        Ok(())
    }
}

/// The catalog collaborator consumed by the subsystem.
pub trait Catalog {
    /// Identity under whose permissions the current call executes.
    fn current_principal(&self) -> Oid;

    fn lookup_routine(&self, routine_id: Oid) -> Result<RoutineDescriptor, PlScriptError>;

    /// Resolves a textual routine signature (`name` or `name(argtypes)`)
    /// used by the script-side `findRoutine`.
    fn resolve_routine(&self, signature: &str) -> Option<Oid>;

    fn user_type(&self, type_oid: Oid) -> Option<UserType>;

    /// Row descriptor for a composite type oid, when one exists.
    fn row_descriptor(&self, type_oid: Oid) -> Option<RowDescriptor> {
        match self.user_type(type_oid) {
            Some(UserType::Composite(desc)) => Some(desc),
            _ => None,
        }
    }
}

/// In-memory catalog used by tests and lightweight embedders.
#[derive(Debug, Default)]
pub struct MemoryCatalog {
    principal: Cell<Oid>,
    routines: HashMap<Oid, RoutineDescriptor>,
    types: HashMap<Oid, UserType>,
    signatures: HashMap<String, Oid>,
}

impl MemoryCatalog {
    pub fn new(principal: Oid) -> Self {
        Self {
            principal: Cell::new(principal),
            ..Self::default()
        }
    }

    pub fn set_principal(&self, principal: Oid) {
        self.principal.set(principal);
    }

    pub fn add_routine(&mut self, routine: RoutineDescriptor) {
        self.signatures
            .insert(routine.name.clone(), routine.routine_id);
        self.routines.insert(routine.routine_id, routine);
    }

    pub fn add_type(&mut self, type_oid: Oid, entry: UserType) {
        self.types.insert(type_oid, entry);
    }

    pub fn remove_routine(&mut self, routine_id: Oid) {
        if let Some(routine) = self.routines.remove(&routine_id) {
            self.signatures.remove(&routine.name);
        }
    }
}

impl Catalog for MemoryCatalog {
    fn current_principal(&self) -> Oid {
        self.principal.get()
    }

    fn lookup_routine(&self, routine_id: Oid) -> Result<RoutineDescriptor, PlScriptError> {
        self.routines.get(&routine_id).cloned().ok_or_else(|| {
            PlScriptError::resource(format!("cache lookup failed for routine {routine_id}"))
        })
    }

    fn resolve_routine(&self, signature: &str) -> Option<Oid> {
        // Argument-type disambiguation is the host catalog's concern; here a
        // signature resolves by bare name.
        let name = signature.split('(').next().unwrap_or(signature).trim();
        self.signatures.get(name).copied()
    }

    fn user_type(&self, type_oid: Oid) -> Option<UserType> {
        self.types.get(&type_oid).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_array_to_element_descriptor() {
        let catalog = MemoryCatalog::new(10);
        let desc = resolve_type(&catalog, TEXTARRAYOID).expect("array should resolve");
        assert_eq!(desc.category, TypeCategory::Array);
        assert_eq!(desc.type_oid, TEXTOID);
        assert_eq!(desc.len, TypeLength::Variable);
        assert!(!desc.is_composite);
    }

    #[test]
    fn unknown_type_is_conservatively_composite() {
        let catalog = MemoryCatalog::new(10);
        let desc = resolve_type(&catalog, 99_999).expect("unknown should resolve");
        assert_eq!(desc.category, TypeCategory::Pseudo);
        assert!(desc.is_composite);
    }

    #[test]
    fn user_array_with_invalid_element_is_fatal() {
        let mut catalog = MemoryCatalog::new(10);
        catalog.add_type(60_000, UserType::ArrayOf(INVALID_OID));
        let err = resolve_type(&catalog, 60_000).expect_err("invalid element should fail");
        assert!(matches!(err, PlScriptError::Resource { .. }));
    }

    #[test]
    fn out_only_args_excluded_from_input_list() {
        let routine = RoutineDescriptor {
            routine_id: 1,
            principal_id: 10,
            name: "f".to_string(),
            source: String::new(),
            arg_types: vec![INT4OID, TEXTOID, INT4OID],
            arg_modes: vec![ArgMode::In, ArgMode::Out, ArgMode::InOut],
            arg_names: vec![Some("a".to_string()), Some("b".to_string()), None],
            return_type: INT4OID,
            is_set_returning: false,
            is_trigger: false,
            result_class: ResultClass::Scalar,
        };
        assert_eq!(routine.in_arg_count(), 2);
        let ins: Vec<_> = routine.in_args().collect();
        assert_eq!(ins[0], (0, INT4OID, Some("a")));
        assert_eq!(ins[1], (2, INT4OID, None));
    }

    #[test]
    fn type_names_cover_array_suffix() {
        assert_eq!(type_oid_from_name("text[]"), Some(TEXTARRAYOID));
        assert_eq!(type_oid_from_name("INTEGER"), Some(INT4OID));
        assert_eq!(type_oid_from_name("no such type"), None);
    }
}
