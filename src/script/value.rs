//! Tagged-union script value representation.
//!
//! Every value that crosses the marshaling boundary is one of these
//! variants; the marshaler dispatches exhaustively on them instead of
//! leaning on any host-language dynamic dispatch.

use std::collections::BTreeMap;

use serde_json::{Map as JsonMap, Number as JsonNumber, Value as JsonValue};

use crate::utils::adt::datetime::format_epoch_millis;

/// Handle into a context's compiled-function table.
pub type FuncId = u32;

/// Element shape of a typed numeric array.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypedArrayKind {
    Int8,
    Uint8,
    Int16,
    Uint16,
    Int32,
    Uint32,
}

impl TypedArrayKind {
    pub fn element_width(self) -> usize {
        match self {
            Self::Int8 | Self::Uint8 => 1,
            Self::Int16 | Self::Uint16 => 2,
            Self::Int32 | Self::Uint32 => 4,
        }
    }
}

/// Identity of a native function exposed through the embedding namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NativeTag {
    NamespaceToString,
    Log,
    Execute,
    Prepare,
    Commit,
    Rollback,
    FindRoutine,
    EmitRow,
    WindowHandle,
    PlanExecute,
    PlanCursor,
    PlanFree,
    PlanToString,
    CursorFetch,
    CursorMove,
    CursorClose,
    CursorToString,
    WinGetPartitionLocal,
    WinSetPartitionLocal,
    WinGetCurrentPosition,
    WinGetPartitionRowCount,
    WinSetMarkPosition,
    WinRowsArePeers,
    WinGetArgInPartition,
    WinGetArgInFrame,
    WinGetArgCurrent,
    WinToString,
}

/// A value in the embedded engine's representation.
///
/// `Date` carries epoch milliseconds. `Bytes` is the generic byte buffer;
/// `TypedArray` models the 1/2/4-byte-wide numeric views accepted by the
/// binary-blob encode path.
#[derive(Debug, Clone, PartialEq)]
pub enum ScriptValue {
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    BigInt(i64),
    String(String),
    Bytes(Vec<u8>),
    TypedArray {
        kind: TypedArrayKind,
        values: Vec<i64>,
    },
    Date(i64),
    Array(Vec<ScriptValue>),
    Object(BTreeMap<String, ScriptValue>),
    Function(FuncId),
    Native(NativeTag),
}

impl ScriptValue {
    pub fn object(pairs: impl IntoIterator<Item = (String, ScriptValue)>) -> Self {
        Self::Object(pairs.into_iter().collect())
    }

    pub fn is_nullish(&self) -> bool {
        matches!(self, Self::Null | Self::Undefined)
    }

    /// ToBoolean.
    pub fn truthy(&self) -> bool {
        match self {
            Self::Undefined | Self::Null => false,
            Self::Bool(b) => *b,
            Self::Number(n) => *n != 0.0 && !n.is_nan(),
            Self::BigInt(n) => *n != 0,
            Self::String(s) => !s.is_empty(),
            _ => true,
        }
    }

    /// ToNumber for the scalar shapes; `None` for shapes with no numeric
    /// interpretation.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::BigInt(n) => Some(*n as f64),
            Self::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Self::Null => Some(0.0),
            Self::String(s) => {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    Some(0.0)
                } else {
                    trimmed.parse::<f64>().ok()
                }
            }
            Self::Date(ms) => Some(*ms as f64),
            _ => None,
        }
    }

    /// ToString, as the embedding renders values for text targets and log
    /// output.
    pub fn display_string(&self) -> String {
        match self {
            Self::Undefined => "undefined".to_string(),
            Self::Null => "null".to_string(),
            Self::Bool(b) => b.to_string(),
            Self::Number(n) => render_number(*n),
            Self::BigInt(n) => n.to_string(),
            Self::String(s) => s.clone(),
            Self::Bytes(bytes) => String::from_utf8_lossy(bytes).into_owned(),
            Self::TypedArray { values, .. } => values
                .iter()
                .map(|v| v.to_string())
                .collect::<Vec<_>>()
                .join(","),
            Self::Date(ms) => format_epoch_millis(*ms),
            Self::Array(items) => items
                .iter()
                .map(|item| {
                    if item.is_nullish() {
                        String::new()
                    } else {
                        item.display_string()
                    }
                })
                .collect::<Vec<_>>()
                .join(","),
            Self::Object(_) => "[object Object]".to_string(),
            Self::Function(_) | Self::Native(_) => "[function]".to_string(),
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Undefined => "undefined",
            Self::Null => "null",
            Self::Bool(_) => "boolean",
            Self::Number(_) => "number",
            Self::BigInt(_) => "bigint",
            Self::String(_) => "string",
            Self::Bytes(_) => "bytes",
            Self::TypedArray { .. } => "typed array",
            Self::Date(_) => "date",
            Self::Array(_) => "array",
            Self::Object(_) => "object",
            Self::Function(_) => "function",
            Self::Native(_) => "native function",
        }
    }

    /// The engine's native JSON serializer.
    ///
    /// Undefined, functions and non-finite numbers serialize as JSON null;
    /// undefined object members are skipped, matching the usual stringify
    /// behavior.
    pub fn to_json(&self) -> JsonValue {
        match self {
            Self::Undefined | Self::Null | Self::Function(_) | Self::Native(_) => JsonValue::Null,
            Self::Bool(b) => JsonValue::Bool(*b),
            Self::Number(n) => JsonNumber::from_f64(*n)
                .map(json_number_normalized)
                .unwrap_or(JsonValue::Null),
            Self::BigInt(n) => JsonValue::Number(JsonNumber::from(*n)),
            Self::String(s) => JsonValue::String(s.clone()),
            Self::Bytes(bytes) => JsonValue::String(String::from_utf8_lossy(bytes).into_owned()),
            Self::TypedArray { values, .. } => JsonValue::Array(
                values
                    .iter()
                    .map(|v| JsonValue::Number(JsonNumber::from(*v)))
                    .collect(),
            ),
            Self::Date(ms) => JsonValue::String(format_epoch_millis(*ms)),
            Self::Array(items) => JsonValue::Array(items.iter().map(Self::to_json).collect()),
            Self::Object(map) => {
                let mut out = JsonMap::new();
                for (key, value) in map {
                    if matches!(value, Self::Undefined) {
                        continue;
                    }
                    out.insert(key.clone(), value.to_json());
                }
                JsonValue::Object(out)
            }
        }
    }

    /// The engine's native JSON parser output.
    pub fn from_json(value: &JsonValue) -> Self {
        match value {
            JsonValue::Null => Self::Null,
            JsonValue::Bool(b) => Self::Bool(*b),
            JsonValue::Number(n) => Self::Number(n.as_f64().unwrap_or(f64::NAN)),
            JsonValue::String(s) => Self::String(s.clone()),
            JsonValue::Array(items) => Self::Array(items.iter().map(Self::from_json).collect()),
            JsonValue::Object(map) => Self::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), Self::from_json(v)))
                    .collect(),
            ),
        }
    }
}

/// Integral finite numbers render without a trailing fraction.
fn render_number(n: f64) -> String {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

fn json_number_normalized(n: JsonNumber) -> JsonValue {
    // Keep integral floats as JSON integers so 5.0 round-trips as 5.
    if let Some(f) = n.as_f64() {
        if f.is_finite() && f.fract() == 0.0 && f.abs() < 1e15 {
            return JsonValue::Number(JsonNumber::from(f as i64));
        }
    }
    JsonValue::Number(n)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truthiness_follows_script_semantics() {
        assert!(!ScriptValue::Undefined.truthy());
        assert!(!ScriptValue::Number(0.0).truthy());
        assert!(!ScriptValue::String(String::new()).truthy());
        assert!(ScriptValue::Array(Vec::new()).truthy());
        assert!(ScriptValue::Object(Default::default()).truthy());
    }

    #[test]
    fn json_round_trip_preserves_structure() {
        let value = ScriptValue::object([
            ("a".to_string(), ScriptValue::Number(5.0)),
            ("b".to_string(), ScriptValue::Array(vec![
                ScriptValue::Null,
                ScriptValue::String("x".to_string()),
            ])),
            ("skipped".to_string(), ScriptValue::Undefined),
        ]);
        let json = value.to_json();
        assert_eq!(json.to_string(), r#"{"a":5,"b":[null,"x"]}"#);
        let back = ScriptValue::from_json(&json);
        let ScriptValue::Object(map) = back else {
            panic!("expected object");
        };
        assert_eq!(map.len(), 2);
        assert_eq!(map["a"], ScriptValue::Number(5.0));
    }

    #[test]
    fn integral_numbers_render_without_fraction() {
        assert_eq!(ScriptValue::Number(5.0).display_string(), "5");
        assert_eq!(ScriptValue::Number(5.5).display_string(), "5.5");
    }
}
