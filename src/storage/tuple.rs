//! Relational value representation and the materialized result buffer.

use rust_decimal::Decimal;

use crate::catalog::{Oid, RowDescriptor};
use crate::errors::PlScriptError;

/// A typed relational value in the host engine's native representation.
///
/// Opaque outside the marshaling layer. `Date` counts days since the Unix
/// epoch; `Timestamp`/`TimestampTz` count milliseconds since the Unix epoch.
/// `Opaque` carries the raw bytes of a type the subsystem has no decoder
/// for.
#[derive(Debug, Clone, PartialEq)]
pub enum Datum {
    Null,
    Bool(bool),
    Int2(i16),
    Int4(i32),
    Int8(i64),
    Float4(f32),
    Float8(f64),
    Numeric(Decimal),
    Text(String),
    Bytea(Vec<u8>),
    Date(i32),
    Timestamp(i64),
    TimestampTz(i64),
    Json(String),
    Array(ArrayDatum),
    Row(RowValue),
    Opaque(Vec<u8>),
}

impl Datum {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn render(&self) -> String {
        match self {
            Self::Null => "NULL".to_string(),
            Self::Bool(v) => if *v { "t" } else { "f" }.to_string(),
            Self::Int2(v) => v.to_string(),
            Self::Int4(v) => v.to_string(),
            Self::Int8(v) => v.to_string(),
            Self::Float4(v) => v.to_string(),
            Self::Float8(v) => v.to_string(),
            Self::Numeric(v) => v.to_string(),
            Self::Text(v) => v.clone(),
            Self::Bytea(v) => {
                let mut text = String::with_capacity(2 + v.len() * 2);
                text.push_str("\\x");
                for byte in v {
                    text.push_str(&format!("{byte:02x}"));
                }
                text
            }
            Self::Date(days) => format!("date {days}"),
            Self::Timestamp(ms) | Self::TimestampTz(ms) => format!("epoch-ms {ms}"),
            Self::Json(v) => v.clone(),
            Self::Array(array) => array.render(),
            Self::Row(row) => row.render(),
            Self::Opaque(v) => format!("opaque[{}]", v.len()),
        }
    }
}

/// One-dimensional, lower-bound-1 array value.
#[derive(Debug, Clone, PartialEq)]
pub struct ArrayDatum {
    pub element_type: Oid,
    pub elements: Vec<Datum>,
}

impl ArrayDatum {
    pub fn new(element_type: Oid, elements: Vec<Datum>) -> Self {
        Self {
            element_type,
            elements,
        }
    }

    fn render(&self) -> String {
        let parts: Vec<String> = self.elements.iter().map(Datum::render).collect();
        format!("{{{}}}", parts.join(","))
    }
}

/// A composite value: one datum per descriptor attribute, dropped columns
/// included as nulls to keep positions aligned.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RowValue {
    pub values: Vec<Datum>,
}

impl RowValue {
    pub fn new(values: Vec<Datum>) -> Self {
        Self { values }
    }

    fn render(&self) -> String {
        let parts: Vec<String> = self
            .values
            .iter()
            .map(|v| {
                if v.is_null() {
                    String::new()
                } else {
                    v.render()
                }
            })
            .collect();
        format!("({})", parts.join(","))
    }
}

/// Append-only, order-preserving row sink for set-returning call output.
#[derive(Debug, Clone)]
pub struct Tuplestore {
    row_desc: RowDescriptor,
    rows: Vec<RowValue>,
}

impl Tuplestore {
    pub fn new(row_desc: RowDescriptor) -> Self {
        Self {
            row_desc,
            rows: Vec::new(),
        }
    }

    pub fn row_desc(&self) -> &RowDescriptor {
        &self.row_desc
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn put_row(&mut self, row: RowValue) -> Result<(), PlScriptError> {
        if row.values.len() != self.row_desc.natts() {
            return Err(PlScriptError::resource(format!(
                "row has {} values but descriptor declares {} columns",
                row.values.len(),
                self.row_desc.natts()
            )));
        }
        self.rows.push(row);
        Ok(())
    }

    pub fn rows(&self) -> &[RowValue] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<RowValue> {
        self.rows
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{INT4OID, RowAttribute, TEXTOID};

    #[test]
    fn tuplestore_preserves_append_order() {
        let desc = RowDescriptor::new(vec![RowAttribute::new("n", INT4OID)]);
        let mut store = Tuplestore::new(desc);
        for i in 0..3 {
            store
                .put_row(RowValue::new(vec![Datum::Int4(i)]))
                .expect("row should append");
        }
        let seen: Vec<i32> = store
            .rows()
            .iter()
            .map(|row| match row.values[0] {
                Datum::Int4(v) => v,
                _ => panic!("unexpected datum"),
            })
            .collect();
        assert_eq!(seen, vec![0, 1, 2]);
    }

    #[test]
    fn tuplestore_rejects_arity_mismatch() {
        let desc = RowDescriptor::new(vec![
            RowAttribute::new("a", INT4OID),
            RowAttribute::new("b", TEXTOID),
        ]);
        let mut store = Tuplestore::new(desc);
        let err = store
            .put_row(RowValue::new(vec![Datum::Int4(1)]))
            .expect_err("short row should be rejected");
        assert!(matches!(err, PlScriptError::Resource { .. }));
    }

    #[test]
    fn renders_rows_with_empty_nulls() {
        let row = RowValue::new(vec![Datum::Int4(1), Datum::Null, Datum::Text("x".into())]);
        assert_eq!(row.render(), "(1,,x)");
    }
}
