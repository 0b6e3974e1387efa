//! Bidirectional value marshaling between relational values and script
//! values, plus the whole-row converters.
//!
//! Decode (relational → script) and encode (script → relational) dispatch
//! exhaustively on the resolved type descriptor. Unknown types stay total
//! through a documented lossy fallback: fixed-length by-value types travel
//! as a 32-bit integer, everything else as a raw byte string.
//!
//! Precision note: int8 decodes to a script big integer and the encode side
//! accepts big-integer and string input through the decimal-safe path, so
//! values are precision-safe on the way in; numeric decodes to a float64,
//! which is lossy by design.

use byteorder::{ByteOrder, LittleEndian};
use rust_decimal::Decimal;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};

use crate::catalog::{
    BOOLOID, BPCHAROID, BYTEAOID, Catalog, DATEOID, FLOAT4OID, FLOAT8OID, INT2OID, INT4OID,
    INT8OID, JSONBOID, JSONOID, NAMEOID, NUMERICOID, OIDOID, Oid, RowDescriptor, TEXTOID,
    TIMESTAMPOID, TIMESTAMPTZOID, TypeCategory, TypeDescriptor, TypeLength, VARCHAROID, VOIDOID,
    XMLOID, resolve_type,
};
use crate::errors::PlScriptError;
use crate::script::value::ScriptValue;
use crate::storage::tuple::{ArrayDatum, Datum, RowValue, Tuplestore};
use crate::utils::adt::datetime::MILLIS_PER_DAY;

#[cfg(test)]
mod property_tests;

/// Converts one relational value into a script value.
pub fn datum_to_script(
    datum: &Datum,
    desc: &TypeDescriptor,
    catalog: &dyn Catalog,
) -> Result<ScriptValue, PlScriptError> {
    if datum.is_null() {
        return Ok(ScriptValue::Null);
    }

    if desc.category == TypeCategory::Array {
        return decode_array(datum, desc, catalog);
    }

    if desc.category == TypeCategory::Composite {
        return decode_composite(datum, desc, catalog);
    }

    decode_scalar(datum, desc, catalog)
}

fn decode_array(
    datum: &Datum,
    desc: &TypeDescriptor,
    catalog: &dyn Catalog,
) -> Result<ScriptValue, PlScriptError> {
    let Datum::Array(array) = datum else {
        return Err(PlScriptError::type_mismatch(format!(
            "expected an array value, got {}",
            datum.render()
        )));
    };
    let elem_desc = resolve_type(catalog, desc.type_oid)?;
    let mut items = Vec::with_capacity(array.elements.len());
    for element in &array.elements {
        if element.is_null() {
            items.push(ScriptValue::Null);
        } else {
            items.push(datum_to_script(element, &elem_desc, catalog)?);
        }
    }
    Ok(ScriptValue::Array(items))
}

fn decode_composite(
    datum: &Datum,
    desc: &TypeDescriptor,
    catalog: &dyn Catalog,
) -> Result<ScriptValue, PlScriptError> {
    let Datum::Row(row) = datum else {
        return decode_unknown(datum, desc);
    };
    let row_desc = catalog.row_descriptor(desc.type_oid).ok_or_else(|| {
        PlScriptError::resource(format!(
            "no row descriptor for composite type {}",
            desc.type_oid
        ))
    })?;
    tuple_to_script(row, &row_desc, catalog)
}

fn decode_scalar(
    datum: &Datum,
    desc: &TypeDescriptor,
    catalog: &dyn Catalog,
) -> Result<ScriptValue, PlScriptError> {
    let _ = catalog;
    match (desc.type_oid, datum) {
        (BOOLOID, Datum::Bool(v)) => Ok(ScriptValue::Bool(*v)),
        (INT2OID, Datum::Int2(v)) => Ok(ScriptValue::Number(f64::from(*v))),
        (INT4OID, Datum::Int4(v)) => Ok(ScriptValue::Number(f64::from(*v))),
        (OIDOID, Datum::Int4(v)) => Ok(ScriptValue::Number(f64::from(*v))),
        (OIDOID, Datum::Int8(v)) => Ok(ScriptValue::Number(*v as f64)),
        // 64-bit integers become script big integers to avoid precision
        // loss above 2^53.
        (INT8OID, Datum::Int8(v)) => Ok(ScriptValue::BigInt(*v)),
        (FLOAT4OID, Datum::Float4(v)) => Ok(ScriptValue::Number(f64::from(*v))),
        (FLOAT8OID, Datum::Float8(v)) => Ok(ScriptValue::Number(*v)),
        // Lossy by design; the precision-safe direction is encode-side.
        (NUMERICOID, Datum::Numeric(v)) => Ok(ScriptValue::Number(v.to_f64().unwrap_or(f64::NAN))),
        (TEXTOID | VARCHAROID | BPCHAROID | NAMEOID | XMLOID, Datum::Text(v)) => {
            Ok(ScriptValue::String(v.clone()))
        }
        (JSONOID | JSONBOID, Datum::Json(text)) => {
            let parsed: serde_json::Value = serde_json::from_str(text).map_err(|e| {
                PlScriptError::type_mismatch(format!("stored json does not parse: {e}"))
            })?;
            Ok(ScriptValue::from_json(&parsed))
        }
        (BYTEAOID, Datum::Bytea(bytes)) => Ok(ScriptValue::Bytes(bytes.clone())),
        (DATEOID, Datum::Date(days)) => {
            Ok(ScriptValue::Date(i64::from(*days) * MILLIS_PER_DAY))
        }
        (TIMESTAMPOID, Datum::Timestamp(ms)) => Ok(ScriptValue::Date(*ms)),
        (TIMESTAMPTZOID, Datum::TimestampTz(ms)) => Ok(ScriptValue::Date(*ms)),
        (VOIDOID, _) => Ok(ScriptValue::Undefined),
        _ => decode_unknown(datum, desc),
    }
}

/// Total fallback for types without a dedicated decoder. The round trip is
/// lossy for exotic types but never fails on shape alone.
fn decode_unknown(datum: &Datum, desc: &TypeDescriptor) -> Result<ScriptValue, PlScriptError> {
    match datum {
        Datum::Opaque(bytes) => match desc.len {
            TypeLength::Fixed(_) if desc.by_value => {
                let mut buf = [0u8; 4];
                let take = bytes.len().min(4);
                buf[..take].copy_from_slice(&bytes[..take]);
                Ok(ScriptValue::Number(f64::from(LittleEndian::read_i32(&buf))))
            }
            TypeLength::Fixed(len) => {
                let len = len.max(0) as usize;
                let mut copy = bytes.clone();
                copy.truncate(len);
                Ok(ScriptValue::Bytes(copy))
            }
            TypeLength::Variable => Ok(ScriptValue::Bytes(bytes.clone())),
        },
        Datum::Int4(v) if desc.by_value => Ok(ScriptValue::Number(f64::from(*v))),
        other => Err(PlScriptError::type_mismatch(format!(
            "no decoder for type {} value {}",
            desc.type_oid,
            other.render()
        ))),
    }
}

/// Converts one script value into a relational value of the target type.
///
/// Returns the datum plus an explicit null marker; null and undefined map
/// to `(Null, true)` for every target type.
pub fn script_to_datum(
    value: &ScriptValue,
    type_oid: Oid,
    catalog: &dyn Catalog,
) -> Result<(Datum, bool), PlScriptError> {
    if value.is_nullish() {
        return Ok((Datum::Null, true));
    }

    let desc = resolve_type(catalog, type_oid)?;

    if desc.category == TypeCategory::Array {
        return encode_array(value, &desc, catalog);
    }

    if desc.category == TypeCategory::Composite {
        let row_desc = catalog.row_descriptor(desc.type_oid).ok_or_else(|| {
            PlScriptError::resource(format!(
                "no row descriptor for composite type {}",
                desc.type_oid
            ))
        })?;
        let (row, is_null) = script_to_row(value, &row_desc, catalog)?;
        return Ok((Datum::Row(row), is_null));
    }

    encode_scalar(value, &desc, catalog)
}

fn encode_array(
    value: &ScriptValue,
    desc: &TypeDescriptor,
    catalog: &dyn Catalog,
) -> Result<(Datum, bool), PlScriptError> {
    let ScriptValue::Array(items) = value else {
        return Err(PlScriptError::type_mismatch(format!(
            "array-typed target requires a script array, got {}",
            value.type_name()
        )));
    };
    // One-dimensional, lower bound 1; element nulls are preserved in place.
    let mut elements = Vec::with_capacity(items.len());
    for item in items {
        let (datum, _) = script_to_datum(item, desc.type_oid, catalog)?;
        elements.push(datum);
    }
    Ok((
        Datum::Array(ArrayDatum::new(desc.type_oid, elements)),
        false,
    ))
}

fn encode_scalar(
    value: &ScriptValue,
    desc: &TypeDescriptor,
    catalog: &dyn Catalog,
) -> Result<(Datum, bool), PlScriptError> {
    let _ = catalog;
    let datum = match desc.type_oid {
        BOOLOID => Datum::Bool(value.truthy()),
        INT2OID => {
            let v = to_integer(value, "smallint")?;
            Datum::Int2(i16::try_from(v).map_err(|_| out_of_range(v, "smallint"))?)
        }
        INT4OID => {
            let v = to_integer(value, "integer")?;
            Datum::Int4(i32::try_from(v).map_err(|_| out_of_range(v, "integer"))?)
        }
        OIDOID | INT8OID => Datum::Int8(to_integer(value, "bigint")?),
        FLOAT4OID => Datum::Float4(to_float(value, "real")? as f32),
        FLOAT8OID => Datum::Float8(to_float(value, "double precision")?),
        NUMERICOID => Datum::Numeric(to_decimal(value, "numeric")?),
        TEXTOID | VARCHAROID | BPCHAROID | NAMEOID | XMLOID => {
            Datum::Text(value.display_string())
        }
        JSONOID | JSONBOID => {
            // Stringify through the engine serializer, then re-validate
            // through the decimal-safe parser so what is stored always
            // parses back.
            let text = value.to_json().to_string();
            serde_json::from_str::<serde_json::Value>(&text).map_err(|e| {
                PlScriptError::type_mismatch(format!("value does not serialize to json: {e}"))
            })?;
            Datum::Json(text)
        }
        BYTEAOID => encode_bytea(value)?,
        DATEOID => match value {
            ScriptValue::Date(ms) => Datum::Date(
                i32::try_from(ms.div_euclid(MILLIS_PER_DAY))
                    .map_err(|_| PlScriptError::type_mismatch("date out of range"))?,
            ),
            // Non-Date values intentionally fall through to the unknown
            // path; see DESIGN.md.
            other => return encode_unknown(other, desc),
        },
        TIMESTAMPOID => match value {
            ScriptValue::Date(ms) => Datum::Timestamp(*ms),
            other => return encode_unknown(other, desc),
        },
        TIMESTAMPTZOID => match value {
            ScriptValue::Date(ms) => Datum::TimestampTz(*ms),
            other => return encode_unknown(other, desc),
        },
        VOIDOID => Datum::Null,
        _ => return encode_unknown(value, desc),
    };
    Ok((datum, false))
}

/// Binary-blob targets accept typed numeric views (1/2/4-byte element
/// width), a generic byte buffer, or a plain string; anything else raises.
fn encode_bytea(value: &ScriptValue) -> Result<Datum, PlScriptError> {
    match value {
        ScriptValue::TypedArray { kind, values } => {
            let width = kind.element_width();
            let mut bytes = vec![0u8; values.len() * width];
            for (i, v) in values.iter().enumerate() {
                match width {
                    1 => bytes[i] = *v as u8,
                    2 => LittleEndian::write_u16(&mut bytes[i * 2..i * 2 + 2], *v as u16),
                    _ => LittleEndian::write_u32(&mut bytes[i * 4..i * 4 + 4], *v as u32),
                }
            }
            Ok(Datum::Bytea(bytes))
        }
        ScriptValue::Bytes(bytes) => Ok(Datum::Bytea(bytes.clone())),
        ScriptValue::String(text) => Ok(Datum::Bytea(text.as_bytes().to_vec())),
        other => Err(PlScriptError::type_mismatch(format!(
            "bytea target requires a typed array, byte buffer or string, got {}",
            other.type_name()
        ))),
    }
}

/// Mirrors the decode fallback in reverse: a 32-bit integer for fixed-length
/// by-value targets, a raw byte copy otherwise.
fn encode_unknown(
    value: &ScriptValue,
    desc: &TypeDescriptor,
) -> Result<(Datum, bool), PlScriptError> {
    match desc.len {
        TypeLength::Fixed(_) if desc.by_value => {
            let n = value.as_number().ok_or_else(|| {
                PlScriptError::type_mismatch(format!(
                    "type {} expects a numeric value, got {}",
                    desc.type_oid,
                    value.type_name()
                ))
            })?;
            let mut bytes = vec![0u8; 4];
            LittleEndian::write_i32(&mut bytes, n as i32);
            Ok((Datum::Opaque(bytes), false))
        }
        _ => match value {
            ScriptValue::Bytes(bytes) => Ok((Datum::Opaque(bytes.clone()), false)),
            ScriptValue::String(text) => Ok((Datum::Opaque(text.as_bytes().to_vec()), false)),
            other => Err(PlScriptError::type_mismatch(format!(
                "type {} expects a byte-copyable value, got {}",
                desc.type_oid,
                other.type_name()
            ))),
        },
    }
}

/// Integer input path: big integers pass through untouched and strings are
/// read through the decimal parser, so int8-scale values stay exact.
fn to_integer(value: &ScriptValue, what: &str) -> Result<i64, PlScriptError> {
    match value {
        ScriptValue::BigInt(v) => Ok(*v),
        ScriptValue::Number(n) => {
            if n.is_nan() || n.is_infinite() {
                return Err(PlScriptError::type_mismatch(format!(
                    "{what} target cannot encode {n}"
                )));
            }
            Ok(n.trunc() as i64)
        }
        ScriptValue::Bool(b) => Ok(i64::from(*b)),
        ScriptValue::String(_) => {
            let decimal = to_decimal(value, what)?;
            decimal
                .trunc()
                .to_i64()
                .ok_or_else(|| out_of_range_text(what))
        }
        other => Err(PlScriptError::type_mismatch(format!(
            "{what} target cannot encode a {}",
            other.type_name()
        ))),
    }
}

fn to_float(value: &ScriptValue, what: &str) -> Result<f64, PlScriptError> {
    value.as_number().ok_or_else(|| {
        PlScriptError::type_mismatch(format!("{what} target cannot encode a {}", value.type_name()))
    })
}

fn to_decimal(value: &ScriptValue, what: &str) -> Result<Decimal, PlScriptError> {
    match value {
        ScriptValue::BigInt(v) => Ok(Decimal::from(*v)),
        ScriptValue::Number(n) => Decimal::from_f64(*n).ok_or_else(|| {
            PlScriptError::type_mismatch(format!("{what} target cannot encode {n}"))
        }),
        ScriptValue::Bool(b) => Ok(Decimal::from(i64::from(*b))),
        ScriptValue::String(text) => text.trim().parse::<Decimal>().map_err(|_| {
            PlScriptError::type_mismatch(format!("invalid input for {what}: {text:?}"))
        }),
        other => Err(PlScriptError::type_mismatch(format!(
            "{what} target cannot encode a {}",
            other.type_name()
        ))),
    }
}

fn out_of_range(v: i64, what: &str) -> PlScriptError {
    PlScriptError::type_mismatch(format!("value {v} is out of range for {what}"))
}

fn out_of_range_text(what: &str) -> PlScriptError {
    PlScriptError::type_mismatch(format!("value is out of range for {what}"))
}

/// Converts a whole row into a script object, decoding every non-dropped
/// attribute by name. Dropped attributes are omitted entirely, not nulled.
pub fn tuple_to_script(
    row: &RowValue,
    row_desc: &RowDescriptor,
    catalog: &dyn Catalog,
) -> Result<ScriptValue, PlScriptError> {
    let mut map = std::collections::BTreeMap::new();
    for (idx, attr) in row_desc.live() {
        let datum = row.values.get(idx).unwrap_or(&Datum::Null);
        let value = if datum.is_null() {
            ScriptValue::Null
        } else {
            let desc = resolve_type(catalog, attr.type_oid)?;
            datum_to_script(datum, &desc, catalog)?
        };
        map.insert(attr.name.clone(), value);
    }
    Ok(ScriptValue::Object(map))
}

/// Converts a script object into a fresh row value.
///
/// Fields are read by matching property name; a missing or undefined
/// property yields a null field. A nullish script value yields an all-null
/// row with the null marker set.
pub fn script_to_row(
    value: &ScriptValue,
    row_desc: &RowDescriptor,
    catalog: &dyn Catalog,
) -> Result<(RowValue, bool), PlScriptError> {
    if value.is_nullish() {
        return Ok((
            RowValue::new(vec![Datum::Null; row_desc.natts()]),
            true,
        ));
    }
    let values = row_fields(value, row_desc, catalog)?;
    Ok((RowValue::new(values), false))
}

/// Set-returning fast path: converts and appends directly into the
/// materialized result buffer, skipping the intermediate row value.
pub fn script_to_row_into(
    value: &ScriptValue,
    catalog: &dyn Catalog,
    store: &mut Tuplestore,
) -> Result<(), PlScriptError> {
    let row_desc = store.row_desc().clone();
    let values = row_fields(value, &row_desc, catalog)?;
    store.put_row(RowValue::new(values))
}

fn row_fields(
    value: &ScriptValue,
    row_desc: &RowDescriptor,
    catalog: &dyn Catalog,
) -> Result<Vec<Datum>, PlScriptError> {
    let ScriptValue::Object(map) = value else {
        return Err(PlScriptError::type_mismatch(format!(
            "composite value requires a script object, got {}",
            value.type_name()
        )));
    };
    let mut values = Vec::with_capacity(row_desc.natts());
    for attr in &row_desc.attrs {
        if attr.dropped {
            values.push(Datum::Null);
            continue;
        }
        match map.get(&attr.name) {
            None | Some(ScriptValue::Undefined) | Some(ScriptValue::Null) => {
                values.push(Datum::Null);
            }
            Some(field) => {
                let (datum, is_null) = script_to_datum(field, attr.type_oid, catalog)?;
                values.push(if is_null { Datum::Null } else { datum });
            }
        }
    }
    Ok(values)
}

/// Validates that a script object supplies every non-dropped column name
/// before it is accepted as a full-row result.
pub fn check_column_coverage(
    value: &ScriptValue,
    row_desc: &RowDescriptor,
) -> Result<(), PlScriptError> {
    let ScriptValue::Object(map) = value else {
        return Err(PlScriptError::type_mismatch(format!(
            "row result requires a script object, got {}",
            value.type_name()
        )));
    };
    for (_, attr) in row_desc.live() {
        if !map.contains_key(&attr.name) {
            return Err(PlScriptError::missing_column(format!(
                "row result is missing declared column \"{}\"",
                attr.name
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{
        INT4ARRAYOID, MemoryCatalog, RowAttribute, TEXTARRAYOID, UserType,
    };
    use crate::script::value::TypedArrayKind;

    fn catalog() -> MemoryCatalog {
        MemoryCatalog::new(10)
    }

    fn desc(catalog: &dyn Catalog, oid: Oid) -> TypeDescriptor {
        resolve_type(catalog, oid).expect("type should resolve")
    }

    #[test]
    fn int8_decodes_to_bigint() {
        let catalog = catalog();
        let value = datum_to_script(
            &Datum::Int8(9_007_199_254_740_993),
            &desc(&catalog, INT8OID),
            &catalog,
        )
        .expect("decode should succeed");
        assert_eq!(value, ScriptValue::BigInt(9_007_199_254_740_993));
    }

    #[test]
    fn bigint_encodes_exactly_through_integer_path() {
        let catalog = catalog();
        let (datum, is_null) = script_to_datum(
            &ScriptValue::BigInt(9_007_199_254_740_993),
            INT8OID,
            &catalog,
        )
        .expect("encode should succeed");
        assert!(!is_null);
        assert_eq!(datum, Datum::Int8(9_007_199_254_740_993));
    }

    #[test]
    fn bigint_as_string_reads_through_decimal_path() {
        let catalog = catalog();
        let (datum, _) = script_to_datum(
            &ScriptValue::String("9007199254740993".to_string()),
            INT8OID,
            &catalog,
        )
        .expect("encode should succeed");
        assert_eq!(datum, Datum::Int8(9_007_199_254_740_993));
    }

    #[test]
    fn nullish_encodes_as_null_for_every_target() {
        let catalog = catalog();
        for oid in [BOOLOID, INT4OID, TEXTOID, JSONBOID, BYTEAOID, TEXTARRAYOID] {
            let (datum, is_null) =
                script_to_datum(&ScriptValue::Null, oid, &catalog).expect("null should encode");
            assert!(is_null);
            assert!(datum.is_null());
            let (datum, is_null) = script_to_datum(&ScriptValue::Undefined, oid, &catalog)
                .expect("undefined should encode");
            assert!(is_null);
            assert!(datum.is_null());
        }
    }

    #[test]
    fn array_decode_preserves_null_positions() {
        let catalog = catalog();
        let datum = Datum::Array(ArrayDatum::new(
            INT4OID,
            vec![Datum::Int4(1), Datum::Null, Datum::Int4(3)],
        ));
        let value = datum_to_script(&datum, &desc(&catalog, INT4ARRAYOID), &catalog)
            .expect("decode should succeed");
        assert_eq!(
            value,
            ScriptValue::Array(vec![
                ScriptValue::Number(1.0),
                ScriptValue::Null,
                ScriptValue::Number(3.0),
            ])
        );
    }

    #[test]
    fn scalar_for_array_target_is_a_type_mismatch() {
        let catalog = catalog();
        let err = script_to_datum(
            &ScriptValue::String("x".to_string()),
            TEXTARRAYOID,
            &catalog,
        )
        .expect_err("scalar should not silently wrap");
        assert!(matches!(err, PlScriptError::TypeMismatch { .. }));
    }

    #[test]
    fn json_decodes_to_native_values_and_encodes_back() {
        let catalog = catalog();
        let value = datum_to_script(
            &Datum::Json(r#"{"a":[1,null],"b":"x"}"#.to_string()),
            &desc(&catalog, JSONBOID),
            &catalog,
        )
        .expect("decode should succeed");
        let ScriptValue::Object(map) = &value else {
            panic!("expected object, got {value:?}");
        };
        assert_eq!(map.len(), 2);
        let (datum, _) =
            script_to_datum(&value, JSONBOID, &catalog).expect("encode should succeed");
        assert_eq!(datum, Datum::Json(r#"{"a":[1,null],"b":"x"}"#.to_string()));
    }

    #[test]
    fn bytea_accepts_all_four_shapes() {
        let catalog = catalog();
        let cases = [
            (
                ScriptValue::TypedArray {
                    kind: TypedArrayKind::Uint8,
                    values: vec![1, 2, 255],
                },
                vec![1u8, 2, 255],
            ),
            (
                ScriptValue::TypedArray {
                    kind: TypedArrayKind::Uint16,
                    values: vec![0x0102],
                },
                vec![2u8, 1],
            ),
            (
                ScriptValue::TypedArray {
                    kind: TypedArrayKind::Uint32,
                    values: vec![0x01020304],
                },
                vec![4u8, 3, 2, 1],
            ),
            (ScriptValue::Bytes(vec![9, 8]), vec![9u8, 8]),
            (
                ScriptValue::String("ab".to_string()),
                vec![b'a', b'b'],
            ),
        ];
        for (value, expected) in cases {
            let (datum, _) =
                script_to_datum(&value, BYTEAOID, &catalog).expect("encode should succeed");
            assert_eq!(datum, Datum::Bytea(expected));
        }
        let err = script_to_datum(&ScriptValue::Number(5.0), BYTEAOID, &catalog)
            .expect_err("number should raise for bytea");
        assert!(matches!(err, PlScriptError::TypeMismatch { .. }));
    }

    #[test]
    fn date_round_trips_through_epoch_millis() {
        let catalog = catalog();
        let value = datum_to_script(&Datum::Date(19_000), &desc(&catalog, DATEOID), &catalog)
            .expect("decode should succeed");
        assert_eq!(value, ScriptValue::Date(19_000 * MILLIS_PER_DAY));
        let (datum, _) = script_to_datum(&value, DATEOID, &catalog).expect("encode should succeed");
        assert_eq!(datum, Datum::Date(19_000));
    }

    #[test]
    fn non_date_for_timestamp_falls_through_to_unknown_path() {
        let catalog = catalog();
        // Timestamps are fixed-length by-value, so the unknown path reads a
        // 32-bit integer instead of raising; pinned as documented behavior.
        let (datum, is_null) =
            script_to_datum(&ScriptValue::Number(7.0), TIMESTAMPOID, &catalog)
                .expect("fallback should apply");
        assert!(!is_null);
        assert_eq!(datum, Datum::Opaque(vec![7, 0, 0, 0]));
    }

    #[test]
    fn unknown_type_round_trip_is_total() {
        let mut catalog = catalog();
        catalog.add_type(
            70_000,
            UserType::Scalar {
                len: TypeLength::Fixed(4),
                by_value: true,
                alignment: crate::catalog::TypeAlignment::Int,
            },
        );
        let (datum, _) = script_to_datum(&ScriptValue::Number(1234.0), 70_000, &catalog)
            .expect("encode should succeed");
        let back = datum_to_script(&datum, &desc(&catalog, 70_000), &catalog)
            .expect("decode should succeed");
        assert_eq!(back, ScriptValue::Number(1234.0));
    }

    #[test]
    fn dropped_columns_are_omitted_not_nulled() {
        let catalog = catalog();
        let row_desc = RowDescriptor::new(vec![
            RowAttribute::new("a", INT4OID),
            RowAttribute::dropped("zap", TEXTOID),
            RowAttribute::new("b", TEXTOID),
        ]);
        let row = RowValue::new(vec![
            Datum::Int4(1),
            Datum::Null,
            Datum::Text("x".to_string()),
        ]);
        let value =
            tuple_to_script(&row, &row_desc, &catalog).expect("conversion should succeed");
        let ScriptValue::Object(map) = value else {
            panic!("expected object");
        };
        assert_eq!(map.len(), 2);
        assert!(!map.contains_key("zap"));
    }

    #[test]
    fn missing_object_property_becomes_null_field() {
        let catalog = catalog();
        let row_desc = RowDescriptor::new(vec![
            RowAttribute::new("id", INT4OID),
            RowAttribute::new("description", TEXTOID),
        ]);
        let value = ScriptValue::object([("id".to_string(), ScriptValue::Number(1.0))]);
        let (row, is_null) =
            script_to_row(&value, &row_desc, &catalog).expect("conversion should succeed");
        assert!(!is_null);
        assert_eq!(row.values[0], Datum::Int4(1));
        assert_eq!(row.values[1], Datum::Null);
    }

    #[test]
    fn column_coverage_reports_first_missing_column() {
        let row_desc = RowDescriptor::new(vec![
            RowAttribute::new("a", INT4OID),
            RowAttribute::dropped("gone", TEXTOID),
            RowAttribute::new("b", TEXTOID),
        ]);
        let value = ScriptValue::object([("a".to_string(), ScriptValue::Number(1.0))]);
        let err = check_column_coverage(&value, &row_desc).expect_err("b is missing");
        assert_eq!(
            err,
            PlScriptError::MissingColumn {
                message: "row result is missing declared column \"b\"".to_string()
            }
        );
        // Dropped columns are not required.
        let full = ScriptValue::object([
            ("a".to_string(), ScriptValue::Number(1.0)),
            ("b".to_string(), ScriptValue::Null),
        ]);
        check_column_coverage(&full, &row_desc).expect("coverage should pass");
    }
}
