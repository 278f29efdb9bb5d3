//! # Burn Record Utilities

use burn::prelude::Backend;
use burn::record::{HalfPrecisionSettings, Record};
use serde_json::{Map, Value};

/// Build a shape-only JSON view of a module record.
///
/// Numeric arrays are replaced by ``{"_shape": [...]}`` and raw tensor
/// bytes are dropped, leaving the structure and the parameter shapes.
pub fn record_shape_summary<B: Backend, R: Record<B>>(
    record: R
) -> Result<Value, serde_json::Error> {
    let item = record.into_item::<HalfPrecisionSettings>();
    let value = serde_json::to_value(&item)?;
    Ok(rewrite_value(value))
}

fn shape_of_numeric_array(arr: &[Value]) -> Option<Vec<usize>> {
    match arr.first() {
        None => Some(vec![0]),
        Some(first) if first.is_number() => Some(vec![arr.len()]),
        Some(Value::Array(inner)) => {
            let inner_shape = shape_of_numeric_array(inner)?;
            Some(std::iter::once(arr.len()).chain(inner_shape).collect())
        }
        Some(_) => None,
    }
}

fn rewrite_value(value: Value) -> Value {
    match value {
        Value::Array(a) => match shape_of_numeric_array(&a) {
            Some(shape) => {
                let mut obj: Map<String, Value> = Map::new();
                obj.insert(
                    "_shape".to_string(),
                    Value::Array(shape.into_iter().map(Value::from).collect()),
                );
                Value::Object(obj)
            }
            None => Value::Array(a.into_iter().map(rewrite_value).collect()),
        },
        Value::Object(obj) => {
            let mut new_obj: Map<String, Value> = Map::new();
            for (k, v) in obj.into_iter() {
                if k == "bytes" || v.is_null() {
                    continue;
                }
                if k == "shape" {
                    new_obj.insert(k, v);
                } else {
                    new_obj.insert(k, rewrite_value(v));
                }
            }
            Value::Object(new_obj)
        }
        v => v,
    }
}
