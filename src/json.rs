//! Batch functions backed by loosely typed sources can hand back a raw
//! [`serde_json::Value`]: an array is read as a positional sequence, an
//! object as a key → value mapping. Anything else is a shape mismatch.

use std::collections::HashMap;
use std::hash::Hash;
use std::str::FromStr;

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::batch_fn::{BatchResult, IntoBatchResult};
use crate::error::ShapeMismatch;

impl<K, V> IntoBatchResult<K, V> for Value
where
    K: FromStr + Eq + Hash,
    V: DeserializeOwned,
{
    fn into_batch_result(self) -> Result<BatchResult<K, V>, ShapeMismatch> {
        match self {
            Value::Array(items) => items
                .into_iter()
                .map(decode)
                .collect::<Result<Vec<V>, _>>()
                .map(BatchResult::Values),
            Value::Object(entries) => entries
                .into_iter()
                .map(|(key, value)| {
                    let key = key
                        .parse::<K>()
                        .map_err(|_| ShapeMismatch(format!("unparseable key `{}`", key)))?;
                    Ok((key, decode(value)?))
                })
                .collect::<Result<HashMap<K, V>, _>>()
                .map(BatchResult::Map),
            other => Err(ShapeMismatch(other.to_string())),
        }
    }
}

fn decode<V: DeserializeOwned>(value: Value) -> Result<V, ShapeMismatch> {
    serde_json::from_value(value).map_err(|err| ShapeMismatch(err.to_string()))
}
