/**
 * Shared CRDT Helpers
 *
 * The node map is a Yjs `Y.Map` named `nodes` inside a `yrs::Doc`. Peers
 * exchange v1-encoded updates; the relay keeps its own document per room
 * and hands its full state to joining peers.
 *
 * Values are stored as plain Yjs objects (`Any::Map`) so browser clients
 * reading the same document see ordinary JSON.
 */

use crate::shared::error::SharedError;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use yrs::updates::decoder::Decode;
use yrs::{Any, Doc, Map, Origin, ReadTxn, StateVector, Transact, Update};

/// Root map holding the nodes of a workspace
pub const NODES_MAP: &str = "nodes";

/// Largest integer a Yjs number holds exactly
const MAX_SAFE_INTEGER: u64 = (1 << 53) - 1;

/// Decode a v1 update received from the wire
pub fn decode_update(bytes: &[u8]) -> Result<Update, SharedError> {
    Update::decode_v1(bytes).map_err(|e| SharedError::serialization(format!("Bad CRDT update: {}", e)))
}

/// Apply a v1 update to `doc` in a transaction tagged `origin`
pub fn apply_update(doc: &Doc, bytes: &[u8], origin: &str) -> Result<(), SharedError> {
    let update = decode_update(bytes)?;
    let mut txn = doc.transact_mut_with(Origin::from(origin));
    txn.apply_update(update)
        .map_err(|e| SharedError::serialization(format!("Failed to apply CRDT update: {}", e)))
}

/// Full document state as one v1 update
pub fn encode_state(doc: &Doc) -> Vec<u8> {
    let txn = doc.transact();
    txn.encode_state_as_update_v1(&StateVector::default())
}

/// Number of keys in the `nodes` map of `doc`
pub fn node_count(doc: &Doc) -> usize {
    let txn = doc.transact();
    txn.get_map(NODES_MAP)
        .map(|nodes| nodes.len(&txn) as usize)
        .unwrap_or(0)
}

/// Encode a value as a Yjs object
pub fn encode_value<V: Serialize>(value: &V) -> Result<Any, SharedError> {
    Ok(json_to_any(serde_json::to_value(value)?))
}

/// Decode a value stored by `encode_value` or by a Yjs client
pub fn decode_value<V: DeserializeOwned>(any: &Any) -> Result<V, SharedError> {
    Ok(serde_json::from_value(any_to_json(any))?)
}

fn json_to_any(value: Value) -> Any {
    match value {
        Value::Null => Any::Null,
        Value::Bool(flag) => Any::Bool(flag),
        Value::Number(number) => match number.as_i64() {
            Some(int) if int.unsigned_abs() <= MAX_SAFE_INTEGER => Any::Number(int as f64),
            Some(int) => Any::BigInt(int),
            None => Any::Number(number.as_f64().unwrap_or_default()),
        },
        Value::String(text) => Any::String(text.into()),
        Value::Array(items) => Any::Array(items.into_iter().map(json_to_any).collect::<Vec<_>>().into()),
        Value::Object(fields) => Any::Map(Arc::new(
            fields
                .into_iter()
                .map(|(key, value)| (key, json_to_any(value)))
                .collect::<HashMap<String, Any>>(),
        )),
    }
}

fn any_to_json(any: &Any) -> Value {
    match any {
        Any::Null | Any::Undefined => Value::Null,
        Any::Bool(flag) => Value::Bool(*flag),
        // Yjs has one number type; integral values go back to integers
        Any::Number(number) if number.fract() == 0.0 && number.abs() <= MAX_SAFE_INTEGER as f64 => {
            Value::from(*number as i64)
        }
        Any::Number(number) => serde_json::Number::from_f64(*number)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        Any::BigInt(int) => Value::from(*int),
        Any::String(text) => Value::String(text.to_string()),
        Any::Buffer(bytes) => Value::Array(bytes.iter().map(|byte| Value::from(*byte)).collect()),
        Any::Array(items) => Value::Array(items.iter().map(any_to_json).collect()),
        Any::Map(fields) => Value::Object(
            fields
                .iter()
                .map(|(key, value)| (key.clone(), any_to_json(value)))
                .collect(),
        ),
    }
}
