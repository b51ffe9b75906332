//! JSON-RPC 2.0 method dispatch over the validator.
//!
//! Framing only: any HTTP or socket server can feed decoded requests through
//! [`dispatch`]; nothing here performs I/O.

use pulse_types::{MicroBatch, Transaction};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::Validator;

pub const INVALID_REQUEST: i64 = -32600;
pub const METHOD_NOT_FOUND: i64 = -32601;
pub const INVALID_PARAMS: i64 = -32602;
pub const INTERNAL_ERROR: i64 = -32603;
pub const TRANSACTION_REJECTED: i64 = -32000;

/// A JSON-RPC 2.0 request.  Params may be by-name (`{"address": …}`) or
/// positional (`["0x…"]`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcRequest {
    pub jsonrpc: String,
    pub method: String,
    #[serde(default)]
    pub params: Value,
    #[serde(default)]
    pub id: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcResponse {
    pub jsonrpc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
    pub id: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
}

impl RpcResponse {
    fn ok(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".into(),
            result: Some(result),
            error: None,
            id,
        }
    }

    fn err(id: Value, code: i64, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0".into(),
            result: None,
            error: Some(RpcError {
                code,
                message: message.into(),
            }),
            id,
        }
    }
}

/// Condensed batch view for the RPC surface.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSummary {
    pub id: String,
    pub batch_number: u64,
    pub timestamp: i64,
    pub merkle_root: String,
    pub transactions: usize,
}

impl From<&MicroBatch> for BatchSummary {
    fn from(batch: &MicroBatch) -> Self {
        Self {
            id: batch.id.clone(),
            batch_number: batch.batch_number,
            timestamp: batch.timestamp,
            merkle_root: batch.merkle_root.clone(),
            transactions: batch.len(),
        }
    }
}

/// Route one request to the validator.
pub fn dispatch(validator: &mut Validator, request: RpcRequest) -> RpcResponse {
    let id = request.id.clone();

    if request.jsonrpc != "2.0" {
        return RpcResponse::err(id, INVALID_REQUEST, "jsonrpc must be \"2.0\"");
    }

    match request.method.as_str() {
        "getBlockHeight" => RpcResponse::ok(id, json!(validator.latest_block().number)),

        "getLatestBlock" => to_result(id, validator.latest_block()),

        "getBlock" => match u64_param(&request.params, "index") {
            None => RpcResponse::err(id, INVALID_PARAMS, "missing block index"),
            Some(number) => match validator.block(number) {
                Some(block) => to_result(id, block),
                None => RpcResponse::ok(id, Value::Null),
            },
        },

        "getBalance" => match string_param(&request.params, "address") {
            None => RpcResponse::err(id, INVALID_PARAMS, "missing address"),
            Some(address) => {
                RpcResponse::ok(id, json!(validator.balance(&address).to_string()))
            }
        },

        "getNonce" => match string_param(&request.params, "address") {
            None => RpcResponse::err(id, INVALID_PARAMS, "missing address"),
            Some(address) => RpcResponse::ok(id, json!(validator.nonce(&address))),
        },

        "getAccount" => match string_param(&request.params, "address") {
            None => RpcResponse::err(id, INVALID_PARAMS, "missing address"),
            Some(address) => {
                let account = validator.account(&address);
                RpcResponse::ok(
                    id,
                    json!({
                        "address": account.address,
                        "balance": account.balance.to_string(),
                        "nonce": account.nonce,
                    }),
                )
            }
        },

        "getTransactionPoolSize" => RpcResponse::ok(id, json!(validator.mempool_size())),

        "sendTransaction" => match tx_param(&request.params) {
            None => RpcResponse::err(id, INVALID_PARAMS, "params must be a transaction"),
            Some(tx) => {
                let hash = tx.hash.clone();
                if validator.add_transaction(tx) {
                    RpcResponse::ok(id, json!({ "success": true, "hash": hash }))
                } else {
                    RpcResponse::err(id, TRANSACTION_REJECTED, "transaction rejected")
                }
            }
        },

        "getValidatorStats" | "getNetworkStats" => to_result(id, &validator.stats()),

        "getBatch" => match string_param(&request.params, "batchId") {
            None => RpcResponse::err(id, INVALID_PARAMS, "missing batchId"),
            Some(batch_id) => match validator.batch(&batch_id) {
                Some(batch) => to_result(id, &BatchSummary::from(batch)),
                None => RpcResponse::ok(id, Value::Null),
            },
        },

        "getFinalizedBatches" => {
            let summaries: Vec<BatchSummary> = validator
                .finalized_batches()
                .into_iter()
                .map(BatchSummary::from)
                .collect();
            to_result(id, &summaries)
        }

        "getPendingBatches" => {
            let summaries: Vec<BatchSummary> = validator
                .pending_batches()
                .into_iter()
                .map(BatchSummary::from)
                .collect();
            to_result(id, &summaries)
        }

        _ => RpcResponse::err(
            id,
            METHOD_NOT_FOUND,
            format!("method not found: {}", request.method),
        ),
    }
}

fn to_result<T: Serialize>(id: Value, value: T) -> RpcResponse {
    match serde_json::to_value(value) {
        Ok(value) => RpcResponse::ok(id, value),
        Err(e) => RpcResponse::err(id, INTERNAL_ERROR, e.to_string()),
    }
}

/// Named lookup with positional fallback on the first element.
fn string_param(params: &Value, key: &str) -> Option<String> {
    match params {
        Value::Object(map) => map.get(key).and_then(Value::as_str).map(str::to_string),
        Value::Array(items) => items.first().and_then(Value::as_str).map(str::to_string),
        _ => None,
    }
}

fn u64_param(params: &Value, key: &str) -> Option<u64> {
    match params {
        Value::Object(map) => map.get(key).and_then(Value::as_u64),
        Value::Array(items) => items.first().and_then(Value::as_u64),
        _ => None,
    }
}

fn tx_param(params: &Value) -> Option<Transaction> {
    let raw = match params {
        Value::Object(_) => params.clone(),
        Value::Array(items) => items.first()?.clone(),
        _ => return None,
    };
    serde_json::from_value(raw).ok()
}
