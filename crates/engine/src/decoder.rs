//! Decode the pool-keyed backtest result artifact
//!
//! The artifact is a JSON document holding per-pool blobs under a fixed
//! key; each blob is itself a JSON-encoded string (double-encoded by the
//! compute service) containing column-orient series maps.

use serde_json::{Map, Value};
use tracing::debug;

use crate::api::store::ArtifactStore;
use crate::error::{BacktestError, EngineResult};
use crate::types::{ArtifactHandle, BacktestResult};

/// Top-level key holding the per-pool result blobs.
const RESULTS_KEY: &str = "Results_all";

/// Fetch a completed result artifact and decode the sub-result for one pool.
pub async fn fetch_and_decode<S: ArtifactStore + ?Sized>(
    store: &S,
    handle: &ArtifactHandle,
    pool_name: &str,
) -> EngineResult<BacktestResult> {
    let document = store.fetch_json(&handle.file_name).await?;
    decode_document(&document, pool_name)
}

/// Decode one pool's result out of a fetched artifact document.
pub fn decode_document(document: &Value, pool_name: &str) -> EngineResult<BacktestResult> {
    let results = document
        .get(RESULTS_KEY)
        .and_then(Value::as_object)
        .ok_or_else(|| {
            BacktestError::MalformedResult(format!("missing `{RESULTS_KEY}` object"))
        })?;

    let blob = results
        .get(pool_name)
        .ok_or_else(|| BacktestError::PoolNotFound(pool_name.to_string()))?;

    // The per-pool value is double-encoded and must be parsed a second time.
    let encoded = blob.as_str().ok_or_else(|| {
        BacktestError::MalformedResult(format!(
            "result for pool `{pool_name}` is not a JSON-encoded string"
        ))
    })?;
    let inner: Value = serde_json::from_str(encoded).map_err(|e| {
        BacktestError::MalformedResult(format!(
            "result for pool `{pool_name}` failed to parse: {e}"
        ))
    })?;

    parse_series(&inner)
}

fn parse_series(value: &Value) -> EngineResult<BacktestResult> {
    let obj = value.as_object().ok_or_else(|| {
        BacktestError::MalformedResult("decoded result is not an object".into())
    })?;

    let result = BacktestResult {
        timestamp: string_series(obj, "timestamp")?,
        pnl_usd: f64_series(obj, "PNL_USD_alt")?,
        apr_pool: f64_series(obj, "APR_pool_alt")?,
        fees_earned: f64_series(obj, "fees_earned_ac")?,
        fees_earned_token0: f64_series(obj, "fees_earned_t0_ac")?,
        fees_earned_token1: f64_series(obj, "fees_earned_t1_ac")?,
        impermanent_loss: f64_series(obj, "IL_USD")?,
        token0_in: f64_series(obj, "t0_in")?,
        token1_in: f64_series(obj, "t1_in")?,
        price_token0: f64_series(obj, "pini_t0")?,
        price_token1: f64_series(obj, "pini_t1")?,
        price_tick_lower: f64_series(obj, "price_tickLow")?,
        price_tick_upper: f64_series(obj, "price_tickUpper")?,
        rebalancing: match obj.get("rebalancing") {
            Some(value) => Some(f64_values("rebalancing", value)?),
            None => None,
        },
    };

    validate_alignment(&result)?;
    debug!(points = result.len(), "Decoded backtest result");
    Ok(result)
}

/// Every metric series must align index-for-index with the timestamps.
fn validate_alignment(result: &BacktestResult) -> EngineResult<()> {
    let expected = result.timestamp.len();
    for (key, len) in result.series_lengths() {
        if len != expected {
            return Err(BacktestError::MalformedResult(format!(
                "series `{key}` has {len} points, expected {expected}"
            )));
        }
    }
    Ok(())
}

/// Series values in index order. Accepts a column-orient map
/// (`{"0": v0, "1": v1, ...}`, ordered by numeric index key) or a plain
/// JSON array.
fn ordered_values<'a>(key: &str, value: &'a Value) -> EngineResult<Vec<&'a Value>> {
    match value {
        Value::Array(items) => Ok(items.iter().collect()),
        Value::Object(map) => {
            let mut indexed = Vec::with_capacity(map.len());
            for (k, v) in map {
                let index: u64 = k.parse().map_err(|_| {
                    BacktestError::MalformedResult(format!(
                        "series `{key}` has non-numeric index `{k}`"
                    ))
                })?;
                indexed.push((index, v));
            }
            indexed.sort_by_key(|(index, _)| *index);
            Ok(indexed.into_iter().map(|(_, v)| v).collect())
        }
        _ => Err(BacktestError::MalformedResult(format!(
            "series `{key}` is neither an array nor an index map"
        ))),
    }
}

fn f64_series(obj: &Map<String, Value>, key: &str) -> EngineResult<Vec<f64>> {
    let value = obj
        .get(key)
        .ok_or_else(|| BacktestError::MalformedResult(format!("missing series `{key}`")))?;
    f64_values(key, value)
}

fn f64_values(key: &str, value: &Value) -> EngineResult<Vec<f64>> {
    ordered_values(key, value)?
        .into_iter()
        .map(|v| {
            v.as_f64().ok_or_else(|| {
                BacktestError::MalformedResult(format!(
                    "series `{key}` contains a non-numeric value"
                ))
            })
        })
        .collect()
}

fn string_series(obj: &Map<String, Value>, key: &str) -> EngineResult<Vec<String>> {
    let value = obj
        .get(key)
        .ok_or_else(|| BacktestError::MalformedResult(format!("missing series `{key}`")))?;
    ordered_values(key, value)?
        .into_iter()
        .map(|v| match v {
            Value::String(s) => Ok(s.clone()),
            Value::Number(n) => Ok(n.to_string()),
            _ => Err(BacktestError::MalformedResult(format!(
                "series `{key}` contains a non-string value"
            ))),
        })
        .collect()
}
