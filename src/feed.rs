//! Active-orders feed: the read-only source of truth for which orders exist
//! and how far along they are.
//!
//! The feed answers with a single-element envelope:
//!
//! ```text
//! [ { "data": [ { "id_marketer_order": 5, "codigo_producto": "S1", ... } ] } ]
//! ```
//!
//! Anything else is rejected outright; a partially understood snapshot is
//! never handed to the reconciler.

use std::fs;
use std::path::PathBuf;

use serde_json::Value;

use crate::model::{Order, OrderState};

/// Why a feed snapshot could not be obtained.
#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    #[error("order feed unavailable: {0}")]
    Unavailable(String),

    #[error("unexpected order feed format: {0}")]
    Format(String),
}

/// A source of active-order snapshots.
pub trait OrderFeed {
    /// Fetches the complete current snapshot. No retries.
    fn fetch(&self) -> Result<Vec<Order>, FeedError>;
}

impl<T: OrderFeed + ?Sized> OrderFeed for Box<T> {
    fn fetch(&self) -> Result<Vec<Order>, FeedError> {
        (**self).fetch()
    }
}

/// Fetches the snapshot over HTTP.
pub struct HttpFeed {
    client: reqwest::blocking::Client,
    url: String,
}

impl HttpFeed {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::blocking::Client::new(),
            url: url.into(),
        }
    }
}

impl OrderFeed for HttpFeed {
    fn fetch(&self) -> Result<Vec<Order>, FeedError> {
        tracing::debug!(url = %self.url, "fetching order feed");
        let response = self
            .client
            .get(&self.url)
            .send()
            .map_err(|e| FeedError::Unavailable(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(FeedError::Unavailable(format!(
                "{} answered {status}",
                self.url
            )));
        }
        let body = response
            .bytes()
            .map_err(|e| FeedError::Unavailable(e.to_string()))?;
        let orders = parse_envelope(&body)?;
        tracing::debug!(orders = orders.len(), "order feed fetched");
        Ok(orders)
    }
}

/// Reads a captured snapshot from disk, in the same envelope format.
pub struct FileFeed {
    path: PathBuf,
}

impl FileFeed {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl OrderFeed for FileFeed {
    fn fetch(&self) -> Result<Vec<Order>, FeedError> {
        let bytes = fs::read(&self.path).map_err(|e| {
            FeedError::Unavailable(format!("failed to read {}: {e}", self.path.display()))
        })?;
        parse_envelope(&bytes)
    }
}

/// A fixed snapshot.
#[cfg(test)]
#[derive(Debug, Clone, Default)]
pub struct StaticFeed {
    pub orders: Vec<Order>,
}

#[cfg(test)]
impl OrderFeed for StaticFeed {
    fn fetch(&self) -> Result<Vec<Order>, FeedError> {
        Ok(self.orders.clone())
    }
}

/// Parses the feed envelope into orders.
pub fn parse_envelope(bytes: &[u8]) -> Result<Vec<Order>, FeedError> {
    let root: Value =
        serde_json::from_slice(bytes).map_err(|e| FeedError::Format(format!("invalid JSON: {e}")))?;

    let envelope = match root {
        Value::Array(items) if items.len() == 1 => items.into_iter().next(),
        Value::Array(items) => {
            return Err(FeedError::Format(format!(
                "expected a single-element envelope, got {} elements",
                items.len()
            )));
        }
        _ => return Err(FeedError::Format("expected a JSON array envelope".into())),
    };

    let Some(Value::Object(mut envelope)) = envelope else {
        return Err(FeedError::Format("envelope element is not an object".into()));
    };
    let Some(Value::Array(rows)) = envelope.remove("data") else {
        return Err(FeedError::Format("envelope has no `data` array".into()));
    };

    rows.iter()
        .enumerate()
        .map(|(i, row)| parse_order(row).map_err(|e| FeedError::Format(format!("row {i}: {e}"))))
        .collect()
}

fn parse_order(row: &Value) -> Result<Order, String> {
    let Value::Object(fields) = row else {
        return Err("not an object".into());
    };

    let order_id = match fields.get("id_marketer_order") {
        Some(Value::Number(n)) => n.as_u64(),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    }
    .ok_or("missing or invalid `id_marketer_order`")?;

    let standard_id = match fields.get("codigo_producto") {
        Some(Value::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
        Some(Value::Number(n)) => n.to_string(),
        _ => return Err("missing or invalid `codigo_producto`".into()),
    };

    let state = fields
        .get("estado_marketer_order")
        .and_then(Value::as_str)
        .map_or(OrderState::Open, OrderState::from_feed);

    let order_number = match fields.get("order_number") {
        Some(Value::String(s)) => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    };

    Ok(Order {
        order_id,
        standard_id,
        requested: quantity(fields.get("cantidad_solicitada")),
        assigned: quantity(fields.get("cantidad_asignada")),
        shipped: quantity(fields.get("cantidad_despachada")),
        boxes_per_pallet: quantity(fields.get("cajas_por_pallet")),
        state,
        order_number,
    })
}

/// Coerces a quantity field to a number; absent or non-numeric values are 0.
fn quantity(value: Option<&Value>) -> f64 {
    let parsed = match value {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.filter(|v| v.is_finite()).unwrap_or(0.0)
}
