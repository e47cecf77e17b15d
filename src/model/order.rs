//! Orders as seen in the external active-orders feed.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Composite key of one product line within an order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineKey {
    pub order_id: u64,
    pub standard_id: String,
}

impl LineKey {
    pub fn new(order_id: u64, standard_id: impl Into<String>) -> Self {
        Self {
            order_id,
            standard_id: standard_id.into(),
        }
    }
}

impl fmt::Display for LineKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.order_id, self.standard_id)
    }
}

/// One line of the active-orders snapshot.
///
/// Read-only: this system never writes orders back. Quantities are already
/// coerced to numbers by the feed parser.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub order_id: u64,
    pub standard_id: String,
    pub requested: f64,
    pub assigned: f64,
    pub shipped: f64,
    pub boxes_per_pallet: f64,
    pub state: OrderState,
    /// Parent order group, when the feed provides one.
    pub order_number: Option<String>,
}

impl Order {
    pub fn line(&self) -> LineKey {
        LineKey::new(self.order_id, self.standard_id.clone())
    }

    pub fn is_closed(&self) -> bool {
        matches!(self.state, OrderState::Closed)
    }
}

/// Lifecycle state reported by the feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OrderState {
    Open,
    Closed,
    /// Anything else the feed reports, kept verbatim.
    Other(String),
}

impl OrderState {
    /// Parses the feed's raw state string. Matching is case-insensitive.
    pub fn from_feed(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "open" => Self::Open,
            "closed" => Self::Closed,
            _ => Self::Other(raw.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_state_is_case_insensitive() {
        assert_eq!(OrderState::from_feed("CLOSED"), OrderState::Closed);
        assert_eq!(OrderState::from_feed(" open "), OrderState::Open);
        assert_eq!(
            OrderState::from_feed("cancelled"),
            OrderState::Other("cancelled".into())
        );
    }

    #[test]
    fn line_key_display() {
        assert_eq!(LineKey::new(42, "STD-1").to_string(), "42/STD-1");
    }
}
