//! Order status machine.

use serde::{Deserialize, Serialize};

/// The status of an order in its lifecycle.
///
/// Status transitions:
/// ```text
/// Pending ◄─► Confirmed ◄─► Processing ◄─► Shipped ──► Delivered
///    ▲            │              │             │
///    │            ▼              ▼             ▼
///    └─────────────────── Cancelled ◄──────────┘
/// ```
///
/// Each status has a stable numeric code used for storage.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    /// Order was placed and holds stock.
    #[default]
    Pending,

    /// Order was accepted.
    Confirmed,

    /// Order is being prepared.
    Processing,

    /// Order left the warehouse.
    Shipped,

    /// Order reached the customer (terminal state).
    Delivered,

    /// Order was cancelled and released its stock.
    Cancelled,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 6] = [
        OrderStatus::Pending,
        OrderStatus::Confirmed,
        OrderStatus::Processing,
        OrderStatus::Shipped,
        OrderStatus::Delivered,
        OrderStatus::Cancelled,
    ];

    /// Storage code.
    pub fn code(&self) -> i16 {
        match self {
            OrderStatus::Pending => 0,
            OrderStatus::Confirmed => 10,
            OrderStatus::Processing => 20,
            OrderStatus::Shipped => 30,
            OrderStatus::Delivered => 40,
            OrderStatus::Cancelled => 50,
        }
    }

    pub fn from_code(code: i16) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.code() == code)
    }

    /// Lower-case name used on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Confirmed => "confirmed",
            OrderStatus::Processing => "processing",
            OrderStatus::Shipped => "shipped",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    /// Human-readable label.
    pub fn display_name(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "Pending",
            OrderStatus::Confirmed => "Confirmed",
            OrderStatus::Processing => "Processing",
            OrderStatus::Shipped => "Shipped",
            OrderStatus::Delivered => "Delivered",
            OrderStatus::Cancelled => "Cancelled",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|s| s.as_str().eq_ignore_ascii_case(value.trim()))
    }

    /// Returns true while the order keeps its items' stock decremented.
    pub fn holds_stock(&self) -> bool {
        !matches!(self, OrderStatus::Cancelled)
    }

    /// Returns true if this is a terminal state (no further transitions possible).
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Delivered)
    }

    /// Returns true if the order may move from `self` to `next`.
    ///
    /// Setting the current status again is not a transition and returns false.
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        match (*self, next) {
            (a, b) if a == b => false,
            (Delivered, _) => false,
            (Cancelled, Pending) => true,
            (Cancelled, _) => false,
            (_, Cancelled) => true,
            (Shipped, Delivered) => true,
            (_, Delivered) => false,
            (a, b) => (i32::from(a.code()) - i32::from(b.code())).abs() == 10,
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
