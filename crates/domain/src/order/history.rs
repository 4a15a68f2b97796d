//! Append-only order status history.

use chrono::{DateTime, Utc};
use common::{HistoryId, OrderId};
use serde::{Deserialize, Serialize};

use super::OrderStatus;

/// Where a status change came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ChangeSource {
    /// An HTTP API request.
    Api,
    /// An operator acting through an administrative tool.
    Admin,
    /// Internal callers such as data seeding.
    #[default]
    System,
}

impl ChangeSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeSource::Api => "api",
            ChangeSource::Admin => "admin",
            ChangeSource::System => "system",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "api" => Some(ChangeSource::Api),
            "admin" => Some(ChangeSource::Admin),
            "system" => Some(ChangeSource::System),
            _ => None,
        }
    }
}

impl std::fmt::Display for ChangeSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Who made a change and from where.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeContext {
    pub changed_by: Option<String>,
    pub change_source: ChangeSource,
    pub ip_address: Option<String>,
}

impl ChangeContext {
    /// Context for changes made by the system itself.
    pub fn system() -> Self {
        Self::default()
    }

    /// Context for an API request.
    pub fn api(changed_by: Option<String>, ip_address: Option<String>) -> Self {
        Self {
            changed_by,
            change_source: ChangeSource::Api,
            ip_address,
        }
    }
}

/// One recorded status transition. Rows are never updated or deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusHistoryEntry {
    pub id: HistoryId,
    pub order_id: OrderId,
    /// `None` for the row written when the order was created.
    pub old_status: Option<OrderStatus>,
    pub new_status: OrderStatus,
    pub changed_by: Option<String>,
    pub change_source: ChangeSource,
    pub ip_address: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl StatusHistoryEntry {
    pub fn record(
        order_id: OrderId,
        old_status: Option<OrderStatus>,
        new_status: OrderStatus,
        context: &ChangeContext,
        notes: Option<String>,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: HistoryId::new(),
            order_id,
            old_status,
            new_status,
            changed_by: context.changed_by.clone(),
            change_source: context.change_source,
            ip_address: context.ip_address.clone(),
            notes,
            created_at: at,
        }
    }
}
