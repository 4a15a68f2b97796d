//! HTTP handlers, grouped by resource.

pub mod auth;
pub mod categories;
pub mod health;
pub mod metrics;
pub mod orders;
pub mod products;

use std::str::FromStr;

use common::IdParseError;
use domain::{CatalogService, OrderService, Store};
use serde::{Deserialize, Deserializer};

use crate::auth::TokenService;
use crate::error::ApiError;

/// Shared application state accessible from all handlers.
pub struct AppState<S: Store> {
    pub catalog: CatalogService<S>,
    pub orders: OrderService<S>,
    pub tokens: TokenService,
}

fn parse_id<T>(raw: &str) -> Result<T, ApiError>
where
    T: FromStr<Err = IdParseError>,
{
    Ok(raw.parse()?)
}

/// Distinguishes an absent field (`None`) from an explicit `null`
/// (`Some(None)`) in PATCH bodies.
fn nullable<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}
