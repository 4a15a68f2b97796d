//! Data seeding for local development and demos.
//!
//! Everything goes through the catalog and order services, so seeded data
//! obeys the same validation, stock and history rules as API traffic.

pub mod catalog;
pub mod orders;
