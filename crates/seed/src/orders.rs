//! Order generator.
//!
//! Orders are placed through [`OrderService`] and walked through real status
//! transitions, so stock levels and history rows stay consistent with what
//! the API would have produced.

use anyhow::{Result, bail};
use domain::{ChangeContext, DomainError, OrderLine, OrderService, OrderStatus, Product, Store};
use rand::Rng;
use rand::distributions::{Distribution, WeightedIndex};
use rand::seq::SliceRandom;

use crate::catalog::all_products;

/// Status mix for realistic data, in percent.
const REALISTIC_MIX: &[(OrderStatus, u32)] = &[
    (OrderStatus::Delivered, 60),
    (OrderStatus::Shipped, 15),
    (OrderStatus::Processing, 10),
    (OrderStatus::Confirmed, 5),
    (OrderStatus::Pending, 5),
    (OrderStatus::Cancelled, 5),
];

/// Status mix for random data, in percent.
const RANDOM_MIX: &[(OrderStatus, u32)] = &[
    (OrderStatus::Delivered, 30),
    (OrderStatus::Shipped, 20),
    (OrderStatus::Processing, 15),
    (OrderStatus::Confirmed, 15),
    (OrderStatus::Pending, 10),
    (OrderStatus::Cancelled, 10),
];

const FORWARD: [OrderStatus; 4] = [
    OrderStatus::Confirmed,
    OrderStatus::Processing,
    OrderStatus::Shipped,
    OrderStatus::Delivered,
];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OrderSeedReport {
    pub placed: usize,
    /// Orders skipped because their products ran out of stock.
    pub skipped: usize,
    pub revenue_cents: i64,
}

/// Options for [`seed_orders`].
#[derive(Debug, Clone, Copy)]
pub struct OrderSeedOptions {
    pub count: usize,
    pub realistic: bool,
    /// Every order ends in this status when set.
    pub status: Option<OrderStatus>,
}

/// Places orders against the current catalog and moves each to its target
/// status. Delivered orders count towards revenue.
pub async fn seed_orders<S: Store, R: Rng>(
    orders: &OrderService<S>,
    rng: &mut R,
    options: OrderSeedOptions,
) -> Result<OrderSeedReport> {
    let mut products: Vec<Product> = all_products(orders.store())
        .await?
        .into_iter()
        .filter(|p| p.active && p.in_stock())
        .collect();
    if products.is_empty() {
        bail!("no active products with stock found; run `seed products` first");
    }

    let mix = if options.realistic { REALISTIC_MIX } else { RANDOM_MIX };
    let weights = WeightedIndex::new(mix.iter().map(|(_, w)| *w))?;

    let mut report = OrderSeedReport::default();
    for n in 0..options.count {
        let target = options.status.unwrap_or_else(|| mix[weights.sample(rng)].0);
        let lines = pick_lines(rng, &products, options.realistic);
        if lines.is_empty() {
            report.skipped += 1;
            continue;
        }

        let order = match orders
            .place_order(lines.clone(), ChangeContext::system(), None)
            .await
        {
            Ok(order) => order,
            Err(DomainError::InsufficientStock { product_id, .. }) => {
                tracing::debug!(%product_id, "Out of stock, skipping order");
                report.skipped += 1;
                continue;
            }
            Err(e) => return Err(e.into()),
        };

        for status in status_path(rng, target) {
            orders
                .change_status(order.id, status, ChangeContext::system(), None)
                .await?;
        }
        // Cancelled orders put their stock back on the shelves.
        if target != OrderStatus::Cancelled {
            for line in &lines {
                if let Some(p) = products.iter_mut().find(|p| p.id == line.product_id) {
                    p.stock_quantity -= store_units(line.quantity);
                }
            }
            products.retain(Product::in_stock);
        }
        if target == OrderStatus::Delivered {
            report.revenue_cents += order.total_price.cents();
        }
        report.placed += 1;

        if (n + 1) % 25 == 0 {
            tracing::info!(orders = n + 1, "Seeding orders");
        }
        if products.is_empty() {
            tracing::warn!("Catalog out of stock, stopping early");
            break;
        }
    }
    Ok(report)
}

fn store_units(quantity: u32) -> i32 {
    i32::try_from(quantity).unwrap_or(i32::MAX)
}

/// Realistic orders buy one product, fewer units the pricier it is. Random
/// orders mix up to three products.
fn pick_lines<R: Rng>(rng: &mut R, products: &[Product], realistic: bool) -> Vec<OrderLine> {
    let lines = if realistic { 1 } else { rng.gen_range(1..=3) };
    products
        .choose_multiple(rng, lines)
        .map(|product| {
            let most = if !realistic {
                10
            } else if product.final_price().cents() > 50_000 {
                2
            } else if product.final_price().cents() > 10_000 {
                3
            } else {
                5
            };
            let available = u32::try_from(product.stock_quantity).unwrap_or(0);
            let quantity = rng.gen_range(1..=most).min(available);
            OrderLine::new(product.id, quantity)
        })
        .filter(|line| line.quantity > 0)
        .collect()
}

/// The statuses a fresh pending order passes through to reach `target`.
pub fn status_path<R: Rng>(rng: &mut R, target: OrderStatus) -> Vec<OrderStatus> {
    match target {
        OrderStatus::Pending => Vec::new(),
        OrderStatus::Cancelled => {
            let progressed = rng.gen_range(0..=2);
            let mut path = FORWARD[..progressed].to_vec();
            path.push(OrderStatus::Cancelled);
            path
        }
        forward => FORWARD
            .iter()
            .copied()
            .take_while(|s| *s <= forward)
            .collect(),
    }
}
