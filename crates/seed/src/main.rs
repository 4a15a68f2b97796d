//! `seed` command line entry point.

use std::sync::Arc;

use anyhow::{Context, Result};
use api::auth::TokenService;
use api::config::Config;
use clap::{Parser, Subcommand};
use domain::{CatalogService, OrderService, OrderStatus};
use rand::SeedableRng;
use rand::rngs::StdRng;
use seed::catalog;
use seed::orders::{self, OrderSeedOptions};
use sqlx::postgres::PgPoolOptions;
use store::PostgresStore;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Parser)]
#[command(name = "seed", about = "Seed the storefront database with test data")]
struct Cli {
    /// Seed for the random generator, for reproducible data.
    #[arg(long, global = true)]
    rng_seed: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create categories.
    Categories {
        /// Number of root categories to create.
        #[arg(long, default_value_t = 5)]
        count: usize,
        /// Soft-delete existing categories and products first.
        #[arg(long)]
        clear: bool,
        /// Create a realistic e-commerce category tree instead.
        #[arg(long)]
        realistic: bool,
    },
    /// Create products.
    Products {
        /// Number of products to create.
        #[arg(long, default_value_t = 50)]
        count: usize,
        /// Soft-delete existing products first.
        #[arg(long)]
        clear: bool,
        /// Create realistic e-commerce products instead.
        #[arg(long)]
        realistic: bool,
    },
    /// Place orders and move them through status changes.
    Orders {
        /// Number of orders to create.
        #[arg(long, default_value_t = 100)]
        count: usize,
        /// Use a realistic status mix and quantities.
        #[arg(long)]
        realistic: bool,
        /// Create orders with this status only.
        #[arg(long, value_parser = parse_status)]
        status: Option<OrderStatus>,
    },
    /// Print a bearer token signed with the configured key.
    Token {
        #[arg(long, default_value = "admin")]
        username: String,
        /// Also print a refresh token on a second line.
        #[arg(long)]
        refresh: bool,
    },
}

fn parse_status(raw: &str) -> Result<OrderStatus, String> {
    OrderStatus::parse(raw).ok_or_else(|| {
        let choices: Vec<&str> = OrderStatus::ALL.iter().map(OrderStatus::as_str).collect();
        format!("expected one of {}", choices.join(", "))
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    dotenvy::dotenv().ok();
    let config = Config::from_env().context("loading configuration")?;

    tracing_subscriber::registry()
        .with(EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Command::Token { username, refresh } = &cli.command {
        let tokens = TokenService::from_config(&config);
        if *refresh {
            let pair = tokens.issue_pair(username)?;
            println!("{}\n{}", pair.access, pair.refresh);
        } else {
            println!("{}", tokens.issue(username)?);
        }
        return Ok(());
    }

    let url = config
        .database_url
        .as_deref()
        .context("DATABASE_URL must be set to seed data")?;
    let pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .connect(url)
        .await
        .context("connecting to database")?;
    let store = PostgresStore::new(pool);
    store.run_migrations().await.context("running migrations")?;

    let store = Arc::new(store);
    let catalog_service = CatalogService::new(store.clone());
    let order_service = OrderService::new(store);
    let mut rng = match cli.rng_seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    match cli.command {
        Command::Categories {
            count,
            clear,
            realistic,
        } => {
            if clear {
                let products = catalog::clear_products(&catalog_service).await?;
                let roots = catalog::clear_categories(&catalog_service).await?;
                tracing::info!(products, roots, "Cleared catalog");
            }
            let created =
                catalog::seed_categories(&catalog_service, &mut rng, count, realistic).await?;
            tracing::info!(created, "Seeded categories");
        }
        Command::Products {
            count,
            clear,
            realistic,
        } => {
            if clear {
                let cleared = catalog::clear_products(&catalog_service).await?;
                tracing::info!(cleared, "Cleared products");
            }
            let created =
                catalog::seed_products(&catalog_service, &mut rng, count, realistic).await?;
            tracing::info!(created, "Seeded products");
        }
        Command::Orders {
            count,
            realistic,
            status,
        } => {
            let report = orders::seed_orders(
                &order_service,
                &mut rng,
                OrderSeedOptions {
                    count,
                    realistic,
                    status,
                },
            )
            .await?;
            tracing::info!(
                placed = report.placed,
                skipped = report.skipped,
                revenue_cents = report.revenue_cents,
                "Seeded orders"
            );
        }
        Command::Token { .. } => {}
    }

    Ok(())
}
