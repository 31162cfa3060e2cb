//! # Seed Data Generator
//!
//! Populates a depot database with development data through the write
//! services, so every record passes the same field rules and lifecycle gate
//! as real input.
//!
//! ## Usage
//! ```bash
//! # Seed ./depot_dev.db with the default amount of products per category
//! cargo run -p depot-db --bin seed
//!
//! # Custom database and product count
//! cargo run -p depot-db --bin seed -- --db ./data/depot.db --count 40
//!
//! # More log output
//! RUST_LOG=depot_db=debug cargo run -p depot-db --bin seed
//! ```
//!
//! ## Generated Data
//! - Locations: a warehouse, two stores, a transit dock
//! - Suppliers: one per country
//! - Categories: Fasteners, Tools, Electrical, Plumbing
//! - Products: `{CATEGORY}-{INDEX}` SKUs spread over suppliers and locations
//! - Orders: a few per supplier in every status
//!
//! A JSON envelope summarizing what was created is printed to stdout.

use std::collections::BTreeMap;
use std::env;
use std::path::PathBuf;

use chrono::{Duration, Utc};
use depot_core::{
    CategoryDraft, DatabaseResult, Envelope, LocationDraft, LocationKind, OrderDraft, OrderStatus,
    ProductDraft, SupplierDraft,
};
use depot_db::{Catalog, DepotConfig};
use serde::Serialize;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const LOCATIONS: &[(&str, LocationKind, &str)] = &[
    ("Main Warehouse", LocationKind::Warehouse, "Industrial Park 4"),
    ("Harbour Store", LocationKind::Store, "Quay 12"),
    ("City Store", LocationKind::Store, "Market Street 1"),
    ("Dock", LocationKind::Transit, "Pier 9"),
];

const SUPPLIERS: &[(&str, &str, &str)] = &[
    ("Acme Fasteners", "NL", "sales@acme.test"),
    ("Globex Tools", "DE", "orders@globex.test"),
    ("Initech Electric", "US", "supply@initech.test"),
];

const CATEGORIES: &[(&str, &str, &[&str])] = &[
    ("FST", "Fasteners", &["Hex bolt", "Wood screw", "Wall plug", "Washer", "Nut"]),
    ("TLS", "Tools", &["Hammer", "Screwdriver", "Spirit level", "Tape measure"]),
    ("ELC", "Electrical", &["Cable reel", "Wall socket", "Switch", "Fuse"]),
    ("PLB", "Plumbing", &["Pipe elbow", "Ball valve", "Tap washer"]),
];

const ORDER_STATUSES: &[OrderStatus] = &[
    OrderStatus::Draft,
    OrderStatus::Placed,
    OrderStatus::Received,
    OrderStatus::Cancelled,
];

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
struct SeedSummary {
    database: String,
    locations: usize,
    suppliers: usize,
    categories: usize,
    products: usize,
    orders: usize,
    products_by_category: BTreeMap<String, usize>,
    skipped: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = env::args().collect();

    let mut count: usize = 3;
    let mut db_path = PathBuf::from("./depot_dev.db");
    let mut config_path: Option<PathBuf> = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--count" | "-c" => {
                if i + 1 < args.len() {
                    count = args[i + 1].parse().unwrap_or(3);
                    i += 1;
                }
            }
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = PathBuf::from(&args[i + 1]);
                    i += 1;
                }
            }
            "--config" => {
                if i + 1 < args.len() {
                    config_path = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Depot Seed Data Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -c, --count <N>      Products per name and category (default: 3)");
                println!("  -d, --db <PATH>      Database file path (default: ./depot_dev.db)");
                println!("      --config <PATH>  depot.toml to load retry/lifecycle settings from");
                println!("  -h, --help           Show this help message");
                return Ok(());
            }
            other => warn!(argument = other, "Ignoring unknown argument"),
        }
        i += 1;
    }

    let mut config = DepotConfig::load_or_default(config_path);
    config.database.path = db_path;

    let catalog = Catalog::open(&config).await?;
    info!(path = %config.database.path.display(), "Connected, migrations applied");

    let existing = catalog.products().read.count(true).await?;
    if existing > 0 {
        warn!(existing, "Database already has products, skipping seed");
        let envelope: Envelope<SeedSummary> = Envelope::failure(
            format!("Database already holds {} products; delete it to regenerate", existing),
            depot_core::ErrorCode::Duplicate,
        );
        println!("{}", serde_json::to_string_pretty(&envelope)?);
        catalog.shutdown().await;
        return Ok(());
    }

    let result = seed(&catalog, count).await.map(|mut summary| {
        summary.database = config.database.path.display().to_string();
        summary
    });
    let envelope = Envelope::from(result);
    println!("{}", serde_json::to_string_pretty(&envelope)?);

    catalog.shutdown().await;
    Ok(())
}

async fn seed(catalog: &Catalog, count: usize) -> DatabaseResult<SeedSummary> {
    let mut summary = SeedSummary::default();

    let locations = catalog.locations();
    let mut location_ids = Vec::new();
    for (name, kind, address) in LOCATIONS {
        let mut draft = LocationDraft::new(*name, *kind);
        draft.address = Some(address.to_string());
        location_ids.push(locations.write.create(draft).await?.id);
    }
    summary.locations = location_ids.len();

    let suppliers = catalog.suppliers();
    let mut supplier_ids = Vec::new();
    for (name, country, email) in SUPPLIERS {
        let draft = SupplierDraft {
            name: name.to_string(),
            country: Some(country.to_string()),
            contact_email: Some(email.to_string()),
            ..Default::default()
        };
        supplier_ids.push(suppliers.write.create(draft).await?.id);
    }
    summary.suppliers = supplier_ids.len();

    let categories = catalog.categories();
    let products = catalog.products();
    let mut seq = 0usize;
    for (code, category_name, names) in CATEGORIES {
        let category = categories
            .write
            .create(CategoryDraft {
                name: category_name.to_string(),
                ..Default::default()
            })
            .await?;
        summary.categories += 1;

        for name in names.iter() {
            for variant in 0..count {
                seq += 1;
                let draft = ProductDraft {
                    sku: format!("{}-{:04}", code, seq),
                    name: format!("{} #{}", name, variant + 1),
                    category_id: Some(category.id),
                    supplier_id: Some(supplier_ids[seq % supplier_ids.len()]),
                    location_id: Some(location_ids[seq % location_ids.len()]),
                    unit_price_cents: 49 + ((seq * 37) % 2500) as i64,
                    quantity: (seq % 120) as i64,
                    ..Default::default()
                };
                match products.write.create(draft).await {
                    Ok(_) => summary.products += 1,
                    Err(failure) => summary.skipped.push(failure.message().to_string()),
                }
            }
        }
    }

    let orders = catalog.orders();
    let now = Utc::now();
    let mut number = 1000;
    for (s, supplier_id) in supplier_ids.iter().enumerate() {
        for (k, status) in ORDER_STATUSES.iter().enumerate() {
            number += 1;
            let draft = OrderDraft {
                order_number: format!("PO-{}", number),
                supplier_id: Some(*supplier_id),
                location_id: Some(location_ids[(s + k) % location_ids.len()]),
                status: *status,
                ordered_at: Some(now - Duration::days((s * 7 + k) as i64)),
                ..Default::default()
            };
            orders.write.create(draft).await?;
            summary.orders += 1;
        }
    }

    // Keys are category ids; show names instead
    let names: BTreeMap<String, String> = categories
        .read
        .list_active()
        .await?
        .into_iter()
        .map(|c| (c.id.to_string(), c.name))
        .collect();
    summary.products_by_category = products
        .read
        .count_by_category()
        .await?
        .into_iter()
        .map(|(key, n)| (names.get(&key).cloned().unwrap_or(key), n))
        .collect();

    info!(
        products = summary.products,
        orders = summary.orders,
        "Seed complete"
    );
    Ok(summary)
}
