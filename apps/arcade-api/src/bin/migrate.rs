//! Migration runner for arcade-api.
//!
//! Usage:
//!   cargo run -p arcade-api --bin arcade-migrate
//!   cargo run -p arcade-api --bin arcade-migrate -- --test
//!   cargo run -p arcade-api --bin arcade-migrate -- --seed
//!
//! `--test` targets `<db>_test`; `--seed` inserts the starter item catalogue
//! (existing ids are left alone).

use std::error::Error;
use std::path::Path;

use chrono::Utc;
use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};

use arcade_api::db::schema::items;
use arcade_api::models::item::NewItem;

const MIGRATIONS: EmbeddedMigrations = embed_migrations!("./migrations");

/// (id, name, unit price in KRW, points per unit)
const STARTER_ITEMS: &[(&str, &str, i64, i64)] = &[
    ("item_points_small", "Points Pack S", 1000, 100),
    ("item_points_medium", "Points Pack M", 5000, 550),
    ("item_points_large", "Points Pack L", 10000, 1200),
];

fn main() -> Result<(), Box<dyn Error + Send + Sync>> {
    if dotenvy::dotenv().is_err() {
        let env_path = Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
        let _ = dotenvy::from_path(env_path);
    }

    let mut database_url =
        std::env::var("DATABASE_URL").map_err(|_| "DATABASE_URL env var is required")?;

    let args: Vec<String> = std::env::args().collect();
    if args.iter().any(|arg| arg == "--test") {
        database_url = with_test_db_suffix(&database_url);
    }

    println!("Connecting to database...");
    let mut conn = PgConnection::establish(&database_url)?;

    println!("Running pending migrations...");
    let applied = conn.run_pending_migrations(MIGRATIONS)?;
    if applied.is_empty() {
        println!("No pending migrations.");
    } else {
        for migration in &applied {
            println!("  Applied: {migration}");
        }
        println!("{} migration(s) applied.", applied.len());
    }

    if args.iter().any(|arg| arg == "--seed") {
        let inserted = seed_items(&mut conn)?;
        println!("{inserted} item(s) seeded.");
    }

    Ok(())
}

fn seed_items(conn: &mut PgConnection) -> QueryResult<usize> {
    let now = Utc::now();
    let rows: Vec<NewItem<'_>> = STARTER_ITEMS
        .iter()
        .map(|&(id, name, unit_price, points_per_unit)| NewItem {
            id,
            name,
            description: None,
            unit_price,
            currency: "KRW",
            points_per_unit,
            purchasable: true,
            created_at: now,
            updated_at: now,
        })
        .collect();

    diesel::insert_into(items::table)
        .values(&rows)
        .on_conflict(items::id)
        .do_nothing()
        .execute(conn)
}

fn with_test_db_suffix(database_url: &str) -> String {
    let (base, query) = match database_url.split_once('?') {
        Some((base, query)) => (base, Some(query)),
        None => (database_url, None),
    };
    let Some((prefix, db_name)) = base.rsplit_once('/') else {
        return database_url.to_string();
    };
    if db_name.is_empty() || db_name.ends_with("_test") {
        return database_url.to_string();
    }

    let mut updated = format!("{prefix}/{db_name}_test");
    if let Some(query) = query {
        updated.push('?');
        updated.push_str(query);
    }
    updated
}
