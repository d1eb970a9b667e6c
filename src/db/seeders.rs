//! Database seeders for built-in data
//!
//! Fresh installs get one barber with the default schedule and a small
//! product catalogue so the booking page and storefront are usable at once.
//! Nothing is touched when the tables already hold rows.

use anyhow::Result;
use sqlx::SqlitePool;
use tracing::info;

use crate::scheduling::clock::format_timestamp;

pub async fn seed_defaults(pool: &SqlitePool) -> Result<()> {
    let now = format_timestamp(chrono::Utc::now());

    let (barbers,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM barbers")
        .fetch_one(pool)
        .await?;
    if barbers == 0 {
        info!("Seeding default barber...");
        sqlx::query(
            "INSERT INTO barbers (id, name, bio, created_at, updated_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(uuid::Uuid::new_v4().to_string())
        .bind("House Barber")
        .bind("Walk-ins and classic cuts")
        .bind(&now)
        .bind(&now)
        .execute(pool)
        .await?;
    }

    let (products,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM products")
        .fetch_one(pool)
        .await?;
    if products == 0 {
        info!("Seeding starter product catalogue...");
        // (name, description, price in cents, stock)
        let catalogue: [(&str, &str, i64, i64); 3] = [
            ("Matte Clay", "Strong hold, low shine styling clay", 18_000, 40),
            ("Beard Oil", "Cedarwood beard conditioning oil", 15_000, 25),
            ("Sea Salt Spray", "Texturising pre-styler", 12_000, 30),
        ];
        for (name, description, price_cents, stock) in catalogue {
            sqlx::query(
                "INSERT INTO products (id, name, description, price_cents, stock, created_at) VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(uuid::Uuid::new_v4().to_string())
            .bind(name)
            .bind(description)
            .bind(price_cents)
            .bind(stock)
            .bind(&now)
            .execute(pool)
            .await?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::connect_in_memory;

    #[tokio::test]
    async fn test_seeding_runs_once() {
        let pool = connect_in_memory().await.unwrap();
        seed_defaults(&pool).await.unwrap();
        seed_defaults(&pool).await.unwrap();

        let (barbers,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM barbers")
            .fetch_one(&pool)
            .await
            .unwrap();
        let (products,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM products")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(barbers, 1);
        assert_eq!(products, 3);
    }
}
