//! Storefront order placement.
//!
//! An order, its lines and the stock decrements commit together or not at
//! all. Stock is re-checked by the decrement itself (`WHERE stock >= ?`), so a
//! concurrent order that drained the shelf makes this one fail cleanly.

use chrono::Utc;
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::info;

use super::models::{CreateOrderRequest, Order, OrderItem, OrderWithItems};
use super::DbPool;
use crate::scheduling::clock::format_timestamp;

#[derive(Debug, Error)]
pub enum OrderError {
    #[error("{message}")]
    Invalid { field: &'static str, message: String },

    #[error("Product not found: {0}")]
    ProductNotFound(String),

    #[error("Insufficient stock for {product_name}: requested {requested}, available {available}")]
    InsufficientStock {
        product_id: String,
        product_name: String,
        requested: i64,
        available: i64,
    },

    #[error("Store error: {0}")]
    Store(String),
}

impl From<sqlx::Error> for OrderError {
    fn from(err: sqlx::Error) -> Self {
        OrderError::Store(err.to_string())
    }
}

fn invalid(field: &'static str, message: impl Into<String>) -> OrderError {
    OrderError::Invalid {
        field,
        message: message.into(),
    }
}

pub async fn place_order(pool: &DbPool, req: &CreateOrderRequest) -> Result<OrderWithItems, OrderError> {
    if req.customer_name.trim().is_empty() {
        return Err(invalid("customer_name", "customer_name is required"));
    }
    if req.email.trim().is_empty() {
        return Err(invalid("email", "email is required"));
    }
    if req.items.is_empty() {
        return Err(invalid("items", "An order needs at least one item"));
    }

    // Repeated lines for one product are merged before touching stock
    let mut quantities: BTreeMap<&str, i64> = BTreeMap::new();
    for line in &req.items {
        if line.quantity <= 0 {
            return Err(invalid("items", format!("Quantity for {} must be positive", line.product_id)));
        }
        let entry = quantities.entry(line.product_id.as_str()).or_default();
        *entry = entry
            .checked_add(line.quantity)
            .ok_or_else(|| invalid("items", "Quantity is too large"))?;
    }

    let order_id = uuid::Uuid::new_v4().to_string();
    let now = format_timestamp(Utc::now());
    let mut tx = pool.begin().await?;

    let mut lines: Vec<(String, String, i64, i64)> = Vec::with_capacity(quantities.len());
    let mut total_cents: i64 = 0;

    for (product_id, quantity) in quantities {
        let product: Option<(String, i64, i64)> = sqlx::query_as(
            "SELECT name, price_cents, stock FROM products WHERE id = ? AND is_active = 1",
        )
        .bind(product_id)
        .fetch_optional(&mut *tx)
        .await?;
        let Some((name, price_cents, stock)) = product else {
            return Err(OrderError::ProductNotFound(product_id.to_string()));
        };

        let decremented = sqlx::query("UPDATE products SET stock = stock - ? WHERE id = ? AND stock >= ?")
            .bind(quantity)
            .bind(product_id)
            .bind(quantity)
            .execute(&mut *tx)
            .await?;
        if decremented.rows_affected() == 0 {
            // Dropping the transaction rolls back earlier decrements
            return Err(OrderError::InsufficientStock {
                product_id: product_id.to_string(),
                product_name: name,
                requested: quantity,
                available: stock,
            });
        }

        total_cents = price_cents
            .checked_mul(quantity)
            .and_then(|line_total| total_cents.checked_add(line_total))
            .ok_or_else(|| invalid("items", "Order total is too large"))?;
        lines.push((product_id.to_string(), name, quantity, price_cents));
    }

    sqlx::query(
        r#"
        INSERT INTO orders (id, user_id, customer_name, email, phone, address, total_cents, status, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, 'pending', ?, ?)
        "#,
    )
    .bind(&order_id)
    .bind(&req.user_id)
    .bind(req.customer_name.trim())
    .bind(req.email.trim())
    .bind(&req.phone)
    .bind(&req.address)
    .bind(total_cents)
    .bind(&now)
    .bind(&now)
    .execute(&mut *tx)
    .await?;

    for (product_id, product_name, quantity, unit_price_cents) in &lines {
        sqlx::query(
            r#"
            INSERT INTO order_items (order_id, product_id, product_name, quantity, unit_price_cents)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&order_id)
        .bind(product_id)
        .bind(product_name)
        .bind(quantity)
        .bind(unit_price_cents)
        .execute(&mut *tx)
        .await?;
    }

    let order = sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE id = ?")
        .bind(&order_id)
        .fetch_one(&mut *tx)
        .await?;
    let items = sqlx::query_as::<_, OrderItem>("SELECT * FROM order_items WHERE order_id = ? ORDER BY id")
        .bind(&order_id)
        .fetch_all(&mut *tx)
        .await?;

    tx.commit().await?;

    info!(
        order_id = %order.id,
        items = items.len(),
        total_cents = order.total_cents,
        "Order placed"
    );

    Ok(OrderWithItems { order, items })
}
