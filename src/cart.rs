use serde::Serialize;
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    cart_key::CartKey,
    db::DbPool,
    error::AppResult,
    middleware::auth::CartPrincipal,
    models::Product,
    session::{SessionCarts, SessionLine},
    state::AppState,
};

/// One hydrated cart line, shaped the same way for both backends. The
/// `key` is the stable encoded identity the client passes back for
/// remove/update.
#[derive(Debug, Serialize, ToSchema)]
pub struct CartLine {
    pub key: String,
    pub product: Product,
    pub size: String,
    pub color: Option<String>,
    pub quantity: i32,
    /// Unit price in minor units. Live product price for database lines,
    /// the add-time snapshot for session lines.
    pub price: i64,
    pub total_price: i64,
}

enum CartBackend<'a> {
    /// Authenticated: rows in `cart_items` keyed by user id.
    User(Uuid),
    /// Anonymous: the in-process session map.
    Session {
        store: &'a SessionCarts,
        session_id: &'a str,
    },
}

/// Uniform cart over the two storage backends, selected by the caller's
/// authentication state. Services never branch on "is logged in" again.
pub struct Cart<'a> {
    pool: &'a DbPool,
    backend: CartBackend<'a>,
}

#[derive(FromRow)]
struct DbCartRow {
    size: String,
    color: Option<String>,
    quantity: i32,
    product_id: Uuid,
    category_id: Option<Uuid>,
    name: String,
    description: Option<String>,
    price: i64,
    stock: i32,
    product_color: Option<String>,
    is_active: bool,
    created_at: chrono::DateTime<chrono::Utc>,
}

impl<'a> Cart<'a> {
    pub fn new(state: &'a AppState, principal: &'a CartPrincipal) -> Self {
        let backend = match principal {
            CartPrincipal::User(user) => CartBackend::User(user.user_id),
            CartPrincipal::Session(session_id) => CartBackend::Session {
                store: &state.sessions,
                session_id,
            },
        };
        Self {
            pool: &state.pool,
            backend,
        }
    }

    /// Add one unit of a variant. Returns `false` without mutating
    /// anything when the variant does not exist for (size, color) or its
    /// stock is exhausted; otherwise increments the matching line or
    /// creates it at quantity 1.
    pub async fn add(&self, key: &CartKey) -> AppResult<bool> {
        let product: Option<Product> =
            sqlx::query_as("SELECT * FROM products WHERE id = $1 AND is_active = TRUE")
                .bind(key.product_id)
                .fetch_optional(self.pool)
                .await?;
        let Some(product) = product else {
            return Ok(false);
        };

        let variant_stock: Option<(i32,)> = sqlx::query_as(
            r#"
            SELECT stock FROM product_variants
            WHERE product_id = $1 AND size = $2 AND color IS NOT DISTINCT FROM $3
            "#,
        )
        .bind(key.product_id)
        .bind(key.size.as_str())
        .bind(key.color.as_deref())
        .fetch_optional(self.pool)
        .await?;
        match variant_stock {
            Some((stock,)) if stock > 0 => {}
            _ => return Ok(false),
        }

        match &self.backend {
            CartBackend::User(user_id) => {
                upsert_db_line(self.pool, *user_id, key, 1, true).await?;
            }
            CartBackend::Session { store, session_id } => {
                store.add(session_id, key, product.price);
            }
        }
        Ok(true)
    }

    /// Delete the matching line; no-op when absent.
    pub async fn remove(&self, key: &CartKey) -> AppResult<()> {
        match &self.backend {
            CartBackend::User(user_id) => {
                sqlx::query(
                    r#"
                    DELETE FROM cart_items
                    WHERE user_id = $1 AND product_id = $2 AND size = $3
                      AND color IS NOT DISTINCT FROM $4
                    "#,
                )
                .bind(user_id)
                .bind(key.product_id)
                .bind(key.size.as_str())
                .bind(key.color.as_deref())
                .execute(self.pool)
                .await?;
            }
            CartBackend::Session { store, session_id } => {
                store.remove(session_id, key);
            }
        }
        Ok(())
    }

    /// Set the quantity; zero or less removes the line.
    pub async fn update(&self, key: &CartKey, quantity: i32) -> AppResult<()> {
        if quantity <= 0 {
            return self.remove(key).await;
        }
        match &self.backend {
            CartBackend::User(user_id) => {
                sqlx::query(
                    r#"
                    UPDATE cart_items SET quantity = $5
                    WHERE user_id = $1 AND product_id = $2 AND size = $3
                      AND color IS NOT DISTINCT FROM $4
                    "#,
                )
                .bind(user_id)
                .bind(key.product_id)
                .bind(key.size.as_str())
                .bind(key.color.as_deref())
                .bind(quantity)
                .execute(self.pool)
                .await?;
            }
            CartBackend::Session { store, session_id } => {
                store.update(session_id, key, quantity);
            }
        }
        Ok(())
    }

    /// Hydrated lines. A line whose product has vanished is skipped, not
    /// an error: the session backend stores only product ids.
    pub async fn items(&self) -> AppResult<Vec<CartLine>> {
        match &self.backend {
            CartBackend::User(user_id) => {
                let rows = sqlx::query_as::<_, DbCartRow>(
                    r#"
                    SELECT ci.size, ci.color, ci.quantity,
                           p.id AS product_id, p.category_id, p.name, p.description,
                           p.price, p.stock, p.color AS product_color,
                           p.is_active, p.created_at
                    FROM cart_items ci
                    JOIN products p ON p.id = ci.product_id
                    WHERE ci.user_id = $1
                    ORDER BY ci.created_at
                    "#,
                )
                .bind(user_id)
                .fetch_all(self.pool)
                .await?;

                Ok(rows
                    .into_iter()
                    .map(|row| {
                        let key = CartKey::new(row.product_id, row.size.clone(), row.color.clone());
                        let product = Product {
                            id: row.product_id,
                            category_id: row.category_id,
                            name: row.name,
                            description: row.description,
                            price: row.price,
                            stock: row.stock,
                            color: row.product_color,
                            is_active: row.is_active,
                            created_at: row.created_at,
                        };
                        CartLine {
                            key: key.to_string(),
                            size: row.size,
                            color: row.color,
                            quantity: row.quantity,
                            price: product.price,
                            total_price: product.price * i64::from(row.quantity),
                            product,
                        }
                    })
                    .collect())
            }
            CartBackend::Session { store, session_id } => {
                let mut lines = Vec::new();
                for (key, line) in store.lines(session_id) {
                    let product: Option<Product> =
                        sqlx::query_as("SELECT * FROM products WHERE id = $1")
                            .bind(line.product_id)
                            .fetch_optional(self.pool)
                            .await?;
                    let Some(product) = product else {
                        tracing::warn!(product_id = %line.product_id, "skipping cart line for missing product");
                        continue;
                    };
                    lines.push(CartLine {
                        key,
                        size: line.size,
                        color: line.color,
                        quantity: line.quantity,
                        price: line.price,
                        total_price: line.price * i64::from(line.quantity),
                        product,
                    });
                }
                Ok(lines)
            }
        }
    }

    pub async fn total_price(&self) -> AppResult<i64> {
        let items = self.items().await?;
        Ok(items.iter().map(|line| line.total_price).sum())
    }

    /// Number of distinct lines, not summed quantity.
    pub async fn count(&self) -> AppResult<i64> {
        match &self.backend {
            CartBackend::User(user_id) => {
                let total: (i64,) =
                    sqlx::query_as("SELECT COUNT(*) FROM cart_items WHERE user_id = $1")
                        .bind(user_id)
                        .fetch_one(self.pool)
                        .await?;
                Ok(total.0)
            }
            CartBackend::Session { store, session_id } => {
                Ok(store.lines(session_id).len() as i64)
            }
        }
    }

    pub async fn clear(&self) -> AppResult<()> {
        match &self.backend {
            CartBackend::User(user_id) => {
                sqlx::query("DELETE FROM cart_items WHERE user_id = $1")
                    .bind(user_id)
                    .execute(self.pool)
                    .await?;
            }
            CartBackend::Session { store, session_id } => {
                store.clear(session_id);
            }
        }
        Ok(())
    }
}

async fn upsert_db_line(
    pool: &DbPool,
    user_id: Uuid,
    key: &CartKey,
    quantity: i32,
    increment: bool,
) -> AppResult<()> {
    let existing: Option<(Uuid, i32)> = sqlx::query_as(
        r#"
        SELECT id, quantity FROM cart_items
        WHERE user_id = $1 AND product_id = $2 AND size = $3
          AND color IS NOT DISTINCT FROM $4
        "#,
    )
    .bind(user_id)
    .bind(key.product_id)
    .bind(key.size.as_str())
    .bind(key.color.as_deref())
    .fetch_optional(pool)
    .await?;

    match existing {
        Some((id, current)) => {
            let next = if increment { current + quantity } else { quantity };
            sqlx::query("UPDATE cart_items SET quantity = $2 WHERE id = $1")
                .bind(id)
                .bind(next)
                .execute(pool)
                .await?;
        }
        None => {
            sqlx::query(
                r#"
                INSERT INTO cart_items (id, user_id, product_id, size, color, quantity)
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(user_id)
            .bind(key.product_id)
            .bind(key.size.as_str())
            .bind(key.color.as_deref())
            .bind(quantity)
            .execute(pool)
            .await?;
        }
    }
    Ok(())
}

/// Fold a drained session cart into a user's database cart after login.
///
/// Matching lines have their quantities summed; lines for products that
/// no longer exist are skipped, and a failure on one line never aborts
/// the rest. The session cart was already taken out of the store, so it
/// cannot be replayed regardless of how many lines merged.
pub async fn merge_session_cart(
    pool: &DbPool,
    user_id: Uuid,
    lines: Vec<SessionLine>,
) -> AppResult<usize> {
    let mut merged = 0;
    for line in lines {
        let product: Result<Option<(Uuid,)>, sqlx::Error> =
            sqlx::query_as("SELECT id FROM products WHERE id = $1")
                .bind(line.product_id)
                .fetch_optional(pool)
                .await;
        match product {
            Ok(Some(_)) => {}
            Ok(None) => {
                tracing::warn!(product_id = %line.product_id, "merge: skipping line for missing product");
                continue;
            }
            Err(err) => {
                tracing::warn!(error = %err, product_id = %line.product_id, "merge: skipping line after lookup error");
                continue;
            }
        }

        let key = CartKey::new(line.product_id, line.size, line.color);
        if let Err(err) = upsert_db_line(pool, user_id, &key, line.quantity, true).await {
            tracing::warn!(error = %err, key = %key, "merge: skipping line after db error");
            continue;
        }
        merged += 1;
    }
    Ok(merged)
}
