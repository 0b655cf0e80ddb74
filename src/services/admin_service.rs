use uuid::Uuid;

use crate::{
    audit,
    coupon::{DISCOUNT_FLAT, DISCOUNT_PERCENT},
    dto::{
        coupons::{CouponList, CreateCouponRequest},
        orders::{OrderList, OrderWithItems},
        products::VariantList,
    },
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, ensure_admin},
    models::{Coupon, Order, OrderStatus, ProductVariant},
    response::{ApiResponse, Meta},
    routes::admin::{LowStockQuery, UpdateOrderStatusRequest},
    routes::params::{OrderListQuery, SortOrder},
    services::order_service,
    state::AppState,
};

pub async fn list_all_orders(
    state: &AppState,
    user: &AuthUser,
    query: OrderListQuery,
) -> AppResult<ApiResponse<OrderList>> {
    ensure_admin(user)?;
    let (page, limit, offset) = query.pagination.normalize();
    let status = query.status.unwrap_or_default();
    let sort_order = query.sort_order.unwrap_or(SortOrder::Desc);

    let sql = format!(
        r#"
        SELECT * FROM orders
        WHERE ($1 = '' OR status = $1)
        ORDER BY created_at {}
        LIMIT $2 OFFSET $3
        "#,
        sort_order.as_sql()
    );
    let items: Vec<Order> = sqlx::query_as(&sql)
        .bind(status.as_str())
        .bind(limit)
        .bind(offset)
        .fetch_all(&state.pool)
        .await?;

    let total: (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM orders WHERE ($1 = '' OR status = $1)")
            .bind(status.as_str())
            .fetch_one(&state.pool)
            .await?;

    let meta = Meta::new(page, limit, total.0);
    Ok(ApiResponse::success("Orders", OrderList { items }, Some(meta)))
}

pub async fn get_order_admin(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<OrderWithItems>> {
    ensure_admin(user)?;
    let order: Option<Order> = sqlx::query_as("SELECT * FROM orders WHERE id = $1")
        .bind(id)
        .fetch_optional(&state.pool)
        .await?;
    let order = match order {
        Some(o) => o,
        None => return Err(AppError::NotFound),
    };

    let items = order_service::order_items(state, order.id).await?;

    Ok(ApiResponse::success(
        "Order found",
        OrderWithItems { order, items },
        Some(Meta::empty()),
    ))
}

/// Fulfilment-side status changes. Only the lifecycle edges are allowed:
/// pending -> paid -> shipped -> delivered, plus cancellation before
/// shipping.
pub async fn update_order_status(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: UpdateOrderStatusRequest,
) -> AppResult<ApiResponse<Order>> {
    ensure_admin(user)?;
    let next = OrderStatus::parse(&payload.status)
        .ok_or_else(|| AppError::BadRequest(format!("unknown status '{}'", payload.status)))?;

    let mut txn = state.pool.begin().await?;

    let existing: Option<Order> = sqlx::query_as("SELECT * FROM orders WHERE id = $1 FOR UPDATE")
        .bind(id)
        .fetch_optional(&mut *txn)
        .await?;
    let existing = match existing {
        Some(o) => o,
        None => return Err(AppError::NotFound),
    };

    let current = OrderStatus::parse(&existing.status)
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("order has unknown status")))?;
    if !current.can_transition_to(next) {
        return Err(AppError::BadRequest(format!(
            "cannot move a {} order to {}",
            existing.status,
            next.as_str()
        )));
    }

    let order: Order = sqlx::query_as(
        r#"
        UPDATE orders
        SET status = $2,
            paid_at = CASE WHEN $2 = 'paid' THEN now() ELSE paid_at END,
            cancelled_at = CASE WHEN $2 = 'cancelled' THEN now() ELSE cancelled_at END,
            updated_at = now()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(next.as_str())
    .fetch_one(&mut *txn)
    .await?;

    txn.commit().await?;

    if let Err(err) = audit::record(
        &state.pool,
        Some(user.user_id),
        "order_status_update",
        Some("orders"),
        Some(order.id),
        Some(serde_json::json!({ "status": order.status })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Order updated",
        order,
        Some(Meta::empty()),
    ))
}

/// Low stock is reported per variant: variants are the unit of inventory
/// truth, and a healthy product total can hide an exhausted size.
pub async fn list_low_stock(
    state: &AppState,
    user: &AuthUser,
    query: LowStockQuery,
) -> AppResult<ApiResponse<VariantList>> {
    ensure_admin(user)?;
    let threshold = query.threshold.unwrap_or(5);
    let (page, limit, offset) = query.pagination.normalize();

    let items: Vec<ProductVariant> = sqlx::query_as(
        r#"
        SELECT * FROM product_variants
        WHERE stock <= $1
        ORDER BY stock, created_at DESC
        LIMIT $2 OFFSET $3
        "#,
    )
    .bind(threshold)
    .bind(limit)
    .bind(offset)
    .fetch_all(&state.pool)
    .await?;

    let total: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM product_variants WHERE stock <= $1")
        .bind(threshold)
        .fetch_one(&state.pool)
        .await?;

    let meta = Meta::new(page, limit, total.0);
    Ok(ApiResponse::success(
        "Low stock",
        VariantList { items },
        Some(meta),
    ))
}

pub async fn create_coupon(
    state: &AppState,
    user: &AuthUser,
    payload: CreateCouponRequest,
) -> AppResult<ApiResponse<Coupon>> {
    ensure_admin(user)?;

    let code = payload.code.trim().to_uppercase();
    if code.is_empty() {
        return Err(AppError::BadRequest("code must not be empty".into()));
    }
    match payload.discount_type.as_str() {
        DISCOUNT_FLAT => {
            if payload.value < 0 {
                return Err(AppError::BadRequest("value must not be negative".into()));
            }
        }
        DISCOUNT_PERCENT => {
            if !(1..=100).contains(&payload.value) {
                return Err(AppError::BadRequest(
                    "percent value must be between 1 and 100".into(),
                ));
            }
        }
        other => {
            return Err(AppError::BadRequest(format!(
                "unknown discount type '{other}'"
            )));
        }
    }

    let result: Result<Coupon, sqlx::Error> = sqlx::query_as(
        r#"
        INSERT INTO coupons (id, code, discount_type, value, min_order_amount, expires_on)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(code.as_str())
    .bind(payload.discount_type.as_str())
    .bind(payload.value)
    .bind(payload.min_order_amount)
    .bind(payload.expires_on)
    .fetch_one(&state.pool)
    .await;

    let coupon = match result {
        Ok(c) => c,
        Err(err)
            if err
                .as_database_error()
                .and_then(|db| db.code())
                .is_some_and(|c| c == "23505") =>
        {
            return Err(AppError::Conflict("coupon code already exists".into()));
        }
        Err(err) => return Err(err.into()),
    };

    if let Err(err) = audit::record(
        &state.pool,
        Some(user.user_id),
        "coupon_create",
        Some("coupons"),
        Some(coupon.id),
        Some(serde_json::json!({ "code": coupon.code })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Coupon created",
        coupon,
        Some(Meta::empty()),
    ))
}

pub async fn list_coupons(
    state: &AppState,
    user: &AuthUser,
) -> AppResult<ApiResponse<CouponList>> {
    ensure_admin(user)?;
    let items: Vec<Coupon> = sqlx::query_as("SELECT * FROM coupons ORDER BY created_at DESC")
        .fetch_all(&state.pool)
        .await?;
    Ok(ApiResponse::success("Coupons", CouponList { items }, None))
}
