use chrono::Utc;
use sqlx::FromRow;
use uuid::Uuid;

use crate::{
    audit, coupon,
    dto::orders::{
        CancelOrderRequest, CheckoutRequest, CheckoutResponse, OrderList, OrderWithItems,
        PaymentCallbackQuery,
    },
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    models::{Coupon, Order, OrderItem, OrderStatus, PaymentMethod},
    response::{ApiResponse, Meta},
    routes::params::{OrderListQuery, SortOrder},
    state::AppState,
};

#[derive(Debug, FromRow)]
struct CheckoutLine {
    product_id: Uuid,
    product_name: String,
    size: String,
    color: Option<String>,
    quantity: i32,
    price: i64,
}

/// Place an order from the user's database cart.
///
/// The whole flow runs in one transaction: the order row, its item
/// snapshots, the variant stock decrements, and (for cash on delivery)
/// the cart clear all commit together. Any stock shortfall discovered at
/// write time rolls everything back, so an aborted checkout leaves no
/// order behind and no stock reserved.
pub async fn checkout(
    state: &AppState,
    user: &AuthUser,
    payload: CheckoutRequest,
) -> AppResult<ApiResponse<CheckoutResponse>> {
    let method = PaymentMethod::parse(&payload.payment_method).ok_or_else(|| {
        AppError::BadRequest(format!(
            "unsupported payment method '{}'",
            payload.payment_method
        ))
    })?;

    let mut txn = state.pool.begin().await?;

    let address: Option<(Uuid,)> =
        sqlx::query_as("SELECT id FROM addresses WHERE id = $1 AND user_id = $2")
            .bind(payload.address_id)
            .bind(user.user_id)
            .fetch_optional(&mut *txn)
            .await?;
    if address.is_none() {
        return Err(AppError::BadRequest(
            "delivery address not found for this account".to_string(),
        ));
    }

    // canonical line order: the variant row locks below are taken in this
    // order, so two concurrent checkouts holding the same variants cannot
    // deadlock on each other
    let lines = sqlx::query_as::<_, CheckoutLine>(
        r#"
        SELECT ci.product_id, p.name AS product_name, ci.size, ci.color,
               ci.quantity, p.price
        FROM cart_items ci
        JOIN products p ON p.id = ci.product_id
        WHERE ci.user_id = $1
        ORDER BY ci.product_id, ci.size, ci.color
        FOR UPDATE OF ci
        "#,
    )
    .bind(user.user_id)
    .fetch_all(&mut *txn)
    .await?;

    if lines.is_empty() {
        return Err(AppError::BadRequest("Cart is empty".to_string()));
    }

    let mut subtotal: i64 = 0;
    for line in &lines {
        if line.quantity <= 0 {
            return Err(AppError::BadRequest("Cart has invalid quantity".to_string()));
        }
        subtotal += line.price * i64::from(line.quantity);
    }

    let mut coupon_error = None;
    let mut coupon_id = None;
    let mut discount: i64 = 0;
    if let Some(code) = payload
        .coupon_code
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty())
    {
        let found: Option<Coupon> = sqlx::query_as("SELECT * FROM coupons WHERE code = $1")
            .bind(code)
            .fetch_optional(&mut *txn)
            .await?;
        match found {
            None => coupon_error = Some(format!("unknown coupon code '{code}'")),
            Some(c) => {
                let today = Utc::now().date_naive();
                if coupon::is_valid(&c, today, subtotal) {
                    discount = coupon::discount_for(&c, today, subtotal);
                    coupon_id = Some(c.id);
                } else {
                    // a bad coupon never blocks checkout
                    coupon_error = Some(format!(
                        "coupon '{code}' is inactive, expired, or below its minimum order amount"
                    ));
                }
            }
        }
    }

    let final_amount = coupon::final_amount(subtotal, discount);

    // order row goes in first so items can reference it
    let order_id = Uuid::new_v4();
    let order: Order = sqlx::query_as(
        r#"
        INSERT INTO orders
            (id, user_id, address_id, coupon_id, total_amount, discount_amount,
             final_amount, status, payment_method, invoice_number)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        RETURNING *
        "#,
    )
    .bind(order_id)
    .bind(user.user_id)
    .bind(payload.address_id)
    .bind(coupon_id)
    .bind(subtotal)
    .bind(discount)
    .bind(final_amount)
    .bind(OrderStatus::Pending.as_str())
    .bind(method.as_str())
    .bind(build_invoice_number(order_id))
    .fetch_one(&mut *txn)
    .await?;

    let mut order_items: Vec<OrderItem> = Vec::with_capacity(lines.len());
    for line in &lines {
        // stock is re-checked at write time under a row lock; the check at
        // add-to-cart time says nothing about what is left now
        let variant: Option<(Uuid, i32)> = sqlx::query_as(
            r#"
            SELECT id, stock FROM product_variants
            WHERE product_id = $1 AND size = $2 AND color IS NOT DISTINCT FROM $3
            FOR UPDATE
            "#,
        )
        .bind(line.product_id)
        .bind(line.size.as_str())
        .bind(line.color.as_deref())
        .fetch_optional(&mut *txn)
        .await?;

        // early return drops the transaction: full rollback, no order row
        let (variant_id, stock) = variant.ok_or_else(|| {
            AppError::BadRequest(format!(
                "'{}' ({}) is no longer available",
                line.product_name, line.size
            ))
        })?;
        if stock < line.quantity {
            return Err(AppError::BadRequest(format!(
                "Insufficient stock for '{}' ({})",
                line.product_name, line.size
            )));
        }

        let item: OrderItem = sqlx::query_as(
            r#"
            INSERT INTO order_items
                (id, order_id, product_id, product_name, size, color, quantity, price)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(order.id)
        .bind(line.product_id)
        .bind(line.product_name.as_str())
        .bind(line.size.as_str())
        .bind(line.color.as_deref())
        .bind(line.quantity)
        .bind(line.price)
        .fetch_one(&mut *txn)
        .await?;
        order_items.push(item);

        sqlx::query("UPDATE product_variants SET stock = stock - $2 WHERE id = $1")
            .bind(variant_id)
            .bind(line.quantity)
            .execute(&mut *txn)
            .await?;
    }

    let mut payment_url = None;
    match method {
        PaymentMethod::CashOnDelivery => {
            sqlx::query("DELETE FROM cart_items WHERE user_id = $1")
                .bind(user.user_id)
                .execute(&mut *txn)
                .await?;
            txn.commit().await?;
        }
        PaymentMethod::Online => {
            // cart survives until the gateway confirms payment; the order
            // holds its decremented stock while pending
            txn.commit().await?;
            let session = state.payments.create_session(order.id, order.final_amount);
            payment_url = Some(session.redirect_url);
        }
    }

    if let Err(err) = audit::record(
        &state.pool,
        Some(user.user_id),
        "checkout",
        Some("orders"),
        Some(order.id),
        Some(serde_json::json!({
            "payment_method": method.as_str(),
            "final_amount": order.final_amount,
        })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Checkout success",
        CheckoutResponse {
            order,
            items: order_items,
            payment_url,
            coupon_error,
        },
        Some(Meta::empty()),
    ))
}

/// Gateway callback. `success` flips a pending online order to `paid` and
/// clears the buyer's cart; `cancel` leaves the order pending with its
/// stock still reserved.
pub async fn payment_callback(
    state: &AppState,
    query: PaymentCallbackQuery,
) -> AppResult<ApiResponse<Order>> {
    let mut txn = state.pool.begin().await?;

    let order: Option<Order> = sqlx::query_as("SELECT * FROM orders WHERE id = $1 FOR UPDATE")
        .bind(query.order_id)
        .fetch_optional(&mut *txn)
        .await?;
    let order = match order {
        Some(o) => o,
        None => return Err(AppError::NotFound),
    };

    if order.payment_method != PaymentMethod::Online.as_str() {
        return Err(AppError::BadRequest(
            "order was not placed with online payment".to_string(),
        ));
    }

    match query.outcome.as_str() {
        "success" => {
            let status = OrderStatus::parse(&order.status);
            if status != Some(OrderStatus::Pending) {
                return Err(AppError::BadRequest(format!(
                    "order is already {}",
                    order.status
                )));
            }

            let order: Order = sqlx::query_as(
                r#"
                UPDATE orders
                SET status = $2, paid_at = now(), updated_at = now()
                WHERE id = $1
                RETURNING *
                "#,
            )
            .bind(order.id)
            .bind(OrderStatus::Paid.as_str())
            .fetch_one(&mut *txn)
            .await?;

            sqlx::query("DELETE FROM cart_items WHERE user_id = $1")
                .bind(order.user_id)
                .execute(&mut *txn)
                .await?;

            txn.commit().await?;

            if let Err(err) = audit::record(
                &state.pool,
                Some(order.user_id),
                "order_paid",
                Some("orders"),
                Some(order.id),
                None,
            )
            .await
            {
                tracing::warn!(error = %err, "audit log failed");
            }

            Ok(ApiResponse::success(
                "Payment recorded",
                order,
                Some(Meta::empty()),
            ))
        }
        "cancel" => Ok(ApiResponse::success(
            "Payment cancelled; order remains pending",
            order,
            Some(Meta::empty()),
        )),
        other => Err(AppError::BadRequest(format!(
            "unknown payment outcome '{other}'"
        ))),
    }
}

pub async fn list_orders(
    state: &AppState,
    user: &AuthUser,
    query: OrderListQuery,
) -> AppResult<ApiResponse<OrderList>> {
    let (page, limit, offset) = query.pagination.normalize();
    let status = query.status.unwrap_or_default();
    let sort_order = query.sort_order.unwrap_or(SortOrder::Desc);

    let sql = format!(
        r#"
        SELECT * FROM orders
        WHERE user_id = $1 AND ($2 = '' OR status = $2)
        ORDER BY created_at {}
        LIMIT $3 OFFSET $4
        "#,
        sort_order.as_sql()
    );
    let items: Vec<Order> = sqlx::query_as(&sql)
        .bind(user.user_id)
        .bind(status.as_str())
        .bind(limit)
        .bind(offset)
        .fetch_all(&state.pool)
        .await?;

    let total: (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM orders WHERE user_id = $1 AND ($2 = '' OR status = $2)",
    )
    .bind(user.user_id)
    .bind(status.as_str())
    .fetch_one(&state.pool)
    .await?;

    let meta = Meta::new(page, limit, total.0);
    Ok(ApiResponse::success("OK", OrderList { items }, Some(meta)))
}

pub async fn get_order(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<OrderWithItems>> {
    let order: Option<Order> =
        sqlx::query_as("SELECT * FROM orders WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user.user_id)
            .fetch_optional(&state.pool)
            .await?;
    let order = match order {
        Some(o) => o,
        None => return Err(AppError::NotFound),
    };

    let items = order_items(state, order.id).await?;

    Ok(ApiResponse::success(
        "OK",
        OrderWithItems { order, items },
        Some(Meta::empty()),
    ))
}

/// Buyer-side cancellation, allowed only while the order is pending or
/// paid. Stock is not returned to the variants.
pub async fn cancel_order(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: CancelOrderRequest,
) -> AppResult<ApiResponse<Order>> {
    let mut txn = state.pool.begin().await?;

    let order: Option<Order> =
        sqlx::query_as("SELECT * FROM orders WHERE id = $1 AND user_id = $2 FOR UPDATE")
            .bind(id)
            .bind(user.user_id)
            .fetch_optional(&mut *txn)
            .await?;
    let order = match order {
        Some(o) => o,
        None => return Err(AppError::NotFound),
    };

    let status = OrderStatus::parse(&order.status)
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("order has unknown status")))?;
    if !status.can_cancel() {
        return Err(AppError::BadRequest(format!(
            "a {} order can no longer be cancelled",
            order.status
        )));
    }

    let order: Order = sqlx::query_as(
        r#"
        UPDATE orders
        SET status = $2, cancel_reason = $3, cancelled_at = now(), updated_at = now()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(order.id)
    .bind(OrderStatus::Cancelled.as_str())
    .bind(payload.reason.as_deref())
    .fetch_one(&mut *txn)
    .await?;

    txn.commit().await?;

    if let Err(err) = audit::record(
        &state.pool,
        Some(user.user_id),
        "order_cancelled",
        Some("orders"),
        Some(order.id),
        None,
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Order cancelled",
        order,
        Some(Meta::empty()),
    ))
}

pub async fn order_items(state: &AppState, order_id: Uuid) -> AppResult<Vec<OrderItem>> {
    let items: Vec<OrderItem> =
        sqlx::query_as("SELECT * FROM order_items WHERE order_id = $1 ORDER BY created_at")
            .bind(order_id)
            .fetch_all(&state.pool)
            .await?;
    Ok(items)
}

fn build_invoice_number(order_id: Uuid) -> String {
    let date = Utc::now().format("%Y%m%d");
    let suffix = order_id.to_string();
    let short = &suffix[..8];
    format!("INV-{}-{}", date, short)
}
