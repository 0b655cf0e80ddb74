use crate::{
    audit,
    cart::Cart,
    cart_key::CartKey,
    dto::cart::{AddToCartRequest, CartView, UpdateCartItemRequest},
    error::{AppError, AppResult},
    middleware::auth::CartPrincipal,
    response::{ApiResponse, Meta},
    state::AppState,
};

fn actor(principal: &CartPrincipal) -> Option<uuid::Uuid> {
    match principal {
        CartPrincipal::User(user) => Some(user.user_id),
        CartPrincipal::Session(_) => None,
    }
}

pub async fn view_cart(
    state: &AppState,
    principal: &CartPrincipal,
) -> AppResult<ApiResponse<CartView>> {
    let cart = Cart::new(state, principal);
    let items = cart.items().await?;
    let total_price = items.iter().map(|line| line.total_price).sum();
    Ok(ApiResponse::success(
        "OK",
        CartView { items, total_price },
        Some(Meta::empty()),
    ))
}

pub async fn add_to_cart(
    state: &AppState,
    principal: &CartPrincipal,
    payload: AddToCartRequest,
) -> AppResult<ApiResponse<CartView>> {
    let size = payload.size.trim();
    if size.is_empty() {
        return Err(AppError::BadRequest("size must not be empty".to_string()));
    }
    // '-' is the cart key separator; a hyphenated size would not round-trip
    if size.contains('-') {
        return Err(AppError::BadRequest(
            "size must not contain '-'".to_string(),
        ));
    }
    let key = CartKey::new(
        payload.product_id,
        size,
        payload.color.filter(|c| !c.is_empty()),
    );

    let cart = Cart::new(state, principal);
    if !cart.add(&key).await? {
        return Err(AppError::BadRequest(
            "variant unavailable or out of stock".to_string(),
        ));
    }

    if let Err(err) = audit::record(
        &state.pool,
        actor(principal),
        "cart_add",
        Some("cart_items"),
        Some(key.product_id),
        Some(serde_json::json!({ "key": key.to_string() })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    view_cart(state, principal).await
}

pub async fn update_cart_item(
    state: &AppState,
    principal: &CartPrincipal,
    key: &str,
    payload: UpdateCartItemRequest,
) -> AppResult<ApiResponse<CartView>> {
    let key: CartKey = key
        .parse()
        .map_err(|_| AppError::BadRequest("malformed cart key".to_string()))?;

    let cart = Cart::new(state, principal);
    cart.update(&key, payload.quantity).await?;

    view_cart(state, principal).await
}

pub async fn remove_from_cart(
    state: &AppState,
    principal: &CartPrincipal,
    key: &str,
) -> AppResult<ApiResponse<CartView>> {
    let key: CartKey = key
        .parse()
        .map_err(|_| AppError::BadRequest("malformed cart key".to_string()))?;

    let cart = Cart::new(state, principal);
    cart.remove(&key).await?;

    if let Err(err) = audit::record(
        &state.pool,
        actor(principal),
        "cart_remove",
        Some("cart_items"),
        Some(key.product_id),
        Some(serde_json::json!({ "key": key.to_string() })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    view_cart(state, principal).await
}

pub async fn clear_cart(
    state: &AppState,
    principal: &CartPrincipal,
) -> AppResult<ApiResponse<serde_json::Value>> {
    let cart = Cart::new(state, principal);
    cart.clear().await?;
    Ok(ApiResponse::success(
        "Cart cleared",
        serde_json::json!({}),
        Some(Meta::empty()),
    ))
}
