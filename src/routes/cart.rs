use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{delete, get, patch},
};

use crate::{
    dto::cart::{AddToCartRequest, CartView, UpdateCartItemRequest},
    error::AppResult,
    middleware::auth::CartPrincipal,
    response::ApiResponse,
    services::cart_service,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(view_cart).post(add_to_cart).delete(clear_cart))
        .route("/{key}", patch(update_cart_item).delete(remove_from_cart))
}

#[utoipa::path(
    get,
    path = "/api/cart",
    params(
        ("x-session-id" = Option<String>, Header, description = "Anonymous cart session id")
    ),
    responses(
        (status = 200, description = "Current cart with totals", body = ApiResponse<CartView>)
    ),
    security(("bearer_auth" = [])),
    tag = "Cart"
)]
pub async fn view_cart(
    State(state): State<AppState>,
    principal: CartPrincipal,
) -> AppResult<Json<ApiResponse<CartView>>> {
    let resp = cart_service::view_cart(&state, &principal).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/api/cart",
    request_body = AddToCartRequest,
    params(
        ("x-session-id" = Option<String>, Header, description = "Anonymous cart session id")
    ),
    responses(
        (status = 200, description = "Add one unit of a variant", body = ApiResponse<CartView>),
        (status = 400, description = "Variant unavailable or out of stock"),
    ),
    security(("bearer_auth" = [])),
    tag = "Cart"
)]
pub async fn add_to_cart(
    State(state): State<AppState>,
    principal: CartPrincipal,
    Json(payload): Json<AddToCartRequest>,
) -> AppResult<Json<ApiResponse<CartView>>> {
    let resp = cart_service::add_to_cart(&state, &principal, payload).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    patch,
    path = "/api/cart/{key}",
    params(
        ("key" = String, Path, description = "Encoded cart line key"),
        ("x-session-id" = Option<String>, Header, description = "Anonymous cart session id")
    ),
    request_body = UpdateCartItemRequest,
    responses(
        (status = 200, description = "Set line quantity; zero removes it", body = ApiResponse<CartView>),
        (status = 400, description = "Malformed cart key"),
    ),
    security(("bearer_auth" = [])),
    tag = "Cart"
)]
pub async fn update_cart_item(
    State(state): State<AppState>,
    principal: CartPrincipal,
    Path(key): Path<String>,
    Json(payload): Json<UpdateCartItemRequest>,
) -> AppResult<Json<ApiResponse<CartView>>> {
    let resp = cart_service::update_cart_item(&state, &principal, &key, payload).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    delete,
    path = "/api/cart/{key}",
    params(
        ("key" = String, Path, description = "Encoded cart line key"),
        ("x-session-id" = Option<String>, Header, description = "Anonymous cart session id")
    ),
    responses(
        (status = 200, description = "Remove a line", body = ApiResponse<CartView>),
        (status = 400, description = "Malformed cart key"),
    ),
    security(("bearer_auth" = [])),
    tag = "Cart"
)]
pub async fn remove_from_cart(
    State(state): State<AppState>,
    principal: CartPrincipal,
    Path(key): Path<String>,
) -> AppResult<Json<ApiResponse<CartView>>> {
    let resp = cart_service::remove_from_cart(&state, &principal, &key).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    delete,
    path = "/api/cart",
    params(
        ("x-session-id" = Option<String>, Header, description = "Anonymous cart session id")
    ),
    responses(
        (status = 200, description = "Empty the cart", body = ApiResponse<serde_json::Value>)
    ),
    security(("bearer_auth" = [])),
    tag = "Cart"
)]
pub async fn clear_cart(
    State(state): State<AppState>,
    principal: CartPrincipal,
) -> AppResult<Json<ApiResponse<serde_json::Value>>> {
    let resp = cart_service::clear_cart(&state, &principal).await?;
    Ok(Json(resp))
}
