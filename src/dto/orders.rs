use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::models::{Order, OrderItem};

#[derive(Debug, Deserialize, ToSchema)]
pub struct CheckoutRequest {
    pub address_id: Uuid,
    /// `cod` or `online`.
    pub payment_method: String,
    pub coupon_code: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CheckoutResponse {
    pub order: Order,
    pub items: Vec<OrderItem>,
    /// Redirect target for the buyer when paying online.
    pub payment_url: Option<String>,
    /// Non-fatal: set when a supplied coupon code was unknown or invalid
    /// and checkout proceeded without a discount.
    pub coupon_error: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CancelOrderRequest {
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct PaymentCallbackQuery {
    pub order_id: Uuid,
    /// `success` or `cancel`, as baked into the callback URLs handed to
    /// the gateway.
    pub outcome: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderWithItems {
    pub order: Order,
    pub items: Vec<OrderItem>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderList {
    pub items: Vec<Order>,
}
