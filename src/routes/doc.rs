use utoipa::{
    Modify, OpenApi,
    openapi::{
        self,
        OpenApi as OpenApiSpec,
        security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    },
};
use utoipa_scalar::{Scalar, Servable};

use crate::{
    cart::CartLine,
    dto::{
        addresses::AddressList,
        cart::CartView,
        coupons::CouponList,
        orders::{CheckoutResponse, OrderList, OrderWithItems},
        products::{ProductList, ProductWithVariants, VariantList},
    },
    models::{Address, Category, Coupon, Order, OrderItem, Product, ProductVariant, User},
    response::{ApiResponse, Meta},
    routes::{
        addresses, admin, auth, cart, health,
        health::HealthData,
        orders, params, products as product_routes,
    },
};

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health_check,
        auth::login,
        auth::register,
        cart::view_cart,
        cart::add_to_cart,
        cart::update_cart_item,
        cart::remove_from_cart,
        cart::clear_cart,
        product_routes::list_products,
        product_routes::get_product,
        product_routes::create_product,
        product_routes::update_product,
        product_routes::delete_product,
        product_routes::add_variant,
        product_routes::adjust_variant_stock,
        product_routes::delete_variant,
        product_routes::list_categories,
        orders::checkout,
        orders::list_orders,
        orders::get_order,
        orders::cancel_order,
        orders::payment_callback,
        addresses::list_addresses,
        addresses::create_address,
        addresses::delete_address,
        admin::list_all_orders,
        admin::get_order_admin,
        admin::update_order_status,
        admin::list_low_stock,
        admin::create_coupon,
        admin::list_coupons
    ),
    components(
        schemas(
            HealthData,
            User,
            Category,
            Product,
            ProductVariant,
            Address,
            Coupon,
            Order,
            OrderItem,
            CartLine,
            CartView,
            CheckoutResponse,
            OrderWithItems,
            OrderList,
            ProductList,
            ProductWithVariants,
            VariantList,
            AddressList,
            CouponList,
            admin::UpdateOrderStatusRequest,
            admin::LowStockQuery,
            params::Pagination,
            params::ProductQuery,
            params::OrderListQuery,
            Meta,
            ApiResponse<Product>,
            ApiResponse<ProductList>,
            ApiResponse<CartView>,
            ApiResponse<CheckoutResponse>,
            ApiResponse<OrderWithItems>,
            ApiResponse<OrderList>
        )
    ),
    security(
        ("bearer_auth" = [])
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Health", description = "Health check endpoint"),
        (name = "Auth", description = "Authentication endpoints"),
        (name = "Products", description = "Catalog endpoints"),
        (name = "Cart", description = "Cart endpoints"),
        (name = "Orders", description = "Checkout and order endpoints"),
        (name = "Addresses", description = "Delivery address endpoints"),
        (name = "Admin", description = "Admin endpoints"),
    )
)]
pub struct ApiDoc;

pub fn scalar_docs() -> Scalar<OpenApiSpec> {
    Scalar::with_url("/docs", ApiDoc::openapi())
}
