pub mod addresses;
pub mod auth;
pub mod cart;
pub mod coupons;
pub mod orders;
pub mod products;
