pub mod audit;
pub mod cart;
pub mod cart_key;
pub mod config;
pub mod coupon;
pub mod db;
pub mod dto;
pub mod error;
pub mod middleware;
pub mod models;
pub mod payment;
pub mod response;
pub mod routes;
pub mod services;
pub mod session;
pub mod state;
