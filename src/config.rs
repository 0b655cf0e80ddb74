use std::env;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    /// Base URL of the hosted payment page buyers are redirected to.
    pub payment_base_url: String,
    /// Public base URL of this service, used to build payment callbacks.
    pub public_base_url: String,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = env::var("DATABASE_URL")?;
        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .ok()
            .and_then(|p| p.parse::<u16>().ok())
            .unwrap_or(3000);
        let payment_base_url = env::var("PAYMENT_BASE_URL")
            .unwrap_or_else(|_| "https://pay.example.com/checkout".to_string());
        let public_base_url =
            env::var("PUBLIC_BASE_URL").unwrap_or_else(|_| format!("http://{host}:{port}"));
        Ok(Self {
            database_url,
            host,
            port,
            payment_base_url,
            public_base_url,
        })
    }
}
