use crate::{db::DbPool, payment::PaymentGateway, session::SessionCarts};

#[derive(Clone)]
pub struct AppState {
    pub pool: DbPool,
    pub sessions: SessionCarts,
    pub payments: PaymentGateway,
}
