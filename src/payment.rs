use uuid::Uuid;

/// Redirect target handed to the buyer for an online payment.
#[derive(Debug, Clone)]
pub struct PaymentSession {
    pub redirect_url: String,
}

/// External payment collaborator.
///
/// The contract is deliberately small: given an amount in minor units and
/// the order it pays for, produce a redirect target; the gateway later
/// calls back with the order id, which the order service uses solely to
/// flip the order to `paid` and clear the cart. Swapping in a real
/// gateway client means replacing this one type.
#[derive(Debug, Clone)]
pub struct PaymentGateway {
    payment_base_url: String,
    public_base_url: String,
}

impl PaymentGateway {
    pub fn new(payment_base_url: String, public_base_url: String) -> Self {
        Self {
            payment_base_url,
            public_base_url,
        }
    }

    pub fn create_session(&self, order_id: Uuid, amount: i64) -> PaymentSession {
        let success_url = format!(
            "{}/api/payments/callback?order_id={}&outcome=success",
            self.public_base_url, order_id
        );
        let cancel_url = format!(
            "{}/api/payments/callback?order_id={}&outcome=cancel",
            self.public_base_url, order_id
        );
        let redirect_url = format!(
            "{}?amount={}&reference={}&success_url={}&cancel_url={}",
            self.payment_base_url, amount, order_id, success_url, cancel_url
        );
        PaymentSession { redirect_url }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_carries_amount_reference_and_callbacks() {
        let gw = PaymentGateway::new(
            "https://pay.example.com/checkout".into(),
            "http://localhost:3000".into(),
        );
        let order_id = Uuid::new_v4();
        let session = gw.create_session(order_id, 800);
        assert!(session.redirect_url.starts_with("https://pay.example.com/checkout?"));
        assert!(session.redirect_url.contains("amount=800"));
        assert!(session.redirect_url.contains(&format!("reference={order_id}")));
        assert!(session.redirect_url.contains("outcome=success"));
        assert!(session.redirect_url.contains("outcome=cancel"));
    }
}
