use chrono::NaiveDate;

use crate::models::Coupon;

pub const DISCOUNT_PERCENT: &str = "percent";
pub const DISCOUNT_FLAT: &str = "flat";

/// Validity is a pure function of the coupon, the current date, and the
/// order subtotal. There is no usage counting: any valid coupon may be
/// reused by any user on any qualifying order.
pub fn is_valid(coupon: &Coupon, today: NaiveDate, subtotal: i64) -> bool {
    coupon.is_active && today <= coupon.expires_on && subtotal >= coupon.min_order_amount
}

/// Discount granted on the subtotal, in minor units. Zero for coupons
/// that fail validation or carry an unknown discount type.
pub fn discount_for(coupon: &Coupon, today: NaiveDate, subtotal: i64) -> i64 {
    if !is_valid(coupon, today, subtotal) {
        return 0;
    }
    match coupon.discount_type.as_str() {
        DISCOUNT_PERCENT => subtotal * coupon.value / 100,
        DISCOUNT_FLAT => coupon.value,
        _ => 0,
    }
}

/// Amount actually charged: the discount never drives the total negative.
pub fn final_amount(subtotal: i64, discount: i64) -> i64 {
    (subtotal - discount).max(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn coupon(discount_type: &str, value: i64, min_order: i64, days_left: i64) -> Coupon {
        let today = Utc::now().date_naive();
        Coupon {
            id: Uuid::new_v4(),
            code: "SAVE".into(),
            discount_type: discount_type.into(),
            value,
            min_order_amount: min_order,
            expires_on: today + chrono::Duration::days(days_left),
            is_active: true,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn flat_discount_applies_above_minimum() {
        let c = coupon(DISCOUNT_FLAT, 200, 500, 30);
        let today = Utc::now().date_naive();
        assert_eq!(discount_for(&c, today, 1000), 200);
        assert_eq!(final_amount(1000, 200), 800);
    }

    #[test]
    fn percent_discount_is_proportional() {
        let c = coupon(DISCOUNT_PERCENT, 10, 0, 30);
        let today = Utc::now().date_naive();
        assert_eq!(discount_for(&c, today, 1000), 100);
    }

    #[test]
    fn below_minimum_is_invalid() {
        let c = coupon(DISCOUNT_FLAT, 200, 500, 30);
        let today = Utc::now().date_naive();
        assert!(!is_valid(&c, today, 499));
        assert_eq!(discount_for(&c, today, 499), 0);
    }

    #[test]
    fn expired_coupon_yields_no_discount() {
        let c = coupon(DISCOUNT_FLAT, 200, 0, -1);
        let today = Utc::now().date_naive();
        assert!(!is_valid(&c, today, 1000));
        assert_eq!(discount_for(&c, today, 1000), 0);
    }

    #[test]
    fn expiry_date_itself_is_still_valid() {
        let c = coupon(DISCOUNT_FLAT, 200, 0, 0);
        let today = Utc::now().date_naive();
        assert!(is_valid(&c, today, 1000));
    }

    #[test]
    fn inactive_coupon_is_invalid() {
        let mut c = coupon(DISCOUNT_FLAT, 200, 0, 30);
        c.is_active = false;
        let today = Utc::now().date_naive();
        assert!(!is_valid(&c, today, 1000));
    }

    #[test]
    fn discount_never_drives_total_negative() {
        let c = coupon(DISCOUNT_FLAT, 5000, 0, 30);
        let today = Utc::now().date_naive();
        let discount = discount_for(&c, today, 1000);
        assert_eq!(final_amount(1000, discount), 0);
    }

    #[test]
    fn unknown_discount_type_is_worth_nothing() {
        let c = coupon("mystery", 200, 0, 30);
        let today = Utc::now().date_naive();
        assert_eq!(discount_for(&c, today, 1000), 0);
    }
}
