//! Coupon usage accounting

use std::num::NonZeroU32;

use crate::{
    ledger::{DiscountKind, DiscountRecord},
    shipping::ShippingOption,
};

/// The slice of a promotion rule action that coupon accounting needs.
#[derive(Clone, Debug, PartialEq)]
pub struct RuleAction {
    discount_quantity_per_coupon: NonZeroU32,
    single_coupon_per_application: bool,
    shipping_option_code: Option<String>,
}

impl RuleAction {
    /// An action whose item discount covers `quantity` units per coupon use.
    #[must_use]
    pub fn per_quantity(discount_quantity_per_coupon: NonZeroU32) -> Self {
        RuleAction {
            discount_quantity_per_coupon,
            single_coupon_per_application: false,
            shipping_option_code: None,
        }
    }

    /// An "N free SKUs"-style action: one coupon use regardless of quantity.
    #[must_use]
    pub fn single_coupon() -> Self {
        RuleAction {
            discount_quantity_per_coupon: NonZeroU32::MIN,
            single_coupon_per_application: true,
            shipping_option_code: None,
        }
    }

    /// An action that discounts the shipping option with the given code.
    #[must_use]
    pub fn for_shipping_option(code: impl Into<String>) -> Self {
        RuleAction {
            discount_quantity_per_coupon: NonZeroU32::MIN,
            single_coupon_per_application: false,
            shipping_option_code: Some(code.into()),
        }
    }

    /// Units of item covered by one coupon use.
    pub fn discount_quantity_per_coupon(&self) -> NonZeroU32 {
        self.discount_quantity_per_coupon
    }

    /// Whether this action consumes exactly one coupon per application.
    pub fn is_single_coupon_per_application(&self) -> bool {
        self.single_coupon_per_application
    }

    /// Shipping option code this action targets, if any.
    pub fn shipping_option_code(&self) -> Option<&str> {
        self.shipping_option_code.as_deref()
    }
}

/// How many coupon redemptions the given discount record represents.
///
/// Superseded records consume nothing. Item discounts consume the smallest
/// whole number of coupons that accounts for the discounted quantity,
/// rounding up: under-counting coupon consumption is unacceptable. A
/// shipping discount counts only while its target option is still the
/// selected one.
#[must_use]
pub fn coupon_uses_required(
    record: &DiscountRecord,
    action: &RuleAction,
    selected_shipping: Option<&ShippingOption<'_>>,
) -> u32 {
    if record.is_superseded() {
        return 0;
    }

    match record.kind() {
        DiscountKind::Item {
            quantity_applied_to,
            ..
        } => {
            if action.is_single_coupon_per_application() {
                1
            } else {
                quantity_applied_to.div_ceil(action.discount_quantity_per_coupon().get())
            }
        }
        DiscountKind::Subtotal => 1,
        DiscountKind::Shipping => match (selected_shipping, action.shipping_option_code()) {
            (Some(option), Some(code)) if option.code() == code => 1,
            _ => 0,
        },
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;
    use rusty_money::{Money, iso::USD};

    use super::*;

    fn qty(n: u32) -> NonZeroU32 {
        NonZeroU32::new(n).unwrap_or(NonZeroU32::MIN)
    }

    fn item_record(quantity_applied_to: u32) -> DiscountRecord {
        DiscountRecord::item("item-1", Decimal::ONE, quantity_applied_to)
    }

    #[test]
    fn item_discount_rounds_coupon_uses_up() {
        let record = item_record(7);
        let action = RuleAction::per_quantity(qty(3));

        // ceil(7 / 3) = 3, never 2.
        assert_eq!(coupon_uses_required(&record, &action, None), 3);
    }

    #[test]
    fn item_discount_exact_multiple_does_not_over_count() {
        let record = item_record(6);
        let action = RuleAction::per_quantity(qty(3));

        assert_eq!(coupon_uses_required(&record, &action, None), 2);
    }

    #[test]
    fn free_sku_action_consumes_one_coupon_regardless_of_quantity() {
        let record = item_record(40);
        let action = RuleAction::single_coupon();

        assert_eq!(coupon_uses_required(&record, &action, None), 1);
    }

    #[test]
    fn superseded_record_consumes_nothing() {
        let record = DiscountRecord::subtotal(Decimal::TEN).superseded();
        let action = RuleAction::per_quantity(qty(1));

        assert_eq!(coupon_uses_required(&record, &action, None), 0);
    }

    #[test]
    fn subtotal_discount_is_one_use_regardless_of_magnitude() {
        let record = DiscountRecord::subtotal(Decimal::new(100_000, 2));
        let action = RuleAction::per_quantity(qty(1));

        assert_eq!(coupon_uses_required(&record, &action, None), 1);
    }

    #[test]
    fn shipping_discount_counts_only_for_matching_selected_option() {
        let record = DiscountRecord::shipping(Decimal::TEN);
        let action = RuleAction::for_shipping_option("express");

        let express = ShippingOption::new(1, "express", Money::from_minor(995, USD));
        let ground = ShippingOption::new(2, "ground", Money::from_minor(495, USD));

        assert_eq!(coupon_uses_required(&record, &action, Some(&express)), 1);
        assert_eq!(coupon_uses_required(&record, &action, Some(&ground)), 0);
        assert_eq!(coupon_uses_required(&record, &action, None), 0);
    }
}
