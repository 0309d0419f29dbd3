//! Promotion rule-firing boundary

use crate::cart::Cart;

/// The injected promotion rule engine.
///
/// Each method synchronously fires zero or more callbacks into the cart
/// ([`Cart::rule_applied`], [`Cart::set_subtotal_discount`],
/// [`Cart::shipping_rule_applied`]) and then returns. The engine itself is
/// opaque: how rule conditions are evaluated is not this crate's concern.
pub trait RuleFirer<'a> {
    /// Fires item- and shipping-level promotion rules against the cart.
    fn fire_order_promotion_rules(&self, cart: &mut Cart<'a>);

    /// Fires subtotal-level promotion rules against the cart.
    ///
    /// Runs after a tax pass so subtotal discounts see final item discounts.
    fn fire_order_promotion_subtotal_rules(&self, cart: &mut Cart<'a>);
}

/// A rule engine that fires nothing; for carts evaluated without promotions.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopRuleFirer;

impl<'a> RuleFirer<'a> for NoopRuleFirer {
    fn fire_order_promotion_rules(&self, _cart: &mut Cart<'a>) {}

    fn fire_order_promotion_subtotal_rules(&self, _cart: &mut Cart<'a>) {}
}
