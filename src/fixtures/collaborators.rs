//! Collaborator stand-ins
//!
//! A flat-rate tax lookup, a scripted rule engine and a fixed balance store,
//! standing in for the external services the engine delegates to.

use rust_decimal::{Decimal, RoundingStrategy, prelude::ToPrimitive};
use rustc_hash::FxHashMap;
use rusty_money::{Money, iso::Currency};
use tracing::warn;

use crate::{
    apportion::apportion_discount,
    cart::Cart,
    certificates::{GiftCertificate, GiftCertificateBalance},
    items::LineItem,
    rules::RuleFirer,
    tax::{Address, TaxError, TaxLookup, TaxResult},
};

/// A tax lookup applying one flat rate under a single category.
///
/// Mimics the production collaborator's shape: taxes are computed on the
/// discounted item prices, no address means no jurisdiction match (zero
/// taxes, before-tax prices still accumulate), and inclusive mode backs the
/// tax out of the price instead of adding it on top.
#[derive(Clone, Debug)]
pub struct FlatRateTaxLookup {
    rate: Decimal,
    inclusive: bool,
    category: String,
}

impl FlatRateTaxLookup {
    /// A tax-exclusive lookup: tax is added on top of prices.
    #[must_use]
    pub fn exclusive(rate: Decimal) -> Self {
        FlatRateTaxLookup {
            rate,
            inclusive: false,
            category: "TAX".to_owned(),
        }
    }

    /// A tax-inclusive lookup: tax is already inside prices.
    #[must_use]
    pub fn inclusive(rate: Decimal) -> Self {
        FlatRateTaxLookup {
            rate,
            inclusive: true,
            category: "TAX".to_owned(),
        }
    }

    /// Tax owed on an amount in minor units, per this lookup's regime.
    fn tax_on(&self, amount_minor: i64) -> i64 {
        let amount = Decimal::from(amount_minor);
        let tax = if self.inclusive {
            amount * self.rate / (Decimal::ONE + self.rate)
        } else {
            amount * self.rate
        };
        tax.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
            .to_i64()
            .unwrap_or_default()
    }
}

fn minor_units(amount: Decimal, currency: &Currency) -> i64 {
    (amount * Decimal::from(10u64.pow(currency.exponent)))
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
        .unwrap_or_default()
}

impl<'a> TaxLookup<'a> for FlatRateTaxLookup {
    fn calculate_taxes_and_add_to_result(
        &self,
        mut result: TaxResult<'a>,
        _store_code: &str,
        address: Option<&Address>,
        currency: &'a Currency,
        shipping_cost: &Money<'a, Currency>,
        items: &[LineItem<'a>],
        discount: &Money<'a, Currency>,
    ) -> Result<TaxResult<'a>, TaxError> {
        result.set_tax_inclusive(self.inclusive);
        let jurisdiction_matched = address.is_some();

        let shipping_minor = shipping_cost.to_minor_units();
        let mut shipping_tax_minor = 0;
        if jurisdiction_matched && shipping_minor > 0 {
            shipping_tax_minor = self.tax_on(shipping_minor);
            if shipping_tax_minor != 0 {
                let tax = Money::from_minor(shipping_tax_minor, currency);
                result.add_shipping_tax(tax)?;
                result.add_tax_value(&self.category, tax)?;
            }
        }
        let before_tax_shipping_minor = if self.inclusive {
            shipping_minor - shipping_tax_minor
        } else {
            shipping_minor
        };
        result.add_before_tax_shipping_cost(Money::from_minor(before_tax_shipping_minor, currency))?;

        let shares = apportion_discount(discount, items)
            .map_err(|error| TaxError::Lookup(Box::new(error)))?;

        for item in items {
            let price_minor = item.extended_price().to_minor_units();
            let share_minor = shares
                .get(item.guid())
                .map_or(0, |share| minor_units(*share, currency));
            let discounted_minor = price_minor - share_minor;

            let tax_minor = if jurisdiction_matched {
                self.tax_on(discounted_minor)
            } else {
                0
            };
            let tax = Money::from_minor(tax_minor, currency);
            result.add_item_tax(item.guid(), tax);
            if tax_minor != 0 {
                result.add_tax_value(&self.category, tax)?;
            }
            if self.inclusive {
                result.add_to_tax_in_item_price(tax)?;
            }

            let before_tax_minor = if self.inclusive {
                price_minor - tax_minor
            } else {
                price_minor
            };
            let before_tax = Money::from_minor(before_tax_minor, currency);
            result.add_before_tax_item_price(before_tax)?;
            result.add_before_tax_without_discount(before_tax)?;
        }

        Ok(result)
    }
}

/// One scripted callback into the cart.
#[derive(Clone, Debug)]
pub enum Firing {
    /// An item-level discount application.
    Item {
        /// Firing rule id.
        rule_id: u64,
        /// Firing action id.
        action_id: u64,
        /// Guid of the discounted item.
        item_guid: String,
        /// Discount amount.
        amount: Decimal,
        /// Quantity the discount covers.
        quantity: u32,
    },

    /// A subtotal-level discount.
    Subtotal {
        /// Firing rule id.
        rule_id: u64,
        /// Firing action id.
        action_id: u64,
        /// Discount amount.
        amount: Decimal,
    },

    /// A shipping discount.
    Shipping {
        /// Firing rule id.
        rule_id: u64,
        /// Firing action id.
        action_id: u64,
        /// Discount amount.
        amount: Decimal,
    },
}

/// A rule engine that replays fixed callback scripts.
#[derive(Clone, Debug, Default)]
pub struct ScriptedRuleFirer {
    item_level: Vec<Firing>,
    subtotal_level: Vec<Firing>,
}

impl ScriptedRuleFirer {
    /// A firer replaying `item_level` on the first pass and
    /// `subtotal_level` on the subtotal pass.
    #[must_use]
    pub fn new(item_level: Vec<Firing>, subtotal_level: Vec<Firing>) -> Self {
        ScriptedRuleFirer {
            item_level,
            subtotal_level,
        }
    }

    /// A firer that only fires subtotal-level discounts.
    #[must_use]
    pub fn subtotal_only(subtotal_level: Vec<Firing>) -> Self {
        ScriptedRuleFirer::new(Vec::new(), subtotal_level)
    }
}

fn apply<'a>(cart: &mut Cart<'a>, firing: &Firing) {
    match firing {
        Firing::Item {
            rule_id,
            action_id,
            item_guid,
            amount,
            quantity,
        } => cart.rule_applied(*rule_id, *action_id, item_guid, *amount, *quantity),
        Firing::Subtotal {
            rule_id,
            action_id,
            amount,
        } => {
            if let Err(error) = cart.set_subtotal_discount(*amount, *rule_id, *action_id) {
                warn!(%error, "scripted subtotal discount rejected");
            }
        }
        Firing::Shipping {
            rule_id,
            action_id,
            amount,
        } => cart.shipping_rule_applied(*rule_id, *action_id, *amount),
    }
}

impl<'a> RuleFirer<'a> for ScriptedRuleFirer {
    fn fire_order_promotion_rules(&self, cart: &mut Cart<'a>) {
        for firing in &self.item_level {
            apply(cart, firing);
        }
    }

    fn fire_order_promotion_subtotal_rules(&self, cart: &mut Cart<'a>) {
        for firing in &self.subtotal_level {
            apply(cart, firing);
        }
    }
}

/// A gift certificate balance store backed by a fixed map.
#[derive(Clone, Debug, Default)]
pub struct FixedBalances {
    balances: FxHashMap<String, Decimal>,
}

impl FixedBalances {
    /// Adds a balance for the given certificate code.
    #[must_use]
    pub fn with(mut self, code: impl Into<String>, balance: Decimal) -> Self {
        self.balances.insert(code.into(), balance);
        self
    }
}

impl GiftCertificateBalance for FixedBalances {
    fn balance(&self, certificate: &GiftCertificate) -> Decimal {
        self.balances
            .get(certificate.code())
            .copied()
            .unwrap_or(Decimal::ZERO)
    }
}
