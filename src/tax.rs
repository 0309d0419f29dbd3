//! Tax results and the tax-lookup boundary

use rust_decimal::Decimal;
use rustc_hash::FxHashMap;
use rusty_money::{Money, MoneyError, iso::Currency};
use thiserror::Error;

use crate::items::LineItem;

/// Errors raised while merging or applying tax results.
#[derive(Debug, Error)]
pub enum TaxError {
    /// A line item had no tax entry in the result being applied.
    #[error("no tax recorded for line item {0}")]
    MissingLineItemTax(String),

    /// Wrapped money arithmetic or currency mismatch error.
    #[error(transparent)]
    Money(#[from] MoneyError),

    /// The external tax lookup failed; checkout must not proceed.
    #[error("tax lookup failed")]
    Lookup(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// A customer address, as far as tax jurisdiction matching cares.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Address {
    /// ISO country code.
    pub country_code: String,
    /// State, province or other subdivision.
    pub subdivision: String,
    /// City name.
    pub city: String,
    /// Postal or zip code.
    pub postal_code: String,
}

/// The external tax-rate lookup collaborator.
///
/// Implementations must be idempotent given identical inputs; the engine
/// calls them once per shipment group and merges the returned results.
/// Failures are never caught here; they propagate so the caller can fail
/// checkout rather than proceed with incorrect tax data.
pub trait TaxLookup<'a> {
    /// Calculates taxes for `items` and folds them into `result`.
    ///
    /// `discount` is the pre-tax discount share owed by this group of items.
    ///
    /// # Errors
    ///
    /// Returns a [`TaxError`] when the lookup itself fails or when money
    /// arithmetic on the accumulated result fails.
    #[expect(clippy::too_many_arguments, reason = "mirror of the collaborator contract")]
    fn calculate_taxes_and_add_to_result(
        &self,
        result: TaxResult<'a>,
        store_code: &str,
        address: Option<&Address>,
        currency: &'a Currency,
        shipping_cost: &Money<'a, Currency>,
        items: &[LineItem<'a>],
        discount: &Money<'a, Currency>,
    ) -> Result<TaxResult<'a>, TaxError>;
}

/// Cumulative result of one or more tax calculations.
///
/// One instance accumulates the per-group partial results of a split
/// shipment into cart-level figures.
#[derive(Clone, Debug, PartialEq)]
pub struct TaxResult<'a> {
    currency: &'a Currency,
    tax_inclusive: bool,
    tax_values: FxHashMap<String, Money<'a, Currency>>,
    item_tax: FxHashMap<String, Money<'a, Currency>>,
    shipping_tax: Money<'a, Currency>,
    tax_in_item_price: Money<'a, Currency>,
    before_tax_subtotal: Money<'a, Currency>,
    before_tax_subtotal_without_discount: Money<'a, Currency>,
    before_tax_shipping_cost: Money<'a, Currency>,
}

impl<'a> TaxResult<'a> {
    /// Creates an empty, all-zero result in the given currency.
    #[must_use]
    pub fn new(currency: &'a Currency) -> Self {
        let zero = Money::from_minor(0, currency);
        TaxResult {
            currency,
            tax_inclusive: false,
            tax_values: FxHashMap::default(),
            item_tax: FxHashMap::default(),
            shipping_tax: zero,
            tax_in_item_price: zero,
            before_tax_subtotal: zero,
            before_tax_subtotal_without_discount: zero,
            before_tax_shipping_cost: zero,
        }
    }

    /// Returns the result currency.
    pub fn currency(&self) -> &'a Currency {
        self.currency
    }

    /// Whether taxes were calculated for a price-inclusive jurisdiction.
    pub fn is_tax_inclusive(&self) -> bool {
        self.tax_inclusive
    }

    /// Marks the pricing regime the taxes were calculated under.
    pub fn set_tax_inclusive(&mut self, tax_inclusive: bool) {
        self.tax_inclusive = tax_inclusive;
    }

    /// Adds tax under the named category, merging with any prior amount.
    ///
    /// # Errors
    ///
    /// Returns a money arithmetic error on currency mismatch.
    pub fn add_tax_value(
        &mut self,
        category: &str,
        amount: Money<'a, Currency>,
    ) -> Result<(), TaxError> {
        let merged = match self.tax_values.get(category) {
            Some(existing) => existing.add(amount)?,
            None => amount,
        };
        self.tax_values.insert(category.to_owned(), merged);
        Ok(())
    }

    /// Tax recorded under the named category, if any.
    pub fn tax_value(&self, category: &str) -> Option<&Money<'a, Currency>> {
        self.tax_values.get(category)
    }

    /// The category → tax amount map.
    pub fn tax_map(&self) -> &FxHashMap<String, Money<'a, Currency>> {
        &self.tax_values
    }

    /// Total of all per-category taxes.
    ///
    /// # Errors
    ///
    /// Returns a money arithmetic error on currency mismatch.
    pub fn total_taxes(&self) -> Result<Money<'a, Currency>, TaxError> {
        let mut total = Money::from_minor(0, self.currency);
        for amount in self.tax_values.values() {
            total = total.add(*amount)?;
        }
        Ok(total)
    }

    /// Records the tax amount for the line item with the given guid.
    pub fn add_item_tax(&mut self, item_guid: impl Into<String>, amount: Money<'a, Currency>) {
        self.item_tax.insert(item_guid.into(), amount);
    }

    /// Tax recorded for the line item with the given guid, if any.
    pub fn line_item_tax(&self, item_guid: &str) -> Option<&Money<'a, Currency>> {
        self.item_tax.get(item_guid)
    }

    /// Total of all per-line-item taxes.
    ///
    /// # Errors
    ///
    /// Returns a money arithmetic error on currency mismatch.
    pub fn total_item_tax(&self) -> Result<Money<'a, Currency>, TaxError> {
        let mut total = Money::from_minor(0, self.currency);
        for amount in self.item_tax.values() {
            total = total.add(*amount)?;
        }
        Ok(total)
    }

    /// Adds to the shipping tax.
    ///
    /// # Errors
    ///
    /// Returns a money arithmetic error on currency mismatch.
    pub fn add_shipping_tax(&mut self, amount: Money<'a, Currency>) -> Result<(), TaxError> {
        self.shipping_tax = self.shipping_tax.add(amount)?;
        Ok(())
    }

    /// The accumulated shipping tax.
    pub fn shipping_tax(&self) -> &Money<'a, Currency> {
        &self.shipping_tax
    }

    /// Adds to the tax already included in item prices (inclusive regimes).
    ///
    /// # Errors
    ///
    /// Returns a money arithmetic error on currency mismatch.
    pub fn add_to_tax_in_item_price(
        &mut self,
        amount: Money<'a, Currency>,
    ) -> Result<(), TaxError> {
        self.tax_in_item_price = self.tax_in_item_price.add(amount)?;
        Ok(())
    }

    /// Tax included in item prices so far.
    pub fn tax_in_item_price(&self) -> &Money<'a, Currency> {
        &self.tax_in_item_price
    }

    /// Adds one item's before-tax price to the subtotal.
    ///
    /// # Errors
    ///
    /// Returns a money arithmetic error on currency mismatch.
    pub fn add_before_tax_item_price(
        &mut self,
        amount: Money<'a, Currency>,
    ) -> Result<(), TaxError> {
        self.before_tax_subtotal = self.before_tax_subtotal.add(amount)?;
        Ok(())
    }

    /// The before-tax subtotal accumulated so far.
    pub fn before_tax_subtotal(&self) -> &Money<'a, Currency> {
        &self.before_tax_subtotal
    }

    /// Adds to the before-tax subtotal that ignores discounts.
    ///
    /// # Errors
    ///
    /// Returns a money arithmetic error on currency mismatch.
    pub fn add_before_tax_without_discount(
        &mut self,
        amount: Money<'a, Currency>,
    ) -> Result<(), TaxError> {
        self.before_tax_subtotal_without_discount =
            self.before_tax_subtotal_without_discount.add(amount)?;
        Ok(())
    }

    /// The before-tax subtotal ignoring discounts.
    pub fn before_tax_subtotal_without_discount(&self) -> &Money<'a, Currency> {
        &self.before_tax_subtotal_without_discount
    }

    /// Adds to the before-tax shipping cost.
    ///
    /// # Errors
    ///
    /// Returns a money arithmetic error on currency mismatch.
    pub fn add_before_tax_shipping_cost(
        &mut self,
        amount: Money<'a, Currency>,
    ) -> Result<(), TaxError> {
        self.before_tax_shipping_cost = self.before_tax_shipping_cost.add(amount)?;
        Ok(())
    }

    /// The before-tax shipping cost accumulated so far.
    pub fn before_tax_shipping_cost(&self) -> &Money<'a, Currency> {
        &self.before_tax_shipping_cost
    }

    /// The item subtotal: before-tax subtotal, plus the item taxes when the
    /// jurisdiction prices tax into items.
    ///
    /// # Errors
    ///
    /// Returns a money arithmetic error on currency mismatch.
    pub fn subtotal(&self) -> Result<Money<'a, Currency>, TaxError> {
        if self.tax_inclusive {
            Ok(self.before_tax_subtotal.add(self.total_item_tax()?)?)
        } else {
            Ok(self.before_tax_subtotal)
        }
    }

    /// Writes each line's tax contribution back onto the items.
    ///
    /// # Errors
    ///
    /// Returns [`TaxError::MissingLineItemTax`] if an item has no entry in
    /// this result; that indicates the item never went through a tax
    /// calculation and checkout must not proceed.
    pub fn apply_taxes(&self, items: &mut [LineItem<'a>]) -> Result<(), TaxError> {
        for item in items {
            let tax = self
                .item_tax
                .get(item.guid())
                .ok_or_else(|| TaxError::MissingLineItemTax(item.guid().to_owned()))?;
            item.set_tax(Decimal::new(tax.to_minor_units(), self.currency.exponent));
        }
        Ok(())
    }
}
