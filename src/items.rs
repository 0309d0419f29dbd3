//! Line items

use rust_decimal::Decimal;
use rusty_money::{Money, iso::Currency};

/// One cart line: a quantity of a single SKU, or a bundle of nested lines.
///
/// Bundles are containers only; pricing, shipping classification and tax all
/// happen on the leaf lines produced by flattening.
#[derive(Clone, Debug, PartialEq)]
pub struct LineItem<'a> {
    guid: String,
    sku_code: String,
    unit_price: Money<'a, Currency>,
    quantity: u32,
    shippable: bool,
    bundle: bool,
    constituents: Vec<LineItem<'a>>,
    tax: Option<Decimal>,
}

impl<'a> LineItem<'a> {
    /// Creates a leaf line item.
    #[must_use]
    pub fn new(
        guid: impl Into<String>,
        sku_code: impl Into<String>,
        unit_price: Money<'a, Currency>,
        quantity: u32,
        shippable: bool,
    ) -> Self {
        LineItem {
            guid: guid.into(),
            sku_code: sku_code.into(),
            unit_price,
            quantity,
            shippable,
            bundle: false,
            constituents: Vec::new(),
            tax: None,
        }
    }

    /// Creates a bundle line grouping the given constituent lines.
    ///
    /// The bundle itself carries no price; its constituents do.
    #[must_use]
    pub fn bundle(
        guid: impl Into<String>,
        sku_code: impl Into<String>,
        currency: &'a Currency,
        constituents: Vec<LineItem<'a>>,
    ) -> Self {
        LineItem {
            guid: guid.into(),
            sku_code: sku_code.into(),
            unit_price: Money::from_minor(0, currency),
            quantity: 1,
            shippable: false,
            bundle: true,
            constituents,
            tax: None,
        }
    }

    /// Returns the unique identifier of this line.
    pub fn guid(&self) -> &str {
        &self.guid
    }

    /// Returns the SKU code of this line.
    pub fn sku_code(&self) -> &str {
        &self.sku_code
    }

    /// Returns the unit price of this line.
    pub fn unit_price(&self) -> &Money<'a, Currency> {
        &self.unit_price
    }

    /// Returns the quantity of this line.
    pub fn quantity(&self) -> u32 {
        self.quantity
    }

    /// Returns whether the underlying SKU requires physical shipment.
    pub fn is_shippable(&self) -> bool {
        self.shippable
    }

    /// Returns whether this line is a bundle of other lines.
    pub fn is_bundle(&self) -> bool {
        self.bundle
    }

    /// Returns the constituent lines of a bundle; empty for leaves.
    pub fn constituents(&self) -> &[LineItem<'a>] {
        &self.constituents
    }

    pub(crate) fn constituents_mut(&mut self) -> &mut [LineItem<'a>] {
        &mut self.constituents
    }

    /// Unit price multiplied by quantity.
    #[must_use]
    pub fn extended_price(&self) -> Money<'a, Currency> {
        Money::from_minor(
            self.unit_price.to_minor_units() * i64::from(self.quantity),
            self.unit_price.currency(),
        )
    }

    /// Returns the tax contribution assigned to this line, if any.
    pub fn tax(&self) -> Option<Decimal> {
        self.tax
    }

    /// Assigns this line's tax contribution.
    pub fn set_tax(&mut self, tax: Decimal) {
        self.tax = Some(tax);
    }

    /// Clears any tax contribution assigned to this line.
    pub fn clear_tax(&mut self) {
        self.tax = None;
    }
}
