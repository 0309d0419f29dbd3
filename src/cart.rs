//! The cart discount facade

use rust_decimal::{Decimal, RoundingStrategy, prelude::ToPrimitive};
use rustc_hash::{FxHashMap, FxHashSet};
use rusty_money::{Money, MoneyError, iso::Currency};
use thiserror::Error;
use tracing::warn;

use crate::{
    apportion::{ApportionError, apportion_discount},
    certificates::{CertificateError, GiftCertificate, GiftCertificateBalance},
    items::LineItem,
    ledger::{DiscountLedger, DiscountRecord, DiscountType},
    rules::RuleFirer,
    shipments::{self, ShipmentError},
    shipping::{ShippingError, ShippingOption},
    tax::{Address, TaxError, TaxLookup, TaxResult},
};

/// Errors surfaced by cart operations.
#[derive(Debug, Error)]
pub enum CartError {
    /// A discount amount below zero was supplied.
    #[error("discount amount cannot be negative")]
    NegativeDiscount,

    /// An amount could not be represented in the cart currency's minor units.
    #[error("amount cannot be represented in minor units")]
    AmountConversion,

    /// Wrapped shipping option selection error.
    #[error(transparent)]
    Shipping(#[from] ShippingError),

    /// Wrapped shipment splitting error.
    #[error(transparent)]
    Shipment(#[from] ShipmentError),

    /// Wrapped discount apportionment error.
    #[error(transparent)]
    Apportion(#[from] ApportionError),

    /// Wrapped tax calculation error.
    #[error(transparent)]
    Tax(#[from] TaxError),

    /// Wrapped money arithmetic error.
    #[error(transparent)]
    Money(#[from] MoneyError),

    /// Wrapped gift certificate error.
    #[error(transparent)]
    Certificate(#[from] CertificateError),
}

/// A shopping cart with discount bookkeeping and tax apportionment.
///
/// One cart is owned by one session; nothing here locks. All promotion state
/// (ledger, subtotal discount, applied rules) is cleared and rebuilt on every
/// [`Cart::fire_rules`] pass.
#[derive(Debug)]
pub struct Cart<'a> {
    currency: &'a Currency,
    store_code: String,
    items: Vec<LineItem<'a>>,
    shipping_address: Option<Address>,
    billing_address: Option<Address>,
    shipping_options: Vec<ShippingOption<'a>>,
    selected_shipping_option: Option<u64>,
    subtotal_discount: Decimal,
    ledger: DiscountLedger,
    exchange_order: bool,
    applied_gift_certificates: Vec<GiftCertificate>,
    applied_gift_certificate_total: Decimal,
    tax_result: TaxResult<'a>,
}

impl<'a> Cart<'a> {
    /// Creates an empty cart for the given store and currency.
    #[must_use]
    pub fn new(currency: &'a Currency, store_code: impl Into<String>) -> Self {
        Cart {
            currency,
            store_code: store_code.into(),
            items: Vec::new(),
            shipping_address: None,
            billing_address: None,
            shipping_options: Vec::new(),
            selected_shipping_option: None,
            subtotal_discount: Decimal::ZERO,
            ledger: DiscountLedger::new(),
            exchange_order: false,
            applied_gift_certificates: Vec::new(),
            applied_gift_certificate_total: Decimal::ZERO,
            tax_result: TaxResult::new(currency),
        }
    }

    /// Returns the cart currency.
    pub fn currency(&self) -> &'a Currency {
        self.currency
    }

    /// Returns the owning store's code.
    pub fn store_code(&self) -> &str {
        &self.store_code
    }

    /// Adds a root line item (leaf or bundle) to the cart.
    pub fn add_item(&mut self, item: LineItem<'a>) {
        self.items.push(item);
    }

    /// Returns the root line items.
    pub fn items(&self) -> &[LineItem<'a>] {
        &self.items
    }

    /// Sets the shipping address.
    pub fn set_shipping_address(&mut self, address: Option<Address>) {
        self.shipping_address = address;
    }

    /// Returns the shipping address, if set.
    pub fn shipping_address(&self) -> Option<&Address> {
        self.shipping_address.as_ref()
    }

    /// Sets the billing address.
    pub fn set_billing_address(&mut self, address: Option<Address>) {
        self.billing_address = address;
    }

    /// Returns the billing address, if set.
    pub fn billing_address(&self) -> Option<&Address> {
        self.billing_address.as_ref()
    }

    /// Whether this cart re-prices an exchange against an existing order.
    pub fn is_exchange_order(&self) -> bool {
        self.exchange_order
    }

    /// Flags this cart as an exchange-order cart.
    ///
    /// Exchange carts never receive discount write-backs; the original
    /// order's promotions were already applied once.
    pub fn set_exchange_order(&mut self, exchange_order: bool) {
        self.exchange_order = exchange_order;
    }

    /// Replaces the available shipping options.
    ///
    /// An empty list clears any selection; otherwise a selection that is no
    /// longer in the list falls back to the first option.
    pub fn set_shipping_options(&mut self, options: Vec<ShippingOption<'a>>) {
        self.shipping_options = options;
        let selection_valid = self
            .selected_shipping_option
            .is_some_and(|uid| self.shipping_options.iter().any(|o| o.uid() == uid));
        if !selection_valid {
            self.selected_shipping_option = self.shipping_options.first().map(ShippingOption::uid);
        }
    }

    /// Returns the available shipping options.
    pub fn shipping_options(&self) -> &[ShippingOption<'a>] {
        &self.shipping_options
    }

    /// Selects the shipping option with the given uid.
    ///
    /// # Errors
    ///
    /// - [`ShippingError::NoOptionsAvailable`]: the option list is empty.
    /// - [`ShippingError::UnknownOption`]: the uid is not in the list.
    pub fn set_selected_shipping_option_uid(&mut self, uid: u64) -> Result<(), CartError> {
        if self.shipping_options.is_empty() {
            return Err(ShippingError::NoOptionsAvailable.into());
        }
        if !self.shipping_options.iter().any(|o| o.uid() == uid) {
            return Err(ShippingError::UnknownOption(uid).into());
        }
        self.selected_shipping_option = Some(uid);
        Ok(())
    }

    /// Clears the shipping option selection.
    pub fn clear_selected_shipping_option(&mut self) {
        self.selected_shipping_option = None;
    }

    /// Returns the selected shipping option, if any.
    pub fn selected_shipping_option(&self) -> Option<&ShippingOption<'a>> {
        let uid = self.selected_shipping_option?;
        self.shipping_options.iter().find(|o| o.uid() == uid)
    }

    /// Whether any leaf item must be physically shipped.
    pub fn requires_shipping(&self) -> bool {
        shipments::flatten(&self.items)
            .iter()
            .any(LineItem::is_shippable)
    }

    /// The shipping cost charged to this cart: the selected option's cost
    /// net of any live shipping discount, floored at zero. Zero when nothing
    /// needs shipping or nothing is selected.
    ///
    /// # Errors
    ///
    /// Returns [`CartError::AmountConversion`] if the discount cannot be
    /// expressed in minor units.
    pub fn shipping_cost(&self) -> Result<Money<'a, Currency>, CartError> {
        if !self.requires_shipping() {
            return Ok(Money::from_minor(0, self.currency));
        }
        let Some(option) = self.selected_shipping_option() else {
            return Ok(Money::from_minor(0, self.currency));
        };

        let discount = self
            .ledger
            .live_record_of_type(DiscountType::Shipping)
            .map_or(Decimal::ZERO, DiscountRecord::amount);
        let cost_minor = option.cost().to_minor_units() - self.to_minor_units(discount)?;
        Ok(Money::from_minor(cost_minor.max(0), self.currency))
    }

    /// Applies a discount to the cart subtotal.
    ///
    /// Only the single biggest subtotal discount ever wins, independent of
    /// firing order: a smaller (or equal) amount is recorded as an
    /// already-superseded audit entry and changes nothing. Amounts larger
    /// than the subtotal are clamped to it. Exchange-order carts ignore the
    /// call entirely.
    ///
    /// # Errors
    ///
    /// Returns [`CartError::NegativeDiscount`] for an amount below zero.
    pub fn set_subtotal_discount(
        &mut self,
        amount: Decimal,
        rule_id: u64,
        action_id: u64,
    ) -> Result<(), CartError> {
        if amount < Decimal::ZERO {
            return Err(CartError::NegativeDiscount);
        }
        if self.exchange_order {
            return Ok(());
        }

        if amount <= self.subtotal_discount {
            self.record_superseded_subtotal(amount, rule_id, action_id);
            return Ok(());
        }

        let subtotal = self.subtotal()?;
        let mut actual = amount;
        if actual > subtotal {
            warn!(%amount, %subtotal, "subtotal discount clamped to subtotal");
            actual = subtotal;
            if actual.is_zero() {
                self.record_superseded_subtotal(amount, rule_id, action_id);
                return Ok(());
            }
        }

        self.ledger.supersede_all_of_type(DiscountType::Subtotal);
        self.ledger
            .record(rule_id, action_id, DiscountRecord::subtotal(actual));
        self.subtotal_discount = actual;
        Ok(())
    }

    /// Keeps the losing amount queryable without giving it any live effect.
    fn record_superseded_subtotal(&mut self, amount: Decimal, rule_id: u64, action_id: u64) {
        self.ledger.record(
            rule_id,
            action_id,
            DiscountRecord::subtotal(amount).superseded(),
        );
    }

    /// Records one application of an item-level discount rule.
    ///
    /// Re-firing the same `(rule, action)` accumulates the discounted
    /// quantity; the rule engine fires once per matching unit in the cart.
    /// Item discounts are not clamped here; the rule engine bounds them.
    pub fn rule_applied(
        &mut self,
        rule_id: u64,
        action_id: u64,
        item_guid: &str,
        amount: Decimal,
        quantity_applied_to: u32,
    ) {
        self.ledger
            .record_item_application(rule_id, action_id, item_guid, amount, quantity_applied_to);
    }

    /// Records a shipping discount rule firing.
    ///
    /// Unlike subtotal discounts, the newest firing always wins: the previous
    /// record is superseded and the new amount is recorded with no
    /// comparison. Shipping options are mutually exclusive per cart, so the
    /// latest selection's discount is the meaningful one.
    pub fn shipping_rule_applied(&mut self, rule_id: u64, action_id: u64, amount: Decimal) {
        self.ledger.mark_rule_applied(rule_id);
        self.ledger.supersede_all_of_type(DiscountType::Shipping);
        self.ledger
            .record(rule_id, action_id, DiscountRecord::shipping(amount));
    }

    /// The discount record produced by the given rule action, if any.
    pub fn get_discount_record_for_rule_and_action(
        &self,
        rule_id: u64,
        action_id: u64,
    ) -> Option<&DiscountRecord> {
        self.ledger.get(rule_id, action_id)
    }

    /// Rules that contributed at least one live discount this pass.
    pub fn applied_rules(&self) -> &FxHashSet<u64> {
        self.ledger.applied_rules()
    }

    /// Read access to the discount ledger.
    pub fn ledger(&self) -> &DiscountLedger {
        &self.ledger
    }

    /// The live subtotal discount amount.
    pub fn subtotal_discount(&self) -> Decimal {
        self.subtotal_discount
    }

    /// The live subtotal discount as money.
    ///
    /// # Errors
    ///
    /// Returns [`CartError::AmountConversion`] if the amount cannot be
    /// expressed in minor units.
    pub fn subtotal_discount_money(&self) -> Result<Money<'a, Currency>, CartError> {
        self.money_from_decimal(self.subtotal_discount)
    }

    /// Whether a subtotal discount is currently applied.
    pub fn has_subtotal_discount(&self) -> bool {
        self.subtotal_discount > Decimal::ZERO
    }

    /// Clears all promotion state and re-evaluates rules and taxes.
    ///
    /// Taxes are deliberately computed twice: once after item-level rules so
    /// subtotal rules see a priced cart, and again after subtotal rules so
    /// the subtotal discount is apportioned over final item discounts.
    /// Exchange carts skip rule firing and only refresh taxes.
    ///
    /// # Errors
    ///
    /// Propagates tax calculation and apportionment failures; checkout must
    /// not proceed past them.
    pub fn fire_rules(
        &mut self,
        engine: &dyn RuleFirer<'a>,
        tax_lookup: &dyn TaxLookup<'a>,
    ) -> Result<(), CartError> {
        if !self.exchange_order {
            self.clear_promotions();
            engine.fire_order_promotion_rules(self);
            self.update_tax_calculation_result(tax_lookup)?;
            engine.fire_order_promotion_subtotal_rules(self);
        }
        self.update_tax_calculation_result(tax_lookup)
    }

    fn clear_promotions(&mut self) {
        self.ledger.clear();
        self.subtotal_discount = Decimal::ZERO;
        clear_taxes(&mut self.items);
    }

    /// Recomputes the cart's tax result from the current items, addresses
    /// and discounts.
    ///
    /// Items are flattened and grouped into physical and electronic
    /// shipments. Only a split cart needs apportionment; otherwise the whole
    /// subtotal discount rides with the single non-empty group. The physical
    /// group is taxed at the shipping address with the cart's shipping cost;
    /// the electronic group at the billing address (shipping address as
    /// fallback) with zero shipping. An empty cart produces a zero result
    /// without consulting the collaborator.
    ///
    /// # Errors
    ///
    /// Propagates shipment splitting, apportionment and tax lookup failures.
    pub fn update_tax_calculation_result(
        &mut self,
        tax_lookup: &dyn TaxLookup<'a>,
    ) -> Result<(), CartError> {
        let mut result = TaxResult::new(self.currency);
        let mut groups = shipments::flatten_and_split(&self.items)?;
        if groups.is_empty() {
            self.tax_result = result;
            return Ok(());
        }

        let split = groups.is_split();
        let discount_money = self.subtotal_discount_money()?;
        let discount_by_item = if split {
            let leaves = shipments::flatten(&self.items);
            apportion_discount(&discount_money, &leaves)?
        } else {
            FxHashMap::default()
        };

        if !groups.physical().is_empty() {
            let share = if split {
                self.group_discount_share(&discount_by_item, groups.physical())?
            } else {
                discount_money
            };
            let shipping_cost = self.shipping_cost()?;
            result = tax_lookup.calculate_taxes_and_add_to_result(
                result,
                &self.store_code,
                self.shipping_address.as_ref(),
                self.currency,
                &shipping_cost,
                groups.physical(),
                &share,
            )?;
            result.apply_taxes(groups.physical_mut())?;
        }

        if !groups.electronic().is_empty() {
            let share = if split {
                self.group_discount_share(&discount_by_item, groups.electronic())?
            } else {
                discount_money
            };
            // Electronic goods are taxed at the purchaser's billing
            // jurisdiction, not a delivery jurisdiction, and never carry
            // shipping cost.
            let address = self
                .billing_address
                .as_ref()
                .or(self.shipping_address.as_ref());
            let zero = Money::from_minor(0, self.currency);
            result = tax_lookup.calculate_taxes_and_add_to_result(
                result,
                &self.store_code,
                address,
                self.currency,
                &zero,
                groups.electronic(),
                &share,
            )?;
            result.apply_taxes(groups.electronic_mut())?;
        }

        apply_known_taxes(&mut self.items, &result);
        self.tax_result = result;
        Ok(())
    }

    /// Sum of the apportioned shares owed by the items of one group.
    fn group_discount_share(
        &self,
        shares: &FxHashMap<String, Decimal>,
        items: &[LineItem<'a>],
    ) -> Result<Money<'a, Currency>, CartError> {
        let mut total = Decimal::ZERO;
        for item in items {
            if let Some(share) = shares.get(item.guid()) {
                total += *share;
            }
        }
        self.money_from_decimal(total)
    }

    /// The current merged tax calculation result.
    pub fn tax_result(&self) -> &TaxResult<'a> {
        &self.tax_result
    }

    /// Whether the "inclusive" tax calculation method is in use.
    pub fn is_tax_inclusive(&self) -> bool {
        self.tax_result.is_tax_inclusive()
    }

    /// The tax category → amount map from the last calculation.
    pub fn tax_map(&self) -> &FxHashMap<String, Money<'a, Currency>> {
        self.tax_result.tax_map()
    }

    /// The cart subtotal, from the last tax calculation.
    ///
    /// # Errors
    ///
    /// Returns a money arithmetic error on currency mismatch.
    pub fn subtotal(&self) -> Result<Decimal, CartError> {
        Ok(self.decimal_from_money(&self.tax_result.subtotal()?))
    }

    /// The cart subtotal as money.
    ///
    /// # Errors
    ///
    /// Returns a money arithmetic error on currency mismatch.
    pub fn subtotal_money(&self) -> Result<Money<'a, Currency>, CartError> {
        Ok(self.tax_result.subtotal()?)
    }

    /// The amount owed before gift certificates redeem against it.
    ///
    /// Tax-inclusive pricing already carries taxes inside the subtotal;
    /// tax-exclusive pricing adds them on top.
    ///
    /// # Errors
    ///
    /// Propagates money arithmetic and conversion failures.
    pub fn total_before_redeem(&self) -> Result<Decimal, CartError> {
        let subtotal = self.subtotal()?;
        let shipping = self.decimal_from_money(&self.shipping_cost()?);

        if self.tax_result.is_tax_inclusive() {
            Ok(subtotal - self.subtotal_discount + shipping)
        } else {
            let taxes = self.decimal_from_money(&self.tax_result.total_taxes()?);
            Ok(subtotal - self.subtotal_discount + shipping + taxes)
        }
    }

    /// The amount redeemed from applied gift certificates: never more than
    /// is owed.
    ///
    /// # Errors
    ///
    /// Propagates money arithmetic and conversion failures.
    pub fn gift_certificate_redeemed(&self) -> Result<Decimal, CartError> {
        let total_before_redeem = self.total_before_redeem()?;
        Ok(self.applied_gift_certificate_total.min(total_before_redeem))
    }

    /// The grand total after discounts, taxes, shipping and redemption.
    /// Never negative.
    ///
    /// # Errors
    ///
    /// Propagates money arithmetic and conversion failures.
    pub fn total(&self) -> Result<Decimal, CartError> {
        let total_before_redeem = self.total_before_redeem()?;
        if total_before_redeem <= Decimal::ZERO {
            return Ok(Decimal::ZERO);
        }
        let total = total_before_redeem - self.gift_certificate_redeemed()?;
        Ok(total.max(Decimal::ZERO))
    }

    /// The before-tax subtotal from the last calculation.
    pub fn before_tax_subtotal(&self) -> &Money<'a, Currency> {
        self.tax_result.before_tax_subtotal()
    }

    /// The amount owed before redemption, with all taxes stripped.
    ///
    /// # Errors
    ///
    /// Propagates money arithmetic and conversion failures.
    pub fn before_tax_total(&self) -> Result<Money<'a, Currency>, CartError> {
        let total = self.money_from_decimal(self.total_before_redeem()?)?;
        Ok(total.sub(self.tax_result.total_taxes()?)?)
    }

    /// Total quantity across the root line items.
    pub fn num_items(&self) -> u32 {
        self.items.iter().map(LineItem::quantity).sum()
    }

    /// Applies a gift certificate and recomputes the applied balance total.
    ///
    /// Applying the same certificate twice is idempotent.
    ///
    /// # Errors
    ///
    /// Returns [`CertificateError::ZeroBalance`] when the certificate has
    /// nothing left to redeem.
    pub fn apply_gift_certificate(
        &mut self,
        certificate: GiftCertificate,
        balances: &dyn GiftCertificateBalance,
    ) -> Result<(), CartError> {
        if balances.balance(&certificate) <= Decimal::ZERO {
            return Err(CertificateError::ZeroBalance(certificate.code().to_owned()).into());
        }
        if !self.applied_gift_certificates.contains(&certificate) {
            self.applied_gift_certificates.push(certificate);
        }
        self.recompute_applied_certificate_total(balances);
        Ok(())
    }

    /// The certificates currently applied to this cart.
    pub fn applied_gift_certificates(&self) -> &[GiftCertificate] {
        &self.applied_gift_certificates
    }

    /// Sum of the applied certificates' balances, as last computed.
    pub fn applied_gift_certificate_total(&self) -> Decimal {
        self.applied_gift_certificate_total
    }

    fn recompute_applied_certificate_total(&mut self, balances: &dyn GiftCertificateBalance) {
        self.applied_gift_certificate_total = self
            .applied_gift_certificates
            .iter()
            .map(|certificate| balances.balance(certificate))
            .sum();
    }

    /// Empties the cart after checkout: items, promotions, certificates and
    /// tax state all reset.
    pub fn clear_items(&mut self) {
        self.items.clear();
        self.clear_promotions();
        self.applied_gift_certificates.clear();
        self.applied_gift_certificate_total = Decimal::ZERO;
        self.tax_result = TaxResult::new(self.currency);
    }

    fn decimal_from_money(&self, money: &Money<'a, Currency>) -> Decimal {
        Decimal::new(money.to_minor_units(), self.currency.exponent)
    }

    fn money_from_decimal(&self, amount: Decimal) -> Result<Money<'a, Currency>, CartError> {
        Ok(Money::from_minor(
            self.to_minor_units(amount)?,
            self.currency,
        ))
    }

    fn to_minor_units(&self, amount: Decimal) -> Result<i64, CartError> {
        let scale = Decimal::from(10u64.pow(self.currency.exponent));
        (amount * scale)
            .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
            .to_i64()
            .ok_or(CartError::AmountConversion)
    }
}

/// Recursively clears tax write-backs across a line item tree.
fn clear_taxes(items: &mut [LineItem<'_>]) {
    for item in items {
        item.clear_tax();
        clear_taxes(item.constituents_mut());
    }
}

/// Writes per-item taxes from `result` onto every leaf that has an entry.
fn apply_known_taxes<'a>(items: &mut [LineItem<'a>], result: &TaxResult<'a>) {
    let scale = result.currency().exponent;
    for item in items {
        if item.is_bundle() {
            apply_known_taxes(item.constituents_mut(), result);
        } else if let Some(tax) = result.line_item_tax(item.guid()) {
            item.set_tax(Decimal::new(tax.to_minor_units(), scale));
        }
    }
}
