//! Integration tests for split-shipment tax orchestration and totals.
//!
//! A cart spanning physical and electronic items is taxed per group: the
//! physical group at the shipping address with the cart's shipping cost, the
//! electronic group at the billing address (falling back to the shipping
//! address) with zero shipping. The subtotal discount is apportioned across
//! the groups only when the cart is actually split.

use std::cell::RefCell;

use rust_decimal::Decimal;
use rusty_money::{
    Money,
    iso::{Currency, USD},
};
use testresult::TestResult;

use tally::{
    cart::{Cart, CartError},
    certificates::{CertificateError, GiftCertificate},
    fixtures::{
        Firing, FixedBalances, FlatRateTaxLookup, ScriptedRuleFirer, electronic_item,
        physical_item, split_cart, us_address,
    },
    items::LineItem,
    rules::NoopRuleFirer,
    shipping::ShippingOption,
    tax::{Address, TaxError, TaxLookup, TaxResult},
};

fn dollars(major: i64) -> Decimal {
    Decimal::new(major * 100, 2)
}

fn ten_percent_exclusive() -> FlatRateTaxLookup {
    FlatRateTaxLookup::exclusive(Decimal::new(10, 2))
}

fn ten_percent_inclusive() -> FlatRateTaxLookup {
    FlatRateTaxLookup::inclusive(Decimal::new(10, 2))
}

fn thirteen_dollar_subtotal_rule() -> ScriptedRuleFirer {
    ScriptedRuleFirer::subtotal_only(vec![Firing::Subtotal {
        rule_id: 1,
        action_id: 1,
        amount: dollars(13),
    }])
}

/// One observed call into the tax collaborator.
#[derive(Clone, Debug)]
struct Call {
    address_city: Option<String>,
    shipping_cost_minor: i64,
    discount_minor: i64,
    item_guids: Vec<String>,
}

/// Wraps a [`FlatRateTaxLookup`] and records every call made to it.
struct RecordingTaxLookup {
    inner: FlatRateTaxLookup,
    calls: RefCell<Vec<Call>>,
}

impl RecordingTaxLookup {
    fn new(inner: FlatRateTaxLookup) -> Self {
        RecordingTaxLookup {
            inner,
            calls: RefCell::new(Vec::new()),
        }
    }

    fn calls(&self) -> Vec<Call> {
        self.calls.borrow().clone()
    }
}

impl<'a> TaxLookup<'a> for RecordingTaxLookup {
    fn calculate_taxes_and_add_to_result(
        &self,
        result: TaxResult<'a>,
        store_code: &str,
        address: Option<&Address>,
        currency: &'a Currency,
        shipping_cost: &Money<'a, Currency>,
        items: &[LineItem<'a>],
        discount: &Money<'a, Currency>,
    ) -> Result<TaxResult<'a>, TaxError> {
        self.calls.borrow_mut().push(Call {
            address_city: address.map(|a| a.city.clone()),
            shipping_cost_minor: shipping_cost.to_minor_units(),
            discount_minor: discount.to_minor_units(),
            item_guids: items.iter().map(|item| item.guid().to_owned()).collect(),
        });
        self.inner.calculate_taxes_and_add_to_result(
            result,
            store_code,
            address,
            currency,
            shipping_cost,
            items,
            discount,
        )
    }
}

/// A lookup that never records per-item taxes; applying its result fails.
struct ForgetfulTaxLookup;

impl<'a> TaxLookup<'a> for ForgetfulTaxLookup {
    fn calculate_taxes_and_add_to_result(
        &self,
        result: TaxResult<'a>,
        _store_code: &str,
        _address: Option<&Address>,
        _currency: &'a Currency,
        _shipping_cost: &Money<'a, Currency>,
        _items: &[LineItem<'a>],
        _discount: &Money<'a, Currency>,
    ) -> Result<TaxResult<'a>, TaxError> {
        Ok(result)
    }
}

#[test]
fn split_cart_apportions_discount_across_groups() -> TestResult {
    let mut cart = split_cart();
    let lookup = RecordingTaxLookup::new(ten_percent_exclusive());

    cart.fire_rules(&thirteen_dollar_subtotal_rule(), &lookup)?;

    assert_eq!(cart.subtotal_discount(), dollars(13));

    // Two passes of two groups each; the last two calls carry the final
    // apportioned shares: $10 of the $13 to the $50 physical item, $3 to
    // the $15 electronic item.
    let calls = lookup.calls();
    assert_eq!(calls.len(), 4);

    let physical = calls.get(2);
    assert_eq!(physical.map(|c| c.discount_minor), Some(1000));
    assert_eq!(
        physical.map(|c| c.item_guids.clone()),
        Some(vec!["phys-1".to_owned()])
    );
    assert_eq!(
        physical.and_then(|c| c.address_city.clone()),
        Some("Shipville".to_owned())
    );

    let electronic = calls.get(3);
    assert_eq!(electronic.map(|c| c.discount_minor), Some(300));
    assert_eq!(
        electronic.and_then(|c| c.address_city.clone()),
        Some("Billtown".to_owned())
    );
    // Electronic items never carry shipping cost.
    assert_eq!(electronic.map(|c| c.shipping_cost_minor), Some(0));

    Ok(())
}

#[test]
fn split_cart_exclusive_totals_add_taxes_on_top() -> TestResult {
    let mut cart = split_cart();

    cart.fire_rules(&thirteen_dollar_subtotal_rule(), &ten_percent_exclusive())?;

    // Taxes on discounted prices: (50-10) * 10% + (15-3) * 10% = 5.20.
    assert_eq!(
        cart.tax_result().total_taxes()?,
        Money::from_minor(520, USD)
    );
    assert_eq!(cart.subtotal()?, dollars(65));
    assert_eq!(cart.total_before_redeem()?, Decimal::new(5720, 2));
    assert_eq!(cart.total()?, Decimal::new(5720, 2));

    // Each concrete line item knows its own tax contribution.
    let taxes: Vec<Option<Decimal>> = cart.items().iter().map(LineItem::tax).collect();
    assert_eq!(
        taxes,
        vec![Some(Decimal::new(400, 2)), Some(Decimal::new(120, 2))]
    );

    Ok(())
}

#[test]
fn split_cart_inclusive_totals_keep_taxes_inside_prices() -> TestResult {
    let mut cart = split_cart();

    cart.fire_rules(&thirteen_dollar_subtotal_rule(), &ten_percent_inclusive())?;

    assert!(cart.is_tax_inclusive());
    // Inclusive prices already contain tax, so the subtotal is unchanged
    // and the total does not add taxes on top.
    assert_eq!(cart.subtotal()?, dollars(65));
    assert_eq!(cart.total_before_redeem()?, dollars(52));
    assert_eq!(cart.total()?, dollars(52));

    Ok(())
}

#[test]
fn electronic_group_falls_back_to_shipping_address() -> TestResult {
    let mut cart = Cart::new(USD, "store-1");
    cart.add_item(electronic_item("elec-1", 1500, 1));
    cart.set_shipping_address(Some(us_address("Shipville")));
    // No billing address set.

    let lookup = RecordingTaxLookup::new(ten_percent_exclusive());
    cart.update_tax_calculation_result(&lookup)?;

    let calls = lookup.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(
        calls.first().and_then(|c| c.address_city.clone()),
        Some("Shipville".to_owned())
    );

    Ok(())
}

#[test]
fn empty_cart_never_calls_the_collaborator() -> TestResult {
    let mut cart = Cart::new(USD, "store-1");
    let lookup = RecordingTaxLookup::new(ten_percent_exclusive());

    cart.update_tax_calculation_result(&lookup)?;

    assert!(lookup.calls().is_empty());
    assert_eq!(
        cart.tax_result().total_taxes()?,
        Money::from_minor(0, USD)
    );
    assert_eq!(cart.total()?, Decimal::ZERO);

    Ok(())
}

#[test]
fn unsplit_cart_passes_the_whole_discount_unapportioned() -> TestResult {
    let mut cart = Cart::new(USD, "store-1");
    cart.add_item(physical_item("phys-1", 5000, 1));
    cart.add_item(physical_item("phys-2", 1500, 1));
    cart.set_shipping_address(Some(us_address("Shipville")));

    let lookup = RecordingTaxLookup::new(ten_percent_exclusive());
    cart.fire_rules(&thirteen_dollar_subtotal_rule(), &lookup)?;

    let calls = lookup.calls();
    assert_eq!(calls.len(), 2);
    // Single group: the full discount rides with it as one block.
    assert_eq!(calls.get(1).map(|c| c.discount_minor), Some(1300));

    Ok(())
}

#[test]
fn shipping_cost_and_its_tax_flow_into_totals() -> TestResult {
    let mut cart = split_cart();
    cart.set_shipping_options(vec![ShippingOption::new(
        1,
        "ground",
        Money::from_minor(500, USD),
    )]);

    cart.fire_rules(&thirteen_dollar_subtotal_rule(), &ten_percent_exclusive())?;

    // Item taxes 5.20 plus 0.50 shipping tax.
    assert_eq!(
        cart.tax_result().total_taxes()?,
        Money::from_minor(570, USD)
    );
    assert_eq!(
        cart.tax_result().shipping_tax(),
        &Money::from_minor(50, USD)
    );
    // 65 - 13 + 5 + 5.70
    assert_eq!(cart.total_before_redeem()?, Decimal::new(6270, 2));

    Ok(())
}

#[test]
fn refiring_rules_is_idempotent() -> TestResult {
    let mut cart = split_cart();
    let firer = thirteen_dollar_subtotal_rule();
    let lookup = ten_percent_exclusive();

    cart.fire_rules(&firer, &lookup)?;
    let first_total = cart.total()?;
    let first_records = cart.ledger().records().count();

    cart.fire_rules(&firer, &lookup)?;

    assert_eq!(cart.total()?, first_total);
    assert_eq!(cart.ledger().records().count(), first_records);
    assert_eq!(cart.subtotal_discount(), dollars(13));

    Ok(())
}

#[test]
fn gift_certificates_never_redeem_more_than_is_owed() -> TestResult {
    let mut cart = split_cart();
    cart.fire_rules(&thirteen_dollar_subtotal_rule(), &ten_percent_inclusive())?;

    let balances = FixedBalances::default().with("GC-1", dollars(100));
    cart.apply_gift_certificate(GiftCertificate::new("GC-1"), &balances)?;

    // Owed $52; the $100 certificate redeems only $52 and the total floors
    // at zero.
    assert_eq!(cart.gift_certificate_redeemed()?, dollars(52));
    assert_eq!(cart.total()?, Decimal::ZERO);

    Ok(())
}

#[test]
fn zero_total_before_redeem_floors_the_total_at_zero() -> TestResult {
    let mut cart = split_cart();
    // Discount the entire subtotal away under inclusive pricing: owed == 0.
    let firer = ScriptedRuleFirer::subtotal_only(vec![Firing::Subtotal {
        rule_id: 1,
        action_id: 1,
        amount: dollars(65),
    }]);
    cart.fire_rules(&firer, &ten_percent_inclusive())?;

    let balances = FixedBalances::default().with("GC-1", dollars(40));
    cart.apply_gift_certificate(GiftCertificate::new("GC-1"), &balances)?;

    assert_eq!(cart.total_before_redeem()?, Decimal::ZERO);
    assert_eq!(cart.total()?, Decimal::ZERO);

    Ok(())
}

#[test]
fn duplicate_certificate_application_is_idempotent() -> TestResult {
    let mut cart = split_cart();
    cart.fire_rules(&NoopRuleFirer, &ten_percent_exclusive())?;

    let balances = FixedBalances::default().with("GC-1", dollars(20));
    cart.apply_gift_certificate(GiftCertificate::new("GC-1"), &balances)?;
    cart.apply_gift_certificate(GiftCertificate::new("GC-1"), &balances)?;

    assert_eq!(cart.applied_gift_certificates().len(), 1);
    assert_eq!(cart.applied_gift_certificate_total(), dollars(20));

    Ok(())
}

#[test]
fn zero_balance_certificate_is_rejected() {
    let mut cart = split_cart();
    let balances = FixedBalances::default();

    let result = cart.apply_gift_certificate(GiftCertificate::new("GC-empty"), &balances);

    assert!(matches!(
        result,
        Err(CartError::Certificate(CertificateError::ZeroBalance(code))) if code == "GC-empty"
    ));
}

#[test]
fn missing_line_item_tax_fails_the_calculation() {
    let mut cart = split_cart();

    let result = cart.update_tax_calculation_result(&ForgetfulTaxLookup);

    assert!(matches!(
        result,
        Err(CartError::Tax(TaxError::MissingLineItemTax(_)))
    ));
}

#[test]
fn exchange_cart_still_refreshes_taxes_without_firing_rules() -> TestResult {
    let mut cart = split_cart();
    cart.set_exchange_order(true);

    let lookup = RecordingTaxLookup::new(ten_percent_exclusive());
    cart.fire_rules(&thirteen_dollar_subtotal_rule(), &lookup)?;

    // One refresh pass only, and no discount was written back.
    assert_eq!(lookup.calls().len(), 2);
    assert_eq!(cart.subtotal_discount(), Decimal::ZERO);
    assert_eq!(cart.subtotal()?, dollars(65));

    Ok(())
}
