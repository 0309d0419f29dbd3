//! Line item and cart builders

use rusty_money::{Money, iso};

use crate::{cart::Cart, items::LineItem, tax::Address};

/// A shippable leaf item priced in USD minor units.
#[must_use]
pub fn physical_item(guid: &str, price_minor: i64, quantity: u32) -> LineItem<'static> {
    LineItem::new(
        guid,
        format!("SKU-{guid}"),
        Money::from_minor(price_minor, iso::USD),
        quantity,
        true,
    )
}

/// An electronically delivered leaf item priced in USD minor units.
#[must_use]
pub fn electronic_item(guid: &str, price_minor: i64, quantity: u32) -> LineItem<'static> {
    LineItem::new(
        guid,
        format!("SKU-{guid}"),
        Money::from_minor(price_minor, iso::USD),
        quantity,
        false,
    )
}

/// A US address usable for either shipping or billing.
#[must_use]
pub fn us_address(city: &str) -> Address {
    Address {
        country_code: "US".to_owned(),
        subdivision: "CA".to_owned(),
        city: city.to_owned(),
        postal_code: "94016".to_owned(),
    }
}

/// A split-shipment cart: one $50 physical item and one $15 electronic item,
/// shipping and billing addresses set.
#[must_use]
pub fn split_cart() -> Cart<'static> {
    let mut cart = Cart::new(iso::USD, "store-1");
    cart.add_item(physical_item("phys-1", 5000, 1));
    cart.add_item(electronic_item("elec-1", 1500, 1));
    cart.set_shipping_address(Some(us_address("Shipville")));
    cart.set_billing_address(Some(us_address("Billtown")));
    cart
}
