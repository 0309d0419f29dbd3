//! Tally prelude.
//!
//! Convenience exports for common library consumers.

pub use crate::{
    apportion::{ApportionError, apportion_discount},
    cart::{Cart, CartError},
    certificates::{CertificateError, GiftCertificate, GiftCertificateBalance},
    coupons::{RuleAction, coupon_uses_required},
    items::LineItem,
    ledger::{DiscountKind, DiscountLedger, DiscountRecord, DiscountType},
    rules::{NoopRuleFirer, RuleFirer},
    shipments::{ShipmentError, ShipmentGroups, flatten, flatten_and_split, split},
    shipping::{ShippingError, ShippingOption},
    tax::{Address, TaxError, TaxLookup, TaxResult},
};
