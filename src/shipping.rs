//! Shipping options

use rusty_money::{Money, iso::Currency};
use thiserror::Error;

/// Errors raised by shipping option selection.
#[derive(Debug, Error, PartialEq)]
pub enum ShippingError {
    /// Selection was attempted before any options were made available.
    #[error("no shipping options available; set the option list first")]
    NoOptionsAvailable,

    /// The requested option uid is not in the available list.
    #[error("unknown shipping option uid {0}")]
    UnknownOption(u64),
}

/// One shipping option offered to the cart, with its undiscounted cost.
#[derive(Clone, Debug, PartialEq)]
pub struct ShippingOption<'a> {
    uid: u64,
    code: String,
    cost: Money<'a, Currency>,
}

impl<'a> ShippingOption<'a> {
    /// Creates a shipping option.
    #[must_use]
    pub fn new(uid: u64, code: impl Into<String>, cost: Money<'a, Currency>) -> Self {
        ShippingOption {
            uid,
            code: code.into(),
            cost,
        }
    }

    /// Returns the unique identifier of this option.
    pub fn uid(&self) -> u64 {
        self.uid
    }

    /// Returns the carrier/service code of this option.
    pub fn code(&self) -> &str {
        &self.code
    }

    /// Returns the undiscounted cost of this option.
    pub fn cost(&self) -> &Money<'a, Currency> {
        &self.cost
    }
}

#[cfg(test)]
mod tests {
    use rusty_money::{Money, iso::USD};

    use super::*;

    #[test]
    fn accessors_return_fields() {
        let option = ShippingOption::new(3, "express", Money::from_minor(995, USD));

        assert_eq!(option.uid(), 3);
        assert_eq!(option.code(), "express");
        assert_eq!(option.cost(), &Money::from_minor(995, USD));
    }
}
