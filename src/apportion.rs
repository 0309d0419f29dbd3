//! Subtotal discount apportionment

use num_traits::FromPrimitive;
use rust_decimal::{Decimal, RoundingStrategy, prelude::ToPrimitive};
use rustc_hash::FxHashMap;
use rusty_money::{Money, iso::Currency};
use thiserror::Error;

use crate::items::LineItem;

/// Errors specific to discount apportionment.
#[derive(Debug, Error, PartialEq)]
pub enum ApportionError {
    /// The discount to distribute was negative.
    #[error("cannot apportion a negative discount")]
    NegativeDiscount,

    /// The discount exceeds the total extended price of the items.
    ///
    /// Callers clamp discounts to the subtotal before apportioning; a larger
    /// discount here is a programming error, not a pricing situation.
    #[error("discount exceeds the total price of the items being discounted")]
    ExceedsItemTotal,

    /// A proportional share could not be represented numerically.
    #[error("proportional share overflowed or was not representable")]
    ShareConversion,
}

/// Distributes `total_discount` across `items` proportionally to each item's
/// extended price, keyed by item guid.
///
/// The shares sum to `total_discount` exactly at the currency's minor-unit
/// scale: proportional division is rounded midpoint-away-from-zero, and the
/// rounding remainder is absorbed starting from the last item in iteration
/// order, cascading backwards. A share never goes negative and a zero-priced
/// item never absorbs remainder, so rounding cannot make a free item
/// non-free.
///
/// An empty item list or a zero discount yields an empty map.
///
/// # Errors
///
/// - [`ApportionError::NegativeDiscount`]: the discount was negative.
/// - [`ApportionError::ExceedsItemTotal`]: the discount is larger than the
///   sum of the items' extended prices.
/// - [`ApportionError::ShareConversion`]: a proportional share overflowed.
pub fn apportion_discount(
    total_discount: &Money<'_, Currency>,
    items: &[LineItem<'_>],
) -> Result<FxHashMap<String, Decimal>, ApportionError> {
    let discount_minor = total_discount.to_minor_units();
    if discount_minor < 0 {
        return Err(ApportionError::NegativeDiscount);
    }
    if items.is_empty() || discount_minor == 0 {
        return Ok(FxHashMap::default());
    }

    let total_minor: i64 = items
        .iter()
        .map(|item| item.extended_price().to_minor_units())
        .sum();
    if discount_minor > total_minor {
        return Err(ApportionError::ExceedsItemTotal);
    }

    let mut shares = proportional_shares(discount_minor, total_minor, items)?;
    let allocated: i64 = shares.iter().map(|(_, _, share)| share).sum();
    spread_remainder(discount_minor - allocated, &mut shares);

    let scale = total_discount.currency().exponent;
    Ok(shares
        .into_iter()
        .map(|(guid, _, share)| (guid, Decimal::new(share, scale)))
        .collect())
}

/// Rounded proportional share per item, as `(guid, extended price, share)`
/// in minor units.
fn proportional_shares(
    discount_minor: i64,
    total_minor: i64,
    items: &[LineItem<'_>],
) -> Result<Vec<(String, i64, i64)>, ApportionError> {
    let discount = decimal_from_minor(discount_minor)?;
    let total = decimal_from_minor(total_minor)?;

    items
        .iter()
        .map(|item| {
            let extended_minor = item.extended_price().to_minor_units();
            let extended = decimal_from_minor(extended_minor)?;

            let share = (discount * extended / total)
                .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
                .to_i64()
                .ok_or(ApportionError::ShareConversion)?;

            Ok((item.guid().to_owned(), extended_minor, share))
        })
        .collect()
}

/// Folds the rounding remainder into the shares, last item first, keeping
/// every share within `0..=extended_price`.
fn spread_remainder(mut remainder: i64, shares: &mut [(String, i64, i64)]) {
    for (_, extended_minor, share) in shares.iter_mut().rev() {
        if remainder == 0 {
            break;
        }
        // Free items keep a zero share no matter what the rounding error is.
        if *extended_minor == 0 {
            continue;
        }
        let adjusted = (*share + remainder).clamp(0, *extended_minor);
        remainder -= adjusted - *share;
        *share = adjusted;
    }
    debug_assert_eq!(remainder, 0, "remainder must be fully absorbed");
}

fn decimal_from_minor(minor: i64) -> Result<Decimal, ApportionError> {
    Decimal::from_i64(minor).ok_or(ApportionError::ShareConversion)
}
