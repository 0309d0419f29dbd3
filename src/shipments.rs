//! Shipment splitting

use smallvec::SmallVec;
use thiserror::Error;

use crate::items::LineItem;

/// Errors raised while grouping cart lines into shipments.
#[derive(Debug, Error, PartialEq)]
pub enum ShipmentError {
    /// A bundle line reached classification; splitting expects leaves only.
    #[error("line {0} is a bundle; only leaf lines can be classified into shipments")]
    BundleLeaf(String),
}

/// A cart's leaf lines grouped by how they reach the customer.
///
/// Ephemeral: rebuilt on every tax calculation, never persisted.
#[derive(Debug, Default)]
pub struct ShipmentGroups<'a> {
    physical: SmallVec<[LineItem<'a>; 8]>,
    electronic: SmallVec<[LineItem<'a>; 8]>,
}

impl<'a> ShipmentGroups<'a> {
    /// Leaf lines whose SKUs require physical shipment.
    pub fn physical(&self) -> &[LineItem<'a>] {
        &self.physical
    }

    /// Leaf lines delivered electronically.
    pub fn electronic(&self) -> &[LineItem<'a>] {
        &self.electronic
    }

    /// Mutable access to the physical group, for tax write-back.
    pub fn physical_mut(&mut self) -> &mut [LineItem<'a>] {
        &mut self.physical
    }

    /// Mutable access to the electronic group, for tax write-back.
    pub fn electronic_mut(&mut self) -> &mut [LineItem<'a>] {
        &mut self.electronic
    }

    /// Whether the cart spans both physical and electronic shipments.
    pub fn is_split(&self) -> bool {
        !self.physical.is_empty() && !self.electronic.is_empty()
    }

    /// Whether neither group holds any lines.
    pub fn is_empty(&self) -> bool {
        self.physical.is_empty() && self.electronic.is_empty()
    }
}

/// Expands bundle lines into their leaf constituents, recursively.
///
/// Leaves are cloned out of the tree; the roots are left untouched.
#[must_use]
pub fn flatten<'a>(root_items: &[LineItem<'a>]) -> Vec<LineItem<'a>> {
    let mut leaves = Vec::new();
    collect_leaves(root_items, &mut leaves);
    leaves
}

fn collect_leaves<'a>(items: &[LineItem<'a>], leaves: &mut Vec<LineItem<'a>>) {
    for item in items {
        if item.is_bundle() {
            collect_leaves(item.constituents(), leaves);
        } else {
            leaves.push(item.clone());
        }
    }
}

/// Classifies flattened leaf lines into physical and electronic groups.
///
/// # Errors
///
/// Returns [`ShipmentError::BundleLeaf`] if a line still marked as a bundle
/// is encountered; the expansion invariant was violated upstream.
pub fn split<'a>(
    leaf_items: impl IntoIterator<Item = LineItem<'a>>,
) -> Result<ShipmentGroups<'a>, ShipmentError> {
    let mut groups = ShipmentGroups::default();
    for item in leaf_items {
        if item.is_bundle() {
            return Err(ShipmentError::BundleLeaf(item.guid().to_owned()));
        }
        if item.is_shippable() {
            groups.physical.push(item);
        } else {
            groups.electronic.push(item);
        }
    }
    Ok(groups)
}

/// Flattens bundle trees and classifies the resulting leaves.
///
/// # Errors
///
/// Returns [`ShipmentError::BundleLeaf`] if expansion produces a bundle leaf.
pub fn flatten_and_split<'a>(
    root_items: &[LineItem<'a>],
) -> Result<ShipmentGroups<'a>, ShipmentError> {
    split(flatten(root_items))
}
