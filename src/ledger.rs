//! Discount records and the per-cart discount ledger

use std::collections::hash_map::Entry;

use rust_decimal::Decimal;
use rustc_hash::{FxHashMap, FxHashSet};

/// What a promotional discount was applied to.
#[derive(Clone, Debug, PartialEq)]
pub enum DiscountKind {
    /// A discount applied to some quantity of a specific line item.
    Item {
        /// Guid of the discounted line item.
        item_guid: String,
        /// How many units of the item the discount covered so far.
        quantity_applied_to: u32,
    },

    /// A discount applied to the cart subtotal as a whole.
    Subtotal,

    /// A discount applied to the selected shipping cost.
    Shipping,
}

/// Fieldless tag for [`DiscountKind`], used for supersede-by-type dispatch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DiscountType {
    /// Item-level discount.
    Item,
    /// Subtotal-level discount.
    Subtotal,
    /// Shipping-level discount.
    Shipping,
}

/// One recorded discount instance.
///
/// A superseded record no longer contributes to totals or coupon counting;
/// it is kept for audit and lookup only.
#[derive(Clone, Debug, PartialEq)]
pub struct DiscountRecord {
    amount: Decimal,
    superseded: bool,
    kind: DiscountKind,
}

impl DiscountRecord {
    /// Creates a live item discount record.
    #[must_use]
    pub fn item(item_guid: impl Into<String>, amount: Decimal, quantity_applied_to: u32) -> Self {
        DiscountRecord {
            amount,
            superseded: false,
            kind: DiscountKind::Item {
                item_guid: item_guid.into(),
                quantity_applied_to,
            },
        }
    }

    /// Creates a live subtotal discount record.
    #[must_use]
    pub fn subtotal(amount: Decimal) -> Self {
        DiscountRecord {
            amount,
            superseded: false,
            kind: DiscountKind::Subtotal,
        }
    }

    /// Creates a live shipping discount record.
    #[must_use]
    pub fn shipping(amount: Decimal) -> Self {
        DiscountRecord {
            amount,
            superseded: false,
            kind: DiscountKind::Shipping,
        }
    }

    /// Returns this record marked as superseded on arrival.
    #[must_use]
    pub fn superseded(mut self) -> Self {
        self.superseded = true;
        self
    }

    /// Returns the discount amount.
    pub fn amount(&self) -> Decimal {
        self.amount
    }

    /// Returns whether a newer discount has replaced this one.
    pub fn is_superseded(&self) -> bool {
        self.superseded
    }

    /// Returns what the discount was applied to.
    pub fn kind(&self) -> &DiscountKind {
        &self.kind
    }

    /// Returns the type tag of this record.
    pub fn discount_type(&self) -> DiscountType {
        match self.kind {
            DiscountKind::Item { .. } => DiscountType::Item,
            DiscountKind::Subtotal => DiscountType::Subtotal,
            DiscountKind::Shipping => DiscountType::Shipping,
        }
    }

    /// Quantity covered by an item discount; `None` for other kinds.
    pub fn quantity_applied_to(&self) -> Option<u32> {
        match &self.kind {
            DiscountKind::Item {
                quantity_applied_to,
                ..
            } => Some(*quantity_applied_to),
            DiscountKind::Subtotal | DiscountKind::Shipping => None,
        }
    }

    fn mark_superseded(&mut self) {
        self.superseded = true;
    }
}

/// Maps `(rule id, action id)` to the discount that rule action produced.
///
/// The ledger is cleared and rebuilt on every rule-firing pass; it carries no
/// state across evaluations.
#[derive(Debug, Default)]
pub struct DiscountLedger {
    records: FxHashMap<u64, FxHashMap<u64, DiscountRecord>>,
    applied_rules: FxHashSet<u64>,
}

impl DiscountLedger {
    /// Creates an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        DiscountLedger::default()
    }

    /// Inserts or replaces the record at `(rule_id, action_id)`.
    ///
    /// The rule joins the applied set unless the record arrives already
    /// superseded.
    pub fn record(&mut self, rule_id: u64, action_id: u64, record: DiscountRecord) {
        if !record.is_superseded() {
            self.applied_rules.insert(rule_id);
        }
        self.records
            .entry(rule_id)
            .or_default()
            .insert(action_id, record);
    }

    /// Records one item-discount application for `(rule_id, action_id)`.
    ///
    /// The first application inserts a fresh record; repeated applications to
    /// the same rule action accumulate `quantity_applied_to` rather than
    /// replacing the amount. A non-item record already at the pair is left
    /// untouched.
    pub fn record_item_application(
        &mut self,
        rule_id: u64,
        action_id: u64,
        item_guid: &str,
        amount: Decimal,
        quantity_applied_to: u32,
    ) {
        self.applied_rules.insert(rule_id);

        let actions = self.records.entry(rule_id).or_default();
        match actions.entry(action_id) {
            Entry::Vacant(entry) => {
                entry.insert(DiscountRecord::item(item_guid, amount, quantity_applied_to));
            }
            Entry::Occupied(mut entry) => {
                if let DiscountKind::Item {
                    quantity_applied_to: existing,
                    ..
                } = &mut entry.get_mut().kind
                {
                    *existing += quantity_applied_to;
                }
            }
        }
    }

    /// Marks every live record of the given type as superseded.
    ///
    /// This is a global pass over the whole ledger, not scoped to one rule:
    /// only one subtotal (or shipping) discount may win across the cart, and
    /// rule-engine conflict resolution is not assumed to have enforced that.
    pub fn supersede_all_of_type(&mut self, discount_type: DiscountType) {
        for actions in self.records.values_mut() {
            for record in actions.values_mut() {
                if record.discount_type() == discount_type {
                    record.mark_superseded();
                }
            }
        }
    }

    /// Returns the record at `(rule_id, action_id)`, if any.
    pub fn get(&self, rule_id: u64, action_id: u64) -> Option<&DiscountRecord> {
        self.records.get(&rule_id)?.get(&action_id)
    }

    /// Returns the live record of the given type, if one exists.
    pub fn live_record_of_type(&self, discount_type: DiscountType) -> Option<&DiscountRecord> {
        self.records().find_map(|(_, _, record)| {
            (!record.is_superseded() && record.discount_type() == discount_type).then_some(record)
        })
    }

    /// Iterates every `(rule_id, action_id, record)` entry.
    pub fn records(&self) -> impl Iterator<Item = (u64, u64, &DiscountRecord)> {
        self.records.iter().flat_map(|(rule_id, actions)| {
            actions
                .iter()
                .map(move |(action_id, record)| (*rule_id, *action_id, record))
        })
    }

    /// Rules that contributed at least one live discount this pass.
    pub fn applied_rules(&self) -> &FxHashSet<u64> {
        &self.applied_rules
    }

    /// Adds a rule to the applied set without touching records.
    pub(crate) fn mark_rule_applied(&mut self, rule_id: u64) {
        self.applied_rules.insert(rule_id);
    }

    /// Empties the ledger and the applied-rule set.
    pub fn clear(&mut self) {
        self.records.clear();
        self.applied_rules.clear();
    }
}
