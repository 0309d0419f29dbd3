//! Fixtures
//!
//! Reusable line-item builders and collaborator stand-ins, shared by the
//! integration tests and by downstream experiments.

pub mod collaborators;
pub mod items;

pub use collaborators::{Firing, FixedBalances, FlatRateTaxLookup, ScriptedRuleFirer};
pub use items::{electronic_item, physical_item, split_cart, us_address};
