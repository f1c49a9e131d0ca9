//! Cascading business configuration.
//!
//! Values are stored as strings per scope (global or branch) and typed on
//! read. Resolution walks an ordered list of [`RuleSource`]s, first match
//! wins, ending with the hard-coded defaults.

pub mod key;
pub mod resolve;
pub mod value;

pub use key::RuleKey;
pub use resolve::{BusinessRules, Defaults, EffectiveRule, RuleChain, RuleEntry, RuleOrigin, RuleSource, StoredRules};
pub use value::RuleValue;
