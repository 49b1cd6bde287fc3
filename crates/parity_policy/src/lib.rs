//! PARITY Policy
//!
//! Declarative rule tables deciding which requests are replayed and which
//! divergences are accepted. Tables are plain serde data so deployments can
//! extend them from configuration.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod matcher;
pub mod rules;
pub mod skip;

pub use matcher::{is_empty_json, Candidate, RulePredicate};
pub use rules::{ExclusionPolicy, ExclusionRule, PolicyError, RuleAction};
pub use skip::{SkipDecision, SkipPolicy, SkipPredicate, SkipRule};
