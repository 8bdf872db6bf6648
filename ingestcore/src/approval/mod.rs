//! Approval Decider (§4.10): turns a scored, merged extraction into an
//! auto_approve / auto_reject / needs_review decision.

mod decider;

pub use decider::{decide, resolve_required_fields_for, CategoryConfig, Decision, DecideInput, DecisionResult};
