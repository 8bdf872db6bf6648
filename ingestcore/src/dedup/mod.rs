//! Duplicate Detection (§4.9): in-batch cascade, tiered entity matching,
//! fuzzy name matching, and cross-source matching against persisted incidents.

mod cross_source;
mod entity_match;
mod fuzzy;
mod in_batch;

pub use cross_source::{find_duplicate, prefilter_candidates, CrossSourceMatch, CrossSourceStrategy, IncidentCandidate};
pub use entity_match::{match_entities, EntityFields, EntityMatchResult};
pub use fuzzy::fuzzy_name_match;
pub use in_batch::{detect_duplicate, BatchArticle, DuplicateMatch, DuplicateStrategy};
