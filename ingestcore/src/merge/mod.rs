//! Result Selector / Merger (§4.8).

mod selector;

pub use selector::{default_domain_priority, merge_results, ExtractedResult, MergeInfo, MergedResult, Source, SourceRole};
