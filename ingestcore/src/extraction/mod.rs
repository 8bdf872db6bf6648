//! Two-stage LLM extraction (§4.6, §4.7).

mod error;
mod repair;
mod stage1;
mod stage2;

pub use error::{ExtractionError, ExtractionResult};
pub use repair::repair_truncated_json;
pub use stage1::{run_stage1, Stage1Options};
pub use stage2::{run_stage2, select_schemas};
