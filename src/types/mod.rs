pub mod context;
pub mod error;

pub use context::{ContextFragment, ContextGraph};
pub use error::{
    ErrorClassifier, ErrorKind, LlmError, PlanwrightError, Result, ResultExt,
    parse_retry_after_hint,
};
