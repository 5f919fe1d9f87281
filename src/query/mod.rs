pub mod advisor;
pub mod classify;
pub mod normalize;

pub use advisor::{Optimization, QueryAdvisor};
pub use classify::{categorize, suggest_correction, Diagnosis, ErrorCategory};
pub use normalize::{normalize_whitespace, shape_signature, truncate_query};
