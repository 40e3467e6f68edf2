//! Pipeline definition loading and validation
//!
//! A crawler is configured by one YAML file describing its schedule, its
//! aggregator, and the named stage graph under `pipeline:`. Loading is eager:
//! a malformed definition fails here, never at dispatch time.

mod parser;
mod types;
mod validation;

pub use parser::{compute_config_hash, load_pipeline, load_pipeline_with_hash};
pub use types::{AggregatorConfig, PipelineConfig, Schedule, StageConfig};
pub use validation::validate;
