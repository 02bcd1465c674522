//! Panel comparison core.
//!
//! The stages are layered bottom-up: [`fetcher`] retrieves one gene from
//! one release, [`resolver`] detects a panel's current release,
//! [`comparator`] diffs a gene between releases, [`aggregator`] orders
//! and summarises, and [`pipeline`] drives them end to end.

pub mod aggregator;
pub mod comparator;
pub mod fetcher;
pub mod pipeline;
pub mod resolver;

pub use aggregator::{aggregate, order_by_confidence};
pub use comparator::{diff, Callouts, DiffStatus, GeneDiff};
pub use fetcher::AnnotationFetcher;
pub use pipeline::{AnalysisRequest, Pipeline, PipelineSettings};
pub use resolver::VersionResolver;
