//! # Tracez span store

mod aggregator;
mod bucket;
mod span_processor;

pub use aggregator::{SpanAggregator, SpanStats};
pub use bucket::LatencyBoundaries;
pub use span_processor::{ZPagesSpanProcessor, ZPagesSpanProcessorBuilder};
