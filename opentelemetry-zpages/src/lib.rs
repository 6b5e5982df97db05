//! zPages implementation for OpenTelemetry
//!
//! # Overview
//! zPages are an in-process alternative to external processors: recently
//! completed and currently running spans are sampled into a fixed-capacity
//! store, grouped by span name, latency bucket, and error status, and
//! served as an HTML page.
//!
//! Register a [`ZPagesSpanProcessor`] on a tracer provider and route an
//! endpoint (conventionally `/tracez`) to a [`TracezHandler`]:
//!
//! ```no_run
//! use opentelemetry_sdk::trace::TracerProvider;
//! use opentelemetry_zpages::{TracezHandler, ZPagesSpanProcessor};
//!
//! let processor = ZPagesSpanProcessor::new();
//! let handler = TracezHandler::new(&processor);
//! let provider = TracerProvider::builder()
//!     .with_span_processor(processor)
//!     .build();
//! // Serve `handler.handle(&request)` from the HTTP framework of your
//! // choice, and install `provider` as usual.
//! # drop((handler, provider));
//! ```
#![warn(
    future_incompatible,
    missing_debug_implementations,
    missing_docs,
    nonstandard_style,
    rust_2018_idioms,
    unreachable_pub,
    unused
)]
#![cfg_attr(docsrs, feature(doc_cfg), deny(rustdoc::broken_intra_doc_links))]
#![doc(
    html_logo_url = "https://raw.githubusercontent.com/open-telemetry/opentelemetry-rust/main/assets/logo.svg"
)]

mod trace;
mod tracez;

pub use trace::{
    LatencyBoundaries, SpanAggregator, SpanStats, ZPagesSpanProcessor, ZPagesSpanProcessorBuilder,
};
pub use tracez::TracezHandler;
