//! # OpenTelemetry SkyWalking Propagator
//!
//! Injects and extracts the [SkyWalking v3] cross-process headers:
//!
//! - `sw8` carries the trace context (sample flag, trace id, segment id,
//!   parent span id, plus segment fields OpenTelemetry has no equivalent
//!   for),
//! - `sw8-correlation` carries up to three baggage members as
//!   base64 `key:value` pairs,
//! - `sw8-x` carries the tracing mode and the sending timestamp.
//!
//! The tracing mode and timestamp travel in the [`Context`] through the
//! [`SkyWalkingContextExt`] accessors.
//!
//! ```
//! use opentelemetry::global;
//! use opentelemetry_skywalking_propagator::SkyWalkingPropagator;
//!
//! global::set_text_map_propagator(SkyWalkingPropagator::new());
//! ```
//!
//! [SkyWalking v3]: https://skywalking.apache.org/docs/main/latest/en/api/x-process-propagation-headers-v3/
//! [`Context`]: opentelemetry::Context
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

mod context;
mod propagator;

pub use context::SkyWalkingContextExt;
pub use propagator::SkyWalkingPropagator;
