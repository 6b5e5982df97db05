//! # Tracez span processor

use std::sync::Arc;

use opentelemetry::{trace::TraceResult, Context};
use opentelemetry_sdk::export::trace::SpanData;
use opentelemetry_sdk::trace::{Span, SpanProcessor};

use super::aggregator::SpanAggregator;
use super::bucket::{LatencyBoundaries, DEFAULT_BUCKET_CAPACITY};

/// A [`SpanProcessor`] that feeds the tracez sample store.
///
/// Register it on a tracer provider and hand it to a
/// [`TracezHandler`](crate::TracezHandler) to serve the collected samples.
/// Both callbacks are a single short critical section; neither blocks on
/// I/O.
///
/// ```no_run
/// use opentelemetry_sdk::trace::TracerProvider;
/// use opentelemetry_zpages::{TracezHandler, ZPagesSpanProcessor};
///
/// let processor = ZPagesSpanProcessor::new();
/// let handler = TracezHandler::new(&processor);
/// let provider = TracerProvider::builder()
///     .with_span_processor(processor)
///     .build();
/// # drop((handler, provider));
/// ```
#[derive(Clone, Debug)]
pub struct ZPagesSpanProcessor {
    aggregator: Arc<SpanAggregator>,
}

impl Default for ZPagesSpanProcessor {
    fn default() -> Self {
        ZPagesSpanProcessor::new()
    }
}

impl ZPagesSpanProcessor {
    /// Create a processor with the default latency boundaries and bucket
    /// capacity.
    pub fn new() -> Self {
        ZPagesSpanProcessor::builder().build()
    }

    /// Start configuring a processor.
    pub fn builder() -> ZPagesSpanProcessorBuilder {
        ZPagesSpanProcessorBuilder {
            boundaries: LatencyBoundaries::default(),
            bucket_capacity: DEFAULT_BUCKET_CAPACITY,
        }
    }

    /// The sample store this processor writes to.
    pub fn aggregator(&self) -> Arc<SpanAggregator> {
        self.aggregator.clone()
    }
}

impl SpanProcessor for ZPagesSpanProcessor {
    fn on_start(&self, span: &mut Span, _cx: &Context) {
        // A non-recording span has no data to sample.
        if let Some(data) = span.exported_data() {
            self.aggregator.record_start(data);
        }
    }

    fn on_end(&self, span: SpanData) {
        self.aggregator.record_end(span);
    }

    fn force_flush(&self) -> TraceResult<()> {
        Ok(())
    }

    fn shutdown(&self) -> TraceResult<()> {
        Ok(())
    }
}

/// Configuration for a [`ZPagesSpanProcessor`].
#[derive(Clone, Debug)]
pub struct ZPagesSpanProcessorBuilder {
    boundaries: LatencyBoundaries,
    bucket_capacity: usize,
}

impl ZPagesSpanProcessorBuilder {
    /// Replaces the default latency boundaries.
    pub fn with_boundaries(mut self, boundaries: LatencyBoundaries) -> Self {
        self.boundaries = boundaries;
        self
    }

    /// Sets how many samples each bucket retains. Zero disables sample
    /// retention while keeping the counters.
    pub fn with_bucket_capacity(mut self, bucket_capacity: usize) -> Self {
        self.bucket_capacity = bucket_capacity;
        self
    }

    /// Builds the processor.
    pub fn build(self) -> ZPagesSpanProcessor {
        ZPagesSpanProcessor {
            aggregator: Arc::new(SpanAggregator::new(self.boundaries, self.bucket_capacity)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opentelemetry::trace::{Span as _, Status, Tracer, TracerProvider as _};
    use opentelemetry_sdk::trace::TracerProvider;

    #[test]
    fn processor_tracks_spans_through_provider() {
        let processor = ZPagesSpanProcessor::new();
        let aggregator = processor.aggregator();
        let provider = TracerProvider::builder()
            .with_span_processor(processor)
            .build();
        let tracer = provider.tracer("tracez-test");

        let statuses = [Status::Unset, Status::error("failed"), Status::Ok];
        let mut spans: Vec<_> = (0..9).map(|_| tracer.start("testSpan")).collect();

        let stats = aggregator.spans_per_method();
        assert_eq!(stats["testSpan"].active_count, 9);

        for (i, span) in spans.iter_mut().enumerate() {
            span.set_status(statuses[i % 3].clone());
            span.end();
        }

        let stats = aggregator.spans_per_method();
        assert_eq!(stats["testSpan"].active_count, 0);
        assert!(stats["testSpan"].error_counts.values().sum::<u64>() >= 1);
        assert!(stats["testSpan"].latency_counts.iter().sum::<u64>() >= 1);
        assert_eq!(
            stats["testSpan"].latency_counts.iter().sum::<u64>()
                + stats["testSpan"].error_counts.values().sum::<u64>(),
            9
        );
    }

    #[test]
    fn custom_configuration_is_applied() {
        let processor = ZPagesSpanProcessor::builder()
            .with_boundaries(LatencyBoundaries::new(vec![
                std::time::Duration::from_secs(1),
            ]))
            .with_bucket_capacity(2)
            .build();
        let aggregator = processor.aggregator();
        assert_eq!(aggregator.boundaries().num_buckets(), 2);

        let provider = TracerProvider::builder()
            .with_span_processor(processor)
            .build();
        let tracer = provider.tracer("tracez-test");
        for _ in 0..5 {
            tracer.start("fast").end();
        }

        // Counters keep the full total, buckets cap retained samples.
        let stats = aggregator.spans_per_method();
        assert_eq!(stats["fast"].latency_counts.iter().sum::<u64>(), 5);
        let retained = aggregator
            .spans_by_latency("fast", 0)
            .expect("bucket in range");
        assert_eq!(retained.len(), 2);
    }
}
