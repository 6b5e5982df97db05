//! # Latency boundaries and sample buckets

use opentelemetry_sdk::export::trace::SpanData;
use std::time::Duration;

/// Number of samples retained per bucket unless configured otherwise.
pub(crate) const DEFAULT_BUCKET_CAPACITY: usize = 10;

/// The ordered latency boundaries used to group completed spans.
///
/// Boundaries `b1 < b2 < .. < bn` induce `n + 1` half-open buckets
/// `[0, b1), [b1, b2), .., [bn, inf)`.
#[derive(Clone, Debug)]
pub struct LatencyBoundaries(Vec<Duration>);

impl Default for LatencyBoundaries {
    fn default() -> Self {
        LatencyBoundaries(vec![
            Duration::from_micros(10),
            Duration::from_micros(100),
            Duration::from_millis(1),
            Duration::from_millis(10),
            Duration::from_millis(100),
            Duration::from_secs(1),
            Duration::from_secs(10),
            Duration::from_secs(100),
        ])
    }
}

impl LatencyBoundaries {
    /// Creates boundaries from a strictly increasing sequence of durations.
    pub fn new(boundaries: Vec<Duration>) -> Self {
        debug_assert!(
            boundaries.windows(2).all(|pair| pair[0] < pair[1]),
            "latency boundaries must be strictly increasing"
        );
        LatencyBoundaries(boundaries)
    }

    /// The number of buckets the boundaries induce.
    pub fn num_buckets(&self) -> usize {
        self.0.len() + 1
    }

    /// The index of the bucket `latency` falls into.
    pub fn bucket_index(&self, latency: Duration) -> usize {
        self.0
            .iter()
            .position(|boundary| latency < *boundary)
            .unwrap_or(self.0.len())
    }

    /// Human readable interval for a bucket, used as a column header.
    pub(crate) fn label(&self, index: usize) -> String {
        let lower = if index == 0 {
            Duration::ZERO
        } else {
            self.0[index - 1]
        };
        match self.0.get(index) {
            Some(upper) => format!("[{lower:?}, {upper:?})"),
            None => format!("[{lower:?}, +inf)"),
        }
    }
}

/// A bounded ring of span samples.
///
/// Inserts replace the oldest slot once the bucket is full, so the retained
/// samples are always the most recent `capacity` ones. `observed` counts
/// every attempted insert and is never decremented.
#[derive(Clone, Debug)]
pub(crate) struct SpanBucket {
    samples: Vec<SpanData>,
    capacity: usize,
    next_idx: usize,
    observed: u64,
}

impl SpanBucket {
    pub(crate) fn new(capacity: usize) -> Self {
        SpanBucket {
            samples: Vec::with_capacity(capacity),
            capacity,
            next_idx: 0,
            observed: 0,
        }
    }

    pub(crate) fn add(&mut self, sample: SpanData) {
        self.observed += 1;
        if self.capacity == 0 {
            return;
        }
        if self.samples.len() < self.capacity {
            self.samples.push(sample);
        } else {
            self.samples[self.next_idx] = sample;
        }
        self.next_idx = (self.next_idx + 1) % self.capacity;
    }

    pub(crate) fn len(&self) -> usize {
        self.samples.len()
    }

    pub(crate) fn observed(&self) -> u64 {
        self.observed
    }

    /// Retained samples, oldest to newest.
    pub(crate) fn spans(&self) -> Vec<SpanData> {
        if self.samples.len() < self.capacity {
            self.samples.clone()
        } else {
            let (newer, older) = self.samples.split_at(self.next_idx);
            older.iter().chain(newer.iter()).cloned().collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opentelemetry::trace::{SpanContext, SpanId, TraceFlags, TraceId, TraceState};
    use opentelemetry_sdk::testing::trace::new_test_export_span_data;

    fn sample(span_id: u64) -> SpanData {
        let mut span_data = new_test_export_span_data();
        span_data.span_context = SpanContext::new(
            TraceId::from_u128(1),
            SpanId::from_u64(span_id),
            TraceFlags::default(),
            false,
            TraceState::default(),
        );
        span_data
    }

    fn span_ids(bucket: &SpanBucket) -> Vec<u64> {
        bucket
            .spans()
            .iter()
            .map(|span| u64::from_be_bytes(span.span_context.span_id().to_bytes()))
            .collect()
    }

    #[test]
    fn default_boundaries_make_nine_buckets() {
        let boundaries = LatencyBoundaries::default();
        assert_eq!(boundaries.num_buckets(), 9);
    }

    #[test]
    fn bucket_index_table() {
        let boundaries = LatencyBoundaries::default();
        let cases = vec![
            (Duration::ZERO, 0),
            (Duration::from_micros(9), 0),
            (Duration::from_micros(10), 1),
            (Duration::from_micros(99), 1),
            (Duration::from_millis(1), 3),
            (Duration::from_millis(99), 4),
            (Duration::from_secs(1), 6),
            (Duration::from_secs(99), 7),
            (Duration::from_secs(100), 8),
            (Duration::from_secs(100_000), 8),
        ];
        for (latency, expected) in cases {
            assert_eq!(boundaries.bucket_index(latency), expected, "{latency:?}");
        }
    }

    #[test]
    fn custom_boundaries() {
        let boundaries = LatencyBoundaries::new(vec![Duration::from_secs(1)]);
        assert_eq!(boundaries.num_buckets(), 2);
        assert_eq!(boundaries.bucket_index(Duration::from_millis(999)), 0);
        assert_eq!(boundaries.bucket_index(Duration::from_secs(2)), 1);
    }

    #[test]
    fn bucket_fills_then_replaces_oldest() {
        let mut bucket = SpanBucket::new(3);
        for span_id in 1..=3 {
            bucket.add(sample(span_id));
        }
        assert_eq!(bucket.len(), 3);
        assert_eq!(span_ids(&bucket), vec![1, 2, 3]);

        bucket.add(sample(4));
        assert_eq!(bucket.len(), 3);
        assert_eq!(bucket.observed(), 4);
        assert_eq!(span_ids(&bucket), vec![2, 3, 4]);

        bucket.add(sample(5));
        assert_eq!(span_ids(&bucket), vec![3, 4, 5]);
    }

    #[test]
    fn zero_capacity_bucket_stores_nothing() {
        let mut bucket = SpanBucket::new(0);
        bucket.add(sample(1));
        assert_eq!(bucket.len(), 0);
        assert!(bucket.spans().is_empty());
        assert_eq!(bucket.observed(), 1);
    }

    #[test]
    fn most_recent_sample_is_retained() {
        let mut bucket = SpanBucket::new(1);
        for span_id in 1..=5 {
            bucket.add(sample(span_id));
            assert_eq!(span_ids(&bucket), vec![span_id]);
        }
    }
}
