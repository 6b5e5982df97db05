//! # Tracez span aggregator

use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use opentelemetry::trace::Status;
use opentelemetry_sdk::export::trace::SpanData;

use super::bucket::{LatencyBoundaries, SpanBucket};

/// Status code used for tracez grouping. Only `Error` counts as an error;
/// `Unset` and `Ok` spans land in latency buckets.
fn status_code(status: &Status) -> u32 {
    match status {
        Status::Unset => 0,
        Status::Error { .. } => 1,
        Status::Ok => 2,
    }
}

type SampleKey = ([u8; 16], [u8; 8]);

fn sample_key(span: &SpanData) -> SampleKey {
    (
        span.span_context.trace_id().to_bytes(),
        span.span_context.span_id().to_bytes(),
    )
}

#[derive(Debug)]
struct SpanSummary {
    active: HashMap<SampleKey, SpanData>,
    latency: Vec<SpanBucket>,
    errors: BTreeMap<u32, SpanBucket>,
}

impl SpanSummary {
    fn new(num_buckets: usize, bucket_capacity: usize) -> Self {
        SpanSummary {
            active: HashMap::new(),
            latency: (0..num_buckets)
                .map(|_| SpanBucket::new(bucket_capacity))
                .collect(),
            errors: BTreeMap::new(),
        }
    }
}

/// Aggregate counters for one span name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SpanStats {
    /// Number of spans currently running.
    pub active_count: usize,
    /// Completed span count per latency bucket.
    pub latency_counts: Vec<u64>,
    /// Completed span count per error status code.
    pub error_counts: BTreeMap<u32, u64>,
}

/// Per-span-name sample store behind a single reader/writer lock.
///
/// Writers (span start/end callbacks) hold the write lock for one map
/// update plus one bucket insert. Readers copy samples out before the lock
/// is released, so returned data can be iterated without further
/// synchronization. Entries are created lazily per span name and never
/// removed.
#[derive(Debug)]
pub struct SpanAggregator {
    boundaries: LatencyBoundaries,
    bucket_capacity: usize,
    summaries: RwLock<HashMap<String, SpanSummary>>,
}

impl SpanAggregator {
    pub(crate) fn new(boundaries: LatencyBoundaries, bucket_capacity: usize) -> Self {
        SpanAggregator {
            boundaries,
            bucket_capacity,
            summaries: RwLock::new(HashMap::new()),
        }
    }

    /// The latency boundaries samples are grouped by.
    pub fn boundaries(&self) -> &LatencyBoundaries {
        &self.boundaries
    }

    pub(crate) fn record_start(&self, span: SpanData) {
        if let Ok(mut summaries) = self.summaries.write() {
            let summary = self.summary_entry(&mut summaries, span.name.as_ref());
            summary.active.insert(sample_key(&span), span);
        }
    }

    pub(crate) fn record_end(&self, span: SpanData) {
        if let Ok(mut summaries) = self.summaries.write() {
            let bucket_capacity = self.bucket_capacity;
            let summary = self.summary_entry(&mut summaries, span.name.as_ref());
            summary.active.remove(&sample_key(&span));

            if status_code(&span.status) == 1 {
                summary
                    .errors
                    .entry(1)
                    .or_insert_with(|| SpanBucket::new(bucket_capacity))
                    .add(span);
            } else {
                // A span that ended before it started clamps to zero latency
                // and lands in the first bucket.
                let latency = span
                    .end_time
                    .duration_since(span.start_time)
                    .unwrap_or_default();
                let index = self.boundaries.bucket_index(latency);
                summary.latency[index].add(span);
            }
        }
    }

    fn summary_entry<'a>(
        &self,
        summaries: &'a mut HashMap<String, SpanSummary>,
        name: &str,
    ) -> &'a mut SpanSummary {
        if !summaries.contains_key(name) {
            summaries.insert(
                name.to_string(),
                SpanSummary::new(self.boundaries.num_buckets(), self.bucket_capacity),
            );
        }
        summaries.get_mut(name).expect("entry just inserted")
    }

    /// Counters for every span name observed so far.
    pub fn spans_per_method(&self) -> BTreeMap<String, SpanStats> {
        let summaries = match self.summaries.read() {
            Ok(summaries) => summaries,
            Err(_) => return BTreeMap::new(),
        };
        summaries
            .iter()
            .map(|(name, summary)| {
                (
                    name.clone(),
                    SpanStats {
                        active_count: summary.active.len(),
                        latency_counts: summary
                            .latency
                            .iter()
                            .map(SpanBucket::observed)
                            .collect(),
                        error_counts: summary
                            .errors
                            .iter()
                            .map(|(code, bucket)| (*code, bucket.observed()))
                            .collect(),
                    },
                )
            })
            .collect()
    }

    /// Currently running spans with the given name, ordered by start time.
    pub fn active_spans(&self, name: &str) -> Vec<SpanData> {
        let summaries = match self.summaries.read() {
            Ok(summaries) => summaries,
            Err(_) => return Vec::new(),
        };
        let mut spans: Vec<SpanData> = summaries
            .get(name)
            .map(|summary| summary.active.values().cloned().collect())
            .unwrap_or_default();
        spans.sort_by_key(|span| span.start_time);
        spans
    }

    /// Retained error samples with the given name, across all error codes.
    pub fn error_spans(&self, name: &str) -> Vec<SpanData> {
        let summaries = match self.summaries.read() {
            Ok(summaries) => summaries,
            Err(_) => return Vec::new(),
        };
        summaries
            .get(name)
            .map(|summary| {
                summary
                    .errors
                    .values()
                    .flat_map(SpanBucket::spans)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Retained samples in one latency bucket, or `None` if `bucket` is out
    /// of range. An unknown span name yields an empty listing.
    pub fn spans_by_latency(&self, name: &str, bucket: usize) -> Option<Vec<SpanData>> {
        if bucket >= self.boundaries.num_buckets() {
            return None;
        }
        let summaries = match self.summaries.read() {
            Ok(summaries) => summaries,
            Err(_) => return Some(Vec::new()),
        };
        Some(
            summaries
                .get(name)
                .map(|summary| summary.latency[bucket].spans())
                .unwrap_or_default(),
        )
    }
}
