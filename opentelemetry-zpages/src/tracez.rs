//! # Tracez HTTP read surface

use std::fmt::Write as _;
use std::sync::Arc;
use std::time::UNIX_EPOCH;

use http::{header, HeaderValue, Request, Response, StatusCode};
use opentelemetry::trace::Status;
use opentelemetry_sdk::export::trace::SpanData;
use percent_encoding::{percent_decode_str, utf8_percent_encode, NON_ALPHANUMERIC};

use crate::trace::{SpanAggregator, ZPagesSpanProcessor};

/// A malformed query string. Anything else about a tracez request is
/// answered with a page, not an error.
#[derive(thiserror::Error, Debug, PartialEq)]
enum QueryError {
    #[error("invalid percent-encoding in query string")]
    InvalidEscape,
    #[error("query string is not valid utf-8")]
    InvalidUtf8,
}

#[derive(Debug, Default, PartialEq)]
struct TracezQuery {
    span_name: Option<String>,
    sample_type: Option<SampleType>,
    latency_bucket: Option<usize>,
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum SampleType {
    Latency,
    Error,
}

/// Serves the tracez page over the sample store of a
/// [`ZPagesSpanProcessor`].
///
/// The handler is framework neutral: map your server's request type onto
/// [`http::Request`] and write back the returned [`http::Response`]. It
/// only ever reads from the store, so any number of requests may be served
/// concurrently with ongoing span activity.
#[derive(Debug)]
pub struct TracezHandler {
    aggregator: Arc<SpanAggregator>,
}

impl TracezHandler {
    /// Creates a handler reading from the given processor's sample store.
    pub fn new(processor: &ZPagesSpanProcessor) -> Self {
        TracezHandler {
            aggregator: processor.aggregator(),
        }
    }

    /// Answers one tracez request.
    ///
    /// Malformed percent-encoding in the query yields `400 Bad Request`;
    /// every other request yields `200 OK` with an HTML body. Unknown
    /// parameters, unknown span names, and out-of-range bucket indexes are
    /// ignored rather than rejected.
    pub fn handle<T>(&self, request: &Request<T>) -> Response<String> {
        match parse_query(request.uri().query().unwrap_or("")) {
            Ok(query) => html_response(self.render(&query)),
            Err(err) => bad_request(err),
        }
    }

    fn render(&self, query: &TracezQuery) -> String {
        let mut page = String::new();
        let _ = write!(
            page,
            "<!DOCTYPE html><html><head><title>Tracez</title>\
             <style>table{{border-collapse:collapse}}th,td{{border:1px solid #777;padding:4px 8px}}</style>\
             </head><body><h1>Tracez</h1>"
        );
        self.render_summary(&mut page);
        if let Some(name) = &query.span_name {
            self.render_samples(&mut page, name, query);
        }
        page.push_str("</body></html>");
        page
    }

    fn render_summary(&self, page: &mut String) {
        let boundaries = self.aggregator.boundaries();
        page.push_str("<table><tr><th>Span Name</th><th>Active</th>");
        for bucket in 0..boundaries.num_buckets() {
            let _ = write!(page, "<th>{}</th>", escape(&boundaries.label(bucket)));
        }
        page.push_str("<th>Errors</th></tr>");

        for (name, stats) in self.aggregator.spans_per_method() {
            let encoded_name = utf8_percent_encode(&name, NON_ALPHANUMERIC).to_string();
            let _ = write!(
                page,
                "<tr><td><a href=\"?zspanname={encoded_name}\">{}</a></td><td>{}</td>",
                escape(&name),
                stats.active_count
            );
            for (bucket, count) in stats.latency_counts.iter().enumerate() {
                let _ = write!(
                    page,
                    "<td><a href=\"?zspanname={encoded_name}&ztype=1&zlatencybucket={bucket}\">{count}</a></td>"
                );
            }
            let errors: u64 = stats.error_counts.values().sum();
            let _ = write!(
                page,
                "<td><a href=\"?zspanname={encoded_name}&ztype=2\">{errors}</a></td></tr>"
            );
        }
        page.push_str("</table>");
    }

    fn render_samples(&self, page: &mut String, name: &str, query: &TracezQuery) {
        let num_buckets = self.aggregator.boundaries().num_buckets();
        let (kind, samples) = match query.sample_type {
            None => ("active samples", self.aggregator.active_spans(name)),
            Some(SampleType::Error) => ("error samples", self.aggregator.error_spans(name)),
            Some(SampleType::Latency) => {
                // An absent or out-of-range bucket index lists every bucket.
                let samples = match query.latency_bucket.filter(|b| *b < num_buckets) {
                    Some(bucket) => self
                        .aggregator
                        .spans_by_latency(name, bucket)
                        .unwrap_or_default(),
                    None => (0..num_buckets)
                        .filter_map(|bucket| self.aggregator.spans_by_latency(name, bucket))
                        .flatten()
                        .collect(),
                };
                ("latency samples", samples)
            }
        };

        let _ = write!(page, "<h2>{}: {kind}</h2>", escape(name));
        if samples.is_empty() {
            page.push_str("<p>No samples.</p>");
            return;
        }
        page.push_str(
            "<table><tr><th>Trace ID</th><th>Span ID</th>\
             <th>Start</th><th>Duration</th><th>Status</th></tr>",
        );
        for span in &samples {
            let _ = write!(page, "{}", sample_row(span));
        }
        page.push_str("</table>");
    }
}

fn sample_row(span: &SpanData) -> String {
    let start = span
        .start_time
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    let duration = span
        .end_time
        .duration_since(span.start_time)
        .unwrap_or_default();
    let status = match &span.status {
        Status::Unset => "unset".to_string(),
        Status::Ok => "ok".to_string(),
        Status::Error { description } => format!("error: {description}"),
    };
    format!(
        "<tr><td>{}</td><td>{}</td><td>{}.{:09}</td><td>{:?}</td><td>{}</td></tr>",
        span.span_context.trace_id(),
        span.span_context.span_id(),
        start.as_secs(),
        start.subsec_nanos(),
        duration,
        escape(&status)
    )
}

fn parse_query(raw: &str) -> Result<TracezQuery, QueryError> {
    let mut query = TracezQuery::default();
    for part in raw.split('&') {
        if part.is_empty() {
            continue;
        }
        let (key, value) = part.split_once('=').unwrap_or((part, ""));
        let key = decode_component(key)?;
        let value = decode_component(value)?;
        match key.as_str() {
            "zspanname" => query.span_name = Some(value),
            "ztype" => {
                query.sample_type = match value.as_str() {
                    "1" => Some(SampleType::Latency),
                    "2" => Some(SampleType::Error),
                    // Unknown sample types fall back to the summary view.
                    _ => None,
                }
            }
            "zlatencybucket" => query.latency_bucket = value.parse().ok(),
            _ => {}
        }
    }
    Ok(query)
}

/// Decodes one `application/x-www-form-urlencoded` component, rejecting
/// truncated or non-hex escapes instead of passing them through.
fn decode_component(raw: &str) -> Result<String, QueryError> {
    let bytes = raw.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            if i + 2 >= bytes.len()
                || !bytes[i + 1].is_ascii_hexdigit()
                || !bytes[i + 2].is_ascii_hexdigit()
            {
                return Err(QueryError::InvalidEscape);
            }
            i += 3;
        } else {
            i += 1;
        }
    }
    let plus_decoded = raw.replace('+', " ");
    percent_decode_str(&plus_decoded)
        .decode_utf8()
        .map(|decoded| decoded.into_owned())
        .map_err(|_| QueryError::InvalidUtf8)
}

fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn html_response(body: String) -> Response<String> {
    let mut response = Response::new(body);
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/html; charset=utf-8"),
    );
    response
}

fn bad_request(err: QueryError) -> Response<String> {
    let mut response = Response::new(err.to_string());
    *response.status_mut() = StatusCode::BAD_REQUEST;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response
}
