use base64::{engine::general_purpose::STANDARD as BASE64_STANDARD, Engine as _};
use opentelemetry::propagation::PropagationError;
use opentelemetry::{
    baggage::{BaggageExt, KeyValueMetadata},
    global::{self, Error},
    propagation::{text_map_propagator::FieldIter, Extractor, Injector, TextMapPropagator},
    trace::{SpanContext, SpanId, TraceContextExt, TraceFlags, TraceId, TraceState},
    Context,
};

use crate::context::SkyWalkingContextExt;

const SW8_HEADER: &str = "sw8";
const SW8_CORRELATION_HEADER: &str = "sw8-correlation";
const SW8_EXTENSION_HEADER: &str = "sw8-x";

const SW8_FIELD_COUNT: usize = 8;
/// Placeholder for the segment fields OpenTelemetry has no equivalent for
/// (parent service, service instance, endpoint, target address).
const UNKNOWN_FIELD: &str = "unknown";

const MAX_CORRELATION_MEMBERS: usize = 3;
const MAX_CORRELATION_VALUE_BYTES: usize = 128;

/// Reasons an `sw8` header can fail to parse. Failures drop only the span
/// context; correlation and extension headers are never even consulted for
/// a request whose `sw8` is unusable.
#[derive(thiserror::Error, Debug, PartialEq)]
enum Sw8ParseError {
    #[error("insufficient number of fields in sw8 header")]
    InsufficientFields,
    #[error("invalid base64 encoding in sw8 header")]
    Base64,
    #[error("invalid trace id in sw8 header")]
    InvalidTraceId,
    #[error("invalid span id in sw8 header")]
    InvalidSpanId,
}

impl Sw8ParseError {
    fn message(&self) -> &'static str {
        match self {
            Sw8ParseError::InsufficientFields => "insufficient number of fields in sw8 header",
            Sw8ParseError::Base64 => "invalid base64 encoding in sw8 header",
            Sw8ParseError::InvalidTraceId => "invalid trace id in sw8 header",
            Sw8ParseError::InvalidSpanId => "invalid span id in sw8 header",
        }
    }
}

/// `SkyWalkingPropagator` implements the [SkyWalking v3 propagation format].
///
/// On inject it writes the `sw8` trace context header, an `sw8-correlation`
/// header carrying up to three baggage members, and an `sw8-x` extension
/// header with the tracing mode and sending timestamp from the context. On
/// extract the parsed span context is attached as the remote parent,
/// correlation members are merged into baggage, and the extension values are
/// stored through [`SkyWalkingContextExt`]. Malformed inbound pieces are
/// dropped individually; extraction never fails a request.
///
/// [SkyWalking v3 propagation format]: https://skywalking.apache.org/docs/main/latest/en/api/x-process-propagation-headers-v3/
#[derive(Clone, Debug)]
pub struct SkyWalkingPropagator {
    fields: [String; 3],
}

impl Default for SkyWalkingPropagator {
    fn default() -> Self {
        SkyWalkingPropagator::new()
    }
}

impl SkyWalkingPropagator {
    /// Create a SkyWalking propagator.
    pub fn new() -> Self {
        SkyWalkingPropagator {
            fields: [
                SW8_HEADER.to_string(),
                SW8_CORRELATION_HEADER.to_string(),
                SW8_EXTENSION_HEADER.to_string(),
            ],
        }
    }

    fn encode_sw8(&self, span_context: &SpanContext) -> String {
        let sample = if span_context.is_sampled() { "1" } else { "0" };
        // SkyWalking's parent span id is a decimal integer; fold the span id
        // bytes into a non-negative i64 the way the segment format expects.
        let parent_span_id =
            i64::from_be_bytes(span_context.span_id().to_bytes()).unsigned_abs();
        let unknown = BASE64_STANDARD.encode(UNKNOWN_FIELD);
        [
            sample.to_string(),
            BASE64_STANDARD.encode(span_context.trace_id().to_string()),
            BASE64_STANDARD.encode(span_context.span_id().to_string()),
            parent_span_id.to_string(),
            unknown.clone(),
            unknown.clone(),
            unknown.clone(),
            unknown,
        ]
        .join("-")
    }

    fn decode_sw8(&self, header: &str) -> Result<SpanContext, Sw8ParseError> {
        let fields: Vec<&str> = header.split('-').collect();
        if fields.len() < SW8_FIELD_COUNT {
            return Err(Sw8ParseError::InsufficientFields);
        }

        let sampled = fields[0] == "1";
        let trace_id = self.decode_hex_field(fields[1], Sw8ParseError::InvalidTraceId)?;
        let trace_id =
            TraceId::from_hex(&trace_id).map_err(|_| Sw8ParseError::InvalidTraceId)?;
        let span_id = self.decode_hex_field(fields[2], Sw8ParseError::InvalidSpanId)?;
        let span_id = SpanId::from_hex(&span_id).map_err(|_| Sw8ParseError::InvalidSpanId)?;
        // Fields 3..8 (parent span id, service, instance, endpoint, target
        // address) carry no OpenTelemetry equivalent and are ignored.

        let trace_flags = if sampled {
            TraceFlags::SAMPLED
        } else {
            TraceFlags::default()
        };
        Ok(SpanContext::new(
            trace_id,
            span_id,
            trace_flags,
            true,
            TraceState::default(),
        ))
    }

    fn decode_hex_field(
        &self,
        field: &str,
        invalid: Sw8ParseError,
    ) -> Result<String, Sw8ParseError> {
        let decoded = BASE64_STANDARD
            .decode(field)
            .map_err(|_| Sw8ParseError::Base64)?;
        String::from_utf8(decoded).map_err(|_| invalid)
    }

    fn encode_correlation(&self, cx: &Context) -> Option<String> {
        let baggage = cx.baggage();
        if baggage.len() == 0 {
            return None;
        }

        // Baggage iteration order is unspecified; sort so that repeated
        // injections of the same context produce the same header.
        let mut members: Vec<(String, String)> = baggage
            .iter()
            .map(|(key, (value, _metadata))| {
                (key.as_str().to_string(), value.as_str().to_string())
            })
            .collect();
        members.sort();

        let mut pairs = Vec::with_capacity(MAX_CORRELATION_MEMBERS);
        for (key, value) in members {
            if pairs.len() == MAX_CORRELATION_MEMBERS {
                break;
            }
            if value.len() > MAX_CORRELATION_VALUE_BYTES {
                continue;
            }
            pairs.push(format!(
                "{}:{}",
                BASE64_STANDARD.encode(key),
                BASE64_STANDARD.encode(value)
            ));
        }

        if pairs.is_empty() {
            None
        } else {
            Some(pairs.join(","))
        }
    }

    fn decode_correlation(&self, header: &str) -> Vec<KeyValueMetadata> {
        let mut members = Vec::new();
        for pair in header.split(',') {
            let pair = pair.trim();
            if pair.is_empty() {
                continue;
            }
            let Some((key, value)) = pair.split_once(':') else {
                continue;
            };
            let (Some(key), Some(value)) = (self.decode_utf8(key), self.decode_utf8(value))
            else {
                continue;
            };
            members.push(KeyValueMetadata::new(key, value, ""));
        }
        members
    }

    fn decode_utf8(&self, field: &str) -> Option<String> {
        let decoded = BASE64_STANDARD.decode(field).ok()?;
        String::from_utf8(decoded).ok()
    }

    fn encode_extension(&self, cx: &Context) -> String {
        let mode = cx.tracing_mode();
        let timestamp = cx.timestamp();
        if timestamp > 0 {
            format!("{mode}-{timestamp}")
        } else {
            // Single space placeholder: mode present, no timestamp.
            format!("{mode}- ")
        }
    }

    fn apply_extension(&self, cx: Context, header: &str) -> Context {
        if header.is_empty() {
            return cx;
        }
        let mut fields = header.split('-');
        let mut cx = match fields.next() {
            Some(mode) => cx.with_tracing_mode(mode),
            None => cx,
        };
        // Only a bare non-negative decimal counts; the " " placeholder and
        // double-separator forms ("1--123") leave the timestamp unset.
        if let Some(timestamp) = fields.next().and_then(|ts| ts.parse::<i64>().ok()) {
            if timestamp > 0 {
                cx = cx.with_timestamp(timestamp);
            }
        }
        cx
    }
}

impl TextMapPropagator for SkyWalkingPropagator {
    fn inject_context(&self, cx: &Context, injector: &mut dyn Injector) {
        let span = cx.span();
        let span_context = span.span_context();
        if !span_context.is_valid() {
            return;
        }

        injector.set(SW8_HEADER, self.encode_sw8(span_context));
        if let Some(correlation) = self.encode_correlation(cx) {
            injector.set(SW8_CORRELATION_HEADER, correlation);
        }
        injector.set(SW8_EXTENSION_HEADER, self.encode_extension(cx));
    }

    fn extract_with_context(&self, cx: &Context, extractor: &dyn Extractor) -> Context {
        let header = extractor.get(SW8_HEADER).unwrap_or("");
        if header.is_empty() {
            return cx.clone();
        }

        let span_context = match self.decode_sw8(header) {
            Ok(span_context) if span_context.is_valid() => span_context,
            Ok(_) => return cx.clone(),
            Err(err) => {
                global::handle_error(Error::Propagation(PropagationError::extract(
                    err.message(),
                    "SkyWalkingPropagator",
                )));
                return cx.clone();
            }
        };
        let mut cx = cx.with_remote_span_context(span_context);

        if let Some(correlation) = extractor.get(SW8_CORRELATION_HEADER) {
            let members = self.decode_correlation(correlation);
            if !members.is_empty() {
                cx = cx.with_baggage(members);
            }
        }

        if let Some(extension) = extractor.get(SW8_EXTENSION_HEADER) {
            cx = self.apply_extension(cx, extension);
        }

        cx
    }

    fn fields(&self) -> FieldIter<'_> {
        FieldIter::new(self.fields.as_ref())
    }
}
