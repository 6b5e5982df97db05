use opentelemetry::Context;

#[derive(Clone, Debug, PartialEq)]
struct TracingMode(String);

#[derive(Clone, Copy, Debug, PartialEq)]
struct TimestampMillis(i64);

/// Accessors for the SkyWalking extension values carried in a [`Context`].
///
/// The tracing mode tells downstream analysis whether to process (`"0"`) or
/// skip (`"1"`) the trace; the timestamp is the milliseconds-since-epoch
/// value from the `sw8-x` header, `0` meaning unset.
pub trait SkyWalkingContextExt {
    /// Returns a context with the given tracing mode.
    fn with_tracing_mode(&self, mode: impl Into<String>) -> Context;

    /// The tracing mode, `"0"` if none was set.
    fn tracing_mode(&self) -> &str;

    /// Returns a context carrying the given sending timestamp in
    /// milliseconds since the Unix epoch.
    fn with_timestamp(&self, millis: i64) -> Context;

    /// The sending timestamp in milliseconds, `0` if none was set.
    fn timestamp(&self) -> i64;
}

impl SkyWalkingContextExt for Context {
    fn with_tracing_mode(&self, mode: impl Into<String>) -> Context {
        self.with_value(TracingMode(mode.into()))
    }

    fn tracing_mode(&self) -> &str {
        self.get::<TracingMode>().map(|mode| mode.0.as_str()).unwrap_or("0")
    }

    fn with_timestamp(&self, millis: i64) -> Context {
        self.with_value(TimestampMillis(millis))
    }

    fn timestamp(&self) -> i64 {
        self.get::<TimestampMillis>().map(|ts| ts.0).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_when_unset() {
        let cx = Context::new();
        assert_eq!(cx.tracing_mode(), "0");
        assert_eq!(cx.timestamp(), 0);
    }

    #[test]
    fn values_round_trip() {
        let cx = Context::new()
            .with_tracing_mode("1")
            .with_timestamp(1_602_743_904_804);
        assert_eq!(cx.tracing_mode(), "1");
        assert_eq!(cx.timestamp(), 1_602_743_904_804);
    }

    #[test]
    fn later_values_shadow_earlier() {
        let cx = Context::new().with_tracing_mode("1").with_tracing_mode("0");
        assert_eq!(cx.tracing_mode(), "0");
    }
}
