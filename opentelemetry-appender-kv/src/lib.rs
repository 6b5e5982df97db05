//! # OpenTelemetry Key/Value Log Appender
//!
//! Bridges structured key/value logging calls (a message plus alternating
//! key/value pairs of dynamic values) into the OpenTelemetry log pipeline.
//!
//! A [`KvLogBridge`] holds a named logger, a verbosity-to-severity mapping,
//! attributes accumulated through [`KvLogBridge::with_values`], and an
//! ambient [`Context`]. Each `info`/`error` call produces one log record.
//! A [`Context`] passed in value position of the key/value list is not
//! emitted as an attribute; it becomes the ambient context for that record,
//! so trace correlation follows the request context the caller logged with.
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

use std::borrow::Cow;
use std::error::Error;
use std::fmt;
use std::sync::Arc;
use std::time::SystemTime;

use opentelemetry::logs::{AnyValue, LogRecord, Logger, LoggerProvider, Severity};
use opentelemetry::{Context, Key, StringValue};

mod value;

pub use value::LogValue;

use value::convert_kvs;

/// Maps a caller verbosity level to a record severity.
pub type SeverityMapper = Arc<dyn Fn(i32) -> Severity + Send + Sync>;

/// The default level mapping: `0` is info, `1` is debug, everything above is
/// trace. Negative levels also map to info.
fn default_severity(level: i32) -> Severity {
    match level {
        1 => Severity::Debug,
        l if l >= 2 => Severity::Trace,
        _ => Severity::Info,
    }
}

/// An immutable bridge from key/value log calls to an OpenTelemetry logger.
///
/// Derivations via [`with_name`](KvLogBridge::with_name) and
/// [`with_values`](KvLogBridge::with_values) return new bridges; the parent
/// is never mutated, so a bridge can be shared freely across threads.
pub struct KvLogBridge<P>
where
    P: LoggerProvider,
{
    provider: P,
    logger: P::Logger,
    name: String,
    version: Option<Cow<'static, str>>,
    schema_url: Option<Cow<'static, str>>,
    severity_mapper: SeverityMapper,
    attributes: Vec<(Key, AnyValue)>,
    context: Option<Context>,
}

impl<P> fmt::Debug for KvLogBridge<P>
where
    P: LoggerProvider,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KvLogBridge")
            .field("name", &self.name)
            .field("attributes", &self.attributes)
            .finish_non_exhaustive()
    }
}

impl<P> KvLogBridge<P>
where
    P: LoggerProvider + Send + Sync,
{
    /// Starts building a bridge that emits through `provider` under the
    /// given instrumentation scope name.
    pub fn builder(name: impl Into<String>, provider: P) -> KvLogBridgeBuilder<P> {
        KvLogBridgeBuilder {
            name: name.into(),
            provider,
            version: None,
            schema_url: None,
            severity_mapper: Arc::new(default_severity),
        }
    }

    /// Instrumentation scope name of this bridge.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether a record at `level` would be processed. Advisory only.
    #[cfg(feature = "logs_level_enabled")]
    pub fn enabled(&self, level: i32) -> bool {
        self.logger
            .event_enabled((self.severity_mapper)(level), &self.name)
    }

    /// Whether a record at `level` would be processed. Advisory only.
    #[cfg(not(feature = "logs_level_enabled"))]
    pub fn enabled(&self, _level: i32) -> bool {
        true
    }

    /// Emits one record with the severity mapped from `level`.
    pub fn info(
        &self,
        level: i32,
        message: impl Into<StringValue>,
        key_values: impl IntoIterator<Item = LogValue>,
    ) {
        self.emit(
            None,
            (self.severity_mapper)(level),
            message.into(),
            key_values.into_iter().collect(),
        );
    }

    /// Emits one record at error severity, prepending the error message as
    /// an `exception.message` attribute.
    pub fn error(
        &self,
        err: &(dyn Error + 'static),
        message: impl Into<StringValue>,
        key_values: impl IntoIterator<Item = LogValue>,
    ) {
        self.emit(
            Some(err),
            Severity::Error,
            message.into(),
            key_values.into_iter().collect(),
        );
    }

    fn emit(
        &self,
        err: Option<&(dyn Error + 'static)>,
        severity: Severity,
        body: StringValue,
        key_values: Vec<LogValue>,
    ) {
        let mut record = self.logger.create_log_record();
        let now = SystemTime::now();
        record.set_timestamp(now);
        record.set_observed_timestamp(now);
        record.set_severity_number(severity);
        record.set_severity_text(severity.name().into());
        record.set_body(AnyValue::String(body));

        let (ctx, extracted) = convert_kvs(self.context.clone(), key_values);
        let mut attributes =
            Vec::with_capacity(1 + self.attributes.len() + extracted.len());
        if let Some(err) = err {
            attributes.push((
                Key::new("exception.message"),
                AnyValue::String(err.to_string().into()),
            ));
        }
        attributes.extend(self.attributes.iter().cloned());
        attributes.extend(extracted);
        if !attributes.is_empty() {
            record.add_attributes(attributes);
        }

        match ctx {
            Some(ctx) => {
                let _guard = ctx.attach();
                self.logger.emit(record);
            }
            None => self.logger.emit(record),
        }
    }
}

impl<P> KvLogBridge<P>
where
    P: LoggerProvider + Clone + Send + Sync,
{
    /// Returns a bridge named `parent/suffix` with a logger re-created under
    /// the new name. All other state is carried over.
    pub fn with_name(&self, suffix: &str) -> Self {
        let name = format!("{}/{}", self.name, suffix);
        let logger = build_logger(&self.provider, &name, &self.version, &self.schema_url);
        KvLogBridge {
            provider: self.provider.clone(),
            logger,
            name,
            version: self.version.clone(),
            schema_url: self.schema_url.clone(),
            severity_mapper: self.severity_mapper.clone(),
            attributes: self.attributes.clone(),
            context: self.context.clone(),
        }
    }

    /// Returns a bridge whose accumulated attributes are extended with
    /// `key_values`. A [`Context`] among the values replaces the derived
    /// bridge's ambient context.
    pub fn with_values(&self, key_values: impl IntoIterator<Item = LogValue>) -> Self {
        let (context, extracted) =
            convert_kvs(self.context.clone(), key_values.into_iter().collect());
        let mut attributes = self.attributes.clone();
        attributes.extend(extracted);
        KvLogBridge {
            provider: self.provider.clone(),
            logger: build_logger(&self.provider, &self.name, &self.version, &self.schema_url),
            name: self.name.clone(),
            version: self.version.clone(),
            schema_url: self.schema_url.clone(),
            severity_mapper: self.severity_mapper.clone(),
            attributes,
            context,
        }
    }
}

/// Configuration for a [`KvLogBridge`].
pub struct KvLogBridgeBuilder<P> {
    name: String,
    provider: P,
    version: Option<Cow<'static, str>>,
    schema_url: Option<Cow<'static, str>>,
    severity_mapper: SeverityMapper,
}

impl<P> fmt::Debug for KvLogBridgeBuilder<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KvLogBridgeBuilder")
            .field("name", &self.name)
            .field("version", &self.version)
            .field("schema_url", &self.schema_url)
            .finish_non_exhaustive()
    }
}

impl<P> KvLogBridgeBuilder<P>
where
    P: LoggerProvider + Send + Sync,
{
    /// Sets the instrumentation scope version.
    pub fn with_version(mut self, version: impl Into<Cow<'static, str>>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// Sets the schema URL of the emitted records.
    pub fn with_schema_url(mut self, schema_url: impl Into<Cow<'static, str>>) -> Self {
        self.schema_url = Some(schema_url.into());
        self
    }

    /// Replaces the default level-to-severity mapping. The mapper must be
    /// total on all levels it may be handed, negative ones included.
    pub fn with_level_severity(
        mut self,
        mapper: impl Fn(i32) -> Severity + Send + Sync + 'static,
    ) -> Self {
        self.severity_mapper = Arc::new(mapper);
        self
    }

    /// Builds the bridge, creating its logger from the provider.
    pub fn build(self) -> KvLogBridge<P> {
        let logger = build_logger(&self.provider, &self.name, &self.version, &self.schema_url);
        KvLogBridge {
            provider: self.provider,
            logger,
            name: self.name,
            version: self.version,
            schema_url: self.schema_url,
            severity_mapper: self.severity_mapper,
            attributes: Vec::new(),
            context: None,
        }
    }
}

fn build_logger<P: LoggerProvider>(
    provider: &P,
    name: &str,
    version: &Option<Cow<'static, str>>,
    schema_url: &Option<Cow<'static, str>>,
) -> P::Logger {
    let mut builder = provider.logger_builder(name.to_owned());
    if let Some(version) = version {
        builder = builder.with_version(version.clone());
    }
    if let Some(schema_url) = schema_url {
        builder = builder.with_schema_url(schema_url.clone());
    }
    builder.build()
}
