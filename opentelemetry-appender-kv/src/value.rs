use std::borrow::Cow;
use std::collections::HashMap;
use std::error::Error;
use std::fmt::Debug;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use opentelemetry::logs::AnyValue;
use opentelemetry::{Context, Key};

/// A dynamically typed value accepted at a key/value log call site.
///
/// Call sites hand over whatever they have; [`convert_value`] folds every
/// variant into an [`AnyValue`] without ever failing. Values that do not fit
/// one of the typed variants can be wrapped with [`LogValue::from_debug`] or
/// [`LogValue::other`].
#[derive(Clone, Debug)]
#[non_exhaustive]
pub enum LogValue {
    /// A missing value. Odd-length key/value lists are padded with this.
    Empty,
    /// A boolean.
    Bool(bool),
    /// A signed integer, sign-extended from any width.
    Int(i64),
    /// An unsigned integer of up to 64 bits.
    UInt(u64),
    /// A floating point number, widened from any width.
    Float(f64),
    /// A string.
    Str(String),
    /// A byte sequence.
    Bytes(Vec<u8>),
    /// An elapsed duration.
    Duration(Duration),
    /// A wall-clock time.
    Time(SystemTime),
    /// A complex number.
    Complex {
        /// Real part.
        re: f64,
        /// Imaginary part.
        im: f64,
    },
    /// An error, reduced to its message.
    Error(String),
    /// A struct-shaped value, pre-rendered as a field/value listing.
    Struct(String),
    /// An ordered sequence of values.
    Seq(Vec<LogValue>),
    /// An ordered sequence of key/value entries. Keys may be any value and
    /// are stringified on conversion.
    Map(Vec<(LogValue, LogValue)>),
    /// An ambient context. In value position of a key/value list this is
    /// absorbed by [`convert_kvs`] instead of becoming an attribute.
    Context(Context),
    /// A value no other variant can represent.
    Other {
        /// The name of the source type.
        type_name: &'static str,
        /// A best-effort rendering of the value.
        rendered: String,
    },
}

impl LogValue {
    /// Captures an error as its message.
    pub fn error(err: &(dyn Error + 'static)) -> Self {
        LogValue::Error(err.to_string())
    }

    /// Captures a struct-shaped value as a stable field/value rendering.
    pub fn from_debug<T: Debug + ?Sized>(value: &T) -> Self {
        LogValue::Struct(format!("{value:?}"))
    }

    /// Wraps a value that has no typed representation. It converts to a
    /// string carrying an `unhandled: ` prefix so misuse at a log site shows
    /// up in the emitted attributes instead of being dropped.
    pub fn other<T: Debug + ?Sized>(value: &T) -> Self {
        LogValue::Other {
            type_name: std::any::type_name::<T>(),
            rendered: format!("{value:?}"),
        }
    }
}

impl From<bool> for LogValue {
    fn from(value: bool) -> Self {
        LogValue::Bool(value)
    }
}

macro_rules! impl_from_signed {
    ($($ty:ty),+) => {
        $(impl From<$ty> for LogValue {
            fn from(value: $ty) -> Self {
                LogValue::Int(value as i64)
            }
        })+
    };
}

macro_rules! impl_from_unsigned {
    ($($ty:ty),+) => {
        $(impl From<$ty> for LogValue {
            fn from(value: $ty) -> Self {
                LogValue::UInt(value as u64)
            }
        })+
    };
}

impl_from_signed!(i8, i16, i32, i64, isize);
impl_from_unsigned!(u8, u16, u32, u64, usize);

impl From<u128> for LogValue {
    fn from(value: u128) -> Self {
        match u64::try_from(value) {
            Ok(v) => LogValue::UInt(v),
            Err(_) => LogValue::Str(value.to_string()),
        }
    }
}

impl From<f32> for LogValue {
    fn from(value: f32) -> Self {
        LogValue::Float(value.into())
    }
}

impl From<f64> for LogValue {
    fn from(value: f64) -> Self {
        LogValue::Float(value)
    }
}

impl From<&str> for LogValue {
    fn from(value: &str) -> Self {
        LogValue::Str(value.to_owned())
    }
}

impl From<String> for LogValue {
    fn from(value: String) -> Self {
        LogValue::Str(value)
    }
}

impl From<Cow<'_, str>> for LogValue {
    fn from(value: Cow<'_, str>) -> Self {
        LogValue::Str(value.into_owned())
    }
}

impl From<&[u8]> for LogValue {
    fn from(value: &[u8]) -> Self {
        LogValue::Bytes(value.to_vec())
    }
}

impl From<Vec<u8>> for LogValue {
    fn from(value: Vec<u8>) -> Self {
        LogValue::Bytes(value)
    }
}

impl From<Duration> for LogValue {
    fn from(value: Duration) -> Self {
        LogValue::Duration(value)
    }
}

impl From<SystemTime> for LogValue {
    fn from(value: SystemTime) -> Self {
        LogValue::Time(value)
    }
}

impl From<Context> for LogValue {
    fn from(value: Context) -> Self {
        LogValue::Context(value)
    }
}

impl From<Vec<LogValue>> for LogValue {
    fn from(value: Vec<LogValue>) -> Self {
        LogValue::Seq(value)
    }
}

impl<T: Into<LogValue>> From<Option<T>> for LogValue {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => v.into(),
            None => LogValue::Empty,
        }
    }
}

/// Converts a [`LogValue`] into an [`AnyValue`]. Total; never fails.
pub(crate) fn convert_value(value: LogValue) -> AnyValue {
    match value {
        // AnyValue has no empty variant, an empty string stands in.
        LogValue::Empty => AnyValue::String("".to_string().into()),
        LogValue::Bool(b) => AnyValue::Boolean(b),
        LogValue::Int(i) => AnyValue::Int(i),
        LogValue::UInt(u) => match i64::try_from(u) {
            Ok(i) => AnyValue::Int(i),
            Err(_) => AnyValue::String(u.to_string().into()),
        },
        LogValue::Float(f) => AnyValue::Double(f),
        LogValue::Str(s) => AnyValue::String(s.into()),
        LogValue::Bytes(b) => AnyValue::Bytes(b),
        LogValue::Duration(d) => AnyValue::Int(saturating_nanos(d)),
        LogValue::Time(t) => AnyValue::Int(unix_nanos(t)),
        LogValue::Complex { re, im } => {
            let mut map = HashMap::with_capacity(2);
            map.insert(Key::new("r"), AnyValue::Double(re));
            map.insert(Key::new("i"), AnyValue::Double(im));
            AnyValue::Map(map)
        }
        LogValue::Error(message) => AnyValue::String(message.into()),
        LogValue::Struct(rendered) => AnyValue::String(rendered.into()),
        LogValue::Seq(items) => AnyValue::ListAny(items.into_iter().map(convert_value).collect()),
        LogValue::Map(entries) => AnyValue::Map(
            entries
                .into_iter()
                .map(|(k, v)| (Key::new(render(&k)), convert_value(v)))
                .collect(),
        ),
        LogValue::Context(_) => {
            AnyValue::String("unhandled: (opentelemetry::Context) <context>".to_string().into())
        }
        LogValue::Other {
            type_name,
            rendered,
        } => AnyValue::String(format!("unhandled: ({type_name}) {rendered}").into()),
    }
}

/// Default printable rendering, used for non-string keys.
pub(crate) fn render(value: &LogValue) -> String {
    match value {
        LogValue::Empty => String::new(),
        LogValue::Bool(b) => b.to_string(),
        LogValue::Int(i) => i.to_string(),
        LogValue::UInt(u) => u.to_string(),
        LogValue::Float(f) => f.to_string(),
        LogValue::Str(s) => s.clone(),
        LogValue::Bytes(b) => format!("{b:?}"),
        LogValue::Duration(d) => format!("{d:?}"),
        LogValue::Time(t) => format!("{t:?}"),
        LogValue::Complex { re, im } => format!("({re}+{im}i)"),
        LogValue::Error(message) => message.clone(),
        LogValue::Struct(rendered) => rendered.clone(),
        LogValue::Seq(items) => {
            let items: Vec<String> = items.iter().map(render).collect();
            format!("[{}]", items.join(", "))
        }
        LogValue::Map(entries) => {
            let entries: Vec<String> = entries
                .iter()
                .map(|(k, v)| format!("{}: {}", render(k), render(v)))
                .collect();
            format!("{{{}}}", entries.join(", "))
        }
        LogValue::Context(_) => "<context>".to_string(),
        LogValue::Other { rendered, .. } => rendered.clone(),
    }
}

fn saturating_nanos(d: Duration) -> i64 {
    i64::try_from(d.as_nanos()).unwrap_or(i64::MAX)
}

fn unix_nanos(t: SystemTime) -> i64 {
    match t.duration_since(UNIX_EPOCH) {
        Ok(d) => saturating_nanos(d),
        // Times before the epoch become negative nanoseconds.
        Err(err) => saturating_nanos(err.duration()).saturating_neg(),
    }
}

/// Converts a flat `[k1, v1, k2, v2, ..]` list into attributes.
///
/// An odd-length list gets one trailing [`LogValue::Empty`]. Non-string keys
/// are rendered printably. A [`LogValue::Context`] in value position is not
/// emitted; it replaces the ambient context instead, and the last one wins.
pub(crate) fn convert_kvs(
    ctx: Option<Context>,
    key_values: Vec<LogValue>,
) -> (Option<Context>, Vec<(Key, AnyValue)>) {
    if key_values.is_empty() {
        return (ctx, Vec::new());
    }
    let mut key_values = key_values;
    if key_values.len() % 2 != 0 {
        // The last declared key still gets a value.
        key_values.push(LogValue::Empty);
    }

    let mut ctx = ctx;
    let mut attributes = Vec::with_capacity(key_values.len() / 2);
    let mut iter = key_values.into_iter();
    while let (Some(key), Some(value)) = (iter.next(), iter.next()) {
        let key = match key {
            LogValue::Str(s) => s,
            other => render(&other),
        };
        if let LogValue::Context(value_ctx) = value {
            ctx = Some(value_ctx);
            continue;
        }
        attributes.push((Key::new(key), convert_value(value)));
    }

    (ctx, attributes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn as_string(value: AnyValue) -> Option<String> {
        match value {
            AnyValue::String(s) => Some(s.as_str().to_string()),
            _ => None,
        }
    }

    #[test]
    fn unsigned_values_widen_or_stringify() {
        assert!(matches!(
            convert_value(LogValue::from(17u64)),
            AnyValue::Int(17)
        ));
        assert!(matches!(
            convert_value(LogValue::from(i64::MAX as u64)),
            AnyValue::Int(i64::MAX)
        ));
        assert_eq!(
            as_string(convert_value(LogValue::from(u64::MAX))),
            Some("18446744073709551615".to_string())
        );
        assert_eq!(
            as_string(convert_value(LogValue::from(u128::MAX))),
            Some(u128::MAX.to_string())
        );
    }

    #[test]
    fn duration_and_time_become_nanos() {
        assert!(matches!(
            convert_value(LogValue::from(Duration::from_secs(60))),
            AnyValue::Int(60_000_000_000)
        ));
        let time = UNIX_EPOCH + Duration::new(1000, 1000);
        assert!(matches!(
            convert_value(LogValue::from(time)),
            AnyValue::Int(1_000_000_001_000)
        ));
    }

    #[test]
    fn complex_becomes_component_map() {
        let converted = convert_value(LogValue::Complex { re: 1.0, im: -2.5 });
        let map = match converted {
            AnyValue::Map(map) => map,
            other => panic!("expected map, got {other:?}"),
        };
        assert_eq!(map.get(&Key::new("r")), Some(&AnyValue::Double(1.0)));
        assert_eq!(map.get(&Key::new("i")), Some(&AnyValue::Double(-2.5)));
    }

    #[test]
    fn nested_values_convert_recursively() {
        let value = LogValue::Seq(vec![
            LogValue::from(1i64),
            LogValue::from("two"),
            LogValue::Seq(vec![LogValue::from(true)]),
        ]);
        let converted = convert_value(value);
        assert_eq!(
            converted,
            AnyValue::ListAny(vec![
                AnyValue::Int(1),
                AnyValue::String("two".into()),
                AnyValue::ListAny(vec![AnyValue::Boolean(true)]),
            ])
        );
    }

    #[test]
    fn none_becomes_empty_string() {
        let value: LogValue = Option::<i64>::None.into();
        assert_eq!(as_string(convert_value(value)), Some(String::new()));
    }

    #[test]
    fn unknown_values_get_unhandled_prefix() {
        #[derive(Debug)]
        struct Opaque;
        let rendered = as_string(convert_value(LogValue::other(&Opaque))).unwrap();
        assert!(rendered.starts_with("unhandled: ("), "got {rendered}");
        assert!(rendered.ends_with(") Opaque"), "got {rendered}");
    }

    #[test]
    fn odd_length_list_pads_last_key() {
        let (_, attrs) = convert_kvs(
            None,
            vec![
                LogValue::from("key1"),
                LogValue::from("value1"),
                LogValue::from("key2"),
            ],
        );
        assert_eq!(
            attrs,
            vec![
                (Key::new("key1"), AnyValue::String("value1".into())),
                (Key::new("key2"), AnyValue::String("".to_string().into())),
            ]
        );
    }

    #[test]
    fn non_string_keys_are_rendered() {
        let (_, attrs) = convert_kvs(None, vec![LogValue::from(42i64), LogValue::from("v")]);
        assert_eq!(attrs, vec![(Key::new("42"), AnyValue::String("v".into()))]);
    }

    #[test]
    fn context_value_is_absorbed_not_emitted() {
        let ctx_a = Context::new();
        let (ctx, attrs) = convert_kvs(
            None,
            vec![
                LogValue::from("ctx"),
                LogValue::from(ctx_a),
                LogValue::from("key"),
                LogValue::from("value"),
            ],
        );
        assert!(ctx.is_some());
        assert_eq!(attrs, vec![(Key::new("key"), AnyValue::String("value".into()))]);
    }

    #[test]
    fn last_context_wins() {
        let ctx_a = Context::new();
        let ctx_b = Context::new().with_value(Marker);
        let (ctx, attrs) = convert_kvs(
            None,
            vec![
                LogValue::from("key"),
                LogValue::from(ctx_a),
                LogValue::from("ctx"),
                LogValue::from(ctx_b),
            ],
        );
        assert!(attrs.is_empty());
        assert!(ctx.expect("context absorbed").get::<Marker>().is_some());
    }

    #[derive(Clone, Debug)]
    struct Marker;

    #[test]
    fn attribute_count_matches_pair_count() {
        for len in 0..7 {
            let items: Vec<LogValue> = (0..len).map(|i| LogValue::from(i as i64)).collect();
            let (_, attrs) = convert_kvs(None, items);
            assert_eq!(attrs.len(), (len + 1) / 2, "len {len}");
        }
    }
}
