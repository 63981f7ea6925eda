use std::{
    borrow::Cow,
    collections::{BTreeMap, HashMap},
    error::Error,
    fmt,
    sync::Arc,
};

use serde::Serialize;

use crate::data::{AList, AMap, RawMap, Sentinel};

/// A deferred value, only computed when the line is actually written.
pub type Lazy = Arc<dyn Fn() -> Value + Send + Sync>;

/// Anything that can marshal itself to JSON bytes.
///
/// This is the encoder's fallback for shapes it does not know natively. It is
/// implemented for every [`Serialize`] type, so `Value::marshal(thing)` works
/// for any serde-enabled type.
pub trait Marshal: fmt::Debug + Send + Sync {
    fn marshal(&self) -> serde_json::Result<Vec<u8>>;
}

impl<T> Marshal for T
where
    T: Serialize + fmt::Debug + Send + Sync,
{
    fn marshal(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }
}

/// One loggable value.
///
/// The variants are listed in the order the encoder checks them. Use the
/// `From` conversions (or the [`list!`](crate::list), [`map!`](crate::map)
/// and [`pairs!`](crate::pairs) macros) rather than building variants by hand.
#[derive(Clone)]
pub enum Value {
    Null,
    Str(String),
    /// Bytes that are written as a JSON string; invalid UTF-8 is kept visible.
    Bytes(Vec<u8>),
    I64(i64),
    U64(u64),
    I128(i128),
    U128(u128),
    F32(f32),
    F64(f64),
    Bool(bool),
    StrList(Vec<String>),
    List(AList),
    Map(AMap),
    Raw(RawMap),
    /// An unordered map, written sorted by key.
    Object(HashMap<String, Value>),
    Error(Arc<dyn Error + Send + Sync>),
    Display(Arc<dyn fmt::Display + Send + Sync>),
    Marshal(Arc<dyn Marshal>),
    Lazy(Lazy),
    Sentinel(Sentinel),
}

impl Value {
    /// Defers computing a value until the line is written. Nothing is called
    /// when the level is disabled or the pair is skipped.
    pub fn lazy<F, V>(f: F) -> Self
    where
        F: Fn() -> V + Send + Sync + 'static,
        V: Into<Value>,
    {
        Value::Lazy(Arc::new(move || f().into()))
    }

    /// Logs an error by its `Display` text.
    pub fn error<E>(err: E) -> Self
    where
        E: Error + Send + Sync + 'static,
    {
        Value::Error(Arc::new(err))
    }

    /// Logs anything by its `Display` text.
    ///
    /// Like a [`lazy`](Value::lazy) value, the text is only given 10ms when
    /// the line has grown past its scratch space.
    pub fn display<D>(value: D) -> Self
    where
        D: fmt::Display + Send + Sync + 'static,
    {
        Value::Display(Arc::new(value))
    }

    /// Logs any serde-serializable value through `serde_json`.
    pub fn marshal<T>(value: T) -> Self
    where
        T: Serialize + fmt::Debug + Send + Sync + 'static,
    {
        Value::Marshal(Arc::new(value))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub(crate) fn is_empty_map(&self) -> bool {
        matches!(self, Value::Map(map) if map.is_empty())
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Str(s) => fmt::Debug::fmt(s, f),
            Value::Bytes(b) => write!(f, "b{:?}", String::from_utf8_lossy(b)),
            Value::I64(v) => fmt::Debug::fmt(v, f),
            Value::U64(v) => fmt::Debug::fmt(v, f),
            Value::I128(v) => fmt::Debug::fmt(v, f),
            Value::U128(v) => fmt::Debug::fmt(v, f),
            Value::F32(v) => fmt::Debug::fmt(v, f),
            Value::F64(v) => fmt::Debug::fmt(v, f),
            Value::Bool(v) => fmt::Debug::fmt(v, f),
            Value::StrList(v) => fmt::Debug::fmt(v, f),
            Value::List(v) => fmt::Debug::fmt(v, f),
            Value::Map(v) => fmt::Debug::fmt(v, f),
            Value::Raw(v) => fmt::Debug::fmt(v, f),
            Value::Object(v) => fmt::Debug::fmt(v, f),
            Value::Error(e) => write!(f, "Error({e})"),
            Value::Display(d) => write!(f, "Display({d})"),
            Value::Marshal(m) => fmt::Debug::fmt(m, f),
            Value::Lazy(_) => f.write_str("Lazy(..)"),
            Value::Sentinel(s) => fmt::Debug::fmt(s, f),
        }
    }
}

impl From<()> for Value {
    fn from(_: ()) -> Self {
        Value::Null
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Str(value.to_owned())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Str(value)
    }
}

impl From<&String> for Value {
    fn from(value: &String) -> Self {
        Value::Str(value.clone())
    }
}

impl From<Cow<'_, str>> for Value {
    fn from(value: Cow<'_, str>) -> Self {
        Value::Str(value.into_owned())
    }
}

impl From<char> for Value {
    fn from(value: char) -> Self {
        Value::Str(value.to_string())
    }
}

impl From<&[u8]> for Value {
    fn from(value: &[u8]) -> Self {
        Value::Bytes(value.to_vec())
    }
}

impl From<Vec<u8>> for Value {
    fn from(value: Vec<u8>) -> Self {
        Value::Bytes(value)
    }
}

macro_rules! from_int {
    ($variant:ident($wide:ty): $($ty:ty),*) => {
        $(
            impl From<$ty> for Value {
                fn from(value: $ty) -> Self {
                    Value::$variant(value as $wide)
                }
            }
        )*
    };
}

from_int!(I64(i64): i8, i16, i32, i64, isize);
from_int!(U64(u64): u8, u16, u32, u64, usize);
from_int!(I128(i128): i128);
from_int!(U128(u128): u128);

impl From<f32> for Value {
    fn from(value: f32) -> Self {
        Value::F32(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::F64(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<Vec<String>> for Value {
    fn from(value: Vec<String>) -> Self {
        Value::StrList(value)
    }
}

impl From<Vec<&str>> for Value {
    fn from(value: Vec<&str>) -> Self {
        Value::StrList(value.into_iter().map(str::to_owned).collect())
    }
}

impl From<AList> for Value {
    fn from(value: AList) -> Self {
        Value::List(value)
    }
}

impl From<AMap> for Value {
    fn from(value: AMap) -> Self {
        Value::Map(value)
    }
}

impl From<&AMap> for Value {
    fn from(value: &AMap) -> Self {
        Value::Map(value.clone())
    }
}

impl From<RawMap> for Value {
    fn from(value: RawMap) -> Self {
        Value::Raw(value)
    }
}

impl<V: Into<Value>> From<HashMap<String, V>> for Value {
    fn from(value: HashMap<String, V>) -> Self {
        Value::Object(value.into_iter().map(|(k, v)| (k, v.into())).collect())
    }
}

impl<V: Into<Value>> From<BTreeMap<String, V>> for Value {
    fn from(value: BTreeMap<String, V>) -> Self {
        Value::Object(value.into_iter().map(|(k, v)| (k, v.into())).collect())
    }
}

impl From<Sentinel> for Value {
    fn from(value: Sentinel) -> Self {
        Value::Sentinel(value)
    }
}

impl From<std::io::Error> for Value {
    fn from(value: std::io::Error) -> Self {
        Value::error(value)
    }
}

impl From<Box<dyn Error + Send + Sync>> for Value {
    fn from(value: Box<dyn Error + Send + Sync>) -> Self {
        Value::Error(Arc::from(value))
    }
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        Value::marshal(value)
    }
}
