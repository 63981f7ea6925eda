use std::{collections::HashMap, fmt, sync::Arc};

use crate::value::Value;

/// A list of values, written as a JSON array.
pub type AList = Vec<Value>;

/// Markers recognized in the key position of a [`RawMap`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sentinel {
    /// Drop the following value (and this key) from the output.
    Skip,
    /// Splice the pairs of the following map or list into the enclosing map.
    Inline,
}

/// Use as a key to drop the following value. See [`unless`].
pub const SKIP_THIS_PAIR: Value = Value::Sentinel(Sentinel::Skip);

/// Use as a key to have a pair-holding value treated as if its pairs were
/// passed in directly:
///
/// ```
/// fn assert_pairs(pairs: lager::RawMap) {
///     lager::fail().mmap("Assertion failed", lager::map!(lager::INLINE_PAIRS, pairs));
/// }
/// ```
pub const INLINE_PAIRS: Value = Value::Sentinel(Sentinel::Inline);

/// Returns `label` unless `cond` holds, in which case the returned key makes
/// the following value be skipped.
///
/// ```
/// # let err: Option<String> = None;
/// lager::debug().map(lager::map!(
///     "ran", "stage 2",
///     lager::unless(err.is_none(), "error"), err,
/// ));
/// ```
pub fn unless(cond: bool, label: &str) -> Value {
    if cond {
        SKIP_THIS_PAIR
    } else {
        Value::from(label)
    }
}

/// A flat list of alternating keys and values, written as a JSON object.
///
/// Nothing is deduplicated or reordered; keys may be [`Sentinel`]s. Build one
/// with [`map!`](crate::map).
#[derive(Clone, Debug, Default)]
pub struct RawMap(pub Vec<Value>);

impl RawMap {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<Value>> for RawMap {
    fn from(tokens: Vec<Value>) -> Self {
        RawMap(tokens)
    }
}

struct KvPairs {
    keys: Vec<String>,
    vals: Vec<Value>,
}

/// An ordered list of key/value pairs without duplicate keys.
///
/// An `AMap` is never changed once built; every operation returns a new map
/// (or an existing one, unchanged) so it is cheap to hold onto a map and use
/// it as context for many log lines.
#[derive(Clone, Default)]
pub struct AMap(Option<Arc<KvPairs>>);

impl AMap {
    /// An empty map.
    pub const fn new() -> Self {
        AMap(None)
    }

    /// Builds a map from alternating keys and values. A trailing key without
    /// a value gets a null value.
    pub fn pairs<I>(tokens: I) -> Self
    where
        I: IntoIterator<Item = Value>,
    {
        AMap::new().add_pairs(tokens)
    }

    /// Returns a map with the passed-in pairs added to, or replacing values
    /// in, this one. Replaced values keep their original position.
    pub fn add_pairs<I>(&self, tokens: I) -> Self
    where
        I: IntoIterator<Item = Value>,
    {
        let tokens: Vec<Value> = tokens.into_iter().collect();
        if tokens.is_empty() {
            return self.clone();
        }
        let mut builder = Builder::with_base(self, (tokens.len() + 1) / 2);
        let mut tokens = tokens.into_iter();
        while let Some(key) = tokens.next() {
            let val = tokens.next().unwrap_or(Value::Null);
            builder.set(to_key_string(&key), val);
        }
        builder.finish()
    }

    /// Returns a map with the pairs from `other` added to, or replacing
    /// values in, this one. If either side is empty, the other side is
    /// returned as is (the same instance, not a copy).
    pub fn merge(&self, other: &AMap) -> Self {
        let (Some(a), Some(b)) = (&self.0, &other.0) else {
            return if self.is_empty() {
                other.clone()
            } else {
                self.clone()
            };
        };
        if b.keys.is_empty() {
            return self.clone();
        }
        if a.keys.is_empty() {
            return other.clone();
        }
        let mut builder = Builder::with_base(self, b.keys.len());
        for (key, val) in b.keys.iter().zip(&b.vals) {
            builder.set(key.clone(), val.clone());
        }
        builder.finish()
    }

    pub fn len(&self) -> usize {
        self.0.as_ref().map_or(0, |kv| kv.keys.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        let kv = self.0.as_ref()?;
        let idx = kv.keys.iter().position(|k| k == key)?;
        Some(&kv.vals[idx])
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.iter().map(|(k, _)| k)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0
            .iter()
            .flat_map(|kv| kv.keys.iter().map(String::as_str).zip(kv.vals.iter()))
    }

    /// Whether both maps are the same instance. Two empty maps always are.
    pub fn ptr_eq(a: &AMap, b: &AMap) -> bool {
        match (&a.0, &b.0) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            (None, None) => true,
            _ => false,
        }
    }
}

impl fmt::Debug for AMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

// Copy-on-write accumulation. The index only lives while pairs are added.
struct Builder {
    keys: Vec<String>,
    vals: Vec<Value>,
    idx: HashMap<String, usize>,
}

impl Builder {
    fn with_base(base: &AMap, extra: usize) -> Self {
        let cap = base.len() + extra;
        let mut keys = Vec::with_capacity(cap);
        let mut vals = Vec::with_capacity(cap);
        let mut idx = HashMap::with_capacity(cap);
        if let Some(kv) = &base.0 {
            for (i, key) in kv.keys.iter().enumerate() {
                idx.insert(key.clone(), i);
            }
            keys.extend(kv.keys.iter().cloned());
            vals.extend(kv.vals.iter().cloned());
        }
        Builder { keys, vals, idx }
    }

    fn set(&mut self, key: String, val: Value) {
        if let Some(&i) = self.idx.get(&key) {
            self.vals[i] = val;
        } else {
            self.idx.insert(key.clone(), self.keys.len());
            self.keys.push(key);
            self.vals.push(val);
        }
    }

    fn finish(mut self) -> AMap {
        if self.keys.is_empty() {
            return AMap::new();
        }
        self.keys.shrink_to_fit();
        self.vals.shrink_to_fit();
        AMap(Some(Arc::new(KvPairs {
            keys: self.keys,
            vals: self.vals,
        })))
    }
}

/// Converts a value to the string used when it appears as a key.
///
/// Strings are used as is and bytes are decoded as text rather than listed
/// as numbers.
pub fn to_key_string(value: &Value) -> String {
    match value {
        Value::Null => "null".to_owned(),
        Value::Str(s) => s.clone(),
        Value::Bytes(b) => String::from_utf8_lossy(b).into_owned(),
        Value::I64(v) => v.to_string(),
        Value::U64(v) => v.to_string(),
        Value::I128(v) => v.to_string(),
        Value::U128(v) => v.to_string(),
        Value::F32(v) => v.to_string(),
        Value::F64(v) => v.to_string(),
        Value::Bool(v) => v.to_string(),
        Value::Error(e) => e.to_string(),
        Value::Display(d) => d.to_string(),
        Value::Lazy(f) => to_key_string(&f()),
        other => format!("{other:?}"),
    }
}

/// Builds an [`AList`] from any mix of values.
///
/// ```
/// lager::info().map(lager::map!("not in", lager::list!(1, "two", 3.0)));
/// ```
#[macro_export]
macro_rules! list {
    ($($value:expr),* $(,)?) => {
        <$crate::AList>::from([$($crate::Value::from($value)),*])
    };
}

/// Builds a [`RawMap`] from alternating keys and values.
///
/// ```
/// lager::info().list(lager::list!("Using", lager::map!("name", "tye", "age", 7)));
/// ```
#[macro_export]
macro_rules! map {
    ($($token:expr),* $(,)?) => {
        $crate::RawMap(<$crate::AList>::from([$($crate::Value::from($token)),*]))
    };
}

/// Builds an [`AMap`] from alternating keys and values, keeping the last
/// value (in the first position) for repeated keys.
///
/// ```
/// let ctx = lager::pairs!("ip", "10.0.1.2", "user", "tye");
/// lager::info().with(&[ctx]).mmap("Logged in", lager::map!());
/// ```
#[macro_export]
macro_rules! pairs {
    ($($token:expr),* $(,)?) => {
        $crate::AMap::pairs(<$crate::AList>::from([$($crate::Value::from($token)),*]))
    };
}
