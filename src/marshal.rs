//! Writing values into a line as JSON.

use std::{
    borrow::Cow,
    fmt::{self, Write as _},
    str,
    sync::{mpsc, Arc},
    thread,
    time::Duration,
};

use chrono::{Datelike, Timelike};

use crate::{
    buffer::{Buffer, COMMA},
    data::{to_key_string, Sentinel},
    value::{Lazy, Value},
};

const HEX_DIGITS: &[u8; 16] = b"0123456789ABCDEF";

/// How long a deferred value may run while the output lock is held.
pub(crate) const LAZY_TIMEOUT: Duration = Duration::from_millis(10);

pub(crate) const LAZY_TIMED_OUT: &str =
    "func call took more than 10ms while lager lock held (log line was already over 16KiB)";

const fn no_escape() -> [bool; 256] {
    let mut table = [false; 256];
    let mut c = b' ';
    while c < 0x7F {
        table[c as usize] = true;
        c += 1;
    }
    table[b'"' as usize] = false;
    table[b'\\' as usize] = false;
    table
}

static NO_ESC: [bool; 256] = no_escape();

// Decodes the character at the start of `s`, if it starts with valid UTF-8.
fn decode(s: &[u8]) -> Option<char> {
    let prefix = &s[..s.len().min(4)];
    let valid = match str::from_utf8(prefix) {
        Ok(text) => text,
        Err(err) => str::from_utf8(&prefix[..err.valid_up_to()]).ok()?,
    };
    valid.chars().next()
}

fn key_text(key: &Value) -> Cow<'_, str> {
    match key {
        Value::Str(s) => Cow::Borrowed(s),
        other => Cow::Owned(to_key_string(other)),
    }
}

impl fmt::Write for Buffer {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.write(s);
        Ok(())
    }
}

impl Buffer {
    /// Appends `s` as the inside of a JSON string.
    ///
    /// Invalid UTF-8 is kept visible: each run of bad bytes becomes
    /// `«x` followed by two hex digits per byte and then `»`.
    pub(crate) fn escape(&mut self, s: &[u8]) {
        let mut beg = 0;
        let mut i = 0;
        while i < s.len() {
            let c = s[i];
            if NO_ESC[c as usize] {
                i += 1;
                continue;
            }
            self.write_bytes(&s[beg..i]);
            if c < 0x80 {
                self.escape_rune(u32::from(c));
                i += 1;
            } else if let Some(ch) = decode(&s[i..]) {
                let len = ch.len_utf8();
                if 0xFFFF < u32::from(ch) {
                    let mut units = [0u16; 2];
                    for unit in ch.encode_utf16(&mut units) {
                        self.escape_rune(u32::from(*unit));
                    }
                } else if u32::from(ch) < 0xA0 {
                    self.escape_rune(u32::from(ch));
                } else {
                    self.write_bytes(&s[i..i + len]);
                }
                i += len;
            } else {
                i += self.non_utf8(&s[i..]);
            }
            beg = i;
        }
        self.write_bytes(&s[beg..]);
    }

    pub(crate) fn escape_rune(&mut self, r: u32) {
        let named = match r {
            0x22 => b'"',
            0x5C => b'\\',
            0x08 => b'b',
            0x0C => b'f',
            0x0A => b'n',
            0x0D => b'r',
            0x09 => b't',
            _ => {
                let mut esc = *b"\\u0000";
                for (o, digit) in esc[2..].iter_mut().rev().enumerate() {
                    *digit = HEX_DIGITS[(r >> (4 * o) & 0xF) as usize];
                }
                self.write_bytes(&esc);
                return;
            }
        };
        self.write_bytes(&[b'\\', named]);
    }

    // Writes the run of invalid bytes at the start of `s`; returns its length.
    fn non_utf8(&mut self, s: &[u8]) -> usize {
        self.write("«x");
        let mut i = 0;
        loop {
            let c = s[i];
            self.write_bytes(&[HEX_DIGITS[usize::from(c >> 4)], HEX_DIGITS[usize::from(c & 0xF)]]);
            i += 1;
            if i == s.len() || decode(&s[i..]).is_some() {
                break;
            }
        }
        self.write("»");
        i
    }

    pub(crate) fn quote(&mut self, s: &str) {
        self.quote_bytes(s.as_bytes());
    }

    pub(crate) fn quote_bytes(&mut self, s: &[u8]) {
        let delim = self.delim;
        self.write(delim);
        self.write("\"");
        self.escape(s);
        self.write("\"");
        self.delim = COMMA;
    }

    /// Begins a nested list or object.
    pub(crate) fn open(&mut self, punct: &str) {
        let delim = self.delim;
        self.write(delim);
        self.write(punct);
        self.delim = "";
    }

    pub(crate) fn close(&mut self, punct: &str) {
        self.write(punct);
        self.delim = COMMA;
    }

    /// Writes an object member's key and colon.
    pub(crate) fn key(&mut self, key: &str) {
        if !self.delim.is_empty() {
            self.write(",");
        }
        self.delim = "";
        self.quote(key);
        self.write(":");
        self.delim = "";
    }

    /// Writes one object member. A member whose value is an empty map is
    /// left out.
    pub(crate) fn pair(&mut self, key: &str, value: &Value) {
        let resolved;
        let value = match value {
            Value::Lazy(f) => {
                resolved = self.resolve(f);
                &resolved
            }
            v => v,
        };
        if value.is_empty_map() {
            return;
        }
        self.key(key);
        self.scalar(value);
    }

    pub(crate) fn pairs(&mut self, map: &crate::AMap) {
        for (key, value) in map.iter() {
            self.pair(key, value);
        }
    }

    /// Writes alternating keys and values, honoring skip and inline markers.
    pub(crate) fn raw_pairs(&mut self, tokens: &[Value]) {
        let mut tokens = tokens.iter();
        while let Some(key) = tokens.next() {
            match key {
                Value::Sentinel(Sentinel::Skip) => {
                    tokens.next();
                }
                Value::Sentinel(Sentinel::Inline) => {
                    if let Some(value) = tokens.next() {
                        self.inline(value);
                    }
                }
                key => {
                    let key = key_text(key);
                    self.pair(&key, tokens.next().unwrap_or(&Value::Null));
                }
            }
        }
    }

    fn inline(&mut self, value: &Value) {
        match value {
            Value::Lazy(f) => {
                let value = self.resolve(f);
                self.inline(&value);
            }
            Value::Map(map) => self.pairs(map),
            Value::Raw(raw) => self.raw_pairs(&raw.0),
            Value::List(list) => self.raw_pairs(list),
            other => self.pair("cannot-inline", other),
        }
    }

    /// Writes `[msg, args...]`.
    pub(crate) fn msg_list(&mut self, msg: &str, args: &[Value]) {
        self.open("[");
        self.quote(msg);
        for arg in args {
            self.scalar(arg);
        }
        self.close("]");
    }

    /// Appends the JSON form of `value`. An empty [`AMap`](crate::AMap)
    /// writes nothing at all.
    pub(crate) fn scalar(&mut self, value: &Value) {
        if let Value::Lazy(f) = value {
            let value = self.resolve(f);
            return self.scalar(&value);
        }
        if value.is_empty_map() {
            return;
        }
        let delim = self.delim;
        self.write(delim);
        self.delim = "";
        // Room for any number.
        self.reserve(64);
        match value {
            Value::Null | Value::Lazy(_) | Value::Sentinel(_) => self.write("null"),
            Value::Str(s) => self.quote(s),
            Value::Bytes(b) => self.quote_bytes(b),
            Value::I64(v) => self.display(v),
            Value::U64(v) => self.display(v),
            Value::I128(v) => self.display(v),
            Value::U128(v) => self.display(v),
            Value::F32(v) => self.float(*v),
            Value::F64(v) => self.float(*v),
            Value::Bool(v) => self.write(if *v { "true" } else { "false" }),
            Value::StrList(list) => {
                self.open("[");
                for s in list {
                    self.quote(s);
                }
                self.close("]");
            }
            Value::List(list) => {
                self.open("[");
                for item in list {
                    self.scalar(item);
                }
                self.close("]");
            }
            Value::Map(map) => {
                self.open("{");
                self.pairs(map);
                self.close("}");
            }
            Value::Raw(raw) => {
                self.open("{");
                self.raw_pairs(&raw.0);
                self.close("}");
            }
            Value::Object(object) => {
                let mut keys: Vec<&String> = object.keys().collect();
                keys.sort();
                self.open("{");
                for key in keys {
                    self.pair(key, &object[key]);
                }
                self.close("}");
            }
            Value::Error(err) => {
                let err = Arc::clone(err);
                let text = self.call(move || err.to_string());
                self.quote(text.as_deref().unwrap_or(LAZY_TIMED_OUT));
            }
            Value::Display(d) => {
                let d = Arc::clone(d);
                let text = self.call(move || d.to_string());
                self.quote(text.as_deref().unwrap_or(LAZY_TIMED_OUT));
            }
            Value::Marshal(m) => {
                let m = Arc::clone(m);
                let json = self.call(move || m.marshal().map_err(|err| format!("! {err}; {m:?}")));
                match json {
                    Some(Ok(bytes)) => self.write_bytes(&bytes),
                    Some(Err(text)) => self.quote(&text),
                    None => self.quote(LAZY_TIMED_OUT),
                }
            }
        }
        self.delim = COMMA;
    }

    fn display(&mut self, v: impl fmt::Display) {
        let _ = write!(self, "{v}");
    }

    // JSON has no NaN or infinities, so those are written as strings.
    fn float<F>(&mut self, v: F)
    where
        F: Into<f64> + fmt::Display + fmt::LowerExp + Copy,
    {
        let wide: f64 = v.into();
        if wide.is_nan() {
            self.write("\"NaN\"");
        } else if wide.is_infinite() {
            self.write(if wide < 0.0 { "\"-Inf\"" } else { "\"+Inf\"" });
        } else if wide.abs() >= 1e21 || (wide != 0.0 && wide.abs() < 1e-4) {
            let _ = write!(self, "{v:e}");
        } else {
            let _ = write!(self, "{v}");
        }
    }

    /// Calls a deferred value. While the output lock is held the call only
    /// gets [`LAZY_TIMEOUT`] before a placeholder is used instead.
    pub(crate) fn resolve(&self, f: &Lazy) -> Value {
        let f = Arc::clone(f);
        self.call(move || f())
            .unwrap_or_else(|| Value::from(LAZY_TIMED_OUT))
    }

    // Runs caller code for a value. Under the output lock it runs on its own
    // thread for at most `LAZY_TIMEOUT`, so code that logs cannot deadlock.
    fn call<T, F>(&self, f: F) -> Option<T>
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        if !self.is_locked() {
            return Some(f());
        }
        let (tx, rx) = mpsc::sync_channel(1);
        thread::Builder::new()
            .name("lager-lazy".to_owned())
            .spawn(move || {
                let _ = tx.send(f());
            })
            .ok()?;
        rx.recv_timeout(LAZY_TIMEOUT).ok()
    }

    /// Appends the quoted current time, to a tenth of a millisecond.
    pub(crate) fn timestamp(&mut self) {
        let now = self.config.now();
        let sep = if self.config.keys.is_none() { ' ' } else { 'T' };
        let delim = self.delim;
        self.write(delim);
        let _ = write!(
            self,
            "\"{}-{:02}-{:02}{sep}{:02}:{:02}:{:02}.{:04}Z\"",
            now.year(),
            now.month(),
            now.day(),
            now.hour(),
            now.minute(),
            now.second(),
            (now.nanosecond() / 100_000).min(9999),
        );
        self.delim = COMMA;
    }
}
