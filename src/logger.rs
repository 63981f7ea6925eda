use std::{
    fmt,
    panic::Location,
    path::{Component, Path},
    sync::{Arc, OnceLock},
};

use crate::{
    buffer::Buffer,
    config::Config,
    data::{AList, AMap, RawMap},
    fatal::exit_after_line,
    globals::snapshot,
    level::Severity,
    value::Value,
    write_adaptor::LogWriter,
};

/// A severity-bound handle for writing log lines.
///
/// Obtain one from [`fail()`], [`info()`] and the other level selectors.
/// For a disabled level the handle is a shared no-op that ignores every
/// call without looking at its arguments, so deferred values passed to it
/// are never computed.
///
/// Of the several methods that write a line, [`mmap`](Lager::mmap) is
/// usually the one to use:
///
/// ```
/// lager::fail().mmap("Can't merge", lager::map!("dest", "localhost", "err", "refused"));
/// ```
#[derive(Clone)]
pub struct Lager(Arc<Inner>);

enum Inner {
    Noop,
    Logger(Logger),
}

#[derive(Clone)]
struct Logger {
    sev: Severity,
    kvp: AMap,
    module: Option<Arc<str>>,
    config: Arc<Config>,
}

impl Lager {
    pub(crate) fn new(sev: Severity, config: Arc<Config>) -> Self {
        Lager(Arc::new(Inner::Logger(Logger {
            sev,
            kvp: AMap::new(),
            module: None,
            config,
        })))
    }

    pub(crate) fn noop() -> Self {
        static NOOP: OnceLock<Lager> = OnceLock::new();
        NOOP.get_or_init(|| Lager(Arc::new(Inner::Noop))).clone()
    }

    fn logger(&self) -> Option<&Logger> {
        match &*self.0 {
            Inner::Noop => None,
            Inner::Logger(l) => Some(l),
        }
    }

    fn derive(&self, f: impl FnOnce(&mut Logger)) -> Lager {
        match self.logger() {
            None => self.clone(),
            Some(l) => {
                let mut l = l.clone();
                f(&mut l);
                Lager(Arc::new(Inner::Logger(l)))
            }
        }
    }

    /// Whether both handles are the same instance.
    pub fn ptr_eq(a: &Lager, b: &Lager) -> bool {
        Arc::ptr_eq(&a.0, &b.0)
    }

    /// Whether lines written through this handle go anywhere.
    pub fn enabled(&self) -> bool {
        self.logger().is_some()
    }

    /// The severity lines are written at, `None` for a disabled level.
    pub fn severity(&self) -> Option<Severity> {
        self.logger().map(|l| l.sev)
    }

    /// The pairs added to every line written through this handle.
    pub fn context(&self) -> AMap {
        self.logger().map(|l| l.kvp.clone()).unwrap_or_default()
    }

    /// Returns a handle that also adds the pairs from `ctxs` to each line.
    /// When nothing gets added this same handle is returned.
    pub fn with(&self, ctxs: &[AMap]) -> Lager {
        let Some(l) = self.logger() else {
            return self.clone();
        };
        let kvp = ctxs.iter().fold(l.kvp.clone(), |kvp, ctx| kvp.merge(ctx));
        if AMap::ptr_eq(&kvp, &l.kvp) {
            return self.clone();
        }
        self.derive(|l| l.kvp = kvp)
    }

    /// Returns a handle that tags each line with a module name.
    pub fn with_module(&self, module: &str) -> Lager {
        let module = (!module.is_empty()).then(|| Arc::from(module));
        self.derive(|l| l.module = module)
    }

    /// Returns a handle that adds `_file` and `_line` pairs naming the code
    /// that called this method.
    #[track_caller]
    pub fn with_caller(&self) -> Lager {
        let Some(l) = self.logger() else {
            return self.clone();
        };
        let caller = Location::caller();
        let file = shorten_path(caller.file(), l.config.path_parts());
        let kvp = l
            .kvp
            .add_pairs(list!("_file", file, "_line", caller.line()));
        self.derive(|l| l.kvp = kvp)
    }

    /// Writes a list of values.
    ///
    /// With no key scheme this is `[ts, lev, args...]` for several
    /// arguments, `[ts, lev, arg]` for one and `[ts, lev, []]` for none.
    pub fn list(&self, args: AList) {
        let Some(l) = self.logger() else { return };
        let mut b = l.start();
        match l.config.keys() {
            None => match args.as_slice() {
                [arg] => b.scalar(arg),
                args => list_into(&mut b, args),
            },
            Some(keys) if args.len() == 1 && !keys.msg.is_empty() => {
                b.pair(&keys.msg, &args[0]);
                l.gcp_json(&mut b, true);
            }
            Some(keys) => {
                b.key(&keys.args);
                list_into(&mut b, &args);
            }
        }
        l.end(b);
    }

    /// Writes a message followed by a list of values.
    pub fn mlist(&self, msg: &str, args: AList) {
        let Some(l) = self.logger() else { return };
        let mut b = l.start();
        match l.config.keys() {
            None if args.is_empty() => b.quote(msg),
            None => b.msg_list(msg, &args),
            Some(keys) if !keys.msg.is_empty() => {
                b.key(&keys.msg);
                b.quote(msg);
                if args.is_empty() {
                    l.gcp_json(&mut b, true);
                } else {
                    b.key(&keys.args);
                    list_into(&mut b, &args);
                }
            }
            Some(keys) => {
                b.key(&keys.args);
                b.msg_list(msg, &args);
            }
        }
        l.end(b);
    }

    /// Writes key/value pairs.
    pub fn map(&self, pairs: RawMap) {
        let Some(l) = self.logger() else { return };
        let mut b = l.start();
        if l.config.keys().is_none() {
            b.open("{");
            b.raw_pairs(&pairs.0);
            b.close("}");
        } else {
            b.raw_pairs(&pairs.0);
        }
        l.end(b);
    }

    /// Writes a message followed by key/value pairs.
    pub fn mmap(&self, msg: &str, pairs: RawMap) {
        let Some(l) = self.logger() else { return };
        let mut b = l.start();
        match l.config.keys() {
            None => {
                b.quote(msg);
                if !pairs.is_empty() {
                    b.open("{");
                    b.raw_pairs(&pairs.0);
                    b.close("}");
                }
            }
            Some(keys) => {
                let key = if keys.msg.is_empty() { "msg" } else { &keys.msg };
                b.key(key);
                b.quote(msg);
                b.raw_pairs(&pairs.0);
                l.gcp_json(&mut b, pairs.is_empty());
            }
        }
        l.end(b);
    }

    /// [`list`](Lager::list) with the caller's location added.
    #[track_caller]
    pub fn clist(&self, args: AList) {
        if self.enabled() {
            self.with_caller().list(args);
        }
    }

    /// [`mlist`](Lager::mlist) with the caller's location added.
    #[track_caller]
    pub fn cmlist(&self, msg: &str, args: AList) {
        if self.enabled() {
            self.with_caller().mlist(msg, args);
        }
    }

    /// [`map`](Lager::map) with the caller's location added.
    #[track_caller]
    pub fn cmap(&self, pairs: RawMap) {
        if self.enabled() {
            self.with_caller().map(pairs);
        }
    }

    /// [`mmap`](Lager::mmap) with the caller's location added.
    #[track_caller]
    pub fn cmmap(&self, msg: &str, pairs: RawMap) {
        if self.enabled() {
            self.with_caller().mmap(msg, pairs);
        }
    }

    /// An [`io::Write`](std::io::Write) that logs each line written to it.
    pub fn log_writer(&self) -> LogWriter {
        LogWriter::new(self.clone())
    }
}

impl fmt::Debug for Lager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.logger() {
            None => f.write_str("Lager(noop)"),
            Some(l) => f
                .debug_struct("Lager")
                .field("sev", &l.sev)
                .field("kvp", &l.kvp)
                .field("module", &l.module)
                .finish(),
        }
    }
}

fn list_into(b: &mut Buffer, args: &[Value]) {
    b.open("[");
    for arg in args {
        b.scalar(arg);
    }
    b.close("]");
}

impl Logger {
    fn start(&self) -> Buffer {
        let mut b = Buffer::acquire(self.config.output_for(self.sev), Arc::clone(&self.config));
        let keys = self.config.keys();
        if let Some(keys) = keys {
            b.open("{");
            b.key(&keys.when);
        } else {
            b.open("[");
        }
        b.timestamp();
        if let Some(keys) = keys {
            b.key(&keys.lev);
        }
        b.quote(self.config.level_name(self.sev));
        b
    }

    // GCP turns a line holding only a message into a text payload.
    fn gcp_json(&self, b: &mut Buffer, no_pairs: bool) {
        if self.config.in_gcp() && no_pairs && self.kvp.is_empty() {
            b.pair("json", &Value::from(1));
        }
    }

    fn end(&self, mut b: Buffer) {
        let keys = self.config.keys();
        if !self.kvp.is_empty() {
            match keys {
                Some(keys) if keys.ctx.is_empty() => b.pairs(&self.kvp),
                Some(keys) => {
                    b.key(&keys.ctx);
                    b.open("{");
                    b.pairs(&self.kvp);
                    b.close("}");
                }
                None => {
                    b.open("{");
                    b.pairs(&self.kvp);
                    b.close("}");
                }
            }
        }
        if let Some(module) = &self.module {
            match keys {
                Some(keys) => {
                    b.key(&keys.module);
                    b.quote(module);
                }
                None => b.quote(&format!("mod={module}")),
            }
        }
        b.close(if keys.is_some() { "}\n" } else { "]\n" });
        b.delim = "";
        b.release();

        match self.sev {
            Severity::Exit => exit_after_line(),
            Severity::Panic => panic!("lager::panic() logged (see above)"),
            _ => {}
        }
    }
}

/// Keeps the last `parts` components of `path`, or all of it for 0.
fn shorten_path(path: &str, parts: usize) -> String {
    if parts == 0 {
        return path.to_owned();
    }
    let components: Vec<Component<'_>> = Path::new(path).components().collect();
    if components.len() <= parts {
        return path.to_owned();
    }
    components[components.len() - parts..]
        .iter()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// The writer for a severity, from the current configuration.
pub fn for_severity(sev: Severity) -> Lager {
    snapshot().lager(sev).clone()
}

/// Logs, then panics. Always enabled.
pub fn panic() -> Lager {
    for_severity(Severity::Panic)
}

/// Logs to stderr, then exits the process (see
/// [`recover_exit`](crate::recover_exit)). Always enabled.
pub fn exit() -> Lager {
    for_severity(Severity::Exit)
}

/// Errors that are not part of the normal flow.
pub fn fail() -> Lager {
    for_severity(Severity::Fail)
}

/// Unusual conditions that may be signs of problems.
pub fn warn() -> Lager {
    for_severity(Severity::Warn)
}

/// Major milestones that are part of the normal flow.
pub fn note() -> Lager {
    for_severity(Severity::Note)
}

/// Access logs.
pub fn acc() -> Lager {
    for_severity(Severity::Access)
}

/// Minor milestones that are part of the normal flow.
pub fn info() -> Lager {
    for_severity(Severity::Info)
}

pub fn trace() -> Lager {
    for_severity(Severity::Trace)
}

pub fn debug() -> Lager {
    for_severity(Severity::Debug)
}

pub fn obj() -> Lager {
    for_severity(Severity::Obj)
}

pub fn guts() -> Lager {
    for_severity(Severity::Guts)
}

/// The writer for a severity given by its letter, in either case.
///
/// # Panics
///
/// For any byte that is not one of `"PEFWNAITDOG"`.
pub fn level(code: u8) -> Lager {
    match Severity::from_code(code) {
        Some(sev) => for_severity(sev),
        None => panic!(
            "level() must be one char from \"PEFWNAITDOG\" not {:?}",
            char::from(code)
        ),
    }
}

#[cfg(test)]
mod tests {
    use std::{
        panic::{self, AssertUnwindSafe},
        sync::{
            atomic::{AtomicUsize, Ordering},
            Arc,
        },
        thread,
    };

    use serde_json::json;

    use super::{shorten_path, Lager};
    use crate::{
        buffer::{Output, SCRATCH_SIZE},
        config::{Config, Keys},
        data::{AMap, INLINE_PAIRS},
        fatal::recover_exit,
        globals::Globals,
        level::Severity,
        tests::{fixed_clock, parse_lines, MockMakeWriter},
        value::Value,
    };

    fn setup(levels: &str, keys: Option<Keys>) -> (MockMakeWriter, Arc<Globals>) {
        let mock = MockMakeWriter::default();
        let mut config = Config::default();
        config
            .set_levels(levels)
            .set_keys(keys)
            .set_output(Some(Output::new(mock.clone())))
            .set_error_output(Output::new(mock.clone()))
            .set_clock(fixed_clock);
        (mock, Globals::new(config))
    }

    fn object_keys() -> Option<Keys> {
        Some(Keys::parse("t,l,msg,args,ctx,mod").unwrap())
    }

    #[test]
    fn array_line_is_byte_exact() {
        let (mock, g) = setup("", None);
        g.lager(Severity::Fail)
            .mmap("Can't merge", map!("dest", "localhost", "err", "refused"));
        assert_eq!(
            "[\"2019-12-31 23:59:59.1234Z\", \"FAIL\", \"Can't merge\", \
             {\"dest\":\"localhost\",\"err\":\"refused\"}]\n",
            mock.get_string()
        );
    }

    #[test]
    fn array_layouts() {
        let (mock, g) = setup("I", None);
        let info = g.lager(Severity::Info);
        info.list(list!());
        info.list(list!("one"));
        info.list(list!(1, "two"));
        info.mlist("msg", list!());
        info.mlist("msg", list!(1, 2));
        info.map(map!("a", 1));
        info.mmap("msg", map!());
        let with_ctx = info.with(&[pairs!("req", 7)]).with_module("db");
        with_ctx.mmap("hi", map!("k", "v"));
        assert_eq!(
            parse_lines(&mock.get_string()),
            vec![
                json!(["2019-12-31 23:59:59.1234Z", "INFO", []]),
                json!(["2019-12-31 23:59:59.1234Z", "INFO", "one"]),
                json!(["2019-12-31 23:59:59.1234Z", "INFO", [1, "two"]]),
                json!(["2019-12-31 23:59:59.1234Z", "INFO", "msg"]),
                json!(["2019-12-31 23:59:59.1234Z", "INFO", ["msg", 1, 2]]),
                json!(["2019-12-31 23:59:59.1234Z", "INFO", {"a": 1}]),
                json!(["2019-12-31 23:59:59.1234Z", "INFO", "msg"]),
                json!(["2019-12-31 23:59:59.1234Z", "INFO", "hi", {"k": "v"}, {"req": 7}, "mod=db"]),
            ]
        );
    }

    #[test]
    fn object_layouts() {
        let (mock, g) = setup("I", object_keys());
        let info = g.lager(Severity::Info);
        info.list(list!("one"));
        info.list(list!(1, 2));
        info.mlist("m", list!(1));
        info.map(map!("a", 1, "b", 2));
        info.with(&[pairs!("req", 7)])
            .with_module("db")
            .mmap("hi", map!("k", "v"));
        assert_eq!(
            parse_lines(&mock.get_string()),
            vec![
                json!({"t": "2019-12-31T23:59:59.1234Z", "l": "INFO", "msg": "one"}),
                json!({"t": "2019-12-31T23:59:59.1234Z", "l": "INFO", "args": [1, 2]}),
                json!({"t": "2019-12-31T23:59:59.1234Z", "l": "INFO", "msg": "m", "args": [1]}),
                json!({"t": "2019-12-31T23:59:59.1234Z", "l": "INFO", "a": 1, "b": 2}),
                json!({
                    "t": "2019-12-31T23:59:59.1234Z", "l": "INFO", "msg": "hi", "k": "v",
                    "ctx": {"req": 7}, "mod": "db",
                }),
            ]
        );
        assert!(mock
            .get_string()
            .starts_with("{\"t\":\"2019-12-31T23:59:59.1234Z\",\"l\":\"INFO\",\"msg\":\"one\"}\n"));
    }

    #[test]
    fn blank_msg_and_ctx_keys() {
        let (mock, g) = setup("I", Some(Keys::parse("t,l,,args,,mod").unwrap()));
        let info = g.lager(Severity::Info).with(&[pairs!("req", 7)]);
        info.mlist("m", list!());
        info.mlist("m", list!(1));
        info.mmap("hi", map!());
        assert_eq!(
            parse_lines(&mock.get_string()),
            vec![
                json!({"t": "2019-12-31T23:59:59.1234Z", "l": "INFO", "args": ["m"], "req": 7}),
                json!({"t": "2019-12-31T23:59:59.1234Z", "l": "INFO", "args": ["m", 1], "req": 7}),
                json!({"t": "2019-12-31T23:59:59.1234Z", "l": "INFO", "msg": "hi", "req": 7}),
            ]
        );
    }

    #[test]
    fn gcp_keeps_payload_structured() {
        let mock = MockMakeWriter::default();
        let mut config = Config::default();
        config
            .set_running_in_gcp(true)
            .set_output(Some(Output::new(mock.clone())))
            .set_clock(fixed_clock);
        let g = Globals::new(config);
        let warn = g.lager(Severity::Warn);
        warn.mmap("alone", map!());
        warn.mmap("paired", map!("k", 1));
        warn.list(list!("single"));
        assert_eq!(
            parse_lines(&mock.get_string()),
            vec![
                json!({"time": "2019-12-31T23:59:59.1234Z", "severity": "400", "message": "alone", "json": 1}),
                json!({"time": "2019-12-31T23:59:59.1234Z", "severity": "400", "message": "paired", "k": 1}),
                json!({"time": "2019-12-31T23:59:59.1234Z", "severity": "400", "message": "single", "json": 1}),
            ]
        );
    }

    #[test]
    fn disabled_writer_writes_nothing_and_calls_nothing() {
        let (mock, g) = setup("F", None);
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let lazy = Value::lazy(move || counter.fetch_add(1, Ordering::SeqCst));
        let debug = g.lager(Severity::Debug);
        assert!(!debug.enabled());
        debug.mmap("skipped", map!("n", lazy.clone()));
        debug.list(list!(lazy.clone()));
        debug.with_caller().cmap(map!("n", lazy.clone()));
        assert!(mock.get_string().is_empty());
        assert_eq!(0, calls.load(Ordering::SeqCst));

        g.lager(Severity::Fail).map(map!("n", lazy));
        assert_eq!(1, calls.load(Ordering::SeqCst));
    }

    #[test]
    fn with_nothing_new_is_identity() {
        let (_, g) = setup("I", None);
        let info = g.lager(Severity::Info);
        assert!(Lager::ptr_eq(info, &info.with(&[])));
        assert!(Lager::ptr_eq(info, &info.with(&[AMap::new()])));
        let ctx = pairs!("a", 1);
        let with = info.with(&[ctx.clone()]);
        assert!(!Lager::ptr_eq(info, &with));
        assert!(AMap::ptr_eq(&ctx, &with.context()));
        assert!(Lager::ptr_eq(&with, &with.with(&[AMap::new()])));
    }

    #[test]
    fn caller_location_is_added() {
        let (mock, g) = setup("I", None);
        let line = line!() + 1;
        g.lager(Severity::Info).cmmap("here", map!());
        let lines = parse_lines(&mock.get_string());
        let ctx = &lines[0][3];
        assert_eq!(json!(line), ctx["_line"]);
        assert_eq!(json!("src/logger.rs"), ctx["_file"]);
        assert_eq!("a/b/c.rs", shorten_path("/x/y/a/b/c.rs", 3));
        assert_eq!("c.rs", shorten_path("a/b/c.rs", 1));
        assert_eq!("/x/c.rs", shorten_path("/x/c.rs", 0));
    }

    #[test]
    fn inline_pairs_in_a_line() {
        let (mock, g) = setup("F", None);
        let base = pairs!("x", 1);
        g.lager(Severity::Fail)
            .mmap("Assertion failed", map!(INLINE_PAIRS, base, "y", 2));
        assert_eq!(
            parse_lines(&mock.get_string()),
            vec![json!(["2019-12-31 23:59:59.1234Z", "FAIL", "Assertion failed", {"x": 1, "y": 2}])]
        );
    }

    #[test]
    fn exit_is_recoverable() {
        let (mock, g) = setup("", None);
        let mut seen = 0;
        let done = recover_exit(
            || g.lager(Severity::Exit).list(list!("bye")),
            |status| {
                seen = *status;
                *status = -1;
            },
        );
        assert_eq!(None, done);
        assert_eq!(1, seen);
        assert_eq!(
            parse_lines(&mock.get_string()),
            vec![json!(["2019-12-31 23:59:59.1234Z", "EXIT", "bye"])]
        );
    }

    #[test]
    fn panic_level_panics_after_writing() {
        let (mock, g) = setup("", None);
        let err = panic::catch_unwind(AssertUnwindSafe(|| {
            g.lager(Severity::Panic).mmap("oops", map!());
        }))
        .unwrap_err();
        assert_eq!(
            Some(&"lager::panic() logged (see above)"),
            err.downcast_ref::<&str>()
        );
        assert_eq!(
            parse_lines(&mock.get_string()),
            vec![json!(["2019-12-31 23:59:59.1234Z", "PANIC", "oops"])]
        );
    }

    #[test]
    fn level_rejects_unknown_codes() {
        let err = panic::catch_unwind(|| super::level(b'x')).unwrap_err();
        let msg = err.downcast_ref::<String>().unwrap();
        assert_eq!("level() must be one char from \"PEFWNAITDOG\" not 'x'", msg);
    }

    #[test]
    fn concurrent_lines_never_interleave() {
        const THREADS: usize = 8;
        const LINES: usize = 50;
        let (mock, g) = setup("I", None);
        let big = "z".repeat(SCRATCH_SIZE);
        thread::scope(|s| {
            for t in 0..THREADS {
                let info = g.lager(Severity::Info).clone();
                let big = &big;
                s.spawn(move || {
                    for n in 0..LINES {
                        if n % 10 == 0 {
                            info.mmap("big", map!("t", t, "n", n, "pad", big.as_str()));
                        } else {
                            info.mmap("small", map!("t", t, "n", n));
                        }
                    }
                });
            }
        });
        let lines = parse_lines(&mock.get_string());
        assert_eq!(THREADS * LINES, lines.len());
        for t in 0..THREADS {
            let mine: Vec<_> = lines
                .iter()
                .filter(|line| line[3]["t"] == json!(t))
                .map(|line| line[3]["n"].clone())
                .collect();
            assert_eq!(mine, (0..LINES).map(|n| json!(n)).collect::<Vec<_>>());
        }
    }
}
