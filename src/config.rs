use std::{env, sync::Arc};

use chrono::{DateTime, Utc};

use crate::{
    buffer::Output,
    level::{Severity, N_LEVELS},
};

/// Levels enabled when nothing else was asked for.
pub const DEFAULT_LEVELS: &str = "FWNA";

/// Letters of the levels that can be switched on and off.
pub const OPTIONAL_LEVELS: &str = "FWNAITDOG";

/// Errors from building a key scheme.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KeysError {
    #[error("expected 6 comma-separated labels, found {found} in {value:?}")]
    Arity { found: usize, value: String },
    #[error("only keys for msg and ctx can be blank, not in {value:?}")]
    BlankKey { value: String },
}

/// The labels used when log lines are written as JSON objects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Keys {
    pub when: String,
    pub lev: String,
    pub msg: String,
    pub args: String,
    pub ctx: String,
    pub module: String,
}

impl Keys {
    /// `msg` may be blank to put the message into the `args` list and `ctx`
    /// may be blank to inline context pairs at the top level. No other label
    /// may be blank.
    pub fn new(
        when: &str,
        lev: &str,
        msg: &str,
        args: &str,
        ctx: &str,
        module: &str,
    ) -> Result<Keys, KeysError> {
        let keys = Keys {
            when: when.to_owned(),
            lev: lev.to_owned(),
            msg: msg.to_owned(),
            args: args.to_owned(),
            ctx: ctx.to_owned(),
            module: module.to_owned(),
        };
        if [when, lev, args, module].iter().any(|k| k.is_empty()) {
            return Err(KeysError::BlankKey {
                value: keys.labels().join(","),
            });
        }
        Ok(keys)
    }

    /// Parses 6 comma-separated labels, as used in `LAGER_KEYS`.
    pub fn parse(value: &str) -> Result<Keys, KeysError> {
        let labels: Vec<&str> = value.split(',').collect();
        let [when, lev, msg, args, ctx, module] = labels.as_slice() else {
            return Err(KeysError::Arity {
                found: labels.len(),
                value: value.to_owned(),
            });
        };
        Keys::new(when, lev, msg, args, ctx, module)
    }

    /// The labels that GCP logging understands.
    pub fn gcp() -> Keys {
        Keys {
            when: "time".to_owned(),
            lev: "severity".to_owned(),
            msg: "message".to_owned(),
            args: "data".to_owned(),
            ctx: String::new(),
            module: "module".to_owned(),
        }
    }

    fn labels(&self) -> [&str; 6] {
        [
            &self.when,
            &self.lev,
            &self.msg,
            &self.args,
            &self.ctx,
            &self.module,
        ]
    }
}

/// Maps level names to the numeric severities GCP logging uses.
pub fn gcp_level_name(lev: &'static str) -> &'static str {
    match lev.as_bytes().first() {
        Some(b'P' | b'E') => "600",
        Some(b'F') => "500",
        Some(b'W') => "400",
        Some(b'N') => "300",
        Some(b'A' | b'I') => "200",
        Some(b'T' | b'D' | b'O' | b'G') => "100",
        _ => lev,
    }
}

/// Returns the distinct level letters found in `levels` along with which
/// severities they enable. `Panic` and `Exit` are always enabled.
pub(crate) fn parse_levels(levels: &str) -> (String, [bool; N_LEVELS]) {
    let mut enabled = [false; N_LEVELS];
    enabled[Severity::Panic.index()] = true;
    enabled[Severity::Exit.index()] = true;
    let mut codes = String::with_capacity(OPTIONAL_LEVELS.len());
    for c in levels.chars().filter(|c| OPTIONAL_LEVELS.contains(*c)) {
        if let Some(sev) = Severity::from_code(c as u8) {
            enabled[sev.index()] = true;
        }
        if !codes.contains(c) {
            codes.push(c);
        }
    }
    (codes, enabled)
}

fn identity_notation(lev: &'static str) -> &'static str {
    lev
}

/// An immutable record of how lines get written.
///
/// Changes made through [`update`](crate::globals::update) build a new
/// record; one already in use is never touched.
#[derive(Debug, Clone)]
pub struct Config {
    pub(crate) levels: String,
    pub(crate) enabled: [bool; N_LEVELS],
    pub(crate) keys: Option<Arc<Keys>>,
    pub(crate) dest: Option<Output>,
    pub(crate) err_dest: Output,
    pub(crate) path_parts: usize,
    pub(crate) level_notation: fn(&'static str) -> &'static str,
    pub(crate) in_gcp: bool,
    pub(crate) span_prefix: String,
    pub(crate) clock: fn() -> DateTime<Utc>,
    pub(crate) log_internal_errors: bool,
}

impl Default for Config {
    fn default() -> Self {
        let mut config = Config {
            levels: String::new(),
            enabled: [false; N_LEVELS],
            keys: None,
            dest: None,
            err_dest: Output::stderr(),
            path_parts: 3,
            level_notation: identity_notation,
            in_gcp: false,
            span_prefix: default_span_prefix(),
            clock: Utc::now,
            log_internal_errors: false,
        };
        config.set_levels("");
        config
    }
}

impl Config {
    /// Reads `LAGER_LEVELS`, `LAGER_KEYS`, `LAGER_GCP` and
    /// `LAGER_SPAN_PREFIX` from the process environment.
    pub fn from_env() -> (Config, Option<KeysError>) {
        Config::from_env_vars(|name| env::var(name).ok())
    }

    /// Like [`from_env`](Config::from_env) but reads variables through
    /// `lookup`. An invalid `LAGER_KEYS` leaves lines in array form and
    /// returns the error alongside the config.
    pub fn from_env_vars<F>(lookup: F) -> (Config, Option<KeysError>)
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.is_empty());
        let mut config = Config::default();
        config.set_levels(&var("LAGER_LEVELS").unwrap_or_default());
        if let Some(prefix) = var("LAGER_SPAN_PREFIX") {
            config.set_span_prefix(prefix);
        }
        if var("LAGER_GCP").is_some() {
            config.set_running_in_gcp(true);
        }
        let mut err = None;
        if let Some(keys) = var("LAGER_KEYS") {
            match Keys::parse(&keys) {
                Ok(keys) => {
                    config.set_keys(Some(keys));
                }
                Err(e) => err = Some(e),
            }
        }
        (config, err)
    }

    /// Enables the levels whose letters appear in `levels`; see
    /// [`init`](crate::init).
    pub fn set_levels(&mut self, levels: &str) -> &mut Self {
        let levels = if levels.is_empty() {
            DEFAULT_LEVELS
        } else {
            levels
        };
        (self.levels, self.enabled) = parse_levels(levels);
        self
    }

    /// `None` goes back to writing JSON arrays.
    pub fn set_keys(&mut self, keys: Option<Keys>) -> &mut Self {
        self.keys = keys.map(Arc::new);
        self
    }

    /// `None` goes back to stdout (stderr for `Panic` and `Exit`).
    pub fn set_output(&mut self, dest: Option<Output>) -> &mut Self {
        self.dest = dest;
        self
    }

    /// Where `Panic` and `Exit` lines go.
    pub fn set_error_output(&mut self, dest: Output) -> &mut Self {
        self.err_dest = dest;
        self
    }

    /// How many trailing path components of a source file to log; 0 keeps
    /// the whole path.
    pub fn set_path_parts(&mut self, path_parts: usize) -> &mut Self {
        self.path_parts = path_parts;
        self
    }

    /// `None` restores the plain level names.
    pub fn set_level_notation(
        &mut self,
        notation: Option<fn(&'static str) -> &'static str>,
    ) -> &mut Self {
        self.level_notation = notation.unwrap_or(identity_notation);
        self
    }

    /// Switches to GCP level numbers and, unless keys were already chosen,
    /// to GCP's key names.
    pub fn set_running_in_gcp(&mut self, in_gcp: bool) -> &mut Self {
        self.in_gcp = in_gcp;
        if in_gcp {
            self.level_notation = gcp_level_name;
            if self.keys.is_none() {
                self.keys = Some(Arc::new(Keys::gcp()));
            }
        }
        self
    }

    pub fn set_span_prefix(&mut self, prefix: impl Into<String>) -> &mut Self {
        self.span_prefix = prefix.into();
        self
    }

    pub fn set_clock(&mut self, clock: fn() -> DateTime<Utc>) -> &mut Self {
        self.clock = clock;
        self
    }

    pub fn set_log_internal_errors(&mut self, log_internal_errors: bool) -> &mut Self {
        self.log_internal_errors = log_internal_errors;
        self
    }

    /// The enabled optional levels, by letter.
    pub fn levels(&self) -> &str {
        &self.levels
    }

    pub fn enabled(&self, sev: Severity) -> bool {
        self.enabled[sev.index()]
    }

    pub fn keys(&self) -> Option<&Keys> {
        self.keys.as_deref()
    }

    pub fn path_parts(&self) -> usize {
        self.path_parts
    }

    pub fn in_gcp(&self) -> bool {
        self.in_gcp
    }

    pub fn span_prefix(&self) -> &str {
        &self.span_prefix
    }

    pub(crate) fn level_name(&self, sev: Severity) -> &'static str {
        (self.level_notation)(sev.name())
    }

    pub(crate) fn output_for(&self, sev: Severity) -> Output {
        if sev.always_enabled() {
            return self.err_dest.clone();
        }
        self.dest.clone().unwrap_or_else(Output::stdout)
    }

    pub(crate) fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }
}

fn default_span_prefix() -> String {
    env::args()
        .next()
        .and_then(|arg0| arg0.rsplit(['/', '\\']).next().map(str::to_owned))
        .unwrap_or_default()
}
