use std::sync::{Arc, OnceLock};

use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use parking_lot::{const_mutex, Mutex};

use crate::{
    buffer::Output,
    config::{Config, Keys, KeysError},
    level::{Severity, N_LEVELS},
    logger::Lager,
};

/// One published configuration along with a writer for each severity.
///
/// Writers hold on to the configuration they were built from, so a writer
/// kept around keeps writing the way it did until it is obtained again.
pub struct Globals {
    config: Arc<Config>,
    lagers: [Lager; N_LEVELS],
}

impl Globals {
    /// Builds a snapshot that is not published anywhere. Writers taken from
    /// it never look at the process-wide configuration.
    pub fn new(config: Config) -> Arc<Globals> {
        let config = Arc::new(config);
        let lagers = Severity::ALL.map(|sev| {
            if config.enabled(sev) {
                Lager::new(sev, Arc::clone(&config))
            } else {
                Lager::noop()
            }
        });
        Arc::new(Globals { config, lagers })
    }

    pub fn lager(&self, sev: Severity) -> &Lager {
        &self.lagers[sev.index()]
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub(crate) fn config_arc(&self) -> Arc<Config> {
        Arc::clone(&self.config)
    }
}

static UPDATE_LOCK: Mutex<()> = const_mutex(());

fn published() -> &'static ArcSwap<Globals> {
    static GLOBALS: OnceLock<ArcSwap<Globals>> = OnceLock::new();
    let mut bad_keys = None;
    let swap = GLOBALS.get_or_init(|| {
        let (config, err) = Config::from_env();
        bad_keys = err;
        ArcSwap::new(Globals::new(config))
    });
    if let Some(err) = bad_keys {
        report_bad_keys(&swap.load(), &err);
    }
    swap
}

pub(crate) fn report_bad_keys(globals: &Globals, err: &KeysError) {
    let exit = globals.lager(Severity::Exit);
    match err {
        KeysError::Arity { found, value } => exit.mmap(
            "LAGER_KEYS expected 6 comma-separated labels",
            map!("Not", *found, "Value", value),
        ),
        KeysError::BlankKey { value } => exit.mmap(
            "Only keys for msg and ctx can be blank",
            map!("LAGER_KEYS", value),
        ),
    }
}

/// The configuration currently in effect. Never blocks.
pub fn snapshot() -> Arc<Globals> {
    published().load_full()
}

/// Publishes a changed copy of the current configuration.
///
/// Updates are serialized with each other; readers keep using whatever
/// snapshot they already have.
pub fn update(f: impl FnOnce(&mut Config)) {
    let swap = published();
    let _guard = UPDATE_LOCK.lock();
    let mut config = Config::clone(&swap.load().config);
    f(&mut config);
    swap.store(Globals::new(config));
}

/// Enables the optional levels whose letters appear in `levels`.
///
/// Letters come from `"FWNAITDOG"` (Fail, Warn, Note, Acc, Info, Trace,
/// Debug, Obj, Guts); anything else is ignored, so `init("Fail Warn Note")`
/// works too. `init("")` is the default, `"FWNA"`, and `init("-")` disables
/// every optional level. `Panic` and `Exit` are always enabled.
pub fn init(levels: &str) {
    update(|config| {
        config.set_levels(levels);
    });
}

/// Writes lines as JSON objects using these keys, or as JSON arrays when
/// every key is blank.
///
/// Only `msg` and `ctx` may be blank otherwise; anything else is logged at
/// `Exit` level.
#[track_caller]
pub fn keys(when: &str, lev: &str, msg: &str, args: &str, ctx: &str, module: &str) {
    if [when, lev, msg, args, ctx, module].iter().all(|k| k.is_empty()) {
        set_keys(None);
        return;
    }
    match Keys::new(when, lev, msg, args, ctx, module) {
        Ok(keys) => set_keys(Some(keys)),
        Err(err) => crate::exit()
            .with_caller()
            .mmap("Only keys for msg and ctx can be blank", map!("error", err.to_string())),
    }
}

pub fn set_keys(keys: Option<Keys>) {
    update(|config| {
        config.set_keys(keys);
    });
}

/// Sends lines to `dest` (or back to the defaults for `None`) and returns
/// the destination that was in use before.
pub fn set_output(dest: Option<Output>) -> Option<Output> {
    let mut prior = None;
    update(|config| {
        prior = config.dest.take();
        config.set_output(dest);
    });
    prior
}

pub fn set_error_output(dest: Output) {
    update(|config| {
        config.set_error_output(dest);
    });
}

pub fn set_path_parts(path_parts: usize) {
    update(|config| {
        config.set_path_parts(path_parts);
    });
}

pub fn set_level_notation(notation: Option<fn(&'static str) -> &'static str>) {
    update(|config| {
        config.set_level_notation(notation);
    });
}

/// Makes lines friendlier to GCP logging; see
/// [`Config::set_running_in_gcp`].
pub fn running_in_gcp() {
    update(|config| {
        config.set_running_in_gcp(true);
    });
}

/// The prefix for span names, by default the name of the executable.
pub fn span_prefix() -> String {
    snapshot().config().span_prefix().to_owned()
}

pub fn set_span_prefix(prefix: &str) {
    update(|config| {
        config.set_span_prefix(prefix);
    });
}

pub fn set_clock(clock: fn() -> DateTime<Utc>) {
    update(|config| {
        config.set_clock(clock);
    });
}

/// Reports failures to write log lines on stderr.
pub fn log_internal_errors(log_internal_errors: bool) {
    update(|config| {
        config.set_log_internal_errors(log_internal_errors);
    });
}

/// Letters of the optional levels currently enabled.
pub fn enabled_levels() -> String {
    snapshot().config().levels().to_owned()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::{report_bad_keys, Globals};
    use crate::{
        buffer::Output,
        config::{Config, KeysError},
        fatal::recover_exit,
        level::Severity,
        tests::{fixed_clock, global_lock, MockMakeWriter},
    };

    #[test]
    fn disabled_levels_get_the_noop_writer() {
        let mut config = Config::default();
        config.set_levels("W");
        let globals = Globals::new(config);
        assert!(globals.lager(Severity::Warn).enabled());
        assert!(!globals.lager(Severity::Fail).enabled());
        assert!(globals.lager(Severity::Exit).enabled());
        assert!(crate::Lager::ptr_eq(
            globals.lager(Severity::Info),
            globals.lager(Severity::Guts)
        ));
    }

    #[test]
    fn bad_keys_are_reported_at_exit_level() {
        let mock = MockMakeWriter::default();
        let mut config = Config::default();
        config
            .set_error_output(Output::new(mock.clone()))
            .set_clock(fixed_clock);
        let globals = Globals::new(config);
        let err = KeysError::Arity {
            found: 2,
            value: "time,lev".to_owned(),
        };
        let mut status = 0;
        let ran = recover_exit(
            || report_bad_keys(&globals, &err),
            |code| {
                status = *code;
                *code = -1;
            },
        );
        assert_eq!(None, ran);
        assert_eq!(1, status);
        assert_eq!(
            "[\"2019-12-31 23:59:59.1234Z\", \"EXIT\", \"LAGER_KEYS expected 6 \
             comma-separated labels\", {\"Not\":2,\"Value\":\"time,lev\"}]\n",
            mock.get_string()
        );
    }

    #[test]
    fn updates_publish_a_new_snapshot() {
        let _guard = global_lock();
        let before = super::snapshot();
        let levels = before.config().levels().to_owned();
        super::init("FWNAITDOG");
        let after = super::snapshot();
        assert!(!Arc::ptr_eq(&before, &after));
        assert_eq!("FWNAITDOG", super::enabled_levels());
        assert!(after.lager(Severity::Guts).enabled());
        assert!(!before.lager(Severity::Guts).enabled() || levels.contains('G'));
        super::init(&levels);
        assert_eq!(levels, super::enabled_levels());
    }

    #[test]
    fn set_output_returns_the_prior_destination() {
        let _guard = global_lock();
        let first = Output::new(MockMakeWriter::default());
        let prior = super::set_output(Some(first.clone()));
        let replaced = super::set_output(prior);
        assert!(replaced.is_some_and(|out| Output::ptr_eq(&out, &first)));
    }
}
