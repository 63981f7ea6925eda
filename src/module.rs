use std::{collections::BTreeMap, env, fmt, sync::Arc};

use parking_lot::{const_rwlock, RwLock};

use crate::{
    config::parse_levels,
    globals::snapshot,
    level::{Severity, N_LEVELS},
    logger::Lager,
};

static MODULES: RwLock<BTreeMap<String, Arc<Module>>> = const_rwlock(BTreeMap::new());

struct Levels {
    codes: String,
    enabled: [bool; N_LEVELS],
}

/// A named set of log levels that can be enabled separately from the
/// global ones.
///
/// Lines written through a module's writers carry the module's name.
///
/// ```
/// let db = lager::Module::new("db", Some("FW"));
/// db.warn().mmap("Slow query", lager::map!("ms", 1200));
/// ```
pub struct Module {
    name: Arc<str>,
    levels: RwLock<Levels>,
}

impl Module {
    /// Returns the module registered under `name`, registering it first if
    /// needed.
    ///
    /// A new module's levels come from `LAGER_{name}_LEVELS` if that is set,
    /// else from `default_levels`, else from the globally enabled levels.
    pub fn new(name: &str, default_levels: Option<&str>) -> Arc<Module> {
        Module::with_lookup(name, default_levels, |var| env::var(var).ok())
    }

    /// Like [`new`](Module::new) but reads `LAGER_{name}_LEVELS` through
    /// `lookup`.
    pub fn with_lookup<F>(name: &str, default_levels: Option<&str>, lookup: F) -> Arc<Module>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(module) = MODULES.read().get(name) {
            return Arc::clone(module);
        }
        let from_env = lookup(&format!("LAGER_{name}_LEVELS")).filter(|levels| !levels.is_empty());
        let levels = from_env.as_deref().or(default_levels).unwrap_or("");
        let module = Module {
            name: Arc::from(name),
            levels: RwLock::new(Levels {
                codes: String::new(),
                enabled: [false; N_LEVELS],
            }),
        };
        module.init(levels);
        let mut modules = MODULES.write();
        Arc::clone(
            modules
                .entry(name.to_owned())
                .or_insert_with(|| Arc::new(module)),
        )
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Sets which levels this module writes, like [`init`](crate::init).
    /// An empty string copies the globally enabled levels.
    pub fn init(&self, levels: &str) -> &Self {
        let global;
        let levels = if levels.is_empty() {
            global = snapshot().config().levels().to_owned();
            global.as_str()
        } else {
            levels
        };
        let (codes, enabled) = parse_levels(levels);
        *self.levels.write() = Levels { codes, enabled };
        self
    }

    /// Letters of the optional levels this module writes.
    pub fn levels(&self) -> String {
        self.levels.read().codes.clone()
    }

    /// This module's writer for `sev`, using the current configuration.
    pub fn for_severity(&self, sev: Severity) -> Lager {
        if !self.levels.read().enabled[sev.index()] {
            return Lager::noop();
        }
        Lager::new(sev, snapshot().config_arc()).with_module(&self.name)
    }

    pub fn panic(&self) -> Lager {
        self.for_severity(Severity::Panic)
    }

    pub fn exit(&self) -> Lager {
        self.for_severity(Severity::Exit)
    }

    pub fn fail(&self) -> Lager {
        self.for_severity(Severity::Fail)
    }

    pub fn warn(&self) -> Lager {
        self.for_severity(Severity::Warn)
    }

    pub fn note(&self) -> Lager {
        self.for_severity(Severity::Note)
    }

    pub fn acc(&self) -> Lager {
        self.for_severity(Severity::Access)
    }

    pub fn info(&self) -> Lager {
        self.for_severity(Severity::Info)
    }

    pub fn trace(&self) -> Lager {
        self.for_severity(Severity::Trace)
    }

    pub fn debug(&self) -> Lager {
        self.for_severity(Severity::Debug)
    }

    pub fn obj(&self) -> Lager {
        self.for_severity(Severity::Obj)
    }

    pub fn guts(&self) -> Lager {
        self.for_severity(Severity::Guts)
    }

    /// # Panics
    ///
    /// For any byte that is not one of `"PEFWNAITDOG"`.
    pub fn level(&self, code: u8) -> Lager {
        match Severity::from_code(code) {
            Some(sev) => self.for_severity(sev),
            None => panic!(
                "Module::level() must be one char from \"PEFWNAITDOG\" not {:?}",
                char::from(code)
            ),
        }
    }
}

impl fmt::Debug for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Module")
            .field("name", &self.name)
            .field("levels", &self.levels.read().codes)
            .finish()
    }
}

/// Changes the levels of a registered module. Returns `false` when no
/// module has that name.
pub fn set_module_levels(name: &str, levels: &str) -> bool {
    let module = MODULES.read().get(name).cloned();
    match module {
        Some(module) => {
            module.init(levels);
            true
        }
        None => false,
    }
}

/// The levels of a registered module, or `"n/a"` when there is none.
pub fn get_module_levels(name: &str) -> String {
    MODULES
        .read()
        .get(name)
        .map_or_else(|| "n/a".to_owned(), |module| module.levels())
}

/// Every registered module with its enabled levels.
pub fn modules() -> BTreeMap<String, String> {
    MODULES
        .read()
        .iter()
        .map(|(name, module)| (name.clone(), module.levels()))
        .collect()
}
