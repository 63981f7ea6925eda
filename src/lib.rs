//! Structured logging that writes every line as a single line of JSON.
//!
//! A line is either an array, `["2019-12-31 23:59:59.1234Z", "WARN", "msg",
//! {"key": "value"}]`, or, once a key scheme is set with [`keys`], an
//! object using those keys. Lines are composed into a pooled scratch buffer
//! and written with one write, so lines from different threads never
//! interleave.
//!
//! ```
//! lager::init("FWNAI");
//! lager::info().mmap("Connected", lager::map!("host", "db1", "ms", 12));
//! let ctx = lager::pairs!("request", 42);
//! lager::warn().with(&[ctx]).mlist("Retrying", lager::list!(3, "times"));
//! ```
//!
//! Events from `tracing` can be written the same way with [`LagerLayer`].

#[macro_use]
mod data;

mod buffer;
mod config;
mod fatal;
mod fields;
mod globals;
mod layer;
mod level;
mod logger;
mod marshal;
mod module;
mod value;
mod visitor;
mod write_adaptor;


pub use buffer::Output;
pub use config::{gcp_level_name, Config, Keys, KeysError, DEFAULT_LEVELS, OPTIONAL_LEVELS};
pub use data::{to_key_string, unless, AList, AMap, RawMap, Sentinel, INLINE_PAIRS, SKIP_THIS_PAIR};
pub use fatal::{exit_via_panic, recover_exit, ExitRequested};
pub use globals::{
    enabled_levels, init, keys, log_internal_errors, running_in_gcp, set_clock,
    set_error_output, set_keys, set_level_notation, set_output, set_path_parts, set_span_prefix,
    snapshot, span_prefix, update, Globals,
};
pub use layer::{severity_for, LagerLayer};
pub use level::{Severity, N_LEVELS};
pub use logger::{
    acc, debug, exit, fail, for_severity, guts, info, level, note, obj, panic, trace, warn, Lager,
};
pub use module::{get_module_levels, modules, set_module_levels, Module};
pub use value::{Lazy, Marshal, Value};
pub use write_adaptor::LogWriter;
