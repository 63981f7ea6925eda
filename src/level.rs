use std::fmt;

/// Number of severities.
pub const N_LEVELS: usize = 11;

/// One of the fixed log levels, ordered from most severe to most verbose.
///
/// `Panic` and `Exit` are always enabled. Every other severity can be
/// switched on or off by including its letter code in an enable-string
/// (see [`init`](crate::init)).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    /// Writes the line then panics.
    Panic,
    /// Writes the line then terminates the process (see [`recover_exit`](crate::recover_exit)).
    Exit,
    /// Errors that are not part of the normal flow.
    Fail,
    /// Unusual conditions that may be signs of problems.
    Warn,
    /// Major milestones that are part of the normal flow.
    Note,
    /// Access logs.
    Access,
    /// Minor milestones that are part of the normal flow.
    Info,
    /// How execution flows through the code.
    Trace,
    /// Details that help when debugging.
    Debug,
    /// Dumps of internal data structures.
    Obj,
    /// Debugging data too voluminous to always include.
    Guts,
}

impl Severity {
    /// All severities in ascending verbosity.
    pub const ALL: [Severity; N_LEVELS] = [
        Severity::Panic,
        Severity::Exit,
        Severity::Fail,
        Severity::Warn,
        Severity::Note,
        Severity::Access,
        Severity::Info,
        Severity::Trace,
        Severity::Debug,
        Severity::Obj,
        Severity::Guts,
    ];

    /// The canonical name written into each log line.
    pub const fn name(self) -> &'static str {
        match self {
            Severity::Panic => "PANIC",
            Severity::Exit => "EXIT",
            Severity::Fail => "FAIL",
            Severity::Warn => "WARN",
            Severity::Note => "NOTE",
            Severity::Access => "ACCESS",
            Severity::Info => "INFO",
            Severity::Trace => "TRACE",
            Severity::Debug => "DEBUG",
            Severity::Obj => "OBJ",
            Severity::Guts => "GUTS",
        }
    }

    /// The single upper-case letter used in enable-strings.
    pub const fn code(self) -> u8 {
        self.name().as_bytes()[0]
    }

    /// Looks up a severity by its letter code, in either case.
    pub fn from_code(code: u8) -> Option<Severity> {
        let upper = code.to_ascii_uppercase();
        Severity::ALL.into_iter().find(|sev| sev.code() == upper)
    }

    /// Whether this severity ignores the enabled-level set.
    pub const fn always_enabled(self) -> bool {
        matches!(self, Severity::Panic | Severity::Exit)
    }

    pub(crate) const fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::{Severity, N_LEVELS};

    #[test]
    fn codes_are_unique_and_round_trip() {
        let codes: Vec<u8> = Severity::ALL.iter().map(|sev| sev.code()).collect();
        assert_eq!(b"PEFWNAITDOG".to_vec(), codes);
        for sev in Severity::ALL {
            assert_eq!(Some(sev), Severity::from_code(sev.code()));
            assert_eq!(Some(sev), Severity::from_code(sev.code().to_ascii_lowercase()));
        }
        assert_eq!(None, Severity::from_code(b'X'));
        assert_eq!(N_LEVELS, Severity::ALL.len());
    }

    #[test]
    fn ordering_follows_verbosity() {
        assert!(Severity::Panic < Severity::Exit);
        assert!(Severity::Access < Severity::Info);
        assert!(Severity::Obj < Severity::Guts);
        assert_eq!("ACCESS", Severity::Access.to_string());
    }
}
