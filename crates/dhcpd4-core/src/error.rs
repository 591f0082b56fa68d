/*  Error kinds, spec.md §7. Parse errors are soft (logged, resynchronized);
 *  I/O errors opening the config or lease files are fatal at startup; each
 *  startup failure class maps to a distinct process exit code so the
 *  binary's `main` can report one without re-deriving it from a string.
 */
use std::fmt;
use std::path::PathBuf;

#[derive(Debug)]
pub enum StartupError {
    ConfigOpen { path: PathBuf, source: std::io::Error },
    ConfigParse { warnings: usize },
    LeaseFileMissing { path: PathBuf },
    LeaseFileCorrupt { path: PathBuf, detail: String },
    SocketBind { interface: String, source: std::io::Error },
    PrivilegeDrop { detail: String },
}

impl StartupError {
    /// Distinct per class of startup failure, per spec.md §6's CLI
    /// contract (exit codes: 0 success, non-zero per failure class).
    pub const fn exit_code(&self) -> i32 {
        match self {
            StartupError::ConfigOpen { .. } => 1,
            StartupError::ConfigParse { .. } => 2,
            StartupError::LeaseFileMissing { .. } => 3,
            StartupError::LeaseFileCorrupt { .. } => 4,
            StartupError::SocketBind { .. } => 5,
            StartupError::PrivilegeDrop { .. } => 6,
        }
    }
}

impl fmt::Display for StartupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StartupError::ConfigOpen { path, source } => {
                write!(f, "cannot open configuration {}: {}", path.display(), source)
            }
            StartupError::ConfigParse { warnings } => {
                write!(f, "configuration had {} warning(s), refusing to start", warnings)
            }
            StartupError::LeaseFileMissing { path } => {
                write!(f, "lease database {} is missing", path.display())
            }
            StartupError::LeaseFileCorrupt { path, detail } => {
                write!(f, "lease database {} is corrupt: {}", path.display(), detail)
            }
            StartupError::SocketBind { interface, source } => {
                write!(f, "cannot bind on {}: {}", interface, source)
            }
            StartupError::PrivilegeDrop { detail } => {
                write!(f, "cannot drop privileges: {}", detail)
            }
        }
    }
}

impl std::error::Error for StartupError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StartupError::ConfigOpen { source, .. } => Some(source),
            StartupError::SocketBind { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Expression evaluation never propagates hard errors (spec.md §4.3): a
/// mismatched context just yields the context-appropriate empty/false/0
/// result. This type exists to let callers distinguish "evaluated to
/// nothing" from "evaluated to an actual empty value" for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvalError {
    Undefined,
    TypeMismatch,
    EvalFailed,
}

impl fmt::Display for EvalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EvalError::Undefined => write!(f, "undefined"),
            EvalError::TypeMismatch => write!(f, "type mismatch"),
            EvalError::EvalFailed => write!(f, "evaluation failed"),
        }
    }
}
