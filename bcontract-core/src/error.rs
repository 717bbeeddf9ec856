use std::fmt;

/// Coarse classification of what went wrong, in the order compile() stages run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// axis count, trailing-kind ordering, or PRIM-count mismatch.
    ShapeValidation,
    /// no transposed/non-transposed layout satisfies the stride constraints.
    LayoutValidation,
    /// the kernel provider rejected the canonical shape it was handed.
    KernelGeneration,
    /// an operation that requires compile() ran before it happened.
    Uninitialized,
}

#[derive(Debug)]
pub struct Error {
    pub kind: ErrorKind,
    message: String,
}

impl Error {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Error {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

impl std::error::Error for Error {}

impl From<(ErrorKind, String)> for Error {
    fn from((kind, message): (ErrorKind, String)) -> Self {
        Error::new(kind, message)
    }
}

impl From<(ErrorKind, &str)> for Error {
    fn from((kind, message): (ErrorKind, &str)) -> Self {
        Error::new(kind, message.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// The three-value status code `compile()` exposes at the public boundary (§6),
/// kept alongside the richer `Error` for callers that only want the spec's
/// literal `{SUCCESS, COMPILATION_FAILED, UNDEFINED_ERROR}` contract.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, int_enum::IntEnum)]
pub enum Status {
    Success = 0,
    CompilationFailed = 1,
    UndefinedError = 99,
}

impl From<ErrorKind> for Status {
    fn from(kind: ErrorKind) -> Self {
        match kind {
            ErrorKind::ShapeValidation => Status::CompilationFailed,
            ErrorKind::LayoutValidation => Status::CompilationFailed,
            ErrorKind::KernelGeneration => Status::CompilationFailed,
            ErrorKind::Uninitialized => Status::UndefinedError,
        }
    }
}

impl From<&Error> for Status {
    fn from(err: &Error) -> Self {
        err.kind.into()
    }
}
