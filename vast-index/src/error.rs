use std::fmt;

use backtrace_error::DynBacktraceError;
use tracing::error;

#[cfg(test)]
use test_log::test;

/// A plain string wrapped up as a `std::error::Error`, just so it can be
/// handed to `DynBacktraceError::from` alongside the backtrace it captures.
struct Detail(String);

impl fmt::Debug for Detail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for Detail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for Detail {}

/// Logs `detail` through `tracing::error!` and captures a backtrace at
/// the point of construction, the same near-origin trapping
/// `vast_base::Error::new` does for its own opaque error type.
fn trace(target: &'static str, detail: &str) -> DynBacktraceError {
    error!(target: target, "{detail}");
    DynBacktraceError::from(Detail(detail.to_string()))
}

/// Why an `append` call was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendErrorKind {
    /// The value's runtime type does not match the index's configured type.
    TypeMismatch,
    /// `id` is not greater than or equal to the next expected id.
    InvalidId,
    /// A container value exceeded its configured `max_size`/`max_length`.
    OutOfBounds,
}

#[derive(Debug)]
pub struct AppendError {
    pub kind: AppendErrorKind,
    pub detail: String,
    backtrace: DynBacktraceError,
}

impl AppendError {
    pub fn new(kind: AppendErrorKind, detail: impl Into<String>) -> Self {
        let detail = detail.into();
        let backtrace = trace("vast_index::append", &detail);
        Self { kind, detail, backtrace }
    }
}

impl fmt::Display for AppendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "append failed ({:?}): {}", self.kind, self.detail)
    }
}

impl std::error::Error for AppendError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.backtrace)
    }
}

/// Why a `lookup` call was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupErrorKind {
    /// The operator is not defined for this value index's type.
    UnsupportedOperator,
    /// The value's runtime type does not match the index's configured type.
    TypeMismatch,
}

#[derive(Debug)]
pub struct LookupError {
    pub kind: LookupErrorKind,
    pub detail: String,
    backtrace: DynBacktraceError,
}

impl LookupError {
    pub fn new(kind: LookupErrorKind, detail: impl Into<String>) -> Self {
        let detail = detail.into();
        let backtrace = trace("vast_index::lookup", &detail);
        Self { kind, detail, backtrace }
    }
}

impl fmt::Display for LookupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "lookup failed ({:?}): {}", self.kind, self.detail)
    }
}

impl std::error::Error for LookupError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.backtrace)
    }
}

/// Errors surfaced while serializing or restoring an index. `Corrupt` is
/// the one kind a caller cannot have caused by misuse; everything else
/// in this module traces back to a caller-supplied id, value, or operator.
#[derive(Debug)]
pub struct IndexIoError {
    pub detail: String,
    backtrace: DynBacktraceError,
}

impl IndexIoError {
    pub fn corrupt(detail: impl Into<String>) -> Self {
        let detail = detail.into();
        let backtrace = trace("vast_index::io", &detail);
        Self { detail, backtrace }
    }
}

impl fmt::Display for IndexIoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "corrupt index data: {}", self.detail)
    }
}

impl std::error::Error for IndexIoError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.backtrace)
    }
}

impl From<std::io::Error> for IndexIoError {
    fn from(err: std::io::Error) -> Self {
        IndexIoError::corrupt(err.to_string())
    }
}

pub type AppendResult<T> = std::result::Result<T, AppendError>;
pub type LookupResult<T> = std::result::Result<T, LookupError>;
pub type IndexIoResult<T> = std::result::Result<T, IndexIoError>;

#[test]
fn display_formats() {
    let a = AppendError::new(AppendErrorKind::InvalidId, "id went backwards");
    assert!(a.to_string().contains("InvalidId"));
    let l = LookupError::new(LookupErrorKind::UnsupportedOperator, "match on integer");
    assert!(l.to_string().contains("UnsupportedOperator"));
}
