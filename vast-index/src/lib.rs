//! The value-index subsystem: per-type secondary indexes over typed
//! scalar and container values, each mapping a value to a bitmap of
//! the event ids that carry it.
//!
//! A value index never touches ingestion, storage chunking, or the
//! query planner; it only knows how to append a value (in
//! non-decreasing id order) and answer a single relational predicate
//! against everything appended so far. Composition ([`index::Common`] /
//! [`index::GenericValueIndex`]) and a handful of bitmap-coding
//! strategies ([`coder`], [`multilevel`]) are what let eleven otherwise
//! unrelated value types share one append/lookup/null-masking protocol.

pub mod binner;
pub mod bitmap;
pub mod coder;
pub mod error;
pub mod factory;
pub mod index;
pub mod ioutil;
pub mod multilevel;
pub mod operator;
pub mod value;

pub use error::{AppendError, AppendErrorKind, AppendResult, IndexIoError, IndexIoResult, LookupError, LookupErrorKind, LookupResult};
pub use factory::{build, load, TypeDescriptor};
pub use index::ValueIndex;
pub use operator::Operator;
pub use value::{Address, Port, Protocol, Subnet, ValueView};
