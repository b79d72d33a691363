//! Per-domain value index adapters. Every adapter shares the same
//! append/null-mask/lookup-masking protocol, factored out into
//! [`Common`] and [`GenericValueIndex`] so each type only has to supply
//! the handful of type-specific hooks in [`ValueIndexInner`].

pub mod address;
pub mod arithmetic;
pub mod boolean;
pub mod port;
pub mod sequence;
pub mod string;
pub mod subnet;
pub mod table;

use crate::bitmap::EwahBitmap;
use crate::error::{AppendError, AppendErrorKind, AppendResult, IndexIoResult, LookupResult};
use crate::operator::Operator;
use crate::value::ValueView;
use std::io::Write;
use tracing::trace;

#[cfg(test)]
use test_log::test;

/// The object-safe contract every value index exposes to the factory
/// and to callers. `Send` lets an index move across a thread boundary
/// between operations without the crate prescribing a scheduling model.
pub trait ValueIndex: Send {
    fn append(&mut self, v: &ValueView, id: u64) -> AppendResult<()>;
    /// Advances the index by `n` positions without appending a value,
    /// filling the gap an id skip ahead of `next_id` leaves behind.
    fn skip(&mut self, n: u64);
    fn lookup(&self, op: Operator, v: &ValueView) -> LookupResult<EwahBitmap>;
    fn size(&self) -> u64;
    fn save(&self, w: &mut dyn Write) -> IndexIoResult<()>;
    fn kind_tag(&self) -> u8;
}

/// The null-mask bookkeeping shared by every value index. `size()` also
/// serves as the next id an `append`/`skip` call expects, since every
/// appended or skipped position advances the null-mask by exactly one.
#[derive(Debug, Clone)]
pub struct Common {
    null_mask: EwahBitmap,
}

impl Common {
    pub fn new() -> Self {
        Self {
            null_mask: EwahBitmap::new(),
        }
    }

    pub fn load(null_mask: EwahBitmap) -> Self {
        Self { null_mask }
    }

    pub fn size(&self) -> u64 {
        self.null_mask.size()
    }

    pub fn null_mask(&self) -> &EwahBitmap {
        &self.null_mask
    }

    /// Clears every null position out of `bm`, per the null-mask
    /// invariant: non-none predicates never match a none position.
    fn mask(&self, bm: EwahBitmap) -> EwahBitmap {
        &bm & &self.null_mask.not()
    }
}

impl Default for Common {
    fn default() -> Self {
        Self::new()
    }
}

/// The hooks a concrete value-index adapter supplies. `None` handling,
/// id-ordering, and the post-lookup null mask are all handled once by
/// [`GenericValueIndex`]; implementors only see non-none values.
pub trait ValueIndexInner: Send {
    fn type_append(&mut self, v: &ValueView, id: u64) -> AppendResult<()>;
    /// Advances every bitmap this adapter owns by `n` zero positions,
    /// keeping it aligned with the outer null mask across a gap or a
    /// `None` append.
    fn type_skip(&mut self, n: u64);
    fn type_lookup(&self, op: Operator, v: &ValueView) -> LookupResult<EwahBitmap>;
    fn type_size(&self) -> u64;
    fn type_save(&self, w: &mut dyn Write) -> IndexIoResult<()>;
    fn kind_tag(&self) -> u8;
}

#[derive(Debug, Clone)]
pub struct GenericValueIndex<T> {
    common: Common,
    inner: T,
}

impl<T: ValueIndexInner> GenericValueIndex<T> {
    pub fn new(inner: T) -> Self {
        Self {
            common: Common::new(),
            inner,
        }
    }

    pub fn from_parts(common: Common, inner: T) -> Self {
        Self { common, inner }
    }

    pub fn inner(&self) -> &T {
        &self.inner
    }
}

impl<T: ValueIndexInner> ValueIndex for GenericValueIndex<T> {
    fn append(&mut self, v: &ValueView, id: u64) -> AppendResult<()> {
        let next = self.common.size();
        if id < next {
            return Err(AppendError::new(
                AppendErrorKind::InvalidId,
                format!("id {id} is less than the next expected id {next}"),
            ));
        }
        if id > next {
            trace!(id, next, gap = id - next, "backfilling id gap before append");
            self.skip(id - next);
        }
        if v.is_none() {
            self.common.null_mask.append_bit(true);
            self.inner.type_skip(1);
        } else {
            self.inner.type_append(v, id)?;
            self.common.null_mask.append_bit(false);
        }
        Ok(())
    }

    fn skip(&mut self, n: u64) {
        if n == 0 {
            return;
        }
        self.common.null_mask.append_bits(false, n);
        self.inner.type_skip(n);
    }

    fn lookup(&self, op: Operator, v: &ValueView) -> LookupResult<EwahBitmap> {
        if v.is_none() {
            return match op {
                Operator::Equal => Ok(self.common.null_mask.clone()),
                Operator::NotEqual => Ok(self.common.null_mask.not()),
                _ => Err(crate::error::LookupError::new(
                    crate::error::LookupErrorKind::UnsupportedOperator,
                    "none only supports == and !=",
                )),
            };
        }
        let raw = self.inner.type_lookup(op, v)?;
        Ok(self.common.mask(raw))
    }

    fn size(&self) -> u64 {
        self.common.size()
    }

    fn save(&self, w: &mut dyn Write) -> IndexIoResult<()> {
        crate::ioutil::write_u8(w, self.inner.kind_tag())?;
        self.common.null_mask.save(w)?;
        self.inner.type_save(w)
    }

    fn kind_tag(&self) -> u8 {
        self.inner.kind_tag()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::index::boolean::BooleanIndex;

    #[test]
    fn none_values_are_masked_from_every_non_none_predicate() {
        let mut idx = GenericValueIndex::new(BooleanIndex::new());
        idx.append(&ValueView::Boolean(true), 0).unwrap();
        idx.append(&ValueView::None, 1).unwrap();
        idx.append(&ValueView::Boolean(false), 2).unwrap();

        let eq_true = idx.lookup(Operator::Equal, &ValueView::Boolean(true)).unwrap();
        let eq_false = idx.lookup(Operator::Equal, &ValueView::Boolean(false)).unwrap();
        assert!(eq_true.get(0));
        assert!(!eq_true.get(1));
        assert!(!eq_false.get(1));
        assert!(eq_false.get(2));

        let eq_none = idx.lookup(Operator::Equal, &ValueView::None).unwrap();
        assert!(eq_none.get(1));
        assert_eq!(eq_none.rank(), 1);
    }

    #[test]
    fn id_must_be_non_decreasing() {
        let mut idx = GenericValueIndex::new(BooleanIndex::new());
        idx.append(&ValueView::Boolean(true), 5).unwrap();
        let err = idx.append(&ValueView::Boolean(false), 4).unwrap_err();
        assert_eq!(err.kind, AppendErrorKind::InvalidId);
    }

    #[test]
    fn appending_past_a_gap_backfills_it() {
        let mut idx = GenericValueIndex::new(BooleanIndex::new());
        idx.append(&ValueView::Boolean(true), 5).unwrap();
        assert_eq!(idx.size(), 6);

        let eq_none = idx.lookup(Operator::Equal, &ValueView::None).unwrap();
        assert_eq!(eq_none.rank(), 0, "a skipped gap is not marked null");
        let eq_true = idx.lookup(Operator::Equal, &ValueView::Boolean(true)).unwrap();
        assert!(eq_true.get(5));
        assert_eq!(eq_true.rank(), 1);
    }
}
