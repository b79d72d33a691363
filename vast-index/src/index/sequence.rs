//! Sequence value index: used for both `Vector` and `Set` containers.
//! Each of the `max_size` element slots gets its own sub-index (built by
//! an injected element factory), plus a length [`RangeCoder`]. `Set` is
//! given no true multiset semantics here — a set is stored positionally,
//! slot-by-slot, exactly like a vector, so two sets holding the same
//! elements in a different order are not considered equal. A dedicated
//! multiset representation would need an unordered element index this
//! crate does not have a query language to express predicates over.

use crate::bitmap::EwahBitmap;
use crate::coder::{Coder, RangeCoder};
use crate::error::{AppendError, AppendErrorKind, AppendResult, IndexIoError, IndexIoResult, LookupError, LookupErrorKind, LookupResult};
use crate::index::{ValueIndex, ValueIndexInner};
use crate::operator::Operator;
use crate::value::ValueView;
use std::io::{Read, Write};

#[cfg(test)]
use test_log::test;

pub const KIND_TAG: u8 = 11;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceKind {
    Vector,
    Set,
}

pub type ElementFactory = Box<dyn Fn() -> Box<dyn ValueIndex> + Send>;

pub struct SequenceIndex {
    kind: SequenceKind,
    max_size: u32,
    length: RangeCoder,
    slots: Vec<Box<dyn ValueIndex>>,
    size: u64,
}

impl std::fmt::Debug for SequenceIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SequenceIndex")
            .field("kind", &self.kind)
            .field("max_size", &self.max_size)
            .field("size", &self.size)
            .finish()
    }
}

impl SequenceIndex {
    pub fn new(kind: SequenceKind, max_size: u32, make_slot: &ElementFactory) -> Self {
        Self {
            kind,
            max_size,
            length: RangeCoder::new(max_size + 1),
            slots: (0..max_size).map(|_| make_slot()).collect(),
            size: 0,
        }
    }

    fn load_parts(kind: SequenceKind, max_size: u32, length: RangeCoder, slots: Vec<Box<dyn ValueIndex>>, size: u64) -> Self {
        Self {
            kind,
            max_size,
            length,
            slots,
            size,
        }
    }

    /// `ni x`: OR over slots of `slot[i].lookup(==, x)`.
    fn membership(&self, v: &ValueView) -> LookupResult<EwahBitmap> {
        let mut any_match = zeros(self.size);
        for slot in &self.slots {
            let hit = slot.lookup(Operator::Equal, v)?;
            any_match = &any_match | &hit;
        }
        Ok(any_match)
    }

    fn elements<'a>(&self, v: &'a ValueView) -> AppendResult<&'a [ValueView]> {
        match (self.kind, v) {
            (SequenceKind::Vector, ValueView::Vector(items)) => Ok(items),
            (SequenceKind::Set, ValueView::Set(items)) => Ok(items),
            (kind, other) => Err(AppendError::new(
                AppendErrorKind::TypeMismatch,
                format!("{kind:?} index cannot accept a {} value", other.type_name()),
            )),
        }
    }
}

impl ValueIndexInner for SequenceIndex {
    fn type_append(&mut self, v: &ValueView, id: u64) -> AppendResult<()> {
        let items = self.elements(v)?;
        if items.len() > self.max_size as usize {
            return Err(AppendError::new(
                AppendErrorKind::OutOfBounds,
                format!("sequence of length {} exceeds max_size {}", items.len(), self.max_size),
            ));
        }
        self.length.append(items.len() as u64);
        for (i, slot) in self.slots.iter_mut().enumerate() {
            let elem = items.get(i).cloned().unwrap_or(ValueView::None);
            slot.append(&elem, id)?;
        }
        self.size += 1;
        Ok(())
    }

    fn type_skip(&mut self, n: u64) {
        self.length.skip(n);
        for slot in self.slots.iter_mut() {
            slot.skip(n);
        }
        self.size += n;
    }

    fn type_lookup(&self, op: Operator, v: &ValueView) -> LookupResult<EwahBitmap> {
        match op {
            Operator::Equal | Operator::NotEqual => {
                let items = self.elements(v).map_err(|e| LookupError::new(LookupErrorKind::TypeMismatch, e.detail))?;
                let len_eq = self
                    .length
                    .lookup(Operator::Equal, items.len() as u64)
                    .expect("RangeCoder supports ==");
                let mut all_eq = len_eq;
                let none = ValueView::None;
                for (i, slot) in self.slots.iter().enumerate() {
                    let elem = items.get(i).unwrap_or(&none);
                    let slot_eq = slot.lookup(Operator::Equal, elem)?;
                    all_eq = &all_eq & &slot_eq;
                }
                Ok(if op == Operator::Equal { all_eq } else { all_eq.not() })
            }
            Operator::Ni | Operator::NotNi => {
                let any_match = self.membership(v)?;
                Ok(if op == Operator::Ni { any_match } else { any_match.not() })
            }
            Operator::In | Operator::NotIn => {
                let container = match v {
                    ValueView::Vector(items) | ValueView::Set(items) => items,
                    other => {
                        return Err(LookupError::new(
                            LookupErrorKind::TypeMismatch,
                            format!("expected a container, got {}", other.type_name()),
                        ))
                    }
                };
                let mut any = zeros(self.size);
                for item in container {
                    any = &any | &self.membership(item)?;
                }
                Ok(if op == Operator::In { any } else { any.not() })
            }
            _ => Err(LookupError::new(
                LookupErrorKind::UnsupportedOperator,
                format!("{op:?} is not defined for {:?}", self.kind),
            )),
        }
    }

    fn type_size(&self) -> u64 {
        self.size
    }

    fn type_save(&self, w: &mut dyn Write) -> IndexIoResult<()> {
        crate::ioutil::write_u8(w, match self.kind {
            SequenceKind::Vector => 0,
            SequenceKind::Set => 1,
        })?;
        crate::ioutil::write_u32_le(w, self.max_size)?;
        crate::ioutil::write_u64_le(w, self.size)?;
        Coder::save(&self.length, w)?;
        for slot in &self.slots {
            slot.save(w)?;
        }
        Ok(())
    }

    fn kind_tag(&self) -> u8 {
        KIND_TAG
    }
}

fn zeros(size: u64) -> EwahBitmap {
    let mut bm = EwahBitmap::new();
    bm.append_bits(false, size);
    bm
}

/// Deserializes a sequence index, using `load_slot` to reconstruct each
/// element sub-index from its own leading kind tag — the same dispatch
/// the top-level factory uses.
pub fn load<R: Read + ?Sized>(r: &mut R, load_slot: &dyn Fn(&mut R) -> IndexIoResult<Box<dyn ValueIndex>>) -> IndexIoResult<SequenceIndex> {
    let kind = match crate::ioutil::read_u8(r)? {
        0 => SequenceKind::Vector,
        1 => SequenceKind::Set,
        other => return Err(IndexIoError::corrupt(format!("unknown sequence kind tag {other}"))),
    };
    let max_size = crate::ioutil::read_u32_le(r)?;
    let size = crate::ioutil::read_u64_le(r)?;
    let domain = crate::ioutil::read_u32_le(r)?;
    if domain != max_size + 1 {
        return Err(IndexIoError::corrupt("sequence index length-coder domain mismatch"));
    }
    let length_size = crate::ioutil::read_u64_le(r)?;
    let mut length_bitmaps = Vec::with_capacity(domain as usize);
    for _ in 0..domain {
        length_bitmaps.push(EwahBitmap::load(r)?);
    }
    let length = RangeCoder::load(domain, length_bitmaps, length_size);

    let mut slots = Vec::with_capacity(max_size as usize);
    for _ in 0..max_size {
        slots.push(load_slot(r)?);
    }
    Ok(SequenceIndex::load_parts(kind, max_size, length, slots, size))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::index::boolean::BooleanIndex;
    use crate::index::GenericValueIndex;

    fn bool_slot_factory() -> ElementFactory {
        Box::new(|| Box::new(GenericValueIndex::new(BooleanIndex::new())))
    }

    #[test]
    fn equality_compares_length_and_every_slot() {
        let factory = bool_slot_factory();
        let mut idx = GenericValueIndex::new(SequenceIndex::new(SequenceKind::Vector, 3, &factory));
        let v1 = ValueView::Vector(vec![ValueView::Boolean(true), ValueView::Boolean(false)]);
        let v2 = ValueView::Vector(vec![ValueView::Boolean(true), ValueView::Boolean(false)]);
        let v3 = ValueView::Vector(vec![ValueView::Boolean(true)]);
        idx.append(&v1, 0).unwrap();
        idx.append(&v2, 1).unwrap();
        idx.append(&v3, 2).unwrap();

        let eq = idx.lookup(Operator::Equal, &v1).unwrap();
        assert!(eq.get(0));
        assert!(eq.get(1));
        assert!(!eq.get(2));
    }

    #[test]
    fn ni_tests_membership_across_slots() {
        let factory = bool_slot_factory();
        let mut idx = GenericValueIndex::new(SequenceIndex::new(SequenceKind::Set, 2, &factory));
        idx.append(&ValueView::Set(vec![ValueView::Boolean(false), ValueView::Boolean(false)]), 0)
            .unwrap();
        idx.append(&ValueView::Set(vec![ValueView::Boolean(true), ValueView::Boolean(false)]), 1)
            .unwrap();
        let has_true = idx.lookup(Operator::Ni, &ValueView::Boolean(true)).unwrap();
        assert!(!has_true.get(0));
        assert!(has_true.get(1));
    }

    #[test]
    fn in_ors_membership_over_a_queried_container() {
        let factory = bool_slot_factory();
        let mut idx = GenericValueIndex::new(SequenceIndex::new(SequenceKind::Set, 2, &factory));
        idx.append(&ValueView::Set(vec![ValueView::Boolean(false), ValueView::Boolean(false)]), 0)
            .unwrap();
        idx.append(&ValueView::Set(vec![ValueView::Boolean(true), ValueView::Boolean(false)]), 1)
            .unwrap();
        let query = ValueView::Set(vec![ValueView::Boolean(true)]);
        let any = idx.lookup(Operator::In, &query).unwrap();
        assert!(!any.get(0));
        assert!(any.get(1));
    }
}
