//! Integer, count, real, duration, and timestamp value indexes. All
//! five share one [`MultiLevelCoder`] over a uniform base-10, 20-digit
//! decomposition and differ only in how a [`ValueView`] is projected
//! into that domain.

use crate::binner::{unzigzag, zigzag, Binner};
use crate::bitmap::EwahBitmap;
use crate::error::{AppendError, AppendErrorKind, AppendResult, IndexIoError, IndexIoResult, LookupError, LookupErrorKind, LookupResult};
use crate::index::ValueIndexInner;
use crate::multilevel::MultiLevelCoder;
use crate::operator::Operator;
use crate::value::ValueView;
use std::io::{Read, Write};

#[cfg(test)]
use test_log::test;

const CODER_BASE: u64 = 10;
const CODER_DIGITS: u32 = 20;

#[derive(Clone, Copy, PartialEq, Eq)]
pub enum ArithmeticKind {
    Integer,
    Count,
    Real,
    Duration,
    Timestamp,
}

impl ArithmeticKind {
    fn tag(self) -> u8 {
        match self {
            ArithmeticKind::Integer => 2,
            ArithmeticKind::Count => 3,
            ArithmeticKind::Real => 4,
            ArithmeticKind::Duration => 5,
            ArithmeticKind::Timestamp => 6,
        }
    }

    fn from_tag(tag: u8) -> IndexIoResult<Self> {
        match tag {
            2 => Ok(ArithmeticKind::Integer),
            3 => Ok(ArithmeticKind::Count),
            4 => Ok(ArithmeticKind::Real),
            5 => Ok(ArithmeticKind::Duration),
            6 => Ok(ArithmeticKind::Timestamp),
            other => Err(IndexIoError::corrupt(format!("unknown arithmetic kind tag {other}"))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ArithmeticIndex {
    kind: ArithmeticKind,
    binner: Binner,
    coder: MultiLevelCoder,
}

impl ArithmeticIndex {
    pub fn new(kind: ArithmeticKind) -> Self {
        Self::with_binner(kind, Binner::Identity)
    }

    pub fn with_binner(kind: ArithmeticKind, binner: Binner) -> Self {
        Self {
            kind,
            binner,
            coder: MultiLevelCoder::new(CODER_BASE, CODER_DIGITS),
        }
    }

    fn load_parts(kind: ArithmeticKind, binner: Binner, coder: MultiLevelCoder) -> Self {
        Self { kind, binner, coder }
    }

    /// Projects `v` into the coder's unsigned 64-bit domain, preserving
    /// the original value's ordering.
    fn encode(&self, v: &ValueView) -> AppendResult<u64> {
        match (self.kind, v) {
            (ArithmeticKind::Integer, ValueView::Integer(n)) => Ok(zigzag(*n)),
            (ArithmeticKind::Count, ValueView::Count(n)) => Ok(*n),
            (ArithmeticKind::Real, ValueView::Real(f)) => Ok(zigzag(self.binner.bin_real(*f))),
            (ArithmeticKind::Duration, ValueView::DurationNanos(n)) => Ok(zigzag(*n)),
            (ArithmeticKind::Timestamp, ValueView::TimestampNanos(n)) => Ok(zigzag(*n)),
            (kind, other) => Err(AppendError::new(
                AppendErrorKind::TypeMismatch,
                format!("{kind:?} index cannot accept a {} value", other.type_name()),
            )),
        }
    }

    fn encode_for_lookup(&self, v: &ValueView) -> LookupResult<u64> {
        self.encode(v).map_err(|e| LookupError::new(LookupErrorKind::TypeMismatch, e.detail))
    }
}

impl std::fmt::Debug for ArithmeticKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ArithmeticKind::Integer => "Integer",
            ArithmeticKind::Count => "Count",
            ArithmeticKind::Real => "Real",
            ArithmeticKind::Duration => "Duration",
            ArithmeticKind::Timestamp => "Timestamp",
        };
        f.write_str(name)
    }
}

impl ValueIndexInner for ArithmeticIndex {
    fn type_append(&mut self, v: &ValueView, _id: u64) -> AppendResult<()> {
        let encoded = self.encode(v)?;
        self.coder.append(encoded);
        Ok(())
    }

    fn type_skip(&mut self, n: u64) {
        self.coder.skip(n);
    }

    fn type_lookup(&self, op: Operator, v: &ValueView) -> LookupResult<EwahBitmap> {
        match op {
            Operator::In | Operator::NotIn => {
                let members = match v {
                    ValueView::Set(items) | ValueView::Vector(items) => items,
                    other => {
                        return Err(LookupError::new(
                            LookupErrorKind::TypeMismatch,
                            format!("expected a set of {:?} values, got {}", self.kind, other.type_name()),
                        ))
                    }
                };
                let mut any = EwahBitmap::new();
                any.append_bits(false, self.type_size());
                for item in members {
                    if let Ok(encoded) = self.encode(item) {
                        any = &any | &self.coder.compute(encoded).0;
                    }
                }
                Ok(if op == Operator::In { any } else { any.not() })
            }
            _ => {
                let encoded = self.encode_for_lookup(v)?;
                self.coder.lookup(op, encoded).ok_or_else(|| {
                    LookupError::new(LookupErrorKind::UnsupportedOperator, format!("{op:?} is not defined for {:?}", self.kind))
                })
            }
        }
    }

    fn type_size(&self) -> u64 {
        self.coder.size()
    }

    fn type_save(&self, w: &mut dyn Write) -> IndexIoResult<()> {
        crate::ioutil::write_u8(w, self.kind.tag())?;
        match self.binner {
            Binner::Identity => crate::ioutil::write_u8(w, 0)?,
            Binner::Precision { digits } => {
                crate::ioutil::write_u8(w, 1)?;
                crate::ioutil::write_u32_le(w, digits)?;
            }
        }
        self.coder.save(w)
    }

    fn kind_tag(&self) -> u8 {
        self.kind.tag()
    }
}

pub fn load<R: Read + ?Sized>(r: &mut R) -> IndexIoResult<ArithmeticIndex> {
    let kind = ArithmeticKind::from_tag(crate::ioutil::read_u8(r)?)?;
    let binner = match crate::ioutil::read_u8(r)? {
        0 => Binner::Identity,
        1 => Binner::Precision {
            digits: crate::ioutil::read_u32_le(r)?,
        },
        other => return Err(IndexIoError::corrupt(format!("unknown binner tag {other}"))),
    };
    let coder = MultiLevelCoder::load(r)?;
    Ok(ArithmeticIndex::load_parts(kind, binner, coder))
}

/// Recovers the original signed integer projected through [`zigzag`].
/// Exposed for callers that want to translate a bit-sliced digit back
/// to a human-readable bound without re-deriving the encoding.
pub fn decode_signed(v: u64) -> i64 {
    unzigzag(v)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::index::{GenericValueIndex, ValueIndex};

    #[test]
    fn integer_ordering_handles_negative_values() {
        let mut idx = GenericValueIndex::new(ArithmeticIndex::new(ArithmeticKind::Integer));
        let values = [-10i64, 5, 0, -1, 100, i64::MIN, i64::MAX];
        for (i, &v) in values.iter().enumerate() {
            idx.append(&ValueView::Integer(v), i as u64).unwrap();
        }
        let lt0 = idx.lookup(Operator::Less, &ValueView::Integer(0)).unwrap();
        for (i, &v) in values.iter().enumerate() {
            assert_eq!(lt0.get(i as u64), v < 0, "i={i} v={v}");
        }
    }

    #[test]
    fn count_is_unsigned_and_monotone() {
        let mut idx = GenericValueIndex::new(ArithmeticIndex::new(ArithmeticKind::Count));
        for (i, v) in [0u64, u64::MAX, 42, 7].into_iter().enumerate() {
            idx.append(&ValueView::Count(v), i as u64).unwrap();
        }
        let ge42 = idx.lookup(Operator::GreaterEqual, &ValueView::Count(42)).unwrap();
        assert!(ge42.get(1));
        assert!(ge42.get(2));
        assert!(!ge42.get(3));
    }

    #[test]
    fn real_uses_precision_binner() {
        let mut idx = GenericValueIndex::new(ArithmeticIndex::with_binner(
            ArithmeticKind::Real,
            Binner::Precision { digits: 2 },
        ));
        idx.append(&ValueView::Real(1.001), 0).unwrap();
        idx.append(&ValueView::Real(1.009), 1).unwrap();
        let eq = idx.lookup(Operator::Equal, &ValueView::Real(1.00)).unwrap();
        assert!(eq.get(0));
        assert!(eq.get(1));
    }

    #[test]
    fn rejects_mismatched_type() {
        let mut idx = GenericValueIndex::new(ArithmeticIndex::new(ArithmeticKind::Integer));
        let err = idx.append(&ValueView::Count(1), 0).unwrap_err();
        assert_eq!(err.kind, AppendErrorKind::TypeMismatch);
    }

    #[test]
    fn s2_integer_scenario() {
        let mut idx = GenericValueIndex::new(ArithmeticIndex::new(ArithmeticKind::Integer));
        for (i, v) in [-7i64, 42, 10000, 4711, 31337, 42, 42].into_iter().enumerate() {
            idx.append(&ValueView::Integer(v), i as u64).unwrap();
        }
        let eq = idx.lookup(Operator::Equal, &ValueView::Integer(31337)).unwrap();
        assert_eq!(bits(&eq, 7), "0000100");
        let lt = idx.lookup(Operator::Less, &ValueView::Integer(31337)).unwrap();
        assert_eq!(bits(&lt, 7), "1111011");
        let gt = idx.lookup(Operator::Greater, &ValueView::Integer(0)).unwrap();
        assert_eq!(bits(&gt, 7), "0111111");
        let set = ValueView::Set(vec![ValueView::Integer(42), ValueView::Integer(10), ValueView::Integer(4711)]);
        let inset = idx.lookup(Operator::In, &set).unwrap();
        assert_eq!(bits(&inset, 7), "0101011");
    }

    fn bits(bm: &EwahBitmap, n: u64) -> String {
        (0..n).map(|i| if bm.get(i) { '1' } else { '0' }).collect()
    }
}
