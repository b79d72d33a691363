use crate::bitmap::EwahBitmap;
use crate::error::{AppendError, AppendErrorKind, AppendResult, IndexIoResult, LookupError, LookupErrorKind, LookupResult};
use crate::index::ValueIndexInner;
use crate::operator::Operator;
use crate::value::ValueView;
use std::io::Write;

#[cfg(test)]
use test_log::test;

pub const KIND_TAG: u8 = 1;

#[derive(Debug, Clone)]
pub struct BooleanIndex {
    bits: EwahBitmap,
}

impl BooleanIndex {
    pub fn new() -> Self {
        Self {
            bits: EwahBitmap::new(),
        }
    }

    pub fn load(bits: EwahBitmap) -> Self {
        Self { bits }
    }
}

impl Default for BooleanIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl ValueIndexInner for BooleanIndex {
    fn type_append(&mut self, v: &ValueView, _id: u64) -> AppendResult<()> {
        match v {
            ValueView::Boolean(b) => {
                self.bits.append_bit(*b);
                Ok(())
            }
            other => Err(AppendError::new(
                AppendErrorKind::TypeMismatch,
                format!("expected boolean, got {}", other.type_name()),
            )),
        }
    }

    fn type_skip(&mut self, n: u64) {
        self.bits.append_bits(false, n);
    }

    fn type_lookup(&self, op: Operator, v: &ValueView) -> LookupResult<EwahBitmap> {
        match op {
            Operator::Equal | Operator::NotEqual => {
                let b = match v {
                    ValueView::Boolean(b) => *b,
                    other => {
                        return Err(LookupError::new(
                            LookupErrorKind::TypeMismatch,
                            format!("expected boolean, got {}", other.type_name()),
                        ))
                    }
                };
                let eq = if b { self.bits.clone() } else { self.bits.not() };
                Ok(if op == Operator::Equal { eq } else { eq.not() })
            }
            Operator::In | Operator::NotIn => {
                let members = match v {
                    ValueView::Set(items) | ValueView::Vector(items) => items,
                    other => {
                        return Err(LookupError::new(
                            LookupErrorKind::TypeMismatch,
                            format!("expected a set of booleans, got {}", other.type_name()),
                        ))
                    }
                };
                let mut any = EwahBitmap::new();
                any.append_bits(false, self.type_size());
                for item in members {
                    if let ValueView::Boolean(b) = item {
                        let eq = if *b { self.bits.clone() } else { self.bits.not() };
                        any = &any | &eq;
                    }
                }
                Ok(if op == Operator::In { any } else { any.not() })
            }
            _ => Err(LookupError::new(
                LookupErrorKind::UnsupportedOperator,
                format!("{op:?} is not defined for boolean"),
            )),
        }
    }

    fn type_size(&self) -> u64 {
        self.bits.size()
    }

    fn type_save(&self, w: &mut dyn Write) -> IndexIoResult<()> {
        self.bits.save(w)
    }

    fn kind_tag(&self) -> u8 {
        KIND_TAG
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::index::{GenericValueIndex, ValueIndex};

    #[test]
    fn equal_and_not_equal() {
        let mut idx = GenericValueIndex::new(BooleanIndex::new());
        for (i, b) in [true, false, true, true].into_iter().enumerate() {
            idx.append(&ValueView::Boolean(b), i as u64).unwrap();
        }
        let eq = idx.lookup(Operator::Equal, &ValueView::Boolean(true)).unwrap();
        assert_eq!(eq.rank(), 3);
        let ne = idx.lookup(Operator::NotEqual, &ValueView::Boolean(true)).unwrap();
        assert_eq!(ne.rank(), 1);
        assert!(idx.lookup(Operator::Less, &ValueView::Boolean(true)).is_err());
    }

    #[test]
    fn s1_boolean_scenario() {
        let mut idx = GenericValueIndex::new(BooleanIndex::new());
        for (i, b) in [true, true, false, true, false, false, false, true].into_iter().enumerate() {
            idx.append(&ValueView::Boolean(b), i as u64).unwrap();
        }
        let f = idx.lookup(Operator::Equal, &ValueView::Boolean(false)).unwrap();
        assert_eq!(bits(&f, 8), "00101110");
        let t = idx.lookup(Operator::NotEqual, &ValueView::Boolean(false)).unwrap();
        assert_eq!(bits(&t, 8), "11010001");
        let both = ValueView::Set(vec![ValueView::Boolean(true), ValueView::Boolean(false)]);
        let multi = idx.lookup(Operator::In, &both).unwrap();
        assert_eq!(bits(&multi, 8), "11111111");
    }

    fn bits(bm: &EwahBitmap, n: u64) -> String {
        (0..n).map(|i| if bm.get(i) { '1' } else { '0' }).collect()
    }
}
