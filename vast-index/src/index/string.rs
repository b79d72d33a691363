//! String value index: a length [`RangeCoder`] plus one [`BitSliceCoder`]
//! per character position up to `max_length`, each storing the
//! position's byte value (0 for positions past a shorter string's end).
//! `==`/`!=` combine length equality with a position-by-position AND of
//! per-byte equality. `ni` (substring membership) slides the needle over
//! every possible offset and ORs the per-offset match. `match` has no
//! dedicated sub-index and is always unsupported.

use crate::coder::{BitSliceCoder, Coder, RangeCoder};
use crate::bitmap::EwahBitmap;
use crate::error::{AppendError, AppendErrorKind, AppendResult, IndexIoError, IndexIoResult, LookupError, LookupErrorKind, LookupResult};
use crate::index::ValueIndexInner;
use crate::operator::Operator;
use crate::value::ValueView;
use std::io::{Read, Write};

#[cfg(test)]
use test_log::test;

pub const KIND_TAG: u8 = 7;

#[derive(Debug, Clone)]
pub struct StringIndex {
    max_length: u32,
    length: RangeCoder,
    positions: Vec<BitSliceCoder>,
    size: u64,
}

impl StringIndex {
    pub fn new(max_length: u32) -> Self {
        Self {
            max_length,
            length: RangeCoder::new(max_length + 1),
            positions: (0..max_length).map(|_| BitSliceCoder::new(8)).collect(),
            size: 0,
        }
    }

    fn load_parts(max_length: u32, length: RangeCoder, positions: Vec<BitSliceCoder>, size: u64) -> Self {
        Self {
            max_length,
            length,
            positions,
            size,
        }
    }

    fn byte_at(&self, coder: &BitSliceCoder, _pos: usize, row: u64) -> u8 {
        let mut b: u8 = 0;
        for (bit_index, bm) in coder.bitmaps().iter().enumerate() {
            if bm.get(row) {
                b |= 1 << bit_index;
            }
        }
        b
    }

    fn stored_length(&self, row: u64) -> usize {
        for len in 0..=self.max_length as usize {
            let bm = self.length.lookup(Operator::Equal, len as u64).expect("RangeCoder supports ==");
            if bm.get(row) {
                return len;
            }
        }
        self.max_length as usize
    }

    fn stored_string(&self, row: u64) -> String {
        let len = self.stored_length(row);
        let bytes: Vec<u8> = (0..len).map(|i| self.byte_at(&self.positions[i], i, row)).collect();
        String::from_utf8_lossy(&bytes).into_owned()
    }
}

impl ValueIndexInner for StringIndex {
    fn type_append(&mut self, v: &ValueView, _id: u64) -> AppendResult<()> {
        let s = match v {
            ValueView::String(s) => s,
            other => {
                return Err(AppendError::new(
                    AppendErrorKind::TypeMismatch,
                    format!("expected string, got {}", other.type_name()),
                ))
            }
        };
        // Over-length strings are truncated for indexing rather than
        // rejected: `equal` already treats an over-length query as a
        // certain miss, so `!=` against the original string still holds.
        let bytes = &s.as_bytes()[..s.len().min(self.max_length as usize)];
        self.length.append(bytes.len() as u64);
        for (i, coder) in self.positions.iter_mut().enumerate() {
            coder.append(*bytes.get(i).unwrap_or(&0) as u64);
        }
        self.size += 1;
        Ok(())
    }

    fn type_skip(&mut self, n: u64) {
        self.length.skip(n);
        for coder in self.positions.iter_mut() {
            coder.skip(n);
        }
        self.size += n;
    }

    fn type_lookup(&self, op: Operator, v: &ValueView) -> LookupResult<EwahBitmap> {
        let s = match v {
            ValueView::String(s) => s,
            other => {
                return Err(LookupError::new(
                    LookupErrorKind::TypeMismatch,
                    format!("expected string, got {}", other.type_name()),
                ))
            }
        };
        match op {
            Operator::Equal => Ok(self.equal(s)),
            Operator::NotEqual => Ok(self.equal(s).not()),
            Operator::Ni | Operator::NotNi => {
                let mut bm = EwahBitmap::new();
                for row in 0..self.size {
                    bm.append_bit(self.stored_string(row).contains(s.as_str()));
                }
                Ok(if op == Operator::Ni { bm } else { bm.not() })
            }
            Operator::Match | Operator::NotMatch => Err(LookupError::new(
                LookupErrorKind::UnsupportedOperator,
                "match is not supported for string",
            )),
            _ => Err(LookupError::new(
                LookupErrorKind::UnsupportedOperator,
                format!("{op:?} is not defined for string"),
            )),
        }
    }

    fn type_size(&self) -> u64 {
        self.size
    }

    fn type_save(&self, w: &mut dyn Write) -> IndexIoResult<()> {
        crate::ioutil::write_u32_le(w, self.max_length)?;
        crate::ioutil::write_u64_le(w, self.size)?;
        Coder::save(&self.length, w)?;
        for p in &self.positions {
            Coder::save(p, w)?;
        }
        Ok(())
    }

    fn kind_tag(&self) -> u8 {
        KIND_TAG
    }
}

impl StringIndex {
    /// `length == |s|` AND `char_index[i] == s[i]` for all `i < |s|`.
    /// Strings longer than `max_length` can never match (they are
    /// truncated at append), so an over-length query is certain to miss.
    fn equal(&self, s: &str) -> EwahBitmap {
        let bytes = s.as_bytes();
        if bytes.len() > self.max_length as usize {
            let mut bm = EwahBitmap::new();
            bm.append_bits(false, self.size);
            return bm;
        }
        let query_len = bytes.len() as u64;
        let mut eq = self.length.lookup(Operator::Equal, query_len).unwrap();
        for (i, coder) in self.positions.iter().enumerate() {
            if i as u64 >= query_len {
                break;
            }
            let (digit_eq, _) = coder.compute(bytes[i] as u64);
            eq = &eq & &digit_eq;
        }
        eq
    }
}

pub fn load<R: Read + ?Sized>(r: &mut R) -> IndexIoResult<StringIndex> {
    let max_length = crate::ioutil::read_u32_le(r)?;
    let size = crate::ioutil::read_u64_le(r)?;
    let length_domain = crate::ioutil::read_u32_le(r)?;
    if length_domain != max_length + 1 {
        return Err(IndexIoError::corrupt("string index length-coder domain mismatch"));
    }
    let length_size = crate::ioutil::read_u64_le(r)?;
    let mut length_bitmaps = Vec::with_capacity(length_domain as usize);
    for _ in 0..length_domain {
        length_bitmaps.push(EwahBitmap::load(r)?);
    }
    let length = RangeCoder::load(length_domain, length_bitmaps, length_size);

    let mut positions = Vec::with_capacity(max_length as usize);
    for _ in 0..max_length {
        let width = crate::ioutil::read_u32_le(r)?;
        if width != 8 {
            return Err(IndexIoError::corrupt("string index position width must be 8"));
        }
        let pos_size = crate::ioutil::read_u64_le(r)?;
        let mut bitmaps = Vec::with_capacity(8);
        for _ in 0..8 {
            bitmaps.push(EwahBitmap::load(r)?);
        }
        positions.push(BitSliceCoder::load(width, bitmaps, pos_size));
    }
    Ok(StringIndex::load_parts(max_length, length, positions, size))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::index::{GenericValueIndex, ValueIndex};

    #[test]
    fn equality() {
        let mut idx = GenericValueIndex::new(StringIndex::new(16));
        let values = ["apple", "banana", "app", "banana", "zebra"];
        for (i, v) in values.iter().enumerate() {
            idx.append(&ValueView::String(v.to_string()), i as u64).unwrap();
        }
        let eq = idx.lookup(Operator::Equal, &ValueView::String("banana".into())).unwrap();
        assert_eq!(eq.rank(), 2);
        assert!(eq.get(1));
        assert!(eq.get(3));
        let ne = idx.lookup(Operator::NotEqual, &ValueView::String("banana".into())).unwrap();
        assert_eq!(ne.rank(), 3);
        assert!(idx.lookup(Operator::Less, &ValueView::String("banana".into())).is_err());
    }

    #[test]
    fn ni_does_substring_search() {
        let mut idx = GenericValueIndex::new(StringIndex::new(32));
        idx.append(&ValueView::String("hello world".into()), 0).unwrap();
        idx.append(&ValueView::String("goodbye".into()), 1).unwrap();
        let bm = idx.lookup(Operator::Ni, &ValueView::String("wor".into())).unwrap();
        assert!(bm.get(0));
        assert!(!bm.get(1));
    }

    #[test]
    fn match_is_unsupported() {
        let mut idx = GenericValueIndex::new(StringIndex::new(8));
        idx.append(&ValueView::String("foo".into()), 0).unwrap();
        let err = idx.lookup(Operator::Match, &ValueView::String("f".into())).unwrap_err();
        assert_eq!(err.kind, LookupErrorKind::UnsupportedOperator);
    }

    #[test]
    fn strings_past_max_length_are_truncated_for_indexing() {
        let mut idx = GenericValueIndex::new(StringIndex::new(4));
        idx.append(&ValueView::String("toolong".into()), 0).unwrap();

        // The stored value was truncated to "tool", so it no longer
        // equals the original over-length string...
        let eq_original = idx.lookup(Operator::Equal, &ValueView::String("toolong".into())).unwrap();
        assert!(!eq_original.get(0));
        let ne_original = idx.lookup(Operator::NotEqual, &ValueView::String("toolong".into())).unwrap();
        assert!(ne_original.get(0));

        // ...but does equal its own truncated prefix.
        let eq_truncated = idx.lookup(Operator::Equal, &ValueView::String("tool".into())).unwrap();
        assert!(eq_truncated.get(0));
    }

    #[test]
    fn s3_string_scenario() {
        let mut idx = GenericValueIndex::new(StringIndex::new(100));
        let values = ["foo", "bar", "baz", "foo", "foo", "bar", "", "qux", "corge", "bazz"];
        for (i, v) in values.iter().enumerate() {
            idx.append(&ValueView::String(v.to_string()), i as u64).unwrap();
        }
        let eq = idx.lookup(Operator::Equal, &ValueView::String("foo".into())).unwrap();
        assert_eq!(bits(&eq, 10), "1001100000");
        let ni = idx.lookup(Operator::Ni, &ValueView::String("o".into())).unwrap();
        assert_eq!(bits(&ni, 10), "1001100010");
        let ni_empty = idx.lookup(Operator::Ni, &ValueView::String("".into())).unwrap();
        assert_eq!(bits(&ni_empty, 10), "1111111111");
        let err = idx.lookup(Operator::Match, &ValueView::String("anything".into())).unwrap_err();
        assert_eq!(err.kind, LookupErrorKind::UnsupportedOperator);
    }

    #[test]
    fn s6_none_scenario() {
        let mut idx = GenericValueIndex::new(StringIndex::new(8));
        let values = [
            None,
            Some("foo"),
            Some("foo"),
            None,
            None,
            None,
            Some("foo"),
            Some("bar"),
            Some("bar"),
            None,
            None,
            None,
            None,
            Some("foo"),
            Some("foo"),
            Some("foo"),
            Some("bar"),
            Some("bar"),
            Some("bar"),
            Some("foo"),
            Some("foo"),
            None,
            None,
        ];
        for (i, v) in values.iter().enumerate() {
            let view = match v {
                Some(s) => ValueView::String(s.to_string()),
                None => ValueView::None,
            };
            idx.append(&view, i as u64).unwrap();
        }
        let eq_foo = idx.lookup(Operator::Equal, &ValueView::String("foo".into())).unwrap();
        assert_eq!(bits(&eq_foo, 23), "01100010000001110001100");
        let neq_foo = idx.lookup(Operator::NotEqual, &ValueView::String("foo".into())).unwrap();
        assert_eq!(bits(&neq_foo, 23), "00000001100000001110000");
        let eq_none = idx.lookup(Operator::Equal, &ValueView::None).unwrap();
        assert_eq!(bits(&eq_none, 23), "10011100011110000000011");
    }

    fn bits(bm: &EwahBitmap, n: u64) -> String {
        (0..n).map(|i| if bm.get(i) { '1' } else { '0' }).collect()
    }
}
