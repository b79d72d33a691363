//! Digit-wise composition of `k` bit-slice coders over a uniform base
//! `b`: a value is decomposed into `k` digits (most significant first)
//! and each digit is routed to its own `BitSliceCoder`. Equality is the
//! AND of per-digit equalities; ordering is decided by the highest-order
//! digit where the two values first differ, exactly as in a
//! lexicographic integer comparison.

use crate::bitmap::EwahBitmap;
use crate::coder::{BitSliceCoder, Coder};
use crate::error::{IndexIoError, IndexIoResult};
use crate::operator::Operator;
use std::io::{Read, Write};

#[cfg(test)]
use test_log::test;

fn digit_bits(base: u64) -> u32 {
    debug_assert!(base >= 2);
    64 - (base - 1).leading_zeros()
}

#[derive(Debug, Clone)]
pub struct MultiLevelCoder {
    base: u64,
    k: u32,
    digits: Vec<BitSliceCoder>,
    size: u64,
}

impl MultiLevelCoder {
    pub fn new(base: u64, k: u32) -> Self {
        let bits = digit_bits(base);
        Self {
            base,
            k,
            digits: (0..k).map(|_| BitSliceCoder::new(bits)).collect(),
            size: 0,
        }
    }

    pub fn base(&self) -> u64 {
        self.base
    }

    pub fn k(&self) -> u32 {
        self.k
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    /// Decomposes `v` into `k` digits of `base`, most significant first.
    /// Values that overflow the `k`-digit domain are truncated to their
    /// low-order `k` digits, matching the append-time silent wraparound
    /// a fixed-width bit-slice coder would also exhibit.
    fn decompose(&self, v: u64) -> Vec<u64> {
        let mut digits = vec![0u64; self.k as usize];
        let mut rem = v;
        for i in (0..self.k as usize).rev() {
            digits[i] = rem % self.base;
            rem /= self.base;
        }
        digits
    }

    pub fn append(&mut self, v: u64) {
        let digits = self.decompose(v);
        for (coder, d) in self.digits.iter_mut().zip(digits.into_iter()) {
            coder.append(d);
        }
        self.size += 1;
    }

    /// Advances every digit coder by `n` zero positions.
    pub fn skip(&mut self, n: u64) {
        for coder in self.digits.iter_mut() {
            coder.skip(n);
        }
        self.size += n;
    }

    /// Returns (equal, less) bitmaps across the whole k-digit value,
    /// computed most-significant-digit first so a tie is only carried
    /// forward while every higher digit has matched exactly.
    pub fn compute(&self, v: u64) -> (EwahBitmap, EwahBitmap) {
        let digits = self.decompose(v);
        let mut equal = ones(self.size);
        let mut less = zeros(self.size);
        for (coder, d) in self.digits.iter().zip(digits.iter()) {
            let (deq, dlt) = coder.compute(*d);
            less = &less | &(&dlt & &equal);
            equal = &equal & &deq;
        }
        (equal, less)
    }

    pub fn lookup(&self, op: Operator, v: u64) -> Option<EwahBitmap> {
        let (equal, less) = self.compute(v);
        match op {
            Operator::Equal => Some(equal),
            Operator::NotEqual => Some(equal.not()),
            Operator::Less => Some(less),
            Operator::GreaterEqual => Some(less.not()),
            Operator::LessEqual => Some(&less | &equal),
            Operator::Greater => Some(&(&less | &equal).not()),
            _ => None,
        }
    }

    pub fn save(&self, w: &mut dyn Write) -> IndexIoResult<()> {
        crate::ioutil::write_u64_le(w, self.base)?;
        crate::ioutil::write_u32_le(w, self.k)?;
        crate::ioutil::write_u64_le(w, self.size)?;
        for d in &self.digits {
            Coder::save(d, w)?;
        }
        Ok(())
    }

    pub fn load<R: Read + ?Sized>(r: &mut R) -> IndexIoResult<Self> {
        let base = crate::ioutil::read_u64_le(r)?;
        let k = crate::ioutil::read_u32_le(r)?;
        let size = crate::ioutil::read_u64_le(r)?;
        if base < 2 {
            return Err(IndexIoError::corrupt("multi-level coder base below 2"));
        }
        let bits = digit_bits(base);
        let mut digits = Vec::with_capacity(k as usize);
        for _ in 0..k {
            let width = crate::ioutil::read_u32_le(r)?;
            if width != bits {
                return Err(IndexIoError::corrupt("multi-level digit width mismatch"));
            }
            let digit_size = crate::ioutil::read_u64_le(r)?;
            let mut bitmaps = Vec::with_capacity(width as usize);
            for _ in 0..width {
                bitmaps.push(EwahBitmap::load(r)?);
            }
            digits.push(BitSliceCoder::load(width, bitmaps, digit_size));
        }
        Ok(Self { base, k, digits, size })
    }
}

fn zeros(size: u64) -> EwahBitmap {
    let mut bm = EwahBitmap::new();
    bm.append_bits(false, size);
    bm
}

fn ones(size: u64) -> EwahBitmap {
    let mut bm = EwahBitmap::new();
    bm.append_bits(true, size);
    bm
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn decomposition_matches_base_arithmetic() {
        let c = MultiLevelCoder::new(10, 4);
        assert_eq!(c.decompose(1234), vec![1, 2, 3, 4]);
        assert_eq!(c.decompose(7), vec![0, 0, 0, 7]);
    }

    #[test]
    fn skip_advances_size_and_digit_coders() {
        let mut c = MultiLevelCoder::new(10, 3);
        c.append(42);
        c.skip(2);
        assert_eq!(c.size(), 3);
        for coder in &c.digits {
            assert_eq!(Coder::size(coder), 3);
        }
        let eq42 = c.lookup(Operator::Equal, 42).unwrap();
        assert!(eq42.get(0));
        assert!(!eq42.get(1));
        assert!(!eq42.get(2));
    }

    #[test]
    fn ordering_matches_plain_integers() {
        let mut c = MultiLevelCoder::new(10, 3);
        let values = [7u64, 999, 42, 0, 500];
        for &v in &values {
            c.append(v);
        }
        for &q in &[0u64, 42, 500, 999, 123] {
            for op in [
                Operator::Equal,
                Operator::Less,
                Operator::LessEqual,
                Operator::Greater,
                Operator::GreaterEqual,
            ] {
                let bm = c.lookup(op, q).unwrap();
                for (i, &v) in values.iter().enumerate() {
                    let expect = match op {
                        Operator::Equal => v == q,
                        Operator::Less => v < q,
                        Operator::LessEqual => v <= q,
                        Operator::Greater => v > q,
                        Operator::GreaterEqual => v >= q,
                        _ => unreachable!(),
                    };
                    assert_eq!(bm.get(i as u64), expect, "op {op:?} q {q} i {i} v {v}");
                }
            }
        }
    }
}
