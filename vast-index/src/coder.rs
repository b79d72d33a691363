//! Bitmap coders: strategies for decomposing a bounded, non-negative
//! integer into a handful of bitmaps such that relational predicates on
//! the original integer become bitwise operations over the bitmaps.

use crate::bitmap::EwahBitmap;
use crate::operator::Operator;

#[cfg(test)]
use test_log::test;

/// A coder owns one bitmap per "slot" of its domain and knows how to
/// translate an `Operator` query into a bitmap built from those slots.
pub trait Coder {
    /// Number of component bitmaps (the coder's domain size / bit width).
    fn domain(&self) -> u32;

    /// Advance every component bitmap by one position, encoding `v`.
    /// `v` must be `< domain()` for Equality/Range coders, or fit within
    /// the coder's bit width for BitSliceCoder.
    fn append(&mut self, v: u64);

    /// Advance every component bitmap by `n` zero positions, without
    /// encoding any value. Used to fill a gap left by a sparse append.
    fn skip(&mut self, n: u64);

    fn size(&self) -> u64;

    /// Evaluate `op` against `v`. Returns `None` if `op` has no
    /// meaning for this coder (e.g. `<` on an EqualityCoder).
    fn lookup(&self, op: Operator, v: u64) -> Option<EwahBitmap>;

    fn save(&self, w: &mut dyn std::io::Write) -> crate::error::IndexIoResult<()>;
}

/// D bitmaps; value `v` sets a single bit in bitmap `v`. Supports only
/// `==`/`!=`.
#[derive(Debug, Clone)]
pub struct EqualityCoder {
    domain: u32,
    bitmaps: Vec<EwahBitmap>,
    size: u64,
}

impl EqualityCoder {
    pub fn new(domain: u32) -> Self {
        Self {
            domain,
            bitmaps: (0..domain).map(|_| EwahBitmap::new()).collect(),
            size: 0,
        }
    }

    pub fn load(domain: u32, bitmaps: Vec<EwahBitmap>, size: u64) -> Self {
        Self { domain, bitmaps, size }
    }

    pub fn bitmaps(&self) -> &[EwahBitmap] {
        &self.bitmaps
    }

    /// `lookup(in, set)`: the OR over the bitmaps named by `values`.
    /// Values outside the domain contribute nothing (they can never
    /// match any stored row).
    pub fn lookup_in(&self, values: &[u64]) -> EwahBitmap {
        let mut result = EwahBitmap_zeros(self.size);
        for &v in values {
            if v < self.domain as u64 {
                result = &result | &self.bitmaps[v as usize];
            }
        }
        result
    }
}

impl Coder for EqualityCoder {
    fn domain(&self) -> u32 {
        self.domain
    }

    fn append(&mut self, v: u64) {
        for (i, bm) in self.bitmaps.iter_mut().enumerate() {
            bm.append_bit(i as u64 == v);
        }
        self.size += 1;
    }

    fn skip(&mut self, n: u64) {
        for bm in self.bitmaps.iter_mut() {
            bm.append_bits(false, n);
        }
        self.size += n;
    }

    fn size(&self) -> u64 {
        self.size
    }

    fn lookup(&self, op: Operator, v: u64) -> Option<EwahBitmap> {
        if v >= self.domain as u64 {
            return match op {
                Operator::Equal => Some(EwahBitmap_zeros(self.size)),
                Operator::NotEqual => Some(EwahBitmap_ones(self.size)),
                _ => None,
            };
        }
        match op {
            Operator::Equal => Some(self.bitmaps[v as usize].clone()),
            Operator::NotEqual => Some(self.bitmaps[v as usize].not()),
            _ => None,
        }
    }

    fn save(&self, w: &mut dyn std::io::Write) -> crate::error::IndexIoResult<()> {
        crate::ioutil::write_u32_le(w, self.domain)?;
        crate::ioutil::write_u64_le(w, self.size)?;
        for bm in &self.bitmaps {
            bm.save(w)?;
        }
        Ok(())
    }
}

/// D bitmaps; value `v` sets bitmaps `v..D`. O(1) lookups for `<=`/`<`
/// via the prefix structure, `==` needs one AND-of-adjacent-differences.
#[derive(Debug, Clone)]
pub struct RangeCoder {
    domain: u32,
    bitmaps: Vec<EwahBitmap>,
    size: u64,
}

impl RangeCoder {
    pub fn new(domain: u32) -> Self {
        Self {
            domain,
            bitmaps: (0..domain).map(|_| EwahBitmap::new()).collect(),
            size: 0,
        }
    }

    pub fn load(domain: u32, bitmaps: Vec<EwahBitmap>, size: u64) -> Self {
        Self { domain, bitmaps, size }
    }

    pub fn bitmaps(&self) -> &[EwahBitmap] {
        &self.bitmaps
    }

    fn le(&self, v: u64) -> EwahBitmap {
        if v as i64 >= self.domain as i64 - 1 {
            return EwahBitmap_ones(self.size);
        }
        self.bitmaps[v as usize + 1].not()
    }
}

impl Coder for RangeCoder {
    fn domain(&self) -> u32 {
        self.domain
    }

    fn append(&mut self, v: u64) {
        for (i, bm) in self.bitmaps.iter_mut().enumerate() {
            bm.append_bit(v >= i as u64);
        }
        self.size += 1;
    }

    fn skip(&mut self, n: u64) {
        for bm in self.bitmaps.iter_mut() {
            bm.append_bits(false, n);
        }
        self.size += n;
    }

    fn size(&self) -> u64 {
        self.size
    }

    fn lookup(&self, op: Operator, v: u64) -> Option<EwahBitmap> {
        match op {
            Operator::LessEqual => Some(self.le(v)),
            Operator::Greater => Some(self.le(v).not()),
            Operator::Less => {
                if v == 0 {
                    Some(EwahBitmap_zeros(self.size))
                } else {
                    Some(self.le(v - 1))
                }
            }
            Operator::GreaterEqual => {
                if v == 0 {
                    Some(EwahBitmap_ones(self.size))
                } else {
                    Some(self.le(v - 1).not())
                }
            }
            Operator::Equal => {
                if v >= self.domain as u64 {
                    Some(EwahBitmap_zeros(self.size))
                } else {
                    let le_v = self.le(v);
                    let lt_v = if v == 0 {
                        EwahBitmap_zeros(self.size)
                    } else {
                        self.le(v - 1)
                    };
                    Some(&le_v & &lt_v.not())
                }
            }
            Operator::NotEqual => self.lookup(Operator::Equal, v).map(|bm| bm.not()),
            _ => None,
        }
    }

    fn save(&self, w: &mut dyn std::io::Write) -> crate::error::IndexIoResult<()> {
        crate::ioutil::write_u32_le(w, self.domain)?;
        crate::ioutil::write_u64_le(w, self.size)?;
        for bm in &self.bitmaps {
            bm.save(w)?;
        }
        Ok(())
    }
}

/// `w` bitmaps, one per bit position of a fixed-width unsigned integer.
/// Supports the full relational family via a single MSB-first pass that
/// simultaneously tracks "equal so far" and "less than so far".
#[derive(Debug, Clone)]
pub struct BitSliceCoder {
    width: u32,
    bitmaps: Vec<EwahBitmap>,
    size: u64,
}

impl BitSliceCoder {
    pub fn new(width: u32) -> Self {
        Self {
            width,
            bitmaps: (0..width).map(|_| EwahBitmap::new()).collect(),
            size: 0,
        }
    }

    pub fn load(width: u32, bitmaps: Vec<EwahBitmap>, size: u64) -> Self {
        Self { width, bitmaps, size }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn bitmaps(&self) -> &[EwahBitmap] {
        &self.bitmaps
    }

    fn bit(&self, i: u32) -> &EwahBitmap {
        &self.bitmaps[i as usize]
    }

    /// Returns (equal, less) bitmaps: `equal` has a 1 at every appended
    /// position whose value equals `v`; `less` has a 1 at every position
    /// whose value is strictly less than `v`.
    pub fn compute(&self, v: u64) -> (EwahBitmap, EwahBitmap) {
        let mut equal = EwahBitmap_ones(self.size);
        let mut less = EwahBitmap_zeros(self.size);
        for i in (0..self.width).rev() {
            let vb = (v >> i) & 1 != 0;
            let bit = self.bit(i);
            // positions where this digit of the stored value is less
            // than vb's digit (0 < 1), restricted to positions still
            // tied on every higher-order bit.
            let digit_less: EwahBitmap = if vb {
                bit.not()
            } else {
                EwahBitmap_zeros(self.size)
            };
            less = &less | &(&digit_less & &equal);
            let digit_equal: EwahBitmap = if vb { bit.clone() } else { bit.not() };
            equal = &equal & &digit_equal;
        }
        (equal, less)
    }
}

impl Coder for BitSliceCoder {
    fn domain(&self) -> u32 {
        self.width
    }

    fn append(&mut self, v: u64) {
        for i in 0..self.width {
            self.bitmaps[i as usize].append_bit((v >> i) & 1 != 0);
        }
        self.size += 1;
    }

    fn skip(&mut self, n: u64) {
        for bm in self.bitmaps.iter_mut() {
            bm.append_bits(false, n);
        }
        self.size += n;
    }

    fn size(&self) -> u64 {
        self.size
    }

    fn lookup(&self, op: Operator, v: u64) -> Option<EwahBitmap> {
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

    fn save(&self, w: &mut dyn std::io::Write) -> crate::error::IndexIoResult<()> {
        crate::ioutil::write_u32_le(w, self.width)?;
        crate::ioutil::write_u64_le(w, self.size)?;
        for bm in &self.bitmaps {
            bm.save(w)?;
        }
        Ok(())
    }
}

#[allow(non_snake_case)]
fn EwahBitmap_zeros(size: u64) -> EwahBitmap {
    let mut bm = EwahBitmap::new();
    bm.append_bits(false, size);
    bm
}

#[allow(non_snake_case)]
fn EwahBitmap_ones(size: u64) -> EwahBitmap {
    let mut bm = EwahBitmap::new();
    bm.append_bits(true, size);
    bm
}
