//! EWAH (Enhanced Word-Aligned Hybrid) run-length compressed bitmaps.
//!
//! The compressed stream is a sequence of 64-bit marker words, each one
//! followed by the literal ("dirty") words it governs. A marker packs a
//! clean-run bit value, a clean-run length in words, and a trailing dirty
//! word count into a single u64: bit 0 is the run's bit value, bits 1..33
//! are the run length, bits 33..64 are the dirty word count. Binary
//! operators walk two streams with a pair of cursors and only ever touch
//! a dirty word when both sides disagree about being a clean run, which
//! is what keeps AND/OR/XOR proportional to compressed length rather
//! than logical length.

use crate::error::{IndexIoError, IndexIoResult};
use crate::ioutil;
use std::io::{Read, Write};

#[cfg(test)]
use test_log::test;

const CLEAN_LEN_BITS: u32 = 32;
const MAX_CLEAN_LEN: u32 = u32::MAX;
const MAX_DIRTY: u32 = (1u32 << 31) - 1;

#[derive(Clone, Copy)]
struct Marker {
    clean_bit: bool,
    clean_len: u32,
    dirty_count: u32,
}

fn encode_marker(m: Marker) -> u64 {
    (m.clean_bit as u64) | ((m.clean_len as u64) << 1) | ((m.dirty_count as u64) << (1 + CLEAN_LEN_BITS))
}

fn decode_marker(word: u64) -> Marker {
    Marker {
        clean_bit: word & 1 != 0,
        clean_len: ((word >> 1) & 0xFFFF_FFFF) as u32,
        dirty_count: (word >> (1 + CLEAN_LEN_BITS)) as u32,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EwahBitmap {
    words: Vec<u64>,
    last_marker: usize,
    word_bits: u64,
    pending: u64,
    pending_n: u32,
}

impl Default for EwahBitmap {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Chunk {
    Clean(bool),
    Dirty,
}

struct Cursor<'a> {
    words: &'a [u64],
    pos: usize,
    clean_bit: bool,
    clean_left: u64,
    dirty_left: u32,
    dirty_idx: usize,
}

impl<'a> Cursor<'a> {
    fn new(words: &'a [u64]) -> Self {
        let mut c = Cursor {
            words,
            pos: 0,
            clean_bit: false,
            clean_left: 0,
            dirty_left: 0,
            dirty_idx: 0,
        };
        c.load(0);
        c
    }

    fn load(&mut self, pos: usize) {
        self.pos = pos;
        if pos >= self.words.len() {
            self.clean_left = 0;
            self.dirty_left = 0;
            self.dirty_idx = pos;
            return;
        }
        let m = decode_marker(self.words[pos]);
        self.clean_bit = m.clean_bit;
        self.clean_left = m.clean_len as u64;
        self.dirty_left = m.dirty_count;
        self.dirty_idx = pos + 1;
    }

    fn settle(&mut self) {
        while self.pos < self.words.len() && self.clean_left == 0 && self.dirty_left == 0 {
            self.load(self.dirty_idx);
        }
    }

    fn exhausted(&mut self) -> bool {
        self.settle();
        self.pos >= self.words.len()
    }

    fn peek_kind(&mut self) -> Option<Chunk> {
        if self.exhausted() {
            return None;
        }
        if self.clean_left > 0 {
            Some(Chunk::Clean(self.clean_bit))
        } else {
            Some(Chunk::Dirty)
        }
    }

    fn peek_run_words(&mut self) -> u64 {
        if self.exhausted() {
            return 0;
        }
        if self.clean_left > 0 {
            self.clean_left
        } else {
            1
        }
    }

    fn skip_clean(&mut self, n: u64) {
        debug_assert!(n <= self.clean_left);
        self.clean_left -= n;
    }

    fn take_literal(&mut self) -> u64 {
        let w = self.words[self.dirty_idx];
        self.dirty_idx += 1;
        self.dirty_left -= 1;
        w
    }
}

impl EwahBitmap {
    pub fn new() -> Self {
        Self {
            words: Vec::new(),
            last_marker: 0,
            word_bits: 0,
            pending: 0,
            pending_n: 0,
        }
    }

    pub fn size(&self) -> u64 {
        self.word_bits + self.pending_n as u64
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    fn add_word_to(words: &mut Vec<u64>, last_marker: &mut usize, word: u64) {
        if words.is_empty() {
            words.push(encode_marker(Marker {
                clean_bit: false,
                clean_len: 0,
                dirty_count: 0,
            }));
            *last_marker = 0;
        }
        if word == 0 || word == u64::MAX {
            let bit = word == u64::MAX;
            let mut marker = decode_marker(words[*last_marker]);
            if marker.dirty_count == 0
                && (marker.clean_len == 0 || marker.clean_bit == bit)
                && marker.clean_len < MAX_CLEAN_LEN
            {
                marker.clean_bit = bit;
                marker.clean_len += 1;
                words[*last_marker] = encode_marker(marker);
            } else {
                words.push(encode_marker(Marker {
                    clean_bit: bit,
                    clean_len: 1,
                    dirty_count: 0,
                }));
                *last_marker = words.len() - 1;
            }
        } else {
            Self::force_push_literal(words, last_marker, word);
        }
    }

    fn force_push_literal(words: &mut Vec<u64>, last_marker: &mut usize, word: u64) {
        if words.is_empty() {
            words.push(encode_marker(Marker {
                clean_bit: false,
                clean_len: 0,
                dirty_count: 0,
            }));
            *last_marker = 0;
        }
        let mut marker = decode_marker(words[*last_marker]);
        if marker.dirty_count < MAX_DIRTY {
            words.push(word);
            marker.dirty_count += 1;
            words[*last_marker] = encode_marker(marker);
        } else {
            let new_marker_idx = words.len();
            words.push(encode_marker(Marker {
                clean_bit: false,
                clean_len: 0,
                dirty_count: 1,
            }));
            words.push(word);
            *last_marker = new_marker_idx;
        }
    }

    fn add_run_to(words: &mut Vec<u64>, last_marker: &mut usize, bit: bool, mut nwords: u64) {
        if nwords == 0 {
            return;
        }
        if words.is_empty() {
            words.push(encode_marker(Marker {
                clean_bit: false,
                clean_len: 0,
                dirty_count: 0,
            }));
            *last_marker = 0;
        }
        while nwords > 0 {
            let mut marker = decode_marker(words[*last_marker]);
            if marker.dirty_count == 0 && (marker.clean_len == 0 || marker.clean_bit == bit) {
                let capacity = (MAX_CLEAN_LEN - marker.clean_len) as u64;
                let take = nwords.min(capacity);
                marker.clean_bit = bit;
                marker.clean_len += take as u32;
                words[*last_marker] = encode_marker(marker);
                nwords -= take;
                if nwords == 0 {
                    break;
                }
                words.push(encode_marker(Marker {
                    clean_bit: false,
                    clean_len: 0,
                    dirty_count: 0,
                }));
                *last_marker = words.len() - 1;
            } else {
                words.push(encode_marker(Marker {
                    clean_bit: bit,
                    clean_len: 0,
                    dirty_count: 0,
                }));
                *last_marker = words.len() - 1;
            }
        }
    }

    fn pop_last_word(words: &mut Vec<u64>, last_marker: &mut usize) -> u64 {
        let mut m = decode_marker(words[*last_marker]);
        if m.dirty_count > 0 {
            let idx = *last_marker + m.dirty_count as usize;
            let w = words.remove(idx);
            m.dirty_count -= 1;
            words[*last_marker] = encode_marker(m);
            w
        } else {
            m.clean_len -= 1;
            words[*last_marker] = encode_marker(m);
            if m.clean_bit {
                u64::MAX
            } else {
                0
            }
        }
    }

    fn from_compressed_words(mut words: Vec<u64>, last_marker: usize, size: u64) -> EwahBitmap {
        let pending_n = if size % 64 == 0 { 0 } else { (size % 64) as u32 };
        let mut last_marker = last_marker;
        let pending = if pending_n > 0 {
            let w = Self::pop_last_word(&mut words, &mut last_marker);
            w & ((1u64 << pending_n) - 1)
        } else {
            0
        };
        let word_bits = size - pending_n as u64;
        EwahBitmap {
            words,
            last_marker,
            word_bits,
            pending,
            pending_n,
        }
    }

    /// A read-only view of the compressed stream with the pending tail
    /// word (if any) forced into dirty form, never merged into a clean
    /// run. Used by algorithms that need to walk the full logical
    /// content; never stored back as `self.words`.
    fn finalized_words_for_read(&self) -> Vec<u64> {
        let mut words = self.words.clone();
        let mut last_marker = self.last_marker;
        if self.pending_n > 0 {
            Self::force_push_literal(&mut words, &mut last_marker, self.pending);
        }
        words
    }

    fn word_at(words: &[u64], idx: u64) -> Option<u64> {
        let mut pos = 0usize;
        let mut wi = 0u64;
        while pos < words.len() {
            let m = decode_marker(words[pos]);
            if idx < wi + m.clean_len as u64 {
                return Some(if m.clean_bit { u64::MAX } else { 0 });
            }
            wi += m.clean_len as u64;
            let dirty_start = pos + 1;
            if idx < wi + m.dirty_count as u64 {
                return Some(words[dirty_start + (idx - wi) as usize]);
            }
            wi += m.dirty_count as u64;
            pos = dirty_start + m.dirty_count as usize;
        }
        None
    }

    pub fn append_bit(&mut self, b: bool) {
        if b {
            self.pending |= 1u64 << self.pending_n;
        }
        self.pending_n += 1;
        if self.pending_n == 64 {
            Self::add_word_to(&mut self.words, &mut self.last_marker, self.pending);
            self.word_bits += 64;
            self.pending = 0;
            self.pending_n = 0;
        }
    }

    pub fn append_bits(&mut self, b: bool, k: u64) {
        let mut remaining = k;
        while remaining > 0 && self.pending_n > 0 {
            self.append_bit(b);
            remaining -= 1;
        }
        if remaining == 0 {
            return;
        }
        let whole = remaining / 64;
        let rem = remaining % 64;
        if whole > 0 {
            Self::add_run_to(&mut self.words, &mut self.last_marker, b, whole);
            self.word_bits += whole * 64;
        }
        for _ in 0..rem {
            self.append_bit(b);
        }
    }

    pub fn get(&self, index: u64) -> bool {
        if index >= self.size() {
            return false;
        }
        if index < self.word_bits {
            let word_idx = index / 64;
            let bit = (index % 64) as u32;
            Self::word_at(&self.words, word_idx)
                .map(|w| (w >> bit) & 1 != 0)
                .unwrap_or(false)
        } else {
            let bit = (index - self.word_bits) as u32;
            (self.pending >> bit) & 1 != 0
        }
    }

    pub fn rank(&self) -> u64 {
        let mut pos = 0usize;
        let mut total = 0u64;
        while pos < self.words.len() {
            let m = decode_marker(self.words[pos]);
            if m.clean_bit {
                total += m.clean_len as u64 * 64;
            }
            let dirty_start = pos + 1;
            for i in 0..m.dirty_count as usize {
                total += self.words[dirty_start + i].count_ones() as u64;
            }
            pos = dirty_start + m.dirty_count as usize;
        }
        total + self.pending.count_ones() as u64
    }

    /// Index of the k-th set bit (0-based). Negative `k` counts from the
    /// end, so `-1` is the last set bit. Returns `None` if out of range.
    pub fn select(&self, k: i64) -> Option<u64> {
        let total = self.rank();
        let target: u64 = if k < 0 {
            let adj = total as i64 + k;
            if adj < 0 {
                return None;
            }
            adj as u64
        } else {
            k as u64
        };
        if target >= total {
            return None;
        }
        let mut seen = 0u64;
        let mut pos = 0usize;
        let mut word_index = 0u64;
        while pos < self.words.len() {
            let m = decode_marker(self.words[pos]);
            if m.clean_bit {
                let run_ones = m.clean_len as u64 * 64;
                if seen + run_ones > target {
                    return Some(word_index * 64 + (target - seen));
                }
                seen += run_ones;
            }
            word_index += m.clean_len as u64;
            let dirty_start = pos + 1;
            for i in 0..m.dirty_count as usize {
                let w = self.words[dirty_start + i];
                let ones = w.count_ones() as u64;
                if seen + ones > target {
                    return Some(word_index * 64 + nth_set_bit(w, target - seen));
                }
                seen += ones;
                word_index += 1;
            }
            pos = dirty_start + m.dirty_count as usize;
        }
        Some(self.word_bits + nth_set_bit(self.pending, target - seen))
    }

    fn merge(
        a: &EwahBitmap,
        b: &EwahBitmap,
        op: impl Fn(u64, u64) -> u64,
        op_bit: impl Fn(bool, bool) -> bool,
    ) -> EwahBitmap {
        let aw = a.finalized_words_for_read();
        let bw = b.finalized_words_for_read();
        let mut ca = Cursor::new(&aw);
        let mut cb = Cursor::new(&bw);
        let total_size = a.size().max(b.size());
        let total_words = total_size.div_ceil(64);
        let mut out = Vec::new();
        let mut out_marker = 0usize;
        let mut done = 0u64;
        while done < total_words {
            let remaining = total_words - done;
            let a_live = !ca.exhausted();
            let b_live = !cb.exhausted();
            let (a_kind, a_run) = if a_live {
                (ca.peek_kind().unwrap(), ca.peek_run_words())
            } else {
                (Chunk::Clean(false), remaining)
            };
            let (b_kind, b_run) = if b_live {
                (cb.peek_kind().unwrap(), cb.peek_run_words())
            } else {
                (Chunk::Clean(false), remaining)
            };
            match (a_kind, b_kind) {
                (Chunk::Clean(ba), Chunk::Clean(bb)) => {
                    let take = a_run.min(b_run).min(remaining);
                    Self::add_run_to(&mut out, &mut out_marker, op_bit(ba, bb), take);
                    if a_live {
                        ca.skip_clean(take);
                    }
                    if b_live {
                        cb.skip_clean(take);
                    }
                    done += take;
                }
                _ => {
                    let aword = match a_kind {
                        Chunk::Dirty => ca.take_literal(),
                        Chunk::Clean(bit) => {
                            if a_live {
                                ca.skip_clean(1);
                            }
                            if bit {
                                u64::MAX
                            } else {
                                0
                            }
                        }
                    };
                    let bword = match b_kind {
                        Chunk::Dirty => cb.take_literal(),
                        Chunk::Clean(bit) => {
                            if b_live {
                                cb.skip_clean(1);
                            }
                            if bit {
                                u64::MAX
                            } else {
                                0
                            }
                        }
                    };
                    Self::add_word_to(&mut out, &mut out_marker, op(aword, bword));
                    done += 1;
                }
            }
        }
        Self::from_compressed_words(out, out_marker, total_size)
    }

    pub fn and(&self, other: &EwahBitmap) -> EwahBitmap {
        Self::merge(self, other, |a, b| a & b, |a, b| a && b)
    }

    pub fn or(&self, other: &EwahBitmap) -> EwahBitmap {
        Self::merge(self, other, |a, b| a | b, |a, b| a || b)
    }

    pub fn xor(&self, other: &EwahBitmap) -> EwahBitmap {
        Self::merge(self, other, |a, b| a ^ b, |a, b| a != b)
    }

    pub fn not(&self) -> EwahBitmap {
        let words = self.finalized_words_for_read();
        let mut cursor = Cursor::new(&words);
        let mut out = Vec::new();
        let mut out_marker = 0usize;
        let total_words = self.size().div_ceil(64);
        let mut done = 0u64;
        while done < total_words {
            match cursor.peek_kind().unwrap() {
                Chunk::Clean(b) => {
                    let run = cursor.peek_run_words().min(total_words - done);
                    Self::add_run_to(&mut out, &mut out_marker, !b, run);
                    cursor.skip_clean(run);
                    done += run;
                }
                Chunk::Dirty => {
                    let w = cursor.take_literal();
                    Self::add_word_to(&mut out, &mut out_marker, !w);
                    done += 1;
                }
            }
        }
        Self::from_compressed_words(out, out_marker, self.size())
    }

    pub fn save<W: Write + ?Sized>(&self, w: &mut W) -> IndexIoResult<()> {
        let words = self.finalized_words_for_read();
        ioutil::write_u32_le(w, words.len() as u32)?;
        for &word in &words {
            ioutil::write_u64_le(w, word)?;
        }
        ioutil::write_u32_le(w, self.pending_n)?;
        Ok(())
    }

    pub fn load<R: Read + ?Sized>(r: &mut R) -> IndexIoResult<EwahBitmap> {
        let word_count = ioutil::read_u32_le(r)? as usize;
        let mut words = Vec::with_capacity(word_count);
        for _ in 0..word_count {
            words.push(ioutil::read_u64_le(r)?);
        }
        let trailing = ioutil::read_u32_le(r)?;
        if trailing >= 64 {
            return Err(IndexIoError::corrupt("ewah trailing bit count out of range"));
        }
        let mut pos = 0usize;
        let mut total_words = 0u64;
        let mut last_marker_pos = 0usize;
        while pos < words.len() {
            let m = decode_marker(words[pos]);
            total_words += m.clean_len as u64 + m.dirty_count as u64;
            last_marker_pos = pos;
            pos += 1 + m.dirty_count as usize;
        }
        if pos != words.len() {
            return Err(IndexIoError::corrupt("ewah word stream truncated"));
        }
        let size = if trailing == 0 {
            total_words * 64
        } else {
            if total_words == 0 {
                return Err(IndexIoError::corrupt(
                    "ewah trailing bit count without a tail word",
                ));
            }
            (total_words - 1) * 64 + trailing as u64
        };
        Ok(Self::from_compressed_words(words, last_marker_pos, size))
    }
}

fn nth_set_bit(w: u64, mut n: u64) -> u64 {
    let mut ww = w;
    let mut bit = 0u64;
    loop {
        if ww & 1 != 0 {
            if n == 0 {
                return bit;
            }
            n -= 1;
        }
        ww >>= 1;
        bit += 1;
    }
}

impl std::ops::BitAnd for &EwahBitmap {
    type Output = EwahBitmap;
    fn bitand(self, rhs: Self) -> EwahBitmap {
        self.and(rhs)
    }
}

impl std::ops::BitOr for &EwahBitmap {
    type Output = EwahBitmap;
    fn bitor(self, rhs: Self) -> EwahBitmap {
        self.or(rhs)
    }
}

impl std::ops::BitXor for &EwahBitmap {
    type Output = EwahBitmap;
    fn bitxor(self, rhs: Self) -> EwahBitmap {
        self.xor(rhs)
    }
}

impl std::ops::Not for &EwahBitmap {
    type Output = EwahBitmap;
    fn not(self) -> EwahBitmap {
        EwahBitmap::not(self)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::ioutil::MemWriter;

    fn from_bits(bits: &[bool]) -> EwahBitmap {
        let mut bm = EwahBitmap::new();
        for &b in bits {
            bm.append_bit(b);
        }
        bm
    }

    #[test]
    fn append_and_get_roundtrip() {
        let bits = [true, false, false, true, true, false, true];
        let bm = from_bits(&bits);
        assert_eq!(bm.size(), bits.len() as u64);
        for (i, &b) in bits.iter().enumerate() {
            assert_eq!(bm.get(i as u64), b, "bit {i}");
        }
        assert!(!bm.get(100));
    }

    #[test]
    fn append_bits_bulk_matches_unary() {
        let mut bulk = EwahBitmap::new();
        bulk.append_bits(false, 130);
        bulk.append_bits(true, 5);
        bulk.append_bits(false, 3);

        let mut unary = EwahBitmap::new();
        for _ in 0..130 {
            unary.append_bit(false);
        }
        for _ in 0..5 {
            unary.append_bit(true);
        }
        for _ in 0..3 {
            unary.append_bit(false);
        }
        assert_eq!(bulk.size(), unary.size());
        assert_eq!(bulk, unary);
    }

    #[test]
    fn rank_counts_ones() {
        let bm = from_bits(&[true, true, false, true, false, false, true]);
        assert_eq!(bm.rank(), 4);
    }

    #[test]
    fn select_indexes_ones() {
        let bm = from_bits(&[false, true, false, true, false, true]);
        assert_eq!(bm.select(0), Some(1));
        assert_eq!(bm.select(1), Some(3));
        assert_eq!(bm.select(2), Some(5));
        assert_eq!(bm.select(3), None);
        assert_eq!(bm.select(-1), Some(5));
        assert_eq!(bm.select(-3), Some(1));
    }

    #[test]
    fn and_or_xor_not_over_mixed_runs() {
        let mut a = EwahBitmap::new();
        a.append_bits(true, 200);
        a.append_bit(false);
        a.append_bits(true, 3);

        let mut b = EwahBitmap::new();
        b.append_bits(false, 100);
        b.append_bits(true, 105);

        let and = a.and(&b);
        let or = a.or(&b);
        let xor = a.xor(&b);
        let not_a = a.not();

        assert_eq!(and.size(), 204);
        assert_eq!(or.size(), 204);
        for i in 0..204u64 {
            let av = a.get(i);
            let bv = b.get(i);
            assert_eq!(and.get(i), av && bv, "and bit {i}");
            assert_eq!(or.get(i), av || bv, "or bit {i}");
            assert_eq!(xor.get(i), av != bv, "xor bit {i}");
            assert_eq!(not_a.get(i), !av, "not bit {i}");
        }
    }

    #[test]
    fn zero_extends_shorter_operand() {
        let mut a = EwahBitmap::new();
        a.append_bits(true, 10);
        let mut b = EwahBitmap::new();
        b.append_bits(true, 70);
        let or = a.or(&b);
        assert_eq!(or.size(), 70);
        assert!(or.get(69));
        let and = a.and(&b);
        assert!(!and.get(65));
        assert!(and.get(5));
    }

    #[test]
    fn equality_ignores_representation() {
        let mut a = EwahBitmap::new();
        a.append_bit(true);
        a.append_bit(false);
        let mut b = EwahBitmap::new();
        b.append_bits(true, 1);
        b.append_bits(false, 1);
        assert_eq!(a, b);
    }

    #[test]
    fn save_load_roundtrip() {
        let mut bm = EwahBitmap::new();
        bm.append_bits(false, 1000);
        bm.append_bits(true, 37);
        bm.append_bit(false);
        bm.append_bit(true);

        let mut w = MemWriter::new();
        bm.save(&mut w).unwrap();
        let mut r = w.try_into_reader().unwrap();
        let loaded = EwahBitmap::load(&mut r).unwrap();
        assert_eq!(loaded, bm);
        assert_eq!(loaded.size(), bm.size());
    }
}
