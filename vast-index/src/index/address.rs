//! Address value index: a dedicated 128-bit bit-slice, one bitmap per
//! bit of the canonical IPv6 representation every address (v4 mapped
//! or native v6) is stored as, plus a `v4_mask` bitmap distinguishing
//! v4-mapped rows from native v6 ones. [`BitSliceCoder`] is specialized
//! to `u64`, so this is hand-rolled rather than reused, but follows the
//! exact same MSB-first equal accumulation.

use crate::bitmap::EwahBitmap;
use crate::error::{AppendError, AppendErrorKind, AppendResult, IndexIoError, IndexIoResult, LookupError, LookupErrorKind, LookupResult};
use crate::index::ValueIndexInner;
use crate::operator::Operator;
use crate::value::{Address, ValueView};
use std::io::{Read, Write};

#[cfg(test)]
use test_log::test;

pub const KIND_TAG: u8 = 8;
const WIDTH: u32 = 128;

#[derive(Debug, Clone)]
pub struct AddressIndex {
    bitmaps: Vec<EwahBitmap>,
    v4_mask: EwahBitmap,
    size: u64,
}

impl AddressIndex {
    pub fn new() -> Self {
        Self {
            bitmaps: (0..WIDTH).map(|_| EwahBitmap::new()).collect(),
            v4_mask: EwahBitmap::new(),
            size: 0,
        }
    }

    fn load_parts(bitmaps: Vec<EwahBitmap>, v4_mask: EwahBitmap, size: u64) -> Self {
        Self { bitmaps, v4_mask, size }
    }

    fn bit(&self, i: u32) -> &EwahBitmap {
        &self.bitmaps[i as usize]
    }

    /// Returns the bitmap of rows whose address agrees with `bits` in
    /// its first `prefix` bits (MSB first).
    pub(crate) fn prefix_match(&self, bits: u128, prefix: u32) -> EwahBitmap {
        let mut eq = ones(self.size);
        for i in (WIDTH - prefix..WIDTH).rev() {
            let vb = (bits >> i) & 1 != 0;
            let digit_equal = if vb { self.bit(i).clone() } else { self.bit(i).not() };
            eq = &eq & &digit_equal;
        }
        eq
    }

    /// `in subnet(n, k)`: rows whose first `k` bits agree with `n`,
    /// restricted to rows whose v4/v6-ness matches `n`'s.
    pub fn in_subnet(&self, network: u128, prefix: u32, network_is_v4: bool) -> EwahBitmap {
        let prefix = prefix.min(WIDTH);
        let within_prefix = self.prefix_match(network, prefix);
        let version_mask = if network_is_v4 { self.v4_mask.clone() } else { self.v4_mask.not() };
        &within_prefix & &version_mask
    }
}

impl Default for AddressIndex {
    fn default() -> Self {
        Self::new()
    }
}

fn ones(size: u64) -> EwahBitmap {
    let mut bm = EwahBitmap::new();
    bm.append_bits(true, size);
    bm
}

impl ValueIndexInner for AddressIndex {
    fn type_append(&mut self, v: &ValueView, _id: u64) -> AppendResult<()> {
        let addr = match v {
            ValueView::Address(a) => *a,
            other => {
                return Err(AppendError::new(
                    AppendErrorKind::TypeMismatch,
                    format!("expected address, got {}", other.type_name()),
                ))
            }
        };
        for i in 0..WIDTH {
            self.bitmaps[i as usize].append_bit((addr.bits >> i) & 1 != 0);
        }
        self.v4_mask.append_bit(addr.is_v4);
        self.size += 1;
        Ok(())
    }

    fn type_skip(&mut self, n: u64) {
        for bm in self.bitmaps.iter_mut() {
            bm.append_bits(false, n);
        }
        self.v4_mask.append_bits(false, n);
        self.size += n;
    }

    fn type_lookup(&self, op: Operator, v: &ValueView) -> LookupResult<EwahBitmap> {
        match op {
            Operator::Equal | Operator::NotEqual => {
                let addr = match v {
                    ValueView::Address(a) => *a,
                    other => {
                        return Err(LookupError::new(
                            LookupErrorKind::TypeMismatch,
                            format!("expected address, got {}", other.type_name()),
                        ))
                    }
                };
                let eq = self.prefix_match(addr.bits, WIDTH);
                Ok(if op == Operator::Equal { eq } else { eq.not() })
            }
            Operator::In | Operator::NotIn => {
                let subnet = match v {
                    ValueView::Subnet(s) => *s,
                    other => {
                        return Err(LookupError::new(
                            LookupErrorKind::TypeMismatch,
                            format!("expected subnet, got {}", other.type_name()),
                        ))
                    }
                };
                let within = self.in_subnet(subnet.network.bits, subnet.prefix_length as u32, subnet.network.is_v4);
                Ok(if op == Operator::In { within } else { within.not() })
            }
            _ => Err(LookupError::new(
                LookupErrorKind::UnsupportedOperator,
                format!("{op:?} is not defined for address"),
            )),
        }
    }

    fn type_size(&self) -> u64 {
        self.size
    }

    fn type_save(&self, w: &mut dyn Write) -> IndexIoResult<()> {
        crate::ioutil::write_u64_le(w, self.size)?;
        for bm in &self.bitmaps {
            bm.save(w)?;
        }
        self.v4_mask.save(w)?;
        Ok(())
    }

    fn kind_tag(&self) -> u8 {
        KIND_TAG
    }
}

pub fn load<R: Read + ?Sized>(r: &mut R) -> IndexIoResult<AddressIndex> {
    let size = crate::ioutil::read_u64_le(r)?;
    let mut bitmaps = Vec::with_capacity(WIDTH as usize);
    for _ in 0..WIDTH {
        bitmaps.push(EwahBitmap::load(r)?);
    }
    if bitmaps.len() != WIDTH as usize {
        return Err(IndexIoError::corrupt("address index bit width mismatch"));
    }
    let v4_mask = EwahBitmap::load(r)?;
    Ok(AddressIndex::load_parts(bitmaps, v4_mask, size))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::index::{GenericValueIndex, ValueIndex};
    use crate::value::Subnet;

    #[test]
    fn equality_distinguishes_v4_and_v6() {
        let mut idx = GenericValueIndex::new(AddressIndex::new());
        let a = Address::from_v4([10, 0, 0, 1]);
        let b = Address::from_v4([10, 0, 0, 2]);
        let c = Address::from_v6(0xdead_beef);
        idx.append(&ValueView::Address(a), 0).unwrap();
        idx.append(&ValueView::Address(b), 1).unwrap();
        idx.append(&ValueView::Address(c), 2).unwrap();

        let eq = idx.lookup(Operator::Equal, &ValueView::Address(a)).unwrap();
        assert!(eq.get(0));
        assert_eq!(eq.rank(), 1);
        assert!(idx.lookup(Operator::Less, &ValueView::Address(a)).is_err());
    }

    fn v4(o: [u8; 4]) -> ValueView {
        ValueView::Address(Address::from_v4(o))
    }

    #[test]
    fn s4_address_scenario() {
        let mut idx = GenericValueIndex::new(AddressIndex::new());
        for (i, o) in [[192, 168, 0, 1], [192, 168, 0, 2], [192, 168, 0, 3], [192, 168, 0, 1], [192, 168, 0, 1], [192, 168, 0, 2]]
            .into_iter()
            .enumerate()
        {
            idx.append(&v4(o), i as u64).unwrap();
        }
        let eq = idx.lookup(Operator::Equal, &v4([192, 168, 0, 1])).unwrap();
        assert_eq!(bits(&eq, 6), "100110");

        for (i, o) in [[192, 168, 0, 128], [192, 168, 0, 130], [192, 168, 0, 240], [192, 168, 0, 127], [192, 168, 0, 33]]
            .into_iter()
            .enumerate()
        {
            idx.append(&v4(o), (6 + i) as u64).unwrap();
        }
        let subnet25 = ValueView::Subnet(Subnet {
            network: Address::from_v4([192, 168, 0, 128]),
            prefix_length: 128 - 32 + 25,
        });
        let in25 = idx.lookup(Operator::In, &subnet25).unwrap();
        assert_eq!(bits(&in25, 11), "00000011100");

        let subnet20 = ValueView::Subnet(Subnet {
            network: Address::from_v4([192, 168, 0, 0]),
            prefix_length: 128 - 32 + 20,
        });
        let in20 = idx.lookup(Operator::In, &subnet20).unwrap();
        assert_eq!(bits(&in20, 11), "11111111111");
    }

    fn bits(bm: &EwahBitmap, n: u64) -> String {
        (0..n).map(|i| if bm.get(i) { '1' } else { '0' }).collect()
    }
}
