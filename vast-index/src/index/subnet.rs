//! Subnet value index: reuses [`AddressIndex`] for the network address
//! and adds an [`EqualityCoder`] over an 8-bit prefix-length domain.
//! `==`/`!=` require both components to match. `ni a` asks whether a
//! queried address falls inside a stored subnet, reducing over the
//! distinct prefix lengths actually stored. `in super` asks whether a
//! stored subnet is contained in a queried one: the stored prefix must
//! be at least as specific, and the stored network must itself fall
//! inside the queried subnet.

use crate::bitmap::EwahBitmap;
use crate::coder::{Coder, EqualityCoder};
use crate::error::{AppendError, AppendErrorKind, AppendResult, IndexIoError, IndexIoResult, LookupError, LookupErrorKind, LookupResult};
use crate::index::address::AddressIndex;
use crate::index::ValueIndexInner;
use crate::operator::Operator;
use crate::value::{Address, Subnet, ValueView};
use std::io::{Read, Write};

#[cfg(test)]
use test_log::test;

pub const KIND_TAG: u8 = 9;
const PREFIX_DOMAIN: u32 = 256;

#[derive(Debug, Clone)]
pub struct SubnetIndex {
    network: AddressIndex,
    prefix: EqualityCoder,
    size: u64,
}

impl SubnetIndex {
    pub fn new() -> Self {
        Self {
            network: AddressIndex::new(),
            prefix: EqualityCoder::new(PREFIX_DOMAIN),
            size: 0,
        }
    }

    fn load_parts(network: AddressIndex, prefix: EqualityCoder, size: u64) -> Self {
        Self { network, prefix, size }
    }

    /// `ni a`: for each observed stored prefix length `p`, restrict to
    /// rows with that length and check the first `p` bits of `a` equal
    /// the stored network; OR across lengths.
    fn contains(&self, addr: Address) -> EwahBitmap {
        let mut result = zeros(self.size);
        for p in 0..=128u32 {
            let rows_with_prefix = self.prefix.lookup(Operator::Equal, p as u64).unwrap();
            let matches = self.network.prefix_match(addr.bits, p);
            result = &result | &(&rows_with_prefix & &matches);
        }
        result
    }

    /// `in super`: the stored subnet is contained in `super` iff the
    /// stored prefix is at least as specific and the stored network
    /// address itself falls inside `super`.
    fn contained_in(&self, sup: Subnet) -> EwahBitmap {
        let mut specific_enough = zeros(self.size);
        for p in sup.prefix_length as u32..=128u32 {
            specific_enough = &specific_enough | &self.prefix.lookup(Operator::Equal, p as u64).unwrap();
        }
        let network_inside = self.network.in_subnet(sup.network.bits, sup.prefix_length as u32, sup.network.is_v4);
        &specific_enough & &network_inside
    }
}

impl Default for SubnetIndex {
    fn default() -> Self {
        Self::new()
    }
}

fn zeros(size: u64) -> EwahBitmap {
    let mut bm = EwahBitmap::new();
    bm.append_bits(false, size);
    bm
}

impl ValueIndexInner for SubnetIndex {
    fn type_append(&mut self, v: &ValueView, id: u64) -> AppendResult<()> {
        let subnet = match v {
            ValueView::Subnet(s) => *s,
            other => {
                return Err(AppendError::new(
                    AppendErrorKind::TypeMismatch,
                    format!("expected subnet, got {}", other.type_name()),
                ))
            }
        };
        if subnet.prefix_length as u32 >= PREFIX_DOMAIN {
            return Err(AppendError::new(
                AppendErrorKind::OutOfBounds,
                format!("prefix length {} exceeds 128", subnet.prefix_length),
            ));
        }
        self.network.type_append(&ValueView::Address(subnet.network), id)?;
        self.prefix.append(subnet.prefix_length as u64);
        self.size += 1;
        Ok(())
    }

    fn type_skip(&mut self, n: u64) {
        self.network.type_skip(n);
        self.prefix.skip(n);
        self.size += n;
    }

    fn type_lookup(&self, op: Operator, v: &ValueView) -> LookupResult<EwahBitmap> {
        match (op, v) {
            (Operator::Equal, ValueView::Subnet(s)) => {
                let net_eq = self.network.type_lookup(Operator::Equal, &ValueView::Address(s.network))?;
                let prefix_eq = self.prefix.lookup(Operator::Equal, s.prefix_length as u64).unwrap();
                Ok(&net_eq & &prefix_eq)
            }
            (Operator::NotEqual, ValueView::Subnet(s)) => {
                let eq = self.type_lookup(Operator::Equal, &ValueView::Subnet(*s))?;
                Ok(eq.not())
            }
            (Operator::Ni, ValueView::Address(a)) => Ok(self.contains(*a)),
            (Operator::NotNi, ValueView::Address(a)) => Ok(self.contains(*a).not()),
            (Operator::In, ValueView::Subnet(s)) => Ok(self.contained_in(*s)),
            (Operator::NotIn, ValueView::Subnet(s)) => Ok(self.contained_in(*s).not()),
            (_, other) => Err(LookupError::new(
                LookupErrorKind::TypeMismatch,
                format!("subnet index cannot evaluate {op:?} against a {} value", other.type_name()),
            )),
        }
    }

    fn type_size(&self) -> u64 {
        self.size
    }

    fn type_save(&self, w: &mut dyn Write) -> IndexIoResult<()> {
        crate::ioutil::write_u64_le(w, self.size)?;
        self.network.type_save(w)?;
        Coder::save(&self.prefix, w)
    }

    fn kind_tag(&self) -> u8 {
        KIND_TAG
    }
}

pub fn load<R: Read + ?Sized>(r: &mut R) -> IndexIoResult<SubnetIndex> {
    let size = crate::ioutil::read_u64_le(r)?;
    let network = crate::index::address::load(r)?;
    let domain = crate::ioutil::read_u32_le(r)?;
    if domain != PREFIX_DOMAIN {
        return Err(IndexIoError::corrupt("subnet index prefix-coder domain mismatch"));
    }
    let prefix_size = crate::ioutil::read_u64_le(r)?;
    let mut bitmaps = Vec::with_capacity(PREFIX_DOMAIN as usize);
    for _ in 0..PREFIX_DOMAIN {
        bitmaps.push(EwahBitmap::load(r)?);
    }
    let prefix = EqualityCoder::load(domain, bitmaps, prefix_size);
    Ok(SubnetIndex::load_parts(network, prefix, size))
}
