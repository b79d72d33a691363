//! Port value index: a 16-bit [`BitSliceCoder`] over the port number
//! plus an 8-value [`EqualityCoder`] over [`Protocol`]. Relational
//! operators compare the port number only; ordering two (number,
//! protocol) pairs by protocol has no natural meaning, so protocol only
//! narrows `==`/`!=`. A query protocol of `Unknown` is a wildcard that
//! skips the protocol restriction entirely.

use crate::bitmap::EwahBitmap;
use crate::coder::{BitSliceCoder, Coder, EqualityCoder};
use crate::error::{AppendError, AppendErrorKind, AppendResult, IndexIoError, IndexIoResult, LookupError, LookupErrorKind, LookupResult};
use crate::index::ValueIndexInner;
use crate::operator::Operator;
use crate::value::{Port, Protocol, ValueView};
use std::io::{Read, Write};

#[cfg(test)]
use test_log::test;

pub const KIND_TAG: u8 = 10;
const PROTOCOL_DOMAIN: u32 = Protocol::DOMAIN;

#[derive(Debug, Clone)]
pub struct PortIndex {
    number: BitSliceCoder,
    protocol: EqualityCoder,
    size: u64,
}

impl PortIndex {
    pub fn new() -> Self {
        Self {
            number: BitSliceCoder::new(16),
            protocol: EqualityCoder::new(PROTOCOL_DOMAIN),
            size: 0,
        }
    }

    fn load_parts(number: BitSliceCoder, protocol: EqualityCoder, size: u64) -> Self {
        Self { number, protocol, size }
    }
}

impl Default for PortIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl ValueIndexInner for PortIndex {
    fn type_append(&mut self, v: &ValueView, _id: u64) -> AppendResult<()> {
        let port = match v {
            ValueView::Port(p) => *p,
            other => {
                return Err(AppendError::new(
                    AppendErrorKind::TypeMismatch,
                    format!("expected port, got {}", other.type_name()),
                ))
            }
        };
        self.number.append(port.number as u64);
        self.protocol.append(port.protocol.index() as u64);
        self.size += 1;
        Ok(())
    }

    fn type_skip(&mut self, n: u64) {
        self.number.skip(n);
        self.protocol.skip(n);
        self.size += n;
    }

    fn type_lookup(&self, op: Operator, v: &ValueView) -> LookupResult<EwahBitmap> {
        let port = match v {
            ValueView::Port(p) => *p,
            other => {
                return Err(LookupError::new(
                    LookupErrorKind::TypeMismatch,
                    format!("expected port, got {}", other.type_name()),
                ))
            }
        };
        match op {
            Operator::Equal | Operator::NotEqual => {
                let number_eq = self.number.lookup(Operator::Equal, port.number as u64).unwrap();
                let eq = if port.protocol == Protocol::Unknown {
                    number_eq
                } else {
                    let protocol_eq = self.protocol.lookup(Operator::Equal, port.protocol.index() as u64).unwrap();
                    &number_eq & &protocol_eq
                };
                Ok(if op == Operator::Equal { eq } else { eq.not() })
            }
            Operator::Less | Operator::LessEqual | Operator::Greater | Operator::GreaterEqual => {
                Ok(self.number.lookup(op, port.number as u64).unwrap())
            }
            _ => Err(LookupError::new(
                LookupErrorKind::UnsupportedOperator,
                format!("{op:?} is not defined for port"),
            )),
        }
    }

    fn type_size(&self) -> u64 {
        self.size
    }

    fn type_save(&self, w: &mut dyn Write) -> IndexIoResult<()> {
        crate::ioutil::write_u64_le(w, self.size)?;
        Coder::save(&self.number, w)?;
        Coder::save(&self.protocol, w)
    }

    fn kind_tag(&self) -> u8 {
        KIND_TAG
    }
}

pub fn load<R: Read + ?Sized>(r: &mut R) -> IndexIoResult<PortIndex> {
    let size = crate::ioutil::read_u64_le(r)?;
    let width = crate::ioutil::read_u32_le(r)?;
    if width != 16 {
        return Err(IndexIoError::corrupt("port index number width must be 16"));
    }
    let number_size = crate::ioutil::read_u64_le(r)?;
    let mut number_bitmaps = Vec::with_capacity(16);
    for _ in 0..16 {
        number_bitmaps.push(EwahBitmap::load(r)?);
    }
    let number = BitSliceCoder::load(width, number_bitmaps, number_size);

    let domain = crate::ioutil::read_u32_le(r)?;
    if domain != PROTOCOL_DOMAIN {
        return Err(IndexIoError::corrupt("port index protocol-coder domain mismatch"));
    }
    let protocol_size = crate::ioutil::read_u64_le(r)?;
    let mut protocol_bitmaps = Vec::with_capacity(PROTOCOL_DOMAIN as usize);
    for _ in 0..PROTOCOL_DOMAIN {
        protocol_bitmaps.push(EwahBitmap::load(r)?);
    }
    let protocol = EqualityCoder::load(domain, protocol_bitmaps, protocol_size);

    Ok(PortIndex::load_parts(number, protocol, size))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::index::{GenericValueIndex, ValueIndex};

    #[test]
    fn equality_requires_matching_protocol() {
        let mut idx = GenericValueIndex::new(PortIndex::new());
        let tcp80 = Port { number: 80, protocol: Protocol::Tcp };
        let udp80 = Port { number: 80, protocol: Protocol::Udp };
        idx.append(&ValueView::Port(tcp80), 0).unwrap();
        idx.append(&ValueView::Port(udp80), 1).unwrap();
        let eq = idx.lookup(Operator::Equal, &ValueView::Port(tcp80)).unwrap();
        assert!(eq.get(0));
        assert!(!eq.get(1));
    }

    #[test]
    fn ordering_compares_number_only() {
        let mut idx = GenericValueIndex::new(PortIndex::new());
        let a = Port { number: 22, protocol: Protocol::Tcp };
        let b = Port { number: 443, protocol: Protocol::Udp };
        idx.append(&ValueView::Port(a), 0).unwrap();
        idx.append(&ValueView::Port(b), 1).unwrap();
        let lt = idx
            .lookup(Operator::Less, &ValueView::Port(Port { number: 100, protocol: Protocol::Icmp }))
            .unwrap();
        assert!(lt.get(0));
        assert!(!lt.get(1));
    }

    #[test]
    fn unknown_protocol_in_query_is_a_wildcard() {
        let mut idx = GenericValueIndex::new(PortIndex::new());
        let tcp80 = Port { number: 80, protocol: Protocol::Tcp };
        let udp80 = Port { number: 80, protocol: Protocol::Udp };
        idx.append(&ValueView::Port(tcp80), 0).unwrap();
        idx.append(&ValueView::Port(udp80), 1).unwrap();
        let eq = idx
            .lookup(Operator::Equal, &ValueView::Port(Port { number: 80, protocol: Protocol::Unknown }))
            .unwrap();
        assert!(eq.get(0));
        assert!(eq.get(1));
    }
}
