//! Typed values a value index can append or be queried with. Mirrors
//! the scalar/container split the rest of the crate is organized
//! around; a value index only ever has to handle the one variant (or
//! `None`) its type descriptor names.

use std::net::Ipv6Addr;

#[cfg(test)]
use test_log::test;

/// The port index's protocol coder has an 8-value domain; `Unknown` is
/// both the classification fallback for unrecognized IP protocol
/// numbers and, when present in a query, a wildcard that skips the
/// protocol restriction entirely (see `port::PortIndex::type_lookup`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protocol {
    Tcp,
    Udp,
    Icmp,
    Icmpv6,
    Sctp,
    Gre,
    Ospf,
    Unknown,
}

impl Protocol {
    pub const DOMAIN: u32 = 8;

    /// Classifies a raw IANA protocol number. Lossy: every number maps
    /// to one of the eight buckets, so the original byte cannot be
    /// recovered from the result.
    pub fn classify(n: u8) -> Self {
        match n {
            6 => Protocol::Tcp,
            17 => Protocol::Udp,
            1 => Protocol::Icmp,
            58 => Protocol::Icmpv6,
            132 => Protocol::Sctp,
            47 => Protocol::Gre,
            89 => Protocol::Ospf,
            _ => Protocol::Unknown,
        }
    }

    /// This protocol's slot in the equality coder's 8-value domain.
    pub fn index(self) -> u32 {
        match self {
            Protocol::Tcp => 0,
            Protocol::Udp => 1,
            Protocol::Icmp => 2,
            Protocol::Icmpv6 => 3,
            Protocol::Sctp => 4,
            Protocol::Gre => 5,
            Protocol::Ospf => 6,
            Protocol::Unknown => 7,
        }
    }

    pub fn from_index(i: u32) -> Self {
        match i {
            0 => Protocol::Tcp,
            1 => Protocol::Udp,
            2 => Protocol::Icmp,
            3 => Protocol::Icmpv6,
            4 => Protocol::Sctp,
            5 => Protocol::Gre,
            6 => Protocol::Ospf,
            _ => Protocol::Unknown,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Port {
    pub number: u16,
    pub protocol: Protocol,
}

/// Canonicalizes any address (v4 or v6) to its 128-bit IPv6 representation,
/// mapping v4 into the `::ffff:0:0/96` range, per the address value
/// index's bit-slice domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Address {
    pub bits: u128,
    pub is_v4: bool,
}

impl Address {
    pub fn from_v4(octets: [u8; 4]) -> Self {
        let mapped = Ipv6Addr::from(u128::from(u32::from_be_bytes(octets)) | 0xFFFF_0000_0000u128);
        Self {
            bits: u128::from(mapped),
            is_v4: true,
        }
    }

    pub fn from_v6(bits: u128) -> Self {
        Self { bits, is_v4: false }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Subnet {
    pub network: Address,
    pub prefix_length: u8,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ValueView {
    None,
    Boolean(bool),
    Integer(i64),
    Count(u64),
    Real(f64),
    DurationNanos(i64),
    TimestampNanos(i64),
    String(String),
    Address(Address),
    Subnet(Subnet),
    Port(Port),
    Vector(Vec<ValueView>),
    Set(Vec<ValueView>),
    Table(Vec<(ValueView, ValueView)>),
}

impl ValueView {
    pub fn is_none(&self) -> bool {
        matches!(self, ValueView::None)
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            ValueView::None => "none",
            ValueView::Boolean(_) => "boolean",
            ValueView::Integer(_) => "integer",
            ValueView::Count(_) => "count",
            ValueView::Real(_) => "real",
            ValueView::DurationNanos(_) => "duration",
            ValueView::TimestampNanos(_) => "timestamp",
            ValueView::String(_) => "string",
            ValueView::Address(_) => "address",
            ValueView::Subnet(_) => "subnet",
            ValueView::Port(_) => "port",
            ValueView::Vector(_) => "vector",
            ValueView::Set(_) => "set",
            ValueView::Table(_) => "table",
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn v4_maps_into_v6_range() {
        let a = Address::from_v4([192, 168, 0, 1]);
        assert!(a.is_v4);
        assert_eq!(a.bits & 0xFFFF_FFFF, 0xC0A8_0001);
        assert_eq!((a.bits >> 32) & 0xFFFF, 0xFFFF);
    }

    #[test]
    fn protocol_index_roundtrips() {
        for p in [
            Protocol::Tcp,
            Protocol::Udp,
            Protocol::Icmp,
            Protocol::Icmpv6,
            Protocol::Sctp,
            Protocol::Gre,
            Protocol::Ospf,
            Protocol::Unknown,
        ] {
            assert_eq!(Protocol::from_index(p.index()), p);
        }
        assert_eq!(Protocol::classify(200), Protocol::Unknown);
        assert_eq!(Protocol::classify(6), Protocol::Tcp);
    }
}
