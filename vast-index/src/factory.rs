//! Builds a [`ValueIndex`] from a type descriptor, and reconstructs one
//! from its own serialized form without the caller needing to know
//! which concrete adapter produced the bytes. The leading kind-tag byte
//! every [`GenericValueIndex::save`] writes is exactly what this module
//! dispatches on, so container adapters ([`SequenceIndex`],
//! [`TableIndex`]) can recurse back into [`load`] for their element
//! sub-indexes without carrying their own parallel dispatch table.

use crate::binner::Binner;
use crate::bitmap::EwahBitmap;
use crate::error::{IndexIoError, IndexIoResult};
use crate::index::address::{self, AddressIndex};
use crate::index::arithmetic::{self, ArithmeticIndex, ArithmeticKind};
use crate::index::boolean::{self, BooleanIndex};
use crate::index::port::{self, PortIndex};
use crate::index::sequence::{self, ElementFactory, SequenceIndex, SequenceKind};
use crate::index::string::{self, StringIndex};
use crate::index::subnet::{self, SubnetIndex};
use crate::index::table::{self, TableIndex};
use crate::index::{Common, GenericValueIndex, ValueIndex, ValueIndexInner};
use std::io::Read;
use tracing::{debug, trace};

#[cfg(test)]
use test_log::test;

/// The schema-level description of the values a value index will hold.
/// Roughly the attribute map a store's type catalogue would carry per
/// column (`max_size`, `max_length`, a real's display precision), plus
/// the recursive element/key/value descriptors containers need.
#[derive(Debug, Clone, PartialEq)]
pub enum TypeDescriptor {
    Boolean,
    Integer,
    Count,
    Real { precision: Option<u32> },
    Duration,
    Timestamp,
    String { max_length: u32 },
    Address,
    Subnet,
    Port,
    Vector { max_size: u32, element: Box<TypeDescriptor> },
    Set { max_size: u32, element: Box<TypeDescriptor> },
    Table {
        max_size: u32,
        key: Box<TypeDescriptor>,
        value: Box<TypeDescriptor>,
    },
}

/// Constructs a fresh, empty value index matching `desc`.
pub fn build(desc: &TypeDescriptor) -> Box<dyn ValueIndex> {
    debug!(?desc, "building value index");
    match desc {
        TypeDescriptor::Boolean => wrap(BooleanIndex::new()),
        TypeDescriptor::Integer => wrap(ArithmeticIndex::new(ArithmeticKind::Integer)),
        TypeDescriptor::Count => wrap(ArithmeticIndex::new(ArithmeticKind::Count)),
        TypeDescriptor::Real { precision } => {
            let binner = match precision {
                Some(digits) => Binner::Precision { digits: *digits },
                None => Binner::Identity,
            };
            wrap(ArithmeticIndex::with_binner(ArithmeticKind::Real, binner))
        }
        TypeDescriptor::Duration => wrap(ArithmeticIndex::new(ArithmeticKind::Duration)),
        TypeDescriptor::Timestamp => wrap(ArithmeticIndex::new(ArithmeticKind::Timestamp)),
        TypeDescriptor::String { max_length } => wrap(StringIndex::new(*max_length)),
        TypeDescriptor::Address => wrap(AddressIndex::new()),
        TypeDescriptor::Subnet => wrap(SubnetIndex::new()),
        TypeDescriptor::Port => wrap(PortIndex::new()),
        TypeDescriptor::Vector { max_size, element } => {
            let factory = element_factory(element.as_ref().clone());
            wrap(SequenceIndex::new(SequenceKind::Vector, *max_size, &factory))
        }
        TypeDescriptor::Set { max_size, element } => {
            let factory = element_factory(element.as_ref().clone());
            wrap(SequenceIndex::new(SequenceKind::Set, *max_size, &factory))
        }
        TypeDescriptor::Table { max_size, key, value } => {
            let key_factory = element_factory(key.as_ref().clone());
            let value_factory = element_factory(value.as_ref().clone());
            wrap(TableIndex::new(*max_size, &key_factory, &value_factory))
        }
    }
}

fn wrap<T: ValueIndexInner + 'static>(inner: T) -> Box<dyn ValueIndex> {
    Box::new(GenericValueIndex::new(inner))
}

fn element_factory(desc: TypeDescriptor) -> ElementFactory {
    Box::new(move || build(&desc))
}

/// Reconstructs a [`ValueIndex`] from bytes written by
/// [`crate::index::ValueIndex::save`], dispatching on the leading
/// kind-tag byte.
pub fn load<R: Read + ?Sized>(r: &mut R) -> IndexIoResult<Box<dyn ValueIndex>> {
    let tag = crate::ioutil::read_u8(r)?;
    trace!(tag, "dispatching value index load");
    let null_mask = EwahBitmap::load(r)?;
    let common = Common::load(null_mask);
    match tag {
        boolean::KIND_TAG => {
            let bits = EwahBitmap::load(r)?;
            Ok(Box::new(GenericValueIndex::from_parts(common, BooleanIndex::load(bits))))
        }
        2..=6 => {
            let inner = arithmetic::load(r)?;
            Ok(Box::new(GenericValueIndex::from_parts(common, inner)))
        }
        string::KIND_TAG => {
            let inner = string::load(r)?;
            Ok(Box::new(GenericValueIndex::from_parts(common, inner)))
        }
        address::KIND_TAG => {
            let inner = address::load(r)?;
            Ok(Box::new(GenericValueIndex::from_parts(common, inner)))
        }
        subnet::KIND_TAG => {
            let inner = subnet::load(r)?;
            Ok(Box::new(GenericValueIndex::from_parts(common, inner)))
        }
        port::KIND_TAG => {
            let inner = port::load(r)?;
            Ok(Box::new(GenericValueIndex::from_parts(common, inner)))
        }
        sequence::KIND_TAG => {
            let inner = sequence::load(r, &load)?;
            Ok(Box::new(GenericValueIndex::from_parts(common, inner)))
        }
        table::KIND_TAG => {
            let inner = table::load(r, &load)?;
            Ok(Box::new(GenericValueIndex::from_parts(common, inner)))
        }
        other => Err(IndexIoError::corrupt(format!("unknown value index kind tag {other}"))),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::ioutil::MemWriter;
    use crate::operator::Operator;
    use crate::value::ValueView;

    #[test]
    fn builds_and_round_trips_a_scalar_index() {
        let mut idx = build(&TypeDescriptor::Integer);
        idx.append(&ValueView::Integer(-5), 0).unwrap();
        idx.append(&ValueView::Integer(5), 1).unwrap();

        let mut w = MemWriter::new();
        idx.save(&mut w).unwrap();
        let mut r = w.try_into_reader().unwrap();
        let loaded = load(&mut r).unwrap();

        let lt0 = loaded.lookup(Operator::Less, &ValueView::Integer(0)).unwrap();
        assert!(lt0.get(0));
        assert!(!lt0.get(1));
    }

    #[test]
    fn builds_and_round_trips_a_nested_vector_index() {
        let desc = TypeDescriptor::Vector {
            max_size: 2,
            element: Box::new(TypeDescriptor::Boolean),
        };
        let mut idx = build(&desc);
        idx.append(&ValueView::Vector(vec![ValueView::Boolean(true), ValueView::Boolean(false)]), 0)
            .unwrap();

        let mut w = MemWriter::new();
        idx.save(&mut w).unwrap();
        let mut r = w.try_into_reader().unwrap();
        let loaded = load(&mut r).unwrap();

        let eq = loaded
            .lookup(
                Operator::Equal,
                &ValueView::Vector(vec![ValueView::Boolean(true), ValueView::Boolean(false)]),
            )
            .unwrap();
        assert!(eq.get(0));
    }

    fn round_trip(idx: Box<dyn ValueIndex>) -> Box<dyn ValueIndex> {
        let mut bytes = Vec::new();
        idx.save(&mut bytes).unwrap();
        let loaded = load(&mut crate::ioutil::MemReader::from(bytes.clone())).unwrap();

        let mut bytes2 = Vec::new();
        loaded.save(&mut bytes2).unwrap();
        assert_eq!(bytes, bytes2);
        loaded
    }

    fn bits(bm: &EwahBitmap, n: u64) -> String {
        (0..n).map(|i| if bm.get(i) { '1' } else { '0' }).collect()
    }

    /// S7: reload every S1-S5 index and check its listed bitmaps are
    /// reproduced identically.
    #[test]
    fn s7_round_trip_boolean() {
        let mut idx = build(&TypeDescriptor::Boolean);
        for (i, v) in [true, true, false, true, false, false, false, true].into_iter().enumerate() {
            idx.append(&ValueView::Boolean(v), i as u64).unwrap();
        }
        idx = round_trip(idx);
        let eq_f = idx.lookup(Operator::Equal, &ValueView::Boolean(false)).unwrap();
        assert_eq!(bits(&eq_f, 8), "00101110");
        let neq_f = idx.lookup(Operator::NotEqual, &ValueView::Boolean(false)).unwrap();
        assert_eq!(bits(&neq_f, 8), "11010001");
    }

    #[test]
    fn s7_round_trip_integer() {
        let mut idx = build(&TypeDescriptor::Integer);
        for (i, v) in [-7i64, 42, 10000, 4711, 31337, 42, 42].into_iter().enumerate() {
            idx.append(&ValueView::Integer(v), i as u64).unwrap();
        }
        idx = round_trip(idx);
        let eq = idx.lookup(Operator::Equal, &ValueView::Integer(31337)).unwrap();
        assert_eq!(bits(&eq, 7), "0000100");
        let lt = idx.lookup(Operator::Less, &ValueView::Integer(31337)).unwrap();
        assert_eq!(bits(&lt, 7), "1111011");
    }

    #[test]
    fn s7_round_trip_string() {
        let mut idx = build(&TypeDescriptor::String { max_length: 100 });
        let values = ["foo", "bar", "baz", "foo", "foo", "bar", "", "qux", "corge", "bazz"];
        for (i, v) in values.iter().enumerate() {
            idx.append(&ValueView::String(v.to_string()), i as u64).unwrap();
        }
        idx = round_trip(idx);
        let eq = idx.lookup(Operator::Equal, &ValueView::String("foo".into())).unwrap();
        assert_eq!(bits(&eq, 10), "1001100000");
        let ni = idx.lookup(Operator::Ni, &ValueView::String("o".into())).unwrap();
        assert_eq!(bits(&ni, 10), "1001100010");
    }

    #[test]
    fn s7_round_trip_none() {
        let mut idx = build(&TypeDescriptor::String { max_length: 8 });
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
        idx = round_trip(idx);
        let eq_none = idx.lookup(Operator::Equal, &ValueView::None).unwrap();
        assert_eq!(bits(&eq_none, 23), "10011100011110000000011");
    }
}
