//! Table value index: mirrors [`SequenceIndex`] but stores paired
//! key/value sub-indexes per slot. Restricted to `==`/`!=` — richer
//! membership predicates would need to know whether the query value is
//! meant to match a key or a value, a distinction this crate's
//! single-value lookup signature cannot express without a query
//! planner to carry that intent.

use crate::bitmap::EwahBitmap;
use crate::coder::{Coder, RangeCoder};
use crate::error::{AppendError, AppendErrorKind, AppendResult, IndexIoError, IndexIoResult, LookupError, LookupErrorKind, LookupResult};
use crate::index::{ValueIndex, ValueIndexInner};
use crate::operator::Operator;
use crate::value::ValueView;
use std::io::{Read, Write};

#[cfg(test)]
use test_log::test;

pub const KIND_TAG: u8 = 12;

pub type ElementFactory = Box<dyn Fn() -> Box<dyn ValueIndex> + Send>;

pub struct TableIndex {
    max_size: u32,
    length: RangeCoder,
    keys: Vec<Box<dyn ValueIndex>>,
    values: Vec<Box<dyn ValueIndex>>,
    size: u64,
}

impl std::fmt::Debug for TableIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TableIndex")
            .field("max_size", &self.max_size)
            .field("size", &self.size)
            .finish()
    }
}

impl TableIndex {
    pub fn new(max_size: u32, make_key: &ElementFactory, make_value: &ElementFactory) -> Self {
        Self {
            max_size,
            length: RangeCoder::new(max_size + 1),
            keys: (0..max_size).map(|_| make_key()).collect(),
            values: (0..max_size).map(|_| make_value()).collect(),
            size: 0,
        }
    }

    fn load_parts(max_size: u32, length: RangeCoder, keys: Vec<Box<dyn ValueIndex>>, values: Vec<Box<dyn ValueIndex>>, size: u64) -> Self {
        Self {
            max_size,
            length,
            keys,
            values,
            size,
        }
    }
}

impl ValueIndexInner for TableIndex {
    fn type_append(&mut self, v: &ValueView, id: u64) -> AppendResult<()> {
        let pairs = match v {
            ValueView::Table(pairs) => pairs,
            other => {
                return Err(AppendError::new(
                    AppendErrorKind::TypeMismatch,
                    format!("expected table, got {}", other.type_name()),
                ))
            }
        };
        if pairs.len() > self.max_size as usize {
            return Err(AppendError::new(
                AppendErrorKind::OutOfBounds,
                format!("table of size {} exceeds max_size {}", pairs.len(), self.max_size),
            ));
        }
        self.length.append(pairs.len() as u64);
        for i in 0..self.max_size as usize {
            let (k, v) = pairs.get(i).cloned().unwrap_or((ValueView::None, ValueView::None));
            self.keys[i].append(&k, id)?;
            self.values[i].append(&v, id)?;
        }
        self.size += 1;
        Ok(())
    }

    fn type_skip(&mut self, n: u64) {
        self.length.skip(n);
        for k in self.keys.iter_mut() {
            k.skip(n);
        }
        for val in self.values.iter_mut() {
            val.skip(n);
        }
        self.size += n;
    }

    fn type_lookup(&self, op: Operator, v: &ValueView) -> LookupResult<EwahBitmap> {
        let pairs = match v {
            ValueView::Table(pairs) => pairs,
            other => {
                return Err(LookupError::new(
                    LookupErrorKind::TypeMismatch,
                    format!("expected table, got {}", other.type_name()),
                ))
            }
        };
        match op {
            Operator::Equal | Operator::NotEqual => {
                let len_eq = self
                    .length
                    .lookup(Operator::Equal, pairs.len() as u64)
                    .expect("RangeCoder supports ==");
                let mut all_eq = len_eq;
                let none = ValueView::None;
                for i in 0..self.max_size as usize {
                    let (k, val) = pairs.get(i).map(|(k, v)| (k, v)).unwrap_or((&none, &none));
                    let key_eq = self.keys[i].lookup(Operator::Equal, k)?;
                    let val_eq = self.values[i].lookup(Operator::Equal, val)?;
                    all_eq = &all_eq & &key_eq;
                    all_eq = &all_eq & &val_eq;
                }
                Ok(if op == Operator::Equal { all_eq } else { all_eq.not() })
            }
            _ => Err(LookupError::new(
                LookupErrorKind::UnsupportedOperator,
                format!("{op:?} is not defined for table"),
            )),
        }
    }

    fn type_size(&self) -> u64 {
        self.size
    }

    fn type_save(&self, w: &mut dyn Write) -> IndexIoResult<()> {
        crate::ioutil::write_u32_le(w, self.max_size)?;
        crate::ioutil::write_u64_le(w, self.size)?;
        Coder::save(&self.length, w)?;
        for k in &self.keys {
            k.save(w)?;
        }
        for val in &self.values {
            val.save(w)?;
        }
        Ok(())
    }

    fn kind_tag(&self) -> u8 {
        KIND_TAG
    }
}

pub fn load<R: Read + ?Sized>(r: &mut R, load_slot: &dyn Fn(&mut R) -> IndexIoResult<Box<dyn ValueIndex>>) -> IndexIoResult<TableIndex> {
    let max_size = crate::ioutil::read_u32_le(r)?;
    let size = crate::ioutil::read_u64_le(r)?;
    let domain = crate::ioutil::read_u32_le(r)?;
    if domain != max_size + 1 {
        return Err(IndexIoError::corrupt("table index length-coder domain mismatch"));
    }
    let length_size = crate::ioutil::read_u64_le(r)?;
    let mut length_bitmaps = Vec::with_capacity(domain as usize);
    for _ in 0..domain {
        length_bitmaps.push(EwahBitmap::load(r)?);
    }
    let length = RangeCoder::load(domain, length_bitmaps, length_size);

    let mut keys = Vec::with_capacity(max_size as usize);
    for _ in 0..max_size {
        keys.push(load_slot(r)?);
    }
    let mut values = Vec::with_capacity(max_size as usize);
    for _ in 0..max_size {
        values.push(load_slot(r)?);
    }
    Ok(TableIndex::load_parts(max_size, length, keys, values, size))
}
