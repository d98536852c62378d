//! Versioned binary marshalling for persisted coordinates.
//!
//! Every record starts with a big-endian `u32` version tag. Writers can emit the current tag or
//! the immediately prior one; readers accept both, defaulting the fields the prior tag lacks.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::collections::BTreeSet;

use crate::{error::KometError, identifier::Nid};

/// Tag written by [Marshalable::marshal].
pub const CURRENT_MARSHAL_VERSION: u32 = 2;
/// Oldest tag still readable.
pub const PRIOR_MARSHAL_VERSION: u32 = 1;
/// Deepest chain of self-nested records a reader accepts.
pub const MAX_MARSHAL_NESTING: usize = 8;

pub fn check_version(record: &str, version: u32) -> Result<(), KometError> {
    if (PRIOR_MARSHAL_VERSION..=CURRENT_MARSHAL_VERSION).contains(&version) {
        Ok(())
    } else {
        Err(KometError::Serialization(format!(
            "Unsupported {record} marshal version {version}. Supported versions are \
             {PRIOR_MARSHAL_VERSION}..={CURRENT_MARSHAL_VERSION}"
        )))
    }
}

#[derive(Debug, Default)]
pub struct MarshalWriter {
    buf: BytesMut,
}

impl MarshalWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_u8(&mut self, value: u8) {
        self.buf.put_u8(value);
    }

    pub fn put_bool(&mut self, value: bool) {
        self.buf.put_u8(value as u8);
    }

    pub fn put_u32(&mut self, value: u32) {
        self.buf.put_u32(value);
    }

    pub fn put_i64(&mut self, value: i64) {
        self.buf.put_i64(value);
    }

    pub fn put_nid(&mut self, nid: Nid) {
        self.buf.put_i32(nid.value());
    }

    pub fn put_nid_list(&mut self, nids: &[Nid]) {
        self.put_u32(nids.len() as u32);
        for nid in nids {
            self.put_nid(*nid);
        }
    }

    pub fn put_nid_set(&mut self, nids: &BTreeSet<Nid>) {
        self.put_u32(nids.len() as u32);
        for nid in nids {
            self.put_nid(*nid);
        }
    }

    pub fn put_str(&mut self, value: &str) {
        self.put_u32(value.len() as u32);
        self.buf.put_slice(value.as_bytes());
    }

    pub fn put_bytes(&mut self, value: &[u8]) {
        self.put_u32(value.len() as u32);
        self.buf.put_slice(value);
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn freeze(self) -> Bytes {
        self.buf.freeze()
    }
}

/// Bounds-checked reader. [Buf] panics on underflow, so every read checks `remaining` first.
#[derive(Debug)]
pub struct MarshalReader {
    buf: Bytes,
    depth: usize,
}

impl MarshalReader {
    pub fn new(bytes: &[u8]) -> Self {
        MarshalReader {
            buf: Bytes::copy_from_slice(bytes),
            depth: 0,
        }
    }

    /// Read a record nested inside the current one, failing past [MAX_MARSHAL_NESTING] levels.
    pub fn get_nested<T: Marshalable>(&mut self) -> Result<T, KometError> {
        if self.depth >= MAX_MARSHAL_NESTING {
            return Err(KometError::Serialization(format!(
                "{} records nested deeper than {MAX_MARSHAL_NESTING} levels",
                T::RECORD
            )));
        }
        self.depth += 1;
        let value = T::unmarshal_from(self);
        self.depth -= 1;
        value
    }

    fn need(&self, n: usize, what: &str) -> Result<(), KometError> {
        if self.buf.remaining() < n {
            return Err(KometError::Serialization(format!(
                "Truncated record reading {what}: need {n} bytes, have {}",
                self.buf.remaining()
            )));
        }
        Ok(())
    }

    pub fn get_u8(&mut self) -> Result<u8, KometError> {
        self.need(1, "u8")?;
        Ok(self.buf.get_u8())
    }

    pub fn get_bool(&mut self) -> Result<bool, KometError> {
        match self.get_u8()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(KometError::Serialization(format!(
                "Invalid boolean byte {other}"
            ))),
        }
    }

    pub fn get_u32(&mut self) -> Result<u32, KometError> {
        self.need(4, "u32")?;
        Ok(self.buf.get_u32())
    }

    pub fn get_i64(&mut self) -> Result<i64, KometError> {
        self.need(8, "i64")?;
        Ok(self.buf.get_i64())
    }

    pub fn get_nid(&mut self) -> Result<Nid, KometError> {
        self.need(4, "nid")?;
        Ok(Nid::new(self.buf.get_i32()))
    }

    fn get_len(&mut self, width: usize) -> Result<usize, KometError> {
        let len = self.get_u32()? as usize;
        // Reject lengths the remaining input cannot possibly hold before allocating.
        self.need(len.saturating_mul(width), "list")?;
        Ok(len)
    }

    pub fn get_nid_list(&mut self) -> Result<Vec<Nid>, KometError> {
        let len = self.get_len(4)?;
        (0..len).map(|_| self.get_nid()).collect()
    }

    pub fn get_nid_set(&mut self) -> Result<BTreeSet<Nid>, KometError> {
        let len = self.get_len(4)?;
        (0..len).map(|_| self.get_nid()).collect()
    }

    pub fn get_str(&mut self) -> Result<String, KometError> {
        let bytes = self.get_bytes()?;
        String::from_utf8(bytes)
            .map_err(|e| KometError::Serialization(format!("Invalid utf-8 string: {e}")))
    }

    pub fn get_bytes(&mut self) -> Result<Vec<u8>, KometError> {
        let len = self.get_len(1)?;
        Ok(self.buf.copy_to_bytes(len).to_vec())
    }

    pub fn remaining(&self) -> usize {
        self.buf.remaining()
    }

    pub fn finish(&self, record: &str) -> Result<(), KometError> {
        if self.buf.has_remaining() {
            return Err(KometError::Serialization(format!(
                "{} trailing bytes after {record} record",
                self.buf.remaining()
            )));
        }
        Ok(())
    }
}

/// A record with a versioned binary form.
pub trait Marshalable: Sized {
    /// Record name used in error messages.
    const RECORD: &'static str;

    fn write_fields(&self, version: u32, out: &mut MarshalWriter) -> Result<(), KometError>;

    fn read_fields(version: u32, input: &mut MarshalReader) -> Result<Self, KometError>;

    /// Write the version tag and the fields, for nesting inside another record.
    fn marshal_into(&self, version: u32, out: &mut MarshalWriter) -> Result<(), KometError> {
        check_version(Self::RECORD, version)?;
        out.put_u32(version);
        self.write_fields(version, out)
    }

    fn unmarshal_from(input: &mut MarshalReader) -> Result<Self, KometError> {
        let version = input.get_u32()?;
        check_version(Self::RECORD, version)?;
        Self::read_fields(version, input)
    }

    fn marshal(&self) -> Result<Bytes, KometError> {
        self.marshal_as(CURRENT_MARSHAL_VERSION)
    }

    /// Marshal with an explicit tag. Writing the prior tag drops the fields it cannot carry.
    fn marshal_as(&self, version: u32) -> Result<Bytes, KometError> {
        let mut out = MarshalWriter::new();
        self.marshal_into(version, &mut out)?;
        Ok(out.freeze())
    }

    fn unmarshal(bytes: &[u8]) -> Result<Self, KometError> {
        let mut input = MarshalReader::new(bytes);
        let value = Self::unmarshal_from(&mut input)?;
        input.finish(Self::RECORD)?;
        Ok(value)
    }
}
