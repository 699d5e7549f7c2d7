//! Value types storable in attribute vectors
//!
//! `NumericValue` covers the fixed-width types held in RCU vectors by
//! single-value numeric attributes. `ElementValue` covers everything a
//! multi-value attribute can hold: every numeric type plus `String`.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::fmt;
use std::io;

use attrstore_concurrency::RcuValue;
use attrstore_core::{AttrValue, BasicType};

use super::sort_blob;
use crate::search::TermMatcher;

/// Fixed-width numeric value
pub trait NumericValue: RcuValue + PartialOrd + fmt::Debug {
    /// Basic type this value stores
    const BASIC_TYPE: BasicType;

    /// Value of a document that has none
    fn undefined() -> Self;

    /// Whether this is the undefined value
    fn is_undefined(&self) -> bool;

    /// Saturating conversion from an integer
    fn from_i64(v: i64) -> Self;

    /// Saturating conversion from a float
    fn from_f64(v: f64) -> Self;

    /// Integer view
    fn to_i64(self) -> i64;

    /// Float view
    fn to_f64(self) -> f64;

    /// Whether arithmetic should be computed as float
    fn is_floating() -> bool {
        false
    }

    /// Append the little-endian encoding
    fn write_le(self, out: &mut Vec<u8>);

    /// Read one little-endian value
    fn read_le(buf: &mut &[u8]) -> io::Result<Self>;

    /// Order-preserving sort key
    fn sort_blob(self, ascending: bool) -> Vec<u8> {
        if Self::is_floating() {
            sort_blob::serialize_float(self.to_f64(), ascending)
        } else {
            sort_blob::serialize_int(self.to_i64(), ascending)
        }
    }

    /// Whether the value matches a term; undefined never matches
    fn matches(self, matcher: &TermMatcher) -> bool {
        if self.is_undefined() {
            return false;
        }
        match matcher {
            TermMatcher::IntRange(..) => matcher.matches_int(self.to_i64()),
            TermMatcher::FloatRange(..) => matcher.matches_float(self.to_f64()),
            _ => false,
        }
    }
}

macro_rules! impl_numeric_int {
    ($($t:ty => $bt:expr, $write:ident, $read:ident);* $(;)?) => {$(
        impl NumericValue for $t {
            const BASIC_TYPE: BasicType = $bt;

            fn undefined() -> Self {
                <$t>::MIN
            }

            fn is_undefined(&self) -> bool {
                *self == <$t>::MIN
            }

            fn from_i64(v: i64) -> Self {
                v.clamp(<$t>::MIN as i64, <$t>::MAX as i64) as $t
            }

            fn from_f64(v: f64) -> Self {
                v as $t
            }

            fn to_i64(self) -> i64 {
                self as i64
            }

            fn to_f64(self) -> f64 {
                self as f64
            }

            fn write_le(self, out: &mut Vec<u8>) {
                // writes into a Vec cannot fail
                let _ = out.$write::<LittleEndian>(self);
            }

            fn read_le(buf: &mut &[u8]) -> io::Result<Self> {
                buf.$read::<LittleEndian>()
            }
        }
    )*};
}

impl_numeric_int!(
    i16 => BasicType::Int16, write_i16, read_i16;
    i32 => BasicType::Int32, write_i32, read_i32;
    i64 => BasicType::Int64, write_i64, read_i64;
);

impl NumericValue for i8 {
    const BASIC_TYPE: BasicType = BasicType::Int8;

    fn undefined() -> Self {
        i8::MIN
    }

    fn is_undefined(&self) -> bool {
        *self == i8::MIN
    }

    fn from_i64(v: i64) -> Self {
        v.clamp(i8::MIN as i64, i8::MAX as i64) as i8
    }

    fn from_f64(v: f64) -> Self {
        v as i8
    }

    fn to_i64(self) -> i64 {
        self as i64
    }

    fn to_f64(self) -> f64 {
        self as f64
    }

    fn write_le(self, out: &mut Vec<u8>) {
        out.push(self as u8);
    }

    fn read_le(buf: &mut &[u8]) -> io::Result<Self> {
        buf.read_i8()
    }
}

macro_rules! impl_numeric_float {
    ($($t:ty => $bt:expr, $write:ident, $read:ident);* $(;)?) => {$(
        impl NumericValue for $t {
            const BASIC_TYPE: BasicType = $bt;

            fn undefined() -> Self {
                <$t>::NAN
            }

            fn is_undefined(&self) -> bool {
                self.is_nan()
            }

            fn from_i64(v: i64) -> Self {
                v as $t
            }

            fn from_f64(v: f64) -> Self {
                v as $t
            }

            fn to_i64(self) -> i64 {
                if self.is_nan() {
                    i64::MIN
                } else {
                    self as i64
                }
            }

            fn to_f64(self) -> f64 {
                self as f64
            }

            fn is_floating() -> bool {
                true
            }

            fn write_le(self, out: &mut Vec<u8>) {
                let _ = out.$write::<LittleEndian>(self);
            }

            fn read_le(buf: &mut &[u8]) -> io::Result<Self> {
                buf.$read::<LittleEndian>()
            }
        }
    )*};
}

impl_numeric_float!(
    f32 => BasicType::Float, write_f32, read_f32;
    f64 => BasicType::Double, write_f64, read_f64;
);

impl NumericValue for bool {
    const BASIC_TYPE: BasicType = BasicType::Bool;

    fn undefined() -> Self {
        false
    }

    fn is_undefined(&self) -> bool {
        false
    }

    fn from_i64(v: i64) -> Self {
        v != 0
    }

    fn from_f64(v: f64) -> Self {
        v != 0.0 && !v.is_nan()
    }

    fn to_i64(self) -> i64 {
        self as i64
    }

    fn to_f64(self) -> f64 {
        self as i64 as f64
    }

    fn write_le(self, out: &mut Vec<u8>) {
        out.push(self as u8);
    }

    fn read_le(buf: &mut &[u8]) -> io::Result<Self> {
        Ok(buf.read_u8()? != 0)
    }
}

/// Element of a multi-value document
pub trait ElementValue: Clone + PartialEq + PartialOrd + Send + Sync + fmt::Debug + 'static {
    /// Basic type this element stores
    const BASIC_TYPE: BasicType;

    /// Value reported for a document without elements
    fn undefined() -> Self;

    /// Convert from the dynamic representation
    fn from_attr(value: &AttrValue) -> Option<Self>;

    /// Convert to the dynamic representation
    fn to_attr(&self) -> AttrValue;

    /// Whether the element matches a term
    fn matches(&self, matcher: &TermMatcher) -> bool;

    /// Append the persisted encoding
    fn encode(&self, out: &mut Vec<u8>);

    /// Read one persisted element
    fn decode(buf: &mut &[u8]) -> io::Result<Self>;

    /// Order-preserving sort key
    fn sort_blob(&self, ascending: bool) -> Vec<u8>;

    /// Heap bytes owned by the element beyond its inline size
    fn heap_bytes(&self) -> usize {
        0
    }
}

macro_rules! impl_element_for_numeric {
    ($($t:ty),*) => {$(
        impl ElementValue for $t {
            const BASIC_TYPE: BasicType = <$t as NumericValue>::BASIC_TYPE;

            fn undefined() -> Self {
                <$t as NumericValue>::undefined()
            }

            fn from_attr(value: &AttrValue) -> Option<Self> {
                match value {
                    AttrValue::Int(v) => Some(<$t as NumericValue>::from_i64(*v)),
                    AttrValue::Float(v) => Some(<$t as NumericValue>::from_f64(*v)),
                    AttrValue::String(s) => {
                        if <$t as NumericValue>::is_floating() {
                            s.parse::<f64>().ok().map(<$t as NumericValue>::from_f64)
                        } else {
                            s.parse::<i64>().ok().map(<$t as NumericValue>::from_i64)
                        }
                    }
                }
            }

            fn to_attr(&self) -> AttrValue {
                if <$t as NumericValue>::is_floating() {
                    AttrValue::Float(NumericValue::to_f64(*self))
                } else {
                    AttrValue::Int(NumericValue::to_i64(*self))
                }
            }

            fn matches(&self, matcher: &TermMatcher) -> bool {
                NumericValue::matches(*self, matcher)
            }

            fn encode(&self, out: &mut Vec<u8>) {
                NumericValue::write_le(*self, out)
            }

            fn decode(buf: &mut &[u8]) -> io::Result<Self> {
                <$t as NumericValue>::read_le(buf)
            }

            fn sort_blob(&self, ascending: bool) -> Vec<u8> {
                NumericValue::sort_blob(*self, ascending)
            }
        }
    )*};
}

impl_element_for_numeric!(i8, i16, i32, i64, f32, f64);

impl ElementValue for String {
    const BASIC_TYPE: BasicType = BasicType::String;

    fn undefined() -> Self {
        String::new()
    }

    fn from_attr(value: &AttrValue) -> Option<Self> {
        match value {
            AttrValue::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    fn to_attr(&self) -> AttrValue {
        AttrValue::String(self.clone())
    }

    fn matches(&self, matcher: &TermMatcher) -> bool {
        !self.is_empty() && matcher.matches_str(self)
    }

    fn encode(&self, out: &mut Vec<u8>) {
        let _ = out.write_u32::<LittleEndian>(self.len() as u32);
        out.extend_from_slice(self.as_bytes());
    }

    fn decode(buf: &mut &[u8]) -> io::Result<Self> {
        let len = buf.read_u32::<LittleEndian>()? as usize;
        if buf.len() < len {
            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "string body truncated"));
        }
        let (head, tail) = buf.split_at(len);
        *buf = tail;
        String::from_utf8(head.to_vec())
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }

    fn sort_blob(&self, ascending: bool) -> Vec<u8> {
        sort_blob::serialize_str(self, ascending)
    }

    fn heap_bytes(&self) -> usize {
        self.capacity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use attrstore_core::QueryTerm;

    #[test]
    fn test_undefined_values() {
        assert!(<i32 as NumericValue>::undefined().is_undefined());
        assert!(<f64 as NumericValue>::undefined().is_nan());
        assert_eq!(<i8 as NumericValue>::undefined(), i8::MIN);
        assert_eq!(<String as ElementValue>::undefined(), "");
    }

    #[test]
    fn test_saturating_conversion() {
        assert_eq!(<i8 as NumericValue>::from_i64(1000), i8::MAX);
        assert_eq!(<i16 as NumericValue>::from_i64(-100_000), i16::MIN);
    }

    #[test]
    fn test_undefined_never_matches() {
        let m = TermMatcher::new(&QueryTerm::new("[;]"), BasicType::Int32);
        assert!(NumericValue::matches(5i32, &m));
        assert!(!NumericValue::matches(i32::MIN, &m));
    }

    #[test]
    fn test_encode_decode_string() {
        let mut buf = Vec::new();
        "héllo".to_string().encode(&mut buf);
        let mut slice = buf.as_slice();
        assert_eq!(String::decode(&mut slice).unwrap(), "héllo");
        assert!(slice.is_empty());
    }
}
