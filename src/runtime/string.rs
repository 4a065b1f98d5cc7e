//! JavaScript string representation
//!
//! Strings are immutable sequences of UTF-16 code units. Sequences whose
//! units all fit in one byte are stored as Latin-1 to halve memory; a
//! flag on the storage records which form is in use. Concatenation may
//! produce a rope (two children plus the combined length) which is
//! flattened on the first random access.

use crate::value::StringRef;

/// Engine-wide maximum string length in code units. Any operation that
/// would exceed it fails with the RangeError kind.
pub const STRING_MAX_LENGTH: u32 = (1 << 30) - 1;

/// Threshold below which concatenation copies eagerly instead of
/// building a rope node.
pub const ROPE_MIN_LENGTH: u32 = 24;

/// String storage.
#[derive(Debug, Clone)]
pub enum StringData {
    /// All code units fit in a byte.
    Latin1(Box<[u8]>),
    /// Full UTF-16 code units.
    Utf16(Box<[u16]>),
    /// Unflattened concatenation.
    Rope {
        left: StringRef,
        right: StringRef,
        len: u32,
    },
}

/// An immutable JavaScript string.
#[derive(Debug, Clone)]
pub struct JsString {
    pub data: StringData,
}

impl JsString {
    pub fn from_str(s: &str) -> Self {
        if s.chars().all(|c| (c as u32) < 0x100) {
            let bytes: Vec<u8> = s.chars().map(|c| c as u8).collect();
            JsString {
                data: StringData::Latin1(bytes.into_boxed_slice()),
            }
        } else {
            let units: Vec<u16> = s.encode_utf16().collect();
            JsString {
                data: StringData::Utf16(units.into_boxed_slice()),
            }
        }
    }

    /// Build from raw code units, narrowing to Latin-1 when possible so
    /// that equal strings always share a storage form for equal content.
    pub fn from_units(units: Vec<u16>) -> Self {
        if units.iter().all(|&u| u < 0x100) {
            let bytes: Vec<u8> = units.iter().map(|&u| u as u8).collect();
            JsString {
                data: StringData::Latin1(bytes.into_boxed_slice()),
            }
        } else {
            JsString {
                data: StringData::Utf16(units.into_boxed_slice()),
            }
        }
    }

    pub fn empty() -> Self {
        JsString {
            data: StringData::Latin1(Box::new([])),
        }
    }

    /// Length in UTF-16 code units.
    #[inline]
    pub fn len(&self) -> u32 {
        match &self.data {
            StringData::Latin1(b) => b.len() as u32,
            StringData::Utf16(u) => u.len() as u32,
            StringData::Rope { len, .. } => *len,
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn is_flat(&self) -> bool {
        !matches!(self.data, StringData::Rope { .. })
    }

    #[inline]
    pub fn is_latin1(&self) -> bool {
        matches!(self.data, StringData::Latin1(_))
    }

    /// Code unit at `idx`. The string must be flat.
    #[inline]
    pub fn code_unit(&self, idx: u32) -> u16 {
        match &self.data {
            StringData::Latin1(b) => b[idx as usize] as u16,
            StringData::Utf16(u) => u[idx as usize],
            StringData::Rope { .. } => unreachable!("rope not flattened before access"),
        }
    }

    /// Compare flat strings unit-by-unit.
    pub fn eq_flat(&self, other: &JsString) -> bool {
        if self.len() != other.len() {
            return false;
        }
        match (&self.data, &other.data) {
            (StringData::Latin1(a), StringData::Latin1(b)) => a == b,
            (StringData::Utf16(a), StringData::Utf16(b)) => a == b,
            _ => (0..self.len()).all(|i| self.code_unit(i) == other.code_unit(i)),
        }
    }

    /// Lexicographic comparison by code unit, used by the relational
    /// operators and the default sort comparator. Flat strings only.
    pub fn compare_flat(&self, other: &JsString) -> std::cmp::Ordering {
        let n = self.len().min(other.len());
        for i in 0..n {
            let a = self.code_unit(i);
            let b = other.code_unit(i);
            if a != b {
                return a.cmp(&b);
            }
        }
        self.len().cmp(&other.len())
    }

    /// Collect the code units of a flat string.
    pub fn units(&self) -> Vec<u16> {
        match &self.data {
            StringData::Latin1(b) => b.iter().map(|&u| u as u16).collect(),
            StringData::Utf16(u) => u.to_vec(),
            StringData::Rope { .. } => unreachable!("rope not flattened before access"),
        }
    }

    /// Convert a flat string to a Rust string (lone surrogates become
    /// the replacement character).
    pub fn to_rust_string(&self) -> String {
        match &self.data {
            StringData::Latin1(b) => b.iter().map(|&u| u as char).collect(),
            StringData::Utf16(u) => String::from_utf16_lossy(u),
            StringData::Rope { .. } => unreachable!("rope not flattened before access"),
        }
    }
}

/// Whether a string is the canonical decimal form of an array index
/// (no leading zeros, fits below 2^32 - 1).
pub fn parse_array_index(s: &str) -> Option<u32> {
    if s.is_empty() || s.len() > 10 {
        return None;
    }
    if s.len() > 1 && s.starts_with('0') {
        return None;
    }
    if !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse::<u64>().ok().and_then(|n| {
        if n < u32::MAX as u64 {
            Some(n as u32)
        } else {
            None
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn latin1_narrowing() {
        let s = JsString::from_str("hello");
        assert!(s.is_latin1());
        assert_eq!(s.len(), 5);
        assert_eq!(s.code_unit(1), b'e' as u16);

        let s = JsString::from_str("héllo");
        assert!(s.is_latin1()); // é is U+00E9, still one byte
        assert_eq!(s.len(), 5);

        let s = JsString::from_str("中文");
        assert!(!s.is_latin1());
        assert_eq!(s.len(), 2);
    }

    #[test]
    fn from_units_canonicalizes() {
        let narrow = JsString::from_units(vec![0x68, 0x69]);
        assert!(narrow.is_latin1());
        let wide = JsString::from_units(vec![0x68, 0x4E2D]);
        assert!(!wide.is_latin1());
    }

    #[test]
    fn eq_across_storage_forms() {
        let a = JsString::from_str("abc");
        let b = JsString::from_units(vec![b'a' as u16, b'b' as u16, b'c' as u16]);
        assert!(a.eq_flat(&b));
        assert!(!a.eq_flat(&JsString::from_str("abd")));
    }

    #[test]
    fn compare_orders_by_code_unit() {
        use std::cmp::Ordering;
        let a = JsString::from_str("abc");
        let b = JsString::from_str("abd");
        assert_eq!(a.compare_flat(&b), Ordering::Less);
        assert_eq!(a.compare_flat(&JsString::from_str("ab")), Ordering::Greater);
        assert_eq!(a.compare_flat(&JsString::from_str("abc")), Ordering::Equal);
    }

    #[test]
    fn array_index_strings() {
        assert_eq!(parse_array_index("0"), Some(0));
        assert_eq!(parse_array_index("42"), Some(42));
        assert_eq!(parse_array_index("4294967294"), Some(4294967294));
        assert_eq!(parse_array_index("4294967295"), None);
        assert_eq!(parse_array_index("01"), None);
        assert_eq!(parse_array_index("-1"), None);
        assert_eq!(parse_array_index(""), None);
        assert_eq!(parse_array_index("1.5"), None);
    }

    #[test]
    fn surrogate_pair_length() {
        let s = JsString::from_str("😀");
        assert_eq!(s.len(), 2);
    }
}
