//! Query terms evaluated against attributes
//!
//! A term is kept as its raw string (the search cache is keyed on it) and
//! interpreted by each search context according to the attribute's type:
//!
//! | raw form   | integer / float meaning       | string meaning    |
//! |------------|-------------------------------|-------------------|
//! | `42`       | equal to 42                   | equal to `"42"`   |
//! | `[a;b]`    | `a <= v <= b` (bounds optional)| literal           |
//! | `<a`, `>a` | strict less / greater         | literal           |
//! | `abc*`     | not a number (no match)       | prefix `"abc"`    |

use std::fmt;

/// A single query term as typed by the user
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryTerm {
    raw: String,
}

/// Numeric interval with per-bound inclusivity
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FloatRange {
    /// Lower bound
    pub low: f64,
    /// Whether `low` itself matches
    pub low_inclusive: bool,
    /// Upper bound
    pub high: f64,
    /// Whether `high` itself matches
    pub high_inclusive: bool,
}

impl FloatRange {
    /// Whether `v` lies in the interval; NaN never matches
    pub fn contains(&self, v: f64) -> bool {
        if v.is_nan() {
            return false;
        }
        let above = if self.low_inclusive { v >= self.low } else { v > self.low };
        let below = if self.high_inclusive { v <= self.high } else { v < self.high };
        above && below
    }
}

impl QueryTerm {
    /// Wrap a raw term
    pub fn new(raw: impl Into<String>) -> Self {
        QueryTerm { raw: raw.into() }
    }

    /// Raw term text; the identity used by caches
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Whether the term is a string prefix (`abc*`)
    pub fn is_prefix(&self) -> bool {
        self.raw.len() > 1 && self.raw.ends_with('*')
    }

    /// Interpret as an inclusive integer interval
    ///
    /// Returns `None` if the term is not numeric or the interval is empty.
    pub fn int_range(&self) -> Option<(i64, i64)> {
        let raw = self.raw.trim();
        if let Some(inner) = raw.strip_prefix('[').and_then(|r| r.strip_suffix(']')) {
            let (lo, hi) = inner.split_once(';')?;
            let lo = if lo.trim().is_empty() { i64::MIN } else { parse_int_bound(lo.trim())? };
            let hi = if hi.trim().is_empty() { i64::MAX } else { parse_int_bound(hi.trim())? };
            return (lo <= hi).then_some((lo, hi));
        }
        if let Some(rest) = raw.strip_prefix('<') {
            let v = parse_int_bound(rest.trim())?;
            return v.checked_sub(1).map(|hi| (i64::MIN, hi));
        }
        if let Some(rest) = raw.strip_prefix('>') {
            let v = parse_int_bound(rest.trim())?;
            return v.checked_add(1).map(|lo| (lo, i64::MAX));
        }
        let v = parse_int_bound(raw)?;
        Some((v, v))
    }

    /// Interpret as a floating point interval
    pub fn float_range(&self) -> Option<FloatRange> {
        let raw = self.raw.trim();
        if let Some(inner) = raw.strip_prefix('[').and_then(|r| r.strip_suffix(']')) {
            let (lo, hi) = inner.split_once(';')?;
            let low = if lo.trim().is_empty() { f64::NEG_INFINITY } else { lo.trim().parse().ok()? };
            let high = if hi.trim().is_empty() { f64::INFINITY } else { hi.trim().parse().ok()? };
            return Some(FloatRange { low, low_inclusive: true, high, high_inclusive: true });
        }
        if let Some(rest) = raw.strip_prefix('<') {
            let high = rest.trim().parse().ok()?;
            return Some(FloatRange { low: f64::NEG_INFINITY, low_inclusive: true, high, high_inclusive: false });
        }
        if let Some(rest) = raw.strip_prefix('>') {
            let low = rest.trim().parse().ok()?;
            return Some(FloatRange { low, low_inclusive: false, high: f64::INFINITY, high_inclusive: true });
        }
        let v: f64 = raw.parse().ok()?;
        if v.is_nan() {
            return None;
        }
        Some(FloatRange { low: v, low_inclusive: true, high: v, high_inclusive: true })
    }

    /// Match against a string value
    pub fn matches_str(&self, value: &str) -> bool {
        if self.is_prefix() {
            value.starts_with(&self.raw[..self.raw.len() - 1])
        } else {
            value == self.raw
        }
    }
}

// Integer bounds also accept float syntax that is integral ("10.0").
fn parse_int_bound(s: &str) -> Option<i64> {
    if let Ok(v) = s.parse::<i64>() {
        return Some(v);
    }
    let f: f64 = s.parse().ok()?;
    (f.fract() == 0.0 && f >= i64::MIN as f64 && f <= i64::MAX as f64).then_some(f as i64)
}

impl fmt::Display for QueryTerm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl From<&str> for QueryTerm {
    fn from(raw: &str) -> Self {
        QueryTerm::new(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_int_exact_and_ranges() {
        assert_eq!(QueryTerm::new("42").int_range(), Some((42, 42)));
        assert_eq!(QueryTerm::new("[10;20]").int_range(), Some((10, 20)));
        assert_eq!(QueryTerm::new("[;5]").int_range(), Some((i64::MIN, 5)));
        assert_eq!(QueryTerm::new("[5;]").int_range(), Some((5, i64::MAX)));
        assert_eq!(QueryTerm::new("<10").int_range(), Some((i64::MIN, 9)));
        assert_eq!(QueryTerm::new(">10").int_range(), Some((11, i64::MAX)));
        assert_eq!(QueryTerm::new("[20;10]").int_range(), None);
        assert_eq!(QueryTerm::new("abc").int_range(), None);
        assert_eq!(QueryTerm::new("7.0").int_range(), Some((7, 7)));
        assert_eq!(QueryTerm::new(" -3.0 ").int_range(), Some((-3, -3)));
        assert_eq!(QueryTerm::new("7.5").int_range(), None);
    }

    #[test]
    fn test_float_ranges() {
        let r = QueryTerm::new("<1.5").float_range().unwrap();
        assert!(r.contains(1.0));
        assert!(!r.contains(1.5));
        let r = QueryTerm::new("[1.5;2.5]").float_range().unwrap();
        assert!(r.contains(1.5));
        assert!(r.contains(2.5));
        assert!(!r.contains(f64::NAN));
        assert!(QueryTerm::new("xyz").float_range().is_none());
    }

    #[test]
    fn test_string_matching() {
        let exact = QueryTerm::new("foo");
        assert!(exact.matches_str("foo"));
        assert!(!exact.matches_str("foobar"));

        let prefix = QueryTerm::new("foo*");
        assert!(prefix.is_prefix());
        assert!(prefix.matches_str("foobar"));
        assert!(!prefix.matches_str("fo"));

        assert!(!QueryTerm::new("*").is_prefix());
    }
}
