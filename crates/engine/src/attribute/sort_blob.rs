//! Sort blobs: order-preserving byte encodings of attribute values
//!
//! Integers are written big-endian with the sign bit flipped. Floats are
//! mapped through the usual total-order transform (negative values have
//! every bit inverted, others only the sign bit); NaN sorts first.
//! Strings are their UTF-8 bytes followed by a zero terminator so that a
//! prefix sorts before its extensions. A descending blob is the bitwise
//! complement of the ascending one.

/// Complement every byte when sorting descending
fn finish(mut blob: Vec<u8>, ascending: bool) -> Vec<u8> {
    if !ascending {
        for b in &mut blob {
            *b = !*b;
        }
    }
    blob
}

/// Blob for a signed integer
pub fn serialize_int(value: i64, ascending: bool) -> Vec<u8> {
    let key = (value as u64) ^ (1u64 << 63);
    finish(key.to_be_bytes().to_vec(), ascending)
}

/// Blob for a float
pub fn serialize_float(value: f64, ascending: bool) -> Vec<u8> {
    let key = if value.is_nan() {
        0
    } else {
        let bits = value.to_bits();
        if bits >> 63 == 1 {
            !bits
        } else {
            bits ^ (1u64 << 63)
        }
    };
    finish(key.to_be_bytes().to_vec(), ascending)
}

/// Blob for a string
pub fn serialize_str(value: &str, ascending: bool) -> Vec<u8> {
    let mut blob = Vec::with_capacity(value.len() + 1);
    blob.extend_from_slice(value.as_bytes());
    blob.push(0);
    finish(blob, ascending)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_string_prefix_sorts_first() {
        assert!(serialize_str("ab", true) < serialize_str("abc", true));
        assert!(serialize_str("ab", false) > serialize_str("abc", false));
    }

    #[test]
    fn test_nan_sorts_first() {
        assert!(serialize_float(f64::NAN, true) < serialize_float(f64::NEG_INFINITY, true));
    }

    proptest! {
        #[test]
        fn int_blob_order_matches_value_order(a: i64, b: i64) {
            prop_assert_eq!(a.cmp(&b), serialize_int(a, true).cmp(&serialize_int(b, true)));
            prop_assert_eq!(b.cmp(&a), serialize_int(a, false).cmp(&serialize_int(b, false)));
        }

        #[test]
        fn float_blob_order_matches_value_order(a in -1e12f64..1e12, b in -1e12f64..1e12) {
            let expected = a.partial_cmp(&b).unwrap();
            let got = serialize_float(a, true).cmp(&serialize_float(b, true));
            if a == b {
                // 0.0 and -0.0 compare equal but encode differently
                prop_assert!(a == 0.0 || got == expected);
            } else {
                prop_assert_eq!(got, expected);
            }
        }
    }
}
