//! Value-level types shared by stores and updates
//!
//! - `AttrValue`: dynamically typed scalar crossing the attribute API
//! - `Weighted<T>`: one element of a multi-value document
//! - `ArithmeticOp`: arithmetic applied by value and weight updates

use serde::{Deserialize, Serialize};
use std::fmt;

/// One element of a multi-value document
///
/// Arrays carry weight 1 for every element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Weighted<T> {
    /// Element value
    pub value: T,
    /// Element weight
    pub weight: i32,
}

impl<T> Weighted<T> {
    /// Create a weighted element
    pub fn new(value: T, weight: i32) -> Self {
        Weighted { value, weight }
    }
}

/// Dynamically typed scalar used by updates and multi-value reads
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AttrValue {
    /// Integer (also bool)
    Int(i64),
    /// Floating point
    Float(f64),
    /// String
    String(String),
}

impl AttrValue {
    /// Integer view; floats truncate, strings parse or yield `None`
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            AttrValue::Int(v) => Some(*v),
            AttrValue::Float(v) => (!v.is_nan()).then_some(*v as i64),
            AttrValue::String(s) => s.parse().ok(),
        }
    }

    /// Float view; strings parse or yield `None`
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            AttrValue::Int(v) => Some(*v as f64),
            AttrValue::Float(v) => Some(*v),
            AttrValue::String(s) => s.parse().ok(),
        }
    }

    /// String view, if this is a string
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttrValue::String(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttrValue::Int(v) => write!(f, "{}", v),
            AttrValue::Float(v) => write!(f, "{}", v),
            AttrValue::String(s) => f.write_str(s),
        }
    }
}

impl From<i64> for AttrValue {
    fn from(v: i64) -> Self {
        AttrValue::Int(v)
    }
}

impl From<f64> for AttrValue {
    fn from(v: f64) -> Self {
        AttrValue::Float(v)
    }
}

impl From<&str> for AttrValue {
    fn from(v: &str) -> Self {
        AttrValue::String(v.to_string())
    }
}

/// Arithmetic applied by value or weight updates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArithmeticOp {
    /// `v + operand`
    Add,
    /// `v - operand`
    Sub,
    /// `v * operand`
    Mul,
    /// `v / operand`; division by zero leaves the value unchanged
    Div,
}

impl ArithmeticOp {
    /// Apply to a float value
    pub fn apply_f64(&self, v: f64, operand: f64) -> f64 {
        match self {
            ArithmeticOp::Add => v + operand,
            ArithmeticOp::Sub => v - operand,
            ArithmeticOp::Mul => v * operand,
            ArithmeticOp::Div => {
                if operand == 0.0 {
                    v
                } else {
                    v / operand
                }
            }
        }
    }

    /// Apply to an integer value, computing in `f64` and saturating back
    pub fn apply_i64(&self, v: i64, operand: f64) -> i64 {
        let r = self.apply_f64(v as f64, operand);
        if r.is_nan() {
            v
        } else {
            r as i64
        }
    }
}
