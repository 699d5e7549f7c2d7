//! Document value updates applied to attributes
//!
//! A `ValueUpdate` is the attribute-level part of a document update. It is
//! buffered into the attribute like any other write and becomes visible on
//! the next commit. Updates that do not fit the attribute's layout are
//! rejected with `false` and logged.

use tracing::warn;

use attrstore_core::{ArithmeticOp, AttrValue, BasicType, DocId};

use super::AttributeVector;

/// One update to one document's attribute value
#[derive(Debug, Clone, PartialEq)]
pub enum ValueUpdate {
    /// Replace the value; on collections, replace every element with this one
    Assign(AttrValue),
    /// Arithmetic on a single numeric value
    Arithmetic {
        /// Operator
        op: ArithmeticOp,
        /// Right-hand operand
        operand: f64,
    },
    /// Weight arithmetic on one weighted-set key
    Map {
        /// Key whose weight changes
        key: AttrValue,
        /// Operator
        op: ArithmeticOp,
        /// Right-hand operand
        operand: f64,
    },
    /// Add an element to a collection
    Add {
        /// Element
        value: AttrValue,
        /// Weight (ignored by arrays)
        weight: i32,
    },
    /// Remove every element equal to `value`
    Remove {
        /// Element
        value: AttrValue,
    },
    /// Reset to the undefined value
    Clear,
}

impl ValueUpdate {
    fn kind(&self) -> &'static str {
        match self {
            ValueUpdate::Assign(_) => "assign",
            ValueUpdate::Arithmetic { .. } => "arithmetic",
            ValueUpdate::Map { .. } => "map",
            ValueUpdate::Add { .. } => "add",
            ValueUpdate::Remove { .. } => "remove",
            ValueUpdate::Clear => "clear",
        }
    }
}

/// Apply `update` to `lid` of `attr`; returns whether it was accepted
pub fn apply_update(attr: &dyn AttributeVector, lid: DocId, update: &ValueUpdate) -> bool {
    let multi_value = attr.collection_type().is_multi_value();
    let accepted = match update {
        ValueUpdate::Assign(value) if multi_value => {
            lid < attr.num_docs() && {
                attr.clear_doc(lid);
                attr.append(lid, value, 1)
            }
        }
        ValueUpdate::Assign(value) => assign_single(attr, lid, value),
        ValueUpdate::Arithmetic { op, operand } => {
            !multi_value && attr.apply_arithmetic(lid, *op, *operand)
        }
        ValueUpdate::Map { key, op, operand } => attr.apply_weight(lid, key, *op, *operand),
        ValueUpdate::Add { value, weight } => attr.append(lid, value, *weight),
        ValueUpdate::Remove { value } => attr.remove(lid, value),
        ValueUpdate::Clear => {
            lid < attr.num_docs() && {
                attr.clear_doc(lid);
                true
            }
        }
    };
    if !accepted {
        warn!(
            target: "attr::vector",
            name = attr.name(),
            lid,
            update = update.kind(),
            datatype = attr.basic_type().as_str(),
            collectiontype = attr.collection_type().as_str(),
            "Rejected value update"
        );
    }
    accepted
}

fn assign_single(attr: &dyn AttributeVector, lid: DocId, value: &AttrValue) -> bool {
    match attr.basic_type() {
        BasicType::String => match value.as_str() {
            Some(s) => attr.update_string(lid, s),
            None => attr.update_string(lid, &value.to_string()),
        },
        BasicType::Float | BasicType::Double => {
            value.as_f64().is_some_and(|v| attr.update_float(lid, v))
        }
        _ => value.as_i64().is_some_and(|v| attr.update_int(lid, v)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attribute::create_attribute;
    use attrstore_core::{AttributeConfig, CollectionType};
    use std::sync::Arc;

    fn attr(basic: BasicType, collection: CollectionType) -> Arc<dyn AttributeVector> {
        let config = AttributeConfig::new(basic, collection).with_weighted_set_flags(true, true);
        let a = create_attribute("a", &config, "/nonexistent/a").unwrap();
        a.add_reserved_doc();
        a.add_docs(4).unwrap();
        a.commit(false);
        a
    }

    #[test]
    fn test_assign_and_arithmetic_on_single() {
        let a = attr(BasicType::Int32, CollectionType::Single);
        assert!(apply_update(a.as_ref(), 1, &ValueUpdate::Assign(AttrValue::Int(10))));
        assert!(apply_update(
            a.as_ref(),
            1,
            &ValueUpdate::Arithmetic {
                op: ArithmeticOp::Mul,
                operand: 3.0
            }
        ));
        a.commit(false);
        assert_eq!(a.get_int(1), 30);

        let f = attr(BasicType::Double, CollectionType::Single);
        assert!(apply_update(f.as_ref(), 2, &ValueUpdate::Assign(AttrValue::Float(1.5))));
        f.commit(false);
        assert_eq!(f.get_float(2), 1.5);
    }

    #[test]
    fn test_assign_string() {
        let a = attr(BasicType::String, CollectionType::Single);
        assert!(apply_update(a.as_ref(), 3, &ValueUpdate::Assign(AttrValue::String("x".into()))));
        a.commit(false);
        assert_eq!(a.get_string(3), "x");
    }

    #[test]
    fn test_collection_updates() {
        let a = attr(BasicType::String, CollectionType::WeightedSet);
        let key = AttrValue::String("k".into());
        assert!(apply_update(a.as_ref(), 1, &ValueUpdate::Add { value: key.clone(), weight: 2 }));
        a.commit(false);
        assert!(apply_update(
            a.as_ref(),
            1,
            &ValueUpdate::Map {
                key: key.clone(),
                op: ArithmeticOp::Add,
                operand: 5.0
            }
        ));
        a.commit(false);
        assert_eq!(a.get_values(1)[0].weight, 7);

        assert!(apply_update(
            a.as_ref(),
            1,
            &ValueUpdate::Assign(AttrValue::String("only".into()))
        ));
        a.commit(false);
        assert_eq!(a.value_count(1), 1);
        assert_eq!(a.get_string(1), "only");

        assert!(apply_update(a.as_ref(), 1, &ValueUpdate::Clear));
        a.commit(false);
        assert_eq!(a.value_count(1), 0);
    }

    #[test]
    fn test_rejected_updates() {
        let single = attr(BasicType::Int64, CollectionType::Single);
        assert!(!apply_update(
            single.as_ref(),
            1,
            &ValueUpdate::Add {
                value: AttrValue::Int(1),
                weight: 1
            }
        ));
        assert!(!apply_update(single.as_ref(), 99, &ValueUpdate::Clear));

        let array = attr(BasicType::Int64, CollectionType::Array);
        assert!(!apply_update(
            array.as_ref(),
            1,
            &ValueUpdate::Arithmetic {
                op: ArithmeticOp::Add,
                operand: 1.0
            }
        ));
        assert!(!apply_update(
            array.as_ref(),
            1,
            &ValueUpdate::Map {
                key: AttrValue::Int(1),
                op: ArithmeticOp::Add,
                operand: 1.0
            }
        ));
    }
}
