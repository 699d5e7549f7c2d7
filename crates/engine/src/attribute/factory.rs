//! Store selection from an attribute's value layout

use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

use attrstore_core::{AttributeConfig, BasicType, CollectionType, Error, Result};

use super::{AttributeVector, MultiValueAttribute, SingleValueNumericAttribute, SingleValueStringAttribute};
use crate::reference::ReferenceAttribute;

/// Create an empty attribute for `config`
///
/// The store is chosen once from `(basic_type, collection_type)`. Boolean
/// collections are stored as `int8` elements.
///
/// # Errors
///
/// Returns `Error::Config` for layouts no store supports (a multi-value
/// reference attribute).
pub fn create_attribute(
    name: &str,
    config: &AttributeConfig,
    base_file_name: impl Into<PathBuf>,
) -> Result<Arc<dyn AttributeVector>> {
    let base_file_name = base_file_name.into();
    let config = config.clone();
    let attribute: Arc<dyn AttributeVector> = match (config.basic_type, config.collection_type) {
        (BasicType::Reference, CollectionType::Single) => {
            Arc::new(ReferenceAttribute::new(name, base_file_name))
        }
        (BasicType::Reference, collection) => {
            return Err(Error::Config(format!(
                "attribute '{}': reference attributes cannot be {}",
                name,
                collection.as_str()
            )));
        }
        (BasicType::String, CollectionType::Single) => {
            Arc::new(SingleValueStringAttribute::new(name, config, base_file_name))
        }
        (basic, CollectionType::Single) => single_numeric(name, basic, config, base_file_name),
        (basic, _) => multi_value(name, basic, config, base_file_name),
    };
    debug!(
        target: "attr::vector",
        name,
        datatype = attribute.basic_type().as_str(),
        collectiontype = attribute.collection_type().as_str(),
        "Created attribute"
    );
    Ok(attribute)
}

fn single_numeric(
    name: &str,
    basic: BasicType,
    config: AttributeConfig,
    base_file_name: PathBuf,
) -> Arc<dyn AttributeVector> {
    match basic {
        BasicType::Bool => Arc::new(SingleValueNumericAttribute::<bool>::new(name, config, base_file_name)),
        BasicType::Int8 => Arc::new(SingleValueNumericAttribute::<i8>::new(name, config, base_file_name)),
        BasicType::Int16 => Arc::new(SingleValueNumericAttribute::<i16>::new(name, config, base_file_name)),
        BasicType::Int32 => Arc::new(SingleValueNumericAttribute::<i32>::new(name, config, base_file_name)),
        BasicType::Float => Arc::new(SingleValueNumericAttribute::<f32>::new(name, config, base_file_name)),
        BasicType::Double => Arc::new(SingleValueNumericAttribute::<f64>::new(name, config, base_file_name)),
        BasicType::Int64 | BasicType::String | BasicType::Reference => {
            Arc::new(SingleValueNumericAttribute::<i64>::new(name, config, base_file_name))
        }
    }
}

fn multi_value(
    name: &str,
    basic: BasicType,
    config: AttributeConfig,
    base_file_name: PathBuf,
) -> Arc<dyn AttributeVector> {
    match basic {
        BasicType::Bool | BasicType::Int8 => Arc::new(MultiValueAttribute::<i8>::new(name, config, base_file_name)),
        BasicType::Int16 => Arc::new(MultiValueAttribute::<i16>::new(name, config, base_file_name)),
        BasicType::Int32 => Arc::new(MultiValueAttribute::<i32>::new(name, config, base_file_name)),
        BasicType::Float => Arc::new(MultiValueAttribute::<f32>::new(name, config, base_file_name)),
        BasicType::Double => Arc::new(MultiValueAttribute::<f64>::new(name, config, base_file_name)),
        BasicType::String => Arc::new(MultiValueAttribute::<String>::new(name, config, base_file_name)),
        BasicType::Int64 | BasicType::Reference => {
            Arc::new(MultiValueAttribute::<i64>::new(name, config, base_file_name))
        }
    }
}
