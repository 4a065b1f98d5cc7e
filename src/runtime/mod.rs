//! Runtime support
//!
//! The object model and its collaborators:
//! - property keys, attributes and descriptors
//! - shapes (hidden classes) and their transition tree
//! - objects, including the dense fast-mode array storage
//! - strings (Latin-1/UTF-16 with ropes)
//! - heap environment records
//! - function payloads
//! - the abstract operations of ES2017 7.x

pub mod conversion;
pub mod environment;
pub mod function;
pub mod object;
pub mod property;
pub mod shape;
pub mod string;

pub use object::{ErrorKind, JsObject, ObjectKind};
pub use property::{PropertyAttributes, PropertyDescriptor, PropertyKey};
pub use shape::{ShapeId, ShapeTree};
pub use string::{JsString, STRING_MAX_LENGTH};
