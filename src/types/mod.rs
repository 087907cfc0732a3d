//! Literal values and the builtin type universe.

mod value;

pub use value::{DataType, ResolvedType, TypeDescriptor, Value};
