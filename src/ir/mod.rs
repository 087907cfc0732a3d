//! Backend-agnostic intermediate representation.
//!
//! The IR is a tree of [`Node`]s hanging off a [`Query`]. Front ends build
//! it directly through the constructors here or through the surface call
//! table in [`surface`]; the compiler validates and normalizes it in place.

mod node;
mod ops;
mod query;
pub mod surface;

pub use node::{
    Aggregate, ArgKind, BindingRef, BindingSlot, Cast, FieldName, FieldRef, FieldSet, Fragment,
    IntervalValue, NestedSelect, Node, Param, PathElem, Projection, ProjectionKind, ResolvedField,
    SourceRef, TypeRef, ValuesTable, ValuesTypes,
};
pub use ops::{AggregateKind, IntervalUnit, OperatorKind, SubqueryKind};
pub use query::{Join, JoinQual, OrderBy, Query, SortDirection, Source, SourceKind};
pub use surface::{call, fragment_arg, CallArg};
