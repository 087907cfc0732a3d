//! Value and `DataType` definitions for query literals and parameters.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Recognized builtin type names usable as cast targets and field types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    /// Integer primary key.
    Id,
    /// Binary (UUID-like) primary key.
    BinaryId,
    /// 64-bit signed integer.
    Integer,
    /// 64-bit floating point.
    Float,
    /// Boolean.
    Boolean,
    /// UTF-8 string.
    String,
    /// Raw bytes.
    Binary,
    /// Arbitrary-precision decimal.
    Decimal,
    /// Unstructured key/value document.
    Map,
    /// Calendar date.
    Date,
    /// Time of day.
    Time,
    /// Time of day with microsecond precision.
    TimeUsec,
    /// Timestamp without zone.
    NaiveDatetime,
    /// Timestamp without zone, microsecond precision.
    NaiveDatetimeUsec,
    /// UTC timestamp.
    UtcDatetime,
    /// UTC timestamp, microsecond precision.
    UtcDatetimeUsec,
    /// Accepts anything; enforcement is left to the backend.
    Any,
}

impl DataType {
    /// Every recognized builtin, in declaration order.
    pub const ALL: [DataType; 17] = [
        DataType::Id,
        DataType::BinaryId,
        DataType::Integer,
        DataType::Float,
        DataType::Boolean,
        DataType::String,
        DataType::Binary,
        DataType::Decimal,
        DataType::Map,
        DataType::Date,
        DataType::Time,
        DataType::TimeUsec,
        DataType::NaiveDatetime,
        DataType::NaiveDatetimeUsec,
        DataType::UtcDatetime,
        DataType::UtcDatetimeUsec,
        DataType::Any,
    ];

    /// Returns the builtin name used in cast targets.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            DataType::Id => "id",
            DataType::BinaryId => "binary_id",
            DataType::Integer => "integer",
            DataType::Float => "float",
            DataType::Boolean => "boolean",
            DataType::String => "string",
            DataType::Binary => "binary",
            DataType::Decimal => "decimal",
            DataType::Map => "map",
            DataType::Date => "date",
            DataType::Time => "time",
            DataType::TimeUsec => "time_usec",
            DataType::NaiveDatetime => "naive_datetime",
            DataType::NaiveDatetimeUsec => "naive_datetime_usec",
            DataType::UtcDatetime => "utc_datetime",
            DataType::UtcDatetimeUsec => "utc_datetime_usec",
            DataType::Any => "any",
        }
    }

    /// Looks up a builtin by name. Returns `None` for unrecognized names.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        DataType::ALL.into_iter().find(|t| t.name() == name)
    }

    /// Returns whether this type is numeric.
    #[must_use]
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            DataType::Id | DataType::Integer | DataType::Float | DataType::Decimal
        )
    }

    /// Returns whether this type is a date, time or timestamp.
    #[must_use]
    pub fn is_temporal(&self) -> bool {
        matches!(
            self,
            DataType::Date
                | DataType::Time
                | DataType::TimeUsec
                | DataType::NaiveDatetime
                | DataType::NaiveDatetimeUsec
                | DataType::UtcDatetime
                | DataType::UtcDatetimeUsec
        )
    }

    /// Returns whether a literal value can be bound to this type.
    ///
    /// Null is accepted everywhere. Integers widen into float and decimal.
    #[must_use]
    pub fn accepts(&self, value: &Value) -> bool {
        match (self, value) {
            (_, Value::Null) | (DataType::Any, _) => true,
            (DataType::Id | DataType::Integer, Value::Integer(_)) => true,
            (DataType::Float, Value::Integer(_) | Value::Float(_)) => true,
            (DataType::Decimal, Value::Integer(_) | Value::Float(_) | Value::Decimal(_)) => true,
            (DataType::Boolean, Value::Bool(_)) => true,
            (DataType::String, Value::String(_)) => true,
            (DataType::BinaryId, Value::String(_) | Value::Binary(_)) => true,
            (DataType::Binary, Value::Binary(_)) => true,
            (DataType::Date, Value::Date(_)) => true,
            (DataType::Time | DataType::TimeUsec, Value::Time(_)) => true,
            (
                DataType::NaiveDatetime
                | DataType::NaiveDatetimeUsec
                | DataType::UtcDatetime
                | DataType::UtcDatetimeUsec,
                Value::Timestamp(_),
            ) => true,
            (DataType::Map, Value::Map(_)) => true,
            _ => false,
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Externally constructed type descriptor, passed through untouched.
///
/// Used for parameterized types the core knows nothing about (enums,
/// custom column types); the backend interprets `name` and `params`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TypeDescriptor {
    /// Descriptor name, e.g. `"enum"`.
    pub name: String,
    /// Descriptor parameters in key order.
    pub params: BTreeMap<String, String>,
}

impl TypeDescriptor {
    /// Creates a descriptor with no parameters.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        TypeDescriptor {
            name: name.into(),
            params: BTreeMap::new(),
        }
    }

    /// Adds a parameter.
    #[must_use]
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }
}

/// Final type attached to a node after cast resolution.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResolvedType {
    /// A recognized builtin.
    Builtin(DataType),
    /// A list whose elements are of the builtin type.
    Array(DataType),
    /// An opaque descriptor.
    Parameterized(TypeDescriptor),
}

impl fmt::Display for ResolvedType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolvedType::Builtin(t) => write!(f, "{t}"),
            ResolvedType::Array(t) => write!(f, "{{array,{t}}}"),
            ResolvedType::Parameterized(d) => {
                write!(f, "{}(", d.name)?;
                for (i, (k, v)) in d.params.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{k}={v}")?;
                }
                f.write_str(")")
            }
        }
    }
}

/// Literal and parameter value container.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// Null value.
    Null,
    /// Boolean value.
    Bool(bool),
    /// 64-bit signed integer value.
    Integer(i64),
    /// 64-bit floating point value.
    Float(f64),
    /// Decimal kept in its textual form.
    Decimal(String),
    /// String value.
    String(String),
    /// Byte string.
    Binary(Vec<u8>),
    /// Date value (days since Unix epoch).
    Date(i32),
    /// Time of day (microseconds since midnight).
    Time(i64),
    /// Timestamp value (microseconds since Unix epoch).
    Timestamp(i64),
    /// Ordered list of values.
    List(Vec<Value>),
    /// String-keyed document.
    Map(BTreeMap<String, Value>),
}

impl Value {
    /// Returns true if this value is null.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Attempts to extract a string reference.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Attempts to extract the list elements.
    #[must_use]
    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    /// Returns the natural builtin type of this value, or `None` for null,
    /// lists and maps whose element types are not uniform.
    #[must_use]
    pub fn data_type(&self) -> Option<DataType> {
        match self {
            Value::Null | Value::List(_) => None,
            Value::Bool(_) => Some(DataType::Boolean),
            Value::Integer(_) => Some(DataType::Integer),
            Value::Float(_) => Some(DataType::Float),
            Value::Decimal(_) => Some(DataType::Decimal),
            Value::String(_) => Some(DataType::String),
            Value::Binary(_) => Some(DataType::Binary),
            Value::Date(_) => Some(DataType::Date),
            Value::Time(_) => Some(DataType::Time),
            Value::Timestamp(_) => Some(DataType::NaiveDatetime),
            Value::Map(_) => Some(DataType::Map),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("nil"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Integer(i) => write!(f, "{i}"),
            Value::Float(v) => write!(f, "{v:?}"),
            Value::Decimal(d) => write!(f, "{d}d"),
            Value::String(s) => write!(f, "{s:?}"),
            Value::Binary(bytes) => {
                f.write_str("<<")?;
                for (i, b) in bytes.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{b}")?;
                }
                f.write_str(">>")
            }
            Value::Date(d) => write!(f, "date:{d}"),
            Value::Time(t) => write!(f, "time:{t}"),
            Value::Timestamp(t) => write!(f, "ts:{t}"),
            Value::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
            Value::Map(entries) => {
                f.write_str("%{")?;
                for (i, (k, v)) in entries.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{k:?}=>{v}")?;
                }
                f.write_str("}")
            }
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::List(v.into_iter().map(Into::into).collect())
    }
}
