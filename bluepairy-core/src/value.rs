/*!
 * Property values
 * The subset of bus value kinds BlueZ uses for adapter and device properties
 */

use std::fmt;

/// One decoded property value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Bool(bool),
    Str(String),
    ObjectPath(String),
    StrArray(Vec<String>),
    /// Any other wire type, kept only by its signature.
    Unsupported(String),
}

/// Property name to value pairs for one interface of one object.
pub type PropertyList = Vec<(String, Value)>;

impl Value {
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Bool(_) => "boolean",
            Value::Str(_) => "string",
            Value::ObjectPath(_) => "object path",
            Value::StrArray(_) => "string array",
            Value::Unsupported(_) => "unsupported",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{}", b),
            Value::Str(s) => write!(f, "{:?}", s),
            Value::ObjectPath(p) => write!(f, "{}", p),
            Value::StrArray(items) => write!(f, "[{}]", items.join(", ")),
            Value::Unsupported(sig) => write!(f, "<{}>", sig),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}
