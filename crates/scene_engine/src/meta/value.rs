//! Dynamically typed values flowing through property and method access

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::foundation::collections::NodeId;

/// A dynamically typed value
///
/// Every `get`/`set`/`call` that is resolved by name exchanges `Value`s, so
/// callers never need to know the concrete type behind a node.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub enum Value {
    /// Absence of a value
    #[default]
    Nil,
    /// Boolean
    Bool(bool),
    /// Signed integer
    Int(i64),
    /// Floating point number
    Float(f64),
    /// UTF-8 string
    Str(String),
    /// 2D vector
    Vec2(f64, f64),
    /// Reference to a node; never persisted
    #[serde(skip)]
    Node(NodeId),
    /// Ordered list of values
    Array(Vec<Value>),
    /// String-keyed map of values
    Dict(BTreeMap<String, Value>),
}

/// Type tag of a [`Value`], used for property and parameter schemas
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueKind {
    /// Accepts any value
    Variant,
    /// [`Value::Nil`]
    Nil,
    /// [`Value::Bool`]
    Bool,
    /// [`Value::Int`]
    Int,
    /// [`Value::Float`]; integers are accepted too
    Float,
    /// [`Value::Str`]
    Str,
    /// [`Value::Vec2`]
    Vec2,
    /// [`Value::Node`]; `Nil` is accepted as the empty reference
    Node,
    /// [`Value::Array`]
    Array,
    /// [`Value::Dict`]
    Dict,
}

impl ValueKind {
    /// Whether a value satisfies this schema
    pub fn accepts(self, value: &Value) -> bool {
        match (self, value) {
            (Self::Variant, _) => true,
            (Self::Float, Value::Int(_)) => true,
            (Self::Node, Value::Nil) => true,
            (kind, value) => kind == value.kind(),
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Variant => "Variant",
            Self::Nil => "Nil",
            Self::Bool => "Bool",
            Self::Int => "Int",
            Self::Float => "Float",
            Self::Str => "Str",
            Self::Vec2 => "Vec2",
            Self::Node => "Node",
            Self::Array => "Array",
            Self::Dict => "Dict",
        };
        f.write_str(name)
    }
}

impl Value {
    /// Type tag of this value
    pub fn kind(&self) -> ValueKind {
        match self {
            Self::Nil => ValueKind::Nil,
            Self::Bool(_) => ValueKind::Bool,
            Self::Int(_) => ValueKind::Int,
            Self::Float(_) => ValueKind::Float,
            Self::Str(_) => ValueKind::Str,
            Self::Vec2(..) => ValueKind::Vec2,
            Self::Node(_) => ValueKind::Node,
            Self::Array(_) => ValueKind::Array,
            Self::Dict(_) => ValueKind::Dict,
        }
    }

    /// Whether this is [`Value::Nil`]
    pub fn is_nil(&self) -> bool {
        matches!(self, Self::Nil)
    }

    /// Boolean payload
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Integer payload
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Float payload, widening integers
    #[allow(clippy::cast_precision_loss)]
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(f) => Some(*f),
            Self::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// String payload
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Node reference payload
    pub fn as_node(&self) -> Option<NodeId> {
        match self {
            Self::Node(id) => Some(*id),
            _ => None,
        }
    }

    /// Array payload
    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Self::Array(items) => Some(items),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Nil => f.write_str("nil"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::Str(s) => write!(f, "{s:?}"),
            Self::Vec2(x, y) => write!(f, "({x}, {y})"),
            Self::Node(id) => write!(f, "{id:?}"),
            Self::Array(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
            Self::Dict(map) => {
                f.write_str("{")?;
                for (i, (key, item)) in map.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{key}: {item}")?;
                }
                f.write_str("}")
            }
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<NodeId> for Value {
    fn from(value: NodeId) -> Self {
        Self::Node(value)
    }
}

impl From<Vec<Value>> for Value {
    fn from(value: Vec<Value>) -> Self {
        Self::Array(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_acceptance() {
        assert!(ValueKind::Variant.accepts(&Value::Str("x".into())));
        assert!(ValueKind::Float.accepts(&Value::Int(3)));
        assert!(!ValueKind::Int.accepts(&Value::Float(3.0)));
        assert!(ValueKind::Node.accepts(&Value::Nil));
        assert!(!ValueKind::Bool.accepts(&Value::Nil));
    }

    #[test]
    fn test_ron_representation() {
        let value = Value::Array(vec![Value::Int(1), Value::from("two"), Value::Vec2(1.0, 2.5)]);
        let text = ron::to_string(&value).unwrap();
        let parsed: Value = ron::from_str(&text).unwrap();
        assert_eq!(parsed, value);

        let parsed: Value = ron::from_str("Float(0.5)").unwrap();
        assert_eq!(parsed.as_float(), Some(0.5));
    }

    #[test]
    fn test_display() {
        let mut map = BTreeMap::new();
        map.insert("hp".to_string(), Value::Int(10));
        assert_eq!(Value::Dict(map).to_string(), "{hp: 10}");
        assert_eq!(Value::Nil.to_string(), "nil");
    }
}
