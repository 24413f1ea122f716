//! Node types - the universal tagged value model
//!
//! All record encoders and decoders operate on five universal value shapes:
//! - `Empty`: absence of a value (a NULL cell)
//! - `Number`: integer or real, typed by inferred storage kind
//! - `String`: text
//! - `List`: ordered sequence of Nodes
//! - `Map`: insertion-ordered mapping of String keys to Nodes

/// A numeric value with its inferred storage kind.
///
/// A whole-valued real collapses to `Int` so that the column type chosen
/// for it is INTEGER rather than REAL.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Number {
    Int(i64),
    Real(f64),
}

impl Number {
    /// Build a number from a real, collapsing whole values to `Int`
    pub fn from_f64(value: f64) -> Self {
        if value.fract() == 0.0 && value.is_finite() {
            Number::Int(value as i64)
        } else {
            Number::Real(value)
        }
    }

    /// The SQLite column type this number stores as
    pub fn column_type(&self) -> &'static str {
        match self {
            Number::Int(_) => "INTEGER",
            Number::Real(_) => "REAL",
        }
    }
}

/// A primitive value as accepted and produced by the bridge.
///
/// This is the payload of `create_primitive` and `get_primitive`; the
/// variant determines the inferred column type (INTEGER/REAL/TEXT).
#[derive(Debug, Clone, PartialEq)]
pub enum Primitive {
    Int(i64),
    Real(f64),
    Text(String),
}

impl From<i64> for Primitive {
    fn from(value: i64) -> Self {
        Primitive::Int(value)
    }
}

impl From<i32> for Primitive {
    fn from(value: i32) -> Self {
        Primitive::Int(value as i64)
    }
}

impl From<f64> for Primitive {
    fn from(value: f64) -> Self {
        match Number::from_f64(value) {
            Number::Int(i) => Primitive::Int(i),
            Number::Real(r) => Primitive::Real(r),
        }
    }
}

impl From<&str> for Primitive {
    fn from(value: &str) -> Self {
        Primitive::Text(value.to_string())
    }
}

impl From<String> for Primitive {
    fn from(value: String) -> Self {
        Primitive::Text(value)
    }
}

/// The kind of a Node, used in diagnostics and shape errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Empty,
    Number,
    String,
    List,
    Map,
}

impl NodeKind {
    /// Get the string representation of the node kind
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::Empty => "empty",
            NodeKind::Number => "number",
            NodeKind::String => "string",
            NodeKind::List => "list",
            NodeKind::Map => "map",
        }
    }
}

impl std::fmt::Display for NodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A tagged value in the universal tree model.
///
/// Nodes own their data outright: a Node produced by one operation can be
/// moved into the next without referencing any live cursor. Map entries
/// preserve insertion order and keep keys unique.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    /// Absence of a value; also what a NULL cell materializes as
    Empty,
    /// Integer or real, typed by inferred storage kind
    Number(Number),
    /// Text value
    String(String),
    /// Ordered sequence of Nodes
    List(Vec<Node>),
    /// Insertion-ordered map of unique String keys to Nodes
    Map(Vec<(String, Node)>),
}

impl Node {
    /// The kind of this node
    pub fn kind(&self) -> NodeKind {
        match self {
            Node::Empty => NodeKind::Empty,
            Node::Number(_) => NodeKind::Number,
            Node::String(_) => NodeKind::String,
            Node::List(_) => NodeKind::List,
            Node::Map(_) => NodeKind::Map,
        }
    }

    /// Check whether this node is the canonical empty value
    pub fn is_empty(&self) -> bool {
        matches!(self, Node::Empty)
    }

    /// Scan for the last typed cell reachable from this node.
    ///
    /// A Number or String is its own cell. A Map is scanned in reverse
    /// insertion order, the most recently written column winning. Empty
    /// and List carry no typed cell.
    pub fn primitive(&self) -> Option<Primitive> {
        match self {
            Node::Empty => None,
            Node::Number(Number::Int(i)) => Some(Primitive::Int(*i)),
            Node::Number(Number::Real(r)) => Some(Primitive::Real(*r)),
            Node::String(s) => Some(Primitive::Text(s.clone())),
            Node::List(_) => None,
            Node::Map(entries) => entries.iter().rev().find_map(|(_, value)| value.primitive()),
        }
    }

}

impl From<Primitive> for Node {
    fn from(value: Primitive) -> Self {
        match value {
            Primitive::Int(i) => Node::Number(Number::Int(i)),
            Primitive::Real(r) => Node::Number(Number::Real(r)),
            Primitive::Text(s) => Node::String(s),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_whole_real_collapses_to_int() {
        assert_eq!(Number::from_f64(3.0), Number::Int(3));
        assert_eq!(Number::from_f64(3.5), Number::Real(3.5));
        assert_eq!(Primitive::from(2.0), Primitive::Int(2));
    }

    #[test]
    fn test_column_type_by_kind() {
        assert_eq!(Number::Int(1).column_type(), "INTEGER");
        assert_eq!(Number::Real(1.5).column_type(), "REAL");
    }

    #[test]
    fn test_primitive_scan_on_scalars() {
        assert_eq!(Node::Empty.primitive(), None);
        assert_eq!(
            Node::Number(Number::Int(7)).primitive(),
            Some(Primitive::Int(7))
        );
        assert_eq!(
            Node::String("x".to_string()).primitive(),
            Some(Primitive::Text("x".to_string()))
        );
    }

    #[test]
    fn test_primitive_scan_takes_last_typed_cell() {
        let map = Node::Map(vec![
            ("a".to_string(), Node::Number(Number::Int(1))),
            ("b".to_string(), Node::Empty),
            ("c".to_string(), Node::String("last".to_string())),
            ("d".to_string(), Node::Empty),
        ]);
        assert_eq!(map.primitive(), Some(Primitive::Text("last".to_string())));
    }

    #[test]
    fn test_primitive_scan_empty_map() {
        let map = Node::Map(vec![("a".to_string(), Node::Empty)]);
        assert_eq!(map.primitive(), None);
    }

    #[test]
    fn test_node_kind_strings() {
        assert_eq!(Node::Empty.kind().as_str(), "empty");
        assert_eq!(Node::Map(Vec::new()).kind().as_str(), "map");
        assert_eq!(Node::List(Vec::new()).kind().to_string(), "list");
    }
}
