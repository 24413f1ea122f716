//! SQLite data bridge
//!
//! Implements the Node operation contract used by record encoders and
//! decoders. Intermediate Node manipulation is pure in-memory tree work;
//! the relational engine is only touched at the persistence boundary
//! (`read_row` on the decode side, `stage` on the encode side).

use rusqlite::types::{Value, ValueRef};
use tracing::debug;

use super::staging::{adapter_error, quote_ident, StagingRelation, StagingStore, STAGING_TABLE};
use crate::node::{Node, Number, Primitive};
use crate::{Error, Result};

/// Single-pass sequence of (key, value) pairs drained from a Map Node.
///
/// Taking the source Node by value makes the cursor-consumption rule a
/// type-level fact: once iterated, the entries can only be re-read by
/// re-materializing from the original source.
pub struct MapEntries {
    inner: std::vec::IntoIter<(String, Node)>,
}

impl Iterator for MapEntries {
    type Item = (Node, Node);

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(key, value)| (Node::String(key), value))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl ExactSizeIterator for MapEntries {
    fn len(&self) -> usize {
        self.inner.len()
    }
}

/// Bridge between the Node value model and a SQLite store.
///
/// Owns the location of the auxiliary staging database; the primary store
/// is never touched by the bridge itself - callers run their own
/// statements and hand rows to `read_row`.
pub struct SqliteBridge {
    staging: StagingStore,
}

impl SqliteBridge {
    /// Create a bridge staging through the database file at `staging_path`
    pub fn new(staging_path: impl Into<std::path::PathBuf>) -> Self {
        Self {
            staging: StagingStore::new(staging_path),
        }
    }

    /// The auxiliary staging store this bridge stages through
    pub fn staging(&self) -> &StagingStore {
        &self.staging
    }

    // ========== Node Operations ==========

    /// The canonical empty Node; allocates nothing
    pub fn empty(&self) -> Node {
        Node::Empty
    }

    /// Create a primitive Node, typed by inferred kind (integer/real/text)
    pub fn create_primitive(&self, value: impl Into<Primitive>) -> Node {
        Node::from(value.into())
    }

    /// Extract the last typed cell reachable from a Node.
    ///
    /// Maps are scanned in reverse insertion order, so the most recently
    /// written column wins. Fails with `ValueNotFound` when no typed cell
    /// exists.
    pub fn get_primitive(&self, node: &Node) -> Result<Primitive> {
        node.primitive().ok_or(Error::ValueNotFound)
    }

    /// Merge a key/value pair into a map, producing a new Map Node.
    ///
    /// Existing entries are carried over; a duplicate key overwrites the
    /// previous value in place (last write wins) while keeping the
    /// column's original position. The key must be a String Node.
    pub fn merge_into_map(&self, map: Node, key: Node, value: Node) -> Result<Node> {
        let key = match key {
            Node::String(key) => key,
            other => {
                return Err(Error::Decode(format!(
                    "map key must be a string node, got {}",
                    other.kind()
                )))
            }
        };
        let mut entries = match map {
            Node::Empty => Vec::new(),
            Node::Map(entries) => entries,
            other => {
                return Err(Error::Decode(format!(
                    "cannot merge key '{}' into {} node",
                    key,
                    other.kind()
                )))
            }
        };
        match entries.iter_mut().find(|(existing, _)| *existing == key) {
            Some((_, slot)) => *slot = value,
            None => entries.push((key, value)),
        }
        Ok(Node::Map(entries))
    }

    /// Drain a Map Node into a single-pass (key, value) sequence.
    ///
    /// One pair per column, in insertion order. An empty Node yields an
    /// empty sequence.
    pub fn map_entries(&self, node: Node) -> Result<MapEntries> {
        let entries = match node {
            Node::Empty => Vec::new(),
            Node::Map(entries) => entries,
            other => {
                return Err(Error::Decode(format!(
                    "expected a map node, got {}",
                    other.kind()
                )))
            }
        };
        Ok(MapEntries {
            inner: entries.into_iter(),
        })
    }

    /// Build a Map Node by folding `merge_into_map` over the entries in
    /// iteration order
    pub fn create_map(&self, entries: impl IntoIterator<Item = (Node, Node)>) -> Result<Node> {
        let mut map = self.empty();
        for (key, value) in entries {
            map = self.merge_into_map(map, key, value)?;
        }
        Ok(map)
    }

    /// Produce a new Map Node containing every column except `key`.
    ///
    /// The map is rebuilt rather than mutated; an in-place column drop is
    /// not assumed to exist in the backing engine. Removing from an empty
    /// Node yields the empty Node.
    pub fn remove_key(&self, node: Node, key: &str) -> Result<Node> {
        match node {
            Node::Empty => Ok(Node::Empty),
            Node::Map(entries) => Ok(Node::Map(
                entries
                    .into_iter()
                    .filter(|(existing, _)| existing != key)
                    .collect(),
            )),
            other => Err(Error::Decode(format!(
                "cannot remove key '{}' from {} node",
                key,
                other.kind()
            ))),
        }
    }

    /// List encoding is not part of the persistence contract; callers get
    /// the empty Node back
    pub fn create_list(&self, _items: impl IntoIterator<Item = Node>) -> Node {
        Node::Empty
    }

    /// See `create_list`
    pub fn merge_into_list(&self, _list: Node, _value: Node) -> Node {
        Node::Empty
    }

    // ========== Persistence Boundary ==========

    /// Materialize one result row as a Map Node, one entry per column.
    ///
    /// NULL cells become Empty, INTEGER and REAL cells become Numbers,
    /// TEXT cells become Strings. BLOB cells have no Node shape and are a
    /// decode error.
    pub fn read_row(row: &rusqlite::Row) -> Result<Node> {
        let column_count = row.as_ref().column_count();
        let mut entries = Vec::with_capacity(column_count);
        for index in 0..column_count {
            let name = row.as_ref().column_name(index)?.to_string();
            let value = match row.get_ref(index)? {
                ValueRef::Null => Node::Empty,
                ValueRef::Integer(i) => Node::Number(Number::Int(i)),
                ValueRef::Real(r) => Node::Number(Number::Real(r)),
                ValueRef::Text(text) => Node::String(
                    std::str::from_utf8(text)
                        .map_err(|err| Error::Decode(format!("column '{}' is not UTF-8: {}", name, err)))?
                        .to_string(),
                ),
                ValueRef::Blob(_) => {
                    return Err(Error::Decode(format!(
                        "column '{}' holds a BLOB, which has no node shape",
                        name
                    )))
                }
            };
            entries.push((name, value));
        }
        Ok(Node::Map(entries))
    }

    /// Round-trip a Node through a fresh staging relation.
    ///
    /// A Map stages as one dynamically-columned row and comes back typed
    /// exactly as the engine stores it; a primitive stages as a single
    /// `value` column. The staging relation is dropped and the staging
    /// database deleted on every exit path, success or failure.
    pub fn stage(&self, node: &Node) -> Result<Node> {
        let result = match node {
            Node::Empty => return Ok(Node::Empty),
            Node::Map(entries) => self.stage_row(entries),
            Node::Number(_) | Node::String(_) => {
                self.stage_row(&[("value".to_string(), node.clone())])
                    .map(|staged| match staged {
                        Node::Map(entries) => entries
                            .into_iter()
                            .map(|(_, value)| value)
                            .next()
                            .unwrap_or(Node::Empty),
                        other => other,
                    })
            }
            Node::List(_) => Err(Error::Decode(
                "list persistence through the bridge is not supported".to_string(),
            )),
        };
        self.staging.remove();
        result
    }

    /// Stage one row: create the relation, add a column per key, insert,
    /// select the row back and materialize it
    fn stage_row(&self, entries: &[(String, Node)]) -> Result<Node> {
        let conn = self.staging.connect()?;
        let relation = StagingRelation::create(&conn)?;
        debug!(columns = entries.len(), "Staging row");

        let mut columns = Vec::with_capacity(entries.len());
        let mut cells: Vec<Value> = Vec::with_capacity(entries.len());
        for (key, value) in entries {
            relation.add_column(key, cell_type(key, value)?)?;
            columns.push(quote_ident(key));
            cells.push(cell_value(value));
        }

        if columns.is_empty() {
            drop(relation);
            return Ok(Node::Map(Vec::new()));
        }

        let placeholders = (1..=cells.len())
            .map(|i| format!("?{}", i))
            .collect::<Vec<_>>()
            .join(", ");
        conn.execute(
            &format!(
                "REPLACE INTO {} (_staging_row, {}) VALUES (0, {})",
                STAGING_TABLE,
                columns.join(", "),
                placeholders
            ),
            rusqlite::params_from_iter(cells),
        )
        .map_err(adapter_error)?;

        let node = {
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT {} FROM {}",
                    columns.join(", "),
                    STAGING_TABLE
                ))
                .map_err(adapter_error)?;
            let mut rows = stmt.query([]).map_err(adapter_error)?;
            let row = rows
                .next()
                .map_err(adapter_error)?
                .ok_or_else(|| Error::Adapter("staged row did not come back".to_string()))?;
            Self::read_row(row).map_err(|err| match err {
                Error::Storage(inner) => adapter_error(inner),
                other => other,
            })?
        };
        drop(relation);
        Ok(node)
    }
}

/// Column type for a cell value; containers cannot stage as cells
fn cell_type(key: &str, value: &Node) -> Result<Option<&'static str>> {
    match value {
        Node::Empty => Ok(None),
        Node::Number(n) => Ok(Some(n.column_type())),
        Node::String(_) => Ok(Some("TEXT")),
        Node::List(_) | Node::Map(_) => Err(Error::Decode(format!(
            "column '{}' holds a {}, which cannot stage as a cell",
            key,
            value.kind()
        ))),
    }
}

/// SQL parameter for a cell value; callers have already rejected containers
fn cell_value(value: &Node) -> Value {
    match value {
        Node::Number(Number::Int(i)) => Value::Integer(*i),
        Node::Number(Number::Real(r)) => Value::Real(*r),
        Node::String(s) => Value::Text(s.clone()),
        _ => Value::Null,
    }
}
