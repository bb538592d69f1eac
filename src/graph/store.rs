//! Property-graph store on SQLite.
//!
//! One write connection behind a mutex is the single serialization point
//! for upserts; reads go through a pooled set of connections and may
//! observe a partially-imported batch. That weak-consistency boundary is
//! deliberate: node property merges and edge weight upserts commute, so no
//! cross-file write ordering is required.

use crate::error::CoreError;
use crate::model::{EdgeKind, GraphEdge, GraphNode, GraphOverview, NodeKind};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::migrations;
use crate::config::Config;

/// Immutable node upsert message. Properties merge by key on conflict.
#[derive(Debug, Clone)]
pub struct NodeDelta {
    pub id: String,
    pub label: String,
    pub kind: NodeKind,
    pub properties: serde_json::Map<String, Value>,
}

/// Immutable edge upsert message. (source, target, kind) is the identity;
/// a repeated insert updates the weight instead of duplicating the edge.
#[derive(Debug, Clone)]
pub struct EdgeDelta {
    pub source: String,
    pub target: String,
    pub kind: EdgeKind,
    pub weight: Option<f64>,
    pub properties: serde_json::Map<String, Value>,
}

#[derive(Debug)]
struct ConnectionCustomizer;

impl r2d2::CustomizeConnection<Connection, rusqlite::Error> for ConnectionCustomizer {
    fn on_acquire(&self, conn: &mut Connection) -> Result<(), rusqlite::Error> {
        conn.busy_timeout(Duration::from_secs(30))?;
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            ",
        )?;
        Ok(())
    }

    fn on_release(&self, _conn: Connection) {}
}

pub struct GraphStore {
    db_path: PathBuf,
    write_conn: Arc<Mutex<Connection>>,
    read_pool: Pool<SqliteConnectionManager>,
}

impl GraphStore {
    pub fn new(db_path: &Path) -> Result<Self, CoreError> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| CoreError::StoreDir {
                path: parent.display().to_string(),
                source,
            })?;
        }

        let config = Config::get();

        let write_conn = Connection::open(db_path)?;
        write_conn.busy_timeout(Duration::from_secs(30))?;
        write_conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            ",
        )?;
        migrations::migrate(&write_conn)?;

        let write_conn = Arc::new(Mutex::new(write_conn));

        let manager = SqliteConnectionManager::file(db_path);
        let read_pool = Pool::builder()
            .max_size(config.pool_size)
            .min_idle(Some(config.pool_min_idle))
            .connection_timeout(Duration::from_secs(30))
            .connection_customizer(Box::new(ConnectionCustomizer))
            .build(manager)?;

        Ok(Self {
            db_path: db_path.to_path_buf(),
            write_conn,
            read_pool,
        })
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    fn read_conn(
        &self,
    ) -> Result<r2d2::PooledConnection<SqliteConnectionManager>, CoreError> {
        Ok(self.read_pool.get()?)
    }

    fn conn(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.write_conn.lock().unwrap()
    }

    fn now() -> i64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs() as i64
    }

    pub fn upsert_node(&self, delta: &NodeDelta) -> Result<(), CoreError> {
        self.upsert_nodes(std::slice::from_ref(delta)).map(|_| ())
    }

    /// Apply node deltas in one transaction. On conflict the property bag
    /// merges: new values overwrite same-named keys, unrelated keys stay.
    pub fn upsert_nodes(&self, deltas: &[NodeDelta]) -> Result<usize, CoreError> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let now = Self::now();
        {
            let mut stmt = tx.prepare(
                "INSERT INTO nodes (id, label, kind, properties, created, updated)
                 VALUES (?, ?, ?, ?, ?, ?)
                 ON CONFLICT(id) DO UPDATE SET
                    label = excluded.label,
                    kind = excluded.kind,
                    properties = json_patch(nodes.properties, excluded.properties),
                    updated = excluded.updated",
            )?;
            for delta in deltas {
                let properties = Value::Object(delta.properties.clone()).to_string();
                stmt.execute(params![
                    delta.id,
                    delta.label,
                    delta.kind.as_str(),
                    properties,
                    now,
                    now
                ])?;
            }
        }
        tx.commit()?;
        Ok(deltas.len())
    }

    pub fn upsert_edge(&self, delta: &EdgeDelta) -> Result<(), CoreError> {
        self.upsert_edges(std::slice::from_ref(delta)).map(|_| ())
    }

    /// Apply edge deltas in one transaction, idempotently: re-inserting an
    /// existing (source, target, kind) updates its weight and merges its
    /// properties rather than duplicating the edge.
    pub fn upsert_edges(&self, deltas: &[EdgeDelta]) -> Result<usize, CoreError> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let now = Self::now();
        {
            let mut stmt = tx.prepare(
                "INSERT INTO edges (source, target, kind, weight, properties, created, updated)
                 VALUES (?, ?, ?, ?, ?, ?, ?)
                 ON CONFLICT(source, target, kind) DO UPDATE SET
                    weight = COALESCE(excluded.weight, edges.weight),
                    properties = json_patch(edges.properties, excluded.properties),
                    updated = excluded.updated",
            )?;
            for delta in deltas {
                let properties = Value::Object(delta.properties.clone()).to_string();
                stmt.execute(params![
                    delta.source,
                    delta.target,
                    delta.kind.as_str(),
                    delta.weight,
                    properties,
                    now,
                    now
                ])?;
            }
        }
        tx.commit()?;
        Ok(deltas.len())
    }

    pub fn node(&self, id: &str) -> Result<Option<GraphNode>, CoreError> {
        let conn = self.read_conn()?;
        let node = conn
            .query_row(
                "SELECT id, label, kind, properties FROM nodes WHERE id = ?",
                params![id],
                node_from_row,
            )
            .optional()?;
        Ok(node.flatten())
    }

    pub fn nodes_by_ids(&self, ids: &[String]) -> Result<Vec<GraphNode>, CoreError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let conn = self.read_conn()?;
        let placeholders = vec!["?"; ids.len()].join(",");
        let sql = format!(
            "SELECT id, label, kind, properties FROM nodes WHERE id IN ({placeholders}) ORDER BY id"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(rusqlite::params_from_iter(ids.iter()), node_from_row)?;
        let mut nodes = Vec::new();
        for row in rows {
            if let Some(node) = row? {
                nodes.push(node);
            }
        }
        Ok(nodes)
    }

    /// Incoming edges of the given kinds whose target is in `ids`, in
    /// insertion order.
    pub fn incoming_edges(
        &self,
        ids: &[String],
        kinds: &[EdgeKind],
    ) -> Result<Vec<GraphEdge>, CoreError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let conn = self.read_conn()?;
        let id_marks = vec!["?"; ids.len()].join(",");
        let kind_marks = vec!["?"; kinds.len()].join(",");
        let sql = format!(
            "SELECT id, source, target, kind, weight, properties
             FROM edges
             WHERE target IN ({id_marks}) AND kind IN ({kind_marks})
             ORDER BY id"
        );
        let mut stmt = conn.prepare(&sql)?;
        let args: Vec<String> = ids
            .iter()
            .cloned()
            .chain(kinds.iter().map(|k| k.as_str().to_string()))
            .collect();
        collect_edges(stmt.query_map(rusqlite::params_from_iter(args.iter()), edge_from_row)?)
    }

    /// All outgoing edges of a node, any kind, in insertion order.
    pub fn outgoing_edges(&self, id: &str) -> Result<Vec<GraphEdge>, CoreError> {
        let conn = self.read_conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, source, target, kind, weight, properties
             FROM edges WHERE source = ? ORDER BY id",
        )?;
        collect_edges(stmt.query_map(params![id], edge_from_row)?)
    }

    /// Full-graph scan of edges restricted to the given kinds, in
    /// insertion order. Backs the cycle detector.
    pub fn edges_of_kinds(&self, kinds: &[EdgeKind]) -> Result<Vec<GraphEdge>, CoreError> {
        let conn = self.read_conn()?;
        let kind_marks = vec!["?"; kinds.len()].join(",");
        let sql = format!(
            "SELECT id, source, target, kind, weight, properties
             FROM edges WHERE kind IN ({kind_marks}) ORDER BY id"
        );
        let mut stmt = conn.prepare(&sql)?;
        let args: Vec<String> = kinds.iter().map(|k| k.as_str().to_string()).collect();
        collect_edges(stmt.query_map(rusqlite::params_from_iter(args.iter()), edge_from_row)?)
    }

    /// Every edge, in insertion order.
    pub fn all_edges(&self) -> Result<Vec<GraphEdge>, CoreError> {
        let conn = self.read_conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, source, target, kind, weight, properties FROM edges ORDER BY id",
        )?;
        collect_edges(stmt.query_map([], edge_from_row)?)
    }

    /// Edges of the given kinds with both endpoints inside `ids`, for
    /// induced subgraphs.
    pub fn edges_among(
        &self,
        ids: &[String],
        kinds: &[EdgeKind],
    ) -> Result<Vec<GraphEdge>, CoreError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let conn = self.read_conn()?;
        let id_marks = vec!["?"; ids.len()].join(",");
        let kind_marks = vec!["?"; kinds.len()].join(",");
        let sql = format!(
            "SELECT id, source, target, kind, weight, properties
             FROM edges
             WHERE source IN ({id_marks}) AND target IN ({id_marks}) AND kind IN ({kind_marks})
             ORDER BY id"
        );
        let mut stmt = conn.prepare(&sql)?;
        let args: Vec<String> = ids
            .iter()
            .cloned()
            .chain(ids.iter().cloned())
            .chain(kinds.iter().map(|k| k.as_str().to_string()))
            .collect();
        collect_edges(stmt.query_map(rusqlite::params_from_iter(args.iter()), edge_from_row)?)
    }

    pub fn overview(&self) -> Result<GraphOverview, CoreError> {
        let conn = self.read_conn()?;
        let nodes: i64 = conn.query_row("SELECT COUNT(*) FROM nodes", [], |row| row.get(0))?;
        let edges: i64 = conn.query_row("SELECT COUNT(*) FROM edges", [], |row| row.get(0))?;

        let mut nodes_by_kind = BTreeMap::new();
        let mut stmt = conn.prepare("SELECT kind, COUNT(*) FROM nodes GROUP BY kind")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;
        for row in rows {
            let (kind, count) = row?;
            nodes_by_kind.insert(kind, count);
        }

        let mut edges_by_kind = BTreeMap::new();
        let mut stmt = conn.prepare("SELECT kind, COUNT(*) FROM edges GROUP BY kind")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;
        for row in rows {
            let (kind, count) = row?;
            edges_by_kind.insert(kind, count);
        }

        Ok(GraphOverview {
            nodes,
            edges,
            nodes_by_kind,
            edges_by_kind,
        })
    }

    /// All node ids, sorted. Intended for idempotence checks and tooling.
    pub fn node_ids(&self) -> Result<Vec<String>, CoreError> {
        let conn = self.read_conn()?;
        let mut stmt = conn.prepare("SELECT id FROM nodes ORDER BY id")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut ids = Vec::new();
        for row in rows {
            ids.push(row?);
        }
        Ok(ids)
    }

    /// (source, target, kind, weight) tuples, sorted. Intended for
    /// idempotence checks and tooling.
    pub fn edge_rows(&self) -> Result<Vec<(String, String, String, Option<f64>)>, CoreError> {
        let conn = self.read_conn()?;
        let mut stmt = conn.prepare(
            "SELECT source, target, kind, weight FROM edges ORDER BY source, target, kind",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, Option<f64>>(3)?,
            ))
        })?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// Explicit cleanup of everything a superseded file version produced:
    /// the file node, its contained symbols, its query nodes, and every
    /// edge touching them.
    pub fn prune_file(&self, rel_path: &str) -> Result<usize, CoreError> {
        let ids: Vec<String> = {
            let conn = self.read_conn()?;
            let mut stmt = conn.prepare(
                "SELECT id FROM nodes
                 WHERE id = ?1 OR id LIKE ?1 || '::%'
                    OR (kind = 'QUERY' AND json_extract(properties, '$.file') = ?1)",
            )?;
            let rows = stmt.query_map(params![rel_path], |row| row.get::<_, String>(0))?;
            let mut ids = Vec::new();
            for row in rows {
                ids.push(row?);
            }
            ids
        };
        if ids.is_empty() {
            return Ok(0);
        }
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let marks = vec!["?"; ids.len()].join(",");
        tx.execute(
            &format!("DELETE FROM edges WHERE source IN ({marks}) OR target IN ({marks})"),
            rusqlite::params_from_iter(ids.iter().chain(ids.iter())),
        )?;
        tx.execute(
            &format!("DELETE FROM nodes WHERE id IN ({marks})"),
            rusqlite::params_from_iter(ids.iter()),
        )?;
        tx.commit()?;
        Ok(ids.len())
    }
}

fn node_from_row(row: &Row<'_>) -> rusqlite::Result<Option<GraphNode>> {
    let kind_raw: String = row.get(2)?;
    let Some(kind) = NodeKind::parse(&kind_raw) else {
        return Ok(None);
    };
    let properties: String = row.get(3)?;
    Ok(Some(GraphNode {
        id: row.get(0)?,
        label: row.get(1)?,
        kind,
        properties: parse_properties(&properties),
    }))
}

fn edge_from_row(row: &Row<'_>) -> rusqlite::Result<Option<GraphEdge>> {
    let kind_raw: String = row.get(3)?;
    let Some(kind) = EdgeKind::parse(&kind_raw) else {
        return Ok(None);
    };
    let properties: String = row.get(5)?;
    Ok(Some(GraphEdge {
        id: row.get(0)?,
        source: row.get(1)?,
        target: row.get(2)?,
        kind,
        weight: row.get(4)?,
        properties: parse_properties(&properties),
    }))
}

fn parse_properties(raw: &str) -> serde_json::Map<String, Value> {
    serde_json::from_str(raw).unwrap_or_default()
}

fn collect_edges<I>(rows: I) -> Result<Vec<GraphEdge>, CoreError>
where
    I: Iterator<Item = rusqlite::Result<Option<GraphEdge>>>,
{
    let mut edges = Vec::new();
    for row in rows {
        if let Some(edge) = row? {
            edges.push(edge);
        }
    }
    Ok(edges)
}
