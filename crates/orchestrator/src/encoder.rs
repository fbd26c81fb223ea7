//! Canonical graph encoding.
//!
//! The engine reads exactly one format: a first line holding the vertex count
//! `N`, followed by one `src dst` pair per line. Everything the service accepts
//! (uploaded edge lists, interactive JSON payloads) is normalized into a
//! [`CanonicalGraph`] before it reaches the engine.

use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;
use std::io::{self, Write};
use std::path::Path;

use crate::error::{OrchestratorError, Result};

pub type VertexId = u64;

/// A vertex reference as it arrived from a client.
///
/// Only [`VertexRef::Id`] values can be encoded for the engine; labels are kept
/// so graph-only views can still show them.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum VertexRef {
    Id(VertexId),
    Label(String),
}

impl VertexRef {
    /// `u64::MAX` stays a label: no vertex count could cover it.
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        match trimmed.parse::<VertexId>() {
            Ok(id) if id < VertexId::MAX => VertexRef::Id(id),
            _ => VertexRef::Label(trimmed.to_string()),
        }
    }

    /// Numeric id usable by the engine, if any.
    pub fn id(&self) -> Option<VertexId> {
        match self {
            VertexRef::Id(id) if *id < VertexId::MAX => Some(*id),
            _ => None,
        }
    }
}

impl fmt::Display for VertexRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VertexRef::Id(id) => write!(f, "{}", id),
            VertexRef::Label(label) => f.write_str(label),
        }
    }
}

/// Numeric ids ascending by value, then labels lexicographically.
impl Ord for VertexRef {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (VertexRef::Id(a), VertexRef::Id(b)) => a.cmp(b),
            (VertexRef::Id(_), VertexRef::Label(_)) => Ordering::Less,
            (VertexRef::Label(_), VertexRef::Id(_)) => Ordering::Greater,
            (VertexRef::Label(a), VertexRef::Label(b)) => a.cmp(b),
        }
    }
}

impl PartialOrd for VertexRef {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Edge {
    pub src: VertexId,
    pub dst: VertexId,
}

/// The only structure ever handed to the engine.
///
/// Invariant: every edge endpoint is `< vertex_count`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalGraph {
    vertex_count: u64,
    edges: Vec<Edge>,
}

/// Result of normalizing client input: the graph plus the number of edges that
/// had to be dropped because an endpoint was not a non-negative integer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Encoded {
    pub graph: CanonicalGraph,
    pub skipped_edges: usize,
}

impl CanonicalGraph {
    /// Build a canonical graph from supplied edges and declared vertices.
    ///
    /// Edge order is preserved. `N` is one more than the largest numeric id seen
    /// anywhere in the input, including endpoints of edges that were skipped.
    pub fn from_parts<E, V>(edges: E, declared: V) -> Encoded
    where
        E: IntoIterator<Item = (VertexRef, VertexRef)>,
        V: IntoIterator<Item = VertexRef>,
    {
        let mut max_id: Option<VertexId> = None;
        let mut see = |id: VertexId| max_id = Some(max_id.map_or(id, |m| m.max(id)));

        let mut kept = Vec::new();
        let mut skipped_edges = 0;
        for (src, dst) in edges {
            if let Some(id) = src.id() {
                see(id);
            }
            if let Some(id) = dst.id() {
                see(id);
            }
            match (src.id(), dst.id()) {
                (Some(src), Some(dst)) => kept.push(Edge { src, dst }),
                _ => skipped_edges += 1,
            }
        }
        for vertex in declared {
            if let Some(id) = vertex.id() {
                see(id);
            }
        }

        Encoded {
            graph: CanonicalGraph {
                vertex_count: max_id.map_or(0, |m| m + 1),
                edges: kept,
            },
            skipped_edges,
        }
    }

    pub fn vertex_count(&self) -> u64 {
        self.vertex_count
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn write_into<W: Write>(&self, out: &mut W) -> io::Result<()> {
        writeln!(out, "{}", self.vertex_count)?;
        for edge in &self.edges {
            writeln!(out, "{} {}", edge.src, edge.dst)?;
        }
        Ok(())
    }

    pub fn encode(&self) -> String {
        let mut buf = Vec::with_capacity(16 + self.edges.len() * 8);
        // Writing into a Vec cannot fail.
        let _ = self.write_into(&mut buf);
        String::from_utf8_lossy(&buf).into_owned()
    }

    /// Write the canonical form to `path`, replacing whatever was there.
    pub fn write_to(&self, path: &Path) -> Result<()> {
        let file = std::fs::File::create(path).map_err(|e| OrchestratorError::io(path, e))?;
        let mut out = io::BufWriter::new(file);
        self.write_into(&mut out)
            .and_then(|_| out.flush())
            .map_err(|e| OrchestratorError::io(path, e))
    }
}

/// A whitespace-separated edge list as found in uploaded or sample files.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EdgeList {
    pub edges: Vec<(VertexRef, VertexRef)>,
}

impl EdgeList {
    /// Parse an edge list.
    ///
    /// If the first non-empty line holds a single token it is taken to be a
    /// vertex-count header and skipped. Lines with fewer than two tokens are
    /// ignored; tokens past the second are ignored.
    pub fn parse(text: &str) -> Self {
        let mut lines = text.lines().filter(|l| !l.trim().is_empty()).peekable();
        if let Some(first) = lines.peek() {
            if first.split_whitespace().count() == 1 {
                lines.next();
            }
        }

        let edges = lines
            .filter_map(|line| {
                let mut parts = line.split_whitespace();
                match (parts.next(), parts.next()) {
                    (Some(src), Some(dst)) => Some((VertexRef::parse(src), VertexRef::parse(dst))),
                    _ => None,
                }
            })
            .collect();

        Self { edges }
    }

    pub fn read(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| OrchestratorError::io(path, e))?;
        Ok(Self::parse(&text))
    }

    /// Distinct vertices referenced by any edge, in natural order.
    pub fn vertices(&self) -> BTreeSet<VertexRef> {
        self.edges
            .iter()
            .flat_map(|(src, dst)| [src.clone(), dst.clone()])
            .collect()
    }

    pub fn to_canonical(&self) -> Encoded {
        CanonicalGraph::from_parts(self.edges.iter().cloned(), std::iter::empty())
    }
}
