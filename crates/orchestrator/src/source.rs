//! Graph source resolution.
//!
//! Every session (selected by the `X-Graph-Session` header, `default` when the
//! header is absent) points at one stored graph. An upload is kept twice: the
//! edge list as sent, labels and all, for graph views, and its canonical
//! encoding for the engine. Interactive payloads are encoded to a
//! request-scoped scratch file that disappears as soon as the request is done
//! with it.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{info, warn};

use crate::config::ServiceConfig;
use crate::encoder::{CanonicalGraph, EdgeList, Encoded, VertexRef};
use crate::error::{OrchestratorError, Result};

pub const DEFAULT_SESSION: &str = "default";
const MAX_SESSION_LEN: usize = 64;

/// A vertex id as sent in JSON: either a number or a string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawId {
    Number(serde_json::Number),
    Text(String),
}

impl RawId {
    pub fn to_vertex(&self) -> VertexRef {
        match self {
            RawId::Number(n) => VertexRef::parse(&n.to_string()),
            RawId::Text(s) => VertexRef::parse(s),
        }
    }
}

/// Nodes may be sent bare (`0`) or as objects (`{"id": 0, "label": "a"}`).
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum NodeSpec {
    Bare(RawId),
    Object {
        id: RawId,
        #[serde(default)]
        label: Option<String>,
    },
}

impl NodeSpec {
    pub fn id(&self) -> &RawId {
        match self {
            NodeSpec::Bare(id) | NodeSpec::Object { id, .. } => id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct EdgeSpec {
    pub from: RawId,
    pub to: RawId,
}

/// Inline graph submitted with a single run request.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct InteractiveGraph {
    pub nodes: Vec<NodeSpec>,
    pub edges: Vec<EdgeSpec>,
}

impl InteractiveGraph {
    pub fn encode(&self) -> Encoded {
        CanonicalGraph::from_parts(
            self.edges
                .iter()
                .map(|e| (e.from.to_vertex(), e.to.to_vertex())),
            self.nodes.iter().map(|n| n.id().to_vertex()),
        )
    }
}

/// Where a run request wants its graph from.
#[derive(Debug, Clone)]
pub enum GraphSource {
    /// Whatever the session currently points at.
    Default,
    /// Request-scoped graph; never becomes the session's default.
    Interactive(InteractiveGraph),
}

/// A graph file ready to hand to the engine.
///
/// Scratch files are deleted when this value is dropped, whichever way the
/// request ends.
#[derive(Debug)]
pub enum ResolvedGraph {
    Stored(PathBuf),
    Scratch(NamedTempFile),
}

impl ResolvedGraph {
    pub fn path(&self) -> &Path {
        match self {
            ResolvedGraph::Stored(path) => path,
            ResolvedGraph::Scratch(file) => file.path(),
        }
    }
}

/// Files behind one session's current graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredGraph {
    /// Edge list as uploaded, non-numeric labels included.
    pub listing: PathBuf,
    /// What the engine reads.
    pub canonical: PathBuf,
}

impl StoredGraph {
    /// A file that already is both: the bundled sample graph.
    fn single(path: PathBuf) -> Self {
        Self {
            listing: path.clone(),
            canonical: path,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadSummary {
    pub nodes: usize,
    pub edges: usize,
    pub skipped: usize,
    #[serde(skip)]
    pub stored: StoredGraph,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeView {
    pub id: String,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EdgeView {
    pub from: String,
    pub to: String,
}

/// Node/edge listing used by the visualisation front end.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GraphView {
    pub nodes: Vec<NodeView>,
    pub edges: Vec<EdgeView>,
}

impl From<&EdgeList> for GraphView {
    fn from(list: &EdgeList) -> Self {
        let nodes = list
            .vertices()
            .into_iter()
            .map(|v| {
                let id = v.to_string();
                NodeView {
                    label: id.clone(),
                    id,
                }
            })
            .collect();
        let edges = list
            .edges
            .iter()
            .map(|(src, dst)| EdgeView {
                from: src.to_string(),
                to: dst.to_string(),
            })
            .collect();
        Self { nodes, edges }
    }
}

/// Per-session pointers to the current graph.
pub struct GraphStore {
    sessions: DashMap<String, StoredGraph>,
    sample: PathBuf,
    upload_dir: PathBuf,
    scratch_dir: PathBuf,
}

impl GraphStore {
    pub fn new(sample: PathBuf, upload_dir: PathBuf, scratch_dir: PathBuf) -> Self {
        Self {
            sessions: DashMap::new(),
            sample,
            upload_dir,
            scratch_dir,
        }
    }

    pub fn from_config(config: &ServiceConfig) -> Self {
        Self::new(
            config.default_graph.clone(),
            config.upload_dir.clone(),
            config.scratch_dir.clone(),
        )
    }

    /// Graph the session currently points at. Sessions that never uploaded
    /// anything use the sample graph.
    pub fn current(&self, session: &str) -> StoredGraph {
        self.sessions
            .get(session)
            .map(|entry| entry.value().clone())
            .unwrap_or_else(|| StoredGraph::single(self.sample.clone()))
    }

    /// Read the session's current graph as a node/edge listing. A missing file
    /// yields an empty graph.
    pub fn view(&self, session: &str) -> Result<GraphView> {
        let path = self.current(session).listing;
        if !path.exists() {
            warn!(path = %path.display(), "current graph file is missing");
            return Ok(GraphView::default());
        }
        Ok(GraphView::from(&EdgeList::read(&path)?))
    }

    /// Normalize an uploaded edge list and make it the session's default graph.
    ///
    /// Both files are written next to their final location and renamed into
    /// place, so a run that already opened the previous graph keeps reading a
    /// complete one.
    pub fn install_upload(&self, session: &str, contents: &[u8]) -> Result<UploadSummary> {
        let text = std::str::from_utf8(contents)
            .map_err(|_| OrchestratorError::input("Uploaded file is not valid UTF-8 text"))?;
        let list = EdgeList::parse(text);
        if list.edges.is_empty() {
            return Err(OrchestratorError::input("Uploaded file contains no edges"));
        }
        let encoded = list.to_canonical();

        let stored = StoredGraph {
            listing: self.upload_dir.join(format!("{}.txt", session)),
            canonical: self.upload_dir.join(format!("{}.canonical.txt", session)),
        };
        let canonical = self.stage(&self.upload_dir, "upload-", |out| {
            encoded.graph.write_into(out)
        })?;
        let listing = self.stage(&self.upload_dir, "upload-", |out| {
            out.write_all(text.as_bytes())
        })?;
        persist(canonical, &stored.canonical)?;
        persist(listing, &stored.listing)?;

        self.sessions.insert(session.to_string(), stored.clone());
        info!(
            session,
            path = %stored.canonical.display(),
            vertices = encoded.graph.vertex_count(),
            edges = encoded.graph.edges().len(),
            skipped = encoded.skipped_edges,
            "installed uploaded graph"
        );

        Ok(UploadSummary {
            nodes: list.vertices().len(),
            edges: list.edges.len(),
            skipped: encoded.skipped_edges,
            stored,
        })
    }

    /// Turn a request's graph source into a file the engine can read.
    pub fn resolve(&self, session: &str, source: &GraphSource) -> Result<ResolvedGraph> {
        match source {
            GraphSource::Default => Ok(ResolvedGraph::Stored(self.current(session).canonical)),
            GraphSource::Interactive(graph) => {
                let encoded = graph.encode();
                if encoded.skipped_edges > 0 {
                    warn!(
                        skipped = encoded.skipped_edges,
                        "dropped interactive edges with non-numeric endpoints"
                    );
                }
                let file = self.stage(&self.scratch_dir, "interactive-", |out| {
                    encoded.graph.write_into(out)
                })?;
                Ok(ResolvedGraph::Scratch(file))
            }
        }
    }

    /// Fill a fresh temp file in `dir`. Dropping the result deletes it.
    fn stage<F>(&self, dir: &Path, prefix: &str, write: F) -> Result<NamedTempFile>
    where
        F: FnOnce(&mut BufWriter<&mut File>) -> io::Result<()>,
    {
        std::fs::create_dir_all(dir).map_err(|e| OrchestratorError::io(dir, e))?;
        let mut file = tempfile::Builder::new()
            .prefix(prefix)
            .suffix(".txt")
            .tempfile_in(dir)
            .map_err(|e| OrchestratorError::io(dir, e))?;
        let path = file.path().to_path_buf();
        {
            let mut out = BufWriter::new(file.as_file_mut());
            write(&mut out)
                .and_then(|_| out.flush())
                .map_err(|e| OrchestratorError::io(&path, e))?;
        }
        Ok(file)
    }
}

fn persist(staged: NamedTempFile, target: &Path) -> Result<()> {
    staged
        .persist(target)
        .map(drop)
        .map_err(|e| OrchestratorError::io(target, e.error))
}

/// Validate a session name from the request; `None` selects the default session.
pub fn session_name(raw: Option<&str>) -> Result<String> {
    let name = match raw.map(str::trim) {
        None | Some("") => return Ok(DEFAULT_SESSION.to_string()),
        Some(name) => name,
    };
    let valid = name.len() <= MAX_SESSION_LEN
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(name.to_string())
    } else {
        Err(OrchestratorError::input(format!(
            "Invalid session name '{}': use up to {} letters, digits, '-' or '_'",
            name, MAX_SESSION_LEN
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store(dir: &TempDir) -> GraphStore {
        let sample = dir.path().join("sample.txt");
        std::fs::write(&sample, "4\n0 1\n1 2\n2 3\n").unwrap();
        GraphStore::new(sample, dir.path().join("uploads"), dir.path().join("scratch"))
    }

    fn interactive(json: serde_json::Value) -> InteractiveGraph {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn sessions_start_at_the_sample_graph() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);
        let sample = dir.path().join("sample.txt");
        assert_eq!(store.current("default").canonical, sample);
        assert_eq!(store.current("other").listing, sample);
    }

    #[test]
    fn upload_replaces_only_its_own_session() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);

        let summary = store.install_upload("default", b"3\n0 1\n1 2\n2 0\n").unwrap();
        assert_eq!((summary.nodes, summary.edges, summary.skipped), (3, 3, 0));
        assert_eq!(store.current("default"), summary.stored);
        assert_eq!(
            std::fs::read_to_string(&summary.stored.canonical).unwrap(),
            "3\n0 1\n1 2\n2 0\n"
        );
        assert_eq!(store.current("alice").canonical, dir.path().join("sample.txt"));
    }

    #[test]
    fn second_upload_overwrites_the_first() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);
        store.install_upload("default", b"0 1\n").unwrap();
        let summary = store.install_upload("default", b"5 6\n").unwrap();
        assert_eq!(std::fs::read_to_string(&summary.stored.canonical).unwrap(), "7\n5 6\n");
        assert_eq!(store.view("default").unwrap().nodes.len(), 2);
    }

    #[test]
    fn view_of_an_upload_keeps_labels_the_engine_never_sees() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);

        let summary = store.install_upload("default", b"alice bob\n0 1\n").unwrap();
        assert_eq!((summary.nodes, summary.edges, summary.skipped), (4, 2, 1));
        assert_eq!(
            std::fs::read_to_string(&summary.stored.canonical).unwrap(),
            "2\n0 1\n"
        );

        let view = store.view("default").unwrap();
        assert_eq!(view.nodes.len(), summary.nodes);
        assert_eq!(view.edges.len(), summary.edges);
        let ids: Vec<&str> = view.nodes.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["0", "1", "alice", "bob"]);

        match store.resolve("default", &GraphSource::Default).unwrap() {
            ResolvedGraph::Stored(path) => assert_eq!(path, summary.stored.canonical),
            other => panic!("expected the stored graph, got {:?}", other),
        }
    }

    #[test]
    fn empty_or_binary_uploads_are_input_errors() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);
        assert!(matches!(
            store.install_upload("default", b"42\n"),
            Err(OrchestratorError::Input(_))
        ));
        assert!(matches!(
            store.install_upload("default", &[0xff, 0xfe, 0x00]),
            Err(OrchestratorError::Input(_))
        ));
        assert_eq!(store.current("default").canonical, dir.path().join("sample.txt"));
    }

    #[test]
    fn interactive_graph_is_scoped_to_the_request() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);

        let graph = interactive(serde_json::json!({
            "nodes": [{"id": 0}, {"id": 1}, {"id": 2}],
            "edges": [{"from": 0, "to": 1}, {"from": 1, "to": 2}]
        }));
        let resolved = store
            .resolve("default", &GraphSource::Interactive(graph))
            .unwrap();
        let path = resolved.path().to_path_buf();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "3\n0 1\n1 2\n");
        assert_eq!(store.current("default").canonical, dir.path().join("sample.txt"));

        drop(resolved);
        assert!(!path.exists());
    }

    #[test]
    fn interactive_ids_may_be_bare_or_strings() {
        let graph = interactive(serde_json::json!({
            "nodes": [0, "1", {"id": "4", "label": "hub"}, "carol"],
            "edges": [{"from": "0", "to": 1}, {"from": "carol", "to": 0}]
        }));
        let encoded = graph.encode();
        assert_eq!(encoded.skipped_edges, 1);
        assert_eq!(encoded.graph.encode(), "5\n0 1\n");
    }

    #[test]
    fn payload_without_edges_does_not_deserialize() {
        let parsed = serde_json::from_value::<InteractiveGraph>(serde_json::json!({
            "nodes": [0, 1]
        }));
        assert!(parsed.is_err());
    }

    #[test]
    fn view_lists_labels_and_skips_header() {
        let dir = tempfile::tempdir().unwrap();
        let sample = dir.path().join("sample.txt");
        std::fs::write(&sample, "3\nbob 2\n2 10\n").unwrap();
        let store = GraphStore::new(sample, dir.path().into(), dir.path().into());

        let view = store.view("default").unwrap();
        let ids: Vec<&str> = view.nodes.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["2", "10", "bob"]);
        assert_eq!(
            view.edges[0],
            EdgeView {
                from: "bob".into(),
                to: "2".into()
            }
        );
    }

    #[test]
    fn missing_graph_file_views_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = GraphStore::new(
            dir.path().join("nope.txt"),
            dir.path().into(),
            dir.path().into(),
        );
        assert_eq!(store.view("default").unwrap(), GraphView::default());
    }

    #[test]
    fn session_names_are_validated() {
        assert_eq!(session_name(None).unwrap(), "default");
        assert_eq!(session_name(Some("team_a-1")).unwrap(), "team_a-1");
        assert!(session_name(Some("../etc")).is_err());
        assert!(session_name(Some("x".repeat(65).as_str())).is_err());
    }
}
