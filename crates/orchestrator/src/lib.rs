//! Orchestration layer for the dgraph analytics engine.
//!
//! Accepts graphs from uploads, inline JSON or the stored default, normalizes
//! them to the engine's canonical format, runs the requested algorithm as an
//! external process and folds its line-oriented output into per-vertex results.

pub mod config;
pub mod dispatch;
pub mod encoder;
pub mod engine;
pub mod error;
pub mod parser;
pub mod server;
pub mod source;

pub use config::ServiceConfig;
pub use dispatch::{dispatch, Algorithm, AlgorithmRequest, Invocation};
pub use encoder::{CanonicalGraph, Edge, EdgeList, VertexId, VertexRef};
pub use engine::{EngineOutput, EngineRunner};
pub use error::{OrchestratorError, Result};
pub use parser::{parse_output, ResultSet, VertexResult};
pub use server::{router, start_server, GraphService};
pub use source::{GraphSource, GraphStore, InteractiveGraph};
