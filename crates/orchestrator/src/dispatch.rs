use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Serialize, Serializer};

use crate::error::OrchestratorError;

pub const DEFAULT_BFS_SOURCE: &str = "0";
pub const DEFAULT_WALK_LENGTH: u32 = 10;
pub const DEFAULT_NUM_WALKS: u32 = 5;
const MAX_PLUGIN_KEY_LEN: usize = 64;

/// Algorithms the engine knows how to run.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Algorithm {
    /// Engine's built-in combined PageRank + label propagation pass.
    Default,
    Bfs,
    RandomWalk,
    PageRank,
    LabelPropagation,
    ConnectedComponents,
    /// Key registered by an engine plugin. Handed over as-is; the engine
    /// rejects it if nothing is registered under that name.
    Plugin(String),
}

impl Algorithm {
    pub const ALL: [Algorithm; 6] = [
        Algorithm::Default,
        Algorithm::Bfs,
        Algorithm::RandomWalk,
        Algorithm::PageRank,
        Algorithm::LabelPropagation,
        Algorithm::ConnectedComponents,
    ];

    /// Key passed to the engine on the command line.
    pub fn key(&self) -> &str {
        match self {
            Algorithm::Default => "default",
            Algorithm::Bfs => "bfs",
            Algorithm::RandomWalk => "rw",
            Algorithm::PageRank => "pr",
            Algorithm::LabelPropagation => "lpa",
            Algorithm::ConnectedComponents => "cc",
            Algorithm::Plugin(key) => key,
        }
    }

    /// Human readable argument shape, for the algorithm listing endpoint.
    pub fn arguments(&self) -> &'static [&'static str] {
        match self {
            Algorithm::Bfs => &["sourceNode"],
            Algorithm::RandomWalk => &["walkLength", "numWalks"],
            _ => &[],
        }
    }

    /// Resolve an optional key; absent or blank means [`Algorithm::Default`].
    pub fn from_key(key: Option<&str>) -> Result<Self, OrchestratorError> {
        match key.map(str::trim) {
            None | Some("") => Ok(Algorithm::Default),
            Some(key) => key.parse(),
        }
    }
}

impl FromStr for Algorithm {
    type Err = OrchestratorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(builtin) = Algorithm::ALL
            .into_iter()
            .find(|a| a.key().eq_ignore_ascii_case(s))
        {
            return Ok(builtin);
        }
        let plugin_key = s.len() <= MAX_PLUGIN_KEY_LEN
            && s.starts_with(|c: char| c.is_ascii_alphanumeric())
            && s.chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if plugin_key {
            Ok(Algorithm::Plugin(s.to_string()))
        } else {
            let known: Vec<String> = Algorithm::ALL.iter().map(|a| a.to_string()).collect();
            Err(OrchestratorError::input(format!(
                "Invalid algorithm '{}'. Use a built-in ({}) or a plugin key of letters, digits, '-' or '_'",
                s,
                known.join(", ")
            )))
        }
    }
}

impl Serialize for Algorithm {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.key())
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Algorithm plus its caller-supplied parameters, all optional.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlgorithmRequest {
    pub algorithm: Algorithm,
    pub source_node: Option<String>,
    pub walk_length: Option<u32>,
    pub num_walks: Option<u32>,
}

impl AlgorithmRequest {
    pub fn new(algorithm: Algorithm) -> Self {
        Self {
            algorithm,
            source_node: None,
            walk_length: None,
            num_walks: None,
        }
    }
}

/// A fully resolved engine command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: PathBuf,
    pub args: Vec<String>,
}

/// Map a request to the engine's argument vector. Pure: no I/O.
///
/// Shape: `<graph> [<algorithm> [<algorithm-args...>]]`. The default pass takes
/// no algorithm key at all.
pub fn dispatch(
    engine: &Path,
    graph: &Path,
    request: &AlgorithmRequest,
) -> Result<Invocation, OrchestratorError> {
    let mut args = vec![graph.to_string_lossy().into_owned()];

    match &request.algorithm {
        Algorithm::Default => {}
        Algorithm::Bfs => {
            let source = request
                .source_node
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .unwrap_or(DEFAULT_BFS_SOURCE);
            if source.parse::<u64>().is_err() {
                return Err(OrchestratorError::input(format!(
                    "sourceNode must be a non-negative integer, got '{}'",
                    source
                )));
            }
            args.push(Algorithm::Bfs.key().to_string());
            args.push(source.to_string());
        }
        Algorithm::RandomWalk => {
            let walk_length = positive("walkLength", request.walk_length, DEFAULT_WALK_LENGTH)?;
            let num_walks = positive("numWalks", request.num_walks, DEFAULT_NUM_WALKS)?;
            args.push(Algorithm::RandomWalk.key().to_string());
            args.push(walk_length.to_string());
            args.push(num_walks.to_string());
        }
        other => args.push(other.key().to_string()),
    }

    Ok(Invocation {
        program: engine.to_path_buf(),
        args,
    })
}

fn positive(name: &str, value: Option<u32>, default: u32) -> Result<u32, OrchestratorError> {
    match value {
        None => Ok(default),
        Some(0) => Err(OrchestratorError::input(format!("{} must be positive", name))),
        Some(v) => Ok(v),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(request: AlgorithmRequest) -> Vec<String> {
        dispatch(Path::new("/bin/engine"), Path::new("/tmp/g.txt"), &request)
            .unwrap()
            .args
    }

    #[test]
    fn default_pass_has_no_algorithm_key() {
        assert_eq!(args(AlgorithmRequest::new(Algorithm::Default)), vec!["/tmp/g.txt"]);
    }

    #[test]
    fn bfs_source_defaults_to_zero() {
        assert_eq!(
            args(AlgorithmRequest::new(Algorithm::Bfs)),
            vec!["/tmp/g.txt", "bfs", "0"]
        );
    }

    #[test]
    fn bfs_uses_given_source() {
        let mut request = AlgorithmRequest::new(Algorithm::Bfs);
        request.source_node = Some("12".into());
        assert_eq!(args(request), vec!["/tmp/g.txt", "bfs", "12"]);
    }

    #[test]
    fn bfs_rejects_non_numeric_source() {
        let mut request = AlgorithmRequest::new(Algorithm::Bfs);
        request.source_node = Some("alice".into());
        let err = dispatch(Path::new("e"), Path::new("g"), &request).unwrap_err();
        assert!(matches!(err, OrchestratorError::Input(_)));
    }

    #[test]
    fn random_walk_defaults() {
        assert_eq!(
            args(AlgorithmRequest::new(Algorithm::RandomWalk)),
            vec!["/tmp/g.txt", "rw", "10", "5"]
        );
    }

    #[test]
    fn random_walk_overrides_and_rejects_zero() {
        let mut request = AlgorithmRequest::new(Algorithm::RandomWalk);
        request.walk_length = Some(20);
        assert_eq!(args(request.clone()), vec!["/tmp/g.txt", "rw", "20", "5"]);

        request.num_walks = Some(0);
        assert!(dispatch(Path::new("e"), Path::new("g"), &request).is_err());
    }

    #[test]
    fn simple_algorithms_pass_their_key_through() {
        for (algorithm, key) in [
            (Algorithm::PageRank, "pr"),
            (Algorithm::LabelPropagation, "lpa"),
            (Algorithm::ConnectedComponents, "cc"),
        ] {
            assert_eq!(args(AlgorithmRequest::new(algorithm)), vec!["/tmp/g.txt", key]);
        }
    }

    #[test]
    fn keys_resolve_and_malformed_keys_fail() {
        assert_eq!(Algorithm::from_key(None).unwrap(), Algorithm::Default);
        assert_eq!(Algorithm::from_key(Some(" ")).unwrap(), Algorithm::Default);
        assert_eq!(Algorithm::from_key(Some("BFS")).unwrap(), Algorithm::Bfs);
        assert_eq!(Algorithm::from_key(Some("cc")).unwrap(), Algorithm::ConnectedComponents);
        assert!(Algorithm::from_key(Some("--help")).is_err());
        assert!(Algorithm::from_key(Some("page rank")).is_err());
    }

    #[test]
    fn plugin_keys_pass_through_verbatim() {
        let algorithm = Algorithm::from_key(Some(" Louvain_v2 ")).unwrap();
        assert_eq!(algorithm, Algorithm::Plugin("Louvain_v2".into()));
        assert_eq!(
            args(AlgorithmRequest::new(algorithm)),
            vec!["/tmp/g.txt", "Louvain_v2"]
        );
    }

    #[test]
    fn program_is_the_configured_engine() {
        let invocation = dispatch(
            Path::new("/opt/dgraph_engine"),
            Path::new("g.txt"),
            &AlgorithmRequest::new(Algorithm::Default),
        )
        .unwrap();
        assert_eq!(invocation.program, PathBuf::from("/opt/dgraph_engine"));
    }
}
