//! Engine stdout parsing.
//!
//! Each engine algorithm prints its per-vertex results in its own line shape.
//! Every line is tried against a fixed, ordered set of grammars; the first one
//! that matches yields a [`Fragment`] which is folded into the vertex's
//! [`VertexResult`] field by field. Lines nothing matches are skipped, so
//! progress chatter on stdout is harmless.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// BFS distance reported for vertices the source cannot reach (`BFS_Dist=INF`).
pub const UNREACHABLE: i64 = -1;

const FLOAT: &str = r"[-+]?\d*\.?\d+(?:[eE][-+]?\d+)?";

/// Results for one vertex. Absent fields were not computed by the run, which is
/// different from a computed zero.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VertexResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pr: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub community: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bfs_dist: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cc_id: Option<i64>,
}

impl VertexResult {
    /// Merge one fragment, touching only the fields it carries.
    pub fn apply(&mut self, fragment: Fragment) {
        match fragment {
            Fragment::RankAndCommunity { pr, community } => {
                self.pr = Some(pr);
                self.community = Some(community);
            }
            Fragment::BfsDistance(dist) => self.bfs_dist = Some(dist),
            Fragment::Component(id) => self.cc_id = Some(id),
            Fragment::Rank(pr) => self.pr = Some(pr),
            Fragment::Community(community) => self.community = Some(community),
        }
    }
}

/// Vertex id (as printed by the engine) to its merged results.
pub type ResultSet = BTreeMap<String, VertexResult>;

/// A partial update produced by one matched line.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Fragment {
    RankAndCommunity { pr: f64, community: i64 },
    BfsDistance(i64),
    Component(i64),
    Rank(f64),
    Community(i64),
}

/// Line shapes, in the order they are tried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Grammar {
    RankAndCommunity,
    BfsDistance,
    Component,
    Rank,
    Community,
}

impl Grammar {
    const ORDER: [Grammar; 5] = [
        Grammar::RankAndCommunity,
        Grammar::BfsDistance,
        Grammar::Component,
        Grammar::Rank,
        Grammar::Community,
    ];

    fn pattern(self) -> String {
        let body = match self {
            Grammar::RankAndCommunity => format!(r"PR=({FLOAT}),\s*Community=(-?\d+)"),
            Grammar::BfsDistance => r"BFS_Dist=(INF|\d+)".to_string(),
            Grammar::Component => r"CC_ID=(-?\d+)".to_string(),
            Grammar::Rank => format!(r"PR=({FLOAT})"),
            Grammar::Community => r"Community=(-?\d+)".to_string(),
        };
        format!(r"V\[(\d+)\]:\s*{body}")
    }

    fn fragment(self, caps: &Captures<'_>) -> Option<Fragment> {
        let field = |i: usize| caps.get(i).map(|m| m.as_str());
        Some(match self {
            Grammar::RankAndCommunity => Fragment::RankAndCommunity {
                pr: field(2)?.parse().ok()?,
                community: field(3)?.parse().ok()?,
            },
            Grammar::BfsDistance => match field(2)? {
                "INF" => Fragment::BfsDistance(UNREACHABLE),
                dist => Fragment::BfsDistance(dist.parse().ok()?),
            },
            Grammar::Component => Fragment::Component(field(2)?.parse().ok()?),
            Grammar::Rank => Fragment::Rank(field(2)?.parse().ok()?),
            Grammar::Community => Fragment::Community(field(2)?.parse().ok()?),
        })
    }
}

fn grammars() -> &'static [(Grammar, Regex)] {
    static GRAMMARS: OnceLock<Vec<(Grammar, Regex)>> = OnceLock::new();
    GRAMMARS.get_or_init(|| {
        Grammar::ORDER
            .iter()
            .filter_map(|&g| Regex::new(&g.pattern()).ok().map(|re| (g, re)))
            .collect()
    })
}

/// Match a single line. Returns the vertex id and the update it carries.
pub fn parse_line(line: &str) -> Option<(String, Fragment)> {
    // The first grammar whose pattern matches owns the line, even when its
    // values turn out not to fit.
    let (grammar, caps) = grammars()
        .iter()
        .find_map(|(grammar, re)| re.captures(line).map(|caps| (grammar, caps)))?;
    let fragment = grammar.fragment(&caps)?;
    Some((caps[1].to_string(), fragment))
}

/// Fold the engine's full stdout into a [`ResultSet`].
pub fn parse_output(stdout: &str) -> ResultSet {
    let mut results = ResultSet::new();
    let mut ignored = 0usize;

    for line in stdout.lines() {
        match parse_line(line) {
            Some((vertex, fragment)) => results.entry(vertex).or_default().apply(fragment),
            None => ignored += 1,
        }
    }

    debug!(vertices = results.len(), ignored, "parsed engine output");
    results
}
