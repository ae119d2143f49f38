use std::collections::{BTreeMap, HashMap, HashSet};

use super::{Transaction, sorted_by_time};

/// Hard bound on DFS path length (in hops), independent of graph size.
pub const MAX_DFS_DEPTH: usize = 10;

/// Most paths a single traversal collects. Dense graphs have factorially
/// many simple paths; the walk stops once this many are found.
pub const MAX_DFS_PATHS: usize = 1000;

/// Directed transfer graph `from -> [to...]` over a fixed transaction set.
///
/// Successor lists keep first-seen chronological order so traversals are
/// deterministic for a given input.
#[derive(Debug, Default)]
pub struct TransactionGraph {
    adjacency: BTreeMap<String, Vec<String>>,
    edges: HashMap<(String, String), Vec<String>>,
}

impl TransactionGraph {
    pub fn build(transactions: &[Transaction]) -> Self {
        let mut graph = Self::default();
        for tx in sorted_by_time(transactions) {
            let successors = graph.adjacency.entry(tx.from.clone()).or_default();
            if !successors.contains(&tx.to) {
                successors.push(tx.to.clone());
            }
            graph
                .edges
                .entry((tx.from.clone(), tx.to.clone()))
                .or_default()
                .push(tx.signature.clone());
        }
        graph
    }

    pub fn successors(&self, node: &str) -> &[String] {
        self.adjacency.get(node).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Signatures on the edge `from -> to`, oldest first.
    pub fn edge_signatures(&self, from: &str, to: &str) -> &[String] {
        self.edges
            .get(&(from.to_string(), to.to_string()))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// All simple cycles that leave `start` and return to it within
    /// `max_depth` hops. Each path lists the nodes from `start` up to the
    /// node that closes the cycle; its hop count is `path.len()`.
    pub fn cycles_through(&self, start: &str, max_depth: usize) -> Vec<Vec<String>> {
        let mut out = Vec::new();
        let mut path = vec![start];
        let mut visited: HashSet<&str> = HashSet::from([start]);
        self.walk_cycles(start, &mut path, &mut visited, max_depth.min(MAX_DFS_DEPTH), &mut out);
        warn_if_truncated("cycle", start, out.len());
        out
    }

    fn walk_cycles<'a>(
        &'a self,
        start: &str,
        path: &mut Vec<&'a str>,
        visited: &mut HashSet<&'a str>,
        max_depth: usize,
        out: &mut Vec<Vec<String>>,
    ) {
        let Some(&current) = path.last() else { return };
        for next in self.successors(current) {
            if out.len() >= MAX_DFS_PATHS {
                return;
            }
            if next == start {
                out.push(path.iter().map(|s| s.to_string()).collect());
                continue;
            }
            if path.len() >= max_depth || visited.contains(next.as_str()) {
                continue;
            }
            visited.insert(next);
            path.push(next);
            self.walk_cycles(start, path, visited, max_depth, out);
            path.pop();
            visited.remove(next.as_str());
        }
    }

    /// Simple paths from `start` that end at a dead end (a node with no
    /// outgoing edges) or run into the depth cap. Paths that can only
    /// continue into nodes already on the path are dropped. Hop count is
    /// `path.len() - 1`.
    pub fn chains_from(&self, start: &str, max_depth: usize) -> Vec<Vec<String>> {
        let mut out = Vec::new();
        let mut path = vec![start];
        let mut visited: HashSet<&str> = HashSet::from([start]);
        self.walk_chains(&mut path, &mut visited, max_depth.min(MAX_DFS_DEPTH), &mut out);
        warn_if_truncated("chain", start, out.len());
        out
    }

    fn walk_chains<'a>(
        &'a self,
        path: &mut Vec<&'a str>,
        visited: &mut HashSet<&'a str>,
        max_depth: usize,
        out: &mut Vec<Vec<String>>,
    ) {
        let Some(&current) = path.last() else { return };
        if out.len() >= MAX_DFS_PATHS {
            return;
        }
        let successors = self.successors(current);
        if successors.is_empty() || path.len() - 1 >= max_depth {
            if path.len() > 1 {
                out.push(path.iter().map(|s| s.to_string()).collect());
            }
            return;
        }
        for next in successors {
            if visited.contains(next.as_str()) {
                continue;
            }
            visited.insert(next);
            path.push(next);
            self.walk_chains(path, visited, max_depth, out);
            path.pop();
            visited.remove(next.as_str());
        }
    }

    /// First signature on each consecutive edge of `path`; with `closed`
    /// the edge from the last node back to the first is included.
    pub fn path_signatures(&self, path: &[String], closed: bool) -> Vec<String> {
        let mut hops: Vec<(&str, &str)> = path
            .windows(2)
            .map(|w| (w[0].as_str(), w[1].as_str()))
            .collect();
        if closed {
            if let (Some(last), Some(first)) = (path.last(), path.first()) {
                hops.push((last, first));
            }
        }
        hops.into_iter()
            .filter_map(|(from, to)| self.edge_signatures(from, to).first().cloned())
            .collect()
    }
}

fn warn_if_truncated(kind: &str, start: &str, found: usize) {
    if found >= MAX_DFS_PATHS {
        tracing::warn!("{kind} search from {start} stopped after {MAX_DFS_PATHS} paths");
    }
}
