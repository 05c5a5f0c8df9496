//! Read-only structural analysis over an [`AdjacencyView`].
//!
//! Connectivity, cycles, centrality, structural-pattern counts and
//! critical-path discovery, implemented directly on adjacency lists.
//! Every function accepts degenerate input (a lone goal node, a fully
//! disconnected graph) and returns zero values rather than failing.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use tracing::{debug, warn};

use crate::matrix::AdjacencyView;

#[cfg(feature = "typescript")]
use ts_rs::TS;

/// Upper bound on enumerated elementary cycles.
pub const MAX_CYCLES: usize = 1_000;

/// Upper bound on edge visits during cycle enumeration.
pub const MAX_CYCLE_STEPS: usize = 200_000;

/// Multipliers for the structural quality heuristic.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityWeights {
    /// Applied when the graph is not weakly connected
    pub disconnected_factor: f64,
    /// Applied when the graph contains a cycle
    pub cyclic_factor: f64,
    /// Lower bound of the healthy density band
    pub density_min: f64,
    /// Upper bound of the healthy density band
    pub density_max: f64,
    /// Applied when density is inside the band
    pub density_bonus: f64,
    /// Applied when density is outside the band
    pub density_penalty: f64,
}

impl Default for QualityWeights {
    fn default() -> Self {
        Self {
            disconnected_factor: 0.7,
            cyclic_factor: 0.5,
            density_min: 0.1,
            density_max: 0.6,
            density_bonus: 1.1,
            density_penalty: 0.9,
        }
    }
}

/// Issue severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

/// Kind of structural issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    DisconnectedComponents,
    IsolatedNodes,
    CircularDependency,
}

/// A structural problem found by the network validator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct StructuralIssue {
    pub kind: IssueKind,
    pub severity: Severity,
    pub description: String,
    /// Node ids involved
    pub nodes: Vec<String>,
}

/// Centrality measures for one node.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct Centrality {
    pub betweenness: f64,
    pub closeness: f64,
    pub degree: f64,
}

/// Tally of local shapes in the graph.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct StructuralPatterns {
    /// Nodes with exactly one incoming and one outgoing edge
    pub linear_chains: usize,
    /// Nodes with more than one outgoing edge
    pub branching_points: usize,
    /// Nodes with more than one incoming edge (and at most one outgoing)
    pub convergence_points: usize,
    /// Elementary cycles
    pub cycles: usize,
}

/// Full structural analysis of a view.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct StructureReport {
    pub node_count: usize,
    pub edge_count: usize,
    pub density: f64,
    pub is_weakly_connected: bool,
    pub is_strongly_connected: bool,
    pub is_acyclic: bool,
    pub isolated_nodes: Vec<String>,
    pub strongly_connected_components: usize,
    pub weakly_connected_components: usize,
    pub largest_component_size: usize,
    pub centrality: BTreeMap<String, Centrality>,
    pub patterns: StructuralPatterns,
    pub quality_score: f64,
}

/// Connectivity check with issues.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct ConnectivityReport {
    pub is_strongly_connected: bool,
    pub is_weakly_connected: bool,
    pub components: usize,
    pub largest_component_size: usize,
    pub issues: Vec<StructuralIssue>,
}

/// Causal-flow validation: cycles reported as circular dependencies.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct FlowReport {
    pub is_acyclic: bool,
    pub cycles: Vec<Vec<String>>,
    pub issues: Vec<StructuralIssue>,
}

/// A path through the graph, goal-side first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct CriticalPath {
    pub nodes: Vec<String>,
    /// Number of nodes on the path
    pub length: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct CriticalPathReport {
    pub longest_paths: Vec<CriticalPath>,
    /// Set when the graph is cyclic and paths come from the degree-ranked walk
    pub approximate: bool,
    /// Highest-betweenness nodes with their scores
    pub bottleneck_nodes: Vec<(String, f64)>,
    /// Bridges of the undirected projection
    pub critical_edges: Vec<(String, String)>,
}

/// Adjacency lists derived from a view.
struct Graph {
    n: usize,
    out: Vec<Vec<usize>>,
    inn: Vec<Vec<usize>>,
}

impl Graph {
    fn from_view(view: &AdjacencyView) -> Self {
        let n = view.len();
        let mut out = vec![Vec::new(); n];
        let mut inn = vec![Vec::new(); n];
        for (i, j) in view.edges() {
            out[i].push(j);
            inn[j].push(i);
        }
        Self { n, out, inn }
    }

    fn undirected(&self) -> Vec<Vec<usize>> {
        let mut adj = vec![Vec::new(); self.n];
        for i in 0..self.n {
            for &j in &self.out[i] {
                if i != j {
                    adj[i].push(j);
                    adj[j].push(i);
                }
            }
        }
        for list in &mut adj {
            list.sort_unstable();
            list.dedup();
        }
        adj
    }

    fn edge_count(&self) -> usize {
        self.out.iter().map(Vec::len).sum()
    }

    fn weak_components(&self) -> Vec<Vec<usize>> {
        let adj = self.undirected();
        let mut seen = vec![false; self.n];
        let mut components = Vec::new();
        for start in 0..self.n {
            if seen[start] {
                continue;
            }
            seen[start] = true;
            let mut component = vec![start];
            let mut queue = VecDeque::from([start]);
            while let Some(u) = queue.pop_front() {
                for &v in &adj[u] {
                    if !seen[v] {
                        seen[v] = true;
                        component.push(v);
                        queue.push_back(v);
                    }
                }
            }
            components.push(component);
        }
        components
    }

    /// Kosaraju, iterative.
    fn strong_components(&self) -> Vec<Vec<usize>> {
        let mut visited = vec![false; self.n];
        let mut order = Vec::with_capacity(self.n);
        for start in 0..self.n {
            if visited[start] {
                continue;
            }
            visited[start] = true;
            let mut stack = vec![(start, 0usize)];
            while let Some((u, next)) = stack.pop() {
                if let Some(&v) = self.out[u].get(next) {
                    stack.push((u, next + 1));
                    if !visited[v] {
                        visited[v] = true;
                        stack.push((v, 0));
                    }
                } else {
                    order.push(u);
                }
            }
        }

        let mut assigned = vec![false; self.n];
        let mut components = Vec::new();
        for &root in order.iter().rev() {
            if assigned[root] {
                continue;
            }
            assigned[root] = true;
            let mut component = vec![root];
            let mut stack = vec![root];
            while let Some(u) = stack.pop() {
                for &v in &self.inn[u] {
                    if !assigned[v] {
                        assigned[v] = true;
                        component.push(v);
                        stack.push(v);
                    }
                }
            }
            components.push(component);
        }
        components
    }

    fn is_acyclic(&self) -> bool {
        self.topological_order().is_some()
    }

    /// Kahn's algorithm; `None` when a cycle exists.
    fn topological_order(&self) -> Option<Vec<usize>> {
        let mut indegree: Vec<usize> = self.inn.iter().map(Vec::len).collect();
        let mut queue: VecDeque<usize> = (0..self.n).filter(|&i| indegree[i] == 0).collect();
        let mut order = Vec::with_capacity(self.n);
        while let Some(u) = queue.pop_front() {
            order.push(u);
            for &v in &self.out[u] {
                indegree[v] -= 1;
                if indegree[v] == 0 {
                    queue.push_back(v);
                }
            }
        }
        (order.len() == self.n).then_some(order)
    }

    /// Elementary cycles, each rooted at its smallest node index.
    ///
    /// The walk from each root stays inside the root's strongly connected
    /// component. It stops after `limit` cycles or [`MAX_CYCLE_STEPS`] edge
    /// visits, whichever comes first.
    fn simple_cycles(&self, limit: usize) -> Vec<Vec<usize>> {
        if self.is_acyclic() {
            return Vec::new();
        }
        let mut component = vec![usize::MAX; self.n];
        for (c, members) in self.strong_components().iter().enumerate() {
            for &m in members {
                component[m] = c;
            }
        }

        let mut search = CycleSearch {
            graph: self,
            component,
            on_path: vec![false; self.n],
            path: Vec::new(),
            cycles: Vec::new(),
            limit,
            steps: 0,
        };
        for start in 0..self.n {
            if search.exhausted() {
                break;
            }
            search.path.push(start);
            search.on_path[start] = true;
            search.extend(start, start);
            search.on_path[start] = false;
            search.path.pop();
        }
        if search.steps >= MAX_CYCLE_STEPS {
            warn!(
                nodes = self.n,
                found = search.cycles.len(),
                "Cycle enumeration stopped at step budget"
            );
        }
        search.cycles
    }

    /// Brandes' algorithm for directed, unweighted graphs, normalized.
    fn betweenness(&self) -> Vec<f64> {
        let n = self.n;
        let mut centrality = vec![0.0; n];
        for s in 0..n {
            let mut stack = Vec::with_capacity(n);
            let mut preds: Vec<Vec<usize>> = vec![Vec::new(); n];
            let mut sigma = vec![0.0f64; n];
            let mut dist = vec![-1i64; n];
            sigma[s] = 1.0;
            dist[s] = 0;
            let mut queue = VecDeque::from([s]);
            while let Some(v) = queue.pop_front() {
                stack.push(v);
                for &w in &self.out[v] {
                    if dist[w] < 0 {
                        dist[w] = dist[v] + 1;
                        queue.push_back(w);
                    }
                    if dist[w] == dist[v] + 1 {
                        sigma[w] += sigma[v];
                        preds[w].push(v);
                    }
                }
            }
            let mut delta = vec![0.0f64; n];
            while let Some(w) = stack.pop() {
                for &v in &preds[w] {
                    delta[v] += sigma[v] / sigma[w] * (1.0 + delta[w]);
                }
                if w != s {
                    centrality[w] += delta[w];
                }
            }
        }
        if n > 2 {
            let scale = 1.0 / ((n - 1) * (n - 2)) as f64;
            for c in &mut centrality {
                *c *= scale;
            }
        }
        centrality
    }

    /// Closeness over incoming distances, Wasserman-Faust scaled.
    fn closeness(&self) -> Vec<f64> {
        let n = self.n;
        (0..n)
            .map(|u| {
                let mut dist = vec![usize::MAX; n];
                dist[u] = 0;
                let mut queue = VecDeque::from([u]);
                let mut total = 0usize;
                let mut reached = 0usize;
                while let Some(v) = queue.pop_front() {
                    for &w in &self.inn[v] {
                        if dist[w] == usize::MAX {
                            dist[w] = dist[v] + 1;
                            total += dist[w];
                            reached += 1;
                            queue.push_back(w);
                        }
                    }
                }
                if total == 0 || n <= 1 {
                    return 0.0;
                }
                let r = reached as f64;
                (r / total as f64) * (r / (n - 1) as f64)
            })
            .collect()
    }

    fn degree(&self) -> Vec<f64> {
        let n = self.n;
        if n <= 1 {
            return vec![1.0; n];
        }
        (0..n)
            .map(|i| (self.out[i].len() + self.inn[i].len()) as f64 / (n - 1) as f64)
            .collect()
    }

    /// Bridges of the undirected projection (Tarjan low-link).
    fn bridges(&self) -> Vec<(usize, usize)> {
        let adj = self.undirected();
        let mut disc = vec![usize::MAX; self.n];
        let mut low = vec![0usize; self.n];
        let mut timer = 0usize;
        let mut out = Vec::new();
        for root in 0..self.n {
            if disc[root] != usize::MAX {
                continue;
            }
            disc[root] = timer;
            low[root] = timer;
            timer += 1;
            // (node, parent, next neighbour index)
            let mut stack = vec![(root, usize::MAX, 0usize)];
            while let Some(&(u, parent, next)) = stack.last() {
                if let Some(&v) = adj[u].get(next) {
                    let top = stack.len() - 1;
                    stack[top].2 += 1;
                    if v == parent {
                        continue;
                    }
                    if disc[v] == usize::MAX {
                        disc[v] = timer;
                        low[v] = timer;
                        timer += 1;
                        stack.push((v, u, 0));
                    } else {
                        low[u] = low[u].min(disc[v]);
                    }
                } else {
                    stack.pop();
                    if parent != usize::MAX {
                        low[parent] = low[parent].min(low[u]);
                        if low[u] > disc[parent] {
                            out.push((parent.min(u), parent.max(u)));
                        }
                    }
                }
            }
        }
        out.sort_unstable();
        out
    }

    fn density(&self) -> f64 {
        if self.n < 2 {
            return 0.0;
        }
        self.edge_count() as f64 / (self.n * (self.n - 1)) as f64
    }

    fn isolated(&self) -> Vec<usize> {
        (0..self.n)
            .filter(|&i| self.out[i].is_empty() && self.inn[i].is_empty())
            .collect()
    }
}

/// Backtracking state for [`Graph::simple_cycles`].
struct CycleSearch<'a> {
    graph: &'a Graph,
    /// Strongly connected component per node
    component: Vec<usize>,
    on_path: Vec<bool>,
    path: Vec<usize>,
    cycles: Vec<Vec<usize>>,
    limit: usize,
    steps: usize,
}

impl CycleSearch<'_> {
    fn exhausted(&self) -> bool {
        self.cycles.len() >= self.limit || self.steps >= MAX_CYCLE_STEPS
    }

    fn extend(&mut self, start: usize, u: usize) {
        let graph = self.graph;
        for &v in &graph.out[u] {
            if self.exhausted() {
                return;
            }
            self.steps += 1;
            if v == start {
                self.cycles.push(self.path.clone());
            } else if v > start && !self.on_path[v] && self.component[v] == self.component[start] {
                self.on_path[v] = true;
                self.path.push(v);
                self.extend(start, v);
                self.path.pop();
                self.on_path[v] = false;
            }
        }
    }
}

/// Structure analyzer with a tunable quality heuristic.
#[derive(Debug, Clone, Default)]
pub struct StructureAnalyzer {
    weights: QualityWeights,
}

impl StructureAnalyzer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_weights(weights: QualityWeights) -> Self {
        Self { weights }
    }

    pub fn weights(&self) -> &QualityWeights {
        &self.weights
    }

    /// Run every structural measure over the view.
    pub fn analyze(&self, view: &AdjacencyView) -> StructureReport {
        let graph = Graph::from_view(view);
        if graph.n == 0 {
            return StructureReport::default();
        }
        let ids = |idx: &[usize]| -> Vec<String> {
            idx.iter().filter_map(|&i| view.node(i)).map(str::to_string).collect()
        };

        let weak = graph.weak_components();
        let strong = graph.strong_components();
        let is_acyclic = graph.is_acyclic();
        let isolated = graph.isolated();
        let density = graph.density();

        let betweenness = graph.betweenness();
        let closeness = graph.closeness();
        let degree = graph.degree();
        let centrality = (0..graph.n)
            .filter_map(|i| {
                view.node(i).map(|id| {
                    (
                        id.to_string(),
                        Centrality {
                            betweenness: betweenness[i],
                            closeness: closeness[i],
                            degree: degree[i],
                        },
                    )
                })
            })
            .collect();

        let mut patterns = StructuralPatterns::default();
        for i in 0..graph.n {
            let (inn, out) = (graph.inn[i].len(), graph.out[i].len());
            if inn == 1 && out == 1 {
                patterns.linear_chains += 1;
            }
            if out > 1 {
                patterns.branching_points += 1;
            } else if inn > 1 {
                patterns.convergence_points += 1;
            }
        }
        patterns.cycles = if is_acyclic {
            0
        } else {
            graph.simple_cycles(MAX_CYCLES).len()
        };

        let is_weakly_connected = weak.len() == 1;
        let quality_score = self.quality_score(
            is_weakly_connected,
            is_acyclic,
            isolated.len(),
            graph.n,
            density,
        );

        debug!(
            nodes = graph.n,
            edges = graph.edge_count(),
            acyclic = is_acyclic,
            quality = quality_score,
            "Structure analyzed"
        );

        StructureReport {
            node_count: graph.n,
            edge_count: graph.edge_count(),
            density,
            is_weakly_connected,
            is_strongly_connected: strong.len() == 1,
            is_acyclic,
            isolated_nodes: ids(&isolated),
            strongly_connected_components: strong.len(),
            weakly_connected_components: weak.len(),
            largest_component_size: weak.iter().map(Vec::len).max().unwrap_or(0),
            centrality,
            patterns,
            quality_score,
        }
    }

    /// Quality heuristic in [0, 1].
    pub fn quality_score(
        &self,
        is_weakly_connected: bool,
        is_acyclic: bool,
        isolated: usize,
        node_count: usize,
        density: f64,
    ) -> f64 {
        if node_count == 0 {
            return 0.0;
        }
        let w = &self.weights;
        let mut score = 1.0;
        if !is_weakly_connected {
            score *= w.disconnected_factor;
        }
        if !is_acyclic {
            score *= w.cyclic_factor;
        }
        score *= 1.0 - isolated as f64 / node_count as f64;
        if (w.density_min..=w.density_max).contains(&density) {
            score *= w.density_bonus;
        } else {
            score *= w.density_penalty;
        }
        score.clamp(0.0, 1.0)
    }

    /// Elementary cycles as node-id sequences.
    pub fn find_cycles(&self, view: &AdjacencyView) -> Vec<Vec<String>> {
        Graph::from_view(view)
            .simple_cycles(MAX_CYCLES)
            .into_iter()
            .map(|cycle| cycle.iter().filter_map(|&i| view.node(i)).map(str::to_string).collect())
            .collect()
    }

    pub fn check_connectivity(&self, view: &AdjacencyView) -> ConnectivityReport {
        let graph = Graph::from_view(view);
        if graph.n == 0 {
            return ConnectivityReport::default();
        }
        let weak = graph.weak_components();
        let strong = graph.strong_components();
        let isolated: Vec<String> = graph
            .isolated()
            .into_iter()
            .filter_map(|i| view.node(i))
            .map(str::to_string)
            .collect();

        let mut issues = Vec::new();
        if weak.len() > 1 {
            issues.push(StructuralIssue {
                kind: IssueKind::DisconnectedComponents,
                severity: Severity::High,
                description: format!("Network has {} disconnected components", weak.len()),
                nodes: Vec::new(),
            });
        }
        if !isolated.is_empty() {
            issues.push(StructuralIssue {
                kind: IssueKind::IsolatedNodes,
                severity: Severity::Medium,
                description: format!("{} milestones have no causal connections", isolated.len()),
                nodes: isolated,
            });
        }

        ConnectivityReport {
            is_strongly_connected: strong.len() == 1,
            is_weakly_connected: weak.len() == 1,
            components: weak.len(),
            largest_component_size: weak.iter().map(Vec::len).max().unwrap_or(0),
            issues,
        }
    }

    /// Cycles reported as circular dependencies; enumeration only runs on cyclic graphs.
    pub fn validate_causal_flow(&self, view: &AdjacencyView) -> FlowReport {
        if Graph::from_view(view).is_acyclic() {
            return FlowReport {
                is_acyclic: true,
                cycles: Vec::new(),
                issues: Vec::new(),
            };
        }
        let cycles = self.find_cycles(view);
        let issues = cycles
            .iter()
            .map(|cycle| StructuralIssue {
                kind: IssueKind::CircularDependency,
                severity: Severity::High,
                description: format!("Circular dependency: {}", cycle.join(" -> ")),
                nodes: cycle.clone(),
            })
            .collect();
        FlowReport {
            is_acyclic: false,
            cycles,
            issues,
        }
    }

    /// Longest paths, bottlenecks and bridge edges.
    ///
    /// On a DAG the paths are exact longest paths ending at distinct nodes.
    /// On a cyclic graph they come from a greedy walk seeded at the
    /// highest-degree nodes and the report is flagged approximate.
    pub fn find_critical_paths(&self, view: &AdjacencyView, top_k: usize) -> CriticalPathReport {
        let graph = Graph::from_view(view);
        if graph.n == 0 {
            return CriticalPathReport::default();
        }
        let to_ids = |idx: &[usize]| -> Vec<String> {
            idx.iter().filter_map(|&i| view.node(i)).map(str::to_string).collect()
        };

        let (raw_paths, approximate) = match graph.topological_order() {
            Some(order) => (longest_dag_paths(&graph, &order, top_k), false),
            None => (degree_ranked_paths(&graph, top_k), true),
        };
        let longest_paths = raw_paths
            .iter()
            .map(|p| CriticalPath {
                nodes: to_ids(p),
                length: p.len(),
            })
            .collect();

        let betweenness = graph.betweenness();
        let mut ranked: Vec<usize> = (0..graph.n).filter(|&i| betweenness[i] > 0.0).collect();
        ranked.sort_by(|&a, &b| betweenness[b].total_cmp(&betweenness[a]).then(a.cmp(&b)));
        let bottleneck_nodes = ranked
            .into_iter()
            .take(3)
            .filter_map(|i| view.node(i).map(|id| (id.to_string(), betweenness[i])))
            .collect();

        let critical_edges = graph
            .bridges()
            .into_iter()
            .filter_map(|(a, b)| Some((view.node(a)?.to_string(), view.node(b)?.to_string())))
            .collect();

        CriticalPathReport {
            longest_paths,
            approximate,
            bottleneck_nodes,
            critical_edges,
        }
    }
}

/// Longest path ending at each node, top `k` by length.
fn longest_dag_paths(graph: &Graph, order: &[usize], k: usize) -> Vec<Vec<usize>> {
    let mut dist = vec![0usize; graph.n];
    let mut parent = vec![usize::MAX; graph.n];
    for &u in order {
        for &v in &graph.out[u] {
            if dist[u] + 1 > dist[v] {
                dist[v] = dist[u] + 1;
                parent[v] = u;
            }
        }
    }
    let mut ends: Vec<usize> = (0..graph.n).filter(|&i| dist[i] > 0).collect();
    ends.sort_by(|&a, &b| dist[b].cmp(&dist[a]).then(a.cmp(&b)));
    ends.into_iter()
        .take(k)
        .map(|end| {
            let mut path = vec![end];
            let mut cur = end;
            while parent[cur] != usize::MAX {
                cur = parent[cur];
                path.push(cur);
            }
            path.reverse();
            path
        })
        .collect()
}

/// Greedy walks from the highest-degree nodes, never revisiting a node.
fn degree_ranked_paths(graph: &Graph, k: usize) -> Vec<Vec<usize>> {
    let degree = |i: usize| graph.out[i].len() + graph.inn[i].len();
    let mut starts: Vec<usize> = (0..graph.n).collect();
    starts.sort_by(|&a, &b| degree(b).cmp(&degree(a)).then(a.cmp(&b)));

    let mut paths: Vec<Vec<usize>> = Vec::new();
    for start in starts.into_iter().take(k) {
        let mut visited = vec![false; graph.n];
        visited[start] = true;
        let mut path = vec![start];
        let mut cur = start;
        while let Some(next) = graph.out[cur]
            .iter()
            .copied()
            .filter(|&v| !visited[v])
            .max_by(|&a, &b| degree(a).cmp(&degree(b)).then(b.cmp(&a)))
        {
            visited[next] = true;
            path.push(next);
            cur = next;
        }
        if path.len() > 1 && !paths.contains(&path) {
            paths.push(path);
        }
    }
    paths.sort_by(|a, b| b.len().cmp(&a.len()));
    paths
}

#[cfg(test)]
mod tests {
    use super::*;

    fn view(n: usize, edges: &[(usize, usize)]) -> AdjacencyView {
        let mut matrix = vec![vec![0u8; n]; n];
        for &(i, j) in edges {
            matrix[i][j] = 1;
        }
        AdjacencyView {
            nodes: (0..n).map(|i| format!("n{}", i)).collect(),
            labels: (0..n).map(|i| format!("Node {}", i)).collect(),
            matrix,
            generation: 0,
        }
    }

    #[test]
    fn test_three_cycle_detected() {
        // goal -> A, A -> B -> C -> A
        let v = view(4, &[(0, 1), (1, 2), (2, 3), (3, 1)]);
        let analyzer = StructureAnalyzer::new();
        let report = analyzer.analyze(&v);
        assert!(!report.is_acyclic);
        assert_eq!(report.patterns.cycles, 1);

        let cycles = analyzer.find_cycles(&v);
        assert_eq!(cycles.len(), 1);
        assert_eq!(cycles[0], vec!["n1", "n2", "n3"]);

        let flow = analyzer.validate_causal_flow(&v);
        assert!(!flow.is_acyclic);
        assert_eq!(flow.issues.len(), 1);
        assert_eq!(flow.issues[0].kind, IssueKind::CircularDependency);
        assert_eq!(flow.issues[0].severity, Severity::High);
    }

    #[test]
    fn test_chain_metrics() {
        let v = view(4, &[(0, 1), (1, 2), (2, 3)]);
        let report = StructureAnalyzer::new().analyze(&v);
        assert_eq!(report.node_count, 4);
        assert_eq!(report.edge_count, 3);
        assert!((report.density - 0.25).abs() < 1e-9);
        assert!(report.is_acyclic);
        assert!(report.is_weakly_connected);
        assert!(!report.is_strongly_connected);
        assert_eq!(report.strongly_connected_components, 4);
        assert_eq!(report.patterns.linear_chains, 2);
        assert_eq!(report.patterns.branching_points, 0);
        // density inside the band: 1.0 * 1.1, clamped
        assert_eq!(report.quality_score, 1.0);

        // middle nodes of a 4-chain each sit on 2 of 6 ordered pairs
        let b = report.centrality["n1"].betweenness;
        assert!((b - 2.0 / 6.0).abs() < 1e-9);
        assert_eq!(report.centrality["n0"].betweenness, 0.0);
    }

    #[test]
    fn test_patterns_branch_and_converge() {
        // 0 -> 1, 0 -> 2, 1 -> 3, 2 -> 3
        let v = view(4, &[(0, 1), (0, 2), (1, 3), (2, 3)]);
        let report = StructureAnalyzer::new().analyze(&v);
        assert_eq!(report.patterns.branching_points, 1);
        assert_eq!(report.patterns.convergence_points, 1);
        assert_eq!(report.patterns.linear_chains, 2);
    }

    #[test]
    fn test_disconnected_quality_and_issues() {
        // 0 -> 1, node 2 isolated
        let v = view(3, &[(0, 1)]);
        let analyzer = StructureAnalyzer::new();
        let report = analyzer.analyze(&v);
        assert!(!report.is_weakly_connected);
        assert_eq!(report.isolated_nodes, vec!["n2".to_string()]);
        // density 1/6 in band: 0.7 * (2/3) * 1.1
        let expected = 0.7 * (2.0 / 3.0) * 1.1;
        assert!((report.quality_score - expected).abs() < 1e-9);

        let connectivity = analyzer.check_connectivity(&v);
        assert_eq!(connectivity.components, 2);
        assert_eq!(connectivity.largest_component_size, 2);
        let kinds: Vec<IssueKind> = connectivity.issues.iter().map(|i| i.kind).collect();
        assert_eq!(kinds, vec![IssueKind::DisconnectedComponents, IssueKind::IsolatedNodes]);
    }

    #[test]
    fn test_cyclic_quality() {
        let v = view(3, &[(0, 1), (1, 2), (2, 1)]);
        let report = StructureAnalyzer::new().analyze(&v);
        // density 3/6 in band: 0.5 * 1.1
        assert!((report.quality_score - 0.55).abs() < 1e-9);
    }

    #[test]
    fn test_degenerate_single_node() {
        let v = view(1, &[]);
        let analyzer = StructureAnalyzer::new();
        let report = analyzer.analyze(&v);
        assert_eq!(report.node_count, 1);
        assert_eq!(report.density, 0.0);
        assert!(report.is_acyclic);
        assert_eq!(report.quality_score, 0.0);
        let paths = analyzer.find_critical_paths(&v, 5);
        assert!(paths.longest_paths.is_empty());
        assert!(paths.critical_edges.is_empty());
    }

    #[test]
    fn test_critical_paths_on_dag() {
        // 0 -> 1 -> 2 -> 3, 0 -> 4
        let v = view(5, &[(0, 1), (1, 2), (2, 3), (0, 4)]);
        let report = StructureAnalyzer::new().find_critical_paths(&v, 5);
        assert!(!report.approximate);
        assert_eq!(report.longest_paths[0].nodes, vec!["n0", "n1", "n2", "n3"]);
        assert_eq!(report.longest_paths[0].length, 4);
        assert_eq!(report.bottleneck_nodes[0].0, "n1");
        // every edge of a tree is a bridge
        assert_eq!(report.critical_edges.len(), 4);
    }

    #[test]
    fn test_critical_paths_on_cycle_are_approximate() {
        let v = view(4, &[(0, 1), (1, 2), (2, 3), (3, 1)]);
        let report = StructureAnalyzer::new().find_critical_paths(&v, 3);
        assert!(report.approximate);
        assert!(!report.longest_paths.is_empty());
        // only the goal edge is a bridge; the triangle is 2-edge-connected
        assert_eq!(report.critical_edges, vec![("n0".to_string(), "n1".to_string())]);
    }

    #[test]
    fn test_closeness_and_degree() {
        let v = view(3, &[(0, 1), (1, 2)]);
        let report = StructureAnalyzer::new().analyze(&v);
        // n2 is reached from n1 (1) and n0 (2): (2/3) * (2/2)
        assert!((report.centrality["n2"].closeness - 2.0 / 3.0).abs() < 1e-9);
        assert_eq!(report.centrality["n0"].closeness, 0.0);
        assert!((report.centrality["n1"].degree - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_custom_weights() {
        let weights = QualityWeights {
            cyclic_factor: 1.0,
            ..Default::default()
        };
        let v = view(3, &[(0, 1), (1, 2), (2, 1)]);
        let report = StructureAnalyzer::with_weights(weights).analyze(&v);
        assert_eq!(report.quality_score, 1.0);
    }

    fn complete_forward(n: usize) -> AdjacencyView {
        let edges: Vec<(usize, usize)> = (0..n)
            .flat_map(|i| (i + 1..n).map(move |j| (i, j)))
            .collect();
        view(n, &edges)
    }

    #[test]
    fn test_dense_dag_flow_skips_enumeration() {
        // 2^38 paths; any path-by-path search would not finish
        let v = complete_forward(40);
        let analyzer = StructureAnalyzer::new();

        let flow = analyzer.validate_causal_flow(&v);
        assert!(flow.is_acyclic);
        assert!(flow.cycles.is_empty());
        assert!(flow.issues.is_empty());
        assert!(analyzer.find_cycles(&v).is_empty());

        let report = analyzer.analyze(&v);
        assert!(report.is_acyclic);
        assert_eq!(report.patterns.cycles, 0);

        let paths = analyzer.find_critical_paths(&v, 5);
        assert!(!paths.approximate);
        assert_eq!(paths.longest_paths[0].length, 40);
    }

    #[test]
    fn test_dense_cycles_are_capped() {
        let edges: Vec<(usize, usize)> = (0..14)
            .flat_map(|i| (0..14).filter(move |&j| j != i).map(move |j| (i, j)))
            .collect();
        let v = view(14, &edges);
        let analyzer = StructureAnalyzer::new();

        let cycles = analyzer.find_cycles(&v);
        assert!(!cycles.is_empty());
        assert!(cycles.len() <= MAX_CYCLES);
        let flow = analyzer.validate_causal_flow(&v);
        assert!(!flow.is_acyclic);
        assert_eq!(flow.issues.len(), flow.cycles.len());
    }

    #[test]
    fn test_cycles_stay_inside_component() {
        // two disjoint 2-cycles joined by a one-way edge
        let v = view(5, &[(0, 1), (1, 2), (2, 1), (2, 3), (3, 4), (4, 3)]);
        let cycles = StructureAnalyzer::new().find_cycles(&v);
        assert_eq!(cycles, vec![vec!["n1", "n2"], vec!["n3", "n4"]]);
    }
}
