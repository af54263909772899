//! Process discovery from event logs
//!
//! Inductive-style miner over the directly-follows graph. Cuts are tried in
//! the order xor, sequence, parallel, loop; a log that admits none of them
//! falls through to a flower model.

use super::EngineError;
use crate::process::{EventLog, ProcessTree};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::unionfind::UnionFind;
use petgraph::visit::Dfs;
use std::collections::{BTreeMap, BTreeSet};

const MAX_DEPTH: usize = 64;

/// Distinct traces; frequencies do not influence the cuts
type Sublog<'a> = BTreeSet<Vec<&'a str>>;

pub fn discover(log: &EventLog) -> Result<ProcessTree, EngineError> {
    if log.is_empty() {
        return Err(EngineError::Discovery(format!(
            "event log '{}' has no traces",
            log.name
        )));
    }
    if log.activities().is_empty() {
        return Err(EngineError::Discovery(format!(
            "event log '{}' has no events",
            log.name
        )));
    }

    let traces: Sublog<'_> = log
        .traces
        .iter()
        .map(|t| t.events.iter().map(String::as_str).collect())
        .collect();
    let tree = mine(&traces, 0).normalize();

    tracing::debug!(
        log = %log.name,
        traces = log.len(),
        variants = traces.len(),
        tree = %tree,
        "Discovered process tree"
    );
    Ok(tree)
}

fn mine(log: &Sublog<'_>, depth: usize) -> ProcessTree {
    let non_empty: Sublog<'_> = log.iter().filter(|t| !t.is_empty()).cloned().collect();
    if non_empty.is_empty() {
        return ProcessTree::Silent;
    }
    if non_empty.len() < log.len() {
        return ProcessTree::xor(vec![ProcessTree::Silent, mine(&non_empty, depth + 1)]);
    }
    if depth >= MAX_DEPTH {
        return flower(log);
    }

    let dfg = Dfg::new(log);
    if let [label] = dfg.activities.as_slice() {
        let activity = ProcessTree::activity(*label);
        return if log.iter().all(|t| t.len() == 1) {
            activity
        } else {
            ProcessTree::looped(activity, ProcessTree::Silent)
        };
    }

    if let Some(groups) = dfg.xor_cut() {
        let children = groups
            .iter()
            .map(|g| mine(&select(log, g), depth + 1))
            .collect();
        return ProcessTree::xor(children);
    }
    if let Some(groups) = dfg.sequence_cut() {
        let children = groups
            .iter()
            .map(|g| mine(&project(log, g), depth + 1))
            .collect();
        return ProcessTree::sequence(children);
    }
    if let Some(groups) = dfg.parallel_cut() {
        let children = groups
            .iter()
            .map(|g| mine(&project(log, g), depth + 1))
            .collect();
        return ProcessTree::parallel(children);
    }
    if let Some((body, redo)) = dfg.loop_cut() {
        let (body_log, redo_logs) = split_loop(log, &body, &redo);
        let body_tree = mine(&body_log, depth + 1);
        let mut redo_trees: Vec<ProcessTree> = redo_logs
            .iter()
            .map(|l| mine(l, depth + 1))
            .collect();
        let redo_tree = if redo_trees.len() == 1 {
            redo_trees.remove(0)
        } else {
            ProcessTree::xor(redo_trees)
        };
        return ProcessTree::looped(body_tree, redo_tree);
    }

    flower(log)
}

/// Any activity, any number of times
fn flower(log: &Sublog<'_>) -> ProcessTree {
    let activities: BTreeSet<&str> = log.iter().flatten().copied().collect();
    let choice = activities.into_iter().map(ProcessTree::activity).collect();
    ProcessTree::looped(ProcessTree::xor(choice), ProcessTree::Silent)
}

/// Traces that live entirely inside `group`
fn select<'a>(log: &Sublog<'a>, group: &BTreeSet<&'a str>) -> Sublog<'a> {
    log.iter()
        .filter(|t| t.iter().all(|a| group.contains(a)))
        .cloned()
        .collect()
}

/// Every trace restricted to the activities of `group`
fn project<'a>(log: &Sublog<'a>, group: &BTreeSet<&'a str>) -> Sublog<'a> {
    log.iter()
        .map(|t| t.iter().copied().filter(|a| group.contains(a)).collect())
        .collect()
}

/// Cut traces into body iterations and redo segments
fn split_loop<'a>(
    log: &Sublog<'a>,
    body: &BTreeSet<&'a str>,
    redo: &[BTreeSet<&'a str>],
) -> (Sublog<'a>, Vec<Sublog<'a>>) {
    let mut body_log = Sublog::new();
    let mut redo_logs = vec![Sublog::new(); redo.len()];

    let mut flush = |segment: &mut Vec<&'a str>, in_body: bool| {
        if segment.is_empty() {
            return;
        }
        if in_body {
            body_log.insert(std::mem::take(segment));
        } else {
            for (group, sublog) in redo.iter().zip(redo_logs.iter_mut()) {
                let part: Vec<&str> = segment
                    .iter()
                    .copied()
                    .filter(|a| group.contains(a))
                    .collect();
                if !part.is_empty() {
                    sublog.insert(part);
                }
            }
            segment.clear();
        }
    };

    for trace in log {
        let mut segment = Vec::new();
        let mut in_body = true;
        for &activity in trace {
            let here = body.contains(activity);
            if here != in_body {
                flush(&mut segment, in_body);
                in_body = here;
            }
            segment.push(activity);
        }
        flush(&mut segment, in_body);
    }

    (body_log, redo_logs)
}

/// Directly-follows graph of a sublog without empty traces
struct Dfg<'a> {
    activities: Vec<&'a str>,
    edges: BTreeSet<(usize, usize)>,
    start: BTreeSet<usize>,
    end: BTreeSet<usize>,
}

impl<'a> Dfg<'a> {
    fn new(log: &Sublog<'a>) -> Self {
        let activities: Vec<&str> = log
            .iter()
            .flatten()
            .copied()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let index: BTreeMap<&str, usize> =
            activities.iter().enumerate().map(|(i, a)| (*a, i)).collect();

        let mut edges = BTreeSet::new();
        let mut start = BTreeSet::new();
        let mut end = BTreeSet::new();
        for trace in log {
            let ids: Vec<usize> = trace.iter().filter_map(|a| index.get(a).copied()).collect();
            if let (Some(first), Some(last)) = (ids.first(), ids.last()) {
                start.insert(*first);
                end.insert(*last);
            }
            for pair in ids.windows(2) {
                edges.insert((pair[0], pair[1]));
            }
        }

        Self {
            activities,
            edges,
            start,
            end,
        }
    }

    fn len(&self) -> usize {
        self.activities.len()
    }

    fn names(&self, ids: &[usize]) -> BTreeSet<&'a str> {
        ids.iter().map(|&i| self.activities[i]).collect()
    }

    fn xor_cut(&self) -> Option<Vec<BTreeSet<&'a str>>> {
        let mut uf = UnionFind::new(self.len());
        for &(a, b) in &self.edges {
            uf.union(a, b);
        }
        let groups = components(uf, self.len());
        (groups.len() > 1).then(|| groups.iter().map(|g| self.names(g)).collect())
    }

    fn sequence_cut(&self) -> Option<Vec<BTreeSet<&'a str>>> {
        let n = self.len();
        let reach = reachability(n, &self.edges);

        // Mutually reachable or mutually unrelated activities share a group
        let mut uf = UnionFind::new(n);
        for a in 0..n {
            for b in a + 1..n {
                if reach[a][b] == reach[b][a] {
                    uf.union(a, b);
                }
            }
        }
        let mut groups = components(uf, n);
        if groups.len() < 2 {
            return None;
        }

        for (i, x) in groups.iter().enumerate() {
            for y in &groups[i + 1..] {
                let forward = x
                    .iter()
                    .all(|&a| y.iter().all(|&b| reach[a][b] && !reach[b][a]));
                let backward = x
                    .iter()
                    .all(|&a| y.iter().all(|&b| reach[b][a] && !reach[a][b]));
                if !forward && !backward {
                    return None;
                }
            }
        }

        groups.sort_by_key(|g| {
            (0..n)
                .filter(|&other| reach[other][g[0]] && !g.contains(&other))
                .count()
        });
        Some(groups.iter().map(|g| self.names(g)).collect())
    }

    fn parallel_cut(&self) -> Option<Vec<BTreeSet<&'a str>>> {
        let n = self.len();
        // Activities not connected in both directions cannot run concurrently
        let mut uf = UnionFind::new(n);
        for a in 0..n {
            for b in a + 1..n {
                if !(self.edges.contains(&(a, b)) && self.edges.contains(&(b, a))) {
                    uf.union(a, b);
                }
            }
        }
        let groups = components(uf, n);
        if groups.len() < 2 {
            return None;
        }
        let complete = groups.iter().all(|g| {
            g.iter().any(|a| self.start.contains(a)) && g.iter().any(|a| self.end.contains(a))
        });
        complete.then(|| groups.iter().map(|g| self.names(g)).collect())
    }

    fn loop_cut(&self) -> Option<(BTreeSet<&'a str>, Vec<BTreeSet<&'a str>>)> {
        let n = self.len();
        let core: BTreeSet<usize> = self.start.union(&self.end).copied().collect();
        if core.len() == n {
            return None;
        }

        let mut uf = UnionFind::new(n);
        for &(a, b) in &self.edges {
            if !core.contains(&a) && !core.contains(&b) {
                uf.union(a, b);
            }
        }

        let mut body: Vec<usize> = core.iter().copied().collect();
        let mut redo = Vec::new();
        for group in components(uf, n) {
            if group.iter().any(|a| core.contains(a)) {
                continue;
            }
            if self.is_redo(&group, &core) {
                redo.push(self.names(&group));
            } else {
                body.extend(group);
            }
        }

        (!redo.is_empty()).then(|| (self.names(&body), redo))
    }

    /// A redo part is entered only from every end activity and left only to
    /// every start activity
    fn is_redo(&self, group: &[usize], core: &BTreeSet<usize>) -> bool {
        let inside = |a: &usize| group.contains(a);
        let edges_ok = self.edges.iter().all(|(x, y)| {
            if core.contains(x) && inside(y) {
                self.end.contains(x)
            } else if inside(x) && core.contains(y) {
                self.start.contains(y)
            } else {
                true
            }
        });
        let entered_from_all_ends = self
            .end
            .iter()
            .all(|e| group.iter().any(|g| self.edges.contains(&(*e, *g))));
        let leaves_to_all_starts = self
            .start
            .iter()
            .all(|s| group.iter().any(|g| self.edges.contains(&(*g, *s))));
        edges_ok && entered_from_all_ends && leaves_to_all_starts
    }
}

/// `reach[a][b]` holds when a non-empty path leads from `a` to another node `b`
fn reachability(n: usize, edges: &BTreeSet<(usize, usize)>) -> Vec<Vec<bool>> {
    let mut graph: DiGraph<usize, ()> = DiGraph::new();
    let nodes: Vec<NodeIndex> = (0..n).map(|i| graph.add_node(i)).collect();
    for &(a, b) in edges {
        graph.add_edge(nodes[a], nodes[b], ());
    }

    nodes
        .iter()
        .map(|&start| {
            let mut row = vec![false; n];
            let mut dfs = Dfs::new(&graph, start);
            while let Some(node) = dfs.next(&graph) {
                row[graph[node]] = true;
            }
            row[graph[start]] = false;
            row
        })
        .collect()
}

/// Groups of a union-find, ordered by their smallest member
fn components(uf: UnionFind<usize>, n: usize) -> Vec<Vec<usize>> {
    let labels = uf.into_labeling();
    let mut groups: Vec<(usize, Vec<usize>)> = Vec::new();
    for (node, label) in labels.into_iter().enumerate().take(n) {
        match groups.iter_mut().find(|(l, _)| *l == label) {
            Some((_, members)) => members.push(node),
            None => groups.push((label, vec![node])),
        }
    }
    groups.into_iter().map(|(_, members)| members).collect()
}
