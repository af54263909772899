//! Layered left-to-right graph layout
//!
//! Back edges are found with a depth-first search from the roots (start events) and
//! ignored for layering. Nodes are layered by longest path and ordered inside
//! a layer by the barycenter of their predecessors. The result only depends
//! on the order of nodes and flows in the graph.

use crate::process::{BpmnGraph, BpmnNodeKind, Bounds};
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use std::collections::{HashMap, HashSet};

const LAYER_GAP: f64 = 160.0;
const ROW_GAP: f64 = 120.0;
const MARGIN: f64 = 60.0;
const SWEEPS: usize = 4;

fn size_of(kind: &BpmnNodeKind) -> (f64, f64) {
    match kind {
        BpmnNodeKind::Task { .. } => (100.0, 80.0),
        BpmnNodeKind::ExclusiveGateway { .. }
        | BpmnNodeKind::ParallelGateway { .. }
        | BpmnNodeKind::InclusiveGateway { .. } => (50.0, 50.0),
        BpmnNodeKind::StartEvent | BpmnNodeKind::EndEvent | BpmnNodeKind::Intermediate => {
            (36.0, 36.0)
        }
    }
}

fn coord(n: usize) -> f64 {
    f64::from(u32::try_from(n).unwrap_or(u32::MAX))
}

/// Positioned nodes and routed edges of a layered drawing
#[derive(Debug, Clone)]
pub struct Layered {
    pub bounds: Vec<Bounds>,
    /// One polyline per input edge, in input order
    pub routes: Vec<Vec<(f64, f64)>>,
    pub width: f64,
    pub height: f64,
}

/// Lay out a directed graph given node sizes and edges as index pairs.
/// Depth-first search for back edges starts from `roots` first.
pub fn layered(sizes: &[(f64, f64)], edges: &[(usize, usize)], roots: &[usize]) -> Layered {
    let count = sizes.len();
    let mut dag: DiGraph<usize, ()> = DiGraph::new();
    let indices: Vec<NodeIndex> = (0..count).map(|i| dag.add_node(i)).collect();

    let mut order: Vec<usize> = roots.iter().copied().filter(|&r| r < count).collect();
    order.extend(0..count);
    let back_edges = find_back_edges(count, edges, &order);
    for (i, &(s, t)) in edges.iter().enumerate() {
        if !back_edges.contains(&i) && s != t {
            dag.update_edge(indices[s], indices[t], ());
        }
    }

    let layers = assign_layers(&dag);
    let rows = order_layers(&dag, &layers);

    let max_rows = rows.iter().map(Vec::len).max().unwrap_or(1);
    let total_height = coord(max_rows) * ROW_GAP;

    let mut bounds = vec![Bounds::default(); count];
    for (layer, row) in rows.iter().enumerate() {
        let offset = (total_height - coord(row.len()) * ROW_GAP) / 2.0;
        for (slot, &node) in row.iter().enumerate() {
            let cx = MARGIN + coord(layer) * LAYER_GAP;
            let cy = MARGIN + offset + coord(slot) * ROW_GAP + ROW_GAP / 2.0;
            let (w, h) = sizes[node];
            bounds[node] = Bounds {
                x: cx - w / 2.0,
                y: cy - h / 2.0,
                width: w,
                height: h,
            };
        }
    }

    let bottom = MARGIN + total_height + ROW_GAP / 2.0;
    let routes = edges
        .iter()
        .map(|&(s, t)| route(&bounds[s], &bounds[t], layers[s] >= layers[t], bottom))
        .collect();

    Layered {
        bounds,
        routes,
        width: 2.0 * MARGIN + coord(rows.len().saturating_sub(1)) * LAYER_GAP + LAYER_GAP / 2.0,
        height: bottom + MARGIN,
    }
}

/// Assign bounds to every node and waypoints to every flow
pub fn layout(graph: &mut BpmnGraph) {
    if graph.nodes.is_empty() {
        return;
    }

    let position: HashMap<String, usize> = graph
        .nodes
        .iter()
        .enumerate()
        .map(|(i, n)| (n.id.clone(), i))
        .collect();
    let mut edges = Vec::with_capacity(graph.flows.len());
    let mut routed = Vec::with_capacity(graph.flows.len());
    for (i, flow) in graph.flows.iter().enumerate() {
        if let (Some(&s), Some(&t)) = (position.get(&flow.source), position.get(&flow.target)) {
            edges.push((s, t));
            routed.push(i);
        }
    }
    let sizes: Vec<(f64, f64)> = graph.nodes.iter().map(|n| size_of(&n.kind)).collect();
    let roots: Vec<usize> = graph
        .nodes
        .iter()
        .enumerate()
        .filter(|(_, n)| n.kind == BpmnNodeKind::StartEvent)
        .map(|(i, _)| i)
        .collect();

    let drawing = layered(&sizes, &edges, &roots);
    for (node, bounds) in graph.nodes.iter_mut().zip(drawing.bounds) {
        node.bounds = bounds;
    }
    for (flow, waypoints) in routed.into_iter().zip(drawing.routes) {
        graph.flows[flow].waypoints = waypoints;
    }
}

/// Indices into `edges` that close a cycle in depth-first order
fn find_back_edges(node_count: usize, edges: &[(usize, usize)], roots: &[usize]) -> HashSet<usize> {
    let mut adjacency: Vec<Vec<(usize, usize)>> = vec![Vec::new(); node_count];
    for (i, &(s, t)) in edges.iter().enumerate() {
        adjacency[s].push((i, t));
    }

    // 0 = unvisited, 1 = on stack, 2 = done
    let mut state = vec![0u8; node_count];
    let mut back = HashSet::new();
    for &root in roots {
        if state[root] != 0 {
            continue;
        }
        let mut stack: Vec<(usize, usize)> = vec![(root, 0)];
        state[root] = 1;
        while let Some(top) = stack.last_mut() {
            let node = top.0;
            if let Some(&(edge, target)) = adjacency[node].get(top.1) {
                top.1 += 1;
                match state[target] {
                    0 => {
                        state[target] = 1;
                        stack.push((target, 0));
                    }
                    1 => {
                        back.insert(edge);
                    }
                    _ => {}
                }
            } else {
                state[node] = 2;
                stack.pop();
            }
        }
    }
    back
}

/// Longest-path layer per node
fn assign_layers(dag: &DiGraph<usize, ()>) -> Vec<usize> {
    let mut layers = vec![0; dag.node_count()];
    let order = toposort(dag, None).unwrap_or_else(|_| dag.node_indices().collect());
    for node in order {
        let layer = dag
            .edges_directed(node, Direction::Incoming)
            .map(|e| layers[e.source().index()] + 1)
            .max()
            .unwrap_or(0);
        layers[node.index()] = layer;
    }
    layers
}

fn order_layers(dag: &DiGraph<usize, ()>, layers: &[usize]) -> Vec<Vec<usize>> {
    let depth = layers.iter().copied().max().unwrap_or(0) + 1;
    let mut rows: Vec<Vec<usize>> = vec![Vec::new(); depth];
    for (node, &layer) in layers.iter().enumerate() {
        rows[layer].push(node);
    }

    for _ in 0..SWEEPS {
        let mut slot = vec![0usize; layers.len()];
        for row in &rows {
            for (i, &node) in row.iter().enumerate() {
                slot[node] = i;
            }
        }
        for row in rows.iter_mut().skip(1) {
            let mut keyed: Vec<(usize, usize, usize)> = row
                .iter()
                .enumerate()
                .map(|(i, &node)| {
                    let preds: Vec<usize> = dag
                        .neighbors_directed(NodeIndex::new(node), Direction::Incoming)
                        .map(|p| slot[p.index()])
                        .collect();
                    // Scaled barycenter keeps the sort key integral
                    let key = if preds.is_empty() {
                        i * 100
                    } else {
                        preds.iter().sum::<usize>() * 100 / preds.len()
                    };
                    (key, i, node)
                })
                .collect();
            keyed.sort_unstable();
            *row = keyed.into_iter().map(|(_, _, node)| node).collect();
            for (i, &node) in row.iter().enumerate() {
                slot[node] = i;
            }
        }
    }
    rows
}

fn route(source: &Bounds, target: &Bounds, backwards: bool, bottom: f64) -> Vec<(f64, f64)> {
    if backwards {
        let (from_x, _) = source.center();
        let (to_x, _) = target.center();
        return vec![
            (from_x, source.y + source.height),
            (from_x, bottom),
            (to_x, bottom),
            (to_x, target.y + target.height),
        ];
    }
    let exit = (source.x + source.width, source.y + source.height / 2.0);
    let entry = (target.x, target.y + target.height / 2.0);
    if (exit.1 - entry.1).abs() < f64::EPSILON {
        vec![exit, entry]
    } else {
        let mid = f64::midpoint(exit.0, entry.0);
        vec![exit, (mid, exit.1), (mid, entry.1), entry]
    }
}
