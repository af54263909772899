//! Petri net to BPMN

use super::layout;
use crate::process::{
    BpmnGraph, BpmnNode, BpmnNodeKind, Bounds, GatewayDirection, Marking, PetriNet, SequenceFlow,
};
use std::collections::{BTreeSet, HashMap};

#[derive(Debug, Clone, PartialEq)]
enum Draft {
    Start,
    End,
    Task(String),
    Exclusive(GatewayDirection),
    Parallel(GatewayDirection),
    /// Routing node with no BPMN counterpart; removed when it has exactly
    /// one incoming and one outgoing flow
    Pass,
}

#[derive(Default)]
struct DraftGraph {
    nodes: Vec<Option<Draft>>,
    edges: BTreeSet<(usize, usize)>,
}

impl DraftGraph {
    fn add(&mut self, draft: Draft) -> usize {
        self.nodes.push(Some(draft));
        self.nodes.len() - 1
    }

    fn link(&mut self, from: usize, to: usize) {
        self.edges.insert((from, to));
    }

    fn incoming(&self, node: usize) -> Vec<usize> {
        self.edges
            .iter()
            .filter(|(_, t)| *t == node)
            .map(|(s, _)| *s)
            .collect()
    }

    fn outgoing(&self, node: usize) -> Vec<usize> {
        self.edges
            .iter()
            .filter(|(s, _)| *s == node)
            .map(|(_, t)| *t)
            .collect()
    }

    /// Node pair standing in for a net element: `(entry, exit)`
    fn element(
        &mut self,
        body: Draft,
        inputs: usize,
        outputs: usize,
        gateway: fn(GatewayDirection) -> Draft,
    ) -> (usize, usize) {
        let node = self.add(body);
        let entry = if inputs > 1 {
            let join = self.add(gateway(GatewayDirection::Converging));
            self.link(join, node);
            join
        } else {
            node
        };
        let exit = if outputs > 1 {
            let split = self.add(gateway(GatewayDirection::Diverging));
            self.link(node, split);
            split
        } else {
            node
        };
        (entry, exit)
    }

    /// Remove pass-through nodes and gateways that no longer branch
    fn collapse(&mut self) {
        loop {
            let candidate = (0..self.nodes.len()).find(|&i| {
                let collapsible = matches!(
                    &self.nodes[i],
                    Some(Draft::Pass | Draft::Exclusive(_) | Draft::Parallel(_))
                );
                if !collapsible {
                    return false;
                }
                let ins = self.incoming(i);
                let outs = self.outgoing(i);
                ins.len() == 1 && outs.len() == 1 && ins[0] != i && outs[0] != i
            });
            let Some(node) = candidate else { break };
            let source = self.incoming(node)[0];
            let target = self.outgoing(node)[0];
            self.edges.remove(&(source, node));
            self.edges.remove(&(node, target));
            self.edges.insert((source, target));
            self.nodes[node] = None;
        }
    }
}

fn exclusive(direction: GatewayDirection) -> Draft {
    Draft::Exclusive(direction)
}

fn parallel(direction: GatewayDirection) -> Draft {
    Draft::Parallel(direction)
}

/// Translate a Petri net into a laid-out BPMN graph
///
/// Places branching or merging control become exclusive gateways, labelled
/// transitions become tasks, and transitions consuming or producing several
/// tokens become parallel gateways.
pub fn to_bpmn(net: &PetriNet, initial: &Marking, final_marking: &Marking) -> BpmnGraph {
    let mut graph = DraftGraph::default();
    let start = graph.add(Draft::Start);
    let end = graph.add(Draft::End);

    let mut place_nodes: HashMap<&str, (usize, usize)> = HashMap::new();
    for place in &net.places {
        let mut inputs = net.preset(&place.id).len();
        let mut outputs = net.postset(&place.id).len();
        if initial.tokens(&place.id) > 0 {
            inputs += 1;
        }
        if final_marking.tokens(&place.id) > 0 {
            outputs += 1;
        }
        let pair = graph.element(Draft::Pass, inputs, outputs, exclusive);
        place_nodes.insert(place.id.as_str(), pair);
    }

    let mut transition_nodes: HashMap<&str, (usize, usize)> = HashMap::new();
    for transition in &net.transitions {
        let body = match &transition.label {
            Some(label) => Draft::Task(label.clone()),
            None => Draft::Pass,
        };
        let inputs = net.preset(&transition.id).len();
        let outputs = net.postset(&transition.id).len();
        let pair = graph.element(body, inputs, outputs, parallel);
        transition_nodes.insert(transition.id.as_str(), pair);
    }

    for arc in &net.arcs {
        if let (Some(&(_, from)), Some(&(to, _))) = (
            place_nodes.get(arc.source.as_str()),
            transition_nodes.get(arc.target.as_str()),
        ) {
            graph.link(from, to);
        } else if let (Some(&(_, from)), Some(&(to, _))) = (
            transition_nodes.get(arc.source.as_str()),
            place_nodes.get(arc.target.as_str()),
        ) {
            graph.link(from, to);
        }
    }

    connect_boundary(&mut graph, start, initial, &place_nodes, true);
    connect_boundary(&mut graph, end, final_marking, &place_nodes, false);

    graph.collapse();
    let mut bpmn = finish(graph, &net.name);
    layout::layout(&mut bpmn);
    bpmn
}

/// Attach the start or end event to the marked places, through a parallel
/// gateway when more than one place is marked
fn connect_boundary(
    graph: &mut DraftGraph,
    event: usize,
    marking: &Marking,
    place_nodes: &HashMap<&str, (usize, usize)>,
    is_start: bool,
) {
    let marked: Vec<(usize, usize)> = marking
        .0
        .keys()
        .filter_map(|p| place_nodes.get(p.as_str()).copied())
        .collect();
    let hub = if marked.len() > 1 {
        let direction = if is_start {
            GatewayDirection::Diverging
        } else {
            GatewayDirection::Converging
        };
        let gateway = graph.add(Draft::Parallel(direction));
        if is_start {
            graph.link(event, gateway);
        } else {
            graph.link(gateway, event);
        }
        gateway
    } else {
        event
    };
    for (entry, exit) in marked {
        if is_start {
            graph.link(hub, entry);
        } else {
            graph.link(exit, hub);
        }
    }
}

fn finish(graph: DraftGraph, name: &str) -> BpmnGraph {
    let mut ids: HashMap<usize, String> = HashMap::new();
    let mut nodes = Vec::new();
    let (mut tasks, mut gateways, mut events) = (0, 0, 0);

    for (index, draft) in graph.nodes.into_iter().enumerate() {
        let Some(draft) = draft else { continue };
        let (id, kind) = match draft {
            Draft::Start => ("start_event".to_string(), BpmnNodeKind::StartEvent),
            Draft::End => ("end_event".to_string(), BpmnNodeKind::EndEvent),
            Draft::Task(label) => {
                tasks += 1;
                (
                    format!("task_{tasks}"),
                    BpmnNodeKind::Task { name: label },
                )
            }
            Draft::Exclusive(direction) => {
                gateways += 1;
                (
                    format!("gw_{gateways}"),
                    BpmnNodeKind::ExclusiveGateway { direction },
                )
            }
            Draft::Parallel(direction) => {
                gateways += 1;
                (
                    format!("gw_{gateways}"),
                    BpmnNodeKind::ParallelGateway { direction },
                )
            }
            Draft::Pass => {
                events += 1;
                (format!("event_{events}"), BpmnNodeKind::Intermediate)
            }
        };
        ids.insert(index, id.clone());
        nodes.push(BpmnNode {
            id,
            kind,
            bounds: Bounds::default(),
        });
    }

    let flows = graph
        .edges
        .iter()
        .filter_map(|(s, t)| Some((ids.get(s)?, ids.get(t)?)))
        .enumerate()
        .map(|(i, (source, target))| SequenceFlow {
            id: format!("flow_{}", i + 1),
            source: source.clone(),
            target: target.clone(),
            waypoints: Vec::new(),
        })
        .collect();

    BpmnGraph {
        name: name.to_string(),
        process_id: "process_model".to_string(),
        nodes,
        flows,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::to_petri_net;
    use crate::process::ProcessTree;

    fn bpmn_of(tree: &ProcessTree) -> BpmnGraph {
        let marked = to_petri_net(tree);
        to_bpmn(&marked.net, &marked.initial, &marked.final_marking)
    }

    fn count(graph: &BpmnGraph, pred: impl Fn(&BpmnNodeKind) -> bool) -> usize {
        graph.nodes.iter().filter(|n| pred(&n.kind)).count()
    }

    #[test]
    fn test_sequence_has_no_gateways() {
        let graph = bpmn_of(&ProcessTree::sequence(vec![
            ProcessTree::activity("approve"),
            ProcessTree::activity("reject"),
        ]));

        assert_eq!(graph.nodes.len(), 4);
        assert_eq!(count(&graph, BpmnNodeKind::is_gateway), 0);
        assert_eq!(graph.flows.len(), 3);
        let names: Vec<_> = graph.tasks().filter_map(BpmnNode::label).collect();
        assert_eq!(names, ["approve", "reject"]);
    }

    #[test]
    fn test_choice_becomes_exclusive_pair() {
        let graph = bpmn_of(&ProcessTree::xor(vec![
            ProcessTree::activity("a"),
            ProcessTree::activity("b"),
        ]));

        let split = count(&graph, |k| {
            matches!(
                k,
                BpmnNodeKind::ExclusiveGateway {
                    direction: GatewayDirection::Diverging
                }
            )
        });
        let join = count(&graph, |k| {
            matches!(
                k,
                BpmnNodeKind::ExclusiveGateway {
                    direction: GatewayDirection::Converging
                }
            )
        });
        assert_eq!((split, join), (1, 1));
    }

    #[test]
    fn test_concurrency_becomes_parallel_pair() {
        let graph = bpmn_of(&ProcessTree::parallel(vec![
            ProcessTree::activity("a"),
            ProcessTree::activity("b"),
        ]));

        assert_eq!(
            count(&graph, |k| matches!(k, BpmnNodeKind::ParallelGateway { .. })),
            2
        );
        assert_eq!(count(&graph, |k| matches!(k, BpmnNodeKind::Intermediate)), 0);
    }

    #[test]
    fn test_every_node_is_laid_out() {
        let graph = bpmn_of(&ProcessTree::looped(
            ProcessTree::activity("check"),
            ProcessTree::activity("fix"),
        ));
        assert!(graph.nodes.iter().all(|n| n.bounds.width > 0.0));
        assert!(graph.flows.iter().all(|f| f.waypoints.len() >= 2));
    }
}
