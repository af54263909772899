//! Imported models: BPMN to Petri net translation and net play-out

use super::EngineError;
use crate::process::{
    BpmnGraph, BpmnNodeKind, EventLog, Marking, PetriNet, PetriNetWithMarkings,
};
use std::collections::{BTreeSet, VecDeque};

/// Bounds for the breadth-first play-out
#[derive(Debug, Clone, Copy)]
#[allow(clippy::struct_field_names)] // every field is an upper bound
pub struct PlayoutLimits {
    pub max_traces: usize,
    pub max_trace_length: usize,
    pub max_states: usize,
    /// Markings with more tokens in one place are not explored
    pub max_tokens_per_place: u32,
}

impl Default for PlayoutLimits {
    fn default() -> Self {
        Self {
            max_traces: 1000,
            max_trace_length: 40,
            max_states: 200_000,
            max_tokens_per_place: 8,
        }
    }
}

/// Net under construction; silent transitions are numbered in creation order
struct NetBuilder {
    net: PetriNet,
    silent: usize,
}

impl NetBuilder {
    fn tau(&mut self) -> String {
        self.silent += 1;
        self.net.add_transition(format!("tau_{}", self.silent), None)
    }

    /// `from -> tau -> to`
    fn route(&mut self, from: &str, to: &str) {
        let t = self.tau();
        self.net.add_arc(from, t.clone());
        self.net.add_arc(t, to);
    }
}

fn ensure_translatable(graph: &BpmnGraph) -> Result<(), EngineError> {
    if let Some(node) = graph
        .nodes
        .iter()
        .find(|n| matches!(n.kind, BpmnNodeKind::InclusiveGateway { .. }))
    {
        return Err(EngineError::Unsupported(format!(
            "inclusive gateway '{}' cannot be translated",
            node.id
        )));
    }
    if !graph.nodes.iter().any(|n| n.kind == BpmnNodeKind::StartEvent) {
        return Err(EngineError::Unsupported("model has no start event".into()));
    }
    if !graph.nodes.iter().any(|n| n.kind == BpmnNodeKind::EndEvent) {
        return Err(EngineError::Unsupported("model has no end event".into()));
    }
    Ok(())
}

/// Translate a BPMN graph into a workflow net
///
/// Every sequence flow becomes a place. Exclusive gateways route through one
/// shared place, parallel gateways become one silent transition, tasks become
/// labelled transitions. Several incoming flows of a task or event merge
/// exclusively, several outgoing flows fork in parallel.
pub fn bpmn_to_petri(graph: &BpmnGraph) -> Result<PetriNetWithMarkings, EngineError> {
    ensure_translatable(graph)?;

    let mut builder = NetBuilder {
        net: PetriNet::new(graph.name.clone()),
        silent: 0,
    };
    let source = builder.net.add_place("source");
    let sink = builder.net.add_place("sink");
    for flow in &graph.flows {
        builder.net.add_place(flow_place(&flow.id));
    }

    for node in &graph.nodes {
        let inputs: Vec<String> = graph.incoming(&node.id).map(|f| flow_place(&f.id)).collect();
        let outputs: Vec<String> = graph.outgoing(&node.id).map(|f| flow_place(&f.id)).collect();

        match &node.kind {
            BpmnNodeKind::ExclusiveGateway { .. } => {
                let hub = builder.net.add_place(format!("xor_{}", node.id));
                for input in &inputs {
                    builder.route(input, &hub);
                }
                for output in &outputs {
                    builder.route(&hub, output);
                }
            }
            BpmnNodeKind::ParallelGateway { .. } => {
                let t = builder.tau();
                for input in inputs {
                    builder.net.add_arc(input, t.clone());
                }
                for output in outputs {
                    builder.net.add_arc(t.clone(), output);
                }
            }
            kind => {
                let inputs = if *kind == BpmnNodeKind::StartEvent {
                    vec![source.clone()]
                } else {
                    inputs
                };
                let outputs = if *kind == BpmnNodeKind::EndEvent {
                    vec![sink.clone()]
                } else {
                    outputs
                };
                add_activity(&mut builder, &node.id, kind, inputs, outputs);
            }
        }
    }

    Ok(PetriNetWithMarkings {
        net: builder.net,
        initial: Marking::single(source),
        final_marking: Marking::single(sink),
    })
}

/// Tasks become labelled transitions, events silent ones
fn add_activity(
    builder: &mut NetBuilder,
    node_id: &str,
    kind: &BpmnNodeKind,
    inputs: Vec<String>,
    outputs: Vec<String>,
) {
    let label = match kind {
        BpmnNodeKind::Task { name } if !name.trim().is_empty() => Some(name.trim().to_string()),
        BpmnNodeKind::Task { .. } => Some(node_id.to_string()),
        _ => None,
    };
    let transition = builder.net.add_transition(format!("t_{node_id}"), label);
    let entry = if inputs.len() > 1 {
        let merge = builder.net.add_place(format!("merge_{node_id}"));
        for input in &inputs {
            builder.route(input, &merge);
        }
        vec![merge]
    } else {
        inputs
    };
    for input in entry {
        builder.net.add_arc(input, transition.clone());
    }
    for output in outputs {
        builder.net.add_arc(transition.clone(), output);
    }
}

fn flow_place(flow_id: &str) -> String {
    format!("flow_{flow_id}")
}

/// Event log of the visible firing sequences that reach the final marking
pub fn play_out(
    model: &PetriNetWithMarkings,
    limits: PlayoutLimits,
) -> Result<EventLog, EngineError> {
    let net = &model.net;
    let mut traces: BTreeSet<Vec<String>> = BTreeSet::new();
    let mut seen: BTreeSet<(Marking, Vec<String>)> = BTreeSet::new();
    let mut queue = VecDeque::from([(model.initial.clone(), Vec::<String>::new())]);
    let mut explored = 0usize;

    while let Some((marking, trace)) = queue.pop_front() {
        if traces.len() >= limits.max_traces || explored >= limits.max_states {
            break;
        }
        explored += 1;

        if marking == model.final_marking {
            traces.insert(trace);
            continue;
        }

        for transition in net.enabled(&marking) {
            let Some(next) = net.fire(&transition.id, &marking) else {
                continue;
            };
            if next.0.values().any(|&n| n > limits.max_tokens_per_place) {
                continue;
            }
            let mut next_trace = trace.clone();
            if let Some(label) = &transition.label {
                if next_trace.len() >= limits.max_trace_length {
                    continue;
                }
                next_trace.push(label.clone());
            }
            if seen.insert((next.clone(), next_trace.clone())) {
                queue.push_back((next, next_trace));
            }
        }
    }

    tracing::debug!(
        net = %net.name,
        traces = traces.len(),
        explored,
        "Played out Petri net"
    );

    if traces.is_empty() {
        return Err(EngineError::Playout(format!(
            "final marking of '{}' is not reachable within {explored} explored states",
            net.name
        )));
    }
    Ok(EventLog::from_sequences(net.name.clone(), traces))
}
