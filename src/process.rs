//! Process model value types
//!
//! The canonical model of a session is a block-structured process tree.
//! Petri nets, BPMN graphs and event logs are the other shapes a model takes
//! on its way into or out of a session.

pub mod bpmn;
pub mod log;
pub mod petri;
pub mod tree;

pub use bpmn::{BpmnGraph, BpmnNode, BpmnNodeKind, Bounds, GatewayDirection, SequenceFlow};
pub use log::{EventLog, Trace};
pub use petri::{Marking, PetriNet, PetriNetWithMarkings};
pub use tree::{CanonicalModel, ModelFormat, ModelOrigin, ProcessTree, TreeError};

/// A model read from an uploaded file, before it is turned into a tree
#[derive(Debug, Clone)]
pub enum ParsedModel {
    Bpmn(BpmnGraph),
    PetriNet(PetriNetWithMarkings),
}

impl ParsedModel {
    /// Name of the source the model was read from
    pub fn name(&self) -> &str {
        match self {
            ParsedModel::Bpmn(graph) => &graph.name,
            ParsedModel::PetriNet(net) => &net.net.name,
        }
    }

    pub fn format(&self) -> ModelFormat {
        match self {
            ParsedModel::Bpmn(_) => ModelFormat::Bpmn,
            ParsedModel::PetriNet(_) => ModelFormat::Pnml,
        }
    }
}
