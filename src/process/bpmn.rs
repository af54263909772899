//! BPMN process graphs

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GatewayDirection {
    Diverging,
    Converging,
    Unspecified,
}

impl GatewayDirection {
    pub fn as_bpmn(self) -> &'static str {
        match self {
            GatewayDirection::Diverging => "Diverging",
            GatewayDirection::Converging => "Converging",
            GatewayDirection::Unspecified => "Unspecified",
        }
    }

    pub fn from_bpmn(value: &str) -> Self {
        match value {
            "Diverging" => GatewayDirection::Diverging,
            "Converging" => GatewayDirection::Converging,
            _ => GatewayDirection::Unspecified,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BpmnNodeKind {
    StartEvent,
    EndEvent,
    Task { name: String },
    ExclusiveGateway { direction: GatewayDirection },
    ParallelGateway { direction: GatewayDirection },
    /// Read from files only; the converter never produces one
    InclusiveGateway { direction: GatewayDirection },
    /// Intermediate events pass control through unchanged
    Intermediate,
}

impl BpmnNodeKind {
    /// Element name in BPMN 2.0 XML
    pub fn element(&self) -> &'static str {
        match self {
            BpmnNodeKind::StartEvent => "startEvent",
            BpmnNodeKind::EndEvent => "endEvent",
            BpmnNodeKind::Task { .. } => "task",
            BpmnNodeKind::ExclusiveGateway { .. } => "exclusiveGateway",
            BpmnNodeKind::ParallelGateway { .. } => "parallelGateway",
            BpmnNodeKind::InclusiveGateway { .. } => "inclusiveGateway",
            BpmnNodeKind::Intermediate => "intermediateThrowEvent",
        }
    }

    pub fn is_gateway(&self) -> bool {
        matches!(
            self,
            BpmnNodeKind::ExclusiveGateway { .. }
                | BpmnNodeKind::ParallelGateway { .. }
                | BpmnNodeKind::InclusiveGateway { .. }
        )
    }
}

/// Diagram bounds of a shape
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Bounds {
    pub fn center(&self) -> (f64, f64) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BpmnNode {
    pub id: String,
    pub kind: BpmnNodeKind,
    pub bounds: Bounds,
}

impl BpmnNode {
    pub fn label(&self) -> Option<&str> {
        match &self.kind {
            BpmnNodeKind::Task { name } => Some(name),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequenceFlow {
    pub id: String,
    pub source: String,
    pub target: String,
    pub waypoints: Vec<(f64, f64)>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BpmnGraph {
    pub name: String,
    pub process_id: String,
    pub nodes: Vec<BpmnNode>,
    pub flows: Vec<SequenceFlow>,
}

impl BpmnGraph {
    pub fn node(&self, id: &str) -> Option<&BpmnNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn incoming(&self, id: &str) -> impl Iterator<Item = &SequenceFlow> {
        let id = id.to_string();
        self.flows.iter().filter(move |f| f.target == id)
    }

    pub fn outgoing(&self, id: &str) -> impl Iterator<Item = &SequenceFlow> {
        let id = id.to_string();
        self.flows.iter().filter(move |f| f.source == id)
    }

    pub fn tasks(&self) -> impl Iterator<Item = &BpmnNode> {
        self.nodes
            .iter()
            .filter(|n| matches!(n.kind, BpmnNodeKind::Task { .. }))
    }
}
