//! BPMN 2.0 XML reader

use super::xml::{attributes, decode, error, local_name};
use super::IngestError;
use crate::process::{BpmnGraph, BpmnNode, BpmnNodeKind, Bounds, GatewayDirection, SequenceFlow};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::collections::HashMap;

/// Activity elements, all read as plain tasks
const TASK_ELEMENTS: &[&str] = &[
    "task",
    "userTask",
    "serviceTask",
    "manualTask",
    "scriptTask",
    "sendTask",
    "receiveTask",
    "businessRuleTask",
    "callActivity",
    "subProcess",
];

#[derive(Default)]
struct Cursor {
    graph: BpmnGraph,
    in_process: usize,
    /// Id of the diagram element whose shape or edge is open
    di_element: Option<String>,
    di_is_edge: bool,
    bounds: HashMap<String, Bounds>,
    waypoints: HashMap<String, Vec<(f64, f64)>>,
    /// Open elements nested inside a `subProcess` are skipped
    skip_depth: usize,
}

impl Cursor {
    #[allow(clippy::too_many_lines)] // One arm per BPMN element
    fn open(
        &mut self,
        element: &BytesStart<'_>,
        empty: bool,
        file_name: &str,
        position: u64,
    ) -> Result<(), IngestError> {
        let name = local_name(element.local_name().as_ref());
        if self.skip_depth > 0 {
            if !empty {
                self.skip_depth += 1;
            }
            return Ok(());
        }
        let attrs = attributes(element, file_name, position)?;
        let id = attrs.get("id").cloned().unwrap_or_default();
        let direction = || {
            GatewayDirection::from_bpmn(attrs.get("gatewayDirection").map_or("", String::as_str))
        };

        match name.as_str() {
            "process" => {
                if self.graph.process_id.is_empty() {
                    self.graph.process_id.clone_from(&id);
                }
                if let Some(process_name) = attrs.get("name") {
                    if self.graph.name.is_empty() {
                        self.graph.name.clone_from(process_name);
                    }
                }
                if !empty {
                    self.in_process += 1;
                }
                return Ok(());
            }
            "BPMNShape" | "BPMNEdge" => {
                self.di_element = attrs.get("bpmnElement").cloned();
                self.di_is_edge = name == "BPMNEdge";
                return Ok(());
            }
            "Bounds" => {
                if let Some(element) = &self.di_element {
                    if !self.di_is_edge {
                        self.bounds.insert(element.clone(), read_bounds(&attrs));
                    }
                }
                return Ok(());
            }
            "waypoint" => {
                if let (Some(element), true) = (&self.di_element, self.di_is_edge) {
                    let (x, y) = (number(&attrs, "x"), number(&attrs, "y"));
                    self.waypoints.entry(element.clone()).or_default().push((x, y));
                }
                return Ok(());
            }
            _ => {}
        }

        if self.in_process == 0 {
            return Ok(());
        }

        let kind = match name.as_str() {
            "startEvent" => Some(BpmnNodeKind::StartEvent),
            "endEvent" => Some(BpmnNodeKind::EndEvent),
            "intermediateThrowEvent" | "intermediateCatchEvent" => Some(BpmnNodeKind::Intermediate),
            "exclusiveGateway" | "eventBasedGateway" => Some(BpmnNodeKind::ExclusiveGateway {
                direction: direction(),
            }),
            "parallelGateway" => Some(BpmnNodeKind::ParallelGateway {
                direction: direction(),
            }),
            "inclusiveGateway" => Some(BpmnNodeKind::InclusiveGateway {
                direction: direction(),
            }),
            task if TASK_ELEMENTS.contains(&task) => {
                let label = attrs
                    .get("name")
                    .map(|n| n.trim().to_string())
                    .filter(|n| !n.is_empty())
                    .unwrap_or_else(|| id.clone());
                if task == "subProcess" && !empty {
                    // A collapsed view of the subprocess: its content is not
                    // part of the top-level control flow
                    self.skip_depth = 1;
                }
                Some(BpmnNodeKind::Task { name: label })
            }
            "sequenceFlow" => {
                let source = attrs.get("sourceRef").cloned().unwrap_or_default();
                let target = attrs.get("targetRef").cloned().unwrap_or_default();
                if source.is_empty() || target.is_empty() {
                    return Err(IngestError::Malformed {
                        format: "BPMN",
                        file_name: file_name.to_string(),
                        message: format!("sequence flow '{id}' lacks sourceRef or targetRef"),
                    });
                }
                self.graph.flows.push(SequenceFlow {
                    id: id.clone(),
                    source,
                    target,
                    waypoints: Vec::new(),
                });
                None
            }
            _ => None,
        };

        if let Some(kind) = kind {
            if id.is_empty() {
                return Err(IngestError::Malformed {
                    format: "BPMN",
                    file_name: file_name.to_string(),
                    message: format!("<{name}> without id"),
                });
            }
            self.graph.nodes.push(BpmnNode {
                id,
                kind,
                bounds: Bounds::default(),
            });
        }
        Ok(())
    }

    fn close(&mut self, name: &[u8]) {
        if self.skip_depth > 0 {
            self.skip_depth -= 1;
            return;
        }
        match local_name(name).as_str() {
            "process" => self.in_process = self.in_process.saturating_sub(1),
            "BPMNShape" | "BPMNEdge" => self.di_element = None,
            _ => {}
        }
    }
}

fn number(attrs: &HashMap<String, String>, key: &str) -> f64 {
    attrs
        .get(key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(0.0)
}

fn read_bounds(attrs: &HashMap<String, String>) -> Bounds {
    Bounds {
        x: number(attrs, "x"),
        y: number(attrs, "y"),
        width: number(attrs, "width"),
        height: number(attrs, "height"),
    }
}

pub fn parse_bpmn(file_name: &str, bytes: &[u8]) -> Result<BpmnGraph, IngestError> {
    let text = decode(bytes);
    let mut reader = Reader::from_reader(text.as_ref());
    reader.config_mut().trim_text(true);

    let mut cursor = Cursor::default();
    let mut buf = Vec::new();
    loop {
        let position = reader.buffer_position();
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => cursor.open(&e, false, file_name, position)?,
            Ok(Event::Empty(e)) => cursor.open(&e, true, file_name, position)?,
            Ok(Event::End(e)) => cursor.close(e.local_name().as_ref()),
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => return Err(error(file_name, reader.buffer_position(), &e)),
        }
        buf.clear();
    }

    let mut graph = cursor.graph;
    let malformed = |message: String| IngestError::Malformed {
        format: "BPMN",
        file_name: file_name.to_string(),
        message,
    };
    if graph.nodes.is_empty() {
        return Err(malformed("no process elements found".to_string()));
    }
    for flow in &graph.flows {
        for end in [&flow.source, &flow.target] {
            if graph.node(end).is_none() {
                return Err(malformed(format!(
                    "sequence flow '{}' references unknown element '{end}'",
                    flow.id
                )));
            }
        }
    }

    for node in &mut graph.nodes {
        if let Some(bounds) = cursor.bounds.remove(&node.id) {
            node.bounds = bounds;
        }
    }
    for flow in &mut graph.flows {
        if let Some(points) = cursor.waypoints.remove(&flow.id) {
            flow.waypoints = points;
        }
    }
    if graph.name.is_empty() {
        graph.name = file_name.to_string();
    }
    Ok(graph)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::{serialize_bpmn, to_bpmn, to_petri_net, XmlEncoding};
    use crate::process::ProcessTree;

    const APPROVAL: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<definitions xmlns="http://www.omg.org/spec/BPMN/20100524/MODEL">
  <process id="approval" name="Approval">
    <startEvent id="s"/>
    <userTask id="t1" name=" Approve "/>
    <exclusiveGateway id="g1" gatewayDirection="Diverging"/>
    <endEvent id="e"/>
    <sequenceFlow id="f1" sourceRef="s" targetRef="t1"/>
    <sequenceFlow id="f2" sourceRef="t1" targetRef="g1"/>
    <sequenceFlow id="f3" sourceRef="g1" targetRef="e"/>
  </process>
</definitions>"#;

    #[test]
    fn test_reads_unprefixed_document() {
        let graph = parse_bpmn("approval.bpmn", APPROVAL.as_bytes()).unwrap();

        assert_eq!(graph.name, "Approval");
        assert_eq!(graph.process_id, "approval");
        assert_eq!(graph.nodes.len(), 4);
        assert_eq!(graph.node("t1").and_then(BpmnNode::label), Some("Approve"));
        assert_eq!(
            graph.node("g1").map(|n| n.kind.clone()),
            Some(BpmnNodeKind::ExclusiveGateway {
                direction: GatewayDirection::Diverging
            })
        );
        assert_eq!(graph.flows.len(), 3);
    }

    #[test]
    fn test_rejects_dangling_flow() {
        let xml = r#"<definitions><process id="p"><startEvent id="s"/>
            <sequenceFlow id="f" sourceRef="s" targetRef="missing"/></process></definitions>"#;
        let err = parse_bpmn("p.bpmn", xml.as_bytes()).unwrap_err();
        assert!(err.to_string().contains("missing"));
    }

    #[test]
    fn test_reads_back_exported_document() {
        let tree = ProcessTree::sequence(vec![
            ProcessTree::activity("register"),
            ProcessTree::xor(vec![ProcessTree::activity("accept"), ProcessTree::activity("decline")]),
        ]);
        let marked = to_petri_net(&tree);
        let exported = to_bpmn(&marked.net, &marked.initial, &marked.final_marking);
        let bytes = serialize_bpmn(&exported, XmlEncoding::Utf8).unwrap();

        let parsed = parse_bpmn("model.bpmn", &bytes).unwrap();
        assert_eq!(parsed.nodes.len(), exported.nodes.len());
        assert_eq!(parsed.flows.len(), exported.flows.len());
        for node in &exported.nodes {
            let read = parsed.node(&node.id).unwrap();
            assert_eq!(read.kind, node.kind);
            assert!((read.bounds.x - node.bounds.x).abs() < 0.1);
        }
    }
}
