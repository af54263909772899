//! BPMN 2.0 and PNML serialization

use super::xml_escape;
use crate::process::{BpmnGraph, BpmnNodeKind, Marking, PetriNet};
use serde::{Deserialize, Serialize};
use std::fmt::{self, Write};
use std::str::FromStr;

/// Text encoding of an exported XML document
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum XmlEncoding {
    #[default]
    #[serde(rename = "utf-8")]
    Utf8,
    /// Little endian with a byte order mark
    #[serde(rename = "utf-16")]
    Utf16,
}

pub const DEFAULT_ENCODING: XmlEncoding = XmlEncoding::Utf8;

impl XmlEncoding {
    pub fn label(self) -> &'static str {
        match self {
            XmlEncoding::Utf8 => "UTF-8",
            XmlEncoding::Utf16 => "UTF-16",
        }
    }

    /// Encode a document whose declaration already names this encoding
    pub fn encode(self, document: &str) -> Vec<u8> {
        match self {
            XmlEncoding::Utf8 => document.as_bytes().to_vec(),
            XmlEncoding::Utf16 => {
                let mut bytes = Vec::with_capacity(2 + document.len() * 2);
                bytes.extend_from_slice(&[0xFF, 0xFE]);
                for unit in document.encode_utf16() {
                    bytes.extend_from_slice(&unit.to_le_bytes());
                }
                bytes
            }
        }
    }
}

impl FromStr for XmlEncoding {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "utf-8" | "utf8" => Ok(XmlEncoding::Utf8),
            "utf-16" | "utf16" | "utf-16le" => Ok(XmlEncoding::Utf16),
            other => Err(format!("Unsupported encoding: {other}")),
        }
    }
}

fn declaration(out: &mut String, encoding: XmlEncoding) -> fmt::Result {
    writeln!(
        out,
        r#"<?xml version="1.0" encoding="{}"?>"#,
        encoding.label()
    )
}

/// Serialize a BPMN graph with its diagram interchange section
pub fn serialize_bpmn(graph: &BpmnGraph, encoding: XmlEncoding) -> Result<Vec<u8>, fmt::Error> {
    let process_id = xml_escape(&graph.process_id);
    let mut xml = String::new();

    declaration(&mut xml, encoding)?;
    writeln!(
        xml,
        r#"<bpmn:definitions xmlns:bpmn="http://www.omg.org/spec/BPMN/20100524/MODEL""#
    )?;
    writeln!(
        xml,
        r#"                  xmlns:bpmndi="http://www.omg.org/spec/BPMN/20100524/DI""#
    )?;
    writeln!(
        xml,
        r#"                  xmlns:dc="http://www.omg.org/spec/DD/20100524/DC""#
    )?;
    writeln!(
        xml,
        r#"                  xmlns:di="http://www.omg.org/spec/DD/20100524/DI""#
    )?;
    writeln!(
        xml,
        r#"                  id="definitions" targetNamespace="http://www.omg.org/bpmn20" exporter="promoai">"#
    )?;
    writeln!(
        xml,
        r#"  <bpmn:process id="{process_id}" name="{}" isExecutable="false">"#,
        xml_escape(&graph.name)
    )?;

    for node in &graph.nodes {
        let id = xml_escape(&node.id);
        let element = node.kind.element();
        let mut attrs = format!(r#"id="{id}""#);
        match &node.kind {
            BpmnNodeKind::Task { name } => {
                let _ = write!(attrs, r#" name="{}""#, xml_escape(name));
            }
            BpmnNodeKind::ExclusiveGateway { direction }
            | BpmnNodeKind::ParallelGateway { direction }
            | BpmnNodeKind::InclusiveGateway { direction } => {
                let _ = write!(attrs, r#" gatewayDirection="{}""#, direction.as_bpmn());
            }
            _ => {}
        }
        writeln!(xml, "    <bpmn:{element} {attrs}>")?;
        for flow in graph.incoming(&node.id) {
            writeln!(xml, "      <bpmn:incoming>{}</bpmn:incoming>", xml_escape(&flow.id))?;
        }
        for flow in graph.outgoing(&node.id) {
            writeln!(xml, "      <bpmn:outgoing>{}</bpmn:outgoing>", xml_escape(&flow.id))?;
        }
        writeln!(xml, "    </bpmn:{element}>")?;
    }

    for flow in &graph.flows {
        writeln!(
            xml,
            r#"    <bpmn:sequenceFlow id="{}" sourceRef="{}" targetRef="{}" />"#,
            xml_escape(&flow.id),
            xml_escape(&flow.source),
            xml_escape(&flow.target)
        )?;
    }
    writeln!(xml, "  </bpmn:process>")?;

    writeln!(xml, r#"  <bpmndi:BPMNDiagram id="diagram">"#)?;
    writeln!(
        xml,
        r#"    <bpmndi:BPMNPlane id="plane" bpmnElement="{process_id}">"#
    )?;
    for node in &graph.nodes {
        let id = xml_escape(&node.id);
        let b = node.bounds;
        writeln!(
            xml,
            r#"      <bpmndi:BPMNShape id="{id}_di" bpmnElement="{id}">"#
        )?;
        writeln!(
            xml,
            r#"        <dc:Bounds x="{:.1}" y="{:.1}" width="{:.1}" height="{:.1}" />"#,
            b.x, b.y, b.width, b.height
        )?;
        writeln!(xml, "      </bpmndi:BPMNShape>")?;
    }
    for flow in &graph.flows {
        let id = xml_escape(&flow.id);
        writeln!(
            xml,
            r#"      <bpmndi:BPMNEdge id="{id}_di" bpmnElement="{id}">"#
        )?;
        for (x, y) in &flow.waypoints {
            writeln!(xml, r#"        <di:waypoint x="{x:.1}" y="{y:.1}" />"#)?;
        }
        writeln!(xml, "      </bpmndi:BPMNEdge>")?;
    }
    writeln!(xml, "    </bpmndi:BPMNPlane>")?;
    writeln!(xml, "  </bpmndi:BPMNDiagram>")?;
    writeln!(xml, "</bpmn:definitions>")?;

    Ok(encoding.encode(&xml))
}

/// Marker the PNML reader uses to recognise silent transitions
pub const INVISIBLE_ACTIVITY: &str = "$invisible$";

/// Serialize a Petri net as a PNML core model with initial and final markings
pub fn serialize_pnml(
    net: &PetriNet,
    initial: &Marking,
    final_marking: &Marking,
) -> Result<Vec<u8>, fmt::Error> {
    let mut xml = String::new();
    declaration(&mut xml, XmlEncoding::Utf8)?;
    writeln!(xml, "<pnml>")?;
    writeln!(
        xml,
        r#"  <net id="net1" type="http://www.pnml.org/version-2009/grammar/pnmlcoremodel">"#
    )?;
    writeln!(
        xml,
        "    <name>\n      <text>{}</text>\n    </name>",
        xml_escape(&net.name)
    )?;
    writeln!(xml, r#"    <page id="n0">"#)?;

    for place in &net.places {
        let id = xml_escape(&place.id);
        writeln!(xml, r#"      <place id="{id}">"#)?;
        writeln!(xml, "        <name>\n          <text>{id}</text>\n        </name>")?;
        let tokens = initial.tokens(&place.id);
        if tokens > 0 {
            writeln!(
                xml,
                "        <initialMarking>\n          <text>{tokens}</text>\n        </initialMarking>"
            )?;
        }
        writeln!(xml, "      </place>")?;
    }

    for transition in &net.transitions {
        let id = xml_escape(&transition.id);
        writeln!(xml, r#"      <transition id="{id}">"#)?;
        if let Some(label) = &transition.label {
            writeln!(
                xml,
                "        <name>\n          <text>{}</text>\n        </name>",
                xml_escape(label)
            )?;
        } else {
            writeln!(xml, "        <name>\n          <text>{id}</text>\n        </name>")?;
            writeln!(
                xml,
                r#"        <toolspecific tool="ProM" version="6.4" activity="{INVISIBLE_ACTIVITY}" localNodeID="{id}"/>"#
            )?;
        }
        writeln!(xml, "      </transition>")?;
    }

    for (i, arc) in net.arcs.iter().enumerate() {
        writeln!(
            xml,
            r#"      <arc id="a_{i}" source="{}" target="{}"/>"#,
            xml_escape(&arc.source),
            xml_escape(&arc.target)
        )?;
    }
    writeln!(xml, "    </page>")?;

    writeln!(xml, "    <finalmarkings>\n      <marking>")?;
    for (place, tokens) in &final_marking.0 {
        writeln!(
            xml,
            r#"        <place idref="{}">
          <text>{tokens}</text>
        </place>"#,
            xml_escape(place)
        )?;
    }
    writeln!(xml, "      </marking>\n    </finalmarkings>")?;
    writeln!(xml, "  </net>")?;
    writeln!(xml, "</pnml>")?;

    Ok(xml.into_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::{to_bpmn, to_petri_net};
    use crate::process::ProcessTree;

    fn claim_handling() -> ProcessTree {
        ProcessTree::sequence(vec![
            ProcessTree::activity("register"),
            ProcessTree::parallel(vec![
                ProcessTree::activity("check & verify"),
                ProcessTree::activity("notify"),
            ]),
            ProcessTree::xor(vec![ProcessTree::activity("pay"), ProcessTree::Silent]),
        ])
    }

    #[test]
    fn test_bpmn_utf8_declares_encoding() {
        let marked = to_petri_net(&claim_handling());
        let graph = to_bpmn(&marked.net, &marked.initial, &marked.final_marking);
        let bytes = serialize_bpmn(&graph, XmlEncoding::Utf8).unwrap();
        let xml = String::from_utf8(bytes).unwrap();

        assert!(xml.starts_with(r#"<?xml version="1.0" encoding="UTF-8"?>"#));
        assert!(xml.contains(r#"name="check &amp; verify""#));
        assert_eq!(xml.matches("<bpmn:sequenceFlow ").count(), graph.flows.len());
        assert_eq!(xml.matches("<bpmndi:BPMNShape ").count(), graph.nodes.len());
    }

    #[test]
    fn test_bpmn_utf16_has_bom() {
        let marked = to_petri_net(&ProcessTree::activity("a"));
        let graph = to_bpmn(&marked.net, &marked.initial, &marked.final_marking);
        let bytes = serialize_bpmn(&graph, XmlEncoding::Utf16).unwrap();

        assert_eq!(&bytes[..2], &[0xFF, 0xFE]);
        let units: Vec<u16> = bytes[2..]
            .chunks_exact(2)
            .map(|c| u16::from_le_bytes([c[0], c[1]]))
            .collect();
        let xml = String::from_utf16(&units).unwrap();
        assert!(xml.contains(r#"encoding="UTF-16""#));
    }

    #[test]
    fn test_pnml_marks_silent_transitions() {
        let marked = to_petri_net(&claim_handling());
        let bytes = serialize_pnml(&marked.net, &marked.initial, &marked.final_marking).unwrap();
        let xml = String::from_utf8(bytes).unwrap();

        let silent = marked.net.transitions.iter().filter(|t| t.is_silent()).count();
        assert_eq!(xml.matches(INVISIBLE_ACTIVITY).count(), silent);
        assert!(xml.contains("<finalmarkings>"));
        assert!(xml.contains(r#"<place idref="p_1">"#));
    }

    #[test]
    fn test_encoding_parse() {
        assert_eq!("utf-16".parse::<XmlEncoding>().unwrap(), XmlEncoding::Utf16);
        assert_eq!("UTF-8".parse::<XmlEncoding>().unwrap(), DEFAULT_ENCODING);
        assert!("latin1".parse::<XmlEncoding>().is_err());
    }
}
