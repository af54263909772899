//! SVG and Graphviz drawings of the three representations

use super::layout::{layered, Layered};
use super::xml_escape;
use crate::process::{BpmnGraph, BpmnNodeKind, Bounds, PetriNetWithMarkings, ProcessTree};
use std::collections::HashMap;
use std::fmt::{self, Write};

const FONT: &str = r#"font-family="Helvetica, Arial, sans-serif" font-size="12""#;
const TREE_COLUMN: f64 = 110.0;
const TREE_ROW: f64 = 90.0;

fn header(out: &mut String, width: f64, height: f64) -> fmt::Result {
    writeln!(
        out,
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="{width:.0}" height="{height:.0}" viewBox="0 0 {width:.0} {height:.0}">"#
    )?;
    writeln!(
        out,
        r#"  <defs><marker id="arrow" viewBox="0 0 10 10" refX="10" refY="5" markerWidth="8" markerHeight="8" orient="auto-start-reverse"><path d="M 0 0 L 10 5 L 0 10 z"/></marker></defs>"#
    )
}

fn polyline(out: &mut String, points: &[(f64, f64)]) -> fmt::Result {
    let path = points
        .iter()
        .map(|(x, y)| format!("{x:.1},{y:.1}"))
        .collect::<Vec<_>>()
        .join(" ");
    writeln!(
        out,
        r#"  <polyline points="{path}" fill="none" stroke="black" marker-end="url(#arrow)"/>"#
    )
}

fn text(out: &mut String, x: f64, y: f64, label: &str) -> fmt::Result {
    writeln!(
        out,
        r#"  <text x="{x:.1}" y="{y:.1}" text-anchor="middle" dominant-baseline="middle" {FONT}>{}</text>"#,
        xml_escape(label)
    )
}

// ============================================================================
// Process tree
// ============================================================================

struct TreeNode<'a> {
    tree: &'a ProcessTree,
    x: f64,
    y: f64,
    parent: Option<usize>,
}

fn place_tree<'a>(
    tree: &'a ProcessTree,
    depth: usize,
    parent: Option<usize>,
    next_leaf: &mut usize,
    nodes: &mut Vec<TreeNode<'a>>,
) -> f64 {
    let index = nodes.len();
    let y = 40.0 + f64::from(u32::try_from(depth).unwrap_or(u32::MAX)) * TREE_ROW;
    nodes.push(TreeNode {
        tree,
        x: 0.0,
        y,
        parent,
    });
    let children = tree.children();
    let x = if children.is_empty() {
        let x = 60.0 + f64::from(u32::try_from(*next_leaf).unwrap_or(u32::MAX)) * TREE_COLUMN;
        *next_leaf += 1;
        x
    } else {
        let xs: Vec<f64> = children
            .into_iter()
            .map(|child| place_tree(child, depth + 1, Some(index), next_leaf, nodes))
            .collect();
        let first = xs.first().copied().unwrap_or(0.0);
        let last = xs.last().copied().unwrap_or(first);
        f64::midpoint(first, last)
    };
    nodes[index].x = x;
    x
}

pub fn tree_svg(tree: &ProcessTree) -> Result<String, fmt::Error> {
    let mut nodes = Vec::new();
    let mut leaves = 0;
    place_tree(tree, 0, None, &mut leaves, &mut nodes);

    let width = nodes.iter().map(|n| n.x).fold(0.0, f64::max) + 60.0;
    let height = nodes.iter().map(|n| n.y).fold(0.0, f64::max) + 40.0;

    let mut out = String::new();
    header(&mut out, width, height)?;
    for node in &nodes {
        if let Some(parent) = node.parent {
            let p = &nodes[parent];
            writeln!(
                out,
                r#"  <line x1="{:.1}" y1="{:.1}" x2="{:.1}" y2="{:.1}" stroke="black"/>"#,
                p.x,
                p.y + 18.0,
                node.x,
                node.y - 18.0
            )?;
        }
    }
    for node in &nodes {
        match node.tree {
            ProcessTree::Activity { label } => {
                writeln!(
                    out,
                    r#"  <rect x="{:.1}" y="{:.1}" width="100" height="36" rx="6" fill="white" stroke="black"/>"#,
                    node.x - 50.0,
                    node.y - 18.0
                )?;
                text(&mut out, node.x, node.y, label)?;
            }
            ProcessTree::Silent => {
                writeln!(
                    out,
                    r#"  <rect x="{:.1}" y="{:.1}" width="36" height="36" fill="black"/>"#,
                    node.x - 18.0,
                    node.y - 18.0
                )?;
            }
            operator => {
                writeln!(
                    out,
                    r#"  <circle cx="{:.1}" cy="{:.1}" r="18" fill="white" stroke="black"/>"#,
                    node.x, node.y
                )?;
                text(&mut out, node.x, node.y, operator.symbol())?;
            }
        }
    }
    out.push_str("</svg>\n");
    Ok(out)
}

pub fn tree_dot(tree: &ProcessTree) -> Result<String, fmt::Error> {
    let mut nodes = Vec::new();
    let mut leaves = 0;
    place_tree(tree, 0, None, &mut leaves, &mut nodes);

    let mut out = String::from("digraph process_tree {\n  node [fontname=\"Helvetica\"];\n");
    for (i, node) in nodes.iter().enumerate() {
        let attrs = match node.tree {
            ProcessTree::Activity { label } => {
                format!("shape=box, style=rounded, label=\"{}\"", dot_escape(label))
            }
            ProcessTree::Silent => "shape=box, style=filled, fillcolor=black, label=\"\"".to_string(),
            operator => format!("shape=circle, label=\"{}\"", operator.symbol()),
        };
        writeln!(out, "  n{i} [{attrs}];")?;
        if let Some(parent) = node.parent {
            writeln!(out, "  n{parent} -> n{i} [arrowhead=none];")?;
        }
    }
    out.push_str("}\n");
    Ok(out)
}

// ============================================================================
// Petri net
// ============================================================================

fn petri_drawing(marked: &PetriNetWithMarkings) -> Layered {
    let net = &marked.net;
    let mut index: HashMap<&str, usize> = HashMap::new();
    let mut sizes = Vec::with_capacity(net.places.len() + net.transitions.len());
    for place in &net.places {
        index.insert(place.id.as_str(), sizes.len());
        sizes.push((30.0, 30.0));
    }
    for transition in &net.transitions {
        index.insert(transition.id.as_str(), sizes.len());
        sizes.push(if transition.is_silent() {
            (12.0, 40.0)
        } else {
            (90.0, 40.0)
        });
    }
    let edges: Vec<(usize, usize)> = net
        .arcs
        .iter()
        .filter_map(|a| Some((*index.get(a.source.as_str())?, *index.get(a.target.as_str())?)))
        .collect();
    let roots: Vec<usize> = marked
        .initial
        .0
        .keys()
        .filter_map(|p| index.get(p.as_str()).copied())
        .collect();
    layered(&sizes, &edges, &roots)
}

pub fn petri_svg(marked: &PetriNetWithMarkings) -> Result<String, fmt::Error> {
    let net = &marked.net;
    let drawing = petri_drawing(marked);

    let mut out = String::new();
    header(&mut out, drawing.width, drawing.height)?;
    for route in &drawing.routes {
        polyline(&mut out, route)?;
    }
    for (place, bounds) in net.places.iter().zip(&drawing.bounds) {
        let (cx, cy) = bounds.center();
        writeln!(
            out,
            r#"  <circle id="{}" cx="{cx:.1}" cy="{cy:.1}" r="15" fill="white" stroke="black"/>"#,
            xml_escape(&place.id)
        )?;
        if marked.final_marking.tokens(&place.id) > 0 {
            writeln!(
                out,
                r#"  <circle cx="{cx:.1}" cy="{cy:.1}" r="11" fill="none" stroke="black"/>"#
            )?;
        }
        let tokens = marked.initial.tokens(&place.id);
        if tokens == 1 {
            writeln!(out, r#"  <circle cx="{cx:.1}" cy="{cy:.1}" r="4" fill="black"/>"#)?;
        } else if tokens > 1 {
            text(&mut out, cx, cy, &tokens.to_string())?;
        }
    }
    let offset = net.places.len();
    for (transition, bounds) in net.transitions.iter().zip(drawing.bounds.iter().skip(offset)) {
        let fill = if transition.is_silent() { "black" } else { "white" };
        writeln!(
            out,
            r#"  <rect id="{}" x="{:.1}" y="{:.1}" width="{:.0}" height="{:.0}" fill="{fill}" stroke="black"/>"#,
            xml_escape(&transition.id),
            bounds.x,
            bounds.y,
            bounds.width,
            bounds.height
        )?;
        if let Some(label) = &transition.label {
            let (cx, cy) = bounds.center();
            text(&mut out, cx, cy, label)?;
        }
    }
    out.push_str("</svg>\n");
    Ok(out)
}

pub fn petri_dot(marked: &PetriNetWithMarkings) -> Result<String, fmt::Error> {
    let net = &marked.net;
    let mut out = String::from("digraph petri_net {\n  rankdir=LR;\n  node [fontname=\"Helvetica\"];\n");
    for place in &net.places {
        let tokens = marked.initial.tokens(&place.id);
        let shape = if marked.final_marking.tokens(&place.id) > 0 {
            "doublecircle"
        } else {
            "circle"
        };
        let label = if tokens > 0 { "&#9679;".to_string() } else { String::new() };
        writeln!(
            out,
            "  \"{}\" [shape={shape}, label=\"{label}\", width=0.4];",
            dot_escape(&place.id)
        )?;
    }
    for transition in &net.transitions {
        match &transition.label {
            Some(label) => writeln!(
                out,
                "  \"{}\" [shape=box, label=\"{}\"];",
                dot_escape(&transition.id),
                dot_escape(label)
            )?,
            None => writeln!(
                out,
                "  \"{}\" [shape=box, style=filled, fillcolor=black, label=\"\", width=0.15];",
                dot_escape(&transition.id)
            )?,
        }
    }
    for arc in &net.arcs {
        writeln!(
            out,
            "  \"{}\" -> \"{}\";",
            dot_escape(&arc.source),
            dot_escape(&arc.target)
        )?;
    }
    out.push_str("}\n");
    Ok(out)
}

// ============================================================================
// BPMN
// ============================================================================

fn diagram_size(nodes: impl Iterator<Item = Bounds>) -> (f64, f64) {
    nodes.fold((0.0, 0.0), |(w, h), b| {
        (f64::max(w, b.x + b.width + 60.0), f64::max(h, b.y + b.height + 80.0))
    })
}

pub fn bpmn_svg(graph: &BpmnGraph) -> Result<String, fmt::Error> {
    let (width, height) = diagram_size(graph.nodes.iter().map(|n| n.bounds));

    let mut out = String::new();
    header(&mut out, width, height)?;
    for flow in &graph.flows {
        polyline(&mut out, &flow.waypoints)?;
    }
    for node in &graph.nodes {
        let b = node.bounds;
        let (cx, cy) = b.center();
        match &node.kind {
            BpmnNodeKind::StartEvent | BpmnNodeKind::EndEvent | BpmnNodeKind::Intermediate => {
                let stroke = if node.kind == BpmnNodeKind::EndEvent { 3 } else { 1 };
                writeln!(
                    out,
                    r#"  <circle id="{}" cx="{cx:.1}" cy="{cy:.1}" r="{:.1}" fill="white" stroke="black" stroke-width="{stroke}"/>"#,
                    xml_escape(&node.id),
                    b.width / 2.0
                )?;
            }
            BpmnNodeKind::Task { name } => {
                writeln!(
                    out,
                    r#"  <rect id="{}" x="{:.1}" y="{:.1}" width="{:.0}" height="{:.0}" rx="10" fill="white" stroke="black"/>"#,
                    xml_escape(&node.id),
                    b.x,
                    b.y,
                    b.width,
                    b.height
                )?;
                text(&mut out, cx, cy, name)?;
            }
            gateway => {
                let marker = match gateway {
                    BpmnNodeKind::ParallelGateway { .. } => "+",
                    BpmnNodeKind::InclusiveGateway { .. } => "O",
                    _ => "X",
                };
                writeln!(
                    out,
                    r#"  <polygon id="{}" points="{cx:.1},{:.1} {:.1},{cy:.1} {cx:.1},{:.1} {:.1},{cy:.1}" fill="white" stroke="black"/>"#,
                    xml_escape(&node.id),
                    b.y,
                    b.x + b.width,
                    b.y + b.height,
                    b.x
                )?;
                text(&mut out, cx, cy, marker)?;
            }
        }
    }
    out.push_str("</svg>\n");
    Ok(out)
}

pub fn bpmn_dot(graph: &BpmnGraph) -> Result<String, fmt::Error> {
    let mut out = String::from("digraph bpmn {\n  rankdir=LR;\n  node [fontname=\"Helvetica\"];\n");
    for node in &graph.nodes {
        let attrs = match &node.kind {
            BpmnNodeKind::StartEvent => "shape=circle, label=\"\"".to_string(),
            BpmnNodeKind::EndEvent => "shape=doublecircle, label=\"\"".to_string(),
            BpmnNodeKind::Intermediate => "shape=circle, label=\"\", width=0.3".to_string(),
            BpmnNodeKind::Task { name } => {
                format!("shape=box, style=rounded, label=\"{}\"", dot_escape(name))
            }
            BpmnNodeKind::ExclusiveGateway { .. } => "shape=diamond, label=\"X\"".to_string(),
            BpmnNodeKind::ParallelGateway { .. } => "shape=diamond, label=\"+\"".to_string(),
            BpmnNodeKind::InclusiveGateway { .. } => "shape=diamond, label=\"O\"".to_string(),
        };
        writeln!(out, "  \"{}\" [{attrs}];", dot_escape(&node.id))?;
    }
    for flow in &graph.flows {
        writeln!(
            out,
            "  \"{}\" -> \"{}\";",
            dot_escape(&flow.source),
            dot_escape(&flow.target)
        )?;
    }
    out.push_str("}\n");
    Ok(out)
}

fn dot_escape(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::{to_bpmn, to_petri_net};

    fn sample() -> ProcessTree {
        ProcessTree::sequence(vec![
            ProcessTree::activity("register <claim>"),
            ProcessTree::xor(vec![ProcessTree::activity("pay"), ProcessTree::Silent]),
        ])
    }

    #[test]
    fn test_tree_svg_escapes_labels() {
        let svg = tree_svg(&sample()).unwrap();
        assert!(svg.starts_with("<svg"));
        assert!(svg.contains("register &lt;claim&gt;"));
        assert!(svg.trim_end().ends_with("</svg>"));
    }

    #[test]
    fn test_petri_svg_draws_every_element() {
        let marked = to_petri_net(&sample());
        let svg = petri_svg(&marked).unwrap();
        for place in &marked.net.places {
            assert!(svg.contains(&format!("id=\"{}\"", place.id)));
        }
        for transition in &marked.net.transitions {
            assert!(svg.contains(&format!("id=\"{}\"", transition.id)));
        }
    }

    #[test]
    fn test_bpmn_dot_lists_flows() {
        let marked = to_petri_net(&sample());
        let graph = to_bpmn(&marked.net, &marked.initial, &marked.final_marking);
        let dot = bpmn_dot(&graph).unwrap();
        assert!(dot.starts_with("digraph bpmn {"));
        assert_eq!(dot.matches(" -> ").count(), graph.flows.len());
    }
}
