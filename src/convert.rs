//! Representation converter
//!
//! Pure projection of a canonical model into its three views. The chain is
//! always process tree → Petri net → BPMN; the process tree view is drawn
//! straight from the tree.

mod bpmn;
mod cache;
mod export;
mod layout;
mod petri;
mod svg;

pub use bpmn::to_bpmn;
pub use cache::ViewCache;
pub use export::{serialize_bpmn, serialize_pnml, XmlEncoding, DEFAULT_ENCODING, INVISIBLE_ACTIVITY};
pub use petri::to_petri_net;

use crate::process::{BpmnGraph, CanonicalModel, Marking, PetriNetWithMarkings, ProcessTree};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

/// Which representation of the model is shown
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewType {
    ProcessTree,
    PetriNet,
    #[default]
    Bpmn,
}

impl ViewType {
    pub fn as_str(self) -> &'static str {
        match self {
            ViewType::ProcessTree => "process_tree",
            ViewType::PetriNet => "petri_net",
            ViewType::Bpmn => "bpmn",
        }
    }
}

impl fmt::Display for ViewType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ViewType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "process_tree" | "tree" | "powl" => Ok(ViewType::ProcessTree),
            "petri_net" | "petri" => Ok(ViewType::PetriNet),
            "bpmn" => Ok(ViewType::Bpmn),
            other => Err(format!("Unknown view type: {other}")),
        }
    }
}

/// Image format of a rendered view
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RenderFormat {
    #[default]
    Svg,
    /// Graphviz source
    Dot,
}

impl RenderFormat {
    pub fn content_type(self) -> &'static str {
        match self {
            RenderFormat::Svg => "image/svg+xml",
            RenderFormat::Dot => "text/vnd.graphviz",
        }
    }
}

impl FromStr for RenderFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "svg" => Ok(RenderFormat::Svg),
            "dot" | "gv" => Ok(RenderFormat::Dot),
            other => Err(format!("Unknown render format: {other}")),
        }
    }
}

/// Something that can be drawn
#[derive(Debug, Clone, Copy)]
pub enum Representation<'a> {
    ProcessTree(&'a ProcessTree),
    PetriNet(&'a PetriNetWithMarkings),
    Bpmn(&'a BpmnGraph),
}

impl Representation<'_> {
    pub fn view(&self) -> ViewType {
        match self {
            Representation::ProcessTree(_) => ViewType::ProcessTree,
            Representation::PetriNet(_) => ViewType::PetriNet,
            Representation::Bpmn(_) => ViewType::Bpmn,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConversionError {
    #[error("Failed to render {view} view: {source}")]
    Render {
        view: ViewType,
        #[source]
        source: fmt::Error,
    },
    #[error("Failed to serialize {artifact}: {source}")]
    Serialize {
        artifact: &'static str,
        #[source]
        source: fmt::Error,
    },
}

pub fn render(
    representation: &Representation<'_>,
    format: RenderFormat,
) -> Result<Vec<u8>, ConversionError> {
    let drawn = match (representation, format) {
        (Representation::ProcessTree(tree), RenderFormat::Svg) => svg::tree_svg(tree),
        (Representation::ProcessTree(tree), RenderFormat::Dot) => svg::tree_dot(tree),
        (Representation::PetriNet(net), RenderFormat::Svg) => svg::petri_svg(net),
        (Representation::PetriNet(net), RenderFormat::Dot) => svg::petri_dot(net),
        (Representation::Bpmn(graph), RenderFormat::Svg) => svg::bpmn_svg(graph),
        (Representation::Bpmn(graph), RenderFormat::Dot) => svg::bpmn_dot(graph),
    };
    drawn
        .map(String::into_bytes)
        .map_err(|source| ConversionError::Render {
            view: representation.view(),
            source,
        })
}

/// One view of one model together with both export payloads, all derived
/// from the same model value
#[derive(Debug, Clone)]
pub struct RenderedView {
    pub model_id: Uuid,
    pub digest: String,
    pub view: ViewType,
    pub format: RenderFormat,
    pub image: Vec<u8>,
    pub bpmn_xml: Vec<u8>,
    pub pnml: Vec<u8>,
    pub initial_marking: Marking,
    pub final_marking: Marking,
}

pub fn project(
    model: &CanonicalModel,
    view: ViewType,
    format: RenderFormat,
) -> Result<RenderedView, ConversionError> {
    let marked = to_petri_net(model.tree());
    let graph = to_bpmn(&marked.net, &marked.initial, &marked.final_marking);

    let representation = match view {
        ViewType::ProcessTree => Representation::ProcessTree(model.tree()),
        ViewType::PetriNet => Representation::PetriNet(&marked),
        ViewType::Bpmn => Representation::Bpmn(&graph),
    };
    let image = render(&representation, format)?;

    let bpmn_xml = serialize_bpmn(&graph, DEFAULT_ENCODING).map_err(|source| {
        ConversionError::Serialize {
            artifact: "BPMN",
            source,
        }
    })?;
    let pnml = serialize_pnml(&marked.net, &marked.initial, &marked.final_marking).map_err(
        |source| ConversionError::Serialize {
            artifact: "PNML",
            source,
        },
    )?;

    Ok(RenderedView {
        model_id: model.id,
        digest: model.digest(),
        view,
        format,
        image,
        bpmn_xml,
        pnml,
        initial_marking: marked.initial,
        final_marking: marked.final_marking,
    })
}

/// BPMN export of a model in the requested encoding
pub fn export_bpmn(model: &CanonicalModel, encoding: XmlEncoding) -> Result<Vec<u8>, ConversionError> {
    let marked = to_petri_net(model.tree());
    let graph = to_bpmn(&marked.net, &marked.initial, &marked.final_marking);
    serialize_bpmn(&graph, encoding).map_err(|source| ConversionError::Serialize {
        artifact: "BPMN",
        source,
    })
}

pub fn export_pnml(model: &CanonicalModel) -> Result<Vec<u8>, ConversionError> {
    let marked = to_petri_net(model.tree());
    serialize_pnml(&marked.net, &marked.initial, &marked.final_marking).map_err(|source| {
        ConversionError::Serialize {
            artifact: "PNML",
            source,
        }
    })
}

/// Escape text for use in XML attributes and content
pub(crate) fn xml_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::ModelOrigin;

    fn approve_reject() -> CanonicalModel {
        CanonicalModel::new(
            ProcessTree::sequence(vec![
                ProcessTree::activity("approve"),
                ProcessTree::activity("reject"),
            ]),
            ModelOrigin::Text {
                description: "approve then reject".to_string(),
            },
        )
        .unwrap()
    }

    #[test]
    fn test_views_of_one_model_share_markings() {
        let model = approve_reject();
        let petri = project(&model, ViewType::PetriNet, RenderFormat::Svg).unwrap();
        let bpmn = project(&model, ViewType::Bpmn, RenderFormat::Svg).unwrap();

        assert_eq!(petri.model_id, bpmn.model_id);
        assert_eq!(petri.initial_marking, bpmn.initial_marking);
        assert_eq!(petri.final_marking, bpmn.final_marking);
        assert_eq!(petri.pnml, bpmn.pnml);
        assert_ne!(petri.image, bpmn.image);
    }

    #[test]
    fn test_projection_is_deterministic() {
        let model = approve_reject();
        let a = project(&model, ViewType::Bpmn, RenderFormat::Svg).unwrap();
        let b = project(&model, ViewType::Bpmn, RenderFormat::Svg).unwrap();
        assert_eq!(a.bpmn_xml, b.bpmn_xml);
        assert_eq!(a.image, b.image);
    }

    #[test]
    fn test_view_type_parse() {
        assert_eq!("powl".parse::<ViewType>().unwrap(), ViewType::ProcessTree);
        assert_eq!("petri_net".parse::<ViewType>().unwrap(), ViewType::PetriNet);
        assert_eq!(ViewType::default(), ViewType::Bpmn);
        assert!("graph".parse::<ViewType>().is_err());
    }
}
