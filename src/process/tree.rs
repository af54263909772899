//! Process tree and the canonical session model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::fmt::{self, Write};
use thiserror::Error;
use uuid::Uuid;

/// Block-structured process tree
///
/// Operators with children hold at least one child; a single child is
/// collapsed into the child itself by [`ProcessTree::normalize`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProcessTree {
    Activity {
        label: String,
    },
    Silent,
    Sequence {
        children: Vec<ProcessTree>,
    },
    Xor {
        children: Vec<ProcessTree>,
    },
    Parallel {
        children: Vec<ProcessTree>,
    },
    Loop {
        #[serde(rename = "do")]
        body: Box<ProcessTree>,
        redo: Box<ProcessTree>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TreeError {
    #[error("{operator} operator has no children")]
    EmptyOperator { operator: &'static str },
    #[error("Activity label must not be blank")]
    BlankLabel,
    #[error("Malformed process tree: {0}")]
    Malformed(String),
}

impl ProcessTree {
    pub fn activity(label: impl Into<String>) -> Self {
        ProcessTree::Activity {
            label: label.into(),
        }
    }

    pub fn sequence(children: Vec<ProcessTree>) -> Self {
        ProcessTree::Sequence { children }
    }

    pub fn xor(children: Vec<ProcessTree>) -> Self {
        ProcessTree::Xor { children }
    }

    pub fn parallel(children: Vec<ProcessTree>) -> Self {
        ProcessTree::Parallel { children }
    }

    pub fn looped(body: ProcessTree, redo: ProcessTree) -> Self {
        ProcessTree::Loop {
            body: Box::new(body),
            redo: Box::new(redo),
        }
    }

    /// Parse the JSON wire form
    pub fn from_json(value: serde_json::Value) -> Result<Self, TreeError> {
        let tree: ProcessTree =
            serde_json::from_value(value).map_err(|e| TreeError::Malformed(e.to_string()))?;
        tree.validate()?;
        Ok(tree.normalize())
    }

    pub fn operator_name(&self) -> &'static str {
        match self {
            ProcessTree::Activity { .. } => "activity",
            ProcessTree::Silent => "silent",
            ProcessTree::Sequence { .. } => "sequence",
            ProcessTree::Xor { .. } => "xor",
            ProcessTree::Parallel { .. } => "parallel",
            ProcessTree::Loop { .. } => "loop",
        }
    }

    /// Check structural rules without modifying the tree
    pub fn validate(&self) -> Result<(), TreeError> {
        match self {
            ProcessTree::Activity { label } => {
                if label.trim().is_empty() {
                    return Err(TreeError::BlankLabel);
                }
                Ok(())
            }
            ProcessTree::Silent => Ok(()),
            ProcessTree::Sequence { children }
            | ProcessTree::Xor { children }
            | ProcessTree::Parallel { children } => {
                if children.is_empty() {
                    return Err(TreeError::EmptyOperator {
                        operator: self.operator_name(),
                    });
                }
                children.iter().try_for_each(ProcessTree::validate)
            }
            ProcessTree::Loop { body, redo } => {
                body.validate()?;
                redo.validate()
            }
        }
    }

    /// Trim labels, flatten nested operators of the same kind and collapse
    /// single-child operators
    #[must_use]
    pub fn normalize(self) -> Self {
        match self {
            ProcessTree::Activity { label } => ProcessTree::Activity {
                label: label.trim().to_string(),
            },
            ProcessTree::Silent => ProcessTree::Silent,
            ProcessTree::Sequence { children } => {
                collapse(flatten(children, |t| match t {
                    ProcessTree::Sequence { children } => Ok(children),
                    other => Err(other),
                }))
                .unwrap_or_else(|children| ProcessTree::Sequence { children })
            }
            ProcessTree::Xor { children } => collapse(flatten(children, |t| match t {
                ProcessTree::Xor { children } => Ok(children),
                other => Err(other),
            }))
            .unwrap_or_else(|children| ProcessTree::Xor { children }),
            ProcessTree::Parallel { children } => collapse(flatten(children, |t| match t {
                ProcessTree::Parallel { children } => Ok(children),
                other => Err(other),
            }))
            .unwrap_or_else(|children| ProcessTree::Parallel { children }),
            ProcessTree::Loop { body, redo } => ProcessTree::Loop {
                body: Box::new(body.normalize()),
                redo: Box::new(redo.normalize()),
            },
        }
    }

    /// Distinct activity labels in the tree
    pub fn activities(&self) -> BTreeSet<&str> {
        let mut labels = BTreeSet::new();
        self.collect_activities(&mut labels);
        labels
    }

    fn collect_activities<'a>(&'a self, labels: &mut BTreeSet<&'a str>) {
        match self {
            ProcessTree::Activity { label } => {
                labels.insert(label.as_str());
            }
            ProcessTree::Silent => {}
            ProcessTree::Sequence { children }
            | ProcessTree::Xor { children }
            | ProcessTree::Parallel { children } => {
                for child in children {
                    child.collect_activities(labels);
                }
            }
            ProcessTree::Loop { body, redo } => {
                body.collect_activities(labels);
                redo.collect_activities(labels);
            }
        }
    }

    /// Number of nodes in the tree
    pub fn size(&self) -> usize {
        match self {
            ProcessTree::Activity { .. } | ProcessTree::Silent => 1,
            ProcessTree::Sequence { children }
            | ProcessTree::Xor { children }
            | ProcessTree::Parallel { children } => {
                1 + children.iter().map(ProcessTree::size).sum::<usize>()
            }
            ProcessTree::Loop { body, redo } => 1 + body.size() + redo.size(),
        }
    }

    /// Children in display order (loop: body then redo)
    pub fn children(&self) -> Vec<&ProcessTree> {
        match self {
            ProcessTree::Activity { .. } | ProcessTree::Silent => vec![],
            ProcessTree::Sequence { children }
            | ProcessTree::Xor { children }
            | ProcessTree::Parallel { children } => children.iter().collect(),
            ProcessTree::Loop { body, redo } => vec![body.as_ref(), redo.as_ref()],
        }
    }

    /// Operator symbol used in the textual notation
    pub fn symbol(&self) -> &'static str {
        match self {
            ProcessTree::Activity { .. } => "",
            ProcessTree::Silent => "tau",
            ProcessTree::Sequence { .. } => "->",
            ProcessTree::Xor { .. } => "X",
            ProcessTree::Parallel { .. } => "+",
            ProcessTree::Loop { .. } => "*",
        }
    }

    /// One node per line, indented by depth. Line diffs over this form stay
    /// local to the part of the tree that changed.
    pub fn pretty(&self) -> String {
        let mut out = String::new();
        self.write_pretty(&mut out, 0);
        out
    }

    fn write_pretty(&self, out: &mut String, depth: usize) {
        let indent = "  ".repeat(depth);
        match self {
            ProcessTree::Activity { label } => {
                let _ = writeln!(out, "{indent}'{}'", escape_label(label));
            }
            ProcessTree::Silent => {
                let _ = writeln!(out, "{indent}tau");
            }
            _ => {
                let _ = writeln!(out, "{indent}{}(", self.symbol());
                for child in self.children() {
                    child.write_pretty(out, depth + 1);
                }
                let _ = writeln!(out, "{indent})");
            }
        }
    }
}

impl fmt::Display for ProcessTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessTree::Activity { label } => write!(f, "'{}'", escape_label(label)),
            ProcessTree::Silent => f.write_str("tau"),
            _ => {
                write!(f, "{}( ", self.symbol())?;
                for (i, child) in self.children().into_iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{child}")?;
                }
                f.write_str(" )")
            }
        }
    }
}

fn escape_label(label: &str) -> String {
    label.replace('\'', "\\'")
}

fn flatten(
    children: Vec<ProcessTree>,
    same_kind: impl Fn(ProcessTree) -> Result<Vec<ProcessTree>, ProcessTree> + Copy,
) -> Vec<ProcessTree> {
    let mut flat = Vec::with_capacity(children.len());
    for child in children {
        match same_kind(child.normalize()) {
            Ok(grandchildren) => flat.extend(grandchildren),
            Err(other) => flat.push(other),
        }
    }
    flat
}

/// `Ok(child)` when exactly one child remains, otherwise the children back
fn collapse(mut children: Vec<ProcessTree>) -> Result<ProcessTree, Vec<ProcessTree>> {
    if children.len() == 1 {
        Ok(children.remove(0))
    } else {
        Err(children)
    }
}

// ============================================================================
// Canonical Model
// ============================================================================

/// File formats accepted for existing models
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelFormat {
    Bpmn,
    Pnml,
}

impl ModelFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ModelFormat::Bpmn => "bpmn",
            ModelFormat::Pnml => "pnml",
        }
    }
}

/// How the first revision of a model was obtained
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ModelOrigin {
    Text { description: String },
    EventLog { file_name: String, traces: usize },
    ExistingModel { file_name: String, format: ModelFormat },
}

/// The single authoritative process model of a session
///
/// Values are immutable. Feedback produces a new value with a new `id` via
/// [`CanonicalModel::derive`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CanonicalModel {
    pub id: Uuid,
    /// Model this one was derived from by feedback
    pub parent: Option<Uuid>,
    /// 0 for a freshly generated model, +1 per feedback round
    pub revision: u32,
    pub origin: ModelOrigin,
    pub created_at: DateTime<Utc>,
    tree: ProcessTree,
}

impl CanonicalModel {
    pub fn new(tree: ProcessTree, origin: ModelOrigin) -> Result<Self, TreeError> {
        tree.validate()?;
        Ok(Self {
            id: Uuid::new_v4(),
            parent: None,
            revision: 0,
            origin,
            created_at: Utc::now(),
            tree: tree.normalize(),
        })
    }

    /// New revision of this model with a replacement tree
    pub fn derive(&self, tree: ProcessTree) -> Result<Self, TreeError> {
        tree.validate()?;
        Ok(Self {
            id: Uuid::new_v4(),
            parent: Some(self.id),
            revision: self.revision + 1,
            origin: self.origin.clone(),
            created_at: Utc::now(),
            tree: tree.normalize(),
        })
    }

    pub fn tree(&self) -> &ProcessTree {
        &self.tree
    }

    /// Description the model was generated from, if it came from text
    pub fn description(&self) -> Option<&str> {
        match &self.origin {
            ModelOrigin::Text { description } => Some(description),
            _ => None,
        }
    }

    /// SHA-256 over the canonical JSON of the tree, hex encoded
    pub fn digest(&self) -> String {
        let bytes = serde_json::to_vec(&self.tree).unwrap_or_default();
        let hash = Sha256::digest(&bytes);
        hash.iter().fold(String::with_capacity(64), |mut acc, b| {
            let _ = write!(acc, "{b:02x}");
            acc
        })
    }
}
