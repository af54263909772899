//! Prompts for the AI engine and extraction of its answers

use crate::process::{ProcessTree, TreeError};
use regex::Regex;
use thiserror::Error;

pub const SYSTEM_PROMPT: &str = r#"You are an expert in business process modeling. You translate process descriptions into block-structured process trees.

Answer with exactly one JSON object describing the process tree, inside a ```json fenced code block. Node types:
- {"type": "activity", "label": "<activity name>"}
- {"type": "silent"} for a skip
- {"type": "sequence", "children": [...]} children run in order
- {"type": "xor", "children": [...]} exactly one child runs
- {"type": "parallel", "children": [...]} all children run concurrently
- {"type": "loop", "do": {...}, "redo": {...}} run "do", then optionally "redo" and "do" again

Rules:
- Every operator has at least one child.
- Activity labels are short verb phrases and are never empty.
- Each activity label appears at most once in the tree.
- Model optional steps as an xor with a silent child."#;

/// First request for a text description
pub fn generation_prompt(description: &str) -> String {
    format!(
        "Create a process tree for the following process description.\n\n\
         Description:\n{description}"
    )
}

/// Request to revise an existing tree with user feedback
pub fn update_prompt(tree: &ProcessTree, description: Option<&str>, feedback: &str) -> String {
    let current = serde_json::to_string_pretty(tree).unwrap_or_else(|_| tree.to_string());
    let mut prompt = String::new();
    if let Some(description) = description {
        prompt.push_str("The model was created from this description:\n");
        prompt.push_str(description);
        prompt.push_str("\n\n");
    }
    prompt.push_str("Current process tree:\n```json\n");
    prompt.push_str(&current);
    prompt.push_str("\n```\n\nRevise the process tree according to this feedback and answer with the complete revised tree:\n");
    prompt.push_str(feedback);
    prompt
}

/// Follow-up after an unusable answer
pub fn repair_prompt(error: &ExtractError) -> String {
    format!(
        "Your previous answer could not be used: {error}\n\
         Answer again with the complete process tree as one JSON object in a ```json code block."
    )
}

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("the answer contains no JSON object")]
    NoJson,

    #[error("the JSON is invalid: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("the process tree is invalid: {0}")]
    InvalidTree(#[from] TreeError),
}

/// Finds the process tree in a free-form model answer
pub struct TreeExtractor {
    fenced: Regex,
}

impl TreeExtractor {
    pub fn new() -> Result<Self, regex::Error> {
        let fenced = Regex::new(r"(?s)```(?:json)?\s*(\{.*?\})\s*```")?;
        Ok(Self { fenced })
    }

    /// Prefer a fenced JSON block, else the outermost brace span
    pub fn extract(&self, answer: &str) -> Result<ProcessTree, ExtractError> {
        let json = if let Some(m) = self.fenced.captures(answer).and_then(|c| c.get(1)) {
            m.as_str()
        } else {
            let start = answer.find('{').ok_or(ExtractError::NoJson)?;
            let end = answer.rfind('}').ok_or(ExtractError::NoJson)?;
            if end < start {
                return Err(ExtractError::NoJson);
            }
            &answer[start..=end]
        };

        let value: serde_json::Value = serde_json::from_str(json)?;
        Ok(ProcessTree::from_json(value)?)
    }
}
