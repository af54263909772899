//! AI generation and feedback through an LLM provider

use super::prompt::{self, TreeExtractor};
use super::EngineError;
use crate::llm::{AiConfig, LlmConfig, LlmMessage, LlmRequest, LlmService};
use crate::process::ProcessTree;

const MAX_TOKENS: u32 = 8192;

pub struct AiEngine {
    llm: LlmConfig,
    extractor: TreeExtractor,
    max_repair_attempts: u32,
}

impl AiEngine {
    pub fn new(llm: LlmConfig, max_repair_attempts: u32) -> Result<Self, regex::Error> {
        Ok(Self {
            llm,
            extractor: TreeExtractor::new()?,
            max_repair_attempts,
        })
    }

    /// Process tree for a free-text description
    pub async fn generate(
        &self,
        config: &AiConfig,
        description: &str,
    ) -> Result<ProcessTree, EngineError> {
        let service = self.llm.connect(config)?;
        self.converse(service.as_ref(), prompt::generation_prompt(description))
            .await
    }

    /// Revised process tree for one round of feedback
    pub async fn update(
        &self,
        config: &AiConfig,
        tree: &ProcessTree,
        description: Option<&str>,
        feedback: &str,
    ) -> Result<ProcessTree, EngineError> {
        let service = self.llm.connect(config)?;
        self.converse(
            service.as_ref(),
            prompt::update_prompt(tree, description, feedback),
        )
        .await
    }

    /// Ask until the answer holds a valid tree, re-prompting with the
    /// extraction error at most `max_repair_attempts` times
    pub(crate) async fn converse(
        &self,
        service: &dyn LlmService,
        first_prompt: String,
    ) -> Result<ProcessTree, EngineError> {
        let mut messages = vec![LlmMessage::user(first_prompt)];
        let mut attempts = 0;

        loop {
            attempts += 1;
            let request = LlmRequest {
                system: prompt::SYSTEM_PROMPT.to_string(),
                messages: messages.clone(),
                max_tokens: Some(MAX_TOKENS),
            };
            let response = service.complete(&request).await?;

            match self.extractor.extract(&response.text) {
                Ok(tree) => {
                    if attempts > 1 {
                        tracing::info!(attempts, "Model answer repaired");
                    }
                    return Ok(tree);
                }
                Err(e) if attempts > self.max_repair_attempts => {
                    return Err(EngineError::Malformed {
                        attempts,
                        source: e,
                    });
                }
                Err(e) => {
                    tracing::warn!(attempt = attempts, error = %e, "Unusable model answer, asking again");
                    messages.push(LlmMessage::assistant(response.text));
                    messages.push(LlmMessage::user(prompt::repair_prompt(&e)));
                }
            }
        }
    }
}
