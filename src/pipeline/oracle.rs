//! Decision oracles: turn a mention and its thread into an `Analysis`.
//!
//! `GrokOracle` prompts the LLM for a JSON decision and validates it into a
//! typed `AgentAction`. `HeuristicOracle` is the offline stand-in used when
//! no xAI key is configured.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::error::OracleError;
use crate::llm::provider::{ChatMessage, CompletionRequest, LlmProvider};
use crate::pipeline::types::{AgentAction, Analysis, DecisionOracle, Thread};

/// Sampling temperature for decisions.
const DECISION_TEMPERATURE: f32 = 0.7;

/// Max tokens for the decision call.
const DECISION_MAX_TOKENS: u32 = 600;

/// Confidence assumed when the model omits one.
const DEFAULT_CONFIDENCE: f32 = 0.8;

/// Thread replies included in the prompt (most recent kept).
const MAX_PROMPT_REPLIES: usize = 10;

/// LLM-backed decision oracle.
pub struct GrokOracle {
    llm: Arc<dyn LlmProvider>,
}

impl GrokOracle {
    pub fn new(llm: Arc<dyn LlmProvider>) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl DecisionOracle for GrokOracle {
    async fn decide(
        &self,
        mention_text: &str,
        thread: &Thread,
        target_post_id: &str,
    ) -> Result<Analysis, OracleError> {
        let request = CompletionRequest::new(vec![
            ChatMessage::system(build_system_prompt()),
            ChatMessage::user(build_user_prompt(mention_text, thread)),
        ])
        .with_temperature(DECISION_TEMPERATURE)
        .with_max_tokens(DECISION_MAX_TOKENS);

        let response = self.llm.complete(request).await?;
        debug!(
            model = self.llm.model_name(),
            output_tokens = response.output_tokens,
            "Oracle response received"
        );

        parse_decision(&response.content, target_post_id).inspect_err(|e| {
            warn!(
                raw_response = %response.content,
                error = %e,
                "Failed to parse oracle decision"
            );
        })
    }
}

// ── Prompt construction ─────────────────────────────────────────────

fn build_system_prompt() -> String {
    "You are an autonomous AI agent for X (Twitter). Analyze mentions and decide on \
     appropriate actions: reply, search, or analyze. Respond in JSON format with action \
     type, content, and reasoning."
        .to_string()
}

fn build_user_prompt(mention_text: &str, thread: &Thread) -> String {
    let mut prompt = String::with_capacity(1024);

    prompt.push_str("I've been mentioned in a post. Here's the context:\n\n");
    let mention_preview: String = mention_text.chars().take(1000).collect();
    prompt.push_str(&format!("MENTION: \"{}\"\n\n", mention_preview));

    if !thread.replies.is_empty() {
        prompt.push_str("THREAD CONTEXT:\n");
        prompt.push_str(&format!(
            "Root (@{}): \"{}\"\n",
            thread.root_post.author_handle,
            preview(&thread.root_post.text)
        ));
        let skip = thread.replies.len().saturating_sub(MAX_PROMPT_REPLIES);
        for (i, reply) in thread.replies.iter().enumerate().skip(skip) {
            prompt.push_str(&format!(
                "Reply {} (@{}): \"{}\"\n",
                i + 1,
                reply.author_handle,
                preview(&reply.text)
            ));
        }
        prompt.push('\n');
    }

    prompt.push_str(
        "Based on this mention, decide what action I should take. Options:\n\
         1. REPLY - Craft a thoughtful reply to engage with the user (max 280 characters)\n\
         2. SEARCH - Search for additional context or information\n\
         3. ANALYZE - Provide analysis without replying\n\n\
         Respond in this JSON format:\n\
         {\n\
         \x20 \"action\": \"reply|search|analyze\",\n\
         \x20 \"content\": \"your reply text or search query\",\n\
         \x20 \"confidence\": 0.0-1.0,\n\
         \x20 \"reasoning\": \"why you chose this action\"\n\
         }",
    );

    prompt
}

fn preview(text: &str) -> String {
    text.chars().take(280).collect()
}

// ── Response parsing ────────────────────────────────────────────────

/// Oracle response structure.
#[derive(Debug, serde::Deserialize)]
struct DecisionResponse {
    action: String,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    query: Option<String>,
    #[serde(default)]
    confidence: Option<f32>,
    #[serde(default)]
    reasoning: Option<String>,
}

/// Parse model output into a validated `Analysis` targeting `target_post_id`.
fn parse_decision(raw: &str, target_post_id: &str) -> Result<Analysis, OracleError> {
    let json_str = extract_json_object(raw)
        .ok_or_else(|| OracleError::Malformed("no JSON object in response".to_string()))?;
    let response: DecisionResponse =
        serde_json::from_str(json_str).map_err(|e| OracleError::Malformed(format!("JSON parse error: {e}")))?;

    let action = AgentAction::from_parts(
        &response.action,
        target_post_id,
        response.content,
        response.query,
        response.reasoning.clone(),
    )?;

    let explanation = response
        .reasoning
        .filter(|r| !r.trim().is_empty())
        .unwrap_or_else(|| "No explanation provided".to_string());

    Ok(Analysis::new(
        action,
        response.confidence.unwrap_or(DEFAULT_CONFIDENCE),
        explanation,
    ))
}

/// Extract a JSON object from LLM output (bare, fenced, or embedded in prose).
fn extract_json_object(text: &str) -> Option<&str> {
    let trimmed = text.trim();

    if trimmed.starts_with('{') && trimmed.ends_with('}') {
        return Some(trimmed);
    }

    if let Some(start) = trimmed.find("```json") {
        let after = &trimmed[start + 7..];
        if let Some(end) = after.find("```") {
            return Some(after[..end].trim());
        }
    }

    if let Some(start) = trimmed.find("```") {
        let after = &trimmed[start + 3..];
        if let Some(end) = after.find("```") {
            let inner = after[..end].trim();
            if inner.starts_with('{') {
                return Some(inner);
            }
        }
    }

    match (trimmed.find('{'), trimmed.rfind('}')) {
        (Some(start), Some(end)) if end > start => Some(&trimmed[start..=end]),
        _ => None,
    }
}

// ── Heuristic oracle ────────────────────────────────────────────────

const QUESTION_MARKERS: &[&str] = &["what", "how", "why", "when", "where", "can you", "could you"];

const CANNED_REPLY: &str = "Thanks for reaching out! I've looked at your question and the \
     thread around it. Happy to dig into this further, just let me know what you need!";

/// Keyword-based oracle: replies to questions, analyzes everything else.
#[derive(Debug, Default)]
pub struct HeuristicOracle;

impl HeuristicOracle {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl DecisionOracle for HeuristicOracle {
    async fn decide(
        &self,
        mention_text: &str,
        _thread: &Thread,
        target_post_id: &str,
    ) -> Result<Analysis, OracleError> {
        let lower = mention_text.to_lowercase();
        let is_question = QUESTION_MARKERS.iter().any(|m| lower.contains(m));

        if is_question {
            Ok(Analysis::new(
                AgentAction::reply(target_post_id, CANNED_REPLY)?,
                0.85,
                "User asked a question, best action is to provide a helpful reply",
            ))
        } else {
            Ok(Analysis::new(
                AgentAction::analyze(
                    target_post_id,
                    Some("No clear action needed, just acknowledgment".to_string()),
                ),
                0.7,
                "Mention doesn't require immediate action",
            ))
        }
    }
}
