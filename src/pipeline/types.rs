//! Shared types for the mention pipeline.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ActionError, ChannelError, OracleError};

// ── Posts ───────────────────────────────────────────────────────────

/// An immutable post on the social network. Identity is `id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: String,
    pub text: String,
    pub author_id: String,
    /// Author handle without `@`, or `"unknown"` when the API omitted it.
    pub author_handle: String,
    pub created_at: DateTime<Utc>,
    pub conversation_id: Option<String>,
    pub in_reply_to_user_id: Option<String>,
    #[serde(default)]
    pub referenced_posts: Vec<ReferencedPost>,
}

/// A link from one post to another (reply, quote, repost).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferencedPost {
    /// `replied_to`, `quoted` or `retweeted`.
    pub kind: String,
    pub id: String,
}

/// A post that mentioned the monitored account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mention {
    pub post: Post,
    pub mentioned_at: DateTime<Utc>,
    /// Informational only; the dedup store decides what was handled.
    pub processed: bool,
}

impl Mention {
    pub fn new(post: Post) -> Self {
        Self {
            mentioned_at: post.created_at,
            post,
            processed: false,
        }
    }

    pub fn id(&self) -> &str {
        &self.post.id
    }

    /// Conversation to fetch context for, falling back to the post itself.
    pub fn conversation_id(&self) -> &str {
        self.post
            .conversation_id
            .as_deref()
            .filter(|c| !c.is_empty())
            .unwrap_or(&self.post.id)
    }
}

/// A conversation: the root post plus its replies, oldest first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Thread {
    pub root_post: Post,
    pub replies: Vec<Post>,
}

impl Thread {
    /// Build a thread from posts in any order. Returns `None` for no posts.
    pub fn from_posts(mut posts: Vec<Post>) -> Option<Self> {
        if posts.is_empty() {
            return None;
        }
        posts.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        let root_post = posts.remove(0);
        Some(Self {
            root_post,
            replies: posts,
        })
    }

    /// Number of posts including the root.
    pub fn post_count(&self) -> usize {
        self.replies.len() + 1
    }
}

// ── Actions ─────────────────────────────────────────────────────────

/// What the agent should do about a mention.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActionKind {
    Reply { content: String },
    Search { query: String },
    Analyze { reasoning: Option<String> },
    Generate { content: String },
}

/// A validated action aimed at a specific post.
///
/// Only the constructors below can build one, so a reply always has
/// content and a search always has a query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentAction {
    target_post_id: String,
    #[serde(flatten)]
    kind: ActionKind,
}

impl AgentAction {
    pub fn reply(target_post_id: impl Into<String>, content: impl Into<String>) -> Result<Self, ActionError> {
        let content = required("reply", "content", content.into())?;
        Ok(Self::build(target_post_id, ActionKind::Reply { content }))
    }

    pub fn search(target_post_id: impl Into<String>, query: impl Into<String>) -> Result<Self, ActionError> {
        let query = required("search", "query", query.into())?;
        Ok(Self::build(target_post_id, ActionKind::Search { query }))
    }

    pub fn analyze(target_post_id: impl Into<String>, reasoning: Option<String>) -> Self {
        let reasoning = reasoning.filter(|r| !r.trim().is_empty());
        Self::build(target_post_id, ActionKind::Analyze { reasoning })
    }

    pub fn generate(target_post_id: impl Into<String>, content: impl Into<String>) -> Result<Self, ActionError> {
        let content = required("generate", "content", content.into())?;
        Ok(Self::build(target_post_id, ActionKind::Generate { content }))
    }

    /// Build from loosely-typed parts, e.g. a parsed oracle payload.
    pub fn from_parts(
        kind: &str,
        target_post_id: impl Into<String>,
        content: Option<String>,
        query: Option<String>,
        reasoning: Option<String>,
    ) -> Result<Self, ActionError> {
        match kind.trim().to_ascii_lowercase().as_str() {
            "reply" => Self::reply(target_post_id, content.unwrap_or_default()),
            "search" => Self::search(target_post_id, query.or(content).unwrap_or_default()),
            "analyze" => Ok(Self::analyze(target_post_id, reasoning)),
            "generate" => Self::generate(target_post_id, content.unwrap_or_default()),
            other => Err(ActionError::UnknownKind(other.to_string())),
        }
    }

    fn build(target_post_id: impl Into<String>, kind: ActionKind) -> Self {
        Self {
            target_post_id: target_post_id.into(),
            kind,
        }
    }

    pub fn target_post_id(&self) -> &str {
        &self.target_post_id
    }

    pub fn kind(&self) -> &ActionKind {
        &self.kind
    }

    /// Short label for logging.
    pub fn label(&self) -> &'static str {
        match self.kind {
            ActionKind::Reply { .. } => "reply",
            ActionKind::Search { .. } => "search",
            ActionKind::Analyze { .. } => "analyze",
            ActionKind::Generate { .. } => "generate",
        }
    }
}

fn required(kind: &'static str, field: &'static str, value: String) -> Result<String, ActionError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ActionError::MissingField { kind, field });
    }
    Ok(trimmed.to_string())
}

// ── Analysis ────────────────────────────────────────────────────────

/// Confidence assigned to the fallback decision.
pub const FALLBACK_CONFIDENCE: f32 = 0.3;

/// The oracle's decision for one mention.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Analysis {
    pub action: AgentAction,
    /// Always within `[0, 1]`.
    pub confidence: f32,
    pub explanation: String,
    /// Set only by [`Analysis::fallback`].
    fallback: bool,
}

impl Analysis {
    pub fn new(action: AgentAction, confidence: f32, explanation: impl Into<String>) -> Self {
        let confidence = if confidence.is_finite() {
            confidence.clamp(0.0, 1.0)
        } else {
            0.0
        };
        Self {
            action,
            confidence,
            explanation: explanation.into(),
            fallback: false,
        }
    }

    /// Low-confidence analyze-only decision used when the oracle fails.
    pub fn fallback(target_post_id: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self {
            fallback: true,
            ..Self::new(
                AgentAction::analyze(
                    target_post_id,
                    Some(format!("Unable to get a usable decision ({reason}) - defaulting to analyze-only mode")),
                ),
                FALLBACK_CONFIDENCE,
                "fallback: no action taken",
            )
        }
    }

    pub fn is_fallback(&self) -> bool {
        self.fallback
    }
}

// ── Collaborator traits ─────────────────────────────────────────────

/// Resolves an account handle to mentions newer than the source's watermark.
#[async_trait]
pub trait MentionSource: Send + Sync {
    /// New mentions, newest first. Empty when there is nothing new.
    async fn fetch_mentions(&self, handle: &str) -> Result<Vec<Mention>, ChannelError>;
}

/// Resolves a conversation id to its posts.
#[async_trait]
pub trait ThreadSource: Send + Sync {
    async fn fetch_thread(&self, conversation_id: &str) -> Result<Option<Thread>, ChannelError>;
}

/// Performs side-effecting operations named by an action.
#[async_trait]
pub trait ActionExecutor: Send + Sync {
    /// Post a reply. Returns whether the post was accepted.
    async fn post_reply(&self, target_post_id: &str, text: &str) -> bool;

    /// Search recent posts.
    async fn search(&self, query: &str) -> Vec<Post>;
}

/// Maps a mention and its context to a proposed action.
///
/// Implementations may fail; the mention processor turns any failure
/// into [`Analysis::fallback`].
#[async_trait]
pub trait DecisionOracle: Send + Sync {
    async fn decide(
        &self,
        mention_text: &str,
        thread: &Thread,
        target_post_id: &str,
    ) -> Result<Analysis, OracleError>;
}


#[cfg(test)]
mod tests {
    use super::fixtures::{mention, post};
    use super::*;

    #[test]
    fn conversation_id_falls_back_to_post_id() {
        let mut m = mention("42", "hi", 0);
        assert_eq!(m.conversation_id(), "42");

        m.post.conversation_id = Some(String::new());
        assert_eq!(m.conversation_id(), "42");

        m.post.conversation_id = Some("7".into());
        assert_eq!(m.conversation_id(), "7");
    }

    #[test]
    fn thread_sorts_posts_by_time() {
        let thread = Thread::from_posts(vec![post("c", "third", 30), post("a", "first", 10), post("b", "second", 20)])
            .unwrap();
        assert_eq!(thread.root_post.id, "a");
        let ids: Vec<_> = thread.replies.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, ["b", "c"]);
        assert_eq!(thread.post_count(), 3);
    }

    #[test]
    fn thread_from_no_posts_is_none() {
        assert!(Thread::from_posts(vec![]).is_none());
    }

    #[test]
    fn reply_requires_content() {
        assert_eq!(
            AgentAction::reply("p1", "   ").unwrap_err(),
            ActionError::MissingField {
                kind: "reply",
                field: "content"
            }
        );
        let action = AgentAction::reply("p1", " hello ").unwrap();
        assert_eq!(action.kind(), &ActionKind::Reply { content: "hello".into() });
        assert_eq!(action.target_post_id(), "p1");
    }

    #[test]
    fn search_falls_back_to_content_for_query() {
        let action = AgentAction::from_parts("search", "p1", Some("rust async".into()), None, None).unwrap();
        assert_eq!(action.kind(), &ActionKind::Search { query: "rust async".into() });

        let action =
            AgentAction::from_parts("SEARCH", "p1", Some("ignored".into()), Some("explicit".into()), None).unwrap();
        assert_eq!(action.kind(), &ActionKind::Search { query: "explicit".into() });

        assert!(AgentAction::from_parts("search", "p1", None, None, None).is_err());
    }

    #[test]
    fn from_parts_rejects_unknown_kind() {
        assert_eq!(
            AgentAction::from_parts("retweet", "p1", None, None, None).unwrap_err(),
            ActionError::UnknownKind("retweet".into())
        );
    }

    #[test]
    fn analyze_drops_blank_reasoning() {
        let action = AgentAction::analyze("p1", Some("  ".into()));
        assert_eq!(action.kind(), &ActionKind::Analyze { reasoning: None });
        assert_eq!(action.label(), "analyze");
    }

    #[test]
    fn generate_requires_content() {
        assert!(AgentAction::generate("p1", "").is_err());
        assert_eq!(AgentAction::generate("p1", "draft").unwrap().label(), "generate");
    }

    #[test]
    fn analysis_clamps_confidence() {
        let action = AgentAction::analyze("p1", None);
        assert_eq!(Analysis::new(action.clone(), 1.7, "x").confidence, 1.0);
        assert_eq!(Analysis::new(action.clone(), -0.2, "x").confidence, 0.0);
        assert_eq!(Analysis::new(action, f32::NAN, "x").confidence, 0.0);
    }

    #[test]
    fn fallback_is_low_confidence_analyze() {
        let analysis = Analysis::fallback("p9", "timeout");
        assert_eq!(analysis.confidence, FALLBACK_CONFIDENCE);
        assert_eq!(analysis.action.target_post_id(), "p9");
        assert!(analysis.is_fallback());
        match analysis.action.kind() {
            ActionKind::Analyze { reasoning } => assert!(reasoning.as_deref().unwrap().contains("timeout")),
            other => panic!("Expected Analyze, got {:?}", other),
        }
    }

    #[test]
    fn explanation_starting_with_fallback_is_not_a_fallback() {
        let analysis = Analysis::new(
            AgentAction::reply("p9", "see the docs").unwrap(),
            0.9,
            "fallback to the docs link answers this",
        );
        assert!(!analysis.is_fallback());
        assert_eq!(analysis.confidence, 0.9);
    }

    #[test]
    fn action_serializes_with_type_tag() {
        let action = AgentAction::reply("p1", "thanks!").unwrap();
        let json = serde_json::to_value(&action).unwrap();
        assert_eq!(json["type"], "reply");
        assert_eq!(json["target_post_id"], "p1");
        assert_eq!(json["content"], "thanks!");
    }
}
