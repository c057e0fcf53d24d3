//! Offline stand-in for the X API, used when no bearer token is configured.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use tokio::sync::Mutex;
use tracing::info;

use crate::error::ChannelError;
use crate::pipeline::types::{ActionExecutor, Mention, MentionSource, Post, Thread, ThreadSource};

const SIMULATED_MENTION_ID: &str = "sim_123456789";

/// Canned mentions, threads and search hits. Replies are recorded, not sent.
#[derive(Default)]
pub struct SimulatedXClient {
    replies: Mutex<Vec<(String, String)>>,
}

impl SimulatedXClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replies "posted" so far as `(target post id, text)`.
    pub async fn replies(&self) -> Vec<(String, String)> {
        self.replies.lock().await.clone()
    }
}

fn simulated_post(id: &str, text: String, author: (&str, &str), conversation_id: Option<&str>) -> Post {
    Post {
        id: id.to_string(),
        text,
        author_id: author.0.to_string(),
        author_handle: author.1.to_string(),
        created_at: Utc::now(),
        conversation_id: conversation_id.map(str::to_string),
        in_reply_to_user_id: None,
        referenced_posts: vec![],
    }
}

#[async_trait]
impl MentionSource for SimulatedXClient {
    async fn fetch_mentions(&self, handle: &str) -> Result<Vec<Mention>, ChannelError> {
        let post = simulated_post(
            SIMULATED_MENTION_ID,
            format!("@{handle} Can you analyze this market trend and give me insights?"),
            ("sim_user_001", "test_user"),
            Some("sim_conv_001"),
        );
        info!(count = 1, "Simulated: found mention(s)");
        Ok(vec![Mention::new(post)])
    }
}

#[async_trait]
impl ThreadSource for SimulatedXClient {
    async fn fetch_thread(&self, conversation_id: &str) -> Result<Option<Thread>, ChannelError> {
        let mut root = simulated_post(
            "sim_root_123",
            "This is the root post of the conversation".to_string(),
            ("sim_user_001", "test_user"),
            Some(conversation_id),
        );
        root.created_at -= Duration::seconds(60);
        let reply = simulated_post(
            "sim_reply_456",
            "This is a reply in the thread".to_string(),
            ("sim_user_002", "another_user"),
            Some(conversation_id),
        );

        let thread = Thread::from_posts(vec![root, reply]);
        info!(conversation_id, posts = 2, "Simulated: fetched thread");
        Ok(thread)
    }
}

#[async_trait]
impl ActionExecutor for SimulatedXClient {
    async fn post_reply(&self, target_post_id: &str, text: &str) -> bool {
        info!(target_post_id, text, "Simulated: would post reply");
        self.replies
            .lock()
            .await
            .push((target_post_id.to_string(), text.to_string()));
        true
    }

    async fn search(&self, query: &str) -> Vec<Post> {
        info!(query, "Simulated: searched");
        vec![simulated_post(
            "sim_search_001",
            format!("Sample post matching query: {query}"),
            ("sim_user_003", "search_result_user"),
            None,
        )]
    }
}
