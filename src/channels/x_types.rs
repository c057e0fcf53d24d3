//! X API v2 wire types and their conversion into pipeline types.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::pipeline::types::{Mention, Post, ReferencedPost};

/// Handle used when the author was not expanded in the response.
pub const UNKNOWN_HANDLE: &str = "unknown";

/// A tweet object as returned by v2 endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct TweetData {
    pub id: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub author_id: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub conversation_id: Option<String>,
    #[serde(default)]
    pub in_reply_to_user_id: Option<String>,
    #[serde(default)]
    pub referenced_tweets: Vec<ReferencedTweet>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReferencedTweet {
    #[serde(rename = "type")]
    pub kind: String,
    pub id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UserData {
    pub id: String,
    pub username: String,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct Includes {
    #[serde(default)]
    pub users: Vec<UserData>,
}

/// Partial error entry the API returns alongside (or instead of) `data`.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiProblem {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub detail: Option<String>,
}

/// `GET /2/users/by/username/{username}`
#[derive(Debug, Deserialize)]
pub struct UserLookupResponse {
    #[serde(default)]
    pub data: Option<UserData>,
    #[serde(default)]
    pub errors: Vec<ApiProblem>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListMeta {
    #[serde(default)]
    pub newest_id: Option<String>,
    #[serde(default)]
    pub result_count: Option<u32>,
}

/// Mentions timeline and recent search share this shape. `data` is absent
/// when nothing matched.
#[derive(Debug, Default, Deserialize)]
pub struct TweetListResponse {
    #[serde(default)]
    pub data: Vec<TweetData>,
    #[serde(default)]
    pub includes: Includes,
    #[serde(default)]
    pub meta: Option<ListMeta>,
}

impl TweetListResponse {
    /// Id of the newest tweet, which the API lists first.
    pub fn newest_id(&self) -> Option<&str> {
        self.data.first().map(|t| t.id.as_str())
    }

    /// Convert to posts, resolving author handles from `includes.users`.
    pub fn into_posts(self) -> Vec<Post> {
        let handles: HashMap<String, String> = self
            .includes
            .users
            .into_iter()
            .map(|u| (u.id, u.username))
            .collect();
        self.data.into_iter().map(|t| t.into_post(&handles)).collect()
    }

    pub fn into_mentions(self) -> Vec<Mention> {
        self.into_posts().into_iter().map(Mention::new).collect()
    }
}

impl TweetData {
    pub fn into_post(self, handles: &HashMap<String, String>) -> Post {
        let author_handle = self
            .author_id
            .as_ref()
            .and_then(|id| handles.get(id))
            .cloned()
            .unwrap_or_else(|| UNKNOWN_HANDLE.to_string());

        Post {
            id: self.id,
            text: self.text,
            author_id: self.author_id.unwrap_or_default(),
            author_handle,
            created_at: self.created_at.unwrap_or_else(Utc::now),
            conversation_id: self.conversation_id,
            in_reply_to_user_id: self.in_reply_to_user_id,
            referenced_posts: self
                .referenced_tweets
                .into_iter()
                .map(|r| ReferencedPost { kind: r.kind, id: r.id })
                .collect(),
        }
    }
}

/// `POST /2/tweets` body for a reply.
#[derive(Debug, Serialize)]
pub struct CreateTweetRequest<'a> {
    pub text: &'a str,
    pub reply: ReplySettings<'a>,
}

#[derive(Debug, Serialize)]
pub struct ReplySettings<'a> {
    pub in_reply_to_tweet_id: &'a str,
}

impl<'a> CreateTweetRequest<'a> {
    pub fn reply(in_reply_to_tweet_id: &'a str, text: &'a str) -> Self {
        Self {
            text,
            reply: ReplySettings { in_reply_to_tweet_id },
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateTweetResponse {
    #[serde(default)]
    pub data: Option<CreatedTweet>,
}

#[derive(Debug, Deserialize)]
pub struct CreatedTweet {
    pub id: String,
    #[serde(default)]
    pub text: Option<String>,
}
