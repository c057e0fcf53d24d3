//! X API v2 client for mentions, threads, replies and search.
//!
//! Reads are retried per the configured bound and soft-fail: a failed
//! mention fetch logs and yields an empty batch, a failed search yields no
//! results. Replies are sent once, so a lost response never posts twice.

use async_trait::async_trait;
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use crate::channels::x_types::{CreateTweetRequest, CreateTweetResponse, TweetListResponse, UserLookupResponse};
use crate::error::ChannelError;
use crate::pipeline::types::{ActionExecutor, Mention, MentionSource, Post, Thread, ThreadSource};
use crate::retry::retry_with_backoff;

/// X API v2 base URL.
pub const X_API_BASE: &str = "https://api.twitter.com/2";

const MAX_MENTIONS_PER_FETCH: u32 = 10;
const MAX_THREAD_POSTS: u32 = 100;
const MAX_SEARCH_RESULTS: u32 = 10;

const TWEET_FIELDS: &str = "created_at,author_id,conversation_id,in_reply_to_user_id,referenced_tweets";

/// Per-request timeout.
const REQUEST_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(30);

type Query = Vec<(&'static str, String)>;

/// Bearer-authenticated X API client.
pub struct XApiClient {
    client: reqwest::Client,
    bearer_token: SecretString,
    base_url: String,
    max_retries: u32,
    /// `(handle, user id)` from the last successful lookup.
    user: RwLock<Option<(String, String)>>,
    /// Newest mention id seen, sent as `since_id`.
    watermark: RwLock<Option<String>>,
}

impl XApiClient {
    pub fn new(bearer_token: SecretString, max_retries: u32) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            client,
            bearer_token,
            base_url: X_API_BASE.to_string(),
            max_retries,
            user: RwLock::new(None),
            watermark: RwLock::new(None),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub async fn watermark(&self) -> Option<String> {
        self.watermark.read().await.clone()
    }

    async fn user_id(&self, handle: &str) -> Result<String, ChannelError> {
        let cached = self
            .user
            .read()
            .await
            .as_ref()
            .filter(|(cached_handle, _)| cached_handle == handle)
            .map(|(_, id)| id.clone());
        if let Some(id) = cached {
            return Ok(id);
        }

        let lookup: UserLookupResponse = self
            .get("users/by/username", &format!("users/by/username/{handle}"), Vec::new())
            .await?;
        let user = lookup.data.ok_or_else(|| {
            if let Some(problem) = lookup.errors.first() {
                warn!(
                    handle,
                    title = problem.title.as_deref().unwrap_or(""),
                    detail = problem.detail.as_deref().unwrap_or(""),
                    "User lookup returned an error"
                );
            }
            ChannelError::UnknownAccount {
                handle: handle.to_string(),
            }
        })?;

        debug!(handle, user_id = %user.id, "Resolved account id");
        *self.user.write().await = Some((handle.to_string(), user.id.clone()));
        Ok(user.id)
    }

    async fn try_fetch_mentions(&self, handle: &str) -> Result<Vec<Mention>, ChannelError> {
        let user_id = self.user_id(handle).await?;
        let since_id = self.watermark().await;

        let response: TweetListResponse = self
            .get(
                "users/mentions",
                &format!("users/{user_id}/mentions"),
                mentions_query(since_id.as_deref()),
            )
            .await?;

        if let Some(newest) = response.newest_id() {
            *self.watermark.write().await = Some(newest.to_string());
        }
        Ok(response.into_mentions())
    }

    async fn get<T: DeserializeOwned>(&self, endpoint: &str, path: &str, query: Query) -> Result<T, ChannelError> {
        let url = format!("{}/{}", self.base_url, path);
        let (url, query) = (&url, &query);
        retry_with_backoff(self.max_retries, endpoint, || async move {
            let response = self
                .client
                .get(url)
                .bearer_auth(self.bearer_token.expose_secret())
                .query(query)
                .send()
                .await
                .map_err(|e| request_failed(endpoint, e))?;
            read_json(endpoint, response).await
        })
        .await
    }

    async fn post<B: Serialize, T: DeserializeOwned>(&self, endpoint: &str, path: &str, body: &B) -> Result<T, ChannelError> {
        let url = format!("{}/{}", self.base_url, path);
        let response = self
            .client
            .post(&url)
            .bearer_auth(self.bearer_token.expose_secret())
            .json(body)
            .send()
            .await
            .map_err(|e| request_failed(endpoint, e))?;
        read_json(endpoint, response).await
    }
}

#[async_trait]
impl MentionSource for XApiClient {
    async fn fetch_mentions(&self, handle: &str) -> Result<Vec<Mention>, ChannelError> {
        match self.try_fetch_mentions(handle).await {
            Ok(mentions) => Ok(mentions),
            Err(e) => {
                error!(handle, error = %e, "Error fetching mentions");
                Ok(Vec::new())
            }
        }
    }
}

#[async_trait]
impl ThreadSource for XApiClient {
    async fn fetch_thread(&self, conversation_id: &str) -> Result<Option<Thread>, ChannelError> {
        let response: TweetListResponse = self
            .get("tweets/search/recent", "tweets/search/recent", thread_query(conversation_id))
            .await?;
        Ok(Thread::from_posts(response.into_posts()))
    }
}

#[async_trait]
impl ActionExecutor for XApiClient {
    async fn post_reply(&self, target_post_id: &str, text: &str) -> bool {
        let body = CreateTweetRequest::reply(target_post_id, text);
        match self.post::<_, CreateTweetResponse>("tweets", "tweets", &body).await {
            Ok(CreateTweetResponse { data: Some(created) }) => {
                debug!(target_post_id, reply_id = %created.id, "Reply accepted");
                true
            }
            Ok(_) => {
                warn!(target_post_id, "Reply response carried no post id");
                false
            }
            Err(e) => {
                error!(target_post_id, error = %e, "Error posting reply");
                false
            }
        }
    }

    async fn search(&self, query: &str) -> Vec<Post> {
        match self
            .get::<TweetListResponse>("tweets/search/recent", "tweets/search/recent", search_query(query))
            .await
        {
            Ok(response) => {
                let posts = response.into_posts();
                info!(query, results = posts.len(), "Search returned");
                posts
            }
            Err(e) => {
                error!(query, error = %e, "Error searching posts");
                Vec::new()
            }
        }
    }
}

fn mentions_query(since_id: Option<&str>) -> Query {
    let mut query = vec![
        ("max_results", MAX_MENTIONS_PER_FETCH.to_string()),
        ("expansions", "author_id".to_string()),
        ("tweet.fields", TWEET_FIELDS.to_string()),
        ("user.fields", "username".to_string()),
    ];
    if let Some(since_id) = since_id {
        query.push(("since_id", since_id.to_string()));
    }
    query
}

fn thread_query(conversation_id: &str) -> Query {
    vec![
        ("query", format!("conversation_id:{conversation_id}")),
        ("max_results", MAX_THREAD_POSTS.to_string()),
        ("expansions", "author_id".to_string()),
        ("tweet.fields", TWEET_FIELDS.to_string()),
        ("user.fields", "username".to_string()),
    ]
}

fn search_query(query: &str) -> Query {
    vec![
        ("query", query.to_string()),
        ("max_results", MAX_SEARCH_RESULTS.to_string()),
        ("expansions", "author_id".to_string()),
        ("tweet.fields", TWEET_FIELDS.to_string()),
    ]
}

fn request_failed(endpoint: &str, e: reqwest::Error) -> ChannelError {
    ChannelError::RequestFailed {
        endpoint: endpoint.to_string(),
        reason: e.to_string(),
    }
}

async fn read_json<T: DeserializeOwned>(endpoint: &str, response: reqwest::Response) -> Result<T, ChannelError> {
    check_status(endpoint, response.status())?;
    response.json::<T>().await.map_err(|e| ChannelError::InvalidResponse {
        endpoint: endpoint.to_string(),
        reason: e.to_string(),
    })
}

fn check_status(endpoint: &str, status: StatusCode) -> Result<(), ChannelError> {
    if status.is_success() {
        return Ok(());
    }
    let endpoint = endpoint.to_string();
    Err(match status {
        StatusCode::TOO_MANY_REQUESTS => ChannelError::RateLimited { endpoint },
        s => ChannelError::Status {
            endpoint,
            status: s.as_u16(),
        },
    })
}
