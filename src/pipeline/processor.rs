//! Mention processor: fetch context, consult the oracle, dispatch.
//!
//! Flow per mention, oldest first:
//! 1. Thread fetch (conversation id, or the post itself)
//! 2. Oracle decision → typed `AgentAction` (fallback on any failure)
//! 3. Dispatch to the action executor
//! 4. Record the post id in the dedup store, whatever happened above
//!
//! Every mention gets exactly one attempt. Failures are logged and isolated
//! to the mention that caused them.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tracing::{debug, error, info, warn};

use crate::pipeline::dedup::DedupStore;
use crate::pipeline::types::{
    ActionExecutor, ActionKind, AgentAction, Analysis, DecisionOracle, Mention, Thread, ThreadSource,
};

/// Maximum characters in a single post.
pub const MAX_POST_CHARS: usize = 280;

/// Result of dispatching one action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    Replied,
    ReplyFailed,
    Searched { results: usize },
    Analyzed,
    Generated,
}

/// Result of processing one mention.
#[derive(Debug, Clone, PartialEq)]
pub enum MentionOutcome {
    /// Thread context unavailable; the oracle was not consulted.
    NoThread,
    /// A collaborator panicked while handling this mention.
    Panicked,
    Dispatched {
        action: &'static str,
        confidence: f32,
        fallback: bool,
        outcome: DispatchOutcome,
    },
}

/// Counters for one batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    /// Mentions attempted and recorded.
    pub processed: usize,
    /// Mentions abandoned because their thread could not be fetched.
    pub abandoned: usize,
    /// Mentions whose handling panicked.
    pub panicked: usize,
    /// Decisions that came from the fallback path.
    pub fallbacks: usize,
    pub replied: usize,
    pub reply_failed: usize,
    pub searched: usize,
    /// Analyze and generate decisions (no I/O).
    pub no_op: usize,
}

impl BatchReport {
    fn add(&mut self, outcome: &MentionOutcome) {
        self.processed += 1;
        match outcome {
            MentionOutcome::NoThread => self.abandoned += 1,
            MentionOutcome::Panicked => self.panicked += 1,
            MentionOutcome::Dispatched { fallback, outcome, .. } => {
                if *fallback {
                    self.fallbacks += 1;
                }
                match outcome {
                    DispatchOutcome::Replied => self.replied += 1,
                    DispatchOutcome::ReplyFailed => self.reply_failed += 1,
                    DispatchOutcome::Searched { .. } => self.searched += 1,
                    DispatchOutcome::Analyzed | DispatchOutcome::Generated => self.no_op += 1,
                }
            }
        }
    }
}

/// Per-mention pipeline over injected collaborators.
pub struct MentionProcessor {
    threads: Arc<dyn ThreadSource>,
    oracle: Arc<dyn DecisionOracle>,
    executor: Arc<dyn ActionExecutor>,
}

impl MentionProcessor {
    pub fn new(
        threads: Arc<dyn ThreadSource>,
        oracle: Arc<dyn DecisionOracle>,
        executor: Arc<dyn ActionExecutor>,
    ) -> Self {
        Self {
            threads,
            oracle,
            executor,
        }
    }

    /// Process a newest-first batch oldest-first, recording every mention.
    ///
    /// Mentions already in `dedup` (including duplicates within the batch)
    /// are skipped.
    pub async fn process_batch(&self, mut mentions: Vec<Mention>, dedup: &mut DedupStore) -> BatchReport {
        mentions.reverse();

        let mut report = BatchReport::default();
        for mention in &mentions {
            if dedup.contains(mention.id()) {
                debug!(id = %mention.id(), "Skipping already handled mention");
                continue;
            }

            let outcome = match AssertUnwindSafe(self.process(mention)).catch_unwind().await {
                Ok(outcome) => outcome,
                Err(panic) => {
                    error!(id = %mention.id(), panic = %panic_message(&*panic), "Mention processing panicked");
                    MentionOutcome::Panicked
                }
            };
            dedup.record(mention.id());
            report.add(&outcome);
        }

        info!(
            processed = report.processed,
            abandoned = report.abandoned,
            panicked = report.panicked,
            replied = report.replied,
            searched = report.searched,
            fallbacks = report.fallbacks,
            "Batch processing complete"
        );
        report
    }

    /// Run one mention through thread fetch → oracle → dispatch.
    pub async fn process(&self, mention: &Mention) -> MentionOutcome {
        info!(
            id = %mention.id(),
            author = %mention.post.author_handle,
            text = %mention.post.text,
            "Processing mention"
        );

        let conversation_id = mention.conversation_id();
        let thread = match self.threads.fetch_thread(conversation_id).await {
            Ok(Some(thread)) => thread,
            Ok(None) => {
                warn!(id = %mention.id(), conversation_id, "Could not fetch thread context");
                return MentionOutcome::NoThread;
            }
            Err(e) => {
                warn!(id = %mention.id(), conversation_id, error = %e, "Thread fetch failed");
                return MentionOutcome::NoThread;
            }
        };
        debug!(id = %mention.id(), posts = thread.post_count(), "Thread context fetched");

        let analysis = self.consult(mention, &thread).await;
        info!(
            id = %mention.id(),
            action = analysis.action.label(),
            confidence = analysis.confidence,
            explanation = %analysis.explanation,
            "Oracle decision"
        );

        let outcome = self.dispatch(&analysis.action).await;
        MentionOutcome::Dispatched {
            action: analysis.action.label(),
            confidence: analysis.confidence,
            fallback: analysis.is_fallback(),
            outcome,
        }
    }

    /// Oracle boundary: never fails, substitutes the fallback decision.
    async fn consult(&self, mention: &Mention, thread: &Thread) -> Analysis {
        match self.oracle.decide(&mention.post.text, thread, mention.id()).await {
            Ok(analysis) => analysis,
            Err(e) => {
                warn!(id = %mention.id(), error = %e, "Oracle failed, using fallback decision");
                Analysis::fallback(mention.id(), e)
            }
        }
    }

    /// Perform the side effects named by `action`.
    pub async fn dispatch(&self, action: &AgentAction) -> DispatchOutcome {
        let target_post_id = action.target_post_id();
        match action.kind() {
            ActionKind::Reply { content } => {
                let text = fit_post(content);
                if self.executor.post_reply(target_post_id, &text).await {
                    info!(target_post_id, reply = %text, "Reply posted");
                    DispatchOutcome::Replied
                } else {
                    warn!(target_post_id, "Failed to post reply");
                    DispatchOutcome::ReplyFailed
                }
            }
            ActionKind::Search { query } => {
                let results = self.executor.search(query).await;
                info!(target_post_id, query = %query, results = results.len(), "Search completed");
                DispatchOutcome::Searched {
                    results: results.len(),
                }
            }
            ActionKind::Analyze { reasoning } => {
                info!(
                    target_post_id,
                    reasoning = reasoning.as_deref().unwrap_or(""),
                    "Analysis complete (no action taken)"
                );
                DispatchOutcome::Analyzed
            }
            ActionKind::Generate { content } => {
                info!(target_post_id, content = %content, "Content generated");
                DispatchOutcome::Generated
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}

/// Trim text to the post length limit, marking truncation with an ellipsis.
fn fit_post(text: &str) -> String {
    if text.chars().count() <= MAX_POST_CHARS {
        return text.to_string();
    }
    let mut fitted: String = text.chars().take(MAX_POST_CHARS - 1).collect();
    fitted.push('…');
    fitted
}
