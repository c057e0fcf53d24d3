use std::sync::Arc;

use mention_agent::channels::{SimulatedXClient, XApiClient};
use mention_agent::config::AgentConfig;
use mention_agent::llm::{LlmConfig, create_provider};
use mention_agent::pipeline::dedup::DEFAULT_DEDUP_CAPACITY;
use mention_agent::pipeline::types::{ActionExecutor, DecisionOracle, MentionSource, ThreadSource};
use mention_agent::pipeline::{CycleScheduler, GrokOracle, HeuristicOracle, MentionProcessor, SchedulerConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config = AgentConfig::from_env().unwrap_or_else(|e| {
        eprintln!("Error: {e}");
        eprintln!("  export X_USERNAME=your_handle");
        std::process::exit(1);
    });

    eprintln!("🤖 Mention agent v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Account: @{}", config.username);
    eprintln!("   Polling every {}ms", config.polling_interval.as_millis());

    // ── X API ────────────────────────────────────────────────────────────
    let (mentions, threads, executor) = match config.x_api.bearer_token.clone() {
        Some(token) => collaborators(Arc::new(XApiClient::new(token, config.max_retries))),
        None => {
            eprintln!("   ⚠️  No X_BEARER_TOKEN: X API calls are simulated");
            collaborators(Arc::new(SimulatedXClient::new()))
        }
    };

    // ── Decision oracle ──────────────────────────────────────────────────
    let oracle: Arc<dyn DecisionOracle> = match config.xai_api_key.clone() {
        Some(api_key) => {
            let llm = create_provider(&LlmConfig {
                api_key,
                model: config.grok_model.clone(),
                max_retries: config.max_retries,
            });
            Arc::new(GrokOracle::new(llm))
        }
        None => {
            eprintln!("   ⚠️  No XAI_API_KEY: decisions use the offline heuristic");
            Arc::new(HeuristicOracle::new())
        }
    };

    let processor = MentionProcessor::new(threads, oracle, executor);
    let scheduler = CycleScheduler::new(
        SchedulerConfig {
            handle: config.username.clone(),
            interval: config.polling_interval,
            dedup_capacity: DEFAULT_DEDUP_CAPACITY,
        },
        mentions,
        processor,
    );

    // Signal handlers are installed before the first cycle starts.
    let signal = scheduler.run_until(wait_for_shutdown()).await;

    let stats = scheduler.stats();
    eprintln!("\nShutting down...");
    eprintln!(
        "Final stats: {}",
        serde_json::json!({
            "processed_count": stats.processed_count,
            "running": stats.running,
        })
    );
    tracing::info!(
        processed_count = stats.processed_count,
        cycles_run = stats.cycles_run,
        ticks_skipped = stats.ticks_skipped,
        dedup_len = stats.dedup_len,
        "Agent exited"
    );
    signal
}

type Collaborators = (Arc<dyn MentionSource>, Arc<dyn ThreadSource>, Arc<dyn ActionExecutor>);

fn collaborators<C>(client: Arc<C>) -> Collaborators
where
    C: MentionSource + ThreadSource + ActionExecutor + 'static,
{
    (client.clone(), client.clone(), client)
}

/// Resolve on SIGINT (Ctrl+C) or, on Unix, SIGTERM.
async fn wait_for_shutdown() -> anyhow::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        let mut terminate = signal(SignalKind::terminate())?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => result?,
            _ = terminate.recv() => {}
        }
    }
    #[cfg(not(unix))]
    tokio::signal::ctrl_c().await?;
    Ok(())
}
