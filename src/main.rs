//! ragscope - CLI entry point

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use ragscope::{
    agent::{Answer, CancelToken, Orchestrator},
    cli::{Args, Commands},
    config::RagConfig,
    context::ConversationContext,
    providers::ProviderSet,
    rag::{EvalCase, SearchEvaluator, StrategyKind},
    telemetry::init_logging,
    tools::ToolRegistry,
    tracking::JsonFileSink,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{debug, info};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = RagConfig::load(args.config.clone()).context("Failed to load configuration")?;
    init_logging(args.verbosity().log_level(&config.logging.level));
    debug!(?args, "Parsed arguments");

    match args.command {
        Commands::Ask {
            query,
            strategy,
            offline,
        } => ask(config, &query, strategy, offline).await,
        Commands::Chat { strategy, offline } => chat(config, strategy, offline).await,
        Commands::Evaluate {
            cases,
            query,
            expected,
            runs,
            top_k,
            output,
            offline,
        } => {
            let cases = match (cases, query) {
                (Some(path), _) => EvalCase::load_file(&path)
                    .with_context(|| format!("Failed to load cases from {}", path.display()))?,
                (None, Some(query)) => vec![EvalCase::new(query, expected)],
                (None, None) => return Err(anyhow!("give a case file or --query")),
            };
            evaluate(config, cases, runs, top_k, output, offline).await
        }
        Commands::Traces { limit } => list_traces(&config, limit),
        Commands::Trace { id } => show_trace(&config, &id),
        Commands::Config => show_config(&config),
    }
}

fn build_orchestrator(
    config: RagConfig,
    strategy: Option<StrategyKind>,
    offline: bool,
) -> Result<Orchestrator> {
    let providers = if offline {
        info!("Using offline providers");
        ProviderSet::offline()
    } else {
        ProviderSet::azure(&config).context("Azure providers are not configured (try --offline)")?
    };

    let mut orchestrator = Orchestrator::new(Arc::new(config), providers)?;
    if let Some(kind) = strategy {
        orchestrator = orchestrator.with_strategy(kind);
    }
    Ok(orchestrator)
}

/// Cancel `token` on Ctrl-C
fn cancel_on_interrupt(token: CancelToken) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            token.cancel();
        }
    })
}

fn print_answer(answer: &Answer) {
    println!("{}", answer.answer);
    if !answer.citations.is_empty() {
        println!();
        for (i, doc_id) in answer.citations.iter().enumerate() {
            println!("[{}] {}", i + 1, doc_id);
        }
    }
    println!("\ntrace: {}", answer.trace_id);
}

async fn ask(
    config: RagConfig,
    query: &str,
    strategy: Option<StrategyKind>,
    offline: bool,
) -> Result<()> {
    let system_prompt = config.generation.system_prompt.clone();
    let budget = config.history_budget();
    let orchestrator = build_orchestrator(config, strategy, offline)?;
    let mut conversation = ConversationContext::with_budget(system_prompt, budget);

    let cancel = CancelToken::new();
    let watcher = cancel_on_interrupt(cancel.clone());
    let result = orchestrator
        .process_with_cancel(query, &mut conversation, &cancel)
        .await;
    watcher.abort();

    let answer = result?;
    print_answer(&answer);
    Ok(())
}

async fn chat(config: RagConfig, strategy: Option<StrategyKind>, offline: bool) -> Result<()> {
    let system_prompt = config.generation.system_prompt.clone();
    let budget = config.history_budget();
    let orchestrator = build_orchestrator(config, strategy, offline)?;
    let mut conversation = ConversationContext::with_budget(system_prompt, budget);

    println!(
        "ragscope chat ({} strategy). /clear resets history, /exit quits.",
        orchestrator.strategy()
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    loop {
        stdout.write_all(b"> ").await?;
        stdout.flush().await?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();

        match line {
            "" => continue,
            "/exit" | "/quit" => break,
            "/clear" => {
                conversation.clear();
                println!("History cleared.");
                continue;
            }
            _ => {}
        }

        let cancel = CancelToken::new();
        let watcher = cancel_on_interrupt(cancel.clone());
        let result = orchestrator
            .process_with_cancel(line, &mut conversation, &cancel)
            .await;
        watcher.abort();

        match result {
            Ok(answer) => print_answer(&answer),
            Err(e) => eprintln!("Error: {}", e),
        }
        println!();
    }

    Ok(())
}

async fn evaluate(
    config: RagConfig,
    cases: Vec<EvalCase>,
    runs: usize,
    top_k: Option<usize>,
    output: Option<PathBuf>,
    offline: bool,
) -> Result<()> {
    let providers = if offline {
        info!("Using offline providers");
        ProviderSet::offline()
    } else {
        ProviderSet::azure(&config).context("Azure providers are not configured (try --offline)")?
    };
    let tools = ToolRegistry::new(providers, config.retry_policy());
    let evaluator = SearchEvaluator::new(tools, config.search.overlap_bonus)
        .with_top_k(top_k.unwrap_or(config.search.top_k))
        .with_runs(runs);

    let report = evaluator.evaluate_set(&cases).await;
    let rendered = serde_json::to_string_pretty(&report)?;

    if let Some(path) = output {
        tokio::fs::write(&path, &rendered)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;
        info!(path = %path.display(), "Evaluation report written");
    }
    println!("{}", rendered);
    Ok(())
}

fn trace_sink(config: &RagConfig) -> Result<JsonFileSink> {
    let dir = config
        .export_dir()
        .ok_or_else(|| anyhow!("traces.export_dir is not set; no traces are persisted"))?;
    Ok(JsonFileSink::new(dir)?)
}

fn list_traces(config: &RagConfig, limit: usize) -> Result<()> {
    let sink = trace_sink(config)?;
    let traces = sink.list(limit)?;

    if traces.is_empty() {
        println!("No traces in {}", sink.dir().display());
        return Ok(());
    }

    for trace in traces {
        let duration = trace
            .duration_ms
            .map(|ms| format!("{:.1}ms", ms))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{}  {:<9}  {:>10}  {} steps  {}",
            trace.trace_id,
            format!("{:?}", trace.status),
            duration,
            trace.steps.len(),
            trace.query
        );
    }
    Ok(())
}

fn show_trace(config: &RagConfig, trace_id: &str) -> Result<()> {
    let trace = trace_sink(config)?.load(trace_id)?;
    println!("{}", serde_json::to_string_pretty(&trace)?);
    Ok(())
}

fn show_config(config: &RagConfig) -> Result<()> {
    let rendered =
        toml::to_string_pretty(&config.masked()).context("Failed to render configuration")?;
    println!("{}", rendered);
    if let Some(path) = RagConfig::default_path() {
        println!("# default config path: {}", path.display());
    }
    Ok(())
}
