use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use colored::Colorize;
use tokio_util::sync::CancellationToken;

use docgraph_agents::{ExternalRetrieval, Orchestrator, UnavailableExternalRetrieval};
use docgraph_core::DocgraphConfig;
use docgraph_llm::{GenerationConfig, LlmProvider, LlmResponse, LlmUsage, Message, ScriptedLlm};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum TestMode {
    /// Skips every LLM call; every component gets the same fixed docstring.
    Placeholder,
    /// Logs the rendered context handed to the Writer before each call.
    ContextPrint,
    None,
}

/// An [`LlmProvider`] used for `--test-mode placeholder`: returns a fixed
/// docstring for the Writer and declines further context for the Reader and
/// Verifier, without running any of the `ScriptedLlm` heuristics.
struct PlaceholderLlm;

#[async_trait::async_trait]
impl LlmProvider for PlaceholderLlm {
    async fn generate_chat(
        &self,
        _messages: &[Message],
        _config: &GenerationConfig,
    ) -> docgraph_core::Result<LlmResponse> {
        Ok(LlmResponse {
            content: "<DOCSTRING>Summary: placeholder docstring.</DOCSTRING>\n\
                <INFO_NEED>false</INFO_NEED>\n\
                <NEED_REVISION>false</NEED_REVISION>"
                .to_string(),
            usage: LlmUsage::default(),
        })
    }

    fn provider_name(&self) -> &str {
        "placeholder"
    }

    fn model_name(&self) -> &str {
        "placeholder"
    }
}

/// An [`LlmProvider`] wrapper that logs the full prompt (which carries the
/// rendered context) at `info` level before delegating, for `--test-mode
/// context-print`.
struct ContextPrintingLlm<'a> {
    inner: &'a dyn LlmProvider,
}

#[async_trait::async_trait]
impl<'a> LlmProvider for ContextPrintingLlm<'a> {
    async fn generate_chat(
        &self,
        messages: &[Message],
        config: &GenerationConfig,
    ) -> docgraph_core::Result<LlmResponse> {
        if let Some(last_user) = messages.iter().rev().find(|m| m.content.contains("<context>")) {
            tracing::info!(context = %last_user.content, "context before agent call");
        }
        self.inner.generate_chat(messages, config).await
    }

    fn provider_name(&self) -> &str {
        self.inner.provider_name()
    }

    fn model_name(&self) -> &str {
        self.inner.model_name()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OrderMode {
    Topo,
    RandomNode,
    RandomFile,
}

/// Generates docstrings for a Python repository by driving the
/// Reader/Searcher/Writer/Verifier agent pipeline over its dependency graph.
#[derive(Debug, Parser)]
#[command(name = "docgraph", version, about)]
struct Cli {
    /// Repository to document.
    #[arg(long, default_value = "./test_repo")]
    repo_path: PathBuf,

    /// Configuration file (TOML/YAML/JSON); missing file falls back to defaults.
    #[arg(long, default_value = "./docgraph.yaml")]
    config_path: PathBuf,

    #[arg(long, value_enum, default_value_t = TestMode::None)]
    test_mode: TestMode,

    #[arg(long, value_enum, default_value_t = OrderMode::Topo)]
    order_mode: OrderMode,

    /// Activates the visualization bridge stub; the web UI process itself is
    /// out of scope for this crate.
    #[arg(long)]
    enable_web: bool,

    #[arg(long)]
    overwrite_docstrings: bool,

    /// Seed for `--order-mode random-node`/`random-file`, for reproducible runs.
    #[arg(long, default_value_t = 0)]
    seed: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        eprintln!("{} {e:#}", "error:".red().bold());
        std::process::exit(1);
    }
    Ok(())
}

async fn run(cli: Cli) -> Result<()> {
    if !cli.repo_path.is_dir() {
        anyhow::bail!("repo path {} is not a directory", cli.repo_path.display());
    }

    let config = DocgraphConfig::load(Some(&cli.config_path))
        .with_context(|| format!("loading configuration from {}", cli.config_path.display()))?;

    let overwrite = cli.overwrite_docstrings || config_overwrite(&config);

    tracing::info!(repo = %cli.repo_path.display(), "parsing repository");
    let mut map = docgraph_parser::parse_repository(&cli.repo_path)
        .with_context(|| format!("parsing repository at {}", cli.repo_path.display()))?;
    tracing::info!(components = map.len(), "parsed components");

    if cli.enable_web {
        tracing::info!("visualization bridge enabled (stub: no web UI process is started by this crate)");
    }

    if cli.test_mode == TestMode::ContextPrint {
        tracing::info!("context-print test mode: contexts will be logged before each Writer call");
    }

    let scripted_reader = ScriptedLlm::new();
    let scripted_writer = ScriptedLlm::new();
    let scripted_verifier = ScriptedLlm::new();
    let placeholder = PlaceholderLlm;
    let context_printer = ContextPrintingLlm {
        inner: &scripted_writer,
    };

    let reader_llm: &dyn LlmProvider = match cli.test_mode {
        TestMode::Placeholder => &placeholder,
        TestMode::ContextPrint | TestMode::None => &scripted_reader,
    };
    let writer_llm: &dyn LlmProvider = match cli.test_mode {
        TestMode::Placeholder => &placeholder,
        TestMode::ContextPrint => &context_printer,
        TestMode::None => &scripted_writer,
    };
    let verifier_llm: &dyn LlmProvider = match cli.test_mode {
        TestMode::Placeholder => &placeholder,
        TestMode::ContextPrint | TestMode::None => &scripted_verifier,
    };
    let external: &dyn ExternalRetrieval = &UnavailableExternalRetrieval;

    let orchestrator = Orchestrator::new(
        reader_llm,
        writer_llm,
        verifier_llm,
        external,
        config.flow_control.clone(),
        config.max_input_tokens,
        overwrite,
        config.rate_limits.clone(),
    );

    let (mut order, removed_edges) = Orchestrator::compute_order(&map);
    apply_order_mode(cli.order_mode, cli.seed, &mut order);

    let cancel = CancellationToken::new();
    let summary = orchestrator
        .run_ordered(&cli.repo_path, &mut map, order, removed_edges, &cancel)
        .await;

    print_summary(&summary, &config);
    Ok(())
}

fn config_overwrite(config: &DocgraphConfig) -> bool {
    config.docstring_options.overwrite_docstrings
}

/// Deterministically reorders `order` for `--order-mode`. `random-node`
/// shuffles the whole list; `random-file` groups by leading path segment and
/// shuffles the groups while preserving each group's internal topo order.
fn apply_order_mode(mode: OrderMode, seed: u64, order: &mut Vec<String>) {
    match mode {
        OrderMode::Topo => {}
        OrderMode::RandomNode => shuffle(order, seed),
        OrderMode::RandomFile => {
            let mut groups: Vec<(String, Vec<String>)> = Vec::new();
            for id in order.drain(..) {
                let file_key = id.split('.').next().unwrap_or(&id).to_string();
                match groups.iter_mut().find(|(k, _)| *k == file_key) {
                    Some((_, items)) => items.push(id),
                    None => groups.push((file_key, vec![id])),
                }
            }
            let mut keys: Vec<usize> = (0..groups.len()).collect();
            shuffle(&mut keys, seed);
            for i in keys {
                order.extend(groups[i].1.clone());
            }
        }
    }
}

/// A small deterministic shuffle (xorshift keyed by `seed`) so reruns with the
/// same seed reproduce the same order, satisfying the reproducibility
/// invariant without pulling randomness into the core crates.
fn shuffle<T>(items: &mut [T], seed: u64) {
    let mut state = seed.wrapping_add(0x9E3779B97F4A7C15);
    if state == 0 {
        state = 0xA5A5A5A5A5A5A5A5;
    }
    let mut next_rand = move || {
        state ^= state << 13;
        state ^= state >> 7;
        state ^= state << 17;
        state
    };
    for i in (1..items.len()).rev() {
        let j = (next_rand() as usize) % (i + 1);
        items.swap(i, j);
    }
}

fn print_summary(summary: &docgraph_agents::RunSummary, config: &DocgraphConfig) {
    println!("{}", "Run summary".bold());
    println!("  documented:    {}", summary.documented.to_string().green());
    println!("  skipped:       {}", summary.skipped.to_string().yellow());
    println!("  errored:       {}", summary.errored.to_string().red());
    println!("  edges removed: {}", summary.removed_edges);

    if summary.usage.is_empty() {
        return;
    }
    println!("  providers:");
    let mut providers: Vec<_> = summary.usage.iter().collect();
    providers.sort_by(|(a, _), (b, _)| a.cmp(b));
    let mut total_cost = 0.0_f64;
    for (provider, usage) in providers {
        let pricing = config.rate_limit_for(provider);
        let cost = usage.input_tokens as f64 / 1_000_000.0 * pricing.input_price_per_million
            + usage.output_tokens as f64 / 1_000_000.0 * pricing.output_price_per_million;
        total_cost += cost;
        println!(
            "    {provider}: requests={} input_tokens={} output_tokens={} est_cost=${cost:.4}",
            usage.requests, usage.input_tokens, usage.output_tokens
        );
    }
    println!("  estimated total cost: ${total_cost:.4}");
}
