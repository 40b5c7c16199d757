use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use docgraph_core::config::{FlowControlConfig, RateLimitConfig};
use docgraph_core::rate_limiter::{RateLimiter, SlidingWindowRateLimiter};
use docgraph_core::types::ComponentMap;
use docgraph_core::ComponentId;
use docgraph_graph::{break_cycles, dependency_first_order, DependencyGraph};
use docgraph_llm::{estimate_tokens, GenerationConfig, LlmProvider, LlmResponse, Message};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::context::ContextStore;
use crate::external::ExternalRetrieval;
use crate::memory::AgentMemory;
use crate::reader::Reader;
use crate::searcher;
use crate::verifier::Verifier;
use crate::writeback;
use crate::writer::Writer;

/// What happened to a single component after [`Orchestrator::run_component`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ComponentOutcome {
    Documented,
    Skipped,
    ErroredWriteback(String),
}

/// Running request/token totals for one LLM provider, accumulated across a run.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ProviderUsage {
    pub requests: u64,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// Aggregate result of a full repository run, used for the CLI's summary.
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub documented: usize,
    pub skipped: usize,
    pub errored: usize,
    pub removed_edges: usize,
    pub usage: HashMap<String, ProviderUsage>,
}

enum InnerOutcome {
    Done(String),
    BackToRead,
}

/// Wraps an [`LlmProvider`] with per-provider sliding-window rate limiting and
/// usage accounting, so every agent call goes through the same gate without
/// the agents themselves needing to know it exists.
struct TrackedProvider<'a> {
    inner: &'a dyn LlmProvider,
    limiter: SlidingWindowRateLimiter,
    usage: Arc<Mutex<HashMap<String, ProviderUsage>>>,
}

impl<'a> TrackedProvider<'a> {
    fn new(
        inner: &'a dyn LlmProvider,
        rate_limits: &HashMap<String, RateLimitConfig>,
        usage: Arc<Mutex<HashMap<String, ProviderUsage>>>,
    ) -> Self {
        let config = rate_limits
            .get(inner.provider_name())
            .or_else(|| rate_limits.get("default"))
            .cloned()
            .unwrap_or_default();
        Self {
            inner,
            limiter: SlidingWindowRateLimiter::new(&config),
            usage,
        }
    }
}

#[async_trait]
impl<'a> LlmProvider for TrackedProvider<'a> {
    async fn generate_chat(
        &self,
        messages: &[Message],
        config: &GenerationConfig,
    ) -> docgraph_core::Result<LlmResponse> {
        let estimated_input: u32 = messages
            .iter()
            .map(|m| estimate_tokens(&m.content) as u32)
            .sum();
        self.limiter.wait_if_needed(estimated_input);

        let response = self.inner.generate_chat(messages, config).await?;
        self.limiter
            .record_request(response.usage.input_tokens, response.usage.output_tokens);

        let mut usage = self.usage.lock();
        let entry = usage.entry(self.inner.provider_name().to_string()).or_default();
        entry.requests += 1;
        entry.input_tokens += response.usage.input_tokens as u64;
        entry.output_tokens += response.usage.output_tokens as u64;

        Ok(response)
    }

    fn provider_name(&self) -> &str {
        self.inner.provider_name()
    }

    fn model_name(&self) -> &str {
        self.inner.model_name()
    }
}

pub struct Orchestrator<'a> {
    reader_llm: TrackedProvider<'a>,
    writer_llm: TrackedProvider<'a>,
    verifier_llm: TrackedProvider<'a>,
    external: &'a dyn ExternalRetrieval,
    flow: FlowControlConfig,
    max_input_tokens: usize,
    overwrite: bool,
    usage: Arc<Mutex<HashMap<String, ProviderUsage>>>,
}

impl<'a> Orchestrator<'a> {
    pub fn new(
        reader_llm: &'a dyn LlmProvider,
        writer_llm: &'a dyn LlmProvider,
        verifier_llm: &'a dyn LlmProvider,
        external: &'a dyn ExternalRetrieval,
        flow: FlowControlConfig,
        max_input_tokens: usize,
        overwrite: bool,
        rate_limits: HashMap<String, RateLimitConfig>,
    ) -> Self {
        let usage = Arc::new(Mutex::new(HashMap::new()));
        Self {
            reader_llm: TrackedProvider::new(reader_llm, &rate_limits, usage.clone()),
            writer_llm: TrackedProvider::new(writer_llm, &rate_limits, usage.clone()),
            verifier_llm: TrackedProvider::new(verifier_llm, &rate_limits, usage.clone()),
            external,
            flow,
            max_input_tokens,
            overwrite,
            usage,
        }
    }

    /// Runs the READ -> (SEARCH) -> READ -> WRITE -> VERIFY state machine for
    /// one component, writing its docstring back to disk on success.
    pub async fn run_component(
        &self,
        repo_root: &Path,
        component_id: &str,
        map: &mut ComponentMap,
    ) -> ComponentOutcome {
        let component = match map.get(component_id) {
            Some(c) => c.clone(),
            None => return ComponentOutcome::Skipped,
        };

        if component.is_constructor() {
            return ComponentOutcome::Skipped;
        }
        if component.has_nontrivial_doc() && !self.overwrite {
            return ComponentOutcome::Skipped;
        }

        let reader = Reader::new(&self.reader_llm);
        let writer = Writer::new(&self.writer_llm);
        let verifier = Verifier::new(&self.verifier_llm);

        let mut context = ContextStore::new();
        let mut reader_memory = AgentMemory::new();
        let mut writer_memory = AgentMemory::new();
        let focal_tokens = estimate_tokens(&component.source_text);

        let mut r: u32 = 0;
        let mut v: u32 = 0;

        let docstring = loop {
            // READ (possibly looping through SEARCH)
            loop {
                let reader_response = match reader
                    .analyze(&mut reader_memory, &component, &context.render())
                    .await
                {
                    Ok(resp) => resp,
                    Err(e) => {
                        tracing::warn!(component = %component_id, error = %e, "reader call failed; proceeding to write with current context");
                        break;
                    }
                };

                if reader_response.info_need && r < self.flow.max_reader_search_attempts {
                    r += 1;
                    searcher::gather(
                        &reader_response.request,
                        component_id,
                        map,
                        &mut context,
                        self.external,
                    )
                    .await;
                    context.enforce_budget(focal_tokens, self.max_input_tokens);
                    reader_memory.clear();
                    continue;
                }
                break;
            }

            // WRITE / VERIFY
            let inner = loop {
                let docstring = match writer
                    .write(&mut writer_memory, &component, &context.render())
                    .await
                {
                    Ok(d) => d,
                    Err(e) => {
                        tracing::warn!(component = %component_id, error = %e, "writer call failed");
                        return ComponentOutcome::ErroredWriteback(e.to_string());
                    }
                };

                let verdict = match verifier
                    .verify(&component, &docstring, &context.render())
                    .await
                {
                    Ok(verdict) => verdict,
                    Err(e) => {
                        tracing::warn!(component = %component_id, error = %e, "verifier call failed; accepting draft as-is");
                        break InnerOutcome::Done(docstring);
                    }
                };

                if !verdict.need_revision {
                    break InnerOutcome::Done(docstring);
                }
                if v >= self.flow.max_verifier_rejections {
                    tracing::warn!(component = %component_id, "verifier rejection budget exhausted; committing current draft");
                    break InnerOutcome::Done(docstring);
                }
                v += 1;

                if verdict.need_context && r < self.flow.max_reader_search_attempts {
                    writer_memory.clear();
                    reader_memory.refresh_with(Message::user(verdict.context_suggestion));
                    break InnerOutcome::BackToRead;
                }

                // Either the verifier wants a plain rewrite, or it wanted more
                // context but the reader search budget is spent — in both
                // cases we redo WRITE with whatever guidance the verifier gave.
                let note = if verdict.need_context {
                    verdict.context_suggestion
                } else {
                    verdict.suggestion
                };
                writer_memory.push(Message::user(note));
            };

            match inner {
                InnerOutcome::Done(d) => break d,
                InnerOutcome::BackToRead => continue,
            }
        };

        match self.commit(repo_root, &component, map, &docstring) {
            Ok(()) => ComponentOutcome::Documented,
            Err(e) => ComponentOutcome::ErroredWriteback(e.to_string()),
        }
    }

    fn commit(
        &self,
        repo_root: &Path,
        component: &docgraph_core::types::CodeComponent,
        map: &mut ComponentMap,
        docstring: &str,
    ) -> docgraph_core::Result<()> {
        let new_text = writeback::set_component_doc(&component.source_text, docstring);
        writeback::write_component(
            repo_root,
            &component.relative_path,
            component.location.start_line,
            component.location.end_line,
            &new_text,
        )?;
        writeback::reparse_file(repo_root, &component.relative_path, map)?;
        Ok(())
    }

    /// Breaks cycles in `map`'s dependency graph and returns the resulting
    /// dependency-first order plus how many edges had to be removed. Exposed
    /// separately from [`Self::run_ordered`] so a caller (the CLI's
    /// `--order-mode`) can substitute its own ordering while still benefiting
    /// from cycle breaking.
    pub fn compute_order(map: &ComponentMap) -> (Vec<ComponentId>, usize) {
        let mut graph = DependencyGraph::from_components(map);
        let removed_edges = break_cycles(&mut graph).len();
        (dependency_first_order(&graph), removed_edges)
    }

    /// Processes every component in `map` in dependency-first order, breaking
    /// cycles first. `cancel` is checked between components so a caller can
    /// stop the run cooperatively without corrupting any in-flight writeback.
    pub async fn run_repository(
        &self,
        repo_root: &Path,
        map: &mut ComponentMap,
        cancel: &CancellationToken,
    ) -> RunSummary {
        let (order, removed_edges) = Self::compute_order(map);
        self.run_ordered(repo_root, map, order, removed_edges, cancel)
            .await
    }

    /// Like [`Self::run_repository`], but over a caller-supplied order (used
    /// when `--order-mode` asks for something other than plain topological
    /// order). `removed_edges` is passed through only for the summary.
    pub async fn run_ordered(
        &self,
        repo_root: &Path,
        map: &mut ComponentMap,
        order: Vec<ComponentId>,
        removed_edges: usize,
        cancel: &CancellationToken,
    ) -> RunSummary {
        let mut summary = RunSummary {
            removed_edges,
            ..Default::default()
        };

        for component_id in order {
            if cancel.is_cancelled() {
                tracing::info!("run cancelled; stopping before next component");
                break;
            }
            let span = tracing::info_span!("component", component_id = %component_id);
            match self
                .run_component(repo_root, &component_id, map)
                .instrument(span)
                .await
            {
                ComponentOutcome::Documented => summary.documented += 1,
                ComponentOutcome::Skipped => summary.skipped += 1,
                ComponentOutcome::ErroredWriteback(_) => summary.errored += 1,
            }
        }
        summary.usage = self.usage.lock().clone();
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use docgraph_core::DocgraphConfig;
    use docgraph_llm::{GenerationConfig, LlmResponse, LlmUsage, Message, ScriptedLlm};
    use parking_lot::Mutex;
    use std::collections::VecDeque;

    use crate::external::UnavailableExternalRetrieval;

    /// Returns each queued response in turn, then repeats the last one —
    /// enough to script a Verifier through a fixed rejection count.
    struct SequenceProvider {
        name: &'static str,
        queue: Mutex<VecDeque<String>>,
    }

    impl SequenceProvider {
        fn new(name: &'static str, responses: Vec<&str>) -> Self {
            Self {
                name,
                queue: Mutex::new(responses.into_iter().map(|s| s.to_string()).collect()),
            }
        }
    }

    #[async_trait]
    impl LlmProvider for SequenceProvider {
        async fn generate_chat(
            &self,
            _messages: &[Message],
            _config: &GenerationConfig,
        ) -> docgraph_core::Result<LlmResponse> {
            let mut queue = self.queue.lock();
            let content = if queue.len() > 1 {
                queue.pop_front().unwrap()
            } else {
                queue.front().cloned().unwrap_or_default()
            };
            Ok(LlmResponse {
                content,
                usage: LlmUsage::default(),
            })
        }

        fn provider_name(&self) -> &str {
            self.name
        }

        fn model_name(&self) -> &str {
            "sequence"
        }
    }

    fn flow(max_verifier_rejections: u32) -> FlowControlConfig {
        FlowControlConfig {
            max_reader_search_attempts: 4,
            max_verifier_rejections,
            status_sleep_ms: 0,
        }
    }

    #[tokio::test]
    async fn rejects_twice_then_accepts_and_commits() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("m.py"), "def foo():\n    return 1\n").unwrap();
        let mut map = docgraph_parser::parse_repository(dir.path()).unwrap();

        let reader_llm = ScriptedLlm::new();
        let writer_llm = SequenceProvider::new(
            "writer",
            vec![
                "<DOCSTRING>draft one</DOCSTRING>",
                "<DOCSTRING>draft two</DOCSTRING>",
                "<DOCSTRING>draft three</DOCSTRING>",
            ],
        );
        let verifier_llm = SequenceProvider::new(
            "verifier",
            vec![
                "<NEED_REVISION>true</NEED_REVISION><MORE_CONTEXT>false</MORE_CONTEXT><SUGGESTION>tighten it</SUGGESTION>",
                "<NEED_REVISION>true</NEED_REVISION><MORE_CONTEXT>false</MORE_CONTEXT><SUGGESTION>tighten it more</SUGGESTION>",
                "<NEED_REVISION>false</NEED_REVISION>",
            ],
        );
        let external = UnavailableExternalRetrieval;

        let orchestrator = Orchestrator::new(
            &reader_llm,
            &writer_llm,
            &verifier_llm,
            &external,
            flow(3),
            10_000,
            false,
            HashMap::new(),
        );

        let outcome = orchestrator
            .run_component(dir.path(), "m.foo", &mut map)
            .await;
        assert_eq!(outcome, ComponentOutcome::Documented);

        let updated = std::fs::read_to_string(dir.path().join("m.py")).unwrap();
        assert!(updated.contains("draft three"));
    }

    #[tokio::test]
    async fn skips_component_with_existing_nontrivial_docstring() {
        let dir = tempfile::tempdir().unwrap();
        let doc = "This component already has a long enough docstring to count as non trivial for sure.";
        std::fs::write(
            dir.path().join("m.py"),
            format!("def foo():\n    \"\"\"{doc}\"\"\"\n    return 1\n"),
        )
        .unwrap();
        let mut map = docgraph_parser::parse_repository(dir.path()).unwrap();

        let reader_llm = ScriptedLlm::new();
        let writer_llm = ScriptedLlm::new();
        let verifier_llm = ScriptedLlm::new();
        let external = UnavailableExternalRetrieval;

        let orchestrator = Orchestrator::new(
            &reader_llm,
            &writer_llm,
            &verifier_llm,
            &external,
            flow(3),
            10_000,
            false,
            HashMap::new(),
        );

        let outcome = orchestrator
            .run_component(dir.path(), "m.foo", &mut map)
            .await;
        assert_eq!(outcome, ComponentOutcome::Skipped);

        let unchanged = std::fs::read_to_string(dir.path().join("m.py")).unwrap();
        assert!(unchanged.contains(doc));
    }

    #[tokio::test]
    async fn scripted_reader_lets_full_pipeline_run_offline() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("a.py"),
            "def f():\n    return g()\n\n\ndef g():\n    return 1\n",
        )
        .unwrap();
        let mut map = docgraph_parser::parse_repository(dir.path()).unwrap();

        let reader_llm = ScriptedLlm::new();
        let writer_llm = ScriptedLlm::new();
        let verifier_llm = ScriptedLlm::new();
        let external = UnavailableExternalRetrieval;
        let config = DocgraphConfig::default();

        let orchestrator = Orchestrator::new(
            &reader_llm,
            &writer_llm,
            &verifier_llm,
            &external,
            config.flow_control.clone(),
            config.max_input_tokens,
            false,
            config.rate_limits.clone(),
        );

        let cancel = CancellationToken::new();
        let summary = orchestrator.run_repository(dir.path(), &mut map, &cancel).await;
        assert_eq!(summary.documented, 2);
        assert_eq!(summary.skipped, 0);

        let scripted_usage = summary.usage.get("scripted").expect("scripted provider usage recorded");
        assert!(scripted_usage.requests > 0);

        let contents = std::fs::read_to_string(dir.path().join("a.py")).unwrap();
        assert!(contents.contains("Summary:"));
    }
}

