//! Reactive loop for free-form queries
//!
//! No incident id, no hypothesis tree: retrieve knowledge once, short-circuit
//! procedural questions to a knowledge-only answer, otherwise iterate
//! chat -> tools until the model answers or the iteration cap lands.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use regex::Regex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use ops_agents_context::{CompactionContext, ContextCompactor};
use ops_agents_core::{
    AgentEvent, ChatRequest, KnowledgeBundle, KnowledgeRequest, KnowledgeRetriever, LLMClient,
    Result, RunSummary,
};
use ops_agents_scratchpad::ScratchpadEntry;
use ops_agents_tools::cache::cache_key;
use ops_agents_tools::FullResultTool;

use crate::compact::compact_pad;
use crate::config::RunConfig;
use crate::dispatch::ToolDispatcher;
use crate::events::EventBus;
use crate::prompts;

const REPETITIVE_CALL_LIMIT: usize = 2;

pub struct ReactiveAgent {
    llm: Arc<dyn LLMClient>,
    knowledge: Option<Arc<dyn KnowledgeRetriever>>,
    dispatcher: Arc<ToolDispatcher>,
    compactor: ContextCompactor,
    full_result_tool: Arc<FullResultTool>,
    config: RunConfig,
    events: EventBus,
}

impl ReactiveAgent {
    pub(crate) fn new(
        llm: Arc<dyn LLMClient>,
        knowledge: Option<Arc<dyn KnowledgeRetriever>>,
        dispatcher: Arc<ToolDispatcher>,
        compactor: ContextCompactor,
        full_result_tool: Arc<FullResultTool>,
        config: RunConfig,
        events: EventBus,
    ) -> Self {
        Self {
            llm,
            knowledge,
            dispatcher,
            compactor,
            full_result_tool,
            config,
            events,
        }
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub async fn ask(&self, query: &str, cancel: CancellationToken) -> Result<RunSummary> {
        let started = Instant::now();
        let pad = self.dispatcher.pad();
        let run_id = pad.session_id().to_string();

        self.events.emit(AgentEvent::init(&run_id, query));
        if let Err(e) = pad.append(ScratchpadEntry::init(&run_id, query)) {
            debug!(error = %e, "failed to log session init");
        }

        let bundle = self.retrieve_knowledge(query).await;

        // Procedural questions with matching runbooks never need tools. A
        // failed model call still has to reach the terminal done event.
        if let Some(bundle) = bundle.as_ref() {
            if is_procedural(query) && !bundle.runbooks.is_empty() {
                let summary_text = match self.knowledge_only_answer(query, bundle).await {
                    Ok(answer) => {
                        self.events.emit(AgentEvent::AnswerStart {});
                        answer
                    }
                    Err(e) => {
                        self.events
                            .emit(AgentEvent::thinking(format!("model call failed: {e}")));
                        format!(
                            "could not answer from runbooks: {e}\n\n{}",
                            prompts::sources_section(bundle)
                        )
                    }
                };
                let summary = RunSummary {
                    id: run_id,
                    query: query.to_string(),
                    root_cause: None,
                    confidence: None,
                    affected_services: Vec::new(),
                    remediation_plan: None,
                    summary: summary_text,
                    duration_ms: started.elapsed().as_millis() as u64,
                };
                self.events.emit(AgentEvent::done(summary.clone()));
                return Ok(summary);
            }
        }

        let knowledge_digest = bundle.as_ref().map(|b| {
            b.all_docs()
                .take(3)
                .map(|d| format!("- {}: {}", d.title, d.content))
                .collect::<Vec<_>>()
                .join("\n")
        });

        let mut call_counts: HashMap<String, usize> = HashMap::new();
        let mut pending_warnings: Vec<String> = Vec::new();
        let mut final_answer: Option<String> = None;

        for iteration in 0..self.config.max_iterations {
            if cancel.is_cancelled() {
                break;
            }

            let context = CompactionContext {
                query: query.to_string(),
                affected_services: self.config.known_services.clone(),
                hypothesis_statement: None,
            };
            compact_pad(pad, &self.compactor, &self.config, &context, &self.events);
            self.full_result_tool
                .install_snapshot(pad.full_results_snapshot());

            let prompt = prompts::iteration_prompt(
                query,
                &pad.build_tiered_context(),
                &pad.tool_usage_summary(),
                if iteration == 0 {
                    knowledge_digest.as_deref()
                } else {
                    None
                },
                &pending_warnings,
            );
            pending_warnings.clear();

            let request = ChatRequest::new(prompts::ITERATION_SYSTEM, prompt)
                .with_tools(self.dispatcher.registry().infos());
            let response = match self.llm.chat(request).await {
                Ok(response) => response,
                Err(e) => {
                    self.events
                        .emit(AgentEvent::thinking(format!("model call failed: {e}")));
                    break;
                }
            };

            if let Some(thinking) = &response.thinking {
                self.events.emit(AgentEvent::thinking(thinking.clone()));
            }

            if response.tool_calls.is_empty() {
                self.events.emit(AgentEvent::AnswerStart {});
                final_answer = Some(response.content);
                break;
            }

            let mut to_dispatch = Vec::new();
            for call in response.tool_calls {
                let key = cache_key(&call.name, &call.arguments);
                let seen = call_counts.entry(key).or_insert(0);
                *seen += 1;

                if *seen > REPETITIVE_CALL_LIMIT {
                    let warning =
                        format!("{} invoked {} times with identical arguments", call.name, seen);
                    self.events
                        .emit(AgentEvent::tool_limit(call.name.clone(), warning.clone()));
                    self.events.emit(AgentEvent::tool_error(
                        call.id.clone(),
                        call.name.clone(),
                        "skipping repetitive tool call",
                        false,
                    ));
                    pending_warnings.push(warning);
                    continue;
                }

                let check = pad.can_call_tool(&call.name, Some(&call.arguments.to_string()));
                if let Some(warning) = check.warning {
                    self.events
                        .emit(AgentEvent::tool_limit(call.name.clone(), warning.clone()));
                    pending_warnings.push(warning);
                }
                to_dispatch.push(call);
            }

            if to_dispatch.is_empty() {
                // Every call was repetitive; surface that and let the model
                // change strategy on the next pass.
                continue;
            }

            let outcomes = self.dispatcher.dispatch(to_dispatch, &cancel).await;
            for outcome in outcomes {
                if let Some(error) = &outcome.result.error {
                    pending_warnings.push(format!("{} failed: {error}", outcome.call.name));
                }
            }
        }

        let summary_text = final_answer.unwrap_or_else(|| {
            format!(
                "stopped after {} iterations without a final answer",
                self.config.max_iterations
            )
        });
        let summary = RunSummary {
            id: run_id,
            query: query.to_string(),
            root_cause: None,
            confidence: None,
            affected_services: Vec::new(),
            remediation_plan: None,
            summary: summary_text,
            duration_ms: started.elapsed().as_millis() as u64,
        };
        info!(id = %summary.id, duration_ms = summary.duration_ms, "agent run complete");
        self.events.emit(AgentEvent::done(summary.clone()));
        Ok(summary)
    }

    async fn retrieve_knowledge(&self, query: &str) -> Option<KnowledgeBundle> {
        let retriever = self.knowledge.as_ref()?;
        match retriever.retrieve(KnowledgeRequest::for_query(query)).await {
            Ok(bundle) => {
                self.events.emit(AgentEvent::KnowledgeRetrieved {
                    runbooks: bundle.runbooks.len(),
                    postmortems: bundle.postmortems.len(),
                    known_issues: bundle.known_issues.len(),
                });
                Some(bundle)
            }
            Err(e) => {
                debug!(error = %e, "knowledge retrieval failed");
                None
            }
        }
    }

    async fn knowledge_only_answer(
        &self,
        query: &str,
        bundle: &KnowledgeBundle,
    ) -> Result<String> {
        let prompt = prompts::knowledge_prompt(query, bundle);
        let response = self
            .llm
            .chat(ChatRequest::new(prompts::KNOWLEDGE_SYSTEM, prompt))
            .await?;
        Ok(format!(
            "{}\n\n{}",
            response.content,
            prompts::sources_section(bundle)
        ))
    }
}

fn is_procedural(query: &str) -> bool {
    Regex::new(r"(?i)\b(runbook|how do i|how to|troubleshoot|procedure|fix)\b")
        .map(|re| re.is_match(query))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_procedural_detection() {
        assert!(is_procedural("How do I fix a Redis timeout?"));
        assert!(is_procedural("runbook for failover"));
        assert!(is_procedural("troubleshoot slow queries"));
        assert!(!is_procedural("why is checkout-api slow right now"));
    }
}
