use consilium_agents::{
    AgentInput, AgentRunner, CompletionOptions, LlmClient, PromptBuilder, RetryPolicy,
};
use consilium_cache::{await_published, Flight, ResponseCache};
use consilium_core::{
    lang, safety, AgentOutput, AgentRole, AuditLog, Consensus, ConsiliumError, ConsiliumResult,
    Context, DecisionBody, FinalResponse, IterationRecord, Language, OrchestratorConfig, Query,
    Source, ValidationRequest, ValidationStats, ValidationStatus, Vote,
};
use consilium_retrieval::RetrievalClient;
use consilium_review::HumanLoopManager;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Answer placeholder on a PENDING_VALIDATION envelope; the draft itself is
/// only released to the reviewer.
const PENDING_MARKER: &str = "Awaiting human validation before this answer can be released.";

/// Shared state cloned into spawned workflow and finalizer tasks.
struct WorkflowContext {
    config: OrchestratorConfig,
    generator: Arc<AgentRunner>,
    verifier: Arc<AgentRunner>,
    reformer: Arc<AgentRunner>,
    translator: Arc<AgentRunner>,
    retrieval: Arc<dyn RetrievalClient>,
    cache: Arc<ResponseCache>,
    human_loop: Arc<HumanLoopManager>,
    audit: Arc<AuditLog>,
    finalized: Arc<RwLock<HashMap<Uuid, FinalResponse>>>,
}

impl Clone for WorkflowContext {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            generator: self.generator.clone(),
            verifier: self.verifier.clone(),
            reformer: self.reformer.clone(),
            translator: self.translator.clone(),
            retrieval: self.retrieval.clone(),
            cache: self.cache.clone(),
            human_loop: self.human_loop.clone(),
            audit: self.audit.clone(),
            finalized: self.finalized.clone(),
        }
    }
}

/// The query lifecycle orchestrator.
///
/// Drives a query through cache check → classification → retrieval →
/// generation → the bounded verify/reform loop → translation, suspending
/// around human validation when a safety trigger fires. One instance serves
/// many concurrent workflows; identical fingerprints coalesce onto a single
/// in-flight computation.
pub struct Orchestrator {
    ctx: WorkflowContext,
    prompts: Arc<PromptBuilder>,
}

impl Orchestrator {
    pub fn new(
        config: OrchestratorConfig,
        llm: Arc<dyn LlmClient>,
        retrieval: Arc<dyn RetrievalClient>,
        audit: Arc<AuditLog>,
    ) -> Self {
        let prompts = Arc::new(PromptBuilder::new());
        let policy = RetryPolicy {
            max_retries: config.max_retries,
            base_delay_ms: config.retry_base_delay_ms,
            max_delay_ms: config.retry_max_delay_ms,
            ..RetryPolicy::default()
        };
        let options = CompletionOptions {
            timeout_ms: config.llm_timeout_ms,
            max_tokens: config.llm_max_tokens,
        };
        let runner = |role: AgentRole| {
            Arc::new(AgentRunner::new(
                role,
                llm.clone(),
                prompts.clone(),
                policy.clone(),
                options.clone(),
            ))
        };

        let ctx = WorkflowContext {
            generator: runner(AgentRole::Generator),
            verifier: runner(AgentRole::Verifier),
            reformer: runner(AgentRole::Reformer),
            translator: runner(AgentRole::Translator),
            retrieval,
            cache: Arc::new(ResponseCache::new(config.cache_ttl_s, config.cache_capacity)),
            human_loop: Arc::new(HumanLoopManager::new(config.human_loop_timeout_s)),
            audit,
            finalized: Arc::new(RwLock::new(HashMap::new())),
            config,
        };
        Self { ctx, prompts }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.ctx.config
    }

    /// The shared prompt builder; template updates propagate to all agents.
    pub fn prompts(&self) -> &Arc<PromptBuilder> {
        &self.prompts
    }

    pub fn cache(&self) -> &Arc<ResponseCache> {
        &self.ctx.cache
    }

    pub fn human_loop(&self) -> &Arc<HumanLoopManager> {
        &self.ctx.human_loop
    }

    /// Process one query to a terminal (or pending-validation) envelope.
    ///
    /// Only pre-condition violations surface as `Err`; everything inside
    /// the workflow folds into the returned envelope. Identical concurrent
    /// fingerprints share one computation and observe identical payloads.
    pub async fn process_query(&self, query: Query) -> ConsiliumResult<FinalResponse> {
        query.validate()?;
        let started = Instant::now();
        let fingerprint = query.fingerprint();

        if let Some(hit) = self.ctx.cache.lookup(&fingerprint).await {
            info!(request_id = %query.request_id, fingerprint = %fingerprint, "Cache hit");
            self.ctx.audit.log_event(
                query.request_id,
                "cache_hit",
                serde_json::json!({ "fingerprint": fingerprint }),
            );
            return Ok(hit);
        }

        match self.ctx.cache.begin(&fingerprint) {
            Flight::Follower(rx) => {
                info!(
                    request_id = %query.request_id,
                    fingerprint = %fingerprint,
                    "Joining in-flight workflow"
                );
                await_published(rx).await
            }
            Flight::Leader(guard) => {
                let ctx = self.ctx.clone();
                let fp = fingerprint.clone();
                // Detached: caller abandonment cancels only its own await,
                // never the computation other waiters may be sharing.
                let handle = tokio::spawn(async move {
                    let response = run_workflow(&ctx, &query, &fp, started).await;
                    if response.is_cacheable() {
                        ctx.cache.put(&fp, response.clone()).await;
                    }
                    guard.publish(response.clone());
                    response
                });
                handle.await.map_err(|e| {
                    ConsiliumError::Internal(format!("workflow task failed: {e}"))
                })
            }
        }
    }

    /// Record a reviewer decision; the pending workflow resumes on its own.
    pub async fn submit_human_decision(
        &self,
        validation_id: Uuid,
        body: DecisionBody,
    ) -> ConsiliumResult<ValidationRequest> {
        self.ctx.human_loop.submit_decision(validation_id, body).await
    }

    /// Follow-up fetch for a response finalized after human validation.
    /// `None` while the decision (or expiry) has not been processed yet.
    pub async fn fetch_validated(&self, validation_id: Uuid) -> Option<FinalResponse> {
        self.ctx.finalized.read().await.get(&validation_id).cloned()
    }

    pub async fn get_validation_queue(&self) -> Vec<ValidationRequest> {
        self.ctx.human_loop.get_pending().await
    }

    pub async fn get_validation_statistics(&self) -> ValidationStats {
        self.ctx.human_loop.statistics().await
    }

    /// Maintenance: drop all memoized responses.
    pub async fn clear_caches(&self) {
        self.ctx.cache.clear().await;
        info!("Response cache cleared");
    }

    pub async fn health(&self) -> crate::health::HealthReport {
        crate::health::report(&self.ctx.cache, &self.ctx.human_loop).await
    }
}

/// Run the full workflow, folding every failure into a terminal envelope.
async fn run_workflow(
    ctx: &WorkflowContext,
    query: &Query,
    fingerprint: &str,
    started: Instant,
) -> FinalResponse {
    ctx.audit.log_event(
        query.request_id,
        "workflow_started",
        serde_json::json!({
            "fingerprint": fingerprint,
            "enable_human_loop": query.enable_human_loop,
        }),
    );

    let detection = lang::detect(&query.text);
    let detected = detection.lang;
    info!(
        request_id = %query.request_id,
        language = %detected,
        confidence = detection.confidence,
        "Workflow started"
    );

    // The end-to-end cap excludes the human-loop wait: the pending path
    // returns immediately and resumes in a detached finalizer.
    let budget = Duration::from_millis(ctx.config.workflow_timeout_ms);
    let outcome = tokio::time::timeout(budget, run_pipeline(ctx, query, fingerprint, detected)).await;

    let mut response = match outcome {
        Ok(Ok(resp)) => resp,
        Ok(Err(e)) => failed_envelope(query, detected, &e),
        Err(_) => failed_envelope(
            query,
            detected,
            &ConsiliumError::Timeout(format!(
                "workflow exceeded {}ms",
                ctx.config.workflow_timeout_ms
            )),
        ),
    };
    response.processing_time_ms = started.elapsed().as_millis() as u64;

    ctx.audit.log_event(
        query.request_id,
        "workflow_completed",
        serde_json::json!({
            "consensus": response.consensus.to_string(),
            "iterations_used": response.iterations_used,
            "processing_time_ms": response.processing_time_ms,
        }),
    );
    response
}

/// The state machine proper: classify → retrieve → generate →
/// [human loop] → verify/reform loop → translate.
async fn run_pipeline(
    ctx: &WorkflowContext,
    query: &Query,
    fingerprint: &str,
    detected: Language,
) -> ConsiliumResult<FinalResponse> {
    // Safety classification runs before retrieval so the audit trail shows
    // the routing decision ahead of any draft material.
    let trigger = safety::classify(&query.text);

    // Retrieval failures downgrade to the empty-context path: the
    // Generator's uncertainty acknowledgement covers it.
    let context = match ctx.retrieval.retrieve(&query.text).await {
        Ok(c) => c,
        Err(e) => {
            warn!(request_id = %query.request_id, error = %e, "Retrieval degraded to empty context");
            ctx.audit.log_event(
                query.request_id,
                "retrieval_degraded",
                serde_json::json!({ "error": e.kind() }),
            );
            Context::empty()
        }
    };

    let generator_out = invoke_logged(ctx, &ctx.generator, query, AgentInput::Generate {
        query: query.text.clone(),
        context: context.clone(),
        language: detected,
    })
    .await?;

    if let Some(trigger) = trigger.filter(|_| query.enable_human_loop) {
        let request = ctx
            .human_loop
            .create(fingerprint, &query.text, detected, &trigger, &generator_out.text)
            .await;
        ctx.audit.log_event(
            query.request_id,
            "validation_created",
            serde_json::json!({
                "validation_id": request.id,
                "trigger_kind": trigger.kind.to_string(),
                "priority": request.priority,
            }),
        );
        spawn_finalizer(ctx.clone(), query.clone(), request.clone(), context.sources.clone());

        return Ok(FinalResponse {
            success: true,
            answer: PENDING_MARKER.to_string(),
            sources: context.sources,
            detected_language: detected,
            target_language: query.target_language.unwrap_or(detected),
            consensus: Consensus::PendingValidation,
            iterations_used: 1,
            processing_time_ms: 0,
            validation_id: Some(request.id),
            error: None,
            flagged_uncertain: false,
            untranslated: false,
        });
    }

    run_consensus_loop(ctx, query, detected, context, generator_out).await
}

/// The bounded verify/reform loop.
async fn run_consensus_loop(
    ctx: &WorkflowContext,
    query: &Query,
    detected: Language,
    context: Context,
    generator_out: AgentOutput,
) -> ConsiliumResult<FinalResponse> {
    let approve = ctx.config.verifier_approve_threshold;
    let reject = ctx.config.verifier_reject_threshold;
    let max_iterations = ctx.config.max_iterations.max(1);

    let mut iterations: Vec<IterationRecord> = Vec::new();
    let mut candidate = generator_out.clone();
    let mut reformed = false;
    let mut any_reform_yes = false;
    let mut last_vote = Vote::Unknown;

    for index in 1..=max_iterations {
        let mut record = IterationRecord {
            index,
            generator_out: (index == 1).then(|| generator_out.clone()),
            verifier_out: None,
            reformer_out: None,
        };

        // Verifier hard failure degrades to an UNKNOWN vote, which lands in
        // the reform path below.
        let (verifier_out, verifier_failed) = match invoke_logged(
            ctx,
            &ctx.verifier,
            query,
            AgentInput::Verify {
                query: query.text.clone(),
                context: context.clone(),
                draft: candidate.text.clone(),
                language: detected,
            },
        )
        .await
        {
            Ok(v) => (v, false),
            Err(e) => {
                warn!(request_id = %query.request_id, error = %e, "Verifier unavailable, treating vote as UNKNOWN");
                (
                    AgentOutput {
                        role: AgentRole::Verifier,
                        text: String::new(),
                        confidence: 0.0,
                        vote: Some(Vote::Unknown),
                        analysis: Some(format!("verification unavailable: {}", e.kind())),
                        latency_ms: 0,
                    },
                    true,
                )
            }
        };
        last_vote = verifier_out.vote.unwrap_or(Vote::Unknown);
        let confidence = verifier_out.confidence;
        record.verifier_out = Some(verifier_out.clone());

        info!(
            request_id = %query.request_id,
            iteration = index,
            vote = %last_vote,
            confidence,
            "Verifier pass complete"
        );

        if last_vote == Vote::Yes && confidence >= approve {
            iterations.push(record);
            let consensus = if reformed {
                Consensus::ReformedApproved
            } else {
                Consensus::Approved
            };
            return finalize_approved(
                ctx,
                query,
                detected,
                candidate.text,
                context.sources,
                consensus,
                iterations.len() as u32,
                false,
            )
            .await;
        }

        if last_vote != Vote::Yes || confidence < reject {
            // Reject band (NO, UNKNOWN, or any vote below the floor).
            if reformed && last_vote == Vote::Yes {
                any_reform_yes = true;
            }
            // A hard verifier failure always gets a Reformer attempt, even
            // on the final iteration; only the ordinary reject path is
            // gated by the iteration budget.
            if index < max_iterations || verifier_failed {
                match invoke_logged(ctx, &ctx.reformer, query, AgentInput::Reform {
                    query: query.text.clone(),
                    context: context.clone(),
                    draft: candidate.text.clone(),
                    analysis: verifier_out.analysis.clone().unwrap_or_default(),
                    language: detected,
                })
                .await
                {
                    Ok(reform_out) => {
                        record.reformer_out = Some(reform_out.clone());
                        candidate = reform_out;
                        reformed = true;
                    }
                    Err(e) if verifier_failed => {
                        // Verifier and Reformer both down: nothing left to
                        // arbitrate with.
                        iterations.push(record);
                        return Err(e);
                    }
                    Err(e) => {
                        warn!(
                            request_id = %query.request_id,
                            iteration = index,
                            error = %e,
                            "Reformer failed, keeping current draft"
                        );
                    }
                }
                iterations.push(record);
                continue;
            }
            iterations.push(record);
            break;
        }

        // Middle band: a YES without approving confidence. Terminate,
        // flagged as uncertain.
        iterations.push(record);
        let consensus = if reformed {
            Consensus::ReformedApproved
        } else {
            Consensus::Approved
        };
        return finalize_approved(
            ctx,
            query,
            detected,
            candidate.text,
            context.sources,
            consensus,
            iterations.len() as u32,
            true,
        )
        .await;
    }

    // MAX_ITERATIONS reached without an approving pass.
    let iterations_used = iterations.len() as u32;
    if last_vote == Vote::Yes {
        return finalize_approved(
            ctx,
            query,
            detected,
            candidate.text,
            context.sources,
            Consensus::Approved,
            iterations_used,
            true,
        )
        .await;
    }
    if any_reform_yes {
        return finalize_approved(
            ctx,
            query,
            detected,
            candidate.text,
            context.sources,
            Consensus::ReformedApproved,
            iterations_used,
            true,
        )
        .await;
    }

    info!(
        request_id = %query.request_id,
        iterations_used,
        "No consensus reached, falling back to safe refusal"
    );
    Ok(FinalResponse {
        success: false,
        answer: lang::safe_refusal(detected).to_string(),
        sources: context.sources,
        detected_language: detected,
        target_language: query.target_language.unwrap_or(detected),
        consensus: Consensus::Fallback,
        iterations_used,
        processing_time_ms: 0,
        validation_id: None,
        error: None,
        flagged_uncertain: false,
        untranslated: false,
    })
}

/// Build an approved envelope, translating once when the caller asked for a
/// different language. Translation failure downgrades to the source-language
/// answer with `untranslated = true`.
#[allow(clippy::too_many_arguments)]
async fn finalize_approved(
    ctx: &WorkflowContext,
    query: &Query,
    detected: Language,
    answer: String,
    sources: Vec<Source>,
    consensus: Consensus,
    iterations_used: u32,
    flagged_uncertain: bool,
) -> ConsiliumResult<FinalResponse> {
    let target = query.target_language.unwrap_or(detected);
    let (answer, untranslated) = if target != detected {
        match invoke_logged(ctx, &ctx.translator, query, AgentInput::Translate {
            text: answer.clone(),
            source: detected,
            target,
        })
        .await
        {
            Ok(translated) => (translated.text, false),
            Err(e) => {
                warn!(
                    request_id = %query.request_id,
                    error = %e,
                    "Translation failed, returning source-language answer"
                );
                (answer, true)
            }
        }
    } else {
        (answer, false)
    };

    Ok(FinalResponse {
        success: true,
        answer,
        sources,
        detected_language: detected,
        target_language: target,
        consensus,
        iterations_used,
        processing_time_ms: 0,
        validation_id: None,
        error: None,
        flagged_uncertain,
        untranslated,
    })
}

/// Detached continuation of a suspended workflow: waits for the human
/// decision (or expiry) and records the finalized response for follow-up
/// fetches.
fn spawn_finalizer(
    ctx: WorkflowContext,
    query: Query,
    request: ValidationRequest,
    sources: Vec<Source>,
) {
    tokio::spawn(async move {
        let started = Instant::now();
        let wait = Duration::from_secs(ctx.config.human_loop_timeout_s);
        let detected = request.detected_language;

        let resolved = match ctx.human_loop.await_decision(request.id, wait).await {
            Ok(r) => r,
            Err(e) => {
                error!(validation_id = %request.id, error = %e, "Awaiting validation failed");
                let mut resp = failed_envelope(&query, detected, &e);
                resp.validation_id = Some(request.id);
                resp.processing_time_ms = started.elapsed().as_millis() as u64;
                ctx.finalized.write().await.insert(request.id, resp);
                return;
            }
        };

        let mut response = match resolved.status {
            ValidationStatus::Approved | ValidationStatus::Modified => {
                match finalize_approved(
                    &ctx,
                    &query,
                    detected,
                    resolved.effective_text().to_string(),
                    sources,
                    Consensus::Approved,
                    1,
                    false,
                )
                .await
                {
                    Ok(resp) => resp,
                    Err(e) => failed_envelope(&query, detected, &e),
                }
            }
            ValidationStatus::Rejected => FinalResponse {
                success: false,
                answer: lang::safe_refusal(detected).to_string(),
                sources,
                detected_language: detected,
                target_language: query.target_language.unwrap_or(detected),
                consensus: Consensus::Fallback,
                iterations_used: 1,
                processing_time_ms: 0,
                validation_id: None,
                error: None,
                flagged_uncertain: false,
                untranslated: false,
            },
            ValidationStatus::Expired => FinalResponse {
                success: false,
                answer: lang::safe_refusal(detected).to_string(),
                sources,
                detected_language: detected,
                target_language: query.target_language.unwrap_or(detected),
                consensus: Consensus::Fallback,
                iterations_used: 1,
                processing_time_ms: 0,
                validation_id: None,
                error: Some("HUMAN_LOOP_EXPIRED".to_string()),
                flagged_uncertain: false,
                untranslated: false,
            },
            ValidationStatus::Pending => failed_envelope(
                &query,
                detected,
                &ConsiliumError::Internal("await_decision returned a pending request".into()),
            ),
        };
        response.validation_id = Some(request.id);
        response.processing_time_ms = started.elapsed().as_millis() as u64;

        if response.is_cacheable() {
            ctx.cache.put(&query.fingerprint(), response.clone()).await;
        }
        ctx.audit.log_event(
            query.request_id,
            "validation_resolved",
            serde_json::json!({
                "validation_id": request.id,
                "status": format!("{:?}", resolved.status),
                "consensus": response.consensus.to_string(),
            }),
        );
        ctx.finalized.write().await.insert(request.id, response);
    });
}

/// Invoke a runner, auditing agent errors on the way out.
async fn invoke_logged(
    ctx: &WorkflowContext,
    runner: &AgentRunner,
    query: &Query,
    input: AgentInput,
) -> ConsiliumResult<AgentOutput> {
    let role = runner.role();
    match runner.invoke(&input).await {
        Ok(out) => Ok(out),
        Err(e) => {
            ctx.audit.log_event(
                query.request_id,
                "agent_error",
                serde_json::json!({ "role": role.to_string(), "error": e.kind() }),
            );
            Err(e)
        }
    }
}

/// Terminal FAILED envelope: empty answer, taxonomy code in `error`.
fn failed_envelope(query: &Query, detected: Language, err: &ConsiliumError) -> FinalResponse {
    FinalResponse {
        success: false,
        answer: String::new(),
        sources: vec![],
        detected_language: detected,
        target_language: query.target_language.unwrap_or(detected),
        consensus: Consensus::Failed,
        iterations_used: 1,
        processing_time_ms: 0,
        validation_id: None,
        error: Some(err.kind().to_string()),
        flagged_uncertain: false,
        untranslated: false,
    }
}
