//! The turn workflow — graph, state object, entry point.
//!
//! `run_turn` drives Understand → Think → Act (or QuickAct) → Reply →
//! Summarize for one user message. The turn runs as a spawned task bound
//! to a durable job: a dropped event receiver (client disconnect) never
//! cancels it, and the result is pollable afterwards.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use uuid::Uuid;

use alfred_context::entity;
use alfred_domain::config::AlfredConfig;
use alfred_domain::error::{Error, Result};
use alfred_domain::event::{NodeName, PhaseStatus, TurnEvent};
use alfred_domain::interpreter::Interpreter;
use alfred_domain::trace::TraceEvent;
use alfred_registry::conversation::ConversationStore;
use alfred_registry::registry::RefAction;
use alfred_tools::store::EntityStore;

use crate::jobs::{Job, JobStatus, JobStore};
use crate::nodes::understand::{self, QuickRoute};
use crate::nodes::{act, quick, reply, summarize, think};
use crate::state::{AlfredState, Mode, TurnRequest, TurnResult, UiChangeKind};
use crate::turn_lock::UserLockMap;

/// The assembled core: every collaborator the turn machine needs.
#[derive(Clone)]
pub struct Alfred {
    config: Arc<AlfredConfig>,
    interpreter: Arc<dyn Interpreter>,
    store: Arc<dyn EntityStore>,
    conversations: Arc<ConversationStore>,
    jobs: Arc<JobStore>,
    locks: Arc<UserLockMap>,
}

impl Alfred {
    pub fn new(
        config: AlfredConfig,
        interpreter: Arc<dyn Interpreter>,
        store: Arc<dyn EntityStore>,
        state_path: &Path,
    ) -> Result<Self> {
        let conversations = Arc::new(ConversationStore::new(state_path)?);
        let jobs = Arc::new(JobStore::new(state_path));
        let retention = Duration::from_secs(config.jobs.retention_hours * 3600);
        jobs.prune_expired(retention);

        Ok(Self {
            config: Arc::new(config),
            interpreter,
            store,
            conversations,
            jobs,
            locks: Arc::new(UserLockMap::new()),
        })
    }

    pub fn jobs(&self) -> &JobStore {
        &self.jobs
    }

    pub fn conversations(&self) -> &ConversationStore {
        &self.conversations
    }

    /// Poll a job by id.
    pub fn poll_job(&self, job_id: &Uuid) -> Option<Job> {
        self.jobs.get(job_id)
    }

    /// Acknowledge a complete job.
    pub fn ack_job(&self, job_id: &Uuid) -> Result<Job> {
        self.jobs.ack(job_id)
    }

    // ── Entry points ──────────────────────────────────────────────

    /// Start a turn and return the job id plus the event stream. The turn
    /// keeps running if the receiver is dropped.
    pub fn start_turn(&self, request: TurnRequest) -> Result<(Uuid, mpsc::Receiver<TurnEvent>)> {
        if !request.mode.is_supported() {
            return Err(Error::validation(format!(
                "mode {:?} is outside the core's scope; use plan or quick",
                request.mode
            )));
        }

        let job = Job::new(&request.user_id, serde_json::to_value(&request)?);
        let job_id = job.id;
        self.jobs.insert(job);

        let (tx, rx) = mpsc::channel::<TurnEvent>(64);
        let this = self.clone();
        tokio::spawn(async move {
            this.run_turn_task(request, job_id, tx).await;
        });

        Ok((job_id, rx))
    }

    /// Run a turn to completion and return the result. Persists the
    /// registry, conversation, and job record as side effects.
    pub async fn run_turn(&self, request: TurnRequest) -> Result<TurnResult> {
        let (job_id, mut rx) = self.start_turn(request)?;

        // Drain the stream; the job record is the authoritative result.
        while rx.recv().await.is_some() {}

        let job = self
            .jobs
            .get(&job_id)
            .ok_or_else(|| Error::Other(format!("job {job_id} vanished")))?;
        match job.status {
            JobStatus::Complete => {
                let output = job
                    .output
                    .ok_or_else(|| Error::Other(format!("job {job_id} has no output")))?;
                serde_json::from_value(output).map_err(Error::Json)
            }
            JobStatus::Failed => Err(Error::Other(
                job.error.unwrap_or_else(|| "turn failed".into()),
            )),
            other => Err(Error::Other(format!(
                "job {job_id} ended in non-terminal status {other:?}"
            ))),
        }
    }

    // ── The turn itself ───────────────────────────────────────────

    async fn run_turn_task(
        &self,
        request: TurnRequest,
        job_id: Uuid,
        tx: mpsc::Sender<TurnEvent>,
    ) {
        // Same-user turns are serialized; the permit releases on drop.
        let _permit = match self.locks.acquire(&request.user_id).await {
            Ok(permit) => permit,
            Err(e) => {
                self.fail_job(&job_id, &tx, &format!("turn lock unavailable: {e}"));
                return;
            }
        };

        self.jobs.update(&job_id, |j| {
            j.advance(JobStatus::Running);
        });
        if let Some(job) = self.jobs.get(&job_id) {
            self.jobs.persist(&job);
        }
        self.emit(&job_id, &tx, TurnEvent::JobStarted { job_id });

        let record = self.conversations.load_or_create(&request.user_id);
        let mut state = AlfredState::new(&request, record);

        TraceEvent::TurnStarted {
            user_id: state.user_id.clone(),
            turn_id: state.turn_id,
            mode: format!("{:?}", state.mode).to_lowercase(),
        }
        .emit();

        self.apply_ui_changes(&mut state);

        // Understand through Act run under the turn deadline; Reply and
        // Summarize always run so the turn leaves a response and a record.
        let turn_budget = Duration::from_millis(self.config.deadlines.turn_deadline_ms);
        let interpreting = self.run_phases(&mut state, &job_id, &tx);
        if tokio::time::timeout(turn_budget, interpreting).await.is_err() {
            state.timed_out = true;
            state.note_error("STEP_DEADLINE: turn deadline expired; replying with partial results");
        }

        self.emit_phase(&job_id, &tx, NodeName::Reply, PhaseStatus::Started, None);
        let reply_output = reply::run(self.interpreter.as_ref(), &self.config, &mut state).await;
        state.reply_output = Some(reply_output.clone());
        self.emit_phase(&job_id, &tx, NodeName::Reply, PhaseStatus::Completed, None);

        self.emit_phase(&job_id, &tx, NodeName::Summarize, PhaseStatus::Started, None);
        summarize::run(&self.conversations, &self.config, &mut state);
        self.emit_phase(&job_id, &tx, NodeName::Summarize, PhaseStatus::Completed, None);

        // Interpreter unavailable across multiple nodes is fatal: the
        // record is kept, but the job itself fails with a diagnostic.
        let transport_failures = state
            .errors
            .iter()
            .filter(|e| e.contains("interpreter:"))
            .count();
        if transport_failures >= 2 {
            self.fail_job(
                &job_id,
                &tx,
                &format!("interpreter unavailable: {}", state.errors.join("; ")),
            );
            return;
        }

        let result = TurnResult {
            response: reply_output.response,
            active_context: entity::active_refs(
                &state.registry,
                state.turn_id,
                self.config.limits.recent_turns_window,
            ),
            log_handle: format!("jobs/{job_id}"),
            job_id,
        };

        let output = serde_json::to_value(&result).ok();
        let checkpoint = state.steps_checkpoint();
        self.jobs.update(&job_id, |j| {
            j.output = output.clone();
            j.steps_checkpoint = checkpoint.clone();
            j.advance(JobStatus::Complete);
        });
        if let Some(job) = self.jobs.get(&job_id) {
            self.jobs.persist(&job);
        }

        self.emit(&job_id, &tx, TurnEvent::Done);
        self.jobs.cleanup_channel(&job_id);
    }

    /// Understand, routing, Think, and Act/QuickAct.
    async fn run_phases(
        &self,
        state: &mut AlfredState,
        job_id: &Uuid,
        tx: &mpsc::Sender<TurnEvent>,
    ) {
        let interpreter = self.interpreter.as_ref();

        // ── Understand ───────────────────────────────────────────
        self.emit_phase(job_id, tx, NodeName::Understand, PhaseStatus::Started, None);
        let understand_output = understand::run(interpreter, &self.config, state).await;
        state.understand_output = Some(understand_output.clone());
        self.emit_phase(job_id, tx, NodeName::Understand, PhaseStatus::Completed, None);
        self.emit(
            job_id,
            tx,
            TurnEvent::ActiveContext {
                refs: entity::active_refs(
                    &state.registry,
                    state.turn_id,
                    self.config.limits.recent_turns_window,
                ),
            },
        );

        // ── Routing ──────────────────────────────────────────────
        let mut take_quick = state.mode == Mode::Quick;
        if !take_quick {
            take_quick = match understand::quick_route(&understand_output, &self.config) {
                QuickRoute::Direct => true,
                QuickRoute::NeedsValidation => {
                    think::validate_quick(interpreter, &self.config, state, &understand_output)
                        .await
                }
                QuickRoute::No => false,
            };
        }

        if take_quick {
            self.emit_phase(job_id, tx, NodeName::QuickAct, PhaseStatus::Started, None);
            let answered =
                quick::run(interpreter, self.store.as_ref(), &self.config, state).await;
            let status = if answered {
                PhaseStatus::Completed
            } else {
                PhaseStatus::Failed
            };
            self.emit_phase(job_id, tx, NodeName::QuickAct, status, None);
            return;
        }

        // ── Think ────────────────────────────────────────────────
        self.emit_phase(job_id, tx, NodeName::Think, PhaseStatus::Started, None);
        let think_output = match think::run_with_retry(
            interpreter,
            &self.config,
            state,
            &understand_output,
        )
        .await
        {
            Ok(output) => {
                self.emit_phase(job_id, tx, NodeName::Think, PhaseStatus::Completed, None);
                output
            }
            Err(e) => {
                state.note_error(format!("planning failed: {e}"));
                self.emit_phase(
                    job_id,
                    tx,
                    NodeName::Think,
                    PhaseStatus::Failed,
                    Some(e.to_string()),
                );
                return;
            }
        };
        state.think_output = Some(think_output.clone());

        // ── Act ──────────────────────────────────────────────────
        let think::ThinkOutput::PlanDirect { steps, .. } = think_output else {
            // Propose and clarify are checkpoints: Reply relays them.
            return;
        };
        state.ledger.steps_total = steps.len();
        state.steps = steps;

        self.emit_phase(
            job_id,
            tx,
            NodeName::Act,
            PhaseStatus::Started,
            Some(format!("{} steps", state.steps.len())),
        );
        let jobs = self.jobs.clone();
        let checkpoint_job = *job_id;
        act::run(
            interpreter,
            self.store.as_ref(),
            &self.config,
            state,
            move |st| {
                let checkpoint = st.steps_checkpoint();
                jobs.update(&checkpoint_job, |j| {
                    j.steps_checkpoint = checkpoint.clone();
                });
            },
        )
        .await;
        self.emit_phase(job_id, tx, NodeName::Act, PhaseStatus::Completed, None);
    }

    /// Frontend mutations land in the registry before Understand runs.
    fn apply_ui_changes(&self, state: &mut AlfredState) {
        let changes = state.ui_changes.clone();
        for change in &changes {
            let Some(schema) = alfred_domain::schema::table(&change.table) else {
                state.note_error(format!("ui change names unknown table {}", change.table));
                continue;
            };
            let reference = state.registry.register_read(
                &change.id,
                schema.entity_type,
                change.label.as_deref(),
                state.turn_id,
            );
            let action = match change.kind {
                UiChangeKind::Created => RefAction::Created,
                UiChangeKind::Updated => RefAction::Updated,
                UiChangeKind::Deleted => RefAction::Deleted,
            };
            state.registry.mark(&reference, action);
        }
    }

    /// Mark a job failed with a diagnostic and close the stream.
    fn fail_job(&self, job_id: &Uuid, tx: &mpsc::Sender<TurnEvent>, diagnostic: &str) {
        self.jobs.update(job_id, |j| {
            j.error = Some(diagnostic.to_owned());
            j.advance(JobStatus::Failed);
        });
        if let Some(job) = self.jobs.get(job_id) {
            self.jobs.persist(&job);
        }
        self.emit(
            job_id,
            tx,
            TurnEvent::Error {
                message: diagnostic.to_owned(),
            },
        );
        self.jobs.cleanup_channel(job_id);
    }

    // ── Event plumbing ────────────────────────────────────────────

    /// Events go to the per-job broadcast channel (pollable stream) and
    /// the direct receiver. Send failures are ignored: the job record,
    /// not the channel, is authoritative.
    fn emit(&self, job_id: &Uuid, tx: &mpsc::Sender<TurnEvent>, event: TurnEvent) {
        self.jobs.emit(job_id, event.clone());
        let _ = tx.try_send(event);
    }

    fn emit_phase(
        &self,
        job_id: &Uuid,
        tx: &mpsc::Sender<TurnEvent>,
        node: NodeName,
        status: PhaseStatus,
        details: Option<String>,
    ) {
        self.emit(
            job_id,
            tx,
            TurnEvent::PhaseProgress {
                node,
                status,
                details,
            },
        );
    }
}
