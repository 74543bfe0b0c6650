use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::evaluator::Evaluator;
use super::state::{AdvanceOutcome, AdvancePolicy, SessionMachine, SessionState, TransitionError};
use crate::config::Config;
use crate::error::{CoachError, CoachResult};
use crate::feedback::FeedbackGenerator;
use crate::pose::Registers;
use crate::segment::IdealSegmentStore;
use crate::sync::ReferenceClock;

/// Everything a UI needs to render the session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionOutputs {
    pub state: SessionState,
    pub clip: Option<String>,
    pub score: u8,
    pub feedback: Option<String>,
    pub feedback_pending: bool,
    pub can_advance: bool,
}

impl Default for SessionOutputs {
    fn default() -> Self {
        Self {
            state: SessionState::Idle,
            clip: None,
            score: 0,
            feedback: None,
            feedback_pending: false,
            can_advance: false,
        }
    }
}

type Completion = (u64, CoachResult<String>);

struct Running {
    registers: Registers,
    clip: watch::Sender<String>,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Owns all engine state of one coaching session.
///
/// `start` builds fresh registers and scheduler state and spawns the
/// evaluation task; `stop` cancels it and detaches the registers. Nothing
/// carries over from one run to the next.
pub struct Session {
    config: Config,
    machine: SessionMachine,
    store: Arc<IdealSegmentStore>,
    clock: Arc<dyn ReferenceClock>,
    generator: Arc<dyn FeedbackGenerator>,
    outputs: Arc<watch::Sender<SessionOutputs>>,
    registers: watch::Sender<Option<Registers>>,
    running: Option<Running>,
}

impl Session {
    pub fn new(
        config: Config,
        clock: Arc<dyn ReferenceClock>,
        generator: Arc<dyn FeedbackGenerator>,
    ) -> Self {
        let machine =
            SessionMachine::new(config.session.clips.len(), config.session.advance_policy());
        let store = Arc::new(IdealSegmentStore::from_config(&config.session));
        let (outputs, _) = watch::channel(SessionOutputs::default());
        let (registers, _) = watch::channel(None);
        Self {
            config,
            machine,
            store,
            clock,
            generator,
            outputs: Arc::new(outputs),
            registers,
            running: None,
        }
    }

    pub fn state(&self) -> &SessionState {
        self.machine.state()
    }

    pub fn outputs(&self) -> SessionOutputs {
        self.outputs.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionOutputs> {
        self.outputs.subscribe()
    }

    /// Registers of the running session, None while stopped
    pub fn subscribe_registers(&self) -> watch::Receiver<Option<Registers>> {
        self.registers.subscribe()
    }

    /// Loads the ideal segment of every configured clip. On failure the
    /// session stays blocked until a later load succeeds.
    pub async fn load_reference_data(&mut self) -> CoachResult<()> {
        self.machine.begin_loading()?;
        self.publish_state();

        let mut store = IdealSegmentStore::from_config(&self.config.session);
        let result = store.load_all(&self.config.session.clips).await;
        match result {
            Ok(()) => {
                self.store = Arc::new(store);
                self.machine.finish_loading(Ok(()))?;
                tracing::info!(clips = self.config.session.clips.len(), "reference data loaded");
                self.publish_state();
                Ok(())
            }
            Err(e) => {
                tracing::error!("reference data unavailable: {}", e);
                let _ = self.machine.finish_loading(Err(e.to_string()));
                self.publish_state();
                Err(e)
            }
        }
    }

    /// Enters step 1 and spawns the evaluation task. Returns the registers the
    /// pose producers should write into.
    pub fn start(&mut self) -> CoachResult<Registers> {
        let step = self.machine.start().map_err(|e| match e {
            TransitionError::LoadFailed(message) => CoachError::SessionBlocked(message),
            other => CoachError::Transition(other),
        })?;
        let clip = self.clip_for(step);
        let registers = Registers::new();
        let evaluator = Evaluator::from_config(
            &self.config,
            registers.clone(),
            self.clock.clone(),
            self.store.clone(),
        );

        let (clip_tx, clip_rx) = watch::channel(clip.clone());
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(evaluation_loop(
            evaluator,
            clip_rx,
            self.generator.clone(),
            self.outputs.clone(),
            self.machine.policy(),
            self.config.engine.tick(),
            cancel.clone(),
        ));

        self.running = Some(Running {
            registers: registers.clone(),
            clip: clip_tx,
            cancel,
            handle,
        });
        self.registers.send_replace(Some(registers.clone()));
        self.publish_state();
        tracing::info!(step, clip = %clip, "session started");
        Ok(registers)
    }

    /// Moves to the next clip, wrapping to step 1 after the last one.
    pub fn advance(&mut self) -> CoachResult<AdvanceOutcome> {
        let score = self.outputs.borrow().score;
        let outcome = self.machine.advance(score)?;
        let step = self.machine.state().step().unwrap_or(1);
        let clip = self.clip_for(step);
        if let Some(running) = &self.running {
            running.clip.send_replace(clip.clone());
        }
        self.publish_state();
        tracing::info!(step, clip = %clip, ?outcome, "advanced");
        Ok(outcome)
    }

    /// Halts evaluation and detaches the producers. A feedback request still
    /// in flight may finish but its result is dropped.
    pub async fn stop(&mut self) {
        if let Some(running) = self.running.take() {
            running.cancel.cancel();
            running.registers.detach_all();
            if let Err(e) = running.handle.await {
                tracing::warn!("evaluation task ended abnormally: {}", e);
            }
            self.registers.send_replace(None);
        }
        self.machine.stop();
        self.outputs.send_modify(|o| {
            o.score = 0;
            o.feedback = None;
            o.feedback_pending = false;
        });
        self.publish_state();
        tracing::info!("session stopped");
    }

    pub async fn restart(&mut self) -> CoachResult<Registers> {
        self.stop().await;
        self.start()
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    fn clip_for(&self, step: usize) -> String {
        self.config
            .session
            .clips
            .get(step.saturating_sub(1))
            .cloned()
            .unwrap_or_default()
    }

    fn publish_state(&self) {
        let state = self.machine.state().clone();
        let clip = state.step().map(|step| self.clip_for(step));
        let policy = self.machine.policy();
        self.outputs.send_modify(|o| {
            o.can_advance = state.is_active() && policy.allows(o.score);
            o.state = state;
            o.clip = clip;
        });
    }
}

async fn evaluation_loop(
    mut evaluator: Evaluator,
    mut clip: watch::Receiver<String>,
    generator: Arc<dyn FeedbackGenerator>,
    outputs: Arc<watch::Sender<SessionOutputs>>,
    policy: AdvancePolicy,
    period: Duration,
    cancel: CancellationToken,
) {
    let (completion_tx, mut completions) = mpsc::channel::<Completion>(4);
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let publish = |evaluator: &Evaluator| {
        outputs.send_modify(|o| {
            o.score = evaluator.score();
            o.feedback = evaluator.feedback().map(str::to_string);
            o.feedback_pending = evaluator.is_feedback_pending();
            o.can_advance = o.state.is_active() && policy.allows(o.score);
        });
    };

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            changed = clip.changed() => {
                if changed.is_err() {
                    break;
                }
                evaluator.reset_outputs();
                publish(&evaluator);
            }
            Some((ticket, outcome)) = completions.recv() => {
                evaluator.apply_completion(ticket, outcome);
                publish(&evaluator);
            }
            _ = interval.tick() => {
                let current = clip.borrow().clone();
                let now = tokio::time::Instant::now().into_std();
                let report = evaluator.tick(&current, now);
                if let Some(pending) = report.request {
                    let generator = generator.clone();
                    let completion_tx = completion_tx.clone();
                    let cancel = cancel.clone();
                    tokio::spawn(async move {
                        let outcome = generator.generate(&pending.payload).await;
                        if cancel.is_cancelled() {
                            tracing::debug!(
                                ticket = pending.ticket,
                                "session stopped, dropping feedback"
                            );
                            return;
                        }
                        let _ = completion_tx.send((pending.ticket, outcome)).await;
                    });
                }
                publish(&evaluator);
            }
        }
    }
    tracing::debug!("evaluation loop finished");
}
