use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use medchat_core::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
use medchat_core::cache::ConversationCache;
use medchat_core::domain::consultation::{
    AgentResponse, CaseLabel, ConsultationState, Message, Role, SessionId,
};
use medchat_core::domain::intake::IntakeData;
use medchat_core::domain::search::SearchIntent;
use medchat_core::errors::{ApplicationError, DomainError};
use medchat_core::flows::{
    ConsultationStep, FlowAction, FlowEngine, FlowEvent, FlowTransitionError, StepKind,
};
use medchat_core::followup::FollowUpSuggester;
use medchat_core::symptoms::SymptomTable;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::Mutex as SessionMutex;
use uuid::Uuid;

use crate::agents::{
    AgentError, ContentAgent, EmpathyAgent, EscalationAgent, FollowUpContext, FollowUpReplyAgent,
    LanguageCheckAgent, SearchAgent, TimelineAgent, TriageAgent,
};
use crate::guardrails::{ComplianceDecision, ComplianceGuard, GuidanceKind};
use crate::journal::ConsultationJournal;
use crate::llm::{CallStats, StructuredGenerator};
use crate::runtime::StreamHub;

pub const INTAKE_APOLOGY: &str =
    "I'm sorry, there was an error processing your information. Please try again.";
pub const MESSAGE_APOLOGY: &str =
    "I'm sorry, there was an error processing your message. Please try again.";
pub const RECENT_MESSAGES: usize = 10;

const ACTOR: &str = "orchestrator";

#[derive(Debug, Error)]
pub enum OrchestrationError {
    #[error(transparent)]
    Flow(#[from] FlowTransitionError),
    #[error(transparent)]
    Agent(#[from] AgentError),
    #[error("Intake data missing")]
    MissingIntake,
    #[error("Message must not be empty")]
    EmptyMessage,
    #[error("Invalid step: {0}")]
    UnexpectedStep(StepKind),
    #[error("no response composed in step {0}")]
    NoResponse(StepKind),
}

impl From<OrchestrationError> for ApplicationError {
    fn from(error: OrchestrationError) -> Self {
        match error {
            OrchestrationError::Flow(error) => Self::Domain(DomainError::from(error)),
            OrchestrationError::Agent(error) => Self::Integration(error.to_string()),
            other => Self::Domain(DomainError::InvariantViolation(other.to_string())),
        }
    }
}

/// Result of one turn: the reply plus the state it left behind.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnReply {
    pub response: AgentResponse,
    pub state: ConsultationState,
    pub conversation_length: usize,
    #[serde(skip)]
    pub correlation_id: String,
}

#[derive(Clone)]
pub struct ConsultationAgents {
    pub triage: TriageAgent,
    pub timeline: TimelineAgent,
    pub empathy: EmpathyAgent,
    pub content: Arc<ContentAgent>,
    pub escalation: EscalationAgent,
    pub language: LanguageCheckAgent,
    pub search: SearchAgent,
    pub follow_up: FollowUpReplyAgent,
}

impl ConsultationAgents {
    pub fn new(generator: &StructuredGenerator, table: &SymptomTable) -> Result<Self, AgentError> {
        let content = Arc::new(ContentAgent::new(generator.clone())?);
        Ok(Self {
            triage: TriageAgent::new(generator.clone(), table.clone()),
            timeline: TimelineAgent::new(generator.clone()),
            empathy: EmpathyAgent::new(generator.clone()),
            escalation: EscalationAgent::new(content.clone()),
            content,
            language: LanguageCheckAgent::new(generator.clone()),
            search: SearchAgent::new(generator.clone()),
            follow_up: FollowUpReplyAgent::new(generator.clone()),
        })
    }
}

struct Turn {
    session_id: SessionId,
    audit: AuditContext,
    kind: &'static str,
    empathy_lines: Vec<String>,
}

/// How a turn ended, which decides what gets written back to the cache.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum TurnOutcome {
    Completed,
    /// An agent failed; the step was restored and the state is kept.
    Recovered,
    /// Input was refused before anything changed; nothing is stored.
    Rejected,
}

/// Drives a consultation one turn at a time. Each turn loads the session from
/// the cache, runs the agents the flow engine asks for and writes the result
/// back. Turns for the same session never overlap.
pub struct ConsultationOrchestrator {
    generator: StructuredGenerator,
    agents: ConsultationAgents,
    cache: ConversationCache,
    audit: Arc<dyn AuditSink>,
    engine: FlowEngine,
    table: SymptomTable,
    suggester: FollowUpSuggester,
    guard: ComplianceGuard,
    journal: ConsultationJournal,
    streams: StreamHub,
    locks: Mutex<HashMap<SessionId, Arc<SessionMutex<()>>>>,
}

impl ConsultationOrchestrator {
    pub fn new(
        generator: StructuredGenerator,
        cache: ConversationCache,
        audit: Arc<dyn AuditSink>,
    ) -> Result<Self, AgentError> {
        let table = SymptomTable::standard();
        let agents = ConsultationAgents::new(&generator, &table)?;
        Ok(Self {
            generator,
            agents,
            cache,
            audit,
            engine: FlowEngine::new(),
            suggester: FollowUpSuggester::new(table.clone()),
            table,
            guard: ComplianceGuard::default(),
            journal: ConsultationJournal,
            streams: StreamHub::default(),
            locks: Mutex::new(HashMap::new()),
        })
    }

    pub fn cache(&self) -> &ConversationCache {
        &self.cache
    }

    pub fn streams(&self) -> &StreamHub {
        &self.streams
    }

    pub fn call_stats(&self) -> &CallStats {
        self.generator.stats()
    }

    pub fn llm_description(&self) -> String {
        self.generator.client().describe()
    }

    pub async fn process_intake(&self, session_id: &SessionId, intake: IntakeData) -> TurnReply {
        let lock = self.session_lock(session_id);
        let _guard = lock.lock().await;

        let mut turn = self.begin(session_id, "intake");
        let mut state = self.load(session_id);
        let start = state.step.clone();

        let (response, outcome) = match self.run_intake(&mut state, &mut turn, intake).await {
            Ok(response) => (response, TurnOutcome::Completed),
            Err(OrchestrationError::Flow(FlowTransitionError::InvalidIntake(error))) => {
                let decision = format!("Validation failed: {error}");
                self.journal.decision(&turn.session_id, "IntakeAgent", &decision);
                let response =
                    AgentResponse::text(format!("Please complete all required fields. {error}"));
                (response, TurnOutcome::Rejected)
            }
            Err(error) => (
                self.recover(&turn, &mut state, start, error, INTAKE_APOLOGY),
                TurnOutcome::Recovered,
            ),
        };
        self.commit(&turn, state, response, outcome)
    }

    pub async fn process_message(&self, session_id: &SessionId, message: &str) -> TurnReply {
        let lock = self.session_lock(session_id);
        let _guard = lock.lock().await;

        let mut turn = self.begin(session_id, "message");
        let mut state = self.load(session_id);
        let start = state.step.clone();

        let (response, outcome) = match self.run_message(&mut state, &mut turn, message).await {
            Ok(response) => (response, TurnOutcome::Completed),
            Err(error) => (
                self.recover(&turn, &mut state, start, error, MESSAGE_APOLOGY),
                TurnOutcome::Recovered,
            ),
        };
        self.commit(&turn, state, response, outcome)
    }

    /// `role: content` lines of the live conversation.
    pub fn history(&self, session_id: &SessionId) -> Vec<String> {
        self.cache.conversation_history(session_id)
    }

    pub fn state(&self, session_id: &SessionId) -> ConsultationState {
        self.load(session_id)
    }

    /// Drops the session; the next turn starts again at intake.
    pub async fn clear(&self, session_id: &SessionId) -> bool {
        let lock = self.session_lock(session_id);
        let _guard = lock.lock().await;

        let removed = self.cache.clear(session_id);
        self.streams.close(session_id);
        self.audit.emit(
            AuditEvent::new(
                Some(session_id.clone()),
                Uuid::new_v4().to_string(),
                "session.cleared",
                AuditCategory::Cache,
                ACTOR,
                AuditOutcome::Success,
            )
            .with_metadata("existed", removed.to_string()),
        );
        removed
    }

    /// Evicts expired sessions, forgets their idle turn locks and drops
    /// stream channels nobody is listening on.
    pub fn sweep_expired(&self) -> usize {
        let removed = self.cache.sweep();
        self.streams.prune();
        let mut locks = self.locks();
        locks.retain(|session_id, lock| {
            Arc::strong_count(lock) > 1 || self.cache.get(session_id).is_some()
        });
        removed
    }

    fn locks(&self) -> MutexGuard<'_, HashMap<SessionId, Arc<SessionMutex<()>>>> {
        match self.locks.lock() {
            Ok(locks) => locks,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn session_lock(&self, session_id: &SessionId) -> Arc<SessionMutex<()>> {
        self.locks().entry(session_id.clone()).or_default().clone()
    }

    fn begin(&self, session_id: &SessionId, kind: &'static str) -> Turn {
        Turn {
            session_id: session_id.clone(),
            audit: AuditContext::new(Some(session_id.clone()), Uuid::new_v4().to_string(), ACTOR),
            kind,
            empathy_lines: Vec::new(),
        }
    }

    fn load(&self, session_id: &SessionId) -> ConsultationState {
        self.cache.get(session_id).map(|entry| entry.state).unwrap_or_default()
    }

    fn record(&self, turn: &Turn, state: &mut ConsultationState, agent: &str, decision: String) {
        self.journal.decision(&turn.session_id, agent, &decision);
        state.push_decision(agent, decision, self.cache.now());
    }

    fn recover(
        &self,
        turn: &Turn,
        state: &mut ConsultationState,
        start: ConsultationStep,
        error: OrchestrationError,
        apology: &str,
    ) -> AgentResponse {
        state.step = start;
        let detail = error.to_string();
        let error = ApplicationError::from(error);
        tracing::warn!(
            event_name = "orchestrator.turn_failed",
            session_id = %turn.session_id,
            correlation_id = %turn.audit.correlation_id,
            turn = turn.kind,
            error = %error,
            "turn failed; step restored"
        );
        self.audit.emit(
            AuditEvent::new(
                Some(turn.session_id.clone()),
                turn.audit.correlation_id.clone(),
                "orchestrator.turn_failed",
                AuditCategory::Agent,
                ACTOR,
                AuditOutcome::Failed,
            )
            .with_metadata("turn", turn.kind)
            .with_metadata("error", detail.clone()),
        );
        self.record(turn, state, "Orchestrator", format!("Error: {detail}"));
        AgentResponse::text(apology)
    }

    fn commit(
        &self,
        turn: &Turn,
        mut state: ConsultationState,
        response: AgentResponse,
        outcome: TurnOutcome,
    ) -> TurnReply {
        let message = Message::new(Role::Assistant, response.content.clone(), self.cache.now())
            .with_follow_ups(response.follow_up_suggestions.clone());
        match outcome {
            TurnOutcome::Completed => {
                self.journal.message(&turn.session_id, &message);
                state.transcript.push(message.clone());
                self.cache.put(&turn.session_id, state.transcript.clone(), state.clone());
            }
            TurnOutcome::Recovered => {
                self.cache.put(&turn.session_id, state.transcript.clone(), state.clone());
            }
            TurnOutcome::Rejected => {}
        }

        self.streams.publish(&turn.session_id, &message);
        self.audit.emit(
            AuditEvent::new(
                Some(turn.session_id.clone()),
                turn.audit.correlation_id.clone(),
                "orchestrator.turn_completed",
                AuditCategory::Agent,
                ACTOR,
                AuditOutcome::Success,
            )
            .with_metadata("turn", turn.kind)
            .with_metadata("step", state.current_step().as_str()),
        );

        TurnReply {
            response,
            conversation_length: state.transcript.len(),
            state,
            correlation_id: turn.audit.correlation_id.clone(),
        }
    }

    fn apply(
        &self,
        state: &mut ConsultationState,
        turn: &Turn,
        event: FlowEvent,
    ) -> Result<Vec<FlowAction>, OrchestrationError> {
        let outcome =
            self.engine.apply_with_audit(&state.step, &event, self.audit.as_ref(), &turn.audit)?;
        state.step = outcome.to;
        Ok(outcome.actions)
    }

    async fn run_intake(
        &self,
        state: &mut ConsultationState,
        turn: &mut Turn,
        intake: IntakeData,
    ) -> Result<AgentResponse, OrchestrationError> {
        let location = intake.location().map(str::to_string);
        self.journal.intake_received(&turn.session_id, &intake);
        let actions = self.apply(state, turn, FlowEvent::IntakeAccepted { intake })?;
        self.record(turn, state, "IntakeAgent", "Intake data validated".to_string());
        state.location = location;

        self.run_actions(state, turn, actions)
            .await?
            .ok_or(OrchestrationError::NoResponse(state.current_step()))
    }

    async fn run_message(
        &self,
        state: &mut ConsultationState,
        turn: &mut Turn,
        message: &str,
    ) -> Result<AgentResponse, OrchestrationError> {
        let message = message.trim();
        if message.is_empty() {
            return Err(OrchestrationError::EmptyMessage);
        }

        let user = Message::new(Role::User, message, self.cache.now());
        self.journal.message(&turn.session_id, &user);
        state.transcript.push(user);

        let intent = self.agents.search.detect_intent(message).await;
        if intent.is_search_query {
            return Ok(self.answer_search(state, turn, message, intent).await);
        }

        let empathy = self.agents.empathy.process(message).await;
        if !empathy.lines.is_empty() {
            self.record(
                turn,
                state,
                "EmpathyAgent",
                format!("Added empathy lines: {}", empathy.lines.join(", ")),
            );
        }
        turn.empathy_lines = empathy.lines;

        match state.current_step() {
            StepKind::Timeline => self.answer_timeline(state, turn, message).await,
            StepKind::Complete => self.answer_follow_up(state, turn, message).await,
            StepKind::Intake => Err(OrchestrationError::MissingIntake),
            other => Err(OrchestrationError::UnexpectedStep(other)),
        }
    }

    async fn answer_search(
        &self,
        state: &mut ConsultationState,
        turn: &Turn,
        message: &str,
        intent: SearchIntent,
    ) -> AgentResponse {
        let location = Some(intent.location.trim())
            .filter(|location| !location.is_empty())
            .map(str::to_string)
            .or_else(|| state.location.clone())
            .unwrap_or_default();
        self.record(
            turn,
            state,
            "SearchAgent",
            format!("Detected search query: {} in {}", intent.service_type, location),
        );

        let results =
            self.agents.search.search(message, &location, intent.search_type, state.intake()).await;
        let follow_ups = self.suggester.for_search(intent.search_type, Some(&location));
        AgentResponse::with_follow_ups(results.to_markdown(), follow_ups)
    }

    async fn answer_timeline(
        &self,
        state: &mut ConsultationState,
        turn: &Turn,
        message: &str,
    ) -> Result<AgentResponse, OrchestrationError> {
        let intake = state.intake().cloned().ok_or(OrchestrationError::MissingIntake)?;
        let assessment = self.agents.timeline.analyze(message, &intake).await?;
        self.journal.timeline_recorded(&turn.session_id, &assessment.timeline);

        let escalate = assessment.should_escalate();
        if escalate {
            let label = current_label(state).escalate(CaseLabel::PotentialEmergency);
            self.record(
                turn,
                state,
                "TimelineAgent",
                format!("Escalated to {} due to {}", label.as_str(), assessment.escalation_reason()),
            );
            self.journal.case_labeled(&turn.session_id, label);
        }

        let actions =
            self.apply(state, turn, FlowEvent::TimelineAnalyzed { timeline: assessment.timeline, escalate })?;
        self.run_actions(state, turn, actions)
            .await?
            .ok_or(OrchestrationError::NoResponse(state.current_step()))
    }

    async fn answer_follow_up(
        &self,
        state: &mut ConsultationState,
        turn: &Turn,
        message: &str,
    ) -> Result<AgentResponse, OrchestrationError> {
        let intake = state.intake().cloned().ok_or(OrchestrationError::MissingIntake)?;

        let triage = self.agents.triage.triage(&intake.with_follow_up(message)).await;
        let observed =
            if self.table.is_severe(message) { CaseLabel::Emergency } else { triage.case_label };
        let escalate = observed.is_urgent();
        if escalate {
            let label = current_label(state).escalate(observed);
            self.record(
                turn,
                state,
                "TriageAgent",
                format!("Re-escalated to {} based on follow-up", label.as_str()),
            );
            self.journal.case_labeled(&turn.session_id, label);
        }

        let actions = self.apply(state, turn, FlowEvent::FollowUpTriaged { label: observed, escalate })?;
        if let Some(response) = self.run_actions(state, turn, actions).await? {
            return Ok(response);
        }

        // Context comes from the committed transcript; the current question is passed on its own.
        let history = self.cache.conversation_history(&turn.session_id);
        let recent = self.cache.recent_messages(&turn.session_id, RECENT_MESSAGES);
        let reply = {
            let context = FollowUpContext {
                intake: &intake,
                history: &history,
                recent: &recent,
                question: message,
                empathy_lines: &turn.empathy_lines,
            };
            self.agents.follow_up.reply(&context).await?
        };

        let label = current_label(state);
        let text = self.finalize(state, turn, &reply, label, GuidanceKind::Routine).await;
        let follow_ups = self.suggester.generic(state.location.as_deref());
        Ok(AgentResponse::with_follow_ups(text, follow_ups))
    }

    /// Executes flow actions in order, feeding follow-on events back into the
    /// engine until it asks for nothing more.
    async fn run_actions(
        &self,
        state: &mut ConsultationState,
        turn: &Turn,
        actions: Vec<FlowAction>,
    ) -> Result<Option<AgentResponse>, OrchestrationError> {
        let mut queue: VecDeque<FlowAction> = actions.into();
        let mut response: Option<AgentResponse> = None;

        while let Some(action) = queue.pop_front() {
            match action {
                FlowAction::RunTriage => {
                    let event = self.initial_triage(state, turn).await?;
                    queue.extend(self.apply(state, turn, event)?);
                }
                FlowAction::AskTimelineQuestion => {
                    response = Some(AgentResponse::text(self.agents.timeline.question()));
                }
                FlowAction::ComposeMildGuidance => {
                    response = Some(self.compose_mild(state, turn).await?);
                    queue.extend(self.apply(state, turn, FlowEvent::ResponseDelivered)?);
                }
                FlowAction::ComposeEscalation => {
                    response = Some(self.compose_escalation(state, turn).await?);
                    if state.current_step() == StepKind::Escalation {
                        queue.extend(self.apply(state, turn, FlowEvent::ResponseDelivered)?);
                    }
                }
                FlowAction::SuggestFollowUps => {
                    if let Some(response) = response.as_mut() {
                        response.follow_up_suggestions = self.case_follow_ups(state);
                    }
                }
            }
        }
        Ok(response)
    }

    async fn initial_triage(
        &self,
        state: &mut ConsultationState,
        turn: &Turn,
    ) -> Result<FlowEvent, OrchestrationError> {
        let intake = state.intake().cloned().ok_or(OrchestrationError::MissingIntake)?;
        let triage = self.agents.triage.triage(&intake).await;
        self.record(turn, state, "TriageAgent", format!("Case labeled as {}", triage.case_label.as_str()));
        self.journal.case_labeled(&turn.session_id, triage.case_label);

        let severe = self.table.is_severe(&intake.primary_symptom_description);
        if severe && triage.case_label != CaseLabel::Emergency {
            self.record(
                turn,
                state,
                "SymptomTable",
                format!("Severe symptoms override {} label", triage.case_label.as_str()),
            );
        }

        Ok(FlowEvent::TriageCompleted {
            label: triage.case_label,
            escalate: triage.case_label == CaseLabel::Emergency || severe,
        })
    }

    async fn compose_mild(
        &self,
        state: &mut ConsultationState,
        turn: &Turn,
    ) -> Result<AgentResponse, OrchestrationError> {
        let intake = state.intake().cloned().ok_or(OrchestrationError::MissingIntake)?;
        let timeline = state
            .timeline()
            .cloned()
            .ok_or(OrchestrationError::UnexpectedStep(state.current_step()))?;

        let guidance = self.agents.content.mild_case(&intake, &timeline).await?;
        let text = self.agents.content.render_mild(&guidance, &turn.empathy_lines)?;
        let label = current_label(state);
        Ok(AgentResponse::text(self.finalize(state, turn, &text, label, GuidanceKind::Routine).await))
    }

    async fn compose_escalation(
        &self,
        state: &mut ConsultationState,
        turn: &Turn,
    ) -> Result<AgentResponse, OrchestrationError> {
        let intake = state.intake().cloned().ok_or(OrchestrationError::MissingIntake)?;
        let label = state.case_label().unwrap_or(CaseLabel::Emergency);

        let text = self.agents.escalation.respond(&intake, label, &turn.empathy_lines).await?;
        Ok(AgentResponse::text(
            self.finalize(state, turn, &text, label, GuidanceKind::Escalation).await,
        ))
    }

    /// Language check, then the deterministic compliance guard.
    async fn finalize(
        &self,
        state: &mut ConsultationState,
        turn: &Turn,
        text: &str,
        label: CaseLabel,
        kind: GuidanceKind,
    ) -> String {
        let review = self.agents.language.check(text, label).await;
        if review.checked && !review.compliant {
            self.record(
                turn,
                state,
                "LanguageCheckAgent",
                format!("Corrected response: {}", review.issues.join("; ")),
            );
        }

        match self.guard.evaluate(&review.text, kind) {
            ComplianceDecision::Compliant => review.text,
            ComplianceDecision::Repaired { reason_codes, text } => {
                self.record(
                    turn,
                    state,
                    "ComplianceGuard",
                    format!("Repaired response: {}", reason_codes.join(", ")),
                );
                text
            }
        }
    }

    fn case_follow_ups(&self, state: &ConsultationState) -> Vec<String> {
        match state.intake() {
            Some(intake) => self.suggester.for_case(
                &intake.primary_symptom_description,
                current_label(state),
                state.location.as_deref(),
            ),
            None => Vec::new(),
        }
    }
}

fn current_label(state: &ConsultationState) -> CaseLabel {
    state.case_label().unwrap_or(CaseLabel::Mild)
}
