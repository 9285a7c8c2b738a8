pub mod audit;
pub mod cache;
pub mod config;
pub mod domain;
pub mod errors;
pub mod flows;
pub mod followup;
pub mod symptoms;

pub use audit::{AuditContext, AuditEvent, AuditSink, InMemoryAuditSink, TracingAuditSink};
pub use cache::{CachedConversation, Clock, ConversationCache, ManualClock, SystemClock};
pub use domain::consultation::{
    AgentDecision, AgentResponse, CaseLabel, ConsultationState, Message, Progression, Role,
    SessionId, SessionIdError, TimelineData,
};
pub use domain::intake::{IntakeData, IntakeField, IntakeValidationError};
pub use domain::search::{FacilityResult, SearchIntent, SearchResults, SearchType};
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use flows::{ConsultationStep, FlowEngine, FlowEvent, FlowTransitionError, StepKind};
pub use followup::FollowUpSuggester;
pub use symptoms::{Severity, SymptomTable};
