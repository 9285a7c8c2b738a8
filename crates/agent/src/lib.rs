//! Consultation runtime: the model-backed agents and the orchestrator that
//! sequences them.
//!
//! A turn flows through:
//! 1. **Flow engine** (`medchat_core::flows`) - decides which step comes next
//! 2. **Agents** (`agents`) - one schema-constrained model call each
//! 3. **Compliance** (`agents::language`, `guardrails`) - model rewrite, then a
//!    deterministic guard on the outgoing guidance
//! 4. **Commit** - session cache write and stream publication (`runtime`)
//!
//! The model never decides the step. Its urgency label is advisory and is
//! merged with the symptom table's severity before the engine sees it.

pub mod agents;
pub mod guardrails;
pub mod journal;
pub mod llm;
pub mod orchestrator;
pub mod runtime;

pub use llm::{
    CallStats, LlmClient, OpenAiClient, ScriptedLlmClient, StructuredCallError,
    StructuredGenerator, StructuredRequest,
};
pub use orchestrator::{ConsultationOrchestrator, OrchestrationError, TurnReply};
pub use runtime::{StreamEvent, StreamHub};
