use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};
use medchat_agent::agents::timeline::TIMELINE_QUESTION;
use medchat_agent::guardrails::{CLOSING, DISCLAIMER, EMERGENCY_INSTRUCTION};
use medchat_agent::orchestrator::{INTAKE_APOLOGY, MESSAGE_APOLOGY};
use medchat_agent::{ConsultationOrchestrator, ScriptedLlmClient, StreamEvent, StructuredGenerator};
use medchat_core::audit::InMemoryAuditSink;
use medchat_core::cache::{ConversationCache, ManualClock, DEFAULT_TTL_SECS};
use medchat_core::domain::consultation::{CaseLabel, Role, SessionId};
use medchat_core::domain::intake::IntakeData;
use medchat_core::flows::StepKind;
use serde_json::json;

struct Harness {
    client: Arc<ScriptedLlmClient>,
    clock: ManualClock,
    audit: InMemoryAuditSink,
    orchestrator: Arc<ConsultationOrchestrator>,
}

fn harness() -> Harness {
    let start = Utc.with_ymd_and_hms(2026, 5, 4, 10, 0, 0).single().expect("valid start");
    let clock = ManualClock::new(start);
    let cache = ConversationCache::new(Arc::new(clock.clone()), DEFAULT_TTL_SECS);
    let client = Arc::new(ScriptedLlmClient::new());
    let audit = InMemoryAuditSink::default();
    let orchestrator = ConsultationOrchestrator::new(
        StructuredGenerator::new(client.clone()),
        cache,
        Arc::new(audit.clone()),
    )
    .expect("templates parse");
    Harness { client, clock, audit, orchestrator: Arc::new(orchestrator) }
}

fn session(id: &str) -> SessionId {
    SessionId::parse(id).expect("valid session id")
}

fn intake(symptom: &str) -> IntakeData {
    IntakeData {
        full_name: "Dana Reyes".to_string(),
        age: Some(34),
        gender: "female".to_string(),
        existing_medical_conditions: "none".to_string(),
        primary_symptom_description: symptom.to_string(),
        symptom_onset: "2 days ago".to_string(),
        location: "Austin".to_string(),
        height: "5'6\"".to_string(),
        weight: "140 lb".to_string(),
        height_feet: None,
        height_inches: None,
    }
}

fn triage_reply(label: &str) -> serde_json::Value {
    json!({"caseLabel": label, "reasoning": "scripted", "redFlagTermsDetected": []})
}

fn mild_content() -> serde_json::Value {
    json!({
        "acknowledgment": "a sore throat that started two days ago.",
        "selfCareRecommendations": ["Drink warm fluids", "Rest your voice", "Gargle with salt water"],
        "followUpTimeframe": 5,
    })
}

fn transitions(audit: &InMemoryAuditSink) -> Vec<(String, String)> {
    audit
        .events_of_type("flow.transition_applied")
        .into_iter()
        .map(|event| {
            (
                event.metadata.get("from").cloned().unwrap_or_default(),
                event.metadata.get("to").cloned().unwrap_or_default(),
            )
        })
        .collect()
}

#[tokio::test]
async fn mild_case_walks_every_step() {
    let h = harness();
    let id = session("mild-1");
    h.client.reply("triage_result", triage_reply("Mild"));

    let first = h.orchestrator.process_intake(&id, intake("sore throat")).await;
    assert_eq!(first.response.content, TIMELINE_QUESTION);
    assert_eq!(first.state.current_step(), StepKind::Timeline);
    assert_eq!(first.conversation_length, 1);

    h.client.reply(
        "timeline_analysis",
        json!({
            "progression": "same",
            "rapidWorsening": false,
            "alarmingChange": false,
            "recommendedLabel": "Mild",
            "reasoning": "stable",
        }),
    );
    h.client.reply("mild_case_response", mild_content());

    let second =
        h.orchestrator.process_message(&id, "It started Monday and has stayed the same").await;
    let content = &second.response.content;
    assert!(content.starts_with("I understand you're dealing with a sore throat"));
    assert!(content.contains("1. Drink warm fluids\n2. Rest your voice\n3. Gargle with salt water"));
    assert!(content.contains(DISCLAIMER));
    assert!(content.ends_with(CLOSING));
    assert_eq!(
        second.response.follow_up_suggestions,
        vec!["Find ENT specialists in Austin", "Locate pharmacies near Austin"]
    );
    assert_eq!(second.state.current_step(), StepKind::Complete);
    assert_eq!(second.state.case_label(), Some(CaseLabel::Mild));
    assert_eq!(second.conversation_length, 3);

    let steps: Vec<(String, String)> = transitions(&h.audit);
    let expected = [
        ("intake", "triage"),
        ("triage", "timeline"),
        ("timeline", "content"),
        ("content", "complete"),
    ];
    assert_eq!(
        steps,
        expected.iter().map(|(a, b)| (a.to_string(), b.to_string())).collect::<Vec<_>>()
    );

    let decisions: Vec<&str> =
        second.state.decisions.iter().map(|decision| decision.decision.as_str()).collect();
    assert!(decisions.contains(&"Intake data validated"));
    assert!(decisions.contains(&"Case labeled as Mild"));
}

#[tokio::test]
async fn emergency_triage_bypasses_timeline() {
    let h = harness();
    let id = session("er-1");
    h.client.reply("triage_result", triage_reply("Emergency"));
    h.client.reply(
        "emergency_response",
        json!({"assessment": "chest pain with trouble breathing can be a sign of a heart problem."}),
    );

    let reply =
        h.orchestrator.process_intake(&id, intake("crushing chest pain and difficulty breathing")).await;

    assert!(reply.response.content.contains(EMERGENCY_INSTRUCTION));
    assert!(reply.response.content.contains(DISCLAIMER));
    assert!(reply.response.content.ends_with(CLOSING));
    assert_eq!(
        reply.response.follow_up_suggestions,
        vec!["Find emergency rooms near Austin", "Locate urgent care centers in Austin"]
    );
    assert_eq!(reply.state.current_step(), StepKind::Complete);
    assert_eq!(reply.state.case_label(), Some(CaseLabel::Emergency));
    assert!(h.client.requests_for("timeline_analysis").is_empty());
    assert!(transitions(&h.audit).iter().all(|(_, to)| to != "timeline"));
}

#[tokio::test]
async fn severe_symptom_escalates_even_when_triage_fails() {
    let h = harness();
    let id = session("er-2");
    // No triage reply scripted: the call fails and falls back to Mild.
    h.client.reply("emergency_response", json!({"assessment": "sudden weakness needs care now."}));

    let reply = h.orchestrator.process_intake(&id, intake("sudden weakness in my arm")).await;

    assert_eq!(reply.state.case_label(), Some(CaseLabel::Emergency));
    assert!(reply.response.content.contains(EMERGENCY_INSTRUCTION));
    assert_eq!(h.orchestrator.call_stats().get("triage_result").failures, 1);
    assert!(reply.state.decisions.iter().any(|decision| decision.agent == "SymptomTable"));
}

#[tokio::test]
async fn invalid_intake_stays_at_intake_without_model_calls() {
    let h = harness();
    let id = session("bad-intake");
    let mut incomplete = intake("cough");
    incomplete.gender.clear();

    let reply = h.orchestrator.process_intake(&id, incomplete).await;

    assert_eq!(
        reply.response.content,
        "Please complete all required fields. Missing required field: gender"
    );
    assert_eq!(reply.state.current_step(), StepKind::Intake);
    assert!(reply.state.decisions.is_empty());
    assert!(h.client.requests().is_empty());
    assert!(h.orchestrator.cache().get(&id).is_none(), "rejected intake stores nothing");

    let mut too_old = intake("cough");
    too_old.age = Some(121);
    let reply = h.orchestrator.process_intake(&id, too_old).await;
    assert!(reply.response.content.ends_with("Age must be between 0 and 120"));
    assert!(h.orchestrator.cache().is_empty());
}

#[tokio::test]
async fn sweep_drops_stream_channels_without_listeners() {
    let h = harness();
    let watched = session("watched");
    let _receiver = h.orchestrator.streams().subscribe(&watched);
    for index in 0..50 {
        drop(h.orchestrator.streams().subscribe(&session(&format!("left-{index}"))));
    }
    assert_eq!(h.orchestrator.streams().active_sessions(), 51);

    h.orchestrator.sweep_expired();

    assert_eq!(h.orchestrator.streams().active_sessions(), 1);
}

#[tokio::test]
async fn failing_agent_returns_apology_and_restores_step() {
    let h = harness();
    let id = session("broken-timeline");
    h.client.reply("triage_result", triage_reply("Mild"));
    h.orchestrator.process_intake(&id, intake("cough")).await;

    // Timeline analysis is not scripted and has no fallback.
    let reply = h.orchestrator.process_message(&id, "since last week").await;

    assert_eq!(reply.response.content, MESSAGE_APOLOGY);
    assert_eq!(reply.state.current_step(), StepKind::Timeline);
    let last = reply.state.decisions.last().expect("error decision recorded");
    assert_eq!(last.agent, "Orchestrator");
    assert!(last.decision.starts_with("Error:"));
    assert_eq!(h.orchestrator.state(&id).current_step(), StepKind::Timeline);
    assert_eq!(h.audit.events_of_type("orchestrator.turn_failed").len(), 1);
}

#[tokio::test]
async fn message_before_intake_is_an_error() {
    let h = harness();
    let reply = h.orchestrator.process_message(&session("no-intake"), "hello").await;
    assert_eq!(reply.response.content, MESSAGE_APOLOGY);
    assert_eq!(reply.state.current_step(), StepKind::Intake);
}

#[tokio::test]
async fn search_query_is_answered_without_advancing() {
    let h = harness();
    let id = session("search-1");
    h.client.reply("triage_result", triage_reply("Mild"));
    h.orchestrator.process_intake(&id, intake("rash on my arm")).await;

    h.client.reply(
        "search_intent",
        json!({
            "isSearchQuery": true,
            "searchType": "urgent_care",
            "location": "",
            "serviceType": "urgent care centers",
            "urgency": "urgent",
        }),
    );
    h.client.reply(
        "search_results",
        json!({
            "searchType": "urgent_care",
            "results": [{
                "name": "South Lamar Urgent Care",
                "address": "1200 S Lamar Blvd, Austin, TX",
                "phone": "(512) 555-0142",
                "type": "Urgent Care",
                "distance": "2.1 miles",
                "hours": "8am-8pm",
                "specialties": ["Minor injuries"],
                "rating": 4.5,
                "acceptsInsurance": true,
                "emergencyServices": false,
            }],
            "searchQuery": "urgent care near me",
            "location": "Austin",
            "additionalInfo": "",
        }),
    );

    let reply = h.orchestrator.process_message(&id, "Find urgent care near me").await;

    assert!(reply.response.content.starts_with("## 🔍 Search Results: urgent care near me"));
    assert!(reply.response.content.ends_with("How does this help with your medical needs?"));
    assert_eq!(
        reply.response.follow_up_suggestions,
        vec!["Find emergency rooms near Austin", "Locate pharmacies near Austin"]
    );
    assert_eq!(reply.state.current_step(), StepKind::Timeline);
    assert!(reply
        .state
        .decisions
        .iter()
        .any(|decision| decision.decision == "Detected search query: urgent care centers in Austin"));
    let search_prompt = &h.client.requests_for("search_results")[0].prompt;
    assert!(search_prompt.contains("Location: \"Austin\""));
}

#[tokio::test]
async fn follow_up_question_gets_contextual_reply() {
    let h = harness();
    let id = session("follow-1");
    h.client.reply("triage_result", triage_reply("Mild"));
    h.orchestrator.process_intake(&id, intake("sore throat")).await;
    h.client.reply(
        "timeline_analysis",
        json!({
            "progression": "better",
            "rapidWorsening": false,
            "alarmingChange": false,
            "recommendedLabel": "Mild",
            "reasoning": "improving",
        }),
    );
    h.client.reply("mild_case_response", mild_content());
    h.orchestrator.process_message(&id, "Two days, getting better").await;

    h.client.reply("triage_result", triage_reply("Mild"));
    h.client.reply("follow_up_reply", json!({"response": "Honey in warm tea can soothe it."}));
    let reply = h.orchestrator.process_message(&id, "Can I take honey for it?").await;

    assert_eq!(
        reply.response.content,
        format!("Honey in warm tea can soothe it.\n\n{DISCLAIMER}\n\n{CLOSING}")
    );
    assert_eq!(
        reply.response.follow_up_suggestions,
        vec!["Find primary care doctors in Austin", "Locate pharmacies near Austin"]
    );
    assert_eq!(reply.state.current_step(), StepKind::Complete);
    assert!(reply.state.decisions.iter().any(|decision| decision.agent == "ComplianceGuard"));

    let retriage = h.client.requests_for("triage_result");
    assert!(retriage[1].prompt.contains("sore throat + FOLLOW-UP: Can I take honey for it?"));
    let follow_up_prompt = &h.client.requests_for("follow_up_reply")[0].prompt;
    assert!(follow_up_prompt.contains("user: Two days, getting better"));
    assert_eq!(h.orchestrator.history(&id).len(), 5);
}

#[tokio::test]
async fn red_flag_in_follow_up_re_escalates() {
    let h = harness();
    let id = session("follow-2");
    h.client.reply("triage_result", triage_reply("Mild"));
    h.orchestrator.process_intake(&id, intake("sore throat")).await;
    h.client.reply(
        "timeline_analysis",
        json!({
            "progression": "same",
            "rapidWorsening": false,
            "alarmingChange": false,
            "recommendedLabel": "Mild",
            "reasoning": "stable",
        }),
    );
    h.client.reply("mild_case_response", mild_content());
    h.orchestrator.process_message(&id, "A few days, about the same").await;

    h.client.reply(
        "empathy_analysis",
        json!({
            "containsWorry": false,
            "containsPain": true,
            "containsDontWorry": false,
            "specificSymptom": "",
        }),
    );
    h.client.reply("triage_result", triage_reply("Mild"));
    h.client.reply("emergency_response", json!({"assessment": "new chest pain needs urgent care."}));
    let reply = h.orchestrator.process_message(&id, "Now I also have chest pain").await;

    assert_eq!(reply.state.case_label(), Some(CaseLabel::Emergency));
    assert_eq!(reply.state.current_step(), StepKind::Complete);
    assert!(reply.response.content.starts_with("That sounds really uncomfortable.\n\n"));
    assert!(reply.response.content.contains(EMERGENCY_INSTRUCTION));
    assert!(reply
        .state
        .decisions
        .iter()
        .any(|decision| decision.decision == "Re-escalated to Emergency based on follow-up"));
}

#[tokio::test]
async fn timeline_worsening_escalates_to_potential_emergency() {
    let h = harness();
    let id = session("timeline-up");
    h.client.reply("triage_result", triage_reply("Mild"));
    h.orchestrator.process_intake(&id, intake("cough")).await;
    h.client.reply(
        "timeline_analysis",
        json!({
            "progression": "worse",
            "rapidWorsening": true,
            "alarmingChange": false,
            "recommendedLabel": "Potential Emergency",
            "reasoning": "getting worse by the hour",
        }),
    );
    h.client.reply("emergency_response", json!({"assessment": "a cough that worsens quickly should be checked."}));

    let reply = h.orchestrator.process_message(&id, "Since this morning, much worse").await;

    assert_eq!(reply.state.case_label(), Some(CaseLabel::PotentialEmergency));
    assert!(reply.state.timeline().is_some());
    assert!(reply.response.content.contains(EMERGENCY_INSTRUCTION));
    assert!(reply.state.decisions.iter().any(|decision| {
        decision.decision == "Escalated to Potential Emergency due to rapid worsening"
    }));
}

#[tokio::test]
async fn clearing_and_expiry_start_a_fresh_consultation() {
    let h = harness();
    let id = session("reset-1");
    h.client.reply("triage_result", triage_reply("Mild"));
    h.orchestrator.process_intake(&id, intake("cough")).await;
    assert_eq!(h.orchestrator.state(&id).current_step(), StepKind::Timeline);

    assert!(h.orchestrator.clear(&id).await);
    assert!(h.orchestrator.cache().get(&id).is_none());
    assert_eq!(h.orchestrator.state(&id).current_step(), StepKind::Intake);
    assert!(h.orchestrator.history(&id).is_empty());

    h.client.reply("triage_result", triage_reply("Mild"));
    h.orchestrator.process_intake(&id, intake("cough")).await;
    h.clock.advance(Duration::hours(24) + Duration::seconds(1));
    assert_eq!(h.orchestrator.state(&id).current_step(), StepKind::Intake);
    assert_eq!(h.orchestrator.sweep_expired(), 0, "read already evicted the entry");
}

#[tokio::test]
async fn concurrent_intakes_for_one_session_are_serialized() {
    let h = harness();
    let id = session("race-1");
    h.client.reply("triage_result", triage_reply("Mild"));

    let first = h.orchestrator.clone();
    let second = h.orchestrator.clone();
    let (id_a, id_b) = (id.clone(), id.clone());
    let (a, b) = tokio::join!(
        async move { first.process_intake(&id_a, intake("cough")).await },
        async move { second.process_intake(&id_b, intake("cough")).await },
    );

    let mut contents = vec![a.response.content, b.response.content];
    contents.sort();
    let mut expected = vec![TIMELINE_QUESTION.to_string(), INTAKE_APOLOGY.to_string()];
    expected.sort();
    assert_eq!(contents, expected);
    assert_eq!(h.client.requests_for("triage_result").len(), 1);
}

#[tokio::test]
async fn stream_subscribers_receive_reply_paragraphs() {
    let h = harness();
    let id = session("stream-1");
    let mut receiver = h.orchestrator.streams().subscribe(&id);
    h.client.reply("triage_result", triage_reply("Mild"));

    let reply = h.orchestrator.process_intake(&id, intake("cough")).await;
    let message_id = reply.state.transcript.last().map(|message| message.id.clone());

    match receiver.recv().await.expect("chunk") {
        StreamEvent::Chunk { content, index, message_id: id } => {
            assert_eq!(content, TIMELINE_QUESTION);
            assert_eq!(index, 0);
            assert_eq!(Some(id), message_id);
        }
        other => panic!("expected chunk, got {other:?}"),
    }
    assert!(matches!(receiver.recv().await, Ok(StreamEvent::Done { .. })));
    assert_eq!(reply.state.transcript.last().map(|message| message.role), Some(Role::Assistant));
}
