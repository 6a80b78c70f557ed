//! # Function Call Dispatcher
//!
//! Executes the named actions the realtime model can invoke and returns a
//! structured JSON result. Failures never escape as errors: they come back
//! as `{"success": false, "error": ...}` so the conversation continues.
//!
//! ## Functions:
//! - `invoke-phq2` / `invoke-phq9`: start a screening (no-op if one is running)
//! - `pause-session` / `resume-session`: delegated to the controller
//! - `close-session`: farewell line, then end after the grace delay
//! - `set-humor-level`: integer 0-100, as a number or numeric string

use crate::conversation::{Message, MessageKind};
use crate::error::{AppError, AppResult};
use crate::persona::HumorLevel;
use crate::routing::router::{apply_humor, farewell_message};
use crate::screening::questionnaire::response_scale_text;
use crate::screening::ScreeningType;
use crate::session::context::{ControlRequest, Outbox, SessionState};
use crate::session::events::SessionUpdate;
use crate::session::persistence::PersistenceOp;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{info, warn};

pub const INVOKE_PHQ2: &str = "invoke-phq2";
pub const INVOKE_PHQ9: &str = "invoke-phq9";
pub const PAUSE_SESSION: &str = "pause-session";
pub const RESUME_SESSION: &str = "resume-session";
pub const CLOSE_SESSION: &str = "close-session";
pub const SET_HUMOR_LEVEL: &str = "set-humor-level";

const INVALID_HUMOR: &str = "Invalid humor level. Must be between 0 and 100.";
const UNKNOWN_FUNCTION: &str = "unknown function";

/// Tool description sent to the transport at session start.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolDefinition {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub parameters: Value,
}

fn tool(name: &'static str, description: &'static str, parameters: Value) -> ToolDefinition {
    ToolDefinition {
        kind: "function",
        name,
        description,
        parameters,
    }
}

fn no_parameters() -> Value {
    json!({ "type": "object", "properties": {}, "required": [] })
}

pub fn tool_definitions() -> Vec<ToolDefinition> {
    vec![
        tool(
            INVOKE_PHQ2,
            "Starts the PHQ-2 quick depression screening (2 questions). Use when the user wants a quick check.",
            no_parameters(),
        ),
        tool(
            INVOKE_PHQ9,
            "Starts the PHQ-9 comprehensive depression assessment (9 questions).",
            no_parameters(),
        ),
        tool(
            PAUSE_SESSION,
            "Temporarily pauses the conversation without disconnecting.",
            no_parameters(),
        ),
        tool(RESUME_SESSION, "Resumes a paused conversation.", no_parameters()),
        tool(
            CLOSE_SESSION,
            "Ends the conversation after a short farewell.",
            no_parameters(),
        ),
        tool(
            SET_HUMOR_LEVEL,
            "Adjusts the AI personality humor level between 0-100. Higher values make the AI more casual and friendly, lower values make it more formal and professional.",
            json!({
                "type": "object",
                "properties": {
                    "level": {
                        "type": "number",
                        "description": "The humor level as a number between 0 and 100",
                        "minimum": 0,
                        "maximum": 100
                    }
                },
                "required": ["level"]
            }),
        ),
    ]
}

#[derive(Debug, Default, Clone, Copy)]
pub struct FunctionDispatcher;

impl FunctionDispatcher {
    pub fn new() -> Self {
        Self
    }

    /// Run `name` and return its result object.
    pub fn dispatch(&self, name: &str, arguments: &Value, state: &mut SessionState, outbox: &mut Outbox) -> Value {
        let arguments = normalize_arguments(arguments);

        match self.execute(name, &arguments, state, outbox) {
            Ok(result) => {
                info!(session_id = %state.session.session_id, function = name, "Function call handled");
                result
            }
            Err(err) => {
                warn!(session_id = %state.session.session_id, function = name, error = %err, "Function call failed");
                json!({ "success": false, "error": err.message() })
            }
        }
    }

    fn execute(&self, name: &str, arguments: &Value, state: &mut SessionState, outbox: &mut Outbox) -> AppResult<Value> {
        match name {
            INVOKE_PHQ2 => Ok(invoke_screening(ScreeningType::Phq2, state, outbox)),
            INVOKE_PHQ9 => Ok(invoke_screening(ScreeningType::Phq9, state, outbox)),
            PAUSE_SESSION => {
                outbox.control(ControlRequest::Pause);
                Ok(json!({ "success": true, "message": "Session paused" }))
            }
            RESUME_SESSION => {
                outbox.control(ControlRequest::Resume);
                Ok(json!({ "success": true, "message": "Session resumed" }))
            }
            CLOSE_SESSION => {
                let farewell = farewell_message(&state.first_name());
                state.append(
                    Message::assistant(farewell, MessageKind::SessionClose),
                    false,
                    json!({ "triggered_by_function": CLOSE_SESSION }),
                    outbox,
                );
                outbox.control(ControlRequest::Close);
                Ok(json!({ "success": true, "message": "Session closing" }))
            }
            SET_HUMOR_LEVEL => {
                let level = parse_level(arguments)
                    .and_then(HumorLevel::try_new)
                    .ok_or_else(|| AppError::FunctionDispatch(INVALID_HUMOR.to_string()))?;
                let level = apply_humor(level.value() as i64, state, outbox);
                Ok(json!({
                    "success": true,
                    "humorLevel": level.value(),
                    "message": format!("Humor level updated to {}", level),
                }))
            }
            _ => Err(AppError::FunctionDispatch(UNKNOWN_FUNCTION.to_string())),
        }
    }
}

/// Realtime backends often deliver arguments as a JSON-encoded string.
fn normalize_arguments(arguments: &Value) -> Value {
    match arguments {
        Value::String(raw) => serde_json::from_str(raw).unwrap_or(Value::Null),
        other => other.clone(),
    }
}

fn parse_level(arguments: &Value) -> Option<i64> {
    match arguments.get("level")? {
        Value::Number(number) => number
            .as_i64()
            .or_else(|| number.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
        Value::String(text) => text.trim().parse::<i64>().ok(),
        _ => None,
    }
}

fn invoke_screening(requested: ScreeningType, state: &mut SessionState, outbox: &mut Outbox) -> Value {
    let outcome = state.engine.start_assessment(requested);

    if outcome.already_active {
        info!(
            session_id = %state.session.session_id,
            assessment_id = %outcome.assessment_id,
            "Assessment already in progress"
        );
    } else {
        outbox.persist(PersistenceOp::InitializeProgress {
            user_id: state.identity.user_id.clone(),
            screening_type: outcome.screening_type,
            assessment_id: outcome.assessment_id.clone(),
        });
        outbox.update(SessionUpdate::AssessmentStarted {
            assessment_id: outcome.assessment_id.clone(),
            screening_type: outcome.screening_type,
        });
        info!(
            session_id = %state.session.session_id,
            assessment_id = %outcome.assessment_id,
            screening_type = %outcome.screening_type,
            "Assessment started"
        );
    }

    let next = state.engine.next_question();
    let question_number = next.map(|q| q.number).unwrap_or(1);
    let question_text = next.map(|q| q.text.clone()).unwrap_or_default();

    json!({
        "success": true,
        "assessmentId": outcome.assessment_id,
        "type": outcome.screening_type.short_code(),
        "totalQuestions": outcome.screening_type.question_count(),
        "currentQuestionNumber": question_number,
        "questionText": question_text,
        "responseScale": response_scale_text(),
        "sessionId": state.session.session_id,
        "alreadyActive": outcome.already_active,
        "message": format!(
            "{} assessment {}. Ask question {} now, starting with [PHQ-Q{}].",
            outcome.screening_type,
            if outcome.already_active { "already in progress" } else { "started" },
            question_number,
            question_number
        ),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persona::UserIdentity;

    fn setup() -> (FunctionDispatcher, SessionState, Outbox) {
        let mut state = SessionState::new(
            UserIdentity::new("u1", Some("Alex Johnson".to_string())),
            HumorLevel::default(),
        );
        state.session.activate().unwrap();
        (FunctionDispatcher::new(), state, Outbox::new())
    }

    #[test]
    fn test_invoke_twice_returns_same_assessment() {
        let (dispatcher, mut state, mut outbox) = setup();
        let first = dispatcher.dispatch(INVOKE_PHQ9, &json!({}), &mut state, &mut outbox);
        let second = dispatcher.dispatch(INVOKE_PHQ9, &json!({}), &mut state, &mut outbox);

        assert_eq!(first["success"], true);
        assert_eq!(first["assessmentId"], second["assessmentId"]);
        assert_eq!(first["type"], "phq9");
        assert_eq!(first["totalQuestions"], 9);
        assert_eq!(first["currentQuestionNumber"], 1);
        assert_eq!(second["alreadyActive"], true);

        let initialized = outbox
            .persistence
            .iter()
            .filter(|op| matches!(op, PersistenceOp::InitializeProgress { .. }))
            .count();
        assert_eq!(initialized, 1);
    }

    #[test]
    fn test_set_humor_level_accepts_numbers_and_strings() {
        let (dispatcher, mut state, mut outbox) = setup();

        let result = dispatcher.dispatch(SET_HUMOR_LEVEL, &json!({ "level": 40 }), &mut state, &mut outbox);
        assert_eq!(result["success"], true);
        assert_eq!(state.humor.value(), 40);

        let result = dispatcher.dispatch(SET_HUMOR_LEVEL, &json!({ "level": "65" }), &mut state, &mut outbox);
        assert_eq!(result["humorLevel"], 65);

        let result = dispatcher.dispatch(SET_HUMOR_LEVEL, &json!(r#"{"level": 10}"#), &mut state, &mut outbox);
        assert_eq!(result["humorLevel"], 10);
    }

    #[test]
    fn test_set_humor_level_rejects_bad_input() {
        let (dispatcher, mut state, mut outbox) = setup();
        for args in [json!({ "level": 101 }), json!({ "level": -1 }), json!({ "level": "loud" }), json!({})] {
            let result = dispatcher.dispatch(SET_HUMOR_LEVEL, &args, &mut state, &mut outbox);
            assert_eq!(result["success"], false);
            assert_eq!(result["error"], INVALID_HUMOR);
        }
        assert_eq!(state.humor.value(), 100);
    }

    #[test]
    fn test_unknown_function() {
        let (dispatcher, mut state, mut outbox) = setup();
        let result = dispatcher.dispatch("launch-rocket", &json!({}), &mut state, &mut outbox);
        assert_eq!(result, json!({ "success": false, "error": "unknown function" }));
    }

    #[test]
    fn test_close_session_appends_farewell() {
        let (dispatcher, mut state, mut outbox) = setup();
        let result = dispatcher.dispatch(CLOSE_SESSION, &Value::Null, &mut state, &mut outbox);

        assert_eq!(result["success"], true);
        assert_eq!(outbox.controls, vec![ControlRequest::Close]);
        assert_eq!(state.messages[0].kind, MessageKind::SessionClose);
    }

    #[test]
    fn test_tool_definitions_cover_every_function() {
        let names: Vec<&str> = tool_definitions().iter().map(|t| t.name).collect();
        for name in [INVOKE_PHQ2, INVOKE_PHQ9, PAUSE_SESSION, RESUME_SESSION, CLOSE_SESSION, SET_HUMOR_LEVEL] {
            assert!(names.contains(&name), "missing {}", name);
        }
    }
}
