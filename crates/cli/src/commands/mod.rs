pub mod config;
pub mod doctor;

use serde::Serialize;

/// Text a subcommand prints and the exit code the process ends with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResult {
    pub exit_code: u8,
    pub output: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    ConfigValidation,
    Serialization,
}

/// One-line JSON error printed instead of a command's normal report.
#[derive(Debug, Serialize)]
struct FailureEnvelope<'a> {
    command: &'a str,
    status: &'static str,
    error_class: ErrorClass,
    message: &'a str,
}

impl CommandResult {
    pub fn report(exit_code: u8, output: impl Into<String>) -> Self {
        Self { exit_code, output: output.into() }
    }

    pub fn failure(command: &str, error_class: ErrorClass, message: &str, exit_code: u8) -> Self {
        let envelope = FailureEnvelope { command, status: "error", error_class, message };
        let output = serde_json::to_string(&envelope).unwrap_or_else(|_| {
            format!(
                "{{\"command\":\"{}\",\"status\":\"error\",\"error_class\":\"serialization\",\"message\":\"{}\"}}",
                escape_json(command),
                escape_json(message)
            )
        });
        Self::report(exit_code, output)
    }
}

fn escape_json(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
