use medchat_agent::{LlmClient, OpenAiClient};
use medchat_core::config::{AppConfig, LlmProvider, LoadOptions};
use serde::Serialize;

use super::{CommandResult, ErrorClass};

pub const FAILURE_EXIT_CODE: u8 = 3;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

pub fn run(json_output: bool) -> CommandResult {
    let report = build_report();
    let exit_code = if report.overall_status == CheckStatus::Pass { 0 } else { FAILURE_EXIT_CODE };

    if !json_output {
        return CommandResult::report(exit_code, render_human(&report));
    }

    match serde_json::to_string_pretty(&report) {
        Ok(output) => CommandResult::report(exit_code, output),
        Err(error) => CommandResult::failure(
            "doctor",
            ErrorClass::Serialization,
            &format!("doctor report serialization failed: {error}"),
            FAILURE_EXIT_CODE,
        ),
    }
}

fn build_report() -> DoctorReport {
    let mut checks = Vec::new();

    match AppConfig::load_unvalidated(LoadOptions::default()) {
        Ok(config) => {
            checks.push(check_validation(&config));
            checks.push(check_llm_credentials(&config));
            checks.push(check_llm_client(&config));
            checks.push(check_cache_settings(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                details: error.to_string(),
            });
            for name in ["llm_credentials", "llm_client", "cache_settings"] {
                checks.push(DoctorCheck {
                    name,
                    status: CheckStatus::Skipped,
                    details: "skipped because configuration did not load".to_string(),
                });
            }
        }
    }

    let all_pass = checks.iter().all(|check| check.status == CheckStatus::Pass);
    let overall_status = if all_pass { CheckStatus::Pass } else { CheckStatus::Fail };
    let summary = if all_pass {
        "doctor: all readiness checks passed".to_string()
    } else {
        "doctor: one or more readiness checks failed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

fn check_validation(config: &AppConfig) -> DoctorCheck {
    let failures = config.validation_failures();
    if failures.is_empty() {
        return DoctorCheck {
            name: "config_validation",
            status: CheckStatus::Pass,
            details: "configuration loaded and validated".to_string(),
        };
    }

    let details = failures.iter().map(ToString::to_string).collect::<Vec<_>>().join("; ");
    DoctorCheck { name: "config_validation", status: CheckStatus::Fail, details }
}

fn check_llm_credentials(config: &AppConfig) -> DoctorCheck {
    let provider = config.llm.provider.as_str();
    match (config.llm.provider, config.llm.has_api_key()) {
        (_, true) => DoctorCheck {
            name: "llm_credentials",
            status: CheckStatus::Pass,
            details: format!("api key present for provider `{provider}`"),
        },
        (LlmProvider::Ollama, false) => DoctorCheck {
            name: "llm_credentials",
            status: CheckStatus::Pass,
            details: "local provider `ollama` needs no api key".to_string(),
        },
        (LlmProvider::OpenAi, false) => DoctorCheck {
            name: "llm_credentials",
            status: CheckStatus::Fail,
            details: "no api key for provider `openai`; set MEDCHAT_LLM_API_KEY or OPENAI_API_KEY"
                .to_string(),
        },
    }
}

fn check_llm_client(config: &AppConfig) -> DoctorCheck {
    match OpenAiClient::from_config(&config.llm) {
        Ok(client) => DoctorCheck {
            name: "llm_client",
            status: CheckStatus::Pass,
            details: format!("client ready for {}", client.describe()),
        },
        Err(error) => DoctorCheck {
            name: "llm_client",
            status: CheckStatus::Fail,
            details: format!("failed to build llm client: {error}"),
        },
    }
}

// A sweep interval longer than the TTL lets expired conversations sit in memory
// for more than one TTL before eviction.
fn check_cache_settings(config: &AppConfig) -> DoctorCheck {
    let cache = &config.cache;
    if cache.ttl_secs == 0 || cache.sweep_interval_secs == 0 {
        return DoctorCheck {
            name: "cache_settings",
            status: CheckStatus::Fail,
            details: "cache.ttl_secs and cache.sweep_interval_secs must be positive".to_string(),
        };
    }
    if cache.sweep_interval_secs > cache.ttl_secs {
        return DoctorCheck {
            name: "cache_settings",
            status: CheckStatus::Fail,
            details: format!(
                "cache.sweep_interval_secs ({}) exceeds cache.ttl_secs ({})",
                cache.sweep_interval_secs, cache.ttl_secs
            ),
        };
    }

    DoctorCheck {
        name: "cache_settings",
        status: CheckStatus::Pass,
        details: format!(
            "ttl {}s, sweep every {}s",
            cache.ttl_secs, cache.sweep_interval_secs
        ),
    }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}
