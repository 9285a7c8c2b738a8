use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use medchat_core::config::{AppConfig, LoadOptions, DEFAULT_CONFIG_FILE};
use secrecy::ExposeSecret;
use toml::Value;

use super::{CommandResult, ErrorClass};

pub const FAILURE_EXIT_CODE: u8 = 2;

pub fn run() -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "config",
                ErrorClass::ConfigValidation,
                &format!("config validation failed: {error}"),
                FAILURE_EXIT_CODE,
            )
        }
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let llm = &config.llm;
    let api_key = match &llm.api_key {
        Some(key) => redact_key(key.expose_secret()),
        None => "<unset>".to_string(),
    };
    let base_url = match &llm.base_url {
        Some(url) if !url.trim().is_empty() => url.clone(),
        _ => format!("{} (provider default)", llm.effective_base_url()),
    };

    let entries: [(&str, String, &[&str]); 15] = [
        ("llm.provider", llm.provider.as_str().to_string(), &["MEDCHAT_LLM_PROVIDER"]),
        ("llm.model", llm.model.clone(), &["MEDCHAT_LLM_MODEL"]),
        ("llm.base_url", base_url, &["MEDCHAT_LLM_BASE_URL"]),
        ("llm.api_key", api_key, &["MEDCHAT_LLM_API_KEY", "OPENAI_API_KEY"]),
        ("llm.timeout_secs", llm.timeout_secs.to_string(), &["MEDCHAT_LLM_TIMEOUT_SECS"]),
        ("llm.max_retries", llm.max_retries.to_string(), &["MEDCHAT_LLM_MAX_RETRIES"]),
        ("llm.temperature", llm.temperature.to_string(), &["MEDCHAT_LLM_TEMPERATURE"]),
        (
            "server.bind_address",
            config.server.bind_address.clone(),
            &["MEDCHAT_SERVER_BIND_ADDRESS"],
        ),
        ("server.port", config.server.port.to_string(), &["MEDCHAT_SERVER_PORT"]),
        (
            "server.request_timeout_secs",
            config.server.request_timeout_secs.to_string(),
            &["MEDCHAT_SERVER_REQUEST_TIMEOUT_SECS"],
        ),
        (
            "server.graceful_shutdown_secs",
            config.server.graceful_shutdown_secs.to_string(),
            &["MEDCHAT_SERVER_GRACEFUL_SHUTDOWN_SECS"],
        ),
        ("cache.ttl_secs", config.cache.ttl_secs.to_string(), &["MEDCHAT_CACHE_TTL_SECS"]),
        (
            "cache.sweep_interval_secs",
            config.cache.sweep_interval_secs.to_string(),
            &["MEDCHAT_CACHE_SWEEP_INTERVAL_SECS"],
        ),
        (
            "logging.level",
            config.logging.level.clone(),
            &["MEDCHAT_LOGGING_LEVEL", "MEDCHAT_LOG_LEVEL"],
        ),
        (
            "logging.format",
            format!("{:?}", config.logging.format).to_ascii_lowercase(),
            &["MEDCHAT_LOGGING_FORMAT", "MEDCHAT_LOG_FORMAT"],
        ),
    ];

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for (key, value, env_keys) in entries {
        let source =
            field_source(key, env_keys, config_file_doc.as_ref(), config_file_path.as_deref());
        lines.push(render_line(key, &value, source));
    }

    CommandResult::report(0, lines.join("\n"))
}

fn detect_config_path() -> Option<PathBuf> {
    [PathBuf::from(DEFAULT_CONFIG_FILE), PathBuf::from("config").join(DEFAULT_CONFIG_FILE)]
        .into_iter()
        .find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_keys: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key).is_some()) {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

/// Keeps a vendor prefix such as `sk-` so operators can tell keys apart.
fn redact_key(key: &str) -> String {
    let trimmed = key.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    if let Some((prefix, _)) = trimmed.split_once('-') {
        return format!("{prefix}-***");
    }

    "<redacted>".to_string()
}
