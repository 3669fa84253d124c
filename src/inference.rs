//! Completion backends for the compiled prompt.
//!
//! Two backends satisfy [`CompletionClient`]:
//!
//! - [`OpenAiClient`] posts a single user message to an OpenAI-compatible
//!   `chat/completions` endpoint and returns the first choice.
//! - [`CommandClient`] pipes the prompt to a user-configured local command
//!   on stdin and returns its stdout. The model id is exported as
//!   `SLEEC_MODEL` so wrapper scripts can route it.
//!
//! Both return trimmed text; the analysis job turns any error into the
//! inline `"Error calling OpenAI: <cause>"` report.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Write;
use std::process::{Command, Stdio};
use std::time::Instant;
use thiserror::Error;

use crate::util::truncate_string;

/// Environment variable carrying the model id to a local LM command.
pub const MODEL_ENV: &str = "SLEEC_MODEL";

const MAX_STDERR_BYTES: usize = 2000;

/// Models offered for analysis.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
pub enum ModelId {
    #[default]
    #[serde(rename = "o3-mini")]
    #[value(name = "o3-mini")]
    O3Mini,
    #[serde(rename = "o1")]
    #[value(name = "o1")]
    O1,
    #[serde(rename = "o1-mini")]
    #[value(name = "o1-mini")]
    O1Mini,
    #[serde(rename = "gpt-4o")]
    #[value(name = "gpt-4o")]
    Gpt4o,
    #[serde(rename = "gpt-4.5-preview")]
    #[value(name = "gpt-4.5-preview")]
    Gpt45Preview,
}

impl ModelId {
    pub const ALL: [ModelId; 5] = [
        ModelId::O3Mini,
        ModelId::O1,
        ModelId::O1Mini,
        ModelId::Gpt4o,
        ModelId::Gpt45Preview,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ModelId::O3Mini => "o3-mini",
            ModelId::O1 => "o1",
            ModelId::O1Mini => "o1-mini",
            ModelId::Gpt4o => "gpt-4o",
            ModelId::Gpt45Preview => "gpt-4.5-preview",
        }
    }

    pub fn is_recommended(self) -> bool {
        self == ModelId::O3Mini
    }
}

impl fmt::Display for ModelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("API key not set (expected in ${0})")]
    MissingApiKey(String),
    #[error("request failed: {0}")]
    Request(String),
    #[error("failed to parse API response: {0}")]
    Parse(String),
    #[error("response contained no choices")]
    EmptyResponse,
    #[error("LM command failed: {0}")]
    Command(String),
}

/// `complete(model_id, prompt) -> text`
pub trait CompletionClient: Send + Sync {
    fn complete(&self, model: ModelId, prompt: &str) -> Result<String, InferenceError>;
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Client for an OpenAI-compatible chat completions endpoint.
#[derive(Debug, Clone)]
pub struct OpenAiClient {
    api_base: String,
    api_key: Option<String>,
    api_key_env: String,
}

impl OpenAiClient {
    /// Build a client reading its key from `api_key_env` now.
    pub fn from_env(api_base: &str, api_key_env: &str) -> Self {
        let api_key = std::env::var(api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty());
        Self {
            api_base: api_base.trim_end_matches('/').to_string(),
            api_key,
            api_key_env: api_key_env.to_string(),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.api_base)
    }
}

impl CompletionClient for OpenAiClient {
    fn complete(&self, model: ModelId, prompt: &str) -> Result<String, InferenceError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| InferenceError::MissingApiKey(self.api_key_env.clone()))?;
        let request = ChatRequest {
            model: model.as_str(),
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
        };

        let start = Instant::now();
        let agent = ureq::Agent::new_with_defaults();
        let response = agent
            .post(self.endpoint().as_str())
            .header("Authorization", format!("Bearer {api_key}"))
            .header("content-type", "application/json")
            .send_json(&request)
            .map_err(|err| InferenceError::Request(err.to_string()))?;
        let body: ChatResponse = response
            .into_body()
            .read_json()
            .map_err(|err| InferenceError::Parse(err.to_string()))?;
        tracing::info!(
            elapsed_ms = start.elapsed().as_millis(),
            model = %model,
            prompt_bytes = prompt.len(),
            choices = body.choices.len(),
            "chat completion returned"
        );

        first_choice_text(body)
    }
}

fn first_choice_text(body: ChatResponse) -> Result<String, InferenceError> {
    let choice = body
        .choices
        .into_iter()
        .next()
        .ok_or(InferenceError::EmptyResponse)?;
    Ok(choice.message.content.unwrap_or_default().trim().to_string())
}

/// Local LM command fed the prompt on stdin.
#[derive(Debug, Clone)]
pub struct CommandClient {
    command: String,
}

impl CommandClient {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }
}

impl CompletionClient for CommandClient {
    fn complete(&self, model: ModelId, prompt: &str) -> Result<String, InferenceError> {
        let args = shell_words::split(&self.command).map_err(|err| {
            InferenceError::Command(format!("parse LM command {:?}: {err}", self.command))
        })?;
        let Some((program, rest)) = args.split_first() else {
            return Err(InferenceError::Command("LM command is empty".to_string()));
        };

        let start = Instant::now();
        let mut child = Command::new(program)
            .args(rest)
            .env(MODEL_ENV, model.as_str())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|err| InferenceError::Command(format!("spawn {program}: {err}")))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(prompt.as_bytes())
                .map_err(|err| InferenceError::Command(format!("write prompt: {err}")))?;
        }

        let output = child
            .wait_with_output()
            .map_err(|err| InferenceError::Command(format!("wait for {program}: {err}")))?;
        tracing::info!(
            elapsed_ms = start.elapsed().as_millis(),
            model = %model,
            prompt_bytes = prompt.len(),
            response_bytes = output.stdout.len(),
            "lm command complete"
        );

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(InferenceError::Command(format!(
                "exited with status {}: {}",
                output.status,
                truncate_string(stderr.trim(), MAX_STDERR_BYTES)
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_body_is_single_user_message() {
        let request = ChatRequest {
            model: ModelId::Gpt4o.as_str(),
            messages: vec![ChatMessage {
                role: "user",
                content: "prompt text",
            }],
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "model": "gpt-4o",
                "messages": [{"role": "user", "content": "prompt text"}]
            })
        );
    }

    #[test]
    fn first_choice_is_trimmed() {
        let body: ChatResponse = serde_json::from_str(
            r#"{"choices": [
                {"message": {"role": "assistant", "content": "  Total Rule Issues Discovered: 0\n"}},
                {"message": {"role": "assistant", "content": "ignored"}}
            ]}"#,
        )
        .unwrap();
        assert_eq!(
            first_choice_text(body).unwrap(),
            "Total Rule Issues Discovered: 0"
        );
    }

    #[test]
    fn empty_choices_is_an_error() {
        let body: ChatResponse = serde_json::from_str(r#"{"choices": []}"#).unwrap();
        assert!(matches!(
            first_choice_text(body),
            Err(InferenceError::EmptyResponse)
        ));
    }

    #[test]
    fn missing_key_fails_before_any_request() {
        let client = OpenAiClient {
            api_base: "http://127.0.0.1:9".to_string(),
            api_key: None,
            api_key_env: "SLEEC_TEST_UNSET_KEY".to_string(),
        };
        let err = client.complete(ModelId::O3Mini, "x").unwrap_err();
        assert_eq!(
            err.to_string(),
            "API key not set (expected in $SLEEC_TEST_UNSET_KEY)"
        );
    }

    #[test]
    fn model_ids_round_trip_through_serde() {
        for model in ModelId::ALL {
            let json = serde_json::to_string(&model).unwrap();
            assert_eq!(json, format!("\"{}\"", model.as_str()));
            let back: ModelId = serde_json::from_str(&json).unwrap();
            assert_eq!(back, model);
        }
        assert_eq!(ModelId::default(), ModelId::O3Mini);
    }

    #[cfg(unix)]
    #[test]
    fn command_client_reads_stdout_and_sees_model() {
        let client = CommandClient::new(r#"sh -c 'cat >/dev/null; echo " report for $SLEEC_MODEL "'"#);
        let text = client.complete(ModelId::O1, "prompt").unwrap();
        assert_eq!(text, "report for o1");
    }

    #[cfg(unix)]
    #[test]
    fn command_client_nonzero_exit_is_error() {
        let client = CommandClient::new(r#"sh -c 'cat >/dev/null; echo quota >&2; exit 3'"#);
        let err = client.complete(ModelId::O1, "prompt").unwrap_err();
        assert!(err.to_string().contains("quota"), "{err}");
    }
}
