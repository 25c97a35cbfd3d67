//! Execute a target-server prompt against an OpenAI-compatible LLM
//! endpoint and report the reply alongside timing metadata.

use std::{sync::Arc, time::Instant};

use {
    anyhow::{Context, Result},
    async_trait::async_trait,
    regex::Regex,
    serde_json::{Value, json},
    tracing::{error, info, warn},
};

use crate::{
    connection::ConnectionManager,
    registry::ProbeTool,
    tools::{classify_remote_error, elapsed_ms, error_detail, prompts},
};

const LLM_REQUEST_TIMEOUT_SECS: u64 = 60;
const DEFAULT_MAX_TOKENS: u64 = 1000;
const DEFAULT_TEMPERATURE: f64 = 0.7;

struct LlmConfig {
    url: String,
    model: String,
    api_key: String,
    max_tokens: u64,
    temperature: f64,
}

impl LlmConfig {
    /// Resolve configuration from the tool argument, falling back to the
    /// `LLM_URL` / `LLM_MODEL_NAME` / `LLM_API_KEY` environment variables.
    fn resolve(overrides: &Value) -> Option<Self> {
        let pick = |key: &str, env: &str| {
            overrides
                .get(key)
                .and_then(Value::as_str)
                .map(str::to_string)
                .or_else(|| std::env::var(env).ok())
                .filter(|v| !v.is_empty())
        };

        Some(Self {
            url: pick("url", "LLM_URL")?,
            model: pick("model", "LLM_MODEL_NAME")?,
            api_key: pick("api_key", "LLM_API_KEY")?,
            max_tokens: overrides
                .get("max_tokens")
                .and_then(Value::as_u64)
                .unwrap_or(DEFAULT_MAX_TOKENS),
            temperature: overrides
                .get("temperature")
                .and_then(Value::as_f64)
                .unwrap_or(DEFAULT_TEMPERATURE),
        })
    }
}

/// Substitute `{name}` placeholders in message contents. Non-string values
/// are substituted as pretty-printed JSON.
fn fill_template_variables(messages: &mut [Value], variables: &Value) {
    let Some(variables) = variables.as_object() else {
        return;
    };
    for message in messages.iter_mut() {
        let Some(content) = message.get("content").and_then(Value::as_str) else {
            continue;
        };
        let mut content = content.to_string();
        for (name, value) in variables {
            let placeholder = format!("{{{name}}}");
            let replacement = match value {
                Value::String(s) => s.clone(),
                other => serde_json::to_string_pretty(other).unwrap_or_default(),
            };
            content = content.replace(&placeholder, &replacement);
        }
        message["content"] = json!(content);
    }
}

/// Best-effort extraction of a JSON body from an LLM reply: a fenced
/// ```json block wins, otherwise a reply that starts with `{` is tried
/// as a whole.
fn extract_json_response(text: &str) -> Value {
    if let Ok(fence) = Regex::new(r"(?s)```json\s*(.*?)\s*```") {
        if let Some(captures) = fence.captures(text) {
            if let Some(body) = captures.get(1) {
                match serde_json::from_str::<Value>(body.as_str()) {
                    Ok(parsed) => return parsed,
                    Err(e) => warn!(error = %e, "failed to parse fenced JSON from LLM reply"),
                }
            }
        }
    }
    if text.trim_start().starts_with('{') {
        if let Ok(parsed) = serde_json::from_str::<Value>(text) {
            return parsed;
        }
    }
    Value::Null
}

/// Retrieve a prompt, fill its variables, and run it through an LLM.
pub struct ExecutePromptWithLlmTool {
    manager: Arc<ConnectionManager>,
}

impl ExecutePromptWithLlmTool {
    pub fn new(manager: &Arc<ConnectionManager>) -> Self {
        Self {
            manager: Arc::clone(manager),
        }
    }
}

#[async_trait]
impl ProbeTool for ExecutePromptWithLlmTool {
    fn name(&self) -> &str {
        "execute_prompt_with_llm"
    }

    fn description(&self) -> &str {
        "Retrieve a prompt from the connected server, fill template variables, and execute it with an OpenAI-compatible LLM"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "prompt_name": {"type": "string", "description": "Name of the prompt to execute"},
                "prompt_arguments": {
                    "type": "object",
                    "description": "Arguments for prompt template rendering on the server",
                },
                "fill_variables": {
                    "type": "object",
                    "description": "Values substituted for {placeholder} variables in the rendered messages",
                },
                "llm_config": {
                    "type": "object",
                    "description": "LLM endpoint overrides: url, model, api_key, max_tokens, temperature",
                },
            },
            "required": ["prompt_name"],
        })
    }

    async fn execute(&self, params: Value) -> Result<Value> {
        let start = Instant::now();
        let prompt_name = params
            .get("prompt_name")
            .and_then(Value::as_str)
            .context("execute_prompt_with_llm requires a 'prompt_name' string argument")?
            .to_string();
        let prompt_arguments = params
            .get("prompt_arguments")
            .cloned()
            .unwrap_or(json!({}));

        let active = match self.manager.require_connection().await {
            Ok(active) => active,
            Err(e) => {
                return Ok(json!({
                    "success": false,
                    "error": error_detail(
                        "not_connected",
                        e.to_string(),
                        json!({"prompt_name": prompt_name}),
                        "Use connect_to_server() to establish a connection first",
                    ),
                    "metadata": {"request_time_ms": elapsed_ms(start)},
                }));
            },
        };

        // Phase 1: retrieve the rendered prompt from the target server.
        let prompt_start = Instant::now();
        let prompt = match active
            .client
            .get_prompt(&prompt_name, Some(prompt_arguments.clone()))
            .await
        {
            Ok(prompt) => prompt,
            Err(e) => {
                self.manager.increment_stat("errors");
                let error_type = classify_remote_error(&e.to_string(), "prompt_not_found");
                let suggestion = match error_type {
                    "prompt_not_found" => "Use list_prompts() to see the available prompts",
                    _ => "Check the target server logs for details",
                };
                error!(prompt = %prompt_name, error = %e, "prompt retrieval failed");
                return Ok(json!({
                    "success": false,
                    "error": error_detail(
                        error_type,
                        e.to_string(),
                        json!({"prompt_name": prompt_name}),
                        suggestion,
                    ),
                    "metadata": {"request_time_ms": elapsed_ms(start)},
                }));
            },
        };
        let prompt_retrieval_ms = elapsed_ms(prompt_start);

        let mut messages: Vec<Value> = prompt.messages.iter().map(prompts::shape_message).collect();
        if let Some(variables) = params.get("fill_variables") {
            fill_template_variables(&mut messages, variables);
        }

        // Phase 2: resolve the LLM endpoint.
        let overrides = params.get("llm_config").cloned().unwrap_or(json!({}));
        let Some(config) = LlmConfig::resolve(&overrides) else {
            return Ok(json!({
                "success": false,
                "error": error_detail(
                    "llm_config_error",
                    "Missing LLM configuration. Provide llm_config or set LLM_URL, LLM_MODEL_NAME, and LLM_API_KEY environment variables",
                    json!({
                        "has_url": overrides.get("url").is_some() || std::env::var("LLM_URL").is_ok(),
                        "has_model": overrides.get("model").is_some() || std::env::var("LLM_MODEL_NAME").is_ok(),
                        "has_api_key": overrides.get("api_key").is_some() || std::env::var("LLM_API_KEY").is_ok(),
                    }),
                    "Set LLM_URL, LLM_MODEL_NAME, and LLM_API_KEY in your .env file",
                ),
                "metadata": {"request_time_ms": elapsed_ms(start)},
            }));
        };

        let llm_request = json!({
            "model": config.model,
            "messages": messages,
            "max_tokens": config.max_tokens,
            "temperature": config.temperature,
        });

        // Phase 3: run the prompt through the LLM.
        let llm_start = Instant::now();
        let response = match post_chat_completions(&config, &llm_request).await {
            Ok(response) => response,
            Err(e) => {
                self.manager.increment_stat("errors");
                error!(prompt = %prompt_name, error = %e, "LLM request failed");
                return Ok(json!({
                    "success": false,
                    "error": error_detail(
                        "llm_request_error",
                        e.to_string(),
                        json!({"llm_endpoint": config.url}),
                        "Check LLM endpoint configuration and API key",
                    ),
                    "metadata": {"request_time_ms": elapsed_ms(start)},
                }));
            },
        };
        let llm_execution_ms = elapsed_ms(llm_start);

        let response_text = response["choices"][0]["message"]["content"]
            .as_str()
            .unwrap_or_default()
            .to_string();
        let parsed_response = extract_json_response(&response_text);

        info!(
            prompt = %prompt_name,
            prompt_retrieval_ms,
            llm_execution_ms,
            "prompt executed with LLM"
        );

        Ok(json!({
            "success": true,
            "prompt": {
                "name": prompt_name,
                "arguments": prompt_arguments,
                "message_count": messages.len(),
            },
            "llm_request": llm_request,
            "llm_response": {
                "text": response_text,
                "usage": response.get("usage").cloned().unwrap_or(json!({})),
                "model": response.get("model").cloned().unwrap_or(Value::Null),
            },
            "parsed_response": parsed_response,
            "metadata": {
                "prompt_retrieval_ms": prompt_retrieval_ms,
                "llm_execution_ms": llm_execution_ms,
                "total_time_ms": elapsed_ms(start),
                "server_url": active.state.server_url,
                "llm_endpoint": config.url,
                "llm_model": config.model,
            },
        }))
    }
}

/// POST the chat request to `{url}/chat/completions` and return the parsed
/// body. Non-200 statuses and transport failures surface as errors.
async fn post_chat_completions(config: &LlmConfig, request: &Value) -> Result<Value> {
    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(LLM_REQUEST_TIMEOUT_SECS))
        .build()
        .context("failed to build LLM HTTP client")?;

    let response = client
        .post(format!("{}/chat/completions", config.url))
        .header("Content-Type", "application/json")
        .header("Authorization", format!("Bearer {}", config.api_key))
        .json(request)
        .send()
        .await
        .context("LLM request failed")?;

    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    if !status.is_success() {
        let snippet: String = body.chars().take(500).collect();
        anyhow::bail!("LLM request failed with status {status}: {snippet}");
    }

    serde_json::from_str(&body).context("LLM returned a non-JSON body")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fill_template_variables() {
        let mut messages = vec![json!({"role": "user", "content": "Analyze {data} for {user}"})];
        fill_template_variables(
            &mut messages,
            &json!({"data": {"rows": 3}, "user": "alice"}),
        );
        let content = messages[0]["content"].as_str().unwrap();
        assert!(content.contains("alice"));
        assert!(content.contains("\"rows\": 3"));
        assert!(!content.contains("{user}"));
    }

    #[test]
    fn test_extract_json_from_fenced_block() {
        let text = "Here you go:\n```json\n{\"verdict\": \"pass\"}\n```\nDone.";
        assert_eq!(extract_json_response(text), json!({"verdict": "pass"}));
    }

    #[test]
    fn test_extract_json_from_bare_object() {
        assert_eq!(
            extract_json_response("{\"a\": 1}"),
            json!({"a": 1})
        );
    }

    #[test]
    fn test_extract_json_from_prose_is_null() {
        assert_eq!(extract_json_response("It looks healthy to me."), Value::Null);
    }

    #[test]
    fn test_llm_config_overrides_take_priority() {
        let config = LlmConfig::resolve(&json!({
            "url": "http://llm.local/v1",
            "model": "test-model",
            "api_key": "k",
            "max_tokens": 50,
        }))
        .unwrap();
        assert_eq!(config.url, "http://llm.local/v1");
        assert_eq!(config.max_tokens, 50);
        assert_eq!(config.temperature, DEFAULT_TEMPERATURE);
    }

    #[tokio::test]
    async fn test_not_connected_envelope() {
        let manager = Arc::new(ConnectionManager::default());
        let tool = ExecutePromptWithLlmTool::new(&manager);
        let out = tool
            .execute(json!({"prompt_name": "analyze"}))
            .await
            .unwrap();
        assert_eq!(out["success"], false);
        assert_eq!(out["error"]["error_type"], "not_connected");
        assert_eq!(out["error"]["details"]["prompt_name"], "analyze");
    }
}
