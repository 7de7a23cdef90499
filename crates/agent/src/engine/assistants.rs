use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};

use helmsman_core::config::{EngineConfig, EngineFlavour};
use helmsman_core::domain::run::{Run, RunId, RunStatus, ToolCall, ToolOutput};
use helmsman_core::domain::thread::ThreadId;

use super::{ConversationEngine, EngineError};
use crate::capabilities::ToolDefinition;
use crate::prompt::ASSISTANT_INSTRUCTIONS;

const OPENAI_BETA_HEADER: &str = "OpenAI-Beta";
const OPENAI_BETA_VALUE: &str = "assistants=v2";
const AZURE_KEY_HEADER: &str = "api-key";

/// Assistants-style thread/run engine over HTTP.
///
/// `openai` authenticates with a bearer token and the assistants beta header;
/// `azure_openai` uses an `api-key` header and an `api-version` query parameter.
pub struct AssistantsEngine {
    http: reqwest::Client,
    flavour: EngineFlavour,
    base_url: String,
    api_key: SecretString,
    api_version: Option<String>,
    assistant_id: String,
}

impl AssistantsEngine {
    fn build(config: &EngineConfig) -> Result<Self, EngineError> {
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| EngineError::Configuration("engine.api_key is required".to_string()))?;
        let base_url = config
            .base_url
            .as_deref()
            .map(|url| url.trim_end_matches('/').to_string())
            .filter(|url| !url.is_empty())
            .ok_or_else(|| EngineError::Configuration("engine.base_url is required".to_string()))?;
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|err| EngineError::Configuration(err.to_string()))?;

        Ok(Self {
            http,
            flavour: config.flavour,
            base_url,
            api_key,
            api_version: config.api_version.clone(),
            assistant_id: String::new(),
        })
    }

    /// Resolves the assistant named `config.assistant_name`, creating it when
    /// absent, then refreshes its instructions and function tools.
    pub async fn connect(
        config: &EngineConfig,
        tools: Vec<ToolDefinition>,
    ) -> Result<Self, EngineError> {
        let mut engine = Self::build(config)?;

        let listing = engine
            .send(engine.request(reqwest::Method::GET, "assistants").query(&[("limit", "100")]))
            .await?;
        let assistant_id = match find_assistant(&listing, &config.assistant_name) {
            Some(id) => id,
            None => {
                let created = engine
                    .send(engine.request(reqwest::Method::POST, "assistants").json(&json!({
                        "name": config.assistant_name,
                        "model": config.model,
                    })))
                    .await?;
                tracing::info!(
                    event_name = "agent.engine.assistant_created",
                    assistant_name = %config.assistant_name,
                    "created assistant"
                );
                string_field(&created, "id")?
            }
        };

        engine
            .send(
                engine
                    .request(reqwest::Method::POST, &format!("assistants/{assistant_id}"))
                    .json(&assistant_update(&tools)),
            )
            .await?;

        tracing::info!(
            event_name = "agent.engine.connected",
            assistant_id = %assistant_id,
            tools = tools.len(),
            "conversation engine ready"
        );
        engine.assistant_id = assistant_id;
        Ok(engine)
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let request = self.http.request(method, format!("{}/{}", self.base_url, path));
        match self.flavour {
            EngineFlavour::OpenAi => request
                .bearer_auth(self.api_key.expose_secret())
                .header(OPENAI_BETA_HEADER, OPENAI_BETA_VALUE),
            EngineFlavour::AzureOpenAi => {
                let request = request.header(AZURE_KEY_HEADER, self.api_key.expose_secret());
                match &self.api_version {
                    Some(version) => request.query(&[("api-version", version.as_str())]),
                    None => request,
                }
            }
        }
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<Value, EngineError> {
        let response =
            request.send().await.map_err(|err| EngineError::Transport(err.to_string()))?;
        let status = response.status();
        let body = response.text().await.map_err(|err| EngineError::Transport(err.to_string()))?;

        if !status.is_success() {
            return Err(EngineError::Status { status: status.as_u16(), body });
        }
        serde_json::from_str(&body).map_err(|err| EngineError::Decode(err.to_string()))
    }
}

#[async_trait]
impl ConversationEngine for AssistantsEngine {
    async fn create_thread(&self) -> Result<ThreadId, EngineError> {
        let thread = self.send(self.request(reqwest::Method::POST, "threads").json(&json!({}))).await?;
        string_field(&thread, "id").map(ThreadId)
    }

    async fn add_user_message(&self, thread: &ThreadId, content: &str) -> Result<(), EngineError> {
        self.send(
            self.request(reqwest::Method::POST, &format!("threads/{thread}/messages"))
                .json(&json!({ "role": "user", "content": content })),
        )
        .await?;
        Ok(())
    }

    async fn create_run(&self, thread: &ThreadId) -> Result<Run, EngineError> {
        let run = self
            .send(
                self.request(reqwest::Method::POST, &format!("threads/{thread}/runs"))
                    .json(&json!({ "assistant_id": self.assistant_id })),
            )
            .await?;
        decode_run(&run)
    }

    async fn retrieve_run(&self, thread: &ThreadId, run: &RunId) -> Result<Run, EngineError> {
        let path = format!("threads/{thread}/runs/{}", run.as_str());
        decode_run(&self.send(self.request(reqwest::Method::GET, &path)).await?)
    }

    async fn submit_tool_outputs(
        &self,
        thread: &ThreadId,
        run: &RunId,
        outputs: &[ToolOutput],
    ) -> Result<Run, EngineError> {
        let path = format!("threads/{thread}/runs/{}/submit_tool_outputs", run.as_str());
        let body = json!({
            "tool_outputs": outputs
                .iter()
                .map(|output| json!({ "tool_call_id": output.tool_call_id, "output": output.output }))
                .collect::<Vec<_>>(),
        });
        decode_run(&self.send(self.request(reqwest::Method::POST, &path).json(&body)).await?)
    }

    async fn cancel_run(&self, thread: &ThreadId, run: &RunId) -> Result<(), EngineError> {
        let path = format!("threads/{thread}/runs/{}/cancel", run.as_str());
        self.send(self.request(reqwest::Method::POST, &path).json(&json!({}))).await?;
        Ok(())
    }

    async fn latest_reply(&self, thread: &ThreadId, run: &RunId) -> Result<String, EngineError> {
        let messages = self
            .send(
                self.request(reqwest::Method::GET, &format!("threads/{thread}/messages")).query(&[
                    ("run_id", run.as_str()),
                    ("order", "desc"),
                    ("limit", "1"),
                ]),
            )
            .await?;
        decode_reply(&messages).ok_or_else(|| EngineError::EmptyReply(run.as_str().to_string()))
    }
}

fn string_field(value: &Value, field: &str) -> Result<String, EngineError> {
    value
        .get(field)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| EngineError::Decode(format!("missing `{field}`")))
}

fn find_assistant(listing: &Value, name: &str) -> Option<String> {
    listing.get("data")?.as_array()?.iter().find_map(|assistant| {
        (assistant.get("name").and_then(Value::as_str) == Some(name))
            .then(|| assistant.get("id").and_then(Value::as_str).map(str::to_string))
            .flatten()
    })
}

fn assistant_update(tools: &[ToolDefinition]) -> Value {
    json!({
        "instructions": ASSISTANT_INSTRUCTIONS,
        "tools": tools
            .iter()
            .map(|tool| json!({
                "type": "function",
                "function": {
                    "name": tool.name,
                    "description": tool.description,
                    "parameters": tool.parameters,
                },
            }))
            .collect::<Vec<_>>(),
    })
}

fn decode_run(value: &Value) -> Result<Run, EngineError> {
    let raw_status = string_field(value, "status")?;
    let status = RunStatus::parse(&raw_status)
        .ok_or_else(|| EngineError::Decode(format!("unknown run status `{raw_status}`")))?;

    let required_action = match value
        .pointer("/required_action/submit_tool_outputs/tool_calls")
        .and_then(Value::as_array)
    {
        Some(calls) => calls.iter().map(decode_tool_call).collect::<Result<Vec<_>, _>>()?,
        None => Vec::new(),
    };

    let last_error = value
        .pointer("/last_error/message")
        .and_then(Value::as_str)
        .map(str::to_string);

    Ok(Run {
        id: RunId(string_field(value, "id")?),
        thread_id: ThreadId(string_field(value, "thread_id")?),
        status,
        required_action,
        last_error,
    })
}

fn decode_tool_call(value: &Value) -> Result<ToolCall, EngineError> {
    let function = value
        .get("function")
        .ok_or_else(|| EngineError::Decode("tool call without `function`".to_string()))?;
    Ok(ToolCall {
        id: string_field(value, "id")?,
        capability_name: string_field(function, "name")?,
        arguments_json: function
            .get("arguments")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
    })
}

fn decode_reply(messages: &Value) -> Option<String> {
    let message = messages
        .get("data")?
        .as_array()?
        .iter()
        .find(|message| message.get("role").and_then(Value::as_str) == Some("assistant"))?;

    let text = message
        .get("content")?
        .as_array()?
        .iter()
        .filter_map(|part| part.pointer("/text/value").and_then(Value::as_str))
        .collect::<Vec<_>>()
        .join("\n");

    (!text.trim().is_empty()).then_some(text)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use helmsman_core::config::AppConfig;
    use helmsman_core::domain::run::RunStatus;

    use super::{assistant_update, decode_reply, decode_run, find_assistant, AssistantsEngine};
    use crate::capabilities::ToolDefinition;
    use crate::engine::EngineError;

    #[test]
    fn decodes_requires_action_run() {
        let run = decode_run(&json!({
            "id": "run_1",
            "object": "thread.run",
            "thread_id": "thread_1",
            "status": "requires_action",
            "required_action": {
                "type": "submit_tool_outputs",
                "submit_tool_outputs": {
                    "tool_calls": [
                        {"id": "call_a", "type": "function", "function": {"name": "listPods", "arguments": "{\"namespaceName\":\"prod\"}"}},
                        {"id": "call_b", "type": "function", "function": {"name": "wait", "arguments": "{\"time\":1}"}}
                    ]
                }
            },
            "last_error": null
        }))
        .expect("run");

        assert_eq!(run.id.as_str(), "run_1");
        assert_eq!(run.thread_id.as_str(), "thread_1");
        assert_eq!(run.status, RunStatus::RequiresAction);
        assert_eq!(run.required_action.len(), 2);
        assert_eq!(run.required_action[0].capability_name, "listPods");
        assert_eq!(run.required_action[1].arguments_json, "{\"time\":1}");
        assert_eq!(run.last_error, None);
    }

    #[test]
    fn decodes_failed_run_with_error_message() {
        let run = decode_run(&json!({
            "id": "run_2",
            "thread_id": "thread_1",
            "status": "failed",
            "last_error": {"code": "rate_limit_exceeded", "message": "quota exhausted"}
        }))
        .expect("run");

        assert_eq!(run.status, RunStatus::Failed);
        assert!(run.required_action.is_empty());
        assert_eq!(run.last_error.as_deref(), Some("quota exhausted"));
    }

    #[test]
    fn unknown_status_is_a_decode_error() {
        let err = decode_run(&json!({"id": "r", "thread_id": "t", "status": "paused"}))
            .expect_err("unknown status");
        assert!(matches!(err, EngineError::Decode(message) if message.contains("paused")));
    }

    #[test]
    fn reply_joins_text_parts_of_newest_assistant_message() {
        let messages = json!({
            "data": [{
                "role": "assistant",
                "content": [
                    {"type": "text", "text": {"value": "3 pods are running.", "annotations": []}},
                    {"type": "text", "text": {"value": "None are restarting.", "annotations": []}}
                ]
            }]
        });
        assert_eq!(
            decode_reply(&messages).as_deref(),
            Some("3 pods are running.\nNone are restarting.")
        );
        assert_eq!(decode_reply(&json!({"data": []})), None);
    }

    #[test]
    fn finds_assistant_by_name() {
        let listing = json!({"data": [
            {"id": "asst_1", "name": "other"},
            {"id": "asst_2", "name": "helmsman-sre-agent"}
        ]});
        assert_eq!(find_assistant(&listing, "helmsman-sre-agent").as_deref(), Some("asst_2"));
        assert_eq!(find_assistant(&listing, "missing"), None);
    }

    #[test]
    fn assistant_update_advertises_function_tools() {
        let update = assistant_update(&[ToolDefinition {
            name: "wait".to_string(),
            description: "Wait".to_string(),
            parameters: json!({"type": "object"}),
        }]);
        assert_eq!(update["tools"][0]["type"], "function");
        assert_eq!(update["tools"][0]["function"]["name"], "wait");
        assert!(update["instructions"].as_str().is_some_and(|text| !text.is_empty()));
    }

    #[test]
    fn build_requires_api_key() {
        let config = AppConfig::default();
        let err = AssistantsEngine::build(&config.engine).err().expect("missing key");
        assert!(matches!(err, EngineError::Configuration(_)));
    }
}
