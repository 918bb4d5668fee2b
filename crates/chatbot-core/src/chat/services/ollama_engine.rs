use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;
use tracing::{debug, info};

use super::inference::{
    Device, EngineError, GenerationConfig, InferenceBackend, InferencePipeline, StreamControl,
};

#[derive(Debug, Deserialize)]
struct OllamaModel {
    name: String,
    #[serde(default)]
    model: String,
}

#[derive(Debug, Deserialize)]
struct OllamaTagsResponse {
    #[serde(default)]
    models: Vec<OllamaModel>,
}

#[derive(Debug, Serialize)]
struct GenerateOptions {
    num_predict: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_gpu: Option<u32>,
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    context: Option<&'a [i64]>,
    options: GenerateOptions,
}

/// One line of the NDJSON body returned by `/api/generate`.
#[derive(Debug, Deserialize)]
struct GenerateChunk {
    #[serde(default)]
    response: String,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    context: Option<Vec<i64>>,
    #[serde(default)]
    error: Option<String>,
}

/// Backend talking to a local Ollama server.
///
/// Pipelines run on blocking threads and drive their HTTP requests through the
/// runtime handle captured here.
pub struct OllamaBackend {
    base_url: String,
    client: reqwest::Client,
    runtime: Handle,
}

impl OllamaBackend {
    pub fn new(base_url: impl Into<String>, runtime: Handle) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
            runtime,
        }
    }

    async fn installed_models(&self) -> Result<Vec<String>, EngineError> {
        let url = format!("{}/api/tags", self.base_url);
        let response = self.client.get(&url).send().await?;

        if !response.status().is_success() {
            return Err(EngineError::Status {
                status: response.status().as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }

        let tags: OllamaTagsResponse = response.json().await?;
        Ok(tags
            .models
            .into_iter()
            .flat_map(|m| [m.name, m.model])
            .filter(|name| !name.is_empty())
            .collect())
    }
}

/// `gemma3` is listed by Ollama as `gemma3:latest`.
fn model_matches(installed: &str, wanted: &str) -> bool {
    installed == wanted || (!wanted.contains(':') && installed == format!("{wanted}:latest"))
}

impl InferenceBackend for OllamaBackend {
    fn create(
        &self,
        model_id: &str,
        device: Device,
    ) -> Result<Box<dyn InferencePipeline>, EngineError> {
        let installed = self.runtime.block_on(self.installed_models())?;
        debug!(count = installed.len(), "Discovered Ollama models");

        if !installed.iter().any(|name| model_matches(name, model_id)) {
            return Err(EngineError::ModelNotFound {
                model: model_id.to_string(),
            });
        }

        info!(model = %model_id, device = %device, url = %self.base_url, "Using Ollama model");
        Ok(Box::new(OllamaPipeline {
            base_url: self.base_url.clone(),
            client: self.client.clone(),
            runtime: self.runtime.clone(),
            model: model_id.to_string(),
            device,
            context: None,
        }))
    }
}

pub struct OllamaPipeline {
    base_url: String,
    client: reqwest::Client,
    runtime: Handle,
    model: String,
    device: Device,
    /// Conversation state returned by the previous turn.
    context: Option<Vec<i64>>,
}

impl OllamaPipeline {
    async fn stream_generate(
        &mut self,
        prompt: &str,
        config: &GenerationConfig,
        on_token: &mut dyn FnMut(&str) -> StreamControl,
    ) -> Result<(), EngineError> {
        let url = format!("{}/api/generate", self.base_url);
        let request = GenerateRequest {
            model: &self.model,
            prompt,
            stream: true,
            context: self.context.as_deref(),
            options: GenerateOptions {
                num_predict: config.max_new_tokens,
                num_gpu: match self.device {
                    Device::Cpu => Some(0),
                    Device::Gpu => None,
                },
            },
        };

        let response = self.client.post(&url).json(&request).send().await?;
        if !response.status().is_success() {
            return Err(EngineError::Status {
                status: response.status().as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }

        let mut body = response.bytes_stream();
        // Chunks may split a line, or a UTF-8 sequence, anywhere
        let mut buffer: Vec<u8> = Vec::new();

        while let Some(chunk) = body.next().await {
            buffer.extend_from_slice(&chunk?);

            while let Some(newline) = buffer.iter().position(|b| *b == b'\n') {
                let line: Vec<u8> = buffer.drain(..=newline).collect();
                match self.handle_line(&line, on_token)? {
                    LineResult::Continue => {}
                    LineResult::Done | LineResult::Stopped => return Ok(()),
                }
            }
        }

        // Final line without a trailing newline
        if !buffer.is_empty() {
            self.handle_line(&buffer, on_token)?;
        }
        Ok(())
    }

    fn handle_line(
        &mut self,
        line: &[u8],
        on_token: &mut dyn FnMut(&str) -> StreamControl,
    ) -> Result<LineResult, EngineError> {
        let line = std::str::from_utf8(line)
            .map_err(|e| EngineError::Protocol(format!("Invalid UTF-8 in stream: {e}")))?
            .trim();
        if line.is_empty() {
            return Ok(LineResult::Continue);
        }

        let chunk: GenerateChunk = serde_json::from_str(line)
            .map_err(|e| EngineError::Protocol(format!("Invalid stream line: {e}")))?;

        if let Some(error) = chunk.error {
            return Err(EngineError::Protocol(error));
        }

        if !chunk.response.is_empty() && on_token(&chunk.response) == StreamControl::Stop {
            debug!("Token consumer requested stop");
            return Ok(LineResult::Stopped);
        }

        if chunk.done {
            if let Some(context) = chunk.context {
                self.context = Some(context);
            }
            return Ok(LineResult::Done);
        }
        Ok(LineResult::Continue)
    }
}

enum LineResult {
    Continue,
    Done,
    Stopped,
}

impl InferencePipeline for OllamaPipeline {
    fn start_chat(&mut self) -> Result<(), EngineError> {
        self.context = None;
        Ok(())
    }

    fn generate(
        &mut self,
        prompt: &str,
        config: &GenerationConfig,
        on_token: &mut dyn FnMut(&str) -> StreamControl,
    ) -> Result<(), EngineError> {
        let runtime = self.runtime.clone();
        runtime.block_on(self.stream_generate(prompt, config, on_token))
    }

    fn finish_chat(&mut self) -> Result<(), EngineError> {
        self.context = None;
        Ok(())
    }
}
