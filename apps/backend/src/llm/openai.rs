use std::time::Instant;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::OpenAiConfig;
use crate::models::{ProblemCandidate, RankedItem};
use crate::services::prompt;

use super::provider::{ErrorClass, PromptOptions, RankOutcome, RankProvider};

/// Ranking provider for any OpenAI-compatible chat-completions endpoint.
pub struct OpenAiProvider {
    config: OpenAiConfig,
    client: reqwest::Client,
}

impl OpenAiProvider {
    pub fn new(config: OpenAiConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    response_format: ResponseFormat,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    total_tokens: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct RankPayload {
    items: Vec<RankedItem>,
}

/// Find the JSON object in the content (handles ```json fences).
fn extract_json(text: &str) -> &str {
    if let Some(start) = text.find('{') {
        if let Some(end) = text.rfind('}') {
            return &text[start..=end];
        }
    }
    text
}

fn well_formed(item: &RankedItem) -> bool {
    item.confidence.is_finite() && item.score.is_finite() && !item.reason.is_empty()
}

#[async_trait]
impl RankProvider for OpenAiProvider {
    fn name(&self) -> &'static str {
        "openai"
    }

    async fn rank(&self, candidates: &[ProblemCandidate], options: &PromptOptions) -> RankOutcome {
        let api_key = match std::env::var(&self.config.api_key_env) {
            Ok(key) if !key.is_empty() => key,
            _ => {
                return RankOutcome::failed(
                    self.name(),
                    ErrorClass::ApiKeyMissing,
                    format!("{} is not set", self.config.api_key_env),
                    0,
                );
            }
        };

        let messages = prompt::build(&options.prompt_version, candidates, options);
        let request = ChatRequest {
            model: self.config.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: messages.system,
                },
                ChatMessage {
                    role: "user",
                    content: messages.user,
                },
            ],
            temperature: 0.0,
            response_format: ResponseFormat {
                kind: "json_object",
            },
        };

        let started = Instant::now();
        let response = match self
            .client
            .post(format!("{}/chat/completions", self.config.base_url))
            .bearer_auth(&api_key)
            .json(&request)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                let class = if e.is_timeout() {
                    ErrorClass::Timeout
                } else {
                    ErrorClass::Network
                };
                return RankOutcome::failed(
                    self.name(),
                    class,
                    e.to_string(),
                    started.elapsed().as_millis() as u64,
                );
            }
        };
        let latency_ms = started.elapsed().as_millis() as u64;

        let status = response.status();
        if !status.is_success() {
            let class = if status.as_u16() == 429 {
                ErrorClass::RateLimited
            } else if status.is_server_error() {
                ErrorClass::Http5xx
            } else {
                ErrorClass::Http4xx
            };
            let body = response.text().await.unwrap_or_default();
            return RankOutcome::failed(
                self.name(),
                class,
                format!("status {}: {}", status, body),
                latency_ms,
            );
        }

        let chat: ChatResponse = match response.json().await {
            Ok(chat) => chat,
            Err(e) => {
                return RankOutcome::failed(
                    self.name(),
                    ErrorClass::ParseError,
                    e.to_string(),
                    latency_ms,
                );
            }
        };

        if let Some(tokens) = chat.usage.as_ref().and_then(|u| u.total_tokens) {
            metrics::counter!("llm_provider_tokens_total", "provider" => self.name())
                .increment(tokens);
        }

        let content = match chat.choices.first() {
            Some(choice) => choice.message.content.as_str(),
            None => {
                return RankOutcome::failed(
                    self.name(),
                    ErrorClass::ParseError,
                    "no choices in response",
                    latency_ms,
                );
            }
        };

        let payload: RankPayload = match serde_json::from_str(extract_json(content)) {
            Ok(payload) => payload,
            Err(e) => {
                return RankOutcome::failed(
                    self.name(),
                    ErrorClass::ParseError,
                    e.to_string(),
                    latency_ms,
                );
            }
        };

        let items: Vec<RankedItem> = payload
            .items
            .into_iter()
            .filter(well_formed)
            .map(|mut item| {
                item.confidence = item.confidence.clamp(0.0, 1.0);
                item.score = item.score.clamp(0.0, 1.0);
                item
            })
            .collect();

        if items.is_empty() {
            return RankOutcome::failed(
                self.name(),
                ErrorClass::Other,
                "no well-formed items in response",
                latency_ms,
            );
        }

        RankOutcome::ranked(
            self.name(),
            Some(self.config.model.clone()),
            items,
            latency_ms,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_json_handles_fences() {
        let fenced = "```json\n{\"items\": []}\n```";
        assert_eq!(extract_json(fenced), "{\"items\": []}");

        let raw = "{\"items\": []}";
        assert_eq!(extract_json(raw), raw);
    }

    #[test]
    fn test_rank_payload_parses_items() {
        let content = r#"{"items":[
            {"problemId": 3, "reason": "overdue", "confidence": 0.8, "score": 0.9},
            {"problemId": 5, "reason": "weak topic", "confidence": 0.6, "score": 0.7,
             "strategy": "refresh"}
        ]}"#;
        let payload: RankPayload = serde_json::from_str(content).unwrap();
        assert_eq!(payload.items.len(), 2);
        assert_eq!(payload.items[0].problem_id, 3);
        assert_eq!(payload.items[1].strategy.as_deref(), Some("refresh"));
    }

    #[test]
    fn test_malformed_items_are_dropped() {
        let item = RankedItem {
            problem_id: 1,
            reason: String::new(),
            confidence: 0.5,
            score: 0.5,
            strategy: None,
        };
        assert!(!well_formed(&item));

        let item = RankedItem {
            problem_id: 1,
            reason: "ok".to_string(),
            confidence: f64::NAN,
            score: 0.5,
            strategy: None,
        };
        assert!(!well_formed(&item));
    }
}
