//! Turn-based document chat
//!
//! The text-chat collaborator: an ordered, role-tagged message history plus
//! a system instruction grounded in a bounded prefix of the document, sent
//! to the generation endpoint, returning one response text.

use serde::{Deserialize, Serialize};

use crate::config::AppConfig;
use crate::constants::{CHAT_GROUNDING_CHARS, GENERATE_API_BASE};
use crate::error::{ChatError, ConfigError};
use crate::knowledge::Knowledge;

/// Who said a chat turn
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Model,
}

impl Role {
    fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Model => "model",
        }
    }
}

/// One turn of the conversation
#[derive(Debug, Clone)]
pub struct ChatTurn {
    pub role: Role,
    pub text: String,
}

impl ChatTurn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
        }
    }

    pub fn model(text: impl Into<String>) -> Self {
        Self {
            role: Role::Model,
            text: text.into(),
        }
    }
}

/// Client for the turn-based generation API
pub struct ChatClient {
    http: reqwest::Client,
    api_key: String,
    model: String,
}

impl ChatClient {
    pub fn new(config: &AppConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            http: reqwest::Client::new(),
            api_key: config.require_api_key()?,
            model: config.chat_model.clone(),
        })
    }

    /// Ask for the next model response given the history so far.
    pub async fn respond(
        &self,
        knowledge: &Knowledge,
        history: &[ChatTurn],
    ) -> Result<String, ChatError> {
        let request = GenerateRequest {
            contents: history
                .iter()
                .map(|turn| RequestContent {
                    role: turn.role.as_str().to_string(),
                    parts: vec![TextPart {
                        text: turn.text.clone(),
                    }],
                })
                .collect(),
            system_instruction: RequestSystemInstruction {
                parts: vec![TextPart {
                    text: chat_instruction(knowledge),
                }],
            },
        };

        let url = format!("{}/{}:generateContent", GENERATE_API_BASE, self.model);
        let response = self
            .http
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(&request)
            .send()
            .await
            .map_err(|e| ChatError::Request(e.to_string()))?
            .error_for_status()
            .map_err(|e| ChatError::Request(e.to_string()))?
            .json::<GenerateResponse>()
            .await
            .map_err(|e| ChatError::Request(e.to_string()))?;

        response
            .candidates
            .into_iter()
            .next()
            .and_then(|candidate| candidate.content)
            .map(|content| {
                content
                    .parts
                    .into_iter()
                    .filter_map(|part| part.text)
                    .collect::<Vec<_>>()
                    .join("")
            })
            .filter(|text| !text.is_empty())
            .ok_or(ChatError::EmptyResponse)
    }
}

/// The chat system instruction with its bounded grounding prefix
fn chat_instruction(knowledge: &Knowledge) -> String {
    format!(
        "You are a friendly, encouraging study tutor. Answer questions about \
         the following course material, explain difficult concepts simply, \
         and quiz the student when asked.\n\nCourse material:\n{}",
        knowledge.grounding_prefix(CHAT_GROUNDING_CHARS)
    )
}

// Request/response bodies for generateContent

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    contents: Vec<RequestContent>,
    system_instruction: RequestSystemInstruction,
}

#[derive(Debug, Serialize)]
struct RequestContent {
    role: String,
    parts: Vec<TextPart>,
}

#[derive(Debug, Serialize)]
struct RequestSystemInstruction {
    parts: Vec<TextPart>,
}

#[derive(Debug, Serialize, Deserialize)]
struct TextPart {
    text: String,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct GenerateResponse {
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct Candidate {
    content: Option<ResponseContent>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct ResponseContent {
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct ResponsePart {
    text: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_shape() {
        let request = GenerateRequest {
            contents: vec![RequestContent {
                role: "user".to_string(),
                parts: vec![TextPart {
                    text: "What is entropy?".to_string(),
                }],
            }],
            system_instruction: RequestSystemInstruction {
                parts: vec![TextPart {
                    text: "instruction".to_string(),
                }],
            },
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["contents"][0]["role"], "user");
        assert_eq!(json["contents"][0]["parts"][0]["text"], "What is entropy?");
        assert_eq!(json["systemInstruction"]["parts"][0]["text"], "instruction");
    }

    #[test]
    fn test_response_text_extraction() {
        let raw = r#"{"candidates":[{"content":{"parts":[{"text":"Entropy "},{"text":"is disorder."}]}}]}"#;
        let response: GenerateResponse = serde_json::from_str(raw).unwrap();
        let text: String = response
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| {
                c.parts
                    .into_iter()
                    .filter_map(|p| p.text)
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap();
        assert_eq!(text, "Entropy is disorder.");
    }

    #[test]
    fn test_client_requires_credential() {
        let config = AppConfig::default();
        assert!(ChatClient::new(&config).is_err());
    }

    #[test]
    fn test_instruction_bounded() {
        let knowledge = Knowledge::from_text("y".repeat(CHAT_GROUNDING_CHARS * 3)).unwrap();
        let instruction = chat_instruction(&knowledge);
        assert!(instruction.len() < CHAT_GROUNDING_CHARS + 500);
    }
}
