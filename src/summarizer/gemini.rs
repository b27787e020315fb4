use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use super::{
    parse::parse_detailed_summary,
    prompts::{detailed_summary_prompt, quick_summary_prompt, truncate_chars},
    DetailedSummary, SummarizeError, SummaryProvider,
};
use crate::config::SummarizerConfig;

#[derive(Clone)]
pub struct GeminiClient {
    client: Client,
    api_key: Option<String>,
    model: String,
    endpoint: String,
    language: String,
    max_input_chars: usize,
}

impl GeminiClient {
    pub fn from_config(config: &SummarizerConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .context("failed to build AI HTTP client")?;

        Ok(Self {
            client,
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            language: config.language.clone(),
            max_input_chars: config.max_input_chars,
        })
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    fn generate_url(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.endpoint, self.model
        )
    }

    async fn generate(&self, prompt: String) -> Result<String, SummarizeError> {
        let api_key = self.api_key.as_ref().ok_or(SummarizeError::NotConfigured)?;

        let body = GenerateRequest {
            contents: vec![Content {
                role: "user",
                parts: vec![Part { text: prompt }],
            }],
        };

        debug!(model = %self.model, "sending generateContent request");
        let response = self
            .client
            .post(self.generate_url())
            .header("x-goog-api-key", api_key)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!(%status, body = %body, "AI API request failed");
            return Err(SummarizeError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: GenerateResponse = response.json().await?;
        candidate_text(parsed)
    }
}

#[async_trait]
impl SummaryProvider for GeminiClient {
    async fn generate_detailed_summary(
        &self,
        content: &str,
        file_name: &str,
    ) -> Result<DetailedSummary, SummarizeError> {
        let content = truncate_chars(content, self.max_input_chars);
        let prompt = detailed_summary_prompt(content, file_name, &self.language);
        let answer = self.generate(prompt).await?;
        parse_detailed_summary(&answer)
    }

    async fn generate_quick_summary(&self, content: &str) -> Result<String, SummarizeError> {
        let content = truncate_chars(content, self.max_input_chars);
        let answer = self
            .generate(quick_summary_prompt(content, &self.language))
            .await?;
        Ok(answer.trim().to_string())
    }
}

#[derive(Serialize)]
struct GenerateRequest {
    contents: Vec<Content>,
}

#[derive(Serialize)]
struct Content {
    role: &'static str,
    parts: Vec<Part>,
}

#[derive(Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

fn candidate_text(response: GenerateResponse) -> Result<String, SummarizeError> {
    if let Some(reason) = response
        .prompt_feedback
        .and_then(|feedback| feedback.block_reason)
    {
        return Err(SummarizeError::Blocked(reason));
    }

    let text: String = response
        .candidates
        .into_iter()
        .next()
        .and_then(|candidate| candidate.content)
        .map(|content| content.parts.into_iter().map(|part| part.text).collect())
        .unwrap_or_default();

    if text.trim().is_empty() {
        return Err(SummarizeError::EmptyResponse);
    }
    Ok(text)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{candidate_text, GeminiClient, GenerateResponse};
    use crate::config::SummarizerConfig;
    use crate::summarizer::{SummarizeError, SummaryProvider};

    fn response(value: serde_json::Value) -> GenerateResponse {
        serde_json::from_value(value).expect("response shape")
    }

    #[test]
    fn joins_candidate_parts() {
        let text = candidate_text(response(json!({
            "candidates": [
                {"content": {"parts": [{"text": "{\"overview\":"}, {"text": " \"x\"}"}]}},
                {"content": {"parts": [{"text": "ignored"}]}}
            ]
        })))
        .expect("text");
        assert_eq!(text, "{\"overview\": \"x\"}");
    }

    #[test]
    fn reports_blocked_prompts() {
        let err = candidate_text(response(json!({
            "promptFeedback": {"blockReason": "SAFETY"}
        })))
        .unwrap_err();
        assert!(matches!(err, SummarizeError::Blocked(reason) if reason == "SAFETY"));
    }

    #[test]
    fn reports_empty_answers() {
        let err = candidate_text(response(json!({"candidates": []}))).unwrap_err();
        assert!(matches!(err, SummarizeError::EmptyResponse));
    }

    #[test]
    fn builds_generate_url_from_config() {
        let client = GeminiClient::from_config(&SummarizerConfig {
            endpoint: "http://localhost:8089/".into(),
            ..SummarizerConfig::default()
        })
        .expect("client");
        assert_eq!(
            client.generate_url(),
            "http://localhost:8089/v1beta/models/gemini-1.5-flash:generateContent"
        );
        assert!(!client.is_configured());
    }

    #[tokio::test]
    async fn refuses_to_call_without_api_key() {
        let client = GeminiClient::from_config(&SummarizerConfig::default()).expect("client");
        let err = client
            .generate_detailed_summary("content", "doc.txt")
            .await
            .unwrap_err();
        assert!(matches!(err, SummarizeError::NotConfigured));
    }
}
