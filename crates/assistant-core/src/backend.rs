use crate::attachment::Attachment;
use anyhow::{anyhow, Result};
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::{Deserialize, Serialize};

pub const DEFAULT_BACKEND_URL: &str = "https://ai-chatbot-lz10.onrender.com";

const NO_RESPONSE: &str = "No response returned.";
const NO_SUMMARY: &str = "No summary returned.";

#[derive(Serialize)]
struct AskRequest<'a> {
    prompt: &'a str,
}

#[derive(Deserialize)]
struct AskResponse {
    response: Option<String>,
}

#[derive(Deserialize)]
struct SummaryResponse {
    summary: Option<String>,
}

#[derive(Deserialize)]
struct ModelsResponse {
    models: Vec<String>,
}

/// Client for the assistant backend (`/ask`, `/summarize`, `/models`)
#[derive(Clone)]
pub struct BackendClient {
    client: Client,
    base_url: String,
}

impl BackendClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Send a free-text prompt and return the reply text.
    pub async fn ask(&self, prompt: &str) -> Result<String> {
        let url = format!("{}/ask", self.base_url);

        let response = self
            .client
            .post(&url)
            .json(&AskRequest { prompt })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(anyhow!("Ask request failed with status: {}", response.status()));
        }

        let ask_response: AskResponse = response.json().await?;
        Ok(non_empty_or(ask_response.response, NO_RESPONSE))
    }

    /// Upload a document as multipart field `file` and return its summary.
    pub async fn summarize(&self, attachment: &Attachment) -> Result<String> {
        let url = format!("{}/summarize", self.base_url);

        let part = Part::bytes(attachment.bytes().to_vec())
            .file_name(attachment.name().to_string())
            .mime_str(attachment.mime_type())?;
        let form = Form::new().part("file", part);

        let response = self
            .client
            .post(&url)
            .multipart(form)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(anyhow!(
                "Summarize request for {} failed with status: {}",
                attachment.name(),
                response.status()
            ));
        }

        let summary_response: SummaryResponse = response.json().await?;
        Ok(non_empty_or(summary_response.summary, NO_SUMMARY))
    }

    pub async fn list_models(&self) -> Result<Vec<String>> {
        let url = format!("{}/models", self.base_url);

        let response = self.client.get(&url).send().await?;

        if !response.status().is_success() {
            return Err(anyhow!("Failed to list models: {}", response.status()));
        }

        let models_response: ModelsResponse = response.json().await?;
        Ok(models_response.models)
    }
}

fn non_empty_or(text: Option<String>, fallback: &str) -> String {
    text.filter(|t| !t.is_empty())
        .unwrap_or_else(|| fallback.to_string())
}
