use crate::config::GeminiConfig;
use crate::provider::{ModelError, ModelProvider, ModelResult};
use crate::types::{
    Candidate, CandidateContent, Content, ContentRole, FinishReason, GenerateRequest,
    GenerateResponse, InlineData, ModelInfo, Part, Usage,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

const API_KEY_HEADER: &str = "x-goog-api-key";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiApiRequest {
    system_instruction: GeminiApiContent,
    contents: Vec<GeminiApiContent>,
    generation_config: GeminiApiGenerationConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiApiContent {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<GeminiApiPart>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiApiPart {
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    inline_data: Option<InlineData>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiApiGenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_mime_type: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiApiResponse {
    #[serde(default)]
    candidates: Vec<GeminiApiCandidate>,
    usage_metadata: Option<GeminiApiUsage>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiApiCandidate {
    content: Option<GeminiApiContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiApiUsage {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
    #[serde(default)]
    total_token_count: u32,
}

#[derive(Debug, Deserialize)]
struct GeminiApiModelsResponse {
    #[serde(default)]
    models: Vec<GeminiApiModel>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiApiModel {
    name: String,
    display_name: Option<String>,
    input_token_limit: Option<u32>,
    output_token_limit: Option<u32>,
}

pub struct GeminiProvider {
    http_client: reqwest::Client,
    base_url: String,
    api_key: String,
    config: GeminiConfig,
}

impl GeminiProvider {
    pub fn new(config: GeminiConfig) -> ModelResult<Self> {
        config
            .validate()
            .map_err(|msg| ModelError::InvalidConfig { message: msg })?;

        let api_key = config.api_key.clone().unwrap_or_default();
        let base_url = config.base_url.trim_end_matches('/').to_string();

        let http_client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ModelError::Unknown {
                message: format!("Failed to build HTTP client: {}", e),
            })?;

        Ok(Self {
            http_client,
            base_url,
            api_key,
            config,
        })
    }

    /// Build a provider with the key taken from the environment.
    ///
    /// Fails before any network traffic when the credential is absent.
    pub fn from_env() -> ModelResult<Self> {
        Self::new(GeminiConfig::from_env()?)
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    fn convert_role(role: &ContentRole) -> String {
        match role {
            ContentRole::User => "user".to_string(),
            ContentRole::Model => "model".to_string(),
        }
    }

    fn convert_part_to_api(part: &Part) -> GeminiApiPart {
        match part {
            Part::Text(text) => GeminiApiPart {
                text: Some(text.clone()),
                ..Default::default()
            },
            Part::InlineData(data) => GeminiApiPart {
                inline_data: Some(data.clone()),
                ..Default::default()
            },
        }
    }

    fn convert_content_to_api(content: &Content) -> GeminiApiContent {
        GeminiApiContent {
            role: Some(Self::convert_role(&content.role)),
            parts: content.parts.iter().map(Self::convert_part_to_api).collect(),
        }
    }

    fn build_request_body(request: &GenerateRequest) -> GeminiApiRequest {
        let config = &request.generation_config;

        GeminiApiRequest {
            system_instruction: GeminiApiContent {
                role: None,
                parts: vec![GeminiApiPart {
                    text: Some(request.system_instruction.clone()),
                    ..Default::default()
                }],
            },
            contents: request
                .contents
                .iter()
                .map(Self::convert_content_to_api)
                .collect(),
            generation_config: GeminiApiGenerationConfig {
                temperature: config.temperature,
                max_output_tokens: config.max_output_tokens,
                response_mime_type: config
                    .structured_output
                    .then(|| "application/json".to_string()),
            },
        }
    }

    fn convert_finish_reason(reason: Option<String>) -> Option<FinishReason> {
        reason.map(|r| match r.as_str() {
            "STOP" => FinishReason::Stop,
            "MAX_TOKENS" => FinishReason::MaxTokens,
            "SAFETY" => FinishReason::Safety,
            "RECITATION" => FinishReason::Recitation,
            _ => FinishReason::Other,
        })
    }

    fn convert_part_from_api(part: GeminiApiPart) -> Option<Part> {
        match (part.text, part.inline_data) {
            (Some(text), _) => Some(Part::Text(text)),
            (None, Some(data)) => Some(Part::InlineData(data)),
            // Parts we don't model (function calls, thoughts without text)
            (None, None) => None,
        }
    }

    fn parse_response(response: GeminiApiResponse) -> GenerateResponse {
        let candidates = response
            .candidates
            .into_iter()
            .map(|candidate| Candidate {
                content: candidate.content.map(|content| CandidateContent {
                    parts: content
                        .parts
                        .into_iter()
                        .filter_map(Self::convert_part_from_api)
                        .collect(),
                }),
                finish_reason: Self::convert_finish_reason(candidate.finish_reason),
            })
            .collect();

        let usage = response.usage_metadata.map(|u| Usage {
            prompt_tokens: u.prompt_token_count,
            completion_tokens: u.candidates_token_count,
            total_tokens: u.total_token_count,
        });

        GenerateResponse { candidates, usage }
    }

    fn handle_http_error(err: reqwest::Error) -> ModelError {
        if err.is_timeout() {
            ModelError::ServiceUnavailable {
                message: "Request timeout".to_string(),
            }
        } else if err.is_connect() {
            ModelError::ServiceUnavailable {
                message: "Cannot connect to Gemini service".to_string(),
            }
        } else {
            ModelError::Network(err)
        }
    }

    fn status_error(status: reqwest::StatusCode, model: &str, body: String) -> ModelError {
        match status.as_u16() {
            401 | 403 => ModelError::Authentication,
            404 => ModelError::ModelNotFound {
                model: model.to_string(),
            },
            429 => ModelError::RateLimit,
            500..=599 => ModelError::ServiceUnavailable {
                message: format!("Gemini API returned {}: {}", status, body),
            },
            _ => ModelError::Unknown {
                message: format!("Gemini API returned {}: {}", status, body),
            },
        }
    }
}

#[async_trait]
impl ModelProvider for GeminiProvider {
    async fn generate(&self, request: GenerateRequest) -> ModelResult<GenerateResponse> {
        debug!("Starting generate request with model: {}", request.model);

        let body = Self::build_request_body(&request);
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, request.model
        );

        let http_response = self
            .http_client
            .post(&url)
            .header(API_KEY_HEADER, &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(Self::handle_http_error)?;

        let status = http_response.status();
        if !status.is_success() {
            let error_text = http_response.text().await.unwrap_or_default();
            return Err(Self::status_error(status, &request.model, error_text));
        }

        let api_response: GeminiApiResponse =
            http_response.json().await.map_err(ModelError::Network)?;

        let response = Self::parse_response(api_response);

        if let Some(usage) = &response.usage {
            debug!(
                "Token usage: prompt={}, completion={}, total={}",
                usage.prompt_tokens, usage.completion_tokens, usage.total_tokens
            );
        }
        info!("Generate request completed successfully");

        Ok(response)
    }

    async fn list_models(&self) -> ModelResult<Vec<ModelInfo>> {
        debug!("Listing available models");

        let url = format!("{}/v1beta/models", self.base_url);

        let response = self
            .http_client
            .get(&url)
            .header(API_KEY_HEADER, &self.api_key)
            .send()
            .await
            .map_err(Self::handle_http_error)?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(Self::status_error(status, &self.config.model, error_text));
        }

        let models_response: GeminiApiModelsResponse =
            response.json().await.map_err(ModelError::Network)?;

        let model_infos: Vec<ModelInfo> = models_response
            .models
            .into_iter()
            .map(|model| ModelInfo {
                name: model
                    .name
                    .strip_prefix("models/")
                    .map(str::to_string)
                    .unwrap_or(model.name),
                display_name: model.display_name,
                input_token_limit: model.input_token_limit,
                output_token_limit: model.output_token_limit,
            })
            .collect();

        info!("Retrieved {} models", model_infos.len());
        Ok(model_infos)
    }

    async fn health_check(&self) -> ModelResult<()> {
        debug!("Performing health check");

        let models = match self.list_models().await {
            Ok(models) => models,
            Err(e) => {
                error!("Health check failed: {}", e);
                return Err(e);
            }
        };

        if models.iter().any(|m| m.name == self.config.model) {
            info!("Health check passed");
            Ok(())
        } else {
            error!("Configured model {} is not available", self.config.model);
            Err(ModelError::ModelNotFound {
                model: self.config.model.clone(),
            })
        }
    }

    fn provider_name(&self) -> &'static str {
        "gemini"
    }
}
