//! OCR and embedding client for an OpenAI-compatible provider.
//!
//! OCR goes through a vision chat completion carrying the file as a data URL;
//! the model is asked to answer with a JSON object holding the text and the
//! images it found. Embeddings use the `/embeddings` endpoint.
//!
//! Only images returned with `imageBase64` carry data and can be stored.
//! Entries with just a page number, annotation and bounds are reported but
//! produce no stored image.

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::AiConfig;
use crate::error::{ProviderError, ServiceError, ServiceResult};

const SERVICE: &str = "ai";

const EXTRACTION_PROMPT: &str = "Extract all text from this document, preserving reading order. \
Also list every embedded image or figure. Respond with a single JSON object of the form \
{\"text\": string, \"images\": [{\"pageNumber\": number, \"annotation\": string, \
\"bounds\": {\"x\": number, \"y\": number, \"width\": number, \"height\": number}, \
\"imageBase64\": string}]} and nothing else.";

/// Text and images recovered from one document
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Extraction {
    pub text: String,
    pub images: Vec<ExtractedImageData>,
}

/// One image reported by the OCR model
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedImageData {
    pub page_number: Option<u32>,
    pub annotation: Option<String>,
    /// Decoded image bytes; `None` when the model returned no usable data
    pub data: Option<Vec<u8>>,
}

/// Document understanding operations used by the processing pipeline
#[async_trait]
pub trait DocumentAi: Send + Sync {
    async fn extract_text_and_images(
        &self,
        content: &[u8],
        file_name: &str,
        mime_type: &str,
        model: &str,
    ) -> ServiceResult<Extraction>;

    /// Embed every text; `result[i]` belongs to `texts[i]`
    async fn create_embeddings(&self, texts: &[String], model: &str)
    -> ServiceResult<Vec<Vec<f32>>>;
}

/// HTTP client for the hosted OCR/embedding provider
pub struct AiClient {
    client: Client,
    config: AiConfig,
}

impl AiClient {
    pub fn new(config: AiConfig) -> ServiceResult<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| {
                ServiceError::Provider(ProviderError::Connection {
                    service: SERVICE,
                    url: config.base_url.clone(),
                    source: e,
                })
            })?;

        Ok(Self { client, config })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), path)
    }

    async fn post_json<T: Serialize, R: DeserializeOwned>(
        &self,
        url: &str,
        body: &T,
    ) -> ServiceResult<R> {
        let response = self
            .client
            .post(url)
            .bearer_auth(&self.config.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| ProviderError::Connection {
                service: SERVICE,
                url: url.to_string(),
                source: e,
            })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(ProviderError::Status {
                service: SERVICE,
                status,
                message,
            }
            .into());
        }

        let parsed = response
            .json::<R>()
            .await
            .map_err(|e| ProviderError::InvalidResponse {
                service: SERVICE,
                message: e.to_string(),
            })?;
        Ok(parsed)
    }
}

#[async_trait]
impl DocumentAi for AiClient {
    async fn extract_text_and_images(
        &self,
        content: &[u8],
        file_name: &str,
        mime_type: &str,
        model: &str,
    ) -> ServiceResult<Extraction> {
        let url = self.endpoint("chat/completions");
        let data_url = format!("data:{};base64,{}", mime_type, BASE64.encode(content));

        let request = ChatCompletionRequest {
            model,
            messages: vec![ChatMessage {
                role: "user",
                content: vec![
                    ContentPart::Text {
                        text: EXTRACTION_PROMPT.to_string(),
                    },
                    ContentPart::ImageUrl {
                        image_url: ImageUrl { url: data_url },
                    },
                ],
            }],
        };

        debug!(file_name, mime_type, model, bytes = content.len(), "Requesting OCR");
        let response: ChatCompletionResponse = self.post_json(&url, &request).await?;

        let message = response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| ProviderError::InvalidResponse {
                service: SERVICE,
                message: "completion contained no message content".to_string(),
            })?;

        Ok(parse_extraction(&message))
    }

    async fn create_embeddings(
        &self,
        texts: &[String],
        model: &str,
    ) -> ServiceResult<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let url = self.endpoint("embeddings");
        let request = EmbeddingRequest {
            model,
            input: texts,
        };

        debug!(model, inputs = texts.len(), "Requesting embeddings");
        let response: EmbeddingResponse = self.post_json(&url, &request).await?;
        align_embeddings(texts.len(), response.data)
    }
}

// === Wire types ===

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
}

#[derive(Serialize)]
struct ChatMessage {
    role: &'static str,
    content: Vec<ContentPart>,
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: Option<usize>,
}

/// Structured answer the OCR prompt asks for
#[derive(Deserialize)]
struct OcrPayload {
    #[serde(default)]
    text: String,
    #[serde(default)]
    images: Vec<OcrImage>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct OcrImage {
    page_number: Option<u32>,
    annotation: Option<String>,
    image_base64: Option<String>,
}

/// Interpret the OCR model's answer.
///
/// JSON (optionally inside a ```json fence) yields text plus images; any
/// other content is taken as plain text with no images.
fn parse_extraction(content: &str) -> Extraction {
    let trimmed = strip_code_fence(content.trim());

    match serde_json::from_str::<OcrPayload>(trimmed) {
        Ok(payload) => Extraction {
            text: payload.text,
            images: payload
                .images
                .into_iter()
                .map(|image| ExtractedImageData {
                    page_number: image.page_number,
                    annotation: image.annotation,
                    data: image.image_base64.as_deref().and_then(decode_image_data),
                })
                .collect(),
        },
        Err(_) => Extraction {
            text: content.trim().to_string(),
            images: Vec::new(),
        },
    }
}

fn strip_code_fence(content: &str) -> &str {
    let Some(rest) = content.strip_prefix("```") else {
        return content;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

/// Decode raw base64 or a `data:<mime>;base64,` URL
fn decode_image_data(encoded: &str) -> Option<Vec<u8>> {
    let payload = match encoded.split_once(";base64,") {
        Some((prefix, data)) if prefix.starts_with("data:") => data,
        _ => encoded,
    };
    match BASE64.decode(payload.trim()) {
        Ok(bytes) if !bytes.is_empty() => Some(bytes),
        Ok(_) => None,
        Err(e) => {
            warn!(error = %e, "Discarding undecodable image data from OCR response");
            None
        }
    }
}

/// Order embeddings by their `index` so they line up with the inputs
fn align_embeddings(
    expected: usize,
    mut data: Vec<EmbeddingData>,
) -> ServiceResult<Vec<Vec<f32>>> {
    if data.len() != expected {
        return Err(ProviderError::EmbeddingMismatch {
            expected,
            actual: data.len(),
        }
        .into());
    }

    if data.iter().all(|d| d.index.is_some()) {
        data.sort_by_key(|d| d.index);
        if data
            .iter()
            .enumerate()
            .any(|(position, d)| d.index != Some(position))
        {
            return Err(ProviderError::InvalidResponse {
                service: SERVICE,
                message: "embedding indices do not cover every input".to_string(),
            }
            .into());
        }
    }

    Ok(data.into_iter().map(|d| d.embedding).collect())
}
