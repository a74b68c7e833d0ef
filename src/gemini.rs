use std::time::Duration;

use base64::{Engine as _, engine::general_purpose::STANDARD};
use chrono::NaiveDate;
use log::debug;

use crate::config::AppConfig;
use crate::error::BotError;
use crate::model::{BillFields, GenerateContentResponse};

const EXTRACTION_PROMPT: &str = r#"Extract the following from this bill image as a JSON object:
{
"Date": "DD/MM/YYYY",
"GSTIN": "string",
"Total_Amount": number
}
Return ONLY the raw JSON. No markdown backticks."#;

/// Client for the Gemini `generateContent` endpoint, used as a vision model
/// to read bill photos.
#[derive(Clone)]
pub struct GeminiClient {
    http: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl GeminiClient {
    pub fn new(config: &AppConfig) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.client_timeout_secs))
            .build()?;
        Ok(Self {
            http,
            api_key: config.gemini_api_key.clone(),
            model: config.gemini_model.clone(),
            base_url: config.gemini_base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Ask the model for the structured fields of a bill image.
    pub async fn extract_bill(
        &self,
        image: &[u8],
        mime_type: &str,
    ) -> Result<BillFields, BotError> {
        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url, self.model, self.api_key
        );
        let body = serde_json::json!({
            "contents": [{ "parts": [
                { "text": EXTRACTION_PROMPT },
                { "inlineData": { "mimeType": mime_type, "data": STANDARD.encode(image) } }
            ]}]
        });

        let res = self.http.post(&url).json(&body).send().await?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(BotError::Gemini { status, body });
        }

        let response = res.json::<GenerateContentResponse>().await?;
        let raw = response
            .first_text()
            .ok_or(BotError::MissingField("candidates[0].content.parts[0].text"))?;
        debug!("model output: {}", raw);

        parse_bill_fields(raw)
    }
}

/// Parse the model's reply into bill fields, tolerating markdown fences and
/// normalizing the date when it matches a known format.
pub fn parse_bill_fields(raw: &str) -> Result<BillFields, BotError> {
    let cleaned = strip_code_fences(raw);
    let mut fields: BillFields = serde_json::from_str(&cleaned)?;
    if let Some(date) = normalize_date(&fields.date) {
        fields.date = date.format("%d/%m/%Y").to_string();
    }
    Ok(fields)
}

/// The prompt forbids markdown fences, but the model adds them anyway often
/// enough that stripping is mandatory.
fn strip_code_fences(raw: &str) -> String {
    raw.replace("```json", "").replace("```", "").trim().to_string()
}

/// Bills print dates in a handful of formats; unrecognized ones pass through
/// as-is rather than failing the extraction.
fn normalize_date(raw: &str) -> Option<NaiveDate> {
    const FORMATS: [&str; 3] = ["%d/%m/%Y", "%d-%m-%Y", "%Y-%m-%d"];
    let raw = raw.trim();
    FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(raw, fmt).ok())
}
