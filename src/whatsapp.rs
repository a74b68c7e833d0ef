use std::time::Duration;

use log::{error, info};

use crate::config::AppConfig;
use crate::error::BotError;
use crate::model::MediaMetadata;

/// Graph API client for the two WhatsApp Cloud endpoints the bot touches:
/// media download and the messages (send) endpoint.
#[derive(Clone)]
pub struct WhatsAppClient {
    http: reqwest::Client,
    token: String,
    phone_number_id: String,
    base_url: String,
}

pub struct DownloadedImage {
    pub mime_type: String,
    pub data: Vec<u8>,
}

impl WhatsAppClient {
    pub fn new(config: &AppConfig) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.client_timeout_secs))
            .build()?;
        Ok(Self {
            http,
            token: config.whatsapp_token.clone(),
            phone_number_id: config.phone_number_id.clone(),
            base_url: config.graph_base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Resolve a media id to its short-lived CDN URL.
    async fn media_metadata(&self, media_id: &str) -> Result<MediaMetadata, BotError> {
        let url = format!("{}/{}", self.base_url, media_id);
        let res = self.http.get(&url).bearer_auth(&self.token).send().await?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(BotError::Graph { status, body });
        }
        Ok(res.json::<MediaMetadata>().await?)
    }

    /// Fetch the bytes of an inbound image. Two hops: the Graph lookup for the
    /// CDN URL, then the download itself. Meta wants the bearer token on both.
    pub async fn download_image(&self, media_id: &str) -> Result<DownloadedImage, BotError> {
        let metadata = self.media_metadata(media_id).await?;

        let res = self
            .http
            .get(&metadata.url)
            .bearer_auth(&self.token)
            .send()
            .await?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(BotError::Graph { status, body });
        }
        let data = res.bytes().await?.to_vec();

        // WhatsApp re-encodes inbound photos as JPEG; trust the metadata when
        // it says otherwise.
        let mime_type = metadata
            .mime_type
            .unwrap_or_else(|| "image/jpeg".to_string());

        info!("downloaded media {} ({} bytes, {})", media_id, data.len(), mime_type);
        Ok(DownloadedImage { mime_type, data })
    }

    /// Send a plain text message over the Cloud API. Best-effort: a failed
    /// send is logged and swallowed so the webhook still acknowledges.
    pub async fn send_text(&self, to: &str, body: &str) {
        let url = format!("{}/{}/messages", self.base_url, self.phone_number_id);
        let payload = serde_json::json!({
            "messaging_product": "whatsapp",
            "to": to,
            "type": "text",
            "text": { "body": body },
        });

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.token)
            .json(&payload)
            .send()
            .await;

        match response {
            Ok(res) if res.status().is_success() => {
                info!("reply delivered to {}", to);
            }
            Ok(res) => {
                let status = res.status();
                // Meta's error body says exactly what it is complaining about.
                let body = res.text().await.unwrap_or_default();
                error!("failed to send reply to {}: {} | {}", to, status, body);
            }
            Err(err) => {
                error!("failed to send reply to {}: {}", to, err);
            }
        }
    }
}
