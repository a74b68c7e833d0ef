use serde::Deserialize;

/// WhatsApp Cloud API webhook payload. Meta nests the interesting part four
/// levels deep: `entry[].changes[].value.messages[]`.
#[derive(Debug, Deserialize)]
pub struct WebhookPayload {
    pub object: String,
    #[serde(default)]
    pub entry: Vec<Entry>,
}

#[derive(Debug, Deserialize)]
pub struct Entry {
    pub id: String,
    #[serde(default)]
    pub changes: Vec<Change>,
}

#[derive(Debug, Deserialize)]
pub struct Change {
    pub field: String,
    pub value: ChangeValue,
}

/// Inbound messages and delivery receipts arrive through the same change
/// object; whichever list is absent deserializes as empty.
#[derive(Debug, Default, Deserialize)]
pub struct ChangeValue {
    #[serde(default)]
    pub messages: Vec<IncomingMessage>,
    #[serde(default)]
    pub statuses: Vec<DeliveryStatus>,
}

#[derive(Debug, Deserialize)]
pub struct IncomingMessage {
    pub from: String,
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub image: Option<MediaRef>,
    pub text: Option<TextBody>,
}

#[derive(Debug, Deserialize)]
pub struct MediaRef {
    pub id: String,
    pub mime_type: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TextBody {
    pub body: String,
}

/// Sent/delivered/read receipts for our own outbound messages.
#[derive(Debug, Deserialize)]
pub struct DeliveryStatus {
    pub id: String,
    pub status: String,
}

/// Query string of Meta's `GET /webhook` subscription handshake.
#[derive(Debug, Deserialize)]
pub struct VerifyParams {
    #[serde(rename = "hub.mode")]
    pub mode: String,
    #[serde(rename = "hub.verify_token")]
    pub verify_token: String,
    #[serde(rename = "hub.challenge")]
    pub challenge: String,
}

/// `GET /{media_id}` on the Graph API resolves a media id to a short-lived
/// CDN URL.
#[derive(Debug, Deserialize)]
pub struct MediaMetadata {
    pub url: String,
    pub mime_type: Option<String>,
}

/// The slice of a `generateContent` response we read.
#[derive(Debug, Deserialize)]
pub struct GenerateContentResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
pub struct Candidate {
    pub content: CandidateContent,
}

#[derive(Debug, Deserialize)]
pub struct CandidateContent {
    #[serde(default)]
    pub parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
pub struct CandidatePart {
    pub text: Option<String>,
}

impl GenerateContentResponse {
    pub fn first_text(&self) -> Option<&str> {
        self.candidates
            .first()?
            .content
            .parts
            .first()?
            .text
            .as_deref()
    }
}

/// Fields the model is asked to extract from a bill image.
///
/// The JSON keys match the extraction prompt verbatim. `Total_Amount` is
/// requested as a number but models regularly return it as a string, so both
/// are accepted.
#[derive(Debug, PartialEq, Deserialize)]
pub struct BillFields {
    #[serde(rename = "Date")]
    pub date: String,
    #[serde(rename = "GSTIN")]
    pub gstin: String,
    #[serde(rename = "Total_Amount", deserialize_with = "amount_from_number_or_string")]
    pub total_amount: f64,
}

fn amount_from_number_or_string<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawAmount {
        Number(f64),
        Text(String),
    }

    match RawAmount::deserialize(deserializer)? {
        RawAmount::Number(n) => Ok(n),
        RawAmount::Text(s) => s
            .trim()
            .trim_start_matches('₹')
            .replace(',', "")
            .trim()
            .parse()
            .map_err(serde::de::Error::custom),
    }
}
