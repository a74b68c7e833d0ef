use actix_web::{HttpRequest, HttpResponse, Result, web};
use log::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::AppConfig;
use crate::error::BotError;
use crate::gemini::GeminiClient;
use crate::model::{BillFields, IncomingMessage, VerifyParams, WebhookPayload};
use crate::signature::verify_signature;
use crate::whatsapp::WhatsAppClient;

const BILL_READ_ERROR: &str = "❌ Error reading bill. Please try a clearer photo.";
const NOT_AN_IMAGE: &str = "Please send a photo of the bill.";

pub async fn health_check() -> Result<HttpResponse> {
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "service": "Bill Scan WhatsApp Bot"
    })))
}

/// Meta's subscription handshake: echo the challenge when the verify token
/// matches, 403 otherwise.
pub async fn verify_webhook(
    config: web::Data<AppConfig>,
    query: web::Query<VerifyParams>,
) -> Result<HttpResponse> {
    if query.mode == "subscribe" && query.verify_token == config.webhook_verify_token {
        info!("webhook verification handshake accepted");
        Ok(HttpResponse::Ok()
            .content_type("text/plain")
            .body(query.into_inner().challenge))
    } else {
        warn!("webhook verification failed (mode={})", query.mode);
        Ok(HttpResponse::Forbidden().body("Verification failed"))
    }
}

/// Message intake. The signature check runs over the raw body before any
/// parsing; after that point the delivery is always acknowledged with 200 so
/// Meta does not redeliver, whatever happens downstream.
pub async fn handle_webhook(
    req: HttpRequest,
    body: web::Bytes,
    config: web::Data<AppConfig>,
    whatsapp: web::Data<WhatsAppClient>,
    gemini: web::Data<GeminiClient>,
) -> Result<HttpResponse> {
    let signature = req
        .headers()
        .get("X-Hub-Signature-256")
        .and_then(|v| v.to_str().ok());
    if !verify_signature(&config.app_secret, signature, &body) {
        warn!("rejected webhook delivery: signature mismatch");
        return Ok(HttpResponse::Forbidden().body("Signature Mismatch"));
    }

    let payload: WebhookPayload = match serde_json::from_slice(&body) {
        Ok(payload) => payload,
        Err(err) => {
            warn!("unparseable webhook body: {}", err);
            return Ok(HttpResponse::BadRequest().body("Invalid payload"));
        }
    };

    let delivery_id = Uuid::new_v4();

    match first_message(&payload) {
        Some(msg) => {
            info!(
                "[{}] message {} from {} (type={})",
                delivery_id, msg.id, msg.from, msg.kind
            );
            process_message(msg, &whatsapp, &gemini, delivery_id).await;
        }
        None if has_statuses(&payload) => {
            // Delivery/read receipts for our own replies; never answer these.
            info!("[{}] status receipt, ignoring", delivery_id);
        }
        None => {
            info!("[{}] webhook carried no messages", delivery_id);
        }
    }

    Ok(HttpResponse::Ok().body("OK"))
}

fn first_message(payload: &WebhookPayload) -> Option<&IncomingMessage> {
    payload
        .entry
        .iter()
        .flat_map(|entry| entry.changes.iter())
        .filter(|change| change.field == "messages")
        .flat_map(|change| change.value.messages.iter())
        .next()
}

fn has_statuses(payload: &WebhookPayload) -> bool {
    payload
        .entry
        .iter()
        .flat_map(|entry| entry.changes.iter())
        .any(|change| !change.value.statuses.is_empty())
}

async fn process_message(
    msg: &IncomingMessage,
    whatsapp: &WhatsAppClient,
    gemini: &GeminiClient,
    delivery_id: Uuid,
) {
    if msg.kind != "image" {
        if let Some(text) = msg.text.as_ref() {
            debug!("[{}] text message body: {}", delivery_id, text.body);
        }
        whatsapp.send_text(&msg.from, NOT_AN_IMAGE).await;
        return;
    }

    let Some(image) = msg.image.as_ref() else {
        warn!("[{}] image message without a media reference", delivery_id);
        whatsapp.send_text(&msg.from, BILL_READ_ERROR).await;
        return;
    };

    match process_bill_image(&image.id, whatsapp, gemini).await {
        Ok(bill) => {
            info!(
                "[{}] extracted bill: date={} gstin={} amount={:.2}",
                delivery_id, bill.date, bill.gstin, bill.total_amount
            );
            whatsapp.send_text(&msg.from, &format_bill_reply(&bill)).await;
        }
        Err(err) => {
            error!("[{}] bill processing failed: {}", delivery_id, err);
            whatsapp.send_text(&msg.from, BILL_READ_ERROR).await;
        }
    }
}

async fn process_bill_image(
    media_id: &str,
    whatsapp: &WhatsAppClient,
    gemini: &GeminiClient,
) -> Result<BillFields, BotError> {
    let image = whatsapp.download_image(media_id).await?;
    gemini.extract_bill(&image.data, &image.mime_type).await
}

fn format_bill_reply(bill: &BillFields) -> String {
    format!(
        "✅ Bill processed!\nDate: {}\nGSTIN: {}\nAmount: ₹{:.2}",
        bill.date, bill.gstin, bill.total_amount
    )
}

#[cfg(test)]
mod tests {
    use actix_web::{App, test};

    use super::*;
    use crate::signature::sign;

    fn test_config() -> AppConfig {
        AppConfig {
            port: 5001,
            workers: 1,
            keep_alive_secs: 5,
            client_timeout_secs: 2,
            whatsapp_token: "test-token".to_string(),
            phone_number_id: "1029286163594215".to_string(),
            app_secret: "test-app-secret".to_string(),
            webhook_verify_token: "test-verify-token".to_string(),
            gemini_api_key: "test-key".to_string(),
            gemini_model: "gemini-2.5-flash".to_string(),
            graph_base_url: "http://127.0.0.1:1".to_string(),
            gemini_base_url: "http://127.0.0.1:1".to_string(),
        }
    }

    fn configure_test_app(cfg: &mut web::ServiceConfig) {
        let config = test_config();
        let whatsapp = WhatsAppClient::new(&config).unwrap();
        let gemini = GeminiClient::new(&config).unwrap();
        cfg.app_data(web::Data::new(config))
            .app_data(web::Data::new(whatsapp))
            .app_data(web::Data::new(gemini))
            .route("/webhook", web::get().to(verify_webhook))
            .route("/webhook", web::post().to(handle_webhook))
            .route("/health", web::get().to(health_check));
    }

    const STATUS_BODY: &str = r#"{"object":"whatsapp_business_account","entry":[{"id":"106540352242922","changes":[{"field":"messages","value":{"messaging_product":"whatsapp","statuses":[{"id":"wamid.X","status":"delivered","recipient_id":"916379190592"}]}}]}]}"#;

    #[actix_web::test]
    async fn handshake_echoes_challenge() {
        let app = test::init_service(App::new().configure(configure_test_app)).await;
        let req = test::TestRequest::get()
            .uri("/webhook?hub.mode=subscribe&hub.verify_token=test-verify-token&hub.challenge=1158201444")
            .to_request();
        let res = test::call_service(&app, req).await;
        assert!(res.status().is_success());
        let body = test::read_body(res).await;
        assert_eq!(&body[..], b"1158201444");
    }

    #[actix_web::test]
    async fn handshake_rejects_wrong_token() {
        let app = test::init_service(App::new().configure(configure_test_app)).await;
        let req = test::TestRequest::get()
            .uri("/webhook?hub.mode=subscribe&hub.verify_token=wrong&hub.challenge=1158201444")
            .to_request();
        let res = test::call_service(&app, req).await;
        assert_eq!(res.status(), actix_web::http::StatusCode::FORBIDDEN);
    }

    #[actix_web::test]
    async fn webhook_rejects_unsigned_delivery() {
        let app = test::init_service(App::new().configure(configure_test_app)).await;
        let req = test::TestRequest::post()
            .uri("/webhook")
            .set_payload(STATUS_BODY)
            .to_request();
        let res = test::call_service(&app, req).await;
        assert_eq!(res.status(), actix_web::http::StatusCode::FORBIDDEN);
    }

    #[actix_web::test]
    async fn webhook_rejects_tampered_signature() {
        let app = test::init_service(App::new().configure(configure_test_app)).await;
        let header = sign("some-other-secret", STATUS_BODY.as_bytes());
        let req = test::TestRequest::post()
            .uri("/webhook")
            .insert_header(("X-Hub-Signature-256", header))
            .set_payload(STATUS_BODY)
            .to_request();
        let res = test::call_service(&app, req).await;
        assert_eq!(res.status(), actix_web::http::StatusCode::FORBIDDEN);
    }

    #[actix_web::test]
    async fn webhook_acks_status_receipts_without_replying() {
        let app = test::init_service(App::new().configure(configure_test_app)).await;
        let header = sign("test-app-secret", STATUS_BODY.as_bytes());
        let req = test::TestRequest::post()
            .uri("/webhook")
            .insert_header(("X-Hub-Signature-256", header))
            .set_payload(STATUS_BODY)
            .to_request();
        let res = test::call_service(&app, req).await;
        assert!(res.status().is_success());
        let body = test::read_body(res).await;
        assert_eq!(&body[..], b"OK");
    }

    #[actix_web::test]
    async fn webhook_rejects_signed_garbage_body() {
        let app = test::init_service(App::new().configure(configure_test_app)).await;
        let body = "this is not json";
        let header = sign("test-app-secret", body.as_bytes());
        let req = test::TestRequest::post()
            .uri("/webhook")
            .insert_header(("X-Hub-Signature-256", header))
            .set_payload(body)
            .to_request();
        let res = test::call_service(&app, req).await;
        assert_eq!(res.status(), actix_web::http::StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn health_endpoint_reports_healthy() {
        let app = test::init_service(App::new().configure(configure_test_app)).await;
        let req = test::TestRequest::get().uri("/health").to_request();
        let res = test::call_service(&app, req).await;
        assert!(res.status().is_success());
    }

    #[::core::prelude::v1::test]
    fn first_message_walks_nested_entries() {
        let payload: WebhookPayload = serde_json::from_str(
            r#"{"object":"whatsapp_business_account","entry":[
                {"id":"a","changes":[{"field":"messages","value":{}}]},
                {"id":"b","changes":[{"field":"messages","value":{"messages":[
                    {"from":"916379190592","id":"wamid.Y","type":"text","text":{"body":"hi"}}
                ]}}]}
            ]}"#,
        )
        .unwrap();
        let msg = first_message(&payload).unwrap();
        assert_eq!(msg.id, "wamid.Y");
        assert_eq!(msg.kind, "text");
    }

    #[::core::prelude::v1::test]
    fn first_message_skips_non_message_fields() {
        let payload: WebhookPayload = serde_json::from_str(
            r#"{"object":"whatsapp_business_account","entry":[
                {"id":"a","changes":[{"field":"account_update","value":{"messages":[
                    {"from":"1","id":"wamid.Z","type":"text"}
                ]}}]}
            ]}"#,
        )
        .unwrap();
        assert!(first_message(&payload).is_none());
    }

    #[::core::prelude::v1::test]
    fn bill_reply_formats_all_fields() {
        let bill = BillFields {
            date: "12/03/2024".to_string(),
            gstin: "29ABCDE1234F1Z5".to_string(),
            total_amount: 2350.0,
        };
        assert_eq!(
            format_bill_reply(&bill),
            "✅ Bill processed!\nDate: 12/03/2024\nGSTIN: 29ABCDE1234F1Z5\nAmount: ₹2350.00"
        );
    }
}
