use std::time::Duration;

use actix_web::{App, HttpResponse, HttpServer, middleware::Logger, web};

use crate::config::AppConfig;
use crate::gemini::GeminiClient;
use crate::server::{handle_webhook, health_check, verify_webhook};
use crate::whatsapp::WhatsAppClient;

mod config;
mod error;
mod gemini;
mod model;
mod server;
mod signature;
mod whatsapp;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv::dotenv().ok();
    env_logger::init();

    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("configuration error: {err}");
            std::process::exit(1);
        }
    };

    let whatsapp = match WhatsAppClient::new(&config) {
        Ok(client) => web::Data::new(client),
        Err(err) => {
            eprintln!("failed to build http client: {err}");
            std::process::exit(1);
        }
    };
    let gemini = match GeminiClient::new(&config) {
        Ok(client) => web::Data::new(client),
        Err(err) => {
            eprintln!("failed to build http client: {err}");
            std::process::exit(1);
        }
    };

    let port = config.port;
    let workers = config.workers;
    let keep_alive = Duration::from_secs(config.keep_alive_secs);
    let config = web::Data::new(config);

    println!("🚀 Bill Scan WhatsApp Server starting on port {port}");

    HttpServer::new(move || {
        App::new()
            .app_data(config.clone())
            .app_data(whatsapp.clone())
            .app_data(gemini.clone())
            .wrap(Logger::default())
            .route("/webhook", web::get().to(verify_webhook))
            .route("/webhook", web::post().to(handle_webhook))
            .route("/health", web::get().to(health_check))
            .route(
                "/",
                web::get().to(|| async {
                    HttpResponse::Ok().json(serde_json::json!({
                        "message": "Bill Scan WhatsApp Bot API",
                        "status": "running",
                        "webhook": "/webhook",
                    }))
                }),
            )
    })
    .workers(workers)
    .keep_alive(keep_alive)
    .bind(("0.0.0.0", port))?
    .run()
    .await
}
