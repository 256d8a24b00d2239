// src/main.rs

/// The main entry point for our application.
#[tokio::main]
async fn main() {
    if let Err(e) = chat_relay::start_server().await {
        eprintln!("Fatal: {e:#}");
        std::process::exit(1);
    }
}
