//! RFQ Chat Console
//!
//! Joins one RFQ chat room from the terminal. Useful for checking a realtime
//! server end to end.
//!
//! ## Usage
//!
//! ```bash
//! # Join quote 12 / customer quote 34 as a customer
//! RFQ_AUTH_TOKEN=... rfq-chat --quote-id 12 --customer-quote-id 34
//!
//! # Against a specific API host, as a supplier
//! rfq-chat --api-url https://api.example.com/api --user-type supplier \
//!     --token ... --quote-id 12 --customer-quote-id 34
//! ```
//!
//! Each line typed is sent as a message. Ctrl+D or Ctrl+C leaves the room.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use rfq_realtime::{Config, RealtimeClient, UserType};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "rfq-chat")]
#[command(about = "Join an RFQ chat room from the terminal")]
struct Args {
    /// Path to config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// REST API base URL (realtime host is derived from it)
    #[arg(long, env = "RFQ_API_URL")]
    api_url: Option<String>,

    /// Realtime server port
    #[arg(long)]
    socket_port: Option<u16>,

    /// Auth token issued by the REST API
    #[arg(long, env = "RFQ_AUTH_TOKEN")]
    token: String,

    /// customer or supplier
    #[arg(long, default_value = "customer")]
    user_type: UserType,

    /// RFQ id
    #[arg(long)]
    quote_id: i64,

    /// Customer quote id within the RFQ
    #[arg(long)]
    customer_quote_id: i64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("rfq_realtime=info".parse()?),
        )
        .init();

    let args = Args::parse();

    // Load config
    let mut config = match &args.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => {
            let path = rfq_realtime::config::default_config_path();
            if path.exists() {
                Config::load(&path)?
            } else {
                Config::default()
            }
        }
    };

    // Apply CLI overrides
    if let Some(url) = args.api_url {
        config.api_base_url = url;
    }
    if let Some(port) = args.socket_port {
        config.socket_port = port;
    }

    let session_config = config.session_config()?;
    info!(url = %session_config.url, "Starting rfq-chat");

    let client = RealtimeClient::new(session_config);
    register_printers(&client);

    client.connect(args.token, args.user_type);

    // Rooms are scoped to a connected socket; wait for the ack before joining.
    if !wait_connected(&client, Duration::from_secs(30)).await {
        warn!("Realtime session did not connect");
        client.disconnect();
        return Ok(());
    }

    let (quote_id, customer_quote_id) = (args.quote_id, args.customer_quote_id);
    client.join_room(quote_id, customer_quote_id);
    info!(quote_id, customer_quote_id, "Joined room. Type to chat, Ctrl+D to leave.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => match line? {
                Some(text) if text.trim().is_empty() => continue,
                Some(text) => {
                    client.emit_typing(quote_id, customer_quote_id);
                    client.send_message(quote_id, customer_quote_id, text);
                    client.emit_stop_typing(quote_id, customer_quote_id);
                }
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
        }
    }

    client.leave_room(quote_id, customer_quote_id);
    // Give the driver a moment to flush the leave before tearing down.
    tokio::time::sleep(Duration::from_millis(200)).await;
    client.disconnect();

    Ok(())
}

fn register_printers(client: &RealtimeClient) {
    client.on_new_message(|event| {
        let at = match event.message.created_at_utc() {
            Some(time) => time.format("%H:%M:%S").to_string(),
            None => event.message.created_at.clone(),
        };
        println!(
            "[{}] {} ({}): {}",
            at,
            event.sender.name,
            event.sender.user_type,
            event.message.text
        );
    });
    client.on_user_joined(|event| println!("* {} joined", event.user.name));
    client.on_user_left(|event| println!("* {} left", event.user.name));
    client.on_room_members(|event| {
        let names: Vec<&str> = event.members.iter().map(|m| m.name.as_str()).collect();
        println!("* in room: {}", names.join(", "));
    });
    client.on_user_typing(|event| println!("* {} is typing...", event.user.name));
    client.on_user_stopped_typing(|_| {});
}

async fn wait_connected(client: &RealtimeClient, limit: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + limit;
    while tokio::time::Instant::now() < deadline {
        if client.is_connected() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    client.is_connected()
}
