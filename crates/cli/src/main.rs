use anyhow::Context;
use clap::{Parser, Subcommand};
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_tungstenite::tungstenite::Message;

#[derive(Parser)]
#[command(name = "huddle")]
#[command(about = "Huddle meeting gateway", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version
    Version,

    /// Run the gateway (HTTP admission endpoints + WebSocket relay on one port).
    Serve {
        /// Config file path (default: HUDDLE_CONFIG_PATH or ~/.huddle/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<std::path::PathBuf>,

        /// HTTP and WebSocket port (default: PORT, then config, then 8080)
        #[arg(long, short)]
        port: Option<u16>,
    },

    /// Attach to a meeting over WebSocket (interactive). Lines typed are sent as chat;
    /// `/signal <targetId> <json>` sends a signal; `/quit` leaves.
    Join {
        /// Gateway base URL
        #[arg(long, default_value = "ws://127.0.0.1:8080")]
        url: String,

        /// Meeting code
        #[arg(long)]
        code: String,

        /// Participant id (the host id from the create redirect, or any id to request entry)
        #[arg(long, value_name = "ID")]
        participant: String,

        /// Display name used when entering the waiting room
        #[arg(long)]
        name: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Version) => {
            println!("huddle {}", env!("CARGO_PKG_VERSION"));
        }
        Some(Commands::Serve { config, port }) => {
            if let Err(e) = run_serve(config, port).await {
                log::error!("gateway failed: {:#}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Join {
            url,
            code,
            participant,
            name,
        }) => {
            if let Err(e) = run_join(&url, &code, &participant, name.as_deref()).await {
                log::error!("join failed: {:#}", e);
                std::process::exit(1);
            }
        }
        None => {
            println!("Run with --help for usage");
        }
    }
}

async fn run_serve(
    config_path: Option<std::path::PathBuf>,
    port: Option<u16>,
) -> anyhow::Result<()> {
    let (mut config, path) = lib::config::load_config(config_path)?;
    if let Some(p) = port {
        config.gateway.port = p;
    }
    log::info!(
        "starting gateway on {}:{} (config {})",
        config.gateway.bind,
        config.gateway.port,
        path.display()
    );
    lib::gateway::run_gateway(config).await
}

async fn run_join(
    base_url: &str,
    code: &str,
    participant: &str,
    name: Option<&str>,
) -> anyhow::Result<()> {
    let mut ws_url = format!(
        "{}/ws/{}/{}",
        base_url.trim_end_matches('/'),
        urlencoding::encode(code),
        urlencoding::encode(participant)
    );
    if let Some(n) = name {
        ws_url.push_str("?name=");
        ws_url.push_str(&urlencoding::encode(n));
    }

    let (ws, _) = tokio_tungstenite::connect_async(&ws_url)
        .await
        .with_context(|| format!("connecting to {}", ws_url))?;
    let (mut sink, mut stream) = ws.split();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            frame = stream.next() => match frame {
                Some(Ok(Message::Text(text))) => print_server_message(&text),
                Some(Ok(Message::Close(_))) | None => {
                    println!("* connection closed");
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(e).context("websocket receive"),
            },
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                let input = line.trim();
                if input.is_empty() {
                    continue;
                }
                if input.eq_ignore_ascii_case("/quit") || input.eq_ignore_ascii_case("/exit") {
                    let _ = sink.send(Message::Close(None)).await;
                    break;
                }
                match outgoing_frame(input) {
                    Ok(frame) => sink.send(Message::Text(frame.to_string())).await?,
                    Err(e) => eprintln!("! {}", e),
                }
            }
        }
    }
    Ok(())
}

/// Turn one line of user input into a client frame.
fn outgoing_frame(input: &str) -> Result<Value, String> {
    if let Some(rest) = input.strip_prefix("/signal ") {
        let (target, body) = rest.trim().split_once(' ').unwrap_or((rest.trim(), "{}"));
        let mut content: Value =
            serde_json::from_str(body).map_err(|e| format!("signal body is not JSON: {}", e))?;
        let Some(obj) = content.as_object_mut() else {
            return Err("signal body must be a JSON object".to_string());
        };
        obj.insert("targetId".into(), Value::String(target.to_string()));
        return Ok(json!({ "type": "signal", "content": content }));
    }
    Ok(json!({ "type": "chat", "content": { "text": input } }))
}

fn print_server_message(text: &str) {
    let Ok(v) = serde_json::from_str::<Value>(text) else {
        println!("< {}", text);
        return;
    };
    let c = &v["content"];
    let s = |key: &str| c.get(key).and_then(|x| x.as_str()).unwrap_or("").to_string();
    match v["type"].as_str().unwrap_or("") {
        "init" => println!(
            "* joined {} as {} (host: {}, admitted: {}, waiting: {})",
            s("meetingCode"),
            s("participantId"),
            c["isHost"],
            c["isAdmitted"],
            c["isWaiting"]
        ),
        "chat" => println!("[{}] {}", s("sender"), s("text")),
        "participant-joined" => println!("* {} joined ({})", s("name"), s("participantId")),
        "participant-left" => println!("* {} left", s("participantId")),
        "admitted" => println!("* you were admitted"),
        "rejected" => println!("* the host declined your request"),
        "meeting-ended" => println!("* meeting ended"),
        "waiting-room-update" => {
            let names: Vec<String> = c["participants"]
                .as_array()
                .map(|ps| {
                    ps.iter()
                        .map(|p| {
                            format!(
                                "{} ({})",
                                p["name"].as_str().unwrap_or(""),
                                p["id"].as_str().unwrap_or("")
                            )
                        })
                        .collect()
                })
                .unwrap_or_default();
            println!("* waiting room: [{}]", names.join(", "));
        }
        _ => println!("< {}", text),
    }
}
