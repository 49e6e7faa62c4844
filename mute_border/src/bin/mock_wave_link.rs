use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::time::{Duration, Instant};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio_tungstenite::tungstenite::Message;

const DEFAULT_ADDR: &str = "127.0.0.1:1824";
const MIC_ID: &str = "PCM_IN_01_C_00_SD1";
const MIC_HW_ID: &str = "PCM_IN_01_V_00_SD2";

fn parse_arg_value(args: &[String], name: &str) -> Option<String> {
    args.iter()
        .position(|a| a == name)
        .and_then(|i| args.get(i + 1))
        .cloned()
}

fn input_configs(muted: bool) -> Value {
    json!([
        {
            "identifier": "PCM_OUT_01_V_00_SD2",
            "name": "System",
            "inputType": 1,
            "isAvailable": true,
            "isWaveMicInput": false,
            "inputs": [],
            "localMixer": [false, 100, false],
            "streamMixer": [false, 100, false]
        },
        {
            "identifier": MIC_ID,
            "name": "Wave:3 (Mock)",
            "inputType": 4,
            "isAvailable": true,
            "isWaveMicInput": true,
            "inputs": [{ "identifier": MIC_HW_ID, "inputType": 1 }],
            "localMixer": [muted, 100, false],
            "streamMixer": [false, 100, false]
        }
    ])
}

/// Alternates between the hardware and the mixer flavour of mute push.
fn mute_push(muted: bool, hardware: bool) -> Value {
    if hardware {
        json!({
            "jsonrpc": "2.0",
            "method": "microphoneConfigChanged",
            "params": { "identifier": MIC_HW_ID, "property": "Microphone Mute", "value": muted }
        })
    } else {
        json!({
            "jsonrpc": "2.0",
            "method": "inputMuteChanged",
            "params": { "identifier": MIC_ID, "mixerID": "com.elgato.mix.local", "value": muted }
        })
    }
}

async fn serve(stream: TcpStream, mut muted_rx: watch::Receiver<bool>) {
    let mut ws = match tokio_tungstenite::accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            eprintln!("handshake failed: {e}");
            return;
        }
    };
    let mut pushes = 0u64;

    loop {
        tokio::select! {
            changed = muted_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let muted = *muted_rx.borrow_and_update();
                pushes += 1;
                let frame = mute_push(muted, pushes % 2 == 1).to_string();
                if ws.send(Message::text(frame)).await.is_err() {
                    break;
                }
            }
            incoming = ws.next() => {
                let text = match incoming {
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                    Some(Ok(_)) => continue,
                };
                let Ok(req) = serde_json::from_str::<Value>(text.as_str()) else {
                    continue;
                };
                let id = req.get("id").cloned().unwrap_or(Value::Null);
                let reply = match req.get("method").and_then(Value::as_str) {
                    Some("getInputConfigs") => json!({
                        "jsonrpc": "2.0",
                        "id": id,
                        "result": input_configs(*muted_rx.borrow()),
                    }),
                    _ => json!({
                        "jsonrpc": "2.0",
                        "id": id,
                        "error": { "code": -32601, "message": "method not found" },
                    }),
                };
                if ws.send(Message::text(reply.to_string())).await.is_err() {
                    break;
                }
            }
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let args: Vec<String> = std::env::args().collect();

    let addr = parse_arg_value(&args, "--addr")
        .or_else(|| std::env::var("MOCK_WAVE_LINK_ADDR").ok())
        .unwrap_or_else(|| DEFAULT_ADDR.to_string());
    let toggle_every = parse_arg_value(&args, "--toggle-ms")
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or(Duration::from_secs(3));
    let run_for = parse_arg_value(&args, "--run-for-ms")
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_millis);

    let listener = match TcpListener::bind(&addr).await {
        Ok(l) => l,
        Err(e) => {
            eprintln!("failed to bind {addr}: {e}");
            std::process::exit(1);
        }
    };
    match listener.local_addr() {
        Ok(local) => println!("mock_wave_link listening on ws://{local}"),
        Err(_) => println!("mock_wave_link listening on ws://{addr}"),
    }

    let (muted_tx, muted_rx) = watch::channel(false);
    let start = Instant::now();
    let mut toggle = tokio::time::interval(toggle_every);
    toggle.tick().await;

    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    println!("client connected from {peer}");
                    tokio::spawn(serve(stream, muted_rx.clone()));
                }
                Err(e) => eprintln!("accept failed: {e}"),
            },
            _ = toggle.tick() => {
                muted_tx.send_modify(|m| *m = !*m);
                println!("mic muted={}", *muted_tx.borrow());
            }
        }
        if let Some(max) = run_for {
            if start.elapsed() >= max {
                break;
            }
        }
    }
}
