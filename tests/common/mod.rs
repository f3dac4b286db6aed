#![allow(dead_code)]

use card_gateway::config::GatewayConfig;
use card_gateway::domain::ports::Endpoint;
use card_gateway::infrastructure::in_memory::SimulatedHost;
use card_gateway::protocol::message::TransactionCodec;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

pub const COMPANY_ID: &str = "0044";
pub const TERMINAL_ID: &str = "0001126198308";

/// Gateway config pointing at `primary`, encrypting with the default identity.
pub fn config(primary: u16, secondary: Option<u16>) -> GatewayConfig {
    let mut config = GatewayConfig::new(Endpoint::new("127.0.0.1", primary), COMPANY_ID, TERMINAL_ID);
    config.secondary = secondary.map(|port| Endpoint::new("127.0.0.1", port));
    config.encryption.scheme = Some(card_gateway::protocol::envelope::EncryptionScheme::Tep2);
    config.connect_timeout_ms = 500;
    config.response_timeout_ms = 2_000;
    config
}

pub fn simulated_host(config: &GatewayConfig) -> Arc<SimulatedHost> {
    Arc::new(SimulatedHost::new(
        TransactionCodec::new(config.terminal_profile(), config.envelope()),
        config.frame_codec(),
    ))
}

/// A port nothing is listening on.
pub fn closed_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

/// Answers every framed request on `listener` through `host`.
pub async fn serve(listener: TcpListener, host: Arc<SimulatedHost>) {
    let codes = card_gateway::protocol::frame::FrameCodec::default();
    while let Ok((mut socket, _)) = listener.accept().await {
        let host = host.clone();
        tokio::spawn(async move {
            let mut buf = Vec::new();
            let mut chunk = [0u8; 1024];
            loop {
                let n = match socket.read(&mut chunk).await {
                    Ok(0) | Err(_) => return,
                    Ok(n) => n,
                };
                buf.extend_from_slice(&chunk[..n]);
                if let Some(len) = codes.complete_len(&buf) {
                    if let Ok(reply) = host.respond(&buf[..len]).await {
                        let _ = socket.write_all(&reply).await;
                    }
                    return;
                }
            }
        });
    }
}

/// Starts a host on a background thread with its own runtime.
pub fn spawn_host_thread(config: &GatewayConfig) -> u16 {
    let host = simulated_host(config);
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.set_nonblocking(true).unwrap();
    let port = listener.local_addr().unwrap().port();

    std::thread::spawn(move || {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        runtime.block_on(async move {
            let listener = TcpListener::from_std(listener).unwrap();
            serve(listener, host).await;
        });
    });
    port
}

pub fn write_config(dir: &Path, primary: u16, secondary: Option<u16>) -> PathBuf {
    let mut toml = format!(
        "company_id = \"{}\"\nterminal_id = \"{}\"\nconnect_timeout_ms = 500\nresponse_timeout_ms = 2000\n\n[primary]\nhost = \"127.0.0.1\"\nport = {}\n",
        COMPANY_ID, TERMINAL_ID, primary
    );
    if let Some(port) = secondary {
        toml.push_str(&format!("\n[secondary]\nhost = \"127.0.0.1\"\nport = {}\n", port));
    }
    toml.push_str("\n[encryption]\nscheme = \"tep2\"\n");

    let path = dir.join("gateway.toml");
    fs::write(&path, toml).unwrap();
    path
}

pub fn write_requests(dir: &Path, rows: &[[&str; 6]]) -> PathBuf {
    let path = dir.join("requests.csv");
    let mut wtr = csv::Writer::from_path(&path).unwrap();
    wtr.write_record(["type", "amount", "currency", "card_number", "expiry", "cvn"])
        .unwrap();
    for row in rows {
        wtr.write_record(row).unwrap();
    }
    wtr.flush().unwrap();
    path
}
