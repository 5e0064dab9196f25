use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use tokio::net::UdpSocket;
use tracing_subscriber::EnvFilter;
use turn::auth::{AuthHandler, generate_auth_key};
use turn::relay::relay_range::RelayAddressGeneratorRanges;
use turn::server::Server;
use turn::server::config::{ConnConfig, ServerConfig};
use webrtc_util::vnet::net::Net;

/// Relay allocations are handed out from this UDP port range.
const RELAY_MIN_PORT: u16 = 50000;
const RELAY_MAX_PORT: u16 = 55000;

struct RelayArgs {
    public_ip: String,
    port: u16,
    users: String,
    realm: String,
}

fn parse_args() -> RelayArgs {
    let args: Vec<String> = std::env::args().collect();
    let mut parsed = RelayArgs {
        public_ip: String::new(),
        port: 3478,
        users: String::new(),
        realm: "beacon.local".to_string(),
    };

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--public-ip" => {
                if i + 1 < args.len() {
                    parsed.public_ip = args[i + 1].clone();
                    i += 1;
                }
            }
            "--port" => {
                if i + 1 < args.len() {
                    if let Ok(port) = args[i + 1].parse() {
                        parsed.port = port;
                    }
                    i += 1;
                }
            }
            "--users" => {
                if i + 1 < args.len() {
                    parsed.users = args[i + 1].clone();
                    i += 1;
                }
            }
            "--realm" => {
                if i + 1 < args.len() {
                    parsed.realm = args[i + 1].clone();
                    i += 1;
                }
            }
            _ => {}
        }
        i += 1;
    }

    parsed
}

/// Long-term credential store keyed by username. Keys are precomputed with
/// [`generate_auth_key`] so no plaintext password is kept at runtime.
struct StaticAuthHandler {
    credentials: HashMap<String, Vec<u8>>,
}

impl AuthHandler for StaticAuthHandler {
    fn auth_handle(
        &self,
        username: &str,
        _realm: &str,
        _src_addr: SocketAddr,
    ) -> Result<Vec<u8>, turn::Error> {
        self.credentials
            .get(username)
            .cloned()
            .ok_or_else(|| turn::Error::Other(format!("no such user {username}")))
    }
}

/// Parse `user=pass,user=pass` into auth keys for the given realm.
fn parse_users(users: &str, realm: &str) -> Result<HashMap<String, Vec<u8>>> {
    let mut credentials = HashMap::new();
    for entry in users.split(',') {
        let entry = entry.trim();
        if entry.is_empty() {
            continue;
        }
        let Some((username, password)) = entry.split_once('=') else {
            bail!("invalid credential entry '{entry}' (expected user=pass)");
        };
        if username.is_empty() || password.is_empty() {
            bail!("invalid credential entry '{entry}' (expected user=pass)");
        }
        credentials.insert(
            username.to_string(),
            generate_auth_key(username, realm, password),
        );
    }
    if credentials.is_empty() {
        bail!("no credentials parsed from '{users}'");
    }
    Ok(credentials)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = parse_args();

    let public_ip: IpAddr = args
        .public_ip
        .parse()
        .context("--public-ip is required and must be a valid IP address")?;
    if args.users.is_empty() {
        bail!("--users is required (format: user=pass,user=pass)");
    }
    let credentials = parse_users(&args.users, &args.realm)?;

    let conn = Arc::new(
        UdpSocket::bind(format!("0.0.0.0:{}", args.port))
            .await
            .context("failed to bind TURN listener")?,
    );

    let server = Server::new(ServerConfig {
        conn_configs: vec![ConnConfig {
            conn,
            relay_addr_generator: Box::new(RelayAddressGeneratorRanges {
                relay_address: public_ip,
                min_port: RELAY_MIN_PORT,
                max_port: RELAY_MAX_PORT,
                max_retries: 10,
                address: "0.0.0.0".to_string(),
                net: Arc::new(Net::new(None)),
            }),
        }],
        realm: args.realm.clone(),
        auth_handler: Arc::new(StaticAuthHandler { credentials }),
        channel_bind_timeout: Duration::from_secs(0),
        alloc_close_notify: None,
    })
    .await
    .context("failed to start TURN server")?;

    tracing::info!(
        "TURN relay started on {public_ip}:{} with realm '{}' (relay ports {RELAY_MIN_PORT}-{RELAY_MAX_PORT})",
        args.port,
        args.realm
    );

    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Received SIGINT, closing TURN relay");
        }
        _ = sigterm.recv() => {
            tracing::info!("Received SIGTERM, closing TURN relay");
        }
    }

    server.close().await.context("failed to close TURN server")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_users_accepts_comma_separated_pairs() {
        let credentials = parse_users("alice=wonder,bob=builder", "beacon.local").unwrap();
        assert_eq!(credentials.len(), 2);
        assert!(credentials.contains_key("alice"));
        assert!(credentials.contains_key("bob"));
        // Auth keys are realm-scoped digests, never the raw password.
        assert_ne!(credentials["alice"], b"wonder".to_vec());
    }

    #[test]
    fn parse_users_rejects_malformed_entries() {
        assert!(parse_users("alice", "r").is_err());
        assert!(parse_users("=pass", "r").is_err());
        assert!(parse_users("alice=", "r").is_err());
        assert!(parse_users("", "r").is_err());
    }

    #[test]
    fn auth_handler_rejects_unknown_user() {
        let credentials = parse_users("alice=wonder", "beacon.local").unwrap();
        let handler = StaticAuthHandler { credentials };
        let addr: SocketAddr = "127.0.0.1:3478".parse().unwrap();
        assert!(handler.auth_handle("alice", "beacon.local", addr).is_ok());
        assert!(handler.auth_handle("mallory", "beacon.local", addr).is_err());
    }

    #[test]
    fn auth_keys_differ_per_realm() {
        let a = parse_users("alice=wonder", "realm-a").unwrap();
        let b = parse_users("alice=wonder", "realm-b").unwrap();
        assert_ne!(a["alice"], b["alice"]);
    }
}
