//! NATS connection management

use async_nats::Client;
use tracing::{info, warn};

use crate::config::NatsConfig;
use crate::error::{Error, Result};

/// Connect to NATS server(s), retrying until the first connection succeeds.
pub async fn connect(config: &NatsConfig) -> Result<Client> {
    if config.servers.is_empty() {
        return Err(Error::Connection("no NATS servers configured".to_string()));
    }
    info!(servers = ?config.servers, name = %config.client_name, "Connecting to NATS");

    let mut opts = async_nats::ConnectOptions::new().name(config.client_name.as_str());

    if let Some(ref creds_file) = config.credentials_file {
        opts = opts
            .credentials_file(creds_file)
            .await
            .map_err(|e| Error::Connection(format!("Failed to load credentials: {}", e)))?;
    } else if let (Some(username), Some(password)) = (&config.username, &config.password) {
        opts = opts.user_and_password(username.clone(), password.clone());
    }

    opts = opts
        .event_callback(|event| async move {
            match event {
                async_nats::Event::Connected => info!("Connected to NATS"),
                async_nats::Event::Disconnected => warn!("Disconnected from NATS"),
                async_nats::Event::ClientError(e) => warn!("NATS client error: {}", e),
                _ => {}
            }
        })
        .retry_on_initial_connect()
        .max_reconnects(None);

    let servers: Vec<&str> = config.servers.iter().map(String::as_str).collect();
    let client = opts
        .connect(servers)
        .await
        .map_err(|e| Error::Connection(format!("Failed to connect to NATS: {}", e)))?;

    Ok(client)
}
