//! WebSocket push connection to a Kindred server.
//!
//! [`PushClient`] holds the endpoint and credentials; [`PushClient::connect`]
//! opens a live [`PushConnection`].

use kindred_core::types::DbId;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::error::ClientError;

pub type PushStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// Connection settings for the local user's push channel.
#[derive(Debug, Clone)]
pub struct PushClient {
    user_id: DbId,
    ws_url: String,
    token: String,
}

/// A live push connection.
pub struct PushConnection {
    pub user_id: DbId,
    pub ws_stream: PushStream,
}

impl PushClient {
    /// * `ws_url` - WebSocket base URL, e.g. `ws://localhost:3000`.
    pub fn new(user_id: DbId, ws_url: String, token: String) -> Self {
        Self {
            user_id,
            ws_url,
            token,
        }
    }

    pub fn user_id(&self) -> DbId {
        self.user_id
    }

    pub fn ws_url(&self) -> &str {
        &self.ws_url
    }

    /// Full endpoint URL. The token travels as a query parameter because
    /// browsers cannot set headers on a WebSocket handshake.
    pub fn endpoint(&self) -> String {
        format!("{}/api/v1/ws?token={}", self.ws_url, self.token)
    }

    pub async fn connect(&self) -> Result<PushConnection, ClientError> {
        let (ws_stream, _response) = connect_async(self.endpoint()).await.map_err(|e| {
            ClientError::Connection(format!(
                "Failed to connect to Kindred at {}: {e}",
                self.ws_url
            ))
        })?;

        tracing::info!(user_id = self.user_id, "Connected to Kindred at {}", self.ws_url);

        Ok(PushConnection {
            user_id: self.user_id,
            ws_stream,
        })
    }
}
