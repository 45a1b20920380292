use std::path::PathBuf;

use kindred_core::discovery::DEFAULT_LOW_WATER_MARK;
use kindred_core::types::DbId;
use kindred_core::undo::DEFAULT_UNDO_DEPTH;

/// Client configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// HTTP base URL of the Kindred server, e.g. `http://localhost:3000`.
    pub api_url: String,
    /// WebSocket base URL, e.g. `ws://localhost:3000`.
    pub ws_url: String,
    /// Bearer access token for the local user.
    pub token: String,
    pub user_id: DbId,
    /// Directory holding one popup-state file per local user.
    pub popup_state_dir: PathBuf,
    pub undo_depth: usize,
    pub low_water_mark: usize,
    /// Number of candidates requested per refill.
    pub refill_batch: usize,
}

impl ClientConfig {
    /// Load configuration from environment variables.
    ///
    /// | Env Var                   | Default                 |
    /// |---------------------------|-------------------------|
    /// | `KINDRED_API_URL`         | `http://localhost:3000` |
    /// | `KINDRED_WS_URL`          | `ws://localhost:3000`   |
    /// | `KINDRED_TOKEN`           | required                |
    /// | `KINDRED_USER_ID`         | required                |
    /// | `KINDRED_POPUP_STATE_DIR` | `.kindred`              |
    /// | `KINDRED_UNDO_DEPTH`      | `10`                    |
    /// | `KINDRED_LOW_WATER_MARK`  | `5`                     |
    /// | `KINDRED_REFILL_BATCH`    | `20`                    |
    ///
    /// # Panics
    ///
    /// Panics on missing required values or unparseable numbers.
    pub fn from_env() -> Self {
        let api_url = std::env::var("KINDRED_API_URL")
            .unwrap_or_else(|_| "http://localhost:3000".into())
            .trim_end_matches('/')
            .to_string();

        let ws_url = std::env::var("KINDRED_WS_URL")
            .unwrap_or_else(|_| "ws://localhost:3000".into())
            .trim_end_matches('/')
            .to_string();

        let token = std::env::var("KINDRED_TOKEN").expect("KINDRED_TOKEN must be set");

        let user_id: DbId = std::env::var("KINDRED_USER_ID")
            .expect("KINDRED_USER_ID must be set")
            .parse()
            .expect("KINDRED_USER_ID must be a valid i64");

        let popup_state_dir = std::env::var("KINDRED_POPUP_STATE_DIR")
            .unwrap_or_else(|_| ".kindred".into())
            .into();

        let undo_depth: usize = std::env::var("KINDRED_UNDO_DEPTH")
            .map(|v| v.parse().expect("KINDRED_UNDO_DEPTH must be a valid usize"))
            .unwrap_or(DEFAULT_UNDO_DEPTH);

        let low_water_mark: usize = std::env::var("KINDRED_LOW_WATER_MARK")
            .map(|v| v.parse().expect("KINDRED_LOW_WATER_MARK must be a valid usize"))
            .unwrap_or(DEFAULT_LOW_WATER_MARK);

        let refill_batch: usize = std::env::var("KINDRED_REFILL_BATCH")
            .unwrap_or_else(|_| "20".into())
            .parse()
            .expect("KINDRED_REFILL_BATCH must be a valid usize");

        Self {
            api_url,
            ws_url,
            token,
            user_id,
            popup_state_dir,
            undo_depth,
            low_water_mark,
            refill_batch,
        }
    }
}
