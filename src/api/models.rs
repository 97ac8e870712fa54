//! API data models

use crate::store::Session;
use serde::{Deserialize, Serialize};

/// Request body for saving an API key.
#[derive(Debug, Deserialize)]
pub struct ConfigRequest {
    pub api_key: String,
}

/// Request body for creating a processing session.
#[derive(Debug, Deserialize)]
pub struct SessionRequest {
    pub url: String,
    pub style: Option<String>,
    pub remark: Option<String>,
    #[serde(default)]
    pub include_joke: bool,
}

/// Session listing entry; the heavyweight transcript/note fields are only
/// served from the single-session endpoint.
#[derive(Debug, Serialize)]
pub struct SessionSummary {
    pub id: u64,
    pub url: String,
    pub style: Option<String>,
    pub remark: Option<String>,
    pub status: String,
    pub stage: String,
    pub title: Option<String>,
    pub error: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl From<&Session> for SessionSummary {
    fn from(session: &Session) -> Self {
        Self {
            id: session.id,
            url: session.url.clone(),
            style: session.style.clone(),
            remark: session.remark.clone(),
            status: session.status.as_str().to_string(),
            stage: session.stage.as_str().to_string(),
            title: session.title.clone(),
            error: session.error.clone(),
            created_at: session.created_at,
            updated_at: session.updated_at,
        }
    }
}
