//! REST request/response payloads and the error-kind table.

use serde::{Deserialize, Serialize};

// ─── Requests ────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinRequest {
    pub display_name: Option<String>,
    pub strategy_tag: Option<String>,
    pub character_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionRequest {
    pub action: String,
    /// Movement heading in degrees.
    pub angle: Option<f64>,
    /// Shot aim in degrees.
    pub aim_angle: Option<f64>,
    /// Legacy flag: `move: false` is a stop.
    #[serde(rename = "move")]
    pub move_flag: Option<bool>,
}

// ─── Responses ───────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinResponse {
    pub success: bool,
    pub player_id: String,
    pub match_id: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub starts_at: Option<u64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionResponse {
    pub success: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub success: bool,
    pub error: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_ms: Option<u64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusMatchInfo {
    pub id: String,
    pub phase: String,
    pub player_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub starts_at: Option<u64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusNextMatch {
    pub id: String,
    pub lobby_opens_at: u64,
    pub starts_at: Option<u64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub server_time: u64,
    pub current_match: Option<StatusMatchInfo>,
    pub next_match: Option<StatusNextMatch>,
}

// ─── Error kinds ─────────────────────────────────────────────────────

/// Every failure the gateway can surface. The wire name and HTTP status
/// are fixed; new kinds extend the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Unauthorized,
    InvalidApiKey,
    RateLimited,
    NoMatch,
    MatchInProgress,
    MatchNotActive,
    LobbyFull,
    NotInMatch,
    Dead,
    Eliminated,
    InvalidAction,
    JoinFailed,
    InternalError,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unauthorized => "UNAUTHORIZED",
            Self::InvalidApiKey => "INVALID_API_KEY",
            Self::RateLimited => "RATE_LIMITED",
            Self::NoMatch => "NO_MATCH",
            Self::MatchInProgress => "MATCH_IN_PROGRESS",
            Self::MatchNotActive => "MATCH_NOT_ACTIVE",
            Self::LobbyFull => "LOBBY_FULL",
            Self::NotInMatch => "NOT_IN_MATCH",
            Self::Dead => "DEAD",
            Self::Eliminated => "ELIMINATED",
            Self::InvalidAction => "INVALID_ACTION",
            Self::JoinFailed => "JOIN_FAILED",
            Self::InternalError => "INTERNAL_ERROR",
        }
    }

    pub fn http_status(&self) -> u16 {
        match self {
            Self::Unauthorized | Self::InvalidApiKey => 401,
            Self::RateLimited => 429,
            Self::NoMatch => 404,
            Self::InternalError => 500,
            _ => 400,
        }
    }

    pub fn message(&self) -> String {
        match self {
            Self::Unauthorized => "Missing or malformed Authorization header".to_string(),
            Self::InvalidApiKey => "API key could not be verified".to_string(),
            Self::RateLimited => "Too many actions, slow down".to_string(),
            Self::NoMatch => "No match is currently available".to_string(),
            Self::MatchInProgress => "The match already started".to_string(),
            Self::MatchNotActive => "The match is not active".to_string(),
            Self::LobbyFull => "The lobby is full".to_string(),
            Self::NotInMatch => "You are not in this match".to_string(),
            Self::Dead => "You are dead, wait for respawn".to_string(),
            Self::Eliminated => "You are out of lives".to_string(),
            Self::InvalidAction => "Unknown or malformed action".to_string(),
            Self::JoinFailed => "Could not join the match".to_string(),
            Self::InternalError => "Internal server error".to_string(),
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_kinds_map_to_expected_statuses() {
        assert_eq!(ErrorKind::Unauthorized.http_status(), 401);
        assert_eq!(ErrorKind::InvalidApiKey.http_status(), 401);
        assert_eq!(ErrorKind::RateLimited.http_status(), 429);
        assert_eq!(ErrorKind::NoMatch.http_status(), 404);
        assert_eq!(ErrorKind::InternalError.http_status(), 500);
        assert_eq!(ErrorKind::Dead.http_status(), 400);
        assert_eq!(ErrorKind::LobbyFull.http_status(), 400);
    }

    #[test]
    fn action_request_accepts_wire_shape() {
        let req: ActionRequest =
            serde_json::from_str(r#"{"action":"shoot","aimAngle":90.0}"#).unwrap();
        assert_eq!(req.action, "shoot");
        assert_eq!(req.aim_angle, Some(90.0));
        assert_eq!(req.angle, None);
    }

    #[test]
    fn error_response_includes_retry_hint_only_when_set() {
        let without = ErrorResponse {
            success: false,
            error: ErrorKind::Dead.as_str(),
            message: ErrorKind::Dead.message(),
            retry_after_ms: None,
        };
        let json = serde_json::to_string(&without).unwrap();
        assert!(!json.contains("retryAfterMs"));

        let with = ErrorResponse {
            success: false,
            error: ErrorKind::RateLimited.as_str(),
            message: ErrorKind::RateLimited.message(),
            retry_after_ms: Some(420),
        };
        let json = serde_json::to_string(&with).unwrap();
        assert!(json.contains("\"retryAfterMs\":420"));
    }
}
