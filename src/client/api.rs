use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::{ClientError, ClientResult};
use crate::reports::ClientErrorReport;
use crate::types::*;
use crate::validation::validate_response;

#[derive(Debug, Deserialize)]
struct SessionBody {
    session: GameSession,
}

#[derive(Debug, Deserialize)]
struct ResponseBody {
    response: PlayerResponse,
}

#[derive(Debug, Deserialize)]
struct ProgressBody {
    progress: SessionProgress,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SubmitBody<'a> {
    session_id: &'a str,
    player_id: &'a str,
    response: &'a str,
}

/// REST client for the game server
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn parse<T: DeserializeOwned>(response: reqwest::Response) -> ClientResult<T> {
        let status = response.status();
        if status.is_success() {
            return Ok(response.json::<T>().await?);
        }
        let message = match response.json::<ErrorBody>().await {
            Ok(body) => body
                .message
                .or(body.error)
                .unwrap_or_else(|| status.to_string()),
            Err(_) => status.to_string(),
        };
        Err(ClientError::Api {
            status: status.as_u16(),
            message,
        })
    }

    pub async fn create_session(
        &self,
        mode: GameMode,
        player_id: &str,
        username: &str,
        theme: Option<&str>,
    ) -> ClientResult<GameSession> {
        let response = self
            .http
            .post(self.url("/api/game/create"))
            .json(&json!({
                "mode": mode,
                "playerId": player_id,
                "username": username,
                "theme": theme,
            }))
            .send()
            .await?;
        Ok(Self::parse::<SessionBody>(response).await?.session)
    }

    pub async fn join_session(
        &self,
        session_id: &str,
        player_id: &str,
        username: &str,
    ) -> ClientResult<GameSession> {
        let response = self
            .http
            .post(self.url(&format!("/api/game/join/{}", session_id)))
            .json(&json!({ "playerId": player_id, "username": username }))
            .send()
            .await?;
        Ok(Self::parse::<SessionBody>(response).await?.session)
    }

    pub async fn session_status(&self, session_id: &str) -> ClientResult<GameSession> {
        let response = self
            .http
            .get(self.url(&format!("/api/game/status/{}", session_id)))
            .send()
            .await?;
        Ok(Self::parse::<SessionBody>(response).await?.session)
    }

    pub async fn start_game(&self, session_id: &str, with_door: bool) -> ClientResult<()> {
        let path = if with_door {
            format!("/api/game/start-with-door/{}", session_id)
        } else {
            format!("/api/game/start/{}", session_id)
        };
        let response = self.http.post(self.url(&path)).send().await?;
        Self::parse::<serde_json::Value>(response).await?;
        Ok(())
    }

    /// Submit a response. Text is validated locally first and never sent when invalid.
    pub async fn submit_response(
        &self,
        session_id: &str,
        player_id: &str,
        text: &str,
    ) -> ClientResult<PlayerResponse> {
        let text = validate_response(text)?;
        let response = self
            .http
            .post(self.url("/api/game/submit-response"))
            .json(&SubmitBody {
                session_id,
                player_id,
                response: text,
            })
            .send()
            .await?;
        Ok(Self::parse::<ResponseBody>(response).await?.response)
    }

    pub async fn session_progress(&self, session_id: &str) -> ClientResult<SessionProgress> {
        let response = self
            .http
            .get(self.url(&format!("/api/game/progress/{}", session_id)))
            .send()
            .await?;
        Ok(Self::parse::<ProgressBody>(response).await?.progress)
    }

    pub async fn report_error(&self, report: &ClientErrorReport) -> ClientResult<()> {
        let response = self
            .http
            .post(self.url("/api/errors"))
            .json(report)
            .send()
            .await?;
        Self::parse::<serde_json::Value>(response).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::ValidationError;

    #[tokio::test]
    async fn test_short_response_never_hits_network() {
        // Nothing listens on port 9; a request would fail with an Http error
        let client = ApiClient::new("http://127.0.0.1:9/");
        let err = client.submit_response("s", "p", "  too short ").await.unwrap_err();
        assert!(matches!(
            err,
            ClientError::Validation(ValidationError::TooShort { min: 10, .. })
        ));

        let err = client.submit_response("s", "p", "   ").await.unwrap_err();
        assert!(matches!(err, ClientError::Validation(ValidationError::Empty)));
    }

    #[tokio::test]
    async fn test_unreachable_server_is_http_error() {
        let client = ApiClient::new("http://127.0.0.1:9");
        let err = client.session_status("s").await.unwrap_err();
        assert!(matches!(err, ClientError::Http(_)));
    }

    #[test]
    fn test_base_url_trailing_slash() {
        let client = ApiClient::new("http://localhost:8080/");
        assert_eq!(client.url("/api"), "http://localhost:8080/api");
    }
}
