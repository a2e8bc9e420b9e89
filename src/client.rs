//! Player-side client for the REST surface.
//!
//! Keeps the room code and player id on disk so a restarted app lands back
//! in the same game, or on the start screen when that game is gone.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::api::{ErrorBody, VoteResult};
use crate::protocol::SessionSnapshot;
use crate::types::{normalize_code, Answer, GamePhase, Player, PlayerId, RoomCode};

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("Please enter a {0}")]
    EmptyInput(&'static str),

    #[error("That room does not exist")]
    RoomNotFound,

    #[error("That game has ended")]
    GameEnded,

    #[error("Not in a room")]
    NotJoined,

    #[error("Invalid server URL: {0}")]
    InvalidUrl(String),

    #[error("Server rejected the request ({status}): {msg}")]
    Server { status: u16, code: String, msg: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Storage error: {0}")]
    Store(#[from] std::io::Error),

    #[error("Invalid stored data: {0}")]
    Json(#[from] serde_json::Error),
}

pub type ClientResult<T> = Result<T, ClientError>;

/// What survives an app restart
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredSession {
    pub room_code: RoomCode,
    pub player_id: PlayerId,
}

/// JSON file holding the current `StoredSession`
#[derive(Debug, Clone)]
pub struct LocalStore {
    path: PathBuf,
}

impl LocalStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn load(&self) -> ClientResult<Option<StoredSession>> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn save(&self, session: &StoredSession) -> ClientResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        tokio::fs::write(&self.path, serde_json::to_vec_pretty(session)?).await?;
        Ok(())
    }

    pub async fn clear(&self) -> ClientResult<()> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[derive(Serialize)]
struct JoinRequest<'a> {
    name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    player_id: Option<&'a str>,
}

#[derive(Serialize)]
struct AnswerRequest<'a> {
    player_id: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct VoteRequest<'a> {
    player_id: &'a str,
}

pub struct PlayerClient {
    base_url: String,
    http: reqwest::Client,
    store: LocalStore,
    session: Option<StoredSession>,
}

impl PlayerClient {
    pub fn new(base_url: impl Into<String>, store: LocalStore) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
            store,
            session: None,
        }
    }

    pub fn session(&self) -> Option<&StoredSession> {
        self.session.as_ref()
    }

    /// `{base}/api/games/{code}/{rest..}` with every segment escaped
    fn game_url(&self, code: &str, rest: &[&str]) -> ClientResult<reqwest::Url> {
        let mut url = reqwest::Url::parse(&self.base_url)
            .map_err(|e| ClientError::InvalidUrl(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|_| ClientError::InvalidUrl(self.base_url.clone()))?
            .pop_if_empty()
            .extend(["api", "games", code])
            .extend(rest);
        Ok(url)
    }

    /// The stored session, if any. An unreadable file is discarded.
    async fn stored(&mut self) -> ClientResult<Option<StoredSession>> {
        match self.store.load().await {
            Err(ClientError::Json(e)) => {
                tracing::warn!("Discarding unreadable session file: {}", e);
                self.leave().await?;
                Ok(None)
            }
            other => other,
        }
    }

    fn current(&self) -> ClientResult<&StoredSession> {
        self.session.as_ref().ok_or(ClientError::NotJoined)
    }

    /// Turn a non-2xx response into a `ClientError`
    async fn check(response: reqwest::Response) -> ClientResult<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body: ErrorBody = response.json().await.unwrap_or_else(|_| ErrorBody {
            code: "HTTP_ERROR".to_string(),
            msg: status.to_string(),
        });
        Err(match body.code.as_str() {
            "ROOM_NOT_FOUND" => ClientError::RoomNotFound,
            "GAME_OVER" => ClientError::GameEnded,
            _ => ClientError::Server {
                status: status.as_u16(),
                code: body.code,
                msg: body.msg,
            },
        })
    }

    async fn fetch_snapshot(&self, code: &str) -> ClientResult<SessionSnapshot> {
        let response = self.http.get(self.game_url(code, &[])?).send().await?;
        Ok(Self::check(response).await?.json().await?)
    }

    /// Pick up the stored room after a restart. Returns None (and forgets
    /// the room) when it no longer exists, its game has ended, or the
    /// stored file cannot be read.
    pub async fn resume(&mut self) -> ClientResult<Option<SessionSnapshot>> {
        let Some(stored) = self.stored().await? else {
            return Ok(None);
        };

        match self.fetch_snapshot(&stored.room_code).await {
            Ok(snapshot) if snapshot.state != GamePhase::GameOver => {
                tracing::info!("Resumed room {}", stored.room_code);
                self.session = Some(stored);
                Ok(Some(snapshot))
            }
            Ok(_) | Err(ClientError::RoomNotFound) | Err(ClientError::GameEnded) => {
                tracing::info!("Stored room {} is gone, back to start", stored.room_code);
                self.leave().await?;
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Join a room by code. Rejoining the stored room keeps the same player.
    pub async fn join(&mut self, code: &str, name: &str) -> ClientResult<Player> {
        let code = normalize_code(code);
        if code.is_empty() {
            return Err(ClientError::EmptyInput("room code"));
        }
        // Room codes are letters only
        if !code.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(ClientError::RoomNotFound);
        }
        let name = name.trim();
        if name.is_empty() {
            return Err(ClientError::EmptyInput("name"));
        }

        let known_id = match &self.session {
            Some(s) if s.room_code == code => Some(s.player_id.clone()),
            Some(_) => None,
            None => self
                .stored()
                .await?
                .filter(|s| s.room_code == code)
                .map(|s| s.player_id),
        };

        let response = self
            .http
            .post(self.game_url(&code, &["players"])?)
            .json(&JoinRequest {
                name,
                player_id: known_id.as_deref(),
            })
            .send()
            .await?;
        let player: Player = Self::check(response).await?.json().await?;

        let stored = StoredSession {
            room_code: code,
            player_id: player.id.clone(),
        };
        self.store.save(&stored).await?;
        self.session = Some(stored);
        Ok(player)
    }

    pub async fn request_start(&self) -> ClientResult<()> {
        let session = self.current()?;
        let url = self.game_url(
            &session.room_code,
            &["players", session.player_id.as_str(), "start"],
        )?;
        Self::check(self.http.post(url).send().await?).await?;
        Ok(())
    }

    pub async fn submit_answer(&self, text: &str) -> ClientResult<Answer> {
        let session = self.current()?;
        let text = text.trim();
        if text.is_empty() {
            return Err(ClientError::EmptyInput("answer"));
        }
        let response = self
            .http
            .post(self.game_url(&session.room_code, &["answers"])?)
            .json(&AnswerRequest {
                player_id: &session.player_id,
                content: text,
            })
            .send()
            .await?;
        Ok(Self::check(response).await?.json().await?)
    }

    pub async fn vote(&self, answer_id: &str) -> ClientResult<()> {
        let session = self.current()?;
        let response = self
            .http
            .post(self.game_url(
                &session.room_code,
                &["answers", answer_id, "votes"],
            )?)
            .json(&VoteRequest {
                player_id: &session.player_id,
            })
            .send()
            .await?;
        let _: VoteResult = Self::check(response).await?.json().await?;
        Ok(())
    }

    pub async fn snapshot(&self) -> ClientResult<SessionSnapshot> {
        let session = self.current()?;
        self.fetch_snapshot(&session.room_code).await
    }

    /// Forget the room locally ("return to start screen")
    pub async fn leave(&mut self) -> ClientResult<()> {
        self.session = None;
        self.store.clear().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_local_store_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::new(dir.path().join("nested").join("session.json"));

        assert_eq!(store.load().await.unwrap(), None);

        let session = StoredSession {
            room_code: "ABCD".to_string(),
            player_id: "01HPLAYER".to_string(),
        };
        store.save(&session).await.unwrap();
        assert_eq!(store.load().await.unwrap(), Some(session));

        store.clear().await.unwrap();
        assert_eq!(store.load().await.unwrap(), None);
        // Clearing twice is fine
        store.clear().await.unwrap();
    }

    #[tokio::test]
    async fn test_corrupt_store_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        tokio::fs::write(&path, b"not json").await.unwrap();

        let store = LocalStore::new(path);
        assert!(matches!(store.load().await, Err(ClientError::Json(_))));
    }

    #[tokio::test]
    async fn test_resume_discards_corrupt_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        tokio::fs::write(&path, b"{ half a file").await.unwrap();

        let mut client = PlayerClient::new("http://127.0.0.1:9", LocalStore::new(&path));
        assert!(client.resume().await.unwrap().is_none());
        assert!(client.session().is_none());
        assert!(!path.exists());
    }

    #[test]
    fn test_game_url_escapes_segments() {
        let client = PlayerClient::new(
            "http://localhost:6866/",
            LocalStore::new("unused.json"),
        );
        let url = client
            .game_url("AB/C", &["answers", "x?y", "votes"])
            .unwrap();
        assert_eq!(
            url.as_str(),
            "http://localhost:6866/api/games/AB%2FC/answers/x%3Fy/votes"
        );
    }

    #[tokio::test]
    async fn test_join_rejects_codes_that_are_not_letters() {
        let dir = tempfile::tempdir().unwrap();
        let mut client =
            PlayerClient::new("http://127.0.0.1:9", LocalStore::new(dir.path().join("s.json")));

        assert!(matches!(
            client.join("AB/../C", "Ada").await,
            Err(ClientError::RoomNotFound)
        ));
        assert!(matches!(
            client.join("AB CD", "Ada").await,
            Err(ClientError::RoomNotFound)
        ));
    }

    #[tokio::test]
    async fn test_join_rejects_empty_input() {
        let dir = tempfile::tempdir().unwrap();
        let mut client =
            PlayerClient::new("http://127.0.0.1:9", LocalStore::new(dir.path().join("s.json")));

        assert!(matches!(
            client.join("   ", "Ada").await,
            Err(ClientError::EmptyInput("room code"))
        ));
        assert!(matches!(
            client.join("ABCD", "  ").await,
            Err(ClientError::EmptyInput("name"))
        ));
        assert!(matches!(
            client.submit_answer("hi").await,
            Err(ClientError::NotJoined)
        ));
    }
}
