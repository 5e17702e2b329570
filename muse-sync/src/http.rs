//! `RemoteStore` over the JSON note endpoint.

use std::time::Duration;

use muse_core::{
    Config, DeleteRequest, ErrorResponse, Note, NoteAction, SyncCursor, SyncResponse,
};
use reqwest::{
    StatusCode, Url,
    header::{HeaderMap, HeaderValue},
};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::remote::{RemoteError, RemoteStore, ScanFilter, ScanPage};

const API_KEY_HEADER: &str = "x-api-key";

#[derive(Debug, Clone)]
pub struct HttpRemoteStore {
    client: reqwest::Client,
    notes_url: Url,
    timeout: Duration,
}

impl HttpRemoteStore {
    pub fn new(
        notes_url: &str,
        api_key: Option<&str>,
        timeout: Duration,
    ) -> Result<Self, RemoteError> {
        let notes_url = Url::parse(notes_url)
            .map_err(|e| RemoteError::RequestFailed(format!("invalid URL {notes_url}: {e}")))?;

        let mut headers = HeaderMap::new();
        if let Some(key) = api_key {
            headers.insert(
                API_KEY_HEADER,
                HeaderValue::from_str(key)
                    .map_err(|_| RemoteError::RequestFailed("invalid API key".to_string()))?,
            );
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| RemoteError::RequestFailed(e.to_string()))?;

        Ok(Self {
            client,
            notes_url,
            timeout,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, RemoteError> {
        Self::new(&config.notes_url(), config.api_key(), config.remote_timeout())
    }

    pub fn notes_url(&self) -> &str {
        self.notes_url.as_str()
    }

    fn note_url(&self, id: &str) -> Result<Url, RemoteError> {
        let mut url = self.notes_url.clone();
        url.path_segments_mut()
            .map_err(|_| {
                RemoteError::RequestFailed(format!("cannot extend URL {}", self.notes_url))
            })?
            .push(id);
        Ok(url)
    }

    async fn post_action<T: DeserializeOwned>(&self, action: &NoteAction) -> Result<T, RemoteError> {
        let request = self
            .client
            .post(self.notes_url.clone())
            .timeout(self.timeout)
            .json(action);

        let response = request.send().await.map_err(map_transport_error)?;
        decode(check_status(response).await?).await
    }
}

#[async_trait::async_trait]
impl RemoteStore for HttpRemoteStore {
    async fn put(&self, note: &Note) -> Result<Note, RemoteError> {
        debug!("Pushing note {}", note.id);
        self.post_action(&NoteAction::SaveNote { note: note.clone() })
            .await
    }

    async fn get(&self, id: &str) -> Result<Option<Note>, RemoteError> {
        let response = self
            .client
            .get(self.note_url(id)?)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(map_transport_error)?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        decode(check_status(response).await?).await.map(Some)
    }

    async fn delete(&self, id: &str) -> Result<(), RemoteError> {
        let response = self
            .client
            .delete(self.notes_url.clone())
            .timeout(self.timeout)
            .json(&DeleteRequest { id: id.to_string() })
            .send()
            .await
            .map_err(map_transport_error)?;

        check_status(response).await?;
        Ok(())
    }

    async fn scan(&self, filter: ScanFilter) -> Result<ScanPage, RemoteError> {
        match filter {
            ScanFilter::ModifiedAfter(last_sync) => {
                let response: SyncResponse = self
                    .post_action(&NoteAction::SyncNotes {
                        note: SyncCursor { last_sync },
                    })
                    .await?;
                Ok(ScanPage {
                    notes: response.notes,
                    sync_timestamp: Some(response.sync_timestamp),
                })
            }
            ScanFilter::All => {
                let response = self
                    .client
                    .get(self.notes_url.clone())
                    .timeout(self.timeout)
                    .send()
                    .await
                    .map_err(map_transport_error)?;
                let notes: Vec<Note> = decode(check_status(response).await?).await?;
                Ok(ScanPage {
                    notes,
                    sync_timestamp: None,
                })
            }
        }
    }
}

fn map_transport_error(err: reqwest::Error) -> RemoteError {
    if err.is_timeout() {
        RemoteError::Timeout
    } else {
        RemoteError::RequestFailed(err.to_string())
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, RemoteError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorResponse>(&body)
        .map(|e| e.error)
        .unwrap_or(body);

    Err(RemoteError::Status {
        status: status.as_u16(),
        message,
    })
}

async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, RemoteError> {
    response.json::<T>().await.map_err(|e| {
        if e.is_timeout() {
            RemoteError::Timeout
        } else {
            RemoteError::InvalidResponse(e.to_string())
        }
    })
}
