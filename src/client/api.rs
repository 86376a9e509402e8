//! Typed HTTP client for the Kinisi API.

use std::future::Future;
use std::time::Duration;

use chrono::NaiveDate;
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::auth::jwt::TokenPair;
use crate::models::action::{Action, ActionType, Frequency, TimeOfDay};
use crate::models::daily_log::{AdjustCountRequest, AdjustCountResponse, DailyLog};
use crate::services::scoring::{CountStep, ScoreSummary, WeeklyTrend};

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Request timed out")]
    Timeout,

    #[error("Service unavailable")]
    Unavailable,

    #[error("Not signed in")]
    NotSignedIn,

    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },
}

impl ClientError {
    fn from_transport(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ClientError::Timeout
        } else if e.is_connect() {
            ClientError::Unavailable
        } else {
            ClientError::Request(e)
        }
    }
}

#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// e.g. "http://localhost:8080"
    pub base_url: String,
    pub request_timeout_ms: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            request_timeout_ms: 5000,
        }
    }
}

/// Where the tracker reads and writes a day's logs.
pub trait LogBackend {
    fn fetch_day(
        &self,
        date: NaiveDate,
    ) -> impl Future<Output = Result<Vec<DailyLog>, ClientError>> + Send;

    fn write_step(
        &self,
        action_id: Uuid,
        date: NaiveDate,
        step: CountStep,
    ) -> impl Future<Output = Result<AdjustCountResponse, ClientError>> + Send;
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct NewAction {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub action_type: Option<ActionType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress_points: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_count: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frequency: Option<Frequency>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_of_day: Option<TimeOfDay>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

pub struct ApiClient {
    client: Client,
    config: ApiConfig,
    access_token: Option<String>,
}

impl ApiClient {
    pub fn new(config: ApiConfig) -> Result<Self, ClientError> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()?;
        Ok(Self {
            client,
            config,
            access_token: None,
        })
    }

    pub fn with_token(mut self, access_token: impl Into<String>) -> Self {
        self.access_token = Some(access_token.into());
        self
    }

    pub fn is_signed_in(&self) -> bool {
        self.access_token.is_some()
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    fn authed(&self, builder: RequestBuilder) -> Result<RequestBuilder, ClientError> {
        let token = self.access_token.as_deref().ok_or(ClientError::NotSignedIn)?;
        Ok(builder.bearer_auth(token))
    }

    async fn send<T: DeserializeOwned>(builder: RequestBuilder) -> Result<T, ClientError> {
        let response = builder.send().await.map_err(ClientError::from_transport)?;
        Self::decode(response).await
    }

    async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, ClientError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response.json().await?);
        }
        let text = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorEnvelope>(&text)
            .map(|e| e.error.message)
            .unwrap_or(text);
        Err(ClientError::Api {
            status: status.as_u16(),
            message,
        })
    }

    /// Sign in and keep the access token for later calls.
    pub async fn login(&mut self, email: &str, password: &str) -> Result<TokenPair, ClientError> {
        let tokens: TokenPair = Self::send(
            self.client
                .post(self.url("/api/auth/login"))
                .json(&serde_json::json!({ "email": email, "password": password })),
        )
        .await?;
        self.access_token = Some(tokens.access_token.clone());
        Ok(tokens)
    }

    pub fn sign_out(&mut self) {
        self.access_token = None;
    }

    pub async fn list_actions(&self) -> Result<Vec<Action>, ClientError> {
        Self::send(self.authed(self.client.get(self.url("/api/actions")))?).await
    }

    pub async fn create_action(&self, action: &NewAction) -> Result<Action, ClientError> {
        Self::send(self.authed(self.client.post(self.url("/api/actions")).json(action))?).await
    }

    pub async fn list_logs(&self, date: NaiveDate) -> Result<Vec<DailyLog>, ClientError> {
        let builder = self
            .client
            .get(self.url("/api/daily-logs"))
            .query(&[("date", date.to_string())]);
        Self::send(self.authed(builder)?).await
    }

    pub async fn adjust(
        &self,
        action_id: Uuid,
        date: NaiveDate,
        step: CountStep,
    ) -> Result<AdjustCountResponse, ClientError> {
        let body = AdjustCountRequest {
            action_id,
            date: Some(date),
            step,
        };
        let builder = self.client.post(self.url("/api/daily-logs/adjust")).json(&body);
        Self::send(self.authed(builder)?).await
    }

    pub async fn summary(&self, date: NaiveDate) -> Result<ScoreSummary, ClientError> {
        let builder = self
            .client
            .get(self.url("/api/stats/summary"))
            .query(&[("date", date.to_string())]);
        Self::send(self.authed(builder)?).await
    }

    pub async fn weekly_trend(&self, days: u32) -> Result<WeeklyTrend, ClientError> {
        let builder = self
            .client
            .get(self.url("/api/stats/weekly"))
            .query(&[("days", days)]);
        Self::send(self.authed(builder)?).await
    }
}

impl LogBackend for ApiClient {
    async fn fetch_day(&self, date: NaiveDate) -> Result<Vec<DailyLog>, ClientError> {
        self.list_logs(date).await
    }

    async fn write_step(
        &self,
        action_id: Uuid,
        date: NaiveDate,
        step: CountStep,
    ) -> Result<AdjustCountResponse, ClientError> {
        self.adjust(action_id, date, step).await
    }
}
