//! HTTP client for the hosted lead store.
//!
//! The backend exposes a PostgREST-style table API: leads are inserted with
//! `POST /rest/v1/leads` and read back with `GET /rest/v1/leads` using
//! `column=eq.value` filters. Requests carry the API key both as `apikey`
//! and as a bearer token.

use std::time::Duration;

use leadrevive_shared::{AppConfig, Lead, LeadReviveError, LeadSink, LeadStatus, NewLead, Result};
use reqwest::{Client, StatusCode};
use tracing::{debug, instrument};
use url::Url;

/// Path of the leads table relative to the backend base URL.
const LEADS_PATH: &str = "rest/v1/leads";

/// Maximum number of bytes of an error body carried into error messages.
const MAX_ERROR_BODY: usize = 300;

/// User-Agent string for backend requests.
const USER_AGENT: &str = concat!("LeadRevive/", env!("CARGO_PKG_VERSION"));

/// Client for the remote lead store.
#[derive(Debug, Clone)]
pub struct BackendClient {
    client: Client,
    leads_url: Url,
    api_key: String,
}

impl BackendClient {
    /// Build a client for `base_url` authenticating with `api_key`.
    pub fn new(base_url: &str, api_key: impl Into<String>, timeout: Duration) -> Result<Self> {
        let mut base = Url::parse(base_url)
            .map_err(|e| LeadReviveError::config(format!("invalid backend URL {base_url}: {e}")))?;
        // Url::join replaces the last segment unless the base ends with '/'
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let leads_url = base
            .join(LEADS_PATH)
            .map_err(|e| LeadReviveError::config(format!("invalid backend URL {base_url}: {e}")))?;

        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| LeadReviveError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            leads_url,
            api_key: api_key.into(),
        })
    }

    /// Build a client from the `[backend]` config section.
    ///
    /// Fails with a config error when no URL is configured or the API key
    /// env var is unset.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let url = config.backend.url.as_deref().ok_or_else(|| {
            LeadReviveError::config("no backend URL configured. Set [backend].url in leadrevive.toml.")
        })?;
        let api_key = leadrevive_shared::resolve_api_key(config)?;
        Self::new(url, api_key, Duration::from_secs(config.backend.timeout_secs))
    }

    /// Insert a batch of leads.
    ///
    /// Returns the number of rows the backend echoed back, or `None` when the
    /// response carried no parseable representation.
    #[instrument(skip_all, fields(rows = leads.len()))]
    pub async fn insert_leads(&self, leads: &[NewLead]) -> Result<Option<usize>> {
        let response = self
            .client
            .post(self.leads_url.clone())
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
            .header("Prefer", "return=representation")
            .json(leads)
            .send()
            .await
            .map_err(|e| LeadReviveError::Network(format!("{}: {e}", self.leads_url)))?;

        let response = check_status(response).await?;

        match response.json::<Vec<serde_json::Value>>().await {
            Ok(rows) => {
                debug!(confirmed = rows.len(), "backend confirmed batch");
                Ok(Some(rows.len()))
            }
            Err(e) => {
                debug!(error = %e, "backend returned no row representation");
                Ok(None)
            }
        }
    }

    /// List a user's leads, newest first, optionally filtered by status.
    #[instrument(skip(self))]
    pub async fn list_leads(
        &self,
        user_id: &str,
        status: Option<LeadStatus>,
        limit: u32,
    ) -> Result<Vec<Lead>> {
        let mut query = vec![
            ("select", "*".to_string()),
            ("user_id", format!("eq.{user_id}")),
            ("order", "created_at.desc".to_string()),
            ("limit", limit.to_string()),
        ];
        if let Some(status) = status {
            query.push(("status", format!("eq.{status}")));
        }

        let response = self
            .client
            .get(self.leads_url.clone())
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
            .query(&query)
            .send()
            .await
            .map_err(|e| LeadReviveError::Network(format!("{}: {e}", self.leads_url)))?;

        let response = check_status(response).await?;

        response
            .json::<Vec<Lead>>()
            .await
            .map_err(|e| LeadReviveError::parse(format!("failed to decode leads: {e}")))
    }
}

impl LeadSink for BackendClient {
    async fn insert_batch(&self, batch: &[NewLead]) -> Result<Option<usize>> {
        self.insert_leads(batch).await
    }
}

/// Map non-success responses onto the error taxonomy.
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = truncate_body(&body);

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(LeadReviveError::Unauthorized(
            if message.is_empty() {
                format!("HTTP {status}")
            } else {
                message
            },
        )),
        _ => Err(LeadReviveError::Backend {
            status: status.as_u16(),
            message: if message.is_empty() {
                status.canonical_reason().unwrap_or("request failed").to_string()
            } else {
                message
            },
        }),
    }
}

/// Prefer the `message` field of a JSON error body, else the raw text.
fn truncate_body(body: &str) -> String {
    let text = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(str::to_string))
        .unwrap_or_else(|| body.trim().to_string());

    if text.len() <= MAX_ERROR_BODY {
        return text;
    }
    let mut end = MAX_ERROR_BODY;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &text[..end])
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn lead(email: &str) -> NewLead {
        NewLead {
            first_name: "Jane".into(),
            last_name: "Doe".into(),
            email: email.into(),
            phone: None,
            company: Some("Acme".into()),
            job_title: None,
            notes: None,
            user_id: "user-1".into(),
            status: LeadStatus::New,
            lead_score: 50,
            source: "csv_import".into(),
        }
    }

    fn client(server: &MockServer) -> BackendClient {
        BackendClient::new(&server.uri(), "secret", Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn leads_url_keeps_base_path() {
        let c = BackendClient::new("https://api.example.com/tenant", "k", Duration::from_secs(1))
            .unwrap();
        assert_eq!(c.leads_url.as_str(), "https://api.example.com/tenant/rest/v1/leads");

        let c = BackendClient::new("https://api.example.com/", "k", Duration::from_secs(1)).unwrap();
        assert_eq!(c.leads_url.as_str(), "https://api.example.com/rest/v1/leads");
    }

    #[test]
    fn invalid_url_is_config_error() {
        let err = BackendClient::new("not a url", "k", Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, LeadReviveError::Config { .. }));
    }

    #[test]
    fn from_config_requires_url() {
        let config = AppConfig::default();
        let err = BackendClient::from_config(&config).unwrap_err();
        assert!(err.to_string().contains("backend URL"));
    }

    #[test]
    fn from_config_requires_api_key() {
        let mut config = AppConfig::default();
        config.backend.url = Some("https://api.example.com".into());
        config.backend.api_key_env = "LEADREVIVE_TEST_KEY_THAT_IS_NEVER_SET".into();
        let err = BackendClient::from_config(&config).unwrap_err();
        assert!(err.to_string().contains("LEADREVIVE_TEST_KEY_THAT_IS_NEVER_SET"));
    }

    #[tokio::test]
    async fn insert_sends_auth_and_counts_echoed_rows() {
        let server = MockServer::start().await;
        let batch = vec![lead("a@example.com"), lead("b@example.com")];

        Mock::given(method("POST"))
            .and(path("/rest/v1/leads"))
            .and(header("apikey", "secret"))
            .and(header("authorization", "Bearer secret"))
            .and(header("prefer", "return=representation"))
            .and(body_json(serde_json::to_value(&batch).unwrap()))
            .respond_with(
                ResponseTemplate::new(201)
                    .set_body_json(serde_json::json!([{ "id": "1" }, { "id": "2" }])),
            )
            .expect(1)
            .mount(&server)
            .await;

        let confirmed = client(&server).insert_batch(&batch).await.unwrap();
        assert_eq!(confirmed, Some(2));
    }

    #[tokio::test]
    async fn insert_short_echo_reports_fewer_rows() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rest/v1/leads"))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!([{ "id": "1" }])))
            .mount(&server)
            .await;

        let confirmed = client(&server)
            .insert_leads(&[lead("a@example.com"), lead("b@example.com")])
            .await
            .unwrap();
        assert_eq!(confirmed, Some(1));
    }

    #[tokio::test]
    async fn insert_without_body_is_unconfirmed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rest/v1/leads"))
            .respond_with(ResponseTemplate::new(201))
            .mount(&server)
            .await;

        let confirmed = client(&server)
            .insert_leads(&[lead("a@example.com")])
            .await
            .unwrap();
        assert_eq!(confirmed, None);
    }

    #[tokio::test]
    async fn unauthorized_is_fatal() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rest/v1/leads"))
            .respond_with(
                ResponseTemplate::new(401).set_body_json(serde_json::json!({ "message": "JWT expired" })),
            )
            .mount(&server)
            .await;

        let err = client(&server)
            .insert_leads(&[lead("a@example.com")])
            .await
            .unwrap_err();
        assert!(matches!(err, LeadReviveError::Unauthorized(ref m) if m == "JWT expired"));
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn conflict_is_a_batch_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rest/v1/leads"))
            .respond_with(ResponseTemplate::new(409).set_body_json(serde_json::json!({
                "message": "duplicate key value violates unique constraint \"leads_user_id_email_key\""
            })))
            .mount(&server)
            .await;

        let err = client(&server)
            .insert_leads(&[lead("a@example.com")])
            .await
            .unwrap_err();
        match &err {
            LeadReviveError::Backend { status, message } => {
                assert_eq!(*status, 409);
                assert!(message.contains("duplicate key"));
            }
            other => panic!("expected Backend error, got {other:?}"),
        }
        assert!(!err.is_fatal());
    }

    #[tokio::test]
    async fn list_leads_applies_filters() {
        let server = MockServer::start().await;
        let now = chrono::Utc::now().to_rfc3339();

        Mock::given(method("GET"))
            .and(path("/rest/v1/leads"))
            .and(query_param("user_id", "eq.user-1"))
            .and(query_param("status", "eq.contacted"))
            .and(query_param("limit", "5"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([{
                "id": "01890a5d-ac96-774b-bcce-b302099a8057",
                "user_id": "user-1",
                "first_name": "Jane",
                "last_name": "Doe",
                "email": "jane@example.com",
                "status": "contacted",
                "lead_score": 70,
                "source": "csv_import",
                "created_at": now,
                "updated_at": now,
            }])))
            .mount(&server)
            .await;

        let leads = client(&server)
            .list_leads("user-1", Some(LeadStatus::Contacted), 5)
            .await
            .unwrap();
        assert_eq!(leads.len(), 1);
        assert_eq!(leads[0].email, "jane@example.com");
        assert_eq!(leads[0].status, LeadStatus::Contacted);
        assert_eq!(leads[0].company, None);
    }

    #[test]
    fn long_error_bodies_are_truncated() {
        let body = "x".repeat(1000);
        let message = truncate_body(&body);
        assert!(message.len() <= MAX_ERROR_BODY + 3);
        assert!(message.ends_with("..."));
    }
}
