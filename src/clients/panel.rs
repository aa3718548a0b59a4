use anyhow::{Result, anyhow};
use chrono::{DateTime, Months, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};

/// Credentials that put the client into simulation mode. No network calls are
/// made; handlers get deterministic-shaped mock data instead.
const SIMULATION_CREDENTIAL: &str = "test";

#[derive(Debug, Clone)]
pub struct PanelConfig {
    pub base_url: String,

    pub api_key: String,

    pub auth_user: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateLineRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    pub package: i32,

    pub rid: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RenewLineRequest {
    pub package: i32,

    pub rid: String,
}

/// Response shape shared by line creation and renewal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineTransaction {
    pub line_id: String,

    pub expire_at: DateTime<Utc>,

    pub transaction_amount: f64,

    pub rid: String,
}

/// A managed account record as the panel reports it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Line {
    pub line_id: String,

    pub username: String,

    pub password: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mac_addr: Option<String>,

    #[serde(default)]
    pub owner: String,

    #[serde(rename = "type", default)]
    pub line_type: String,

    pub expire_at: DateTime<Utc>,

    #[serde(default)]
    pub is_enabled: bool,

    #[serde(default)]
    pub is_trial: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package_id: Option<i32>,

    #[serde(default)]
    pub bouquets: Vec<i32>,

    #[serde(default)]
    pub max_connections: i32,
}

#[derive(Debug, Deserialize)]
struct PanelErrorBody {
    #[serde(default)]
    error: String,

    #[serde(default)]
    rid: String,
}

#[derive(Clone)]
pub struct PanelClient {
    config: PanelConfig,
    client: Client,
}

impl PanelClient {
    pub fn new(config: PanelConfig, timeout_seconds: u64) -> Self {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_seconds))
            .user_agent(concat!("resellarr/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_default();

        Self { config, client }
    }

    /// Test credentials switch every operation to mock responses.
    #[must_use]
    pub fn is_simulation_mode(&self) -> bool {
        self.config.api_key == SIMULATION_CREDENTIAL
            && self.config.auth_user == SIMULATION_CREDENTIAL
    }

    pub async fn create_line(&self, req: &CreateLineRequest) -> Result<LineTransaction> {
        let url = format!("{}/ext/line/create", self.config.base_url);
        let request = self
            .client
            .post(&url)
            .header("X-Api-Key", &self.config.api_key)
            .header("X-Auth-User", &self.config.auth_user)
            .json(req);

        self.send(request).await
    }

    pub async fn find_lines(&self, username: &str) -> Result<Vec<Line>> {
        let url = format!("{}/ext/lines", self.config.base_url);
        let request = self
            .client
            .get(&url)
            .query(&[("username", username)])
            .header("X-Api-Key", &self.config.api_key)
            .header("X-Auth-User", &self.config.auth_user);

        self.send(request).await
    }

    pub async fn renew_line(
        &self,
        line_id: &str,
        req: &RenewLineRequest,
    ) -> Result<LineTransaction> {
        let url = format!("{}/ext/line/{}/renew", self.config.base_url, line_id);
        let request = self
            .client
            .post(&url)
            .header("X-Api-Key", &self.config.api_key)
            .header("X-Auth-User", &self.config.auth_user)
            .json(req);

        self.send(request).await
    }

    async fn send<T: serde::de::DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<T> {
        let response = request
            .send()
            .await
            .map_err(|e| anyhow!("error making request: {e}"))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_error(status.as_u16(), &body));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| anyhow!("error decoding response: {e}"))
    }

    // ------------------------------------------------------------------
    // Simulation mode
    // ------------------------------------------------------------------

    #[must_use]
    pub fn simulate_create_line(&self, req: &CreateLineRequest) -> LineTransaction {
        LineTransaction {
            line_id: sim_line_id(),
            expire_at: expiry_for_package(req.package),
            transaction_amount: transaction_amount(req.package),
            rid: req.rid.clone(),
        }
    }

    #[must_use]
    pub fn simulate_find_lines(&self, username: &str) -> Vec<Line> {
        use rand::Rng;
        let mut rng = rand::rng();

        let count = if username.is_empty() {
            1 + rng.random_range(0..3)
        } else {
            1
        };

        (0..count)
            .map(|_| {
                let sim_username = if username.is_empty() {
                    format!("test_user_{:04}", rng.random_range(0..10_000))
                } else {
                    username.to_string()
                };

                Line {
                    line_id: sim_line_id(),
                    username: sim_username,
                    password: format!("TestPass{:04}!", rng.random_range(0..10_000)),
                    mac_addr: None,
                    owner: SIMULATION_CREDENTIAL.to_string(),
                    line_type: "line".to_string(),
                    expire_at: months_from_now(rng.random_range(1..=12)),
                    is_enabled: true,
                    is_trial: false,
                    package_id: None,
                    bouquets: Vec::new(),
                    max_connections: 1,
                }
            })
            .collect()
    }

    #[must_use]
    pub fn simulate_renew_line(&self, line_id: &str, req: &RenewLineRequest) -> LineTransaction {
        LineTransaction {
            line_id: line_id.to_string(),
            expire_at: expiry_for_package(req.package),
            transaction_amount: transaction_amount(req.package),
            rid: req.rid.clone(),
        }
    }
}

fn sim_line_id() -> String {
    format!("sim-{}", uuid::Uuid::new_v4())
}

/// Package codes encode the duration in their low digits: 101 is one month,
/// 112 twelve, 124 twenty-four.
fn expiry_for_package(package: i32) -> DateTime<Utc> {
    let months = u32::try_from(package.rem_euclid(100)).unwrap_or(1).max(1);
    months_from_now(months)
}

fn months_from_now(months: u32) -> DateTime<Utc> {
    Utc::now()
        .checked_add_months(Months::new(months))
        .unwrap_or_else(Utc::now)
}

fn transaction_amount(package: i32) -> f64 {
    match package {
        103 => 270.0,
        106 => 500.0,
        112 => 950.0,
        124 => 1800.0,
        _ => 100.0,
    }
}

/// The panel fronts its API with a web server that happily answers JSON
/// endpoints with HTML error pages, so misconfigured base URLs show up as
/// markup rather than an error envelope.
fn is_html_body(body: &str) -> bool {
    ["<!DOCTYPE", "<html", "<body", "<head", "<title"]
        .iter()
        .any(|marker| body.contains(marker))
}

fn connection_hint(status: u16) -> &'static str {
    if status == 404 {
        "The panel URL is incorrect or the service could not be found. Please check your settings."
    } else if status >= 500 {
        "The external service is currently unavailable. Please try again later."
    } else {
        "Could not connect to the panel. Please verify your panel URL and try again."
    }
}

fn classify_error(status: u16, body: &str) -> anyhow::Error {
    if is_html_body(body) {
        return anyhow!("connection error: {}", connection_hint(status));
    }

    if body.trim_start().starts_with('{') {
        if let Ok(err) = serde_json::from_str::<PanelErrorBody>(body) {
            return anyhow!("API error: {} (RID: {})", err.error, err.rid);
        }
        return anyhow!("error response (status {status}): {body}");
    }

    anyhow!("unexpected response (status {status}): {body}")
}

/// Error messages are persisted into task results and shown verbatim in the
/// UI; rewrite anything that still carries HTML.
#[must_use]
pub fn sanitize_error_message(message: &str) -> String {
    if is_html_body(message) {
        "Connection error: The external service URL appears to be incorrect or not responding properly."
            .to_string()
    } else {
        message.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_client(api_key: &str, auth_user: &str) -> PanelClient {
        PanelClient::new(
            PanelConfig {
                base_url: "http://localhost:9999".to_string(),
                api_key: api_key.to_string(),
                auth_user: auth_user.to_string(),
            },
            5,
        )
    }

    #[test]
    fn test_simulation_mode_detection() {
        assert!(test_client("test", "test").is_simulation_mode());
        assert!(!test_client("test", "real-user").is_simulation_mode());
        assert!(!test_client("real-key", "test").is_simulation_mode());
    }

    #[test]
    fn test_simulated_create_line_shape() {
        let client = test_client("test", "test");
        let req = CreateLineRequest {
            username: Some("alice".to_string()),
            password: Some("secret".to_string()),
            package: 103,
            rid: "rid-1".to_string(),
        };

        let tx = client.simulate_create_line(&req);
        assert!(tx.line_id.starts_with("sim-"));
        assert_eq!(tx.rid, "rid-1");
        assert!((tx.transaction_amount - 270.0).abs() < f64::EPSILON);
        assert!(tx.expire_at > Utc::now());
    }

    #[test]
    fn test_simulated_find_respects_username_filter() {
        let client = test_client("test", "test");

        let lines = client.simulate_find_lines("bob");
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].username, "bob");

        let lines = client.simulate_find_lines("");
        assert!((1..=3).contains(&lines.len()));
    }

    #[test]
    fn test_transaction_amount_table() {
        assert!((transaction_amount(101) - 100.0).abs() < f64::EPSILON);
        assert!((transaction_amount(124) - 1800.0).abs() < f64::EPSILON);
        // Unknown codes fall back to the smallest package price.
        assert!((transaction_amount(999) - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_html_error_classification() {
        let err = classify_error(404, "<!DOCTYPE html><html><body>Not Found</body></html>");
        assert!(err.to_string().contains("panel URL is incorrect"));

        let err = classify_error(502, "<html><head><title>Bad Gateway</title></head></html>");
        assert!(err.to_string().contains("currently unavailable"));
    }

    #[test]
    fn test_json_error_envelope_classification() {
        let err = classify_error(400, r#"{"error":"invalid package","rid":"r-42"}"#);
        let msg = err.to_string();
        assert!(msg.contains("invalid package"));
        assert!(msg.contains("r-42"));
    }

    #[test]
    fn test_sanitize_rewrites_html() {
        let cleaned = sanitize_error_message("<html>mojibake</html>");
        assert!(!cleaned.contains("<html>"));
        assert_eq!(sanitize_error_message("plain error"), "plain error");
    }
}
