use std::{sync::OnceLock, time::Duration};

use reqwest::{
    Client,
    header::{ACCEPT, CONTENT_TYPE, USER_AGENT},
};
use serde_json::Value;
use tokio::time::{Instant, timeout_at};
use url::Url;

use crate::{
    config::Config,
    error::{Result, WeerliveError},
    model::Weather,
};

pub const DEFAULT_BASE_URL: &str = "https://weerlive.nl/api/";
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

const WEATHER_PATH: &str = "json-data-10min.php";
const CLIENT_USER_AGENT: &str = concat!("RustWeerlive/", env!("CARGO_PKG_VERSION"));

// Matched literally against the response body.
const INVALID_KEY_MARKER: &str = "Vraag eerst een API-key op";
const RATE_LIMIT_MARKER: &str = "Dagelijkse limiet";

/// Client for the Weerlive API.
///
/// Without [`Weerlive::with_session`] the client creates its own HTTP session
/// on first use and releases it on [`Weerlive::close`] or drop. A session
/// handed in by the caller is used as-is and never released here.
#[derive(Debug)]
pub struct Weerlive {
    api_key: String,
    latitude: f64,
    longitude: f64,
    request_timeout: Duration,
    base_url: String,
    session: OnceLock<Client>,
    close_session: bool,
}

impl Weerlive {
    pub fn new(api_key: impl Into<String>, latitude: f64, longitude: f64) -> Self {
        Self {
            api_key: api_key.into(),
            latitude,
            longitude,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            base_url: DEFAULT_BASE_URL.to_string(),
            session: OnceLock::new(),
            close_session: true,
        }
    }

    /// Build a client from stored configuration.
    ///
    /// A missing API key is not rejected here; the first request fails with
    /// [`WeerliveError::Authentication`] instead.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let location = config.location()?;
        let api_key = config.api_key.clone().unwrap_or_default();

        Ok(Self::new(api_key, location.latitude, location.longitude)
            .with_request_timeout(config.request_timeout()))
    }

    /// Use a caller-owned HTTP session.
    pub fn with_session(mut self, session: Client) -> Self {
        self.session = OnceLock::from(session);
        self.close_session = false;
        self
    }

    pub fn with_request_timeout(mut self, request_timeout: Duration) -> Self {
        self.request_timeout = request_timeout;
        self
    }

    /// Point the client at another API root, e.g. a local mock server.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    pub fn has_session(&self) -> bool {
        self.session.get().is_some()
    }

    /// Whether the client currently holds a session it created itself.
    pub fn owns_session(&self) -> bool {
        self.close_session && self.has_session()
    }

    fn session(&self) -> &Client {
        self.session.get_or_init(|| {
            tracing::debug!("creating HTTP session");
            Client::new()
        })
    }

    /// Perform a GET against `uri`, relative to the API root, and return the
    /// decoded JSON body.
    ///
    /// The API answers most errors with status 200 and an explanatory text
    /// body, so the body is inspected before its content type.
    #[tracing::instrument(level = "debug", skip(self, params))]
    pub async fn request(&self, uri: &str, params: &[(&str, &str)]) -> Result<Value> {
        if self.api_key.is_empty() {
            return Err(WeerliveError::Authentication("No API key provided".to_string()));
        }

        let url = Url::parse(&self.base_url)?.join(uri)?;
        let deadline = deadline_after(self.request_timeout);

        let request = self
            .session()
            .get(url)
            .query(params)
            .header(ACCEPT, "application/json")
            .header(USER_AGENT, CLIENT_USER_AGENT);

        let response = match timeout_at(deadline, request.send()).await {
            Ok(Ok(response)) => response,
            Ok(Err(err)) => return Err(communication_error(err)),
            Err(_) => return Err(timeout_error(self.request_timeout)),
        };

        tracing::debug!(status = %response.status(), "Weerlive response");
        let response = response.error_for_status().map_err(communication_error)?;

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_string();

        let text = match timeout_at(deadline, response.text()).await {
            Ok(Ok(text)) => text,
            Ok(Err(err)) => return Err(communication_error(err)),
            Err(_) => return Err(timeout_error(self.request_timeout)),
        };

        if text.contains(INVALID_KEY_MARKER) {
            tracing::warn!("Weerlive rejected the API key");
            return Err(WeerliveError::Authentication("The given API key is invalid".to_string()));
        }
        if text.contains(RATE_LIMIT_MARKER) {
            tracing::warn!("Weerlive daily rate limit reached");
            return Err(WeerliveError::RateLimit(
                "The API rate limit has been exceeded".to_string(),
            ));
        }

        if !content_type.contains("application/json") {
            return Err(WeerliveError::protocol(
                "Unexpected content type response from the Weerlive API",
                content_type,
                text,
            ));
        }

        match serde_json::from_str(&text) {
            Ok(value) => Ok(value),
            Err(err) => Err(WeerliveError::protocol(
                format!("Invalid JSON response from the Weerlive API: {err}"),
                content_type,
                text,
            )),
        }
    }

    /// Get the current weather and the three day forecast.
    pub async fn weather(&self) -> Result<Weather> {
        let location = self.locatie();
        let params = [("key", self.api_key.as_str()), ("locatie", location.as_str())];
        let data = self.request(WEATHER_PATH, &params).await?;

        let report = data
            .get("liveweer")
            .and_then(|reports| reports.get(0))
            .and_then(Value::as_object)
            .ok_or_else(|| {
                WeerliveError::protocol(
                    "Weerlive response holds no 'liveweer' report",
                    "application/json",
                    data.to_string(),
                )
            })?;

        Ok(Weather::from_upstream(report)?)
    }

    /// `lat,lon`, always with a decimal point (`52.0`, not `52`).
    fn locatie(&self) -> String {
        format!("{:?},{:?}", self.latitude, self.longitude)
    }

    /// Release the HTTP session if this client created it.
    pub fn close(&mut self) {
        if self.close_session && self.session.take().is_some() {
            tracing::debug!("closed HTTP session");
        }
    }
}

impl Drop for Weerlive {
    fn drop(&mut self) {
        self.close();
    }
}

// Roughly thirty years; stands in for timeouts too large to add to `Instant::now()`.
const FAR_FUTURE: Duration = Duration::from_secs(30 * 365 * 24 * 60 * 60);

fn deadline_after(timeout: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(timeout)
        .or_else(|| now.checked_add(FAR_FUTURE))
        .unwrap_or(now)
}

fn communication_error(err: reqwest::Error) -> WeerliveError {
    WeerliveError::connection("Error occurred while communicating with the Weerlive API", err)
}

fn timeout_error(after: Duration) -> WeerliveError {
    WeerliveError::Connection {
        message: format!("Timeout occurred while connecting to the Weerlive API (after {after:?})"),
        source: None,
    }
}

#[cfg(test)]
mod tests {
    use std::net::TcpListener;

    use serde_json::json;
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{header, method, path, query_param},
    };

    use super::*;
    use crate::{
        config::Location,
        error::FormatError,
        testing::{ERROR_AUTH, ERROR_RATE_LIMIT, WEATHER, WEATHER_ALARM, weather},
    };

    const LATITUDE: f64 = 52.1015832;
    const LONGITUDE: f64 = 5.1785422;

    fn client(server: &MockServer) -> Weerlive {
        Weerlive::new("Fake API key", LATITUDE, LONGITUDE)
            .with_base_url(format!("{}/api/", server.uri()))
    }

    async fn serve(server: &MockServer, uri: &str, response: ResponseTemplate) {
        Mock::given(method("GET")).and(path(uri)).respond_with(response).mount(server).await;
    }

    fn json_body(body: &str) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_raw(body, "application/json")
    }

    #[tokio::test]
    async fn json_request_returns_payload() {
        let server = MockServer::start().await;
        serve(&server, "/api/test", json_body(WEATHER)).await;

        let response = client(&server).request("test", &[]).await.expect("request should succeed");
        assert_eq!(response["liveweer"][0]["plaats"], json!("Utrecht"));
    }

    #[tokio::test]
    async fn weather_sends_key_location_and_headers() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/json-data-10min.php"))
            .and(query_param("key", "Fake API key"))
            .and(query_param("locatie", "52.1015832,5.1785422"))
            .and(header("accept", "application/json"))
            .and(header("user-agent", CLIENT_USER_AGENT))
            .respond_with(json_body(WEATHER))
            .expect(1)
            .mount(&server)
            .await;

        let report = client(&server).weather().await.expect("weather should decode");
        assert_eq!(report, weather(WEATHER));
        assert!(!report.alarm);
        assert_eq!(report.alarm_message, None);
    }

    #[tokio::test]
    async fn weather_with_alarm() {
        let server = MockServer::start().await;
        serve(&server, "/api/json-data-10min.php", json_body(WEATHER_ALARM)).await;

        let report = client(&server).weather().await.expect("weather should decode");
        assert!(report.alarm);
        assert!(report.alarm_message.is_some());
    }

    #[tokio::test]
    async fn missing_api_key_fails_before_any_request() {
        let server = MockServer::start().await;
        Mock::given(method("GET")).respond_with(json_body(WEATHER)).expect(0).mount(&server).await;

        let client = Weerlive::new("", LATITUDE, LONGITUDE)
            .with_base_url(format!("{}/api/", server.uri()));
        let err = client.weather().await.unwrap_err();

        assert!(matches!(err, WeerliveError::Authentication(_)));
        assert!(!client.has_session());
        server.verify().await;
    }

    #[tokio::test]
    async fn invalid_api_key_marker() {
        let server = MockServer::start().await;
        serve(&server, "/api/json-data-10min.php", json_body(ERROR_AUTH)).await;

        let err = client(&server).weather().await.unwrap_err();
        assert!(matches!(err, WeerliveError::Authentication(_)));
    }

    #[tokio::test]
    async fn invalid_api_key_marker_ignores_content_type() {
        let server = MockServer::start().await;
        let response = ResponseTemplate::new(200).set_body_raw(ERROR_AUTH, "text/html");
        serve(&server, "/api/json-data-10min.php", response).await;

        let err = client(&server).weather().await.unwrap_err();
        assert!(matches!(err, WeerliveError::Authentication(_)));
    }

    #[tokio::test]
    async fn rate_limit_marker() {
        let server = MockServer::start().await;
        serve(&server, "/api/json-data-10min.php", json_body(ERROR_RATE_LIMIT)).await;

        let err = client(&server).weather().await.unwrap_err();
        assert!(matches!(err, WeerliveError::RateLimit(_)));
    }

    #[tokio::test]
    async fn rate_limit_marker_ignores_content_type() {
        let server = MockServer::start().await;
        let response = ResponseTemplate::new(200).set_body_raw(ERROR_RATE_LIMIT, "text/html");
        serve(&server, "/api/json-data-10min.php", response).await;

        let err = client(&server).weather().await.unwrap_err();
        assert!(matches!(err, WeerliveError::RateLimit(_)));
    }

    #[tokio::test]
    async fn unexpected_content_type() {
        let server = MockServer::start().await;
        let response = ResponseTemplate::new(200).set_body_raw(WEATHER, "text/html");
        serve(&server, "/api/test", response).await;

        let err = client(&server).request("test", &[]).await.unwrap_err();
        match err {
            WeerliveError::Protocol { content_type, body, .. } => {
                assert_eq!(content_type, "text/html");
                assert_eq!(body, WEATHER);
            }
            other => panic!("expected a protocol error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn invalid_json_is_a_protocol_error() {
        let server = MockServer::start().await;
        serve(&server, "/api/test", json_body("{\"liveweer\": [")).await;

        let err = client(&server).request("test", &[]).await.unwrap_err();
        assert!(matches!(err, WeerliveError::Protocol { .. }));
    }

    #[tokio::test]
    async fn missing_report_is_a_protocol_error() {
        let server = MockServer::start().await;
        serve(&server, "/api/json-data-10min.php", json_body("{\"liveweer\": []}")).await;

        let err = client(&server).weather().await.unwrap_err();
        assert!(matches!(err, WeerliveError::Protocol { .. }));
    }

    #[tokio::test]
    async fn malformed_report_is_a_format_error() {
        let server = MockServer::start().await;
        let body = WEATHER.replace("\"07:54\"", "\"zeven uur\"");
        serve(&server, "/api/json-data-10min.php", json_body(&body)).await;

        let err = client(&server).weather().await.unwrap_err();
        assert!(matches!(err, WeerliveError::Format(FormatError::InvalidValue { .. })));
    }

    #[tokio::test]
    async fn timeout_is_a_connection_error() {
        let server = MockServer::start().await;
        let response = json_body(WEATHER).set_delay(Duration::from_millis(500));
        serve(&server, "/api/test", response).await;

        let client = client(&server).with_request_timeout(Duration::from_millis(100));
        let started = Instant::now();
        let err = client.request("test", &[]).await.unwrap_err();

        assert!(matches!(err, WeerliveError::Connection { source: None, .. }));
        assert!(started.elapsed() < Duration::from_millis(450));
    }

    #[tokio::test]
    async fn error_status_wins_over_marker_text() {
        let server = MockServer::start().await;
        let response = ResponseTemplate::new(500).set_body_raw(ERROR_AUTH, "text/plain");
        serve(&server, "/api/test", response).await;

        let err = client(&server).request("test", &[]).await.unwrap_err();
        assert!(matches!(err, WeerliveError::Connection { source: Some(_), .. }));
    }

    #[tokio::test]
    async fn refused_connection_is_a_connection_error() {
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").expect("bind a free port");
            listener.local_addr().expect("local address").port()
        };

        let client = Weerlive::new("test", LATITUDE, LONGITUDE)
            .with_base_url(format!("http://127.0.0.1:{port}/api/"));
        let err = client.request("test", &[]).await.unwrap_err();
        assert!(matches!(err, WeerliveError::Connection { .. }));
    }

    #[tokio::test]
    async fn unresolvable_host_is_a_connection_error() {
        let client = Weerlive::new("test", LATITUDE, LONGITUDE)
            .with_base_url("http://weerlive.invalid/api/");
        let err = client.request("test", &[]).await.unwrap_err();
        assert!(matches!(err, WeerliveError::Connection { source: Some(_), .. }));
    }

    #[tokio::test]
    async fn huge_timeout_does_not_overflow() {
        let server = MockServer::start().await;
        serve(&server, "/api/test", json_body(WEATHER)).await;

        let config = Config {
            api_key: Some("test".into()),
            location: Some(Location { latitude: LATITUDE, longitude: LONGITUDE }),
            request_timeout_secs: Some(u64::MAX),
        };
        let client = Weerlive::from_config(&config)
            .expect("location is set")
            .with_base_url(format!("{}/api/", server.uri()));

        let response = client.request("test", &[]).await.expect("request should succeed");
        assert_eq!(response["liveweer"][0]["plaats"], json!("Utrecht"));
    }

    #[test]
    fn deadline_saturates_for_huge_timeouts() {
        let now = Instant::now();
        assert!(deadline_after(Duration::MAX) > now);
        assert!(deadline_after(Duration::from_secs(5)) <= Instant::now() + Duration::from_secs(5));
    }

    #[tokio::test]
    async fn whole_coordinates_keep_a_decimal_point() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/json-data-10min.php"))
            .and(query_param("locatie", "52.0,5.0"))
            .respond_with(json_body(WEATHER))
            .expect(1)
            .mount(&server)
            .await;

        let client = Weerlive::new("Fake API key", 52.0, 5.0)
            .with_base_url(format!("{}/api/", server.uri()));
        client.weather().await.expect("weather should decode");
        assert_eq!(client.locatie(), "52.0,5.0");
    }

    #[tokio::test]
    async fn internal_session_is_created_and_released() {
        let server = MockServer::start().await;
        serve(&server, "/api/test", json_body(WEATHER)).await;

        let mut client = client(&server);
        assert!(!client.has_session());

        client.request("test", &[]).await.expect("request should succeed");
        assert!(client.owns_session());

        client.close();
        assert!(!client.has_session());
        client.close();
        assert!(!client.has_session());
    }

    #[tokio::test]
    async fn supplied_session_is_never_released() {
        let server = MockServer::start().await;
        serve(&server, "/api/test", json_body(WEATHER)).await;

        let session = Client::new();
        let mut client = client(&server).with_session(session.clone());

        client.request("test", &[]).await.expect("request should succeed");
        assert!(!client.owns_session());

        client.close();
        assert!(client.has_session());
        drop(client);

        let response = session
            .get(format!("{}/api/test", server.uri()))
            .send()
            .await
            .expect("caller's session stays usable");
        assert!(response.status().is_success());
    }

    #[test]
    fn from_config_requires_location() {
        let config = Config { api_key: Some("KEY".into()), ..Config::default() };
        let err = Weerlive::from_config(&config).unwrap_err();
        assert!(err.to_string().contains("No location configured"));
    }

    #[tokio::test]
    async fn from_config_without_key_fails_authentication() {
        let config = Config {
            location: Some(Location { latitude: LATITUDE, longitude: LONGITUDE }),
            request_timeout_secs: Some(3),
            ..Config::default()
        };

        let client = Weerlive::from_config(&config).expect("location is set");
        assert_eq!(client.request_timeout(), Duration::from_secs(3));

        let err = client.weather().await.unwrap_err();
        assert!(matches!(err, WeerliveError::Authentication(_)));
    }
}
