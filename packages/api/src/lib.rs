#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Client for the citizen safety backend.
//!
//! Wraps the three backend surfaces the alerting engine consumes:
//!
//! * `GET /api/crime-data` bulk incident fetch
//! * `/api/citizen/geofencing` zone persistence (list, create, delete-all)
//! * `GET /api/crime-data/stream` live `new_crime` events over SSE
//!
//! Incident records are returned as raw JSON; validating them is the
//! engine's job.

pub mod retry;
pub mod sse;

use std::time::Duration;

use futures::{Stream, StreamExt as _};
use safezone_geo::Coordinate;
use safezone_zone_models::{Zone, ZoneId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::retry::Retry;
use crate::sse::{SseDecoder, SseError};

const INCIDENTS_PATH: &str = "/api/crime-data";
const INCIDENT_STREAM_PATH: &str = "/api/crime-data/stream";
const ZONES_PATH: &str = "/api/citizen/geofencing";

/// SSE event name carrying a single incident record.
pub const NEW_CRIME_EVENT: &str = "new_crime";

/// How long the live stream may stay silent before it is treated as dead.
pub const DEFAULT_STREAM_IDLE_TIMEOUT: Duration = Duration::from_secs(300);

/// Errors from backend calls.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The backend could not be reached.
    #[error("backend unavailable: {0}")]
    Unavailable(#[from] reqwest::Error),

    /// The backend answered with an error status.
    #[error("backend returned HTTP {status}")]
    Status {
        /// The final status code.
        status: reqwest::StatusCode,
    },

    /// The body was not valid JSON.
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    /// The body was JSON but not the expected shape.
    #[error("unexpected response: {message}")]
    UnexpectedResponse {
        /// What was wrong with it.
        message: String,
    },

    /// The live stream delivered nothing for longer than the idle timeout.
    #[error("incident stream silent for {idle:?}")]
    StreamIdle {
        /// The idle timeout that expired.
        idle: Duration,
    },

    /// The live stream was not valid `text/event-stream`.
    #[error("malformed incident stream: {0}")]
    Stream(#[from] SseError),
}

impl ApiError {
    /// Whether the failure is the backend being unreachable or overloaded,
    /// as opposed to a request the backend will never accept.
    #[must_use]
    pub fn is_upstream_unavailable(&self) -> bool {
        match self {
            Self::Unavailable(_) | Self::StreamIdle { .. } => true,
            Self::Status { status } => retry::is_retryable_status(*status),
            Self::Json(_) | Self::UnexpectedResponse { .. } | Self::Stream(_) => false,
        }
    }
}

/// A zone as stored by the backend.
#[derive(Debug, Clone, Deserialize)]
struct StoredGeofence {
    #[serde(rename = "_id")]
    id: String,
    name: String,
    radius: f64,
    coordinate: Coordinate,
}

impl TryFrom<StoredGeofence> for Zone {
    type Error = safezone_zone_models::ValidationError;

    fn try_from(stored: StoredGeofence) -> Result<Self, Self::Error> {
        Self::new(
            ZoneId::new(stored.id),
            stored.name,
            stored.coordinate,
            stored.radius,
        )
    }
}

#[derive(Debug, Deserialize)]
struct GeofenceListResponse {
    status: String,
    #[serde(default)]
    geofences: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct GeofenceCreateResponse {
    #[serde(default)]
    geofence: Option<Value>,
}

#[derive(Debug, Serialize)]
struct CreateGeofence<'a> {
    name: &'a str,
    radius: f64,
    coordinate: Coordinate,
}

/// HTTP client bound to one backend.
#[derive(Debug, Clone)]
pub struct ApiClient {
    base_url: String,
    client: reqwest::Client,
    /// No overall timeout, since the event stream is long-lived.
    stream_client: reqwest::Client,
    stream_idle_timeout: Duration,
}

impl ApiClient {
    /// Creates a client for `base_url` with a per-request `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Unavailable`] if the TLS backend fails to
    /// initialise.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        let stream_client = reqwest::Client::builder()
            .connect_timeout(timeout)
            .build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            stream_client,
            stream_idle_timeout: DEFAULT_STREAM_IDLE_TIMEOUT,
        })
    }

    /// Sets how long [`ApiClient::incident_stream`] waits for data before
    /// failing with [`ApiError::StreamIdle`].
    #[must_use]
    pub const fn with_stream_idle_timeout(mut self, idle: Duration) -> Self {
        self.stream_idle_timeout = idle;
        self
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// Fetches every known incident record.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] if the request fails or the body is not a JSON
    /// array.
    pub async fn fetch_incidents(&self) -> Result<Vec<Value>, ApiError> {
        let url = self.url(INCIDENTS_PATH);
        let body = retry::send_json(|| self.client.get(&url), Retry::Idempotent).await?;
        parse_incident_list(body)
    }

    /// Lists the zones persisted for this user. Malformed zones are logged
    /// and skipped.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] if the request fails or the backend reports a
    /// non-success status.
    pub async fn list_zones(&self) -> Result<Vec<Zone>, ApiError> {
        let url = self.url(ZONES_PATH);
        let body = retry::send_json(|| self.client.get(&url), Retry::Idempotent).await?;
        parse_zone_list(body)
    }

    /// Persists a new zone and returns it with its server-assigned id.
    ///
    /// The POST is not repeated once it may have reached the server, so a
    /// timeout can leave the outcome unknown but never stores the zone twice.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] if the request fails or the created zone cannot
    /// be found in the response.
    pub async fn create_zone(
        &self,
        name: &str,
        radius_km: f64,
        center: Coordinate,
    ) -> Result<Zone, ApiError> {
        let url = self.url(ZONES_PATH);
        let payload = CreateGeofence {
            name,
            radius: radius_km,
            coordinate: center,
        };
        let body = retry::send_json(
            || self.client.post(&url).json(&payload),
            Retry::ConnectOnly,
        )
        .await?;

        let created: GeofenceCreateResponse = serde_json::from_value(body)?;
        if let Some(geofence) = created.geofence {
            return parse_zone(geofence).ok_or_else(|| ApiError::UnexpectedResponse {
                message: "created geofence is malformed".to_string(),
            });
        }

        // Older backends only acknowledge; find the zone by listing.
        log::debug!("Create response had no geofence, re-listing zones");
        self.list_zones()
            .await?
            .into_iter()
            .rev()
            .find(|z| z.name == name)
            .ok_or_else(|| ApiError::UnexpectedResponse {
                message: format!("created zone {name:?} not found in zone list"),
            })
    }

    /// Deletes every persisted zone.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] if the request fails.
    pub async fn clear_zones(&self) -> Result<(), ApiError> {
        let url = self.url(ZONES_PATH);
        retry::send(|| self.client.delete(&url), Retry::Idempotent).await?;
        Ok(())
    }

    /// Opens the live incident stream.
    ///
    /// Yields one raw record per `new_crime` event until the connection
    /// closes. A connection that stays silent past the idle timeout ends with
    /// [`ApiError::StreamIdle`]. Reconnection is left to the caller.
    pub fn incident_stream(&self) -> impl Stream<Item = Result<Value, ApiError>> + Send + '_ {
        async_stream::try_stream! {
            let url = self.url(INCIDENT_STREAM_PATH);
            let response = self
                .stream_client
                .get(&url)
                .header(reqwest::header::ACCEPT, "text/event-stream")
                .send()
                .await?;

            let status = response.status();
            if !status.is_success() {
                Err::<(), _>(ApiError::Status { status })?;
            }
            log::info!("Connected to incident stream at {url}");

            let idle = self.stream_idle_timeout;
            let mut decoder = SseDecoder::new();
            let mut body = response.bytes_stream();

            loop {
                let next = tokio::time::timeout(idle, body.next())
                    .await
                    .map_err(|_| ApiError::StreamIdle { idle })?;
                let Some(chunk) = next else {
                    break;
                };
                let chunk = chunk?;
                for event in decoder.push(&chunk)? {
                    if let Some(record) = parse_event(&event) {
                        yield record;
                    }
                }
            }

            log::info!("Incident stream closed by server");
        }
    }
}

fn parse_event(event: &sse::SseEvent) -> Option<Value> {
    if event.event != NEW_CRIME_EVENT {
        log::trace!("Ignoring {:?} event", event.event);
        return None;
    }
    match serde_json::from_str(&event.data) {
        Ok(record) => Some(record),
        Err(e) => {
            log::warn!("Ignoring {NEW_CRIME_EVENT} event with malformed payload: {e}");
            None
        }
    }
}

fn parse_incident_list(body: Value) -> Result<Vec<Value>, ApiError> {
    match body {
        Value::Array(records) => Ok(records),
        other => Err(ApiError::UnexpectedResponse {
            message: format!("expected an array of incidents, got {}", json_kind(&other)),
        }),
    }
}

fn parse_zone_list(body: Value) -> Result<Vec<Zone>, ApiError> {
    let response: GeofenceListResponse = serde_json::from_value(body)?;
    if response.status != "success" {
        return Err(ApiError::UnexpectedResponse {
            message: format!("zone list status {:?}", response.status),
        });
    }
    Ok(response.geofences.into_iter().filter_map(parse_zone).collect())
}

fn parse_zone(raw: Value) -> Option<Zone> {
    let stored: StoredGeofence = match serde_json::from_value(raw) {
        Ok(stored) => stored,
        Err(e) => {
            log::warn!("Skipping malformed stored zone: {e}");
            return None;
        }
    };
    let id = stored.id.clone();
    match Zone::try_from(stored) {
        Ok(zone) => Some(zone),
        Err(e) => {
            log::warn!("Skipping stored zone {id}: {e}");
            None
        }
    }
}

const fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn incident_list_must_be_an_array() {
        let records = parse_incident_list(json!([{"_id": "a"}, {"_id": "b"}])).unwrap();
        assert_eq!(records.len(), 2);

        let err = parse_incident_list(json!({"error": "boom"})).unwrap_err();
        assert!(matches!(err, ApiError::UnexpectedResponse { .. }));
    }

    #[test]
    fn zone_list_skips_malformed_entries() {
        let zones = parse_zone_list(json!({
            "status": "success",
            "geofences": [
                {"_id": "g1", "name": "Home", "radius": 2,
                 "coordinate": {"latitude": 19.076, "longitude": 72.8777}},
                {"_id": "g2", "name": "", "radius": 2,
                 "coordinate": {"latitude": 19.076, "longitude": 72.8777}},
                {"_id": "g3", "name": "Bad radius", "radius": 0,
                 "coordinate": {"latitude": 19.076, "longitude": 72.8777}},
                {"_id": "g4", "name": "No center", "radius": 1},
                {"_id": "g5", "name": "Off map", "radius": 1,
                 "coordinate": {"latitude": 190.0, "longitude": 0.0}},
            ]
        }))
        .unwrap();

        assert_eq!(zones.len(), 1);
        assert_eq!(zones[0].id.as_str(), "g1");
        assert!((zones[0].radius_km - 2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn zone_list_rejects_failure_status() {
        let err = parse_zone_list(json!({"status": "error"})).unwrap_err();
        assert!(matches!(err, ApiError::UnexpectedResponse { .. }));
    }

    #[test]
    fn only_new_crime_events_become_records() {
        let crime = sse::SseEvent {
            event: NEW_CRIME_EVENT.to_string(),
            data: r#"{"_id":"a","lat":1,"lng":2}"#.to_string(),
        };
        assert_eq!(parse_event(&crime).unwrap()["_id"], "a");

        let ping = sse::SseEvent {
            event: "ping".to_string(),
            data: "{}".to_string(),
        };
        assert!(parse_event(&ping).is_none());

        let garbled = sse::SseEvent {
            event: NEW_CRIME_EVENT.to_string(),
            data: "{not json".to_string(),
        };
        assert!(parse_event(&garbled).is_none());
    }

    #[test]
    fn create_payload_uses_backend_field_names() {
        let payload = CreateGeofence {
            name: "Home",
            radius: 2.5,
            coordinate: Coordinate::new(19.076, 72.8777).unwrap(),
        };
        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(value["radius"], 2.5);
        assert_eq!(value["coordinate"]["latitude"], 19.076);
    }

    #[test]
    fn unavailable_classification() {
        assert!(
            ApiError::Status {
                status: reqwest::StatusCode::SERVICE_UNAVAILABLE
            }
            .is_upstream_unavailable()
        );
        assert!(
            !ApiError::Status {
                status: reqwest::StatusCode::BAD_REQUEST
            }
            .is_upstream_unavailable()
        );
    }

    #[test]
    fn trims_trailing_slash() {
        let client = ApiClient::new("http://localhost:5000/", Duration::from_secs(5)).unwrap();
        assert_eq!(client.url(INCIDENTS_PATH), "http://localhost:5000/api/crime-data");
    }

    mod http {
        //! Minimal HTTP/1.1 server for exercising the client end to end.

        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::{Arc, Mutex};
        use std::time::Duration;

        use tokio::io::{AsyncReadExt as _, AsyncWriteExt as _};
        use tokio::net::{TcpListener, TcpStream};

        /// What the server does with one request.
        pub enum Reply {
            /// Write this raw response and close.
            Send(String),
            /// Write the headers (and any body so far) then hold the
            /// connection open without sending anything else.
            Stall(String),
        }

        pub struct TestServer {
            pub base_url: String,
            requests: Arc<Mutex<Vec<String>>>,
            hits: Arc<AtomicUsize>,
        }

        impl TestServer {
            /// Request lines seen so far, e.g. `"POST /api/citizen/geofencing"`.
            pub fn requests(&self) -> Vec<String> {
                self.requests.lock().unwrap().clone()
            }

            pub fn hits(&self) -> usize {
                self.hits.load(Ordering::SeqCst)
            }
        }

        pub fn json(status: &str, body: &str) -> String {
            format!(
                "HTTP/1.1 {status}\r\nContent-Type: application/json\r\n\
                 Content-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            )
        }

        pub fn event_stream(body: &str) -> String {
            format!(
                "HTTP/1.1 200 OK\r\nContent-Type: text/event-stream\r\n\
                 Connection: close\r\n\r\n{body}"
            )
        }

        /// Serves `handler(request_line, attempt)` where `attempt` counts
        /// earlier requests with the same request line.
        pub async fn serve<F>(handler: F) -> TestServer
        where
            F: Fn(&str, usize) -> Reply + Send + Sync + 'static,
        {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let base_url = format!("http://{}", listener.local_addr().unwrap());
            let requests = Arc::new(Mutex::new(Vec::new()));
            let hits = Arc::new(AtomicUsize::new(0));
            let handler = Arc::new(handler);

            let seen = requests.clone();
            let counter = hits.clone();
            tokio::spawn(async move {
                loop {
                    let Ok((socket, _)) = listener.accept().await else {
                        break;
                    };
                    counter.fetch_add(1, Ordering::SeqCst);
                    let seen = seen.clone();
                    let handler = handler.clone();
                    tokio::spawn(async move {
                        handle(socket, &seen, handler.as_ref()).await;
                    });
                }
            });

            TestServer {
                base_url,
                requests,
                hits,
            }
        }

        async fn handle<F>(mut socket: TcpStream, seen: &Mutex<Vec<String>>, handler: &F)
        where
            F: Fn(&str, usize) -> Reply,
        {
            let Some(line) = read_request(&mut socket).await else {
                return;
            };
            let attempt = {
                let mut seen = seen.lock().unwrap();
                let attempt = seen.iter().filter(|l| **l == line).count();
                seen.push(line.clone());
                attempt
            };

            match handler(&line, attempt) {
                Reply::Send(response) => {
                    socket.write_all(response.as_bytes()).await.ok();
                    socket.shutdown().await.ok();
                }
                Reply::Stall(head) => {
                    socket.write_all(head.as_bytes()).await.ok();
                    socket.flush().await.ok();
                    tokio::time::sleep(Duration::from_secs(60)).await;
                }
            }
        }

        /// Reads one request and returns its `METHOD path` line.
        async fn read_request(socket: &mut TcpStream) -> Option<String> {
            let mut buf = Vec::new();
            let mut chunk = [0u8; 1024];
            let head_end = loop {
                if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                    break pos + 4;
                }
                let n = socket.read(&mut chunk).await.ok()?;
                if n == 0 {
                    return None;
                }
                buf.extend_from_slice(&chunk[..n]);
            };

            let head = String::from_utf8_lossy(&buf[..head_end]).to_string();
            let content_length = head
                .lines()
                .filter_map(|l| l.split_once(':'))
                .find(|(k, _)| k.eq_ignore_ascii_case("content-length"))
                .and_then(|(_, v)| v.trim().parse::<usize>().ok())
                .unwrap_or(0);
            while buf.len() < head_end + content_length {
                let n = socket.read(&mut chunk).await.ok()?;
                if n == 0 {
                    break;
                }
                buf.extend_from_slice(&chunk[..n]);
            }

            let mut parts = head.split_whitespace();
            Some(format!("{} {}", parts.next()?, parts.next()?))
        }
    }

    use futures::StreamExt as _;
    use http::{Reply, event_stream, serve};

    const HOME: &str = r#"{"_id": "g1", "name": "Home", "radius": 2,
        "coordinate": {"latitude": 19.076, "longitude": 72.8777}}"#;

    fn client(server: &http::TestServer, timeout: Duration) -> ApiClient {
        ApiClient::new(&server.base_url, timeout).unwrap()
    }

    fn home_center() -> Coordinate {
        Coordinate::new(19.076, 72.8777).unwrap()
    }

    #[tokio::test]
    async fn fetches_incident_records() {
        let server = serve(|line, _| match line {
            "GET /api/crime-data" => Reply::Send(http::json(
                "200 OK",
                r#"[{"_id": "a", "lat": 19.1, "lng": 72.9}, {"_id": "b"}]"#,
            )),
            _ => Reply::Send(http::json("404 Not Found", "{}")),
        })
        .await;

        let records = client(&server, Duration::from_secs(5))
            .fetch_incidents()
            .await
            .unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0]["_id"], "a");
    }

    #[tokio::test]
    async fn retries_server_errors_on_reads() {
        let server = serve(|_, attempt| {
            if attempt == 0 {
                Reply::Send(http::json("503 Service Unavailable", "{}"))
            } else {
                Reply::Send(http::json("200 OK", "[]"))
            }
        })
        .await;

        let records = client(&server, Duration::from_secs(5))
            .fetch_incidents()
            .await
            .unwrap();

        assert!(records.is_empty());
        assert_eq!(server.requests().len(), 2);
    }

    #[tokio::test]
    async fn permanent_errors_are_not_retried() {
        let server = serve(|_, _| Reply::Send(http::json("404 Not Found", "{}"))).await;

        let err = client(&server, Duration::from_secs(5))
            .clear_zones()
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            ApiError::Status { status } if status == reqwest::StatusCode::NOT_FOUND
        ));
        assert!(!err.is_upstream_unavailable());
        assert_eq!(server.requests(), ["DELETE /api/citizen/geofencing"]);
    }

    #[tokio::test]
    async fn clears_zones_with_delete() {
        let server = serve(|_, _| {
            Reply::Send(http::json("200 OK", r#"{"status": "success"}"#))
        })
        .await;

        client(&server, Duration::from_secs(5))
            .clear_zones()
            .await
            .unwrap();

        assert_eq!(server.requests(), ["DELETE /api/citizen/geofencing"]);
    }

    #[tokio::test]
    async fn create_zone_uses_returned_geofence() {
        let server = serve(|line, _| match line {
            "POST /api/citizen/geofencing" => Reply::Send(http::json(
                "201 Created",
                &format!(r#"{{"status": "success", "geofence": {HOME}}}"#),
            )),
            _ => Reply::Send(http::json("404 Not Found", "{}")),
        })
        .await;

        let zone = client(&server, Duration::from_secs(5))
            .create_zone("Home", 2.0, home_center())
            .await
            .unwrap();

        assert_eq!(zone.id.as_str(), "g1");
        assert_eq!(zone.name, "Home");
        assert_eq!(server.requests().len(), 1);
    }

    #[tokio::test]
    async fn create_zone_falls_back_to_listing() {
        let server = serve(|line, _| match line {
            "POST /api/citizen/geofencing" => {
                Reply::Send(http::json("200 OK", r#"{"status": "success"}"#))
            }
            "GET /api/citizen/geofencing" => Reply::Send(http::json(
                "200 OK",
                &format!(r#"{{"status": "success", "geofences": [{HOME}]}}"#),
            )),
            _ => Reply::Send(http::json("404 Not Found", "{}")),
        })
        .await;

        let zone = client(&server, Duration::from_secs(5))
            .create_zone("Home", 2.0, home_center())
            .await
            .unwrap();

        assert_eq!(zone.id.as_str(), "g1");
        assert_eq!(
            server.requests(),
            [
                "POST /api/citizen/geofencing",
                "GET /api/citizen/geofencing"
            ]
        );
    }

    #[tokio::test]
    async fn create_zone_is_sent_once_on_timeout() {
        let server = serve(|_, _| Reply::Stall(String::new())).await;

        let err = client(&server, Duration::from_millis(300))
            .create_zone("Home", 2.0, home_center())
            .await
            .unwrap_err();

        assert!(matches!(err, ApiError::Unavailable(_)));
        assert_eq!(server.hits(), 1);
    }

    #[tokio::test]
    async fn create_zone_is_sent_once_on_server_error() {
        let server = serve(|_, _| Reply::Send(http::json("502 Bad Gateway", "{}"))).await;

        let err = client(&server, Duration::from_secs(5))
            .create_zone("Home", 2.0, home_center())
            .await
            .unwrap_err();

        assert!(err.is_upstream_unavailable());
        assert_eq!(server.requests().len(), 1);
    }

    #[tokio::test]
    async fn stream_yields_new_crime_records() {
        let server = serve(|line, _| match line {
            "GET /api/crime-data/stream" => Reply::Send(event_stream(
                ": hello\n\n\
                 event: new_crime\ndata: {\"_id\": \"a\", \"lat\": 19.1, \"lng\": 72.9}\n\n\
                 event: ping\ndata: {}\n\n\
                 event: new_crime\ndata: {\"_id\": \"b\"}\n\n",
            )),
            _ => Reply::Send(http::json("404 Not Found", "{}")),
        })
        .await;
        let client = client(&server, Duration::from_secs(5));

        let records: Vec<Value> = client
            .incident_stream()
            .map(Result::unwrap)
            .collect()
            .await;

        assert_eq!(records.len(), 2);
        assert_eq!(records[0]["_id"], "a");
        assert_eq!(records[1]["_id"], "b");
    }

    #[tokio::test]
    async fn stream_rejects_error_status() {
        let server = serve(|_, _| Reply::Send(http::json("500 Internal Server Error", "{}"))).await;
        let client = client(&server, Duration::from_secs(5));

        let items: Vec<_> = client.incident_stream().collect().await;

        assert_eq!(items.len(), 1);
        assert!(matches!(items[0], Err(ApiError::Status { .. })));
    }

    #[tokio::test]
    async fn silent_stream_ends_with_idle_error() {
        let server = serve(|_, _| {
            Reply::Stall(event_stream("event: new_crime\ndata: {\"_id\": \"a\"}\n\n"))
        })
        .await;
        let client = client(&server, Duration::from_secs(5))
            .with_stream_idle_timeout(Duration::from_millis(300));

        let items = tokio::time::timeout(
            Duration::from_secs(5),
            client.incident_stream().collect::<Vec<_>>(),
        )
        .await
        .expect("stream hung on a silent connection");

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].as_ref().unwrap()["_id"], "a");
        assert!(matches!(items[1], Err(ApiError::StreamIdle { .. })));
        assert!(items[1].as_ref().unwrap_err().is_upstream_unavailable());
    }
}
