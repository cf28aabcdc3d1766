//! Authenticated-request interceptor.
//!
//! [`ApiClient::request`] wraps every call that needs the current session's
//! credentials: it attaches the access token, sends the request, and on a
//! session-expired response coordinates exactly one shared refresh, holding
//! concurrent callers back until it resolves and then replaying them with
//! the refreshed token.

use crate::gate::{GateRole, RefreshGate};
use crate::realtime::NoopRealtime;
use bytes::Bytes;
use chatter_auth::{RefreshCoordinator, RefreshScheduler};
use chatter_config::Config;
use chatter_store::FileTokenStore;
use chatter_types::error::{ChatterError, Result};
use chatter_types::{
    RealtimeTransport, Session, SessionEvent, StoredToken, TokenError, TokenRefresher, TokenStore,
};
use reqwest::header::CONTENT_TYPE;
use reqwest::multipart::{Form, Part};
use reqwest::{Method, StatusCode};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

/// Request payload for [`ApiClient::request`].
///
/// JSON is the default content type; a binary upload goes out as multipart
/// with no explicit content-type header so the transport can set the
/// boundary itself.
#[derive(Debug, Clone)]
pub enum Body {
    Empty,
    Json(serde_json::Value),
    Upload {
        field: String,
        file_name: String,
        bytes: Bytes,
    },
}

pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    store: Arc<dyn TokenStore>,
    refresher: Arc<dyn TokenRefresher>,
    scheduler: Arc<RefreshScheduler>,
    realtime: Arc<dyn RealtimeTransport>,
    session: Mutex<Session>,
    events: mpsc::UnboundedSender<SessionEvent>,
    gate: RefreshGate,
}

impl ApiClient {
    /// Wires a client from explicit collaborators. Returns the client and
    /// the receiving end of its session-event stream.
    pub fn new(
        http: reqwest::Client,
        base_url: &str,
        store: Arc<dyn TokenStore>,
        refresher: Arc<dyn TokenRefresher>,
        scheduler: Arc<RefreshScheduler>,
        realtime: Arc<dyn RealtimeTransport>,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<SessionEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let client = Arc::new(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            store,
            refresher,
            scheduler,
            realtime,
            session: Mutex::new(Session::new()),
            events,
            gate: RefreshGate::new(),
        });
        (client, rx)
    }

    /// Standard wiring: file-backed store, network refresh coordinator, and
    /// a proactive scheduler, all from configuration. Re-arms the proactive
    /// timer from any persisted credential, so a process restart resumes
    /// renewing ahead of expiry instead of waiting for the first 401.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client or credential store cannot be
    /// constructed.
    pub async fn from_config(
        config: &Config,
    ) -> Result<(Arc<Self>, mpsc::UnboundedReceiver<SessionEvent>)> {
        let http = reqwest::Client::builder()
            .cookie_store(true)
            .build()
            .map_err(|e| ChatterError::Config(format!("http client: {e}")))?;
        let store: Arc<dyn TokenStore> = Arc::new(FileTokenStore::new(config.store_path())?);
        let refresher: Arc<dyn TokenRefresher> = Arc::new(
            RefreshCoordinator::new(http.clone(), &config.base_url, Arc::clone(&store))
                .with_timeout(Duration::from_secs(config.refresh_timeout_secs)),
        );
        let scheduler = Arc::new(
            RefreshScheduler::new(Arc::clone(&refresher))
                .with_margin(Duration::from_secs(config.refresh_margin_secs)),
        );
        let (client, rx) = Self::new(
            http,
            &config.base_url,
            store,
            refresher,
            scheduler,
            Arc::new(NoopRealtime),
        );
        // An unreadable credential file should not block startup.
        if let Err(e) = client.scheduler().rehydrate(client.store().as_ref()).await {
            tracing::warn!(error = %e, "failed to rehydrate refresh timer");
        }
        Ok((client, rx))
    }

    /// A snapshot of the current session state.
    #[must_use]
    pub fn session(&self) -> Session {
        self.session.lock().unwrap().clone()
    }

    #[must_use]
    pub fn scheduler(&self) -> &Arc<RefreshScheduler> {
        &self.scheduler
    }

    #[must_use]
    pub fn store(&self) -> &Arc<dyn TokenStore> {
        &self.store
    }

    pub(crate) fn with_session<R>(&self, f: impl FnOnce(&mut Session) -> R) -> R {
        f(&mut self.session.lock().unwrap())
    }

    pub(crate) fn emit(&self, event: SessionEvent) {
        // Send fails only when the consumer dropped its receiver.
        let _ = self.events.send(event);
    }

    /// Issue an authenticated request.
    ///
    /// Non-401 responses are returned verbatim, success or not; the core
    /// does not interpret business-level failure bodies. A 401 triggers the
    /// shared-refresh path; exactly one refresh call happens per expiry event
    /// regardless of how many concurrent requests observed it.
    ///
    /// # Errors
    ///
    /// `Network` for transport failures, `Auth` when the refresh authority
    /// definitively ended the session.
    pub async fn request(&self, method: Method, path: &str, body: Body) -> Result<reqwest::Response> {
        let token = self.store.load().await?;
        let access = token.as_ref().map(|t| t.access_token.clone());
        let resp = self.send_once(&method, path, &body, access.as_deref()).await?;

        if resp.status() != StatusCode::UNAUTHORIZED {
            return Ok(resp);
        }

        match self.gate.enter() {
            GateRole::Leader(guard) => {
                tracing::debug!(%path, "session expired, refreshing");
                let outcome = self.refresher.refresh().await;
                match outcome {
                    Ok(token) => {
                        guard.finish(Ok(token.clone()));
                        self.after_reactive_refresh(&token).await;
                        self.send_once(&method, path, &body, Some(&token.access_token)).await
                    }
                    Err(err) => {
                        guard.finish(Err(err.clone()));
                        self.handle_refresh_failure(&err).await;
                        Err(err.into())
                    }
                }
            }
            GateRole::Follower(mut rx) => {
                tracing::debug!(%path, "refresh already in flight, waiting");
                match rx.recv().await {
                    Ok(Ok(token)) => {
                        self.send_once(&method, path, &body, Some(&token.access_token)).await
                    }
                    Ok(Err(err)) => Err(err.into()),
                    // Leader vanished without publishing.
                    Err(_) => Err(TokenError::network("refresh interrupted").into()),
                }
            }
        }
    }

    /// Issue an authenticated request and parse a JSON body, mapping non-2xx
    /// statuses to [`ChatterError::Request`].
    ///
    /// # Errors
    ///
    /// Everything [`ApiClient::request`] returns, plus `Request` for non-2xx
    /// and `Network` for an unparseable body.
    pub async fn request_json(
        &self,
        method: Method,
        path: &str,
        body: Body,
    ) -> Result<serde_json::Value> {
        let resp = self.request(method, path, body).await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ChatterError::Request {
                status: status.as_u16(),
                body,
            });
        }
        resp.json()
            .await
            .map_err(|e| ChatterError::Network(format!("malformed response body: {e}")))
    }

    /// One bare send: attach the token, set the content type, go.
    pub(crate) async fn send_once(
        &self,
        method: &Method,
        path: &str,
        body: &Body,
        access_token: Option<&str>,
    ) -> Result<reqwest::Response> {
        let url = format!("{}{path}", self.base_url);
        let mut builder = self.http.request(method.clone(), &url);
        if let Some(token) = access_token {
            builder = builder.bearer_auth(token);
        }
        builder = match body {
            Body::Empty => builder.header(CONTENT_TYPE, "application/json"),
            Body::Json(json) => builder.json(json),
            Body::Upload {
                field,
                file_name,
                bytes,
            } => builder.multipart(Form::new().part(
                field.clone(),
                Part::bytes(bytes.to_vec()).file_name(file_name.clone()),
            )),
        };
        Ok(builder.send().await?)
    }

    /// Success side effects of a 401-triggered refresh: persist the
    /// credential for subsequent requests, re-arm the proactive timer, and
    /// re-authenticate the live transport (reactive refreshes only).
    async fn after_reactive_refresh(&self, token: &StoredToken) {
        if let Err(e) = self.store.save(token).await {
            tracing::warn!(error = %e, "failed to persist refreshed token");
        }
        self.scheduler.schedule(token.expires_at);
        self.with_session(Session::refreshed);
        self.emit(SessionEvent::TokenRefreshed {
            token: token.clone(),
        });
        self.realtime.reconnect().await;
    }

    async fn handle_refresh_failure(&self, err: &TokenError) {
        if err.is_auth() {
            tracing::info!(error = %err, "refresh rejected, ending session");
            self.force_logout().await;
        } else {
            // Connectivity trouble: keep the session, let the caller retry.
            tracing::warn!(error = %err, "refresh failed transiently, session kept");
            self.with_session(|s| s.fail(err.clone()));
        }
    }

    /// Clears all session state: stored tokens, the proactive timer, and the
    /// state machine. Safe to call when already logged out.
    pub(crate) async fn force_logout(&self) {
        if let Err(e) = self.store.clear().await {
            tracing::warn!(error = %e, "failed to clear token store");
        }
        self.scheduler.cancel();
        self.with_session(Session::end);
        self.emit(SessionEvent::Ended);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chatter_store::InMemoryTokenStore;
    use chatter_types::{SessionStatus, User};
    use std::sync::atomic::{AtomicU32, Ordering};
    use wiremock::matchers::{header, method as http_method, path as url_path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct MockRefresher {
        calls: AtomicU32,
        delay: Duration,
        outcome: std::result::Result<StoredToken, TokenError>,
    }

    impl MockRefresher {
        fn ok(token: StoredToken) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicU32::new(0),
                delay: Duration::from_millis(100),
                outcome: Ok(token),
            })
        }

        fn err(err: TokenError) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicU32::new(0),
                delay: Duration::from_millis(100),
                outcome: Err(err),
            })
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl TokenRefresher for MockRefresher {
        async fn refresh(&self) -> std::result::Result<StoredToken, TokenError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.outcome.clone()
        }
    }

    struct CountingRealtime {
        reconnects: AtomicU32,
    }

    impl CountingRealtime {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                reconnects: AtomicU32::new(0),
            })
        }

        fn count(&self) -> u32 {
            self.reconnects.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl RealtimeTransport for CountingRealtime {
        async fn reconnect(&self) {
            self.reconnects.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn some_user() -> User {
        User {
            id: "u-1".into(),
            username: "ada".into(),
            display_name: None,
            avatar_url: None,
        }
    }

    struct Harness {
        client: Arc<ApiClient>,
        events: mpsc::UnboundedReceiver<SessionEvent>,
        refresher: Arc<MockRefresher>,
        realtime: Arc<CountingRealtime>,
        store: Arc<InMemoryTokenStore>,
    }

    fn harness(server: &MockServer, refresher: Arc<MockRefresher>) -> Harness {
        let store = Arc::new(InMemoryTokenStore::with_token(
            StoredToken::new("old-at").with_refresh("rt-1").with_expiry(10),
        ));
        let realtime = CountingRealtime::new();
        let scheduler = Arc::new(RefreshScheduler::new(refresher.clone()));
        let (client, events) = ApiClient::new(
            reqwest::Client::new(),
            &server.uri(),
            Arc::clone(&store) as Arc<dyn TokenStore>,
            refresher.clone() as Arc<dyn TokenRefresher>,
            scheduler,
            realtime.clone() as Arc<dyn RealtimeTransport>,
        );
        Harness {
            client,
            events,
            refresher,
            realtime,
            store,
        }
    }

    /// `/feed` rejects the old token and accepts the refreshed one.
    async fn mount_feed(server: &MockServer) {
        Mock::given(http_method("GET"))
            .and(url_path("/feed"))
            .and(header("authorization", "Bearer old-at"))
            .respond_with(ResponseTemplate::new(401))
            .mount(server)
            .await;
        Mock::given(http_method("GET"))
            .and(url_path("/feed"))
            .and(header("authorization", "Bearer new-at"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"posts": []})))
            .mount(server)
            .await;
    }

    fn fresh_token() -> StoredToken {
        StoredToken::new("new-at").with_refresh("rt-2").with_expiry(600)
    }

    #[tokio::test]
    async fn test_non_expired_response_returned_verbatim() {
        let server = MockServer::start().await;
        Mock::given(http_method("GET"))
            .and(url_path("/feed"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let h = harness(&server, MockRefresher::ok(fresh_token()));
        let resp = h.client.request(Method::GET, "/feed", Body::Empty).await.unwrap();
        assert_eq!(resp.status(), 200);
        assert_eq!(h.refresher.calls(), 0);
    }

    #[tokio::test]
    async fn test_business_errors_returned_verbatim() {
        let server = MockServer::start().await;
        Mock::given(http_method("GET"))
            .and(url_path("/feed"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let h = harness(&server, MockRefresher::ok(fresh_token()));
        let resp = h.client.request(Method::GET, "/feed", Body::Empty).await.unwrap();
        assert_eq!(resp.status(), 500);
        assert_eq!(h.refresher.calls(), 0);
    }

    #[tokio::test]
    async fn test_expired_session_refreshes_and_replays() {
        let server = MockServer::start().await;
        mount_feed(&server).await;

        let h = harness(&server, MockRefresher::ok(fresh_token()));
        let resp = h.client.request(Method::GET, "/feed", Body::Empty).await.unwrap();
        assert_eq!(resp.status(), 200);
        assert_eq!(h.refresher.calls(), 1);

        // The refreshed credential becomes the shared default.
        let stored = h.store.load().await.unwrap().unwrap();
        assert_eq!(stored.access_token, "new-at");
    }

    #[tokio::test]
    async fn test_concurrent_expiries_share_one_refresh() {
        let server = MockServer::start().await;
        mount_feed(&server).await;

        let h = harness(&server, MockRefresher::ok(fresh_token()));
        let (r1, r2, r3) = tokio::join!(
            h.client.request(Method::GET, "/feed", Body::Empty),
            h.client.request(Method::GET, "/feed", Body::Empty),
            h.client.request(Method::GET, "/feed", Body::Empty),
        );
        assert_eq!(r1.unwrap().status(), 200);
        assert_eq!(r2.unwrap().status(), 200);
        assert_eq!(r3.unwrap().status(), 200);
        assert_eq!(h.refresher.calls(), 1, "exactly one refresh per expiry event");
    }

    #[tokio::test]
    async fn test_reactive_refresh_reconnects_realtime_once() {
        let server = MockServer::start().await;
        mount_feed(&server).await;

        let h = harness(&server, MockRefresher::ok(fresh_token()));
        let (r1, r2) = tokio::join!(
            h.client.request(Method::GET, "/feed", Body::Empty),
            h.client.request(Method::GET, "/feed", Body::Empty),
        );
        r1.unwrap();
        r2.unwrap();
        assert_eq!(h.realtime.count(), 1);
    }

    #[tokio::test]
    async fn test_network_refresh_failure_keeps_session() {
        let server = MockServer::start().await;
        mount_feed(&server).await;

        let h = harness(&server, MockRefresher::err(TokenError::network("502 from refresh")));
        h.client.with_session(|s| s.establish(some_user()));

        let (r1, r2) = tokio::join!(
            h.client.request(Method::GET, "/feed", Body::Empty),
            h.client.request(Method::GET, "/feed", Body::Empty),
        );
        assert!(matches!(r1.unwrap_err(), ChatterError::Network(_)));
        assert!(matches!(r2.unwrap_err(), ChatterError::Network(_)));
        assert_eq!(h.refresher.calls(), 1);

        // No premature logout: session and credentials intact.
        assert_eq!(h.client.session().status(), SessionStatus::Authenticated);
        assert!(h.store.load().await.unwrap().is_some());
        assert_eq!(h.realtime.count(), 0);
    }

    #[tokio::test]
    async fn test_auth_refresh_failure_logs_out() {
        let server = MockServer::start().await;
        mount_feed(&server).await;

        let mut h = harness(&server, MockRefresher::err(TokenError::auth("session expired")));
        h.client.with_session(|s| s.establish(some_user()));

        let (r1, r2) = tokio::join!(
            h.client.request(Method::GET, "/feed", Body::Empty),
            h.client.request(Method::GET, "/feed", Body::Empty),
        );
        assert!(matches!(r1.unwrap_err(), ChatterError::Auth(_)));
        assert!(matches!(r2.unwrap_err(), ChatterError::Auth(_)));

        assert_eq!(h.client.session().status(), SessionStatus::Unauthenticated);
        assert!(h.store.load().await.unwrap().is_none());

        let mut saw_ended = false;
        while let Ok(event) = h.events.try_recv() {
            saw_ended |= event == SessionEvent::Ended;
        }
        assert!(saw_ended, "sessionEnded effect must be emitted");
    }

    #[tokio::test]
    async fn test_refresh_emits_token_refreshed_event() {
        let server = MockServer::start().await;
        mount_feed(&server).await;

        let mut h = harness(&server, MockRefresher::ok(fresh_token()));
        h.client.request(Method::GET, "/feed", Body::Empty).await.unwrap();

        let event = h.events.try_recv().unwrap();
        assert!(matches!(
            event,
            SessionEvent::TokenRefreshed { token } if token.access_token == "new-at"
        ));
    }

    #[tokio::test]
    async fn test_upload_replayed_after_refresh() {
        let server = MockServer::start().await;
        Mock::given(http_method("POST"))
            .and(url_path("/media"))
            .and(header("authorization", "Bearer old-at"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;
        Mock::given(http_method("POST"))
            .and(url_path("/media"))
            .and(header("authorization", "Bearer new-at"))
            .respond_with(ResponseTemplate::new(201))
            .mount(&server)
            .await;

        let h = harness(&server, MockRefresher::ok(fresh_token()));
        let body = Body::Upload {
            field: "file".into(),
            file_name: "avatar.png".into(),
            bytes: Bytes::from_static(b"\x89PNG fake"),
        };
        let resp = h.client.request(Method::POST, "/media", body).await.unwrap();
        assert_eq!(resp.status(), 201);
    }

    #[tokio::test]
    async fn test_rejected_refresh_ends_session_end_to_end() {
        let server = MockServer::start().await;
        Mock::given(http_method("GET"))
            .and(url_path("/feed"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;
        // The refresh authority has revoked the session outright.
        Mock::given(http_method("POST"))
            .and(url_path("/auth/refresh"))
            .respond_with(ResponseTemplate::new(403))
            .expect(1)
            .mount(&server)
            .await;

        let store = Arc::new(InMemoryTokenStore::with_token(
            StoredToken::new("old-at").with_refresh("rt-1").with_expiry(10),
        ));
        let http = reqwest::Client::new();
        let refresher: Arc<dyn TokenRefresher> = Arc::new(RefreshCoordinator::new(
            http.clone(),
            &server.uri(),
            Arc::clone(&store) as Arc<dyn TokenStore>,
        ));
        let scheduler = Arc::new(RefreshScheduler::new(Arc::clone(&refresher)));
        let (client, mut events) = ApiClient::new(
            http,
            &server.uri(),
            Arc::clone(&store) as Arc<dyn TokenStore>,
            refresher,
            scheduler,
            CountingRealtime::new() as Arc<dyn RealtimeTransport>,
        );
        client.with_session(|s| s.establish(some_user()));

        let err = client.request(Method::GET, "/feed", Body::Empty).await.unwrap_err();
        assert!(matches!(err, ChatterError::Auth(_)));
        assert_eq!(client.session().status(), SessionStatus::Unauthenticated);
        assert!(store.load().await.unwrap().is_none());

        let mut saw_ended = false;
        while let Ok(event) = events.try_recv() {
            saw_ended |= event == SessionEvent::Ended;
        }
        assert!(saw_ended);
    }

    #[tokio::test]
    async fn test_from_config_rearms_timer_from_persisted_token() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials.json");
        let seed = FileTokenStore::new(&path).unwrap();
        seed.save(&StoredToken::new("at").with_refresh("rt").with_expiry(600))
            .await
            .unwrap();

        let config = Config {
            store_path: Some(path),
            ..Config::default()
        };
        let (client, _events) = ApiClient::from_config(&config).await.unwrap();
        // The relaunched process renews proactively, not just reactively.
        assert!(client.scheduler().has_pending());
    }

    #[tokio::test]
    async fn test_request_json_maps_business_error() {
        let server = MockServer::start().await;
        Mock::given(http_method("GET"))
            .and(url_path("/feed"))
            .respond_with(ResponseTemplate::new(422).set_body_string("bad cursor"))
            .mount(&server)
            .await;

        let h = harness(&server, MockRefresher::ok(fresh_token()));
        let err = h
            .client
            .request_json(Method::GET, "/feed", Body::Empty)
            .await
            .unwrap_err();
        assert!(matches!(err, ChatterError::Request { status: 422, .. }));
    }
}
