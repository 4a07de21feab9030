//! Platform API client.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use crate::config::{ClientConfig, SharedStoreConfig, StoreMode};
use crate::credentials::{
    Clock, CredentialManager, CredentialStore, FileStore, HttpTokenFetcher, RedisStore,
    SystemClock, TokenFetcher,
};
use crate::error::{Error, Result};
use crate::http::{ApiBody, ApiTransport, default_client};
use crate::models::{
    Code2Session, DEFAULT_IMAGE_TARGETS, ImageAntidirtBody, KvItem, QrCode, QrCodeBody,
    QrCodeOptions, RemoveUserStorageBody, SetUserStorageBody, SubscribeMessage,
    TemplateMessage, TextAntidirtBody, check_storage_len,
};
use crate::sign;

const APPS: &str = "/apps";
const X_TOKEN: &str = "X-Token";

/// Client for one mini-app.
///
/// Cheap to clone; clones share the HTTP connection pool and the token cache.
#[derive(Debug, Clone)]
pub struct MiniAppClient {
    inner: Arc<ClientInner>,
}

#[derive(Debug)]
struct ClientInner {
    config: ClientConfig,
    transport: ApiTransport,
    credentials: CredentialManager,
}

impl MiniAppClient {
    /// Start building a client for `app_id`.
    pub fn builder(app_id: impl Into<String>, app_secret: impl Into<String>) -> ClientBuilder {
        ClientBuilder::new(ClientConfig::new(app_id, app_secret))
    }

    /// Build a client from a complete configuration.
    pub async fn new(config: ClientConfig) -> Result<Self> {
        ClientBuilder::new(config).build().await
    }

    /// Build a client from `MICROAPP_*` environment variables.
    pub async fn from_env() -> Result<Self> {
        Self::new(ClientConfig::from_env()?).await
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    pub fn app_id(&self) -> &str {
        &self.inner.config.app_id
    }

    /// The token cache behind this client.
    pub fn credentials(&self) -> &CredentialManager {
        &self.inner.credentials
    }

    /// Current access token, fetched when the cached one is missing or stale.
    pub async fn access_token(&self) -> Result<String> {
        self.inner.credentials.get_token().await
    }

    /// Exchange a login code (or anonymous code) for the user's session.
    #[instrument(skip_all, fields(app_id = %self.app_id()))]
    pub async fn code_to_session(
        &self,
        code: Option<&str>,
        anonymous_code: Option<&str>,
    ) -> Result<Code2Session> {
        let code = code.filter(|c| !c.is_empty());
        let anonymous_code = anonymous_code.filter(|c| !c.is_empty());
        if code.is_none() && anonymous_code.is_none() {
            return Err(Error::invalid_argument(
                "code or anonymous_code is required",
            ));
        }

        let config = &self.inner.config;
        let mut query = vec![
            ("appid", config.app_id.clone()),
            ("secret", config.app_secret.clone()),
        ];
        if let Some(code) = code {
            query.push(("code", code.to_string()));
        }
        if let Some(anonymous_code) = anonymous_code {
            query.push(("anonymous_code", anonymous_code.to_string()));
        }

        let url = self.inner.transport.url(APPS, "/jscode2session");
        self.inner.transport.get(&url, &query).await?.decode()
    }

    /// Store key-value pairs in the platform's per-user storage.
    ///
    /// Keys and values must each be shorter than 1024 bytes.
    #[instrument(skip(self, session_key, kv_list), fields(app_id = %self.app_id()))]
    pub async fn set_user_storage<I, K, V>(
        &self,
        openid: &str,
        session_key: &str,
        kv_list: I,
        sig_method: &str,
    ) -> Result<Value>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        sign::ensure_supported(sig_method)?;
        let items: Vec<KvItem> = kv_list
            .into_iter()
            .map(|(k, v)| KvItem::new(k, v))
            .collect();
        for item in &items {
            item.validate()?;
        }

        let body = serde_json::to_string(&SetUserStorageBody { kv_list: &items })?;
        self.post_signed("/set_user_storage", openid, session_key, sig_method, body)
            .await
    }

    /// Remove keys from the platform's per-user storage.
    #[instrument(skip(self, session_key, keys), fields(app_id = %self.app_id()))]
    pub async fn remove_user_storage<I, K>(
        &self,
        openid: &str,
        session_key: &str,
        keys: I,
        sig_method: &str,
    ) -> Result<Value>
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        sign::ensure_supported(sig_method)?;
        let keys: Vec<String> = keys.into_iter().map(Into::into).collect();
        for key in &keys {
            check_storage_len("key", key)?;
        }

        let body = serde_json::to_string(&RemoveUserStorageBody { key: &keys })?;
        self.post_signed("/remove_user_storage", openid, session_key, sig_method, body)
            .await
    }

    /// Generate a QR code that opens the mini-app.
    #[instrument(skip_all, fields(app_id = %self.app_id()))]
    pub async fn create_qrcode(&self, options: &QrCodeOptions) -> Result<QrCode> {
        let token = self.access_token().await?;
        let body = QrCodeBody::new(&token, options);
        let query = [("access_token", token.clone())];

        match self.post(APPS, "/qrcode", &query, &[], &body).await? {
            ApiBody::Binary { content_type, data } => {
                debug!(%content_type, len = data.len(), "QR code generated");
                Ok(QrCode { content_type, data })
            }
            ApiBody::Json(response) => {
                response.into_result()?;
                Err(Error::Decode(
                    "expected a QR code image, got a JSON document".to_string(),
                ))
            }
        }
    }

    /// Send a template message (game template API).
    #[instrument(skip(self, data), fields(app_id = %self.app_id()))]
    pub async fn template_send(
        &self,
        touser: &str,
        template_id: &str,
        form_id: &str,
        data: &Value,
        page: Option<&str>,
    ) -> Result<Value> {
        let token = self.access_token().await?;
        let body = TemplateMessage {
            access_token: &token,
            app_id: self.app_id(),
            data,
            page,
            form_id,
            touser,
            template_id,
        };
        self.post(APPS, "/game/template/send", &[], &[], &body)
            .await?
            .into_json()?
            .into_result()
    }

    /// Send a subscription notification.
    #[instrument(skip(self, data), fields(app_id = %self.app_id()))]
    pub async fn subscribe_send(
        &self,
        tpl_id: &str,
        open_id: &str,
        data: &Value,
        page: Option<&str>,
    ) -> Result<Value> {
        let token = self.access_token().await?;
        let body = SubscribeMessage {
            access_token: &token,
            app_id: self.app_id(),
            tpl_id,
            open_id,
            data,
            page,
        };
        self.post(
            APPS,
            "/subscribe_notification/developer/v1/notify",
            &[],
            &[],
            &body,
        )
        .await?
        .into_json()?
        .into_result()
    }

    /// Text moderation. Each task is an object such as `{"content": "..."}`.
    #[instrument(skip_all, fields(app_id = %self.app_id(), tasks = tasks.len()))]
    pub async fn text_antidirt(&self, tasks: &[Value]) -> Result<Value> {
        let token = self.access_token().await?;
        let headers = [(X_TOKEN, token)];
        self.post("", "/v2/tags/text/antidirt", &[], &headers, &TextAntidirtBody { tasks })
            .await?
            .into_json()?
            .into_result()
    }

    /// Image moderation. Each task is an object such as `{"image": "<url>"}`;
    /// `targets` defaults to [`DEFAULT_IMAGE_TARGETS`].
    #[instrument(skip_all, fields(app_id = %self.app_id(), tasks = tasks.len()))]
    pub async fn image_antidirt(
        &self,
        tasks: &[Value],
        targets: Option<&[&str]>,
    ) -> Result<Value> {
        let targets = match targets {
            Some(targets) if !targets.is_empty() => targets.to_vec(),
            _ => DEFAULT_IMAGE_TARGETS.to_vec(),
        };
        let token = self.access_token().await?;
        let headers = [(X_TOKEN, token)];
        let body = ImageAntidirtBody { targets, tasks };
        self.post("", "/v2/tags/image/", &[], &headers, &body)
            .await?
            .into_json()?
            .into_result()
    }

    /// POST a user-storage body signed with the session key.
    async fn post_signed(
        &self,
        path: &str,
        openid: &str,
        session_key: &str,
        sig_method: &str,
        body: String,
    ) -> Result<Value> {
        let signature = sign::user_storage_signature(session_key, &body)?;
        let token = self.access_token().await?;
        let query = [
            ("access_token", token),
            ("openid", openid.to_string()),
            ("signature", signature),
            ("sig_method", sig_method.to_string()),
        ];
        let url = self.inner.transport.url(APPS, path);
        self.inner
            .transport
            .post_json(&url, &query, &[], body)
            .await?
            .into_json()?
            .into_result()
    }

    async fn post<B: Serialize>(
        &self,
        prefix: &str,
        path: &str,
        query: &[(&str, String)],
        headers: &[(&str, String)],
        body: &B,
    ) -> Result<ApiBody> {
        let body = serde_json::to_string(body)?;
        let url = self.inner.transport.url(prefix, path);
        self.inner.transport.post_json(&url, query, headers, body).await
    }
}

/// Builder for [`MiniAppClient`].
///
/// Store selection happens once, in [`build`](Self::build). Injecting a store
/// with [`store`](Self::store) skips it entirely.
pub struct ClientBuilder {
    config: ClientConfig,
    store: Option<Arc<dyn CredentialStore>>,
    fetcher: Option<Arc<dyn TokenFetcher>>,
    clock: Option<Arc<dyn Clock>>,
    http_client: Option<reqwest::Client>,
}

impl ClientBuilder {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            store: None,
            fetcher: None,
            clock: None,
            http_client: None,
        }
    }

    pub fn store_mode(mut self, mode: StoreMode) -> Self {
        self.config.store_mode = mode;
        self
    }

    pub fn shared_store(mut self, shared: SharedStoreConfig) -> Self {
        self.config.shared_store = Some(shared);
        self
    }

    /// Shorthand for a shared store at `url` with the default timeout.
    pub fn redis_url(self, url: impl Into<String>) -> Self {
        self.shared_store(SharedStoreConfig::new(url))
    }

    pub fn local_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.local_path = Some(path.into());
        self
    }

    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.config.base_url = url.into();
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    /// Use this store instead of resolving one from the store mode.
    pub fn store(mut self, store: Arc<dyn CredentialStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn fetcher(mut self, fetcher: Arc<dyn TokenFetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Use a preconfigured HTTP client. The request timeout setting is not
    /// applied to it.
    pub fn http_client(mut self, client: reqwest::Client) -> Self {
        self.http_client = Some(client);
        self
    }

    pub async fn build(self) -> Result<MiniAppClient> {
        let config = self.config;
        config.validate()?;

        let http = match self.http_client {
            Some(client) => client,
            None => default_client(config.request_timeout)?,
        };
        let transport = ApiTransport::new(http, config.base_url.as_str());

        let clock: Arc<dyn Clock> = match self.clock {
            Some(clock) => clock,
            None => Arc::new(SystemClock),
        };
        let store = match self.store {
            Some(store) => store,
            None => resolve_store(&config, &clock).await?,
        };
        let fetcher: Arc<dyn TokenFetcher> = match self.fetcher {
            Some(fetcher) => fetcher,
            None => Arc::new(HttpTokenFetcher::new(transport.clone())),
        };

        let credentials = CredentialManager::new(
            config.app_id.as_str(),
            config.app_secret.as_str(),
            store,
            fetcher,
        )
        .with_clock(clock);

        info!(
            app_id = %config.app_id,
            store = credentials.store_name(),
            base_url = %transport.base_url(),
            "Mini-app client ready"
        );

        Ok(MiniAppClient {
            inner: Arc::new(ClientInner {
                config,
                transport,
                credentials,
            }),
        })
    }
}

/// Pick the credential store for `config.store_mode`.
async fn resolve_store(
    config: &ClientConfig,
    clock: &Arc<dyn Clock>,
) -> Result<Arc<dyn CredentialStore>> {
    let local = || -> Arc<dyn CredentialStore> {
        Arc::new(FileStore::at_path(config.local_store_path()).with_clock(clock.clone()))
    };

    if config.store_mode == StoreMode::Local {
        return Ok(local());
    }

    let shared = config.shared_store_or_default();
    match RedisStore::connect(&shared.url, shared.connect_timeout).await {
        Ok(store) => Ok(Arc::new(store)),
        Err(e) if config.store_mode == StoreMode::Auto => {
            warn!(
                url = %redact_url(&shared.url),
                error = %e,
                "Shared credential store unavailable, falling back to local file"
            );
            Ok(local())
        }
        Err(e) => Err(Error::config(format!(
            "shared credential store at {} is unavailable: {e}",
            redact_url(&shared.url)
        ))),
    }
}

/// Strip the password from a store URL before logging it.
fn redact_url(raw: &str) -> String {
    match url::Url::parse(raw) {
        Ok(mut url) => {
            if url.password().is_some() {
                let _ = url.set_password(Some("***"));
            }
            url.to_string()
        }
        Err(_) => "<invalid url>".to_string(),
    }
}
