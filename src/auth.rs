//! Browser-based OAuth code exchange.
//!
//! 1. Bind a local listener for the redirect URI.
//! 2. Print the authorization URL for the user to open.
//! 3. The listener hands exactly one code back through a oneshot channel and
//!    is shut down on receipt, on a denied authorization, or on timeout.
//! 4. Exchange the code for an access token and write it to the config file.

use crate::api::{spotify, youtube};
use crate::config::{Config, Credentials};
use crate::models::Service;
use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use base64::{engine::general_purpose, Engine as _};
use rand::{distributions::Alphanumeric, Rng};
use reqwest::header::AUTHORIZATION;
use reqwest::Client;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tracing::{info, warn};
use url::Url;

/// Re-authorization collaborator used by the migrator when a token is rejected.
#[async_trait]
pub trait Authorizer: Send + Sync {
    /// Obtain a fresh access token for `service`.
    async fn authorize(&self, service: Service) -> Result<String>;
}

/// Per-platform OAuth endpoints.
#[derive(Debug, Clone)]
pub struct OAuthSettings {
    pub authorize_url: String,
    pub token_url: String,
    pub scopes: Vec<String>,
    /// Send client credentials as a Basic header instead of form fields
    pub basic_auth: bool,
}

impl OAuthSettings {
    pub fn for_service(service: Service) -> Self {
        let (authorize_url, token_url, scopes, basic_auth) = match service {
            Service::Spotify => (spotify::AUTHORIZE_URL, spotify::TOKEN_URL, spotify::SCOPES, true),
            Service::Youtube => (youtube::AUTHORIZE_URL, youtube::TOKEN_URL, youtube::SCOPES, false),
        };
        Self {
            authorize_url: authorize_url.into(),
            token_url: token_url.into(),
            scopes: scopes.iter().map(|s| s.to_string()).collect(),
            basic_auth,
        }
    }

    pub fn authorization_url(&self, client_id: &str, redirect_uri: &str, state: &str) -> Result<Url> {
        let mut url = Url::parse(&self.authorize_url)?;
        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", client_id)
            .append_pair("scope", &self.scopes.join(" "))
            .append_pair("redirect_uri", redirect_uri)
            .append_pair("state", state);
        Ok(url)
    }
}

#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
}

/// Trade an authorization code for tokens.
pub async fn exchange_code(
    client: &Client,
    settings: &OAuthSettings,
    creds: &Credentials,
    code: &str,
    redirect_uri: &str,
) -> Result<TokenResponse> {
    let mut params = vec![
        ("grant_type", "authorization_code"),
        ("code", code),
        ("redirect_uri", redirect_uri),
    ];
    let mut req = client.post(&settings.token_url);
    if settings.basic_auth {
        let auth_header = format!(
            "Basic {}",
            general_purpose::STANDARD.encode(format!("{}:{}", creds.client_id, creds.client_secret))
        );
        req = req.header(AUTHORIZATION, auth_header);
    } else {
        params.push(("client_id", creds.client_id.as_str()));
        params.push(("client_secret", creds.client_secret.as_str()));
    }
    let resp = req.form(&params).send().await?;
    let status = resp.status();
    if !status.is_success() {
        let txt = resp.text().await.unwrap_or_default();
        return Err(anyhow!("token exchange failed: {} => {}", status, txt));
    }
    let tr: TokenResponse = resp.json().await?;
    Ok(tr)
}

pub fn random_state() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(24)
        .map(char::from)
        .collect()
}

#[derive(Debug, Deserialize)]
struct CallbackParams {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
}

type CodeSender = oneshot::Sender<std::result::Result<String, String>>;

#[derive(Clone)]
struct CallbackState {
    expected_state: Arc<String>,
    slot: Arc<Mutex<Option<CodeSender>>>,
}

async fn callback(
    State(st): State<CallbackState>,
    Query(params): Query<CallbackParams>,
) -> (StatusCode, &'static str) {
    if params.state.as_deref() != Some(st.expected_state.as_str()) {
        warn!("ignoring OAuth redirect with unexpected state");
        return (StatusCode::BAD_REQUEST, "State mismatch, ignoring this redirect.");
    }
    let outcome = match (params.error, params.code) {
        (Some(err), _) => Err(err),
        (None, Some(code)) => Ok(code),
        (None, None) => return (StatusCode::BAD_REQUEST, "Missing code parameter."),
    };
    let sender = st.slot.lock().unwrap_or_else(|e| e.into_inner()).take();
    let Some(tx) = sender else {
        return (StatusCode::GONE, "Authorization was already received.");
    };
    let granted = outcome.is_ok();
    let _ = tx.send(outcome);
    if granted {
        (StatusCode::OK, "Authorization successful! You can close this window.")
    } else {
        (StatusCode::OK, "Authorization was denied. You can close this window.")
    }
}

/// Short-lived local listener for the OAuth redirect.
pub struct RedirectListener {
    listener: TcpListener,
    addr: SocketAddr,
}

impl RedirectListener {
    pub async fn bind(addr: SocketAddr) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("binding redirect listener on {}", addr))?;
        let addr = listener.local_addr()?;
        Ok(Self { listener, addr })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Serve `/callback` until one code with the expected state arrives or
    /// `wait` elapses. The listener is torn down in every case.
    pub async fn wait_for_code(self, expected_state: &str, wait: Duration) -> Result<String> {
        let (tx, rx) = oneshot::channel();
        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let state = CallbackState {
            expected_state: Arc::new(expected_state.to_string()),
            slot: Arc::new(Mutex::new(Some(tx))),
        };
        let app = Router::new().route("/callback", get(callback)).with_state(state);
        let listener = self.listener;
        let server = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = stop_rx.await;
                })
                .await
        });

        let outcome = tokio::time::timeout(wait, rx).await;
        let _ = stop_tx.send(());
        match server.await {
            Ok(Err(e)) => warn!("redirect listener error: {}", e),
            Err(e) => warn!("redirect listener task failed: {}", e),
            Ok(Ok(())) => {}
        }

        match outcome {
            Ok(Ok(Ok(code))) => Ok(code),
            Ok(Ok(Err(err))) => Err(anyhow!("authorization denied: {}", err)),
            Ok(Err(_)) => Err(anyhow!("redirect listener closed before a code arrived")),
            Err(_) => Err(anyhow!(
                "timed out after {}s waiting for authorization",
                wait.as_secs()
            )),
        }
    }
}

/// Runs the full browser flow and persists the new token in the config file.
pub struct OAuthAuthorizer {
    config_path: PathBuf,
    config: tokio::sync::Mutex<Config>,
    http: Client,
}

impl OAuthAuthorizer {
    pub fn new(config_path: PathBuf, config: Config) -> Self {
        Self {
            config_path,
            config: tokio::sync::Mutex::new(config),
            http: Client::new(),
        }
    }

    pub async fn generate_token(&self, service: Service) -> Result<String> {
        let mut cfg = self.config.lock().await;
        let creds = cfg.credentials(service).clone();
        if creds.client_id.is_empty() || creds.client_secret.is_empty() {
            bail!(
                "no client_id/client_secret for {} in {}",
                service,
                self.config_path.display()
            );
        }
        let settings = OAuthSettings::for_service(service);
        let redirect_uri = format!("http://localhost:{}/callback", cfg.redirect_port);
        let state = random_state();
        let listener = RedirectListener::bind(SocketAddr::from(([127, 0, 0, 1], cfg.redirect_port))).await?;
        let url = settings.authorization_url(&creds.client_id, &redirect_uri, &state)?;

        println!("Opening browser for authorization...");
        println!("Please visit this URL to authorize: {}", url);

        let code = listener
            .wait_for_code(&state, Duration::from_secs(cfg.auth_timeout_secs))
            .await?;
        let tr = exchange_code(&self.http, &settings, &creds, &code, &redirect_uri).await?;

        cfg.credentials_mut(service).token = tr.access_token.clone();
        cfg.save(&self.config_path)?;
        info!("{} token saved to {}", service, self.config_path.display());
        println!(
            "Successfully added {} token in: {}",
            service,
            self.config_path.display()
        );
        Ok(tr.access_token)
    }
}

#[async_trait]
impl Authorizer for OAuthAuthorizer {
    async fn authorize(&self, service: Service) -> Result<String> {
        self.generate_token(service).await
    }
}
