//! OAuth authorization code flow against the Twitch identity provider.
//!
//! See <https://dev.twitch.tv/docs/authentication/getting-tokens-oauth/#authorization-code-grant-flow>
use std::io::{BufRead, Write};

use log::{debug, error, info};
use serde::Deserialize;
use tiny_http::{Response, Server, StatusCode};
use twitch_oauth2::{oauth2::AccessToken, CsrfToken};
use url::Url;

use crate::{config::Credentials, Endpoints};

/// Redirect URL registered for the application when nothing else is configured.
pub const DEFAULT_REDIRECT_URL: &str = "http://localhost";

/// Scopes requested from the user.
pub const SCOPES: &[&str] = &["user:read:follows", "channel:read:redemptions"];

/// Errors for [`Authorizer`] and [`CodeSource`]
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("failed to exchange authorization code for access token: {reason}")]
    ExchangeRejected {
        status: reqwest::StatusCode,
        reason: String,
    },
    #[error("talking with twitch authentication failed")]
    Http(#[from] reqwest::Error),
    #[error("twitch returned an empty access token")]
    EmptyToken,
    #[error("no authorization code was provided")]
    NoCode,
    #[error("authorization was denied: {error} - {description}")]
    Denied { error: String, description: String },
    #[error("could not parse url")]
    UrlParseError(#[from] url::ParseError),
    #[error("failed to do IO operation")]
    IoError(#[from] std::io::Error),
    #[error("when constructing http server")]
    TinyHttpError(#[source] Box<dyn std::error::Error + Send + Sync + 'static>),
}

/// Something that can hand back the authorization code after the user granted access.
pub trait CodeSource {
    /// Present `url` to the user and block until the code arrives.
    fn obtain_code(&mut self, url: &Url, state: &CsrfToken) -> Result<String, AuthError>;
}

/// Token endpoint response. Only the access token is kept.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[allow(dead_code)]
    token_type: String,
    #[allow(dead_code)]
    expires_in: u64,
    #[allow(dead_code)]
    #[serde(default)]
    refresh_token: Option<String>,
}

/// Drives the authorization code grant for one set of [`Credentials`].
pub struct Authorizer<'a> {
    http: &'a reqwest::Client,
    endpoints: &'a Endpoints,
    credentials: &'a Credentials,
    redirect_uri: String,
}

impl<'a> Authorizer<'a> {
    /// Construct a new [`Authorizer`]
    ///
    /// `redirect_uri` is sent exactly as given; it has to match the one registered for the application.
    pub fn new(
        http: &'a reqwest::Client,
        endpoints: &'a Endpoints,
        credentials: &'a Credentials,
        redirect_uri: &str,
    ) -> Self {
        Authorizer {
            http,
            endpoints,
            credentials,
            redirect_uri: redirect_uri.to_string(),
        }
    }

    /// URL the user has to visit to grant access.
    pub fn authorize_url(&self, state: &CsrfToken) -> Url {
        let mut url = self.endpoints.authorize.clone();
        url.query_pairs_mut()
            .append_pair("client_id", self.credentials.client_id.as_str())
            .append_pair("redirect_uri", &self.redirect_uri)
            .append_pair("response_type", "code")
            .append_pair("scope", &SCOPES.join(" "))
            .append_pair("state", state.secret());
        url
    }

    /// Obtain a code from `source` and exchange it for an access token.
    ///
    /// The token is not refreshed; every run authorizes again.
    pub async fn authorize(&self, source: &mut dyn CodeSource) -> Result<AccessToken, AuthError> {
        let state = CsrfToken::new_random();
        let url = self.authorize_url(&state);
        let code = source.obtain_code(&url, &state)?;
        self.exchange(&code).await
    }

    /// Exchange an authorization code for an access token.
    pub async fn exchange(&self, code: &str) -> Result<AccessToken, AuthError> {
        let form = [
            ("client_id", self.credentials.client_id.as_str()),
            ("client_secret", self.credentials.client_secret.secret().as_str()),
            ("code", code),
            ("grant_type", "authorization_code"),
            ("redirect_uri", self.redirect_uri.as_str()),
        ];
        debug!("exchanging authorization code at {}", self.endpoints.token);
        let response = self
            .http
            .post(self.endpoints.token.clone())
            .form(&form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(AuthError::ExchangeRejected {
                status,
                reason: status.canonical_reason().unwrap_or("unknown").to_string(),
            });
        }

        let token: TokenResponse = response.json().await?;
        if token.access_token.is_empty() {
            return Err(AuthError::EmptyToken);
        }
        info!("obtained access token");
        Ok(AccessToken::new(token.access_token))
    }
}

/// Reads the code the user pastes after being redirected.
///
/// Either the bare `code` value or the whole redirect URL is accepted.
pub struct ConsolePrompt<R, W> {
    input: R,
    output: W,
}

impl ConsolePrompt<std::io::StdinLock<'static>, std::io::Stdout> {
    /// Prompt on stdin/stdout
    pub fn stdio() -> Self {
        ConsolePrompt::new(std::io::stdin().lock(), std::io::stdout())
    }
}

impl<R: BufRead, W: Write> ConsolePrompt<R, W> {
    /// Construct a new [`ConsolePrompt`]
    pub fn new(input: R, output: W) -> Self {
        ConsolePrompt { input, output }
    }
}

impl<R: BufRead, W: Write> CodeSource for ConsolePrompt<R, W> {
    fn obtain_code(&mut self, url: &Url, _state: &CsrfToken) -> Result<String, AuthError> {
        writeln!(
            self.output,
            "Please visit the following URL and grant permission: {}",
            url
        )?;
        writeln!(
            self.output,
            "After granting permission, you'll be redirected to your redirect URL."
        )?;
        write!(
            self.output,
            "Enter the code query parameter from the redirected URL: "
        )?;
        self.output.flush()?;

        let mut line = String::new();
        self.input.read_line(&mut line)?;
        parse_pasted_code(line.trim())
    }
}

/// Pull the code out of what the user pasted.
fn parse_pasted_code(input: &str) -> Result<String, AuthError> {
    if input.is_empty() {
        return Err(AuthError::NoCode);
    }
    let url = match Url::parse(input) {
        Ok(url) => url,
        Err(_) => return Ok(input.to_string()),
    };

    let mut code = None;
    let mut error = None;
    let mut description = None;
    for (key, value) in url.query_pairs() {
        match &*key {
            "code" => code = Some(value.into_owned()),
            "error" => error = Some(value.into_owned()),
            "error_description" => description = Some(value.into_owned()),
            _ => {}
        }
    }
    match (code, error) {
        (Some(code), _) if !code.is_empty() => Ok(code),
        (_, Some(error)) => Err(AuthError::Denied {
            error,
            description: description.unwrap_or_default(),
        }),
        _ => Err(AuthError::NoCode),
    }
}

/// Spins up a small webserver that listens for the browser after twitch redirects the user.
///
/// The redirect URL must point at this machine for this to work.
pub struct RedirectListener {
    server: Server,
    redirect_url: Url,
}

impl RedirectListener {
    /// Listen on the port of `redirect_url`.
    pub fn bind(redirect_url: &str) -> Result<RedirectListener, AuthError> {
        let redirect_url = Url::parse(redirect_url)?;
        let port = redirect_url.port_or_known_default().unwrap_or(80);
        RedirectListener::bind_port(redirect_url, port)
    }

    /// Override the implicit port given by the redirect url.
    ///
    /// Useful if the application is behind a reverse-proxy
    pub fn bind_port(redirect_url: Url, port: u16) -> Result<RedirectListener, AuthError> {
        let server = Server::http(format!("0.0.0.0:{}", port)).map_err(AuthError::TinyHttpError)?;
        Ok(RedirectListener {
            server,
            redirect_url,
        })
    }

    /// Port the server is bound to.
    pub fn port(&self) -> u16 {
        self.server.server_addr().port()
    }
}

impl CodeSource for RedirectListener {
    fn obtain_code(&mut self, url: &Url, state: &CsrfToken) -> Result<String, AuthError> {
        println!("To obtain an authentication token, please visit\n{}", url);
        loop {
            let rq = match self.server.recv() {
                Ok(rq) => rq,
                Err(e) => {
                    error!("error: {}", e);
                    continue;
                }
            };
            debug!("request: {:?}", rq);
            let url = Url::parse(&format!("http://localhost:{}{}", self.port(), rq.url()))?;
            // Check if the path the user navigated to matches the redirect url.
            if url.path() != self.redirect_url.path() {
                rq.respond(Response::from_string("KO").with_status_code(StatusCode(500)))?;
                continue;
            }

            let query: std::collections::HashMap<_, _> = url.query_pairs().collect();
            match (query.get("code"), query.get("state")) {
                (Some(code), Some(received)) if &**received == state.secret().as_str() => {
                    rq.respond(Response::from_string("OK"))?;
                    return Ok(code.to_string());
                }
                (Some(_), _) => {
                    rq.respond(
                        Response::from_string("KO: state mismatch")
                            .with_status_code(StatusCode(400)),
                    )?;
                }
                _ => match (query.get("error"), query.get("error_description")) {
                    (None, None) => {
                        rq.respond(Response::from_string("KO").with_status_code(StatusCode(500)))?;
                    }
                    (e, d) => {
                        rq.respond(
                            Response::from_string(&format!(
                                "Error: {} - {}",
                                e.map(|e| e.as_ref()).unwrap_or(""),
                                d.map(|e| e.as_ref()).unwrap_or("")
                            ))
                            .with_status_code(400),
                        )?;
                    }
                },
            }
        }
    }
}
