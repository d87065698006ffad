//! Export the channel points balance of every channel a Twitch user follows.
//!
//! A run loads [`Credentials`], authorizes with the [OAuth authorization code flow](https://dev.twitch.tv/docs/authentication/getting-tokens-oauth/#authorization-code-grant-flow),
//! resolves the user, pages through the channels they follow and asks the GQL endpoint for the
//! viewer's balance on each of them, one channel at a time. See [`run`].
use std::path::PathBuf;

use log::debug;
use twitch_oauth2::oauth2::AccessToken;
use url::Url;

pub mod auth;
pub mod config;
pub mod gql;
pub mod helix;
pub mod report;

pub use auth::{AuthError, Authorizer, CodeSource, ConsolePrompt, RedirectListener};
pub use config::{ConfigError, Credentials};
pub use gql::{ChannelPoints, ChannelPointsResult, GqlClient, GqlError, Missing, PointsFailure};
pub use helix::{FollowedChannel, HelixClient, HelixError};
pub use report::{Report, ReportAssembler};

pub const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// Errors for [`run`]
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error(transparent)]
    Helix(#[from] HelixError),
    #[error(transparent)]
    Gql(#[from] GqlError),
    #[error("failed to interact with the console")]
    Console(#[source] std::io::Error),
    #[error("no username was given")]
    NoUsername,
    #[error("failed to write report to {}", path.display())]
    WriteReport {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// URLs of the services a run talks to.
#[derive(Clone, Debug)]
pub struct Endpoints {
    pub authorize: Url,
    pub token: Url,
    /// Base of the Helix API, ending in a slash.
    pub helix: Url,
    pub gql: Url,
}

impl Default for Endpoints {
    fn default() -> Self {
        Endpoints::from_strs(
            "https://id.twitch.tv/oauth2/authorize",
            "https://id.twitch.tv/oauth2/token",
            "https://api.twitch.tv/helix/",
            "https://gql.twitch.tv/gql",
        )
        .expect("unexpected failure to construct urls to twitch")
    }
}

impl Endpoints {
    fn from_strs(
        authorize: &str,
        token: &str,
        helix: &str,
        gql: &str,
    ) -> Result<Self, url::ParseError> {
        Ok(Endpoints {
            authorize: Url::parse(authorize)?,
            token: Url::parse(token)?,
            helix: Url::parse(helix)?,
            gql: Url::parse(gql)?,
        })
    }

    /// Every service under one base, with twitch's paths.
    ///
    /// Useful to point a run at a local mock server.
    pub fn rooted_at(base: &str) -> Result<Self, url::ParseError> {
        let base = Url::parse(base)?;
        Ok(Endpoints {
            authorize: base.join("/oauth2/authorize")?,
            token: base.join("/oauth2/token")?,
            helix: base.join("/helix/")?,
            gql: base.join("/gql")?,
        })
    }
}

/// Everything a run needs besides the interactive code source.
#[derive(Clone)]
pub struct RunOptions {
    pub config_path: PathBuf,
    pub username: String,
    pub output_dir: PathBuf,
    pub redirect_uri: String,
    pub endpoints: Endpoints,
    /// Skips authorization when set.
    pub access_token: Option<AccessToken>,
    /// Consulted for `CLIENT_ID`, `CLIENT_SECRET` and `AUTH_TOKEN` overrides.
    pub env: fn(&str) -> Option<String>,
}

impl RunOptions {
    /// Options with twitch's endpoints, the default config path and the download directory.
    pub fn new(username: &str) -> Self {
        RunOptions {
            config_path: PathBuf::from(config::DEFAULT_CONFIG_PATH),
            username: username.to_string(),
            output_dir: report::default_output_dir(),
            redirect_uri: auth::DEFAULT_REDIRECT_URL.to_string(),
            endpoints: Endpoints::default(),
            access_token: None,
            env: |key| std::env::var(key).ok(),
        }
    }
}

/// Load credentials, authorize, build the report for `options.username` and write it.
///
/// Returns the path of the written report. Nothing is written when the configuration, the
/// authorization or the user lookup fails.
pub async fn run(options: &RunOptions, source: &mut dyn CodeSource) -> Result<PathBuf, Error> {
    let credentials = Credentials::load(&options.config_path)?.with_overrides(options.env);
    debug!("state: config loaded");

    let token = match &options.access_token {
        Some(token) => token.clone(),
        None => {
            let http = reqwest::Client::builder()
                .user_agent(USER_AGENT)
                .build()
                .map_err(AuthError::from)?;
            Authorizer::new(&http, &options.endpoints, &credentials, &options.redirect_uri)
                .authorize(source)
                .await?
        }
    };
    debug!("state: authorized");

    let helix = HelixClient::new(&options.endpoints, &credentials.client_id, &token)?;
    let gql = GqlClient::new(&options.endpoints, &credentials.auth_token)?;
    let report = ReportAssembler::new(&helix, &gql)
        .assemble(&options.username)
        .await?;

    let path = report.write_to(&options.output_dir, &options.username, report::now())?;
    debug!("state: report written");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rooted_endpoints_keep_twitch_paths() {
        let endpoints = Endpoints::rooted_at("http://127.0.0.1:1234").unwrap();
        assert_eq!(endpoints.token.as_str(), "http://127.0.0.1:1234/oauth2/token");
        assert_eq!(
            endpoints.helix.join("users/follows").unwrap().as_str(),
            "http://127.0.0.1:1234/helix/users/follows"
        );
        assert_eq!(endpoints.gql.as_str(), "http://127.0.0.1:1234/gql");
    }

    #[test]
    fn default_endpoints_point_at_twitch() {
        let endpoints = Endpoints::default();
        assert_eq!(endpoints.authorize.host_str(), Some("id.twitch.tv"));
        assert_eq!(
            endpoints.helix.join("users").unwrap().as_str(),
            "https://api.twitch.tv/helix/users"
        );
    }
}
