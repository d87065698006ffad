//! User lookup and followed channel pagination on the Helix API.
use log::{debug, info, warn};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, InvalidHeaderValue};
use serde::Deserialize;
use time::OffsetDateTime;
use twitch_oauth2::{oauth2::AccessToken, ClientId};
use url::Url;

use crate::{Endpoints, USER_AGENT};

/// Errors for [`HelixClient`]
#[derive(Debug, thiserror::Error)]
pub enum HelixError {
    #[error("client id or access token can not be sent as a header")]
    InvalidHeader(#[from] InvalidHeaderValue),
    #[error("talking with helix failed")]
    Http(#[from] reqwest::Error),
    #[error("helix responded with {status}: {reason}")]
    Status {
        status: reqwest::StatusCode,
        reason: String,
    },
    #[error("user with login '{0}' not found")]
    UserNotFound(String),
    #[error("could not build url")]
    UrlParseError(#[from] url::ParseError),
}

/// A channel the user follows.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct FollowedChannel {
    pub to_id: String,
    pub to_login: String,
    pub to_name: String,
    #[serde(with = "time::serde::rfc3339")]
    pub followed_at: OffsetDateTime,
}

/// One page of the follows endpoint.
#[derive(Debug, Default)]
pub struct Page {
    pub channels: Vec<FollowedChannel>,
    pub cursor: Option<String>,
}

#[derive(Deserialize)]
struct Pagination {
    #[serde(default)]
    cursor: Option<String>,
}

#[derive(Deserialize)]
struct FollowsResponse {
    data: Vec<FollowedChannel>,
    #[serde(default)]
    pagination: Option<Pagination>,
}

#[derive(Deserialize)]
struct User {
    id: String,
}

#[derive(Deserialize)]
struct UsersResponse {
    #[serde(default)]
    data: Vec<User>,
}

/// Helix client authenticated with the application's client id and a user access token.
#[derive(Clone)]
pub struct HelixClient {
    client: reqwest::Client,
    base: Url,
}

impl HelixClient {
    pub fn new(
        endpoints: &Endpoints,
        client_id: &ClientId,
        token: &AccessToken,
    ) -> Result<Self, HelixError> {
        let bearer = format!("Bearer {}", token.secret());
        let client = reqwest::ClientBuilder::new()
            .user_agent(USER_AGENT)
            .default_headers(
                [("client-id", client_id.as_str()), ("authorization", &*bearer)]
                    .iter()
                    .map(|&(k, v)| Ok((HeaderName::from_static(k), HeaderValue::from_str(v)?)))
                    .collect::<Result<HeaderMap, HelixError>>()?,
            )
            .build()?;

        Ok(Self {
            client,
            base: endpoints.helix.clone(),
        })
    }

    /// Resolve a login name to its user id.
    pub async fn user_id(&self, login: &str) -> Result<String, HelixError> {
        let mut url = self.base.join("users")?;
        url.query_pairs_mut().append_pair("login", login);

        let resp: UsersResponse = self.get(url).await?;
        match resp.data.into_iter().next() {
            Some(user) => {
                debug!("resolved '{}' to user id {}", login, user.id);
                Ok(user.id)
            }
            None => Err(HelixError::UserNotFound(login.to_string())),
        }
    }

    /// Fetch a single page of channels followed by `user_id`, starting after `cursor`.
    pub async fn follows_page(
        &self,
        user_id: &str,
        cursor: Option<&str>,
    ) -> Result<Page, HelixError> {
        let mut url = self.base.join("users/follows")?;
        url.query_pairs_mut().append_pair("from_id", user_id);
        if let Some(cursor) = cursor {
            url.query_pairs_mut().append_pair("after", cursor);
        }

        let resp: FollowsResponse = self.get(url).await?;
        Ok(Page {
            channels: resp.data,
            cursor: resp
                .pagination
                .and_then(|p| p.cursor)
                .filter(|c| !c.is_empty()),
        })
    }

    /// Every channel followed by `user_id`, in the order the pages returned them.
    ///
    /// A failing page ends pagination; the channels gathered so far are returned.
    pub async fn all_follows(&self, user_id: &str) -> Vec<FollowedChannel> {
        let mut all = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let page = match self.follows_page(user_id, cursor.as_deref()).await {
                Ok(page) => page,
                Err(e) => {
                    warn!(
                        "failed to fetch followed channels, keeping {} already fetched: {}",
                        all.len(),
                        e
                    );
                    break;
                }
            };
            debug!("fetched page of {} followed channels", page.channels.len());
            all.extend(page.channels);

            match page.cursor {
                Some(next) if cursor.as_deref() == Some(next.as_str()) => {
                    warn!("follows cursor did not advance, stopping pagination");
                    break;
                }
                Some(next) => cursor = Some(next),
                None => break,
            }
        }
        info!("user {} follows {} channels", user_id, all.len());
        all
    }

    async fn get<T>(&self, url: Url) -> Result<T, HelixError>
    where
        T: for<'de> Deserialize<'de>,
    {
        let resp = self.client.get(url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(HelixError::Status {
                status,
                reason: status.canonical_reason().unwrap_or("unknown").to_string(),
            });
        }
        Ok(resp.json().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn follows_response_parses_entries_and_cursor() {
        let body = r#"{
            "total": 2,
            "data": [
                {"from_id":"42","from_login":"alice","from_name":"Alice","to_id":"1","to_login":"foo","to_name":"Foo","followed_at":"2021-03-01T12:00:00Z"},
                {"from_id":"42","from_login":"alice","from_name":"Alice","to_id":"2","to_login":"bar","to_name":"Bar","followed_at":"2020-01-15T08:30:00Z"}
            ],
            "pagination": {"cursor": "abc"}
        }"#;
        let resp: FollowsResponse = serde_json::from_str(body).unwrap();
        assert_eq!(resp.data.len(), 2);
        assert_eq!(resp.data[0].to_login, "foo");
        assert_eq!(resp.data[1].to_name, "Bar");
        assert_eq!(resp.data[0].followed_at.year(), 2021);
        assert_eq!(resp.pagination.unwrap().cursor.as_deref(), Some("abc"));
    }

    #[test]
    fn follows_response_without_pagination_has_no_cursor() {
        let resp: FollowsResponse = serde_json::from_str(r#"{"data":[],"pagination":{}}"#).unwrap();
        assert!(resp.pagination.unwrap().cursor.is_none());

        let resp: FollowsResponse = serde_json::from_str(r#"{"data":[]}"#).unwrap();
        assert!(resp.pagination.is_none());
    }

    #[test]
    fn invalid_token_is_rejected_as_header() {
        let token = AccessToken::new("bad\ntoken".to_string());
        let result = HelixClient::new(
            &Endpoints::default(),
            &ClientId::new("cid".to_string()),
            &token,
        );
        assert!(matches!(result, Err(HelixError::InvalidHeader(_))));
    }
}
