//! Channel points balance lookups through the GQL endpoint used by the twitch website.
use std::fmt;

use log::{debug, warn};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, InvalidHeaderValue};
use serde_json::{json, Value};
use twitch_oauth2::oauth2::AccessToken;
use url::Url;

use crate::{Endpoints, USER_AGENT};

/// Public client id of the twitch website; GQL rejects other applications.
pub const GQL_CLIENT_ID: &str = "kimne78kx3ncx6brgo4mv6wki5h1ko";

/// Hash of the persisted `ChannelPointsContext` query.
pub const CHANNEL_POINTS_QUERY_HASH: &str =
    "1530a003a7d374b0380b79db0be0534f30ff46e61cffa2bc0e2468a909fbc024";

/// Errors for [`GqlClient::new`]
#[derive(Debug, thiserror::Error)]
pub enum GqlError {
    #[error("auth token can not be sent as a header")]
    InvalidHeader(#[from] InvalidHeaderValue),
    #[error("could not build http client")]
    Http(#[from] reqwest::Error),
}

/// The first level of the channel points response that was absent.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Missing {
    Community,
    Channel,
    SelfState,
    CommunityPoints,
}

impl fmt::Display for Missing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let level = match self {
            Missing::Community => "Community",
            Missing::Channel => "Channel",
            Missing::SelfState => "Self",
            Missing::CommunityPoints => "Community points",
        };
        write!(f, "{} data is missing in the response.", level)
    }
}

/// Why a channel has no balance.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PointsFailure {
    /// The request itself failed; carries a readable description.
    Transport(String),
    Missing(Missing),
}

impl fmt::Display for PointsFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PointsFailure::Transport(description) => f.write_str(description),
            PointsFailure::Missing(missing) => {
                write!(f, "Unable to fetch channel points: {}", missing)
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChannelPoints {
    pub display_name: String,
    pub balance: i64,
}

/// Balance lookup result for one channel.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChannelPointsResult {
    pub channel: String,
    pub outcome: Result<ChannelPoints, PointsFailure>,
}

impl fmt::Display for ChannelPointsResult {
    /// Formats as a report line
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.outcome {
            Ok(points) => write!(f, "{},{}", points.display_name, points.balance),
            Err(failure) => write!(f, "{},{}", self.channel, failure),
        }
    }
}

/// Request body for the `ChannelPointsContext` persisted query.
pub fn channel_points_query(channel: &str) -> Value {
    json!({
        "operationName": "ChannelPointsContext",
        "variables": {
            "channelLogin": channel,
            "includeGoalTypes": ["CREATOR", "BOOST"],
        },
        "extensions": {
            "persistedQuery": {
                "version": 1,
                "sha256Hash": CHANNEL_POINTS_QUERY_HASH,
            },
        },
    })
}

fn object<'a>(value: &'a Value, key: &str, missing: Missing) -> Result<&'a Value, Missing> {
    value.get(key).filter(|v| v.is_object()).ok_or(missing)
}

/// Walk `data.community.channel.self.communityPoints.balance`.
///
/// `channel` stands in for `community.displayName` when that is absent.
pub fn extract_points(body: &Value, channel: &str) -> Result<ChannelPoints, Missing> {
    let community = body
        .get("data")
        .ok_or(Missing::Community)
        .and_then(|data| object(data, "community", Missing::Community))?;
    let channel_data = object(community, "channel", Missing::Channel)?;
    let self_data = object(channel_data, "self", Missing::SelfState)?;
    let balance = object(self_data, "communityPoints", Missing::CommunityPoints)?
        .get("balance")
        .and_then(Value::as_i64)
        .ok_or(Missing::CommunityPoints)?;

    let display_name = community
        .get("displayName")
        .and_then(Value::as_str)
        .unwrap_or(channel)
        .to_string();
    Ok(ChannelPoints {
        display_name,
        balance,
    })
}

/// GQL client authenticated with the user's browser auth token.
#[derive(Clone)]
pub struct GqlClient {
    client: reqwest::Client,
    url: Url,
}

impl GqlClient {
    pub fn new(endpoints: &Endpoints, auth_token: &AccessToken) -> Result<Self, GqlError> {
        let oauth = format!("OAuth {}", auth_token.secret());
        let client = reqwest::ClientBuilder::new()
            .user_agent(USER_AGENT)
            .default_headers(
                [("client-id", GQL_CLIENT_ID), ("authorization", &*oauth)]
                    .iter()
                    .map(|&(k, v)| Ok((HeaderName::from_static(k), HeaderValue::from_str(v)?)))
                    .collect::<Result<HeaderMap, GqlError>>()?,
            )
            .build()?;

        Ok(Self {
            client,
            url: endpoints.gql.clone(),
        })
    }

    /// Look up the balance the authenticated viewer has on `channel`.
    ///
    /// Never fails; failures are described in the returned result.
    pub async fn channel_points(&self, channel: &str) -> ChannelPointsResult {
        let outcome = match self.fetch(channel).await {
            Ok(body) => {
                if let Some(errors) = body.get("errors") {
                    warn!("gql reported errors for {}: {}", channel, errors);
                }
                extract_points(&body, channel).map_err(PointsFailure::Missing)
            }
            Err(failure) => Err(failure),
        };
        match &outcome {
            Ok(points) => debug!("{} has {} points", channel, points.balance),
            Err(failure) => warn!("no channel points for {}: {}", channel, failure),
        }
        ChannelPointsResult {
            channel: channel.to_string(),
            outcome,
        }
    }

    async fn fetch(&self, channel: &str) -> Result<Value, PointsFailure> {
        let resp = self
            .client
            .post(self.url.clone())
            .json(&channel_points_query(channel))
            .send()
            .await
            .map_err(|e| PointsFailure::Transport(format!("Error fetching data: {}", e)))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(PointsFailure::Transport(format!(
                "Error fetching data: {}",
                status.canonical_reason().unwrap_or("unknown")
            )));
        }
        resp.json()
            .await
            .map_err(|e| PointsFailure::Transport(format!("Error reading data: {}", e)))
    }
}
