//! Channel roster lookup.
//!
//! Fetches the list of users currently in a channel so the bot does not
//! greet viewers who were already present before it started.

use herald_core::normalize_identity;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::collections::BTreeSet;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

const ACCEPT_HEADER: &str = "application/vnd.twitchtv.v3+json";

/// Roster errors.
#[derive(Debug, Error)]
pub enum RosterError {
    /// Request or decoding failed.
    #[error("Roster request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Server answered with a non-success status.
    #[error("Roster request returned {0}")]
    Status(StatusCode),
}

/// Response body of the chatters endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChattersResponse {
    /// Total number of users reported.
    #[serde(default)]
    pub chatter_count: usize,
    /// Users grouped by role.
    #[serde(default)]
    pub chatters: Chatters,
}

/// Users grouped by role.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Chatters {
    /// Channel owner.
    #[serde(default)]
    pub broadcaster: Vec<String>,
    /// VIP users.
    #[serde(default)]
    pub vips: Vec<String>,
    /// Channel moderators.
    #[serde(default)]
    pub moderators: Vec<String>,
    /// Platform staff.
    #[serde(default)]
    pub staff: Vec<String>,
    /// Platform admins.
    #[serde(default)]
    pub admins: Vec<String>,
    /// Global moderators.
    #[serde(default)]
    pub global_mods: Vec<String>,
    /// Everyone else.
    #[serde(default)]
    pub viewers: Vec<String>,
}

impl Chatters {
    /// Every user across all roles, normalized, deduplicated and sorted.
    #[must_use]
    pub fn all(&self) -> Vec<String> {
        [
            &self.broadcaster,
            &self.vips,
            &self.moderators,
            &self.staff,
            &self.admins,
            &self.global_mods,
            &self.viewers,
        ]
        .into_iter()
        .flatten()
        .map(|name| normalize_identity(name))
        .filter(|name| !name.is_empty())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
    }
}

/// HTTP client for the chatters endpoint.
#[derive(Debug, Clone)]
pub struct RosterClient {
    http: Client,
    base_url: String,
}

impl RosterClient {
    /// Create a client.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, RosterError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(ACCEPT_HEADER));

        let http = Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()?;

        Ok(Self {
            http,
            base_url: base_url.into(),
        })
    }

    /// URL of a channel's chatters list.
    #[must_use]
    pub fn url_for(&self, channel: &str) -> String {
        format!(
            "{}/{}/chatters",
            self.base_url.trim_end_matches('/'),
            normalize_identity(channel)
        )
    }

    /// Fetch a channel's users.
    ///
    /// # Errors
    ///
    /// Returns an error on network failure, a non-success status or an
    /// unparseable body.
    pub async fn fetch(&self, channel: &str) -> Result<Chatters, RosterError> {
        let url = self.url_for(channel);
        debug!(url = %url, "Fetching roster");

        let response = self.http.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(RosterError::Status(response.status()));
        }

        let body: ChattersResponse = response.json().await?;
        debug!(channel = %channel, count = body.chatter_count, "Fetched roster");
        Ok(body.chatters)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_chatters() {
        let body = r#"{
            "_links": {},
            "chatter_count": 5,
            "chatters": {
                "moderators": ["Nightbot", "alice"],
                "staff": [],
                "admins": [],
                "global_mods": ["carol"],
                "viewers": ["bob", "alice"]
            }
        }"#;

        let response: ChattersResponse = serde_json::from_str(body).unwrap();
        assert_eq!(response.chatter_count, 5);
        assert_eq!(
            response.chatters.all(),
            ["alice", "bob", "carol", "nightbot"]
        );
    }

    #[test]
    fn test_roles_map_to_fields() {
        let body = r#"{
            "broadcaster": ["owner"],
            "vips": ["vip"],
            "moderators": ["mod"],
            "staff": ["staffer"],
            "admins": ["admin"],
            "global_mods": ["gmod"],
            "viewers": ["viewer"]
        }"#;

        let chatters: Chatters = serde_json::from_str(body).unwrap();
        assert_eq!(chatters.broadcaster, ["owner"]);
        assert_eq!(chatters.vips, ["vip"]);
        assert_eq!(chatters.staff, ["staffer"]);
        assert_eq!(chatters.global_mods, ["gmod"]);
        assert_eq!(chatters.all().len(), 7);
    }

    #[test]
    fn test_url_for() {
        let client =
            RosterClient::new("http://tmi.twitch.tv/group/user/", Duration::from_secs(1)).unwrap();
        assert_eq!(
            client.url_for("#Lobby"),
            "http://tmi.twitch.tv/group/user/lobby/chatters"
        );
    }
}
