use std::time::Duration;

use lazy_static::lazy_static;
use regex::Regex;
use reqwest::StatusCode;
use thiserror::Error;
use tracing::debug;

use crate::common::USER_AGENT;
use crate::types::WorkshopId;

const WORKSHOP_ITEM_URL: &str = "https://steamcommunity.com/workshop/filedetails/";

lazy_static! {
    static ref TITLE_RE: Regex =
        Regex::new(r#"(?s)<div class="workshopItemTitle">(.*?)</div>"#).unwrap();
}

/// Why a workshop name lookup produced nothing.
#[derive(Debug, Error)]
pub enum LookupError {
    /// Networking is switched off
    #[error("workshop lookups are disabled")]
    Disabled,
    /// Transport or TLS failure
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    /// Non-200 response
    #[error("unexpected status {0}")]
    Status(StatusCode),
    /// Page did not contain an item title, e.g. a removed item
    #[error("no item title on the workshop page")]
    NoTitle,
}

/// Resolves a workshop id to a display name from a remote source.
#[allow(async_fn_in_trait)]
pub trait NameLookup {
    /// Look up the display name of `id`.
    async fn lookup(&self, id: &WorkshopId) -> Result<String, LookupError>;
}

/// Scrapes the item title from the public Steam Workshop page.
#[derive(Debug, Clone)]
pub struct SteamWorkshop {
    client: reqwest::Client,
}

impl SteamWorkshop {
    /// Build the HTTP client. Fails if the TLS backend cannot be initialized.
    pub fn new() -> Result<Self, LookupError> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .tcp_keepalive(Some(Duration::from_secs(10)))
            .build()?;

        Ok(Self { client })
    }
}

impl NameLookup for SteamWorkshop {
    async fn lookup(&self, id: &WorkshopId) -> Result<String, LookupError> {
        debug!("querying steam workshop for {id}");
        let response = self
            .client
            .get(WORKSHOP_ITEM_URL)
            .query(&[("id", id.as_str())])
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => extract_title(&response.text().await?).ok_or(LookupError::NoTitle),
            status => Err(LookupError::Status(status)),
        }
    }
}

/// Lookup used when networking is off or the client could not be built.
#[derive(Debug, Clone, Copy, Default)]
pub struct Offline;

impl NameLookup for Offline {
    async fn lookup(&self, _id: &WorkshopId) -> Result<String, LookupError> {
        Err(LookupError::Disabled)
    }
}

/// Pull the item title out of a workshop page.
pub fn extract_title(html: &str) -> Option<String> {
    let caps = TITLE_RE.captures(html)?;
    let title = decode_entities(caps[1].trim());

    (!title.is_empty()).then_some(title)
}

fn decode_entities(s: &str) -> String {
    // `&amp;` last, so `&amp;lt;` stays `&lt;`
    s.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&#039;", "'")
        .replace("&amp;", "&")
}
