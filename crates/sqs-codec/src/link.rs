//! Shareable links: `<app_url>?config=<token>`.

use tracing::debug;
use url::Url;

use sqs_types::{CodecError, Configuration};

use crate::codec::{decode, encode};

/// Query parameter carrying the share token.
pub const CONFIG_PARAM: &str = "config";

fn invalid_link(message: impl ToString) -> CodecError {
    CodecError::InvalidLink {
        message: message.to_string(),
    }
}

/// Builds and reads share links.
pub struct ShareLink;

impl ShareLink {
    /// Link to `app_url` that reproduces `config` when opened.
    ///
    /// Other query parameters already present on `app_url` are kept; an
    /// existing `config` parameter is replaced.
    pub fn build(app_url: &str, config: &Configuration) -> Result<Url, CodecError> {
        let mut url = Url::parse(app_url).map_err(|e| invalid_link(format!("{app_url}: {e}")))?;
        let token = encode(config)?;

        let retained: Vec<(String, String)> = url
            .query_pairs()
            .filter(|(name, _)| name != CONFIG_PARAM)
            .map(|(name, value)| (name.into_owned(), value.into_owned()))
            .collect();
        {
            let mut pairs = url.query_pairs_mut();
            pairs.clear();
            for (name, value) in &retained {
                pairs.append_pair(name, value);
            }
            pairs.append_pair(CONFIG_PARAM, &token);
        }

        debug!(link_len = url.as_str().len(), "built share link");
        Ok(url)
    }

    /// Extract the (percent-decoded) token from a share link.
    pub fn token(link: &str) -> Result<String, CodecError> {
        let url = Url::parse(link.trim()).map_err(invalid_link)?;
        url.query_pairs()
            .find(|(name, _)| name == CONFIG_PARAM)
            .map(|(_, value)| value.into_owned())
            .ok_or_else(|| invalid_link(format!("missing `{CONFIG_PARAM}` parameter")))
    }

    /// Decode the configuration carried by a share link.
    pub fn parse(link: &str) -> Result<Configuration, CodecError> {
        decode(&Self::token(link)?)
    }
}
