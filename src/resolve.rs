//! Where the board lives and where orders come from.
//!
//! Both are resolved through a chain rather than required on every
//! invocation:
//!
//! 1. an explicit flag (`--db`, `--feed-file` / `--feed-url`)
//! 2. an environment variable (`LOADBOARD_DB`, `LOADBOARD_FEED_URL`)
//! 3. `~/.loadboard/config.toml`
//!
//! The database falls back to `~/.loadboard/board.sqlite`; the feed has no
//! fallback.

use std::env;
use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::feed::{FileFeed, HttpFeed, OrderFeed};
use crate::storage::Storage;

pub const DB_ENV: &str = "LOADBOARD_DB";
pub const FEED_URL_ENV: &str = "LOADBOARD_FEED_URL";

/// Error message shown when no feed can be resolved.
pub const FEED_REQUIRED: &str = "order feed required: pass --feed-url <url> or \
    --feed-file <path>, set LOADBOARD_FEED_URL, or add `feed-url = \"...\"` \
    to ~/.loadboard/config.toml";

/// A resolved order feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedSource {
    File(PathBuf),
    Url(String),
}

impl FeedSource {
    pub fn open(self) -> Box<dyn OrderFeed> {
        match self {
            Self::File(path) => Box::new(FileFeed::new(path)),
            Self::Url(url) => Box::new(HttpFeed::new(url)),
        }
    }
}

/// Resolve the database path.
pub fn resolve_database(explicit: Option<&Path>, config: &Config) -> Result<PathBuf, String> {
    database_from(explicit, env_value(DB_ENV), config)
}

/// Resolve the order feed. Returns [`FEED_REQUIRED`] when nothing is set.
pub fn resolve_feed(
    file: Option<&Path>,
    url: Option<&str>,
    config: &Config,
) -> Result<FeedSource, String> {
    feed_from(file, url, env_value(FEED_URL_ENV), config)
}

fn env_value(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn database_from(
    explicit: Option<&Path>,
    from_env: Option<String>,
    config: &Config,
) -> Result<PathBuf, String> {
    if let Some(path) = explicit {
        return Ok(path.to_path_buf());
    }
    if let Some(path) = from_env {
        return Ok(PathBuf::from(path));
    }
    if let Some(path) = &config.database {
        return Ok(path.clone());
    }
    Storage::default_path().ok_or_else(|| "could not determine home directory".to_string())
}

fn feed_from(
    file: Option<&Path>,
    url: Option<&str>,
    from_env: Option<String>,
    config: &Config,
) -> Result<FeedSource, String> {
    if let Some(path) = file {
        return Ok(FeedSource::File(path.to_path_buf()));
    }
    if let Some(url) = url.filter(|u| !u.trim().is_empty()) {
        return Ok(FeedSource::Url(url.to_string()));
    }
    if let Some(url) = from_env {
        return Ok(FeedSource::Url(url));
    }
    if let Some(url) = &config.feed_url {
        return Ok(FeedSource::Url(url.clone()));
    }
    Err(FEED_REQUIRED.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with(feed_url: Option<&str>, database: Option<&str>) -> Config {
        Config {
            feed_url: feed_url.map(String::from),
            database: database.map(PathBuf::from),
            ..Config::default()
        }
    }

    #[test]
    fn explicit_database_wins() {
        let config = config_with(None, Some("/from/config.sqlite"));
        let path = database_from(
            Some(Path::new("/explicit.sqlite")),
            Some("/from/env.sqlite".into()),
            &config,
        )
        .unwrap();
        assert_eq!(path, PathBuf::from("/explicit.sqlite"));
    }

    #[test]
    fn env_database_beats_config() {
        let config = config_with(None, Some("/from/config.sqlite"));
        let path = database_from(None, Some("/from/env.sqlite".into()), &config).unwrap();
        assert_eq!(path, PathBuf::from("/from/env.sqlite"));
    }

    #[test]
    fn config_database_beats_default() {
        let config = config_with(None, Some("/from/config.sqlite"));
        let path = database_from(None, None, &config).unwrap();
        assert_eq!(path, PathBuf::from("/from/config.sqlite"));
    }

    #[test]
    fn feed_file_beats_everything() {
        let config = config_with(Some("http://config/orders"), None);
        let source = feed_from(
            Some(Path::new("snapshot.json")),
            Some("http://flag/orders"),
            Some("http://env/orders".into()),
            &config,
        )
        .unwrap();
        assert_eq!(source, FeedSource::File(PathBuf::from("snapshot.json")));
    }

    #[test]
    fn feed_url_chain() {
        let config = config_with(Some("http://config/orders"), None);

        let source = feed_from(
            None,
            Some("http://flag/orders"),
            Some("http://env/orders".into()),
            &config,
        );
        assert_eq!(source.unwrap(), FeedSource::Url("http://flag/orders".into()));

        let source = feed_from(None, None, Some("http://env/orders".into()), &config);
        assert_eq!(source.unwrap(), FeedSource::Url("http://env/orders".into()));

        let source = feed_from(None, None, None, &config);
        assert_eq!(source.unwrap(), FeedSource::Url("http://config/orders".into()));
    }

    #[test]
    fn no_feed_is_an_error() {
        let err = feed_from(None, None, None, &Config::default()).unwrap_err();
        assert_eq!(err, FEED_REQUIRED);
    }
}
