use crate::error::Error;
use crate::suffix::{Suffix, SuffixTable};
use serde::Deserialize;
use serde_with::{serde_as, DurationSeconds};
use std::collections::HashSet;
use std::fs::File;
use std::io::BufReader;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use trust_dns_proto::rr::Name;

pub type Shared = Arc<Config>;

const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:53";
const DEFAULT_TCP_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_UPSTREAM_TIMEOUT: Duration = Duration::from_secs(2);

/// Configuration as supplied by the user, before validation.
///
/// List entries may themselves be comma-separated, so `["a=b,c=d"]` and `["a=b", "c=d"]` are
/// equivalent. Empty entries are ignored.
#[serde_as]
#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct RawConfig {
    pub address: String,
    pub default: Option<String>,
    pub routes: Vec<String>,
    pub remaps: Vec<String>,
    pub allow_transfer: Vec<String>,
    #[serde_as(as = "DurationSeconds<u64>")]
    pub tcp_timeout: Duration,
    #[serde_as(as = "DurationSeconds<u64>")]
    pub upstream_timeout: Duration,
}

impl Default for RawConfig {
    fn default() -> Self {
        Self {
            address: DEFAULT_LISTEN_ADDR.to_string(),
            default: None,
            routes: Vec::default(),
            remaps: Vec::default(),
            allow_transfer: Vec::default(),
            tcp_timeout: DEFAULT_TCP_TIMEOUT,
            upstream_timeout: DEFAULT_UPSTREAM_TIMEOUT,
        }
    }
}

/// The validated, immutable proxy configuration. Built once at startup and shared read-only
/// with every request handler through [`Shared`].
#[derive(Debug, Clone)]
pub struct Config {
    pub listen_addr: SocketAddr,
    pub default_upstream: String,
    pub routes: SuffixTable<String>,
    pub remaps: SuffixTable<Name>,
    pub allow_transfer: HashSet<String>,
    pub tcp_timeout: Duration,
    pub upstream_timeout: Duration,
}

impl Config {
    /// Load a [`RawConfig`] from a JSON file and validate it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IO`] if the file can't be read, [`Error::InvalidJSON`] if it isn't a
    /// valid [`RawConfig`], or any error of [`Config::try_from_raw`].
    pub fn try_from_file(p: impl AsRef<Path>) -> Result<Self, Error> {
        let f = File::open(p)?;
        let reader = BufReader::new(f);
        let raw: RawConfig = serde_json::from_reader(reader)?;
        Self::try_from_raw(raw)
    }

    /// Validate a [`RawConfig`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingDefault`] without a default upstream, [`Error::InvalidEntry`] for
    /// a route or remap that isn't `key=value`, [`Error::DNSError`] for a suffix that isn't a
    /// domain name and [`Error::InvalidListenAddress`] for a bad listen address.
    pub fn try_from_raw(raw: RawConfig) -> Result<Self, Error> {
        let default_upstream = raw
            .default
            .as_deref()
            .map(str::trim)
            .filter(|upstream| !upstream.is_empty())
            .ok_or(Error::MissingDefault)?
            .to_string();

        let routes = key_values("route", &raw.routes)?
            .into_iter()
            .map(|(suffix, upstream)| {
                Ok::<_, Error>((Suffix::parse(suffix)?, upstream.to_string()))
            })
            .collect::<Result<SuffixTable<String>, Error>>()?;

        let remaps = key_values("remap", &raw.remaps)?
            .into_iter()
            .map(|(src, dst)| {
                let dst = Suffix::parse(dst)?.name().clone();
                Ok::<_, Error>((Suffix::parse(src)?, dst))
            })
            .collect::<Result<SuffixTable<Name>, Error>>()?;

        let allow_transfer = entries(&raw.allow_transfer).map(str::to_string).collect();

        Ok(Self {
            listen_addr: listen_addr(&raw.address)?,
            default_upstream,
            routes,
            remaps,
            allow_transfer,
            tcp_timeout: raw.tcp_timeout,
            upstream_timeout: raw.upstream_timeout,
        })
    }
}

fn entries(list: &[String]) -> impl Iterator<Item = &str> {
    list.iter()
        .flat_map(|item| item.split(','))
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
}

fn key_values<'a>(
    kind: &'static str,
    list: &'a [String],
) -> Result<Vec<(&'a str, &'a str)>, Error> {
    entries(list)
        .map(|entry| match entry.split_once('=') {
            Some((key, value)) if !key.trim().is_empty() && !value.trim().is_empty() => {
                Ok((key.trim(), value.trim()))
            }
            _ => Err(Error::InvalidEntry {
                kind,
                entry: entry.to_string(),
            }),
        })
        .collect()
}

fn listen_addr(address: &str) -> Result<SocketAddr, Error> {
    let address = address.trim();
    let expanded = match address.strip_prefix(':') {
        Some(port) => format!("0.0.0.0:{port}"),
        None => address.to_string(),
    };
    expanded
        .parse()
        .map_err(|_| Error::InvalidListenAddress(address.to_string()))
}
