//! Geolocation lookups against an ip-api.com compatible endpoint.

use std::time::Duration;

use log::{debug, warn};
use reqwest::blocking::{Client, Response};
use reqwest::header::HeaderMap;
use reqwest::{StatusCode, Url};
use serde::Deserialize;

use crate::error::{Error, Result};

/// Public ip-api.com JSON endpoint. The IP is appended as a path segment.
pub const DEFAULT_API_URL: &str = "http://ip-api.com/json";
/// Fields requested from the service, keeps responses small.
pub const API_FIELDS: &str = "status,message,country,regionName,city,isp,timezone";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Result of looking up one IP address.
///
/// Every geolocation field is `None` when the lookup failed.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IpRecord {
    pub ip: String,
    pub country: Option<String>,
    pub region: Option<String>,
    pub city: Option<String>,
    pub isp: Option<String>,
    pub timezone: Option<String>,
}

impl IpRecord {
    /// A record carrying only the IP, used for failed lookups.
    pub fn empty(ip: impl Into<String>) -> Self {
        IpRecord {
            ip: ip.into(),
            ..IpRecord::default()
        }
    }

    /// True if any geolocation field is present.
    pub fn is_resolved(&self) -> bool {
        self.country.is_some()
            || self.region.is_some()
            || self.city.is_some()
            || self.isp.is_some()
            || self.timezone.is_some()
    }
}

/// A record plus an optional request from the service to slow down.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Lookup {
    pub record: IpRecord,
    pub backoff: Option<Duration>,
}

impl Lookup {
    pub fn new(record: IpRecord) -> Self {
        Lookup {
            record,
            backoff: None,
        }
    }
}

/// Anything that can geolocate an IP address.
///
/// Implementations never fail: problems are reported as an empty record.
pub trait Geolocate {
    fn lookup(&self, ip: &str) -> Lookup;
}

impl<G: Geolocate + ?Sized> Geolocate for &G {
    fn lookup(&self, ip: &str) -> Lookup {
        (**self).lookup(ip)
    }
}

/// Raw ip-api.com response body.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiResponse {
    status: String,
    message: Option<String>,
    country: Option<String>,
    region_name: Option<String>,
    city: Option<String>,
    isp: Option<String>,
    timezone: Option<String>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl ApiResponse {
    fn into_record(self, ip: &str) -> IpRecord {
        if self.status != "success" {
            warn!(
                "Lookup for {} failed: {}",
                ip,
                self.message.as_deref().unwrap_or("unknown error")
            );
            return IpRecord::empty(ip);
        }
        IpRecord {
            ip: ip.to_string(),
            country: non_empty(self.country),
            region: non_empty(self.region_name),
            city: non_empty(self.city),
            isp: non_empty(self.isp),
            timezone: non_empty(self.timezone),
        }
    }
}

/// Parse a response body into a record. Malformed bodies give an empty record.
pub fn parse_response(ip: &str, body: &str) -> IpRecord {
    match serde_json::from_str::<ApiResponse>(body) {
        Ok(resp) => resp.into_record(ip),
        Err(err) => {
            warn!("Malformed response for {}: {}", ip, err);
            IpRecord::empty(ip)
        }
    }
}

fn header_secs(headers: &HeaderMap, name: &str) -> Option<u64> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
}

/// Back-off requested by the service, if any.
///
/// ip-api.com reports remaining requests in `X-Rl` and seconds until the
/// window resets in `X-Ttl`. A 429 or an exhausted quota means wait
/// `X-Ttl` seconds, or `fallback` when the header is missing.
pub fn backoff_hint(status: StatusCode, headers: &HeaderMap, fallback: Duration) -> Option<Duration> {
    let exhausted = header_secs(headers, "x-rl") == Some(0);
    if status != StatusCode::TOO_MANY_REQUESTS && !exhausted {
        return None;
    }
    Some(
        header_secs(headers, "x-ttl")
            .map(Duration::from_secs)
            .unwrap_or(fallback),
    )
}

/// Blocking client for ip-api.com.
#[derive(Clone, Debug)]
pub struct IpApiClient {
    http: Client,
    base_url: Url,
    fallback_backoff: Duration,
}

impl IpApiClient {
    /// Build a client for `base_url` with a per-request `timeout`.
    ///
    /// `fallback_backoff` is used when the service signals a rate limit
    /// without saying how long to wait.
    pub fn new(base_url: &str, timeout: Duration, fallback_backoff: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("ipfinder/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(Error::HttpClient)?;
        let invalid = |reason: String| Error::InvalidApiUrl {
            url: base_url.to_string(),
            reason,
        };
        let base_url = Url::parse(base_url).map_err(|err| invalid(err.to_string()))?;
        if base_url.cannot_be_a_base() {
            return Err(invalid("cannot hold a path".to_string()));
        }
        Ok(IpApiClient {
            http,
            base_url,
            fallback_backoff,
        })
    }

    /// Request URL for `ip`, which becomes one percent-encoded path segment.
    pub fn url_for(&self, ip: &str) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push(ip.trim());
        }
        url
    }

    fn fetch(&self, ip: &str) -> reqwest::Result<Response> {
        self.http
            .get(self.url_for(ip))
            .query(&[("fields", API_FIELDS)])
            .send()
    }
}

impl Geolocate for IpApiClient {
    fn lookup(&self, ip: &str) -> Lookup {
        debug!("Fetching details for IP: {}", ip);
        let response = match self.fetch(ip) {
            Ok(response) => response,
            Err(err) => {
                warn!("Error fetching details for IP {}: {}", ip, err);
                return Lookup::new(IpRecord::empty(ip));
            }
        };

        let status = response.status();
        let backoff = backoff_hint(status, response.headers(), self.fallback_backoff);
        if !status.is_success() {
            warn!("Lookup for {} returned HTTP {}", ip, status);
            return Lookup {
                record: IpRecord::empty(ip),
                backoff,
            };
        }

        let record = match response.text() {
            Ok(body) => parse_response(ip, &body),
            Err(err) => {
                warn!("Error reading response for IP {}: {}", ip, err);
                IpRecord::empty(ip)
            }
        };
        Lookup { record, backoff }
    }
}
