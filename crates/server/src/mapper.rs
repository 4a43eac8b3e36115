//! Request to canonical URL mapping.

use axum::extract::Request;
use axum::http::header::HOST;
use url::Url;

use prerender_client::{UrlError, canonical_key, canonicalize};

const X_FORWARDED_PROTO: &str = "x-forwarded-proto";

/// Maps an inbound request to the canonical absolute URL used as its cache key.
///
/// Must be a pure function of the request.
pub trait UrlMapper: Send + Sync {
    fn to_canonical_url(&self, request: &Request) -> Result<String, UrlError>;
}

/// Maps a request to the URL it was addressed to.
///
/// With a base URL, its scheme, authority and path prefix replace whatever the
/// request carries, so pages cached behind a proxy get their public address.
/// Without one, the scheme comes from `x-forwarded-proto` (else `http`) and
/// the authority from the `Host` header.
#[derive(Debug, Clone, Default)]
pub struct SelfUrlMapper {
    base: Option<Url>,
}

impl SelfUrlMapper {
    pub fn new(base_url: Option<&str>) -> Result<Self, UrlError> {
        let base = base_url
            .map(|raw| {
                let mut base = canonicalize(raw)?;
                base.set_query(None);
                Ok::<_, UrlError>(base)
            })
            .transpose()?;
        Ok(Self { base })
    }

    fn origin(&self, request: &Request) -> Result<String, UrlError> {
        if let Some(base) = &self.base {
            return Ok(base.as_str().trim_end_matches('/').to_string());
        }

        let scheme = request
            .headers()
            .get(X_FORWARDED_PROTO)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .or_else(|| request.uri().scheme_str())
            .unwrap_or("http");

        let host = request
            .headers()
            .get(HOST)
            .and_then(|v| v.to_str().ok())
            .or_else(|| request.uri().authority().map(|a| a.as_str()))
            .ok_or(UrlError::MissingHost)?;

        Ok(format!("{scheme}://{host}"))
    }
}

impl UrlMapper for SelfUrlMapper {
    fn to_canonical_url(&self, request: &Request) -> Result<String, UrlError> {
        let path = request.uri().path_and_query().map_or("/", |pq| pq.as_str());
        canonical_key(&format!("{}{path}", self.origin(request)?))
    }
}
