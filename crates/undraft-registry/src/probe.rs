//! Registry probes.

use async_trait::async_trait;
use reqwest::Url;
use serde_json::Value;

use undraft_core::PackageId;

use crate::config::RegistryConfig;
use crate::error::{RegistryError, Result};

/// What the registry said about a package.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// The registry knows the package; clients can fetch it themselves.
    Exists,
    /// The registry does not know the package; it is drafted.
    NotFound,
}

/// One existence check against the external registry.
#[async_trait]
pub trait RegistryProbe: Send + Sync {
    async fn probe(&self, package_id: &PackageId) -> Result<ProbeOutcome>;
}

/// Classify a registry response body.
///
/// Only a JSON object whose `statuscode` is 404 (string or number) means
/// "not found"; everything else is treated as "exists".
pub fn classify_response(body: &str) -> ProbeOutcome {
    let Ok(value) = serde_json::from_str::<Value>(body) else {
        return ProbeOutcome::Exists;
    };
    let not_found = match value.get("statuscode") {
        Some(Value::String(code)) => code.trim() == "404",
        Some(Value::Number(code)) => code.as_u64() == Some(404),
        _ => false,
    };
    if not_found {
        ProbeOutcome::NotFound
    } else {
        ProbeOutcome::Exists
    }
}

/// Registry probe over HTTP.
///
/// Issues `POST {base_url}/api/mod/{id}` with an empty body and inspects
/// the JSON answer.
pub struct HttpRegistry {
    client: reqwest::Client,
    base_url: Url,
}

impl HttpRegistry {
    pub fn new(config: &RegistryConfig) -> Result<Self> {
        let base_url = Url::parse(config.base_url.trim_end_matches('/'))
            .map_err(|e| RegistryError::InvalidUrl(format!("{}: {}", config.base_url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(RegistryError::InvalidUrl(config.base_url.clone()));
        }
        let client = reqwest::Client::builder()
            .timeout(config.probe_timeout)
            .build()?;
        Ok(Self { client, base_url })
    }

    /// The URL probed for `package_id`.
    pub fn probe_url(&self, package_id: &PackageId) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| RegistryError::InvalidUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(["api", "mod", package_id.as_str()]);
        Ok(url)
    }
}

#[async_trait]
impl RegistryProbe for HttpRegistry {
    async fn probe(&self, package_id: &PackageId) -> Result<ProbeOutcome> {
        let url = self.probe_url(package_id)?;
        let response = self.client.post(url).send().await?;
        let status = response.status();
        let body = response.text().await?;
        let outcome = classify_response(&body);
        tracing::debug!("probe {} -> {} {:?}", package_id, status, outcome);
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_not_found() {
        assert_eq!(classify_response(r#"{"statuscode":"404"}"#), ProbeOutcome::NotFound);
        assert_eq!(classify_response(r#"{"statuscode":404}"#), ProbeOutcome::NotFound);
        assert_eq!(
            classify_response(r#"{ "statuscode" : "404", "extra": 1 }"#),
            ProbeOutcome::NotFound
        );
    }

    #[test]
    fn test_classify_everything_else_exists() {
        assert_eq!(classify_response(r#"{"statuscode":"200","mod":{}}"#), ProbeOutcome::Exists);
        assert_eq!(classify_response(r#"{"statuscode":"500"}"#), ProbeOutcome::Exists);
        assert_eq!(classify_response("<html>busy</html>"), ProbeOutcome::Exists);
        assert_eq!(classify_response(""), ProbeOutcome::Exists);
        assert_eq!(classify_response("[]"), ProbeOutcome::Exists);
    }

    #[test]
    fn test_probe_url() {
        let config = RegistryConfig {
            base_url: "https://registry.example/".into(),
            ..RegistryConfig::default()
        };
        let registry = HttpRegistry::new(&config).unwrap();
        let url = registry.probe_url(&PackageId::new("modX").unwrap()).unwrap();
        assert_eq!(url.as_str(), "https://registry.example/api/mod/modX");
    }

    #[test]
    fn test_invalid_base_url() {
        let config = RegistryConfig {
            base_url: "not a url".into(),
            ..RegistryConfig::default()
        };
        assert!(matches!(
            HttpRegistry::new(&config),
            Err(RegistryError::InvalidUrl(_))
        ));
    }
}
