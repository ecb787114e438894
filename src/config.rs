//! Connection settings for the remote services and polling behaviour.

use std::fmt;
use std::time::Duration;

use crate::error::ResourceError;
use crate::types::Properties;

/// Deployments served from `api.<deployment>.sumologic.com`.
const REGIONAL_DEPLOYMENTS: &[&str] = &["ca", "au", "de", "eu", "jp", "us2", "fed", "in"];

/// Default region when `AWS_REGION` is not set.
pub const DEFAULT_AWS_REGION: &str = "us-east-1";

/// Credentials and deployment for a Sumo Logic session.
#[derive(Clone, PartialEq, Eq)]
pub struct SumoConfig {
    pub access_id: String,
    pub access_key: String,
    pub deployment: String,
}

impl SumoConfig {
    pub fn new(
        access_id: impl Into<String>,
        access_key: impl Into<String>,
        deployment: impl Into<String>,
    ) -> Self {
        Self {
            access_id: access_id.into(),
            access_key: access_key.into(),
            deployment: deployment.into(),
        }
    }

    /// Read `SumoAccessID`, `SumoAccessKey` and `SumoDeployment` from resource properties.
    pub fn from_properties(props: &Properties<'_>) -> Result<Self, ResourceError> {
        let read = |key: &str| {
            props
                .str(key)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
                .ok_or_else(|| ResourceError::Configuration(format!("{} is not set", key)))
        };
        Ok(Self {
            access_id: read("SumoAccessID")?,
            access_key: read("SumoAccessKey")?,
            deployment: read("SumoDeployment")?,
        })
    }

    /// Base URL of the REST API for this deployment.
    pub fn api_endpoint(&self) -> String {
        match self.deployment.as_str() {
            "us1" => "https://api.sumologic.com/api".to_string(),
            d if REGIONAL_DEPLOYMENTS.contains(&d) => {
                format!("https://api.{}.sumologic.com/api", d)
            },
            d => format!("https://{}-api.sumologic.net/api", d),
        }
    }
}

impl fmt::Debug for SumoConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SumoConfig")
            .field("access_id", &self.access_id)
            .field("access_key", &"<redacted>")
            .field("deployment", &self.deployment)
            .finish()
    }
}

/// AWS settings for the CloudTrail session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AwsConfig {
    pub region: String,
}

impl AwsConfig {
    pub fn new(region: impl Into<String>) -> Self {
        Self {
            region: region.into(),
        }
    }

    /// Region from `AWS_REGION`, falling back to `us-east-1`.
    pub fn from_env() -> Self {
        let region = std::env::var("AWS_REGION")
            .ok()
            .filter(|r| !r.is_empty())
            .unwrap_or_else(|| DEFAULT_AWS_REGION.to_string());
        Self { region }
    }
}

impl Default for AwsConfig {
    fn default() -> Self {
        Self::new(DEFAULT_AWS_REGION)
    }
}

/// Options for waiting on server-side jobs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollOptions {
    /// Delay between two status checks.
    /// Default: 5 seconds.
    pub interval: Duration,
    /// Maximum number of status checks before giving up.
    /// Default: 120 (ten minutes at the default interval).
    pub max_attempts: u32,
}

impl Default for PollOptions {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            max_attempts: 120,
        }
    }
}

impl PollOptions {
    /// Create new poll options with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the delay between status checks.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Set the maximum number of status checks. Zero is raised to one.
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_api_endpoint() {
        assert_eq!(
            SumoConfig::new("id", "key", "us1").api_endpoint(),
            "https://api.sumologic.com/api"
        );
        assert_eq!(
            SumoConfig::new("id", "key", "eu").api_endpoint(),
            "https://api.eu.sumologic.com/api"
        );
        assert_eq!(
            SumoConfig::new("id", "key", "fed").api_endpoint(),
            "https://api.fed.sumologic.com/api"
        );
        assert_eq!(
            SumoConfig::new("id", "key", "nite").api_endpoint(),
            "https://nite-api.sumologic.net/api"
        );
    }

    #[test]
    fn test_from_properties() {
        let raw = json!({
            "SumoAccessID": "suABCDEF",
            "SumoAccessKey": "secret",
            "SumoDeployment": "us2"
        });
        let props = Properties::new(raw.as_object().unwrap());
        let config = SumoConfig::from_properties(&props).unwrap();
        assert_eq!(config.access_id, "suABCDEF");
        assert_eq!(config.api_endpoint(), "https://api.us2.sumologic.com/api");
    }

    #[test]
    fn test_from_properties_missing_key() {
        let raw = json!({"SumoAccessID": "suABCDEF", "SumoDeployment": "us1"});
        let props = Properties::new(raw.as_object().unwrap());
        let err = SumoConfig::from_properties(&props).unwrap_err();
        assert_eq!(err.to_string(), "Configuration error: SumoAccessKey is not set");
    }

    #[test]
    fn test_debug_redacts_key() {
        let config = SumoConfig::new("suABCDEF", "very-secret", "us1");
        let debug = format!("{:?}", config);
        assert!(!debug.contains("very-secret"));
        assert!(debug.contains("suABCDEF"));
    }

    #[test]
    fn test_poll_options() {
        let options = PollOptions::new()
            .with_interval(Duration::from_millis(10))
            .with_max_attempts(0);
        assert_eq!(options.interval, Duration::from_millis(10));
        assert_eq!(options.max_attempts, 1);
        assert_eq!(PollOptions::default().max_attempts, 120);
    }
}
