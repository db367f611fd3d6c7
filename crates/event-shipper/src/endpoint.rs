use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

const STAGING_BASE_URL: &str = "https://telemetry-staging.elastic.co";
const PRODUCTION_BASE_URL: &str = "https://telemetry.elastic.co";

pub const NDJSON_CONTENT_TYPE: &str = "application/x-ndjson";

/// Target environment for delivered events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SendTo {
	#[default]
	Staging,
	Production,
}

impl fmt::Display for SendTo {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Staging => f.write_str("staging"),
			Self::Production => f.write_str("production"),
		}
	}
}

impl FromStr for SendTo {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.trim().to_ascii_lowercase().as_str() {
			"staging" => Ok(Self::Staging),
			"production" => Ok(Self::Production),
			other => Err(format!("unknown target environment: {other}")),
		}
	}
}

/// Inputs for resolving the delivery URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlOptions {
	pub send_to: SendTo,
	pub channel_name: String,
}

/// Resolves the destination endpoint.
pub type BuildUrl = Arc<dyn Fn(&UrlOptions) -> String + Send + Sync>;

/// Resolves outbound headers from `(cluster_uuid, version, license_id)`.
pub type BuildHeaders = Arc<dyn Fn(&str, &str, Option<&str>) -> BTreeMap<String, String> + Send + Sync>;

/// Default URL resolver: `{base}/v3/send/{channel}`.
#[must_use]
pub fn build_url(options: &UrlOptions) -> String {
	let base_url = match options.send_to {
		SendTo::Staging => STAGING_BASE_URL,
		SendTo::Production => PRODUCTION_BASE_URL,
	};
	format!("{base_url}/v3/send/{}", options.channel_name)
}

/// Default header resolver. The license header is only present when a
/// license id is known.
#[must_use]
pub fn build_headers(cluster_uuid: &str, version: &str, license_id: Option<&str>) -> BTreeMap<String, String> {
	let mut headers = BTreeMap::new();
	headers.insert("content-type".to_string(), NDJSON_CONTENT_TYPE.to_string());
	headers.insert("x-elastic-cluster-id".to_string(), cluster_uuid.to_string());
	headers.insert("x-elastic-stack-version".to_string(), version.to_string());
	if let Some(license_id) = license_id {
		headers.insert("x-elastic-license-id".to_string(), license_id.to_string());
	}
	headers
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_build_url_per_environment() {
		let mut options = UrlOptions {
			send_to: SendTo::Staging,
			channel_name: "test-channel".to_string(),
		};
		assert_eq!(build_url(&options), "https://telemetry-staging.elastic.co/v3/send/test-channel");

		options.send_to = SendTo::Production;
		assert_eq!(build_url(&options), "https://telemetry.elastic.co/v3/send/test-channel");
	}

	#[test]
	fn test_build_headers_without_license() {
		let headers = build_headers("UNKNOWN", "1.2.3", None);

		assert_eq!(headers.len(), 3);
		assert_eq!(headers["content-type"], "application/x-ndjson");
		assert_eq!(headers["x-elastic-cluster-id"], "UNKNOWN");
		assert_eq!(headers["x-elastic-stack-version"], "1.2.3");
	}

	#[test]
	fn test_build_headers_with_license() {
		let headers = build_headers("cluster", "1.2.3", Some("license"));

		assert_eq!(headers.get("x-elastic-license-id").map(String::as_str), Some("license"));
	}

	#[test]
	fn test_send_to_parse() {
		assert_eq!("staging".parse::<SendTo>(), Ok(SendTo::Staging));
		assert_eq!("Production".parse::<SendTo>(), Ok(SendTo::Production));
		assert!("qa".parse::<SendTo>().is_err());
		assert_eq!(SendTo::Production.to_string(), "production");
	}
}
