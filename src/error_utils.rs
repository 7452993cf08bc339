use anyhow::{Context, Result};
use serde::{de::DeserializeOwned, Serialize};
use std::time::Duration;

/// JSON serialization/parsing error handling utilities
///
/// Serialize data to pretty JSON with contextual error handling
pub fn serialize_to_json_with_context<T: Serialize>(data: &T, data_desc: &str) -> Result<String> {
    serde_json::to_string_pretty(data)
        .with_context(|| format!("Failed to serialize {data_desc} to JSON"))
}

/// Parse JSON from string with contextual error handling
pub fn parse_json_with_context<T: DeserializeOwned>(json_str: &str, data_desc: &str) -> Result<T> {
    serde_json::from_str(json_str).with_context(|| format!("Failed to parse {data_desc} from JSON"))
}

/// Create HTTP client with contextual error handling
pub fn create_http_client_with_context(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .context("Failed to create HTTP client")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::collections::BTreeMap;

    #[derive(Serialize, Deserialize, PartialEq, Debug)]
    struct TestData {
        name: String,
        value: i32,
    }

    #[test]
    fn test_json_serialization_with_context() {
        let data = TestData {
            name: "test".to_string(),
            value: 42,
        };

        let json_str = serialize_to_json_with_context(&data, "test data").unwrap();
        assert!(json_str.contains("\"name\": \"test\""));

        let parsed_data: TestData = parse_json_with_context(&json_str, "test data").unwrap();
        assert_eq!(parsed_data, data);
    }

    #[test]
    fn test_parse_error_carries_description() {
        let result: Result<BTreeMap<String, u64>> = parse_json_with_context("{oops", "watermarks");
        let message = format!("{:#}", result.unwrap_err());
        assert!(message.contains("Failed to parse watermarks from JSON"));
    }

    #[test]
    fn test_create_http_client() {
        let client = create_http_client_with_context(Duration::from_secs(5)).unwrap();
        assert!(client.get("https://example.com").build().is_ok());
    }
}
