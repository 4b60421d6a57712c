//! Domain discovery API bodies

use serde::{Deserialize, Serialize};

/// `GET /domains` response body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainsResponse {
    pub success: bool,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub data: Option<DomainsData>,
}

/// Hosts assigned to the caller's namespace
///
/// The first domain serves terminals; the rest serve previews.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainsData {
    #[serde(default)]
    pub domains: Vec<String>,
    #[serde(default)]
    pub token: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_domains_response() {
        let resp: DomainsResponse = serde_json::from_value(json!({
            "success": true,
            "message": "ok",
            "data": {
                "domains": ["tty.example.net:31775", "p1.example.net", "p2.example.net"],
                "token": "tok-123"
            }
        }))
        .unwrap();

        let data = resp.data.unwrap();
        assert_eq!(data.domains.len(), 3);
        assert_eq!(data.domains[0], "tty.example.net:31775");
        assert_eq!(data.token, "tok-123");
    }

    #[test]
    fn test_parse_failure_without_data() {
        let resp: DomainsResponse =
            serde_json::from_value(json!({"success": false, "message": "no quota"})).unwrap();
        assert!(!resp.success);
        assert!(resp.data.is_none());
    }
}
