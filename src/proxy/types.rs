//! Type definitions for the HTTP surface

use nutype::nutype;
use serde::{Deserialize, Serialize};

/// Bearer token clients must present when authentication is enabled
#[nutype(
    sanitize(trim),
    validate(not_empty),
    derive(Clone, Debug, Hash, PartialEq, Eq, Deserialize, Serialize, TryFrom, AsRef)
)]
pub struct ApiKey(String);

/// Path that bypasses authentication
#[nutype(
    validate(predicate = |s: &str| s.starts_with('/')),
    derive(Clone, Debug, Display, Hash, PartialEq, Eq, Deserialize, Serialize, TryFrom, AsRef)
)]
pub struct BypassPath(String);

/// Route prefix for the OpenAI-compatible API, e.g. `/v1`
#[nutype(
    sanitize(with = |s: String| s.trim().trim_end_matches('/').to_string()),
    validate(predicate = |s: &str| s.is_empty() || (s.starts_with('/') && !s.contains(char::is_whitespace))),
    derive(Clone, Debug, Display, PartialEq, Eq, Deserialize, Serialize, TryFrom, AsRef)
)]
pub struct RoutePrefix(String);

impl RoutePrefix {
    pub fn join(&self, path: &str) -> String {
        format!("{}{path}", self.as_ref())
    }
}

/// Upper bound for inbound request bodies in bytes
#[nutype(
    validate(greater = 0),
    derive(Clone, Copy, Debug, Display, PartialEq, Eq, Deserialize, Serialize, TryFrom, AsRef)
)]
pub struct RequestSizeLimit(usize);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_keys_are_trimmed_and_non_empty() {
        assert_eq!(
            ApiKey::try_new("  sk-local  ".to_string()).unwrap().as_ref(),
            "sk-local"
        );
        assert!(ApiKey::try_new("   ".to_string()).is_err());
    }

    #[test]
    fn route_prefix_drops_trailing_slash() {
        let prefix = RoutePrefix::try_new("/v1/".to_string()).unwrap();
        assert_eq!(prefix.join("/models"), "/v1/models");
    }

    #[test]
    fn empty_route_prefix_mounts_at_root() {
        let prefix = RoutePrefix::try_new(String::new()).unwrap();
        assert_eq!(prefix.join("/models"), "/models");
    }

    #[test]
    fn route_prefix_must_be_absolute() {
        assert!(RoutePrefix::try_new("v1".to_string()).is_err());
        assert!(BypassPath::try_new("health".to_string()).is_err());
    }
}
