//! Verifier configuration.
//!
//! All options have defaults matching a Google IAP deployment and can be
//! overridden from `AUTH_IAP_`-prefixed environment variables.

use std::collections::HashSet;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{AuthError, Result};

/// Prefix of the environment variables read by [`VerifierConfig::from_env`].
pub const ENV_PREFIX: &str = "AUTH_IAP_";

/// Static configuration for verifying IAP assertions and mapping them to users.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "SCREAMING_SNAKE_CASE")]
pub struct VerifierConfig {
    /// Google Cloud project id.
    pub project_id: String,
    /// Google Cloud project number.
    pub project_numeric_id: String,
    /// Audience template. `{}` slots receive the project number then the
    /// project id; `{0}` and `{1}` select them by position.
    pub audience_format: String,
    /// URL serving a JSON object of key id to PEM public key.
    pub public_key_endpoint: String,
    /// Request header carrying the assertion.
    pub header_key: String,
    /// Claim holding the user's email.
    ///
    /// Reserved; the user mapping is driven by the `*_FIELD_FROM_CLAIM` options.
    pub email_claim_key: String,
    /// Claim holding the stable subject id. Reserved.
    pub subject_claim_key: String,
    /// Key fetch timeout in seconds.
    #[serde(rename = "TIMEOUT")]
    pub timeout_seconds: u64,
    /// Claim used as the local username.
    pub username_field_from_claim: String,
    /// Claim used as the local email.
    pub email_field_from_claim: String,
    /// Usernames promoted to staff on login.
    pub users_is_staff: HashSet<String>,
    /// Usernames promoted to superuser on login.
    pub users_is_superuser: HashSet<String>,
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self {
            project_id: String::new(),
            project_numeric_id: String::new(),
            audience_format: "/projects/{}/apps/{}".to_string(),
            public_key_endpoint: "https://www.gstatic.com/iap/verify/public_key".to_string(),
            header_key: "x-goog-iap-jwt-assertion".to_string(),
            email_claim_key: "email".to_string(),
            subject_claim_key: "sub".to_string(),
            timeout_seconds: 5,
            username_field_from_claim: "email".to_string(),
            email_field_from_claim: "email".to_string(),
            users_is_staff: HashSet::new(),
            users_is_superuser: HashSet::new(),
        }
    }
}

impl VerifierConfig {
    /// Load the configuration from `AUTH_IAP_*` environment variables.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Config` if a numeric option cannot be parsed.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(format!("{ENV_PREFIX}{name}")).ok())
    }

    /// Load the configuration from an arbitrary variable source.
    ///
    /// `lookup` receives option names without the prefix (e.g. `PROJECT_ID`).
    /// List options are comma-separated.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Config` if a numeric option cannot be parsed.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        let strings = [
            ("PROJECT_ID", &mut config.project_id),
            ("PROJECT_NUMERIC_ID", &mut config.project_numeric_id),
            ("AUDIENCE_FORMAT", &mut config.audience_format),
            ("PUBLIC_KEY_ENDPOINT", &mut config.public_key_endpoint),
            ("HEADER_KEY", &mut config.header_key),
            ("EMAIL_CLAIM_KEY", &mut config.email_claim_key),
            ("SUBJECT_CLAIM_KEY", &mut config.subject_claim_key),
            ("USERNAME_FIELD_FROM_CLAIM", &mut config.username_field_from_claim),
            ("EMAIL_FIELD_FROM_CLAIM", &mut config.email_field_from_claim),
        ];
        for (name, field) in strings {
            if let Some(value) = lookup(name) {
                *field = value;
            }
        }

        if let Some(value) = lookup("TIMEOUT") {
            config.timeout_seconds = value
                .trim()
                .parse()
                .map_err(|e| AuthError::Config(format!("{ENV_PREFIX}TIMEOUT={value:?}: {e}")))?;
        }
        if let Some(value) = lookup("USERS_IS_STAFF") {
            config.users_is_staff = parse_list(&value);
        }
        if let Some(value) = lookup("USERS_IS_SUPERUSER") {
            config.users_is_superuser = parse_list(&value);
        }

        Ok(config)
    }

    /// The expected `aud` claim.
    ///
    /// Slot `{}` takes the next value in order; `{0}` is the project number
    /// and `{1}` the project id. Unrecognized slots are kept as written.
    #[must_use]
    pub fn audience(&self) -> String {
        let args = [self.project_numeric_id.as_str(), self.project_id.as_str()];
        let mut next = 0;
        let mut audience = String::with_capacity(self.audience_format.len() + 32);
        let mut rest = self.audience_format.as_str();

        while let Some(open) = rest.find('{') {
            audience.push_str(&rest[..open]);
            let Some(len) = rest[open..].find('}') else {
                rest = &rest[open..];
                break;
            };
            let slot = &rest[open + 1..open + len];
            let index = if slot.is_empty() {
                next += 1;
                Some(next - 1)
            } else {
                slot.parse::<usize>().ok()
            };

            match index.and_then(|i| args.get(i)) {
                Some(arg) => audience.push_str(arg),
                None => audience.push_str(&rest[open..=open + len]),
            }
            rest = &rest[open + len + 1..];
        }

        audience.push_str(rest);
        audience
    }

    /// The header name in lowercase HTTP form.
    ///
    /// CGI-style names such as `HTTP_X_GOOG_IAP_JWT_ASSERTION` are accepted
    /// and normalized.
    #[must_use]
    pub fn header_name(&self) -> String {
        let name = self.header_key.trim();
        let name = name.strip_prefix("HTTP_").unwrap_or(name);
        name.replace('_', "-").to_ascii_lowercase()
    }

    /// The key fetch timeout.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

fn parse_list(value: &str) -> HashSet<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup_from(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn default_config() {
        let config = VerifierConfig::default();
        assert_eq!(
            config.public_key_endpoint,
            "https://www.gstatic.com/iap/verify/public_key"
        );
        assert_eq!(config.header_name(), "x-goog-iap-jwt-assertion");
        assert_eq!(config.username_field_from_claim, "email");
        assert_eq!(config.email_field_from_claim, "email");
        assert_eq!(config.timeout(), Duration::from_secs(5));
        assert!(config.users_is_staff.is_empty());
    }

    #[test]
    fn audience_from_template() {
        let config = VerifierConfig {
            project_id: "my-project".into(),
            project_numeric_id: "1234567890".into(),
            ..VerifierConfig::default()
        };
        assert_eq!(config.audience(), "/projects/1234567890/apps/my-project");
    }

    #[test]
    fn audience_custom_template() {
        let config = VerifierConfig {
            project_id: "p".into(),
            project_numeric_id: "42".into(),
            audience_format: "/projects/{}/global/backendServices/{}".into(),
            ..VerifierConfig::default()
        };
        assert_eq!(config.audience(), "/projects/42/global/backendServices/p");
    }

    #[test]
    fn audience_does_not_expand_braces_in_values() {
        let config = VerifierConfig {
            project_id: "b".into(),
            project_numeric_id: "{}".into(),
            ..VerifierConfig::default()
        };
        assert_eq!(config.audience(), "/projects/{}/apps/b");
    }

    #[test]
    fn audience_indexed_slots() {
        let config = VerifierConfig {
            project_id: "my-project".into(),
            project_numeric_id: "1234567890".into(),
            audience_format: "/projects/{0}/apps/{1}".into(),
            ..VerifierConfig::default()
        };
        assert_eq!(config.audience(), "/projects/1234567890/apps/my-project");

        let reversed = VerifierConfig {
            audience_format: "{1}:{0}".into(),
            ..config
        };
        assert_eq!(reversed.audience(), "my-project:1234567890");
    }

    #[test]
    fn audience_keeps_unknown_slots() {
        let config = VerifierConfig {
            project_id: "p".into(),
            project_numeric_id: "42".into(),
            audience_format: "/projects/{}/x/{name}/{7}/{".into(),
            ..VerifierConfig::default()
        };
        assert_eq!(config.audience(), "/projects/42/x/{name}/{7}/{");
    }

    #[test]
    fn header_name_normalizes_cgi_form() {
        let config = VerifierConfig {
            header_key: "HTTP_X_GOOG_IAP_JWT_ASSERTION".into(),
            ..VerifierConfig::default()
        };
        assert_eq!(config.header_name(), "x-goog-iap-jwt-assertion");
    }

    #[test]
    fn from_lookup_overrides() {
        let config = VerifierConfig::from_lookup(lookup_from(&[
            ("PROJECT_ID", "proj"),
            ("PROJECT_NUMERIC_ID", "99"),
            ("TIMEOUT", "2"),
            ("USERNAME_FIELD_FROM_CLAIM", "sub"),
            ("USERS_IS_STAFF", "a@x.com, b@x.com,,"),
            ("USERS_IS_SUPERUSER", "root@x.com"),
        ]))
        .unwrap();

        assert_eq!(config.audience(), "/projects/99/apps/proj");
        assert_eq!(config.timeout(), Duration::from_secs(2));
        assert_eq!(config.username_field_from_claim, "sub");
        assert_eq!(config.email_field_from_claim, "email");
        assert_eq!(config.users_is_staff.len(), 2);
        assert!(config.users_is_staff.contains("b@x.com"));
        assert!(config.users_is_superuser.contains("root@x.com"));
    }

    #[test]
    fn from_lookup_rejects_bad_timeout() {
        let result = VerifierConfig::from_lookup(lookup_from(&[("TIMEOUT", "soon")]));
        assert!(matches!(result, Err(AuthError::Config(_))));
    }

    #[test]
    fn deserialize_with_defaults() {
        let config: VerifierConfig = serde_json::from_value(serde_json::json!({
            "PROJECT_ID": "proj",
            "TIMEOUT": 10,
            "USERS_IS_SUPERUSER": ["root@x.com"]
        }))
        .unwrap();

        assert_eq!(config.project_id, "proj");
        assert_eq!(config.timeout_seconds, 10);
        assert!(config.users_is_superuser.contains("root@x.com"));
        assert_eq!(config.audience_format, "/projects/{}/apps/{}");
    }
}
