//! Secret handling helpers.
//!
//! Signing secrets and connection strings with embedded credentials are held
//! in [`SecretString`] so that `{:?}` and tracing fields never print them.
//! Call `expose_secret()` only at the point of use (key construction,
//! connection open).

pub use secrecy::{ExposeSecret, SecretString};

/// Strip userinfo from a URL so it can be logged.
///
/// `redis://:hunter2@cache:6379/0` becomes `redis://[REDACTED]@cache:6379/0`.
/// URLs without credentials are returned unchanged.
#[must_use]
pub fn redact_url_credentials(url: &str) -> String {
    let Some((scheme, rest)) = url.split_once("://") else {
        return url.to_string();
    };

    // Userinfo ends at the last '@' before the first '/'
    let authority_end = rest.find('/').unwrap_or(rest.len());
    let authority = rest.get(..authority_end).unwrap_or(rest);

    match authority.rfind('@') {
        Some(at) => {
            let host_and_path = rest.get(at + 1..).unwrap_or_default();
            format!("{scheme}://[REDACTED]@{host_and_path}")
        }
        None => url.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[test]
    fn test_debug_is_redacted() {
        let secret = SecretString::from("signing-key-material");
        let debug_str = format!("{secret:?}");

        assert!(debug_str.contains("REDACTED"));
        assert!(!debug_str.contains("signing-key-material"));
    }

    #[test]
    fn test_deserialized_secret_stays_redacted() {
        #[allow(dead_code)]
        #[derive(Debug, Deserialize)]
        struct Settings {
            issuer: String,
            jwt_secret: SecretString,
        }

        let json = r#"{"issuer": "spot-api", "jwt_secret": "top-secret-value"}"#;
        let settings: Settings = serde_json::from_str(json).expect("deserialize");

        assert_eq!(settings.jwt_secret.expose_secret(), "top-secret-value");
        let debug = format!("{settings:?}");
        assert!(debug.contains("spot-api"));
        assert!(!debug.contains("top-secret-value"));
    }

    #[test]
    fn test_redact_url_with_password() {
        assert_eq!(
            redact_url_credentials("redis://:hunter2@cache:6379/0"),
            "redis://[REDACTED]@cache:6379/0"
        );
    }

    #[test]
    fn test_redact_url_with_user_and_password() {
        assert_eq!(
            redact_url_credentials("redis://admin:pw@10.0.0.5:6379"),
            "redis://[REDACTED]@10.0.0.5:6379"
        );
    }

    #[test]
    fn test_redact_url_without_credentials_unchanged() {
        assert_eq!(
            redact_url_credentials("redis://localhost:6379"),
            "redis://localhost:6379"
        );
    }

    #[test]
    fn test_redact_url_at_sign_in_path_is_not_userinfo() {
        assert_eq!(
            redact_url_credentials("https://idp.example.com/keys@v2"),
            "https://idp.example.com/keys@v2"
        );
    }

    #[test]
    fn test_redact_non_url_unchanged() {
        assert_eq!(redact_url_credentials("not a url"), "not a url");
    }
}
