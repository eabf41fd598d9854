use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

pub const DEFAULT_TOKEN_TYPE: &str = "Bearer";

/// OAuth state persisted between runs.
///
/// An absent `TokenSet` (`Option::None` at the owner) is the empty state; a present one
/// always carries both an access token and its absolute expiry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenSet {
    pub access_token: String,
    pub refresh_token: Option<String>,
    #[serde(deserialize_with = "deserialize_expires_at")]
    pub expires_at: DateTime<Utc>,
    #[serde(default = "default_token_type")]
    pub token_type: String,
}

fn default_token_type() -> String {
    DEFAULT_TOKEN_TYPE.to_owned()
}

/// RFC 3339 timestamps, or ISO-8601 without an offset read as UTC.
fn deserialize_expires_at<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    if let Ok(at) = DateTime::parse_from_rfc3339(&raw) {
        return Ok(at.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(&raw, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .map_err(|err| serde::de::Error::custom(format!("invalid expires_at {raw:?}: {err}")))
}

impl TokenSet {
    pub fn new(
        access_token: String,
        refresh_token: Option<String>,
        expires_at: DateTime<Utc>,
        token_type: String,
    ) -> Self {
        Self {
            access_token,
            refresh_token,
            expires_at,
            token_type,
        }
    }

    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }

    /// True once `now` has entered the window that ends at `expires_at`.
    pub fn will_expire_within(&self, window: Duration) -> bool {
        Utc::now() + window >= self.expires_at
    }

    pub fn can_refresh(&self) -> bool {
        self.refresh_token.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(expires_in: Duration) -> TokenSet {
        TokenSet::new(
            "token".into(),
            Some("refresh".into()),
            Utc::now() + expires_in,
            DEFAULT_TOKEN_TYPE.into(),
        )
    }

    #[test]
    fn expiry_window_detection() {
        let set = tokens(Duration::minutes(1));
        assert!(!set.is_expired());
        assert!(set.will_expire_within(Duration::minutes(2)));
        assert!(!tokens(Duration::hours(1)).will_expire_within(Duration::minutes(5)));
    }

    #[test]
    fn persisted_shape_uses_plain_keys() {
        let set = tokens(Duration::hours(1));
        let value = serde_json::to_value(&set).unwrap();
        let object = value.as_object().unwrap();
        let mut keys: Vec<_> = object.keys().map(String::as_str).collect();
        keys.sort_unstable();
        assert_eq!(
            keys,
            vec!["access_token", "expires_at", "refresh_token", "token_type"]
        );
    }

    #[test]
    fn missing_token_type_defaults_to_bearer() {
        let set: TokenSet = serde_json::from_str(
            r#"{"access_token":"a","refresh_token":null,"expires_at":"2026-01-01T00:00:00Z"}"#,
        )
        .unwrap();
        assert_eq!(set.token_type, "Bearer");
        assert!(!set.can_refresh());
    }

    #[test]
    fn offset_less_expiry_is_read_as_utc() {
        let set: TokenSet = serde_json::from_str(
            r#"{"access_token":"a","refresh_token":"r","expires_at":"2026-01-01T10:00:00.123456","token_type":"Bearer"}"#,
        )
        .unwrap();
        let expected = DateTime::parse_from_rfc3339("2026-01-01T10:00:00.123456Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(set.expires_at, expected);

        let err = serde_json::from_str::<TokenSet>(
            r#"{"access_token":"a","expires_at":"next tuesday"}"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("expires_at"));
    }
}
