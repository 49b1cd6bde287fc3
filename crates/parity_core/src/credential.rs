//! Credential decoding for display and identity.
//!
//! Credentials stay verbatim inside a [`RequestDescriptor`](crate::RequestDescriptor);
//! decoding only happens when rendering a request or naming the account
//! that made it.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

const BASIC_PREFIX: &str = "Basic ";

/// A decoded `Authorization` header value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credential {
    /// `Basic` credentials that decoded to `username:password`
    Basic {
        /// Account name
        username: String,
        /// Secret part
        password: String,
    },
    /// Anything else (bearer tokens, undecodable Basic values)
    Token(String),
}

impl Credential {
    /// Decode a raw header value.
    ///
    /// A `Basic` value that is not valid base64, not UTF-8, or has no `:`
    /// separator falls back to [`Credential::Token`].
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        raw.strip_prefix(BASIC_PREFIX)
            .and_then(decode_basic)
            .unwrap_or_else(|| Self::Token(raw.to_string()))
    }

    /// Account identity used in reports and exclusion rules
    #[must_use]
    pub fn identity(&self) -> &str {
        match self {
            Self::Basic { username, .. } => username,
            Self::Token(raw) => raw,
        }
    }

    /// Render as curl arguments
    #[must_use]
    pub fn curl_args(&self, redacted: bool) -> String {
        match (self, redacted) {
            (Self::Basic { username, .. }, true) => format!(" -u '{}:**********'", username),
            (Self::Basic { username, password }, false) => {
                format!(" -u '{}:{}'", username, password)
            }
            (Self::Token(_), true) => " -H 'Authorization: ************'".to_string(),
            (Self::Token(raw), false) => format!(" -H 'Authorization: {}'", raw),
        }
    }
}

fn decode_basic(encoded: &str) -> Option<Credential> {
    let bytes = STANDARD.decode(encoded.trim()).ok()?;
    let decoded = String::from_utf8(bytes).ok()?;
    let (username, password) = decoded.split_once(':')?;
    Some(Credential::Basic {
        username: username.to_string(),
        password: password.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_basic() {
        // "alice:s3cret"
        let cred = Credential::parse("Basic YWxpY2U6czNjcmV0");
        assert_eq!(
            cred,
            Credential::Basic {
                username: "alice".to_string(),
                password: "s3cret".to_string(),
            }
        );
        assert_eq!(cred.identity(), "alice");
    }

    #[test]
    fn test_parse_password_with_colon() {
        // "bob:a:b"
        let cred = Credential::parse("Basic Ym9iOmE6Yg==");
        assert_eq!(
            cred,
            Credential::Basic {
                username: "bob".to_string(),
                password: "a:b".to_string(),
            }
        );
    }

    #[test]
    fn test_parse_bearer_is_token() {
        let cred = Credential::parse("Bearer eyJhbGciOi");
        assert_eq!(cred.identity(), "Bearer eyJhbGciOi");
    }

    #[test]
    fn test_parse_invalid_basic_falls_back() {
        let cred = Credential::parse("Basic !!!not-base64");
        assert_eq!(cred, Credential::Token("Basic !!!not-base64".to_string()));
    }

    #[test]
    fn test_curl_args_redaction() {
        let cred = Credential::parse("Basic YWxpY2U6czNjcmV0");
        assert_eq!(cred.curl_args(false), " -u 'alice:s3cret'");
        assert_eq!(cred.curl_args(true), " -u 'alice:**********'");

        let token = Credential::parse("Bearer abc");
        assert_eq!(token.curl_args(false), " -H 'Authorization: Bearer abc'");
        assert_eq!(token.curl_args(true), " -H 'Authorization: ************'");
    }
}
