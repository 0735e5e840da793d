//! SASL payloads for `AUTH`.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use crate::types::AuthMechanism;

/// Generates the PLAIN initial response (RFC 4616).
///
/// The authorization identity is left empty.
#[must_use]
pub fn plain_response(username: &str, password: &str) -> String {
    let auth_string = format!("\0{username}\0{password}");
    STANDARD.encode(auth_string.as_bytes())
}

/// Encodes one LOGIN step (username or password).
#[must_use]
pub fn login_response(value: &str) -> String {
    STANDARD.encode(value.as_bytes())
}

/// Generates the `XOAUTH2` initial response.
///
/// Format: `user=<user>\x01auth=Bearer <token>\x01\x01`
#[must_use]
pub fn xoauth2_response(user: &str, token: &str) -> String {
    let auth_string = format!("user={user}\x01auth=Bearer {token}\x01\x01");
    STANDARD.encode(auth_string.as_bytes())
}

/// Picks the mechanism for username/password credentials.
///
/// The first of PLAIN or LOGIN the server advertises wins; PLAIN is the
/// fallback when neither is advertised.
#[must_use]
pub fn select_password_mechanism(advertised: &[AuthMechanism]) -> AuthMechanism {
    advertised
        .iter()
        .copied()
        .find(|mechanism| matches!(mechanism, AuthMechanism::Plain | AuthMechanism::Login))
        .unwrap_or(AuthMechanism::Plain)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::redundant_clone, clippy::manual_string_new, clippy::needless_collect, clippy::unreadable_literal, clippy::used_underscore_items, clippy::similar_names)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_response() {
        assert_eq!(plain_response("user", "pass"), "AHVzZXIAcGFzcw==");
    }

    #[test]
    fn test_login_response() {
        assert_eq!(login_response("user@example.com"), "dXNlckBleGFtcGxlLmNvbQ==");
    }

    #[test]
    fn test_xoauth2_response() {
        let response = xoauth2_response("user@example.com", "token123");
        let decoded = String::from_utf8(STANDARD.decode(&response).unwrap()).unwrap();
        assert_eq!(decoded, "user=user@example.com\x01auth=Bearer token123\x01\x01");
    }

    #[test]
    fn test_select_password_mechanism() {
        assert_eq!(
            select_password_mechanism(&[AuthMechanism::XOAuth2, AuthMechanism::Login, AuthMechanism::Plain]),
            AuthMechanism::Login
        );
        assert_eq!(
            select_password_mechanism(&[AuthMechanism::Plain, AuthMechanism::Login]),
            AuthMechanism::Plain
        );
        assert_eq!(select_password_mechanism(&[]), AuthMechanism::Plain);
        assert_eq!(
            select_password_mechanism(&[AuthMechanism::CramMd5]),
            AuthMechanism::Plain
        );
    }
}
