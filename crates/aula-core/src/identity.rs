use std::sync::OnceLock;

use regex::Regex;
use serde::Deserialize;
use serde::Serialize;

/// Domain appended to a bare local part entered in the settings form.
pub const DEFAULT_EMAIL_DOMAIN: &str = "@correo.ugr.es";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionMode {
    Standalone,
    Embedded,
}

impl SessionMode {
    pub fn label(self) -> &'static str {
        match self {
            Self::Standalone => "standalone",
            Self::Embedded => "embedded",
        }
    }
}

/// Canonical identity once resolution has settled. Embedded identities are
/// asserted by the host platform and stay immutable for the session lifetime;
/// standalone identities are user-edited and validated only by format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub mode: SessionMode,
    pub email: String,
    pub display_name: Option<String>,
    pub role: Option<String>,
}

/// Embedded-mode token context derived from the launch query or the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenContext {
    pub token: String,
    pub subject: Option<String>,
    pub context_label: Option<String>,
    pub validated: bool,
}

impl TokenContext {
    pub fn unvalidated(token: String, subject: Option<String>) -> Self {
        Self {
            token,
            subject,
            context_label: None,
            validated: false,
        }
    }
}

/// User record returned by a successful token validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatedUser {
    pub id: String,
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub role: Option<String>,
}

/// Query parameters recognized on an embedded launch. `session_token` plus
/// `lti=true` select embedded mode; `subject` seeds the selection before the
/// validation round-trip completes.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LaunchParams {
    pub session_token: Option<String>,
    pub lti: bool,
    pub subject: Option<String>,
}

impl LaunchParams {
    pub fn from_query(query: &str) -> Self {
        let mut params = Self::default();
        for pair in query.trim_start_matches('?').split('&') {
            let (key, value) = match pair.split_once('=') {
                Some((key, value)) => (key, value),
                None => (pair, ""),
            };
            if value.is_empty() {
                continue;
            }
            match key {
                "session_token" => params.session_token = Some(value.to_string()),
                "lti" => params.lti = value.eq_ignore_ascii_case("true"),
                "subject" => params.subject = Some(value.to_string()),
                _ => {}
            }
        }
        params
    }

    pub fn is_embedded_launch(&self) -> bool {
        self.lti && self.session_token.is_some()
    }
}

fn email_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern"))
}

pub fn is_valid_email(email: &str) -> bool {
    email_pattern().is_match(email)
}

/// Completes a bare local part with the institutional domain.
pub fn complete_email(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.contains('@') {
        return trimmed.to_string();
    }
    format!("{trimmed}{DEFAULT_EMAIL_DOMAIN}")
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::complete_email;
    use super::is_valid_email;
    use super::LaunchParams;

    #[test]
    fn accepts_plain_addresses_and_rejects_malformed_ones() {
        assert!(is_valid_email("ana@correo.ugr.es"));
        assert!(is_valid_email("a.b@x.y"));
        assert!(!is_valid_email(""));
        assert!(!is_valid_email("ana"));
        assert!(!is_valid_email("ana@correo"));
        assert!(!is_valid_email("ana maria@correo.ugr.es"));
        assert!(!is_valid_email("ana@@correo.ugr.es"));
    }

    #[test]
    fn completes_bare_local_part_with_default_domain() {
        assert_eq!(complete_email("ana"), "ana@correo.ugr.es");
        assert_eq!(complete_email(" ana "), "ana@correo.ugr.es");
        assert_eq!(complete_email("ana@ugr.es"), "ana@ugr.es");
        assert_eq!(complete_email(""), "");
    }

    #[test]
    fn parses_embedded_launch_query() {
        let params = LaunchParams::from_query("?session_token=tok-123&lti=true&subject=calculo");
        assert_eq!(params.session_token.as_deref(), Some("tok-123"));
        assert!(params.lti);
        assert_eq!(params.subject.as_deref(), Some("calculo"));
        assert!(params.is_embedded_launch());
    }

    #[test]
    fn token_without_lti_flag_is_not_an_embedded_launch() {
        let params = LaunchParams::from_query("session_token=tok-123&lti=false");
        assert!(!params.is_embedded_launch());

        let params = LaunchParams::from_query("lti=true");
        assert!(!params.is_embedded_launch());
    }

    #[test]
    fn ignores_unknown_and_empty_parameters() {
        let params = LaunchParams::from_query("session_token=&lti=true&theme=dark");
        assert_eq!(params.session_token, None);
        assert!(params.lti);
        assert_eq!(params.subject, None);
    }
}
