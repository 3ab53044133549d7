use base64::{engine::general_purpose::STANDARD, Engine};
use std::{fmt, str::FromStr};

/// Basic-auth credentials for the search backend.
///
/// The username doubles as the organization id, which names the index the
/// agent writes to.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    username: String,
    password: String,
}

#[derive(Debug, thiserror::Error)]
pub enum CredentialsError {
    #[error("credentials are not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("credentials are not valid UTF-8")]
    Utf8(#[from] std::string::FromUtf8Error),

    #[error("credentials must have the form <username>:<password>")]
    Malformed,
}

// === impl Credentials ===

impl Credentials {
    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn password(&self) -> &str {
        &self.password
    }

    /// The organization this agent reports for.
    pub fn org_id(&self) -> &str {
        &self.username
    }
}

impl FromStr for Credentials {
    type Err = CredentialsError;

    /// Parses `username:password`, or the base64 encoding thereof.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let decoded;
        let plain = if !s.contains(':') && s.ends_with("==") {
            decoded = String::from_utf8(STANDARD.decode(s)?)?;
            decoded.as_str()
        } else {
            s
        };

        match plain.split_once(':') {
            Some((username, password)) if !username.is_empty() => Ok(Self {
                username: username.to_string(),
                password: password.to_string(),
            }),
            _ => Err(CredentialsError::Malformed),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain() {
        let creds = "org-1234:s3cr3t".parse::<Credentials>().unwrap();
        assert_eq!(creds.org_id(), "org-1234");
        assert_eq!(creds.password(), "s3cr3t");
    }

    #[test]
    fn encoded() {
        // base64("org-12:s3cr3t")
        let creds = "b3JnLTEyOnMzY3IzdA==".parse::<Credentials>().unwrap();
        assert_eq!(creds.username(), "org-12");
        assert_eq!(creds.password(), "s3cr3t");
    }

    #[test]
    fn password_may_contain_colons() {
        let creds = "org:a:b".parse::<Credentials>().unwrap();
        assert_eq!(creds.password(), "a:b");
    }

    #[test]
    fn malformed() {
        assert!(matches!(
            "no-separator".parse::<Credentials>(),
            Err(CredentialsError::Malformed)
        ));
        assert!(matches!(
            ":password".parse::<Credentials>(),
            Err(CredentialsError::Malformed)
        ));
        assert!(matches!(
            "!!!==".parse::<Credentials>(),
            Err(CredentialsError::Base64(_))
        ));
    }

    #[test]
    fn debug_hides_password() {
        let creds = "org:hunter2".parse::<Credentials>().unwrap();
        assert!(!format!("{creds:?}").contains("hunter2"));
    }
}
