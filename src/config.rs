//! Connection options.

use crate::error::{Error, Result};

/// Everything needed to open a session.
///
/// The connection target and character set are independent: either may be
/// given without the other.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectOptions {
    /// Database username.
    pub username: String,
    /// Database password.
    pub password: String,
    /// Driver-specific locator (connect descriptor, service name, file path).
    pub target: Option<String>,
    /// Client character set name.
    pub character_set: Option<String>,
}

impl ConnectOptions {
    /// Create options with credentials only.
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            target: None,
            character_set: None,
        }
    }

    /// Set the connection target.
    ///
    /// # Example
    ///
    /// ```
    /// use oracle_session::ConnectOptions;
    ///
    /// let options = ConnectOptions::new("scott", "tiger")
    ///     .with_target("localhost:1521/FREEPDB1")
    ///     .with_character_set("AL32UTF8");
    /// assert_eq!(options.target.as_deref(), Some("localhost:1521/FREEPDB1"));
    /// ```
    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    /// Set the client character set.
    pub fn with_character_set(mut self, character_set: impl Into<String>) -> Self {
        self.character_set = Some(character_set.into());
        self
    }

    /// Read options from `{prefix}_USERNAME`, `{prefix}_PASSWORD`,
    /// `{prefix}_TARGET` and `{prefix}_CHARSET`.
    ///
    /// Username and password are required; the other two are optional.
    pub fn from_env(prefix: &str) -> Result<Self> {
        let required = |name: &str| {
            let key = format!("{}_{}", prefix, name);
            std::env::var(&key).map_err(|_| Error::config(format!("{} is not set", key)))
        };
        let optional = |name: &str| std::env::var(format!("{}_{}", prefix, name)).ok();

        Ok(Self {
            username: required("USERNAME")?,
            password: required("PASSWORD")?,
            target: optional("TARGET"),
            character_set: optional("CHARSET"),
        })
    }
}
