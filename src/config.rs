use std::path::{Path, PathBuf};

use log::{debug, error};
use serde::{Deserialize, Serialize};
use twitch_oauth2::{oauth2::AccessToken, ClientId, ClientSecret};

/// Default location of the credential file, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "config.json";

/// Errors for [`Credentials::load`]
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("could not read configuration from {}", path.display())]
    Missing {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("configuration in {} is malformed", path.display())]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// On-disk shape of the credential file.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConfigFile {
    #[serde(alias = "ClientId")]
    client_id: String,
    #[serde(alias = "ClientSecret")]
    client_secret: String,
    #[serde(alias = "AuthToken")]
    auth_token: String,
}

/// Credentials needed for a run.
///
/// `client_id` and `client_secret` identify the registered application for the
/// OAuth exchange and Helix calls, `auth_token` is the browser session token the
/// GQL surface expects in an `OAuth <token>` header.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub client_id: ClientId,
    pub client_secret: ClientSecret,
    pub auth_token: AccessToken,
}

impl Credentials {
    /// Construct [`Credentials`] from plain strings
    pub fn new(client_id: &str, client_secret: &str, auth_token: &str) -> Self {
        Credentials {
            client_id: ClientId::new(client_id.to_string()),
            client_secret: ClientSecret::new(client_secret.to_string()),
            auth_token: AccessToken::new(auth_token.to_string()),
        }
    }

    /// Read the credential file at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Credentials, ConfigError> {
        let path = path.as_ref();
        let data = std::fs::read_to_string(path).map_err(|source| ConfigError::Missing {
            path: path.to_path_buf(),
            source,
        })?;
        let file: ConfigFile =
            serde_json::from_str(&data).map_err(|source| ConfigError::Malformed {
                path: path.to_path_buf(),
                source,
            })?;
        debug!("loaded configuration from {}", path.display());
        Ok(Credentials::new(
            &file.client_id,
            &file.client_secret,
            &file.auth_token,
        ))
    }

    /// Replace values with `CLIENT_ID`, `CLIENT_SECRET` and `AUTH_TOKEN` from `lookup`.
    ///
    /// Empty values are ignored. Pass `|key| std::env::var(key).ok()` to read the process environment.
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let lookup = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        if let Some(client_id) = lookup("CLIENT_ID") {
            debug!("client id overridden from environment");
            self.client_id = ClientId::new(client_id);
        }
        if let Some(client_secret) = lookup("CLIENT_SECRET") {
            debug!("client secret overridden from environment");
            self.client_secret = ClientSecret::new(client_secret);
        }
        if let Some(auth_token) = lookup("AUTH_TOKEN") {
            debug!("auth token overridden from environment");
            self.auth_token = AccessToken::new(auth_token);
        }
        self
    }

    /// Write the credentials to `path` as pretty JSON.
    ///
    /// Failures are logged, not returned.
    pub fn save(&self, path: impl AsRef<Path>) {
        let path = path.as_ref();
        let file = ConfigFile {
            client_id: self.client_id.as_str().to_string(),
            client_secret: self.client_secret.secret().clone(),
            auth_token: self.auth_token.secret().clone(),
        };
        let result = serde_json::to_string_pretty(&file)
            .map_err(std::io::Error::from)
            .and_then(|json| std::fs::write(path, json));
        match result {
            Ok(()) => debug!("saved configuration to {}", path.display()),
            Err(e) => error!("error saving configuration to {}: {}", path.display(), e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &tempfile::TempDir, contents: &str) -> PathBuf {
        let path = dir.path().join("config.json");
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn load_reads_camel_case_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            &dir,
            r#"{"clientId":"cid","clientSecret":"secret","authToken":"gql"}"#,
        );
        let creds = Credentials::load(&path).unwrap();
        assert_eq!(creds.client_id.as_str(), "cid");
        assert_eq!(creds.client_secret.secret(), "secret");
        assert_eq!(creds.auth_token.secret(), "gql");
    }

    #[test]
    fn load_accepts_pascal_case_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            &dir,
            r#"{"ClientId":"cid","ClientSecret":"secret","AuthToken":"gql"}"#,
        );
        let creds = Credentials::load(&path).unwrap();
        assert_eq!(creds.client_id.as_str(), "cid");
    }

    #[test]
    fn missing_file_is_reported_as_missing() {
        let dir = tempfile::tempdir().unwrap();
        let err = Credentials::load(dir.path().join("nope.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Missing { .. }));
    }

    #[test]
    fn broken_json_is_reported_as_malformed() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, r#"{"clientId": "#);
        assert!(matches!(
            Credentials::load(&path).unwrap_err(),
            ConfigError::Malformed { .. }
        ));

        let path = write(&dir, r#"{"clientId":"cid"}"#);
        assert!(matches!(
            Credentials::load(&path).unwrap_err(),
            ConfigError::Malformed { .. }
        ));
    }

    #[test]
    fn overrides_replace_non_empty_values_only() {
        let creds = Credentials::new("cid", "secret", "gql").with_overrides(|key| match key {
            "CLIENT_ID" => Some("other".to_string()),
            "AUTH_TOKEN" => Some("  ".to_string()),
            _ => None,
        });
        assert_eq!(creds.client_id.as_str(), "other");
        assert_eq!(creds.client_secret.secret(), "secret");
        assert_eq!(creds.auth_token.secret(), "gql");
    }

    #[test]
    fn save_writes_camel_case_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("saved.json");
        Credentials::new("cid", "secret", "gql").save(&path);

        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["clientId"], "cid");
        assert_eq!(value["clientSecret"], "secret");
        assert_eq!(value["authToken"], "gql");
    }

    #[test]
    fn save_into_missing_directory_does_not_panic() {
        let dir = tempfile::tempdir().unwrap();
        Credentials::new("cid", "secret", "gql").save(dir.path().join("a/b/config.json"));
        assert!(!dir.path().join("a").exists());
    }

    #[test]
    fn debug_output_redacts_secrets() {
        let creds = Credentials::new("cid", "hunter2", "gqltoken");
        let debug = format!("{:?}", creds);
        assert!(!debug.contains("hunter2"));
        assert!(!debug.contains("gqltoken"));
        assert_eq!(format!("{:?}", creds.auth_token), "AccessToken([redacted])");
    }
}
