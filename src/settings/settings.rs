use anyhow::{Result, anyhow};
use config::{Config, Environment, File};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub auth: Auth,
    pub storage: Storage,
    pub http: Http,
    pub log: Log,
    /// Google sign-in is disabled when this section is absent.
    #[serde(default)]
    pub google: Option<Google>,
}

#[derive(Clone, Deserialize)]
pub struct Auth {
    pub issuer: String,
    pub audience: String,
    pub access_secret: String,
    pub refresh_secret: String,
    pub access_ttl_secs: u64,
    pub refresh_ttl_secs: u64,
}

impl std::fmt::Debug for Auth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Auth")
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .field("access_ttl_secs", &self.access_ttl_secs)
            .field("refresh_ttl_secs", &self.refresh_ttl_secs)
            .finish_non_exhaustive()
    }
}

#[derive(Clone, Deserialize)]
pub struct Storage {
    pub backend: String, // "memory" or "mysql"
    pub mysql_dsn: Option<String>,
}

impl std::fmt::Debug for Storage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // The DSN carries the database password.
        f.debug_struct("Storage")
            .field("backend", &self.backend)
            .field("mysql_dsn", &self.mysql_dsn.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenTransport {
    /// Tokens travel in JSON bodies and the `Authorization` header.
    Bearer,
    /// Tokens are additionally set as `accessToken` / `refreshToken` cookies.
    Cookie,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Http {
    pub address: String,
    pub token_transport: TokenTransport,
    pub tls: Option<Tls>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Tls {
    pub cert_path: String,
    pub key_path: String,
}

#[derive(Clone, Deserialize)]
pub struct Google {
    pub client_id: String,
    pub client_secret: String,
    /// Must point at this service's `/users/googleCallback`.
    pub redirect_uri: String,
}

impl std::fmt::Debug for Google {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Google")
            .field("client_id", &self.client_id)
            .field("redirect_uri", &self.redirect_uri)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Log {
    pub filter: String,
}

#[cfg(debug_assertions)]
const SETTINGS_PATH: &str = "settings/dev.toml";
#[cfg(not(debug_assertions))]
const SETTINGS_PATH: &str = "settings/release.toml";

/// Loads the TOML file, then lets `QUILL__SECTION__KEY` variables override it.
pub fn parse_settings(path: Option<&str>) -> Result<Settings> {
    let path = path.unwrap_or(SETTINGS_PATH);

    let settings: Settings = Config::builder()
        .add_source(File::with_name(path))
        .add_source(Environment::with_prefix("QUILL").separator("__"))
        .build()
        .map_err(|e| anyhow!(e))?
        .try_deserialize()
        .map_err(|e| anyhow!(e))?;

    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dev_settings_parse() {
        let settings = parse_settings(Some("settings/dev.toml")).unwrap();
        assert_eq!(settings.storage.backend, "memory");
        assert_eq!(settings.auth.access_ttl_secs, 15 * 60);
        assert_eq!(settings.auth.refresh_ttl_secs, 7 * 24 * 60 * 60);
        assert_eq!(settings.http.token_transport, TokenTransport::Bearer);
        assert!(settings.http.tls.is_none());
        assert!(settings.google.is_none());
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(parse_settings(Some("settings/does-not-exist.toml")).is_err());
    }

    #[test]
    fn debug_output_hides_secrets() {
        let mut settings = parse_settings(Some("settings/dev.toml")).unwrap();
        settings.storage.mysql_dsn = Some("mysql://root:hunter2@db/quill".to_string());
        settings.google = Some(Google {
            client_id: "client-1".to_string(),
            client_secret: "google-secret".to_string(),
            redirect_uri: "http://localhost/cb".to_string(),
        });
        let rendered = format!("{:?}", settings);
        assert!(!rendered.contains(&settings.auth.access_secret));
        assert!(!rendered.contains(&settings.auth.refresh_secret));
        assert!(!rendered.contains("hunter2"));
        assert!(!rendered.contains("google-secret"));
        assert!(rendered.contains("mysql_dsn: Some(\"<redacted>\")"));
    }
}
