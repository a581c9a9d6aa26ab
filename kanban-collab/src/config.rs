//! Runtime configuration.
//!
//! The only external configuration is the hosted broker's credentials,
//! read from the environment. Everything else has fixed defaults.

use std::fmt;

pub const ENV_APP_ID: &str = "PUSHER_APP_ID";
pub const ENV_APP_KEY: &str = "PUSHER_APP_KEY";
pub const ENV_APP_SECRET: &str = "PUSHER_APP_SECRET";
pub const ENV_APP_CLUSTER: &str = "PUSHER_APP_CLUSTER";

/// Port the gateway listens on.
pub const GATEWAY_PORT: u16 = 4000;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("environment variable {0} is not set (relay credentials are partially configured)")]
    Missing(&'static str),
}

/// Credentials for the hosted publish/subscribe broker.
#[derive(Clone, PartialEq, Eq)]
pub struct RelayCredentials {
    pub app_id: String,
    pub key: String,
    pub secret: String,
    pub cluster: String,
}

impl fmt::Debug for RelayCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelayCredentials")
            .field("app_id", &self.app_id)
            .field("key", &self.key)
            .field("secret", &"<redacted>")
            .field("cluster", &self.cluster)
            .finish()
    }
}

impl RelayCredentials {
    /// Read credentials from the process environment.
    ///
    /// `Ok(None)` when none of the variables are set (use the local relay),
    /// an error when only some of them are.
    pub fn from_env() -> Result<Option<Self>, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an injectable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Option<Self>, ConfigError> {
        let read = |name: &'static str| lookup(name).filter(|v| !v.trim().is_empty());
        let values = [
            (ENV_APP_ID, read(ENV_APP_ID)),
            (ENV_APP_KEY, read(ENV_APP_KEY)),
            (ENV_APP_SECRET, read(ENV_APP_SECRET)),
            (ENV_APP_CLUSTER, read(ENV_APP_CLUSTER)),
        ];

        if values.iter().all(|(_, v)| v.is_none()) {
            return Ok(None);
        }
        if let Some((name, _)) = values.iter().find(|(_, v)| v.is_none()) {
            return Err(ConfigError::Missing(*name));
        }

        let [app_id, key, secret, cluster] = values.map(|(_, v)| v.unwrap_or_default());
        Ok(Some(Self {
            app_id,
            key,
            secret,
            cluster,
        }))
    }

    /// Base URL of the broker's HTTP API.
    pub fn api_base_url(&self) -> String {
        format!("https://api-{}.pusher.com", self.cluster)
    }

    /// Subscriber WebSocket endpoint for this app.
    pub fn websocket_url(&self) -> String {
        SubscriberCredentials::from(self).websocket_url()
    }
}

/// The public half of the credentials: enough to subscribe, not to publish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriberCredentials {
    pub key: String,
    pub cluster: String,
}

impl SubscriberCredentials {
    /// Read the app key and cluster from the process environment.
    ///
    /// The id and secret are not consulted. `Ok(None)` when neither variable
    /// is set, an error when only one of them is.
    pub fn from_env() -> Result<Option<Self>, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Option<Self>, ConfigError> {
        let read = |name: &'static str| lookup(name).filter(|v| !v.trim().is_empty());
        match (read(ENV_APP_KEY), read(ENV_APP_CLUSTER)) {
            (None, None) => Ok(None),
            (Some(key), Some(cluster)) => Ok(Some(Self { key, cluster })),
            (None, Some(_)) => Err(ConfigError::Missing(ENV_APP_KEY)),
            (Some(_), None) => Err(ConfigError::Missing(ENV_APP_CLUSTER)),
        }
    }

    /// Subscriber WebSocket endpoint for this app.
    pub fn websocket_url(&self) -> String {
        format!(
            "wss://ws-{}.pusher.com/app/{}?protocol={}&client=kanban-collab&version={}",
            self.cluster,
            self.key,
            crate::protocol::PROTOCOL_VERSION,
            env!("CARGO_PKG_VERSION"),
        )
    }
}

impl From<&RelayCredentials> for SubscriberCredentials {
    fn from(credentials: &RelayCredentials) -> Self {
        Self {
            key: credentials.key.clone(),
            cluster: credentials.cluster.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name: &str| map.get(name).cloned()
    }

    #[test]
    fn test_all_present() {
        let creds = RelayCredentials::from_lookup(lookup(&[
            ("PUSHER_APP_ID", "42"),
            ("PUSHER_APP_KEY", "key"),
            ("PUSHER_APP_SECRET", "secret"),
            ("PUSHER_APP_CLUSTER", "eu"),
        ]))
        .unwrap()
        .unwrap();

        assert_eq!(creds.app_id, "42");
        assert_eq!(creds.cluster, "eu");
        assert_eq!(creds.api_base_url(), "https://api-eu.pusher.com");
        assert!(creds
            .websocket_url()
            .starts_with("wss://ws-eu.pusher.com/app/key?protocol=7&client=kanban-collab"));
    }

    #[test]
    fn test_none_present() {
        assert_eq!(RelayCredentials::from_lookup(lookup(&[])).unwrap(), None);
    }

    #[test]
    fn test_partial_is_error() {
        let err = RelayCredentials::from_lookup(lookup(&[
            ("PUSHER_APP_ID", "42"),
            ("PUSHER_APP_KEY", "key"),
        ]))
        .unwrap_err();
        assert_eq!(err, ConfigError::Missing("PUSHER_APP_SECRET"));
    }

    #[test]
    fn test_blank_counts_as_missing() {
        let err = RelayCredentials::from_lookup(lookup(&[
            ("PUSHER_APP_ID", "42"),
            ("PUSHER_APP_KEY", "key"),
            ("PUSHER_APP_SECRET", "s"),
            ("PUSHER_APP_CLUSTER", "  "),
        ]))
        .unwrap_err();
        assert_eq!(err, ConfigError::Missing("PUSHER_APP_CLUSTER"));
    }

    #[test]
    fn test_subscriber_needs_only_key_and_cluster() {
        let creds = SubscriberCredentials::from_lookup(lookup(&[
            ("PUSHER_APP_KEY", "key"),
            ("PUSHER_APP_CLUSTER", "eu"),
        ]))
        .unwrap()
        .unwrap();
        assert_eq!(creds.key, "key");
        assert!(creds
            .websocket_url()
            .starts_with("wss://ws-eu.pusher.com/app/key?protocol=7&client=kanban-collab"));

        // The full set would reject the same environment.
        assert_eq!(
            RelayCredentials::from_lookup(lookup(&[
                ("PUSHER_APP_KEY", "key"),
                ("PUSHER_APP_CLUSTER", "eu"),
            ]))
            .unwrap_err(),
            ConfigError::Missing("PUSHER_APP_ID")
        );
    }

    #[test]
    fn test_subscriber_partial_and_absent() {
        assert_eq!(SubscriberCredentials::from_lookup(lookup(&[])).unwrap(), None);
        assert_eq!(
            SubscriberCredentials::from_lookup(lookup(&[("PUSHER_APP_KEY", "key")])).unwrap_err(),
            ConfigError::Missing("PUSHER_APP_CLUSTER")
        );
        assert_eq!(
            SubscriberCredentials::from_lookup(lookup(&[
                ("PUSHER_APP_SECRET", "s"),
                ("PUSHER_APP_CLUSTER", "eu"),
            ]))
            .unwrap_err(),
            ConfigError::Missing("PUSHER_APP_KEY")
        );
    }

    #[test]
    fn test_subscriber_url_matches_full_credentials() {
        let full = RelayCredentials {
            app_id: "1".into(),
            key: "k".into(),
            secret: "s".into(),
            cluster: "us2".into(),
        };
        let public = SubscriberCredentials::from(&full);
        assert_eq!(public.websocket_url(), full.websocket_url());
    }

    #[test]
    fn test_debug_redacts_secret() {
        let creds = RelayCredentials {
            app_id: "1".into(),
            key: "k".into(),
            secret: "hunter2".into(),
            cluster: "eu".into(),
        };
        let shown = format!("{creds:?}");
        assert!(!shown.contains("hunter2"));
        assert!(shown.contains("<redacted>"));
    }
}
