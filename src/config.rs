use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::IpAddr;
use std::path::Path;
use std::time::Duration;

use crate::error::ConfigError;
use crate::file_id::{base_path, validate_group};
use crate::transport::ServerAddr;

pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_CONFIG_FILE: &str = "fdfs.toml";

/// Immutable connection parameters, fixed when a client is built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// `host[:port]`; the port defaults to 22122
    pub trackers: Vec<String>,
    pub connect_timeout_secs: u64,
    pub network_timeout_secs: u64,
    /// Group used for uploads when none is given
    pub group: Option<String>,
    /// Public prefix for URLs built from file identifiers
    pub base_url: Option<String>,
    /// Scheme for URLs published under a tracker's domain name
    pub https: bool,
    /// Storage ip -> public host
    pub ip_mapping: HashMap<String, String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            trackers: vec!["127.0.0.1:22122".to_string()],
            connect_timeout_secs: DEFAULT_TIMEOUT_SECS,
            network_timeout_secs: DEFAULT_TIMEOUT_SECS,
            group: None,
            base_url: None,
            https: true,
            ip_mapping: HashMap::new(),
        }
    }
}

impl ClientConfig {
    pub fn from_hosts<I, S>(hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            trackers: hosts.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Reads a `.toml` file, or a `client.conf` in key = value form.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let config = if path.extension().is_some_and(|ext| ext == "toml") {
            toml::from_str(&content)?
        } else {
            Self::from_client_conf(&content)?
        };
        tracing::debug!("Loaded client config from {:?}", path);
        Ok(config)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(())
    }

    /// FastDFS `client.conf`: `tracker_server` may repeat, `#` starts a
    /// comment, keys this client has no use for are skipped.
    pub fn from_client_conf(content: &str) -> Result<Self, ConfigError> {
        let mut config = Self {
            trackers: Vec::new(),
            ..Self::default()
        };

        for line in content.lines() {
            let line = line.split('#').next().unwrap_or_default().trim();
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let (key, value) = (key.trim(), value.trim());
            match key {
                "tracker_server" => config.trackers.push(value.to_string()),
                "connect_timeout" => config.connect_timeout_secs = parse_secs(key, value)?,
                "network_timeout" => config.network_timeout_secs = parse_secs(key, value)?,
                _ => {}
            }
        }
        Ok(config)
    }

    /// Checks everything a client relies on and returns the parsed tracker list.
    pub fn validate(&self) -> Result<Vec<ServerAddr>, ConfigError> {
        let trackers = self.tracker_addrs()?;
        if trackers.is_empty() {
            return Err(ConfigError::NoTrackers);
        }
        if let Some(group) = &self.group {
            validate_group(group)?;
        }
        for (key, value) in [
            ("connect_timeout_secs", self.connect_timeout_secs),
            ("network_timeout_secs", self.network_timeout_secs),
        ] {
            if value == 0 {
                return Err(ConfigError::InvalidValue {
                    key: key.to_string(),
                    value: value.to_string(),
                });
            }
        }
        // URLs are parsed back as scheme://host/group/path, so a public
        // base may not carry a path of its own.
        let bases = self
            .base_url
            .iter()
            .map(|base| ("base_url", base))
            .chain(self.ip_mapping.values().map(|host| ("ip_mapping", host)));
        for (key, base) in bases {
            if !base_path(base).is_empty() {
                return Err(ConfigError::InvalidValue {
                    key: key.to_string(),
                    value: base.clone(),
                });
            }
        }
        Ok(trackers)
    }

    pub fn tracker_addrs(&self) -> Result<Vec<ServerAddr>, ConfigError> {
        self.trackers.iter().map(|t| ServerAddr::parse(t)).collect()
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn network_timeout(&self) -> Duration {
        Duration::from_secs(self.network_timeout_secs)
    }

    /// Where files held by `storage_ip` are published, in priority order:
    /// explicit base url, ip mapping, a tracker given by domain name, then
    /// the storage node itself.
    pub fn public_base(&self, storage_ip: &str) -> String {
        if let Some(base) = &self.base_url {
            return base.clone();
        }
        if let Some(host) = self.ip_mapping.get(storage_ip) {
            return if host.contains("://") {
                host.clone()
            } else {
                format!("http://{}", host)
            };
        }
        let scheme = if self.https { "https" } else { "http" };
        if let Some(domain) = self.tracker_domain() {
            return format!("{}://{}/", scheme, domain);
        }
        format!("http://{}/", storage_ip)
    }

    fn tracker_domain(&self) -> Option<String> {
        let first = ServerAddr::parse(self.trackers.first()?).ok()?;
        if first.host.parse::<IpAddr>().is_ok() || first.host == "localhost" {
            return None;
        }
        Some(first.host)
    }
}

fn parse_secs(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_client_conf() {
        let conf = "\
# sample
connect_timeout = 5
network_timeout=60
base_path = /tmp/fastdfs
tracker_server = 10.0.0.1:22122
tracker_server = 10.0.0.2:22123  # backup
http.tracker_server_port = 80
";
        let config = ClientConfig::from_client_conf(conf).unwrap();
        assert_eq!(config.connect_timeout_secs, 5);
        assert_eq!(config.network_timeout_secs, 60);
        assert_eq!(
            config.tracker_addrs().unwrap(),
            vec![
                ServerAddr::new("10.0.0.1", 22122),
                ServerAddr::new("10.0.0.2", 22123)
            ]
        );
    }

    #[test]
    fn bad_timeout_is_reported() {
        let err = ClientConfig::from_client_conf("connect_timeout = soon").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn validation() {
        assert!(matches!(
            ClientConfig::from_hosts(Vec::<String>::new()).validate(),
            Err(ConfigError::NoTrackers)
        ));
        assert!(matches!(
            ClientConfig::from_hosts(["host:notaport"]).validate(),
            Err(ConfigError::InvalidTracker(_))
        ));

        let mut config = ClientConfig::from_hosts(["tracker"]);
        config.group = Some("a-group-name-that-is-too-long".into());
        assert!(matches!(config.validate(), Err(ConfigError::Identifier(_))));

        config.group = Some("group1".into());
        config.network_timeout_secs = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { .. })
        ));

        config.network_timeout_secs = 3;
        assert_eq!(
            config.validate().unwrap(),
            vec![ServerAddr::new("tracker", 22122)]
        );
    }

    #[test]
    fn public_base_with_a_path_is_rejected() {
        let mut config = ClientConfig::from_hosts(["tracker"]);
        config.base_url = Some("https://cdn.example.com/fdfs".into());
        match config.validate() {
            Err(ConfigError::InvalidValue { key, value }) => {
                assert_eq!(key, "base_url");
                assert_eq!(value, "https://cdn.example.com/fdfs");
            }
            other => panic!("unexpected {other:?}"),
        }

        config.base_url = Some("https://cdn.example.com/".into());
        config.ip_mapping.insert("10.1.1.1".into(), "cdn.example.com/static".into());
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { key, .. }) if key == "ip_mapping"
        ));

        config.ip_mapping.insert("10.1.1.1".into(), "cdn.example.com:8080".into());
        assert!(config.validate().is_ok());

        let id = crate::FileId::new("group1", "M00/00/00/abc.txt").unwrap();
        for storage_ip in ["10.1.1.1", "10.1.1.2"] {
            let url = id.format(Some(&config.public_base(storage_ip)));
            assert_eq!(crate::FileId::parse(&url).unwrap(), id);
        }
    }

    #[test]
    fn public_base_priority() {
        let mut config = ClientConfig::from_hosts(["120.7.7.3"]);
        assert_eq!(config.public_base("10.1.1.1"), "http://10.1.1.1/");

        config.ip_mapping.insert("10.1.1.1".into(), "cdn.example.com".into());
        assert_eq!(config.public_base("10.1.1.1"), "http://cdn.example.com");
        assert_eq!(config.public_base("10.1.1.2"), "http://10.1.1.2/");

        config.base_url = Some("https://dfs.example.com".into());
        assert_eq!(config.public_base("10.1.1.1"), "https://dfs.example.com");
    }

    #[test]
    fn domain_tracker_is_the_public_host() {
        let mut config = ClientConfig::from_hosts(["dfs.example.com:22122"]);
        assert_eq!(config.public_base("10.1.1.1"), "https://dfs.example.com/");
        config.https = false;
        assert_eq!(config.public_base("10.1.1.1"), "http://dfs.example.com/");

        let local = ClientConfig::from_hosts(["localhost"]);
        assert_eq!(local.public_base("10.1.1.1"), "http://10.1.1.1/");
    }

    #[test]
    fn toml_roundtrip_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fdfs.toml");
        let mut config = ClientConfig::from_hosts(["a:1", "b"]);
        config.group = Some("group2".into());
        config.ip_mapping.insert("10.0.0.9".into(), "https://cdn".into());
        config.save(&path).unwrap();
        assert_eq!(ClientConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let err = ClientConfig::load("/nonexistent/client.conf").unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
