//! vipguard.toml configuration model.
//!
//! Loaded once at start-up and read-only afterwards. `validate()` enforces
//! the per-role requirements so a node never starts half-configured.

use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};
use crate::http::Endpoint;
use crate::types::{MacAddress, Role, VipClaim};

/// How long a container restart request may take before Docker answers.
/// Docker stops the container (10s grace by default) before replying.
pub const CONTAINER_RESTART_TIMEOUT: Duration = Duration::from_secs(60);

/// Requests a secondary makes to the primary during one sync: the health
/// check and the two config fetches.
const SYNC_REQUESTS: u32 = 3;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HaConfig {
    pub role: Role,
    #[serde(default = "default_listen")]
    pub listen: SocketAddr,
    /// Secondary endpoints notified after a healthy rollout (primary only).
    ///
    /// `None` means unset, which is a configuration error on a primary.
    /// An empty list is valid and turns fan-out into a no-op.
    pub secondaries: Option<Vec<String>>,
    /// Per-secondary `POST /update-config` timeout. Derived from
    /// [`HaConfig::min_push_timeout`] when unset.
    #[serde(
        default,
        with = "duration_str::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub push_timeout: Option<Duration>,
    pub vip: Option<VipConfig>,
    pub primary: Option<PrimaryConfig>,
    pub proxy: ProxyConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VipConfig {
    pub address: Ipv4Addr,
    pub mac: MacAddress,
    pub interface: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrimaryConfig {
    pub url: String,
    #[serde(default = "default_probe_interval", with = "duration_str")]
    pub probe_interval: Duration,
    #[serde(default = "default_probe_timeout", with = "duration_str")]
    pub probe_timeout: Duration,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyConfig {
    pub config_dir: PathBuf,
    #[serde(default = "default_docker_uri")]
    pub docker_uri: String,
    #[serde(default = "default_image_prefix")]
    pub image_prefix: String,
    #[serde(default = "default_dynamic_file")]
    pub dynamic_file: String,
    #[serde(default = "default_static_file")]
    pub static_file: String,
    #[serde(default = "default_health_timeout", with = "duration_str")]
    pub health_timeout: Duration,
    #[serde(default = "default_watch_interval", with = "duration_str")]
    pub watch_interval: Duration,
    #[serde(default = "default_watch_extensions")]
    pub watch_extensions: Vec<String>,
}

impl ProxyConfig {
    pub fn dynamic_path(&self) -> PathBuf {
        self.config_dir.join(&self.dynamic_file)
    }

    pub fn static_path(&self) -> PathBuf {
        self.config_dir.join(&self.static_file)
    }
}

impl HaConfig {
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        content.parse()
    }

    /// Check the per-role requirements. Call once before starting any loop.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.proxy.config_dir.as_os_str().is_empty() {
            return Err(ConfigError::Missing("proxy.config_dir"));
        }
        if self.proxy.image_prefix.trim().is_empty() {
            return Err(ConfigError::Missing("proxy.image_prefix"));
        }
        if self.proxy.health_timeout.is_zero() {
            return Err(ConfigError::invalid("proxy.health_timeout", "must be non-zero"));
        }
        if self.proxy.watch_interval.is_zero() {
            return Err(ConfigError::invalid("proxy.watch_interval", "must be non-zero"));
        }
        Endpoint::parse(&self.proxy.docker_uri)
            .map_err(|e| ConfigError::invalid("proxy.docker_uri", e.to_string()))?;

        match self.role {
            Role::Primary => {
                let secondaries = self
                    .secondaries
                    .as_ref()
                    .ok_or(ConfigError::Missing("secondaries"))?;
                for url in secondaries {
                    Endpoint::parse(url)
                        .map_err(|e| ConfigError::invalid("secondaries", e.to_string()))?;
                }
                let floor = self.min_push_timeout();
                if self.push_timeout.is_some_and(|t| t < floor) {
                    return Err(ConfigError::invalid(
                        "push_timeout",
                        format!(
                            "must be at least {}s to cover a secondary's pull, restart and health wait",
                            floor.as_secs()
                        ),
                    ));
                }
            }
            Role::Secondary => {
                let vip = self.vip.as_ref().ok_or(ConfigError::Missing("vip"))?;
                if vip.interface.trim().is_empty() {
                    return Err(ConfigError::Missing("vip.interface"));
                }
                let primary = self.primary.as_ref().ok_or(ConfigError::Missing("primary"))?;
                Endpoint::parse(&primary.url)
                    .map_err(|e| ConfigError::invalid("primary.url", e.to_string()))?;
                if primary.probe_interval.is_zero() {
                    return Err(ConfigError::invalid("primary.probe_interval", "must be non-zero"));
                }
            }
        }
        Ok(())
    }

    /// Worst case for one secondary sync, assuming the secondaries share this
    /// node's `[primary].probe_timeout` and `[proxy].health_timeout`: three
    /// requests to the primary, a container restart, then the health wait.
    pub fn min_push_timeout(&self) -> Duration {
        let request_timeout = self
            .primary
            .as_ref()
            .map_or_else(default_probe_timeout, |p| p.probe_timeout);
        request_timeout * SYNC_REQUESTS + CONTAINER_RESTART_TIMEOUT + self.proxy.health_timeout
    }

    /// The configured push timeout, or [`HaConfig::min_push_timeout`].
    pub fn push_timeout(&self) -> Duration {
        self.push_timeout.unwrap_or_else(|| self.min_push_timeout())
    }

    /// The VIP announcement parameters (secondary only).
    pub fn vip_claim(&self) -> ConfigResult<VipClaim> {
        let vip = self.vip.as_ref().ok_or(ConfigError::Missing("vip"))?;
        Ok(VipClaim {
            address: vip.address,
            mac: vip.mac,
            interface: vip.interface.clone(),
        })
    }

    pub fn primary_endpoint(&self) -> ConfigResult<Endpoint> {
        let primary = self.primary.as_ref().ok_or(ConfigError::Missing("primary"))?;
        Endpoint::parse(&primary.url).map_err(|e| ConfigError::invalid("primary.url", e.to_string()))
    }

    pub fn secondary_endpoints(&self) -> ConfigResult<Vec<Endpoint>> {
        let secondaries = self
            .secondaries
            .as_ref()
            .ok_or(ConfigError::Missing("secondaries"))?;
        secondaries
            .iter()
            .map(|url| {
                Endpoint::parse(url).map_err(|e| ConfigError::invalid("secondaries", e.to_string()))
            })
            .collect()
    }
}

impl std::str::FromStr for HaConfig {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(toml::from_str(s)?)
    }
}

fn default_listen() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

fn default_probe_interval() -> Duration {
    Duration::from_secs(10)
}

fn default_probe_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_docker_uri() -> String {
    "unix:///var/run/docker.sock".to_string()
}

fn default_image_prefix() -> String {
    "traefik".to_string()
}

fn default_dynamic_file() -> String {
    "dynamic.yml".to_string()
}

fn default_static_file() -> String {
    "traefik.yml".to_string()
}

fn default_health_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_watch_interval() -> Duration {
    Duration::from_secs(1)
}

fn default_watch_extensions() -> Vec<String> {
    vec!["yml".to_string(), "yaml".to_string()]
}

/// Parse a duration string like "5s", "500ms", "2m", or a bare number of seconds.
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if let Some(ms) = s.strip_suffix("ms") {
        ms.trim().parse::<u64>().ok().map(Duration::from_millis)
    } else if let Some(secs) = s.strip_suffix('s') {
        secs.trim().parse::<u64>().ok().map(Duration::from_secs)
    } else if let Some(mins) = s.strip_suffix('m') {
        mins.trim().parse::<u64>().ok().map(|m| Duration::from_secs(m * 60))
    } else {
        s.parse::<u64>().ok().map(Duration::from_secs)
    }
}

/// Serde adapter storing durations as human strings.
mod duration_str {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer, de};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        if d.subsec_millis() != 0 {
            s.serialize_str(&format!("{}ms", d.as_millis()))
        } else {
            s.serialize_str(&format!("{}s", d.as_secs()))
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let raw = String::deserialize(d)?;
        super::parse_duration(&raw)
            .ok_or_else(|| de::Error::custom(format!("invalid duration {raw:?}")))
    }

    pub mod option {
        use std::time::Duration;

        use serde::{Deserialize, Deserializer, Serializer, de};

        pub fn serialize<S: Serializer>(d: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
            match d {
                Some(d) => super::serialize(d, s),
                None => s.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
            Option::<String>::deserialize(d)?
                .map(|raw| {
                    crate::config::parse_duration(&raw)
                        .ok_or_else(|| de::Error::custom(format!("invalid duration {raw:?}")))
                })
                .transpose()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECONDARY: &str = r#"
role = "secondary"

[vip]
address = "10.0.0.100"
mac = "02:42:ac:11:00:02"
interface = "eth0"

[primary]
url = "http://10.0.0.1:8080"

[proxy]
config_dir = "/etc/traefik"
"#;

    const PRIMARY: &str = r#"
role = "primary"
listen = "127.0.0.1:9000"
secondaries = ["http://10.0.0.2:8080", "http://10.0.0.3:8080"]

[proxy]
config_dir = "/etc/traefik"
health_timeout = "30s"
watch_interval = "500ms"
"#;

    #[test]
    fn secondary_defaults_applied() {
        let config: HaConfig = SECONDARY.parse().unwrap();
        config.validate().unwrap();

        assert_eq!(config.role, Role::Secondary);
        assert_eq!(config.listen, default_listen());
        let primary = config.primary.as_ref().unwrap();
        assert_eq!(primary.probe_interval, Duration::from_secs(10));
        assert_eq!(primary.probe_timeout, Duration::from_secs(5));
        assert_eq!(config.proxy.health_timeout, Duration::from_secs(60));
        assert_eq!(config.proxy.image_prefix, "traefik");
        assert_eq!(config.proxy.dynamic_path(), PathBuf::from("/etc/traefik/dynamic.yml"));
        assert_eq!(config.proxy.static_path(), PathBuf::from("/etc/traefik/traefik.yml"));
        assert_eq!(config.proxy.watch_extensions, vec!["yml", "yaml"]);

        let claim = config.vip_claim().unwrap();
        assert_eq!(claim.address, Ipv4Addr::new(10, 0, 0, 100));
        assert_eq!(claim.interface, "eth0");
    }

    #[test]
    fn primary_overrides_parsed() {
        let config: HaConfig = PRIMARY.parse().unwrap();
        config.validate().unwrap();

        assert_eq!(config.listen.port(), 9000);
        assert_eq!(config.proxy.health_timeout, Duration::from_secs(30));
        assert_eq!(config.proxy.watch_interval, Duration::from_millis(500));
        assert_eq!(config.secondary_endpoints().unwrap().len(), 2);
    }

    #[test]
    fn primary_without_secondaries_is_rejected() {
        let toml = PRIMARY.replace(
            "secondaries = [\"http://10.0.0.2:8080\", \"http://10.0.0.3:8080\"]",
            "",
        );
        let config: HaConfig = toml.parse().unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::Missing("secondaries"))));
    }

    #[test]
    fn primary_with_empty_secondaries_is_valid() {
        let toml = PRIMARY.replace(
            "secondaries = [\"http://10.0.0.2:8080\", \"http://10.0.0.3:8080\"]",
            "secondaries = []",
        );
        let config: HaConfig = toml.parse().unwrap();
        config.validate().unwrap();
        assert!(config.secondary_endpoints().unwrap().is_empty());
    }

    #[test]
    fn push_timeout_derived_from_sync_worst_case() {
        let config: HaConfig = PRIMARY.parse().unwrap();
        assert_eq!(config.push_timeout, None);
        // 3 x 5s requests + 60s restart + 30s health wait.
        assert_eq!(config.min_push_timeout(), Duration::from_secs(105));
        assert_eq!(config.push_timeout(), Duration::from_secs(105));
    }

    #[test]
    fn short_push_timeout_is_rejected() {
        let toml = PRIMARY.replace("listen = ", "push_timeout = \"90s\"\nlisten = ");
        let config: HaConfig = toml.parse().unwrap();
        assert_eq!(config.push_timeout(), Duration::from_secs(90));
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { field: "push_timeout", .. })
        ));

        let toml = PRIMARY.replace("listen = ", "push_timeout = \"2m\"\nlisten = ");
        let config: HaConfig = toml.parse().unwrap();
        config.validate().unwrap();
        assert_eq!(config.push_timeout(), Duration::from_secs(120));
    }

    #[test]
    fn secondary_without_vip_is_rejected() {
        let config: HaConfig = r#"
role = "secondary"

[primary]
url = "http://10.0.0.1:8080"

[proxy]
config_dir = "/etc/traefik"
"#
        .parse()
        .unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::Missing("vip"))));
    }

    #[test]
    fn bad_mac_fails_to_parse() {
        let toml = SECONDARY.replace("02:42:ac:11:00:02", "02:42:ac");
        assert!(matches!(toml.parse::<HaConfig>(), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn bad_duration_fails_to_parse() {
        let toml = PRIMARY.replace("\"30s\"", "\"soon\"");
        assert!(matches!(toml.parse::<HaConfig>(), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn bad_primary_url_is_invalid() {
        let toml = SECONDARY.replace("http://10.0.0.1:8080", "ftp://10.0.0.1");
        let config: HaConfig = toml.parse().unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { field: "primary.url", .. })
        ));
    }

    #[test]
    fn from_file_reports_missing_file() {
        let err = HaConfig::from_file(Path::new("/nonexistent/vipguard.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn from_file_reads_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vipguard.toml");
        std::fs::write(&path, SECONDARY).unwrap();
        let config = HaConfig::from_file(&path).unwrap();
        assert_eq!(config.role, Role::Secondary);
    }

    #[test]
    fn parse_duration_units() {
        assert_eq!(parse_duration("5s"), Some(Duration::from_secs(5)));
        assert_eq!(parse_duration("500ms"), Some(Duration::from_millis(500)));
        assert_eq!(parse_duration("2m"), Some(Duration::from_secs(120)));
        assert_eq!(parse_duration("10"), Some(Duration::from_secs(10)));
        assert_eq!(parse_duration("soon"), None);
    }

    #[test]
    fn durations_round_trip_through_toml() {
        let config: HaConfig = PRIMARY.parse().unwrap();
        let rendered = toml::to_string(&config).unwrap();
        assert!(rendered.contains("watch_interval = \"500ms\""));
        assert!(rendered.contains("health_timeout = \"30s\""));
    }
}
