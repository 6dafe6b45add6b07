use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Deserializer, Serialize};

use crate::{NetAppProxy, PdiskError, StatusPolicy};

pub static DEFAULT_CONFIG_FILE: &str = "/opt/stratuslab/etc/persistent-disk-backend.yml";
pub static MAIN_SECTION: &str = "main";

static DEFAULT_LOG_FILE: &str = "/var/log/stratuslab-persistent-disk.log";
static DEFAULT_MGT_USER: &str = "root";

fn default_log_file() -> String {
    DEFAULT_LOG_FILE.to_string()
}

fn default_mgt_user() -> Option<String> {
    Some(DEFAULT_MGT_USER.to_string())
}

/// Any YAML scalar, kept as text.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Scalar {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl From<Scalar> for String {
    fn from(value: Scalar) -> Self {
        match value {
            Scalar::Str(s) => s,
            Scalar::Int(i) => i.to_string(),
            Scalar::Float(f) => f.to_string(),
            Scalar::Bool(b) => b.to_string(),
        }
    }
}

/// Reads an unquoted number or boolean as a string, e.g. `initiator_group: 1234`.
fn scalar<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Scalar>::deserialize(deserializer)?.map(String::from))
}

/// Backend configuration: a `main` section plus one section per iSCSI
/// proxy, keyed by the proxy host name.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    main: MainCfg,
    #[serde(flatten)]
    proxies: BTreeMap<String, ProxyCfg>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MainCfg {
    /// Empty disables file logging.
    #[serde(default = "default_log_file")]
    log_file: String,
    #[serde(default = "default_mgt_user", deserialize_with = "scalar")]
    mgt_user_name: Option<String>,
    #[serde(default, deserialize_with = "scalar")]
    mgt_user_private_key: Option<String>,
    /// Comma separated, only the first one is used.
    #[serde(default, deserialize_with = "scalar")]
    iscsi_proxies: Option<String>,
    /// Seconds, 0 disables the timeout.
    #[serde(default)]
    command_timeout: Option<u64>,
    #[serde(default)]
    status_policy: StatusPolicy,
}

impl Default for MainCfg {
    fn default() -> Self {
        MainCfg {
            log_file: default_log_file(),
            mgt_user_name: default_mgt_user(),
            mgt_user_private_key: None,
            iscsi_proxies: None,
            command_timeout: None,
            status_policy: StatusPolicy::default(),
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ProxyCfg {
    #[serde(default, rename = "type", deserialize_with = "scalar")]
    r#type: Option<String>,
    #[serde(default, deserialize_with = "scalar")]
    initiator_group: Option<String>,
    #[serde(default, deserialize_with = "scalar")]
    lun_namespace: Option<String>,
    #[serde(default, deserialize_with = "scalar")]
    volume_name: Option<String>,
    #[serde(default, deserialize_with = "scalar")]
    volume_snapshot_prefix: Option<String>,
    #[serde(default, deserialize_with = "scalar")]
    mgt_user_name: Option<String>,
    #[serde(default, deserialize_with = "scalar")]
    mgt_user_private_key: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendType {
    NetApp,
}

impl FromStr for BackendType {
    type Err = PdiskError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "netapp" => Ok(BackendType::NetApp),
            _ => Err(PdiskError::UnsupportedBackend(s.to_string())),
        }
    }
}

/// Validated settings of one proxy, every field non-empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxySettings {
    pub host: String,
    pub mgt_user: String,
    pub mgt_priv_key: String,
    /// Volume path, e.g. `/vol/iscsi`.
    pub volume: String,
    pub lun_namespace: String,
    pub initiator_group: String,
    pub snapshot_prefix: String,
}

impl Config {
    /// create `Config` from yaml string
    pub fn from(s: &str) -> Result<Config> {
        let config = serde_yml::from_str::<Config>(s)?;
        Ok(config)
    }

    /// create `Config` from yaml file
    pub fn read<S: AsRef<Path>>(filename: S) -> Result<Config> {
        let file = filename.as_ref().to_string_lossy().to_string();
        let s = fs::read_to_string(filename).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => PdiskError::ConfigMissing(file.clone()),
            _ => PdiskError::ConfigRead {
                file: file.clone(),
                e,
            },
        })?;

        let config =
            serde_yml::from_str::<Config>(&s).map_err(|e| PdiskError::ConfigParse { file, e })?;
        Ok(config)
    }

    pub fn log_file(&self) -> Option<PathBuf> {
        let log_file = self.main.log_file.trim();
        if log_file.is_empty() {
            None
        } else {
            Some(PathBuf::from(log_file))
        }
    }

    pub fn command_timeout(&self) -> Option<Duration> {
        self.main
            .command_timeout
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }

    pub fn status_policy(&self) -> StatusPolicy {
        self.main.status_policy
    }

    pub fn proxy_names(&self) -> Result<Vec<String>> {
        let names = self
            .main
            .iscsi_proxies
            .as_deref()
            .unwrap_or("")
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect::<Vec<String>>();

        if names.is_empty() {
            anyhow::bail!(PdiskError::MissingKey {
                section: MAIN_SECTION.to_string(),
                key: "iscsi_proxies".to_string(),
            })
        }

        Ok(names)
    }

    /// Settings of the first configured proxy.
    pub fn proxy_settings(&self) -> Result<(BackendType, ProxySettings)> {
        let names = self.proxy_names()?;
        let name = &names[0];
        let missing = |key: &str| PdiskError::MissingKey {
            section: name.to_string(),
            key: key.to_string(),
        };

        let section = self.proxies.get(name).ok_or_else(|| missing("type"))?;
        let backend = required(&section.r#type).ok_or_else(|| missing("type"))?;
        let backend = backend.parse::<BackendType>()?;

        let initiator_group =
            required(&section.initiator_group).ok_or_else(|| missing("initiator_group"))?;
        let lun_namespace =
            required(&section.lun_namespace).ok_or_else(|| missing("lun_namespace"))?;
        let volume = required(&section.volume_name).ok_or_else(|| missing("volume_name"))?;
        let snapshot_prefix = required(&section.volume_snapshot_prefix)
            .ok_or_else(|| missing("volume_snapshot_prefix"))?;

        let mgt_user = required(&section.mgt_user_name)
            .or_else(|| required(&self.main.mgt_user_name))
            .ok_or_else(|| missing("mgt_user_name"))?;
        let mgt_priv_key = required(&section.mgt_user_private_key)
            .or_else(|| required(&self.main.mgt_user_private_key))
            .ok_or_else(|| missing("mgt_user_private_key"))?;

        let settings = ProxySettings {
            host: name.to_string(),
            mgt_user,
            mgt_priv_key,
            volume,
            lun_namespace,
            initiator_group,
            snapshot_prefix,
        };

        Ok((backend, settings))
    }

    pub fn proxy(&self) -> Result<NetAppProxy> {
        let (backend, settings) = self.proxy_settings()?;
        match backend {
            BackendType::NetApp => Ok(NetAppProxy::new(&settings)),
        }
    }
}

fn required(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
}

#[cfg(test)]
mod test {
    use std::io::Write;
    use std::time::Duration;

    use anyhow::Result;

    use super::*;

    static FULL: &str = r#"
main:
  log_file: /tmp/pdisk.log
  mgt_user_private_key: /etc/stratuslab/filer.rsa
  iscsi_proxies: filer.example.org, filer2.example.org
  command_timeout: 120
  status_policy: first-failure
filer.example.org:
  type: NetApp
  initiator_group: linux_servers
  lun_namespace: stratuslab
  volume_name: /vol/iscsi
  volume_snapshot_prefix: pdisk_clone
  mgt_user_name: admin
"#;

    fn missing_key(err: &anyhow::Error) -> Option<(String, String)> {
        match err.downcast_ref::<PdiskError>() {
            Some(PdiskError::MissingKey { section, key }) => Some((section.clone(), key.clone())),
            _ => None,
        }
    }

    #[test]
    fn test_config_from_yaml() -> Result<()> {
        let config = Config::from(FULL)?;
        assert_eq!(config.log_file(), Some(PathBuf::from("/tmp/pdisk.log")));
        assert_eq!(config.command_timeout(), Some(Duration::from_secs(120)));
        assert_eq!(config.status_policy(), StatusPolicy::FirstFailure);
        assert_eq!(
            config.proxy_names()?,
            vec!["filer.example.org", "filer2.example.org"]
        );

        let (backend, settings) = config.proxy_settings()?;
        assert_eq!(backend, BackendType::NetApp);
        assert_eq!(settings.host, "filer.example.org");
        assert_eq!(settings.mgt_user, "admin");
        assert_eq!(settings.mgt_priv_key, "/etc/stratuslab/filer.rsa");
        assert_eq!(settings.volume, "/vol/iscsi");

        let proxy = config.proxy()?;
        assert_eq!(proxy.namespace(), "/vol/iscsi/stratuslab");
        Ok(())
    }

    #[test]
    fn defaults() -> Result<()> {
        let config = Config::from(
            r#"
main:
  mgt_user_private_key: /key
  iscsi_proxies: filer
filer:
  type: netapp
  initiator_group: g
  lun_namespace: ns
  volume_name: /vol/v
  volume_snapshot_prefix: p
"#,
        )?;
        assert_eq!(
            config.log_file(),
            Some(PathBuf::from("/var/log/stratuslab-persistent-disk.log"))
        );
        assert_eq!(config.command_timeout(), None);
        assert_eq!(config.status_policy(), StatusPolicy::LastWins);
        assert_eq!(config.proxy_settings()?.1.mgt_user, "root");
        Ok(())
    }

    #[test]
    fn missing_settings() -> Result<()> {
        let err = Config::from("main: {}")?.proxy().unwrap_err();
        assert_eq!(
            missing_key(&err),
            Some(("main".to_string(), "iscsi_proxies".to_string()))
        );

        let err = Config::from("main:\n  iscsi_proxies: filer\n")?
            .proxy()
            .unwrap_err();
        assert_eq!(
            missing_key(&err),
            Some(("filer".to_string(), "type".to_string()))
        );

        let err = Config::from(&FULL.replace("  lun_namespace: stratuslab\n", ""))?
            .proxy()
            .unwrap_err();
        assert_eq!(
            missing_key(&err),
            Some(("filer.example.org".to_string(), "lun_namespace".to_string()))
        );

        let err = Config::from(&FULL.replace("initiator_group: linux_servers", "initiator_group: ''"))?
            .proxy()
            .unwrap_err();
        assert_eq!(
            missing_key(&err),
            Some(("filer.example.org".to_string(), "initiator_group".to_string()))
        );

        let err = Config::from(&FULL.replace("  mgt_user_private_key: /etc/stratuslab/filer.rsa\n", ""))?
            .proxy()
            .unwrap_err();
        assert_eq!(
            missing_key(&err),
            Some((
                "filer.example.org".to_string(),
                "mgt_user_private_key".to_string()
            ))
        );
        Ok(())
    }

    #[test]
    fn numeric_values() -> Result<()> {
        let config = Config::from(
            &FULL
                .replace("initiator_group: linux_servers", "initiator_group: 1234")
                .replace("lun_namespace: stratuslab", "lun_namespace: 2.5")
                .replace("mgt_user_name: admin", "mgt_user_name: true"),
        )?;
        let (_, settings) = config.proxy_settings()?;
        assert_eq!(settings.initiator_group, "1234");
        assert_eq!(settings.lun_namespace, "2.5");
        assert_eq!(settings.mgt_user, "true");

        let config = Config::from(&FULL.replace("  mgt_user_name: admin\n", "  mgt_user_name:\n"))?;
        assert_eq!(config.proxy_settings()?.1.mgt_user, "root");
        Ok(())
    }

    #[test]
    fn unsupported_backend() -> Result<()> {
        let err = Config::from(&FULL.replace("type: NetApp", "type: EqualLogic"))?
            .proxy()
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PdiskError>(),
            Some(PdiskError::UnsupportedBackend(t)) if t == "EqualLogic"
        ));
        Ok(())
    }

    #[test]
    fn read_file() -> Result<()> {
        let path = std::env::temp_dir().join("pdisk-backend-test.yml");
        let mut file = fs::File::create(&path)?;
        file.write_all(FULL.as_bytes())?;
        let config = Config::read(&path)?;
        assert_eq!(config.proxy()?.host(), "filer.example.org");

        let err = Config::read("/nonexistent/pdisk.yml").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PdiskError>(),
            Some(PdiskError::ConfigMissing(_))
        ));
        Ok(())
    }
}
