use serde::Deserialize;
use std::env;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::Error;

pub const DEFAULT_MAX_CONCURRENT: usize = 3;
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
const FILE_NAME: &str = ".jenkinsctl.toml";

#[derive(Deserialize, Clone, Debug, Default)]
pub struct Config {
    pub jenkins: Option<Jenkins>,
}

#[derive(Deserialize, Clone, Debug, Default)]
pub struct Jenkins {
    pub addr: Option<String>,
    pub user: Option<String>,
    pub token: Option<String>,
    pub max_concurrent: Option<usize>,
    pub timeout_secs: Option<u64>,
}

/// Validated connection settings for one Jenkins server.
#[derive(Clone)]
pub struct Connection {
    pub address: String,
    pub username: String,
    pub token: String,
    pub max_concurrent: usize,
    pub timeout: Duration,
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("address", &self.address)
            .field("username", &self.username)
            .field("token", &"***")
            .field("max_concurrent", &self.max_concurrent)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl Config {
    pub fn from(file: &Path) -> Result<Config, Error> {
        let config = fs::read_to_string(file)
            .map_err(|e| Error::InvalidConfig(format!("{}: {}", file.display(), e)))?;
        Config::parse(&config).map_err(|e| match e {
            Error::InvalidConfig(reason) => {
                Error::InvalidConfig(format!("{}: {}", file.display(), reason))
            }
            other => other,
        })
    }

    pub fn parse(config: &str) -> Result<Config, Error> {
        toml::from_str(config).map_err(|e| Error::InvalidConfig(e.to_string()))
    }

    /// Reads the configuration file, if any, then applies `JENKINS_*`
    /// environment overrides.
    pub fn load(explicit: Option<&str>) -> Result<(Config, Option<PathBuf>), Error> {
        let file = locate(explicit);
        let mut config = match &file {
            Some(path) => Config::from(path)?,
            None => Config::default(),
        };
        config.apply_env(|key| env::var(key).ok())?;
        Ok((config, file))
    }

    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let jenkins = self.jenkins.get_or_insert_with(Jenkins::default);
        if let Some(addr) = lookup("JENKINS_ADDR") {
            jenkins.addr = Some(addr);
        }
        if let Some(user) = lookup("JENKINS_USER") {
            jenkins.user = Some(user);
        }
        if let Some(token) = lookup("JENKINS_TOKEN") {
            jenkins.token = Some(token);
        }
        if let Some(max) = lookup("JENKINS_MAX_CONCURRENT") {
            let max = max.trim().parse().map_err(|_| {
                Error::InvalidConfig(format!("JENKINS_MAX_CONCURRENT is not a number: {}", max))
            })?;
            jenkins.max_concurrent = Some(max);
        }
        Ok(())
    }

    /// Checks that address, user and token are all present.
    pub fn connection(&self) -> Result<Connection, Error> {
        let jenkins = self.jenkins.clone().unwrap_or_default();
        let present = |value: Option<String>| value.filter(|v| !v.trim().is_empty());

        let address = present(jenkins.addr);
        let username = present(jenkins.user);
        let token = present(jenkins.token);

        let mut missing = Vec::new();
        if address.is_none() {
            missing.push("jenkins server address not defined");
        }
        if username.is_none() {
            missing.push("jenkins server username not defined");
        }
        if token.is_none() {
            missing.push("jenkins server token not defined");
        }

        match (address, username, token) {
            (Some(address), Some(username), Some(token)) => {
                let max_concurrent = jenkins.max_concurrent.unwrap_or(DEFAULT_MAX_CONCURRENT);
                if max_concurrent == 0 {
                    return Err(Error::InvalidConfig(
                        "max_concurrent must be at least 1".to_string(),
                    ));
                }
                Ok(Connection {
                    address,
                    username,
                    token,
                    max_concurrent,
                    timeout: Duration::from_secs(
                        jenkins.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS),
                    ),
                })
            }
            _ => Err(Error::ConfigMissing(missing)),
        }
    }
}

fn locate(explicit: Option<&str>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(PathBuf::from(path));
    }
    if let Ok(path) = env::var("JENKINSCTL_CONFIG") {
        return Some(PathBuf::from(path));
    }
    let candidates = [env::current_dir().ok(), dirs::home_dir()];
    candidates
        .into_iter()
        .flatten()
        .map(|dir| dir.join(FILE_NAME))
        .find(|path| path.is_file())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const FULL: &str = r#"
[jenkins]
addr = "https://ci.example.com"
user = "admin"
token = "0123abcd"
max_concurrent = 8
timeout_secs = 5
"#;

    #[test]
    fn reads_full_connection() {
        let connection = Config::parse(FULL).unwrap().connection().unwrap();

        assert_eq!(connection.address, "https://ci.example.com");
        assert_eq!(connection.username, "admin");
        assert_eq!(connection.token, "0123abcd");
        assert_eq!(connection.max_concurrent, 8);
        assert_eq!(connection.timeout, Duration::from_secs(5));
        assert!(!format!("{:?}", connection).contains("0123abcd"));
    }

    #[test]
    fn concurrency_defaults_to_three() {
        let config = Config::parse(
            "[jenkins]\naddr = \"http://localhost:8080\"\nuser = \"u\"\ntoken = \"t\"\n",
        )
        .unwrap();
        let connection = config.connection().unwrap();

        assert_eq!(connection.max_concurrent, DEFAULT_MAX_CONCURRENT);
        assert_eq!(connection.timeout, Duration::from_secs(DEFAULT_TIMEOUT_SECS));
    }

    #[test]
    fn reports_every_missing_field() {
        let err = Config::default().connection().unwrap_err();
        match err {
            Error::ConfigMissing(missing) => assert_eq!(missing.len(), 3),
            other => panic!("unexpected error: {other}"),
        }

        let partial = Config::parse("[jenkins]\naddr = \"http://ci\"\ntoken = \"  \"\n").unwrap();
        match partial.connection().unwrap_err() {
            Error::ConfigMissing(missing) => assert_eq!(
                missing,
                vec![
                    "jenkins server username not defined",
                    "jenkins server token not defined"
                ]
            ),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn rejects_zero_concurrency() {
        let config = Config::parse(
            "[jenkins]\naddr = \"http://ci\"\nuser = \"u\"\ntoken = \"t\"\nmax_concurrent = 0\n",
        )
        .unwrap();
        assert!(matches!(config.connection(), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn environment_overrides_file_values() {
        let env: HashMap<&str, &str> = [
            ("JENKINS_USER", "robot"),
            ("JENKINS_TOKEN", "secret"),
            ("JENKINS_MAX_CONCURRENT", "5"),
        ]
        .into_iter()
        .collect();
        let mut config = Config::parse(FULL).unwrap();

        config
            .apply_env(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();
        let connection = config.connection().unwrap();

        assert_eq!(connection.address, "https://ci.example.com");
        assert_eq!(connection.username, "robot");
        assert_eq!(connection.token, "secret");
        assert_eq!(connection.max_concurrent, 5);
    }

    #[test]
    fn environment_alone_is_enough() {
        let mut config = Config::default();
        config
            .apply_env(|key| match key {
                "JENKINS_ADDR" => Some("http://ci".to_string()),
                "JENKINS_USER" => Some("u".to_string()),
                "JENKINS_TOKEN" => Some("t".to_string()),
                _ => None,
            })
            .unwrap();
        assert!(config.connection().is_ok());
    }

    #[test]
    fn bad_concurrency_override_is_invalid() {
        let mut config = Config::default();
        let result = config.apply_env(|key| (key == "JENKINS_MAX_CONCURRENT").then(|| "lots".to_string()));
        assert!(matches!(result, Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn reads_config_file() {
        let dir = std::env::temp_dir().join(format!("jenkinsctl-config-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let good = dir.join("good.toml");
        let bad = dir.join("bad.toml");
        std::fs::write(&good, FULL).unwrap();
        std::fs::write(&bad, "[jenkins\naddr =").unwrap();

        let connection = Config::from(&good).unwrap().connection().unwrap();
        assert_eq!(connection.max_concurrent, 8);

        match Config::from(&bad) {
            Err(Error::InvalidConfig(reason)) => assert!(reason.contains("bad.toml")),
            other => panic!("unexpected result: {:?}", other.map(|_| ())),
        }
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn malformed_toml_is_invalid() {
        assert!(matches!(
            Config::parse("[jenkins\naddr ="),
            Err(Error::InvalidConfig(_))
        ));
    }
}
