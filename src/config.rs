use anyhow::{Context, Result};
use clap::Parser;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::PathBuf;

const DEFAULT_PORT: u16 = 8080;
const DEFAULT_DB_NAME: &str = "bookshelf.db";
const DEFAULT_CONNECT_ATTEMPTS: u32 = 10;
const DEFAULT_RETRY_INTERVAL_SECONDS: u64 = 2;

#[derive(Parser, Debug)]
#[command(name = "bookshelf")]
#[command(about = "Runs the bookshelf reading tracker service", long_about = None)]
pub struct Cli {
    /// YAML config file; the environment is used when omitted
    #[arg(short = 'c', long = "config")]
    pub config_path: Option<String>,

    #[arg(short = 'p', long = "port")]
    pub port: Option<u16>,
}

pub fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".bookshelf")
}

#[derive(Debug, Deserialize, Clone)]
pub struct App {
    #[serde(default = "default_port")]
    port: u16,
}

impl Default for App {
    fn default() -> Self {
        App { port: DEFAULT_PORT }
    }
}

impl App {
    pub fn get_port(&self) -> u16 {
        self.port
    }
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_db_name() -> String {
    DEFAULT_DB_NAME.to_string()
}

fn default_connect_attempts() -> u32 {
    DEFAULT_CONNECT_ATTEMPTS
}

fn default_retry_interval() -> u64 {
    DEFAULT_RETRY_INTERVAL_SECONDS
}

#[derive(Debug, Deserialize, Clone)]
pub struct Database {
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default = "default_db_name")]
    pub name: String,
    #[serde(default = "default_connect_attempts")]
    pub connect_attempts: u32,
    #[serde(default = "default_retry_interval")]
    pub retry_interval_seconds: u64,
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
}

impl Default for Database {
    fn default() -> Self {
        Database {
            host: None,
            port: None,
            user: None,
            password: None,
            name: default_db_name(),
            connect_attempts: DEFAULT_CONNECT_ATTEMPTS,
            retry_interval_seconds: DEFAULT_RETRY_INTERVAL_SECONDS,
            data_dir: None,
        }
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

impl Database {
    /// An in-memory libsql database, used by tests.
    pub fn in_memory() -> Self {
        Database {
            name: ":memory:".to_string(),
            connect_attempts: 1,
            retry_interval_seconds: 0,
            ..Default::default()
        }
    }

    pub fn get_host(&self) -> Option<&str> {
        non_empty(&self.host)
    }

    pub fn get_user(&self) -> Option<&str> {
        non_empty(&self.user)
    }

    pub fn get_password(&self) -> Option<&str> {
        non_empty(&self.password)
    }

    pub fn get_name(&self) -> &str {
        &self.name
    }

    pub fn get_data_dir(&self) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(default_data_dir)
    }

    /// Remote server url, present when a host is configured.
    pub fn remote_url(&self) -> Option<String> {
        let host = self.get_host()?;
        let base = if host.contains("://") {
            host.to_string()
        } else {
            format!("http://{}", host)
        };
        Some(match self.port {
            Some(port) => format!("{}:{}", base, port),
            None => base,
        })
    }
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct Config {
    #[serde(default)]
    pub app: App,
    #[serde(default)]
    pub database: Database,
}

impl Config {
    /// Resolves configuration from the CLI: a YAML file when one is given,
    /// otherwise the process environment.
    pub fn load(cli: &Cli) -> Result<Self> {
        let mut cfg = match &cli.config_path {
            Some(path) => Config::new(path)?,
            None => Config::from_env()?,
        };
        if let Some(port) = cli.port {
            cfg.app.port = port;
        }
        Ok(cfg)
    }

    pub fn new(path: &str) -> Result<Self> {
        let yaml_str = fs::read_to_string(path).with_context(|| format!("failed to read config file {path}"))?;
        Config::from_yaml(&yaml_str, |name| env::var(name).ok())
    }

    pub fn from_env() -> Result<Self> {
        Config::from_lookup(|name| env::var(name).ok())
    }

    fn from_yaml(yaml_str: &str, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let yaml_with_env = substitute_env_vars(yaml_str, lookup);
        let config: Config = serde_yaml::from_str(&yaml_with_env).context("invalid config file")?;
        Ok(config)
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |name: &str| lookup(name).filter(|v| !v.is_empty());

        let app = App {
            port: parse_var(&var, "PORT")?.unwrap_or(DEFAULT_PORT),
        };

        let database = Database {
            host: var("DB_HOST"),
            port: parse_var(&var, "DB_PORT")?,
            user: var("DB_USER"),
            password: var("DB_PASSWORD"),
            name: var("DB_NAME").unwrap_or_else(default_db_name),
            connect_attempts: parse_var(&var, "DB_CONNECT_ATTEMPTS")?.unwrap_or(DEFAULT_CONNECT_ATTEMPTS),
            retry_interval_seconds: parse_var(&var, "DB_RETRY_INTERVAL_SECONDS")?
                .unwrap_or(DEFAULT_RETRY_INTERVAL_SECONDS),
            data_dir: var("BOOKSHELF_DATA_DIR").map(PathBuf::from),
        };

        Ok(Config { app, database })
    }
}

fn parse_var<T>(var: impl Fn(&str) -> Option<String>, name: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    var(name)
        .map(|v| v.parse::<T>().with_context(|| format!("invalid value for {name}: {v:?}")))
        .transpose()
}

/// Expands `${VAR}` and `${VAR:-default}` references in `input`.
fn substitute_env_vars(input: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    let mut result = input.to_string();
    let mut offset = 0;

    while let Some(start) = result[offset..].find("${") {
        let open = offset + start;
        let Some(len) = result[open..].find('}') else {
            break;
        };

        let expr = &result[open + 2..open + len];
        let value = match expr.split_once(":-") {
            Some((name, default)) => lookup(name).unwrap_or_else(|| default.to_string()),
            None => lookup(expr).unwrap_or_else(|| {
                tracing::warn!(var = expr, "environment variable referenced in config is not set");
                String::new()
            }),
        };

        result.replace_range(open..open + len + 1, &value);
        offset = open + value.len();
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_env_defaults() {
        let cfg = Config::from_lookup(vars(&[])).unwrap();
        assert_eq!(cfg.app.get_port(), 8080);
        assert_eq!(cfg.database.get_name(), "bookshelf.db");
        assert_eq!(cfg.database.connect_attempts, 10);
        assert_eq!(cfg.database.retry_interval_seconds, 2);
        assert_eq!(cfg.database.remote_url(), None);
    }

    #[test]
    fn test_env_remote_database() {
        let cfg = Config::from_lookup(vars(&[
            ("PORT", "9000"),
            ("DB_HOST", "db"),
            ("DB_PORT", "8081"),
            ("DB_USER", "reader"),
            ("DB_PASSWORD", "secret"),
            ("DB_NAME", "books"),
        ]))
        .unwrap();

        assert_eq!(cfg.app.get_port(), 9000);
        assert_eq!(cfg.database.remote_url().as_deref(), Some("http://db:8081"));
        assert_eq!(cfg.database.get_user(), Some("reader"));
        assert_eq!(cfg.database.get_password(), Some("secret"));
        assert_eq!(cfg.database.get_name(), "books");
    }

    #[test]
    fn test_env_rejects_non_numeric_port() {
        assert!(Config::from_lookup(vars(&[("PORT", "eighty")])).is_err());
        assert!(Config::from_lookup(vars(&[("DB_PORT", "x")])).is_err());
    }

    #[test]
    fn test_substitute_env_vars() {
        let lookup = vars(&[("DB_HOST", "localhost")]);
        assert_eq!(
            substitute_env_vars("host: ${DB_HOST}\nname: ${DB_NAME:-books.db}\nuser: ${DB_USER}", lookup),
            "host: localhost\nname: books.db\nuser: "
        );
    }

    #[test]
    fn test_yaml_config() {
        let yaml = r#"
app:
  port: 3000
database:
  host: ${DB_HOST:-}
  port: ${DB_PORT:-}
  name: ${DB_NAME:-reading.db}
  connect_attempts: 3
"#;
        let cfg = Config::from_yaml(yaml, vars(&[("DB_HOST", "https://books.example.com")])).unwrap();
        assert_eq!(cfg.app.get_port(), 3000);
        assert_eq!(cfg.database.remote_url().as_deref(), Some("https://books.example.com"));
        assert_eq!(cfg.database.get_name(), "reading.db");
        assert_eq!(cfg.database.connect_attempts, 3);
        assert_eq!(cfg.database.retry_interval_seconds, 2);
    }
}
