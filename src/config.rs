//! Configuration file loading and validation

use secrecy::{SecretSlice, SecretString};
use serde::Deserialize;
use std::fmt;
use std::fs;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Component, Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::error::{DeployerError, Result};
use crate::process::FailurePolicy;

pub const CONFIG_PATH_ENV: &str = "DEPLOY_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

const DEFAULT_LISTEN_IP: IpAddr = IpAddr::V4(Ipv4Addr::UNSPECIFIED);
const DEFAULT_LISTEN_PORT: u16 = 8080;
const DEFAULT_LISTEN_URL: &str = "/";
const DEFAULT_REPO_DIR: &str = "repo";
const DEFAULT_DEPLOY_DIR: &str = "deploy";
const DEFAULT_DEPLOY_NAME: &str = "www";
/// GitHub caps webhook payloads at 25MB
const DEFAULT_MAX_BODY_SIZE: usize = 25 * 1024 * 1024;
const DEFAULT_QUEUE_CAPACITY: usize = 32;

/// Supported static site generators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlogApp {
    Hugo,
    Jekyll,
    Hexo,
}

impl BlogApp {
    pub fn as_str(&self) -> &'static str {
        match self {
            BlogApp::Hugo => "hugo",
            BlogApp::Jekyll => "jekyll",
            BlogApp::Hexo => "hexo",
        }
    }

    /// Directory, relative to the repository root, where the generator writes its output.
    pub fn output_dir(&self) -> &'static str {
        match self {
            BlogApp::Hugo | BlogApp::Hexo => "public",
            BlogApp::Jekyll => "_site",
        }
    }

    /// Quiet, non-interactive invocation of the generator.
    pub fn default_command(&self) -> Vec<String> {
        let argv: &[&str] = match self {
            BlogApp::Hugo => &["hugo", "--quiet"],
            BlogApp::Hexo => &["hexo", "--silent", "g"],
            BlogApp::Jekyll => &["jekyll", "build", "-q"],
        };
        argv.iter().map(|s| s.to_string()).collect()
    }
}

impl FromStr for BlogApp {
    type Err = DeployerError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "hugo" => Ok(BlogApp::Hugo),
            "jekyll" => Ok(BlogApp::Jekyll),
            "hexo" => Ok(BlogApp::Hexo),
            other => Err(DeployerError::ConfigError(format!(
                "repo.blogApp must be one of hugo, jekyll, hexo (got '{}')",
                other
            ))),
        }
    }
}

impl fmt::Display for BlogApp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Logging options, paths already resolved.
#[derive(Debug, Clone, Default)]
pub struct LogConfig {
    pub dir: Option<PathBuf>,
    pub level: Option<String>,
}

/// Validated, immutable daemon configuration.
#[derive(Debug)]
pub struct DeployConfig {
    pub root_path: PathBuf,
    pub listen_ip: IpAddr,
    pub listen_port: u16,
    pub listen_url_path: String,
    pub max_body_size: usize,
    pub secret_key: SecretSlice<u8>,
    pub source_url: String,
    pub git_username: Option<String>,
    pub git_token: Option<SecretString>,
    pub blog_app: BlogApp,
    pub build_command: Option<Vec<String>>,
    pub repo_dir: PathBuf,
    pub deploy_dir: PathBuf,
    pub deploy_name: String,
    pub failure_policy: FailurePolicy,
    pub command_timeout: Option<Duration>,
    pub queue_capacity: usize,
    pub log: LogConfig,
}

impl DeployConfig {
    pub fn bind_address(&self) -> SocketAddr {
        SocketAddr::new(self.listen_ip, self.listen_port)
    }

    /// The live published directory, `deploy_dir/deploy_name`.
    pub fn deploy_target(&self) -> PathBuf {
        self.deploy_dir.join(&self.deploy_name)
    }

    pub fn build_output_dir(&self) -> PathBuf {
        self.repo_dir.join(self.blog_app.output_dir())
    }
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    listen: RawListen,
    repo: RawRepo,
    #[serde(default)]
    cycle: RawCycle,
    #[serde(default)]
    log: RawLog,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawListen {
    ip: Option<String>,
    port: Option<u16>,
    url: Option<String>,
    secret_key: String,
    max_body_size: Option<usize>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawRepo {
    source: String,
    username: Option<String>,
    token: Option<String>,
    blog_app: String,
    repo_dir: Option<String>,
    deploy_dir: Option<String>,
    deploy_name: Option<String>,
    build_command: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawCycle {
    failure_policy: Option<String>,
    command_timeout: Option<u64>,
    queue_capacity: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct RawLog {
    dir: Option<String>,
    level: Option<String>,
}

/// Returns the config path from `DEPLOY_CONFIG`, or the default file name.
pub fn config_path_from_env() -> PathBuf {
    std::env::var(CONFIG_PATH_ENV)
        .ok()
        .filter(|p| !p.is_empty())
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string())
        .into()
}

/// Load and validate the configuration file.
///
/// Relative paths in the file are anchored at the directory containing it.
pub fn load_config(path: impl AsRef<Path>) -> Result<DeployConfig> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path).map_err(|e| {
        DeployerError::ConfigError(format!(
            "Failed to read config file '{}': {}",
            path.display(),
            e
        ))
    })?;
    let absolute = fs::canonicalize(path).map_err(|e| {
        DeployerError::ConfigError(format!(
            "Failed to resolve config path '{}': {}",
            path.display(),
            e
        ))
    })?;
    let root = absolute
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("/"));

    parse_config(&contents, &root).map_err(|e| match e {
        DeployerError::ConfigError(msg) => {
            DeployerError::ConfigError(format!("{} ({})", msg, path.display()))
        }
        other => other,
    })
}

/// Parse configuration text, resolving paths against `root`.
pub fn parse_config(contents: &str, root: &Path) -> Result<DeployConfig> {
    let raw: RawConfig = toml::from_str(contents)
        .map_err(|e| DeployerError::ConfigError(format!("Failed to parse config: {}", e)))?;

    let listen_ip = match non_empty(raw.listen.ip) {
        Some(ip) => ip.parse::<IpAddr>().map_err(|e| {
            DeployerError::ConfigError(format!("listen.ip '{}' is invalid: {}", ip, e))
        })?,
        None => DEFAULT_LISTEN_IP,
    };
    let listen_port = raw
        .listen
        .port
        .filter(|p| *p != 0)
        .unwrap_or(DEFAULT_LISTEN_PORT);
    let listen_url_path =
        non_empty(raw.listen.url).unwrap_or_else(|| DEFAULT_LISTEN_URL.to_string());
    if !listen_url_path.starts_with('/') {
        return Err(DeployerError::ConfigError(format!(
            "listen.url must start with '/' (got '{}')",
            listen_url_path
        )));
    }
    if raw.listen.secret_key.is_empty() {
        return Err(DeployerError::ConfigError(
            "listen.secretKey must not be empty".to_string(),
        ));
    }

    let source_url = raw.repo.source.trim().to_string();
    if source_url.is_empty() {
        return Err(DeployerError::ConfigError(
            "repo.source must not be empty".to_string(),
        ));
    }
    let blog_app: BlogApp = raw.repo.blog_app.parse()?;

    let build_command = match raw.repo.build_command {
        Some(argv) if argv.is_empty() || argv[0].is_empty() => {
            return Err(DeployerError::ConfigError(
                "repo.buildCommand must name a program".to_string(),
            ));
        }
        other => other,
    };

    let deploy_name =
        non_empty(raw.repo.deploy_name).unwrap_or_else(|| DEFAULT_DEPLOY_NAME.to_string());
    let mut components = Path::new(&deploy_name).components();
    if !matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    ) {
        return Err(DeployerError::ConfigError(format!(
            "repo.deployName must be a plain directory name (got '{}')",
            deploy_name
        )));
    }

    let failure_policy = match non_empty(raw.cycle.failure_policy) {
        Some(policy) => policy.parse()?,
        None => FailurePolicy::default(),
    };

    Ok(DeployConfig {
        root_path: root.to_path_buf(),
        listen_ip,
        listen_port,
        listen_url_path,
        max_body_size: raw.listen.max_body_size.unwrap_or(DEFAULT_MAX_BODY_SIZE),
        secret_key: SecretSlice::from(raw.listen.secret_key.into_bytes()),
        source_url,
        git_username: non_empty(raw.repo.username),
        git_token: non_empty(raw.repo.token).map(SecretString::from),
        blog_app,
        build_command,
        repo_dir: root.join(non_empty(raw.repo.repo_dir).unwrap_or_else(|| DEFAULT_REPO_DIR.into())),
        deploy_dir: root
            .join(non_empty(raw.repo.deploy_dir).unwrap_or_else(|| DEFAULT_DEPLOY_DIR.into())),
        deploy_name,
        failure_policy,
        command_timeout: raw
            .cycle
            .command_timeout
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs),
        queue_capacity: raw
            .cycle
            .queue_capacity
            .filter(|n| *n > 0)
            .unwrap_or(DEFAULT_QUEUE_CAPACITY),
        log: LogConfig {
            dir: non_empty(raw.log.dir).map(|d| root.join(d)),
            level: non_empty(raw.log.level),
        },
    })
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}
