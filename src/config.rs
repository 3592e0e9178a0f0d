use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::agent::{detect_cli_agents, CliAgent, HttpAgent, SharedAgent, DEFAULT_PRESETS};
use crate::backup::DEFAULT_BACKUP_DIR;
use crate::util::expand_tilde;
use crate::{qlog_debug, qlog_warn, Error, Result};

const DEFAULT_API_KEY_ENV: &str = "ANTHROPIC_API_KEY";

fn default_request_timeout() -> u64 {
    120
}

fn default_evaluation_timeout() -> u64 {
    60
}

fn default_max_questions() -> usize {
    3
}

fn default_keep_backups() -> usize {
    10
}

fn default_api_key_env() -> String {
    DEFAULT_API_KEY_ENV.to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_evaluation_timeout")]
    pub evaluation_timeout_secs: u64,
    #[serde(default = "default_max_questions")]
    pub max_questions: usize,
    #[serde(default = "default_keep_backups")]
    pub keep_backups: usize,
    pub backup_dir: Option<String>,
    /// Explicit roster. Empty means auto-detect installed CLIs.
    #[serde(default)]
    pub agents: Vec<AgentSpec>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            request_timeout_secs: default_request_timeout(),
            evaluation_timeout_secs: default_evaluation_timeout(),
            max_questions: default_max_questions(),
            keep_backups: default_keep_backups(),
            backup_dir: None,
            agents: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum AgentSpec {
    Cli {
        name: String,
        command: String,
        #[serde(default)]
        args: Vec<String>,
        #[serde(default)]
        stdin: bool,
    },
    Http {
        name: String,
        model: String,
        #[serde(default = "default_api_key_env")]
        api_key_env: String,
        base_url: Option<String>,
        max_tokens: Option<u32>,
    },
}

impl AgentSpec {
    pub fn name(&self) -> &str {
        match self {
            AgentSpec::Cli { name, .. } | AgentSpec::Http { name, .. } => name,
        }
    }

    /// Build the agent. HTTP agents read their key from the environment.
    pub fn build(&self, timeout: Duration) -> Result<SharedAgent> {
        match self {
            AgentSpec::Cli {
                name,
                command,
                args,
                stdin,
            } => Ok(Arc::new(
                CliAgent::new(name, command)
                    .with_args(args.iter().cloned())
                    .with_stdin(*stdin)
                    .with_timeout(timeout),
            )),
            AgentSpec::Http {
                name,
                model,
                api_key_env,
                base_url,
                max_tokens,
            } => {
                let key = std::env::var(api_key_env).map_err(|_| {
                    Error::Validation(format!("{} is not set for agent '{}'", api_key_env, name))
                })?;
                let agent = match base_url {
                    Some(url) => HttpAgent::with_base_url(name, &key, model, url, timeout)?,
                    None => HttpAgent::new(name, &key, model, timeout)?,
                };
                let agent = match max_tokens {
                    Some(n) => agent.with_max_tokens(*n),
                    None => agent,
                };
                Ok(Arc::new(agent))
            }
        }
    }
}

impl Config {
    pub fn quorum_dir() -> Result<PathBuf> {
        Ok(dirs::home_dir().ok_or(Error::NoHomeDir)?.join(".quorum"))
    }

    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::quorum_dir()?.join("quorum.toml"))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn evaluation_timeout(&self) -> Duration {
        Duration::from_secs(self.evaluation_timeout_secs)
    }

    /// Where snapshots for `working_root` are stored.
    pub fn backup_root(&self, working_root: &Path) -> PathBuf {
        match &self.backup_dir {
            Some(dir) => expand_tilde(dir),
            None => working_root.join(DEFAULT_BACKUP_DIR),
        }
    }

    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        qlog_debug!("Config::load path={}", path.display());
        if !path.exists() {
            qlog_debug!("Config file not found, using defaults");
            return Ok(Self::default());
        }
        let config: Self = toml::from_str(&fs::read_to_string(path)?)?;
        qlog_debug!(
            "Config loaded: request_timeout={}s, evaluation_timeout={}s, agents={}",
            config.request_timeout_secs,
            config.evaluation_timeout_secs,
            config.agents.len()
        );
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        fs::write(path, toml::to_string_pretty(self)?)?;
        qlog_debug!("Config saved to {}", path.display());
        Ok(())
    }

    /// Resolve the roster. Configured agents that cannot be built are
    /// skipped with a warning; an empty list falls back to detection.
    pub fn build_agents(&self) -> Vec<SharedAgent> {
        let timeout = self.request_timeout();
        if self.agents.is_empty() {
            return detect_cli_agents(DEFAULT_PRESETS, timeout);
        }

        self.agents
            .iter()
            .filter_map(|spec| match spec.build(timeout) {
                Ok(agent) => Some(agent),
                Err(e) => {
                    qlog_warn!("Skipping agent '{}': {}", spec.name(), e);
                    None
                }
            })
            .collect()
    }
}
