//! Detection of AI command-line tools installed on `PATH`.

use std::sync::Arc;
use std::time::Duration;

use super::{CliAgent, SharedAgent};
use crate::qlog_debug;

/// How to invoke a well-known CLI non-interactively.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CliPreset {
    pub name: &'static str,
    pub command: &'static str,
    pub args: &'static [&'static str],
    pub stdin: bool,
}

impl CliPreset {
    pub fn into_agent(self, timeout: Duration) -> CliAgent {
        CliAgent::new(self.name, self.command)
            .with_args(self.args.iter().copied())
            .with_stdin(self.stdin)
            .with_timeout(timeout)
    }

    pub fn is_installed(&self) -> bool {
        which::which(self.command).is_ok()
    }
}

pub const DEFAULT_PRESETS: &[CliPreset] = &[
    CliPreset {
        name: "claude",
        command: "claude",
        args: &["-p"],
        stdin: true,
    },
    CliPreset {
        name: "gemini",
        command: "gemini",
        args: &["-p", "{prompt}"],
        stdin: false,
    },
    CliPreset {
        name: "codex",
        command: "codex",
        args: &["exec", "{prompt}"],
        stdin: false,
    },
];

/// Agents for every preset whose command resolves on `PATH`.
pub fn detect_cli_agents(presets: &[CliPreset], timeout: Duration) -> Vec<SharedAgent> {
    presets
        .iter()
        .filter(|preset| {
            let installed = preset.is_installed();
            qlog_debug!(
                "detect: {} ({}) installed={}",
                preset.name,
                preset.command,
                installed
            );
            installed
        })
        .map(|preset| Arc::new(preset.into_agent(timeout)) as SharedAgent)
        .collect()
}
