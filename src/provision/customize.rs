//! Prompt, helper functions and aliases for the interactive shell.

use super::context::Host;
use super::profile::{self, BlockChange, ManagedBlock};
use super::types::StepOutcome;
use crate::config::{CustomizationMode, ShellConfig};
use crate::error::Result;

pub const BLOCK_KEY: &str = "shell-customizations";

const CUSTOMIZATIONS: &str = r##"# Current git branch, empty outside a repository
git_branch() {
    git rev-parse --abbrev-ref HEAD 2>/dev/null
}

prompt_git() {
    local branch
    branch="$(git_branch)"
    [ -n "$branch" ] && printf ' (%s)' "$branch"
}

prompt_status() {
    local code=$?
    [ "$code" -ne 0 ] && printf '[%s] ' "$code"
    return 0
}

set_title() {
    printf '\033]0;%s\007' "$*"
}

# Stage everything and commit: gac "message"
gac() {
    if [ -z "$*" ]; then
        echo "usage: gac <message>" >&2
        return 1
    fi
    git add -A && git commit -m "$*"
}

PS1='\[\e[0;31m\]$(prompt_status)\[\e[1;32m\]\u@\h\[\e[0m\]:\[\e[1;34m\]\w\[\e[0;33m\]$(prompt_git)\[\e[0m\]\$ '
PROMPT_COMMAND='set_title "${PWD/#$HOME/\~}"'

alias ll='ls -alF'
alias la='ls -A'
alias ..='cd ..'
alias gs='git status -sb'
alias gd='git diff'
alias gl='git log --oneline --graph --decorate -20'"##;

pub fn customization_block() -> ManagedBlock {
    ManagedBlock::new(BLOCK_KEY, CUSTOMIZATIONS)
}

pub struct ShellCustomizer<'a> {
    host: &'a Host,
    config: &'a ShellConfig,
}

impl<'a> ShellCustomizer<'a> {
    pub fn new(host: &'a Host, config: &'a ShellConfig) -> Self {
        Self { host, config }
    }

    pub fn apply(&self) -> Result<StepOutcome> {
        let rc_file = self.host.expand(&self.config.rc_file);

        if let Some(backup) = profile::backup(&rc_file, chrono::Local::now())? {
            tracing::info!("Backed up {} to {}", rc_file.display(), backup.display());
        }

        let block = customization_block();
        let change = match self.config.mode {
            CustomizationMode::Managed => profile::upsert_block(&rc_file, &block)?,
            CustomizationMode::Append => profile::append_block(&rc_file, &block)?,
        };

        let detail = match change {
            BlockChange::Created => format!("created {}", rc_file.display()),
            BlockChange::Appended => format!("appended to {}", rc_file.display()),
            BlockChange::Replaced => format!("updated block in {}", rc_file.display()),
            BlockChange::Unchanged => format!("{} already customized", rc_file.display()),
        };
        tracing::info!("Shell customizations: {}", detail);

        Ok(if change.is_change() {
            StepOutcome::changed(detail)
        } else {
            StepOutcome::unchanged(detail)
        })
    }
}
