//! Privilege escalation capability.
//!
//! System-wide mutations (package installs, keyring and source-list writes,
//! group changes) are the only commands that run elevated, and all of them
//! are wrapped here. Environment variables are passed through `env` so they
//! survive sudo's `env_reset`. Wrapped commands stay on rigup's terminal so
//! the escalator can ask for a password.

use super::CommandSpec;

#[derive(Debug, Clone)]
pub struct Privilege {
    escalator: String,
}

impl Privilege {
    pub fn new(escalator: impl Into<String>) -> Self {
        Self {
            escalator: escalator.into(),
        }
    }

    /// Rewrite `spec` so it runs through the escalation command.
    pub fn wrap(&self, spec: CommandSpec) -> CommandSpec {
        let CommandSpec {
            program,
            args,
            env,
            stream,
            timeout,
            ..
        } = spec;

        let mut wrapped_args = Vec::with_capacity(args.len() + env.len() + 2);
        if !env.is_empty() {
            wrapped_args.push("env".to_string());
            wrapped_args.extend(env.into_iter().map(|(k, v)| format!("{}={}", k, v)));
        }
        wrapped_args.push(program);
        wrapped_args.extend(args);

        let wrapped = CommandSpec {
            program: self.escalator.clone(),
            args: wrapped_args,
            env: Vec::new(),
            stream,
            timeout,
            terminal: true,
        };

        tracing::debug!(target: "rigup::privilege", command = %wrapped, "privileged operation");
        wrapped
    }
}

impl Default for Privilege {
    fn default() -> Self {
        Self::new("sudo")
    }
}
