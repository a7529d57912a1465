//! Scripted runner for tests.
//!
//! Records every command line and answers from a list of rules. A rule
//! matches when its pattern is a substring of the rendered command; the first
//! matching rule wins. Replies are consumed in order and the last one repeats.
//! Commands with no matching rule succeed with empty output.

use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::Mutex;

use async_trait::async_trait;

use super::{CommandOutput, CommandRunner, CommandSpec};
use crate::error::Result;

struct Rule {
    pattern: String,
    replies: VecDeque<CommandOutput>,
}

#[derive(Default)]
pub struct ScriptedRunner {
    rules: Mutex<Vec<Rule>>,
    calls: Mutex<Vec<String>>,
    resolvable: Mutex<HashMap<String, PathBuf>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(&self, pattern: &str, output: CommandOutput) -> &Self {
        let mut rules = self.rules.lock().unwrap();
        match rules.iter_mut().find(|r| r.pattern == pattern) {
            Some(rule) => rule.replies.push_back(output),
            None => rules.push(Rule {
                pattern: pattern.to_string(),
                replies: VecDeque::from([output]),
            }),
        }
        self
    }

    pub fn ok(&self, pattern: &str, stdout: &str) -> &Self {
        self.on(
            pattern,
            CommandOutput {
                code: Some(0),
                stdout: stdout.to_string(),
                stderr: String::new(),
            },
        )
    }

    pub fn fail(&self, pattern: &str, code: i32, stderr: &str) -> &Self {
        self.on(
            pattern,
            CommandOutput {
                code: Some(code),
                stdout: String::new(),
                stderr: stderr.to_string(),
            },
        )
    }

    /// Make `program` resolvable on the fake search path.
    pub fn resolvable(&self, program: &str) -> &Self {
        self.resolvable
            .lock()
            .unwrap()
            .insert(program.to_string(), PathBuf::from("/usr/bin").join(program));
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, pattern: &str) -> usize {
        self.calls().iter().filter(|c| c.contains(pattern)).count()
    }

    pub fn position(&self, pattern: &str) -> Option<usize> {
        self.calls().iter().position(|c| c.contains(pattern))
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput> {
        let line = spec.to_string();
        self.calls.lock().unwrap().push(line.clone());

        let mut rules = self.rules.lock().unwrap();
        let reply = rules
            .iter_mut()
            .find(|r| line.contains(&r.pattern))
            .map(|rule| {
                if rule.replies.len() > 1 {
                    rule.replies.pop_front().unwrap_or_default()
                } else {
                    rule.replies.front().cloned().unwrap_or_default()
                }
            });

        Ok(reply.unwrap_or(CommandOutput {
            code: Some(0),
            stdout: String::new(),
            stderr: String::new(),
        }))
    }

    fn resolve(&self, program: &str) -> Option<PathBuf> {
        self.resolvable.lock().unwrap().get(program).cloned()
    }
}
