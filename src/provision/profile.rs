//! Managed blocks in user startup files.
//!
//! rigup owns a region of a file delimited by
//!
//! ```text
//! # >>> rigup:<key> >>>
//! ...
//! # <<< rigup:<key> <<<
//! ```
//!
//! The key is the idempotency marker: a block whose begin line is present is
//! never written twice. A block may also name a legacy marker, text that
//! shows the same configuration was added by hand or by older tooling.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::{DateTime, Local};

use crate::error::Result;

#[derive(Debug, Clone, PartialEq)]
pub struct ManagedBlock {
    pub key: String,
    pub legacy_marker: Option<String>,
    pub body: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockChange {
    /// The file did not exist and was created with the block.
    Created,
    Appended,
    /// An existing block was rewritten in place.
    Replaced,
    Unchanged,
}

impl BlockChange {
    pub fn is_change(&self) -> bool {
        !matches!(self, BlockChange::Unchanged)
    }
}

impl ManagedBlock {
    pub fn new(key: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            legacy_marker: None,
            body: body.into(),
        }
    }

    pub fn with_legacy_marker(mut self, marker: impl Into<String>) -> Self {
        self.legacy_marker = Some(marker.into());
        self
    }

    pub fn begin_line(&self) -> String {
        format!("# >>> rigup:{} >>>", self.key)
    }

    pub fn end_line(&self) -> String {
        format!("# <<< rigup:{} <<<", self.key)
    }

    pub fn render(&self) -> String {
        format!(
            "{}\n{}\n{}\n",
            self.begin_line(),
            self.body.trim_end_matches('\n'),
            self.end_line()
        )
    }

    pub fn is_present(&self, content: &str) -> bool {
        content.lines().any(|l| l.trim_end() == self.begin_line())
            || self
                .legacy_marker
                .as_deref()
                .is_some_and(|m| content.contains(m))
    }

    /// Number of copies of this block in `content`.
    pub fn occurrences(&self, content: &str) -> usize {
        let begin = self.begin_line();
        content.lines().filter(|l| l.trim_end() == begin).count()
    }

    /// Locate the first complete copy of the block.
    ///
    /// A begin line followed by another begin line before any end line is an
    /// orphan, and the later begin line starts the span.
    fn span(&self, content: &str) -> Span {
        let begin = self.begin_line();
        let end = self.end_line();

        let mut offset = 0;
        let mut start = None;
        for line in content.split_inclusive('\n') {
            let trimmed = line.trim_end();
            if trimmed == begin {
                start = Some(offset);
            } else if trimmed == end {
                if let Some(s) = start {
                    return Span::Complete(s, offset + line.len());
                }
            }
            offset += line.len();
        }

        match start {
            Some(_) => Span::Unterminated,
            None => Span::Absent,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Span {
    /// Byte range from the begin line through the end line.
    Complete(usize, usize),
    /// A begin line with no end line after it.
    Unterminated,
    Absent,
}

fn read_optional(path: &Path) -> Result<Option<String>> {
    if !path.exists() {
        return Ok(None);
    }
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    Ok(Some(content))
}

fn append_rendered(path: &Path, existing: Option<&str>, block: &ManagedBlock) -> Result<()> {
    let mut text = String::new();
    match existing {
        Some(content) if !content.is_empty() => {
            if !content.ends_with('\n') {
                text.push('\n');
            }
            text.push('\n');
        }
        _ => {}
    }
    text.push_str(&block.render());

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("opening {}", path.display()))?;
    file.write_all(text.as_bytes())
        .with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}

/// Append `block` unless it (or its legacy marker) is already in the file.
pub fn ensure_block(path: &Path, block: &ManagedBlock) -> Result<BlockChange> {
    let existing = read_optional(path)?;
    if let Some(ref content) = existing {
        if block.is_present(content) {
            return Ok(BlockChange::Unchanged);
        }
    }

    append_rendered(path, existing.as_deref(), block)?;
    Ok(if existing.is_some() {
        BlockChange::Appended
    } else {
        BlockChange::Created
    })
}

/// Replace the block in place if it exists, append it otherwise.
pub fn upsert_block(path: &Path, block: &ManagedBlock) -> Result<BlockChange> {
    let existing = read_optional(path)?;

    if let Some(ref content) = existing {
        match block.span(content) {
            Span::Complete(start, end) => {
                let rendered = block.render();
                if content[start..end] == rendered {
                    return Ok(BlockChange::Unchanged);
                }
                let updated = format!("{}{}{}", &content[..start], rendered, &content[end..]);
                std::fs::write(path, updated)
                    .with_context(|| format!("writing {}", path.display()))?;
                return Ok(BlockChange::Replaced);
            }
            Span::Unterminated => {
                tracing::warn!(
                    "{} has '{}' without a matching '{}'; leaving those lines alone and adding a new block",
                    path.display(),
                    block.begin_line(),
                    block.end_line()
                );
            }
            Span::Absent => {}
        }
    }

    append_rendered(path, existing.as_deref(), block)?;
    Ok(if existing.is_some() {
        BlockChange::Appended
    } else {
        BlockChange::Created
    })
}

/// Append `block` unconditionally.
pub fn append_block(path: &Path, block: &ManagedBlock) -> Result<BlockChange> {
    let existing = read_optional(path)?;
    append_rendered(path, existing.as_deref(), block)?;
    Ok(if existing.is_some() {
        BlockChange::Appended
    } else {
        BlockChange::Created
    })
}

/// Copy `path` to a timestamped sibling. Returns `None` when there is nothing to back up.
pub fn backup(path: &Path, now: DateTime<Local>) -> Result<Option<PathBuf>> {
    if !path.exists() {
        return Ok(None);
    }

    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "profile".to_string());
    let target = path.with_file_name(format!(
        "{}.rigup-backup-{}",
        name,
        now.format("%Y%m%d-%H%M%S")
    ));

    std::fs::copy(path, &target).with_context(|| {
        format!("backing up {} to {}", path.display(), target.display())
    })?;
    Ok(Some(target))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn block() -> ManagedBlock {
        ManagedBlock::new("rbenv", "eval \"$(rbenv init -)\"").with_legacy_marker("rbenv init")
    }

    #[test]
    fn test_render() {
        let block = ManagedBlock::new("aliases", "alias ll='ls -alF'\n");
        assert_eq!(
            block.render(),
            "# >>> rigup:aliases >>>\nalias ll='ls -alF'\n# <<< rigup:aliases <<<\n"
        );
    }

    #[test]
    fn test_ensure_creates_missing_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join(".zshrc");

        assert_eq!(ensure_block(&path, &block()).unwrap(), BlockChange::Created);
        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, block().render());
    }

    #[test]
    fn test_ensure_is_idempotent() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join(".bashrc");
        std::fs::write(&path, "export EDITOR=vim").unwrap();

        assert_eq!(ensure_block(&path, &block()).unwrap(), BlockChange::Appended);
        assert_eq!(ensure_block(&path, &block()).unwrap(), BlockChange::Unchanged);

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("export EDITOR=vim\n\n# >>> rigup:rbenv >>>"));
        assert_eq!(block().occurrences(&content), 1);
    }

    #[test]
    fn test_ensure_respects_legacy_marker() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join(".profile");
        let original = "export PATH=\"$HOME/.rbenv/bin:$PATH\"\neval \"$(rbenv init - bash)\"\n";
        std::fs::write(&path, original).unwrap();

        assert_eq!(ensure_block(&path, &block()).unwrap(), BlockChange::Unchanged);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), original);
    }

    #[test]
    fn test_upsert_replaces_in_place() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join(".bashrc");
        let old = ManagedBlock::new("shell", "alias gs='git status'");
        std::fs::write(&path, format!("# before\n{}# after\n", old.render())).unwrap();

        let new = ManagedBlock::new("shell", "alias gs='git status -sb'");
        assert_eq!(upsert_block(&path, &new).unwrap(), BlockChange::Replaced);
        assert_eq!(upsert_block(&path, &new).unwrap(), BlockChange::Unchanged);

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, format!("# before\n{}# after\n", new.render()));
    }

    #[test]
    fn test_upsert_keeps_lines_after_unterminated_block() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join(".bashrc");
        let original = "# >>> rigup:shell >>>\nalias a=b\nexport KEEP_ME=1\n";
        std::fs::write(&path, original).unwrap();

        let first = ManagedBlock::new("shell", "alias gs='git status'");
        assert_eq!(upsert_block(&path, &first).unwrap(), BlockChange::Appended);
        assert_eq!(upsert_block(&path, &first).unwrap(), BlockChange::Unchanged);

        let second = ManagedBlock::new("shell", "alias gs='git status -sb'");
        assert_eq!(upsert_block(&path, &second).unwrap(), BlockChange::Replaced);

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.starts_with(original));
        assert!(content.ends_with(&second.render()));
        assert!(!content.contains("alias gs='git status'\n"));
        assert_eq!(second.occurrences(&content), 2);
    }

    #[test]
    fn test_span_restarts_at_later_begin_line() {
        let block = ManagedBlock::new("shell", "alias ll='ls -alF'");
        let content = format!("# >>> rigup:shell >>>\nexport KEEP_ME=1\n{}", block.render());
        let start = content.find("export KEEP_ME=1\n").unwrap() + "export KEEP_ME=1\n".len();
        assert_eq!(block.span(&content), Span::Complete(start, content.len()));
        assert_eq!(block.span("# <<< rigup:shell <<<\n"), Span::Absent);
        assert_eq!(block.span("# >>> rigup:shell >>>\n"), Span::Unterminated);
    }

    #[test]
    fn test_append_always_appends() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join(".bashrc");
        let block = ManagedBlock::new("shell", "alias ll='ls -alF'");

        assert_eq!(append_block(&path, &block).unwrap(), BlockChange::Created);
        assert_eq!(append_block(&path, &block).unwrap(), BlockChange::Appended);

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(block.occurrences(&content), 2);
    }

    #[test]
    fn test_backup_copies_with_timestamp() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join(".bashrc");
        std::fs::write(&path, "alias ll='ls -l'\n").unwrap();

        let now = Local.with_ymd_and_hms(2026, 10, 19, 8, 30, 5).unwrap();
        let target = backup(&path, now).unwrap().unwrap();

        assert_eq!(
            target.file_name().unwrap().to_string_lossy(),
            ".bashrc.rigup-backup-20261019-083005"
        );
        assert_eq!(std::fs::read_to_string(target).unwrap(), "alias ll='ls -l'\n");
    }

    #[test]
    fn test_backup_missing_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let now = Local::now();
        assert!(backup(&temp_dir.path().join(".bashrc"), now).unwrap().is_none());
    }
}
