//! Tag blacklist filtering
//!
//! A post is blocked by a rule when the rule's tag is present AND none of
//! the rule's exception tags are present; it is blacklisted overall when
//! any rule blocks it. Rules are loaded from a JSON array whose entries
//! are either a bare tag string or a `[tag, [exception, ...]]` pair; both
//! shapes are normalized into [`BlacklistRule`] at load time.

use crate::error::{Error, Result};
use crate::models::Post;
use serde::Deserialize;
use std::collections::BTreeSet;
use std::path::Path;

/// A blacklist rule: one tag plus its exception tags
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "RuleShape")]
pub struct BlacklistRule {
    /// The tag that triggers the rule
    pub tag: String,

    /// Tags that neutralize the rule when present on the same post
    pub exceptions: BTreeSet<String>,
}

/// Raw config shapes accepted for a rule
#[derive(Deserialize)]
#[serde(untagged)]
enum RuleShape {
    /// Bare tag string, no exceptions
    Bare(String),
    /// `[tag, [exception, ...]]`
    WithExceptions(String, BTreeSet<String>),
}

impl From<RuleShape> for BlacklistRule {
    fn from(shape: RuleShape) -> Self {
        match shape {
            RuleShape::Bare(tag) => Self::new(tag),
            RuleShape::WithExceptions(tag, exceptions) => Self {
                tag,
                exceptions,
            },
        }
    }
}

impl BlacklistRule {
    /// Create a rule with no exceptions
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            exceptions: BTreeSet::new(),
        }
    }

    /// Create a rule with exception tags
    pub fn with_exceptions<I, S>(tag: impl Into<String>, exceptions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tag: tag.into(),
            exceptions: exceptions.into_iter().map(Into::into).collect(),
        }
    }

    /// Check whether this rule blocks the given tag set
    pub fn blocks(&self, tags: &BTreeSet<String>) -> bool {
        if !tags.contains(&self.tag) {
            return false;
        }
        !self.exceptions.iter().any(|e| tags.contains(e))
    }
}

/// Evaluates posts against an ordered list of blacklist rules
#[derive(Debug, Clone, Default)]
pub struct BlacklistFilter {
    rules: Vec<BlacklistRule>,
}

impl BlacklistFilter {
    /// Create a filter from rules
    pub fn new(rules: Vec<BlacklistRule>) -> Self {
        Self { rules }
    }

    /// Load rules from a JSON config file
    ///
    /// A missing file yields an empty filter; a malformed file is fatal.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::info!(path = %path.display(), "No blacklist file, filtering disabled");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        let rules: Vec<BlacklistRule> = serde_json::from_str(&content)
            .map_err(|e| Error::config(format!("cannot parse {}: {e}", path.display())))?;

        tracing::info!(path = %path.display(), rules = rules.len(), "Blacklist loaded");
        Ok(Self::new(rules))
    }

    /// Check whether any rule blocks the post
    pub fn is_blacklisted(&self, post: &Post) -> bool {
        self.rules.iter().any(|rule| rule.blocks(&post.tags))
    }

    /// Number of configured rules
    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }
}
