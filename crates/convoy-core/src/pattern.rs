//! Path matching for pattern/ignore lists.
//!
//! Each raw entry compiles to one of:
//! - `/body/flags`: a regular expression (`i`, `m`, `s` flags honoured)
//! - anything containing `*` or `?`: a glob
//! - anything else: a substring test

use anyhow::{bail, Context};
use globset::{GlobBuilder, GlobMatcher};
use regex::Regex;
use serde_json::Value;
use thiserror::Error;

use crate::container::Container;

#[derive(Debug, Error)]
pub enum PatternError {
    #[error("invalid regex: {0}")]
    Regex(#[from] regex::Error),

    #[error("invalid glob: {0}")]
    Glob(#[from] globset::Error),
}

/// One compiled pattern.
#[derive(Debug, Clone)]
pub enum Pattern {
    Substring(String),
    Regex(Regex),
    Glob(GlobMatcher),
}

impl Pattern {
    /// Compile a raw pattern string.
    pub fn parse(raw: &str) -> Result<Self, PatternError> {
        if let Some((body, flags)) = split_regex_literal(raw) {
            let mut prefix = String::new();
            for flag in flags.chars() {
                match flag {
                    'i' | 'm' | 's' => prefix.push(flag),
                    _ => {}
                }
            }
            let source = if prefix.is_empty() {
                body.to_string()
            } else {
                format!("(?{prefix}){body}")
            };
            return Ok(Pattern::Regex(Regex::new(&source)?));
        }

        if raw.contains('*') || raw.contains('?') {
            return compile_glob(raw).map(Pattern::Glob);
        }

        Ok(Pattern::Substring(raw.to_string()))
    }

    pub fn matches(&self, value: &str) -> bool {
        match self {
            Pattern::Substring(needle) => value.contains(needle.as_str()),
            Pattern::Regex(re) => re.is_match(value),
            Pattern::Glob(glob) => glob.is_match(value),
        }
    }
}

fn split_regex_literal(raw: &str) -> Option<(&str, &str)> {
    let rest = raw.strip_prefix('/')?;
    let end = rest.rfind('/')?;
    let (body, flags) = (&rest[..end], &rest[end + 1..]);
    if body.is_empty() || !flags.chars().all(|c| "gimsuy".contains(c)) {
        return None;
    }
    Some((body, flags))
}

/// Globs match from any path-segment start, so `*.js` also matches
/// `nested/a.js`; `*` and `?` never cross a `/`.
fn compile_glob(raw: &str) -> Result<GlobMatcher, PatternError> {
    let glob = raw.trim_start_matches("./");
    let anchored = if glob.starts_with("**/") {
        glob.to_string()
    } else {
        format!("**/{glob}")
    };
    let matcher = GlobBuilder::new(&anchored)
        .literal_separator(true)
        .build()?
        .compile_matcher();
    Ok(matcher)
}

/// An ordered list of patterns; matches when any entry matches.
#[derive(Debug, Clone, Default)]
pub struct PatternSet {
    patterns: Vec<Pattern>,
}

impl PatternSet {
    pub fn parse<I, S>(raw: I) -> Result<Self, PatternError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let patterns = raw
            .into_iter()
            .map(|p| Pattern::parse(p.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { patterns })
    }

    /// Compile a config value previously passed through [`PatternSet::normalize`].
    pub fn from_value(value: &Value) -> anyhow::Result<Self> {
        let raw = as_pattern_list(value)?;
        Self::parse(&raw).context("invalid pattern")
    }

    /// Validate a config value and normalise it to a list of pattern strings.
    ///
    /// Accepts `null`, a single string, or a list of strings.
    pub fn normalize(value: Value) -> anyhow::Result<Value> {
        let raw = as_pattern_list(&value)?;
        for entry in &raw {
            Pattern::parse(entry).with_context(|| format!("invalid pattern '{entry}'"))?;
        }
        Ok(Value::Array(raw.into_iter().map(Value::String).collect()))
    }

    pub fn matches(&self, value: &str) -> bool {
        self.patterns.iter().any(|p| p.matches(value))
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

fn as_pattern_list(value: &Value) -> anyhow::Result<Vec<String>> {
    match value {
        Value::Null => Ok(Vec::new()),
        Value::String(s) => Ok(vec![s.clone()]),
        Value::Array(items) => items
            .iter()
            .map(|item| match item {
                Value::String(s) => Ok(s.clone()),
                other => bail!("expected a pattern string, got {other}"),
            })
            .collect(),
        other => bail!("expected a pattern or a list of patterns, got {other}"),
    }
}

/// Accepts a path when some `pattern` entry matches and no `ignore` entry does.
#[derive(Debug, Clone, Default)]
pub struct AssetFilter {
    pattern: PatternSet,
    ignore: PatternSet,
}

impl AssetFilter {
    pub fn new(pattern: PatternSet, ignore: PatternSet) -> Self {
        Self { pattern, ignore }
    }

    /// Read the `pattern` and `ignore` entries of a container.
    pub fn from_container(container: &Container) -> anyhow::Result<Self> {
        let pattern = PatternSet::from_value(container.get("pattern").unwrap_or(&Value::Null))?;
        let ignore = PatternSet::from_value(container.get("ignore").unwrap_or(&Value::Null))?;
        Ok(Self::new(pattern, ignore))
    }

    pub fn accepts(&self, file: &str) -> bool {
        self.pattern.matches(file) && !self.ignore.matches(file)
    }
}
