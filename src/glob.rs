//! Glob patterns over topic names and handler spec ids.
//!
//! `*` matches any run of characters (including none), `?` matches exactly one
//! character, everything else matches literally and case-sensitively. The empty
//! pattern matches every name.

use std::collections::HashMap;
use std::sync::{OnceLock, RwLock};

use regex::Regex;

use crate::error::{AlertError, AlertResult, ValidationError};

const GLOB_CACHE_MAX: usize = 1024;

static GLOB_CACHE: OnceLock<RwLock<HashMap<String, Regex>>> = OnceLock::new();

/// A compiled glob pattern.
#[derive(Debug, Clone)]
pub struct Glob {
    re: Option<Regex>,
}

impl Glob {
    /// Compiles `pattern`, reusing a cached regex when possible.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the translated pattern does not compile.
    pub fn new(pattern: &str) -> AlertResult<Self> {
        if pattern.is_empty() {
            return Ok(Self { re: None });
        }
        Ok(Self {
            re: Some(cached_regex(pattern)?),
        })
    }

    /// Whether `name` matches the pattern.
    #[must_use]
    pub fn matches(&self, name: &str) -> bool {
        self.re.as_ref().map_or(true, |re| re.is_match(name))
    }
}

fn translate(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len() + 8);
    out.push_str("^(?s:");
    let mut buf = [0u8; 4];
    for c in pattern.chars() {
        match c {
            '*' => out.push_str(".*"),
            '?' => out.push('.'),
            other => out.push_str(&regex::escape(other.encode_utf8(&mut buf))),
        }
    }
    out.push_str(")$");
    out
}

fn cached_regex(pattern: &str) -> AlertResult<Regex> {
    let cache = GLOB_CACHE.get_or_init(|| RwLock::new(HashMap::new()));

    {
        let guard = cache
            .read()
            .map_err(|_| AlertError::internal("glob cache lock poisoned"))?;
        if let Some(re) = guard.get(pattern) {
            return Ok(re.clone());
        }
    }

    let compiled = Regex::new(&translate(pattern)).map_err(|e| {
        AlertError::Validation(ValidationError::InvalidPattern {
            pattern: pattern.to_string(),
            reason: e.to_string(),
        })
    })?;

    let mut guard = cache
        .write()
        .map_err(|_| AlertError::internal("glob cache lock poisoned"))?;
    if guard.len() >= GLOB_CACHE_MAX {
        guard.clear();
    }
    guard
        .entry(pattern.to_string())
        .or_insert_with(|| compiled.clone());
    Ok(compiled)
}
