// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! `{placeholder}` substitution for endpoints and label values.
//!
//! The host supplies the substitution through the [`Placeholders`] trait.
//! [`Replacer`] is a ready-made implementation covering the process
//! environment, a few system values and explicitly registered variables.
//!
//! Syntax:
//! - `{key}` is replaced by the value of `key`
//! - `\{` and `\}` produce literal braces
//! - an opening brace without a closing one is kept literally

use crate::errors::PlaceholderError;
use std::collections::HashMap;
use std::env;
use tracing::warn;

/// Substitution hook used during validation and resolution.
pub trait Placeholders {
    /// Replaces every placeholder in `input`.
    ///
    /// With `err_on_unknown`, a key no provider recognizes is an error;
    /// otherwise it is kept verbatim. With `err_on_empty`, a key that
    /// resolves to an empty string is an error.
    fn replace_or_err(
        &self,
        input: &str,
        err_on_empty: bool,
        err_on_unknown: bool,
    ) -> Result<String, PlaceholderError>;
}

const ENV_PREFIX: &str = "env.";

/// Default [`Placeholders`] implementation.
///
/// Known keys, in lookup order:
/// - values registered with [`Replacer::set`]
/// - `env.NAME`: the environment variable `NAME`, empty when unset
/// - `system.hostname`, `system.os`, `system.arch`
#[derive(Debug, Clone, Default)]
pub struct Replacer {
    values: HashMap<String, String>,
}

impl Replacer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    fn lookup(&self, key: &str) -> Option<String> {
        if let Some(value) = self.values.get(key) {
            return Some(value.clone());
        }
        if let Some(name) = key.strip_prefix(ENV_PREFIX) {
            return Some(env::var(name).unwrap_or_default());
        }
        match key {
            "system.hostname" => Some(hostname()),
            "system.os" => Some(env::consts::OS.to_string()),
            "system.arch" => Some(env::consts::ARCH.to_string()),
            _ => None,
        }
    }
}

impl Placeholders for Replacer {
    fn replace_or_err(
        &self,
        input: &str,
        err_on_empty: bool,
        err_on_unknown: bool,
    ) -> Result<String, PlaceholderError> {
        let mut out = String::with_capacity(input.len());
        let mut rest = input;

        while let Some(pos) = rest.find(|c: char| matches!(c, '{' | '}' | '\\')) {
            out.push_str(&rest[..pos]);
            let tail = &rest[pos..];

            if let Some(escaped) = tail.strip_prefix('\\') {
                match escaped.chars().next() {
                    Some(c @ ('{' | '}')) => {
                        out.push(c);
                        rest = &escaped[1..];
                    }
                    _ => {
                        out.push('\\');
                        rest = escaped;
                    }
                }
                continue;
            }

            if tail.starts_with('}') {
                out.push('}');
                rest = &tail[1..];
                continue;
            }

            // tail starts with '{'
            let body = &tail[1..];
            let Some(end) = body.find('}') else {
                out.push_str(tail);
                rest = "";
                break;
            };
            let key = &body[..end];
            if key.is_empty() || key.contains('{') {
                out.push('{');
                rest = body;
                continue;
            }

            match self.lookup(key) {
                None if err_on_unknown => {
                    return Err(PlaceholderError::Unknown(key.to_string()));
                }
                None => out.push_str(&tail[..end + 2]),
                Some(value) if value.is_empty() && err_on_empty => {
                    return Err(PlaceholderError::Empty(key.to_string()));
                }
                Some(value) => out.push_str(&value),
            }
            rest = &body[end + 1..];
        }

        out.push_str(rest);
        Ok(out)
    }
}

/// `HOSTNAME` when exported, else the name reported by the OS.
fn hostname() -> String {
    if let Ok(hostname) = env::var("HOSTNAME") {
        if !hostname.is_empty() {
            return hostname;
        }
    }
    match hostname::get() {
        Ok(name) if !name.is_empty() => name.to_string_lossy().into_owned(),
        Ok(_) => {
            warn!("System hostname is empty, using 'unknown'");
            "unknown".to_string()
        }
        Err(e) => {
            warn!("Failed to get system hostname: {}", e);
            "unknown".to_string()
        }
    }
}
