//! Sender/receiver extraction from fax image filenames.

use std::path::Path;

use regex::{Regex, RegexBuilder};

use crate::error::{FaxError, Result};

/// Parties (and optional image format) derived from a filename
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FaxIdentity {
    pub sender: String,
    pub receiver: String,
    /// Third capture group if the pattern has one, otherwise the file extension
    pub format: String,
}

/// Operator-configured filename pattern
///
/// The pattern is matched case-insensitively against the final path component
/// and is anchored at its start. Group 1 is the sender, group 2 the receiver,
/// group 3 (optional) the format.
#[derive(Debug, Clone)]
pub struct FilenameParser {
    pattern: Regex,
}

impl FilenameParser {
    pub fn new(pattern: &str) -> Result<Self> {
        let anchored = format!("^(?:{})", pattern);
        let regex = RegexBuilder::new(&anchored)
            .case_insensitive(true)
            .build()
            .map_err(|e| FaxError::Config(format!("invalid filename pattern: {}", e)))?;

        // captures_len counts the implicit whole-match group
        if regex.captures_len() < 3 {
            return Err(FaxError::Config(format!(
                "filename pattern needs at least 2 capture groups (sender, receiver): {}",
                pattern
            )));
        }

        Ok(Self { pattern: regex })
    }

    /// Parse a path's filename. Non-matching names yield `None`.
    pub fn parse(&self, path: &Path) -> Option<FaxIdentity> {
        let filename = path.file_name()?.to_str()?;
        let caps = self.pattern.captures(filename)?;

        let sender = caps.get(1)?.as_str().to_string();
        let receiver = caps.get(2)?.as_str().to_string();
        let format = caps
            .get(3)
            .map(|m| m.as_str().to_lowercase())
            .or_else(|| {
                path.extension()
                    .and_then(|e| e.to_str())
                    .map(|e| e.to_lowercase())
            })
            .unwrap_or_default();

        log::debug!(
            "Parsed {}: sender={}, receiver={}, format={}",
            filename,
            sender,
            receiver,
            format
        );

        Some(FaxIdentity {
            sender,
            receiver,
            format,
        })
    }
}
