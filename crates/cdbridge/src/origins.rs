//! Extension origins allowed to start the bridge.

use std::collections::BTreeSet;
use std::path::Path;

use crate::exit::{io_error, CliResult};

/// Origins compiled into the binary.
const BUILTIN: &str = include_str!("origins.txt");

/// Read-only set of allowed origins, loaded once at startup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AllowedOrigins {
    origins: BTreeSet<String>,
}

impl AllowedOrigins {
    /// Parse one origin per line, ignoring blank lines and `#` comments.
    pub fn parse(text: &str) -> Self {
        let origins = text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(str::to_string)
            .collect();
        Self { origins }
    }

    /// The compiled-in list.
    pub fn builtin() -> Self {
        Self::parse(BUILTIN)
    }

    /// Build the set from an optional replacement file plus extra origins.
    pub fn load(file: Option<&Path>, extra: &[String]) -> CliResult<Self> {
        let mut allowed = match file {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .map_err(|err| io_error(&format!("reading {}", path.display()), err))?;
                Self::parse(&text)
            }
            None => Self::builtin(),
        };
        allowed
            .origins
            .extend(extra.iter().map(|o| o.trim().to_string()).filter(|o| !o.is_empty()));
        Ok(allowed)
    }

    /// Exact, whole-string match.
    pub fn contains(&self, origin: &str) -> bool {
        self.origins.contains(origin)
    }

    pub fn is_empty(&self) -> bool {
        self.origins.is_empty()
    }

    /// Origins in sorted order, without duplicates.
    pub fn to_vec(&self) -> Vec<String> {
        self.origins.iter().cloned().collect()
    }
}
