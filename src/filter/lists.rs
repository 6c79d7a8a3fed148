//! Static allow/block lists
//!
//! Loaded once at startup, never reloaded. Files hold one entry per line
//! (`#` starts a comment) or a JSON array of strings.

use std::collections::HashSet;
use std::path::Path;
use tracing::{info, warn};

use crate::types::{Candidate, FilterReason};

#[derive(Debug, Clone, Default)]
pub struct AccessLists {
    allow: HashSet<String>,
    block: HashSet<String>,
}

impl AccessLists {
    pub fn new<A, B>(allow: A, block: B) -> Self
    where
        A: IntoIterator<Item = String>,
        B: IntoIterator<Item = String>,
    {
        Self {
            allow: allow.into_iter().filter(|s| !s.is_empty()).collect(),
            block: block.into_iter().filter(|s| !s.is_empty()).collect(),
        }
    }

    /// Load from files; a missing or unreadable file yields an empty list
    pub fn load_from_files(allow_path: Option<&str>, block_path: Option<&str>) -> Self {
        let lists = Self {
            allow: allow_path.map(read_entries).unwrap_or_default(),
            block: block_path.map(read_entries).unwrap_or_default(),
        };
        if !lists.is_empty() {
            info!(
                allow = lists.allow.len(),
                block = lists.block.len(),
                "loaded local allow/block lists"
            );
        }
        lists
    }

    pub fn is_allowed(&self, key: &str) -> bool {
        self.allow.contains(key)
    }

    pub fn is_blocked(&self, key: &str) -> bool {
        self.block.contains(key)
    }

    pub fn is_empty(&self) -> bool {
        self.allow.is_empty() && self.block.is_empty()
    }

    /// Gate-style check against mint or symbol.
    ///
    /// A non-empty allowlist admits only its members; the blocklist then
    /// rejects its members. `None` means no objection.
    pub fn check(&self, candidate: &Candidate) -> Option<FilterReason> {
        let matches = |set: &HashSet<String>| {
            set.contains(&candidate.mint) || set.contains(&candidate.symbol)
        };

        if !self.allow.is_empty() && !matches(&self.allow) {
            return Some(FilterReason::NotInAllowlist);
        }
        if !self.block.is_empty() && matches(&self.block) {
            return Some(FilterReason::InBlocklist);
        }
        None
    }

    /// (allow, block) sizes
    pub fn stats(&self) -> (usize, usize) {
        (self.allow.len(), self.block.len())
    }
}

fn read_entries<P: AsRef<Path>>(path: P) -> HashSet<String> {
    let path = path.as_ref();
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "could not read list file");
            return HashSet::new();
        }
    };
    parse_entries(&content)
}

fn parse_entries(content: &str) -> HashSet<String> {
    let trimmed = content.trim_start();
    if trimmed.starts_with('[') {
        match serde_json::from_str::<Vec<String>>(trimmed) {
            Ok(entries) => {
                return entries
                    .into_iter()
                    .map(|e| e.trim().to_string())
                    .filter(|e| !e.is_empty())
                    .collect()
            }
            Err(e) => warn!(error = %e, "list file looks like JSON but failed to parse"),
        }
    }

    content
        .lines()
        .map(|line| line.split('#').next().unwrap_or("").trim())
        .filter(|entry| !entry.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn candidate(mint: &str, symbol: &str) -> Candidate {
        let mut c = Candidate::from_ledger(mint.to_string(), 0);
        c.symbol = symbol.to_string();
        c
    }

    #[test]
    fn test_line_format_with_comments() {
        let entries = parse_entries("# header\nMINT1\n  MINT2  # trailing\n\n");
        assert_eq!(entries.len(), 2);
        assert!(entries.contains("MINT1"));
        assert!(entries.contains("MINT2"));
    }

    #[test]
    fn test_json_array_format() {
        let entries = parse_entries(r#"["A", "B", ""]"#);
        assert_eq!(entries.len(), 2);
    }

    #[test]
    fn test_load_from_files() {
        let mut allow = tempfile::NamedTempFile::new().unwrap();
        writeln!(allow, "GOOD").unwrap();
        let mut block = tempfile::NamedTempFile::new().unwrap();
        writeln!(block, "# scams\nBADMINT").unwrap();

        let lists = AccessLists::load_from_files(
            allow.path().to_str(),
            block.path().to_str(),
        );
        assert_eq!(lists.stats(), (1, 1));
        assert!(lists.is_blocked("BADMINT"));
    }

    #[test]
    fn test_missing_file_is_empty() {
        let lists = AccessLists::load_from_files(Some("/nonexistent/allow.txt"), None);
        assert!(lists.is_empty());
    }

    #[test]
    fn test_check_matches_mint_or_symbol() {
        let lists = AccessLists::new(vec![], vec!["BAD".to_string()]);
        assert_eq!(lists.check(&candidate("m1", "BAD")), Some(FilterReason::InBlocklist));
        assert_eq!(lists.check(&candidate("m1", "OK")), None);

        let lists = AccessLists::new(vec!["GOOD".to_string()], vec![]);
        assert_eq!(lists.check(&candidate("GOOD", "x")), None);
        assert_eq!(
            lists.check(&candidate("other", "x")),
            Some(FilterReason::NotInAllowlist)
        );
    }
}
