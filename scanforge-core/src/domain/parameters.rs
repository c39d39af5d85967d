//! User-supplied execution parameters
//!
//! These are provided on the task (or its target) by the user instead of
//! being discovered by tools: ports to focus on, known technologies,
//! CVEs to check, and wordlists.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::base_input::{InputKeyword, ParsedValues};
use super::findings::clean_path;

/// A port the user asked to scan on the target
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetPort {
    pub id: Uuid,
    pub port: u16,
    pub path: Option<String>,
}

impl TargetPort {
    pub fn new(port: u16) -> Self {
        Self {
            id: Uuid::new_v4(),
            port,
            path: None,
        }
    }

    pub(crate) fn matches_term(&self, term: &str) -> bool {
        term.parse::<u16>().is_ok_and(|number| self.port == number)
    }

    pub fn parse(&self, target_address: &str, accumulated: &ParsedValues) -> ParsedValues {
        let mut output = ParsedValues::new();
        output.accumulate_port(self.port, accumulated);
        output.insert(InputKeyword::Target, format!("{}:{}", target_address, self.port));
        output.insert(InputKeyword::Host, target_address.to_string());
        if let Some(path) = &self.path {
            output.insert(InputKeyword::Endpoint, clean_path(path));
        }
        output
    }
}

/// A technology the user already knows runs on the target
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputTechnology {
    pub id: Uuid,
    pub name: String,
    pub version: Option<String>,
}

impl InputTechnology {
    pub fn new(name: impl Into<String>, version: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            version,
        }
    }

    pub(crate) fn matches_term(&self, term: &str) -> bool {
        self.name.to_lowercase().contains(&term.to_lowercase())
    }

    pub fn parse(&self) -> ParsedValues {
        let mut output = ParsedValues::new();
        output.insert(InputKeyword::Technology, self.name.clone());
        if let Some(version) = &self.version {
            output.insert(InputKeyword::Version, version.clone());
        }
        output
    }
}

/// A CVE the user wants checked against the target
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputVulnerability {
    pub id: Uuid,
    pub cve: String,
}

impl InputVulnerability {
    pub fn new(cve: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            cve: cve.into(),
        }
    }

    pub(crate) fn matches_term(&self, term: &str) -> bool {
        term.eq_ignore_ascii_case("cve") || self.cve.to_lowercase().contains(&term.to_lowercase())
    }

    pub fn parse(&self) -> ParsedValues {
        let mut output = ParsedValues::new();
        output.insert(InputKeyword::Cve, self.cve.clone());
        output
    }
}

/// Kind of wordlist
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WordlistKind {
    Endpoint,
    Subdomain,
    Password,
}

impl WordlistKind {
    fn parse(value: &str) -> Option<WordlistKind> {
        match value.to_ascii_lowercase().as_str() {
            "endpoint" => Some(WordlistKind::Endpoint),
            "subdomain" => Some(WordlistKind::Subdomain),
            "password" => Some(WordlistKind::Password),
            _ => None,
        }
    }
}

/// A wordlist file usable as tool input
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wordlist {
    pub id: Uuid,
    pub name: String,
    pub kind: WordlistKind,
    pub path: PathBuf,
}

impl Wordlist {
    pub fn new(name: impl Into<String>, kind: WordlistKind, path: impl Into<PathBuf>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            kind,
            path: path.into(),
        }
    }

    pub(crate) fn matches_term(&self, term: &str) -> bool {
        WordlistKind::parse(term).is_some_and(|kind| self.kind == kind)
    }

    pub fn parse(&self) -> ParsedValues {
        let mut output = ParsedValues::new();
        output.insert(InputKeyword::Wordlist, self.path.display().to_string());
        output
    }
}
