//! The closed union of everything usable as a tool execution input
//!
//! [`BaseInput`] is the capability surface the scheduling engine works
//! against: input type lookup, filter-expression evaluation and CLI keyword
//! extraction. Filter expressions come from the argument catalog: a
//! disjunction separated by `" or "`, each term optionally negated with a
//! leading `!`, matched per concrete kind.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::findings::Finding;
use super::input_types::InputType;
use super::parameters::{InputTechnology, InputVulnerability, TargetPort, Wordlist};
use super::target::Target;
use super::tools::InputSpec;

/// Keywords a base input can contribute to command-line templates
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum InputKeyword {
    Target,
    Host,
    Port,
    Ports,
    PortsCommas,
    Url,
    Endpoint,
    Technology,
    Version,
    Cve,
    Exploit,
    Wordlist,
    Email,
    Username,
    Secret,
}

impl InputKeyword {
    /// The placeholder name used inside `{...}` templates.
    pub fn key(&self) -> &'static str {
        match self {
            Self::Target => "target",
            Self::Host => "host",
            Self::Port => "port",
            Self::Ports => "ports",
            Self::PortsCommas => "ports_commas",
            Self::Url => "url",
            Self::Endpoint => "endpoint",
            Self::Technology => "technology",
            Self::Version => "version",
            Self::Cve => "cve",
            Self::Exploit => "exploit",
            Self::Wordlist => "wordlist",
            Self::Email => "email",
            Self::Username => "username",
            Self::Secret => "secret",
        }
    }
}

/// Keyword values extracted from base inputs for template substitution
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedValues(BTreeMap<String, String>);

impl ParsedValues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, keyword: InputKeyword, value: String) {
        self.0.insert(keyword.key().to_string(), value);
    }

    pub fn get(&self, keyword: InputKeyword) -> Option<&str> {
        self.0.get(keyword.key()).map(String::as_str)
    }

    /// Lookup by raw placeholder name, for template rendering.
    pub fn lookup(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    /// Insert under a raw placeholder name (rendered argument values).
    pub fn insert_raw(&mut self, name: &str, value: String) {
        self.0.insert(name.to_string(), value);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Record a port, extending any port list already accumulated from
    /// previous inputs bound to the same `multiple` argument.
    pub fn accumulate_port(&mut self, port: u16, accumulated: &ParsedValues) {
        let ports = match accumulated.get(InputKeyword::Ports) {
            Some(previous) => format!("{} {}", previous, port),
            None => port.to_string(),
        };
        self.insert(InputKeyword::Port, port.to_string());
        self.insert(InputKeyword::PortsCommas, ports.replace(' ', ","));
        self.insert(InputKeyword::Ports, ports);
    }

    /// Merge `newer` over this map; newer values win.
    pub fn merge(&mut self, newer: ParsedValues) {
        self.0.extend(newer.0);
    }
}

/// Any object that can be supplied as an execution parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BaseInput {
    Finding(Finding),
    TargetPort(TargetPort),
    InputVulnerability(InputVulnerability),
    InputTechnology(InputTechnology),
    Wordlist(Wordlist),
}

impl BaseInput {
    pub fn id(&self) -> Uuid {
        match self {
            Self::Finding(finding) => finding.id(),
            Self::TargetPort(port) => port.id,
            Self::InputVulnerability(vulnerability) => vulnerability.id,
            Self::InputTechnology(technology) => technology.id,
            Self::Wordlist(wordlist) => wordlist.id,
        }
    }

    pub fn input_type(&self) -> InputType {
        match self {
            Self::Finding(finding) => finding.input_type(),
            Self::TargetPort(_) => InputType::TargetPort,
            Self::InputVulnerability(_) => InputType::InputVulnerability,
            Self::InputTechnology(_) => InputType::InputTechnology,
            Self::Wordlist(_) => InputType::Wordlist,
        }
    }

    /// Id of the related object of the given type, when one exists.
    /// Only findings carry relations.
    pub fn related_id(&self, related_type: InputType) -> Option<Uuid> {
        match self {
            Self::Finding(finding) => finding.related_id(related_type),
            _ => None,
        }
    }

    /// Evaluate an input's filter expression against this object.
    ///
    /// An absent or blank filter always matches.
    pub fn matches_filter(&self, spec: &InputSpec) -> bool {
        let Some(filter) = spec.filter.as_deref() else {
            return true;
        };
        if filter.trim().is_empty() {
            return true;
        }
        filter.split(" or ").any(|term| {
            let term = term.trim();
            let (negated, term) = match term.strip_prefix('!') {
                Some(rest) => (true, rest),
                None => (false, term),
            };
            negated != self.matches_term(term)
        })
    }

    fn matches_term(&self, term: &str) -> bool {
        match self {
            Self::Finding(finding) => finding.matches_term(term),
            Self::TargetPort(port) => port.matches_term(term),
            Self::InputVulnerability(vulnerability) => vulnerability.matches_term(term),
            Self::InputTechnology(technology) => technology.matches_term(term),
            Self::Wordlist(wordlist) => wordlist.matches_term(term),
        }
    }

    /// Extract the CLI keyword values this object contributes.
    pub fn parse(&self, target: &Target, accumulated: &ParsedValues) -> ParsedValues {
        match self {
            Self::Finding(finding) => finding.parse(accumulated),
            Self::TargetPort(port) => port.parse(&target.address, accumulated),
            Self::InputVulnerability(vulnerability) => vulnerability.parse(),
            Self::InputTechnology(technology) => technology.parse(),
            Self::Wordlist(wordlist) => wordlist.parse(),
        }
    }
}

/// The five pools of base inputs an execution can draw from, in their fixed
/// pool order: findings first, then the user-supplied parameter pools.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InputPools {
    pub findings: Vec<Finding>,
    pub target_ports: Vec<TargetPort>,
    pub input_vulnerabilities: Vec<InputVulnerability>,
    pub input_technologies: Vec<InputTechnology>,
    pub wordlists: Vec<Wordlist>,
}

impl InputPools {
    pub const POOL_COUNT: usize = 5;

    pub fn is_empty(&self) -> bool {
        self.findings.is_empty()
            && self.target_ports.is_empty()
            && self.input_vulnerabilities.is_empty()
            && self.input_technologies.is_empty()
            && self.wordlists.is_empty()
    }

    /// Append a base input to the pool it belongs to.
    pub fn push(&mut self, input: BaseInput) {
        match input {
            BaseInput::Finding(finding) => self.findings.push(finding),
            BaseInput::TargetPort(port) => self.target_ports.push(port),
            BaseInput::InputVulnerability(vulnerability) => {
                self.input_vulnerabilities.push(vulnerability)
            }
            BaseInput::InputTechnology(technology) => self.input_technologies.push(technology),
            BaseInput::Wordlist(wordlist) => self.wordlists.push(wordlist),
        }
    }

    /// The contents of one pool by index, as base inputs.
    pub fn pool(&self, index: usize) -> Vec<BaseInput> {
        match index {
            0 => self.findings.iter().cloned().map(BaseInput::from).collect(),
            1 => self
                .target_ports
                .iter()
                .cloned()
                .map(BaseInput::from)
                .collect(),
            2 => self
                .input_vulnerabilities
                .iter()
                .cloned()
                .map(BaseInput::from)
                .collect(),
            3 => self
                .input_technologies
                .iter()
                .cloned()
                .map(BaseInput::from)
                .collect(),
            4 => self.wordlists.iter().cloned().map(BaseInput::from).collect(),
            _ => Vec::new(),
        }
    }

    /// All base inputs across every pool, in pool order.
    pub fn iter_all(&self) -> impl Iterator<Item = BaseInput> + '_ {
        (0..Self::POOL_COUNT).flat_map(|index| self.pool(index))
    }
}

impl From<Finding> for BaseInput {
    fn from(finding: Finding) -> Self {
        Self::Finding(finding)
    }
}

impl From<TargetPort> for BaseInput {
    fn from(port: TargetPort) -> Self {
        Self::TargetPort(port)
    }
}

impl From<InputVulnerability> for BaseInput {
    fn from(vulnerability: InputVulnerability) -> Self {
        Self::InputVulnerability(vulnerability)
    }
}

impl From<InputTechnology> for BaseInput {
    fn from(technology: InputTechnology) -> Self {
        Self::InputTechnology(technology)
    }
}

impl From<Wordlist> for BaseInput {
    fn from(wordlist: Wordlist) -> Self {
        Self::Wordlist(wordlist)
    }
}
