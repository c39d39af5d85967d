//! Findings produced by tool executions
//!
//! A closed sum type replaces the dynamic per-model dispatch of typical
//! scanner backends: every finding kind the engine understands is a
//! [`Finding`] variant, and all capabilities (input type, parent links,
//! filter matching, CLI value extraction) are exhaustive matches.
//!
//! Parent links are carried as lightweight reference structs so a finding
//! remains a self-contained value: a `Port` knows the id and address of its
//! `Host`, a `Vulnerability` the id and name of its `Technology`, which is
//! what correlation and CLI rendering need.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::base_input::{InputKeyword, ParsedValues};
use super::input_types::InputType;
use super::target::TargetType;

/// Operating system family reported for a host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HostOs {
    Linux,
    Windows,
    MacOs,
    Ios,
    Android,
    Solaris,
    FreeBsd,
    Other,
}

/// State of a discovered port
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PortStatus {
    Open,
    OpenFiltered,
    Filtered,
    Closed,
}

/// Transport protocol of a discovered port
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Protocol {
    Tcp,
    Udp,
}

/// Kind of path, depending on the protocol where it was found
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PathKind {
    Endpoint,
    Share,
}

impl PathKind {
    fn parse(value: &str) -> Option<PathKind> {
        match value.to_ascii_lowercase().as_str() {
            "endpoint" => Some(PathKind::Endpoint),
            "share" => Some(PathKind::Share),
            _ => None,
        }
    }
}

/// Vulnerability severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Severity {
    Info,
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    fn parse(value: &str) -> Option<Severity> {
        match value.to_ascii_lowercase().as_str() {
            "info" => Some(Severity::Info),
            "low" => Some(Severity::Low),
            "medium" => Some(Severity::Medium),
            "high" => Some(Severity::High),
            "critical" => Some(Severity::Critical),
            _ => None,
        }
    }
}

// ── Parent references ────────────────────────────────────────────────────

/// Reference to the host a finding hangs off
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostRef {
    pub id: Uuid,
    pub address: String,
}

/// Reference to the port a finding hangs off
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortRef {
    pub id: Uuid,
    pub port: u16,
    pub host: Option<HostRef>,
}

/// Reference to the technology a finding hangs off
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TechnologyRef {
    pub id: Uuid,
    pub name: String,
    pub version: Option<String>,
    pub port: Option<PortRef>,
}

/// Reference to the vulnerability an exploit targets
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VulnerabilityRef {
    pub id: Uuid,
    pub cve: Option<String>,
}

// ── Finding variants ─────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Host {
    pub id: Uuid,
    pub address: String,
    pub os_type: HostOs,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Port {
    pub id: Uuid,
    pub host: Option<HostRef>,
    pub port: u16,
    pub status: PortStatus,
    pub protocol: Option<Protocol>,
    pub service: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Path {
    pub id: Uuid,
    pub port: Option<PortRef>,
    pub path: String,
    pub status: Option<u16>,
    pub kind: PathKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Technology {
    pub id: Uuid,
    pub port: Option<PortRef>,
    pub name: String,
    pub version: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub id: Uuid,
    pub technology: Option<TechnologyRef>,
    pub email: Option<String>,
    pub username: Option<String>,
    pub secret: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vulnerability {
    pub id: Uuid,
    pub technology: Option<TechnologyRef>,
    pub port: Option<PortRef>,
    pub name: String,
    pub severity: Severity,
    pub cve: Option<String>,
    pub cwe: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exploit {
    pub id: Uuid,
    pub vulnerability: Option<VulnerabilityRef>,
    pub technology: Option<TechnologyRef>,
    pub title: String,
    pub edb_id: Option<u32>,
    pub reference: Option<String>,
}

/// Anything a tool run can discover
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Finding {
    Host(Host),
    Port(Port),
    Path(Path),
    Technology(Technology),
    Credential(Credential),
    Vulnerability(Vulnerability),
    Exploit(Exploit),
}

impl Finding {
    pub fn id(&self) -> Uuid {
        match self {
            Self::Host(f) => f.id,
            Self::Port(f) => f.id,
            Self::Path(f) => f.id,
            Self::Technology(f) => f.id,
            Self::Credential(f) => f.id,
            Self::Vulnerability(f) => f.id,
            Self::Exploit(f) => f.id,
        }
    }

    pub fn input_type(&self) -> InputType {
        match self {
            Self::Host(_) => InputType::Host,
            Self::Port(_) => InputType::Port,
            Self::Path(_) => InputType::Path,
            Self::Technology(_) => InputType::Technology,
            Self::Credential(_) => InputType::Credential,
            Self::Vulnerability(_) => InputType::Vulnerability,
            Self::Exploit(_) => InputType::Exploit,
        }
    }

    /// Id of the related object of the given type, if this finding links to one.
    pub fn related_id(&self, related_type: InputType) -> Option<Uuid> {
        match (self, related_type) {
            (Self::Port(f), InputType::Host) => f.host.as_ref().map(|h| h.id),
            (Self::Path(f), InputType::Port) => f.port.as_ref().map(|p| p.id),
            (Self::Technology(f), InputType::Port) => f.port.as_ref().map(|p| p.id),
            (Self::Credential(f), InputType::Technology) => {
                f.technology.as_ref().map(|t| t.id)
            }
            (Self::Vulnerability(f), InputType::Technology) => {
                f.technology.as_ref().map(|t| t.id)
            }
            (Self::Vulnerability(f), InputType::Port) => f.port.as_ref().map(|p| p.id),
            (Self::Exploit(f), InputType::Vulnerability) => {
                f.vulnerability.as_ref().map(|v| v.id)
            }
            (Self::Exploit(f), InputType::Technology) => f.technology.as_ref().map(|t| t.id),
            _ => None,
        }
    }

    /// Match a single filter term (negation already stripped by the caller).
    pub(crate) fn matches_term(&self, term: &str) -> bool {
        match self {
            Self::Host(f) => TargetType::classify(&f.address)
                .to_string()
                .eq_ignore_ascii_case(term),
            Self::Port(f) => match term.parse::<u16>() {
                Ok(number) => f.port == number,
                Err(_) => f
                    .service
                    .as_deref()
                    .is_some_and(|s| s.to_lowercase().contains(&term.to_lowercase())),
            },
            Self::Path(f) => {
                if let Some(kind) = PathKind::parse(term) {
                    return f.kind == kind;
                }
                if let Ok(status) = term.parse::<u16>() {
                    return f.status == Some(status);
                }
                f.path.to_lowercase().contains(&term.to_lowercase())
            }
            Self::Technology(f) => f.name.to_lowercase().contains(&term.to_lowercase()),
            Self::Vulnerability(f) => {
                if let Some(severity) = Severity::parse(term) {
                    return f.severity == severity;
                }
                if term.eq_ignore_ascii_case("cve") {
                    return f.cve.is_some();
                }
                let term = term.to_lowercase();
                f.cve.as_deref().is_some_and(|c| c.to_lowercase().contains(&term))
                    || f.cwe.as_deref().is_some_and(|c| c.to_lowercase().contains(&term))
            }
            // Credentials and exploits declare no filterable fields: a
            // non-empty filter never matches them.
            Self::Credential(_) | Self::Exploit(_) => false,
        }
    }

    /// Extract the CLI keyword values this finding contributes.
    ///
    /// `accumulated` carries values from earlier findings of the same type
    /// bound to a `multiple` argument (port lists, mainly).
    pub fn parse(&self, accumulated: &ParsedValues) -> ParsedValues {
        let mut output = ParsedValues::new();
        match self {
            Self::Host(f) => {
                output.insert(InputKeyword::Target, f.address.clone());
                output.insert(InputKeyword::Host, f.address.clone());
                output.insert(InputKeyword::Url, plain_url(&f.address, None, None));
            }
            Self::Port(f) => {
                output.accumulate_port(f.port, accumulated);
                if let Some(host) = &f.host {
                    output.insert(InputKeyword::Target, format!("{}:{}", host.address, f.port));
                    output.insert(InputKeyword::Host, host.address.clone());
                    output.insert(InputKeyword::Url, plain_url(&host.address, Some(f.port), None));
                }
            }
            Self::Path(f) => {
                let endpoint = clean_path(&f.path);
                if let Some(port) = &f.port {
                    output.accumulate_port(port.port, accumulated);
                    if let Some(host) = &port.host {
                        output.insert(
                            InputKeyword::Target,
                            format!("{}:{}", host.address, port.port),
                        );
                        output.insert(InputKeyword::Host, host.address.clone());
                        output.insert(
                            InputKeyword::Url,
                            plain_url(&host.address, Some(port.port), Some(&endpoint)),
                        );
                    }
                }
                output.insert(InputKeyword::Endpoint, endpoint);
            }
            Self::Technology(f) => {
                output.insert(InputKeyword::Technology, f.name.clone());
                if let Some(version) = &f.version {
                    output.insert(InputKeyword::Version, version.clone());
                }
                if let Some(port) = &f.port {
                    output.accumulate_port(port.port, accumulated);
                    if let Some(host) = &port.host {
                        output.insert(
                            InputKeyword::Target,
                            format!("{}:{}", host.address, port.port),
                        );
                        output.insert(InputKeyword::Host, host.address.clone());
                        output.insert(
                            InputKeyword::Url,
                            plain_url(&host.address, Some(port.port), None),
                        );
                    }
                }
            }
            Self::Credential(f) => {
                if let Some(technology) = &f.technology {
                    output.insert(InputKeyword::Technology, technology.name.clone());
                }
                for (keyword, value) in [
                    (InputKeyword::Email, &f.email),
                    (InputKeyword::Username, &f.username),
                    (InputKeyword::Secret, &f.secret),
                ] {
                    if let Some(value) = value {
                        output.insert(keyword, value.clone());
                    }
                }
            }
            Self::Vulnerability(f) => {
                if let Some(cve) = &f.cve {
                    output.insert(InputKeyword::Cve, cve.clone());
                }
                if let Some(technology) = &f.technology {
                    output.insert(InputKeyword::Technology, technology.name.clone());
                    if let Some(version) = &technology.version {
                        output.insert(InputKeyword::Version, version.clone());
                    }
                } else if let Some(port) = &f.port {
                    output.accumulate_port(port.port, accumulated);
                    if let Some(host) = &port.host {
                        output.insert(InputKeyword::Host, host.address.clone());
                    }
                }
            }
            Self::Exploit(f) => {
                output.insert(InputKeyword::Exploit, f.title.clone());
                if let Some(vulnerability) = &f.vulnerability {
                    if let Some(cve) = &vulnerability.cve {
                        output.insert(InputKeyword::Cve, cve.clone());
                    }
                }
                if let Some(technology) = &f.technology {
                    output.insert(InputKeyword::Technology, technology.name.clone());
                }
            }
        }
        output
    }
}

impl std::fmt::Display for Finding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Host(finding) => write!(f, "{}", finding.address),
            Self::Port(finding) => write!(f, "{}", finding.port),
            Self::Path(finding) => write!(f, "{}", finding.path),
            Self::Technology(finding) => write!(f, "{}", finding.name),
            Self::Credential(finding) => write!(
                f,
                "{}",
                finding
                    .username
                    .as_deref()
                    .or(finding.email.as_deref())
                    .unwrap_or("credential")
            ),
            Self::Vulnerability(finding) => write!(f, "{}", finding.name),
            Self::Exploit(finding) => write!(f, "{}", finding.title),
        }
    }
}

/// Normalize a path value for CLI usage: strip the leading slash.
pub(crate) fn clean_path(path: &str) -> String {
    path.trim_start_matches('/').to_string()
}

/// Build a plain URL without probing the target.
pub(crate) fn plain_url(host: &str, port: Option<u16>, endpoint: Option<&str>) -> String {
    let scheme = if port == Some(443) { "https" } else { "http" };
    let endpoint = endpoint.unwrap_or("");
    match port {
        Some(443) | Some(80) | None => format!("{scheme}://{host}/{endpoint}"),
        Some(port) => format!("{scheme}://{host}:{port}/{endpoint}"),
    }
}
