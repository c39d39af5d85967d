//! Input type metadata
//!
//! Each kind of object that can be bound to a tool argument has an
//! [`InputType`] tag. Relations between types (a vulnerability affects a
//! technology, a port belongs to a host) are precomputed in a static table
//! instead of being derived from persistence metadata at runtime.

use serde::{Deserialize, Serialize};

/// Category of consumable data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InputType {
    Host,
    Port,
    Path,
    Technology,
    Credential,
    Vulnerability,
    Exploit,
    TargetPort,
    InputTechnology,
    InputVulnerability,
    Wordlist,
}

impl InputType {
    /// Input types this type is related to through a parent link.
    ///
    /// Ordering matters: correlation walks these in declaration order.
    pub fn related(&self) -> &'static [InputType] {
        match self {
            Self::Port => &[InputType::Host],
            Self::Path => &[InputType::Port],
            Self::Technology => &[InputType::Port],
            Self::Credential => &[InputType::Technology],
            Self::Vulnerability => &[InputType::Technology, InputType::Port],
            Self::Exploit => &[InputType::Vulnerability, InputType::Technology],
            Self::Host
            | Self::TargetPort
            | Self::InputTechnology
            | Self::InputVulnerability
            | Self::Wordlist => &[],
        }
    }

    /// The user-supplied type accepted in place of this one when no finding
    /// of this type is available during argument resolution.
    pub fn fallback(&self) -> Option<InputType> {
        match self {
            Self::Port => Some(InputType::TargetPort),
            Self::Technology => Some(InputType::InputTechnology),
            Self::Vulnerability => Some(InputType::InputVulnerability),
            _ => None,
        }
    }

    /// Whether the scan target itself can stand in for this type during
    /// argument resolution.
    pub fn accepts_target(&self) -> bool {
        matches!(self, Self::Host)
    }

    /// Whether objects of this type are produced by tool runs.
    pub fn is_finding(&self) -> bool {
        matches!(
            self,
            Self::Host
                | Self::Port
                | Self::Path
                | Self::Technology
                | Self::Credential
                | Self::Vulnerability
                | Self::Exploit
        )
    }
}

impl std::fmt::Display for InputType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Host => "Host",
            Self::Port => "Port",
            Self::Path => "Path",
            Self::Technology => "Technology",
            Self::Credential => "Credential",
            Self::Vulnerability => "Vulnerability",
            Self::Exploit => "Exploit",
            Self::TargetPort => "TargetPort",
            Self::InputTechnology => "InputTechnology",
            Self::InputVulnerability => "InputVulnerability",
            Self::Wordlist => "Wordlist",
        };
        write!(f, "{}", name)
    }
}
