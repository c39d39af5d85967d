//! Shared fixtures: a realistic fake tool catalog (port scanner →
//! directory buster → aggregator chain) plus scripted runner/parser
//! doubles, so no real subprocess or parser is needed.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use scanforge_core::domain::{
    Argument, Configuration, Finding, HostRef, InputSpec, InputType, Intensity, IntensityRank,
    PathKind, PortRef, PortStatus, Protocol, Severity, Stage, TechnologyRef, Tool,
};
use scanforge_orchestrator::domain::entities::{Process, Step};
use scanforge_orchestrator::domain::services::{OutputParser, RunOutcome, ToolRunner};

// ── Tool catalog ─────────────────────────────────────────────────────────

pub fn intensities_all() -> Vec<Intensity> {
    vec![
        Intensity {
            value: IntensityRank::Sneaky,
            argument: String::new(),
        },
        Intensity {
            value: IntensityRank::Normal,
            argument: "-fast".into(),
        },
        Intensity {
            value: IntensityRank::Insane,
            argument: "-aggressive".into(),
        },
    ]
}

pub fn configuration_for(tool: &Tool, stage: Stage, template: &str, outputs: Vec<InputType>) -> Configuration {
    Configuration {
        id: Uuid::new_v4(),
        tool_id: tool.id,
        name: "default".into(),
        stage,
        arguments_template: template.into(),
        outputs,
        default: true,
    }
}

/// Nmap-like port scanner: takes the target (host), batches known ports,
/// produces hosts and ports.
pub fn port_scanner() -> (Arc<Tool>, Arc<Configuration>) {
    let tool = Tool {
        id: Uuid::new_v4(),
        name: "portscan".into(),
        command: "portscan".into(),
        output_format: None,
        intensities: intensities_all(),
        arguments: vec![
            Argument {
                name: "host".into(),
                template: "{host}".into(),
                required: true,
                multiple: false,
                inputs: vec![InputSpec {
                    input_type: InputType::Host,
                    filter: None,
                    order: 1,
                }],
            },
            Argument {
                name: "ports".into(),
                template: "-p {ports_commas}".into(),
                required: false,
                multiple: true,
                inputs: vec![InputSpec {
                    input_type: InputType::Port,
                    filter: None,
                    order: 1,
                }],
            },
        ],
    };
    let configuration = configuration_for(
        &tool,
        Stage::Enumeration,
        "{command} {intensity} {ports} {host}",
        vec![InputType::Host, InputType::Port],
    );
    (Arc::new(tool), Arc::new(configuration))
}

/// Gobuster-like directory buster: one URL per run (non-multiple port
/// input), optional wordlist, produces paths.
pub fn dir_buster() -> (Arc<Tool>, Arc<Configuration>) {
    let tool = Tool {
        id: Uuid::new_v4(),
        name: "dirbust".into(),
        command: "dirbust".into(),
        output_format: None,
        intensities: intensities_all(),
        arguments: vec![
            Argument {
                name: "url".into(),
                template: "-u {host}:{port}".into(),
                required: true,
                multiple: false,
                inputs: vec![
                    InputSpec {
                        input_type: InputType::Port,
                        filter: None,
                        order: 1,
                    },
                    InputSpec {
                        input_type: InputType::TargetPort,
                        filter: None,
                        order: 2,
                    },
                ],
            },
            Argument {
                name: "wordlist".into(),
                template: "-w {wordlist}".into(),
                required: false,
                multiple: false,
                inputs: vec![InputSpec {
                    input_type: InputType::Wordlist,
                    filter: Some("endpoint".into()),
                    order: 1,
                }],
            },
        ],
    };
    let configuration = configuration_for(
        &tool,
        Stage::Services,
        "{command} {intensity} {url} {wordlist}",
        vec![InputType::Path],
    );
    (Arc::new(tool), Arc::new(configuration))
}

/// Report aggregation step: batches every discovered path.
pub fn aggregator() -> (Arc<Tool>, Arc<Configuration>) {
    let tool = Tool {
        id: Uuid::new_v4(),
        name: "aggregate".into(),
        command: "aggregate".into(),
        output_format: None,
        intensities: intensities_all(),
        arguments: vec![Argument {
            name: "paths".into(),
            template: "{endpoint}".into(),
            required: false,
            multiple: true,
            inputs: vec![InputSpec {
                input_type: InputType::Path,
                filter: None,
                order: 1,
            }],
        }],
    };
    let configuration = configuration_for(
        &tool,
        Stage::Exploitation,
        "{command} {paths}",
        Vec::new(),
    );
    (Arc::new(tool), Arc::new(configuration))
}

/// Exploit-search tool only defined for Hard intensity and above.
pub fn hard_only_tool() -> (Arc<Tool>, Arc<Configuration>) {
    let tool = Tool {
        id: Uuid::new_v4(),
        name: "exploitsearch".into(),
        command: "exploitsearch".into(),
        output_format: None,
        intensities: vec![Intensity {
            value: IntensityRank::Hard,
            argument: String::new(),
        }],
        arguments: vec![Argument {
            name: "technology".into(),
            template: "{technology}".into(),
            required: false,
            multiple: false,
            inputs: vec![InputSpec {
                input_type: InputType::Technology,
                filter: None,
                order: 1,
            }],
        }],
    };
    let configuration = configuration_for(
        &tool,
        Stage::Exploitation,
        "{command} {technology}",
        Vec::new(),
    );
    (Arc::new(tool), Arc::new(configuration))
}

pub fn step(tool: &Arc<Tool>, configuration: &Arc<Configuration>, priority: u32) -> Step {
    Step {
        id: Uuid::new_v4(),
        tool: tool.clone(),
        configuration: configuration.clone(),
        priority,
    }
}

/// The standard three-stage pipeline: port scan → directory bust → aggregate.
pub fn scan_process() -> (Process, Vec<(Arc<Tool>, Arc<Configuration>)>) {
    let scanner = port_scanner();
    let buster = dir_buster();
    let report = aggregator();
    let process = Process {
        id: Uuid::new_v4(),
        name: "web-discovery".into(),
        steps: vec![
            step(&scanner.0, &scanner.1, 1),
            step(&buster.0, &buster.1, 1),
            step(&report.0, &report.1, 1),
        ],
    };
    (process, vec![scanner, buster, report])
}

// ── Finding constructors ─────────────────────────────────────────────────

pub fn host(address: &str) -> Finding {
    Finding::Host(scanforge_core::domain::findings::Host {
        id: Uuid::new_v4(),
        address: address.into(),
        os_type: scanforge_core::domain::HostOs::Linux,
    })
}

pub fn port(host_finding: Option<&Finding>, number: u16, service: Option<&str>) -> Finding {
    let host_ref = host_finding.map(|finding| match finding {
        Finding::Host(h) => HostRef {
            id: h.id,
            address: h.address.clone(),
        },
        _ => panic!("expected a host finding"),
    });
    Finding::Port(scanforge_core::domain::findings::Port {
        id: Uuid::new_v4(),
        host: host_ref,
        port: number,
        status: PortStatus::Open,
        protocol: Some(Protocol::Tcp),
        service: service.map(str::to_string),
    })
}

pub fn port_ref(finding: &Finding) -> PortRef {
    match finding {
        Finding::Port(p) => PortRef {
            id: p.id,
            port: p.port,
            host: p.host.clone(),
        },
        _ => panic!("expected a port finding"),
    }
}

pub fn technology(port_finding: Option<&Finding>, name: &str) -> Finding {
    Finding::Technology(scanforge_core::domain::findings::Technology {
        id: Uuid::new_v4(),
        port: port_finding.map(port_ref),
        name: name.into(),
        version: None,
    })
}

pub fn technology_ref(finding: &Finding) -> TechnologyRef {
    match finding {
        Finding::Technology(t) => TechnologyRef {
            id: t.id,
            name: t.name.clone(),
            version: t.version.clone(),
            port: t.port.clone(),
        },
        _ => panic!("expected a technology finding"),
    }
}

pub fn vulnerability(technology_finding: Option<&Finding>, name: &str, cve: &str) -> Finding {
    Finding::Vulnerability(scanforge_core::domain::findings::Vulnerability {
        id: Uuid::new_v4(),
        technology: technology_finding.map(technology_ref),
        port: None,
        name: name.into(),
        severity: Severity::High,
        cve: Some(cve.into()),
        cwe: None,
    })
}

pub fn path(port_finding: Option<&Finding>, value: &str) -> Finding {
    Finding::Path(scanforge_core::domain::findings::Path {
        id: Uuid::new_v4(),
        port: port_finding.map(port_ref),
        path: value.into(),
        status: Some(200),
        kind: PathKind::Endpoint,
    })
}

// ── Test doubles ─────────────────────────────────────────────────────────

/// Runner double: records every invocation in order, succeeds with a canned
/// stdout, and can be told to block a given tool until its job receives the
/// stop signal.
pub struct ScriptedRunner {
    pub log: StdMutex<Vec<(String, Vec<String>)>>,
    pub block_tool: Option<String>,
}

impl ScriptedRunner {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            log: StdMutex::new(Vec::new()),
            block_tool: None,
        })
    }

    pub fn blocking_on(tool_name: &str) -> Arc<Self> {
        Arc::new(Self {
            log: StdMutex::new(Vec::new()),
            block_tool: Some(tool_name.into()),
        })
    }

    /// Tool names in run order.
    pub fn runs(&self) -> Vec<String> {
        self.log
            .lock()
            .unwrap()
            .iter()
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Full invocations (tool name, CLI tokens) in run order.
    pub fn invocations(&self) -> Vec<(String, Vec<String>)> {
        self.log.lock().unwrap().clone()
    }
}

#[async_trait]
impl ToolRunner for ScriptedRunner {
    async fn run(
        &self,
        tool: &Tool,
        arguments: &[String],
        cancel: &CancellationToken,
    ) -> std::io::Result<RunOutcome> {
        self.log
            .lock()
            .unwrap()
            .push((tool.name.clone(), arguments.to_vec()));
        if self.block_tool.as_deref() == Some(tool.name.as_str()) {
            cancel.cancelled().await;
            return Ok(RunOutcome {
                success: false,
                stdout: String::new(),
                stderr: String::new(),
                cancelled: true,
            });
        }
        Ok(RunOutcome {
            success: true,
            stdout: format!("{} finished", tool.name),
            stderr: String::new(),
            cancelled: false,
        })
    }
}

/// Runner double that fails a specific tool.
pub struct FailingRunner {
    pub fail_tool: String,
}

#[async_trait]
impl ToolRunner for FailingRunner {
    async fn run(
        &self,
        tool: &Tool,
        _arguments: &[String],
        _cancel: &CancellationToken,
    ) -> std::io::Result<RunOutcome> {
        if tool.name == self.fail_tool {
            return Ok(RunOutcome {
                success: false,
                stdout: String::new(),
                stderr: "boom".into(),
                cancelled: false,
            });
        }
        Ok(RunOutcome {
            success: true,
            stdout: String::new(),
            stderr: String::new(),
            cancelled: false,
        })
    }
}

/// Parser double mapping tool names to canned findings.
pub struct MapParser {
    findings: StdMutex<HashMap<String, Vec<Finding>>>,
}

impl MapParser {
    pub fn new(findings: HashMap<String, Vec<Finding>>) -> Arc<Self> {
        Arc::new(Self {
            findings: StdMutex::new(findings),
        })
    }

    pub fn empty() -> Arc<Self> {
        Self::new(HashMap::new())
    }
}

impl OutputParser for MapParser {
    fn parse(&self, tool: &Tool, _output: &str) -> Vec<Finding> {
        self.findings
            .lock()
            .unwrap()
            .get(&tool.name)
            .cloned()
            .unwrap_or_default()
    }
}

// ── Polling helper ───────────────────────────────────────────────────────

/// Poll `condition` until it returns true or the timeout elapses.
pub async fn wait_until<F, Fut>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if condition().await {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}
