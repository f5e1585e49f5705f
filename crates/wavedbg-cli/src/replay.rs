//! Scenario replay: drive a [`GpuTarget`] against the simulator from a
//! TOML script and report what each step did.
//!
//! ```toml
//! [[process]]
//! pid = 100
//! waves = 2                  # spawned once the attach succeeds
//! runtime = "loaded_success" # buffered runtime event seen at attach
//!
//! [[step]]
//! action = "attach"
//! pid = 100
//!
//! [[step]]
//! action = "wave-stop"
//! pid = 100
//! wave = 0                   # index into the process's spawned waves
//! reasons = ["TRAP"]
//!
//! [[step]]
//! action = "wait"
//! ```
//!
//! A step failing with a non-fatal adapter error is reported and the replay
//! continues; a fatal one aborts the replay.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use anyhow::{Context, Result, anyhow, bail};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use wavedbg_core::library::{RuntimeState, StopReasons, WaveId};
use wavedbg_core::{AdapterConfig, Pid, Ptid, Signal, TargetError};
use wavedbg_sim::{SimBeneath, SimHost, SimLibrary, SimRig};

// -----------------------------------------------------------------------
// Scenario format
// -----------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Scenario {
    /// Whether the target beneath starts in async mode.
    #[serde(default = "default_true")]
    pub beneath_async: bool,
    /// Whether the core wants thread-exit events.
    #[serde(default)]
    pub thread_events: bool,
    #[serde(default, rename = "process")]
    pub processes: Vec<ProcessSpec>,
    #[serde(default, rename = "step")]
    pub steps: Vec<Step>,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProcessSpec {
    pub pid: Pid,
    #[serde(default)]
    pub waves: u32,
    pub runtime: Option<RuntimeState>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "kebab-case")]
pub enum Step {
    Attach {
        pid: Pid,
    },
    Runtime {
        pid: Pid,
        state: RuntimeState,
    },
    UpdateThreads,
    WaveStop {
        pid: Pid,
        wave: usize,
        #[serde(default)]
        reasons: Vec<String>,
    },
    WaveExit {
        pid: Pid,
        wave: usize,
    },
    Notify,
    Wait {
        pid: Option<Pid>,
    },
    Resume {
        pid: Pid,
        wave: Option<usize>,
        #[serde(default)]
        step: bool,
        signal: Option<String>,
    },
    Stop {
        pid: Option<Pid>,
        wave: Option<usize>,
    },
    Commit,
    Detach {
        pid: Pid,
    },
}

impl Step {
    pub fn action(&self) -> &'static str {
        match self {
            Self::Attach { .. } => "attach",
            Self::Runtime { .. } => "runtime",
            Self::UpdateThreads => "update-threads",
            Self::WaveStop { .. } => "wave-stop",
            Self::WaveExit { .. } => "wave-exit",
            Self::Notify => "notify",
            Self::Wait { .. } => "wait",
            Self::Resume { .. } => "resume",
            Self::Stop { .. } => "stop",
            Self::Commit => "commit",
            Self::Detach { .. } => "detach",
        }
    }
}

impl Scenario {
    pub fn parse(content: &str) -> Result<Self> {
        let scenario: Self = toml::from_str(content).context("failed to parse scenario")?;
        let mut seen = Vec::new();
        for process in &scenario.processes {
            if seen.contains(&process.pid) {
                bail!("process {} is declared twice", process.pid);
            }
            seen.push(process.pid);
        }
        Ok(scenario)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read scenario {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("in {}", path.display()))
    }
}

// -----------------------------------------------------------------------
// Reports
// -----------------------------------------------------------------------

/// What one step did.
#[derive(Debug, Clone, Serialize)]
pub struct StepReport {
    pub step: usize,
    pub action: &'static str,
    pub ok: bool,
    pub detail: String,
}

impl fmt::Display for StepReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.ok {
            write!(f, "[{}] {}: {}", self.step, self.action, self.detail)
        } else {
            write!(f, "[{}] {}: error: {}", self.step, self.action, self.detail)
        }
    }
}

// -----------------------------------------------------------------------
// Replay
// -----------------------------------------------------------------------

/// Run `scenario` against a fresh simulator and return one report per step.
pub fn run(scenario: &Scenario, config: AdapterConfig) -> Result<Vec<StepReport>> {
    let mut replay = Replay::new(scenario, config)?;
    let mut reports = Vec::with_capacity(scenario.steps.len());

    for (index, step) in scenario.steps.iter().enumerate() {
        let number = index + 1;
        let report = match replay.apply(step) {
            Ok(detail) => StepReport {
                step: number,
                action: step.action(),
                ok: true,
                detail,
            },
            Err(StepError::Target(err)) if !err.is_fatal() => StepReport {
                step: number,
                action: step.action(),
                ok: false,
                detail: err.to_string(),
            },
            Err(StepError::Target(err)) => {
                return Err(anyhow::Error::new(err)
                    .context(format!("step {number} ({}) broke the adapter", step.action())));
            }
            Err(StepError::Scenario(err)) => {
                return Err(err.context(format!("step {number} ({})", step.action())));
            }
        };
        debug!(step = number, action = report.action, ok = report.ok, "replayed step");
        reports.push(report);
    }

    replay.rig.target.close();
    info!(steps = reports.len(), "replay finished");
    Ok(reports)
}

/// A step either hits an adapter error or is itself malformed.
enum StepError {
    Target(TargetError),
    Scenario(anyhow::Error),
}

impl From<TargetError> for StepError {
    fn from(err: TargetError) -> Self {
        Self::Target(err)
    }
}

impl From<anyhow::Error> for StepError {
    fn from(err: anyhow::Error) -> Self {
        Self::Scenario(err)
    }
}

struct Replay<'a> {
    rig: SimRig,
    processes: HashMap<Pid, &'a ProcessSpec>,
    waves: HashMap<Pid, Vec<WaveId>>,
}

impl<'a> Replay<'a> {
    fn new(scenario: &'a Scenario, config: AdapterConfig) -> Result<Self> {
        let lib = SimLibrary::new();
        for process in &scenario.processes {
            if let Some(runtime) = process.runtime {
                lib.handle().runtime_on_attach(process.pid, runtime);
            }
        }
        let beneath = SimBeneath::new();
        beneath.handle().set_is_async(scenario.beneath_async);

        let mut rig = SimRig::from_parts(lib, SimHost::new(), beneath, config)
            .context("failed to set up the simulated adapter")?;
        rig.target.thread_events(scenario.thread_events);

        Ok(Self {
            rig,
            processes: scenario.processes.iter().map(|p| (p.pid, p)).collect(),
            waves: HashMap::new(),
        })
    }

    fn apply(&mut self, step: &Step) -> Result<String, StepError> {
        match *step {
            Step::Attach { pid } => {
                self.rig.target.attach(pid)?;
                let Some(process) = self.rig.target.session(pid).and_then(|s| s.process()) else {
                    return Ok("not attached".to_string());
                };
                let count = self.processes.get(&pid).map_or(0, |p| p.waves);
                let spawned: Vec<WaveId> = (0..count)
                    .filter_map(|_| self.rig.lib.spawn_wave(pid))
                    .collect();
                let detail = format!("attached as {process}, {} wave(s) running", spawned.len());
                self.waves.insert(pid, spawned);
                Ok(detail)
            }
            Step::Runtime { pid, state } => {
                let event = self
                    .rig
                    .lib
                    .runtime_event(pid, state)
                    .ok_or_else(|| anyhow!("process {pid} is not attached in the library"))?;
                Ok(format!("queued {event} ({state})"))
            }
            Step::UpdateThreads => {
                self.rig.target.update_thread_list()?;
                let waves: usize = self
                    .rig
                    .target
                    .sessions()
                    .iter()
                    .map(|s| s.waves().len())
                    .sum();
                Ok(format!("{waves} wave thread(s)"))
            }
            Step::WaveStop {
                pid,
                wave,
                ref reasons,
            } => {
                let id = self.wave(pid, wave)?;
                let reasons = parse_reasons(reasons)?;
                let event = self
                    .rig
                    .lib
                    .stop_wave(id, reasons)
                    .ok_or_else(|| anyhow!("{id} no longer exists"))?;
                Ok(format!("{id} stopped ({reasons:?}), queued {event}"))
            }
            Step::WaveExit { pid, wave } => {
                let id = self.wave(pid, wave)?;
                match self.rig.lib.terminate_wave(id) {
                    Some(event) => Ok(format!("{id} terminated, queued {event}")),
                    None => Ok(format!("{id} terminated")),
                }
            }
            Step::Notify => {
                let handled = self.rig.pump_notifiers()?;
                Ok(format!("{handled} notifier(s) handled"))
            }
            Step::Wait { pid } => {
                let scope = pid.map_or(Ptid::ALL, Ptid::process);
                let outcome = self.rig.target.wait(scope)?;
                match outcome.ptid {
                    Some(ptid) => {
                        // Like a debugger, make the reporting thread current.
                        self.rig.host.select(ptid);
                        Ok(format!("{}: {}", self.rig.target.pid_to_str(ptid), outcome.status))
                    }
                    None => Ok(outcome.status.to_string()),
                }
            }
            Step::Resume {
                pid,
                wave,
                step,
                ref signal,
            } => {
                let scope = self.scope(Some(pid), wave)?;
                let signal = match signal {
                    Some(name) => name.parse::<Signal>().context("bad resume signal")?,
                    None => Signal::None,
                };
                self.rig.host.select(scope);
                self.rig.target.resume(scope, step, signal)?;
                self.rig.target.commit_resumed()?;
                Ok(format!("resumed {scope} (step = {step}, signal = {signal})"))
            }
            Step::Stop { pid, wave } => {
                let scope = self.scope(pid, wave)?;
                self.rig.target.stop(scope)?;
                Ok(format!("stop requested for {scope}"))
            }
            Step::Commit => {
                self.rig.target.commit_resumed()?;
                Ok("committed".to_string())
            }
            Step::Detach { pid } => {
                self.rig.target.detach(pid)?;
                self.waves.remove(&pid);
                Ok("detached".to_string())
            }
        }
    }

    fn wave(&self, pid: Pid, index: usize) -> Result<WaveId> {
        self.waves
            .get(&pid)
            .and_then(|waves| waves.get(index))
            .copied()
            .ok_or_else(|| anyhow!("process {pid} has no wave #{index}"))
    }

    fn scope(&self, pid: Option<Pid>, wave: Option<usize>) -> Result<Ptid> {
        match (pid, wave) {
            (Some(pid), Some(index)) => Ok(Ptid::wave(pid, self.wave(pid, index)?)),
            (Some(pid), None) => Ok(Ptid::process(pid)),
            (None, None) => Ok(Ptid::ALL),
            (None, Some(_)) => bail!("a wave needs a pid"),
        }
    }
}

fn parse_reasons(names: &[String]) -> Result<StopReasons> {
    names.iter().try_fold(StopReasons::empty(), |acc, name| {
        StopReasons::from_name(&name.to_ascii_uppercase())
            .map(|reason| acc | reason)
            .ok_or_else(|| anyhow!("unknown stop reason {name:?}"))
    })
}

// -----------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------
