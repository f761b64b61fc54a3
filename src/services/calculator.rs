//! Route engine orchestration.
//!
//! Each calculation spawns the external engine once with
//! `[<options JSON>, <verbosity flag>]` as argv. stdout is parsed with the
//! event protocol in [`crate::services::events`], stderr is logged and kept
//! for error reporting. Both pipes are drained concurrently so a chatty
//! engine cannot block on a full pipe.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use utoipa::ToSchema;

use crate::services::events::{EventParser, ParsedLine, RESULTS_EVENT};
use crate::services::options::{CalculationOptions, Location, OptionsError};

/// Engine binary name inside the bin directory.
pub const ENGINE_BINARY: &str = "calculator";
pub const VERBOSITY_FLAG: &str = "-v";

#[derive(Debug, thiserror::Error)]
pub enum CalculationError {
    #[error("failed to spawn engine {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("engine I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to serialize options: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("engine produced malformed results: {0}")]
    MalformedResults(#[source] serde_json::Error),

    #[error("engine exited successfully but produced no results")]
    NoResults,

    #[error("engine exited with {}: {}", exit_label(.code), stderr_label(.stderr))]
    EngineFailed { code: Option<i32>, stderr: String },

    #[error("calculation task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("code {}", code),
        None => "signal".to_string(),
    }
}

fn stderr_label(stderr: &str) -> &str {
    if stderr.trim().is_empty() {
        "(no stderr output)"
    } else {
        stderr.trim_end()
    }
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Waypoint {
    pub loc: Location,
    /// Timestamp at this waypoint, as emitted by the engine.
    pub date: f64,
    /// Fuel remaining.
    pub fuel: f64,
}

/// Payload of the `results` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct CalculationResult {
    pub path: Vec<Waypoint>,
    /// Engine statistics; carries `graph` when `exportGraph` was set.
    #[serde(default)]
    #[schema(value_type = Object)]
    pub stats: serde_json::Value,
}

/// What a finished calculation returns to callers.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct CalculationReport {
    pub id: u64,
    pub options: CalculationOptions,
    pub path: Vec<Waypoint>,
    #[schema(value_type = Object)]
    pub stats: serde_json::Value,
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// How to invoke the engine. `leading_args` go before the options JSON.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub program: PathBuf,
    pub leading_args: Vec<String>,
    pub verbosity_flag: String,
}

impl EngineConfig {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            leading_args: Vec::new(),
            verbosity_flag: VERBOSITY_FLAG.to_string(),
        }
    }

    pub fn from_bin_dir(bin_dir: &Path) -> Self {
        Self::new(bin_dir.join(ENGINE_BINARY))
    }

    pub fn with_leading_args(mut self, args: Vec<String>) -> Self {
        self.leading_args = args;
        self
    }
}

/// Creates calculations with unique ids. Shared across requests.
#[derive(Debug)]
pub struct Calculator {
    engine: Arc<EngineConfig>,
    next_id: AtomicU64,
}

impl Calculator {
    pub fn new(engine: EngineConfig) -> Self {
        Self {
            engine: Arc::new(engine),
            next_id: AtomicU64::new(0),
        }
    }

    pub fn engine(&self) -> &EngineConfig {
        &self.engine
    }

    pub fn normalize_options(
        &self,
        raw: &serde_json::Value,
    ) -> Result<CalculationOptions, OptionsError> {
        CalculationOptions::normalize(raw)
    }

    pub fn create_calculation(&self, options: CalculationOptions) -> Calculation {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        Calculation {
            id,
            options: options.normalized(),
            engine: Arc::clone(&self.engine),
        }
    }
}

/// One engine run. Consumed by [`Calculation::run`].
#[derive(Debug)]
pub struct Calculation {
    id: u64,
    options: CalculationOptions,
    engine: Arc<EngineConfig>,
}

impl Calculation {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn options(&self) -> &CalculationOptions {
        &self.options
    }

    /// Run the engine to completion.
    ///
    /// Success requires exit code 0 and a `results` event. The engine runs
    /// on its own task: dropping this future does not stop it.
    pub async fn run(self) -> Result<CalculationReport, CalculationError> {
        tokio::spawn(self.execute()).await?
    }

    async fn execute(self) -> Result<CalculationReport, CalculationError> {
        let options_json = serde_json::to_string(&self.options)?;
        let program = self.engine.program.display().to_string();

        let mut child = Command::new(&self.engine.program)
            .args(&self.engine.leading_args)
            .arg(&options_json)
            .arg(&self.engine.verbosity_flag)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            // Only reached when the runtime itself shuts down.
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| CalculationError::Spawn {
                program: program.clone(),
                source,
            })?;

        tracing::info!("calculation [{}]: started {}", self.id, program);

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| std::io::Error::other("engine stdout not captured"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| std::io::Error::other("engine stderr not captured"))?;

        let (results, stderr_text) =
            futures::future::try_join(read_stdout(self.id, stdout), read_stderr(self.id, stderr))
                .await?;
        let status = child.wait().await?;

        tracing::info!(
            "calculation [{}]: engine exited with {}",
            self.id,
            exit_label(&status.code())
        );

        let result = interpret_exit(status.code(), results, stderr_text)?;
        Ok(CalculationReport {
            id: self.id,
            options: self.options,
            path: result.path,
            stats: result.stats,
        })
    }
}

type ParsedResults = Option<Result<CalculationResult, serde_json::Error>>;

/// Drain stdout through the event parser. The last well-formed `results`
/// event wins, but a malformed one is final: it is kept until the exit code
/// is known and later `results` events are ignored.
async fn read_stdout<R: AsyncRead + Unpin>(
    id: u64,
    reader: R,
) -> Result<ParsedResults, std::io::Error> {
    let mut parser = EventParser::new();
    let mut results = None;
    let mut segments = BufReader::new(reader).split(b'\n');

    while let Some(segment) = segments.next_segment().await? {
        let line = String::from_utf8_lossy(&segment);
        match parser.feed_line(&line) {
            ParsedLine::Diagnostic(text) => {
                if !text.trim().is_empty() {
                    tracing::debug!("calculation [{}]: {}", id, text);
                }
            }
            ParsedLine::Opened { .. } | ParsedLine::Payload => {}
            ParsedLine::Closed(event) => {
                tracing::debug!(
                    "calculation [{}]: got event {} ({:.2}kb)",
                    id,
                    event.name,
                    event.size_kb()
                );
                if event.name != RESULTS_EVENT {
                    continue;
                }
                if matches!(results, Some(Err(_))) {
                    tracing::warn!(
                        "calculation [{}]: ignoring results after malformed results",
                        id
                    );
                    continue;
                }
                let parsed = serde_json::from_str::<CalculationResult>(&event.payload);
                if let Err(e) = &parsed {
                    tracing::error!("calculation [{}]: malformed results: {}", id, e);
                }
                results = Some(parsed);
            }
        }
    }

    if let Some(open) = parser.finish() {
        tracing::warn!(
            "calculation [{}]: output ended inside event {} ({:.2}kb), discarded",
            id,
            open.name,
            open.size_kb()
        );
    }
    Ok(results)
}

/// Drain stderr, logging each line, and return everything that was written.
async fn read_stderr<R: AsyncRead + Unpin>(id: u64, reader: R) -> Result<String, std::io::Error> {
    let mut collected = String::new();
    let mut segments = BufReader::new(reader).split(b'\n');

    while let Some(segment) = segments.next_segment().await? {
        let line = String::from_utf8_lossy(&segment);
        let line = line.strip_suffix('\r').unwrap_or(&line);
        tracing::error!("calculation [{}]: {}", id, line);
        collected.push_str(line);
        collected.push('\n');
    }
    Ok(collected)
}

fn interpret_exit(
    code: Option<i32>,
    results: ParsedResults,
    stderr: String,
) -> Result<CalculationResult, CalculationError> {
    match code {
        Some(0) => match results {
            Some(Ok(result)) => Ok(result),
            Some(Err(e)) => Err(CalculationError::MalformedResults(e)),
            None => Err(CalculationError::NoResults),
        },
        code => Err(CalculationError::EngineFailed { code, stderr }),
    }
}
