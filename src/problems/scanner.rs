//! Problem scanner — ingests embedded problem markers from a source tree.
//!
//! Marker grammar (per file):
//!
//! ```text
//! <!-- EMBED:ACTIVEPROBLEM:START -->
//! ### DB connection leak
//! **Severity:** [high|medium]
//! **Frequency:** [frequent]
//! **Impact:** [degraded_performance]
//! <!-- EMBED:ACTIVEPROBLEM:END -->
//! ```
//!
//! The first alternative inside each bracket wins. Blocks without a
//! title are discarded.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::LazyLock;
use std::time::Instant;

use chrono::Utc;
use regex::Regex;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::ScanError;
use crate::problems::{Frequency, Problem, ProblemImpact, Severity};
use crate::sink::MetricsSink;
use crate::store::{Task, TaskStore};

/// Safety cap: a scan stops collecting after this many marker files.
const MAX_MARKER_FILES: usize = 50;

const BLOCK_START: &str = "<!-- EMBED:ACTIVEPROBLEM:START -->";
const BLOCK_END: &str = "<!-- EMBED:ACTIVEPROBLEM:END -->";

static BLOCK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        "(?s){}(.*?){}",
        regex::escape(BLOCK_START),
        regex::escape(BLOCK_END)
    ))
    .unwrap()
});
static TITLE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?m)^###\s+(.+?)\s*$").unwrap());
static SEVERITY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\*\*Severity:\*\*\s*\[([^\]|]+)").unwrap());
static FREQUENCY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\*\*Frequency:\*\*\s*\[([^\]|]+)").unwrap());
static IMPACT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\*\*Impact:\*\*\s*\[([^\]|]+)").unwrap());

/// Result of one scan run.
#[derive(Debug, Clone, Serialize)]
pub struct ScanReport {
    pub problems_found: usize,
    pub tasks_created: usize,
    pub duration_ms: u64,
    pub problem_ids: Vec<String>,
}

/// Walks a source tree, upserts discovered problems, and (in yolo mode)
/// synthesizes resolution tasks for high-severity ones.
pub struct ProblemScanner {
    store: Arc<dyn TaskStore>,
    sink: Arc<dyn MetricsSink>,
}

impl ProblemScanner {
    pub fn new(store: Arc<dyn TaskStore>, sink: Arc<dyn MetricsSink>) -> Self {
        Self { store, sink }
    }

    /// Scan `root` for problem markers.
    pub async fn scan(&self, root: &Path, yolo_mode: bool) -> Result<ScanReport, ScanError> {
        let started = Instant::now();
        if !tokio::fs::try_exists(root).await.unwrap_or(false) {
            return Err(ScanError::RootMissing(root.display().to_string()));
        }

        let marker_files = collect_marker_files(root).await;
        info!(
            root = %root.display(),
            files = marker_files.len(),
            yolo_mode,
            "Problem scan started"
        );

        let mut problem_ids = Vec::new();
        let mut tasks_created = 0usize;

        for (path, contents) in &marker_files {
            for problem in parse_markers(path, contents) {
                let id = problem.id.clone();
                match self.upsert_and_maybe_spawn(problem, yolo_mode).await {
                    Ok(spawned) => {
                        if spawned {
                            tasks_created += 1;
                        }
                        problem_ids.push(id);
                    }
                    Err(e) => warn!(problem_id = %id, error = %e, "Failed to ingest problem"),
                }
            }
        }

        let report = ScanReport {
            problems_found: problem_ids.len(),
            tasks_created,
            duration_ms: started.elapsed().as_millis() as u64,
            problem_ids,
        };
        info!(
            problems = report.problems_found,
            tasks = report.tasks_created,
            "Problem scan finished"
        );
        Ok(report)
    }

    /// Upsert one problem; returns whether a resolution task was spawned.
    async fn upsert_and_maybe_spawn(
        &self,
        problem: Problem,
        yolo_mode: bool,
    ) -> Result<bool, crate::error::Error> {
        let existing = self.sink.get_problem(&problem.id).await.ok().flatten();
        self.sink
            .upsert_problem(&problem)
            .await
            .map_err(crate::error::Error::Sink)?;

        if !yolo_mode {
            return Ok(false);
        }
        if !matches!(problem.severity, Severity::Critical | Severity::High) {
            return Ok(false);
        }
        // A problem that already spawned a task does not spawn another.
        if existing.is_some_and(|p| !p.tasks_created.is_empty()) {
            return Ok(false);
        }

        let task = Task::new(
            format!("Resolve problem: {}", problem.title),
            "problem-scanner",
        )
        .with_description(problem.description.clone())
        .with_type("problem-resolution")
        .with_target(problem.source_file.clone())
        .with_estimates(problem.derived_estimates());

        let task = self.store.create(task).await.map_err(crate::error::Error::Store)?;
        self.sink
            .link_task(&problem.id, &task.id)
            .await
            .map_err(crate::error::Error::Sink)?;
        debug!(problem_id = %problem.id, task_id = %task.id, "Synthesized resolution task");
        Ok(true)
    }
}

/// Depth-first walk collecting files that contain a marker block, capped
/// at `MAX_MARKER_FILES`. Hidden directories and unreadable entries are
/// skipped.
async fn collect_marker_files(root: &Path) -> Vec<(PathBuf, String)> {
    let mut found = Vec::new();
    let mut stack = vec![root.to_path_buf()];

    while let Some(dir) = stack.pop() {
        if found.len() >= MAX_MARKER_FILES {
            break;
        }
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) => {
                debug!(dir = %dir.display(), error = %e, "Unreadable directory during scan");
                continue;
            }
        };
        loop {
            if found.len() >= MAX_MARKER_FILES {
                break;
            }
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    debug!(dir = %dir.display(), error = %e, "Unreadable entry during scan");
                    continue;
                }
            };
            let path = entry.path();
            let name = entry.file_name();
            if name.to_string_lossy().starts_with('.') {
                continue;
            }
            let file_type = match entry.file_type().await {
                Ok(file_type) => file_type,
                Err(e) => {
                    debug!(path = %path.display(), error = %e, "Unreadable entry during scan");
                    continue;
                }
            };
            if file_type.is_dir() {
                stack.push(path);
            } else if file_type.is_file() {
                // Binary files fail UTF-8 decoding and are skipped.
                if let Ok(contents) = tokio::fs::read_to_string(&path).await
                    && contents.contains(BLOCK_START)
                {
                    found.push((path, contents));
                }
            }
        }
    }
    found
}

/// Parse all marker blocks in one file into problems.
fn parse_markers(path: &Path, contents: &str) -> Vec<Problem> {
    let source_file = path
        .canonicalize()
        .unwrap_or_else(|_| path.to_path_buf())
        .display()
        .to_string();

    BLOCK_RE
        .captures_iter(contents)
        .filter_map(|block| {
            let body = block.get(1)?.as_str();
            // Titleless blocks are discarded.
            let title = TITLE_RE.captures(body)?.get(1)?.as_str().trim().to_string();

            let severity = first_alternative(&SEVERITY_RE, body)
                .map(|s| Severity::parse_str(&s))
                .unwrap_or(Severity::Medium);
            let frequency = first_alternative(&FREQUENCY_RE, body)
                .map(|s| Frequency::parse_str(&s))
                .unwrap_or(Frequency::Occasional);
            let impact = first_alternative(&IMPACT_RE, body)
                .map(|s| ProblemImpact::parse_str(&s))
                .unwrap_or(ProblemImpact::DegradedPerformance);

            let mut problem =
                Problem::discovered(title, severity, frequency, impact, source_file.clone());
            problem.last_occurrence = Some(Utc::now());
            Some(problem)
        })
        .collect()
}

/// The first `|`-separated alternative inside the bracket.
fn first_alternative(re: &Regex, body: &str) -> Option<String> {
    re.captures(body)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
}
