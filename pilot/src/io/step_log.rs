//! Per-step records under the configured log directory.
//!
//! Layout: `<dir>/<task-id>/<step>/meta.json` (+ `observation.png`) and
//! `<dir>/<task-id>/summary.json`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;

use crate::core::report::{StepReport, TaskOutcome};

#[derive(Debug, Clone)]
pub struct StepPaths {
    pub dir: PathBuf,
    pub meta_path: PathBuf,
    pub observation_path: PathBuf,
}

impl StepPaths {
    pub fn new(root: &Path, task_id: &str, step: u32) -> Self {
        let dir = root.join(task_id).join(step.to_string());
        Self {
            dir: dir.clone(),
            meta_path: dir.join("meta.json"),
            observation_path: dir.join("observation.png"),
        }
    }
}

pub fn summary_path(root: &Path, task_id: &str) -> PathBuf {
    root.join(task_id).join("summary.json")
}

#[derive(Debug, Clone)]
pub struct StepLog {
    root: PathBuf,
    save_screenshots: bool,
}

impl StepLog {
    pub fn new(root: impl Into<PathBuf>, save_screenshots: bool) -> Self {
        Self {
            root: root.into(),
            save_screenshots,
        }
    }

    pub fn write_step(
        &self,
        task_id: &str,
        report: &StepReport,
        screenshot: Option<&[u8]>,
    ) -> Result<StepPaths> {
        let paths = StepPaths::new(&self.root, task_id, report.step);
        fs::create_dir_all(&paths.dir)
            .with_context(|| format!("create step dir {}", paths.dir.display()))?;
        write_json(&paths.meta_path, report)?;
        if self.save_screenshots
            && let Some(bytes) = screenshot
        {
            fs::write(&paths.observation_path, bytes)
                .with_context(|| format!("write {}", paths.observation_path.display()))?;
        }
        Ok(paths)
    }

    pub fn write_summary(&self, outcome: &TaskOutcome) -> Result<PathBuf> {
        let path = summary_path(&self.root, &outcome.task_id);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
        }
        write_json(&path, outcome)?;
        Ok(path)
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let mut buf = serde_json::to_string_pretty(value)?;
    buf.push('\n');
    fs::write(path, buf).with_context(|| format!("write {}", path.display()))
}
