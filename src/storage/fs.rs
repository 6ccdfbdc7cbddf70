//! Project-directory repository.
//!
//! Layout under `<root>/.charter/`:
//!
//! - `spec.yaml`, `plan.yaml`, `policy.yaml`
//! - `state.json`
//! - `events.jsonl` - one event per line, append-only

use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tempfile::NamedTempFile;

use super::{Repository, StorageResult};
use crate::core::{
    Event, ExecutionState, Plan, PolicyConfig, Resource, Spec, StorageError, PROJECT_DIR,
};

const SPEC_FILE: &str = "spec.yaml";
const PLAN_FILE: &str = "plan.yaml";
const STATE_FILE: &str = "state.json";
const POLICY_FILE: &str = "policy.yaml";
const EVENTS_FILE: &str = "events.jsonl";

#[derive(Debug, Clone, Copy)]
enum Format {
    Yaml,
    Json,
}

/// Repository backed by files in a project directory.
#[derive(Debug, Clone)]
pub struct FileRepository {
    dir: PathBuf,
}

impl FileRepository {
    /// Repository for the project rooted at `root`.
    pub fn new(root: &Path) -> Self {
        Self { dir: root.join(PROJECT_DIR) }
    }

    /// The `.charter` directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Whether a project has been initialized here.
    pub fn is_initialized(&self) -> bool {
        self.dir.join(SPEC_FILE).exists()
    }

    /// Create the project directory and an empty event log.
    pub fn create(&self) -> StorageResult<()> {
        fs::create_dir_all(&self.dir).map_err(|e| io_error(&self.dir, e))?;
        let events = self.path(EVENTS_FILE);
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&events)
            .map_err(|e| io_error(&events, e))?;
        Ok(())
    }

    fn path(&self, file: &str) -> PathBuf {
        self.dir.join(file)
    }

    fn load<T: DeserializeOwned>(&self, file: &str, resource: Resource, format: Format) -> StorageResult<T> {
        let path = self.path(file);
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StorageError::NotFound(resource));
            }
            Err(e) => return Err(io_error(&path, e)),
        };

        let parsed = match format {
            Format::Yaml => serde_yaml::from_str(&content).map_err(|e| e.to_string()),
            Format::Json => serde_json::from_str(&content).map_err(|e| e.to_string()),
        };
        parsed.map_err(|message| StorageError::Parse { path, line: None, message })
    }

    /// Write atomically: temp file in the same directory, fsync, rename.
    fn save<T: Serialize>(&self, file: &str, resource: Resource, format: Format, value: &T) -> StorageResult<()> {
        let content = match format {
            Format::Yaml => serde_yaml::to_string(value).map_err(|e| e.to_string()),
            Format::Json => serde_json::to_string_pretty(value).map_err(|e| e.to_string()),
        }
        .map_err(|message| StorageError::Serialize { resource, message })?;

        fs::create_dir_all(&self.dir).map_err(|e| io_error(&self.dir, e))?;
        let target = self.path(file);

        let mut tmp = NamedTempFile::new_in(&self.dir).map_err(|e| io_error(&self.dir, e))?;
        tmp.write_all(content.as_bytes()).map_err(|e| io_error(tmp.path(), e))?;
        tmp.as_file().sync_all().map_err(|e| io_error(tmp.path(), e))?;
        tmp.persist(&target).map_err(|e| io_error(&target, e.error))?;

        tracing::debug!(path = %target.display(), "saved {resource}");
        Ok(())
    }
}

impl Repository for FileRepository {
    fn load_spec(&self) -> StorageResult<Spec> {
        self.load(SPEC_FILE, Resource::Spec, Format::Yaml)
    }

    fn save_spec(&self, spec: &Spec) -> StorageResult<()> {
        self.save(SPEC_FILE, Resource::Spec, Format::Yaml, spec)
    }

    fn load_plan(&self) -> StorageResult<Plan> {
        self.load(PLAN_FILE, Resource::Plan, Format::Yaml)
    }

    fn save_plan(&self, plan: &Plan) -> StorageResult<()> {
        self.save(PLAN_FILE, Resource::Plan, Format::Yaml, plan)
    }

    fn load_state(&self) -> StorageResult<ExecutionState> {
        self.load(STATE_FILE, Resource::State, Format::Json)
    }

    fn save_state(&self, state: &ExecutionState) -> StorageResult<()> {
        self.save(STATE_FILE, Resource::State, Format::Json, state)
    }

    fn load_policy(&self) -> StorageResult<PolicyConfig> {
        self.load(POLICY_FILE, Resource::Policy, Format::Yaml)
    }

    fn save_policy(&self, policy: &PolicyConfig) -> StorageResult<()> {
        self.save(POLICY_FILE, Resource::Policy, Format::Yaml, policy)
    }

    fn load_events(&self) -> StorageResult<Vec<Event>> {
        let path = self.path(EVENTS_FILE);
        let file = match fs::File::open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(io_error(&path, e)),
        };

        let mut events = Vec::new();
        for (index, line) in BufReader::new(file).lines().enumerate() {
            let line = line.map_err(|e| io_error(&path, e))?;
            if line.trim().is_empty() {
                continue;
            }
            let event = serde_json::from_str(&line).map_err(|e| StorageError::Parse {
                path: path.clone(),
                line: Some(index + 1),
                message: e.to_string(),
            })?;
            events.push(event);
        }
        Ok(events)
    }

    fn append_event(&self, event: &Event) -> StorageResult<()> {
        let mut line = serde_json::to_string(event).map_err(|e| StorageError::Serialize {
            resource: Resource::Events,
            message: e.to_string(),
        })?;
        line.push('\n');

        fs::create_dir_all(&self.dir).map_err(|e| io_error(&self.dir, e))?;
        let path = self.path(EVENTS_FILE);
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| io_error(&path, e))?;

        // One write per event keeps lines whole.
        file.write_all(line.as_bytes()).map_err(|e| io_error(&path, e))?;
        file.sync_data().map_err(|e| io_error(&path, e))?;
        Ok(())
    }

    fn remove(&self, resource: Resource) -> StorageResult<()> {
        let file = match resource {
            Resource::Spec => SPEC_FILE,
            Resource::Plan => PLAN_FILE,
            Resource::State => STATE_FILE,
            Resource::Policy => POLICY_FILE,
            Resource::Events => {
                return Err(StorageError::Unavailable("the event log is append-only".to_string()));
            }
        };
        let path = self.path(file);
        match fs::remove_file(&path) {
            Ok(()) => {
                tracing::debug!(path = %path.display(), "removed {resource}");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_error(&path, e)),
        }
    }
}

fn io_error(path: &Path, source: std::io::Error) -> StorageError {
    StorageError::Io { path: path.to_path_buf(), source }
}
