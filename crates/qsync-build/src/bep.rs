//! Reader for the JSON build event stream written by `--build_event_json_file`.
//!
//! Only the events needed to recover output-group artifacts are decoded: named file sets,
//! completed targets (and aspects) with their output groups, and the final exit code.
//! Everything else is skipped.

use crate::error::BepError;
use qsync_core::Label;
use serde::Deserialize;
use std::{
    collections::{BTreeMap, BTreeSet, HashMap},
    fs::File,
    io::{self, BufRead, BufReader},
    path::{Path, PathBuf},
};

/// A file entry from a `namedSetOfFiles` event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BepFile {
    pub name: String,
    #[serde(default)]
    pub uri: String,
    #[serde(default)]
    pub path_prefix: Vec<String>,
    #[serde(default)]
    pub digest: Option<String>,
}

impl BepFile {
    /// Build-system relative path: `pathPrefix` segments followed by `name`.
    pub fn relative_path(&self) -> PathBuf {
        let mut path = PathBuf::new();
        for segment in &self.path_prefix {
            path.push(segment);
        }
        path.push(&self.name);
        path
    }

    /// Local file backing this entry, when the URI is a `file://` URI.
    pub fn local_path(&self) -> Option<PathBuf> {
        let url = url::Url::parse(&self.uri).ok()?;
        if url.scheme() != "file" {
            return None;
        }
        url.to_file_path().ok()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct NamedSet {
    files: Vec<BepFile>,
    children: Vec<String>,
}

/// The decoded build event stream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedBepOutput {
    named_sets: HashMap<String, NamedSet>,
    /// Output group name to the ids of its top-level file sets, across all targets.
    output_groups: BTreeMap<String, Vec<String>>,
    targets_with_errors: BTreeSet<Label>,
    exit_code: Option<i32>,
    build_id: Option<String>,
}

impl ParsedBepOutput {
    pub fn parse_file(path: &Path) -> Result<Self, BepError> {
        let file = match File::open(path) {
            Ok(file) => file,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Err(BepError::Missing {
                    path: path.to_path_buf(),
                })
            }
            Err(source) => {
                return Err(BepError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        Self::parse(BufReader::new(file)).map_err(|err| match err {
            BepError::Io { source, .. } => BepError::Io {
                path: path.to_path_buf(),
                source,
            },
            other => other,
        })
    }

    pub fn parse(reader: impl BufRead) -> Result<Self, BepError> {
        let mut output = ParsedBepOutput::default();
        for (idx, line) in reader.lines().enumerate() {
            let line = line.map_err(|source| BepError::Io {
                path: PathBuf::new(),
                source,
            })?;
            if line.trim().is_empty() {
                continue;
            }
            let event: BuildEvent =
                serde_json::from_str(&line).map_err(|err| BepError::Malformed {
                    line: idx + 1,
                    message: err.to_string(),
                })?;
            output.accept(event);
        }
        Ok(output)
    }

    fn accept(&mut self, event: BuildEvent) {
        if let (Some(id), Some(set)) = (event.id.named_set, event.named_set_of_files) {
            self.named_sets.insert(
                id.id,
                NamedSet {
                    files: set.files,
                    children: set.file_sets.into_iter().map(|s| s.id).collect(),
                },
            );
            return;
        }

        if let Some(id) = event.id.target_completed {
            let failed = match &event.completed {
                Some(completed) => !completed.success,
                None => true,
            };
            if failed {
                match Label::parse(&id.label) {
                    Ok(label) => {
                        self.targets_with_errors.insert(label);
                    }
                    Err(err) => tracing::debug!(
                        target = "qsync.bep",
                        label = %id.label,
                        error = %err,
                        "ignoring failed target with unparseable label"
                    ),
                }
            }
            if let Some(completed) = event.completed {
                for group in completed.output_group {
                    self.output_groups
                        .entry(group.name)
                        .or_default()
                        .extend(group.file_sets.into_iter().map(|s| s.id));
                }
            }
            return;
        }

        if let Some(started) = event.started {
            self.build_id = started.uuid;
        }
        if let Some(finished) = event.finished {
            self.exit_code = finished.exit_code.map(|code| code.code);
        }
    }

    /// Every file in `group`, with nested file sets flattened. Each set is visited once.
    pub fn output_group_files(&self, group: &str) -> Vec<&BepFile> {
        let Some(roots) = self.output_groups.get(group) else {
            return Vec::new();
        };

        let mut files = Vec::new();
        let mut seen_files = BTreeSet::new();
        let mut visited = BTreeSet::new();
        let mut stack = roots.iter().rev().collect::<Vec<_>>();
        while let Some(id) = stack.pop() {
            if !visited.insert(id) {
                continue;
            }
            let Some(set) = self.named_sets.get(id) else {
                tracing::debug!(target = "qsync.bep", set = %id, "unknown named set");
                continue;
            };
            for file in &set.files {
                if seen_files.insert(file.relative_path()) {
                    files.push(file);
                }
            }
            stack.extend(set.children.iter().rev());
        }
        files
    }

    pub fn output_group_names(&self) -> impl Iterator<Item = &str> {
        self.output_groups.keys().map(String::as_str)
    }

    pub fn targets_with_errors(&self) -> &BTreeSet<Label> {
        &self.targets_with_errors
    }

    /// Exit code from the `buildFinished` event, if the stream got that far.
    pub fn exit_code(&self) -> Option<i32> {
        self.exit_code
    }

    pub fn build_id(&self) -> Option<&str> {
        self.build_id.as_deref()
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BuildEvent {
    #[serde(default)]
    id: EventId,
    #[serde(default)]
    named_set_of_files: Option<NamedSetOfFiles>,
    #[serde(default)]
    completed: Option<TargetComplete>,
    #[serde(default)]
    started: Option<BuildStarted>,
    #[serde(default)]
    finished: Option<BuildFinished>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventId {
    #[serde(default)]
    named_set: Option<NamedSetId>,
    #[serde(default)]
    target_completed: Option<TargetCompletedId>,
}

#[derive(Debug, Deserialize)]
struct NamedSetId {
    id: String,
}

#[derive(Debug, Deserialize)]
struct TargetCompletedId {
    label: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NamedSetOfFiles {
    #[serde(default)]
    files: Vec<BepFile>,
    #[serde(default)]
    file_sets: Vec<NamedSetId>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TargetComplete {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    output_group: Vec<OutputGroup>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OutputGroup {
    name: String,
    #[serde(default)]
    file_sets: Vec<NamedSetId>,
}

#[derive(Debug, Deserialize)]
struct BuildStarted {
    #[serde(default)]
    uuid: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BuildFinished {
    #[serde(default)]
    exit_code: Option<ExitCode>,
}

#[derive(Debug, Deserialize)]
struct ExitCode {
    #[serde(default)]
    code: i32,
}
