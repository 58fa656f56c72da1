//! The raw result of a `bazel query --output=streamed_jsonproto` invocation.
//!
//! Bazel emits one JSON-encoded `blaze_query.Target` per line. Only the parts the engine needs
//! are decoded: rule labels, rule classes, label-valued attributes, and source files (used to
//! discover package boundaries via their BUILD files).

use crate::label::Label;
use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeMap, BTreeSet},
    io::BufRead,
    path::{Path, PathBuf},
};

#[derive(Debug, thiserror::Error)]
pub enum QueryParseError {
    #[error("io error while reading query output: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed query output at line {line}: {message}")]
    Malformed { line: usize, message: String },
}

/// A rule target as returned by query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryRule {
    pub label: Label,
    pub rule_class: String,
    /// Label and label-list attributes, keyed by attribute name.
    #[serde(default)]
    pub attributes: BTreeMap<String, Vec<Label>>,
}

impl QueryRule {
    pub fn attribute(&self, name: &str) -> &[Label] {
        self.attributes.get(name).map(Vec::as_slice).unwrap_or(&[])
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuerySummary {
    rules: BTreeMap<Label, QueryRule>,
    source_files: BTreeSet<Label>,
    packages: BTreeSet<PathBuf>,
}

/// The result of querying a subset of packages, to be merged into a previous summary.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QuerySummaryDelta {
    /// Packages whose contents are replaced by `summary`.
    pub modified_packages: BTreeSet<PathBuf>,
    /// Packages that no longer exist.
    pub deleted_packages: BTreeSet<PathBuf>,
    pub summary: QuerySummary,
}

impl QuerySummary {
    pub fn parse(reader: impl BufRead) -> Result<Self, QueryParseError> {
        let mut builder = QuerySummaryBuilder::default();
        for line in reader.lines() {
            builder.accept_line(&line?)?;
        }
        Ok(builder.build())
    }

    pub fn rules(&self) -> &BTreeMap<Label, QueryRule> {
        &self.rules
    }

    pub fn rule(&self, label: &Label) -> Option<&QueryRule> {
        self.rules.get(label)
    }

    pub fn source_files(&self) -> &BTreeSet<Label> {
        &self.source_files
    }

    /// Workspace-relative directories that contain a BUILD file.
    pub fn packages(&self) -> &BTreeSet<PathBuf> {
        &self.packages
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty() && self.source_files.is_empty() && self.packages.is_empty()
    }

    pub fn insert_rule(&mut self, rule: QueryRule) {
        self.packages.insert(rule.label.package_path());
        self.rules.insert(rule.label.clone(), rule);
    }

    pub fn insert_source_file(&mut self, label: Label) {
        if is_build_file_name(label.name()) {
            self.packages.insert(label.package_path());
        }
        self.source_files.insert(label);
    }

    /// The package owning `path`: the nearest enclosing directory that has a BUILD file.
    pub fn package_for_path(&self, path: &Path) -> Option<&Path> {
        path.ancestors()
            .skip(1)
            .find_map(|dir| self.packages.get(dir).map(PathBuf::as_path))
    }

    /// Merge a partial query result, replacing everything the delta's packages used to hold.
    pub fn apply_delta(&self, delta: &QuerySummaryDelta) -> QuerySummary {
        let replaced = |package: &Path| {
            delta.modified_packages.contains(package) || delta.deleted_packages.contains(package)
        };

        let mut merged = QuerySummary {
            rules: self
                .rules
                .iter()
                .filter(|(label, _)| !replaced(&label.package_path()))
                .map(|(label, rule)| (label.clone(), rule.clone()))
                .collect(),
            source_files: self
                .source_files
                .iter()
                .filter(|label| !replaced(&label.package_path()))
                .cloned()
                .collect(),
            packages: self
                .packages
                .iter()
                .filter(|package| !replaced(package))
                .cloned()
                .collect(),
        };

        for rule in delta.summary.rules.values() {
            merged.insert_rule(rule.clone());
        }
        for source in &delta.summary.source_files {
            merged.insert_source_file(source.clone());
        }
        merged
            .packages
            .extend(delta.summary.packages.iter().cloned());
        merged
    }
}

pub fn is_build_file_name(name: &str) -> bool {
    name == "BUILD" || name == "BUILD.bazel"
}

/// Incremental parser for streamed query output, fed one line at a time.
#[derive(Debug, Default)]
pub struct QuerySummaryBuilder {
    summary: QuerySummary,
    line: usize,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawTarget {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    rule: Option<RawRule>,
    #[serde(default)]
    source_file: Option<RawSourceFile>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawRule {
    name: String,
    rule_class: String,
    #[serde(default)]
    attribute: Vec<RawAttribute>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawAttribute {
    name: String,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    string_value: Option<String>,
    #[serde(default)]
    string_list_value: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RawSourceFile {
    name: String,
}

impl QuerySummaryBuilder {
    pub fn accept_line(&mut self, line: &str) -> Result<(), QueryParseError> {
        self.line += 1;
        let line = line.trim();
        if line.is_empty() {
            return Ok(());
        }

        let target: RawTarget =
            serde_json::from_str(line).map_err(|err| QueryParseError::Malformed {
                line: self.line,
                message: err.to_string(),
            })?;

        match target.kind.as_str() {
            "RULE" => {
                let Some(rule) = target.rule else {
                    return Err(self.malformed("RULE target without `rule`"));
                };
                self.accept_rule(rule)
            }
            "SOURCE_FILE" => {
                let Some(source) = target.source_file else {
                    return Err(self.malformed("SOURCE_FILE target without `sourceFile`"));
                };
                let label = Label::parse(&source.name)
                    .map_err(|err| self.malformed(&err.to_string()))?;
                self.summary.insert_source_file(label);
                Ok(())
            }
            // Generated files, package groups and environment groups carry nothing we use.
            _ => Ok(()),
        }
    }

    fn accept_rule(&mut self, rule: RawRule) -> Result<(), QueryParseError> {
        let label = Label::parse(&rule.name).map_err(|err| self.malformed(&err.to_string()))?;
        let mut attributes = BTreeMap::new();
        for attr in rule.attribute {
            // Implicit attributes (`$foo`, `:foo`) point at toolchains, not user dependencies.
            if attr.name.starts_with('$') || attr.name.starts_with(':') {
                continue;
            }
            let values = match attr.kind.as_str() {
                "LABEL" => attr.string_value.into_iter().collect::<Vec<_>>(),
                "LABEL_LIST" => attr.string_list_value,
                _ => continue,
            };
            let labels = values
                .iter()
                .filter_map(|value| match Label::parse(value) {
                    Ok(label) => Some(label),
                    Err(err) => {
                        tracing::debug!(
                            target = "qsync.query",
                            rule = %label,
                            attribute = %attr.name,
                            error = %err,
                            "skipping unparseable label"
                        );
                        None
                    }
                })
                .collect::<Vec<_>>();
            if !labels.is_empty() {
                attributes.insert(attr.name, labels);
            }
        }

        self.summary.insert_rule(QueryRule {
            label,
            rule_class: rule.rule_class,
            attributes,
        });
        Ok(())
    }

    fn malformed(&self, message: &str) -> QueryParseError {
        QueryParseError::Malformed {
            line: self.line,
            message: message.to_string(),
        }
    }

    pub fn build(self) -> QuerySummary {
        self.summary
    }
}
