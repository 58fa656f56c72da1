use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeSet,
    fmt,
    path::{Component, Path, PathBuf},
    str::FromStr,
};

/// Languages the engine knows how to resolve dependencies for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LanguageClass {
    Java,
    Kotlin,
    Cc,
    Python,
    Go,
}

impl LanguageClass {
    pub const ALL: [LanguageClass; 5] = [
        LanguageClass::Java,
        LanguageClass::Kotlin,
        LanguageClass::Cc,
        LanguageClass::Python,
        LanguageClass::Go,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            LanguageClass::Java => "java",
            LanguageClass::Kotlin => "kotlin",
            LanguageClass::Cc => "cc",
            LanguageClass::Python => "python",
            LanguageClass::Go => "go",
        }
    }
}

impl fmt::Display for LanguageClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LanguageClass {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "java" => Ok(LanguageClass::Java),
            "kotlin" => Ok(LanguageClass::Kotlin),
            "cc" | "c++" | "cpp" => Ok(LanguageClass::Cc),
            "python" | "py" => Ok(LanguageClass::Python),
            "go" | "golang" => Ok(LanguageClass::Go),
            other => Err(format!("unknown language `{other}`")),
        }
    }
}

/// The user's project boundary: which workspace directories are "in" the project.
///
/// Compared by value: a changed definition means the persisted query state no longer
/// describes the project and a full reload is required.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectDefinition {
    pub include_directories: BTreeSet<PathBuf>,
    pub exclude_directories: BTreeSet<PathBuf>,
    pub language_classes: BTreeSet<LanguageClass>,
}

impl ProjectDefinition {
    pub fn new(
        include_directories: impl IntoIterator<Item = PathBuf>,
        exclude_directories: impl IntoIterator<Item = PathBuf>,
        language_classes: impl IntoIterator<Item = LanguageClass>,
    ) -> Self {
        Self {
            include_directories: include_directories
                .into_iter()
                .map(|p| normalize_workspace_path(&p))
                .collect(),
            exclude_directories: exclude_directories
                .into_iter()
                .map(|p| normalize_workspace_path(&p))
                .collect(),
            language_classes: language_classes.into_iter().collect(),
        }
    }

    /// Whether `path` (workspace-relative) falls inside the project.
    ///
    /// The deepest matching root decides, so an include nested inside an exclude wins.
    pub fn is_included(&self, path: &Path) -> bool {
        let path = normalize_workspace_path(path);
        let include_depth = deepest_root(&self.include_directories, &path);
        let exclude_depth = deepest_root(&self.exclude_directories, &path);
        match (include_depth, exclude_depth) {
            (Some(include), Some(exclude)) => include > exclude,
            (Some(_), None) => true,
            (None, _) => false,
        }
    }

    /// The query expression covering every package in the project.
    ///
    /// Returns `None` when no include directory is configured.
    pub fn query_expression(&self) -> Option<String> {
        if self.include_directories.is_empty() {
            return None;
        }
        let includes = self
            .include_directories
            .iter()
            .map(|dir| recursive_pattern(dir))
            .collect::<Vec<_>>()
            .join(" + ");

        let mut expr = format!("({includes})");
        for exclude in &self.exclude_directories {
            expr.push_str(" - ");
            expr.push_str(&recursive_pattern(exclude));
        }
        Some(expr)
    }

    /// Returns `true` when `language` is enabled for this project.
    pub fn has_language(&self, language: LanguageClass) -> bool {
        self.language_classes.contains(&language)
    }
}

fn recursive_pattern(dir: &Path) -> String {
    let text = workspace_path_string(dir);
    if text.is_empty() {
        "//...".to_string()
    } else {
        format!("//{text}/...")
    }
}

fn deepest_root(roots: &BTreeSet<PathBuf>, path: &Path) -> Option<usize> {
    roots
        .iter()
        .filter(|root| path.starts_with(root))
        .map(|root| root.components().count())
        .max()
}

/// Normalise a workspace-relative path: drop `.` components and trailing separators.
pub fn normalize_workspace_path(path: &Path) -> PathBuf {
    path.components()
        .filter_map(|component| match component {
            Component::Normal(part) => Some(part),
            _ => None,
        })
        .collect()
}

/// Render a workspace-relative path with `/` separators, as used in labels and patterns.
pub fn workspace_path_string(path: &Path) -> String {
    normalize_workspace_path(path)
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}
