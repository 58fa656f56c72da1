use serde::{Deserialize, Serialize};
use std::{
    fmt,
    path::{Path, PathBuf},
    str::FromStr,
};

/// Errors produced while parsing a [`Label`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LabelError {
    #[error("label `{0}` must start with `//` or `@`")]
    MissingRoot(String),

    #[error("label `{0}` has an empty target name")]
    EmptyName(String),

    #[error("label `{0}` has an invalid package path")]
    InvalidPackage(String),
}

/// A unique identifier for a buildable unit: `[@repo]//package:name`.
///
/// Labels are compared structurally on their canonical form, so `//foo` and `//foo:foo` are
/// the same label.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Label {
    repository: String,
    package: String,
    name: String,
}

impl Label {
    /// Create a main-repository label from a package path and target name.
    pub fn of(package: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            repository: String::new(),
            package: package.into(),
            name: name.into(),
        }
    }

    pub fn parse(text: &str) -> Result<Self, LabelError> {
        let trimmed = text.trim();
        let (repository, rest) = if let Some(rest) = trimmed.strip_prefix('@') {
            // `@@repo` is the canonical repo name syntax of bzlmod.
            let rest = rest.strip_prefix('@').unwrap_or(rest);
            let Some(idx) = rest.find("//") else {
                return Err(LabelError::MissingRoot(text.to_string()));
            };
            (rest[..idx].to_string(), &rest[idx + 2..])
        } else if let Some(rest) = trimmed.strip_prefix("//") {
            (String::new(), rest)
        } else {
            return Err(LabelError::MissingRoot(text.to_string()));
        };

        let (package, name) = match rest.split_once(':') {
            Some((package, name)) => (package.to_string(), name.to_string()),
            None => {
                let name = rest.rsplit('/').next().unwrap_or(rest);
                if name.is_empty() && !repository.is_empty() {
                    // `@repo//` is shorthand for `@repo//:repo`.
                    (String::new(), repository.clone())
                } else {
                    (rest.to_string(), name.to_string())
                }
            }
        };

        if name.is_empty() {
            return Err(LabelError::EmptyName(text.to_string()));
        }
        if package.contains(':')
            || package.starts_with('/')
            || package.ends_with('/')
            || package.split('/').any(|segment| segment == "..")
        {
            return Err(LabelError::InvalidPackage(text.to_string()));
        }

        // `@//foo` refers to the main repository.
        Ok(Self {
            repository,
            package,
            name,
        })
    }

    pub fn repository(&self) -> &str {
        &self.repository
    }

    pub fn package(&self) -> &str {
        &self.package
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns `true` for labels that live in an external repository.
    pub fn is_external(&self) -> bool {
        !self.repository.is_empty()
    }

    /// Workspace-relative package directory.
    pub fn package_path(&self) -> PathBuf {
        PathBuf::from(&self.package)
    }

    /// Workspace-relative path of the file this label names, for source-file labels.
    pub fn to_file_path(&self) -> PathBuf {
        if self.package.is_empty() {
            PathBuf::from(&self.name)
        } else {
            Path::new(&self.package).join(&self.name)
        }
    }

    /// Build the label naming a workspace-relative file inside `package`.
    pub fn for_file(package: &Path, file: &Path) -> Option<Self> {
        let rel = file.strip_prefix(package).ok()?;
        let package = path_to_label_string(package)?;
        let name = path_to_label_string(rel)?;
        if name.is_empty() {
            return None;
        }
        Some(Self::of(package, name))
    }
}

fn path_to_label_string(path: &Path) -> Option<String> {
    let mut out = String::new();
    for component in path.components() {
        let std::path::Component::Normal(part) = component else {
            continue;
        };
        if !out.is_empty() {
            out.push('/');
        }
        out.push_str(part.to_str()?);
    }
    Some(out)
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.repository.is_empty() {
            write!(f, "@{}", self.repository)?;
        }
        write!(f, "//{}:{}", self.package, self.name)
    }
}

impl FromStr for Label {
    type Err = LabelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Label {
    type Error = LabelError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Label> for String {
    fn from(label: Label) -> Self {
        label.to_string()
    }
}
