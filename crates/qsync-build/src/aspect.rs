use crate::error::BuildError;
use qsync_core::{workspace_path_string, ProjectDefinition, GENERATED_ASPECT_FILE};
use std::{
    fmt::Write as _,
    fs,
    path::{Path, PathBuf},
};

const ASPECT_TEMPLATE: &str = include_str!("../aspect/build_dependencies.bzl");
const PROJECT_MARKER: &str = "#insert __PROJECT__";

/// Label prefix through which build flags refer to the generated aspect file.
pub const ASPECT_LABEL: &str = "//:.aswb.bzl";

/// `--aspects` value naming the given aspects of the generated file.
pub fn aspects_flag(aspects: &[&str]) -> String {
    let names = aspects
        .iter()
        .map(|aspect| format!("{ASPECT_LABEL}%{aspect}"))
        .collect::<Vec<_>>()
        .join(",");
    format!("--aspects={names}")
}

/// The aspect file contents with the project boundary filled in.
pub fn render_aspect(definition: &ProjectDefinition) -> String {
    let mut project = String::from("INCLUDE = [\n");
    for dir in &definition.include_directories {
        let _ = writeln!(project, "  \"{}\",", directory_label(dir));
    }
    project.push_str("]\n\nEXCLUDE = [\n");
    for dir in &definition.exclude_directories {
        let _ = writeln!(project, "  \"{}\",", directory_label(dir));
    }
    project.push_str("]\n");
    ASPECT_TEMPLATE.replacen(PROJECT_MARKER, &project, 1)
}

/// Overwrite `<workspace_root>/.aswb.bzl` for the given project definition.
pub fn write_aspect_file(
    workspace_root: &Path,
    definition: &ProjectDefinition,
) -> Result<PathBuf, BuildError> {
    let path = workspace_root.join(GENERATED_ASPECT_FILE);
    fs::write(&path, render_aspect(definition)).map_err(|source| BuildError::AspectWrite {
        path: path.clone(),
        source,
    })?;
    tracing::debug!(target = "qsync.build", path = %path.display(), "wrote aspect file");
    Ok(path)
}

fn directory_label(dir: &Path) -> String {
    let dir = workspace_path_string(dir);
    if dir.is_empty() || dir == "." {
        "//".to_string()
    } else {
        format!("//{dir}")
    }
}
