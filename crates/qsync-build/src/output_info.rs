use crate::bep::{BepFile, ParsedBepOutput};
use qsync_core::{timestamp_digest, Label, OutputArtifact};
use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeMap, BTreeSet, HashMap},
    fmt, io,
    path::Path,
};

/// Output group produced by the dependency aspects.
pub const DEPENDENCIES_OUTPUT_GROUP: &str = "ij_query_sync";
/// Output group produced by the render-jar aspect.
pub const RENDER_JARS_OUTPUT_GROUP: &str = "ij_query_sync_render_jars";
/// Suffix of the per-target manifests written by the aspects.
pub const DEPENDENCY_INFO_SUFFIX: &str = ".dependency_info.json";

/// What an artifact is used for; decides where it is cached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    Jar,
    Aar,
    GenSrc,
    Other,
}

impl ArtifactKind {
    pub const ALL: [ArtifactKind; 4] = [
        ArtifactKind::Jar,
        ArtifactKind::Aar,
        ArtifactKind::GenSrc,
        ArtifactKind::Other,
    ];

    /// Cache sub-directory for this kind.
    pub fn dir_name(self) -> &'static str {
        match self {
            ArtifactKind::Jar => "jars",
            ArtifactKind::Aar => "aars",
            ArtifactKind::GenSrc => "gensrc",
            ArtifactKind::Other => "other",
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dir_name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TargetArtifact {
    pub kind: ArtifactKind,
    pub artifact: OutputArtifact,
}

/// The outputs of one dependency build, attributed to the targets that produced them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutputInfo {
    pub artifacts: BTreeMap<Label, Vec<TargetArtifact>>,
    /// Artifacts in the output group that no manifest claims.
    pub unattributed: Vec<OutputArtifact>,
    pub targets_with_errors: BTreeSet<Label>,
    pub exit_code: i32,
}

impl OutputInfo {
    pub fn targets(&self) -> impl Iterator<Item = &Label> {
        self.artifacts.keys()
    }

    pub fn artifacts_for(&self, label: &Label) -> &[TargetArtifact] {
        self.artifacts.get(label).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn artifact_count(&self) -> usize {
        self.artifacts.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty() && self.unattributed.is_empty()
    }

    /// Attribute the artifacts of `group` using the aspect manifests found in the same group.
    ///
    /// Unreadable manifests are logged and their files end up unattributed.
    pub fn from_bep(parsed: &ParsedBepOutput, group: &str, exit_code: i32) -> Self {
        let mut by_path = HashMap::new();
        let mut manifests = Vec::new();
        for file in parsed.output_group_files(group) {
            let Some(artifact) = to_artifact(file, group) else {
                tracing::warn!(
                    target = "qsync.build",
                    file = %file.name,
                    uri = %file.uri,
                    "ignoring build output without a local file"
                );
                continue;
            };
            if file.name.ends_with(DEPENDENCY_INFO_SUFFIX) {
                manifests.push(artifact);
            } else {
                by_path.insert(artifact.relative_path.clone(), artifact);
            }
        }

        let mut info = OutputInfo {
            targets_with_errors: parsed.targets_with_errors().clone(),
            exit_code,
            ..OutputInfo::default()
        };

        for manifest in manifests {
            let entry = match read_manifest(&manifest.local_path) {
                Ok(entry) => entry,
                Err(err) => {
                    tracing::warn!(
                        target = "qsync.build",
                        path = %manifest.local_path.display(),
                        error = %err,
                        "failed to read dependency manifest"
                    );
                    continue;
                }
            };
            let outputs = info.artifacts.entry(entry.label.clone()).or_default();
            for (kind, paths) in [
                (ArtifactKind::Jar, &entry.jars),
                (ArtifactKind::Aar, &entry.ide_aars),
                (ArtifactKind::GenSrc, &entry.gen_srcs),
                (ArtifactKind::Other, &entry.other),
            ] {
                for path in paths {
                    match by_path.get(Path::new(path)) {
                        Some(artifact) => outputs.push(TargetArtifact {
                            kind,
                            artifact: artifact.clone(),
                        }),
                        None => tracing::debug!(
                            target = "qsync.build",
                            label = %entry.label,
                            path = %path,
                            "manifest entry not present in build outputs"
                        ),
                    }
                }
            }
        }

        let attributed = info
            .artifacts
            .values()
            .flatten()
            .map(|a| a.artifact.relative_path.clone())
            .collect::<BTreeSet<_>>();
        let mut unattributed = by_path
            .into_values()
            .filter(|a| !attributed.contains(&a.relative_path))
            .collect::<Vec<_>>();
        unattributed.sort();
        info.unattributed = unattributed;
        info
    }
}

/// All artifacts of `group`, without attribution.
pub fn group_artifacts(parsed: &ParsedBepOutput, group: &str) -> Vec<OutputArtifact> {
    parsed
        .output_group_files(group)
        .into_iter()
        .filter_map(|file| to_artifact(file, group))
        .collect()
}

fn to_artifact(file: &BepFile, group: &str) -> Option<OutputArtifact> {
    let local_path = file.local_path()?;
    let digest = match &file.digest {
        Some(digest) => digest.clone(),
        None => timestamp_digest(&local_path).unwrap_or_default(),
    };
    Some(OutputArtifact::new(
        file.relative_path(),
        local_path,
        digest,
        group,
    ))
}

/// Per-target manifest written by the aspects; paths are build-system relative.
#[derive(Debug, Deserialize)]
struct DependencyManifest {
    label: Label,
    #[serde(default)]
    jars: Vec<String>,
    #[serde(default)]
    ide_aars: Vec<String>,
    #[serde(default)]
    gen_srcs: Vec<String>,
    #[serde(default)]
    other: Vec<String>,
}

fn read_manifest(path: &Path) -> io::Result<DependencyManifest> {
    let bytes = std::fs::read(path)?;
    Ok(serde_json::from_slice(&bytes)?)
}
