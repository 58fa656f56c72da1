use crate::label::Label;
use std::collections::BTreeSet;

/// The targets that must be built to make a file analysable.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TargetsToBuild {
    /// Not applicable: no project loaded, or the file is outside the workspace/project.
    #[default]
    None,
    /// A source file, built through the targets that own it.
    SourceFile(BTreeSet<Label>),
    /// A BUILD file, covering every project target declared in its package.
    BuildFile(BTreeSet<Label>),
}

impl TargetsToBuild {
    pub const NONE: TargetsToBuild = TargetsToBuild::None;

    pub fn targets(&self) -> BTreeSet<Label> {
        match self {
            TargetsToBuild::None => BTreeSet::new(),
            TargetsToBuild::SourceFile(targets) | TargetsToBuild::BuildFile(targets) => {
                targets.clone()
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            TargetsToBuild::None => true,
            TargetsToBuild::SourceFile(targets) | TargetsToBuild::BuildFile(targets) => {
                targets.is_empty()
            }
        }
    }
}
