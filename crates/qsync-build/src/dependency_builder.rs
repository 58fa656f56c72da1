use crate::{
    aspect::{aspects_flag, write_aspect_file},
    bep::ParsedBepOutput,
    context::InvocationContext,
    error::BuildError,
    invoker::BuildInvoker,
    output_info::{
        group_artifacts, OutputInfo, DEPENDENCIES_OUTPUT_GROUP, RENDER_JARS_OUTPUT_GROUP,
    },
};
use qsync_core::{Label, OutputArtifact, ProjectDefinition};
use std::collections::BTreeSet;

/// Builds the external dependencies of project targets.
pub trait DependencyBuilder: Send + Sync {
    /// Build the dependencies of `targets` and return their attributed outputs.
    fn build(
        &self,
        ctx: &InvocationContext,
        definition: &ProjectDefinition,
        targets: &BTreeSet<Label>,
    ) -> Result<OutputInfo, BuildError>;

    /// Build the jars needed to render previews for `targets`.
    fn build_render_jar(
        &self,
        ctx: &InvocationContext,
        definition: &ProjectDefinition,
        targets: &BTreeSet<Label>,
    ) -> Result<Vec<OutputArtifact>, BuildError>;
}

pub struct BazelDependencyBuilder {
    invoker: BuildInvoker,
}

impl BazelDependencyBuilder {
    pub fn new(invoker: BuildInvoker) -> Self {
        Self { invoker }
    }

    fn run(
        &self,
        ctx: &InvocationContext,
        definition: &ProjectDefinition,
        targets: &BTreeSet<Label>,
        aspects: &[&str],
        output_group: &str,
    ) -> Result<Option<(i32, ParsedBepOutput)>, BuildError> {
        if targets.is_empty() {
            tracing::debug!(target = "qsync.build", "no targets to build");
            return Ok(None);
        }
        // A failed aspect write aborts the build.
        write_aspect_file(self.invoker.workspace_root(), definition)?;

        let flags = [
            aspects_flag(aspects),
            format!("--output_groups={output_group}"),
            "--noexperimental_run_validations".to_string(),
        ];
        let outcome = self.invoker.build(ctx, targets, &flags)?;
        Ok(Some((outcome.exit_code, outcome.bep)))
    }
}

impl DependencyBuilder for BazelDependencyBuilder {
    fn build(
        &self,
        ctx: &InvocationContext,
        definition: &ProjectDefinition,
        targets: &BTreeSet<Label>,
    ) -> Result<OutputInfo, BuildError> {
        let Some((exit_code, bep)) = self.run(
            ctx,
            definition,
            targets,
            &["collect_dependencies", "package_dependencies"],
            DEPENDENCIES_OUTPUT_GROUP,
        )?
        else {
            return Ok(OutputInfo::default());
        };

        let info = OutputInfo::from_bep(&bep, DEPENDENCIES_OUTPUT_GROUP, exit_code);
        tracing::info!(
            target = "qsync.build",
            exit_code,
            targets = info.artifacts.len(),
            artifacts = info.artifact_count(),
            unattributed = info.unattributed.len(),
            "collected dependency outputs"
        );
        if exit_code != 0 {
            return Err(BuildError::BuildFailed {
                exit_code,
                partial: Box::new(info),
            });
        }
        Ok(info)
    }

    fn build_render_jar(
        &self,
        ctx: &InvocationContext,
        definition: &ProjectDefinition,
        targets: &BTreeSet<Label>,
    ) -> Result<Vec<OutputArtifact>, BuildError> {
        let Some((exit_code, bep)) = self.run(
            ctx,
            definition,
            targets,
            &["collect_render_jars"],
            RENDER_JARS_OUTPUT_GROUP,
        )?
        else {
            return Ok(Vec::new());
        };

        if exit_code != 0 {
            let partial = OutputInfo {
                unattributed: group_artifacts(&bep, RENDER_JARS_OUTPUT_GROUP),
                targets_with_errors: bep.targets_with_errors().clone(),
                exit_code,
                ..OutputInfo::default()
            };
            return Err(BuildError::BuildFailed {
                exit_code,
                partial: Box::new(partial),
            });
        }
        Ok(group_artifacts(&bep, RENDER_JARS_OUTPUT_GROUP))
    }
}
