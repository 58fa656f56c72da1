use crate::{context::SyncContext, error::SyncError};
use qsync_build::QueryRunner;
use qsync_core::{
    plan_refresh, PostQuerySyncData, ProjectDefinition, QuerySummaryDelta, RefreshPlan, VcsState,
};
use std::sync::Arc;

/// Brings persisted query data up to date, querying as little as possible.
#[derive(Clone)]
pub struct ProjectRefresher {
    query: Arc<dyn QueryRunner>,
}

impl ProjectRefresher {
    pub fn new(query: Arc<dyn QueryRunner>) -> Self {
        Self { query }
    }

    /// Decide between no query, a partial query and a full query, and run it.
    pub fn refresh(
        &self,
        ctx: &SyncContext,
        previous: Option<&PostQuerySyncData>,
        definition: &ProjectDefinition,
        vcs_state: Option<VcsState>,
    ) -> Result<PostQuerySyncData, SyncError> {
        let Some(previous) = previous else {
            ctx.info("No previous sync state; querying the whole project");
            return self.full_query(ctx, definition, vcs_state);
        };

        match plan_refresh(previous, definition, vcs_state.as_ref()) {
            RefreshPlan::Noop => {
                ctx.info("Nothing changed since the last sync");
                Ok(PostQuerySyncData::new(
                    definition.clone(),
                    vcs_state,
                    previous.query_summary.clone(),
                ))
            }
            RefreshPlan::Full { reason } => {
                ctx.info(format!("Full query required: {reason}"));
                self.full_query(ctx, definition, vcs_state)
            }
            RefreshPlan::Partial(affected) => {
                if !affected.unowned_files.is_empty() {
                    tracing::debug!(
                        target = "qsync.sync",
                        count = affected.unowned_files.len(),
                        "changed files outside any known package"
                    );
                }
                let summary = match affected.query_expression() {
                    Some(expression) => {
                        ctx.info(format!(
                            "Querying {} modified package(s)",
                            affected.modified.len()
                        ));
                        self.query.query(ctx.invocation(), &expression)?
                    }
                    None => Default::default(),
                };
                let delta = QuerySummaryDelta {
                    modified_packages: affected.modified,
                    deleted_packages: affected.deleted,
                    summary,
                };
                Ok(PostQuerySyncData::new(
                    definition.clone(),
                    vcs_state,
                    previous.query_summary.apply_delta(&delta),
                ))
            }
        }
    }

    pub fn full_query(
        &self,
        ctx: &SyncContext,
        definition: &ProjectDefinition,
        vcs_state: Option<VcsState>,
    ) -> Result<PostQuerySyncData, SyncError> {
        let expression = definition.query_expression().ok_or_else(|| {
            SyncError::Definition("no project directories are included".to_string())
        })?;
        let summary = self.query.query(ctx.invocation(), &expression)?;
        Ok(PostQuerySyncData::new(
            definition.clone(),
            vcs_state,
            summary,
        ))
    }
}
