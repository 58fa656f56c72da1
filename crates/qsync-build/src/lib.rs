//! Bazel invocations for query-based sync.
//!
//! - `query` with streamed JSON output, parsed into a [`QuerySummary`](qsync_core::QuerySummary)
//! - dependency builds through the generated `.aswb.bzl` aspect file
//! - build event stream parsing and attribution of outputs to targets ([`OutputInfo`])

mod aspect;
mod bep;
mod command;
mod context;
mod dependency_builder;
mod error;
mod invoker;
mod output_info;
mod query;

pub use crate::{
    aspect::{aspects_flag, render_aspect, write_aspect_file, ASPECT_LABEL},
    bep::{BepFile, ParsedBepOutput},
    command::{CommandOutput, CommandRunner, DefaultCommandRunner},
    context::InvocationContext,
    dependency_builder::{BazelDependencyBuilder, DependencyBuilder},
    error::{BepError, BuildError},
    invoker::{BuildInvoker, BuildOutcome, InvokerSettings},
    output_info::{
        group_artifacts, ArtifactKind, OutputInfo, TargetArtifact, DEPENDENCIES_OUTPUT_GROUP,
        DEPENDENCY_INFO_SUFFIX, RENDER_JARS_OUTPUT_GROUP,
    },
    query::{BazelQueryRunner, QueryRunner},
};
