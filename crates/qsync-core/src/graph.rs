use crate::{
    label::Label, languages::LanguageRegistry, project_definition::ProjectDefinition,
    query_summary::QuerySummary,
};
use std::{
    collections::{BTreeMap, BTreeSet, VecDeque},
    path::{Path, PathBuf},
};

/// The resolved project graph: which target owns each source file and which targets each
/// project target depends on.
///
/// Only rules of enabled languages inside the project boundary are project targets. Any
/// dependency that is not a project target is an *external* dependency that has to be built
/// before files depending on it can be analysed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildGraph {
    file_to_target: BTreeMap<PathBuf, Label>,
    target_deps: BTreeMap<Label, BTreeSet<Label>>,
    reverse_deps: BTreeMap<Label, BTreeSet<Label>>,
    target_sources: BTreeMap<Label, BTreeSet<PathBuf>>,
    package_targets: BTreeMap<PathBuf, BTreeSet<Label>>,
}

impl BuildGraph {
    pub fn build(
        summary: &QuerySummary,
        definition: &ProjectDefinition,
        registry: &LanguageRegistry,
    ) -> Self {
        let mut graph = BuildGraph::default();

        for (label, rule) in summary.rules() {
            if label.is_external() || !definition.is_included(&label.package_path()) {
                continue;
            }
            let Some(support) =
                registry.for_rule_class(&rule.rule_class, &definition.language_classes)
            else {
                continue;
            };

            let mut deps = BTreeSet::new();
            support.add_dependencies(rule, &mut deps);
            deps.remove(label);

            let mut sources = BTreeSet::new();
            for attr in support.source_attributes() {
                for src in rule.attribute(attr) {
                    // Sources produced by other rules are build outputs, not workspace files.
                    if src.is_external() || summary.rule(src).is_some() {
                        continue;
                    }
                    let path = src.to_file_path();
                    if !definition.is_included(&path) {
                        continue;
                    }
                    sources.insert(path);
                }
            }

            for path in &sources {
                match graph.file_to_target.get(path) {
                    Some(existing) if existing <= label => {}
                    _ => {
                        graph.file_to_target.insert(path.clone(), label.clone());
                    }
                }
            }

            graph
                .package_targets
                .entry(label.package_path())
                .or_default()
                .insert(label.clone());
            graph.target_sources.insert(label.clone(), sources);
            graph.target_deps.insert(label.clone(), deps);
        }

        for (label, deps) in &graph.target_deps {
            for dep in deps {
                graph
                    .reverse_deps
                    .entry(dep.clone())
                    .or_default()
                    .insert(label.clone());
            }
        }

        tracing::debug!(
            target = "qsync.graph",
            targets = graph.target_deps.len(),
            files = graph.file_to_target.len(),
            "built project graph"
        );
        graph
    }

    pub fn is_project_target(&self, label: &Label) -> bool {
        self.target_deps.contains_key(label)
    }

    pub fn project_targets(&self) -> impl Iterator<Item = &Label> {
        self.target_deps.keys()
    }

    pub fn get_target_owner(&self, path: &Path) -> Option<&Label> {
        self.file_to_target.get(path)
    }

    pub fn target_sources(&self, label: &Label) -> Option<&BTreeSet<PathBuf>> {
        self.target_sources.get(label)
    }

    pub fn targets_in_package(&self, package: &Path) -> Option<&BTreeSet<Label>> {
        self.package_targets.get(package)
    }

    pub fn source_file_count(&self) -> usize {
        self.file_to_target.len()
    }

    /// The external dependency closure of the target owning `path`.
    ///
    /// Returns `None` when no project target owns the file.
    pub fn get_file_dependencies(&self, path: &Path) -> Option<BTreeSet<Label>> {
        let owner = self.get_target_owner(path)?;
        Some(self.external_dependencies([owner]))
    }

    /// Walk the dependencies of `roots` through project targets, collecting every dependency
    /// that lies outside the project.
    pub fn external_dependencies<'a>(
        &self,
        roots: impl IntoIterator<Item = &'a Label>,
    ) -> BTreeSet<Label> {
        let mut external = BTreeSet::new();
        let mut visited = BTreeSet::new();
        let mut queue = roots.into_iter().cloned().collect::<VecDeque<_>>();

        while let Some(label) = queue.pop_front() {
            if !visited.insert(label.clone()) {
                continue;
            }
            let Some(deps) = self.target_deps.get(&label) else {
                continue;
            };
            for dep in deps {
                if self.is_project_target(dep) {
                    queue.push_back(dep.clone());
                } else {
                    external.insert(dep.clone());
                }
            }
        }
        external
    }

    /// Project targets that depend, directly or transitively, on any of `targets`.
    pub fn get_targets_depending_on(&self, targets: &BTreeSet<Label>) -> BTreeSet<Label> {
        let mut result = BTreeSet::new();
        let mut queue = targets.iter().cloned().collect::<VecDeque<_>>();
        while let Some(label) = queue.pop_front() {
            let Some(rdeps) = self.reverse_deps.get(&label) else {
                continue;
            };
            for rdep in rdeps {
                if result.insert(rdep.clone()) {
                    queue.push_back(rdep.clone());
                }
            }
        }
        result
    }
}
