//! Per-language knowledge of rule classes, source attributes and dependency edges.
//!
//! The registry is populated explicitly at startup; callers may register additional
//! [`LanguageSupport`] implementations before building snapshots.

use crate::{label::Label, project_definition::LanguageClass, query_summary::QueryRule};
use std::{collections::BTreeSet, fmt, sync::Arc};

pub trait LanguageSupport: Send + Sync + fmt::Debug {
    /// Languages this implementation serves. It is consulted when any of them is enabled.
    fn supported_languages(&self) -> &[LanguageClass];

    fn supports_rule_class(&self, rule_class: &str) -> bool;

    /// Attributes whose labels name the rule's own source files.
    fn source_attributes(&self) -> &[&'static str];

    /// Add the labels `rule` depends on for compilation/analysis.
    fn add_dependencies(&self, rule: &QueryRule, deps: &mut BTreeSet<Label>);
}

/// A table-driven [`LanguageSupport`] covering a family of rule classes.
#[derive(Debug, Clone)]
pub struct RuleFamily {
    languages: Vec<LanguageClass>,
    rule_classes: Vec<&'static str>,
    source_attributes: Vec<&'static str>,
    dependency_attributes: Vec<&'static str>,
}

impl RuleFamily {
    pub fn new(
        languages: impl IntoIterator<Item = LanguageClass>,
        rule_classes: impl IntoIterator<Item = &'static str>,
        source_attributes: impl IntoIterator<Item = &'static str>,
        dependency_attributes: impl IntoIterator<Item = &'static str>,
    ) -> Self {
        Self {
            languages: languages.into_iter().collect(),
            rule_classes: rule_classes.into_iter().collect(),
            source_attributes: source_attributes.into_iter().collect(),
            dependency_attributes: dependency_attributes.into_iter().collect(),
        }
    }

    pub fn java() -> Self {
        Self::new(
            [LanguageClass::Java],
            [
                "java_library",
                "java_binary",
                "java_test",
                "java_lite_proto_library",
                "android_library",
                "android_binary",
                "android_local_test",
                "android_instrumentation_test",
            ],
            ["srcs"],
            ["deps", "exports", "runtime_deps", "plugins", "exported_plugins"],
        )
    }

    pub fn kotlin() -> Self {
        Self::new(
            [LanguageClass::Kotlin],
            [
                "kt_jvm_library",
                "kt_jvm_binary",
                "kt_jvm_test",
                "kt_android_library",
                "kt_android_local_test",
            ],
            ["srcs"],
            ["deps", "exports", "runtime_deps", "plugins"],
        )
    }

    pub fn cc() -> Self {
        Self::new(
            [LanguageClass::Cc],
            ["cc_library", "cc_binary", "cc_test"],
            ["srcs", "hdrs", "textual_hdrs"],
            ["deps", "implementation_deps"],
        )
    }

    pub fn python() -> Self {
        Self::new(
            [LanguageClass::Python],
            ["py_library", "py_binary", "py_test"],
            ["srcs"],
            ["deps"],
        )
    }

    pub fn go() -> Self {
        Self::new(
            [LanguageClass::Go],
            ["go_library", "go_binary", "go_test"],
            ["srcs"],
            ["deps", "embed"],
        )
    }
}

impl LanguageSupport for RuleFamily {
    fn supported_languages(&self) -> &[LanguageClass] {
        &self.languages
    }

    fn supports_rule_class(&self, rule_class: &str) -> bool {
        self.rule_classes.iter().any(|class| *class == rule_class)
    }

    fn source_attributes(&self) -> &[&'static str] {
        &self.source_attributes
    }

    fn add_dependencies(&self, rule: &QueryRule, deps: &mut BTreeSet<Label>) {
        for attr in &self.dependency_attributes {
            deps.extend(rule.attribute(attr).iter().cloned());
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct LanguageRegistry {
    supports: Vec<Arc<dyn LanguageSupport>>,
}

impl LanguageRegistry {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        registry.register(Arc::new(RuleFamily::java()));
        registry.register(Arc::new(RuleFamily::kotlin()));
        registry.register(Arc::new(RuleFamily::cc()));
        registry.register(Arc::new(RuleFamily::python()));
        registry.register(Arc::new(RuleFamily::go()));
        registry
    }

    pub fn register(&mut self, support: Arc<dyn LanguageSupport>) {
        self.supports.push(support);
    }

    /// Find the support handling `rule_class`, restricted to the enabled languages.
    pub fn for_rule_class(
        &self,
        rule_class: &str,
        enabled: &BTreeSet<LanguageClass>,
    ) -> Option<&dyn LanguageSupport> {
        self.supports
            .iter()
            .filter(|support| {
                support
                    .supported_languages()
                    .iter()
                    .any(|language| enabled.contains(language))
            })
            .find(|support| support.supports_rule_class(rule_class))
            .map(|support| support.as_ref())
    }

    pub fn supported_languages(&self) -> BTreeSet<LanguageClass> {
        self.supports
            .iter()
            .flat_map(|support| support.supported_languages().iter().copied())
            .collect()
    }
}
