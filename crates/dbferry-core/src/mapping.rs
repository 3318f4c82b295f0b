//! Migration mapping: strategy expansion into concrete tasks.
//!
//! A mapping is built once from a strategy and source/target lists,
//! validated, and then expanded into an ordered list of concrete
//! source→target tasks. The builder is pure; no UI or step sequencing
//! leaks in here.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::MappingError;
use crate::pattern::{ConflictResolution, MigrationPattern, MigrationStrategy, PatternResolver};

/// One managed instance participating in a mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceSpec {
    /// Cloud project owning the instance.
    pub project: String,
    /// Instance name within the project.
    pub instance: String,
    /// Databases declared for this instance; empty defers to discovery.
    #[serde(default)]
    pub databases: Vec<String>,
    /// Detected engine version, for version-based matching.
    #[serde(default)]
    pub engine_version: Option<String>,
}

impl InstanceSpec {
    /// Create an instance spec.
    pub fn new(project: impl Into<String>, instance: impl Into<String>) -> Self {
        Self {
            project: project.into(),
            instance: instance.into(),
            databases: Vec::new(),
            engine_version: None,
        }
    }

    /// Declare the instance's databases.
    pub fn with_databases<I, S>(mut self, databases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.databases = databases.into_iter().map(Into::into).collect();
        self
    }

    /// Set the detected engine version.
    pub fn with_engine_version(mut self, version: impl Into<String>) -> Self {
        self.engine_version = Some(version.into());
        self
    }

    /// Human label: `project:instance`.
    pub fn label(&self) -> String {
        format!("{}:{}", self.project, self.instance)
    }
}

/// One database rename produced by conflict resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseAssignment {
    /// Name on the source instance.
    pub source_name: String,
    /// Name on the target instance.
    pub target_name: String,
}

impl DatabaseAssignment {
    /// Assignment that keeps the source name.
    pub fn direct(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            source_name: name.clone(),
            target_name: name,
        }
    }

    /// Assignment that renames on the target.
    pub fn renamed(source_name: impl Into<String>, target_name: impl Into<String>) -> Self {
        Self {
            source_name: source_name.into(),
            target_name: target_name.into(),
        }
    }
}

/// One concrete source→target migration unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationTask {
    /// Source instance.
    pub source: InstanceSpec,
    /// Target instance.
    pub target: InstanceSpec,
    /// Database assignments; empty defers to discovery.
    pub databases: Vec<DatabaseAssignment>,
    /// Conflict policy the task was expanded under.
    pub conflict_resolution: ConflictResolution,
}

/// Derived mapping metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MappingMetadata {
    /// Detected topology pattern.
    pub pattern: MigrationPattern,
    /// Number of sources.
    pub source_count: usize,
    /// Number of targets.
    pub target_count: usize,
}

/// Summary counters for display and reporting.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MappingSummary {
    /// Expansion strategy.
    pub strategy: MigrationStrategy,
    /// Topology pattern, rendered (`1:1`, `N:1`, ...).
    pub mapping_type: String,
    /// Number of sources.
    pub total_sources: usize,
    /// Number of targets.
    pub total_targets: usize,
    /// Number of concrete tasks the mapping expands to.
    pub total_migrations: usize,
    /// Conflict policy.
    pub conflict_resolution: ConflictResolution,
}

/// A validated migration mapping.
///
/// Built once via [`MigrationMapping::builder`], immutable afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationMapping {
    /// Expansion strategy.
    pub strategy: MigrationStrategy,
    /// Source instances, in declaration order.
    pub sources: Vec<InstanceSpec>,
    /// Target instances, in declaration order.
    pub targets: Vec<InstanceSpec>,
    /// Conflict policy for overlapping database names.
    pub conflict_resolution: ConflictResolution,
    /// Explicit (source, target) index pairs for manual strategies.
    pub pairs: Option<Vec<(usize, usize)>>,
    /// Derived metadata.
    pub metadata: MappingMetadata,
}

impl MigrationMapping {
    /// Start building a mapping for the given strategy.
    pub fn builder(strategy: MigrationStrategy) -> MappingBuilder {
        MappingBuilder::new(strategy)
    }

    /// Structural validation: arity and conflict-policy rules per strategy.
    pub fn validate(&self) -> Result<(), MappingError> {
        if self.sources.is_empty() {
            return Err(MappingError::EmptySources);
        }
        if self.targets.is_empty() {
            return Err(MappingError::EmptyTargets);
        }

        let arity_err = |expected: &str| MappingError::StrategyArity {
            strategy: self.strategy,
            expected: expected.to_string(),
            actual: format!("{} sources, {} targets", self.sources.len(), self.targets.len()),
        };

        match self.strategy {
            MigrationStrategy::Simple => {
                if self.sources.len() != 1 || self.targets.len() != 1 {
                    return Err(arity_err("exactly one source and one target"));
                }
            }
            MigrationStrategy::Consolidate => {
                if self.targets.len() != 1 {
                    return Err(arity_err("exactly one target"));
                }
            }
            MigrationStrategy::Distribute
            | MigrationStrategy::Replicate
            | MigrationStrategy::SplitByDatabase => {
                if self.sources.len() != 1 {
                    return Err(arity_err("exactly one source"));
                }
            }
            MigrationStrategy::ManualMapping | MigrationStrategy::Custom => {
                let pairs = self
                    .pairs
                    .as_ref()
                    .ok_or(MappingError::MissingPairs {
                        strategy: self.strategy,
                    })?;
                for &pair in pairs {
                    if pair.0 >= self.sources.len() || pair.1 >= self.targets.len() {
                        return Err(MappingError::PairOutOfRange {
                            pair,
                            sources: self.sources.len(),
                            targets: self.targets.len(),
                        });
                    }
                }
            }
            MigrationStrategy::VersionBased | MigrationStrategy::RoundRobin => {}
        }

        // The chosen conflict policy must be offered under this strategy.
        let allowed = PatternResolver::conflict_resolution_options(self.strategy);
        if !allowed.contains(&self.conflict_resolution) {
            return Err(MappingError::StrategyArity {
                strategy: self.strategy,
                expected: format!("conflict resolution in {allowed:?}"),
                actual: self.conflict_resolution.to_string(),
            });
        }

        Ok(())
    }

    /// Expand the mapping into an ordered list of concrete tasks.
    pub fn expand(&self) -> Result<Vec<MigrationTask>, MappingError> {
        self.validate()?;

        match self.strategy {
            MigrationStrategy::Simple => Ok(vec![self.task(
                &self.sources[0],
                &self.targets[0],
                self.sources[0].databases.iter().map(DatabaseAssignment::direct).collect(),
            )]),
            MigrationStrategy::Consolidate => self.expand_consolidate(),
            MigrationStrategy::Distribute => Ok(self.expand_partitioned(false)),
            MigrationStrategy::SplitByDatabase => Ok(self.expand_partitioned(true)),
            MigrationStrategy::Replicate => Ok(self.expand_replicate()),
            MigrationStrategy::VersionBased => Ok(self.expand_version_based()),
            MigrationStrategy::RoundRobin => Ok(self.expand_round_robin()),
            MigrationStrategy::ManualMapping | MigrationStrategy::Custom => {
                Ok(self.expand_manual())
            }
        }
    }

    /// Group sizes by detected engine version, for version-based matching.
    ///
    /// Sources without a detected version are not grouped.
    pub fn version_groups(&self) -> BTreeMap<String, usize> {
        let mut groups = BTreeMap::new();
        for source in &self.sources {
            if let Some(version) = &source.engine_version {
                *groups.entry(version.clone()).or_insert(0) += 1;
            }
        }
        groups
    }

    /// Summary counters; `total_migrations` equals the expanded task count.
    pub fn summary(&self) -> Result<MappingSummary, MappingError> {
        Ok(MappingSummary {
            strategy: self.strategy,
            mapping_type: self.metadata.pattern.to_string(),
            total_sources: self.sources.len(),
            total_targets: self.targets.len(),
            total_migrations: self.expand()?.len(),
            conflict_resolution: self.conflict_resolution,
        })
    }

    fn task(
        &self,
        source: &InstanceSpec,
        target: &InstanceSpec,
        databases: Vec<DatabaseAssignment>,
    ) -> MigrationTask {
        MigrationTask {
            source: source.clone(),
            target: target.clone(),
            databases,
            conflict_resolution: self.conflict_resolution,
        }
    }

    /// Every source into the single target, duplicates resolved per policy.
    fn expand_consolidate(&self) -> Result<Vec<MigrationTask>, MappingError> {
        let target = &self.targets[0];

        // Occurrences per database name, in source declaration order.
        let mut seen: BTreeMap<&str, usize> = BTreeMap::new();
        for source in &self.sources {
            for db in &source.databases {
                *seen.entry(db.as_str()).or_insert(0) += 1;
            }
        }

        let mut tasks = Vec::with_capacity(self.sources.len());
        let mut next_suffix: BTreeMap<&str, usize> = BTreeMap::new();

        for source in &self.sources {
            let mut assignments = Vec::with_capacity(source.databases.len());
            for db in &source.databases {
                let conflicted = seen.get(db.as_str()).copied().unwrap_or(0) > 1;
                let assignment = if !conflicted {
                    DatabaseAssignment::direct(db)
                } else {
                    match self.conflict_resolution {
                        ConflictResolution::Fail => {
                            let instances = self
                                .sources
                                .iter()
                                .filter(|s| s.databases.iter().any(|d| d == db))
                                .map(|s| s.instance.clone())
                                .collect();
                            return Err(MappingError::DatabaseConflict {
                                database: db.clone(),
                                instances,
                            });
                        }
                        ConflictResolution::Prefix => {
                            DatabaseAssignment::renamed(db, format!("{}_{}", source.instance, db))
                        }
                        ConflictResolution::Suffix => {
                            let n = next_suffix.entry(db.as_str()).or_insert(1);
                            let assignment = if *n == 1 {
                                DatabaseAssignment::direct(db)
                            } else {
                                DatabaseAssignment::renamed(db, format!("{db}_{n}"))
                            };
                            *n += 1;
                            assignment
                        }
                        // Same target name on purpose; the import layer unions.
                        ConflictResolution::Merge => DatabaseAssignment::direct(db),
                        ConflictResolution::RenameSchema => DatabaseAssignment::direct(db),
                    }
                };
                assignments.push(assignment);
            }
            tasks.push(self.task(source, target, assignments));
        }

        Ok(tasks)
    }

    /// One source partitioned into contiguous chunks across the targets.
    ///
    /// `sorted` additionally orders databases by name first, so each target
    /// receives one alphabetical range.
    fn expand_partitioned(&self, sorted: bool) -> Vec<MigrationTask> {
        let source = &self.sources[0];
        let mut databases = source.databases.clone();
        if sorted {
            databases.sort();
        }

        let targets = self.targets.len();
        let chunk = databases.len().div_ceil(targets).max(1);

        databases
            .chunks(chunk)
            .zip(&self.targets)
            .map(|(dbs, target)| {
                self.task(
                    source,
                    target,
                    dbs.iter().map(DatabaseAssignment::direct).collect(),
                )
            })
            .collect()
    }

    /// One source duplicated to every target.
    fn expand_replicate(&self) -> Vec<MigrationTask> {
        let source = &self.sources[0];
        self.targets
            .iter()
            .map(|target| {
                self.task(
                    source,
                    target,
                    source.databases.iter().map(DatabaseAssignment::direct).collect(),
                )
            })
            .collect()
    }

    /// Sources matched cyclically to targets sharing their engine version.
    ///
    /// Sources whose version matches no target fall back to cyclic
    /// assignment over all targets, custom-mapping style.
    fn expand_version_based(&self) -> Vec<MigrationTask> {
        let mut targets_by_version: BTreeMap<&str, Vec<&InstanceSpec>> = BTreeMap::new();
        for target in &self.targets {
            if let Some(version) = &target.engine_version {
                targets_by_version.entry(version.as_str()).or_default().push(target);
            }
        }

        let mut cursor_by_version: BTreeMap<&str, usize> = BTreeMap::new();
        let mut fallback_cursor = 0usize;
        let mut tasks = Vec::with_capacity(self.sources.len());

        for source in &self.sources {
            let matched = source
                .engine_version
                .as_deref()
                .and_then(|v| targets_by_version.get(v).map(|group| (v, group)));

            let target = match matched {
                Some((version, group)) => {
                    let cursor = cursor_by_version.entry(version).or_insert(0);
                    let target = group[*cursor % group.len()];
                    *cursor += 1;
                    target
                }
                None => {
                    tracing::warn!(
                        source = %source.label(),
                        version = source.engine_version.as_deref().unwrap_or("unknown"),
                        "no version-matched target, falling back to cyclic assignment"
                    );
                    let target = &self.targets[fallback_cursor % self.targets.len()];
                    fallback_cursor += 1;
                    target
                }
            };

            tasks.push(self.task(
                source,
                target,
                source.databases.iter().map(DatabaseAssignment::direct).collect(),
            ));
        }

        tasks
    }

    /// Sources assigned to targets cyclically by index.
    fn expand_round_robin(&self) -> Vec<MigrationTask> {
        self.sources
            .iter()
            .enumerate()
            .map(|(i, source)| {
                let target = &self.targets[i % self.targets.len()];
                self.task(
                    source,
                    target,
                    source.databases.iter().map(DatabaseAssignment::direct).collect(),
                )
            })
            .collect()
    }

    /// Caller-supplied explicit pairs, no inference.
    fn expand_manual(&self) -> Vec<MigrationTask> {
        // validate() guarantees pairs exist and are in range.
        let pairs = self.pairs.as_deref().unwrap_or_default();
        pairs
            .iter()
            .map(|&(s, t)| {
                let source = &self.sources[s];
                self.task(
                    source,
                    &self.targets[t],
                    source.databases.iter().map(DatabaseAssignment::direct).collect(),
                )
            })
            .collect()
    }
}

/// Builder for [`MigrationMapping`].
#[derive(Debug, Clone)]
pub struct MappingBuilder {
    strategy: MigrationStrategy,
    sources: Vec<InstanceSpec>,
    targets: Vec<InstanceSpec>,
    conflict_resolution: ConflictResolution,
    pairs: Option<Vec<(usize, usize)>>,
}

impl MappingBuilder {
    fn new(strategy: MigrationStrategy) -> Self {
        Self {
            strategy,
            sources: Vec::new(),
            targets: Vec::new(),
            conflict_resolution: ConflictResolution::default(),
            pairs: None,
        }
    }

    /// Add one source instance.
    pub fn source(mut self, source: InstanceSpec) -> Self {
        self.sources.push(source);
        self
    }

    /// Add several source instances.
    pub fn sources<I: IntoIterator<Item = InstanceSpec>>(mut self, sources: I) -> Self {
        self.sources.extend(sources);
        self
    }

    /// Add one target instance.
    pub fn target(mut self, target: InstanceSpec) -> Self {
        self.targets.push(target);
        self
    }

    /// Add several target instances.
    pub fn targets<I: IntoIterator<Item = InstanceSpec>>(mut self, targets: I) -> Self {
        self.targets.extend(targets);
        self
    }

    /// Set the conflict policy (default `fail`).
    pub fn conflict_resolution(mut self, resolution: ConflictResolution) -> Self {
        self.conflict_resolution = resolution;
        self
    }

    /// Supply explicit (source, target) index pairs.
    pub fn pairs(mut self, pairs: Vec<(usize, usize)>) -> Self {
        self.pairs = Some(pairs);
        self
    }

    /// Validate and freeze the mapping.
    pub fn build(self) -> Result<MigrationMapping, MappingError> {
        let pattern = PatternResolver::detect_pattern(self.sources.len(), self.targets.len())?;
        let mapping = MigrationMapping {
            metadata: MappingMetadata {
                pattern,
                source_count: self.sources.len(),
                target_count: self.targets.len(),
            },
            strategy: self.strategy,
            sources: self.sources,
            targets: self.targets,
            conflict_resolution: self.conflict_resolution,
            pairs: self.pairs,
        };
        mapping.validate()?;
        Ok(mapping)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(instance: &str, dbs: &[&str]) -> InstanceSpec {
        InstanceSpec::new("acme-prod", instance).with_databases(dbs.iter().copied())
    }

    #[test]
    fn test_simple_expansion() {
        let mapping = MigrationMapping::builder(MigrationStrategy::Simple)
            .source(spec("src", &["orders", "billing"]))
            .target(spec("dst", &[]))
            .build()
            .unwrap();

        let tasks = mapping.expand().unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].databases.len(), 2);
        assert_eq!(tasks[0].databases[0], DatabaseAssignment::direct("orders"));
        assert_eq!(mapping.metadata.pattern, MigrationPattern::OneToOne);
    }

    #[test]
    fn test_simple_arity_enforced() {
        let result = MigrationMapping::builder(MigrationStrategy::Simple)
            .source(spec("a", &[]))
            .source(spec("b", &[]))
            .target(spec("t", &[]))
            .build();
        assert!(matches!(result, Err(MappingError::StrategyArity { .. })));
    }

    #[test]
    fn test_consolidate_fail_on_conflict() {
        let result = MigrationMapping::builder(MigrationStrategy::Consolidate)
            .source(spec("a", &["orders"]))
            .source(spec("b", &["orders"]))
            .target(spec("t", &[]))
            .build()
            .unwrap()
            .expand();

        match result {
            Err(MappingError::DatabaseConflict { database, instances }) => {
                assert_eq!(database, "orders");
                assert_eq!(instances, vec!["a".to_string(), "b".to_string()]);
            }
            other => panic!("expected DatabaseConflict, got {other:?}"),
        }
    }

    #[test]
    fn test_consolidate_prefix() {
        let tasks = MigrationMapping::builder(MigrationStrategy::Consolidate)
            .source(spec("a", &["orders", "inventory"]))
            .source(spec("b", &["orders"]))
            .target(spec("t", &[]))
            .conflict_resolution(ConflictResolution::Prefix)
            .build()
            .unwrap()
            .expand()
            .unwrap();

        assert_eq!(tasks.len(), 2);
        // Conflicting names are prefixed with the source instance name.
        assert_eq!(tasks[0].databases[0].target_name, "a_orders");
        // Non-conflicting names pass through.
        assert_eq!(tasks[0].databases[1].target_name, "inventory");
        assert_eq!(tasks[1].databases[0].target_name, "b_orders");
    }

    #[test]
    fn test_consolidate_suffix() {
        let tasks = MigrationMapping::builder(MigrationStrategy::Consolidate)
            .source(spec("a", &["orders"]))
            .source(spec("b", &["orders"]))
            .source(spec("c", &["orders"]))
            .target(spec("t", &[]))
            .conflict_resolution(ConflictResolution::Suffix)
            .build()
            .unwrap()
            .expand()
            .unwrap();

        assert_eq!(tasks[0].databases[0].target_name, "orders");
        assert_eq!(tasks[1].databases[0].target_name, "orders_2");
        assert_eq!(tasks[2].databases[0].target_name, "orders_3");
    }

    #[test]
    fn test_consolidate_merge_keeps_names() {
        let tasks = MigrationMapping::builder(MigrationStrategy::Consolidate)
            .source(spec("a", &["orders"]))
            .source(spec("b", &["orders"]))
            .target(spec("t", &[]))
            .conflict_resolution(ConflictResolution::Merge)
            .build()
            .unwrap()
            .expand()
            .unwrap();

        assert_eq!(tasks[0].databases[0].target_name, "orders");
        assert_eq!(tasks[1].databases[0].target_name, "orders");
    }

    #[test]
    fn test_merge_rejected_outside_consolidate() {
        let result = MigrationMapping::builder(MigrationStrategy::RoundRobin)
            .source(spec("a", &[]))
            .source(spec("b", &[]))
            .target(spec("t", &[]))
            .conflict_resolution(ConflictResolution::Merge)
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_distribute_partitions() {
        let tasks = MigrationMapping::builder(MigrationStrategy::Distribute)
            .source(spec("src", &["a", "b", "c", "d", "e"]))
            .targets([spec("t1", &[]), spec("t2", &[])])
            .build()
            .unwrap()
            .expand()
            .unwrap();

        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[0].databases.len(), 3);
        assert_eq!(tasks[1].databases.len(), 2);

        let total: usize = tasks.iter().map(|t| t.databases.len()).sum();
        assert_eq!(total, 5);
    }

    #[test]
    fn test_replicate_duplicates() {
        let tasks = MigrationMapping::builder(MigrationStrategy::Replicate)
            .source(spec("src", &["orders", "billing"]))
            .targets([spec("t1", &[]), spec("t2", &[]), spec("t3", &[])])
            .build()
            .unwrap()
            .expand()
            .unwrap();

        assert_eq!(tasks.len(), 3);
        for task in &tasks {
            assert_eq!(task.databases.len(), 2);
        }
    }

    #[test]
    fn test_split_by_database_sorts() {
        let tasks = MigrationMapping::builder(MigrationStrategy::SplitByDatabase)
            .source(spec("src", &["zeta", "alpha", "mid"]))
            .targets([spec("t1", &[]), spec("t2", &[])])
            .build()
            .unwrap()
            .expand()
            .unwrap();

        assert_eq!(tasks[0].databases[0].source_name, "alpha");
        assert_eq!(tasks[0].databases[1].source_name, "mid");
        assert_eq!(tasks[1].databases[0].source_name, "zeta");
    }

    #[test]
    fn test_version_groups() {
        let mapping = MigrationMapping::builder(MigrationStrategy::VersionBased)
            .source(spec("a", &[]).with_engine_version("11"))
            .source(spec("b", &[]).with_engine_version("11"))
            .source(spec("c", &[]).with_engine_version("13"))
            .targets([
                spec("t1", &[]).with_engine_version("11"),
                spec("t2", &[]).with_engine_version("13"),
                spec("t3", &[]).with_engine_version("13"),
            ])
            .build()
            .unwrap();

        let groups = mapping.version_groups();
        assert_eq!(groups.get("11"), Some(&2));
        assert_eq!(groups.get("13"), Some(&1));
    }

    #[test]
    fn test_version_based_matches_versions() {
        let tasks = MigrationMapping::builder(MigrationStrategy::VersionBased)
            .source(spec("a", &[]).with_engine_version("11"))
            .source(spec("b", &[]).with_engine_version("13"))
            .source(spec("c", &[]).with_engine_version("11"))
            .targets([
                spec("t11", &[]).with_engine_version("11"),
                spec("t13", &[]).with_engine_version("13"),
                spec("t11b", &[]).with_engine_version("11"),
            ])
            .build()
            .unwrap()
            .expand()
            .unwrap();

        assert_eq!(tasks[0].target.instance, "t11");
        assert_eq!(tasks[1].target.instance, "t13");
        // Second v11 source cycles to the next v11 target.
        assert_eq!(tasks[2].target.instance, "t11b");
    }

    #[test]
    fn test_version_based_fallback_cycles() {
        let tasks = MigrationMapping::builder(MigrationStrategy::VersionBased)
            .source(spec("a", &[]).with_engine_version("9.6"))
            .source(spec("b", &[]))
            .targets([
                spec("t1", &[]).with_engine_version("11"),
                spec("t2", &[]).with_engine_version("13"),
            ])
            .build()
            .unwrap()
            .expand()
            .unwrap();

        // Neither source matches a target version; both fall back cyclically.
        assert_eq!(tasks[0].target.instance, "t1");
        assert_eq!(tasks[1].target.instance, "t2");
    }

    #[test]
    fn test_round_robin_cycles() {
        let tasks = MigrationMapping::builder(MigrationStrategy::RoundRobin)
            .sources([spec("a", &[]), spec("b", &[]), spec("c", &[])])
            .targets([spec("t1", &[]), spec("t2", &[])])
            .build()
            .unwrap()
            .expand()
            .unwrap();

        assert_eq!(tasks[0].target.instance, "t1");
        assert_eq!(tasks[1].target.instance, "t2");
        assert_eq!(tasks[2].target.instance, "t1");
    }

    #[test]
    fn test_manual_requires_pairs() {
        let result = MigrationMapping::builder(MigrationStrategy::ManualMapping)
            .source(spec("a", &[]))
            .target(spec("t", &[]))
            .build();
        assert!(matches!(result, Err(MappingError::MissingPairs { .. })));
    }

    #[test]
    fn test_manual_pair_out_of_range() {
        let result = MigrationMapping::builder(MigrationStrategy::ManualMapping)
            .source(spec("a", &[]))
            .target(spec("t", &[]))
            .pairs(vec![(0, 3)])
            .build();
        assert!(matches!(result, Err(MappingError::PairOutOfRange { .. })));
    }

    #[test]
    fn test_manual_expansion_order() {
        let tasks = MigrationMapping::builder(MigrationStrategy::ManualMapping)
            .sources([spec("a", &["x"]), spec("b", &["y"])])
            .targets([spec("t1", &[]), spec("t2", &[])])
            .pairs(vec![(1, 0), (0, 1)])
            .build()
            .unwrap()
            .expand()
            .unwrap();

        assert_eq!(tasks[0].source.instance, "b");
        assert_eq!(tasks[0].target.instance, "t1");
        assert_eq!(tasks[1].source.instance, "a");
        assert_eq!(tasks[1].target.instance, "t2");
    }

    #[test]
    fn test_summary_counts_match_expansion() {
        let cases: Vec<MigrationMapping> = vec![
            MigrationMapping::builder(MigrationStrategy::Simple)
                .source(spec("a", &["x"]))
                .target(spec("t", &[]))
                .build()
                .unwrap(),
            MigrationMapping::builder(MigrationStrategy::Consolidate)
                .sources([spec("a", &["x"]), spec("b", &["y"]), spec("c", &["z"])])
                .target(spec("t", &[]))
                .build()
                .unwrap(),
            MigrationMapping::builder(MigrationStrategy::Replicate)
                .source(spec("a", &["x"]))
                .targets([spec("t1", &[]), spec("t2", &[])])
                .build()
                .unwrap(),
            MigrationMapping::builder(MigrationStrategy::RoundRobin)
                .sources([spec("a", &[]), spec("b", &[])])
                .targets([spec("t1", &[]), spec("t2", &[]), spec("t3", &[])])
                .build()
                .unwrap(),
        ];

        for mapping in cases {
            let summary = mapping.summary().unwrap();
            assert_eq!(
                summary.total_migrations,
                mapping.expand().unwrap().len(),
                "summary mismatch for {}",
                mapping.strategy
            );
        }
    }

    #[test]
    fn test_fan_in_scenario() {
        // Two sources in p1, one target in p2.
        let mapping = MigrationMapping::builder(MigrationStrategy::Consolidate)
            .source(InstanceSpec::new("p1", "i1").with_databases(["db_a"]))
            .source(InstanceSpec::new("p1", "i2").with_databases(["db_b"]))
            .target(InstanceSpec::new("p2", "t1"))
            .build()
            .unwrap();

        assert_eq!(mapping.metadata.pattern, MigrationPattern::ManyToOne);
        assert_eq!(
            PatternResolver::recommended_strategy(mapping.metadata.pattern),
            MigrationStrategy::Consolidate
        );
        assert_eq!(mapping.conflict_resolution, ConflictResolution::Fail);

        let summary = mapping.summary().unwrap();
        assert_eq!(summary.total_migrations, 2);
        assert_eq!(summary.mapping_type, "N:1");
    }
}
