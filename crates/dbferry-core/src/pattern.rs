//! Topology pattern detection and strategy resolution.
//!
//! A pattern classifies the source/target instance counts; a strategy is
//! the algorithm that expands a pattern into concrete tasks. Resolution is
//! pure rule tables, no I/O.

use serde::{Deserialize, Serialize};

use crate::error::MappingError;

/// Topology classification of source-to-target instance counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MigrationPattern {
    /// One source, one target.
    OneToOne,
    /// Several sources into one target.
    ManyToOne,
    /// One source fanned out to several targets.
    OneToMany,
    /// Equal source and target counts, both above one.
    ManyToMany,
    /// Unequal source and target counts, both above one.
    ManyToManyUneven,
}

impl std::fmt::Display for MigrationPattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MigrationPattern::OneToOne => write!(f, "1:1"),
            MigrationPattern::ManyToOne => write!(f, "N:1"),
            MigrationPattern::OneToMany => write!(f, "1:N"),
            MigrationPattern::ManyToMany => write!(f, "N:N"),
            MigrationPattern::ManyToManyUneven => write!(f, "N:M"),
        }
    }
}

/// Algorithm expanding a pattern into concrete tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MigrationStrategy {
    /// Direct one-to-one transfer.
    Simple,
    /// Every source into the single target.
    Consolidate,
    /// Source databases partitioned across the targets.
    Distribute,
    /// Source databases duplicated to every target.
    Replicate,
    /// Source databases split across targets by name.
    SplitByDatabase,
    /// Sources matched to targets sharing an engine version.
    VersionBased,
    /// Sources assigned to targets cyclically by index.
    RoundRobin,
    /// Caller-supplied explicit pairs.
    ManualMapping,
    /// Caller-supplied explicit pairs with custom renames.
    Custom,
}

impl std::fmt::Display for MigrationStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MigrationStrategy::Simple => write!(f, "simple"),
            MigrationStrategy::Consolidate => write!(f, "consolidate"),
            MigrationStrategy::Distribute => write!(f, "distribute"),
            MigrationStrategy::Replicate => write!(f, "replicate"),
            MigrationStrategy::SplitByDatabase => write!(f, "split-by-database"),
            MigrationStrategy::VersionBased => write!(f, "version-based"),
            MigrationStrategy::RoundRobin => write!(f, "round-robin"),
            MigrationStrategy::ManualMapping => write!(f, "manual-mapping"),
            MigrationStrategy::Custom => write!(f, "custom"),
        }
    }
}

impl std::str::FromStr for MigrationStrategy {
    type Err = MappingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "simple" => Ok(MigrationStrategy::Simple),
            "consolidate" => Ok(MigrationStrategy::Consolidate),
            "distribute" => Ok(MigrationStrategy::Distribute),
            "replicate" => Ok(MigrationStrategy::Replicate),
            "split-by-database" => Ok(MigrationStrategy::SplitByDatabase),
            "version-based" => Ok(MigrationStrategy::VersionBased),
            "round-robin" => Ok(MigrationStrategy::RoundRobin),
            "manual-mapping" => Ok(MigrationStrategy::ManualMapping),
            "custom" => Ok(MigrationStrategy::Custom),
            other => Err(MappingError::UnknownStrategy(other.to_string())),
        }
    }
}

/// Policy for duplicate database names when several sources land in one target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConflictResolution {
    /// Abort the mapping build on the first duplicate.
    #[default]
    Fail,
    /// Prepend the source instance name.
    Prefix,
    /// Append a numeric suffix.
    Suffix,
    /// Keep the name; the import layer unions the data.
    Merge,
    /// Rename at the schema level; only for explicit-pair strategies.
    RenameSchema,
}

impl std::fmt::Display for ConflictResolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConflictResolution::Fail => write!(f, "fail"),
            ConflictResolution::Prefix => write!(f, "prefix"),
            ConflictResolution::Suffix => write!(f, "suffix"),
            ConflictResolution::Merge => write!(f, "merge"),
            ConflictResolution::RenameSchema => write!(f, "rename-schema"),
        }
    }
}

/// Two-tier strategy/pattern compatibility signal.
///
/// `valid` is always true: an atypical strategy choice is advisory, never
/// blocking. `compatible` and `warnings` carry the advice.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompatibilityReport {
    /// Always true; the check never blocks an operation.
    pub valid: bool,
    /// Whether the strategy is a typical fit for the pattern.
    pub compatible: bool,
    /// Advisory warnings when the fit is atypical.
    pub warnings: Vec<String>,
}

/// Pure resolver for patterns, strategies, and conflict options.
pub struct PatternResolver;

impl PatternResolver {
    /// Classify the topology from instance counts.
    ///
    /// Zero on either side is a mapping error, not a pattern.
    pub fn detect_pattern(
        source_count: usize,
        target_count: usize,
    ) -> Result<MigrationPattern, MappingError> {
        if source_count == 0 {
            return Err(MappingError::EmptySources);
        }
        if target_count == 0 {
            return Err(MappingError::EmptyTargets);
        }

        Ok(match (source_count, target_count) {
            (1, 1) => MigrationPattern::OneToOne,
            (_, 1) => MigrationPattern::ManyToOne,
            (1, _) => MigrationPattern::OneToMany,
            (n, m) if n == m => MigrationPattern::ManyToMany,
            _ => MigrationPattern::ManyToManyUneven,
        })
    }

    /// Ordered strategies for a pattern; the first entry is the recommendation.
    pub fn available_strategies(pattern: MigrationPattern) -> &'static [MigrationStrategy] {
        match pattern {
            MigrationPattern::OneToOne => {
                &[MigrationStrategy::Simple, MigrationStrategy::ManualMapping]
            }
            MigrationPattern::ManyToOne => &[
                MigrationStrategy::Consolidate,
                MigrationStrategy::RoundRobin,
                MigrationStrategy::ManualMapping,
            ],
            MigrationPattern::OneToMany => &[
                MigrationStrategy::Distribute,
                MigrationStrategy::Replicate,
                MigrationStrategy::SplitByDatabase,
                MigrationStrategy::ManualMapping,
            ],
            MigrationPattern::ManyToMany => &[
                MigrationStrategy::VersionBased,
                MigrationStrategy::RoundRobin,
                MigrationStrategy::ManualMapping,
            ],
            MigrationPattern::ManyToManyUneven => &[
                MigrationStrategy::ManualMapping,
                MigrationStrategy::VersionBased,
                MigrationStrategy::RoundRobin,
            ],
        }
    }

    /// The fixed per-pattern default strategy.
    pub fn recommended_strategy(pattern: MigrationPattern) -> MigrationStrategy {
        Self::available_strategies(pattern)[0]
    }

    /// Check a strategy against a pattern.
    ///
    /// The result is permissive by design: `valid` is always true, and the
    /// advisory `compatible`/`warnings` pair is the only signal. Callers
    /// must preserve both tiers instead of collapsing to one boolean.
    pub fn validate_strategy_compatibility(
        strategy: MigrationStrategy,
        pattern: MigrationPattern,
    ) -> CompatibilityReport {
        let typical = Self::available_strategies(pattern);
        let compatible = strategy == MigrationStrategy::Custom || typical.contains(&strategy);

        let warnings = if compatible {
            Vec::new()
        } else {
            vec![
                format!("strategy {strategy} is not a typical fit for pattern {pattern}"),
                format!(
                    "recommended strategy for {pattern} is {}",
                    Self::recommended_strategy(pattern)
                ),
            ]
        };

        CompatibilityReport {
            valid: true,
            compatible,
            warnings,
        }
    }

    /// Conflict-resolution options available under a strategy.
    pub fn conflict_resolution_options(strategy: MigrationStrategy) -> Vec<ConflictResolution> {
        let mut options = vec![
            ConflictResolution::Fail,
            ConflictResolution::Prefix,
            ConflictResolution::Suffix,
        ];

        if strategy == MigrationStrategy::Consolidate {
            options.push(ConflictResolution::Merge);
        }
        if matches!(
            strategy,
            MigrationStrategy::Custom | MigrationStrategy::ManualMapping
        ) {
            options.push(ConflictResolution::RenameSchema);
        }

        options
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_pattern_rule_table() {
        assert_eq!(
            PatternResolver::detect_pattern(1, 1).unwrap(),
            MigrationPattern::OneToOne
        );
        assert_eq!(
            PatternResolver::detect_pattern(3, 1).unwrap(),
            MigrationPattern::ManyToOne
        );
        assert_eq!(
            PatternResolver::detect_pattern(1, 4).unwrap(),
            MigrationPattern::OneToMany
        );
        assert_eq!(
            PatternResolver::detect_pattern(2, 2).unwrap(),
            MigrationPattern::ManyToMany
        );
        assert_eq!(
            PatternResolver::detect_pattern(2, 3).unwrap(),
            MigrationPattern::ManyToManyUneven
        );
        assert_eq!(
            PatternResolver::detect_pattern(5, 2).unwrap(),
            MigrationPattern::ManyToManyUneven
        );
    }

    #[test]
    fn test_detect_pattern_rejects_zero() {
        assert!(matches!(
            PatternResolver::detect_pattern(0, 1),
            Err(MappingError::EmptySources)
        ));
        assert!(matches!(
            PatternResolver::detect_pattern(1, 0),
            Err(MappingError::EmptyTargets)
        ));
    }

    #[test]
    fn test_recommendation_is_first_available() {
        for pattern in [
            MigrationPattern::OneToOne,
            MigrationPattern::ManyToOne,
            MigrationPattern::OneToMany,
            MigrationPattern::ManyToMany,
            MigrationPattern::ManyToManyUneven,
        ] {
            assert_eq!(
                PatternResolver::available_strategies(pattern)[0],
                PatternResolver::recommended_strategy(pattern)
            );
        }
    }

    #[test]
    fn test_recommended_defaults() {
        assert_eq!(
            PatternResolver::recommended_strategy(MigrationPattern::OneToOne),
            MigrationStrategy::Simple
        );
        assert_eq!(
            PatternResolver::recommended_strategy(MigrationPattern::ManyToOne),
            MigrationStrategy::Consolidate
        );
        assert_eq!(
            PatternResolver::recommended_strategy(MigrationPattern::OneToMany),
            MigrationStrategy::Distribute
        );
        assert_eq!(
            PatternResolver::recommended_strategy(MigrationPattern::ManyToMany),
            MigrationStrategy::VersionBased
        );
        assert_eq!(
            PatternResolver::recommended_strategy(MigrationPattern::ManyToManyUneven),
            MigrationStrategy::ManualMapping
        );
    }

    #[test]
    fn test_compatibility_always_valid() {
        let report = PatternResolver::validate_strategy_compatibility(
            MigrationStrategy::Consolidate,
            MigrationPattern::OneToMany,
        );
        assert!(report.valid);
        assert!(!report.compatible);
        assert!(!report.warnings.is_empty());

        let report = PatternResolver::validate_strategy_compatibility(
            MigrationStrategy::Distribute,
            MigrationPattern::OneToMany,
        );
        assert!(report.valid);
        assert!(report.compatible);
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn test_custom_compatible_everywhere() {
        for pattern in [
            MigrationPattern::OneToOne,
            MigrationPattern::ManyToOne,
            MigrationPattern::OneToMany,
            MigrationPattern::ManyToMany,
            MigrationPattern::ManyToManyUneven,
        ] {
            let report = PatternResolver::validate_strategy_compatibility(
                MigrationStrategy::Custom,
                pattern,
            );
            assert!(report.compatible);
        }
    }

    #[test]
    fn test_conflict_options_merge_only_for_consolidate() {
        for strategy in [
            MigrationStrategy::Simple,
            MigrationStrategy::Distribute,
            MigrationStrategy::Replicate,
            MigrationStrategy::SplitByDatabase,
            MigrationStrategy::VersionBased,
            MigrationStrategy::RoundRobin,
            MigrationStrategy::ManualMapping,
            MigrationStrategy::Custom,
        ] {
            assert!(
                !PatternResolver::conflict_resolution_options(strategy)
                    .contains(&ConflictResolution::Merge),
                "merge leaked into {strategy}"
            );
        }
        assert!(
            PatternResolver::conflict_resolution_options(MigrationStrategy::Consolidate)
                .contains(&ConflictResolution::Merge)
        );
    }

    #[test]
    fn test_conflict_options_rename_schema_only_for_explicit_pairs() {
        for strategy in [MigrationStrategy::Custom, MigrationStrategy::ManualMapping] {
            assert!(
                PatternResolver::conflict_resolution_options(strategy)
                    .contains(&ConflictResolution::RenameSchema)
            );
        }
        for strategy in [
            MigrationStrategy::Simple,
            MigrationStrategy::Consolidate,
            MigrationStrategy::Distribute,
            MigrationStrategy::VersionBased,
            MigrationStrategy::RoundRobin,
        ] {
            assert!(
                !PatternResolver::conflict_resolution_options(strategy)
                    .contains(&ConflictResolution::RenameSchema),
                "rename-schema leaked into {strategy}"
            );
        }
    }

    #[test]
    fn test_strategy_round_trip() {
        for strategy in [
            MigrationStrategy::Simple,
            MigrationStrategy::SplitByDatabase,
            MigrationStrategy::VersionBased,
            MigrationStrategy::ManualMapping,
        ] {
            let parsed: MigrationStrategy = strategy.to_string().parse().unwrap();
            assert_eq!(parsed, strategy);
        }
        assert!("teleport".parse::<MigrationStrategy>().is_err());
    }

    #[test]
    fn test_pattern_display() {
        assert_eq!(MigrationPattern::OneToOne.to_string(), "1:1");
        assert_eq!(MigrationPattern::ManyToOne.to_string(), "N:1");
        assert_eq!(MigrationPattern::OneToMany.to_string(), "1:N");
        assert_eq!(MigrationPattern::ManyToMany.to_string(), "N:N");
        assert_eq!(MigrationPattern::ManyToManyUneven.to_string(), "N:M");
    }
}
