//! Enumeration of comparison pairs

use std::collections::BTreeMap;
use std::fmt;

use crate::config::PipelineConfig;
use crate::data::{GroupKey, Metadata};
use crate::features::control_contrasts;

/// How the two groups of a pair relate
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ComparisonMode {
    /// Treatment vs control at one timepoint
    SameTimepoint,
    /// One treatment at a later timepoint vs the previous one
    NextTimepoint,
}

impl ComparisonMode {
    pub fn tag(&self) -> &'static str {
        match self {
            ComparisonMode::SameTimepoint => "same_timepoint",
            ComparisonMode::NextTimepoint => "next_timepoint",
        }
    }
}

impl fmt::Display for ComparisonMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Numerator vs denominator group; log2 fold changes are numerator / denominator
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ComparisonPair {
    pub mode: ComparisonMode,
    pub numerator: GroupKey,
    pub denominator: GroupKey,
}

impl ComparisonPair {
    /// Identifier such as `drugx@24_vs_untreated@24`
    pub fn id(&self) -> String {
        format!("{}_vs_{}", self.numerator, self.denominator)
    }
}

impl fmt::Display for ComparisonPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_vs_{}", self.numerator, self.denominator)
    }
}

/// Every pair to test among the observed groups, sorted and without duplicates.
///
/// Each treatment group is compared with the control at its hour (the
/// vehicle group against the untreated group when both exist). With
/// next-timepoint prediction on, each drug at consecutive observed hours
/// (t, t') with t' in the allow-list is compared as drug@t' vs drug@t.
pub fn enumerate_comparisons<V>(
    groups: &BTreeMap<GroupKey, V>,
    metadata: &Metadata,
    config: &PipelineConfig,
) -> Vec<ComparisonPair> {
    let mut pairs: Vec<ComparisonPair> = control_contrasts(groups, metadata, config)
        .into_iter()
        .map(|(numerator, denominator)| ComparisonPair {
            mode: ComparisonMode::SameTimepoint,
            numerator,
            denominator,
        })
        .collect();

    if config.next_time_point_prediction {
        let mut hours_by_drug: BTreeMap<&str, Vec<u32>> = BTreeMap::new();
        for key in groups.keys() {
            hours_by_drug.entry(key.drug.as_str()).or_default().push(key.hours);
        }
        for (drug, hours) in hours_by_drug {
            // BTreeMap keys arrive sorted by (drug, hours)
            for window in hours.windows(2) {
                let (t, next) = (window[0], window[1]);
                if config.keep_next_tp.contains(&next) {
                    pairs.push(ComparisonPair {
                        mode: ComparisonMode::NextTimepoint,
                        numerator: GroupKey {
                            drug: drug.to_string(),
                            hours: next,
                        },
                        denominator: GroupKey {
                            drug: drug.to_string(),
                            hours: t,
                        },
                    });
                }
            }
        }
    }

    pairs.sort();
    pairs.dedup();
    pairs
}
