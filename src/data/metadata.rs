//! Sample annotation for a bioreactor culture experiment

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};

const CONTEXT: &str = "metadata loader";

/// Identity of one sample: (drug, hours, sample, duplicate_id)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SampleKey {
    pub drug: String,
    pub hours: u32,
    pub sample: String,
    pub duplicate_id: String,
}

impl SampleKey {
    /// Composite label `drug_hours_sample_duplicate`
    pub fn composite_label(&self) -> String {
        format!("{}_{}_{}_{}", self.drug, self.hours, self.sample, self.duplicate_id)
    }

    pub fn group(&self) -> GroupKey {
        GroupKey {
            drug: self.drug.clone(),
            hours: self.hours,
        }
    }
}

/// A treatment condition at one timepoint
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GroupKey {
    pub drug: String,
    pub hours: u32,
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.drug, self.hours)
    }
}

/// One annotated sample
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub key: SampleKey,
    /// Untreated control
    pub is_control: bool,
    /// Vehicle (e.g. DMSO) control
    pub is_vehicle: bool,
    /// Measured response (beats per minute), when recorded
    pub response: Option<f64>,
}

/// Validated sample collection, sorted by identity
#[derive(Debug, Clone, PartialEq)]
pub struct Metadata {
    samples: Vec<Sample>,
    /// Matrix column label of each sample
    labels: Vec<String>,
    label_index: HashMap<String, usize>,
}

impl Metadata {
    /// Build the collection; rejects duplicate identities
    pub fn new(mut samples: Vec<Sample>) -> Result<Self> {
        if samples.is_empty() {
            return Err(PipelineError::schema(CONTEXT, "metadata contains no samples"));
        }
        samples.sort_by(|a, b| a.key.cmp(&b.key));
        for pair in samples.windows(2) {
            if pair[0].key == pair[1].key {
                return Err(PipelineError::schema(
                    CONTEXT,
                    format!("sample identity {} is not unique", pair[0].key.composite_label()),
                ));
            }
        }

        // Plain sample ids label the matrix columns when they are unique on their own
        let distinct_ids: BTreeSet<&str> = samples.iter().map(|s| s.key.sample.as_str()).collect();
        let labels: Vec<String> = if distinct_ids.len() == samples.len() {
            samples.iter().map(|s| s.key.sample.clone()).collect()
        } else {
            samples.iter().map(|s| s.key.composite_label()).collect()
        };

        let mut label_index = HashMap::with_capacity(samples.len() * 2);
        for (i, s) in samples.iter().enumerate() {
            label_index.insert(labels[i].clone(), i);
            label_index.insert(s.key.composite_label(), i);
        }

        Ok(Self {
            samples,
            labels,
            label_index,
        })
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn n_samples(&self) -> usize {
        self.samples.len()
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn sample(&self, idx: usize) -> &Sample {
        &self.samples[idx]
    }

    /// Resolve a matrix column label (plain or composite) to a sample index
    pub fn resolve(&self, label: &str) -> Option<usize> {
        self.label_index.get(label.trim()).copied()
    }

    /// Resolve every label, failing on the first unknown one
    pub fn resolve_all(&self, labels: &[String], context: &str) -> Result<Vec<usize>> {
        labels
            .iter()
            .map(|label| {
                self.resolve(label).ok_or_else(|| {
                    PipelineError::alignment(
                        context,
                        format!("column '{}' has no matching sample in the metadata", label),
                    )
                })
            })
            .collect()
    }

    /// Sample indices per (drug, hours) group, restricted to `present`
    pub fn groups(&self, present: &[usize]) -> BTreeMap<GroupKey, Vec<usize>> {
        let mut groups: BTreeMap<GroupKey, Vec<usize>> = BTreeMap::new();
        for &idx in present {
            groups.entry(self.samples[idx].key.group()).or_default().push(idx);
        }
        groups
    }

    /// Control group at a timepoint among `groups`: untreated first, vehicle otherwise
    pub fn control_group<'a, V>(
        &self,
        groups: &'a BTreeMap<GroupKey, V>,
        hours: u32,
        config: &PipelineConfig,
    ) -> Option<&'a GroupKey> {
        let at_hour = || groups.keys().filter(move |g| g.hours == hours);
        at_hour()
            .find(|g| config.is_control(&g.drug))
            .or_else(|| at_hour().find(|g| config.is_vehicle(&g.drug)))
    }

    /// Subset in the given order (labels recomputed)
    pub fn subset(&self, indices: &[usize]) -> Result<Self> {
        Metadata::new(indices.iter().map(|&i| self.samples[i].clone()).collect())
    }
}

/// Normalize a treatment label
pub fn normalize_drug(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// Parse elapsed hours; accepts `24`, `24.0`, `24h`, `24 hours`
pub fn parse_hours(raw: &str) -> Option<u32> {
    let lowered = raw.trim().to_lowercase();
    let numeric = lowered
        .trim_end_matches("hours")
        .trim_end_matches("hrs")
        .trim_end_matches("hr")
        .trim_end_matches('h')
        .trim();
    let value: f64 = numeric.parse().ok()?;
    if value.is_finite() && value >= 0.0 && value.fract() == 0.0 && value <= u32::MAX as f64 {
        Some(value as u32)
    } else {
        None
    }
}

/// Parse an optional response value; empty and NA cells are missing
pub fn parse_response(raw: &str) -> std::result::Result<Option<f64>, ()> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("na") || trimmed.eq_ignore_ascii_case("nan") {
        return Ok(None);
    }
    match trimmed.parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(Some(v)),
        _ => Err(()),
    }
}
