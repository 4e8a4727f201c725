//! Per-gene delta shapes on log2(x + 1) expression

use std::collections::HashMap;
use std::path::Path;

use rayon::prelude::*;

use crate::config::PipelineConfig;
use crate::data::{ExpressionMatrix, GroupKey, MatrixKind, Metadata};
use crate::error::Result;
use crate::io::{format_f64, write_csv_atomic};
use crate::stats::{mean, sd};

/// Summary statistics of one gene
#[derive(Debug, Clone, PartialEq)]
pub struct DeltaShape {
    pub gene_id: String,
    /// Mean in matrix units (eligibility filter)
    pub mean_expression: f64,
    pub mean_log: f64,
    pub sd_log: f64,
    /// Treatment group mean minus control group mean, one per contrast
    pub deltas: Vec<f64>,
    /// Root mean square of `deltas`, or `sd_log` when no contrast exists
    pub score: f64,
}

/// Delta shapes of every gene of one matrix
#[derive(Debug, Clone)]
pub struct DeltaShapes {
    pub kind: MatrixKind,
    /// (treatment group, control group at the same hour)
    pub contrasts: Vec<(GroupKey, GroupKey)>,
    pub rows: Vec<DeltaShape>,
}

/// Treatment groups paired with their control at the same hour.
///
/// The untreated group is the control when present, otherwise the vehicle
/// group. Groups without any control at their hour are not contrasted.
pub fn control_contrasts<V>(
    groups: &std::collections::BTreeMap<GroupKey, V>,
    metadata: &Metadata,
    config: &PipelineConfig,
) -> Vec<(GroupKey, GroupKey)> {
    groups
        .keys()
        .filter_map(|group| {
            let control = metadata.control_group(groups, group.hours, config)?;
            (control != group).then(|| (group.clone(), control.clone()))
        })
        .collect()
}

pub fn compute_delta_shapes(
    matrix: &ExpressionMatrix,
    metadata: &Metadata,
    config: &PipelineConfig,
) -> Result<DeltaShapes> {
    let context = format!("delta shapes ({})", matrix.kind());
    let sample_of_column = metadata.resolve_all(matrix.sample_labels(), &context)?;
    let column_of_sample: HashMap<usize, usize> = sample_of_column
        .iter()
        .enumerate()
        .map(|(col, &s)| (s, col))
        .collect();

    let groups = metadata.groups(&sample_of_column);
    let group_columns: HashMap<&GroupKey, Vec<usize>> = groups
        .iter()
        .map(|(key, samples)| (key, samples.iter().map(|s| column_of_sample[s]).collect()))
        .collect();
    let contrasts = control_contrasts(&groups, metadata, config);
    if contrasts.is_empty() {
        log::warn!("No treatment/control contrast in the {} matrix; scoring genes by sd of log expression", matrix.kind());
    }

    let log_values = matrix.log2p1();
    let raw_means = matrix.gene_means();
    let rows = (0..matrix.n_genes())
        .into_par_iter()
        .map(|i| {
            let logs = log_values.row(i).to_vec();
            let group_mean = |key: &GroupKey| {
                let cols = &group_columns[key];
                cols.iter().map(|&c| logs[c]).sum::<f64>() / cols.len() as f64
            };
            let deltas: Vec<f64> = contrasts
                .iter()
                .map(|(treatment, control)| group_mean(treatment) - group_mean(control))
                .collect();

            let sd_log = sd(&logs);
            let score = if deltas.is_empty() {
                sd_log
            } else {
                (deltas.iter().map(|d| d * d).sum::<f64>() / deltas.len() as f64).sqrt()
            };
            DeltaShape {
                gene_id: matrix.gene_ids()[i].clone(),
                mean_expression: raw_means[i],
                mean_log: mean(&logs),
                sd_log,
                deltas,
                score,
            }
        })
        .collect();

    Ok(DeltaShapes {
        kind: matrix.kind(),
        contrasts,
        rows,
    })
}

/// Write `delta_shapes_{kind}.csv`
pub fn write_delta_shapes<P: AsRef<Path>>(path: P, shapes: &DeltaShapes, config: &PipelineConfig) -> Result<()> {
    write_csv_atomic(path, |w| {
        let mut header = vec![
            config.gene_col.clone(),
            "mean_expression".to_string(),
            "mean_log".to_string(),
            "sd_log".to_string(),
            "score".to_string(),
        ];
        header.extend(
            shapes
                .contrasts
                .iter()
                .map(|(treatment, control)| format!("delta_{}_vs_{}", treatment, control)),
        );
        w.write_record(&header)?;

        for row in &shapes.rows {
            let mut record = vec![
                row.gene_id.clone(),
                format_f64(row.mean_expression),
                format_f64(row.mean_log),
                format_f64(row.sd_log),
                format_f64(row.score),
            ];
            record.extend(row.deltas.iter().map(|&d| format_f64(d)));
            w.write_record(&record)?;
        }
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Sample, SampleKey};
    use ndarray::array;

    fn sample(drug: &str, hours: u32, id: &str) -> Sample {
        let config = PipelineConfig::default();
        Sample {
            key: SampleKey {
                drug: drug.to_string(),
                hours,
                sample: id.to_string(),
                duplicate_id: "1".to_string(),
            },
            is_control: config.is_control(drug),
            is_vehicle: config.is_vehicle(drug),
            response: None,
        }
    }

    #[test]
    fn test_score_is_rms_of_control_deltas() {
        let meta = Metadata::new(vec![
            sample("untreated", 24, "c1"),
            sample("untreated", 24, "c2"),
            sample("drugx", 24, "t1"),
            sample("drugx", 24, "t2"),
        ])
        .unwrap();
        // log2(x + 1): 1 -> 1, 3 -> 2, 7 -> 3
        let matrix = ExpressionMatrix::new(
            MatrixKind::NormalizedReads,
            array![[1.0, 1.0, 7.0, 7.0], [3.0, 3.0, 3.0, 3.0]],
            vec!["A".to_string(), "B".to_string()],
            vec!["A".to_string(), "B".to_string()],
            vec!["c1".to_string(), "c2".to_string(), "t1".to_string(), "t2".to_string()],
        )
        .unwrap();

        let shapes = compute_delta_shapes(&matrix, &meta, &PipelineConfig::default()).unwrap();
        assert_eq!(shapes.contrasts.len(), 1);
        assert_eq!(shapes.contrasts[0].0.drug, "drugx");
        assert!((shapes.rows[0].score - 2.0).abs() < 1e-12);
        assert!((shapes.rows[0].deltas[0] - 2.0).abs() < 1e-12);
        assert_eq!(shapes.rows[1].score, 0.0);
        assert!((shapes.rows[1].mean_log - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_without_control_falls_back_to_sd() {
        let meta = Metadata::new(vec![sample("drugx", 24, "t1"), sample("drugy", 24, "t2")]).unwrap();
        let matrix = ExpressionMatrix::new(
            MatrixKind::Tpm,
            array![[1.0, 7.0]],
            vec!["A".to_string()],
            vec!["A".to_string()],
            vec!["t1".to_string(), "t2".to_string()],
        )
        .unwrap();
        let shapes = compute_delta_shapes(&matrix, &meta, &PipelineConfig::default()).unwrap();
        assert!(shapes.contrasts.is_empty());
        assert!((shapes.rows[0].score - 2.0f64.sqrt()).abs() < 1e-12);
    }
}
