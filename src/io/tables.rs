//! Typed readers and writers for the tabular inputs and staged artifacts

use std::collections::HashMap;
use std::path::Path;

use csv::{ReaderBuilder, StringRecord, Trim};
use ndarray::Array2;

use super::atomic::{format_f64, parse_f64, require_file, write_csv_atomic};
use crate::config::PipelineConfig;
use crate::data::{
    normalize_drug, parse_hours, parse_response, ExpressionMatrix, MatrixKind, Metadata, RawCounts, Sample,
    SampleKey,
};
use crate::error::{PipelineError, Result};

/// Columns of a count table that never hold sample counts
const LENGTH_COLUMNS: [&str; 2] = ["EffectiveLength", "Length"];
const INDEX_COLUMNS: [&str; 2] = ["", "Unnamed: 0"];

fn open_reader(path: &Path, context: &str) -> Result<csv::Reader<std::fs::File>> {
    require_file(path, context)?;
    Ok(ReaderBuilder::new().trim(Trim::All).flexible(false).from_path(path)?)
}

fn column_index(headers: &StringRecord) -> HashMap<&str, usize> {
    let mut index = HashMap::new();
    for (i, h) in headers.iter().enumerate() {
        index.entry(h).or_insert(i);
    }
    index
}

/// Replicate ids written by spreadsheet tools as `1.0` become `1`
fn normalize_replicate(raw: &str) -> String {
    match raw.parse::<f64>() {
        Ok(v) if v.is_finite() && v.fract() == 0.0 => format!("{}", v as i64),
        _ => raw.to_string(),
    }
}

/// Read the sample annotation table.
///
/// All identity columns must be present; they are reported together in one
/// schema error. A leading unnamed index column and extra columns are ignored.
pub fn read_metadata<P: AsRef<Path>>(path: P, config: &PipelineConfig) -> Result<Metadata> {
    const CONTEXT: &str = "metadata loader";
    let mut reader = open_reader(path.as_ref(), CONTEXT)?;
    let headers = reader.headers()?.clone();
    let index = column_index(&headers);

    let required = config.required_metadata_columns();
    let missing: Vec<String> = required
        .iter()
        .filter(|c| !index.contains_key(**c))
        .map(|c| c.to_string())
        .collect();
    if !missing.is_empty() {
        return Err(PipelineError::missing_columns(CONTEXT, missing));
    }
    let [drug_col, time_col, sample_col, dup_col] = required.map(|c| index[c]);
    let response_col = index.get(config.response_col.as_str()).copied();
    if response_col.is_none() {
        log::info!("Metadata has no '{}' column; response values are missing", config.response_col);
    }

    let mut samples = Vec::new();
    for (row, record) in reader.records().enumerate() {
        let record = record?;
        let line = row + 2;
        let field = |i: usize| record.get(i).unwrap_or("");

        let sample = field(sample_col);
        if sample.is_empty() {
            return Err(PipelineError::schema(CONTEXT, format!("line {}: empty '{}'", line, config.sample_col)));
        }
        let hours = parse_hours(field(time_col)).ok_or_else(|| {
            PipelineError::schema(
                CONTEXT,
                format!("line {}: '{}' is not a whole number of hours", line, field(time_col)),
            )
        })?;
        let response = match response_col {
            Some(i) => parse_response(field(i)).map_err(|_| {
                PipelineError::schema(
                    CONTEXT,
                    format!("line {}: response '{}' is not numeric", line, field(i)),
                )
            })?,
            None => None,
        };

        let drug = normalize_drug(field(drug_col));
        samples.push(Sample {
            is_control: config.is_control(&drug),
            is_vehicle: config.is_vehicle(&drug),
            key: SampleKey {
                drug,
                hours,
                sample: sample.to_string(),
                duplicate_id: normalize_replicate(field(dup_col)),
            },
            response,
        });
    }

    let metadata = Metadata::new(samples)?;
    log::info!("Loaded {} samples from metadata", metadata.n_samples());
    Ok(metadata)
}

/// Write the normalized metadata table (re-readable by [`read_metadata`])
pub fn write_metadata<P: AsRef<Path>>(path: P, metadata: &Metadata, config: &PipelineConfig) -> Result<()> {
    write_csv_atomic(path, |w| {
        w.write_record([
            config.control_col.as_str(),
            config.time_col.as_str(),
            config.sample_col.as_str(),
            config.duplicate_col.as_str(),
            config.response_col.as_str(),
        ])?;
        for s in metadata.samples() {
            let response = s.response.map(format_f64).unwrap_or_default();
            w.write_record([
                s.key.drug.as_str(),
                &s.key.hours.to_string(),
                s.key.sample.as_str(),
                s.key.duplicate_id.as_str(),
                &response,
            ])?;
        }
        Ok(())
    })
}

fn parse_count(raw: &str, line: usize, column: &str, context: &str) -> Result<f64> {
    match parse_f64(raw) {
        Some(v) if !v.is_nan() => Ok(v),
        _ => Err(PipelineError::schema(
            context,
            format!("line {}: value '{}' in column '{}' is not numeric", line, raw, column),
        )),
    }
}

/// Read a raw count table: a gene identifier column (`Name`, or `gene_id`),
/// an optional length column and one column per sample.
pub fn read_raw_counts<P: AsRef<Path>>(path: P, config: &PipelineConfig) -> Result<RawCounts> {
    const CONTEXT: &str = "raw count table";
    let mut reader = open_reader(path.as_ref(), CONTEXT)?;
    let headers = reader.headers()?.clone();
    let index = column_index(&headers);

    let name_col = index
        .get(config.raw_gene_col.as_str())
        .or_else(|| index.get(config.gene_col.as_str()))
        .copied()
        .ok_or_else(|| PipelineError::missing_columns(CONTEXT, vec![config.raw_gene_col.clone()]))?;
    let length_col = LENGTH_COLUMNS.iter().find_map(|c| index.get(c).copied());

    let sample_cols: Vec<usize> = headers
        .iter()
        .enumerate()
        .filter(|(_, h)| {
            *h != config.raw_gene_col
                && *h != config.gene_col
                && !LENGTH_COLUMNS.contains(h)
                && !INDEX_COLUMNS.contains(h)
        })
        .map(|(i, _)| i)
        .collect();
    let sample_labels: Vec<String> = sample_cols.iter().map(|&i| headers[i].to_string()).collect();

    let mut names = Vec::new();
    let mut lengths = Vec::new();
    let mut values = Vec::new();
    for (row, record) in reader.records().enumerate() {
        let record = record?;
        let line = row + 2;
        let name = record.get(name_col).unwrap_or("");
        if name.is_empty() {
            return Err(PipelineError::schema(CONTEXT, format!("line {}: empty gene identifier", line)));
        }
        names.push(name.to_string());
        if let Some(i) = length_col {
            lengths.push(parse_count(record.get(i).unwrap_or(""), line, &headers[i], CONTEXT)?);
        }
        for (&i, label) in sample_cols.iter().zip(&sample_labels) {
            values.push(parse_count(record.get(i).unwrap_or(""), line, label, CONTEXT)?);
        }
    }

    let counts = Array2::from_shape_vec((names.len(), sample_labels.len()), values)
        .map_err(|e| PipelineError::schema(CONTEXT, e.to_string()))?;
    log::info!(
        "Loaded raw counts: {} rows x {} samples{}",
        counts.nrows(),
        counts.ncols(),
        if length_col.is_some() { " (with lengths)" } else { "" }
    );
    RawCounts::new(counts, names, length_col.map(|_| lengths), sample_labels)
}

/// Write a gene x sample table with `gene_id` and `Name` leading columns
pub fn write_expression_matrix<P: AsRef<Path>>(path: P, matrix: &ExpressionMatrix, config: &PipelineConfig) -> Result<()> {
    write_gene_table(
        path,
        config,
        matrix.gene_ids(),
        matrix.names(),
        matrix.sample_labels(),
        |i, j| matrix.values()[[i, j]],
    )
}

/// Shared layout of every gene-row artifact
pub fn write_gene_table<P, F>(
    path: P,
    config: &PipelineConfig,
    gene_ids: &[String],
    names: &[String],
    sample_labels: &[String],
    value: F,
) -> Result<()>
where
    P: AsRef<Path>,
    F: Fn(usize, usize) -> f64,
{
    write_csv_atomic(path, |w| {
        let mut header = vec![config.gene_col.as_str(), config.raw_gene_col.as_str()];
        header.extend(sample_labels.iter().map(|s| s.as_str()));
        w.write_record(&header)?;

        let mut row = Vec::with_capacity(sample_labels.len() + 2);
        for (i, (gene, name)) in gene_ids.iter().zip(names).enumerate() {
            row.clear();
            row.push(gene.clone());
            row.push(name.clone());
            row.extend((0..sample_labels.len()).map(|j| format_f64(value(i, j))));
            w.write_record(&row)?;
        }
        Ok(())
    })
}

/// Read a matrix written by [`write_expression_matrix`]
pub fn read_expression_matrix<P: AsRef<Path>>(path: P, kind: MatrixKind, config: &PipelineConfig) -> Result<ExpressionMatrix> {
    let path = path.as_ref();
    let context = format!("{} matrix {}", kind, path.display());
    let mut reader = open_reader(path, &context)?;
    let headers = reader.headers()?.clone();

    let missing: Vec<String> = [&config.gene_col, &config.raw_gene_col]
        .iter()
        .enumerate()
        .filter(|(i, c)| headers.get(*i) != Some(c.as_str()))
        .map(|(_, c)| c.to_string())
        .collect();
    if !missing.is_empty() {
        return Err(PipelineError::missing_columns(&context, missing));
    }
    let sample_labels: Vec<String> = headers.iter().skip(2).map(|s| s.to_string()).collect();

    let mut gene_ids = Vec::new();
    let mut names = Vec::new();
    let mut values = Vec::new();
    for (row, record) in reader.records().enumerate() {
        let record = record?;
        gene_ids.push(record.get(0).unwrap_or("").to_string());
        names.push(record.get(1).unwrap_or("").to_string());
        for (j, label) in sample_labels.iter().enumerate() {
            values.push(parse_count(record.get(j + 2).unwrap_or(""), row + 2, label, &context)?);
        }
    }
    let values = Array2::from_shape_vec((gene_ids.len(), sample_labels.len()), values)
        .map_err(|e| PipelineError::schema(&context, e.to_string()))?;
    ExpressionMatrix::new(kind, values, gene_ids, names, sample_labels)
}

/// Write a one-column gene list
pub fn write_gene_list<P: AsRef<Path>>(path: P, genes: &[String], config: &PipelineConfig) -> Result<()> {
    write_csv_atomic(path, |w| {
        w.write_record([config.gene_col.as_str()])?;
        for g in genes {
            w.write_record([g.as_str()])?;
        }
        Ok(())
    })
}

/// Read a gene list: the `gene_id` column if present, else the first column.
/// Blank rows are skipped.
pub fn read_gene_list<P: AsRef<Path>>(path: P, config: &PipelineConfig) -> Result<Vec<String>> {
    let path = path.as_ref();
    let context = format!("gene list {}", path.display());
    let mut reader = open_reader(path, &context)?;
    let headers = reader.headers()?.clone();
    let col = headers.iter().position(|h| h == config.gene_col).unwrap_or(0);
    if headers.is_empty() {
        return Err(PipelineError::missing_columns(&context, vec![config.gene_col.clone()]));
    }

    let mut genes = Vec::new();
    for record in reader.records() {
        let record = record?;
        if let Some(g) = record.get(col).filter(|g| !g.is_empty()) {
            genes.push(g.to_string());
        }
    }
    Ok(genes)
}

/// Write per-sample size factors
pub fn write_size_factors<P: AsRef<Path>>(path: P, labels: &[String], size_factors: &[f64]) -> Result<()> {
    write_csv_atomic(path, |w| {
        w.write_record(["sample", "size_factor"])?;
        for (label, sf) in labels.iter().zip(size_factors) {
            w.write_record([label.as_str(), &format_f64(*sf)])?;
        }
        Ok(())
    })
}
