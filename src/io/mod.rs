//! Input/output for tabular inputs and staged artifacts

mod atomic;
mod tables;

pub use atomic::{format_f64, parse_f64, write_csv_atomic, write_json_atomic};
pub use tables::{
    read_expression_matrix, read_gene_list, read_metadata, read_raw_counts, write_expression_matrix,
    write_gene_list, write_gene_table, write_metadata, write_size_factors,
};
