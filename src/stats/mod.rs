//! Descriptive statistics over an edge-list file. Collaborator-facing: the
//! master logs a summary of the finished sample, and the `stats` subcommand
//! exposes the same numbers directly.

use crate::error::SwError;
use crate::graph::{edge_list_reader, parse_edge_record};
use crate::util::io::get_buf_reader;
use crate::VertexLabel;
use hashbrown::HashMap;
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub struct GraphSummary {
    pub vertices: usize,
    pub edges: u64,
    pub min_degree: u64,
    pub max_degree: u64,
    pub mean_degree: f64,
}

impl fmt::Display for GraphSummary {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{} vertices, {} edges, degree min/mean/max = {}/{:.2}/{}",
            self.vertices, self.edges, self.min_degree, self.mean_degree, self.max_degree
        )
    }
}

#[allow(clippy::cast_precision_loss)]
pub fn summarize(path: &str) -> Result<GraphSummary, SwError> {
    let mut degrees: HashMap<VertexLabel, u64> = HashMap::new();
    let mut edges = 0;
    let mut reader = edge_list_reader(get_buf_reader(path)?);
    for record in reader.records().filter_map(Result::ok) {
        let (x, y) = parse_edge_record(&record, path)?;
        *degrees.entry(x).or_insert(0) += 1;
        *degrees.entry(y).or_insert(0) += 1;
        edges += 1;
    }
    let vertices = degrees.len();
    let min_degree = degrees.values().copied().min().unwrap_or(0);
    let max_degree = degrees.values().copied().max().unwrap_or(0);
    let mean_degree =
        if vertices == 0 { 0.0 } else { degrees.values().sum::<u64>() as f64 / vertices as f64 };
    Ok(GraphSummary { vertices, edges, min_degree, max_degree, mean_degree })
}

#[cfg(test)]
mod tests {
    use super::summarize;
    use std::io::Write;

    #[test]
    fn summary_of_a_small_graph() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("graph.txt");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(b"1 2\n1 3\n2 3\n3 4\n").unwrap();

        let summary = summarize(path.to_str().unwrap()).unwrap();
        assert_eq!(summary.vertices, 4);
        assert_eq!(summary.edges, 4);
        assert_eq!(summary.min_degree, 1);
        assert_eq!(summary.max_degree, 3);
        assert!((summary.mean_degree - 2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn empty_file_summarizes_to_zeroes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.txt");
        std::fs::File::create(&path).unwrap();
        let summary = summarize(path.to_str().unwrap()).unwrap();
        assert_eq!(summary.vertices, 0);
        assert_eq!(summary.edges, 0);
    }
}
