use crate::error::SwError;
use crate::graph::meta::MetaData;
use crate::graph::{edge_list_reader, parse_edge_record};
use crate::util::io::{get_buf_reader, get_file_lines, SwWriter};
use crate::util::timer::SwTimer;
use crate::{VertexLabel, WorkerId};
use hashbrown::HashMap;
use log::info;

/// Partition-time description of one worker's shard. The master combines it
/// with the worker's registered address to form the broadcast `MetaData`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, new)]
pub struct ShardInfo {
    pub worker_id: WorkerId,
    pub path: String,
    pub number_of_edges: u64,
    pub min_vertex: VertexLabel,
    pub max_vertex: VertexLabel,
}

impl ShardInfo {
    pub fn to_meta_data(&self, host: String, port: u16) -> MetaData {
        MetaData::new(
            self.worker_id,
            self.number_of_edges,
            self.min_vertex,
            self.max_vertex,
            host,
            port,
        )
    }
}

/// Splits `graph_path` into `n_workers` contiguous shard files under
/// `output_dir`, never cutting between two lines that share a start vertex.
///
/// A pre-scan counts how often each label occurs on either end of an edge;
/// the running per-shard weight is the sum of those counts over the shard's
/// distinct start vertices, and a shard is cut at the first new start vertex
/// once the weight reaches `2 * total_lines / n_workers`. The last shard
/// absorbs everything left over. When the file has fewer distinct start
/// vertices than workers, trailing shards come out empty; the caller gets an
/// empty shard file, not an error. Disjoint per-shard vertex ranges require
/// the input to be sorted by start vertex.
pub fn partition(
    graph_path: &str,
    n_workers: usize,
    output_dir: &str,
) -> Result<Vec<ShardInfo>, SwError> {
    if n_workers == 0 {
        return Err(SwError::Partition("Cannot partition into zero shards".to_owned()));
    }

    let timer = SwTimer::now();
    let (vertex_counts, total_lines) = count_vertices(graph_path)?;
    info!(
        "Pre-scanned '{}': {} lines, {} distinct labels in {}",
        graph_path,
        total_lines,
        vertex_counts.len(),
        timer.elapsed().to_seconds_string()
    );

    let target_weight = total_lines * 2 / n_workers as u64;

    let mut shards = Vec::with_capacity(n_workers);
    let mut current = ShardWriter::create(0, output_dir)?;
    let mut last_start: Option<VertexLabel> = None;

    for line in get_file_lines(graph_path)? {
        let start = start_vertex(&line)
            .ok_or_else(|| SwError::EdgeParse(line.clone(), graph_path.to_owned()))?;

        if last_start != Some(start) {
            let group_weight = *vertex_counts.get(&start).unwrap_or(&0);
            let cut = current.lines > 0
                && shards.len() < n_workers - 1
                && current.weight + group_weight >= target_weight;
            if cut {
                shards.push(current.finish()?);
                current = ShardWriter::create(shards.len() as WorkerId, output_dir)?;
            }
            current.weight += group_weight;
            last_start = Some(start);
        }

        current.write_line(&line, start)?;
    }
    shards.push(current.finish()?);

    // Later workers get empty shards when the file ran out of start vertices.
    while shards.len() < n_workers {
        let empty = ShardWriter::create(shards.len() as WorkerId, output_dir)?;
        shards.push(empty.finish()?);
    }

    info!(
        "Partitioned '{}' into {} shards in {}",
        graph_path,
        shards.len(),
        timer.elapsed().to_seconds_string()
    );
    Ok(shards)
}

/// Counts, per vertex label, how many lines mention it on either end, along
/// with the total line count. Both endpoints matter for locality, which is
/// also why the partition target weight carries the factor of two.
fn count_vertices(graph_path: &str) -> Result<(HashMap<VertexLabel, u64>, u64), SwError> {
    let mut counts: HashMap<VertexLabel, u64> = HashMap::new();
    let mut total_lines = 0;
    let mut reader = edge_list_reader(get_buf_reader(graph_path)?);
    for record in reader.records().filter_map(Result::ok) {
        let (x, y) = parse_edge_record(&record, graph_path)?;
        *counts.entry(x).or_insert(0) += 1;
        *counts.entry(y).or_insert(0) += 1;
        total_lines += 1;
    }
    Ok((counts, total_lines))
}

pub fn start_vertex(line: &str) -> Option<VertexLabel> {
    line.split_whitespace().next().and_then(|token| token.parse().ok())
}

pub fn shard_file_path(output_dir: &str, worker_id: WorkerId) -> String {
    format!("{}/shard_{}.txt", output_dir, worker_id)
}

struct ShardWriter {
    worker_id: WorkerId,
    path: String,
    writer: SwWriter,
    lines: u64,
    weight: u64,
    min_vertex: VertexLabel,
    max_vertex: VertexLabel,
}

impl ShardWriter {
    fn create(worker_id: WorkerId, output_dir: &str) -> Result<Self, SwError> {
        let path = shard_file_path(output_dir, worker_id);
        Ok(Self {
            worker_id,
            writer: SwWriter::new(path.clone())?,
            path,
            lines: 0,
            weight: 0,
            min_vertex: VertexLabel::max_value(),
            max_vertex: 0,
        })
    }

    fn write_line(&mut self, line: &str, start: VertexLabel) -> Result<(), SwError> {
        self.writer.write_file_line(line)?;
        self.lines += 1;
        self.min_vertex = self.min_vertex.min(start);
        self.max_vertex = self.max_vertex.max(start);
        Ok(())
    }

    fn finish(mut self) -> Result<ShardInfo, SwError> {
        self.writer.flush()?;
        let (min_vertex, max_vertex) =
            if self.lines == 0 { (0, 0) } else { (self.min_vertex, self.max_vertex) };
        Ok(ShardInfo::new(self.worker_id, self.path, self.lines, min_vertex, max_vertex))
    }
}

#[cfg(test)]
mod tests {
    use super::{partition, start_vertex};
    use crate::graph::meta::CombinedMetaData;
    use crate::util::io::get_file_lines;
    use hashbrown::HashSet;
    use std::io::Write;

    const NINE_LINES: &str = "1 2\n1 3\n2 1\n2 3\n3 1\n3 2\n4 1\n4 2\n5 1\n";

    fn write_graph(dir: &tempfile::TempDir, content: &str) -> String {
        let path = dir.path().join("graph.txt");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(content.as_bytes()).unwrap();
        path.to_str().unwrap().to_owned()
    }

    fn reassemble(shards: &[super::ShardInfo]) -> String {
        let mut combined = String::new();
        for shard in shards {
            for line in get_file_lines(&shard.path).unwrap() {
                combined.push_str(&line);
                combined.push('\n');
            }
        }
        combined
    }

    #[test]
    fn nine_lines_into_three_shards_reassemble() {
        let dir = tempfile::tempdir().unwrap();
        let graph_path = write_graph(&dir, NINE_LINES);
        let shards = partition(&graph_path, 3, dir.path().to_str().unwrap()).unwrap();
        assert_eq!(shards.len(), 3);
        assert_eq!(reassemble(&shards), NINE_LINES);
    }

    #[test]
    fn no_start_vertex_spans_two_shards() {
        let dir = tempfile::tempdir().unwrap();
        let graph_path = write_graph(&dir, NINE_LINES);
        let shards = partition(&graph_path, 3, dir.path().to_str().unwrap()).unwrap();
        let mut seen: HashSet<u64> = HashSet::new();
        for shard in &shards {
            let starts: HashSet<u64> = get_file_lines(&shard.path)
                .unwrap()
                .map(|line| start_vertex(&line).unwrap())
                .collect();
            for start in &starts {
                assert!(seen.insert(*start), "start vertex {} appears in two shards", start);
            }
        }
    }

    #[test]
    fn single_shard_is_the_whole_file() {
        let dir = tempfile::tempdir().unwrap();
        let graph_path = write_graph(&dir, NINE_LINES);
        let shards = partition(&graph_path, 1, dir.path().to_str().unwrap()).unwrap();
        assert_eq!(shards.len(), 1);
        assert_eq!(reassemble(&shards), NINE_LINES);
        assert_eq!(shards[0].number_of_edges, 9);
        assert_eq!(shards[0].min_vertex, 1);
        assert_eq!(shards[0].max_vertex, 5);
    }

    #[test]
    fn more_workers_than_start_vertices_leaves_empty_shards() {
        let dir = tempfile::tempdir().unwrap();
        let graph_path = write_graph(&dir, "1 2\n1 3\n");
        let shards = partition(&graph_path, 4, dir.path().to_str().unwrap()).unwrap();
        assert_eq!(shards.len(), 4);
        assert_eq!(reassemble(&shards), "1 2\n1 3\n");
        assert!(shards.iter().skip(1).all(|shard| shard.number_of_edges == 0));
    }

    #[test]
    fn shard_ranges_are_disjoint_and_cover_all_labels() {
        let dir = tempfile::tempdir().unwrap();
        let graph_path = write_graph(&dir, NINE_LINES);
        let shards = partition(&graph_path, 3, dir.path().to_str().unwrap()).unwrap();

        let meta = CombinedMetaData::new(
            shards
                .iter()
                .map(|shard| shard.to_meta_data("localhost".to_owned(), 4000 + shard.worker_id as u16))
                .collect(),
        );

        // Disjoint: non-empty ranges must not overlap pairwise.
        let ranges: Vec<_> = meta
            .iter()
            .filter(|m| m.number_of_edges > 0)
            .map(|m| (m.min_vertex, m.max_vertex))
            .collect();
        for (i, (min_a, max_a)) in ranges.iter().enumerate() {
            for (min_b, max_b) in ranges.iter().skip(i + 1) {
                assert!(max_a < min_b || max_b < min_a, "ranges overlap");
            }
        }

        // Coverage: every label mentioned anywhere in the source resolves.
        for line in get_file_lines(&graph_path).unwrap() {
            for label in line.split_whitespace().map(|t| t.parse::<u64>().unwrap()) {
                meta.owner_of(label).unwrap();
            }
        }
    }
}
