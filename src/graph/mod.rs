use crate::error::SwError;
use crate::graph::meta::CombinedMetaData;
use crate::util::io::get_buf_reader;
use crate::{VertexLabel, WorkerId};
use hashbrown::HashMap;
use log::info;
use std::fmt;
use std::io::Read;

pub mod meta;

/// An undirected edge stored with its endpoints in canonical (low, high)
/// order, so `1 - 2` and `2 - 1` hash and compare as the same edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Edge {
    a: VertexLabel,
    b: VertexLabel,
}

impl Edge {
    pub fn new(x: VertexLabel, y: VertexLabel) -> Self {
        if x <= y {
            Self { a: x, b: y }
        } else {
            Self { a: y, b: x }
        }
    }

    pub fn endpoints(&self) -> (VertexLabel, VertexLabel) {
        (self.a, self.b)
    }

    /// On-disk edge-list form: `"a b"`.
    pub fn to_line(&self) -> String {
        format!("{} {}", self.a, self.b)
    }

    pub fn from_line(line: &str, context: &str) -> Result<Self, SwError> {
        let mut labels = line.split_whitespace().map(str::parse::<VertexLabel>);
        match (labels.next(), labels.next()) {
            (Some(Ok(x)), Some(Ok(y))) => Ok(Edge::new(x, y)),
            _ => Err(SwError::EdgeParse(line.to_owned(), context.to_owned())),
        }
    }
}

impl fmt::Display for Edge {
    /// Walk form: `"a - b"`.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} - {}", self.a, self.b)
    }
}

/// A vertex owned by another worker. Only the label is known; there is
/// deliberately no way to enumerate its neighbors from here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignVertex {
    pub label: VertexLabel,
}

/// A vertex owned by this worker, with the full adjacency its shard holds.
#[derive(Debug, Clone, Copy)]
pub struct LocalVertex<'g> {
    pub label: VertexLabel,
    neighbors: &'g [VertexLabel],
}

impl<'g> LocalVertex<'g> {
    pub fn neighbors(&self) -> &'g [VertexLabel] {
        self.neighbors
    }

    pub fn degree(&self) -> usize {
        self.neighbors.len()
    }
}

/// Result of resolving a vertex label against a worker's shard: either the
/// vertex is owned here, or it lives on another worker.
#[derive(Debug)]
pub enum VertexLookup<'g> {
    Local(LocalVertex<'g>),
    Foreign(ForeignVertex),
}

/// The worker-local view of the partitioned graph. Adjacency is materialized
/// only for vertices inside this worker's own label range; any other label
/// resolves to a [`ForeignVertex`] stub even when it appears as an endpoint
/// in the local shard, since its full adjacency lives elsewhere.
pub struct DistributedGraph {
    worker_id: WorkerId,
    meta: CombinedMetaData,
    adjacency: HashMap<VertexLabel, Vec<VertexLabel>>,
    edge_count: u64,
}

impl DistributedGraph {
    pub fn from_shard_file(
        worker_id: WorkerId,
        meta: CombinedMetaData,
        shard_path: &str,
    ) -> Result<Self, SwError> {
        let reader = get_buf_reader(shard_path)?;
        Self::from_reader(worker_id, meta, reader, shard_path)
    }

    /// Builds the graph from shard content already in memory, e.g. as
    /// reassembled by the file-transfer protocol.
    pub fn from_shard_bytes(
        worker_id: WorkerId,
        meta: CombinedMetaData,
        content: &[u8],
    ) -> Result<Self, SwError> {
        Self::from_reader(worker_id, meta, content, "<received shard>")
    }

    fn from_reader(
        worker_id: WorkerId,
        meta: CombinedMetaData,
        reader: impl Read,
        context: &str,
    ) -> Result<Self, SwError> {
        let own_meta = meta
            .get(worker_id)
            .ok_or_else(|| {
                SwError::Setup(format!("Worker {} is missing from the fleet metadata", worker_id))
            })?
            .clone();

        let mut adjacency: HashMap<VertexLabel, Vec<VertexLabel>> = HashMap::new();
        let mut edge_count = 0;
        let mut csv_reader = edge_list_reader(reader);
        for record in csv_reader.records().filter_map(Result::ok) {
            let (x, y) = parse_edge_record(&record, context)?;
            if own_meta.owns(x) {
                adjacency.entry(x).or_insert_with(Vec::new).push(y);
            }
            if x != y && own_meta.owns(y) {
                adjacency.entry(y).or_insert_with(Vec::new).push(x);
            }
            edge_count += 1;
        }
        info!(
            "Worker {}: local graph has {} owned vertices from {} shard edges",
            worker_id,
            adjacency.len(),
            edge_count
        );
        Ok(Self { worker_id, meta, adjacency, edge_count })
    }

    pub fn lookup(&self, label: VertexLabel) -> VertexLookup {
        match self.adjacency.get(&label) {
            Some(neighbors) => VertexLookup::Local(LocalVertex { label, neighbors }),
            None => VertexLookup::Foreign(ForeignVertex { label }),
        }
    }

    pub fn contains_local(&self, label: VertexLabel) -> bool {
        self.adjacency.contains_key(&label)
    }

    /// Picks a uniformly random locally-owned vertex by rejection sampling
    /// over this worker's label range. The range may have gaps, so labels are
    /// drawn until one resolves locally. Returns `None` when the shard is
    /// empty and no label could ever resolve.
    pub fn random_local_vertex(&self, rng: &mut impl rand::Rng) -> Option<VertexLabel> {
        let own_meta = self.meta.get(self.worker_id)?;
        if own_meta.number_of_edges == 0 || self.adjacency.is_empty() {
            return None;
        }
        loop {
            let label = rng.gen_range(own_meta.min_vertex..=own_meta.max_vertex);
            if self.contains_local(label) {
                return Some(label);
            }
        }
    }

    pub fn meta(&self) -> &CombinedMetaData {
        &self.meta
    }

    pub fn worker_id(&self) -> WorkerId {
        self.worker_id
    }

    pub fn local_vertex_count(&self) -> usize {
        self.adjacency.len()
    }

    pub fn local_edge_count(&self) -> u64 {
        self.edge_count
    }
}

/// Edge-list files are space-separated, headerless, two integer columns.
pub fn edge_list_reader<R: Read>(reader: R) -> csv::Reader<R> {
    csv::ReaderBuilder::new()
        .delimiter(b' ')
        .has_headers(false)
        .flexible(true)
        .double_quote(false)
        .from_reader(reader)
}

pub fn parse_edge_record(
    record: &csv::StringRecord,
    context: &str,
) -> Result<(VertexLabel, VertexLabel), SwError> {
    let error =
        || SwError::EdgeParse(record.iter().collect::<Vec<_>>().join(" "), context.to_owned());
    let x = record.get(0).and_then(|s| s.parse().ok()).ok_or_else(error)?;
    let y = record.get(1).and_then(|s| s.parse().ok()).ok_or_else(error)?;
    Ok((x, y))
}
