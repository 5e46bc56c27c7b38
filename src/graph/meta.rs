use crate::error::SwError;
use crate::{VertexLabel, WorkerId};

/// Per-worker shard metadata, created once at startup from the worker's shard
/// file plus its registered network address, immutable afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, new)]
pub struct MetaData {
    pub worker_id: WorkerId,
    pub number_of_edges: u64,
    pub min_vertex: VertexLabel,
    pub max_vertex: VertexLabel,
    pub host: String,
    pub port: u16,
}

impl MetaData {
    /// Whether this worker's inclusive label range owns `label`. An empty
    /// shard owns nothing, whatever its nominal range says.
    pub fn owns(&self, label: VertexLabel) -> bool {
        self.number_of_edges > 0 && self.min_vertex <= label && label <= self.max_vertex
    }
}

/// The fleet-wide directory mapping vertex ranges to worker addresses. Built
/// once by the master and broadcast; read-only from a worker's perspective.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CombinedMetaData {
    workers: Vec<MetaData>,
}

impl CombinedMetaData {
    pub fn new(mut workers: Vec<MetaData>) -> Self {
        workers.sort_by_key(|meta| meta.worker_id);
        Self { workers }
    }

    pub fn get(&self, worker_id: WorkerId) -> Option<&MetaData> {
        self.workers.iter().find(|meta| meta.worker_id == worker_id)
    }

    /// Resolves a vertex label to its owning worker. A label outside every
    /// range means the partition step and this directory disagree, which is a
    /// hard error, not something to retry.
    pub fn owner_of(&self, label: VertexLabel) -> Result<&MetaData, SwError> {
        self.workers
            .iter()
            .find(|meta| meta.owns(label))
            .ok_or(SwError::VertexOwner(label))
    }

    pub fn connection_for(&self, label: VertexLabel) -> Result<(&str, u16), SwError> {
        let owner = self.owner_of(label)?;
        Ok((&owner.host, owner.port))
    }

    pub fn iter(&self) -> impl Iterator<Item = &MetaData> {
        self.workers.iter()
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    pub fn total_edges(&self) -> u64 {
        self.workers.iter().map(|meta| meta.number_of_edges).sum()
    }

    /// Overlapping ranges would make vertex ownership ambiguous; the master
    /// refuses to broadcast a directory where any two non-empty shards
    /// intersect.
    pub fn ensure_disjoint_ranges(&self) -> Result<(), SwError> {
        let ranges: Vec<&MetaData> =
            self.workers.iter().filter(|meta| meta.number_of_edges > 0).collect();
        for (i, a) in ranges.iter().enumerate() {
            for b in ranges.iter().skip(i + 1) {
                if a.min_vertex <= b.max_vertex && b.min_vertex <= a.max_vertex {
                    return Err(SwError::Partition(format!(
                        "Vertex ranges of workers {} and {} overlap: [{}, {}] vs [{}, {}]",
                        a.worker_id,
                        b.worker_id,
                        a.min_vertex,
                        a.max_vertex,
                        b.min_vertex,
                        b.max_vertex
                    )));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{CombinedMetaData, MetaData};
    use crate::error::SwError;

    fn fleet() -> CombinedMetaData {
        CombinedMetaData::new(vec![
            MetaData::new(1, 4, 10, 19, "hostb".to_owned(), 4001),
            MetaData::new(0, 3, 0, 9, "hosta".to_owned(), 4000),
            MetaData::new(2, 0, 0, 0, "hostc".to_owned(), 4002),
        ])
    }

    #[test]
    fn workers_ordered_by_id() {
        let meta = fleet();
        let ids: Vec<_> = meta.iter().map(|m| m.worker_id).collect();
        assert_eq!(ids, vec![0, 1, 2]);
    }

    #[test]
    fn owner_lookup() {
        let meta = fleet();
        assert_eq!(meta.owner_of(0).unwrap().worker_id, 0);
        assert_eq!(meta.owner_of(9).unwrap().worker_id, 0);
        assert_eq!(meta.owner_of(15).unwrap().worker_id, 1);
        assert_eq!(meta.connection_for(12).unwrap(), ("hostb", 4001));
    }

    #[test]
    fn label_outside_all_ranges_is_an_error() {
        match fleet().owner_of(25) {
            Err(SwError::VertexOwner(25)) => {}
            other => panic!("expected VertexOwner error, got {:?}", other.map(|m| m.worker_id)),
        }
    }

    #[test]
    fn empty_shard_owns_nothing() {
        // Worker 2 has zero edges; its nominal [0, 0] range must not capture
        // label 0, which belongs to worker 0.
        assert_eq!(fleet().owner_of(0).unwrap().worker_id, 0);
        assert!(!fleet().get(2).unwrap().owns(0));
    }

    #[test]
    fn total_edges_sums_fleet() {
        assert_eq!(fleet().total_edges(), 7);
    }

    #[test]
    fn overlapping_ranges_are_rejected() {
        assert!(fleet().ensure_disjoint_ranges().is_ok());
        let overlapping = CombinedMetaData::new(vec![
            MetaData::new(0, 3, 0, 10, "hosta".to_owned(), 4000),
            MetaData::new(1, 4, 10, 19, "hostb".to_owned(), 4001),
        ]);
        assert!(overlapping.ensure_disjoint_ranges().is_err());
    }
}
