use crate::graph::{DistributedGraph, Edge, ForeignVertex, VertexLookup};
use crate::VertexLabel;
use rand::seq::SliceRandom;
use rand::Rng;

/// Outcome of advancing a walker by one step. A boundary crossing is control
/// flow for the caller, not a failure: the walker must be handed off to the
/// owner of the foreign vertex and dropped from the local pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Stepped(Edge),
    Crossed(ForeignVertex),
}

/// A stateful random-walk cursor. While active its position is always a
/// locally-owned vertex; after returning [`Step::Crossed`] the position is
/// the foreign vertex and the walker must not step again on this worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RandomWalker {
    position: VertexLabel,
}

impl RandomWalker {
    pub fn new(position: VertexLabel) -> Self {
        Self { position }
    }

    pub fn position(&self) -> VertexLabel {
        self.position
    }

    /// Moves to a uniformly random neighbor of the current vertex. Returns
    /// the traversed edge, or signals a boundary crossing when the chosen
    /// neighbor is owned by another worker.
    ///
    /// Panics if the current position is foreign or has no neighbors; both
    /// violate pool invariants (a suspended walker is removed on hand-off,
    /// and a degree-0 vertex never hosts a walker).
    pub fn step(&mut self, graph: &DistributedGraph, rng: &mut impl Rng) -> Step {
        let vertex = match graph.lookup(self.position) {
            VertexLookup::Local(vertex) => vertex,
            VertexLookup::Foreign(_) => {
                panic!("suspended walker at vertex {} cannot step", self.position)
            }
        };
        let next = *vertex
            .neighbors()
            .choose(rng)
            .expect("a walker must never sit on a degree-0 vertex");
        self.position = next;
        match graph.lookup(next) {
            VertexLookup::Local(_) => Step::Stepped(Edge::new(vertex.label, next)),
            VertexLookup::Foreign(foreign) => Step::Crossed(foreign),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{RandomWalker, Step};
    use crate::graph::meta::{CombinedMetaData, MetaData};
    use crate::graph::DistributedGraph;
    use hashbrown::HashSet;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn single_worker_graph(content: &[u8], max_vertex: u64) -> DistributedGraph {
        let meta = CombinedMetaData::new(vec![MetaData::new(
            0,
            1,
            1,
            max_vertex,
            "localhost".to_owned(),
            4000,
        )]);
        DistributedGraph::from_shard_bytes(0, meta, content).unwrap()
    }

    #[test]
    fn seeded_walks_are_reproducible() {
        let graph = single_worker_graph(b"1 2\n1 3\n2 3\n3 4\n4 1\n", 4);
        let visit = |seed: u64| -> Vec<u64> {
            let mut rng = StdRng::seed_from_u64(seed);
            let mut walker = RandomWalker::new(1);
            (0..50)
                .map(|_| {
                    walker.step(&graph, &mut rng);
                    walker.position()
                })
                .collect()
        };
        assert_eq!(visit(42), visit(42));
        // A different seed should diverge somewhere over 50 steps.
        assert_ne!(visit(42), visit(43));
    }

    #[test]
    fn confined_walker_collects_single_edge() {
        // A walker confined to a two-vertex shard can only ever traverse the
        // one edge, whatever the step count.
        let graph = single_worker_graph(b"1 2\n", 2);
        let mut rng = StdRng::seed_from_u64(0);
        let mut walker = RandomWalker::new(1);
        let mut collected: HashSet<String> = HashSet::new();
        for _ in 0..100 {
            match walker.step(&graph, &mut rng) {
                Step::Stepped(edge) => {
                    collected.insert(edge.to_string());
                }
                Step::Crossed(_) => panic!("no foreign vertices in this graph"),
            }
        }
        let expected: HashSet<String> = vec!["1 - 2".to_owned()].into_iter().collect();
        assert_eq!(collected, expected);
    }

    #[test]
    fn stepping_into_foreign_vertex_suspends() {
        // Worker 0 owns [1, 2]; vertex 3 lives on worker 1. The only edge
        // from vertex 2 leads across the boundary.
        let meta = CombinedMetaData::new(vec![
            MetaData::new(0, 2, 1, 2, "localhost".to_owned(), 4000),
            MetaData::new(1, 1, 3, 4, "localhost".to_owned(), 4001),
        ]);
        let graph = DistributedGraph::from_shard_bytes(0, meta, b"2 3\n").unwrap();
        let mut rng = StdRng::seed_from_u64(0);
        let mut walker = RandomWalker::new(2);
        match walker.step(&graph, &mut rng) {
            Step::Crossed(foreign) => {
                assert_eq!(foreign.label, 3);
                assert_eq!(walker.position(), 3);
            }
            Step::Stepped(edge) => panic!("expected a crossing, stepped {}", edge),
        }
    }
}
