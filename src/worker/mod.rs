//! The worker node: owns the local shard, the walker pool and the backup
//! ledger, and runs the single-threaded control loop that drains the message
//! inbox between walker batches. Only the listener and heartbeat threads run
//! beside it, and neither shares mutable state with the loop.

use crate::error::SwError;
use crate::graph::meta::CombinedMetaData;
use crate::graph::{DistributedGraph, Edge};
use crate::protocol::transfer::{FileReceiver, FileSender, TransferTag};
use crate::protocol::transport::{
    send_message, send_to_master, start_message_server, MessageServer,
};
use crate::protocol::Message;
use crate::util::memory_usage::print_memory_usage;
use crate::util::timer::SwTimer;
use crate::walker::{RandomWalker, Step};
use crate::{VertexLabel, WorkerId};
use crossbeam_channel::{Receiver, RecvTimeoutError};
use hashbrown::{HashMap, HashSet};
use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::thread;
use std::time::Duration;

pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(1);
const RECV_POLL_INTERVAL: Duration = Duration::from_millis(100);
const PROGRESS_REPORT_INTERVAL: u64 = 100;
const FINAL_BACKUP_ACK_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub worker_id: WorkerId,
    pub master_host: String,
    pub master_port: u16,
    pub bind_host: String,
    pub number_of_random_walkers: usize,
    /// Unflushed-edge count that triggers a backup flush; 0 disables
    /// incremental backups and flushes only at the very end.
    pub backup_threshold: usize,
    /// Walker-stepping passes per control-loop iteration.
    pub walking_iterations: usize,
    pub load_backup: bool,
    pub rng_seed: Option<u64>,
}

/// The worker's lifecycle as an explicit state record. "Walker arrives before
/// the pool exists" is a legitimate transition (buffered), not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerPhase {
    SetupPending,
    WaitingForContinue,
    Running,
    PausedForFailure,
}

pub struct Worker {
    config: WorkerConfig,
    server: MessageServer,
    inbox: Receiver<Message>,
    phase: WorkerPhase,
    cancel: bool,
    continue_received: bool,
    meta: Option<CombinedMetaData>,
    graph: Option<DistributedGraph>,
    walkers: Vec<RandomWalker>,
    pending_walkers: Vec<VertexLabel>,
    file_receivers: HashMap<TransferTag, FileReceiver>,
    backup_sender: Option<FileSender>,
    collected_edges: HashSet<Edge>,
    unflushed_edges: Vec<Edge>,
    last_progress_report: u64,
    rng: StdRng,
}

/// Runs a worker to completion: listener, registration, heartbeat, setup,
/// walk loop, final flush.
pub fn run(config: WorkerConfig) -> Result<(), SwError> {
    let started_at = SwTimer::now();
    let (server, inbox) = start_message_server(&config.bind_host)?;
    info!(
        "Worker {} listening on {}:{}",
        config.worker_id, server.host, server.port
    );

    send_to_master(
        config.worker_id,
        &config.master_host,
        config.master_port,
        &Message::Register {
            worker_id: config.worker_id,
            host: server.host.clone(),
            port: server.port,
        },
    )?;
    start_heartbeat(config.worker_id, config.master_host.clone(), config.master_port)?;

    let mut worker = Worker::new(config, server, inbox);
    worker.setup()?;
    info!(
        "Worker {}: setup took {}",
        worker.config.worker_id,
        started_at.elapsed().to_seconds_string()
    );
    worker.wait_for_continue()?;
    worker.run_walks()
}

/// Periodically pings the master so it can detect this worker's death. The
/// thread shares nothing with the control loop except the master address;
/// undeliverable pings are the master's problem, not ours.
pub fn start_heartbeat(
    worker_id: WorkerId,
    master_host: String,
    master_port: u16,
) -> Result<(), SwError> {
    thread::Builder::new()
        .name("heartbeat".to_owned())
        .spawn(move || loop {
            let message = Message::Alive { worker_id };
            if let Err(e) = send_message(&master_host, master_port, &message) {
                debug!("Heartbeat not delivered: {}", e);
            }
            thread::sleep(HEARTBEAT_INTERVAL);
        })
        .map_err(|e| SwError::Generic(format!("Could not start heartbeat thread: {}", e)))?;
    Ok(())
}

impl Worker {
    pub fn new(config: WorkerConfig, server: MessageServer, inbox: Receiver<Message>) -> Self {
        let rng = match config.rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            config,
            server,
            inbox,
            phase: WorkerPhase::SetupPending,
            cancel: false,
            continue_received: false,
            meta: None,
            graph: None,
            walkers: Vec::new(),
            pending_walkers: Vec::new(),
            file_receivers: HashMap::new(),
            backup_sender: None,
            collected_edges: HashSet::new(),
            unflushed_edges: Vec::new(),
            last_progress_report: 0,
            rng,
        }
    }

    /// Waits for metadata, the graph shard, and (when recovering) the backup
    /// to arrive, then builds the local graph and the walker pool. The whole
    /// sequence is idempotent against being rerun after a crash: everything
    /// is derived from what the master resends.
    pub fn setup(&mut self) -> Result<(), SwError> {
        while !self.setup_transfers_complete() {
            match self.inbox.recv_timeout(RECV_POLL_INTERVAL) {
                Ok(message) => self.handle_message(message)?,
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(SwError::Setup("Listener thread is gone".to_owned()));
                }
            }
        }

        let meta = self.meta.clone().ok_or_else(|| {
            SwError::Setup("Setup finished without fleet metadata".to_owned())
        })?;
        let shard = self
            .file_receivers
            .remove(&TransferTag::Graph)
            .and_then(|receiver| receiver.content().map(<[u8]>::to_vec))
            .ok_or_else(|| SwError::Setup("Setup finished without a graph shard".to_owned()))?;
        let graph =
            DistributedGraph::from_shard_bytes(self.config.worker_id, meta, &shard)?;

        for _ in 0..self.config.number_of_random_walkers {
            match graph.random_local_vertex(&mut self.rng) {
                Some(label) => self.walkers.push(RandomWalker::new(label)),
                None => {
                    warn!(
                        "Worker {}: empty shard, starting without walkers",
                        self.config.worker_id
                    );
                    break;
                }
            }
        }
        self.graph = Some(graph);

        // Walkers that arrived from peers while the pool did not exist yet.
        let buffered: Vec<VertexLabel> = self.pending_walkers.drain(..).collect();
        for label in buffered {
            self.walkers.push(RandomWalker::new(label));
        }

        if self.config.load_backup {
            self.replay_backup()?;
        }

        print_memory_usage(format_args!("worker {} setup complete", self.config.worker_id));
        if self.phase == WorkerPhase::SetupPending {
            self.phase = WorkerPhase::WaitingForContinue;
        }
        Ok(())
    }

    fn setup_transfers_complete(&self) -> bool {
        let graph_done = self
            .file_receivers
            .get(&TransferTag::Graph)
            .map_or(false, FileReceiver::is_complete);
        let backup_done = !self.config.load_backup
            || self
                .file_receivers
                .get(&TransferTag::Backup)
                .map_or(false, FileReceiver::is_complete);
        self.meta.is_some() && graph_done && backup_done
    }

    /// Reloads previously persisted edges so a restarted worker does not
    /// re-emit duplicates. Replayed edges are already on the master, so they
    /// are not queued for flushing again.
    fn replay_backup(&mut self) -> Result<(), SwError> {
        let content = self
            .file_receivers
            .remove(&TransferTag::Backup)
            .and_then(|receiver| receiver.content().map(<[u8]>::to_vec))
            .ok_or_else(|| SwError::Setup("Backup replay requested but not received".to_owned()))?;
        let text = String::from_utf8_lossy(&content).into_owned();
        for line in text.lines().filter(|line| !line.trim().is_empty()) {
            self.collected_edges.insert(Edge::from_line(line, "<received backup>")?);
        }
        info!(
            "Worker {}: replayed {} edges from backup",
            self.config.worker_id,
            self.collected_edges.len()
        );
        Ok(())
    }

    /// Blocks until the master's CONTINUE, still servicing every other
    /// message kind while suspended.
    pub fn wait_for_continue(&mut self) -> Result<(), SwError> {
        loop {
            if self.continue_received {
                self.continue_received = false;
                self.phase = WorkerPhase::Running;
                return Ok(());
            }
            match self.inbox.recv_timeout(RECV_POLL_INTERVAL) {
                Ok(message) => self.handle_message(message)?,
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(SwError::Setup("Listener thread is gone".to_owned()));
                }
            }
        }
    }

    /// The main sampling loop: drain messages, advance walkers, report and
    /// back up, until cancelled. Cancellation is cooperative; the in-flight
    /// batch always completes and the remainder is flushed before FINISH_JOB.
    pub fn run_walks(&mut self) -> Result<(), SwError> {
        let timer = SwTimer::now();
        info!("Worker {}: starting walk loop with {} walkers", self.config.worker_id, self.walkers.len());

        loop {
            while let Ok(message) = self.inbox.try_recv() {
                self.handle_message(message)?;
            }
            if self.cancel {
                break;
            }
            if self.phase == WorkerPhase::PausedForFailure {
                self.wait_for_continue()?;
                continue;
            }

            if self.walkers.is_empty() {
                // Nothing to advance; block until a walker is handed to us.
                match self.inbox.recv_timeout(RECV_POLL_INTERVAL) {
                    Ok(message) => self.handle_message(message)?,
                    Err(RecvTimeoutError::Timeout) => {}
                    Err(RecvTimeoutError::Disconnected) => {
                        return Err(SwError::Setup("Listener thread is gone".to_owned()));
                    }
                }
                continue;
            }

            for _ in 0..self.config.walking_iterations {
                self.advance_walkers()?;
            }
            self.report_progress()?;
            if self.config.backup_threshold > 0
                && self.unflushed_edges.len() > self.config.backup_threshold
            {
                self.flush_backup()?;
            }
        }

        self.flush_backup()?;
        self.await_backup_ack()?;
        send_to_master(
            self.config.worker_id,
            &self.config.master_host,
            self.config.master_port,
            &Message::FinishJob { worker_id: self.config.worker_id },
        )?;
        info!(
            "Worker {}: finished with {} collected edges in {}",
            self.config.worker_id,
            self.collected_edges.len(),
            timer.elapsed().to_seconds_string()
        );
        Ok(())
    }

    /// Advances every active walker one step. A walker that crosses a shard
    /// boundary is handed to the owner named in the fleet metadata and
    /// removed from the pool; an unreachable peer means the walker is
    /// dropped, a loss the sampling design accepts.
    fn advance_walkers(&mut self) -> Result<(), SwError> {
        let graph = self
            .graph
            .as_ref()
            .ok_or_else(|| SwError::Setup("Walk loop started before the graph".to_owned()))?;
        // Hand-offs resolve against the worker's own metadata copy, which the
        // master refreshes when a restarted peer comes back on a new port.
        let meta = self
            .meta
            .as_ref()
            .ok_or_else(|| SwError::Setup("Walk loop started before the metadata".to_owned()))?;
        let mut index = 0;
        while index < self.walkers.len() {
            match self.walkers[index].step(graph, &mut self.rng) {
                Step::Stepped(edge) => {
                    if self.collected_edges.insert(edge) {
                        self.unflushed_edges.push(edge);
                    }
                    index += 1;
                }
                Step::Crossed(foreign) => {
                    let (host, port) = meta.connection_for(foreign.label)?;
                    let handoff = Message::RandomWalker { vertex: foreign.label };
                    if let Err(e) = send_message(host, port, &handoff) {
                        debug!("Dropping walker bound for vertex {}: {}", foreign.label, e);
                    }
                    self.walkers.swap_remove(index);
                }
            }
        }
        Ok(())
    }

    /// Tells the master how far along we are, once per interval crossing and
    /// never twice at the same count.
    fn report_progress(&mut self) -> Result<(), SwError> {
        let count = self.collected_edges.len() as u64;
        if count > 0
            && count % PROGRESS_REPORT_INTERVAL == 0
            && count != self.last_progress_report
        {
            send_to_master(
                self.config.worker_id,
                &self.config.master_host,
                self.config.master_port,
                &Message::Progress { worker_id: self.config.worker_id, collected_edges: count },
            )?;
            self.last_progress_report = count;
        }
        Ok(())
    }

    /// Ships all unflushed edges to the master as one backup transfer. The
    /// sender is retained so MISSING_CHUNK requests can be answered until
    /// RECEIVED_FILE releases it.
    fn flush_backup(&mut self) -> Result<(), SwError> {
        if self.unflushed_edges.is_empty() {
            return Ok(());
        }
        let content: String =
            self.unflushed_edges.iter().map(|edge| edge.to_line() + "\n").collect();
        let sender =
            FileSender::new(self.config.worker_id, TransferTag::Backup, content.as_bytes());
        for message in sender.all_messages() {
            send_to_master(
                self.config.worker_id,
                &self.config.master_host,
                self.config.master_port,
                &message,
            )?;
        }
        info!(
            "Worker {}: backed up {} edges to master",
            self.config.worker_id,
            self.unflushed_edges.len()
        );
        self.backup_sender = Some(sender);
        self.unflushed_edges.clear();
        Ok(())
    }

    /// After the final flush, stays reachable for retransmission requests
    /// until the master confirms the backup, bounded so a dead master cannot
    /// hold the process open forever.
    fn await_backup_ack(&mut self) -> Result<(), SwError> {
        let timer = SwTimer::now();
        while self.backup_sender.is_some() && *timer.elapsed() < FINAL_BACKUP_ACK_TIMEOUT {
            match self.inbox.recv_timeout(RECV_POLL_INTERVAL) {
                Ok(message) => self.handle_message(message)?,
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        if self.backup_sender.is_some() {
            warn!(
                "Worker {}: master did not confirm the final backup",
                self.config.worker_id
            );
        }
        Ok(())
    }

    /// Exhaustive dispatch over every message kind the protocol defines.
    pub fn handle_message(&mut self, message: Message) -> Result<(), SwError> {
        match message {
            Message::MetaData(meta) => {
                info!("Worker {}: received metadata for {} workers", self.config.worker_id, meta.len());
                self.meta = Some(meta);
            }
            Message::RandomWalker { vertex } => self.enroll_walker(vertex),
            Message::Continue => {
                self.continue_received = true;
                if self.phase == WorkerPhase::PausedForFailure {
                    // The run loop notices on its next iteration.
                    debug!("Worker {}: continue received while paused", self.config.worker_id);
                }
            }
            Message::FinishJob { .. } => {
                info!("Worker {}: finish requested", self.config.worker_id);
                self.cancel = true;
            }
            Message::WorkerFailed => self.handle_worker_failed()?,
            Message::StartSendFile { tag, total_chunks, .. } => {
                debug!(
                    "Worker {}: incoming {} transfer of {} chunks",
                    self.config.worker_id, tag, total_chunks
                );
                self.file_receivers.insert(tag, FileReceiver::new(tag, total_chunks));
            }
            Message::FileChunk { tag, index, payload, .. } => {
                match self.file_receivers.get_mut(&tag) {
                    Some(receiver) => receiver.store_chunk(index, payload)?,
                    None => warn!(
                        "Worker {}: chunk for unknown {} transfer",
                        self.config.worker_id, tag
                    ),
                }
            }
            Message::EndSendFile { tag, .. } => self.handle_end_send_file(tag)?,
            Message::MissingChunk { tag, indices, .. } => {
                match &self.backup_sender {
                    Some(sender) if sender.tag() == tag => {
                        info!(
                            "Worker {}: retransmitting {} backup chunks",
                            self.config.worker_id,
                            indices.len()
                        );
                        for message in sender.retransmit_messages(&indices) {
                            send_to_master(
                                self.config.worker_id,
                                &self.config.master_host,
                                self.config.master_port,
                                &message,
                            )?;
                        }
                    }
                    _ => warn!(
                        "Worker {}: missing-chunk request for a transfer we are not sending",
                        self.config.worker_id
                    ),
                }
            }
            Message::ReceivedFile { tag, .. } => {
                if tag == TransferTag::Backup {
                    self.backup_sender = None;
                }
            }
            // Master-bound kinds; a peer sending them here is a bug on the
            // peer's side, not ours.
            Message::Alive { .. }
            | Message::Register { .. }
            | Message::Progress { .. }
            | Message::RandomWalkerCount { .. } => {
                debug!("Worker {}: ignoring master-bound message", self.config.worker_id);
            }
        }
        Ok(())
    }

    fn enroll_walker(&mut self, vertex: VertexLabel) {
        if self.graph.is_some() {
            self.walkers.push(RandomWalker::new(vertex));
        } else {
            // Pool does not exist yet (crash recovery in progress).
            self.pending_walkers.push(vertex);
        }
    }

    /// A peer died. Report our walker count so the master can re-budget, and
    /// pause until it signals CONTINUE again.
    fn handle_worker_failed(&mut self) -> Result<(), SwError> {
        // A CONTINUE observed before the pause belongs to the previous phase.
        self.continue_received = false;
        let count = if self.graph.is_some() {
            self.walkers.len() + self.pending_walkers.len()
        } else {
            self.config.number_of_random_walkers + self.pending_walkers.len()
        };
        send_to_master(
            self.config.worker_id,
            &self.config.master_host,
            self.config.master_port,
            &Message::RandomWalkerCount {
                worker_id: self.config.worker_id,
                count: count as u32,
            },
        )?;
        if self.phase == WorkerPhase::Running {
            self.phase = WorkerPhase::PausedForFailure;
        }
        Ok(())
    }

    fn handle_end_send_file(&mut self, tag: TransferTag) -> Result<(), SwError> {
        let receiver = match self.file_receivers.get_mut(&tag) {
            Some(receiver) => receiver,
            None => {
                warn!("Worker {}: end of unknown {} transfer", self.config.worker_id, tag);
                return Ok(());
            }
        };
        let reply = if receiver.finalize().is_some() {
            Message::ReceivedFile { worker_id: self.config.worker_id, tag }
        } else {
            Message::MissingChunk {
                worker_id: self.config.worker_id,
                tag,
                indices: receiver.missing_chunks(),
            }
        };
        send_to_master(
            self.config.worker_id,
            &self.config.master_host,
            self.config.master_port,
            &reply,
        )
    }

    pub fn server(&self) -> &MessageServer {
        &self.server
    }

    pub fn phase(&self) -> WorkerPhase {
        self.phase
    }
}

#[cfg(test)]
mod tests {
    use super::{Worker, WorkerConfig, WorkerPhase};
    use crate::graph::meta::{CombinedMetaData, MetaData};
    use crate::graph::{DistributedGraph, Edge};
    use crate::protocol::transport::{start_message_server, MessageServer};
    use crate::protocol::Message;
    use crate::walker::RandomWalker;
    use crossbeam_channel::unbounded;
    use std::time::Duration;

    fn test_config(worker_id: u32, master_port: u16) -> WorkerConfig {
        WorkerConfig {
            worker_id,
            master_host: "127.0.0.1".to_owned(),
            master_port,
            bind_host: "127.0.0.1".to_owned(),
            number_of_random_walkers: 1,
            backup_threshold: 0,
            walking_iterations: 1,
            load_backup: false,
            rng_seed: Some(11),
        }
    }

    fn test_worker(worker_id: u32, master_port: u16) -> Worker {
        let (_sender, inbox) = unbounded();
        let server = MessageServer { host: "127.0.0.1".to_owned(), port: 0 };
        Worker::new(test_config(worker_id, master_port), server, inbox)
    }

    #[test]
    fn walker_arriving_before_pool_is_buffered() {
        let mut worker = test_worker(0, 59999);
        worker.handle_message(Message::RandomWalker { vertex: 4 }).unwrap();
        assert!(worker.walkers.is_empty());
        assert_eq!(worker.pending_walkers, vec![4]);
    }

    #[test]
    fn finish_job_sets_cancel() {
        let mut worker = test_worker(0, 59999);
        worker.handle_message(Message::FinishJob { worker_id: 0 }).unwrap();
        assert!(worker.cancel);
    }

    #[test]
    fn crossing_walker_is_forwarded_and_removed() {
        // Fake worker B listens for the hand-off.
        let (peer, peer_inbox) = start_message_server("127.0.0.1").unwrap();

        let meta = CombinedMetaData::new(vec![
            MetaData::new(0, 2, 1, 2, "127.0.0.1".to_owned(), 1),
            MetaData::new(1, 1, 3, 4, peer.host.clone(), peer.port),
        ]);
        let graph = DistributedGraph::from_shard_bytes(0, meta.clone(), b"2 3\n").unwrap();

        let mut worker = test_worker(0, 59999);
        worker.meta = Some(meta);
        worker.graph = Some(graph);
        worker.walkers.push(RandomWalker::new(2));

        // Vertex 2's only neighbor is the foreign vertex 3: one pass must
        // suspend the walker, forward it to B, and drop it from the pool.
        worker.advance_walkers().unwrap();
        assert!(worker.walkers.is_empty());
        let received = peer_inbox.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(received, Message::RandomWalker { vertex: 3 });
    }

    #[test]
    fn collected_edges_are_deduplicated() {
        let meta = CombinedMetaData::new(vec![MetaData::new(
            0,
            1,
            1,
            2,
            "127.0.0.1".to_owned(),
            1,
        )]);
        let graph = DistributedGraph::from_shard_bytes(0, meta.clone(), b"1 2\n").unwrap();

        let mut worker = test_worker(0, 59999);
        worker.meta = Some(meta);
        worker.graph = Some(graph);
        worker.walkers.push(RandomWalker::new(1));

        for _ in 0..100 {
            worker.advance_walkers().unwrap();
        }
        assert_eq!(worker.collected_edges.len(), 1);
        assert!(worker.collected_edges.contains(&Edge::new(1, 2)));
        // Dedup also bounds the flush queue: the edge is queued exactly once.
        assert_eq!(worker.unflushed_edges, vec![Edge::new(1, 2)]);
    }

    #[test]
    fn unreachable_peer_drops_the_walker() {
        // Port 9 is discard-protocol territory; nothing listens there.
        let meta = CombinedMetaData::new(vec![
            MetaData::new(0, 2, 1, 2, "127.0.0.1".to_owned(), 1),
            MetaData::new(1, 1, 3, 4, "127.0.0.1".to_owned(), 9),
        ]);
        let graph = DistributedGraph::from_shard_bytes(0, meta.clone(), b"2 3\n").unwrap();

        let mut worker = test_worker(0, 59999);
        worker.meta = Some(meta);
        worker.graph = Some(graph);
        worker.walkers.push(RandomWalker::new(2));

        worker.advance_walkers().unwrap();
        assert!(worker.walkers.is_empty());
    }

    #[test]
    fn worker_failed_during_setup_reports_configured_count() {
        let (master, master_inbox) = start_message_server("127.0.0.1").unwrap();
        let mut worker = test_worker(3, master.port);
        worker.handle_message(Message::RandomWalker { vertex: 7 }).unwrap();
        worker.handle_message(Message::WorkerFailed).unwrap();
        let received = master_inbox.recv_timeout(Duration::from_secs(5)).unwrap();
        // One configured walker plus one buffered arrival.
        assert_eq!(received, Message::RandomWalkerCount { worker_id: 3, count: 2 });
        assert_eq!(worker.phase(), WorkerPhase::SetupPending);
    }
}
