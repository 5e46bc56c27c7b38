//! The master node: partitions the source graph, boots and addresses the
//! worker fleet, distributes shards and metadata, gates the run behind
//! CONTINUE, watches heartbeats, persists worker backups, drives crash
//! recovery, and finally merges the sampled edges into the output file.

use crate::error::SwError;
use crate::graph::meta::CombinedMetaData;
use crate::graph::Edge;
use crate::partition::{partition, ShardInfo};
use crate::protocol::transfer::{FileReceiver, FileSender, TransferTag};
use crate::protocol::transport::{send_message, start_message_server, MessageServer};
use crate::protocol::Message;
use crate::stats;
use crate::util::io::{get_file_lines, read_file_to_bytes, SwWriter};
use crate::util::timer::SwTimer;
use crate::WorkerId;
use crossbeam_channel::{Receiver, RecvTimeoutError};
use crossbeam_utils::thread as crossbeam_thread;
use hashbrown::HashSet;
use itertools::Itertools;
use log::{debug, info, warn};
use std::path::Path;
use std::process::{Child, Command};
use std::time::Duration;

const EVENT_POLL_INTERVAL: Duration = Duration::from_millis(200);

#[derive(Debug, Clone)]
pub struct MasterConfig {
    pub n_workers: usize,
    pub graph_path: String,
    pub output_path: String,
    /// Directory for shard files and per-worker backup ledgers.
    pub work_dir: String,
    /// Fraction of the source edges to sample before finishing the job.
    pub scale: f64,
    pub bind_host: String,
    pub number_of_random_walkers: usize,
    pub backup_threshold: usize,
    pub walking_iterations: usize,
    pub heartbeat_timeout: Duration,
    /// When false, workers are started externally and only registration is
    /// awaited; crash recovery then waits for a manual restart too.
    pub spawn_workers: bool,
}

struct WorkerRecord {
    shard: ShardInfo,
    address: Option<(String, u16)>,
    last_alive: SwTimer,
    progress: u64,
    walker_count: Option<u32>,
    finished: bool,
    graph_acked: bool,
    backup_replay_acked: bool,
    shard_sender: Option<FileSender>,
    backup_sender: Option<FileSender>,
    backup_receiver: Option<FileReceiver>,
    process: Option<Child>,
}

impl WorkerRecord {
    fn new(shard: ShardInfo) -> Self {
        Self {
            shard,
            address: None,
            last_alive: SwTimer::now(),
            progress: 0,
            walker_count: None,
            finished: false,
            graph_acked: false,
            backup_replay_acked: false,
            shard_sender: None,
            backup_sender: None,
            backup_receiver: None,
            process: None,
        }
    }

    fn is_alive(&self) -> bool {
        self.address.is_some()
    }
}

pub struct Master {
    config: MasterConfig,
    server: MessageServer,
    inbox: Receiver<Message>,
    workers: Vec<WorkerRecord>,
    goal_edges: u64,
    finish_requested: bool,
    recovering: Option<WorkerId>,
}

pub fn run(config: MasterConfig) -> Result<(), SwError> {
    let timer = SwTimer::now();

    std::fs::create_dir_all(&config.work_dir)
        .map_err(|e| SwError::CreateFile(config.work_dir.clone(), e.to_string()))?;
    let shards = partition(&config.graph_path, config.n_workers, &config.work_dir)?;
    let total_edges: u64 = shards.iter().map(|shard| shard.number_of_edges).sum();
    let goal_edges = sampling_goal(config.scale, total_edges);
    info!("Sampling goal: {} of {} edges", goal_edges, total_edges);

    // Fresh backup ledgers; stale ones would leak edges from a previous run.
    for shard in &shards {
        SwWriter::new(backup_file_path(&config.work_dir, shard.worker_id))?;
    }

    let (server, inbox) = start_message_server(&config.bind_host)?;
    info!("Master listening on {}:{}", server.host, server.port);

    let mut master = Master {
        config,
        server,
        inbox,
        workers: shards.into_iter().map(WorkerRecord::new).collect(),
        goal_edges,
        finish_requested: false,
        recovering: None,
    };

    if master.config.spawn_workers {
        for worker_id in 0..master.config.n_workers as WorkerId {
            let walkers = master.config.number_of_random_walkers;
            let child = master.spawn_worker(worker_id, walkers, false)?;
            master.workers[worker_id as usize].process = Some(child);
        }
    }

    master.await_registrations()?;
    master.broadcast_meta_data()?;
    master.distribute_shards()?;
    master.await_graph_acks()?;
    master.broadcast_continue()?;
    master.event_loop()?;
    master.aggregate()?;
    info!("Job done in {}", timer.elapsed().to_seconds_string());
    Ok(())
}

pub fn sampling_goal(scale: f64, total_edges: u64) -> u64 {
    (scale * total_edges as f64).ceil() as u64
}

pub fn backup_file_path(work_dir: &str, worker_id: WorkerId) -> String {
    format!("{}/backup_{}.txt", work_dir, worker_id)
}

/// Merges every worker's backup ledger into `output_path`, deduplicating by
/// canonical edge key, in sorted order so reruns produce identical files.
/// Returns the number of distinct sampled edges.
pub fn merge_backups(
    work_dir: &str,
    n_workers: usize,
    output_path: &str,
) -> Result<u64, SwError> {
    let mut edges: HashSet<Edge> = HashSet::new();
    for worker_id in 0..n_workers as WorkerId {
        let path = backup_file_path(work_dir, worker_id);
        if !Path::new(&path).is_file() {
            continue;
        }
        for line in get_file_lines(&path)? {
            if line.trim().is_empty() {
                continue;
            }
            edges.insert(Edge::from_line(&line, &path)?);
        }
    }
    let mut sorted: Vec<Edge> = edges.into_iter().collect();
    sorted.sort_by_key(Edge::endpoints);
    let count = sorted.len() as u64;
    let mut writer = SwWriter::new(output_path.to_owned())?;
    writer.write_file_lines(sorted.iter().map(Edge::to_line))?;
    writer.flush()?;
    Ok(count)
}

impl Master {
    /// Registration arrives in no particular order, interleaved with early
    /// heartbeats.
    fn await_registrations(&mut self) -> Result<(), SwError> {
        info!("Waiting for {} workers to register", self.config.n_workers);
        while self.workers.iter().any(|record| record.address.is_none()) {
            match self.inbox.recv_timeout(EVENT_POLL_INTERVAL) {
                Ok(Message::Register { worker_id, host, port }) => {
                    self.register_worker(worker_id, host, port)?;
                }
                Ok(Message::Alive { worker_id }) => self.touch(worker_id),
                Ok(message) => {
                    debug!("Ignoring {:?} during registration", message.status());
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(SwError::Generic("Listener thread is gone".to_owned()));
                }
            }
        }
        info!("All {} workers registered", self.config.n_workers);
        Ok(())
    }

    fn register_worker(
        &mut self,
        worker_id: WorkerId,
        host: String,
        port: u16,
    ) -> Result<(), SwError> {
        let n_workers = self.workers.len();
        let record = self.workers.get_mut(worker_id as usize).ok_or_else(|| {
            SwError::Generic(format!(
                "Worker id {} registered but the fleet has only {} shards",
                worker_id, n_workers
            ))
        })?;
        info!("Worker {} registered at {}:{}", worker_id, host, port);
        record.address = Some((host, port));
        record.last_alive = SwTimer::now();
        if self.recovering == Some(worker_id) {
            self.resume_recovered_worker(worker_id)?;
        }
        Ok(())
    }

    fn touch(&mut self, worker_id: WorkerId) {
        if let Some(record) = self.workers.get_mut(worker_id as usize) {
            record.last_alive = SwTimer::now();
        }
    }

    fn combined_meta(&self) -> Result<CombinedMetaData, SwError> {
        let metas = self
            .workers
            .iter()
            .map(|record| {
                let (host, port) = record.address.clone().ok_or_else(|| {
                    SwError::Setup(format!(
                        "Worker {} has no registered address",
                        record.shard.worker_id
                    ))
                })?;
                Ok(record.shard.to_meta_data(host, port))
            })
            .collect::<Result<Vec<_>, SwError>>()?;
        let meta = CombinedMetaData::new(metas);
        meta.ensure_disjoint_ranges()?;
        Ok(meta)
    }

    fn broadcast_meta_data(&self) -> Result<(), SwError> {
        let meta = self.combined_meta()?;
        let message = Message::MetaData(meta);
        for record in self.workers.iter().filter(|record| record.is_alive()) {
            let (host, port) = record.address.as_ref().expect("alive worker has an address");
            send_message(host, *port, &message)?;
        }
        Ok(())
    }

    /// Ships every shard to its worker, one scoped thread per transfer so a
    /// slow link does not serialize the whole fleet's setup.
    fn distribute_shards(&mut self) -> Result<(), SwError> {
        let timer = SwTimer::now();
        let mut senders = Vec::with_capacity(self.workers.len());
        for record in &self.workers {
            let content = read_file_to_bytes(&record.shard.path)?;
            senders.push(FileSender::new(record.shard.worker_id, TransferTag::Graph, &content));
        }

        let results = crossbeam_thread::scope(|s| {
            let mut handles = Vec::new();
            for (record, sender) in self.workers.iter().zip(senders.iter()) {
                let (host, port) =
                    record.address.clone().expect("registered worker has an address");
                handles.push(s.spawn(move |_| -> Result<(), SwError> {
                    for message in sender.all_messages() {
                        send_message(&host, port, &message)?;
                    }
                    Ok(())
                }));
            }
            handles
                .into_iter()
                .map(|handle| handle.join().expect("Error joining shard sender thread"))
                .collect::<Vec<_>>()
        })
        .expect("Error ending shard distribution scope");
        for result in results {
            result?;
        }

        for (record, sender) in self.workers.iter_mut().zip(senders.into_iter()) {
            record.shard_sender = Some(sender);
        }
        info!("Distributed all shards in {}", timer.elapsed().to_seconds_string());
        Ok(())
    }

    /// Holds the fleet until every worker confirmed its shard, answering
    /// retransmission requests along the way.
    fn await_graph_acks(&mut self) -> Result<(), SwError> {
        while self.workers.iter().any(|record| !record.graph_acked) {
            match self.inbox.recv_timeout(EVENT_POLL_INTERVAL) {
                Ok(Message::ReceivedFile { worker_id, tag: TransferTag::Graph }) => {
                    if let Some(record) = self.workers.get_mut(worker_id as usize) {
                        record.graph_acked = true;
                        record.shard_sender = None;
                        record.last_alive = SwTimer::now();
                    }
                }
                Ok(Message::MissingChunk { worker_id, tag: TransferTag::Graph, indices }) => {
                    self.retransmit(worker_id, TransferTag::Graph, &indices)?;
                }
                Ok(Message::Alive { worker_id }) => self.touch(worker_id),
                Ok(message) => debug!("Ignoring {:?} while distributing", message.status()),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(SwError::Generic("Listener thread is gone".to_owned()));
                }
            }
        }
        Ok(())
    }

    fn broadcast_continue(&mut self) -> Result<(), SwError> {
        for record in self.workers.iter().filter(|record| record.is_alive()) {
            let (host, port) = record.address.as_ref().expect("alive worker has an address");
            send_message(host, *port, &Message::Continue)?;
        }
        for record in &mut self.workers {
            record.last_alive = SwTimer::now();
        }
        info!("Broadcast CONTINUE to the fleet");
        Ok(())
    }

    fn event_loop(&mut self) -> Result<(), SwError> {
        loop {
            match self.inbox.recv_timeout(EVENT_POLL_INTERVAL) {
                Ok(message) => self.handle_message(message)?,
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(SwError::Generic("Listener thread is gone".to_owned()));
                }
            }
            self.check_heartbeats()?;
            if self.workers.iter().all(|record| record.finished) {
                return Ok(());
            }
        }
    }

    /// Exhaustive dispatch over every message kind the protocol defines.
    fn handle_message(&mut self, message: Message) -> Result<(), SwError> {
        match message {
            Message::Alive { worker_id } => self.touch(worker_id),
            Message::Register { worker_id, host, port } => {
                self.register_worker(worker_id, host, port)?;
            }
            Message::Progress { worker_id, collected_edges } => {
                if let Some(record) = self.workers.get_mut(worker_id as usize) {
                    record.progress = collected_edges;
                    record.last_alive = SwTimer::now();
                }
                self.check_goal()?;
            }
            Message::StartSendFile { worker_id, tag: TransferTag::Backup, total_chunks } => {
                if let Some(record) = self.workers.get_mut(worker_id as usize) {
                    record.backup_receiver =
                        Some(FileReceiver::new(TransferTag::Backup, total_chunks));
                }
            }
            Message::FileChunk { worker_id, tag: TransferTag::Backup, index, payload } => {
                match self
                    .workers
                    .get_mut(worker_id as usize)
                    .and_then(|record| record.backup_receiver.as_mut())
                {
                    Some(receiver) => receiver.store_chunk(index, payload)?,
                    None => warn!("Backup chunk from worker {} without a transfer", worker_id),
                }
            }
            Message::EndSendFile { worker_id, tag: TransferTag::Backup } => {
                self.finish_backup_transfer(worker_id)?;
            }
            Message::MissingChunk { worker_id, tag, indices } => {
                self.retransmit(worker_id, tag, &indices)?;
            }
            Message::ReceivedFile { worker_id, tag } => {
                if let Some(record) = self.workers.get_mut(worker_id as usize) {
                    match tag {
                        TransferTag::Graph => {
                            record.graph_acked = true;
                            record.shard_sender = None;
                        }
                        TransferTag::Backup => {
                            record.backup_replay_acked = true;
                            record.backup_sender = None;
                        }
                    }
                }
                self.maybe_finish_recovery()?;
            }
            Message::FinishJob { worker_id } => {
                info!("Worker {} finished", worker_id);
                if let Some(record) = self.workers.get_mut(worker_id as usize) {
                    record.finished = true;
                }
            }
            Message::RandomWalkerCount { worker_id, count } => {
                info!("Worker {} reported {} walkers", worker_id, count);
                if let Some(record) = self.workers.get_mut(worker_id as usize) {
                    record.walker_count = Some(count);
                }
                self.maybe_spawn_replacement()?;
            }
            // Transfers the master never receives under these tags, plus
            // worker-bound kinds echoed back by a confused peer.
            Message::StartSendFile { worker_id, .. } | Message::FileChunk { worker_id, .. } => {
                warn!("Unexpected graph transfer from worker {}", worker_id);
            }
            Message::EndSendFile { worker_id, .. } => {
                warn!("Unexpected graph transfer end from worker {}", worker_id);
            }
            Message::MetaData(_)
            | Message::RandomWalker { .. }
            | Message::WorkerFailed
            | Message::Continue => {
                debug!("Ignoring worker-bound message at the master");
            }
        }
        Ok(())
    }

    fn check_goal(&mut self) -> Result<(), SwError> {
        let total: u64 = self.workers.iter().map(|record| record.progress).sum();
        if !self.finish_requested && total >= self.goal_edges {
            info!("Goal reached ({} edges reported), finishing the job", total);
            self.finish_requested = true;
            for record in self.workers.iter().filter(|record| record.is_alive()) {
                let (host, port) =
                    record.address.as_ref().expect("alive worker has an address");
                send_message(
                    host,
                    *port,
                    &Message::FinishJob { worker_id: record.shard.worker_id },
                )?;
            }
        }
        Ok(())
    }

    /// Completes (or requests repair of) a worker's backup transfer, then
    /// appends the received edges to that worker's ledger on disk.
    fn finish_backup_transfer(&mut self, worker_id: WorkerId) -> Result<(), SwError> {
        let work_dir = self.config.work_dir.clone();
        let record = match self.workers.get_mut(worker_id as usize) {
            Some(record) => record,
            None => return Ok(()),
        };
        let receiver = match record.backup_receiver.as_mut() {
            Some(receiver) => receiver,
            None => {
                warn!("Backup end from worker {} without a transfer", worker_id);
                return Ok(());
            }
        };
        let reply = match receiver.finalize() {
            Some(content) => {
                let text = String::from_utf8_lossy(content).into_owned();
                let path = backup_file_path(&work_dir, worker_id);
                let mut writer = SwWriter::append(path)?;
                writer
                    .write_file_lines(text.lines().filter(|l| !l.trim().is_empty()).map(str::to_owned))?;
                writer.flush()?;
                record.backup_receiver = None;
                record.last_alive = SwTimer::now();
                Message::ReceivedFile { worker_id, tag: TransferTag::Backup }
            }
            None => Message::MissingChunk {
                worker_id,
                tag: TransferTag::Backup,
                indices: receiver.missing_chunks(),
            },
        };
        if let Some((host, port)) = self.workers[worker_id as usize].address.clone() {
            send_message(&host, port, &reply)?;
        }
        Ok(())
    }

    fn retransmit(
        &mut self,
        worker_id: WorkerId,
        tag: TransferTag,
        indices: &[u32],
    ) -> Result<(), SwError> {
        let record = match self.workers.get(worker_id as usize) {
            Some(record) => record,
            None => return Ok(()),
        };
        let sender = match tag {
            TransferTag::Graph => record.shard_sender.as_ref(),
            TransferTag::Backup => record.backup_sender.as_ref(),
        };
        match (sender, record.address.clone()) {
            (Some(sender), Some((host, port))) => {
                info!(
                    "Retransmitting {} {} chunks to worker {}",
                    indices.len(),
                    tag,
                    worker_id
                );
                for message in sender.retransmit_messages(indices) {
                    send_message(&host, port, &message)?;
                }
            }
            _ => warn!("No retained {} transfer for worker {}", tag, worker_id),
        }
        Ok(())
    }

    fn check_heartbeats(&mut self) -> Result<(), SwError> {
        let timeout = self.config.heartbeat_timeout;
        let dead: Vec<WorkerId> = self
            .workers
            .iter()
            .filter(|record| {
                record.is_alive()
                    && !record.finished
                    && self.recovering != Some(record.shard.worker_id)
                    && *record.last_alive.elapsed() > timeout
            })
            .map(|record| record.shard.worker_id)
            .collect();
        for worker_id in dead {
            self.declare_failure(worker_id)?;
        }
        Ok(())
    }

    /// Heartbeat timeout: pause the fleet, collect walker counts, and restart
    /// the dead worker from its backup ledger.
    fn declare_failure(&mut self, dead_id: WorkerId) -> Result<(), SwError> {
        warn!("Worker {} missed its heartbeat deadline, starting recovery", dead_id);
        self.recovering = Some(dead_id);

        let record = &mut self.workers[dead_id as usize];
        if let Some(mut child) = record.process.take() {
            child.kill().ok();
        }
        record.address = None;
        record.graph_acked = false;
        record.backup_replay_acked = false;
        record.shard_sender = None;
        record.backup_sender = None;
        record.backup_receiver = None;
        record.walker_count = None;

        for record in &mut self.workers {
            if record.shard.worker_id != dead_id {
                record.walker_count = None;
            }
        }

        let survivors: Vec<&WorkerRecord> =
            self.workers.iter().filter(|record| record.is_alive()).collect();
        info!(
            "Pausing workers [{}] for recovery",
            survivors.iter().map(|record| record.shard.worker_id.to_string()).join(", ")
        );
        for record in &survivors {
            let (host, port) = record.address.as_ref().expect("alive worker has an address");
            send_message(host, *port, &Message::WorkerFailed)?;
        }

        if survivors.is_empty() {
            // Nobody left to report walker counts; restart with the
            // configured pool size.
            let walkers = self.config.number_of_random_walkers;
            self.respawn(dead_id, walkers)?;
        }
        Ok(())
    }

    /// Once every surviving worker reported its walker count, the restarted
    /// worker's pool is sized to make the fleet total whole again.
    fn maybe_spawn_replacement(&mut self) -> Result<(), SwError> {
        let dead_id = match self.recovering {
            Some(dead_id) => dead_id,
            None => return Ok(()),
        };
        if self.workers[dead_id as usize].address.is_some() {
            return Ok(()); // Already restarted; waiting on transfers.
        }
        let all_reported = self
            .workers
            .iter()
            .filter(|record| record.is_alive())
            .all(|record| record.walker_count.is_some());
        if !all_reported {
            return Ok(());
        }
        let reported: u32 = self
            .workers
            .iter()
            .filter_map(|record| record.walker_count)
            .sum();
        let target = (self.config.n_workers * self.config.number_of_random_walkers) as u32;
        let walkers = target.saturating_sub(reported).max(1) as usize;
        self.respawn(dead_id, walkers)
    }

    fn respawn(&mut self, dead_id: WorkerId, walkers: usize) -> Result<(), SwError> {
        if self.config.spawn_workers {
            info!("Restarting worker {} with {} walkers", dead_id, walkers);
            let child = self.spawn_worker(dead_id, walkers, true)?;
            self.workers[dead_id as usize].process = Some(child);
        } else {
            info!(
                "Waiting for an external restart of worker {} ({} walkers suggested)",
                dead_id, walkers
            );
        }
        Ok(())
    }

    /// The restarted worker re-registered: refresh everyone's metadata (its
    /// port changed) and replay its shard and backup through the transfer
    /// protocol. CONTINUE follows once both transfers are confirmed.
    fn resume_recovered_worker(&mut self, worker_id: WorkerId) -> Result<(), SwError> {
        self.broadcast_meta_data()?;

        let shard_path = self.workers[worker_id as usize].shard.path.clone();
        let shard_sender =
            FileSender::new(worker_id, TransferTag::Graph, &read_file_to_bytes(&shard_path)?);
        let backup_path = backup_file_path(&self.config.work_dir, worker_id);
        let backup_content = if Path::new(&backup_path).is_file() {
            read_file_to_bytes(&backup_path)?
        } else {
            Vec::new()
        };
        let backup_sender = FileSender::new(worker_id, TransferTag::Backup, &backup_content);

        let (host, port) = self.workers[worker_id as usize]
            .address
            .clone()
            .expect("recovered worker just registered");
        for message in shard_sender.all_messages() {
            send_message(&host, port, &message)?;
        }
        for message in backup_sender.all_messages() {
            send_message(&host, port, &message)?;
        }

        let record = &mut self.workers[worker_id as usize];
        record.shard_sender = Some(shard_sender);
        record.backup_sender = Some(backup_sender);
        record.finished = false;
        record.last_alive = SwTimer::now();
        Ok(())
    }

    fn maybe_finish_recovery(&mut self) -> Result<(), SwError> {
        let dead_id = match self.recovering {
            Some(dead_id) => dead_id,
            None => return Ok(()),
        };
        let record = &self.workers[dead_id as usize];
        if record.graph_acked && record.backup_replay_acked {
            info!("Worker {} recovered, resuming the fleet", dead_id);
            self.recovering = None;
            self.broadcast_continue()?;
        }
        Ok(())
    }

    fn aggregate(&self) -> Result<(), SwError> {
        let timer = SwTimer::now();
        let count =
            merge_backups(&self.config.work_dir, self.config.n_workers, &self.config.output_path)?;
        info!(
            "Wrote {} sampled edges to '{}' in {}",
            count,
            self.config.output_path,
            timer.elapsed().to_seconds_string()
        );
        match stats::summarize(&self.config.output_path) {
            Ok(summary) => info!("Sample summary: {}", summary),
            Err(e) => warn!("Could not summarize the sample: {}", e),
        }
        Ok(())
    }

    fn spawn_worker(
        &self,
        worker_id: WorkerId,
        walkers: usize,
        load_backup: bool,
    ) -> Result<Child, SwError> {
        let exe = std::env::current_exe()
            .map_err(|e| SwError::Generic(format!("Could not locate own binary: {}", e)))?;
        let mut command = Command::new(exe);
        command
            .arg("worker")
            .arg("--worker-id")
            .arg(worker_id.to_string())
            .arg("--master-host")
            .arg(&self.server.host)
            .arg("--master-port")
            .arg(self.server.port.to_string())
            .arg("--walkers")
            .arg(walkers.to_string())
            .arg("--backup-threshold")
            .arg(self.config.backup_threshold.to_string())
            .arg("--iterations")
            .arg(self.config.walking_iterations.to_string());
        if load_backup {
            command.arg("--load-backup");
        }
        command
            .spawn()
            .map_err(|e| SwError::Generic(format!("Could not spawn worker {}: {}", worker_id, e)))
    }
}

impl Drop for Master {
    fn drop(&mut self) {
        for record in &mut self.workers {
            if let Some(mut child) = record.process.take() {
                child.kill().ok();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{backup_file_path, merge_backups, sampling_goal};
    use crate::util::io::get_file_lines;
    use std::io::Write;

    #[test]
    fn goal_rounds_up() {
        assert_eq!(sampling_goal(0.5, 9), 5);
        assert_eq!(sampling_goal(1.0, 9), 9);
        assert_eq!(sampling_goal(0.1, 9), 1);
    }

    #[test]
    fn merge_deduplicates_across_workers() {
        let dir = tempfile::tempdir().unwrap();
        let work_dir = dir.path().to_str().unwrap();

        // Worker 0 and worker 1 both sampled the 1-2 edge, once per
        // orientation; the merged sample must carry it exactly once.
        let mut backup0 =
            std::fs::File::create(backup_file_path(work_dir, 0)).unwrap();
        backup0.write_all(b"1 2\n3 4\n").unwrap();
        let mut backup1 =
            std::fs::File::create(backup_file_path(work_dir, 1)).unwrap();
        backup1.write_all(b"2 1\n4 5\n").unwrap();

        let output = dir.path().join("sample.txt");
        let output_path = output.to_str().unwrap();
        let count = merge_backups(work_dir, 2, output_path).unwrap();
        assert_eq!(count, 3);

        let lines: Vec<String> = get_file_lines(output_path).unwrap().collect();
        assert_eq!(lines, vec!["1 2".to_owned(), "3 4".to_owned(), "4 5".to_owned()]);
    }

    #[test]
    fn merge_tolerates_missing_ledgers() {
        let dir = tempfile::tempdir().unwrap();
        let work_dir = dir.path().to_str().unwrap();
        let output = dir.path().join("sample.txt");
        let count = merge_backups(work_dir, 3, output.to_str().unwrap()).unwrap();
        assert_eq!(count, 0);
    }
}
