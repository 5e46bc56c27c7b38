//! The wire protocol spoken between the master and the workers. One message
//! per short-lived TCP connection, length-framed, bincode-encoded. Delivery
//! is at-most-once per call; reliability for bulk data is layered on top by
//! the file-transfer sub-protocol in [`transfer`].

use crate::error::SwError;
use crate::graph::meta::CombinedMetaData;
use crate::protocol::transfer::TransferTag;
use crate::{VertexLabel, WorkerId};

pub mod transfer;
pub mod transport;

/// Every message kind in the protocol. A closed union: adding a kind is a
/// compile-time-checked change, and every handler matches exhaustively.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Message {
    Alive { worker_id: WorkerId },
    Register { worker_id: WorkerId, host: String, port: u16 },
    MetaData(CombinedMetaData),
    RandomWalker { vertex: VertexLabel },
    FinishJob { worker_id: WorkerId },
    WorkerFailed,
    Continue,
    StartSendFile { worker_id: WorkerId, tag: TransferTag, total_chunks: u32 },
    FileChunk { worker_id: WorkerId, tag: TransferTag, index: u32, payload: Vec<u8> },
    EndSendFile { worker_id: WorkerId, tag: TransferTag },
    MissingChunk { worker_id: WorkerId, tag: TransferTag, indices: Vec<u32> },
    ReceivedFile { worker_id: WorkerId, tag: TransferTag },
    Progress { worker_id: WorkerId, collected_edges: u64 },
    RandomWalkerCount { worker_id: WorkerId, count: u32 },
}

/// Numeric status codes, used for logging and diagnostics. The values are
/// stable across builds; the codes themselves never travel on the wire
/// separately from the message body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum Status {
    Alive = 200,
    Register = 201,
    MetaData = 202,
    RandomWalker = 203,
    FinishJob = 204,
    WorkerFailed = 205,
    Continue = 206,
    StartSendFile = 207,
    FileChunk = 208,
    EndSendFile = 209,
    MissingChunk = 210,
    ReceivedFile = 211,
    Progress = 212,
    RandomWalkerCount = 213,
}

impl Message {
    pub fn status(&self) -> Status {
        match self {
            Message::Alive { .. } => Status::Alive,
            Message::Register { .. } => Status::Register,
            Message::MetaData(_) => Status::MetaData,
            Message::RandomWalker { .. } => Status::RandomWalker,
            Message::FinishJob { .. } => Status::FinishJob,
            Message::WorkerFailed => Status::WorkerFailed,
            Message::Continue => Status::Continue,
            Message::StartSendFile { .. } => Status::StartSendFile,
            Message::FileChunk { .. } => Status::FileChunk,
            Message::EndSendFile { .. } => Status::EndSendFile,
            Message::MissingChunk { .. } => Status::MissingChunk,
            Message::ReceivedFile { .. } => Status::ReceivedFile,
            Message::Progress { .. } => Status::Progress,
            Message::RandomWalkerCount { .. } => Status::RandomWalkerCount,
        }
    }
}

pub fn encode(message: &Message) -> Result<Vec<u8>, SwError> {
    bincode::serialize(message).map_err(|e| SwError::Encode(e.to_string()))
}

/// Decoding failures are protocol errors: the protocol is fixed at build
/// time, so a message that does not decode is fatal to the handling process,
/// never retried.
pub fn decode(bytes: &[u8]) -> Result<Message, SwError> {
    bincode::deserialize(bytes).map_err(|e| SwError::Decode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::{decode, encode, Message, Status};
    use crate::graph::meta::{CombinedMetaData, MetaData};
    use crate::protocol::transfer::TransferTag;

    fn sample_messages() -> Vec<Message> {
        vec![
            Message::Alive { worker_id: 3 },
            Message::Register { worker_id: 0, host: "localhost".to_owned(), port: 4000 },
            Message::MetaData(CombinedMetaData::new(vec![MetaData::new(
                0,
                5,
                1,
                9,
                "localhost".to_owned(),
                4000,
            )])),
            Message::RandomWalker { vertex: 17 },
            Message::FinishJob { worker_id: 2 },
            Message::WorkerFailed,
            Message::Continue,
            Message::StartSendFile { worker_id: 1, tag: TransferTag::Graph, total_chunks: 4 },
            Message::FileChunk {
                worker_id: 1,
                tag: TransferTag::Graph,
                index: 2,
                payload: vec![1, 2, 3],
            },
            Message::EndSendFile { worker_id: 1, tag: TransferTag::Graph },
            Message::MissingChunk { worker_id: 1, tag: TransferTag::Backup, indices: vec![0, 3] },
            Message::ReceivedFile { worker_id: 1, tag: TransferTag::Backup },
            Message::Progress { worker_id: 2, collected_edges: 1400 },
            Message::RandomWalkerCount { worker_id: 2, count: 7 },
        ]
    }

    #[test]
    fn round_trip_every_kind() {
        for message in sample_messages() {
            let bytes = encode(&message).unwrap();
            assert_eq!(decode(&bytes).unwrap(), message);
        }
    }

    #[test]
    fn garbage_is_a_protocol_error() {
        assert!(decode(&[0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0x00]).is_err());
        assert!(decode(&[]).is_err());
    }

    #[test]
    fn status_codes_are_stable() {
        let statuses: Vec<u16> = sample_messages().iter().map(|m| m.status() as u16).collect();
        assert_eq!(statuses, (200..=213).collect::<Vec<u16>>());
    }
}
