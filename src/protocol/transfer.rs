//! Reliable delivery of an arbitrarily large file over the message channel.
//! The sender splits content into fixed-size chunks and retains them until
//! the receiver confirms; the receiver stores chunks by index (idempotent
//! under re-delivery), detects gaps when the sender signals the end, and
//! requests exactly the missing indices for retransmission.

use crate::error::SwError;
use crate::protocol::Message;
use crate::WorkerId;
use hashbrown::HashMap;
use std::fmt;

/// Payload bytes per FILE_CHUNK message, kept well under the practical
/// message size ceiling of the channel.
pub const CHUNK_SIZE: usize = 8192;

/// Identifies which logical file a transfer carries. Each worker has at most
/// one in-flight transfer per tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransferTag {
    Graph,
    Backup,
}

impl fmt::Display for TransferTag {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            TransferTag::Graph => write!(f, "graph"),
            TransferTag::Backup => write!(f, "backup"),
        }
    }
}

/// Sender-side state of one transfer. Chunks are retained for retransmission
/// until the peer's RECEIVED_FILE releases the whole transfer.
#[derive(Debug, Clone)]
pub struct FileSender {
    worker_id: WorkerId,
    tag: TransferTag,
    chunks: Vec<Vec<u8>>,
}

impl FileSender {
    pub fn new(worker_id: WorkerId, tag: TransferTag, content: &[u8]) -> Self {
        let chunks = content.chunks(CHUNK_SIZE).map(<[u8]>::to_vec).collect();
        Self { worker_id, tag, chunks }
    }

    pub fn tag(&self) -> TransferTag {
        self.tag
    }

    pub fn total_chunks(&self) -> u32 {
        self.chunks.len() as u32
    }

    /// The full message sequence for an initial send: START, every chunk, END.
    pub fn all_messages(&self) -> Vec<Message> {
        let mut messages = Vec::with_capacity(self.chunks.len() + 2);
        messages.push(Message::StartSendFile {
            worker_id: self.worker_id,
            tag: self.tag,
            total_chunks: self.total_chunks(),
        });
        messages.extend((0..self.total_chunks()).map(|index| self.chunk_message(index)));
        messages.push(Message::EndSendFile { worker_id: self.worker_id, tag: self.tag });
        messages
    }

    /// The message sequence answering a MISSING_CHUNK request: only the named
    /// chunks, then END again so the receiver re-checks completeness.
    pub fn retransmit_messages(&self, indices: &[u32]) -> Vec<Message> {
        let mut messages: Vec<Message> = indices
            .iter()
            .filter(|&&index| (index as usize) < self.chunks.len())
            .map(|&index| self.chunk_message(index))
            .collect();
        messages.push(Message::EndSendFile { worker_id: self.worker_id, tag: self.tag });
        messages
    }

    fn chunk_message(&self, index: u32) -> Message {
        Message::FileChunk {
            worker_id: self.worker_id,
            tag: self.tag,
            index,
            payload: self.chunks[index as usize].clone(),
        }
    }
}

/// Receiver-side state of one transfer, created on START_SEND_FILE and kept
/// until the content has been reassembled.
#[derive(Debug)]
pub struct FileReceiver {
    tag: TransferTag,
    total_chunks: u32,
    chunks: HashMap<u32, Vec<u8>>,
    content: Option<Vec<u8>>,
}

impl FileReceiver {
    pub fn new(tag: TransferTag, total_chunks: u32) -> Self {
        Self { tag, total_chunks, chunks: HashMap::new(), content: None }
    }

    pub fn tag(&self) -> TransferTag {
        self.tag
    }

    /// Stores one chunk. Re-delivery overwrites with identical content, so
    /// duplicates are harmless.
    pub fn store_chunk(&mut self, index: u32, payload: Vec<u8>) -> Result<(), SwError> {
        if index >= self.total_chunks {
            return Err(SwError::Transfer(format!(
                "Chunk index {} out of range for {} transfer of {} chunks",
                index, self.tag, self.total_chunks
            )));
        }
        self.chunks.insert(index, payload);
        Ok(())
    }

    pub fn missing_chunks(&self) -> Vec<u32> {
        (0..self.total_chunks).filter(|index| !self.chunks.contains_key(index)).collect()
    }

    /// Called when END_SEND_FILE arrives: reassembles and returns the content
    /// if every chunk is present, or `None` when gaps remain and a
    /// MISSING_CHUNK round is needed. Idempotent once complete.
    pub fn finalize(&mut self) -> Option<&[u8]> {
        if self.content.is_none() {
            if !self.missing_chunks().is_empty() {
                return None;
            }
            let mut content = Vec::new();
            for index in 0..self.total_chunks {
                content.extend_from_slice(&self.chunks[&index]);
            }
            self.chunks.clear();
            self.content = Some(content);
        }
        self.content.as_deref()
    }

    pub fn is_complete(&self) -> bool {
        self.content.is_some()
    }

    pub fn content(&self) -> Option<&[u8]> {
        self.content.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::{FileReceiver, FileSender, TransferTag, CHUNK_SIZE};
    use crate::protocol::Message;

    fn content_of_size(size: usize) -> Vec<u8> {
        (0..size).map(|i| (i % 251) as u8).collect()
    }

    fn deliver(receiver: &mut FileReceiver, message: &Message) {
        if let Message::FileChunk { index, payload, .. } = message {
            receiver.store_chunk(*index, payload.clone()).unwrap();
        }
    }

    #[test]
    fn out_of_order_and_duplicate_delivery_reassembles() {
        let content = content_of_size(3 * CHUNK_SIZE + 17);
        let sender = FileSender::new(0, TransferTag::Graph, &content);
        assert_eq!(sender.total_chunks(), 4);

        let mut receiver = FileReceiver::new(TransferTag::Graph, sender.total_chunks());
        let messages = sender.all_messages();
        // Chunks arrive reversed, with one duplicated.
        for message in messages.iter().rev() {
            deliver(&mut receiver, message);
        }
        deliver(&mut receiver, &messages[1]);
        assert_eq!(receiver.finalize().unwrap(), content.as_slice());
        assert!(receiver.is_complete());
    }

    #[test]
    fn missing_chunk_detected_and_retransmitted() {
        let content = content_of_size(3 * CHUNK_SIZE);
        let sender = FileSender::new(2, TransferTag::Backup, &content);
        let mut receiver = FileReceiver::new(TransferTag::Backup, sender.total_chunks());

        // Deliver all but chunk 1, then END.
        for message in sender.all_messages() {
            if let Message::FileChunk { index, .. } = &message {
                if *index == 1 {
                    continue;
                }
            }
            deliver(&mut receiver, &message);
        }
        assert!(receiver.finalize().is_none());
        assert_eq!(receiver.missing_chunks(), vec![1]);

        for message in sender.retransmit_messages(&[1]) {
            deliver(&mut receiver, &message);
        }
        assert_eq!(receiver.finalize().unwrap(), content.as_slice());
    }

    #[test]
    fn empty_file_completes_with_zero_chunks() {
        let sender = FileSender::new(0, TransferTag::Backup, b"");
        assert_eq!(sender.total_chunks(), 0);
        let mut receiver = FileReceiver::new(TransferTag::Backup, 0);
        assert_eq!(receiver.finalize().unwrap(), b"");
    }

    #[test]
    fn chunk_index_out_of_range_is_an_error() {
        let mut receiver = FileReceiver::new(TransferTag::Graph, 2);
        assert!(receiver.store_chunk(2, vec![0]).is_err());
    }
}
