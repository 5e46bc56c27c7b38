use crate::{VertexLabel, WorkerId};

#[derive(Debug)]
pub enum SwError {
    Generic(String),
    ReadFile(String, String),
    CreateFile(String, String),
    WriteFile(String, String),
    EdgeParse(String, String),
    Partition(String),
    Encode(String),
    Decode(String),
    Bind(String),
    Connect(String, u16, String),
    MasterUnreachable(WorkerId, String),
    VertexOwner(VertexLabel),
    Transfer(String),
    Setup(String),
}

impl std::fmt::Display for SwError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            SwError::Generic(msg) => write!(f, "[SwError] {}", msg)?,
            SwError::ReadFile(file_path, e) => {
                write!(f, "[IOError] Could not open file '{}' for reading: {}", file_path, e)?;
            }
            SwError::CreateFile(file_path, e) => {
                write!(f, "[IOError] Could not create file '{}' for writing: {}", file_path, e)?;
            }
            SwError::WriteFile(file_path, e) => {
                write!(f, "[IOError] Could not write to '{}': {}", file_path, e)?;
            }
            SwError::EdgeParse(line, file) => {
                write!(f, "[EdgeParseError] Could not parse '{}' as an edge in '{}'", line, file)?;
            }
            SwError::Partition(message) => write!(f, "[PartitionError] {}", message)?,
            SwError::Encode(e) => write!(f, "[ProtocolError] Could not encode message: {}", e)?,
            SwError::Decode(e) => write!(f, "[ProtocolError] Could not decode message: {}", e)?,
            SwError::Bind(e) => write!(f, "[NetworkError] Could not open listening socket: {}", e)?,
            SwError::Connect(host, port, e) => {
                write!(f, "[NetworkError] Could not send to {}:{}: {}", host, port, e)?;
            }
            SwError::MasterUnreachable(worker_id, e) => {
                write!(f, "[NetworkError] Worker {} gave up reaching the master: {}", worker_id, e)?;
            }
            SwError::VertexOwner(label) => {
                write!(f, "[MetaDataError] Vertex {} is outside all known worker ranges", label)?;
            }
            SwError::Transfer(message) => write!(f, "[TransferError] {}", message)?,
            SwError::Setup(message) => write!(f, "[SetupError] {}", message)?,
        }
        Ok(())
    }
}
