//! Message transport: one length-framed message per short-lived TCP
//! connection, and a listener thread that feeds decoded messages into a
//! crossbeam channel drained by the owning node's control loop.

use crate::error::SwError;
use crate::protocol::{decode, encode, Message};
use crate::WorkerId;
use crossbeam_channel::{unbounded, Receiver, Sender};
use log::{debug, error, warn};
use std::io::{ErrorKind, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::thread;
use std::time::Duration;

const FRAME_HEADER_BYTES: usize = 4;

/// Retry budget for persistent (non-reset) failures when messaging the
/// master; a worker cannot make progress without the master.
pub const MASTER_SEND_RETRY_BUDGET: usize = 1000;
const MASTER_SEND_RETRY_DELAY: Duration = Duration::from_millis(10);

pub fn send_message(host: &str, port: u16, message: &Message) -> Result<(), SwError> {
    let bytes = encode(message)?;
    send_frame(host, port, &bytes)
        .map_err(|e| SwError::Connect(host.to_owned(), port, e.to_string()))
}

/// Sends to the master with the worker failure policy: connection resets are
/// transient (the master's accept queue churns under load) and retried
/// without limit; any other failure consumes the bounded retry budget and
/// then brings the worker down.
pub fn send_to_master(
    worker_id: WorkerId,
    host: &str,
    port: u16,
    message: &Message,
) -> Result<(), SwError> {
    let bytes = encode(message)?;
    let mut attempts = 0;
    loop {
        match send_frame(host, port, &bytes) {
            Ok(()) => return Ok(()),
            Err(e) if e.kind() == ErrorKind::ConnectionReset => {
                debug!("Worker {}: connection reset by master, retrying", worker_id);
            }
            Err(e) => {
                attempts += 1;
                if attempts >= MASTER_SEND_RETRY_BUDGET {
                    return Err(SwError::MasterUnreachable(worker_id, e.to_string()));
                }
                warn!("Worker {}: send to master failed ({}), retrying", worker_id, e);
                thread::sleep(MASTER_SEND_RETRY_DELAY);
            }
        }
    }
}

fn send_frame(host: &str, port: u16, bytes: &[u8]) -> std::io::Result<()> {
    let mut stream = TcpStream::connect((host, port))?;
    let header = (bytes.len() as u32).to_be_bytes();
    stream.write_all(&header)?;
    stream.write_all(bytes)?;
    stream.flush()
}

fn read_frame(stream: &mut TcpStream) -> std::io::Result<Vec<u8>> {
    let mut header = [0_u8; FRAME_HEADER_BYTES];
    stream.read_exact(&mut header)?;
    let length = u32::from_be_bytes(header) as usize;
    let mut bytes = vec![0_u8; length];
    stream.read_exact(&mut bytes)?;
    Ok(bytes)
}

/// The advertised address of a running listener.
#[derive(Debug, Clone)]
pub struct MessageServer {
    pub host: String,
    pub port: u16,
}

/// Binds an ephemeral port on `bind_host` and spawns the accept loop. Every
/// decoded message lands in the returned channel; the channel is unbounded
/// because the control loop drains it between walker batches.
pub fn start_message_server(
    bind_host: &str,
) -> Result<(MessageServer, Receiver<Message>), SwError> {
    let listener =
        TcpListener::bind((bind_host, 0)).map_err(|e| SwError::Bind(e.to_string()))?;
    let port = listener.local_addr().map_err(|e| SwError::Bind(e.to_string()))?.port();
    let (sender, receiver) = unbounded();
    thread::Builder::new()
        .name("listener".to_owned())
        .spawn(move || accept_loop(&listener, &sender))
        .map_err(|e| SwError::Bind(e.to_string()))?;
    Ok((MessageServer { host: bind_host.to_owned(), port }, receiver))
}

#[allow(clippy::exit)]
fn accept_loop(listener: &TcpListener, inbox: &Sender<Message>) {
    for stream in listener.incoming() {
        let mut stream = match stream {
            Ok(stream) => stream,
            Err(e) => {
                warn!("Failed to accept connection: {}", e);
                continue;
            }
        };
        let bytes = match read_frame(&mut stream) {
            Ok(bytes) => bytes,
            Err(e) => {
                // The sender went away mid-frame; their reliability layer
                // will notice, nothing to do here.
                debug!("Dropping truncated frame: {}", e);
                continue;
            }
        };
        match decode(&bytes) {
            Ok(message) => {
                if inbox.send(message).is_err() {
                    // Control loop is gone; stop listening.
                    return;
                }
            }
            Err(e) => {
                // The protocol is fixed at build time; an undecodable frame
                // means mismatched builds, which no retry can fix.
                error!("{}", e);
                std::process::exit(1);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{send_message, start_message_server};
    use crate::protocol::Message;
    use std::time::Duration;

    #[test]
    fn message_delivered_through_server() {
        let (server, inbox) = start_message_server("127.0.0.1").unwrap();
        send_message(&server.host, server.port, &Message::Alive { worker_id: 5 }).unwrap();
        let received = inbox.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(received, Message::Alive { worker_id: 5 });
    }

    #[test]
    fn messages_arrive_in_send_order_from_one_sender() {
        let (server, inbox) = start_message_server("127.0.0.1").unwrap();
        for worker_id in 0..10 {
            send_message(&server.host, server.port, &Message::Alive { worker_id }).unwrap();
        }
        for worker_id in 0..10 {
            let received = inbox.recv_timeout(Duration::from_secs(5)).unwrap();
            assert_eq!(received, Message::Alive { worker_id });
        }
    }
}
