//! IPC client implementation

use std::path::Path;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use underlamp_api::{Command, Event, Request, Response, ResponsePayload, ResponseResult};

use crate::{IpcError, IpcResult};

/// Client for the underlampd socket
pub struct IpcClient {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    next_request_id: u64,
}

impl IpcClient {
    pub async fn connect(socket_path: impl AsRef<Path>) -> IpcResult<Self> {
        let stream = UnixStream::connect(socket_path).await?;
        let (read_half, write_half) = stream.into_split();

        Ok(Self {
            reader: BufReader::new(read_half),
            writer: write_half,
            next_request_id: 1,
        })
    }

    /// Send a command and wait for its response
    pub async fn send(&mut self, command: Command) -> IpcResult<Response> {
        let request_id = self.next_request_id;
        self.next_request_id += 1;

        let request = Request::new(request_id, command);
        let mut json = serde_json::to_string(&request)?;
        json.push('\n');
        self.writer.write_all(json.as_bytes()).await?;

        loop {
            let line = read_line(&mut self.reader).await?;
            // Events may already be flowing while a subscribe is answered
            if serde_json::from_str::<Event>(&line).is_ok() {
                continue;
            }
            let response: Response = serde_json::from_str(&line)?;
            if response.request_id != request_id {
                return Err(IpcError::InvalidMessage(format!(
                    "expected response to request {}, got {}",
                    request_id, response.request_id
                )));
            }
            return Ok(response);
        }
    }

    /// Send a command, turning an error response into [`IpcError::Rejected`]
    pub async fn request(&mut self, command: Command) -> IpcResult<ResponsePayload> {
        match self.send(command).await?.result {
            ResponseResult::Ok(payload) => Ok(payload),
            ResponseResult::Err(info) => Err(IpcError::Rejected(info)),
        }
    }

    /// Subscribe to events, consuming this client
    pub async fn subscribe(mut self) -> IpcResult<EventStream> {
        self.request(Command::SubscribeEvents).await?;
        Ok(EventStream {
            reader: self.reader,
            _writer: self.writer,
        })
    }
}

/// Events pushed by the service after subscribing
pub struct EventStream {
    reader: BufReader<OwnedReadHalf>,
    // Dropping the write half would look like a disconnect to the server
    _writer: OwnedWriteHalf,
}

impl EventStream {
    /// Wait for the next event
    pub async fn next(&mut self) -> IpcResult<Event> {
        let line = read_line(&mut self.reader).await?;
        Ok(serde_json::from_str(&line)?)
    }
}

async fn read_line(reader: &mut BufReader<OwnedReadHalf>) -> IpcResult<String> {
    let mut line = String::new();
    let n = reader.read_line(&mut line).await?;
    if n == 0 {
        return Err(IpcError::ConnectionClosed);
    }
    Ok(line.trim().to_string())
}
