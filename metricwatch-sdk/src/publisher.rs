//! Publisher backends for emitting events.
//!
//! A running module asks its [`Publisher`] for one [`Client`] and pushes
//! every event through it. Events are written as newline-delimited JSON.

use std::io;
use std::path::PathBuf;

use async_trait::async_trait;
use metricwatch_types::Event;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncWriteExt, Stdout};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::debug;

use crate::error::Error;
use crate::wrapper::ModuleInfo;

/// Hands out publishing clients, one per running module.
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn connect(&self, module: &ModuleInfo) -> Result<Box<dyn Client>, Error>;
}

/// A connection events are published through.
#[async_trait]
pub trait Client: Send {
    async fn publish(&mut self, event: Event) -> io::Result<()>;

    async fn close(&mut self) -> io::Result<()>;
}

/// Built-in output destinations.
#[derive(Debug, Clone)]
pub enum Output {
    /// Write events to standard output.
    Stdout,

    /// Append events to a file, created if missing.
    File(PathBuf),

    /// Send events to a TCP server.
    ///
    /// Best effort: a failed write drops the connection and the next event
    /// reconnects.
    Tcp(String),

    /// Send events through a channel.
    ///
    /// Use `Output::channel()` to create this variant and get the receiver.
    Channel(mpsc::Sender<Event>),
}

impl Output {
    /// Create a file output.
    ///
    /// # Example
    ///
    /// ```rust
    /// use metricwatch_sdk::Output;
    ///
    /// let output = Output::file("events.ndjson");
    /// ```
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Output::File(path.into())
    }

    /// Create a TCP output.
    pub fn tcp(addr: impl Into<String>) -> Self {
        Output::Tcp(addr.into())
    }

    /// Create a channel output and return both the output and receiver.
    ///
    /// # Example
    ///
    /// ```rust
    /// use metricwatch_sdk::Output;
    ///
    /// let (output, mut rx) = Output::channel(16);
    ///
    /// // Later, receive events
    /// // while let Some(event) = rx.recv().await {
    /// //     println!("{}/{}", event.module, event.metricset);
    /// // }
    /// ```
    pub fn channel(buffer: usize) -> (Self, mpsc::Receiver<Event>) {
        let (tx, rx) = mpsc::channel(buffer);
        (Output::Channel(tx), rx)
    }
}

#[async_trait]
impl Publisher for Output {
    async fn connect(&self, module: &ModuleInfo) -> Result<Box<dyn Client>, Error> {
        debug!(module = %module.name, output = ?self, "connecting publisher client");
        let client: Box<dyn Client> = match self {
            Output::Stdout => Box::new(StdoutClient {
                out: tokio::io::stdout(),
            }),
            Output::File(path) => {
                let file = OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)
                    .await
                    .map_err(|e| Error::Publisher(format!("{}: {}", path.display(), e)))?;
                Box::new(FileClient { file })
            }
            Output::Tcp(addr) => Box::new(TcpClient {
                addr: addr.clone(),
                stream: None,
            }),
            Output::Channel(tx) => Box::new(ChannelClient { tx: tx.clone() }),
        };
        Ok(client)
    }
}

fn encode(event: &Event) -> io::Result<Vec<u8>> {
    let mut line = serde_json::to_vec(event)?;
    line.push(b'\n');
    Ok(line)
}

struct StdoutClient {
    out: Stdout,
}

#[async_trait]
impl Client for StdoutClient {
    async fn publish(&mut self, event: Event) -> io::Result<()> {
        let line = encode(&event)?;
        self.out.write_all(&line).await?;
        self.out.flush().await
    }

    async fn close(&mut self) -> io::Result<()> {
        self.out.flush().await
    }
}

struct FileClient {
    file: File,
}

#[async_trait]
impl Client for FileClient {
    async fn publish(&mut self, event: Event) -> io::Result<()> {
        let line = encode(&event)?;
        self.file.write_all(&line).await
    }

    async fn close(&mut self) -> io::Result<()> {
        self.file.flush().await?;
        self.file.sync_data().await
    }
}

struct TcpClient {
    addr: String,
    stream: Option<TcpStream>,
}

#[async_trait]
impl Client for TcpClient {
    async fn publish(&mut self, event: Event) -> io::Result<()> {
        let line = encode(&event)?;
        let mut stream = match self.stream.take() {
            Some(stream) => stream,
            None => TcpStream::connect(&self.addr).await?,
        };
        // A failed write drops the stream so the next publish reconnects.
        stream.write_all(&line).await?;
        self.stream = Some(stream);
        Ok(())
    }

    async fn close(&mut self) -> io::Result<()> {
        match self.stream.take() {
            Some(mut stream) => stream.shutdown().await,
            None => Ok(()),
        }
    }
}

struct ChannelClient {
    tx: mpsc::Sender<Event>,
}

#[async_trait]
impl Client for ChannelClient {
    async fn publish(&mut self, event: Event) -> io::Result<()> {
        self.tx
            .send(event)
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "event receiver dropped"))
    }

    async fn close(&mut self) -> io::Result<()> {
        Ok(())
    }
}
