use std::path::{Path, PathBuf};

use bytes::Bytes;
use tokio::select;
use tokio::net::{tcp, TcpStream};
use tokio::sync::broadcast::{self, Sender as BSender, Receiver as BReceiver};
use tokio::sync::mpsc::{self, Sender, Receiver};

use tokio::io::{self, Error, ErrorKind};
use tokio_util::codec::{FramedRead, FramedWrite};
use tokio_stream::StreamExt; // provides combinator methods like next on top of FramedRead buf read and Stream trait
use futures::SinkExt; // provides combinator methods like send/send_all on top of FramedWrite buf write and Sink trait

use tracing::{info, debug, error, warn};

use musicroom_protocol::{ClientCodec, Frame};

use crate::input_reader::InputReader;
use crate::types::Request;

const SHUTDOWN: u8 = 1;
const BOUNDED_CHANNEL_SIZE: usize = 64;
const ERROR_PREFIX: &str = "error ";

pub struct Client {
    name: String,
    out_dir: PathBuf,
    shutdown_tx: BSender<u8>,
    shutdown_rx: BReceiver<u8>,
    fr: Option<FramedRead<tcp::OwnedReadHalf, ClientCodec>>,
    fw: Option<FramedWrite<tcp::OwnedWriteHalf, ClientCodec>>,
    local_tx: Option<Sender<String>>,
    local_rx: Option<Receiver<String>>,
}

impl Client {
    pub fn new(client: TcpStream, name: String, out_dir: PathBuf) -> Self {
        // split tcpstream so we can hand off to r & w tasks
        let (client_read, client_write) = client.into_split();

        let (shutdown_tx, shutdown_rx) = broadcast::channel(16);
        let (local_tx, local_rx) = mpsc::channel::<String>(BOUNDED_CHANNEL_SIZE);

        Client {
            name,
            out_dir,
            shutdown_tx,
            shutdown_rx,
            fr: Some(FramedRead::new(client_read, ClientCodec::new())),
            fw: Some(FramedWrite::new(client_write, ClientCodec::new())),
            local_tx: Some(local_tx),
            local_rx: Some(local_rx),
        }
    }

    pub async fn setup(address: &str, name: String, out_dir: PathBuf) -> io::Result<Client> {
        info!("Client starting, connecting to server {:?}", address);

        let client = TcpStream::connect(address).await
            .map_err(|e| { error!("Unable to connect to server"); e })?;

        Ok(Client::new(client, name, out_dir))
    }

    // Send the register command and wait for the server's verdict
    pub async fn register(&mut self, secret: Option<&str>) -> io::Result<()> {
        let (fr, fw) = match (self.fr.as_mut(), self.fw.as_mut()) {
            (Some(fr), Some(fw)) => (fr, fw),
            _ => return Err(Error::new(ErrorKind::NotConnected, "client already running")),
        };

        fw.send(register_line(&self.name, secret)).await?;

        match fr.next().await {
            Some(Ok(Frame::Line(line))) if line.starts_with(ERROR_PREFIX) => {
                Err(Error::new(ErrorKind::Other, line))
            },
            Some(Ok(Frame::Line(line))) => {
                println!(">>> {}", line);
                Ok(())
            },
            Some(Ok(frame)) => Err(Error::new(ErrorKind::InvalidData, format!("unexpected {:?}", frame))),
            Some(Err(e)) => Err(e),
            None => Err(Error::new(ErrorKind::UnexpectedEof, "server closed before registration")),
        }
    }

    pub async fn run(&mut self) -> io::Result<()> {
        self.spawn_cmd_line_read()?;
        self.spawn_read()?;
        self.spawn_write()?;

        // exit once any task signals shutdown
        let _ = self.shutdown_rx.recv().await;
        info!("received final shutdown");

        Ok(())
    }

    pub fn spawn_read(&mut self) -> io::Result<()> {
        let mut fr = self.fr.take().ok_or_else(|| taken("reader"))?;
        let shutdown_tx = self.shutdown_tx.clone();
        let out_dir = self.out_dir.clone();

        // Spawn client tcp read tokio task, to read back main server msgs
        tokio::spawn(async move {
            loop {
                match fr.next().await {
                    Some(Ok(Frame::Line(line))) => println!("> {}", line),
                    Some(Ok(Frame::Music { name, data })) => save_music(&out_dir, &name, data).await,
                    Some(Err(x)) => {
                        debug!("Client Connection closing error: {:?}", x);
                        break;
                    },
                    None => {
                        info!("Server Remote has closed");
                        break;
                    },
                }
            }

            let _ = shutdown_tx.send(SHUTDOWN);
        });

        Ok(())
    }

    pub fn spawn_write(&mut self) -> io::Result<()> {
        let mut local_rx = self.local_rx.take().ok_or_else(|| taken("writer queue"))?;
        let mut fw = self.fw.take().ok_or_else(|| taken("writer"))?;
        let shutdown_tx = self.shutdown_tx.clone();
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        // Spawn client tcp write tokio task, to send data to server
        tokio::spawn(async move {
            loop {
                select! {
                    // Read from channel, data received from command line
                    Some(line) = local_rx.recv() => {
                        if let Err(e) = fw.send(line).await {
                            error!("Unable to write to server: {}", e);
                            let _ = shutdown_tx.send(SHUTDOWN);
                            return;
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        debug!("tcp_write_handle received shutdown, returning!");
                        return; // exit task if shutdown received
                    }
                }
            }
        });

        Ok(())
    }

    pub fn spawn_cmd_line_read(&mut self) -> io::Result<()> {
        let local_tx = self.local_tx.take().ok_or_else(|| taken("input queue"))?;
        let shutdown_tx = self.shutdown_tx.clone();

        // Use a separate task to loop and grab data from command line
        tokio::spawn(async move {
            let mut input = InputReader::new();

            while let Some(req) = input.read().await {
                match req {
                    Request::Send(line) => {
                        if local_tx.send(line).await.is_err() {
                            break;
                        }
                    },
                    Request::Noop => continue,
                    Request::Quit => break,
                }
            }

            let _ = shutdown_tx.send(SHUTDOWN);
        });

        Ok(())
    }
}

fn taken(part: &str) -> Error {
    Error::new(ErrorKind::Other, format!("client {} already taken", part))
}

pub fn register_line(name: &str, secret: Option<&str>) -> String {
    match secret {
        Some(s) => format!("register {} {}", name, s),
        None => format!("register {}", name),
    }
}

// Only the final component of an announced name is used, anything
// else could escape the output directory
pub fn save_path(out_dir: &Path, name: &str) -> Option<PathBuf> {
    Path::new(name).file_name().map(|f| out_dir.join(f))
}

async fn save_music(out_dir: &Path, name: &str, data: Bytes) {
    let path = match save_path(out_dir, name) {
        Some(p) => p,
        None => {
            warn!("Ignoring music with unusable name {:?}", name);
            return;
        },
    };

    match tokio::fs::write(&path, &data).await {
        Ok(()) => println!(">>> Saved {} ({} bytes) to {}", name, data.len(), path.display()),
        Err(e) => error!("Unable to save {} to {}: {}", name, path.display(), e),
    }
}
