use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::net::{lookup_host, TcpListener};
use tokio::sync::mpsc;

use tracing::{info, error};

use crate::client_handler::ClientHandler;
use crate::commands::Commands;
use crate::config::Config;
use crate::server::ServerState;
use crate::server_channel::{ErrorSupervisor, Failure};

const COUNTER_SEED: u64 = 1;
const BOUNDED_CHANNEL_SIZE: usize = 64;

pub struct ServerListener {
    listener: TcpListener,
}

impl ServerListener {
    // Resolve the configured address and bind the first candidate
    // matching the configured network kind
    pub async fn bind(config: &Config) -> io::Result<Self> {
        let address = config.bind_address();
        let candidates: Vec<SocketAddr> = lookup_host(address.as_str()).await?
            .filter(|a| config.network.accepts(a))
            .collect();

        let mut last_err = None;
        for addr in candidates {
            match TcpListener::bind(addr).await {
                Ok(listener) => {
                    info!("Server listening on {} {:?}", config.network, addr);
                    return Ok(Self { listener });
                },
                Err(e) => last_err = Some(e),
            }
        }

        Err(last_err.unwrap_or_else(|| io::Error::new(
            io::ErrorKind::AddrNotAvailable,
            format!("no {} address for {}", config.network, address),
        )))
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    // Accept loop, one session per connection. Only a failing accept
    // stops the server.
    pub async fn run(self, state: Arc<ServerState>, commands: Commands) -> io::Result<()> {
        let (errors_tx, errors_rx) = mpsc::channel::<Failure>(BOUNDED_CHANNEL_SIZE);
        ErrorSupervisor::spawn(errors_rx);

        let commands = Arc::new(commands);

        // Set up unique counter
        let counter = AtomicU64::new(COUNTER_SEED);

        loop {
            let (tcp_socket, addr) = match self.listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    error!("Server abnormally exiting .. {}", e);
                    return Err(e);
                },
            };

            let id = counter.fetch_add(1, Ordering::Relaxed);
            info!("Server received new client connection {:?}, id {}", &addr, id);

            ClientHandler::spawn(tcp_socket, addr, id, state.clone(), commands.clone(), errors_tx.clone());
        }
    }
}
