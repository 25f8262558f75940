//! Reads user commands from stdin and classifies them

use tokio::io::{self, Stdin};
use tokio_util::codec::{FramedRead, LinesCodec};
use tokio_stream::StreamExt; // provides combinator methods like next on top of FramedRead buf read and Stream trait
use tracing::{info, debug};

use crate::types::Request;

const LINES_MAX_LEN: usize = 256;
const QUIT: &str = "\\quit";

pub struct InputReader {
    fr: FramedRead<Stdin, LinesCodec>,
}

impl InputReader {
    pub fn new() -> Self {
        Self {
            fr: FramedRead::new(io::stdin(), LinesCodec::new_with_max_length(LINES_MAX_LEN)),
        }
    }

    // None once stdin is closed or unreadable
    pub async fn read(&mut self) -> Option<Request> {
        match self.fr.next().await {
            Some(Ok(line)) => Some(parse_input(&line)),
            Some(Err(e)) => {
                debug!("stdin read failed: {}", e);
                None
            },
            None => None,
        }
    }
}

impl Default for InputReader {
    fn default() -> Self {
        Self::new()
    }
}

pub fn parse_input(line: &str) -> Request {
    match line.trim_end() {
        QUIT => {
            info!("Session terminated by user...");
            Request::Quit
        },
        "" => Request::Noop,
        l => Request::Send(l.to_owned()),
    }
}
