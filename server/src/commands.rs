//! Keyword to handler table.
//!
//! Loaded once at startup and shared read only by every session.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::error::{CommandError, SessionError};
use crate::handlers::{Broadcast, List, Player, Register};
use crate::server::ServerState;
use crate::server_types::Session;

#[async_trait]
pub trait Command: Send + Sync {
    fn keyword(&self) -> &'static str;

    /// Gate run before the handler, everyone is allowed unless overridden
    fn authorize(&self, _state: &ServerState, _session: &Session) -> Result<(), CommandError> {
        Ok(())
    }

    /// `tokens[0]` is the keyword itself
    async fn run(&self, state: &Arc<ServerState>, session: &mut Session, tokens: &[&str]) -> Result<(), SessionError>;
}

pub struct Commands {
    table: HashMap<&'static str, Box<dyn Command>>,
}

impl Commands {
    pub fn load(commands: Vec<Box<dyn Command>>) -> Self {
        let mut table = HashMap::with_capacity(commands.len());
        for c in commands {
            table.insert(c.keyword(), c);
        }
        Self { table }
    }

    pub fn standard() -> Self {
        Self::load(vec![
            Box::new(Register),
            Box::new(Broadcast),
            Box::new(List),
            Box::new(Player),
        ])
    }

    pub fn get(&self, keyword: &str) -> Option<&dyn Command> {
        self.table.get(keyword).map(|c| c.as_ref())
    }

    pub fn keywords(&self) -> Vec<&'static str> {
        let mut keywords: Vec<&'static str> = self.table.keys().copied().collect();
        keywords.sort_unstable();
        keywords
    }

    // tokenize one line and hand it to its handler
    pub async fn dispatch(&self, state: &Arc<ServerState>, session: &mut Session, line: &str) -> Result<(), SessionError> {
        if line.is_empty() {
            return Err(session.reject(CommandError::EmptyInput));
        }

        // single spaces only, runs of spaces give empty tokens
        let tokens: Vec<&str> = line.split(' ').collect();

        let command = match self.get(tokens[0]) {
            Some(c) => c,
            None => return Err(session.reject(CommandError::CommandNotFound)),
        };

        debug!("Dispatching {:?} for {:?}", tokens, session.conn().addr());

        if let Err(kind) = command.authorize(state, session) {
            return Err(session.reject(kind));
        }

        command.run(state, session, &tokens).await
    }
}
