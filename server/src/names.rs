use std::collections::{BTreeSet, HashMap};

use crate::server_types::{Connection, ConnectionId};

const CLIENTS_MSG: &str = "clients";
const ADMINS_MSG: &str = "admins";

/// Registered client names and the admin subset.
/// Every admin is also a registered client.
#[derive(Debug, Default)]
pub struct Names {
    clients: HashMap<String, Connection>,
    admins: BTreeSet<String>,
}

impl Names {
    pub fn new() -> Self {
        Self::default()
    }

    // Follows HashSet insert semantics returning bool, e.g.
    // If the name was free, true is returned.
    // If the name is already taken, false is returned and the existing entry is kept.
    pub fn insert(&mut self, name: &str, conn: Connection) -> bool {
        if self.clients.contains_key(name) {
            return false;
        }

        self.clients.insert(name.to_owned(), conn);
        true
    }

    // Only removes the entry if it still belongs to the given connection,
    // so a stale session can never evict a newer owner of the name
    pub fn remove(&mut self, name: &str, id: ConnectionId) -> bool {
        match self.clients.get(name) {
            Some(conn) if conn.id() == id => {
                self.clients.remove(name);
                self.admins.remove(name);
                true
            },
            _ => false,
        }
    }

    // false if not registered or already an admin
    pub fn promote(&mut self, name: &str) -> bool {
        if !self.clients.contains_key(name) {
            return false;
        }
        self.admins.insert(name.to_owned())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.clients.contains_key(name)
    }

    pub fn is_admin(&self, name: &str) -> bool {
        self.admins.contains(name)
    }

    pub fn get(&self, name: &str) -> Option<&Connection> {
        self.clients.get(name)
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Connection)> {
        self.clients.iter()
    }

    pub fn client_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.clients.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn admin_names(&self) -> Vec<String> {
        self.admins.iter().cloned().collect()
    }

    pub fn to_list(&self) -> String {
        listing(CLIENTS_MSG, self.client_names())
    }

    pub fn to_admin_list(&self) -> String {
        listing(ADMINS_MSG, self.admin_names())
    }
}

// "<header> a b c", entries separated by single spaces
pub fn listing<I, S>(header: &str, entries: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut line = String::from(header);
    for e in entries {
        line.push(' ');
        line.push_str(e.as_ref());
    }
    line
}
