/*!
 * Local mirrors of BlueZ adapters and devices
 */

use std::collections::BTreeSet;

/// Generation number the registry stamps on every record it creates.
pub type RecordId = u64;

/// Names one record instance: its object path plus the generation it was
/// created with. A record re-created under the same path gets a new id, so
/// old handles to it stay dead.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Handle {
    pub path: String,
    pub id: RecordId,
}

#[derive(Debug, Clone)]
pub struct Adapter {
    id: RecordId,
    path: String,
    pub address: String,
    pub name: String,
    pub powered: bool,
    pub discovering: bool,
}

impl Adapter {
    pub(crate) fn new(path: &str, id: RecordId) -> Self {
        Self {
            id,
            path: path.to_string(),
            address: String::new(),
            name: String::new(),
            powered: false,
            discovering: false,
        }
    }

    pub fn id(&self) -> RecordId {
        self.id
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn handle(&self) -> Handle {
        Handle {
            path: self.path.clone(),
            id: self.id,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Device {
    id: RecordId,
    path: String,
    pub address: String,
    pub name: String,
    pub paired: bool,
    pub trusted: bool,
    pub connected: bool,
    pub uuids: BTreeSet<String>,
    /// Object path of the owning adapter, resolved through the registry.
    pub adapter: Option<String>,
}

impl Device {
    pub(crate) fn new(path: &str, id: RecordId) -> Self {
        Self {
            id,
            path: path.to_string(),
            address: String::new(),
            name: String::new(),
            paired: false,
            trusted: false,
            connected: false,
            uuids: BTreeSet::new(),
            adapter: None,
        }
    }

    pub fn id(&self) -> RecordId {
        self.id
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn handle(&self) -> Handle {
        Handle {
            path: self.path.clone(),
            id: self.id,
        }
    }
}
