use crate::types::{Sn, SocketKey};
use parking_lot::Mutex;
use std::collections::HashMap;
use tracing::trace;

/// Maps client sockets to the component currently owning the session.
#[derive(Debug, Default)]
pub struct SocketLocator {
    owners: Mutex<HashMap<SocketKey, Sn>>,
}

impl SocketLocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `socket` to `owner`, replacing any previous owner.
    pub fn bind(&self, socket: SocketKey, owner: Sn) {
        let previous = self.owners.lock().insert(socket, owner);
        trace!("🔗 {} bound to {} (was {:?})", socket, owner, previous);
    }

    pub fn unbind(&self, socket: SocketKey) -> Option<Sn> {
        self.owners.lock().remove(&socket)
    }

    pub fn resolve_owner(&self, socket: SocketKey) -> Option<Sn> {
        self.owners.lock().get(&socket).copied()
    }

    pub fn len(&self) -> usize {
        self.owners.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.owners.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rebinding_moves_ownership() {
        let locator = SocketLocator::new();
        locator.bind(SocketKey(1), Sn(10));
        locator.bind(SocketKey(1), Sn(20));
        assert_eq!(locator.resolve_owner(SocketKey(1)), Some(Sn(20)));
        assert_eq!(locator.unbind(SocketKey(1)), Some(Sn(20)));
        assert_eq!(locator.resolve_owner(SocketKey(1)), None);
        assert!(locator.is_empty());
    }
}
