use crate::types::{AppKey, AppType};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Which side opened a link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LinkDirection {
    /// This process connected to the remote one and reconnects when it drops.
    Outbound,
    /// The remote process connected to this one and announced itself.
    Inbound,
}

/// A live link towards a remote process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NetworkLink {
    pub key: AppKey,
    pub direction: LinkDirection,
    pub endpoint: Option<String>,
}

/// Registry of the live links of this process, keyed by remote app key.
#[derive(Debug)]
pub struct NetworkLocator {
    identity: AppKey,
    links: Mutex<BTreeMap<AppKey, NetworkLink>>,
}

impl NetworkLocator {
    pub fn new(identity: AppKey) -> Self {
        Self {
            identity,
            links: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn identity(&self) -> AppKey {
        self.identity
    }

    /// True when this process must announce itself to a freshly linked `remote` type.
    pub fn should_announce(&self, remote: AppType) -> bool {
        !self.identity.app_type.contains(AppType::APP_MANAGER)
            && remote.intersects(AppType::APP_MANAGER | AppType::SPACE | AppType::GAME)
    }

    /// Records a link opened by this process.
    ///
    /// A stale entry for the same key is replaced with a warning. Returns whether
    /// this process should announce itself over the new link.
    pub fn add_outbound(&self, key: AppKey, endpoint: Option<String>) -> bool {
        let previous = self.links.lock().insert(
            key,
            NetworkLink {
                key,
                direction: LinkDirection::Outbound,
                endpoint,
            },
        );
        if previous.is_some() {
            warn!("⚠️ Link to {} already existed, replacing it", key);
        }
        self.should_announce(key.app_type)
    }

    /// Records an announced inbound link. Returns true when `key` was not known yet.
    pub fn register_inbound(&self, key: AppKey) -> bool {
        let mut links = self.links.lock();
        match links.get_mut(&key) {
            Some(link) => {
                debug!("🔄 {} announced itself again, refreshing link", key);
                link.direction = LinkDirection::Inbound;
                false
            }
            None => {
                links.insert(
                    key,
                    NetworkLink {
                        key,
                        direction: LinkDirection::Inbound,
                        endpoint: None,
                    },
                );
                true
            }
        }
    }

    pub fn remove(&self, key: AppKey) -> Option<NetworkLink> {
        self.links.lock().remove(&key)
    }

    pub fn contains(&self, key: AppKey) -> bool {
        self.links.lock().contains_key(&key)
    }

    /// Keys of every linked process carrying `app_type`, ordered by key.
    pub fn app_keys(&self, app_type: AppType) -> Vec<AppKey> {
        self.links
            .lock()
            .keys()
            .filter(|key| key.app_type.contains(app_type))
            .copied()
            .collect()
    }

    pub fn snapshot(&self) -> Vec<NetworkLink> {
        self.links.lock().values().cloned().collect()
    }
}
