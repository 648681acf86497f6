//! Load-aware registry of remote processes.
//!
//! Processes report their online counts periodically through `AppInfoSync`. The
//! registry picks the least loaded process of a type and bumps its count right away,
//! so bursts of requests spread across processes before the next report arrives.

use crate::types::{AppId, AppKey, AppType};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use tracing::{error, trace};

/// Load report of one process. Also the `AppInfoSync` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppInfo {
    pub app_type: AppType,
    pub app_id: AppId,
    #[serde(default)]
    pub ip: String,
    #[serde(default)]
    pub port: u16,
    pub online: u32,
}

impl AppInfo {
    pub fn key(&self) -> AppKey {
        AppKey::new(self.app_type, self.app_id)
    }
}

/// Known processes and their load, ordered by app key.
#[derive(Debug, Default)]
pub struct AppRegistry {
    apps: BTreeMap<AppKey, AppInfo>,
}

impl AppRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a process or refreshes its load and address.
    pub fn apply_sync(&mut self, info: AppInfo) {
        trace!("📊 App {} reports {} online", info.key(), info.online);
        self.apps.insert(info.key(), info);
    }

    pub fn remove(&mut self, key: AppKey) -> Option<AppInfo> {
        self.apps.remove(&key)
    }

    pub fn get(&self, key: AppKey) -> Option<&AppInfo> {
        self.apps.get(&key)
    }

    /// Picks the process of `app_type` with the fewest players and counts one more on it.
    ///
    /// Ties go to the lowest app key. Logs an error and returns `None` when no process
    /// of that type is known.
    pub fn pick_least_loaded(&mut self, app_type: AppType) -> Option<AppInfo> {
        let mut best: Option<&mut AppInfo> = None;
        for info in self.apps.values_mut() {
            if !info.app_type.intersects(app_type) {
                continue;
            }
            let better = best.as_ref().map_or(true, |current| info.online < current.online);
            if better {
                let idle = info.online == 0;
                best = Some(info);
                if idle {
                    break;
                }
            }
        }

        match best {
            Some(info) => {
                info.online += 1;
                Some(info.clone())
            }
            None => {
                error!("🔴 No {} process available", app_type);
                None
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &AppInfo> {
        self.apps.values()
    }

    pub fn len(&self) -> usize {
        self.apps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.apps.is_empty()
    }

    /// Text dump used by console commands.
    pub fn dump(&self) -> String {
        let mut out = format!("apps: {}", self.apps.len());
        for info in self.apps.values() {
            let _ = write!(out, "\n  {} {}:{} online={}", info.key(), info.ip, info.port, info.online);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn space(app_id: AppId, online: u32) -> AppInfo {
        AppInfo {
            app_type: AppType::SPACE,
            app_id,
            ip: "127.0.0.1".into(),
            port: 7000 + app_id,
            online,
        }
    }

    #[test]
    fn picks_least_loaded_and_counts_the_pick() {
        let mut registry = AppRegistry::new();
        registry.apply_sync(space(1, 5));
        registry.apply_sync(space(2, 3));
        registry.apply_sync(space(3, 4));

        assert_eq!(registry.pick_least_loaded(AppType::SPACE).map(|a| a.app_id), Some(2));
        assert_eq!(registry.get(AppKey::new(AppType::SPACE, 2)).map(|a| a.online), Some(4));
        // 2 and 3 tie at four, the lower key wins
        assert_eq!(registry.pick_least_loaded(AppType::SPACE).map(|a| a.app_id), Some(2));
        assert_eq!(registry.pick_least_loaded(AppType::SPACE).map(|a| a.app_id), Some(3));
    }

    #[test]
    fn idle_process_wins_immediately() {
        let mut registry = AppRegistry::new();
        registry.apply_sync(space(4, 0));
        registry.apply_sync(space(5, 0));
        assert_eq!(registry.pick_least_loaded(AppType::SPACE).map(|a| a.app_id), Some(4));
        assert_eq!(registry.pick_least_loaded(AppType::SPACE).map(|a| a.app_id), Some(5));
    }

    #[test]
    fn type_mismatch_yields_none() {
        let mut registry = AppRegistry::new();
        registry.apply_sync(space(1, 0));
        assert!(registry.pick_least_loaded(AppType::DB).is_none());

        registry.apply_sync(AppInfo {
            app_type: AppType::SPACE | AppType::APP_MANAGER,
            app_id: 9,
            ip: String::new(),
            port: 0,
            online: 0,
        });
        registry.remove(AppKey::new(AppType::SPACE, 1));
        assert_eq!(registry.pick_least_loaded(AppType::SPACE).map(|a| a.app_id), Some(9));
        assert!(registry.dump().contains("appmgr+space#9"));
    }

    #[test]
    fn sync_refreshes_existing_entries() {
        let mut registry = AppRegistry::new();
        registry.apply_sync(space(1, 10));
        registry.apply_sync(space(1, 2));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get(AppKey::new(AppType::SPACE, 1)).map(|a| a.online), Some(2));
    }
}
