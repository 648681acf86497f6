//! Core identifiers shared by every role of the cluster.
//!
//! Serial numbers ([`Sn`]) address components, [`AppKey`] addresses a process,
//! [`SocketKey`] addresses a client connection. [`AppType`] is a bitmask so that a
//! single process can carry several roles at once.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::BitOr;
use std::str::FromStr;

/// Static identifier of a world definition in the world catalog.
pub type WorldId = u32;

/// Numeric id of a process within its app type (0..=1023).
pub type AppId = u16;

/// Process-unique serial number of a component.
///
/// Layout: `((ms >> 10) << 26) | (app_id << 16) | ticket`. The creating app id can
/// always be recovered with [`Sn::app_id`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Sn(pub u64);

impl Sn {
    /// The "no component" serial number.
    pub const NULL: Sn = Sn(0);

    pub fn is_null(self) -> bool {
        self.0 == 0
    }

    /// App id of the process that generated this serial number.
    pub fn app_id(self) -> AppId {
        ((self.0 >> 16) & 0x3FF) as AppId
    }
}

impl fmt::Display for Sn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Bitmask of process roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AppType(pub u32);

impl AppType {
    pub const NONE: AppType = AppType(0);
    pub const APP_MANAGER: AppType = AppType(1);
    pub const GAME: AppType = AppType(1 << 1);
    pub const SPACE: AppType = AppType(1 << 2);
    pub const LOGIN: AppType = AppType(1 << 3);
    pub const DB: AppType = AppType(1 << 4);
    pub const ALL_IN_ONE: AppType = AppType(0x1F);

    /// Single roles in the order shards are created for a multi-role process.
    pub const ROLES: [AppType; 5] = [
        AppType::APP_MANAGER,
        AppType::GAME,
        AppType::SPACE,
        AppType::LOGIN,
        AppType::DB,
    ];

    /// True when every bit of `other` is carried by `self`.
    pub fn contains(self, other: AppType) -> bool {
        other.0 != 0 && self.0 & other.0 == other.0
    }

    /// True when `self` and `other` share at least one role.
    pub fn intersects(self, other: AppType) -> bool {
        self.0 & other.0 != 0
    }

    /// Iterates the single roles carried by this mask.
    pub fn roles(self) -> impl Iterator<Item = AppType> {
        AppType::ROLES.into_iter().filter(move |role| self.contains(*role))
    }

    fn role_name(self) -> Option<&'static str> {
        match self {
            AppType::APP_MANAGER => Some("appmgr"),
            AppType::GAME => Some("game"),
            AppType::SPACE => Some("space"),
            AppType::LOGIN => Some("login"),
            AppType::DB => Some("db"),
            AppType::ALL_IN_ONE => Some("all-in-one"),
            _ => None,
        }
    }
}

impl BitOr for AppType {
    type Output = AppType;

    fn bitor(self, rhs: AppType) -> AppType {
        AppType(self.0 | rhs.0)
    }
}

impl fmt::Display for AppType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(name) = self.role_name() {
            return f.write_str(name);
        }
        let names: Vec<&str> = self.roles().filter_map(AppType::role_name).collect();
        if names.is_empty() {
            write!(f, "none")
        } else {
            f.write_str(&names.join("+"))
        }
    }
}

impl FromStr for AppType {
    type Err = String;

    /// Parses a role name or a `+`-joined list of role names (`"space+appmgr"`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut mask = AppType::NONE;
        for part in s.split('+').map(str::trim) {
            let role = match part.to_ascii_lowercase().as_str() {
                "appmgr" | "app-manager" | "app_manager" => AppType::APP_MANAGER,
                "game" => AppType::GAME,
                "space" => AppType::SPACE,
                "login" => AppType::LOGIN,
                "db" | "dbmgr" => AppType::DB,
                "all-in-one" | "allinone" | "all" => AppType::ALL_IN_ONE,
                other => return Err(format!("unknown app type '{}'", other)),
            };
            mask = mask | role;
        }
        Ok(mask)
    }
}

/// Identity of one process in the cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AppKey {
    pub app_type: AppType,
    pub app_id: AppId,
}

impl AppKey {
    pub fn new(app_type: AppType, app_id: AppId) -> Self {
        Self { app_type, app_id }
    }
}

impl fmt::Display for AppKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.app_type, self.app_id)
    }
}

/// Transient handle of a client connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SocketKey(pub u64);

impl fmt::Display for SocketKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "socket:{}", self.0)
    }
}

/// 3D position in world space.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Position {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

/// Kind of a world definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorldKind {
    /// Login screen world, never hosted by a space.
    Login,
    /// Character selection world hosted by the game lobby.
    Roles,
    /// Singleton world per id.
    Public,
    /// Instanced world, many per id.
    Dungeon,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sn_exposes_app_id() {
        let sn = Sn((77u64 << 26) | (513u64 << 16) | 42);
        assert_eq!(sn.app_id(), 513);
        assert!(!sn.is_null());
        assert!(Sn::NULL.is_null());
    }

    #[test]
    fn app_type_masks() {
        let combined = AppType::SPACE | AppType::APP_MANAGER;
        assert!(combined.contains(AppType::SPACE));
        assert!(!combined.contains(AppType::GAME));
        assert!(combined.intersects(AppType::APP_MANAGER | AppType::GAME));
        assert_eq!(
            combined.roles().collect::<Vec<_>>(),
            vec![AppType::APP_MANAGER, AppType::SPACE]
        );
        assert_eq!(AppType::ALL_IN_ONE.roles().count(), 5);
        assert!(!AppType::GAME.contains(AppType::NONE));
    }

    #[test]
    fn app_type_parses_and_displays() {
        assert_eq!("space+appmgr".parse::<AppType>().unwrap(), AppType::SPACE | AppType::APP_MANAGER);
        assert_eq!("all-in-one".parse::<AppType>().unwrap(), AppType::ALL_IN_ONE);
        assert!("robot".parse::<AppType>().is_err());
        assert_eq!(AppType::GAME.to_string(), "game");
        assert_eq!((AppType::GAME | AppType::DB).to_string(), "game+db");
        assert_eq!(AppKey::new(AppType::SPACE, 3).to_string(), "space#3");
    }
}
