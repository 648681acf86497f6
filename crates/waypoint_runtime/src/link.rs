//! Process link management.
//!
//! The [`LinkAgent`] keeps the network locator in step with the transport:
//!
//! - `NetworkConnect` (a link this process opened is up): record it and, when the
//!   remote type is of interest, announce this process with `AppRegister`
//! - `AppRegister` (a remote process announced itself): record it and emit
//!   `NetworkListenKey` locally when it is new
//! - `NetworkDisconnect` for an app: forget the link and, for links this process
//!   opened, reconnect through [`ProcessDiscovery`], retrying on a timer

use crate::component::Component;
use crate::context::ShardContext;
use crate::directory::LinkDirection;
use crate::error::{HandlerResult, RuntimeError};
use crate::packet::{MsgId, Packet, RoutingTags};
use crate::transport::{Destination, ProcessDiscovery};
use crate::types::{AppId, AppKey, AppType, Sn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Payload of `NetworkConnect`, filled by the transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkUp {
    pub endpoint: String,
}

/// Payload of `AppRegister`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppRegister {
    pub app_type: AppType,
    pub app_id: AppId,
}

pub struct LinkAgentInit {
    pub discovery: Arc<dyn ProcessDiscovery>,
    pub retry_interval_ms: u64,
}

/// Owner of the link handshake of a process. One per process.
pub struct LinkAgent {
    discovery: Arc<dyn ProcessDiscovery>,
    reconnecting: BTreeMap<AppKey, Option<String>>,
}

impl Component for LinkAgent {
    type Init = LinkAgentInit;
    const SINGLETON: bool = true;

    fn awake(ctx: &mut ShardContext, sn: Sn, init: LinkAgentInit) -> Self {
        ctx.on::<LinkAgent>(sn, MsgId::NetworkConnect, LinkAgent::handle_connect);
        ctx.on::<LinkAgent>(sn, MsgId::AppRegister, LinkAgent::handle_register);
        ctx.on::<LinkAgent>(sn, MsgId::NetworkDisconnect, LinkAgent::handle_disconnect);
        ctx.on::<LinkAgent>(sn, MsgId::TimerReconnect, LinkAgent::handle_retry);
        ctx.add_timer(sn, MsgId::TimerReconnect, init.retry_interval_ms, init.retry_interval_ms, true);
        Self {
            discovery: init.discovery,
            reconnecting: BTreeMap::new(),
        }
    }
}

impl LinkAgent {
    /// Keys waiting for a successful reconnect.
    pub fn reconnecting(&self) -> impl Iterator<Item = &AppKey> {
        self.reconnecting.keys()
    }

    fn handle_connect(&mut self, ctx: &mut ShardContext, packet: &Packet) -> HandlerResult {
        let key = packet.tags.app.ok_or(RuntimeError::MissingTag("app"))?;
        let endpoint = if packet.payload.is_empty() {
            None
        } else {
            Some(packet.decode::<LinkUp>()?.endpoint)
        };
        self.reconnecting.remove(&key);

        let announce = ctx.directory().network.add_outbound(key, endpoint);
        info!("🔗 Linked to {}", key);
        if announce {
            let identity = ctx.identity();
            let register = Packet::new(
                MsgId::AppRegister,
                &AppRegister {
                    app_type: identity.app_type,
                    app_id: identity.app_id,
                },
            )?;
            ctx.send(Destination::App(key), register);
        }
        Ok(())
    }

    fn handle_register(&mut self, ctx: &mut ShardContext, packet: &Packet) -> HandlerResult {
        let register: AppRegister = packet.decode()?;
        let key = AppKey::new(register.app_type, register.app_id);
        if ctx.directory().network.register_inbound(key) {
            info!("🤝 {} registered with this process", key);
            ctx.dispatch(Packet::empty(MsgId::NetworkListenKey).with_tags(RoutingTags::default().app(key)));
        }
        Ok(())
    }

    fn handle_disconnect(&mut self, ctx: &mut ShardContext, packet: &Packet) -> HandlerResult {
        if packet.tags.socket.is_some() {
            return Ok(());
        }
        let Some(key) = packet.tags.app else {
            return Ok(());
        };

        match ctx.directory().network.remove(key) {
            Some(link) if link.direction == LinkDirection::Outbound => {
                warn!("⚠️ Lost link to {}, reconnecting", key);
                self.reconnecting.insert(key, link.endpoint);
                self.reconnect(ctx, key);
            }
            Some(_) => info!("🔌 {} disconnected", key),
            None => debug!("🔌 Disconnect of unknown link {}", key),
        }
        Ok(())
    }

    fn handle_retry(&mut self, ctx: &mut ShardContext, _packet: &Packet) -> HandlerResult {
        let pending: Vec<AppKey> = self.reconnecting.keys().copied().collect();
        for key in pending {
            self.reconnect(ctx, key);
        }
        Ok(())
    }

    fn reconnect(&mut self, ctx: &mut ShardContext, key: AppKey) {
        let remembered = self.reconnecting.get(&key).cloned().flatten();
        let Some(endpoint) = self.discovery.locate(key).or(remembered) else {
            warn!("⚠️ No endpoint known for {}, giving up", key);
            self.reconnecting.remove(&key);
            return;
        };
        if ctx.connect(&endpoint) {
            self.reconnecting.remove(&key);
        }
    }
}
