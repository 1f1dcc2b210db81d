//! Link handle resolution and option command dispatch.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

use super::context::LinkContext;
use super::control::{ControlMessage, ControlReply};
use super::transport::Transport;
use super::LinkId;
use crate::config::Config;
use crate::error::{PppError, Result};
use crate::options::{Applied, RequesterId};

/// Shared handle to one link
pub type SharedLink = Arc<Mutex<LinkContext>>;

/// Registered links
pub struct LinkRegistry {
    config: Config,
    links: Arc<RwLock<HashMap<LinkId, LinkEntry>>>,
}

struct LinkEntry {
    ctx: SharedLink,
    /// Closed by its owner; dropped once the terminate handshake is over
    retiring: bool,
}

impl Default for LinkRegistry {
    fn default() -> Self {
        Self::new(Config::default())
    }
}

impl LinkRegistry {
    /// Empty registry; every link is created with `config`
    pub fn new(config: Config) -> Self {
        Self {
            config,
            links: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Register a link sending through `transport`, replacing any link with
    /// the same handle
    pub async fn add_link(&self, id: LinkId, transport: Box<dyn Transport>) -> SharedLink {
        let ctx = Arc::new(Mutex::new(LinkContext::new(
            id,
            self.config.clone(),
            transport,
        )));
        let entry = LinkEntry {
            ctx: Arc::clone(&ctx),
            retiring: false,
        };
        self.links.write().await.insert(id, entry);
        info!(link = %id, "link added");
        ctx
    }

    /// Resolve a link handle
    pub async fn get(&self, id: LinkId) -> Result<SharedLink> {
        self.links
            .read()
            .await
            .get(&id)
            .filter(|entry| !entry.retiring)
            .map(|entry| Arc::clone(&entry.ctx))
            .ok_or(PppError::NoSuchLink(id.0))
    }

    /// Apply a raw option command
    pub async fn set_option_raw(
        &self,
        link: LinkId,
        requester: RequesterId,
        option: u32,
        data: &[u8],
    ) -> Result<Applied> {
        let ctx = self.get(link).await?;
        let mut ctx = ctx.lock().await;
        ctx.set_option_raw(requester, option, data)
    }

    /// Answer an option command with a controller result code
    pub async fn handle(&self, msg: &ControlMessage) -> ControlReply {
        match self
            .set_option_raw(msg.link, msg.requester, msg.option, &msg.data)
            .await
        {
            Ok(_) => ControlReply::ok(),
            Err(e) => {
                debug!(
                    link = %msg.link,
                    requester = %msg.requester,
                    option = msg.option,
                    error = %e,
                    "option command refused"
                );
                ControlReply {
                    result: e.result_code(),
                }
            }
        }
    }

    /// Forget a requester on every link
    pub async fn remove_requester(&self, requester: RequesterId) {
        let links: Vec<SharedLink> = self
            .links
            .read()
            .await
            .values()
            .map(|entry| Arc::clone(&entry.ctx))
            .collect();
        for ctx in links {
            ctx.lock().await.remove_requester(requester);
        }
    }

    /// Close a link. It disappears at once if nothing is left to terminate,
    /// otherwise after its terminate handshake (see [`tick_all`]).
    ///
    /// The map lock is never held while a link is locked.
    ///
    /// [`tick_all`]: LinkRegistry::tick_all
    pub async fn remove_link(&self, id: LinkId) -> Result<()> {
        let ctx = self
            .links
            .read()
            .await
            .get(&id)
            .map(|entry| Arc::clone(&entry.ctx))
            .ok_or(PppError::NoSuchLink(id.0))?;

        let released = {
            let mut ctx = ctx.lock().await;
            ctx.close("link removed");
            ctx.is_released()
        };

        let mut links = self.links.write().await;
        // the handle may have been re-registered meanwhile
        let Some(entry) = links.get_mut(&id).filter(|e| Arc::ptr_eq(&e.ctx, &ctx)) else {
            return Ok(());
        };
        if released {
            links.remove(&id);
            info!(link = %id, "link removed");
        } else {
            entry.retiring = true;
            debug!(link = %id, "link retiring");
        }
        Ok(())
    }

    /// Advance every link's clock, then drop retiring links that have been
    /// released. Returns the number of links dropped.
    pub async fn tick_all(&self, elapsed: Duration) -> usize {
        let snapshot: Vec<(LinkId, SharedLink, bool)> = self
            .links
            .read()
            .await
            .iter()
            .map(|(id, entry)| (*id, Arc::clone(&entry.ctx), entry.retiring))
            .collect();

        let mut released = Vec::new();
        for (id, ctx, retiring) in snapshot {
            let done = {
                let mut guard = ctx.lock().await;
                guard.tick(elapsed);
                retiring && guard.is_released()
            };
            if done {
                released.push((id, ctx));
            }
        }
        if released.is_empty() {
            return 0;
        }

        let mut links = self.links.write().await;
        let mut dropped = 0;
        for (id, ctx) in released {
            if links.get(&id).is_some_and(|e| Arc::ptr_eq(&e.ctx, &ctx)) {
                links.remove(&id);
                info!(link = %id, "link removed");
                dropped += 1;
            }
        }
        dropped
    }

    /// Number of registered links, retiring ones included
    pub async fn len(&self) -> usize {
        self.links.read().await.len()
    }

    /// True when no link is registered
    pub async fn is_empty(&self) -> bool {
        self.links.read().await.is_empty()
    }
}
