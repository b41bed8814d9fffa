//! Operations gateway
//!
//! The single synchronization point between concurrent event handlers and the
//! [`Directory`]. Every request is executed on its own task; concurrent
//! requests with the same [`ResourceKey`] share one execution.

use std::sync::Arc;
use std::time::Duration;

use ephemeral_types::{Guild, Permissions, Role};
use tokio::sync::oneshot;
use tracing::{debug, trace};

use crate::cache::SnapshotCache;
use crate::coalesce::Coalescer;
use crate::directory::Directory;
use crate::error::{GatewayError, Result};
use crate::request::{Request, ResourceKey, Response, ResultHandle};

/// Largest member page the platform serves.
pub const MAX_MEMBER_PAGE: u16 = 1000;

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Page size for member enumeration, clamped to `1..=MAX_MEMBER_PAGE`.
    pub member_page_limit: u16,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            member_page_limit: MAX_MEMBER_PAGE,
        }
    }
}

pub(crate) struct Inner<D> {
    pub(crate) directory: D,
    pub(crate) cache: SnapshotCache,
    pub(crate) flights: Coalescer<ResourceKey, Response>,
    pub(crate) page_limit: u16,
}

/// Cheap to clone; clones share the directory, cache and in-flight table.
pub struct Gateway<D> {
    inner: Arc<Inner<D>>,
}

impl<D> Clone for Gateway<D> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<D: Directory> Gateway<D> {
    pub fn new(directory: D) -> Self {
        Self::with_config(directory, GatewayConfig::default())
    }

    pub fn with_config(directory: D, config: GatewayConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                directory,
                cache: SnapshotCache::new(),
                flights: Coalescer::new(),
                page_limit: config.member_page_limit.clamp(1, MAX_MEMBER_PAGE),
            }),
        }
    }

    pub fn directory(&self) -> &D {
        &self.inner.directory
    }

    /// Submit a request. Never blocks on the directory.
    ///
    /// Must be called from within a tokio runtime.
    pub fn submit(&self, request: Request, timeout: Duration) -> ResultHandle {
        let operation = request.operation();
        let (tx, rx) = oneshot::channel();
        let handle = ResultHandle::new(operation, timeout, rx);

        if let Request::Unknown = request {
            let _ = tx.send(Err(GatewayError::UnsupportedOperation(
                operation.to_string(),
            )));
            return handle;
        }

        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            let result = inner.execute(request).await;
            if tx.send(result).is_err() {
                trace!(operation, "Result dropped, caller stopped waiting");
            }
        });
        handle
    }

    pub async fn lookup_guild(&self, guild_id: u64, timeout: Duration) -> Result<Arc<Guild>> {
        self.submit(Request::LookupGuild { guild_id }, timeout)
            .wait()
            .await?
            .into_guild()
    }

    /// Return the role named `name`, creating it with `color` if absent.
    pub async fn create_role(
        &self,
        guild_id: u64,
        name: impl Into<String>,
        color: u32,
        timeout: Duration,
    ) -> Result<Role> {
        let request = Request::CreateRole {
            guild_id,
            name: name.into(),
            color,
        };
        self.submit(request, timeout).wait().await?.into_role()
    }

    pub async fn add_role_to_member(
        &self,
        guild_id: u64,
        user_id: u64,
        role_id: u64,
        timeout: Duration,
    ) -> Result<()> {
        let request = Request::AddRoleToMember {
            guild_id,
            user_id,
            role_id,
        };
        self.submit(request, timeout).wait().await?.into_done()
    }

    pub async fn remove_role_from_member(
        &self,
        guild_id: u64,
        user_id: u64,
        role_id: u64,
        timeout: Duration,
    ) -> Result<()> {
        let request = Request::RemoveRoleFromMember {
            guild_id,
            user_id,
            role_id,
        };
        self.submit(request, timeout).wait().await?.into_done()
    }

    pub async fn channel_permissions(
        &self,
        guild_id: u64,
        user_id: u64,
        channel_id: u64,
        timeout: Duration,
    ) -> Result<Permissions> {
        let request = Request::ChannelPermissions {
            guild_id,
            user_id,
            channel_id,
        };
        self.submit(request, timeout)
            .wait()
            .await?
            .into_permissions()
    }

    /// Drop the cached snapshot; the next lookup refreshes from the directory.
    pub fn invalidate(&self, guild_id: u64) {
        debug!(guild_id, "Invalidating guild snapshot");
        self.inner.cache.invalidate(guild_id);
    }

    /// Record a member's role set observed outside the gateway.
    pub fn observe_member_roles(&self, guild_id: u64, user_id: u64, roles: Vec<u64>) {
        self.inner
            .cache
            .patch_member(guild_id, user_id, move |member| member.roles = roles);
    }

    /// Number of resource keys with work in flight.
    pub fn in_flight(&self) -> usize {
        self.inner.flights.in_flight()
    }

    pub fn cached_guilds(&self) -> usize {
        self.inner.cache.len()
    }
}

impl<D: Directory> Inner<D> {
    async fn execute(self: &Arc<Self>, request: Request) -> Result<Response> {
        match request {
            Request::LookupGuild { guild_id } => self.lookup(guild_id).await.map(Response::Guild),
            Request::CreateRole {
                guild_id,
                name,
                color,
            } => self
                .ensure_role(guild_id, name, color)
                .await
                .map(Response::Role),
            Request::AddRoleToMember {
                guild_id,
                user_id,
                role_id,
            } => self
                .add_member_role(guild_id, user_id, role_id)
                .await
                .map(|()| Response::Done),
            Request::RemoveRoleFromMember {
                guild_id,
                user_id,
                role_id,
            } => self
                .remove_member_role(guild_id, user_id, role_id)
                .await
                .map(|()| Response::Done),
            Request::ChannelPermissions {
                guild_id,
                user_id,
                channel_id,
            } => self
                .permissions(guild_id, user_id, channel_id)
                .await
                .map(Response::Permissions),
            Request::Unknown => Err(GatewayError::UnsupportedOperation("unknown".to_string())),
        }
    }
}

#[cfg(test)]
#[path = "gateway_tests.rs"]
mod gateway_tests;
