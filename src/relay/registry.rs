//! Tenant registry.
//!
//! Maps game server identifiers to the Discord channel relaying for them,
//! and owns each server's message buffer. Both directions of the mapping
//! live behind one lock so they never disagree:
//! - forward: server id -> channel (outbound relay, registration)
//! - reverse: channel -> server id (inbound Discord events)
//!
//! Channel creation is serialized per server id, so concurrent first-touch
//! requests for the same server converge on a single channel. Once a caller
//! holds its server's gate, the Discord work runs on its own task: a caller
//! that goes away (client disconnect, timeout) cannot strand a created
//! channel unmapped or a removed server's channel undeleted.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serenity::all::{ChannelId, RoleId};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::common::{RelayError, RelayResult};
use crate::relay::buffer::{MessageBuffer, RelayedMessage};
use crate::relay::platform::{ChannelHandle, ChatPlatform, NewChannel, OutgoingMessage};

/// Server id used for the fixed channel in single-channel mode.
pub const DEFAULT_TENANT: &str = "default";

/// Characters of the server id kept in generated channel names.
const CHANNEL_NAME_ID_LEN: usize = 8;

/// How new relay channels are created.
#[derive(Debug, Clone)]
pub struct ChannelSettings {
    pub prefix: String,
    pub category_id: Option<ChannelId>,
    pub allowed_role_id: Option<RoleId>,
}

/// Point-in-time registry counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistryStats {
    pub tenants: usize,
    pub buffered_messages: usize,
}

#[derive(Debug, Default)]
struct Tenant {
    channel_id: Option<ChannelId>,
    buffer: MessageBuffer,
}

#[derive(Debug, Default)]
struct RegistryState {
    tenants: HashMap<String, Tenant>,
    by_channel: HashMap<ChannelId, String>,
}

impl RegistryState {
    fn channel_of(&self, tenant_id: &str) -> Option<ChannelId> {
        self.tenants.get(tenant_id).and_then(|t| t.channel_id)
    }

    fn link(&mut self, tenant_id: &str, channel_id: ChannelId) {
        let tenant = self.tenants.entry(tenant_id.to_string()).or_default();
        if let Some(previous) = tenant.channel_id.replace(channel_id) {
            self.by_channel.remove(&previous);
        }
        self.by_channel.insert(channel_id, tenant_id.to_string());
    }

    /// Drop a stale channel, keeping the tenant's buffer.
    fn unlink(&mut self, tenant_id: &str, channel_id: ChannelId) {
        if let Some(tenant) = self.tenants.get_mut(tenant_id) {
            if tenant.channel_id == Some(channel_id) {
                tenant.channel_id = None;
            }
        }
        self.by_channel.remove(&channel_id);
    }

    fn remove(&mut self, tenant_id: &str) -> Option<Tenant> {
        let tenant = self.tenants.remove(tenant_id)?;
        if let Some(channel_id) = tenant.channel_id {
            self.by_channel.remove(&channel_id);
        }
        Some(tenant)
    }
}

type GateMap = Arc<Mutex<HashMap<String, Arc<AsyncMutex<()>>>>>;

/// Claim on a server's creation gate.
///
/// Dropping the last claim removes the gate from the map, whether the
/// holder finished, failed or was cancelled while waiting.
struct GateClaim {
    gates: GateMap,
    tenant_id: String,
    gate: Arc<AsyncMutex<()>>,
}

impl Drop for GateClaim {
    fn drop(&mut self) {
        let mut gates = self.gates.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        // Only the map and this claim hold it: nobody else is waiting
        if Arc::strong_count(&self.gate) == 2 {
            gates.remove(&self.tenant_id);
        }
    }
}

/// A held creation gate. The lock is released before the claim.
struct GateGuard {
    _held: OwnedMutexGuard<()>,
    _claim: GateClaim,
}

/// Registry of game servers and their relay channels.
pub struct TenantRegistry {
    platform: Arc<dyn ChatPlatform>,
    settings: ChannelSettings,
    /// Fixed channel of [`DEFAULT_TENANT`], never created or deleted here.
    pinned: Option<ChannelId>,
    state: Arc<RwLock<RegistryState>>,
    creation_gates: GateMap,
}

impl TenantRegistry {
    pub fn new(platform: Arc<dyn ChatPlatform>, settings: ChannelSettings) -> Self {
        Self {
            platform,
            settings,
            pinned: None,
            state: Arc::new(RwLock::new(RegistryState::default())),
            creation_gates: GateMap::default(),
        }
    }

    /// Bind [`DEFAULT_TENANT`] to a fixed, externally managed channel.
    pub fn with_pinned_channel(mut self, channel_id: ChannelId) -> Self {
        let mut state = RegistryState::default();
        state.link(DEFAULT_TENANT, channel_id);
        self.pinned = Some(channel_id);
        self.state = Arc::new(RwLock::new(state));
        self
    }

    /// Server id to use when a request does not name one.
    pub fn default_tenant(&self) -> Option<&'static str> {
        self.pinned.map(|_| DEFAULT_TENANT)
    }

    pub fn platform(&self) -> Arc<dyn ChatPlatform> {
        Arc::clone(&self.platform)
    }

    /// Return the server's live channel, creating one if needed.
    ///
    /// A mapped channel Discord reports as gone is replaced. Any other
    /// failure to fetch it is returned without touching the mapping.
    pub async fn resolve_or_create(&self, tenant_id: &str) -> RelayResult<ChannelHandle> {
        if let Some(pinned) = self.pinned.filter(|_| tenant_id == DEFAULT_TENANT) {
            return self
                .platform
                .fetch_channel(pinned)
                .await
                .map_err(|e| RelayError::upstream("Failed to fetch relay channel", e));
        }

        let guard = self.lock_gate(tenant_id).await;
        let work = ChannelWork {
            platform: Arc::clone(&self.platform),
            state: Arc::clone(&self.state),
            tenant_id: tenant_id.to_string(),
        };
        let new_channel = self.new_channel_for(tenant_id);

        join_detached(tokio::spawn(async move {
            let result = work.resolve_or_create(new_channel).await;
            drop(guard);
            result
        }))
        .await
    }

    /// Server id owning `channel_id`, if any.
    pub async fn reverse_resolve(&self, channel_id: ChannelId) -> Option<String> {
        self.state.read().await.by_channel.get(&channel_id).cloned()
    }

    /// Forget a server, deleting its channel and discarding its buffer.
    ///
    /// Unknown servers are a no-op. A failed channel delete is logged and
    /// the bookkeeping is removed regardless.
    pub async fn unregister(&self, tenant_id: &str) {
        if self.pinned.is_some() && tenant_id == DEFAULT_TENANT {
            info!("Ignoring unregister of the fixed relay channel");
            return;
        }

        let guard = self.lock_gate(tenant_id).await;
        let work = ChannelWork {
            platform: Arc::clone(&self.platform),
            state: Arc::clone(&self.state),
            tenant_id: tenant_id.to_string(),
        };

        let task = tokio::spawn(async move {
            work.unregister().await;
            drop(guard);
            Ok::<_, RelayError>(())
        });
        if let Err(e) = join_detached(task).await {
            warn!(server_id = tenant_id, "Unregister did not complete: {}", e);
        }
    }

    /// Buffer a message for a server. Returns false if the server is unknown.
    pub async fn append(&self, tenant_id: &str, message: RelayedMessage) -> bool {
        let mut state = self.state.write().await;
        match state.tenants.get_mut(tenant_id) {
            Some(tenant) => {
                tenant.buffer.append(message);
                true
            }
            None => false,
        }
    }

    /// Buffered messages after `cursor`; empty for unknown servers.
    pub async fn list_messages(&self, tenant_id: &str, cursor: Option<&str>) -> Vec<RelayedMessage> {
        self.state
            .read()
            .await
            .tenants
            .get(tenant_id)
            .map(|t| t.buffer.read_after(cursor))
            .unwrap_or_default()
    }

    pub async fn stats(&self) -> RegistryStats {
        let state = self.state.read().await;
        RegistryStats {
            tenants: state.by_channel.len(),
            buffered_messages: state.tenants.values().map(|t| t.buffer.len()).sum(),
        }
    }

    fn new_channel_for(&self, tenant_id: &str) -> NewChannel {
        NewChannel {
            name: channel_name(&self.settings.prefix, tenant_id),
            topic: Some(format!("Relay for game server {}", tenant_id)),
            category_id: self.settings.category_id,
            allowed_role_id: self.settings.allowed_role_id,
        }
    }

    /// Wait for exclusive use of the server's gate.
    async fn lock_gate(&self, tenant_id: &str) -> GateGuard {
        let gate = {
            let mut gates = self
                .creation_gates
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            Arc::clone(gates.entry(tenant_id.to_string()).or_default())
        };
        let claim = GateClaim {
            gates: Arc::clone(&self.creation_gates),
            tenant_id: tenant_id.to_string(),
            gate,
        };

        GateGuard {
            _held: Arc::clone(&claim.gate).lock_owned().await,
            _claim: claim,
        }
    }
}

/// Registry work for one server, run on its own task under the server's gate.
struct ChannelWork {
    platform: Arc<dyn ChatPlatform>,
    state: Arc<RwLock<RegistryState>>,
    tenant_id: String,
}

impl ChannelWork {
    async fn resolve_or_create(&self, new_channel: NewChannel) -> RelayResult<ChannelHandle> {
        let tenant_id = self.tenant_id.as_str();

        let mapped = self.state.read().await.channel_of(tenant_id);
        if let Some(channel_id) = mapped {
            match self.platform.fetch_channel(channel_id).await {
                Ok(channel) => return Ok(channel),
                Err(e) if e.is_channel_gone() => {
                    warn!(
                        server_id = tenant_id,
                        channel_id = channel_id.get(),
                        "Relay channel is gone, creating a new one: {}",
                        e
                    );
                    self.state.write().await.unlink(tenant_id, channel_id);
                }
                Err(e) => return Err(RelayError::upstream("Failed to fetch relay channel", e)),
            }
        }

        let channel = self
            .platform
            .create_channel(&new_channel)
            .await
            .map_err(|e| RelayError::upstream("Failed to create relay channel", e))?;

        self.state.write().await.link(tenant_id, channel.id);
        info!(
            server_id = tenant_id,
            channel_id = channel.id.get(),
            "Created relay channel #{}",
            channel.name
        );

        let welcome = OutgoingMessage::text(format!(
            "🔗 This channel is now linked to game server `{}`.\n\
             Messages posted here are relayed to the server, and messages from the server appear here.",
            tenant_id
        ));
        if let Err(e) = self.platform.send_message(channel.id, &welcome).await {
            warn!(
                channel_id = channel.id.get(),
                "Failed to send welcome message: {}", e
            );
        }

        Ok(channel)
    }

    async fn unregister(&self) {
        let tenant_id = self.tenant_id.as_str();

        let removed = self.state.write().await.remove(tenant_id);
        match removed {
            None => debug!(server_id = tenant_id, "Unregister of unknown server"),
            Some(Tenant {
                channel_id: Some(channel_id),
                buffer,
            }) => {
                if let Err(e) = self.platform.delete_channel(channel_id).await {
                    warn!(
                        server_id = tenant_id,
                        channel_id = channel_id.get(),
                        "Failed to delete relay channel: {}",
                        e
                    );
                }
                info!(
                    server_id = tenant_id,
                    discarded = buffer.len(),
                    "Unregistered server"
                );
            }
            Some(Tenant { buffer, .. }) => {
                info!(
                    server_id = tenant_id,
                    discarded = buffer.len(),
                    "Unregistered server without a channel"
                );
            }
        }
    }
}

/// Await a spawned registry task, re-raising its panic if it had one.
async fn join_detached<T>(task: JoinHandle<RelayResult<T>>) -> RelayResult<T> {
    match task.await {
        Ok(result) => result,
        Err(e) => match e.try_into_panic() {
            Ok(panic) => std::panic::resume_unwind(panic),
            Err(_) => Err(RelayError::Interrupted),
        },
    }
}

/// Deterministic channel name: prefix plus the first 8 characters of the id.
pub fn channel_name(prefix: &str, tenant_id: &str) -> String {
    let short: String = tenant_id
        .chars()
        .take(CHANNEL_NAME_ID_LEN)
        .map(|c| match c {
            'a'..='z' | '0'..='9' | '-' | '_' => c,
            'A'..='Z' => c.to_ascii_lowercase(),
            _ => '-',
        })
        .collect();
    format!("{}-{}", prefix, short)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio_test::{assert_err, assert_ok};

    use super::*;
    use crate::relay::platform::fake::FakePlatform;

    fn settings() -> ChannelSettings {
        ChannelSettings {
            prefix: "server".to_string(),
            category_id: Some(ChannelId::new(77)),
            allowed_role_id: Some(RoleId::new(88)),
        }
    }

    fn registry() -> (Arc<FakePlatform>, TenantRegistry) {
        let platform = Arc::new(FakePlatform::new());
        let registry = TenantRegistry::new(platform.clone(), settings());
        (platform, registry)
    }

    fn message(id: &str) -> RelayedMessage {
        RelayedMessage {
            id: id.to_string(),
            username: "Tester".to_string(),
            content: "hello".to_string(),
            timestamp: 1,
        }
    }

    #[test]
    fn test_channel_name_truncates_and_sanitizes() {
        assert_eq!(channel_name("server", "ABCDEF123456"), "server-abcdef12");
        assert_eq!(channel_name("server", "abc"), "server-abc");
        assert_eq!(channel_name("relay", "a b.c/d"), "relay-a-b-c-d");
    }

    #[tokio::test]
    async fn test_register_creates_channel_once() {
        let (platform, registry) = registry();

        let first = assert_ok!(registry.resolve_or_create("abcdef123456").await);
        let second = assert_ok!(registry.resolve_or_create("abcdef123456").await);

        assert_eq!(first.id, second.id);
        assert_eq!(first.name, "server-abcdef12");
        let created = platform.created();
        assert_eq!(created.len(), 1);
        assert_eq!(created[0].category_id, Some(ChannelId::new(77)));
        assert_eq!(created[0].allowed_role_id, Some(RoleId::new(88)));
    }

    #[tokio::test]
    async fn test_new_channel_gets_welcome() {
        let (platform, registry) = registry();

        let channel = registry.resolve_or_create("srv").await.unwrap();
        let sent = platform.sent_to(channel.id);
        assert_eq!(sent.len(), 1);
        assert!(sent[0].contains("`srv`"));

        registry.resolve_or_create("srv").await.unwrap();
        assert_eq!(platform.sent_to(channel.id).len(), 1);
    }

    #[tokio::test]
    async fn test_welcome_failure_is_not_fatal() {
        let (platform, registry) = registry();
        platform.fail_send(true);

        let channel = registry.resolve_or_create("srv").await.unwrap();
        assert_eq!(registry.reverse_resolve(channel.id).await.as_deref(), Some("srv"));
    }

    #[tokio::test]
    async fn test_concurrent_first_touch_creates_one_channel() {
        let platform = Arc::new(FakePlatform::new().with_create_delay(Duration::from_millis(20)));
        let registry = Arc::new(TenantRegistry::new(platform.clone(), settings()));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                tokio::spawn(async move { registry.resolve_or_create("racer").await })
            })
            .collect();

        let mut ids = Vec::new();
        for handle in handles {
            ids.push(handle.await.unwrap().unwrap().id);
        }

        assert_eq!(platform.created().len(), 1);
        assert!(ids.iter().all(|id| *id == ids[0]));
    }

    #[tokio::test]
    async fn test_externally_deleted_channel_is_recreated() {
        let (platform, registry) = registry();

        let old = registry.resolve_or_create("srv").await.unwrap();
        registry.append("srv", message("m1")).await;
        platform.remove_channel(old.id);

        let new = registry.resolve_or_create("srv").await.unwrap();
        assert_ne!(old.id, new.id);
        assert_eq!(platform.created().len(), 2);
        assert_eq!(registry.reverse_resolve(old.id).await, None);
        assert_eq!(registry.reverse_resolve(new.id).await.as_deref(), Some("srv"));
        // The buffer survives a channel swap
        assert_eq!(registry.list_messages("srv", None).await.len(), 1);
    }

    #[tokio::test]
    async fn test_create_failure_propagates() {
        let (platform, registry) = registry();
        platform.fail_create(true);

        let err = assert_err!(registry.resolve_or_create("srv").await);
        assert!(matches!(err, RelayError::Upstream { .. }));
        assert_eq!(registry.stats().await.tenants, 0);
    }

    #[tokio::test]
    async fn test_reverse_resolve_unknown_channel() {
        let (_platform, registry) = registry();
        assert_eq!(registry.reverse_resolve(ChannelId::new(12345)).await, None);
    }

    #[tokio::test]
    async fn test_unregister_deletes_channel_and_buffer() {
        let (platform, registry) = registry();

        let channel = registry.resolve_or_create("srv").await.unwrap();
        assert!(registry.append("srv", message("m1")).await);

        registry.unregister("srv").await;

        assert_eq!(platform.deleted(), vec![channel.id]);
        assert!(!platform.exists(channel.id));
        assert_eq!(registry.reverse_resolve(channel.id).await, None);
        assert!(registry.list_messages("srv", None).await.is_empty());
        assert!(!registry.append("srv", message("m2")).await);
        assert_eq!(
            registry.stats().await,
            RegistryStats {
                tenants: 0,
                buffered_messages: 0
            }
        );
    }

    #[tokio::test]
    async fn test_unregister_unknown_is_noop() {
        let (platform, registry) = registry();
        registry.unregister("ghost").await;
        assert!(platform.deleted().is_empty());
        assert!(platform.created().is_empty());
    }

    #[tokio::test]
    async fn test_unregister_proceeds_when_delete_fails() {
        let (platform, registry) = registry();
        let channel = registry.resolve_or_create("srv").await.unwrap();
        platform.fail_delete(true);

        registry.unregister("srv").await;

        assert_eq!(registry.reverse_resolve(channel.id).await, None);
        assert_eq!(registry.stats().await.tenants, 0);
    }

    #[tokio::test]
    async fn test_pinned_channel() {
        let platform = Arc::new(FakePlatform::new().with_channel(42, "bridge"));
        let registry =
            TenantRegistry::new(platform.clone(), settings()).with_pinned_channel(ChannelId::new(42));

        assert_eq!(registry.default_tenant(), Some(DEFAULT_TENANT));
        assert_eq!(
            registry.reverse_resolve(ChannelId::new(42)).await.as_deref(),
            Some(DEFAULT_TENANT)
        );

        let channel = registry.resolve_or_create(DEFAULT_TENANT).await.unwrap();
        assert_eq!(channel.name, "bridge");

        registry.unregister(DEFAULT_TENANT).await;
        assert!(platform.deleted().is_empty());
        assert!(platform.created().is_empty());
        assert_eq!(registry.stats().await.tenants, 1);
    }

    #[tokio::test]
    async fn test_pinned_channel_missing_is_an_error() {
        let platform = Arc::new(FakePlatform::new());
        let registry =
            TenantRegistry::new(platform.clone(), settings()).with_pinned_channel(ChannelId::new(42));

        let result = registry.resolve_or_create(DEFAULT_TENANT).await;
        assert!(matches!(result, Err(RelayError::Upstream { .. })));
        assert!(platform.created().is_empty());
    }

    #[tokio::test]
    async fn test_stats_count_buffers() {
        let (_platform, registry) = registry();
        registry.resolve_or_create("a").await.unwrap();
        registry.resolve_or_create("b").await.unwrap();
        registry.append("a", message("m1")).await;
        registry.append("a", message("m2")).await;
        registry.append("b", message("m3")).await;

        assert_eq!(
            registry.stats().await,
            RegistryStats {
                tenants: 2,
                buffered_messages: 3
            }
        );
    }

    #[tokio::test]
    async fn test_creation_gates_released() {
        let (_platform, registry) = registry();
        registry.resolve_or_create("srv").await.unwrap();
        registry.unregister("srv").await;
        assert!(registry.creation_gates.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_abandoned_callers_release_gates_and_keep_channels() {
        let platform = Arc::new(FakePlatform::new().with_create_delay(Duration::from_millis(100)));
        let registry = Arc::new(TenantRegistry::new(platform.clone(), settings()));

        for id in ["a", "b", "c", "d", "e"] {
            let abandoned =
                tokio::time::timeout(Duration::from_millis(10), registry.resolve_or_create(id)).await;
            assert!(abandoned.is_err());
        }
        // Usually cancelled while queued behind the first "a" caller
        let _ = tokio::time::timeout(Duration::from_millis(10), registry.resolve_or_create("a")).await;

        tokio::time::sleep(Duration::from_millis(400)).await;

        assert!(registry.creation_gates.lock().unwrap().is_empty());
        assert_eq!(platform.created().len(), 5);
        assert_eq!(registry.stats().await.tenants, 5);
        for created in platform.created() {
            let id = created.name.trim_start_matches("server-").to_string();
            let channel = registry.resolve_or_create(&id).await.unwrap();
            assert_eq!(registry.reverse_resolve(channel.id).await, Some(id));
        }
        assert_eq!(platform.created().len(), 5);
    }

    #[tokio::test]
    async fn test_abandoned_unregister_still_deletes() {
        let platform = Arc::new(FakePlatform::new().with_delete_delay(Duration::from_millis(50)));
        let registry = TenantRegistry::new(platform.clone(), settings());
        let channel = registry.resolve_or_create("srv").await.unwrap();

        let abandoned =
            tokio::time::timeout(Duration::from_millis(5), registry.unregister("srv")).await;
        assert!(abandoned.is_err());
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert_eq!(platform.deleted(), vec![channel.id]);
        assert!(registry.creation_gates.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_transient_fetch_failure_keeps_channel() {
        let (platform, registry) = registry();
        let channel = registry.resolve_or_create("srv").await.unwrap();

        platform.fail_fetch(true);
        let err = assert_err!(registry.resolve_or_create("srv").await);
        assert!(matches!(err, RelayError::Upstream { .. }));
        assert_eq!(platform.created().len(), 1);
        assert!(platform.exists(channel.id));

        platform.fail_fetch(false);
        let again = assert_ok!(registry.resolve_or_create("srv").await);
        assert_eq!(again.id, channel.id);
        assert_eq!(registry.reverse_resolve(channel.id).await.as_deref(), Some("srv"));
    }
}
