//! Central presence registry and sequencer

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{mpsc, oneshot, RwLock};
use tokio::task::JoinHandle;

use crate::protocol::Frame;

use super::command::{DetachKind, HubCommand};
use super::config::HubConfig;
use super::site::{RemoveOutcome, Site, SiteMember};

/// Process-wide presence hub
///
/// Maps site keys to site aggregates. Reads go straight to the map;
/// every mutation is queued as a [`HubCommand`] and applied by the
/// sequencer task, so attaches and detaches from all connections land
/// in one total order. A site is registered exactly while it has
/// members: the first attach creates it, the last removal reclaims it.
pub struct PresenceHub {
    /// All currently registered sites
    sites: RwLock<HashMap<String, Arc<Site>>>,
    /// Producer side of the sequencer queue
    commands: mpsc::Sender<HubCommand>,
    /// Consumer side, taken once by `spawn_sequencer`
    inbox: Mutex<Option<mpsc::Receiver<HubCommand>>>,
    config: HubConfig,
}

impl PresenceHub {
    /// Create a hub with default configuration
    pub fn new() -> Self {
        Self::with_config(HubConfig::default())
    }

    /// Create a hub with custom configuration
    pub fn with_config(config: HubConfig) -> Self {
        let (commands, inbox) = mpsc::channel(config.command_buffer);
        Self {
            sites: RwLock::new(HashMap::new()),
            commands,
            inbox: Mutex::new(Some(inbox)),
            config,
        }
    }

    /// Get the hub configuration
    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    /// Spawn the sequencer task that applies queued commands in order
    ///
    /// Must run before endpoints attach; the server spawns it at
    /// startup and aborts the returned handle on shutdown. A second
    /// call finds the inbox already taken and spawns a task that exits
    /// immediately.
    pub fn spawn_sequencer(self: &Arc<Self>) -> JoinHandle<()> {
        let inbox = self.inbox.lock().expect("sequencer inbox lock").take();
        let hub = Arc::clone(self);

        tokio::spawn(async move {
            let Some(mut inbox) = inbox else {
                tracing::warn!("Hub sequencer already spawned");
                return;
            };
            while let Some(command) = inbox.recv().await {
                hub.apply(command).await;
            }
            tracing::debug!("Hub sequencer stopped");
        })
    }

    /// Queue an attach and wait until the sequencer has applied it
    pub async fn attach(&self, site_key: &str, member: SiteMember) {
        let site_key = site_key.to_string();
        self.submit(|done| HubCommand::Attach {
            site_key,
            member,
            done,
        })
        .await;
    }

    /// Queue a detach and wait until the sequencer has applied it
    ///
    /// A detach for an endpoint that is not a member of the site is a
    /// no-op, which makes duplicate detaches (disconnect racing a shed,
    /// switch racing a shutdown) harmless.
    pub async fn detach(&self, site_key: &str, endpoint_id: u64, kind: DetachKind) {
        let site_key = site_key.to_string();
        self.submit(|done| HubCommand::Detach {
            site_key,
            endpoint_id,
            kind,
            done,
        })
        .await;
    }

    /// Queue a count broadcast to a site's members
    ///
    /// Broadcasting to an unknown site does nothing.
    pub async fn broadcast(&self, site_key: &str, count: usize) {
        let site_key = site_key.to_string();
        self.submit(|done| HubCommand::Broadcast {
            site_key,
            count,
            done,
        })
        .await;
    }

    /// Look up a site without creating it
    pub async fn site(&self, key: &str) -> Option<Arc<Site>> {
        self.sites.read().await.get(key).cloned()
    }

    /// Current viewer count for a site, if it is registered
    pub async fn viewer_count(&self, key: &str) -> Option<usize> {
        let site = self.site(key).await?;
        Some(site.viewer_count().await)
    }

    /// Whether a site is currently registered
    pub async fn has_site(&self, key: &str) -> bool {
        self.sites.read().await.contains_key(key)
    }

    /// Number of registered sites
    pub async fn site_count(&self) -> usize {
        self.sites.read().await.len()
    }

    /// Notify every member of every site and cancel their connections
    ///
    /// Best-effort fan-out for process teardown: members whose queues
    /// are full miss the notice but are still cancelled. Bypasses the
    /// sequencer; commands still in flight become no-ops once their
    /// members are gone.
    pub async fn begin_shutdown(&self, notice: &str) {
        let sites: Vec<Arc<Site>> = self.sites.read().await.values().cloned().collect();
        let frame = Frame::shutdown(notice);

        let mut notified = 0;
        let mut connections = 0;
        for site in &sites {
            let (sent, members) = site.shutdown_members(&frame).await;
            notified += sent;
            connections += members;
        }

        tracing::info!(
            sites = sites.len(),
            connections = connections,
            notified = notified,
            "Shutdown notice fanned out"
        );
    }

    /// Resolve a site aggregate, creating and registering it if absent
    async fn resolve_site(&self, key: &str) -> Arc<Site> {
        if let Some(site) = self.site(key).await {
            return site;
        }

        let mut sites = self.sites.write().await;
        // Re-check under the write lock
        Arc::clone(sites.entry(key.to_string()).or_insert_with(|| {
            tracing::info!(site = %key, "Site created");
            Arc::new(Site::new(key))
        }))
    }

    async fn submit(&self, build: impl FnOnce(oneshot::Sender<()>) -> HubCommand) {
        let (done, applied) = oneshot::channel();
        if self.commands.send(build(done)).await.is_err() {
            // Sequencer is gone; the hub is shutting down
            tracing::debug!("Hub command dropped");
            return;
        }
        let _ = applied.await;
    }

    /// Apply one command; runs only on the sequencer task
    async fn apply(&self, command: HubCommand) {
        match command {
            HubCommand::Attach {
                site_key,
                member,
                done,
            } => {
                self.apply_attach(&site_key, member).await;
                let _ = done.send(());
            }
            HubCommand::Detach {
                site_key,
                endpoint_id,
                kind,
                done,
            } => {
                self.apply_detach(&site_key, endpoint_id, kind).await;
                let _ = done.send(());
            }
            HubCommand::Broadcast {
                site_key,
                count,
                done,
            } => {
                self.fan_out(&site_key, count).await;
                let _ = done.send(());
            }
        }
    }

    async fn apply_attach(&self, site_key: &str, member: SiteMember) {
        let endpoint_id = member.endpoint_id;
        let peer = member.peer.clone();

        let site = self.resolve_site(site_key).await;
        let count = site.insert_member(member).await;

        tracing::info!(
            site = %site_key,
            endpoint = endpoint_id,
            peer = %peer,
            viewers = count,
            "Viewer joined"
        );

        self.fan_out(site_key, count).await;
    }

    async fn apply_detach(&self, site_key: &str, endpoint_id: u64, kind: DetachKind) {
        let Some(site) = self.site(site_key).await else {
            tracing::debug!(site = %site_key, endpoint = endpoint_id, "Detach for unknown site ignored");
            return;
        };

        let retire = kind == DetachKind::Final;
        match site.remove_member(endpoint_id, retire).await {
            RemoveOutcome::NotMember => {
                tracing::debug!(
                    site = %site_key,
                    endpoint = endpoint_id,
                    "Detach for non-member ignored"
                );
            }
            RemoveOutcome::Removed { remaining } => {
                tracing::info!(
                    site = %site_key,
                    endpoint = endpoint_id,
                    viewers = remaining,
                    "Viewer left"
                );
                if remaining == 0 {
                    self.reclaim(site_key).await;
                } else {
                    self.fan_out(site_key, remaining).await;
                }
            }
        }
    }

    /// Broadcast an update to a site's members, shedding slow consumers
    async fn fan_out(&self, site_key: &str, count: usize) {
        let Some(site) = self.site(site_key).await else {
            return;
        };

        let frame = Frame::update(site_key, count);
        for endpoint_id in site.try_broadcast(&frame).await {
            tracing::warn!(
                site = %site_key,
                endpoint = endpoint_id,
                "Outbound queue full, shedding viewer"
            );
            // Shed members leave through the same removal path as a
            // detach; survivors see the new count on the next transition
            if let RemoveOutcome::Removed { remaining: 0 } =
                site.remove_member(endpoint_id, true).await
            {
                self.reclaim(site_key).await;
            }
        }
    }

    /// Drop an empty site from the registry
    async fn reclaim(&self, site_key: &str) {
        let mut sites = self.sites.write().await;
        if sites.remove(site_key).is_some() {
            tracing::info!(site = %site_key, "Site reclaimed");
        }
    }
}

impl Default for PresenceHub {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_util::sync::CancellationToken;

    fn running_hub() -> Arc<PresenceHub> {
        let hub = Arc::new(PresenceHub::new());
        hub.spawn_sequencer();
        hub
    }

    fn member(id: u64, capacity: usize) -> (SiteMember, mpsc::Receiver<Frame>, CancellationToken) {
        let (tx, rx) = mpsc::channel(capacity);
        let cancel = CancellationToken::new();
        (
            SiteMember::new(id, format!("198.51.100.{id}:4000"), tx, cancel.clone()),
            rx,
            cancel,
        )
    }

    fn update_counts(rx: &mut mpsc::Receiver<Frame>) -> Vec<usize> {
        let mut counts = Vec::new();
        while let Ok(frame) = rx.try_recv() {
            if let Frame::Update { count, .. } = frame {
                counts.push(count);
            }
        }
        counts
    }

    #[tokio::test]
    async fn test_attach_detach_lifecycle() {
        let hub = running_hub();
        let (m1, _rx1, _) = member(1, 16);
        let (m2, _rx2, _) = member(2, 16);

        // Two viewers join the same site
        hub.attach("blog", m1).await;
        assert_eq!(hub.viewer_count("blog").await, Some(1));
        hub.attach("blog", m2).await;
        assert_eq!(hub.viewer_count("blog").await, Some(2));
        assert_eq!(hub.site_count().await, 1);

        // First leaves, count drops
        hub.detach("blog", 1, DetachKind::Final).await;
        assert_eq!(hub.viewer_count("blog").await, Some(1));

        // Last leaves, the site is reclaimed synchronously
        hub.detach("blog", 2, DetachKind::Final).await;
        assert!(!hub.has_site("blog").await);
        assert_eq!(hub.site_count().await, 0);
    }

    #[tokio::test]
    async fn test_detach_is_idempotent() {
        let hub = running_hub();
        let (m1, _rx1, _) = member(1, 16);
        let (m2, _rx2, _) = member(2, 16);
        hub.attach("blog", m1).await;
        hub.attach("blog", m2).await;

        hub.detach("blog", 1, DetachKind::Final).await;
        // Repeats and strangers change nothing
        hub.detach("blog", 1, DetachKind::Final).await;
        hub.detach("blog", 99, DetachKind::Final).await;
        hub.detach("news", 2, DetachKind::Final).await;

        assert_eq!(hub.viewer_count("blog").await, Some(1));
    }

    #[tokio::test]
    async fn test_update_fanout_reaches_all_members() {
        let hub = running_hub();
        let (m1, mut rx1, _) = member(1, 16);
        let (m2, mut rx2, _) = member(2, 16);
        let (m3, mut rx3, _) = member(3, 16);

        // Three viewers join "blog" one after another
        hub.attach("blog", m1).await;
        hub.attach("blog", m2).await;
        hub.attach("blog", m3).await;

        // Each member saw every count change since it joined
        assert_eq!(update_counts(&mut rx1), vec![1, 2, 3]);
        assert_eq!(update_counts(&mut rx2), vec![2, 3]);
        assert_eq!(update_counts(&mut rx3), vec![3]);

        // Viewers leave in reverse order
        hub.detach("blog", 3, DetachKind::Final).await;
        hub.detach("blog", 2, DetachKind::Final).await;
        assert_eq!(update_counts(&mut rx1), vec![2, 1]);

        hub.detach("blog", 1, DetachKind::Final).await;
        assert!(!hub.has_site("blog").await);
    }

    #[tokio::test]
    async fn test_switching_sites_moves_the_count() {
        let hub = running_hub();
        let (tx, _rx) = mpsc::channel(16);
        let cancel = CancellationToken::new();
        let (other, _other_rx, _) = member(2, 16);

        hub.attach("a", SiteMember::new(1, "peer", tx.clone(), cancel.clone()))
            .await;
        hub.attach("a", other).await;
        assert_eq!(hub.viewer_count("a").await, Some(2));

        // Endpoint 1 switches from "a" to "b" on the same connection
        hub.detach("a", 1, DetachKind::Switching).await;
        hub.attach("b", SiteMember::new(1, "peer", tx.clone(), cancel.clone()))
            .await;

        assert_eq!(hub.viewer_count("a").await, Some(1));
        assert_eq!(hub.viewer_count("b").await, Some(1));
        // A switching detach must not stop the connection's tasks
        assert!(!cancel.is_cancelled());

        hub.detach("b", 1, DetachKind::Final).await;
        assert!(cancel.is_cancelled());
        assert!(!hub.has_site("b").await);
    }

    #[tokio::test]
    async fn test_slow_member_is_shed() {
        let hub = running_hub();
        let (slow, mut slow_rx, slow_cancel) = member(1, 1);
        let (fast, mut fast_rx, _) = member(2, 16);

        // The slow member's capacity-1 queue fills with its own join update
        hub.attach("blog", slow).await;
        // The next fan-out cannot fit and sheds it
        hub.attach("blog", fast).await;

        assert_eq!(hub.viewer_count("blog").await, Some(1));
        assert!(slow_cancel.is_cancelled());
        assert_eq!(update_counts(&mut slow_rx), vec![1]);
        assert_eq!(update_counts(&mut fast_rx), vec![2]);
    }

    #[tokio::test]
    async fn test_shedding_last_member_reclaims_site() {
        let hub = running_hub();
        let (only, _rx, _) = member(1, 1);

        hub.attach("blog", only).await;
        assert!(hub.has_site("blog").await);

        // Queue already holds the join update; the explicit broadcast
        // overflows it and sheds the only member
        hub.broadcast("blog", 7).await;
        assert!(!hub.has_site("blog").await);
    }

    #[tokio::test]
    async fn test_broadcast_command() {
        let hub = running_hub();
        let (m1, mut rx1, _) = member(1, 16);
        hub.attach("blog", m1).await;

        hub.broadcast("blog", 42).await;
        assert_eq!(update_counts(&mut rx1), vec![1, 42]);

        // Unknown site is a silent no-op
        hub.broadcast("nowhere", 5).await;
        assert!(!hub.has_site("nowhere").await);
    }

    #[tokio::test]
    async fn test_shutdown_notifies_every_site() {
        let hub = running_hub();
        let (m1, mut rx1, c1) = member(1, 16);
        let (m2, mut rx2, c2) = member(2, 16);
        hub.attach("blog", m1).await;
        hub.attach("news", m2).await;

        hub.begin_shutdown("maintenance").await;

        assert!(c1.is_cancelled());
        assert!(c2.is_cancelled());

        // Each member is notified exactly once; a double notice would
        // show up here as a second shutdown frame
        for rx in [&mut rx1, &mut rx2] {
            let mut notices = 0;
            while let Ok(frame) = rx.try_recv() {
                if let Frame::Shutdown { message } = frame {
                    assert_eq!(message, "maintenance");
                    notices += 1;
                }
            }
            assert_eq!(notices, 1);
        }
    }

    #[tokio::test]
    async fn test_resolve_converges_under_races() {
        let hub = running_hub();

        let mut handles = Vec::new();
        for id in 1..=8u64 {
            let hub = Arc::clone(&hub);
            handles.push(tokio::spawn(async move {
                let (m, rx, _) = member(id, 16);
                hub.attach("same-site", m).await;
                rx
            }));
        }
        let mut receivers = Vec::new();
        for handle in handles {
            receivers.push(handle.await.unwrap());
        }

        assert_eq!(hub.site_count().await, 1);
        assert_eq!(hub.viewer_count("same-site").await, Some(8));

        // Every member's last observed count is the final one
        for mut rx in receivers {
            let counts = update_counts(&mut rx);
            assert_eq!(counts.last(), Some(&8));
        }
    }
}
