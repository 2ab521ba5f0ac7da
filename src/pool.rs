//! Per-device pool of open terminal sessions.
//!
//! The pool hands out sessions by ownership: [`ConnectionPool::acquire`]
//! moves an idle session (or a freshly connected one) to the caller, and
//! [`ConnectionPool::release`] moves it back. A session is therefore never
//! used by two operations at once. The number of live sessions per device,
//! idle or checked out, is bounded; when the bound is reached `acquire`
//! returns `None` and the caller connects directly instead.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use log::{debug, info, trace};
use serde::Serialize;
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::config::PoolConfig;
use crate::error::ConnectError;
use crate::model::DeviceEndpoint;
use crate::session::{ConnectionManager, TerminalSession};

/// A pooled terminal session with its bookkeeping.
pub struct PooledSession {
    device_id: u64,
    session: Box<dyn TerminalSession>,
    /// SHA-256 of the password the session logged in with.
    password_hash: [u8; 32],
    /// Pool epoch the slot was reserved in.
    epoch: u64,
    created_at: Instant,
    last_used: Instant,
    use_count: u64,
}

impl PooledSession {
    fn new(
        device_id: u64,
        session: Box<dyn TerminalSession>,
        password_hash: [u8; 32],
        epoch: u64,
    ) -> Self {
        let now = Instant::now();
        Self {
            device_id,
            session,
            password_hash,
            epoch,
            created_at: now,
            last_used: now,
            use_count: 1,
        }
    }

    pub fn session(&mut self) -> &mut dyn TerminalSession {
        self.session.as_mut()
    }

    pub fn device_id(&self) -> u64 {
        self.device_id
    }

    pub fn device_addr(&self) -> &str {
        self.session.device_addr()
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    pub fn last_used(&self) -> Instant {
        self.last_used
    }

    /// Number of times the session was handed out.
    pub fn use_count(&self) -> u64 {
        self.use_count
    }

    pub fn is_active(&self) -> bool {
        self.session.is_connected()
    }

    fn touch(&mut self) {
        self.last_used = Instant::now();
        self.use_count += 1;
    }

    async fn close(mut self) {
        if let Err(err) = self.session.close().await {
            debug!("{} Error closing pooled session: {}", self.device_addr(), err);
        }
    }
}

/// Sessions of one device.
#[derive(Default)]
struct DeviceSlots {
    idle: Vec<PooledSession>,
    /// Idle, checked out and currently connecting sessions.
    live: usize,
}

/// Live and idle session counts for one device.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DeviceStats {
    pub live: usize,
    pub idle: usize,
    pub in_use: usize,
    /// Mean use count over the idle sessions.
    pub average_use_count: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PoolStats {
    pub devices: usize,
    pub total_sessions: usize,
    pub idle_sessions: usize,
    pub per_device: BTreeMap<u64, DeviceStats>,
}

enum Checkout {
    Reuse(PooledSession),
    Connect(u64),
    Exhausted,
}

/// Bounded, idle-expiring pool of sessions keyed by device identity.
pub struct ConnectionPool {
    manager: ConnectionManager,
    config: PoolConfig,
    devices: Mutex<HashMap<u64, DeviceSlots>>,
    /// Bumped by `close_all` while holding `devices`; sessions reserved in an
    /// older epoch are never pooled again.
    epoch: AtomicU64,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

fn password_hash(password: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(password.as_bytes());
    hasher.finalize().into()
}

impl ConnectionPool {
    pub fn new(manager: ConnectionManager, config: PoolConfig) -> Arc<Self> {
        Arc::new(Self {
            manager,
            config,
            devices: Mutex::new(HashMap::new()),
            epoch: AtomicU64::new(0),
            sweeper: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    pub fn manager(&self) -> &ConnectionManager {
        &self.manager
    }

    /// Hands out a session for the endpoint.
    ///
    /// Idle sessions are reused when still connected, not idle past the
    /// timeout and opened with the endpoint's current password; others are
    /// closed. Without a reusable session a new one is opened if the device
    /// is below its bound. `Ok(None)` means the bound is reached.
    pub async fn acquire(
        &self,
        endpoint: &DeviceEndpoint,
    ) -> Result<Option<PooledSession>, ConnectError> {
        let hash = password_hash(endpoint.password.as_deref().unwrap_or_default());
        let idle_timeout = self.config.idle_timeout();
        let mut stale = Vec::new();

        let checkout = {
            let mut devices = self.devices.lock().await;
            let slots = devices.entry(endpoint.id).or_default();
            let mut reused = None;
            while let Some(mut pooled) = slots.idle.pop() {
                let usable = pooled.is_active()
                    && pooled.last_used.elapsed() <= idle_timeout
                    && pooled.password_hash == hash;
                if usable {
                    pooled.touch();
                    reused = Some(pooled);
                    break;
                }
                slots.live = slots.live.saturating_sub(1);
                stale.push(pooled);
            }
            match reused {
                Some(pooled) => Checkout::Reuse(pooled),
                None if slots.live < self.config.max_connections_per_device => {
                    slots.live += 1;
                    Checkout::Connect(self.epoch.load(Ordering::SeqCst))
                }
                None => Checkout::Exhausted,
            }
        };

        for pooled in stale {
            debug!(
                "{} Dropping unusable pooled session (used {} times)",
                pooled.device_addr(),
                pooled.use_count
            );
            pooled.close().await;
        }

        match checkout {
            Checkout::Reuse(pooled) => {
                trace!(
                    "{} Reusing pooled session (use {})",
                    pooled.device_addr(),
                    pooled.use_count
                );
                Ok(Some(pooled))
            }
            Checkout::Exhausted => {
                debug!(
                    "Device {} has {} live sessions, pool exhausted",
                    endpoint.hostname, self.config.max_connections_per_device
                );
                Ok(None)
            }
            Checkout::Connect(epoch) => match self.manager.connect(endpoint).await {
                Ok(session) => {
                    debug!("{} New pooled session", session.device_addr());
                    Ok(Some(PooledSession::new(endpoint.id, session, hash, epoch)))
                }
                Err(err) => {
                    self.forget(endpoint.id, epoch).await;
                    Err(err)
                }
            },
        }
    }

    /// Returns a session for reuse. Sessions that are no longer connected,
    /// or that were checked out before [`close_all`](Self::close_all), are
    /// closed instead.
    pub async fn release(&self, mut pooled: PooledSession) {
        let rejected = {
            let mut devices = self.devices.lock().await;
            if pooled.epoch != self.epoch.load(Ordering::SeqCst) {
                Some(pooled)
            } else {
                match devices.get_mut(&pooled.device_id) {
                    Some(slots) if pooled.is_active() => {
                        pooled.last_used = Instant::now();
                        slots.idle.push(pooled);
                        None
                    }
                    Some(slots) => {
                        slots.live = slots.live.saturating_sub(1);
                        if slots.live == 0 {
                            devices.remove(&pooled.device_id);
                        }
                        Some(pooled)
                    }
                    None => Some(pooled),
                }
            }
        };
        if let Some(pooled) = rejected {
            debug!("{} Released session is not reusable", pooled.device_addr());
            pooled.close().await;
        }
    }

    /// Closes a checked-out session and frees its slot.
    pub async fn discard(&self, pooled: PooledSession) {
        self.forget(pooled.device_id, pooled.epoch).await;
        pooled.close().await;
    }

    /// Frees one slot of the device, unless it was reserved before the last
    /// `close_all`.
    async fn forget(&self, device_id: u64, epoch: u64) {
        let mut devices = self.devices.lock().await;
        if epoch != self.epoch.load(Ordering::SeqCst) {
            return;
        }
        if let Some(slots) = devices.get_mut(&device_id) {
            slots.live = slots.live.saturating_sub(1);
            if slots.live == 0 {
                devices.remove(&device_id);
            }
        }
    }

    /// Closes idle sessions unused for longer than the idle timeout and drops
    /// devices left without sessions. Returns the number closed.
    pub async fn sweep(&self) -> usize {
        let idle_timeout = self.config.idle_timeout();
        let expired: Vec<PooledSession> = {
            let mut devices = self.devices.lock().await;
            let mut expired = Vec::new();
            for slots in devices.values_mut() {
                let (old, fresh): (Vec<_>, Vec<_>) = slots
                    .idle
                    .drain(..)
                    .partition(|p| p.last_used.elapsed() > idle_timeout);
                slots.idle = fresh;
                slots.live = slots.live.saturating_sub(old.len());
                expired.extend(old);
            }
            devices.retain(|_, slots| slots.live > 0);
            expired
        };

        let count = expired.len();
        for pooled in expired {
            debug!("{} Closing idle pooled session", pooled.device_addr());
            pooled.close().await;
        }
        if count > 0 {
            info!("Pool sweep closed {} idle sessions", count);
        }
        count
    }

    /// Starts the periodic sweep. The task stops when the pool is dropped or
    /// closed.
    pub async fn start_sweeper(self: &Arc<Self>) {
        let pool: Weak<Self> = Arc::downgrade(self);
        let interval = self.config.sweep_interval();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
            loop {
                ticker.tick().await;
                let Some(pool) = pool.upgrade() else {
                    break;
                };
                pool.sweep().await;
            }
            debug!("Pool sweeper stopped");
        });
        if let Some(previous) = self.sweeper.lock().await.replace(handle) {
            previous.abort();
        }
    }

    /// Closes every idle session, forgets all devices and stops the sweeper.
    /// Sessions checked out at this point are closed when released.
    pub async fn close_all(&self) {
        if let Some(handle) = self.sweeper.lock().await.take() {
            handle.abort();
        }
        let drained: Vec<PooledSession> = {
            let mut devices = self.devices.lock().await;
            self.epoch.fetch_add(1, Ordering::SeqCst);
            devices
                .drain()
                .flat_map(|(_, slots)| slots.idle)
                .collect()
        };
        let count = drained.len();
        for pooled in drained {
            pooled.close().await;
        }
        info!("Pool closed, {} idle sessions closed", count);
    }

    pub async fn stats(&self) -> PoolStats {
        let devices = self.devices.lock().await;
        let per_device: BTreeMap<u64, DeviceStats> = devices
            .iter()
            .map(|(id, slots)| {
                let idle = slots.idle.len();
                let uses: u64 = slots.idle.iter().map(|p| p.use_count).sum();
                let average_use_count = if idle == 0 {
                    0.0
                } else {
                    uses as f64 / idle as f64
                };
                (
                    *id,
                    DeviceStats {
                        live: slots.live,
                        idle,
                        in_use: slots.live.saturating_sub(idle),
                        average_use_count,
                    },
                )
            })
            .collect();

        PoolStats {
            devices: per_device.len(),
            total_sessions: per_device.values().map(|d| d.live).sum(),
            idle_sessions: per_device.values().map(|d| d.idle).sum(),
            per_device,
        }
    }
}
