//! ---
//! gpm_section: "02-power-management"
//! gpm_subsection: "module"
//! gpm_type: "source"
//! gpm_scope: "code"
//! gpm_description: "Power-transition orchestration and client-object replay."
//! gpm_version: "v0.0.0-prealpha"
//! gpm_owner: "tbd"
//! ---
use parking_lot::{Condvar, Mutex};
use tracing::{trace, warn};

use crate::status::{RmError, RmResult};

/// Subsystem on whose behalf a lock is taken, recorded for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum LockModule {
    DynPower,
}

/// Exclusive lock with a fallible acquire and an infallible release.
///
/// There is no shared mode and no timeout: `acquire` blocks until the lock is free or
/// reports why it cannot be granted at all.
pub trait ExclusiveLock: Send + Sync {
    fn name(&self) -> &str;
    fn acquire(&self, module: LockModule) -> RmResult<()>;
    fn release(&self);
}

/// Releases the wrapped lock exactly once when dropped.
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct LockGuard<'a> {
    lock: &'a dyn ExclusiveLock,
    module: LockModule,
}

impl<'a> LockGuard<'a> {
    pub fn acquire(lock: &'a dyn ExclusiveLock, module: LockModule) -> RmResult<Self> {
        lock.acquire(module).map_err(|err| {
            warn!(lock = lock.name(), %module, %err, "lock acquisition failed");
            err
        })?;
        trace!(lock = lock.name(), %module, "lock acquired");
        Ok(Self { lock, module })
    }
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        self.lock.release();
        trace!(lock = self.lock.name(), module = %self.module, "lock released");
    }
}

impl std::fmt::Debug for LockGuard<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockGuard")
            .field("lock", &self.lock.name())
            .field("module", &self.module)
            .finish()
    }
}

/// Blocking exclusive lock built on a mutex-protected flag and a condition variable.
///
/// Ownership is not tied to a thread, so the acquire/release pair may be driven through
/// [`LockGuard`] or called directly by a collaborator that crosses call boundaries.
#[derive(Debug)]
pub struct BlockingLock {
    name: String,
    held: Mutex<bool>,
    released: Condvar,
    refusal: Mutex<Option<RmError>>,
}

impl BlockingLock {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            held: Mutex::new(false),
            released: Condvar::new(),
            refusal: Mutex::new(None),
        }
    }

    /// Make every subsequent acquire fail with `status`, or clear the refusal with `None`.
    pub fn set_unavailable(&self, status: Option<RmError>) {
        *self.refusal.lock() = status;
    }

    pub fn is_held(&self) -> bool {
        *self.held.lock()
    }
}

impl ExclusiveLock for BlockingLock {
    fn name(&self) -> &str {
        &self.name
    }

    fn acquire(&self, _module: LockModule) -> RmResult<()> {
        if let Some(status) = self.refusal.lock().clone() {
            return Err(status);
        }
        let mut held = self.held.lock();
        while *held {
            self.released.wait(&mut held);
        }
        *held = true;
        Ok(())
    }

    fn release(&self) {
        let mut held = self.held.lock();
        if !*held {
            warn!(lock = %self.name, "release of a lock that is not held");
            return;
        }
        *held = false;
        self.released.notify_one();
    }
}
