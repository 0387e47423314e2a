//! Application identity: versions, upgrade hooks and the drop whitelist.
//!
//! Supplied by the application-identity collaborator. The engine compares
//! these declared versions against the values persisted in the store (see
//! [`crate::meta`]) to gate and bookkeep each synchronization run.

use std::fmt;

use crate::policy::DropWhitelist;

/// Callbacks invoked around a structure-version upgrade.
///
/// `before_upgrade` runs prior to the per-table pass and `after_upgrade`
/// after it, both receiving the structure version the store is upgrading
/// from. The default implementations do nothing.
pub trait UpgradeHooks: Send + Sync {
    /// Called before the per-table pass when the declared structure version
    /// is greater than the stored one.
    fn before_upgrade(&self, _from_version: i64) {}

    /// Called after the per-table pass of an upgrading run.
    fn after_upgrade(&self, _from_version: i64) {}
}

/// Hooks that do nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopHooks;

impl UpgradeHooks for NoopHooks {}

/// Version identity of the running application.
pub struct AppIdentity {
    /// Version of the running application.
    pub application_version: i64,
    /// Structure version the declared schema corresponds to.
    pub structure_version: i64,
    /// Minimum application version required to open a store produced by
    /// this declaration.
    pub required_application_version: i64,
    /// Tables the application allows the engine to drop.
    pub drop_whitelist: DropWhitelist,
    /// Upgrade callbacks.
    pub hooks: Box<dyn UpgradeHooks>,
}

impl AppIdentity {
    /// Creates an identity for the given application version, with version
    /// zero structure metadata, an empty whitelist and no-op hooks.
    #[must_use]
    pub fn new(application_version: i64) -> Self {
        Self {
            application_version,
            structure_version: 0,
            required_application_version: 0,
            drop_whitelist: DropWhitelist::new(),
            hooks: Box::new(NoopHooks),
        }
    }

    /// Sets the declared structure version.
    #[must_use]
    pub fn structure_version(mut self, version: i64) -> Self {
        self.structure_version = version;
        self
    }

    /// Sets the required application version.
    #[must_use]
    pub fn required_application_version(mut self, version: i64) -> Self {
        self.required_application_version = version;
        self
    }

    /// Sets the drop whitelist.
    #[must_use]
    pub fn drop_whitelist(mut self, whitelist: DropWhitelist) -> Self {
        self.drop_whitelist = whitelist;
        self
    }

    /// Installs upgrade hooks.
    #[must_use]
    pub fn hooks(mut self, hooks: impl UpgradeHooks + 'static) -> Self {
        self.hooks = Box::new(hooks);
        self
    }
}

impl fmt::Debug for AppIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppIdentity")
            .field("application_version", &self.application_version)
            .field("structure_version", &self.structure_version)
            .field(
                "required_application_version",
                &self.required_application_version,
            )
            .field("drop_whitelist", &self.drop_whitelist)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicI64, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_identity_builder() {
        let identity = AppIdentity::new(3)
            .structure_version(7)
            .required_application_version(2);
        assert_eq!(identity.application_version, 3);
        assert_eq!(identity.structure_version, 7);
        assert_eq!(identity.required_application_version, 2);
    }

    #[test]
    fn test_hooks_receive_from_version() {
        struct Recording(Arc<AtomicI64>);
        impl UpgradeHooks for Recording {
            fn before_upgrade(&self, from_version: i64) {
                self.0.store(from_version, Ordering::SeqCst);
            }
        }

        let seen = Arc::new(AtomicI64::new(-1));
        let identity = AppIdentity::new(1).hooks(Recording(Arc::clone(&seen)));
        identity.hooks.before_upgrade(4);
        assert_eq!(seen.load(Ordering::SeqCst), 4);
    }
}
