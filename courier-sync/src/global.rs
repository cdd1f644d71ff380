//! Process-wide accessor for the one service an application runs.
//!
//! Install once at startup; everything else calls [`get`]. Tests should
//! build their own [`SyncService`] instances instead of going through here.

use std::sync::OnceLock;

use crate::service::SyncService;

static SERVICE: OnceLock<SyncService> = OnceLock::new();

/// Make `service` the process-wide instance.
///
/// Returns the service back if one was already installed.
pub fn install(service: SyncService) -> Result<(), SyncService> {
    SERVICE.set(service)
}

pub fn get() -> Option<&'static SyncService> {
    SERVICE.get()
}

/// The installed service, installing the one built by `init` if there is
/// none yet.
pub fn get_or_install(init: impl FnOnce() -> SyncService) -> &'static SyncService {
    SERVICE.get_or_init(init)
}
