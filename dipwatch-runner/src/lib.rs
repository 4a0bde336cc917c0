//! dipwatch runner: everything around the decision engine.
//!
//! This crate builds on `dipwatch-core` to provide:
//! - Admitted-set and journal storage (in-memory and JSON file)
//! - The notification channel and its rate-limited queue
//! - The dispatcher: admission, dedup, worker pool, restart recovery
//! - TOML application configuration

pub mod config;
pub mod dispatcher;
pub mod notify;
pub mod store;

pub use config::{AppConfig, Channel, ConfigError, NotifyConfig, PoolConfig, SourceConfig, StorageConfig};
pub use dispatcher::{parse_key, Admission, DispatchError, DispatchStats, Dispatcher, DispatcherConfig};
pub use notify::{
    LogNotifier, MessageTemplate, NotificationQueue, Notifier, NotifyError, QueueStats, TelegramNotifier,
};
pub use store::{FileSet, MemorySet, StoreError, WorkSet};

#[cfg(test)]
mod send_sync_checks {
    use super::*;

    fn assert_send<T: Send>() {}
    fn assert_sync<T: Sync>() {}

    #[test]
    fn dispatcher_is_send_sync() {
        assert_send::<Dispatcher>();
        assert_sync::<Dispatcher>();
    }

    #[test]
    fn stores_are_send_sync() {
        assert_send::<FileSet>();
        assert_sync::<FileSet>();
        assert_send::<MemorySet>();
        assert_sync::<MemorySet>();
    }

    #[test]
    fn queue_is_send_sync() {
        assert_send::<NotificationQueue>();
        assert_sync::<NotificationQueue>();
    }

    #[test]
    fn config_is_send_sync() {
        assert_send::<AppConfig>();
        assert_sync::<AppConfig>();
    }
}
