//! Extension connection runtime.
//!
//! An extension adapts one chat backend to the uniform [`ParaboxConnection`]
//! contract. The [`loader`] discovers extensions and instantiates them, a
//! [`Connection`] tracks one instance through `Pending → Active | Failed`,
//! and the [`ParaboxBridge`] handed to the instance at init time is its only
//! path back into the host.

pub mod bridge;
pub mod config_item;
pub mod connection;
pub mod descriptor;
pub mod error;
pub mod lifecycle;
pub mod loader;
pub mod manager;
pub mod status;
pub mod store;
pub mod supervisor;
pub mod watchdog;

pub use {
    bridge::{ConnectionContext, HostBridge, ParaboxBridge, ParaboxConnection},
    config_item::{ConfigItem, InputType},
    connection::{
        ActiveConnection, Connection, ConnectionConfig, ConnectionRecord, ConnectionState,
        FailedConnection, HostContext, PendingConnection,
    },
    descriptor::{ExtensionDescriptor, ExtensionError, ExternalPackage, LoadError, Provenance},
    error::{Error, Result},
    lifecycle::{LifecycleEvent, LifecycleSource, LifecycleSubscription},
    loader::{
        ConnectionFactory, DefaultLoader, ExtensionLoader, ScanResult,
        builtin::{BuiltInExtension, BuiltInRegistry},
        resolver::{ClassResolver, CompositeResolver, StaticClassTable},
    },
    manager::{ConnectionManager, ConnectionSummary},
    status::{ConnectionStatus, StatusChannel, StatusReceiver},
    store::{ConnectionStore, MessageStore, ReceiveOutcome, StoredConnection},
    supervisor::TaskSupervisor,
    watchdog::Watchdog,
};

#[cfg(feature = "native")]
pub use loader::native::NativeClassResolver;
