//! # Virtual Startup Client
//!
//! Real-time client core for the Virtual Startup multi-agent dashboard.
//!
//! ## Modules
//!
//! - [`live`]: One shared connection to the event server, reconnect policy,
//!   listener registry and live bindings
//! - [`dashboard`]: Agents, chats, workflows, stats and the feeds that keep
//!   them current
//! - [`api`]: REST client for initial data loads
//! - [`config`]: TOML file plus environment configuration
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use vstartup::dashboard::ActivityFeed;
//! use vstartup::live::{ConnectionManager, ReconnectPolicy, SocketIoConnector};
//!
//! #[tokio::main]
//! async fn main() {
//!     let manager = ConnectionManager::new(
//!         "http://localhost:5000",
//!         Arc::new(SocketIoConnector::new()),
//!         ReconnectPolicy::default(),
//!     );
//!
//!     // Activating a feed opens the connection if needed
//!     let feed = ActivityFeed::activate(&manager);
//!
//!     tokio::time::sleep(std::time::Duration::from_secs(10)).await;
//!     println!("{} activity entries", feed.len());
//!
//!     manager.disconnect();
//! }
//! ```

pub mod api;
pub mod config;
pub mod dashboard;
pub mod live;

// Re-export top-level types for convenience
pub use api::{ApiClient, ApiError};

pub use config::{Config, ConfigError};

pub use live::{
    ConnectionManager, ConnectionState, LiveBinding, LiveOptions, ReconnectPolicy, Subscription,
};
