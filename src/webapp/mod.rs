//! Web-app deployment: the application instance, its controller, the
//! prefix-resolving container, versioned rollover, and change detection.

pub mod container;
pub mod controller;
mod core;
pub mod deploy_watch;
pub mod lifecycle;
pub mod versioning;

pub use self::container::WebAppContainer;
pub use self::controller::{RetiredInstance, WebAppController};
pub use self::core::{WebApp, WebAppBuilder};
pub use self::deploy_watch::watch_deployments;
pub use self::lifecycle::{Lifecycle, LifecycleState};
pub use self::versioning::{version_compare, VersioningController};
