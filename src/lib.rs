//! `notifyd`: an outbound DNS NOTIFY dispatcher (RFC 1996, primary side).
//!
//! The dispatch engine (admission, the per-zone state machine, the event
//! loop) lives in [`dispatch`]; [`wire`] is the NOTIFY codec; [`zone`] is the
//! data source contract the resolver consumes. [`config`], [`error`],
//! [`metrics`], and [`http_server`] are the ambient stack around that core.

pub mod config;
pub mod dispatch;
pub mod error;
pub mod http_server;
pub mod metrics;
pub mod wire;
pub mod zone;

pub use config::NotifyConfig;
pub use dispatch::{Dispatcher, DispatcherHandle};
pub use error::{NotifyError, Result};
