//! lingo daemon: single-instance lock, control socket, HTTP listener.

pub mod dispatcher;
mod error;
pub mod http;
pub mod instance_lock;
pub mod log_rotation;
pub mod paths;
pub mod protocol;
mod runtime;
pub mod server;

pub use dispatcher::{CommandDispatcher, DaemonContext, HeadlessUi, UiSurface};
pub use error::DaemonError;
pub use instance_lock::InstanceLock;
pub use protocol::{ControlClient, ControlCommand, StatusReport};
pub use runtime::{run, start_blocking, DaemonOptions};
pub use server::{CommandHandler, ControlServer};
