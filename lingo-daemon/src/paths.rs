use std::path::{Path, PathBuf};

pub const DAEMON_SOCKET: &str = "lingo.sock";
pub const INSTANCE_LOCK: &str = "lingo.lock";

pub const DAEMON_STDOUT_LOG: &str = "daemon.log";
pub const DAEMON_STDERR_LOG: &str = "daemon-err.log";

pub use lingo_core::settings::lingo_root;

pub fn run_dir(home: &Path) -> PathBuf {
    lingo_root(home).join("run")
}

pub fn socket_path(home: &Path) -> PathBuf {
    lingo_root(home).join(DAEMON_SOCKET)
}

pub fn lock_path(home: &Path) -> PathBuf {
    run_dir(home).join(INSTANCE_LOCK)
}

pub fn logs_dir(home: &Path) -> PathBuf {
    lingo_root(home).join("logs")
}

pub fn stdout_log_path(home: &Path) -> PathBuf {
    logs_dir(home).join(DAEMON_STDOUT_LOG)
}

pub fn stderr_log_path(home: &Path) -> PathBuf {
    logs_dir(home).join(DAEMON_STDERR_LOG)
}
