pub mod config_io;
pub mod fingerprint;
pub mod lock;
pub mod recovery;
pub mod walk;
pub mod watcher;
