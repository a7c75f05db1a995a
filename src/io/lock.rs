use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// Advisory lock serializing write-backs across quire processes.
///
/// Held for the duration of one mutation; released when dropped.
#[derive(Debug)]
pub struct WriteLock {
    _file: File,
    path: PathBuf,
}

#[derive(Debug, thiserror::Error)]
pub enum LockError {
    #[error("could not create lock file at {path}: {source}")]
    Create {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("timed out waiting for {path}: another quire process is writing")]
    Timeout { path: PathBuf },
}

impl WriteLock {
    /// Acquire the write lock in the index directory, waiting up to `timeout`.
    pub fn acquire(index_dir: &Path, timeout: Duration) -> Result<Self, LockError> {
        let path = index_dir.join("write.lock");
        let create_err = |source| LockError::Create {
            path: path.clone(),
            source,
        };
        fs::create_dir_all(index_dir).map_err(create_err)?;
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&path)
            .map_err(create_err)?;

        let start = Instant::now();
        loop {
            match try_lock(&file) {
                Ok(()) => return Ok(WriteLock { _file: file, path }),
                Err(_) if start.elapsed() < timeout => {
                    std::thread::sleep(Duration::from_millis(10));
                }
                Err(_) => return Err(LockError::Timeout { path }),
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(unix)]
fn try_lock(file: &File) -> std::io::Result<()> {
    use std::os::unix::io::AsRawFd;
    let result = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
    if result == 0 {
        Ok(())
    } else {
        Err(std::io::Error::last_os_error())
    }
}

#[cfg(not(unix))]
fn try_lock(_file: &File) -> std::io::Result<()> {
    Ok(())
}
