//! 跨进程缓存锁
//!
//! 基于 `fs2` 的建议性文件锁。锁文件本身不保存任何内容。

use crate::error::{Error, Result};
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::time::Instant;

/// 轮询间隔
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// 超时过大时的等待上限
const MAX_WAIT: Duration = Duration::from_secs(86_400);

/// 已持有的缓存锁，离开作用域时释放
#[derive(Debug)]
pub struct CacheLock {
    file: File,
    path: PathBuf,
}

impl CacheLock {
    /// 在超时时间内获取排他锁
    ///
    /// # Errors
    ///
    /// 超时返回 [`Error::LockTimeout`]，无法打开锁文件时返回 IO 错误
    pub async fn acquire(path: &Path, timeout: Duration) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(path)?;

        let deadline = Instant::now() + timeout.min(MAX_WAIT);
        loop {
            match file.try_lock_exclusive() {
                Ok(()) => {
                    return Ok(Self {
                        file,
                        path: path.to_path_buf(),
                    })
                }
                Err(e) if is_contended(&e) => {
                    if Instant::now() >= deadline {
                        return Err(Error::LockTimeout(path.display().to_string()));
                    }
                    tokio::time::sleep(POLL_INTERVAL).await;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// 锁文件路径
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for CacheLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            tracing::warn!("Error releasing lock {}: {e}", self.path.display());
        }
    }
}

fn is_contended(err: &std::io::Error) -> bool {
    err.kind() == ErrorKind::WouldBlock || err.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_lock_is_exclusive_and_released_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".lock");

        let held = CacheLock::acquire(&path, Duration::from_secs(1)).await.unwrap();
        assert_eq!(held.path(), path.as_path());

        let contended = CacheLock::acquire(&path, Duration::from_millis(200)).await;
        assert!(matches!(contended, Err(Error::LockTimeout(_))));

        drop(held);
        assert!(CacheLock::acquire(&path, Duration::from_millis(200)).await.is_ok());
    }

    #[tokio::test]
    async fn test_huge_timeout_does_not_overflow() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".lock");
        assert!(CacheLock::acquire(&path, Duration::from_secs(u64::MAX)).await.is_ok());
    }
}
