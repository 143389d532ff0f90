use crate::wallet::WalletSyncError;

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info, warn};

/// Repository for cached JSON documents addressed by key
#[async_trait::async_trait]
pub trait CacheRepository: Send + Sync {
	/// Write `contents` under `key`, replacing any previous document atomically.
	async fn write(&self, key: &str, contents: String) -> Result<(), WalletSyncError>;

	/// Read the document stored under `key`. Missing or unreadable documents are `None`.
	fn read(&self, key: &str) -> Option<String>;

	fn exists(&self, key: &str) -> bool;

	async fn remove(&self, key: &str) -> Result<(), WalletSyncError>;
}

/// File-based implementation of CacheRepository, one `<key>.json` file per key
pub struct FileCacheRepository {
	data_dir: PathBuf,
	temp_counter: AtomicU64,
}

impl FileCacheRepository {
	pub fn new(data_dir: PathBuf) -> Self {
		Self {
			data_dir,
			temp_counter: AtomicU64::new(0),
		}
	}

	pub fn data_dir(&self) -> &Path {
		&self.data_dir
	}

	/// Keys map to file names, so anything outside `[A-Za-z0-9_-]` becomes `_`.
	fn sanitize_key(key: &str) -> String {
		key.chars()
			.map(|c| {
				if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
					c
				} else {
					'_'
				}
			})
			.collect()
	}

	fn get_cache_filename(&self, key: &str) -> PathBuf {
		self.data_dir
			.join(format!("{}.json", Self::sanitize_key(key)))
	}

	fn get_temp_filename(&self, key: &str) -> PathBuf {
		let n = self.temp_counter.fetch_add(1, Ordering::Relaxed);
		self.data_dir.join(format!(
			".{}.{}.{}.tmp",
			Self::sanitize_key(key),
			std::process::id(),
			n
		))
	}
}

#[async_trait::async_trait]
impl CacheRepository for FileCacheRepository {
	async fn write(&self, key: &str, contents: String) -> Result<(), WalletSyncError> {
		tokio::fs::create_dir_all(&self.data_dir)
			.await
			.map_err(|e| {
				WalletSyncError::PersistenceError(format!("Failed to create cache directory: {}", e))
			})?;

		let filename = self.get_cache_filename(key);
		let temp_filename = self.get_temp_filename(key);

		tokio::fs::write(&temp_filename, contents.as_bytes())
			.await
			.map_err(|e| {
				WalletSyncError::PersistenceError(format!("Failed to write cache file: {}", e))
			})?;

		if let Err(e) = tokio::fs::rename(&temp_filename, &filename).await {
			let _ = tokio::fs::remove_file(&temp_filename).await;
			return Err(WalletSyncError::PersistenceError(format!(
				"Failed to replace cache file {:?}: {}",
				filename, e
			)));
		}

		debug!("Saved cache entry {} to {:?}", key, filename);
		Ok(())
	}

	fn read(&self, key: &str) -> Option<String> {
		let filename = self.get_cache_filename(key);

		match std::fs::read_to_string(&filename) {
			Ok(content) => Some(content),
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
				debug!("No cache entry for {}", key);
				None
			}
			Err(e) => {
				warn!("Failed to read cache file {:?}: {}", filename, e);
				None
			}
		}
	}

	fn exists(&self, key: &str) -> bool {
		self.get_cache_filename(key).exists()
	}

	async fn remove(&self, key: &str) -> Result<(), WalletSyncError> {
		let filename = self.get_cache_filename(key);

		match tokio::fs::remove_file(&filename).await {
			Ok(()) => {
				info!("Removed cache entry {:?}", filename);
				Ok(())
			}
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
			Err(e) => Err(WalletSyncError::PersistenceError(format!(
				"Failed to remove cache file: {}",
				e
			))),
		}
	}
}
