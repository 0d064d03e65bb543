//! Size-rotated request log file.
//!
//! Records request metadata (route, conversation id, query) to a plain-text
//! log under the configured directory. Writes go through an mpsc channel to
//! a dedicated writer task so handlers never block on file I/O. The active
//! file rotates once it grows past the configured size, keeping a bounded
//! number of numbered backups; backups older than the retention window are
//! removed at startup.

use crate::core::config::LogConfig;
use chrono::Utc;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tokio::sync::mpsc;

const CHANNEL_CAPACITY: usize = 1024;

/// One request log entry.
#[derive(Debug, Clone)]
pub struct RequestLogRecord {
    pub timestamp: chrono::DateTime<Utc>,
    pub request_id: String,
    pub route: String,
    pub conversation_id: String,
    pub query: String,
}

impl RequestLogRecord {
    fn format_line(&self) -> String {
        format!(
            "{} - {} - [{}] conversation_id={} query={}\n",
            self.timestamp.format("%Y-%m-%d %H:%M:%S%.3f"),
            self.request_id,
            self.route,
            self.conversation_id,
            self.query,
        )
    }
}

/// Handle for submitting request log records.
///
/// Cheap to clone; dropping every handle shuts the writer task down.
#[derive(Clone)]
pub struct RequestLog {
    tx: mpsc::Sender<RequestLogRecord>,
}

impl RequestLog {
    /// Create the log directory, prune expired backups, and spawn the
    /// writer task.
    pub fn start(config: &LogConfig, log_name: &str) -> anyhow::Result<Self> {
        fs::create_dir_all(&config.dir)?;

        let removed = cleanup_old_backups(&config.dir, log_name, config.keep_days)?;
        if removed > 0 {
            tracing::info!(removed, "Removed expired request log backups");
        }

        let mut writer = LogWriter::new(
            config.dir.join(format!("{}.log", log_name)),
            config.max_size_bytes,
            config.backup_count,
        );

        let (tx, mut rx) = mpsc::channel::<RequestLogRecord>(CHANNEL_CAPACITY);
        tokio::spawn(async move {
            while let Some(record) = rx.recv().await {
                if let Err(e) = writer.append(&record.format_line()) {
                    tracing::warn!(error = %e, "Failed to write request log record");
                }
            }
            tracing::debug!("Request log writer task stopped");
        });

        Ok(Self { tx })
    }

    /// A handle whose records go nowhere. Used by tests.
    pub fn disabled() -> Self {
        let (tx, _rx) = mpsc::channel(1);
        Self { tx }
    }

    /// Submit a record. Never blocks; drops the record when the writer is
    /// backed up or gone.
    pub fn record(&self, route: &str, conversation_id: Option<&str>, query: &str) {
        let record = RequestLogRecord {
            timestamp: Utc::now(),
            request_id: crate::core::logging::get_request_id(),
            route: route.to_string(),
            conversation_id: conversation_id.unwrap_or("-").to_string(),
            query: query.to_string(),
        };
        if self.tx.try_send(record).is_err() {
            tracing::warn!("Request log channel full, dropping record");
        }
    }
}

/// Appends lines to the active log file, rotating by size.
///
/// Rotation shifts `name.log.1 -> name.log.2 -> ...` up to the backup
/// count (the oldest backup is discarded), then renames the active file
/// to `name.log.1`.
struct LogWriter {
    path: PathBuf,
    max_size_bytes: u64,
    backup_count: usize,
}

impl LogWriter {
    fn new(path: PathBuf, max_size_bytes: u64, backup_count: usize) -> Self {
        Self {
            path,
            max_size_bytes,
            backup_count,
        }
    }

    fn append(&mut self, line: &str) -> std::io::Result<()> {
        if self.should_rotate(line.len() as u64)? {
            self.rotate()?;
        }

        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(line.as_bytes())
    }

    fn should_rotate(&self, incoming: u64) -> std::io::Result<bool> {
        if self.max_size_bytes == 0 || self.backup_count == 0 {
            return Ok(false);
        }
        match fs::metadata(&self.path) {
            Ok(meta) => Ok(meta.len() + incoming > self.max_size_bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn rotate(&self) -> std::io::Result<()> {
        for i in (1..self.backup_count).rev() {
            let from = self.backup_path(i);
            if from.exists() {
                fs::rename(&from, self.backup_path(i + 1))?;
            }
        }
        fs::rename(&self.path, self.backup_path(1))
    }

    fn backup_path(&self, index: usize) -> PathBuf {
        let mut name = self.path.as_os_str().to_os_string();
        name.push(format!(".{}", index));
        PathBuf::from(name)
    }
}

/// Remove rotated backups older than `keep_days`. Returns how many files
/// were deleted.
fn cleanup_old_backups(dir: &Path, log_name: &str, keep_days: u64) -> anyhow::Result<usize> {
    let prefix = format!("{}.log.", log_name);
    let cutoff = SystemTime::now() - Duration::from_secs(keep_days * 24 * 3600);

    let mut removed = 0;
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if !name.starts_with(&prefix) {
            continue;
        }
        let modified = entry.metadata()?.modified()?;
        if modified < cutoff {
            fs::remove_file(entry.path())?;
            removed += 1;
        }
    }
    Ok(removed)
}
