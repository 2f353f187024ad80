//! File sink with interval-based rotation
//!
//! Lines are appended to `<log_path>/audit.log`. Once `rotate_interval` has
//! elapsed since the first event was written, the file is moved into
//! `archive_path` as `<hostname>-<open time>-audit.log` and a fresh file is
//! started on the next write. A non-empty live file left behind by a
//! previous run is archived when the sink is created.

use chrono::{DateTime, Local};
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use super::{AuditSink, SinkError};
use crate::audit::config::AuditConfig;
use crate::audit::timestamp::{format_timestamp, is_timestamp_well_formed};

/// Name of the live log file inside `log_path`
pub const LIVE_LOG_NAME: &str = "audit.log";

/// Sink writing newline-delimited audit lines to disk
#[derive(Debug)]
pub struct FileSink {
    hostname: String,
    log_path: PathBuf,
    archive_path: PathBuf,
    rotate_interval: Duration,
    writer: Option<BufWriter<File>>,
    open_time: Option<String>,
    opened_at: Option<Instant>,
}

impl FileSink {
    /// Create the sink, archiving any live file a previous run left behind
    pub fn new(config: &AuditConfig, hostname: impl Into<String>) -> Result<Self, SinkError> {
        let sink = Self {
            hostname: hostname.into(),
            log_path: config.log_path.clone(),
            archive_path: config.archive_path.clone(),
            rotate_interval: config.rotate_interval_duration(),
            writer: None,
            open_time: None,
            opened_at: None,
        };
        create_dir(&sink.log_path)?;
        sink.archive_leftover()?;
        Ok(sink)
    }

    /// Path of the file currently being written
    pub fn live_path(&self) -> PathBuf {
        self.log_path.join(LIVE_LOG_NAME)
    }

    fn archive_leftover(&self) -> Result<(), SinkError> {
        let live = self.live_path();
        let metadata = match fs::metadata(&live) {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(source) => return Err(SinkError::Attributes { path: live, source }),
        };

        if metadata.len() == 0 {
            return fs::remove_file(&live)
                .map_err(|source| SinkError::Remove { path: live, source });
        }

        let modified = metadata
            .modified()
            .map_err(|source| SinkError::Attributes {
                path: live.clone(),
                source,
            })?;
        let stamp = format_timestamp(DateTime::<Local>::from(modified).fixed_offset());
        tracing::info!(path = %live.display(), "Archiving audit log left by a previous run");
        self.move_to_archive(&live, &stamp)
    }

    fn archive_name(&self, open_time: &str, attempt: u32) -> String {
        let stamp = open_time.replace(':', "-");
        match attempt {
            0 => format!("{}-{}-{}", self.hostname, stamp, LIVE_LOG_NAME),
            n => format!("{}-{}-{}-{}", self.hostname, stamp, n, LIVE_LOG_NAME),
        }
    }

    /// First archive path for `open_time` not already taken
    fn archive_target(&self, open_time: &str) -> Result<PathBuf, SinkError> {
        let mut attempt = 0;
        loop {
            let target = self.archive_path.join(self.archive_name(open_time, attempt));
            let taken = target.try_exists().map_err(|source| SinkError::Attributes {
                path: target.clone(),
                source,
            })?;
            if !taken {
                return Ok(target);
            }
            attempt += 1;
        }
    }

    fn move_to_archive(&self, live: &Path, open_time: &str) -> Result<(), SinkError> {
        create_dir(&self.archive_path)?;
        let target = self.archive_target(open_time)?;
        fs::rename(live, &target).map_err(|source| SinkError::Rename {
            from: live.to_path_buf(),
            to: target.clone(),
            source,
        })?;
        tracing::info!(archive = %target.display(), "Audit log rotated");
        Ok(())
    }

    fn writer(&mut self) -> Result<&mut BufWriter<File>, SinkError> {
        if self.writer.is_none() {
            let live = self.live_path();
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&live)
                .map_err(|source| SinkError::Open { path: live, source })?;
            self.writer = Some(BufWriter::new(file));
        }
        match self.writer.as_mut() {
            Some(writer) => Ok(writer),
            None => Err(SinkError::Closed),
        }
    }

    fn flush(&mut self) -> Result<(), SinkError> {
        let live = self.live_path();
        if let Some(writer) = self.writer.as_mut() {
            writer
                .flush()
                .map_err(|source| SinkError::Write { path: live, source })?;
        }
        Ok(())
    }

    /// Close the live file and move it into the archive directory
    pub fn rotate(&mut self) -> Result<(), SinkError> {
        let writer = self.writer.take();
        let open_time = self.open_time.take();
        self.opened_at = None;

        let live = self.live_path();
        if let Some(mut writer) = writer {
            writer.flush().map_err(|source| SinkError::Write {
                path: live.clone(),
                source,
            })?;
        }
        let Some(open_time) = open_time else {
            return Ok(());
        };
        if !live.exists() {
            return Ok(());
        }
        self.move_to_archive(&live, &open_time)
    }
}

impl AuditSink for FileSink {
    fn open_time_is_set(&self) -> bool {
        self.open_time.is_some()
    }

    fn set_open_time(&mut self, timestamp: &str) -> Result<(), SinkError> {
        if !is_timestamp_well_formed(timestamp) {
            return Err(SinkError::OpenTime {
                timestamp: timestamp.to_string(),
            });
        }
        self.open_time = Some(timestamp.to_string());
        self.opened_at = Some(Instant::now());
        Ok(())
    }

    fn write_line(&mut self, line: &str, sync: bool) -> Result<(), SinkError> {
        let live = self.live_path();
        let writer = self.writer()?;
        append_line(writer, line, sync).map_err(|source| SinkError::Write { path: live, source })
    }

    fn reconfigure(&mut self, config: &AuditConfig) -> Result<(), SinkError> {
        if config.log_path != self.log_path {
            self.rotate()?;
            self.log_path = config.log_path.clone();
            create_dir(&self.log_path)?;
        }
        self.archive_path = config.archive_path.clone();
        self.rotate_interval = config.rotate_interval_duration();
        Ok(())
    }

    fn time_to_rotation(&self) -> Option<Duration> {
        self.opened_at
            .map(|opened| self.rotate_interval.saturating_sub(opened.elapsed()))
    }

    fn rotate_if_due(&mut self) -> Result<(), SinkError> {
        match self.time_to_rotation() {
            Some(remaining) if remaining.is_zero() => self.rotate(),
            _ => Ok(()),
        }
    }

    fn close(&mut self) -> Result<(), SinkError> {
        self.flush()?;
        self.writer = None;
        Ok(())
    }
}

fn append_line(writer: &mut BufWriter<File>, line: &str, sync: bool) -> std::io::Result<()> {
    writer.write_all(line.as_bytes())?;
    writer.write_all(b"\n")?;
    if sync {
        writer.flush()?;
        writer.get_ref().sync_data()?;
    }
    Ok(())
}

fn create_dir(path: &Path) -> Result<(), SinkError> {
    fs::create_dir_all(path).map_err(|source| SinkError::Open {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_in(dir: &Path) -> AuditConfig {
        AuditConfig {
            log_path: dir.join("logs"),
            archive_path: dir.join("archive"),
            ..Default::default()
        }
    }

    fn archived(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(dir.join("archive"))
            .map(|entries| {
                entries
                    .filter_map(|e| e.ok())
                    .map(|e| e.file_name().to_string_lossy().into_owned())
                    .collect()
            })
            .unwrap_or_default();
        names.sort();
        names
    }

    #[test]
    fn test_write_and_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = FileSink::new(&config_in(dir.path()), "node1").unwrap();

        sink.set_open_time("2024-01-01T00:00:00.000Z").unwrap();
        sink.write_line(r#"{"id":1}"#, false).unwrap();
        sink.write_line(r#"{"id":2}"#, true).unwrap();
        sink.close().unwrap();

        let text = fs::read_to_string(sink.live_path()).unwrap();
        assert_eq!(text, "{\"id\":1}\n{\"id\":2}\n");
    }

    #[test]
    fn test_rotate_moves_file_into_archive() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = FileSink::new(&config_in(dir.path()), "node1").unwrap();

        sink.set_open_time("2024-01-01T10:20:30.000Z").unwrap();
        sink.write_line("line", false).unwrap();
        sink.rotate().unwrap();

        assert!(!sink.open_time_is_set());
        assert!(sink.time_to_rotation().is_none());
        assert!(!sink.live_path().exists());
        assert_eq!(
            archived(dir.path()),
            vec!["node1-2024-01-01T10-20-30.000Z-audit.log"]
        );
    }

    #[test]
    fn test_rotations_with_same_open_time_keep_every_archive() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = FileSink::new(&config_in(dir.path()), "node1").unwrap();

        for text in ["first file", "second file", "third file"] {
            sink.set_open_time("2024-01-01T00:00:00.000Z").unwrap();
            sink.write_line(text, false).unwrap();
            sink.rotate().unwrap();
        }

        assert_eq!(
            archived(dir.path()),
            vec![
                "node1-2024-01-01T00-00-00.000Z-1-audit.log",
                "node1-2024-01-01T00-00-00.000Z-2-audit.log",
                "node1-2024-01-01T00-00-00.000Z-audit.log",
            ]
        );
        let archive = dir.path().join("archive");
        let read = |name: &str| fs::read_to_string(archive.join(name)).unwrap();
        assert_eq!(read("node1-2024-01-01T00-00-00.000Z-audit.log"), "first file\n");
        assert_eq!(read("node1-2024-01-01T00-00-00.000Z-1-audit.log"), "second file\n");
        assert_eq!(read("node1-2024-01-01T00-00-00.000Z-2-audit.log"), "third file\n");
    }

    #[test]
    fn test_leftover_archive_does_not_replace_existing_archive() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());

        // Archive one leftover, then plant a second whose mtime may collide
        for text in ["run one\n", "run two\n"] {
            fs::create_dir_all(&config.log_path).unwrap();
            fs::write(config.log_path.join(LIVE_LOG_NAME), text).unwrap();
            FileSink::new(&config, "node1").unwrap();
        }

        let names = archived(dir.path());
        assert_eq!(names.len(), 2);
        let mut contents: Vec<String> = names
            .iter()
            .map(|name| fs::read_to_string(dir.path().join("archive").join(name)).unwrap())
            .collect();
        contents.sort();
        assert_eq!(contents, vec!["run one\n", "run two\n"]);
    }

    #[test]
    fn test_time_to_rotation_counts_down_from_open_time() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = FileSink::new(&config_in(dir.path()), "node1").unwrap();
        assert!(sink.time_to_rotation().is_none());

        sink.set_open_time("2024-01-01T00:00:00.000Z").unwrap();
        let remaining = sink.time_to_rotation().unwrap();
        assert!(remaining <= Duration::from_secs(86400));
        assert!(remaining > Duration::from_secs(86000));

        // Not due yet, nothing moves
        sink.write_line("line", false).unwrap();
        sink.rotate_if_due().unwrap();
        assert!(archived(dir.path()).is_empty());
    }

    #[test]
    fn test_leftover_file_archived_on_start() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());
        fs::create_dir_all(&config.log_path).unwrap();
        fs::write(config.log_path.join(LIVE_LOG_NAME), "old line\n").unwrap();

        let sink = FileSink::new(&config, "node1").unwrap();
        assert!(!sink.live_path().exists());

        let names = archived(dir.path());
        assert_eq!(names.len(), 1);
        assert!(names[0].starts_with("node1-"));
        assert!(names[0].ends_with("-audit.log"));
    }

    #[test]
    fn test_reconfigure_to_new_log_path_rotates() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = FileSink::new(&config_in(dir.path()), "node1").unwrap();
        sink.set_open_time("2024-01-01T00:00:00.000Z").unwrap();
        sink.write_line("before", false).unwrap();

        let moved = AuditConfig {
            log_path: dir.path().join("logs2"),
            archive_path: dir.path().join("archive"),
            rotate_interval: 3600,
            ..Default::default()
        };
        sink.reconfigure(&moved).unwrap();
        assert_eq!(archived(dir.path()).len(), 1);

        sink.write_line("after", false).unwrap();
        sink.close().unwrap();
        assert_eq!(
            fs::read_to_string(dir.path().join("logs2").join(LIVE_LOG_NAME)).unwrap(),
            "after\n"
        );
    }

    #[test]
    fn test_malformed_open_time_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = FileSink::new(&config_in(dir.path()), "node1").unwrap();
        let err = sink.set_open_time("01/01/2024").unwrap_err();
        assert!(matches!(err, SinkError::OpenTime { .. }));
        assert!(!sink.open_time_is_set());
    }
}
