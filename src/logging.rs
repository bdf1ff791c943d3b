//! Log file sink.
//!
//! Everything goes through `tracing`. [`init`] installs a subscriber writing
//! plain-text lines to a size-rotated file, `trading_bot.log` then
//! `trading_bot.log.1` through `.N` for older content.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::Level;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;

use crate::Result;
use crate::error::{Error, Kind};
use crate::settings::LogSettings;

/// Installs the global subscriber. `RUST_LOG` wins over `level` when set.
pub fn init(settings: &LogSettings, level: Level) -> Result<()> {
    let file = RotatingFile::open(settings)?;
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_str().to_ascii_lowercase()));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_target(true)
                .with_writer(Mutex::new(file)),
        )
        .try_init()
        .map_err(|e| Error::with_source(Kind::Internal, e))
}

/// Append-only file that rolls over once it would exceed `max_bytes`.
#[derive(Debug)]
pub struct RotatingFile {
    path: PathBuf,
    file: File,
    written: u64,
    max_bytes: u64,
    backups: usize,
}

impl RotatingFile {
    pub fn open(settings: &LogSettings) -> io::Result<Self> {
        fs::create_dir_all(&settings.dir)?;
        let path = settings.path();
        let file = append(&path)?;
        let written = file.metadata()?.len();

        Ok(Self {
            path,
            file,
            written,
            max_bytes: settings.max_bytes,
            backups: settings.backups,
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn backup(&self, index: usize) -> PathBuf {
        let mut name = self.path.clone().into_os_string();
        name.push(format!(".{index}"));
        PathBuf::from(name)
    }

    fn rotate(&mut self) -> io::Result<()> {
        self.file.flush()?;

        if self.backups == 0 {
            self.file = File::create(&self.path)?;
            self.written = 0;
            return Ok(());
        }

        let oldest = self.backup(self.backups);
        if oldest.exists() {
            fs::remove_file(&oldest)?;
        }
        for index in (1..self.backups).rev() {
            let from = self.backup(index);
            if from.exists() {
                fs::rename(&from, self.backup(index + 1))?;
            }
        }
        fs::rename(&self.path, self.backup(1))?;

        self.file = append(&self.path)?;
        self.written = 0;
        Ok(())
    }
}

impl Write for RotatingFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let incoming = u64::try_from(buf.len()).unwrap_or(u64::MAX);
        if self.written > 0 && self.written.saturating_add(incoming) > self.max_bytes {
            self.rotate()?;
        }

        let n = self.file.write(buf)?;
        self.written = self
            .written
            .saturating_add(u64::try_from(n).unwrap_or(u64::MAX));
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

fn append(path: &Path) -> io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(dir: &Path, max_bytes: u64, backups: usize) -> LogSettings {
        LogSettings {
            dir: dir.join("logs"),
            file_name: "bot.log".to_owned(),
            max_bytes,
            backups,
        }
    }

    #[test]
    fn creates_the_directory_and_appends() -> anyhow::Result<()> {
        let tmp = tempfile::tempdir()?;
        let settings = settings(tmp.path(), 1024, 2);

        let mut file = RotatingFile::open(&settings)?;
        file.write_all(b"first\n")?;
        drop(file);

        let mut file = RotatingFile::open(&settings)?;
        file.write_all(b"second\n")?;
        file.flush()?;

        assert_eq!(fs::read_to_string(settings.path())?, "first\nsecond\n");
        Ok(())
    }

    #[test]
    fn rolls_over_and_keeps_a_bounded_number_of_backups() -> anyhow::Result<()> {
        let tmp = tempfile::tempdir()?;
        let settings = settings(tmp.path(), 10, 2);
        let mut file = RotatingFile::open(&settings)?;

        for line in ["aaaaaaaa\n", "bbbbbbbb\n", "cccccccc\n", "dddddddd\n"] {
            file.write_all(line.as_bytes())?;
        }
        file.flush()?;

        let base = file.path().to_path_buf();
        assert_eq!(fs::read_to_string(&base)?, "dddddddd\n");
        assert_eq!(fs::read_to_string(file.backup(1))?, "cccccccc\n");
        assert_eq!(fs::read_to_string(file.backup(2))?, "bbbbbbbb\n");
        assert!(!file.backup(3).exists(), "only two backups are kept");
        Ok(())
    }

    #[test]
    fn without_backups_the_file_is_truncated() -> anyhow::Result<()> {
        let tmp = tempfile::tempdir()?;
        let settings = settings(tmp.path(), 10, 0);
        let mut file = RotatingFile::open(&settings)?;

        file.write_all(b"aaaaaaaa\n")?;
        file.write_all(b"bbbbbbbb\n")?;
        file.flush()?;

        assert_eq!(fs::read_to_string(file.path())?, "bbbbbbbb\n");
        assert!(!file.backup(1).exists(), "no backup written");
        Ok(())
    }
}
