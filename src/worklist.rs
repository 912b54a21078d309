use chrono::Utc;
use rusqlite::{Connection, params};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::error::{Result, TarjimError};

const VIDEO_EXTENSIONS: [&str; 7] = ["mp4", "avi", "mov", "mkv", "wmv", "flv", "webm"];

/// One video file to process. Created by the orchestrator when scanning the
/// worklist and dropped when the batch finishes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    pub path: PathBuf,
    pub output_path: PathBuf,
}

impl WorkItem {
    pub fn new(path: PathBuf, target_language: &str) -> Self {
        let output_path = translated_subtitle_path(&path, target_language);
        Self { path, output_path }
    }

    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| self.path.display().to_string())
    }
}

/// Derive the target subtitle path: same directory and base name, with the
/// target-language suffix (`movie.mkv` -> `movie.ar.srt`).
pub fn translated_subtitle_path(video_path: &Path, target_language: &str) -> PathBuf {
    let stem = video_path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    video_path.with_file_name(format!("{}.{}.srt", stem, target_language))
}

/// Ordered source of untranslated media paths.
#[cfg_attr(test, mockall::automock)]
pub trait WorklistSource: Send + Sync {
    fn pending(&self) -> Result<Vec<PathBuf>>;
}

/// Per-file outcome record, keyed by path. Side effect outside the
/// orchestrator's own state; failures to record are logged, not retried.
#[cfg_attr(test, mockall::automock)]
pub trait OutcomeSink: Send + Sync {
    fn record_success(&self, path: &Path, degraded_chunks: usize) -> Result<()>;
    fn record_failure(&self, path: &Path, error: &str) -> Result<()>;
}

/// SQLite-backed media library holding the worklist and per-file outcomes.
pub struct SqliteLibrary {
    conn: Mutex<Connection>,
}

impl SqliteLibrary {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS media_files (
                path TEXT PRIMARY KEY,
                translated INTEGER NOT NULL DEFAULT 0,
                degraded_chunks INTEGER NOT NULL DEFAULT 0,
                last_error TEXT,
                completed_at TEXT
            );
            "#,
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| TarjimError::Orchestrator("library mutex poisoned".to_string()))
    }

    /// Insert or refresh one media file record.
    pub fn upsert(&self, path: &Path, translated: bool) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            r#"
            INSERT INTO media_files (path, translated) VALUES (?1, ?2)
            ON CONFLICT(path) DO UPDATE SET translated = excluded.translated
            "#,
            params![path.to_string_lossy(), translated],
        )?;
        Ok(())
    }

    pub fn count(&self) -> Result<usize> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM media_files", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

impl WorklistSource for SqliteLibrary {
    fn pending(&self) -> Result<Vec<PathBuf>> {
        let conn = self.lock()?;
        let mut stmt =
            conn.prepare("SELECT path FROM media_files WHERE translated = 0 ORDER BY path")?;
        let paths = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(paths.into_iter().map(PathBuf::from).collect())
    }
}

impl OutcomeSink for SqliteLibrary {
    fn record_success(&self, path: &Path, degraded_chunks: usize) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            r#"
            UPDATE media_files
            SET translated = 1, degraded_chunks = ?2, last_error = NULL, completed_at = ?3
            WHERE path = ?1
            "#,
            params![
                path.to_string_lossy(),
                degraded_chunks as i64,
                Utc::now().to_rfc3339()
            ],
        )?;
        Ok(())
    }

    fn record_failure(&self, path: &Path, error: &str) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "UPDATE media_files SET translated = 0, last_error = ?2 WHERE path = ?1",
            params![path.to_string_lossy(), error],
        )?;
        Ok(())
    }
}

/// Walk a directory tree into the library, marking files whose translated
/// subtitle already exists. Subtitles carrying one of the configured legacy
/// suffixes are renamed to the target suffix first, so earlier tooling's
/// output counts as translated. Returns the number of video files seen.
pub fn scan_directory(
    library: &SqliteLibrary,
    dir: &Path,
    target_language: &str,
    legacy_suffixes: &[String],
) -> Result<usize> {
    if !dir.is_dir() {
        return Err(TarjimError::Config(format!(
            "Scan path is not a directory: {}",
            dir.display()
        )));
    }

    let mut seen = 0;
    for entry in WalkDir::new(dir).into_iter().filter_map(|e| e.ok()) {
        let path = entry.path();
        let Some(extension) = path.extension().and_then(|e| e.to_str()) else {
            continue;
        };
        if !VIDEO_EXTENSIONS.contains(&extension.to_lowercase().as_str()) {
            continue;
        }

        let target = translated_subtitle_path(path, target_language);
        if !target.exists() {
            adopt_legacy_subtitle(path, &target, target_language, legacy_suffixes)?;
        }

        let translated = target.exists();
        library.upsert(path, translated)?;
        seen += 1;
        debug!("Scanned {} (translated: {})", path.display(), translated);
    }

    info!("Scan of {} found {} video file(s)", dir.display(), seen);
    Ok(seen)
}

/// Rename the first matching legacy-suffixed subtitle to the target path.
fn adopt_legacy_subtitle(
    video_path: &Path,
    target: &Path,
    target_language: &str,
    legacy_suffixes: &[String],
) -> Result<()> {
    for suffix in legacy_suffixes {
        if suffix == target_language {
            continue;
        }
        let legacy = translated_subtitle_path(video_path, suffix);
        if legacy.exists() {
            std::fs::rename(&legacy, target)?;
            info!(
                "Adopted legacy subtitle {} as {}",
                legacy.display(),
                target.display()
            );
            break;
        }
    }
    Ok(())
}

/// Read the exclusion list: one absolute path per line. A missing file means
/// an empty blacklist.
pub fn read_blacklist(path: &Path) -> HashSet<PathBuf> {
    match std::fs::read_to_string(path) {
        Ok(content) => content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(PathBuf::from)
            .collect(),
        Err(_) => HashSet::new(),
    }
}
