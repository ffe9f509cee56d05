use std::path::{Path, PathBuf};

use anyhow::{Context, bail};

/// Default database location, relative to the working directory.
pub const DEFAULT_DB_URL: &str = "sqlite://exam.sqlite3";

fn is_in_memory(db_url: &str) -> bool {
    db_url == "sqlite::memory:" || db_url.contains("mode=memory")
}

/// Turn a user supplied path or URL into an absolute `sqlite://` URL.
///
/// In-memory URLs and URLs that already carry the `sqlite://` scheme are
/// returned unchanged.
pub fn normalize_sqlite_url(raw: &str) -> String {
    let trimmed = raw.trim();
    if is_in_memory(trimmed) || trimmed.starts_with("sqlite://") {
        return trimmed.to_string();
    }

    let path_str = trimmed.strip_prefix("sqlite:").unwrap_or(trimmed);
    let path = Path::new(path_str);
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(path)
    };
    format!("sqlite://{}", absolute.display())
}

/// Make sure the database file and its directory exist before sqlx opens it.
pub fn prepare_sqlite_file(db_url: &str) -> anyhow::Result<()> {
    if is_in_memory(db_url) {
        return Ok(());
    }

    let Some(rest) = db_url.strip_prefix("sqlite://") else {
        bail!("invalid database url: {db_url}");
    };
    let path = rest.split('?').next().unwrap_or(rest);
    if path.is_empty() {
        bail!("invalid database url: {db_url}");
    }

    let path = Path::new(path);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    if !path.exists() {
        std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(path)
            .with_context(|| format!("creating {}", path.display()))?;
    }
    tracing::debug!(path = %path.display(), "database file ready");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_and_scheme_urls_pass_through() {
        assert_eq!(normalize_sqlite_url("sqlite::memory:"), "sqlite::memory:");
        assert_eq!(
            normalize_sqlite_url("sqlite:file:demo?mode=memory&cache=shared"),
            "sqlite:file:demo?mode=memory&cache=shared"
        );
        assert_eq!(
            normalize_sqlite_url(" sqlite:///tmp/exam.db "),
            "sqlite:///tmp/exam.db"
        );
    }

    #[test]
    fn bare_paths_become_absolute() {
        assert_eq!(normalize_sqlite_url("/var/lib/exam.db"), "sqlite:///var/lib/exam.db");
        assert_eq!(normalize_sqlite_url("sqlite:/data/x.db"), "sqlite:///data/x.db");

        let relative = normalize_sqlite_url("exam.sqlite3");
        assert!(relative.starts_with("sqlite:///"));
        assert!(relative.ends_with("/exam.sqlite3"));
    }

    #[test]
    fn prepare_rejects_urls_without_a_path() {
        assert!(prepare_sqlite_file("sqlite://").is_err());
        assert!(prepare_sqlite_file("postgres://localhost/db").is_err());
        assert!(prepare_sqlite_file("sqlite::memory:").is_ok());
    }

    #[test]
    fn prepare_creates_missing_directories() {
        let dir = std::env::temp_dir().join(format!("exam-prep-{}", std::process::id()));
        let file = dir.join("nested").join("exam.sqlite3");
        let url = format!("sqlite://{}", file.display());

        prepare_sqlite_file(&url).unwrap();
        assert!(file.exists());

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
