use std::{
    cmp::Reverse,
    fs::{self, File},
    io::Write,
    path::{Path, PathBuf},
};

use chrono::{DateTime, NaiveDateTime, Utc};
use tally_core::{
    storage::{BookBackupInfo, BookStorage},
    CoreError,
};
use tally_domain::Book;

const BOOK_EXTENSION: &str = "json";
const BACKUP_TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";
const TMP_SUFFIX: &str = "tmp";
pub const DEFAULT_RETENTION: usize = 5;

/// Directories a [`JsonBookStorage`] writes to.
#[derive(Debug, Clone)]
pub struct StoragePaths {
    pub book_root: PathBuf,
    pub backup_root: PathBuf,
}

impl StoragePaths {
    /// `books/` and `backups/` under one data root.
    pub fn under(root: &Path) -> Self {
        Self {
            book_root: root.join("books"),
            backup_root: root.join("backups"),
        }
    }
}

/// Filesystem-backed JSON persistence for books and their backups.
#[derive(Clone)]
pub struct JsonBookStorage {
    books_dir: PathBuf,
    backups_dir: PathBuf,
    retention: usize,
}

impl JsonBookStorage {
    pub fn new(paths: StoragePaths) -> Result<Self, CoreError> {
        Self::with_retention(paths, DEFAULT_RETENTION)
    }

    /// Keeps at most `retention` backups per book (never fewer than one).
    pub fn with_retention(paths: StoragePaths, retention: usize) -> Result<Self, CoreError> {
        fs::create_dir_all(&paths.book_root)?;
        fs::create_dir_all(&paths.backup_root)?;
        Ok(Self {
            books_dir: paths.book_root,
            backups_dir: paths.backup_root,
            retention: retention.max(1),
        })
    }

    pub fn book_path(&self, name: &str) -> PathBuf {
        self.books_dir
            .join(format!("{}.{}", canonical_name(name), BOOK_EXTENSION))
    }

    pub fn backup_path(&self, name: &str, backup: &str) -> PathBuf {
        self.backup_dir(name).join(backup)
    }

    /// Row counts for every stored book, sorted by name.
    pub fn list_book_metadata(&self) -> Result<Vec<BookMetadata>, CoreError> {
        let mut rows = Vec::new();
        for slug in self.list_books()? {
            let book = self.load_book(&slug)?;
            let entries = book.entries.values();
            let (mut transactions, mut statements) = (0, 0);
            for ledger in entries {
                transactions += ledger.transactions.len();
                statements += ledger.statements.len();
            }
            let path = self.book_path(&slug);
            let modified_at = fs::metadata(&path)
                .and_then(|meta| meta.modified())
                .ok()
                .map(DateTime::<Utc>::from);
            rows.push(BookMetadata {
                slug,
                path,
                modified_at,
                ledger_count: book.ledgers.len(),
                group_count: book.group_count(),
                transaction_count: transactions,
                statement_count: statements,
            });
        }
        rows.sort_by(|a, b| a.slug.cmp(&b.slug));
        Ok(rows)
    }

    pub fn list_backup_metadata(&self, name: &str) -> Result<Vec<BackupMetadata>, CoreError> {
        let mut rows = Vec::new();
        for entry in self.list_backups(name)? {
            let size_bytes = fs::metadata(&entry.path)
                .map(|meta| meta.len())
                .unwrap_or(0);
            rows.push(BackupMetadata {
                name: entry.id.clone(),
                created_at: parse_backup_timestamp(&entry.id),
                size_bytes,
                path: entry.path,
            });
        }
        rows.sort_by_key(|meta| Reverse(meta.created_at));
        Ok(rows)
    }

    pub fn delete_backup(&self, name: &str, backup_id: &str) -> Result<(), CoreError> {
        let path = self.backup_path(name, backup_id);
        if path.exists() {
            fs::remove_file(path)?;
        }
        Ok(())
    }

    fn backup_dir(&self, name: &str) -> PathBuf {
        self.backups_dir.join(canonical_name(name))
    }

    fn backup_stem(name: &str, note: Option<&str>) -> (String, String) {
        let timestamp = Utc::now().format(BACKUP_TIMESTAMP_FORMAT).to_string();
        let mut stem = format!("{}_{}", canonical_name(name), timestamp);
        if let Some(label) = sanitize_backup_note(note) {
            stem.push('_');
            stem.push_str(&label);
        }
        (stem, timestamp)
    }

    fn write_backup_file(
        &self,
        book: &Book,
        name: &str,
        note: Option<&str>,
    ) -> Result<BookBackupInfo, CoreError> {
        let dir = self.backup_dir(name);
        fs::create_dir_all(&dir)?;
        let (stem, timestamp) = Self::backup_stem(name, note);
        let file_name = format!("{}.{}", stem, BOOK_EXTENSION);
        let path = dir.join(&file_name);
        let tmp = tmp_path(&path);
        write_file(&tmp, &serialize_book(book)?)?;
        fs::rename(&tmp, &path)?;
        self.prune_backups(name)?;
        Ok(BookBackupInfo {
            book: canonical_name(name),
            id: file_name,
            created_at: timestamp,
            path,
        })
    }

    /// Copies the current file aside before it is overwritten.
    fn backup_existing_file(&self, name: &str, path: &Path) -> Result<(), CoreError> {
        if !path.exists() {
            return Ok(());
        }
        let dir = self.backup_dir(name);
        fs::create_dir_all(&dir)?;
        let (stem, _) = Self::backup_stem(name, None);
        fs::copy(path, dir.join(format!("{}.{}", stem, BOOK_EXTENSION)))?;
        self.prune_backups(name)?;
        Ok(())
    }

    fn prune_backups(&self, name: &str) -> Result<(), CoreError> {
        let entries = self.list_backups(name)?;
        for entry in entries.into_iter().skip(self.retention) {
            let _ = fs::remove_file(entry.path);
        }
        Ok(())
    }
}

impl BookStorage for JsonBookStorage {
    fn save_book(&self, name: &str, book: &Book) -> Result<(), CoreError> {
        let path = self.book_path(name);
        self.backup_existing_file(name, &path)?;
        save_book_to_path(book, &path)
    }

    fn load_book(&self, name: &str) -> Result<Book, CoreError> {
        load_book_from_path(&self.book_path(name))
    }

    fn list_books(&self) -> Result<Vec<String>, CoreError> {
        if !self.books_dir.exists() {
            return Ok(Vec::new());
        }
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.books_dir)? {
            let path = entry?.path();
            if !path.is_file()
                || path.extension().and_then(|ext| ext.to_str()) != Some(BOOK_EXTENSION)
            {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) {
                names.push(stem.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    fn delete_book(&self, name: &str) -> Result<(), CoreError> {
        let path = self.book_path(name);
        if path.exists() {
            fs::remove_file(path)?;
        }
        Ok(())
    }

    fn save_book_to_path(&self, book: &Book, path: &Path) -> Result<(), CoreError> {
        if path.starts_with(&self.books_dir) {
            if let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) {
                self.backup_existing_file(stem, path)?;
            }
        }
        save_book_to_path(book, path)
    }

    fn load_book_from_path(&self, path: &Path) -> Result<Book, CoreError> {
        load_book_from_path(path)
    }

    fn backup_book(
        &self,
        name: &str,
        book: &Book,
        note: Option<&str>,
    ) -> Result<BookBackupInfo, CoreError> {
        self.write_backup_file(book, name, note)
    }

    /// Backups newest first.
    fn list_backups(&self, name: &str) -> Result<Vec<BookBackupInfo>, CoreError> {
        let dir = self.backup_dir(name);
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let slug = canonical_name(name);
        let mut entries = Vec::new();
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(BOOK_EXTENSION) {
                continue;
            }
            if let Some(file_name) = path.file_name().and_then(|name| name.to_str()) {
                let created_at = parse_backup_timestamp(file_name)
                    .map(|at| at.format(BACKUP_TIMESTAMP_FORMAT).to_string())
                    .unwrap_or_default();
                entries.push(BookBackupInfo {
                    book: slug.clone(),
                    id: file_name.to_string(),
                    created_at,
                    path: path.clone(),
                });
            }
        }
        entries.sort_by(|a, b| {
            parse_backup_timestamp(&b.id)
                .cmp(&parse_backup_timestamp(&a.id))
                .then_with(|| b.id.cmp(&a.id))
        });
        Ok(entries)
    }

    fn restore_backup(&self, backup: &BookBackupInfo) -> Result<Book, CoreError> {
        if !backup.path.exists() {
            return Err(CoreError::Storage(format!(
                "backup `{}` not found",
                backup.id
            )));
        }
        let book = load_book_from_path(&backup.path)?;
        self.save_book(&backup.book, &book)?;
        Ok(book)
    }
}

/// Saves a book to an arbitrary path using a temporary file and rename.
pub fn save_book_to_path(book: &Book, path: &Path) -> Result<(), CoreError> {
    let tmp = tmp_path(path);
    write_file(&tmp, &serialize_book(book)?)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

pub fn load_book_from_path(path: &Path) -> Result<Book, CoreError> {
    let data = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&data)?)
}

#[derive(Debug, Clone)]
pub struct BookMetadata {
    pub slug: String,
    pub path: PathBuf,
    pub modified_at: Option<DateTime<Utc>>,
    pub ledger_count: usize,
    pub group_count: usize,
    pub transaction_count: usize,
    pub statement_count: usize,
}

#[derive(Debug, Clone)]
pub struct BackupMetadata {
    pub name: String,
    pub created_at: Option<DateTime<Utc>>,
    pub size_bytes: u64,
    pub path: PathBuf,
}

fn canonical_name(name: &str) -> String {
    let sanitized: String = name
        .trim()
        .to_lowercase()
        .chars()
        .map(|c| match c {
            'a'..='z' | '0'..='9' => c,
            _ => '_',
        })
        .collect();
    if sanitized.trim_matches('_').is_empty() {
        "book".into()
    } else {
        sanitized
    }
}

fn sanitize_backup_note(note: Option<&str>) -> Option<String> {
    let raw = note?.trim();
    let mut sanitized = String::new();
    let mut last_dash = false;
    for ch in raw.chars() {
        if ch.is_ascii_alphanumeric() {
            sanitized.push(ch.to_ascii_lowercase());
            last_dash = false;
        } else if (ch.is_whitespace() || matches!(ch, '-' | '.' | '_'))
            && !sanitized.is_empty()
            && !last_dash
        {
            sanitized.push('-');
            last_dash = true;
        }
    }
    let trimmed = sanitized.trim_matches('-');
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Reads the `YYYYmmdd_HHMMSS` stamp that follows the book slug.
fn parse_backup_timestamp(file_name: &str) -> Option<DateTime<Utc>> {
    let stem = file_name.strip_suffix(&format!(".{}", BOOK_EXTENSION))?;
    let segments: Vec<&str> = stem.split('_').collect();
    segments.windows(2).rev().find_map(|pair| {
        let (date, time) = (pair[0], pair[1]);
        if !is_digits(date, 8) || !is_digits(time, 6) {
            return None;
        }
        NaiveDateTime::parse_from_str(&format!("{date}{time}"), "%Y%m%d%H%M%S")
            .ok()
            .map(|naive| DateTime::from_naive_utc_and_offset(naive, Utc))
    })
}

fn is_digits(value: &str, len: usize) -> bool {
    value.len() == len && value.chars().all(|c| c.is_ascii_digit())
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut tmp = path.to_path_buf();
    let ext = match path.extension().and_then(|ext| ext.to_str()) {
        Some(existing) => format!("{}.{}", existing, TMP_SUFFIX),
        None => TMP_SUFFIX.to_string(),
    };
    tmp.set_extension(ext);
    tmp
}

fn write_file(path: &Path, data: &str) -> Result<(), CoreError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut file = File::create(path)?;
    file.write_all(data.as_bytes())?;
    file.sync_all()?;
    Ok(())
}

fn serialize_book(book: &Book) -> Result<String, CoreError> {
    Ok(serde_json::to_string_pretty(book)?)
}
