//! Persistent state: settings, phrases and the last post time.
//!
//! Reads try the user directory first and fall back to the bundled directory.
//! Writes always go to the user directory, after a free space check, through a
//! temporary file that is renamed into place.

use std::{
    fs,
    path::{Path, PathBuf},
};

use chrono::{DateTime, TimeZone, Utc};
use sysinfo::Disks;
use tracing::{debug, info, warn};

use crate::{
    caption::{fallback_phrases, parse_phrases},
    config::{ConfigFile, Settings},
    error::{ConfigError, StorageError},
};

pub const SETTINGS_FILE: &str = "postfolder.toml";
pub const PHRASES_FILE: &str = "phrases.txt";
pub const LAST_POST_FILE: &str = "last_post_time.json";

pub const REQUIRED_FREE_BYTES: u64 = 10 * 1024 * 1024;

#[derive(Clone, Debug)]
pub struct Store {
    user_dir: PathBuf,
    bundled_dir: PathBuf,
}

impl Store {
    pub fn new(user_dir: impl Into<PathBuf>, bundled_dir: impl Into<PathBuf>) -> Self {
        Self {
            user_dir: user_dir.into(),
            bundled_dir: bundled_dir.into(),
        }
    }

    /// `<local data dir>/postfolder` for user files, the executable's
    /// directory for bundled ones.
    pub fn platform_default() -> Self {
        let user_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("postfolder");
        let bundled_dir = std::env::current_exe()
            .ok()
            .and_then(|p| p.parent().map(Path::to_path_buf))
            .unwrap_or_else(|| PathBuf::from("."));

        Self::new(user_dir, bundled_dir)
    }

    pub fn user_dir(&self) -> &Path {
        &self.user_dir
    }

    pub fn bundled_dir(&self) -> &Path {
        &self.bundled_dir
    }

    pub fn load_settings(&self) -> Result<Settings, ConfigError> {
        let user = self.user_dir.join(SETTINGS_FILE);
        let bundled = self.bundled_dir.join(SETTINGS_FILE);

        let file = match read_config(&user) {
            Some(Ok(file)) => file,
            Some(Err(e)) => {
                warn!("{}, falling back to bundled settings", e);
                bundled_config(&user, &bundled)?
            }
            None => bundled_config(&user, &bundled)?,
        };

        Settings::try_from(file)
    }

    pub fn save_settings(&self, settings: &Settings) -> Result<(), StorageError> {
        self.write_config(&ConfigFile::from(settings))
    }

    /// Writes defaults with empty credentials, the next load asks for configuration.
    pub fn reset_settings(&self) -> Result<(), StorageError> {
        self.write_config(&ConfigFile::default())
    }

    fn write_config(&self, file: &ConfigFile) -> Result<(), StorageError> {
        let text = toml::to_string(file).map_err(|e| StorageError::Encode(e.to_string()))?;
        self.write(SETTINGS_FILE, text.as_bytes())?;
        info!("settings saved to {}", self.user_dir.join(SETTINGS_FILE).display());

        Ok(())
    }

    /// User phrases, then bundled ones, then the built-in fallback.
    pub fn load_phrases(&self) -> Vec<String> {
        for path in [self.user_dir.join(PHRASES_FILE), self.bundled_dir.join(PHRASES_FILE)] {
            match fs::read_to_string(&path) {
                Ok(text) => {
                    let phrases = parse_phrases(&text);
                    if !phrases.is_empty() {
                        return phrases;
                    }
                    debug!("{} has no phrases", path.display());
                }
                Err(e) => debug!("can't read {}: {}", path.display(), e),
            }
        }

        warn!("phrase file '{}' not found, using built-in phrases", PHRASES_FILE);
        fallback_phrases()
    }

    pub fn save_phrases(&self, phrases: &[String]) -> Result<(), StorageError> {
        let mut text = String::new();
        for phrase in phrases {
            text.push_str(phrase);
            text.push('\n');
        }

        self.write(PHRASES_FILE, text.as_bytes())?;
        info!("{} phrases saved", phrases.len());

        Ok(())
    }

    /// Absent or unreadable means never posted.
    pub fn load_last_post_time(&self) -> Option<DateTime<Utc>> {
        let path = self.user_dir.join(LAST_POST_FILE);
        let bytes = match fs::read(&path) {
            Ok(b) => b,
            Err(e) => {
                debug!("no last post time at {}: {}", path.display(), e);
                return None;
            }
        };

        let seconds: f64 = match serde_json::from_slice(&bytes) {
            Ok(s) => s,
            Err(e) => {
                warn!("can't parse {}: {}", path.display(), e);
                return None;
            }
        };

        Utc.timestamp_millis_opt((seconds * 1000.0).round() as i64).single()
    }

    pub fn save_last_post_time(&self, at: DateTime<Utc>) -> Result<(), StorageError> {
        let seconds = at.timestamp_millis() as f64 / 1000.0;
        let text = serde_json::to_string(&seconds).map_err(|e| StorageError::Encode(e.to_string()))?;

        self.write(LAST_POST_FILE, text.as_bytes())
    }

    fn write(&self, name: &str, contents: &[u8]) -> Result<(), StorageError> {
        self.write_with_requirement(name, contents, REQUIRED_FREE_BYTES)
    }

    /// Nothing is touched when the disk has less than `required` bytes free.
    fn write_with_requirement(&self, name: &str, contents: &[u8], required: u64) -> Result<(), StorageError> {
        fs::create_dir_all(&self.user_dir).map_err(io_err(&self.user_dir))?;
        ensure_free_space(&self.user_dir, required)?;

        let path = self.user_dir.join(name);
        let tmp = self.user_dir.join(format!(".{}.tmp", name));

        fs::write(&tmp, contents).map_err(io_err(&tmp))?;
        if let Err(e) = fs::rename(&tmp, &path) {
            let _ = fs::remove_file(&tmp);
            return Err(io_err(&path)(e));
        }

        Ok(())
    }
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> StorageError {
    let path = path.to_path_buf();
    move |source| StorageError::Io { path, source }
}

fn read_config(path: &Path) -> Option<Result<ConfigFile, ConfigError>> {
    let text = match fs::read_to_string(path) {
        Ok(t) => t,
        Err(e) => {
            debug!("can't read {}: {}", path.display(), e);
            return None;
        }
    };

    Some(toml::from_str(&text).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    }))
}

fn bundled_config(user: &Path, bundled: &Path) -> Result<ConfigFile, ConfigError> {
    match read_config(bundled) {
        Some(res) => res,
        None => Err(ConfigError::NotFound(vec![user.to_path_buf(), bundled.to_path_buf()])),
    }
}

/// Refuses when the disk holding `dir` has less than `required` bytes free.
/// A disk that can't be identified is assumed to have room.
pub fn ensure_free_space(dir: &Path, required: u64) -> Result<(), StorageError> {
    let dir = dir.canonicalize().unwrap_or_else(|_| dir.to_path_buf());
    let disks = Disks::new_with_refreshed_list();

    let disk = disks
        .iter()
        .filter(|d| dir.starts_with(d.mount_point()))
        .max_by_key(|d| d.mount_point().as_os_str().len());

    match disk {
        Some(disk) => {
            let available = disk.available_space();
            if available < required {
                return Err(StorageError::DiskSpace {
                    path: dir,
                    available,
                    required,
                });
            }
            debug!("{} bytes available at {}", available, disk.mount_point().display());
            Ok(())
        }
        None => {
            warn!("could not verify free space at {}, writing anyway", dir.display());
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    fn store() -> (TempDir, TempDir, Store) {
        let user = TempDir::new().expect("Should create temp dir");
        let bundled = TempDir::new().expect("Should create temp dir");
        let store = Store::new(user.path().join("postfolder"), bundled.path());
        (user, bundled, store)
    }

    const BUNDLED: &str = "[telegram]\ntoken = \"bundled\"\nchannel_id = \"@b\"\n";

    #[test]
    fn test_settings_missing_everywhere() {
        let (_u, _b, store) = store();
        assert!(matches!(store.load_settings(), Err(ConfigError::NotFound(paths)) if paths.len() == 2));
    }

    #[test]
    fn test_settings_fall_back_to_bundled() {
        let (_u, bundled, store) = store();
        fs::write(bundled.path().join(SETTINGS_FILE), BUNDLED).expect("Should write");

        let settings = store.load_settings().expect("Should load");

        assert_eq!(settings.token, "bundled");
    }

    #[test]
    fn test_user_settings_take_precedence() {
        let (_u, bundled, store) = store();
        fs::write(bundled.path().join(SETTINGS_FILE), BUNDLED).expect("Should write");
        let mut mine = Settings::new("mine", "@m");
        mine.min_delay_minutes = 1;
        mine.max_delay_minutes = 2;

        store.save_settings(&mine).expect("Should save");

        assert_eq!(store.load_settings().expect("Should load"), mine);
    }

    #[test]
    fn test_broken_user_settings_fall_back() {
        let (_u, bundled, store) = store();
        fs::write(bundled.path().join(SETTINGS_FILE), BUNDLED).expect("Should write");
        fs::create_dir_all(store.user_dir()).expect("Should create dir");
        fs::write(store.user_dir().join(SETTINGS_FILE), "[telegram\ntoken=").expect("Should write");

        assert_eq!(store.load_settings().expect("Should load").token, "bundled");
    }

    #[test]
    fn test_reset_requires_configuration() {
        let (_u, bundled, store) = store();
        fs::write(bundled.path().join(SETTINGS_FILE), BUNDLED).expect("Should write");

        store.reset_settings().expect("Should reset");

        assert!(matches!(store.load_settings(), Err(ConfigError::MissingField("token"))));
    }

    #[test]
    fn test_phrase_precedence() {
        let (_u, bundled, store) = store();
        assert_eq!(store.load_phrases(), fallback_phrases());

        fs::write(bundled.path().join(PHRASES_FILE), "from bundle\n").expect("Should write");
        assert_eq!(store.load_phrases(), vec!["from bundle"]);

        store
            .save_phrases(&["mine".to_string(), "also mine".to_string()])
            .expect("Should save");
        assert_eq!(store.load_phrases(), vec!["mine", "also mine"]);
    }

    #[test]
    fn test_last_post_time() {
        let (_u, _b, store) = store();
        assert_eq!(store.load_last_post_time(), None);

        let at = Utc.timestamp_millis_opt(1_714_564_800_123).unwrap();
        store.save_last_post_time(at).expect("Should save");

        assert_eq!(store.load_last_post_time(), Some(at));
        let raw = fs::read_to_string(store.user_dir().join(LAST_POST_FILE)).expect("Should read");
        assert_eq!(raw, "1714564800.123");
    }

    #[test]
    fn test_garbage_last_post_time_is_none() {
        let (_u, _b, store) = store();
        fs::create_dir_all(store.user_dir()).expect("Should create dir");
        fs::write(store.user_dir().join(LAST_POST_FILE), "yesterday").expect("Should write");

        assert_eq!(store.load_last_post_time(), None);
    }

    #[test]
    fn test_no_temp_file_left_behind() {
        let (_u, _b, store) = store();
        store.save_phrases(&["a".to_string()]).expect("Should save");

        let names: Vec<_> = fs::read_dir(store.user_dir())
            .expect("Should list")
            .map(|e| e.expect("Should read entry").file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from(PHRASES_FILE)]);
    }

    /// Some sandboxes mount temp dirs on filesystems sysinfo doesn't list.
    fn disk_is_listed(path: &Path) -> bool {
        let path = path.canonicalize().expect("Should canonicalize");
        Disks::new_with_refreshed_list()
            .iter()
            .any(|d| path.starts_with(d.mount_point()))
    }

    #[test]
    fn test_impossible_space_requirement() {
        let dir = TempDir::new().expect("Should create temp dir");
        if !disk_is_listed(dir.path()) {
            assert!(ensure_free_space(dir.path(), u64::MAX).is_ok());
            return;
        }

        match ensure_free_space(dir.path(), u64::MAX) {
            Err(StorageError::DiskSpace { required, .. }) => assert_eq!(required, u64::MAX),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_short_space_leaves_file_untouched() {
        let (_u, _b, store) = store();
        store.save_phrases(&["old".to_string()]).expect("Should save");
        if !disk_is_listed(store.user_dir()) {
            return;
        }

        let err = store
            .write_with_requirement(PHRASES_FILE, b"new\n", u64::MAX)
            .expect_err("Should refuse");
        assert!(matches!(err, StorageError::DiskSpace { .. }));
        assert_eq!(store.load_phrases(), vec!["old"]);

        let err = store
            .write_with_requirement(LAST_POST_FILE, b"1.0", u64::MAX)
            .expect_err("Should refuse");
        assert!(matches!(err, StorageError::DiskSpace { .. }));
        assert!(!store.user_dir().join(LAST_POST_FILE).exists());
        assert!(!store.user_dir().join(format!(".{}.tmp", LAST_POST_FILE)).exists());
    }
}
