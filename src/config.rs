use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::{error::ConfigError, filter::ExtensionSet};

pub const DEFAULT_MIN_DELAY_MINUTES: u32 = 10;
pub const DEFAULT_MAX_DELAY_MINUTES: u32 = 120;
pub const DEFAULT_WHITELIST: &str = ".jpg,.jpeg,.png,.gif,.mp4,.webm,.webp";
pub const DEFAULT_BLACKLIST: &str = ".txt,.ini,.log,.docx,.pdf,.zip,.rar,.exe,.7z";

/// On-disk settings file (toml).
#[derive(Serialize, Deserialize, Debug, Default, PartialEq)]
pub struct ConfigFile {
    pub telegram: TelegramConfig,
    #[serde(default)]
    pub posting: PostingConfig,
}

#[derive(Serialize, Deserialize, Debug, Default, PartialEq)]
pub struct TelegramConfig {
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub channel_id: String,
    #[serde(default)]
    pub default_hashtags: String,
}

#[derive(Serialize, Deserialize, Debug, PartialEq)]
#[serde(default)]
pub struct PostingConfig {
    pub folder_path: PathBuf,
    pub min_delay_minutes: u32,
    pub max_delay_minutes: u32,
    pub whitelist_extensions: ExtensionSet,
    pub blacklist_extensions: ExtensionSet,
}

impl Default for PostingConfig {
    fn default() -> Self {
        Self {
            folder_path: default_folder(),
            min_delay_minutes: DEFAULT_MIN_DELAY_MINUTES,
            max_delay_minutes: DEFAULT_MAX_DELAY_MINUTES,
            whitelist_extensions: ExtensionSet::parse(DEFAULT_WHITELIST),
            blacklist_extensions: ExtensionSet::parse(DEFAULT_BLACKLIST),
        }
    }
}

fn default_folder() -> PathBuf {
    if cfg!(windows) {
        PathBuf::from("C:\\")
    } else {
        PathBuf::from("/")
    }
}

/// Validated settings snapshot used by the poster.
#[derive(Clone, Debug, PartialEq)]
pub struct Settings {
    pub token: String,
    pub channel_id: String,
    pub default_hashtags: String,
    pub folder_path: PathBuf,
    pub min_delay_minutes: u32,
    pub max_delay_minutes: u32,
    pub whitelist: ExtensionSet,
    pub blacklist: ExtensionSet,
}

impl Settings {
    /// Default posting options around the given credentials.
    pub fn new(token: impl Into<String>, channel_id: impl Into<String>) -> Self {
        let posting = PostingConfig::default();
        Self {
            token: token.into(),
            channel_id: channel_id.into(),
            default_hashtags: String::new(),
            folder_path: posting.folder_path,
            min_delay_minutes: posting.min_delay_minutes,
            max_delay_minutes: posting.max_delay_minutes,
            whitelist: posting.whitelist_extensions,
            blacklist: posting.blacklist_extensions,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.token.trim().is_empty() {
            return Err(ConfigError::MissingField("token"));
        }
        if self.channel_id.trim().is_empty() {
            return Err(ConfigError::MissingField("channel_id"));
        }
        if self.min_delay_minutes > self.max_delay_minutes {
            return Err(ConfigError::DelayRange {
                min: self.min_delay_minutes,
                max: self.max_delay_minutes,
            });
        }

        Ok(())
    }
}

impl TryFrom<ConfigFile> for Settings {
    type Error = ConfigError;

    fn try_from(file: ConfigFile) -> Result<Self, Self::Error> {
        let settings = Settings {
            token: file.telegram.token.trim().to_string(),
            channel_id: file.telegram.channel_id.trim().to_string(),
            default_hashtags: file.telegram.default_hashtags,
            folder_path: file.posting.folder_path,
            min_delay_minutes: file.posting.min_delay_minutes,
            max_delay_minutes: file.posting.max_delay_minutes,
            whitelist: file.posting.whitelist_extensions,
            blacklist: file.posting.blacklist_extensions,
        };
        settings.validate()?;

        Ok(settings)
    }
}

impl From<&Settings> for ConfigFile {
    fn from(s: &Settings) -> Self {
        ConfigFile {
            telegram: TelegramConfig {
                token: s.token.clone(),
                channel_id: s.channel_id.clone(),
                default_hashtags: s.default_hashtags.clone(),
            },
            posting: PostingConfig {
                folder_path: s.folder_path.clone(),
                min_delay_minutes: s.min_delay_minutes,
                max_delay_minutes: s.max_delay_minutes,
                whitelist_extensions: s.whitelist.clone(),
                blacklist_extensions: s.blacklist.clone(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_file_gets_defaults() {
        let file: ConfigFile = toml::from_str(
            r#"
            [telegram]
            token = "123:abc"
            channel_id = "@art"
            "#,
        )
        .expect("Should parse");

        let settings = Settings::try_from(file).expect("Should be valid");

        assert_eq!(settings.min_delay_minutes, 10);
        assert_eq!(settings.max_delay_minutes, 120);
        assert!(settings.whitelist.contains(".webp"));
        assert!(settings.blacklist.contains(".7z"));
        assert_eq!(settings.default_hashtags, "");
    }

    #[test]
    fn test_full_file() {
        let file: ConfigFile = toml::from_str(
            r##"
            [telegram]
            token = "123:abc"
            channel_id = "-100200300"
            default_hashtags = "#art #daily"

            [posting]
            folder_path = "/srv/media"
            min_delay_minutes = 30
            max_delay_minutes = 45
            whitelist_extensions = "JPG, png"
            blacklist_extensions = ""
            "##,
        )
        .expect("Should parse");

        let settings = Settings::try_from(file).expect("Should be valid");

        assert_eq!(settings.folder_path, PathBuf::from("/srv/media"));
        assert_eq!(settings.whitelist, ExtensionSet::parse(".jpg,.png"));
        assert!(settings.blacklist.is_empty());
        assert_eq!(settings.default_hashtags, "#art #daily");
    }

    #[test]
    fn test_missing_credentials() {
        let file: ConfigFile = toml::from_str("[telegram]\nchannel_id = \"@art\"\n").expect("Should parse");
        assert!(matches!(Settings::try_from(file), Err(ConfigError::MissingField("token"))));

        let file: ConfigFile = toml::from_str("[telegram]\ntoken = \"t\"\nchannel_id = \" \"\n").expect("Should parse");
        assert!(matches!(Settings::try_from(file), Err(ConfigError::MissingField("channel_id"))));
    }

    #[test]
    fn test_missing_telegram_section_fails_to_parse() {
        assert!(toml::from_str::<ConfigFile>("[posting]\nmin_delay_minutes = 1\n").is_err());
    }

    #[test]
    fn test_delay_range_is_validated() {
        let mut settings = Settings::new("t", "@c");
        settings.min_delay_minutes = 90;
        settings.max_delay_minutes = 60;
        assert!(matches!(settings.validate(), Err(ConfigError::DelayRange { min: 90, max: 60 })));
    }

    #[test]
    fn test_file_round_trip() {
        let mut settings = Settings::new("123:abc", "@art");
        settings.default_hashtags = "#x".into();
        settings.folder_path = PathBuf::from("/data/in");

        let text = toml::to_string(&ConfigFile::from(&settings)).expect("Should serialize");
        let file: ConfigFile = toml::from_str(&text).expect("Should parse");

        assert_eq!(Settings::try_from(file).expect("Should be valid"), settings);
    }
}
