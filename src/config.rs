use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Log level configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// Where media items come from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    #[default]
    Folder,
    Database,
}

/// Where upload outcomes are recorded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SinkKind {
    #[default]
    File,
    Db,
    None,
}

/// Platform endpoint, account and video defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub url: String,
    pub port: Option<u16>,
    pub username: String,
    pub password: String,
    pub channel_id: i64,
    /// 1 public, 2 unlisted, 3 private, 4 internal
    pub privacy: i32,
    pub comments_policy: i32,
    pub download_enabled: bool,
    pub category: Option<i32>,
    pub language: Option<String>,
    pub wait_transcoding: bool,
    pub timeout_seconds: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            url: "http://peertube.localhost".to_string(),
            port: Some(9000),
            username: "root".to_string(),
            password: String::new(),
            channel_id: 1,
            privacy: 1,
            comments_policy: 1,
            download_enabled: true,
            category: None,
            language: None,
            wait_transcoding: true,
            timeout_seconds: 600,
        }
    }
}

impl ApiConfig {
    /// Scheme, host and optional port, without the API prefix
    pub fn base_url(&self) -> String {
        let url = self.url.trim_end_matches('/');
        match self.port {
            Some(port) => format!("{}:{}", url, port),
            None => url.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadConfig {
    pub source: SourceKind,
    /// Only accept files whose extension is listed in `extensions`
    pub specific_extensions: bool,
    pub extensions: Vec<String>,
    pub convert_audio_to_mp3: bool,
    /// Classify files with ffprobe before uploading
    pub probe_media: bool,
    /// Scratch directory for transcoded files; system temp dir when unset
    pub temp_folder: Option<PathBuf>,
    pub log_type: SinkKind,
    pub log_file: PathBuf,
}

impl Default for LoadConfig {
    fn default() -> Self {
        Self {
            source: SourceKind::Folder,
            specific_extensions: true,
            extensions: vec![".mp4".to_string(), ".wmv".to_string()],
            convert_audio_to_mp3: false,
            probe_media: false,
            temp_folder: None,
            log_type: SinkKind::File,
            log_file: PathBuf::from("upload_log.jsonl"),
        }
    }
}

impl LoadConfig {
    pub fn temp_folder(&self) -> PathBuf {
        self.temp_folder
            .clone()
            .unwrap_or_else(std::env::temp_dir)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FolderConfig {
    pub path: PathBuf,
}

impl Default for FolderConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./videos/"),
        }
    }
}

/// Database engine behind the source table and the log table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DbKind {
    #[default]
    Sqlite,
    Postgres,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub db_type: DbKind,
    /// SQLite database file
    pub path: PathBuf,
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub dbname: String,
    pub table_name: String,
    pub title: String,
    pub description: String,
    pub file_path: String,
    /// Source columns carried through to the result record
    pub media_identifier: Vec<String>,
    /// Result columns written by the database sink
    pub reference_columns: Vec<String>,
    /// Write results into `table_name` instead of a separate log table
    pub update_same_table: bool,
    pub log_table: Option<String>,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            db_type: DbKind::Sqlite,
            path: PathBuf::from("media.db"),
            host: "localhost".to_string(),
            port: 5432,
            username: "postgres".to_string(),
            password: String::new(),
            dbname: "media".to_string(),
            table_name: "media_table".to_string(),
            title: "title_column".to_string(),
            description: "description_column".to_string(),
            file_path: "file_path_column".to_string(),
            media_identifier: vec!["id".to_string()],
            reference_columns: vec![
                "peertube_id".to_string(),
                "uuid".to_string(),
                "shortuuid".to_string(),
            ],
            update_same_table: false,
            log_table: None,
        }
    }
}

impl DatabaseConfig {
    /// Table the database sink writes to
    pub fn log_table_name(&self, source: SourceKind) -> String {
        if self.update_same_table {
            return self.table_name.clone();
        }
        if let Some(table) = self.log_table.as_ref().filter(|t| !t.is_empty()) {
            return table.clone();
        }
        match source {
            SourceKind::Database => format!("{}_to_peertube_log", self.table_name),
            SourceKind::Folder => "peertube_log".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessConfig {
    pub threads: usize,
    pub chunk_size: usize,
    /// Chunk retries allowed per file
    pub max_retries: u32,
    pub retry_delay_ms: u64,
}

impl Default for ProcessConfig {
    fn default() -> Self {
        Self {
            threads: 1,
            chunk_size: 2 * 1024 * 1024,
            max_retries: 10,
            retry_delay_ms: 15_000,
        }
    }
}

impl ProcessConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: LogLevel,
    pub log_to_file: bool,
    /// Defaults to ~/.peertube-uploader/logs
    pub log_dir: Option<PathBuf>,
    pub max_files: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            log_to_file: false,
            log_dir: None,
            max_files: 5,
        }
    }
}

/// Application configuration stored as JSON
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub api: ApiConfig,
    pub load: LoadConfig,
    pub folder: FolderConfig,
    pub database: Option<DatabaseConfig>,
    pub process: ProcessConfig,
    pub logging: LoggingConfig,
}

/// Outcome of [`load_or_init`]
#[derive(Debug)]
pub enum ConfigLoad {
    Loaded(AppConfig),
    /// No file existed; a sample was written at the given path
    SampleWritten(PathBuf),
}

impl AppConfig {
    /// Configuration written when no file exists yet
    pub fn sample() -> Self {
        Self {
            database: Some(DatabaseConfig::default()),
            ..Default::default()
        }
    }

    /// Load configuration from the specified path, using defaults for missing fields
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).context("Failed to read config file")?;
        let config: AppConfig =
            serde_json::from_str(&content).context("Failed to parse config file")?;
        Ok(config)
    }

    /// Save the configuration to disk
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).context("Failed to create config directory")?;
            }
        }

        let content = serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(path, content).context("Failed to write config file")?;
        Ok(())
    }

    /// Reject settings the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.process.threads == 0 {
            bail!("process.threads must be at least 1");
        }
        if self.process.chunk_size == 0 {
            bail!("process.chunk_size must be at least 1");
        }
        if self.api.url.trim().is_empty() {
            bail!("api.url must not be empty");
        }
        url::Url::parse(&self.api.base_url())
            .with_context(|| format!("api.url is not a valid URL: {}", self.api.base_url()))?;

        let needs_database =
            self.load.source == SourceKind::Database || self.load.log_type == SinkKind::Db;
        if needs_database && self.database.is_none() {
            bail!("a database section is required for the database source or the db log type");
        }
        if let Some(db) = self.database.as_ref().filter(|_| needs_database) {
            if db.db_type == DbKind::Postgres {
                if db.host.trim().is_empty() {
                    bail!("database.host must not be empty for postgres");
                }
                if db.dbname.trim().is_empty() {
                    bail!("database.dbname must not be empty for postgres");
                }
            }
        }
        if self.load.log_type == SinkKind::Db {
            if let Some(db) = &self.database {
                if db.update_same_table && self.load.source != SourceKind::Database {
                    bail!("database.update_same_table requires the database source");
                }
            }
        }
        Ok(())
    }
}

/// Load the configuration, writing a sample file when none exists
pub fn load_or_init(path: &Path) -> Result<ConfigLoad> {
    if !path.exists() {
        AppConfig::sample().save(path)?;
        return Ok(ConfigLoad::SampleWritten(path.to_path_buf()));
    }

    let config = AppConfig::load_from_path(path)?;
    config.validate()?;
    Ok(ConfigLoad::Loaded(config))
}
