use crate::{
    models::catalog::{Catalog, CatalogError},
    services::{
        image_check::ExtensionAllowList,
        name_matcher::{DEFAULT_FUZZY_THRESHOLD, FuzzyPolicy},
        reconciler::{DEFAULT_SCAN_CONCURRENCY, DEFAULT_SCAN_PAGE_SIZE},
    },
};
use anyhow::{Context, Result};
use clap::Parser;
use std::{env, fmt, path::PathBuf, str::FromStr, time::Duration};
use thiserror::Error;

const ENV_PREFIX: &str = "CARD_SORTER_";

/// Well-known account used by local storage emulators.
const DEV_ACCOUNT_NAME: &str = "devstoreaccount1";
const DEV_ACCOUNT_KEY: &str =
    "Eby8vdM02xNOcqFlqUwJPLlmEtlCDXJ1OUzFT50uSRZ6IFsuFq2UVErCz4I6tq/K1SZFPTOtr/KBHBeksoGMGw==";

const DEFAULT_MAX_OBJECT_BYTES: usize = 32 * 1024 * 1024;
const DEFAULT_SCAN_INTERVAL_SECS: u64 = 300;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(
        "no storage credentials: set a connection string or both an account name and an account key"
    )]
    MissingCredentials,
    #[error("account name and account key must be provided together")]
    IncompleteAccountPair,
    #[error("malformed connection string segment `{0}`")]
    MalformedConnectionString(String),
    #[error("connection string is missing `{0}`")]
    ConnectionStringMissing(&'static str),
    #[error("invalid account name `{0}`: expected 3-24 lowercase letters or digits")]
    InvalidAccountName(String),
    #[error("invalid value `{value}` for {name}: {reason}")]
    InvalidValue {
        name: String,
        value: String,
        reason: String,
    },
}

/// Credentials for the storage account. The key is only checked for presence.
#[derive(Clone, PartialEq, Eq)]
pub struct StorageCredentials {
    pub account_name: String,
    pub account_key: String,
}

impl fmt::Debug for StorageCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageCredentials")
            .field("account_name", &self.account_name)
            .field(
                "account_key",
                &format_args!("<{} bytes redacted>", self.account_key.len()),
            )
            .finish()
    }
}

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub container: String,
    /// Trimmed of surrounding `/`; may be empty.
    pub input_prefix: String,
    /// Trimmed of surrounding `/`; never empty.
    pub processed_root: String,
    pub credentials: StorageCredentials,
    pub storage_dir: String,
    pub database_url: String,
    pub image_extensions: ExtensionAllowList,
    /// `None` disables the periodic scan.
    pub scan_interval: Option<Duration>,
    pub scan_concurrency: usize,
    pub scan_page_size: usize,
    /// `None` disables fuzzy matching.
    pub fuzzy: Option<FuzzyPolicy>,
    pub catalog_path: Option<PathBuf>,
    pub max_object_bytes: usize,
}

/// What the binary should do after configuration is loaded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunMode {
    pub migrate: bool,
    pub scan_once: bool,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug)]
#[command(author, version, about = "Trading-card image sorter")]
pub struct Args {
    /// Host to bind to (overrides CARD_SORTER_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides CARD_SORTER_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Storage container holding input and processed objects
    #[arg(long)]
    pub container: Option<String>,

    /// Prefix of newly uploaded card images
    #[arg(long)]
    pub input_prefix: Option<String>,

    /// Prefix under which classified images are written
    #[arg(long)]
    pub processed_root: Option<String>,

    /// `Key=Value;` connection string; wins over the account name/key pair
    #[arg(long)]
    pub connection_string: Option<String>,

    #[arg(long)]
    pub account_name: Option<String>,

    #[arg(long)]
    pub account_key: Option<String>,

    /// Directory where object payloads are stored
    #[arg(long)]
    pub storage_dir: Option<String>,

    /// Database URL for object metadata
    #[arg(long)]
    pub database_url: Option<String>,

    /// Comma-separated extensions the scan treats as images
    #[arg(long)]
    pub image_extensions: Option<String>,

    /// Seconds between reconciliation scans; 0 disables them
    #[arg(long)]
    pub scan_interval_secs: Option<u64>,

    #[arg(long)]
    pub scan_concurrency: Option<usize>,

    #[arg(long)]
    pub scan_page_size: Option<usize>,

    /// Enable or disable the fuzzy matching pass
    #[arg(long)]
    pub fuzzy_matching: Option<bool>,

    /// Minimum similarity (0-100) for a fuzzy match
    #[arg(long)]
    pub fuzzy_threshold: Option<f64>,

    /// Newline-separated catalog file replacing the built-in one
    #[arg(long)]
    pub catalog_path: Option<PathBuf>,

    /// Largest accepted upload, in bytes
    #[arg(long)]
    pub max_object_bytes: Option<usize>,

    /// Run migrations and exit
    #[arg(long)]
    pub migrate: bool,

    /// Run a single reconciliation scan, print the report and exit
    #[arg(long)]
    pub scan_once: bool,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and run mode.
    pub fn from_env_and_args() -> Result<(Self, RunMode)> {
        let args = Args::parse();
        Self::resolve(args, |name| env::var(name).ok()).context("loading configuration")
    }

    /// Merge `args` over the `CARD_SORTER_*` variables returned by `lookup`,
    /// over defaults.
    pub fn resolve<F>(args: Args, lookup: F) -> Result<(Self, RunMode), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = EnvSource { lookup };
        let mode = RunMode {
            migrate: args.migrate,
            scan_once: args.scan_once,
        };

        let connection_string = args
            .connection_string
            .or_else(|| env.get("CONNECTION_STRING"))
            .filter(|s| !s.trim().is_empty());
        let (credentials, overrides) = match connection_string {
            Some(raw) => parse_connection_string(&raw)?,
            None => {
                let name = args
                    .account_name
                    .or_else(|| env.get("ACCOUNT_NAME"))
                    .filter(|s| !s.trim().is_empty());
                let key = args
                    .account_key
                    .or_else(|| env.get("ACCOUNT_KEY"))
                    .filter(|s| !s.trim().is_empty());
                match (name, key) {
                    (Some(account_name), Some(account_key)) => (
                        StorageCredentials {
                            account_name: account_name.trim().to_string(),
                            account_key,
                        },
                        StorageOverrides::default(),
                    ),
                    (None, None) => return Err(ConfigError::MissingCredentials),
                    _ => return Err(ConfigError::IncompleteAccountPair),
                }
            }
        };
        ensure_account_name_valid(&credentials.account_name)?;

        let input_prefix = args
            .input_prefix
            .or_else(|| env.get("INPUT_PREFIX"))
            .unwrap_or_else(|| "input".into())
            .trim_matches('/')
            .to_string();
        let processed_root = args
            .processed_root
            .or_else(|| env.get("PROCESSED_ROOT"))
            .unwrap_or_else(|| "processed".into())
            .trim_matches('/')
            .to_string();
        if processed_root.is_empty() {
            return Err(invalid("processed_root", &processed_root, "must not be empty"));
        }
        if !input_prefix.is_empty()
            && (input_prefix == processed_root
                || input_prefix.starts_with(&format!("{}/", processed_root)))
        {
            return Err(invalid(
                "input_prefix",
                &input_prefix,
                "must not lie inside the processed root",
            ));
        }

        let raw_extensions = args
            .image_extensions
            .or_else(|| env.get("IMAGE_EXTENSIONS"));
        let image_extensions = match raw_extensions {
            Some(raw) => ExtensionAllowList::parse(&raw)
                .ok_or_else(|| invalid("image_extensions", &raw, "no extensions listed"))?,
            None => ExtensionAllowList::default(),
        };

        let scan_interval_secs =
            env.parsed(args.scan_interval_secs, "SCAN_INTERVAL_SECS", DEFAULT_SCAN_INTERVAL_SECS)?;
        let scan_concurrency =
            env.parsed(args.scan_concurrency, "SCAN_CONCURRENCY", DEFAULT_SCAN_CONCURRENCY)?;
        if scan_concurrency == 0 {
            return Err(invalid("scan_concurrency", "0", "must be at least 1"));
        }
        let scan_page_size =
            env.parsed(args.scan_page_size, "SCAN_PAGE_SIZE", DEFAULT_SCAN_PAGE_SIZE)?;
        if scan_page_size == 0 {
            return Err(invalid("scan_page_size", "0", "must be at least 1"));
        }

        let fuzzy_enabled = env.parsed(args.fuzzy_matching, "FUZZY_MATCHING", true)?;
        let threshold = env.parsed(args.fuzzy_threshold, "FUZZY_THRESHOLD", DEFAULT_FUZZY_THRESHOLD)?;
        if !(0.0..=100.0).contains(&threshold) {
            return Err(invalid(
                "fuzzy_threshold",
                &threshold.to_string(),
                "must be between 0 and 100",
            ));
        }

        let cfg = Self {
            host: args
                .host
                .or_else(|| env.get("HOST"))
                .unwrap_or_else(|| "0.0.0.0".into()),
            port: env.parsed(args.port, "PORT", 3000)?,
            container: args
                .container
                .or_else(|| env.get("CONTAINER"))
                .unwrap_or_else(|| "trading-card-scanner".into()),
            input_prefix,
            processed_root,
            credentials,
            storage_dir: args
                .storage_dir
                .or_else(|| env.get("STORAGE_DIR"))
                .or(overrides.storage_dir)
                .unwrap_or_else(|| "./data/objects".into()),
            database_url: args
                .database_url
                .or_else(|| env.get("DATABASE_URL"))
                .or(overrides.database_url)
                .unwrap_or_else(|| "sqlite://./data/meta/card_sorter.db".into()),
            image_extensions,
            scan_interval: (scan_interval_secs > 0).then(|| Duration::from_secs(scan_interval_secs)),
            scan_concurrency,
            scan_page_size,
            fuzzy: fuzzy_enabled.then_some(FuzzyPolicy { threshold }),
            catalog_path: args
                .catalog_path
                .or_else(|| env.get("CATALOG_PATH").map(PathBuf::from)),
            max_object_bytes: env.parsed(
                args.max_object_bytes,
                "MAX_OBJECT_BYTES",
                DEFAULT_MAX_OBJECT_BYTES,
            )?,
        };

        Ok((cfg, mode))
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// The configured catalog file, or the built-in list.
    pub fn load_catalog(&self) -> Result<Catalog, CatalogError> {
        match &self.catalog_path {
            Some(path) => Catalog::load(path),
            None => Catalog::builtin(),
        }
    }
}

struct EnvSource<F> {
    lookup: F,
}

impl<F: Fn(&str) -> Option<String>> EnvSource<F> {
    fn get(&self, suffix: &str) -> Option<String> {
        (self.lookup)(&format!("{}{}", ENV_PREFIX, suffix))
    }

    /// CLI value, else the parsed environment variable, else `default`.
    fn parsed<T>(&self, cli: Option<T>, suffix: &str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        if let Some(value) = cli {
            return Ok(value);
        }
        match self.get(suffix) {
            Some(raw) => raw.trim().parse::<T>().map_err(|err| ConfigError::InvalidValue {
                name: format!("{}{}", ENV_PREFIX, suffix),
                value: raw.clone(),
                reason: err.to_string(),
            }),
            None => Ok(default),
        }
    }
}

fn invalid(name: &str, value: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        name: name.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

/// Storage locations a connection string may carry.
#[derive(Debug, Default)]
struct StorageOverrides {
    database_url: Option<String>,
    storage_dir: Option<String>,
}

/// Parse `Key=Value;` pairs. Keys are case-insensitive and unknown keys
/// (endpoints, protocol) are ignored.
fn parse_connection_string(
    raw: &str,
) -> Result<(StorageCredentials, StorageOverrides), ConfigError> {
    let mut account_name = None;
    let mut account_key = None;
    let mut overrides = StorageOverrides::default();

    for segment in raw.split(';').map(str::trim).filter(|s| !s.is_empty()) {
        let (key, value) = segment
            .split_once('=')
            .ok_or_else(|| ConfigError::MalformedConnectionString(segment.to_string()))?;
        let value = value.trim();
        match key.trim().to_ascii_lowercase().as_str() {
            "usedevelopmentstorage" if value.eq_ignore_ascii_case("true") => {
                account_name.get_or_insert_with(|| DEV_ACCOUNT_NAME.to_string());
                account_key.get_or_insert_with(|| DEV_ACCOUNT_KEY.to_string());
            }
            "accountname" => account_name = Some(value.to_string()),
            "accountkey" => account_key = Some(value.to_string()),
            "databaseurl" => overrides.database_url = Some(value.to_string()),
            "storagedir" => overrides.storage_dir = Some(value.to_string()),
            _ => {}
        }
    }

    let account_name = account_name
        .filter(|v| !v.is_empty())
        .ok_or(ConfigError::ConnectionStringMissing("AccountName"))?;
    let account_key = account_key
        .filter(|v| !v.is_empty())
        .ok_or(ConfigError::ConnectionStringMissing("AccountKey"))?;
    Ok((
        StorageCredentials {
            account_name,
            account_key,
        },
        overrides,
    ))
}

fn ensure_account_name_valid(name: &str) -> Result<(), ConfigError> {
    let valid = (3..=24).contains(&name.len())
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit());
    if valid {
        Ok(())
    } else {
        Err(ConfigError::InvalidAccountName(name.to_string()))
    }
}
