// Multivisor Infrastructure - INI configuration
// Implements: ConfigSource
//
// ```ini
// [global]
// name = production
//
// [supervisor:lid001]
// host = 10.0.0.7
// port = 9011
// username = admin
// password = secret
// ```

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use config::{Config, File, FileFormat, Value};
use ini::Ini;
use tracing::debug;

use multivisor_core::domain::{MultivisorConfig, SupervisorConfig, DEFAULT_NAME};
use multivisor_core::port::ConfigSource;
use multivisor_core::{AppError, Result};

/// Default location of the configuration file
pub const DEFAULT_CONFIG_PATH: &str = "/etc/multivisor.conf";

const GLOBAL_SECTION: &str = "global";
const SUPERVISOR_PREFIX: &str = "supervisor:";

enum Source {
    Path(PathBuf),
    Inline(String),
}

/// Reads the INI file again on every `load`, so reloads pick up edits
pub struct IniConfigSource {
    source: Source,
}

impl IniConfigSource {
    /// `~` in the path is expanded
    pub fn new(path: impl AsRef<str>) -> Self {
        let expanded = shellexpand::tilde(path.as_ref()).into_owned();
        Self {
            source: Source::Path(PathBuf::from(expanded)),
        }
    }

    /// In-memory INI text, used by tests and embedded setups
    pub fn inline(text: impl Into<String>) -> Self {
        Self {
            source: Source::Inline(text.into()),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        match &self.source {
            Source::Path(path) => Some(path),
            Source::Inline(_) => None,
        }
    }

    fn read(&self) -> Result<String> {
        match &self.source {
            Source::Path(path) => std::fs::read_to_string(path)
                .map_err(|e| AppError::Config(format!("{}: {}", path.display(), e))),
            Source::Inline(text) => Ok(text.clone()),
        }
    }

    /// Sections in file order, names exactly as written
    ///
    /// `config` folds section names to lowercase, so names are taken from
    /// the raw INI and values from `config`, keyed by the folded name.
    fn sections(&self) -> Result<Vec<(String, HashMap<String, Value>)>> {
        let text = self.read()?;
        let raw = Ini::load_from_str(&text).map_err(|e| AppError::Config(e.to_string()))?;
        let mut tables = Config::builder()
            .add_source(File::from_str(&text, FileFormat::Ini))
            .build()
            .and_then(|config| config.try_deserialize::<HashMap<String, Value>>())
            .map_err(|e| AppError::Config(e.to_string()))?;

        let mut seen = HashSet::new();
        let mut sections = Vec::new();
        for name in raw.sections().flatten() {
            let folded = name.to_lowercase();
            if !seen.insert(folded.clone()) {
                return Err(AppError::Config(format!("duplicate section [{}]", name)));
            }
            // Sections without keys never reach `config`
            let table = match tables.remove(name).or_else(|| tables.remove(&folded)) {
                Some(value) => into_table(name, value)?,
                None => HashMap::new(),
            };
            sections.push((name.to_string(), table));
        }
        Ok(sections)
    }
}

impl Default for IniConfigSource {
    fn default() -> Self {
        Self::new(DEFAULT_CONFIG_PATH)
    }
}

fn get_string(table: &HashMap<String, Value>, key: &str) -> Result<Option<String>> {
    table
        .get(key)
        .cloned()
        .map(|value| {
            value
                .into_string()
                .map_err(|e| AppError::Config(format!("{}: {}", key, e)))
        })
        .transpose()
}

fn into_table(section: &str, value: Value) -> Result<HashMap<String, Value>> {
    value
        .into_table()
        .map(|table| table.into_iter().collect())
        .map_err(|e| AppError::Config(format!("[{}]: {}", section, e)))
}

fn parse_supervisor(name: &str, table: HashMap<String, Value>) -> Result<SupervisorConfig> {
    let mut supervisor = SupervisorConfig::new(name);

    if let Some(host) = get_string(&table, "host")? {
        supervisor = supervisor.with_host(host);
    }
    if let Some(port) = get_string(&table, "port")? {
        let port = port.trim().parse::<u16>().map_err(|_| {
            AppError::Config(format!("[{}{}] invalid port '{}'", SUPERVISOR_PREFIX, name, port))
        })?;
        supervisor = supervisor.with_port(port);
    }
    supervisor.username = get_string(&table, "username")?;
    supervisor.password = get_string(&table, "password")?;

    Ok(supervisor)
}

impl ConfigSource for IniConfigSource {
    fn load(&self) -> Result<MultivisorConfig> {
        let sections = self.sections()?;

        let mut config = MultivisorConfig {
            name: DEFAULT_NAME.to_string(),
            supervisors: Vec::new(),
        };

        for (section, table) in sections {
            if section == GLOBAL_SECTION {
                if let Some(name) = get_string(&table, "name")? {
                    config.name = name;
                }
            } else if let Some(name) = section.strip_prefix(SUPERVISOR_PREFIX) {
                config.supervisors.push(parse_supervisor(name, table)?);
            } else {
                debug!(section = %section, "Ignoring unknown configuration section");
            }
        }

        config.validate()?;
        Ok(config)
    }
}
