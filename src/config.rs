//! Server configuration
//!
//! Values here are fixed once the server starts. `dir` and `dbfilename` are
//! only advertised to clients through `CONFIG GET`; nothing is persisted.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Default directory advertised for the database file.
pub const DEFAULT_DIR: &str = "/tmp/redis-files";

/// Default database filename.
pub const DEFAULT_DBFILENAME: &str = "dump.rdb";

/// Server configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Directory the database file would live in
    pub dir: PathBuf,
    /// Database filename
    pub dbfilename: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: crate::DEFAULT_HOST.to_string(),
            port: crate::DEFAULT_PORT,
            dir: PathBuf::from(DEFAULT_DIR),
            dbfilename: DEFAULT_DBFILENAME.to_string(),
        }
    }
}

impl Config {
    /// Returns the bind address as a string
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Returns the current value of a readable parameter.
    pub fn get(&self, param: ConfigParam) -> String {
        match param {
            ConfigParam::Dir => self.dir.to_string_lossy().into_owned(),
            ConfigParam::DbFilename => self.dbfilename.clone(),
        }
    }
}

/// Parameters clients may read with `CONFIG GET`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigParam {
    Dir,
    DbFilename,
}

impl ConfigParam {
    /// The canonical (lower-case) parameter name.
    pub fn name(self) -> &'static str {
        match self {
            ConfigParam::Dir => "dir",
            ConfigParam::DbFilename => "dbfilename",
        }
    }
}

impl fmt::Display for ConfigParam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Error for a parameter outside the allow-list.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown config parameter '{0}'")]
pub struct UnknownParam(pub String);

impl FromStr for ConfigParam {
    type Err = UnknownParam;

    /// Case-insensitive lookup.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("dir") {
            Ok(ConfigParam::Dir)
        } else if s.eq_ignore_ascii_case("dbfilename") {
            Ok(ConfigParam::DbFilename)
        } else {
            Err(UnknownParam(s.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.bind_address(), "127.0.0.1:6379");
        assert_eq!(config.get(ConfigParam::Dir), DEFAULT_DIR);
        assert_eq!(config.get(ConfigParam::DbFilename), DEFAULT_DBFILENAME);
    }

    #[test]
    fn test_param_lookup_is_case_insensitive() {
        assert_eq!("DIR".parse::<ConfigParam>(), Ok(ConfigParam::Dir));
        assert_eq!("DbFileName".parse::<ConfigParam>(), Ok(ConfigParam::DbFilename));
        assert_eq!(
            "maxmemory".parse::<ConfigParam>(),
            Err(UnknownParam("maxmemory".to_string()))
        );
    }

    #[test]
    fn test_dbfilename_is_not_dir() {
        let config = Config {
            dir: PathBuf::from("/data"),
            dbfilename: "db.rdb".to_string(),
            ..Config::default()
        };
        assert_eq!(config.get(ConfigParam::Dir), "/data");
        assert_eq!(config.get(ConfigParam::DbFilename), "db.rdb");
    }
}
