// Rule resolution: built-in defaults, configuration files, command-line overrides
use crate::utils::error::{ConfigError, TransferError};
use crate::utils::file::ChecksumAlgorithm;
use anyhow::Result;
use dialoguer::Password;
use ini::{Ini, ParseOption};
use log::{debug, warn};
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

pub const CONFIG_FILE_NAME: &str = "shup.cfg";
const SYSTEM_CONFIG_DIR: &str = "/etc/shup";
const DEFAULT_SECTION: &str = "DEFAULT";

/// Options that must resolve before a session can be opened.
const REQUIRED_KEYS: [&str; 4] = ["ssh_host", "file_path", "ssh_port", "ssh_user"];

/// Configuration files in read order; later files win.
pub fn config_paths() -> Vec<PathBuf> {
    let mut paths = vec![Path::new(SYSTEM_CONFIG_DIR).join(CONFIG_FILE_NAME)];
    if let Some(home) = home::home_dir() {
        paths.push(home.join(".config").join("shup").join(CONFIG_FILE_NAME));
    }
    paths
}

fn builtin_defaults() -> HashMap<String, String> {
    let user = whoami::username();
    [
        ("del_bin", "rm"),
        ("ssh_port", "22"),
        ("ssh_timeout", "5"),
        ("ssh_user", user.as_str()),
        ("file_ttl", "1d"),
        ("file_perm", "0644"),
        ("file_group", user.as_str()),
        ("file_user", user.as_str()),
        ("rand_len", "2"),
    ]
    .into_iter()
    .map(|(key, value)| (key.to_string(), value.to_string()))
    .collect()
}

fn parse_option() -> ParseOption {
    ParseOption {
        enabled_quote: false,
        enabled_escape: false,
        ..ParseOption::default()
    }
}

/// Every rule known from the configuration sources, plus the `DEFAULT`
/// fallbacks shared by all of them.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    defaults: HashMap<String, String>,
    sections: HashMap<String, HashMap<String, String>>,
}

impl RuleSet {
    pub fn with_builtin_defaults() -> Self {
        Self {
            defaults: builtin_defaults(),
            sections: HashMap::new(),
        }
    }

    /// Built-in defaults merged with every existing file of `paths`, in order.
    pub fn load(paths: &[PathBuf]) -> Result<Self, ConfigError> {
        let mut rules = Self::with_builtin_defaults();
        for path in paths {
            if path.is_file() {
                debug!("Reading configuration from {}", path.display());
                rules.read_file(path)?;
            }
        }
        Ok(rules)
    }

    pub fn read_file(&mut self, path: &Path) -> Result<(), ConfigError> {
        let ini = Ini::load_from_file_opt(path, parse_option()).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        self.merge(&ini);
        Ok(())
    }

    pub fn read_str(&mut self, content: &str) -> Result<(), ConfigError> {
        let ini = Ini::load_from_str_opt(content, parse_option()).map_err(|e| ConfigError::Parse {
            path: "<string>".to_string(),
            message: e.to_string(),
        })?;
        self.merge(&ini);
        Ok(())
    }

    fn merge(&mut self, ini: &Ini) {
        for (section, properties) in ini.iter() {
            let target = match section {
                Some(DEFAULT_SECTION) => &mut self.defaults,
                Some(name) => self.sections.entry(name.to_string()).or_default(),
                None => {
                    if properties.iter().next().is_some() {
                        warn!("Ignoring options declared outside of any section");
                    }
                    continue;
                }
            };
            for (key, value) in properties.iter() {
                target.insert(key.to_ascii_lowercase(), value.to_string());
            }
        }
    }

    /// Flatten one rule: defaults, then the rule's section, then `overrides`.
    pub fn lookup(&self, rule: &str, overrides: &[(&str, String)]) -> Result<RuleLookup, ConfigError> {
        let section = self
            .sections
            .get(rule)
            .ok_or_else(|| ConfigError::MissingSection { rule: rule.to_string() })?;

        let mut values = self.defaults.clone();
        values.extend(section.iter().map(|(k, v)| (k.clone(), v.clone())));
        values.extend(overrides.iter().map(|(k, v)| (k.to_string(), v.clone())));

        Ok(RuleLookup {
            rule: rule.to_string(),
            values,
        })
    }
}

/// Untyped view of a single resolved rule.
#[derive(Debug, Clone)]
pub struct RuleLookup {
    rule: String,
    values: HashMap<String, String>,
}

impl RuleLookup {
    pub fn rule(&self) -> &str {
        &self.rule
    }

    pub fn exists(&self, option: &str) -> bool {
        self.values.contains_key(option)
    }

    pub fn get_str(&self, option: &str) -> Result<&str, ConfigError> {
        self.values
            .get(option)
            .map(String::as_str)
            .ok_or_else(|| ConfigError::MissingOption {
                rule: self.rule.clone(),
                option: option.to_string(),
            })
    }

    pub fn get_int<T: FromStr>(&self, option: &str) -> Result<T, ConfigError> {
        let value = self.get_str(option)?;
        value
            .trim()
            .parse()
            .map_err(|_| self.invalid(option, value, "integer"))
    }

    pub fn get_bool(&self, option: &str) -> Result<bool, ConfigError> {
        let value = self.get_str(option)?;
        match value.trim().to_ascii_lowercase().as_str() {
            "1" | "yes" | "true" | "on" => Ok(true),
            "0" | "no" | "false" | "off" => Ok(false),
            _ => Err(self.invalid(option, value, "boolean")),
        }
    }

    fn get_flag(&self, option: &str) -> Result<bool, ConfigError> {
        if self.exists(option) {
            self.get_bool(option)
        } else {
            Ok(false)
        }
    }

    fn get_opt_str(&self, option: &str) -> Option<String> {
        self.values.get(option).cloned()
    }

    fn invalid(&self, option: &str, value: &str, expected: &'static str) -> ConfigError {
        ConfigError::InvalidValue {
            rule: self.rule.clone(),
            option: option.to_string(),
            value: value.to_string(),
            expected,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ConnectionSettings {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: Option<String>,
    pub timeout: Duration,
}

/// How the remote filename is derived from the local one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NamingPolicy {
    Literal,
    Random { length: usize },
    Checksum(ChecksumAlgorithm),
}

/// A fully validated rule, built once at startup.
#[derive(Debug, Clone)]
pub struct Rule {
    pub name: String,
    pub connection: ConnectionSettings,
    pub file_path: String,
    pub file_return: Option<String>,
    pub naming: NamingPolicy,
    pub file_perm: u32,
    pub file_user: String,
    pub file_group: String,
    /// Kept verbatim: `"0"` disables deletion, other values are parsed when
    /// the deletion is scheduled.
    pub file_ttl: String,
    pub del_bin: String,
}

impl Rule {
    pub fn resolve(rules: &RuleSet, name: &str, overrides: &[(&str, String)]) -> Result<Self, ConfigError> {
        let lookup = rules.lookup(name, overrides)?;
        Self::from_lookup(&lookup)
    }

    pub fn from_lookup(lookup: &RuleLookup) -> Result<Self, ConfigError> {
        for key in REQUIRED_KEYS {
            lookup.get_str(key)?;
        }

        let timeout_secs: u64 = lookup.get_int("ssh_timeout")?;
        if timeout_secs == 0 {
            return Err(lookup.invalid("ssh_timeout", "0", "positive number of seconds"));
        }

        let connection = ConnectionSettings {
            host: lookup.get_str("ssh_host")?.to_string(),
            port: lookup.get_int("ssh_port")?,
            user: lookup.get_str("ssh_user")?.to_string(),
            password: lookup.get_opt_str("ssh_passwd"),
            timeout: Duration::from_secs(timeout_secs),
        };

        let file_path = lookup.get_str("file_path")?;
        if !file_path.starts_with('/') {
            return Err(lookup.invalid("file_path", file_path, "absolute remote path"));
        }

        let perm = lookup.get_str("file_perm")?;
        let file_perm = parse_permissions(perm).ok_or_else(|| lookup.invalid("file_perm", perm, "octal mode"))?;

        Ok(Rule {
            name: lookup.rule().to_string(),
            connection,
            file_path: file_path.to_string(),
            file_return: lookup.get_opt_str("file_return"),
            naming: naming_policy(lookup)?,
            file_perm,
            file_user: lookup.get_str("file_user")?.to_string(),
            file_group: lookup.get_str("file_group")?.to_string(),
            file_ttl: lookup.get_str("file_ttl")?.trim().to_string(),
            del_bin: lookup.get_str("del_bin")?.to_string(),
        })
    }
}

// randomize > cksum (file_cksum or sha1) > file_cksum_arg > literal
fn naming_policy(lookup: &RuleLookup) -> Result<NamingPolicy, ConfigError> {
    let algorithm = |option: &str| -> Result<ChecksumAlgorithm, ConfigError> {
        let value = lookup.get_str(option)?;
        value
            .parse()
            .map_err(|_| lookup.invalid(option, value, "md5, sha1, sha224, sha256, sha384 or sha512"))
    };

    if lookup.get_flag("randomize")? {
        let length: usize = lookup.get_int("rand_len")?;
        if length == 0 {
            return Err(lookup.invalid("rand_len", "0", "positive length"));
        }
        Ok(NamingPolicy::Random { length })
    } else if lookup.get_flag("cksum")? {
        if lookup.exists("file_cksum") {
            Ok(NamingPolicy::Checksum(algorithm("file_cksum")?))
        } else {
            Ok(NamingPolicy::Checksum(ChecksumAlgorithm::Sha1))
        }
    } else if lookup.exists("file_cksum_arg") {
        Ok(NamingPolicy::Checksum(algorithm("file_cksum_arg")?))
    } else {
        Ok(NamingPolicy::Literal)
    }
}

fn parse_permissions(value: &str) -> Option<u32> {
    let digits = value.trim();
    let digits = digits.strip_prefix("0o").unwrap_or(digits);
    u32::from_str_radix(digits, 8).ok().filter(|mode| *mode <= 0o7777)
}

pub fn prompt_password(connection: &ConnectionSettings) -> Result<String> {
    Password::new()
        .with_prompt(format!("Password for {}@{}", connection.user, connection.host))
        .allow_empty_password(true)
        .interact()
        .map_err(|e| match e {
            // Ctrl-D at the prompt
            dialoguer::Error::IO(io) if io.kind() == ErrorKind::UnexpectedEof => TransferError::Interrupted.into(),
            e => anyhow::Error::from(e),
        })
}
