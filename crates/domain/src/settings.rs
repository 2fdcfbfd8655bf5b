//! Declarative configuration schema for observers.
//!
//! Each sentinel declares the keys it understands through a [`ConfigDef`];
//! the container maps the properties named `sentinel.<name>.<key>` into typed
//! [`Settings`] before the sentinel is registered, so a missing required key
//! stops the process at startup rather than at the first notification.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use thiserror::Error;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigType {
    String,
    Boolean,
    Int,
    Short,
    Long,
    Double,
    List,
    /// Name of a sentinel kind known to the container's catalog.
    Class,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SettingValue {
    String(String),
    Boolean(bool),
    Int(i32),
    Short(i16),
    Long(i64),
    Double(f64),
    List(Vec<String>),
    Class(String),
}

impl SettingValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(value) | Self::Class(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Boolean(value) => Some(*value),
            _ => None,
        }
    }

    /// Any of the integer variants widened to `i64`.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Short(value) => Some(i64::from(*value)),
            Self::Int(value) => Some(i64::from(*value)),
            Self::Long(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Double(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[String]> {
        match self {
            Self::List(values) => Some(values),
            _ => None,
        }
    }
}

/// Resolved settings handed to `Sentinel::start`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Settings {
    values: BTreeMap<String, SettingValue>,
}

impl Settings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: SettingValue) -> Self {
        self.values.insert(key.into(), value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: SettingValue) {
        self.values.insert(key.into(), value);
    }

    pub fn get(&self, key: &str) -> Option<&SettingValue> {
        self.values.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(SettingValue::as_str)
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(SettingValue::as_bool)
    }

    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(SettingValue::as_i64)
    }

    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(SettingValue::as_f64)
    }

    pub fn get_list(&self, key: &str) -> Option<&[String]> {
        self.get(key).and_then(SettingValue::as_list)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &SettingValue)> {
        self.values.iter().map(|(key, value)| (key.as_str(), value))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConfigKey {
    pub config_type: ConfigType,
    pub default_value: Option<SettingValue>,
}

/// Ordered set of named, typed keys with optional defaults.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigDef {
    keys: Vec<(String, ConfigKey)>,
}

impl ConfigDef {
    pub fn builder() -> ConfigDefBuilder {
        ConfigDefBuilder::default()
    }

    pub fn keys(&self) -> impl Iterator<Item = (&str, &ConfigKey)> {
        self.keys.iter().map(|(name, key)| (name.as_str(), key))
    }

    /// Resolves every declared key for the sentinel registered as
    /// `sentinel_name` from `properties`.
    pub fn map_to_settings(
        &self,
        sentinel_name: &str,
        properties: &Properties,
    ) -> Result<Settings, SentinelConfigError> {
        let mut settings = Settings::new();
        for (key, def) in &self.keys {
            let property = format!("sentinel.{sentinel_name}.{key}");
            let value = match properties.get(&property) {
                Some(raw) => parse_value(key, raw, def.config_type)?,
                None => {
                    let value = def
                        .default_value
                        .clone()
                        .ok_or(SentinelConfigError::MissingProperty(property))?;
                    debug!(sentinel = sentinel_name, key = %key, "using default setting");
                    value
                }
            };
            settings.insert(key.clone(), value);
        }
        Ok(settings)
    }
}

#[derive(Debug, Default)]
pub struct ConfigDefBuilder {
    keys: Vec<(String, ConfigKey)>,
}

impl ConfigDefBuilder {
    /// Declares a required key.
    pub fn key(mut self, name: impl Into<String>, config_type: ConfigType) -> Self {
        self.keys.push((
            name.into(),
            ConfigKey {
                config_type,
                default_value: None,
            },
        ));
        self
    }

    pub fn key_with_default(
        mut self,
        name: impl Into<String>,
        config_type: ConfigType,
        default_value: SettingValue,
    ) -> Self {
        self.keys.push((
            name.into(),
            ConfigKey {
                config_type,
                default_value: Some(default_value),
            },
        ));
        self
    }

    pub fn build(self) -> Result<ConfigDef, SentinelConfigError> {
        if let Some((name, _)) = self.keys.iter().find(|(name, _)| name.contains(' ')) {
            return Err(SentinelConfigError::KeyContainsSpace(name.clone()));
        }
        Ok(ConfigDef { keys: self.keys })
    }
}

fn parse_value(
    name: &str,
    raw: &str,
    config_type: ConfigType,
) -> Result<SettingValue, SentinelConfigError> {
    let trimmed = raw.trim();
    let invalid = |message: &str| SentinelConfigError::InvalidValue {
        name: name.to_string(),
        value: raw.to_string(),
        message: message.to_string(),
    };

    match config_type {
        ConfigType::String => Ok(SettingValue::String(trimmed.to_string())),
        ConfigType::Boolean => {
            if trimmed.eq_ignore_ascii_case("true") {
                Ok(SettingValue::Boolean(true))
            } else if trimmed.eq_ignore_ascii_case("false") {
                Ok(SettingValue::Boolean(false))
            } else {
                Err(invalid("Expected value to be either true or false"))
            }
        }
        ConfigType::Int => trimmed
            .parse()
            .map(SettingValue::Int)
            .map_err(|_| invalid("Expected value to be a 32-bit integer")),
        ConfigType::Short => trimmed
            .parse()
            .map(SettingValue::Short)
            .map_err(|_| invalid("Expected value to be a 16-bit integer (short)")),
        ConfigType::Long => trimmed
            .parse()
            .map(SettingValue::Long)
            .map_err(|_| invalid("Expected value to be a 64-bit integer (long)")),
        ConfigType::Double => trimmed
            .parse()
            .map(SettingValue::Double)
            .map_err(|_| invalid("Expected value to be a double")),
        ConfigType::List => {
            if trimmed.is_empty() {
                Ok(SettingValue::List(Vec::new()))
            } else {
                Ok(SettingValue::List(
                    trimmed.split(',').map(|item| item.trim().to_string()).collect(),
                ))
            }
        }
        ConfigType::Class => {
            if trimmed.is_empty() || trimmed.contains(char::is_whitespace) {
                Err(invalid("Expected the name of a registered sentinel kind"))
            } else {
                Ok(SettingValue::Class(trimmed.to_string()))
            }
        }
    }
}

/// Flat `key -> value` property table in the classic properties-file layout.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Properties {
    entries: BTreeMap<String, String>,
}

impl Properties {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses `key=value`, `key: value` and `key value` lines. Lines starting
    /// with `#` or `!` are comments. Later duplicates win.
    pub fn parse(text: &str) -> Self {
        let mut entries = BTreeMap::new();
        for line in text.lines() {
            let line = line.trim_start();
            if line.is_empty() || line.starts_with('#') || line.starts_with('!') {
                continue;
            }
            let split = line
                .find(|c: char| c == '=' || c == ':' || c.is_whitespace())
                .unwrap_or(line.len());
            let key = &line[..split];
            let mut rest = line[split..].trim_start();
            if let Some(stripped) = rest.strip_prefix(&['=', ':'][..]) {
                rest = stripped.trim_start();
            }
            entries.insert(key.to_string(), rest.to_string());
        }
        Self { entries }
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, SentinelConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|err| SentinelConfigError::Io {
            path: path.display().to_string(),
            message: err.to_string(),
        })?;
        Ok(Self::parse(&text))
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(key, value);
        self
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}

/// Errors raised while declaring or resolving sentinel configuration.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SentinelConfigError {
    #[error("Configuration keys must not contain spaces: \"{0}\"")]
    KeyContainsSpace(String),
    #[error("Missing required configuration property: {0}")]
    MissingProperty(String),
    #[error("Invalid value {value} for configuration {name}: {message}")]
    InvalidValue {
        name: String,
        value: String,
        message: String,
    },
    #[error("unknown sentinel kind `{kind}` for configuration {name}")]
    UnknownClass { name: String, kind: String },
    #[error("failed to read properties from {path}: {message}")]
    Io { path: String, message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_def() -> ConfigDef {
        ConfigDef::builder()
            .key_with_default("key-a", ConfigType::String, SettingValue::String("a-default".into()))
            .key_with_default("key_b", ConfigType::Long, SettingValue::Long(1000))
            .key_with_default("key.c", ConfigType::Int, SettingValue::Int(100))
            .key_with_default("key-d", ConfigType::Double, SettingValue::Double(3.005))
            .key_with_default("key-e", ConfigType::Boolean, SettingValue::Boolean(true))
            .key_with_default("key-f", ConfigType::Short, SettingValue::Short(7))
            .key("list", ConfigType::List)
            .key("class", ConfigType::Class)
            .build()
            .expect("valid def")
    }

    const PROPERTIES: &str = "\
# sentinels
sentinel.my-sentinel=referee
sentinel.my-sentinel.key-a= foo
sentinel.my-sentinel.key_b=300000
sentinel.my-sentinel.key.c=300
sentinel.my-sentinel.key-d 1.0001
sentinel.my-sentinel.key-e=FALSE
sentinel.my-sentinel.key-f: 12
sentinel.my-sentinel.list=a, b,  cdefg, h
sentinel.my-sentinel.class=referee
criteria.my-sentinel.list=x
sentinel.another=referee
sentinel.another.list=
sentinel.another.class=referee
";

    #[test]
    fn keys_with_spaces_are_rejected() {
        let err = ConfigDef::builder()
            .key("key a", ConfigType::String)
            .build()
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Configuration keys must not contain spaces: \"key a\""
        );
    }

    #[test]
    fn maps_properties_to_typed_settings() {
        let props = Properties::parse(PROPERTIES);
        let settings = test_def()
            .map_to_settings("my-sentinel", &props)
            .expect("settings map");

        assert_eq!(settings.len(), 8);
        assert_eq!(settings.get_str("key-a"), Some("foo"));
        assert_eq!(settings.get("key_b"), Some(&SettingValue::Long(300_000)));
        assert_eq!(settings.get("key.c"), Some(&SettingValue::Int(300)));
        assert_eq!(settings.get_f64("key-d"), Some(1.0001));
        assert_eq!(settings.get_bool("key-e"), Some(false));
        assert_eq!(settings.get("key-f"), Some(&SettingValue::Short(12)));
        assert_eq!(
            settings.get_list("list"),
            Some(&["a".to_string(), "b".into(), "cdefg".into(), "h".into()][..])
        );
        assert_eq!(settings.get("class"), Some(&SettingValue::Class("referee".into())));
    }

    #[test]
    fn falls_back_to_defaults() {
        let props = Properties::parse(PROPERTIES);
        let settings = test_def()
            .map_to_settings("another", &props)
            .expect("settings map");

        assert_eq!(settings.get_str("key-a"), Some("a-default"));
        assert_eq!(settings.get_i64("key_b"), Some(1000));
        assert_eq!(settings.get_i64("key.c"), Some(100));
        assert_eq!(settings.get_f64("key-d"), Some(3.005));
        assert_eq!(settings.get_bool("key-e"), Some(true));
        assert_eq!(settings.get_list("list"), Some(&[][..]));
    }

    #[test]
    fn missing_required_property_fails() {
        let props = Properties::parse("sentinel.my-sentinel.list=\n");
        let err = test_def()
            .map_to_settings("my-sentinel", &props)
            .unwrap_err();
        assert_eq!(
            err,
            SentinelConfigError::MissingProperty("sentinel.my-sentinel.class".into())
        );
    }

    #[test]
    fn malformed_numbers_are_reported() {
        let props = Properties::new()
            .with("sentinel.s.key.c", "three")
            .with("sentinel.s.list", "")
            .with("sentinel.s.class", "referee");
        let err = test_def().map_to_settings("s", &props).unwrap_err();
        assert!(matches!(
            err,
            SentinelConfigError::InvalidValue { ref name, .. } if name == "key.c"
        ));
    }

    #[test]
    fn properties_parser_handles_separators_and_comments() {
        let props = Properties::parse("! comment\n  a=1\nb : 2\nc 3\nd\n\n# x=y\n");
        assert_eq!(props.get("a"), Some("1"));
        assert_eq!(props.get("b"), Some("2"));
        assert_eq!(props.get("c"), Some("3"));
        assert_eq!(props.get("d"), Some(""));
        assert_eq!(props.get("x"), None);
        assert_eq!(props.keys().count(), 4);
    }
}
