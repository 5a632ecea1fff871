use crate::framework::errors::FerrumConduitError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A typed property value, dispatched on the Rust type that was passed to
/// [`Configuration::set`].
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    Str(String),
    Long(i64),
    Float(f64),
    Bool(bool),
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyValue::Str(value) => f.write_str(value),
            PropertyValue::Long(value) => write!(f, "{}", value),
            PropertyValue::Float(value) => write!(f, "{}", value),
            PropertyValue::Bool(value) => write!(f, "{}", value),
        }
    }
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        PropertyValue::Str(value.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(value: String) -> Self {
        PropertyValue::Str(value)
    }
}

impl From<i64> for PropertyValue {
    fn from(value: i64) -> Self {
        PropertyValue::Long(value)
    }
}

impl From<i32> for PropertyValue {
    fn from(value: i32) -> Self {
        PropertyValue::Long(value as i64)
    }
}

impl From<u32> for PropertyValue {
    fn from(value: u32) -> Self {
        PropertyValue::Long(value as i64)
    }
}

impl From<f64> for PropertyValue {
    fn from(value: f64) -> Self {
        PropertyValue::Float(value)
    }
}

impl From<f32> for PropertyValue {
    fn from(value: f32) -> Self {
        PropertyValue::Float(value as f64)
    }
}

impl From<bool> for PropertyValue {
    fn from(value: bool) -> Self {
        PropertyValue::Bool(value)
    }
}

#[derive(Debug, Deserialize, Serialize)]
struct Property {
    name: String,
    value: String,
}

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(rename = "configuration")]
struct XmlConfiguration {
    #[serde(rename = "property", default)]
    properties: Vec<Property>,
}

/// The key/value property bag attached to every job.
///
/// Everything that has to reach a task process travels through here: the
/// host only ships string properties, so typed values are stored in their
/// textual form and parsed back by the typed getters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Configuration {
    properties: BTreeMap<String, String>,
}

impl Configuration {
    pub fn new() -> Self {
        Configuration::default()
    }

    /// Loads a Hadoop style `<configuration><property>` file.
    pub fn from_xml_file(file_path: &str) -> Result<Self, FerrumConduitError> {
        let xml_str = std::fs::read_to_string(file_path).map_err(|err| {
            FerrumConduitError::ConfigError(format!("cannot read {}: {}", file_path, err))
        })?;
        Self::from_xml_str(&xml_str)
    }

    pub fn from_xml_str(xml_str: &str) -> Result<Self, FerrumConduitError> {
        let parsed: XmlConfiguration = serde_xml_rs::from_str(xml_str)?;
        let mut configuration = Configuration::new();
        for property in parsed.properties {
            configuration.properties.insert(property.name, property.value);
        }
        Ok(configuration)
    }

    /// Builds a configuration from the environment of a Hadoop Streaming
    /// task. Streaming exports job properties with every non alphanumeric
    /// character replaced by `_`, so lookups fall back to that spelling.
    pub fn from_task_environment<I>(vars: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        Configuration {
            properties: vars.into_iter().collect(),
        }
    }

    pub fn set(&mut self, property: &str, value: impl Into<PropertyValue>) {
        self.properties
            .insert(property.to_string(), value.into().to_string());
    }

    pub fn set_long(&mut self, property: &str, value: i64) {
        self.set(property, PropertyValue::Long(value));
    }

    pub fn set_float(&mut self, property: &str, value: f64) {
        self.set(property, PropertyValue::Float(value));
    }

    pub fn set_boolean(&mut self, property: &str, value: bool) {
        self.set(property, PropertyValue::Bool(value));
    }

    pub fn unset(&mut self, property: &str) -> Option<String> {
        self.properties.remove(property)
    }

    pub fn get(&self, property: &str) -> Option<&str> {
        self.properties
            .get(property)
            .or_else(|| self.properties.get(&streaming_env_name(property)))
            .map(String::as_str)
    }

    pub fn get_required(&self, property: &str) -> Result<&str, FerrumConduitError> {
        self.get(property).ok_or_else(|| {
            FerrumConduitError::ConfigError(format!(
                "Missing required configuration key {}",
                property
            ))
        })
    }

    pub fn get_long(&self, property: &str) -> Result<Option<i64>, FerrumConduitError> {
        self.parse(property, "integer")
    }

    pub fn get_float(&self, property: &str) -> Result<Option<f64>, FerrumConduitError> {
        self.parse(property, "float")
    }

    pub fn get_boolean(&self, property: &str) -> Result<Option<bool>, FerrumConduitError> {
        self.parse(property, "boolean")
    }

    fn parse<T: std::str::FromStr>(
        &self,
        property: &str,
        type_name: &str,
    ) -> Result<Option<T>, FerrumConduitError> {
        match self.get(property) {
            None => Ok(None),
            Some(raw) => raw.trim().parse::<T>().map(Some).map_err(|_| {
                FerrumConduitError::ConfigError(format!(
                    "property {} is not a valid {}: {:?}",
                    property, type_name, raw
                ))
            }),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.properties
            .iter()
            .map(|(key, value)| (key.as_str(), value.as_str()))
    }

    pub fn len(&self) -> usize {
        self.properties.len()
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }
}

/// The environment variable name Hadoop Streaming uses for a job property.
pub fn streaming_env_name(property: &str) -> String {
    property
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_values_read_back_through_their_getters() {
        let mut configuration = Configuration::new();
        configuration.set("apa", "bepa");
        configuration.set("answer", 42i64);
        configuration.set("pi", 2.5f64);
        configuration.set("flag", true);

        assert_eq!(configuration.get("apa"), Some("bepa"));
        assert_eq!(configuration.get_long("answer").unwrap(), Some(42));
        assert_eq!(configuration.get_float("pi").unwrap(), Some(2.5));
        assert_eq!(configuration.get_boolean("flag").unwrap(), Some(true));
    }

    #[test]
    fn typed_getter_rejects_malformed_values() {
        let mut configuration = Configuration::new();
        configuration.set("answer", "forty-two");
        assert!(matches!(
            configuration.get_long("answer"),
            Err(FerrumConduitError::ConfigError(_))
        ));
        assert_eq!(configuration.get_long("missing").unwrap(), None);
    }

    #[test]
    fn task_environment_lookups_use_mangled_names() {
        let configuration = Configuration::from_task_environment(vec![(
            "conduit_mapper".to_string(),
            "word_count::mapper".to_string(),
        )]);
        assert_eq!(configuration.get("conduit.mapper"), Some("word_count::mapper"));
    }

    #[test]
    fn missing_required_key_names_the_key() {
        let configuration = Configuration::new();
        let err = configuration.get_required("conduit.reducer").unwrap_err();
        assert!(err.to_string().contains("conduit.reducer"));
    }

    #[test]
    fn loads_hadoop_style_xml() {
        let xml = r#"<configuration>
            <property><name>mapreduce.job.reduces</name><value>3</value></property>
            <property><name>mapreduce.job.queuename</name><value>batch</value></property>
        </configuration>"#;
        let configuration = Configuration::from_xml_str(xml).unwrap();
        assert_eq!(configuration.get_long("mapreduce.job.reduces").unwrap(), Some(3));
        assert_eq!(configuration.get("mapreduce.job.queuename"), Some("batch"));
    }
}
