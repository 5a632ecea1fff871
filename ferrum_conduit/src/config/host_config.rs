use crate::framework::errors::FerrumConduitError;
use serde::{Deserialize, Serialize};

/// Settings for launching jobs on the host runtime, read from `conduit.xml`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HostConfig {
    #[serde(rename = "hadoop.bin", default = "default_hadoop_bin")]
    pub hadoop_bin: String,

    #[serde(rename = "streaming.jar")]
    pub streaming_jar: String,

    /// Command the host runs inside each task, `task map` etc. is appended.
    /// Defaults to the running executable when empty.
    #[serde(rename = "task.command", default)]
    pub task_command: String,

    /// Extra local files shipped to every task with `-files`.
    #[serde(rename = "task.files", default)]
    pub task_files: String,

    #[serde(rename = "dry.run", default)]
    pub dry_run: bool,
}

fn default_hadoop_bin() -> String {
    "hadoop".to_string()
}

impl Default for HostConfig {
    fn default() -> Self {
        HostConfig {
            hadoop_bin: default_hadoop_bin(),
            streaming_jar: "hadoop-streaming.jar".to_string(),
            task_command: String::new(),
            task_files: String::new(),
            dry_run: false,
        }
    }
}

impl HostConfig {
    pub fn from_xml_file(file_path: &str) -> Result<Self, FerrumConduitError> {
        let xml_str = std::fs::read_to_string(file_path)
            .map_err(|_| FerrumConduitError::ConfigError("Xml config error".to_string()))?;
        let config = serde_xml_rs::from_str(&xml_str)?;
        Ok(config)
    }
}
