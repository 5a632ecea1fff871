use crate::config::configuration::Configuration;
use crate::core::registry::ExtensionKind;
use crate::framework::errors::FerrumConduitError;
use std::sync::Arc;
use uuid::Uuid;

pub const JOB_NAME_KEY: &str = "mapreduce.job.name";
pub const INPUT_DIR_KEY: &str = "mapreduce.input.fileinputformat.inputdir";
pub const INPUT_FORMAT_KEY: &str = "mapreduce.job.inputformat.class";
pub const OUTPUT_DIR_KEY: &str = "mapreduce.output.fileoutputformat.outputdir";
pub const OUTPUT_FORMAT_KEY: &str = "mapreduce.job.outputformat.class";
pub const LAZY_OUTPUT_FORMAT_KEY: &str = "mapreduce.output.lazyoutputformat.outputformat";
pub const MAP_OUTPUT_KEY_KEY: &str = "mapreduce.map.output.key.class";
pub const MAP_OUTPUT_VALUE_KEY: &str = "mapreduce.map.output.value.class";
pub const OUTPUT_KEY_KEY: &str = "mapreduce.job.output.key.class";
pub const OUTPUT_VALUE_KEY: &str = "mapreduce.job.output.value.class";
pub const JOB_SETUP_SCRIPT_KEY: &str = "conduit.job_setup_script";
pub const NUM_REDUCES_KEY: &str = "mapreduce.job.reduces";

pub const DEFAULT_INPUT_FORMAT: &str = "org.apache.hadoop.mapreduce.lib.input.TextInputFormat";
pub const DEFAULT_OUTPUT_FORMAT: &str = "org.apache.hadoop.mapreduce.lib.output.TextOutputFormat";
pub const LAZY_OUTPUT_FORMAT: &str = "org.apache.hadoop.mapreduce.lib.output.LazyOutputFormat";
/// Jobs bound to a registered [`InputFormat`](crate::api::input::InputFormat)
/// read a file of split descriptors, one line per map task. The task then
/// opens the split through the bound implementation.
pub const SPLIT_INPUT_FORMAT: &str = "org.apache.hadoop.mapred.lib.NLineInputFormat";

const INPUT_PACKAGE: &str = "org.apache.hadoop.mapreduce.lib.input";
const OUTPUT_PACKAGE: &str = "org.apache.hadoop.mapreduce.lib.output";
const INPUT_SHORTHANDS: [&str; 6] = [
    "text",
    "key_value_text",
    "sequence_file",
    "n_line",
    "combine_text",
    "fixed_length",
];
const OUTPUT_SHORTHANDS: [&str; 4] = ["text", "sequence_file", "map_file", "null"];

/// How a job refers to an input or output format.
#[derive(Debug, Clone, PartialEq)]
pub enum Format {
    /// `text`, `key_value_text`, `sequence_file`, …
    Shorthand(String),
    /// A fully qualified host class name, used as is.
    Class(String),
    /// An input format registered under this name, read split by split
    /// inside the map task.
    Registered(String),
}

impl Format {
    pub fn shorthand(name: &str) -> Self {
        Format::Shorthand(name.to_string())
    }

    pub fn class(name: &str) -> Self {
        Format::Class(name.to_string())
    }

    pub fn registered(name: &str) -> Self {
        Format::Registered(name.to_string())
    }
}

impl Default for Format {
    fn default() -> Self {
        Format::shorthand("text")
    }
}

/// Turns `key_value_text` into `KeyValueTextInputFormat` and friends.
fn camelize(shorthand: &str) -> String {
    shorthand
        .split('_')
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect()
}

pub fn resolve_input_format(format: &Format) -> Result<String, FerrumConduitError> {
    resolve(format, &INPUT_SHORTHANDS, INPUT_PACKAGE, "InputFormat")
}

pub fn resolve_output_format(format: &Format) -> Result<String, FerrumConduitError> {
    match format {
        Format::Registered(name) => Err(FerrumConduitError::ConfigError(format!(
            "output format {} cannot be bound to registered code",
            name
        ))),
        _ => resolve(format, &OUTPUT_SHORTHANDS, OUTPUT_PACKAGE, "OutputFormat"),
    }
}

fn resolve(
    format: &Format,
    shorthands: &[&str],
    package: &str,
    suffix: &str,
) -> Result<String, FerrumConduitError> {
    match format {
        Format::Class(class_name) => Ok(class_name.clone()),
        Format::Registered(_) => Ok(SPLIT_INPUT_FORMAT.to_string()),
        Format::Shorthand(shorthand) if shorthands.contains(&shorthand.as_str()) => {
            Ok(format!("{}.{}{}", package, camelize(shorthand), suffix))
        }
        Format::Shorthand(shorthand) => Err(FerrumConduitError::ConfigError(format!(
            "unknown format {:?}, expected one of {}",
            shorthand,
            shorthands.join(", ")
        ))),
    }
}

/// Whether map output carries the bound partitioner's choice as a leading
/// key field. Only jobs that shuffle to a reducer need it.
pub fn carries_partition_field(configuration: &Configuration) -> bool {
    configuration.get(ExtensionKind::Partitioner.config_key()).is_some()
        && configuration.get(ExtensionKind::Reducer.config_key()).is_some()
}

/// One unit of work submitted to the host runtime.
///
/// Every setting lives in the job's [`Configuration`] under the key the host
/// reads it from, which is also how task processes learn about bindings.
#[derive(Debug, Clone, PartialEq)]
pub struct JobSpec {
    pub id: Uuid,
    pub name: String,
    pub configuration: Configuration,
}

impl JobSpec {
    pub fn new(name: &str, base: &Configuration) -> Self {
        let mut configuration = base.clone();
        configuration.set(JOB_NAME_KEY, name);
        Self {
            id: Uuid::new_v4(),
            name: name.to_string(),
            configuration,
        }
    }

    pub fn binding(&self, kind: ExtensionKind) -> Option<&str> {
        self.configuration.get(kind.config_key())
    }

    pub fn bindings(&self) -> impl Iterator<Item = (ExtensionKind, &str)> {
        ExtensionKind::ALL
            .into_iter()
            .filter_map(move |kind| self.binding(kind).map(|name| (kind, name)))
    }

    pub fn input_paths(&self) -> Option<&str> {
        self.configuration.get(INPUT_DIR_KEY)
    }

    pub fn input_format(&self) -> &str {
        self.configuration
            .get(INPUT_FORMAT_KEY)
            .unwrap_or(DEFAULT_INPUT_FORMAT)
    }

    pub fn output_path(&self) -> Option<&str> {
        self.configuration.get(OUTPUT_DIR_KEY)
    }

    /// The format records are written with; for lazy output this is the
    /// wrapped format rather than the lazy wrapper.
    pub fn output_format(&self) -> &str {
        self.configuration
            .get(LAZY_OUTPUT_FORMAT_KEY)
            .or_else(|| self.configuration.get(OUTPUT_FORMAT_KEY))
            .unwrap_or(DEFAULT_OUTPUT_FORMAT)
    }

    pub fn is_lazy_output(&self) -> bool {
        self.configuration.get(OUTPUT_FORMAT_KEY) == Some(LAZY_OUTPUT_FORMAT)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupKind {
    Sequence,
    Parallel,
}

#[derive(Debug, Clone)]
pub enum JobNode {
    Job(Arc<JobSpec>),
    Group(JobGroup),
}

/// A sequence or parallel composition of jobs and nested groups.
#[derive(Debug, Clone)]
pub struct JobGroup {
    pub kind: GroupKind,
    pub members: Vec<JobNode>,
}

impl JobGroup {
    pub fn new(kind: GroupKind) -> Self {
        JobGroup {
            kind,
            members: Vec::new(),
        }
    }

    pub fn sequence() -> Self {
        JobGroup::new(GroupKind::Sequence)
    }

    pub fn parallel() -> Self {
        JobGroup::new(GroupKind::Parallel)
    }

    pub fn add_job(&mut self, job: JobSpec) {
        self.members.push(JobNode::Job(Arc::new(job)));
    }

    pub fn add_group(&mut self, group: JobGroup) {
        self.members.push(JobNode::Group(group));
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Every job in the tree, depth first in declaration order.
    pub fn jobs(&self) -> Vec<Arc<JobSpec>> {
        let mut jobs = Vec::new();
        for member in &self.members {
            match member {
                JobNode::Job(job) => jobs.push(job.clone()),
                JobNode::Group(group) => jobs.extend(group.jobs()),
            }
        }
        jobs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shorthands_camelize_into_host_classes() {
        assert_eq!(
            resolve_input_format(&Format::shorthand("key_value_text")).unwrap(),
            "org.apache.hadoop.mapreduce.lib.input.KeyValueTextInputFormat"
        );
        assert_eq!(
            resolve_output_format(&Format::shorthand("sequence_file")).unwrap(),
            "org.apache.hadoop.mapreduce.lib.output.SequenceFileOutputFormat"
        );
        assert_eq!(
            resolve_input_format(&Format::default()).unwrap(),
            DEFAULT_INPUT_FORMAT
        );
    }

    #[test]
    fn unknown_shorthand_is_a_config_error() {
        let err = resolve_input_format(&Format::shorthand("parquet")).unwrap_err();
        assert!(matches!(err, FerrumConduitError::ConfigError(_)));
    }

    #[test]
    fn explicit_classes_pass_through() {
        let class = "com.example.CustomOutputFormat";
        assert_eq!(resolve_output_format(&Format::class(class)).unwrap(), class);
    }

    #[test]
    fn registered_input_formats_read_split_descriptors() {
        assert_eq!(
            resolve_input_format(&Format::registered("my::format")).unwrap(),
            SPLIT_INPUT_FORMAT
        );
        assert!(resolve_output_format(&Format::registered("my::format")).is_err());
    }

    #[test]
    fn new_job_copies_the_base_configuration() {
        let mut base = Configuration::new();
        base.set("mapreduce.job.queuename", "batch");
        let job = JobSpec::new("word_count", &base);
        assert_eq!(job.configuration.get("mapreduce.job.queuename"), Some("batch"));
        assert_eq!(job.configuration.get(JOB_NAME_KEY), Some("word_count"));
        assert!(base.get(JOB_NAME_KEY).is_none());
    }

    #[test]
    fn jobs_are_listed_in_declaration_order() {
        let base = Configuration::new();
        let mut inner = JobGroup::parallel();
        inner.add_job(JobSpec::new("b", &base));
        inner.add_job(JobSpec::new("c", &base));
        let mut root = JobGroup::sequence();
        root.add_job(JobSpec::new("a", &base));
        root.add_group(inner);
        root.add_job(JobSpec::new("d", &base));

        let names: Vec<String> = root.jobs().iter().map(|job| job.name.clone()).collect();
        assert_eq!(names, vec!["a", "b", "c", "d"]);
    }
}
