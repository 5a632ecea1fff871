use crate::core::job::Format;
use crate::framework::dsl::{ConfigurationDefinition, InputOptions, JobDefinition, OutputOptions};
use crate::framework::errors::{FerrumConduitError, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

/// A job setup written as YAML instead of code.
///
/// ```yaml
/// jobs:
///   - job:
///       name: word_count
///       input: { paths: [$1] }
///       output: { dir: $2 }
///       mapper: word_count::mapper
///       reducer: conduit::long_sum_reducer
///   - parallel:
///       - job: { name: a, input: { paths: [x] }, output: { intermediate: true } }
/// ```
///
/// Every string may reference positional arguments as `$1`, `$2`, …
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SetupFile {
    #[serde(default)]
    pub jobs: Vec<Node>,
}

/// Exactly one of the three fields is set.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Node {
    pub job: Option<JobBlock>,
    pub sequence: Option<Vec<Node>>,
    pub parallel: Option<Vec<Node>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JobBlock {
    pub name: String,
    pub input: Option<InputBlock>,
    pub output: Option<OutputBlock>,
    pub mapper: Option<String>,
    pub reducer: Option<String>,
    pub combiner: Option<String>,
    pub partitioner: Option<String>,
    pub sort_comparator: Option<String>,
    pub grouping_comparator: Option<String>,
    pub map_output_key: Option<String>,
    pub map_output_value: Option<String>,
    pub output_key: Option<String>,
    pub output_value: Option<String>,
    #[serde(default)]
    pub properties: BTreeMap<String, serde_yaml::Value>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InputBlock {
    pub paths: Vec<String>,
    pub format: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OutputBlock {
    pub dir: Option<String>,
    pub format: Option<String>,
    #[serde(default)]
    pub intermediate: bool,
    #[serde(default)]
    pub lazy: bool,
}

/// `a.b.Class` is a host class, `crate::name` a registered implementation,
/// anything else a shorthand.
fn parse_format(format: &str) -> Format {
    if format.contains("::") {
        Format::registered(format)
    } else if format.contains('.') {
        Format::class(format)
    } else {
        Format::shorthand(format)
    }
}

/// Replaces `$N` with the N-th positional argument.
fn substitute(text: &str, arguments: &[String]) -> Result<String> {
    let mut result = String::with_capacity(text.len());
    let mut chars = text.char_indices().peekable();
    while let Some((_, c)) = chars.next() {
        if c != '$' {
            result.push(c);
            continue;
        }
        let mut digits = String::new();
        while let Some((_, d)) = chars.peek() {
            if !d.is_ascii_digit() {
                break;
            }
            digits.push(*d);
            chars.next();
        }
        if digits.is_empty() {
            result.push('$');
            continue;
        }
        let index: usize = digits
            .parse()
            .map_err(|_| FerrumConduitError::ArgumentError(format!("bad argument reference ${}", digits)))?;
        match index.checked_sub(1).and_then(|i| arguments.get(i)) {
            Some(argument) => result.push_str(argument),
            None => {
                return Err(FerrumConduitError::ArgumentError(format!(
                    "setup references ${} but {} arguments were given",
                    index,
                    arguments.len()
                )))
            }
        }
    }
    Ok(result)
}

impl SetupFile {
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        let yaml = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&yaml)
    }

    /// Replays the file through the definition, top level jobs going into
    /// the implicit sequence.
    pub fn apply(&self, definition: &mut ConfigurationDefinition) -> Result<()> {
        apply_nodes(&self.jobs, definition)
    }
}

fn apply_nodes(nodes: &[Node], definition: &mut ConfigurationDefinition) -> Result<()> {
    for node in nodes {
        match (&node.job, &node.sequence, &node.parallel) {
            (Some(job), None, None) => {
                let arguments = definition.arguments().to_vec();
                let name = substitute(&job.name, &arguments)?;
                definition.job(&name, |body| apply_job(job, body, &arguments))?;
            }
            (None, Some(members), None) => {
                definition.sequence(|inner| apply_nodes(members, inner))?;
            }
            (None, None, Some(members)) => {
                definition.parallel(|inner| apply_nodes(members, inner))?;
            }
            _ => {
                return Err(FerrumConduitError::ConfigError(
                    "each setup entry needs exactly one of job, sequence or parallel".to_string(),
                ))
            }
        }
    }
    Ok(())
}

type Setter = for<'a, 'b> fn(&'a mut JobDefinition, &'b str) -> &'a mut JobDefinition;

fn apply_job(block: &JobBlock, job: &mut JobDefinition, arguments: &[String]) -> Result<()> {
    let sub = |text: &str| substitute(text, arguments);

    if let Some(input) = &block.input {
        let paths = input
            .paths
            .iter()
            .map(|path| sub(path.as_str()))
            .collect::<Result<Vec<String>>>()?;
        let format = match &input.format {
            Some(format) => parse_format(&sub(format.as_str())?),
            None => Format::default(),
        };
        job.input(paths, InputOptions { format })?;
    }

    if let Some(output) = &block.output {
        let dir = output.dir.as_deref().map(|dir| sub(dir)).transpose()?;
        let format = match &output.format {
            Some(format) => parse_format(&sub(format.as_str())?),
            None => Format::default(),
        };
        job.output(
            dir.as_deref(),
            OutputOptions {
                format,
                intermediate: output.intermediate,
                lazy: output.lazy,
            },
        )?;
    }

    let setters: [(&Option<String>, Setter); 10] = [
        (&block.mapper, JobDefinition::set_mapper),
        (&block.reducer, JobDefinition::set_reducer),
        (&block.combiner, JobDefinition::set_combiner),
        (&block.partitioner, JobDefinition::set_partitioner),
        (&block.sort_comparator, JobDefinition::set_sort_comparator),
        (&block.grouping_comparator, JobDefinition::set_grouping_comparator),
        (&block.map_output_key, JobDefinition::set_map_output_key),
        (&block.map_output_value, JobDefinition::set_map_output_value),
        (&block.output_key, JobDefinition::set_output_key),
        (&block.output_value, JobDefinition::set_output_value),
    ];
    for (value, setter) in setters {
        if let Some(value) = value {
            setter(job, &sub(value.as_str())?);
        }
    }

    for (property, value) in &block.properties {
        match value {
            serde_yaml::Value::Bool(flag) => {
                job.set(property, *flag);
            }
            serde_yaml::Value::Number(number) => match number.as_i64() {
                Some(long) => {
                    job.set(property, long);
                }
                None => {
                    job.set(property, number.as_f64().unwrap_or_default());
                }
            },
            serde_yaml::Value::String(text) => {
                job.set(property, sub(text.as_str())?);
            }
            _ => {
                return Err(FerrumConduitError::ConfigError(format!(
                    "property {} must be a string, number or boolean",
                    property
                )))
            }
        }
    }
    Ok(())
}
