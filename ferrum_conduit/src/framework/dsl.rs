use crate::config::configuration::{Configuration, PropertyValue};
use crate::core::job::{
    resolve_input_format, resolve_output_format, Format, GroupKind, JobGroup, JobSpec,
    INPUT_DIR_KEY, INPUT_FORMAT_KEY, LAZY_OUTPUT_FORMAT, LAZY_OUTPUT_FORMAT_KEY,
    MAP_OUTPUT_KEY_KEY, MAP_OUTPUT_VALUE_KEY, OUTPUT_DIR_KEY, OUTPUT_FORMAT_KEY, OUTPUT_KEY_KEY,
    OUTPUT_VALUE_KEY,
};
use crate::core::registry::ExtensionKind;
use crate::framework::errors::{FerrumConduitError, Result};
use rand::Rng;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::LazyLock;
use tracing::debug;

static INTERMEDIATE_SEED: LazyLock<u32> = LazyLock::new(|| rand::rng().random_range(0..100_000));
static INTERMEDIATE_SEQUENCE: AtomicU32 = AtomicU32::new(0);

/// `<base>-<unix seconds>-<suffix>`; suffixes never repeat within a process
/// until 100000 paths have been handed out.
fn intermediate_path(base: &str) -> String {
    let sequence = INTERMEDIATE_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    let suffix = (*INTERMEDIATE_SEED).wrapping_add(sequence) % 100_000;
    format!("{}-{:010}-{:05}", base, chrono::Utc::now().timestamp(), suffix)
}

/// One path or an ordered list of paths.
#[derive(Debug, Clone, PartialEq)]
pub struct Paths(Vec<String>);

impl Paths {
    fn joined(&self) -> String {
        self.0.join(",")
    }
}

impl From<&str> for Paths {
    fn from(path: &str) -> Self {
        Paths(vec![path.to_string()])
    }
}

impl From<String> for Paths {
    fn from(path: String) -> Self {
        Paths(vec![path])
    }
}

impl From<Vec<String>> for Paths {
    fn from(paths: Vec<String>) -> Self {
        Paths(paths)
    }
}

impl From<Vec<&str>> for Paths {
    fn from(paths: Vec<&str>) -> Self {
        Paths(paths.into_iter().map(String::from).collect())
    }
}

impl<const N: usize> From<[&str; N]> for Paths {
    fn from(paths: [&str; N]) -> Self {
        Paths(paths.into_iter().map(String::from).collect())
    }
}

#[derive(Debug, Clone, Default)]
pub struct InputOptions {
    pub format: Format,
}

#[derive(Debug, Clone, Default)]
pub struct OutputOptions {
    pub format: Format,
    /// Derive a fresh, unique path from the directory (or the job name).
    pub intermediate: bool,
    /// Only create output files once a record is written.
    pub lazy: bool,
}

/// The body of a `job` block.
pub struct JobDefinition {
    spec: JobSpec,
    output_dir: Option<String>,
}

impl JobDefinition {
    pub fn new(spec: JobSpec) -> Self {
        JobDefinition {
            spec,
            output_dir: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.spec.name
    }

    pub fn input(&mut self, paths: impl Into<Paths>, options: InputOptions) -> Result<&mut Self> {
        let class = resolve_input_format(&options.format)?;
        let binding = ExtensionKind::InputFormat.config_key();
        match &options.format {
            Format::Registered(name) => self.spec.configuration.set(binding, name.as_str()),
            _ => {
                self.spec.configuration.unset(binding);
            }
        }
        let paths: Paths = paths.into();
        self.spec.configuration.set(INPUT_DIR_KEY, paths.joined());
        self.spec.configuration.set(INPUT_FORMAT_KEY, class);
        Ok(self)
    }

    /// Sets the output directory and format and returns the path the job
    /// will write to.
    pub fn output(&mut self, dir: Option<&str>, options: OutputOptions) -> Result<String> {
        let path = match (dir, options.intermediate) {
            (Some(dir), false) => dir.to_string(),
            (Some(dir), true) => intermediate_path(dir),
            (None, true) => intermediate_path(&self.spec.name),
            (None, false) => {
                return Err(FerrumConduitError::ArgumentError(
                    "neither dir nor intermediate specified".to_string(),
                ))
            }
        };
        let class = resolve_output_format(&options.format)?;

        let configuration = &mut self.spec.configuration;
        if options.lazy {
            configuration.set(OUTPUT_FORMAT_KEY, LAZY_OUTPUT_FORMAT);
            configuration.set(LAZY_OUTPUT_FORMAT_KEY, class);
        } else {
            configuration.set(OUTPUT_FORMAT_KEY, class);
            configuration.unset(LAZY_OUTPUT_FORMAT_KEY);
        }
        configuration.set(OUTPUT_DIR_KEY, path.as_str());
        debug!("job {} writes to {}", self.spec.name, path);

        self.output_dir = Some(path.clone());
        Ok(path)
    }

    /// The path chosen by the last `output` call.
    pub fn output_dir(&self) -> Option<&str> {
        self.output_dir.as_deref()
    }

    pub fn set(&mut self, property: &str, value: impl Into<PropertyValue>) -> &mut Self {
        self.spec.configuration.set(property, value);
        self
    }

    pub fn get(&self, property: &str) -> Option<&str> {
        self.spec.configuration.get(property)
    }

    /// Direct access to the job for settings the definition does not cover.
    pub fn raw<T>(&mut self, f: impl FnOnce(&mut JobSpec) -> T) -> T {
        f(&mut self.spec)
    }

    fn bind(&mut self, kind: ExtensionKind, name: &str) -> &mut Self {
        self.spec.configuration.set(kind.config_key(), name);
        self
    }

    pub fn set_mapper(&mut self, name: &str) -> &mut Self {
        self.bind(ExtensionKind::Mapper, name)
    }

    pub fn mapper(&self) -> Option<&str> {
        self.spec.binding(ExtensionKind::Mapper)
    }

    pub fn set_reducer(&mut self, name: &str) -> &mut Self {
        self.bind(ExtensionKind::Reducer, name)
    }

    pub fn reducer(&self) -> Option<&str> {
        self.spec.binding(ExtensionKind::Reducer)
    }

    pub fn set_combiner(&mut self, name: &str) -> &mut Self {
        self.bind(ExtensionKind::Combiner, name)
    }

    pub fn combiner(&self) -> Option<&str> {
        self.spec.binding(ExtensionKind::Combiner)
    }

    pub fn set_partitioner(&mut self, name: &str) -> &mut Self {
        self.bind(ExtensionKind::Partitioner, name)
    }

    pub fn partitioner(&self) -> Option<&str> {
        self.spec.binding(ExtensionKind::Partitioner)
    }

    pub fn set_sort_comparator(&mut self, name: &str) -> &mut Self {
        self.bind(ExtensionKind::SortComparator, name)
    }

    pub fn sort_comparator(&self) -> Option<&str> {
        self.spec.binding(ExtensionKind::SortComparator)
    }

    pub fn set_grouping_comparator(&mut self, name: &str) -> &mut Self {
        self.bind(ExtensionKind::GroupingComparator, name)
    }

    pub fn grouping_comparator(&self) -> Option<&str> {
        self.spec.binding(ExtensionKind::GroupingComparator)
    }

    pub fn set_map_output_key(&mut self, class: &str) -> &mut Self {
        self.set(MAP_OUTPUT_KEY_KEY, class)
    }

    pub fn map_output_key(&self) -> Option<&str> {
        self.get(MAP_OUTPUT_KEY_KEY)
    }

    pub fn set_map_output_value(&mut self, class: &str) -> &mut Self {
        self.set(MAP_OUTPUT_VALUE_KEY, class)
    }

    pub fn map_output_value(&self) -> Option<&str> {
        self.get(MAP_OUTPUT_VALUE_KEY)
    }

    pub fn set_output_key(&mut self, class: &str) -> &mut Self {
        self.set(OUTPUT_KEY_KEY, class)
    }

    pub fn output_key(&self) -> Option<&str> {
        self.get(OUTPUT_KEY_KEY)
    }

    pub fn set_output_value(&mut self, class: &str) -> &mut Self {
        self.set(OUTPUT_VALUE_KEY, class)
    }

    pub fn output_value(&self) -> Option<&str> {
        self.get(OUTPUT_VALUE_KEY)
    }

    pub fn into_spec(self) -> JobSpec {
        self.spec
    }
}

/// Collects jobs and groups into a tree rooted at an implicit sequence.
pub struct ConfigurationDefinition {
    base: Configuration,
    arguments: Vec<String>,
    root: JobGroup,
    open: Vec<JobGroup>,
}

impl ConfigurationDefinition {
    pub fn new(base: Configuration, arguments: Vec<String>) -> Self {
        ConfigurationDefinition {
            base,
            arguments,
            root: JobGroup::sequence(),
            open: Vec::new(),
        }
    }

    /// Positional arguments given after the setup on the command line.
    pub fn arguments(&self) -> &[String] {
        &self.arguments
    }

    pub fn base(&self) -> &Configuration {
        &self.base
    }

    fn current(&mut self) -> &mut JobGroup {
        match self.open.last_mut() {
            Some(group) => group,
            None => &mut self.root,
        }
    }

    pub fn job<F>(&mut self, name: &str, body: F) -> Result<()>
    where
        F: FnOnce(&mut JobDefinition) -> Result<()>,
    {
        let mut definition = JobDefinition::new(JobSpec::new(name, &self.base));
        body(&mut definition)?;
        debug!("defined job {}", name);
        self.current().add_job(definition.into_spec());
        Ok(())
    }

    pub fn sequence<F>(&mut self, body: F) -> Result<()>
    where
        F: FnOnce(&mut ConfigurationDefinition) -> Result<()>,
    {
        self.group(GroupKind::Sequence, body)
    }

    pub fn parallel<F>(&mut self, body: F) -> Result<()>
    where
        F: FnOnce(&mut ConfigurationDefinition) -> Result<()>,
    {
        self.group(GroupKind::Parallel, body)
    }

    fn group<F>(&mut self, kind: GroupKind, body: F) -> Result<()>
    where
        F: FnOnce(&mut ConfigurationDefinition) -> Result<()>,
    {
        self.open.push(JobGroup::new(kind));
        let result = body(self);
        if let Some(group) = self.open.pop() {
            if result.is_ok() {
                self.current().add_group(group);
            }
        }
        result
    }

    pub fn into_root(self) -> JobGroup {
        self.root
    }
}
