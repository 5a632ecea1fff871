use crate::api::compare::{BytesComparator, RawComparator};
use crate::api::input::InputFormat;
use crate::api::map::{IdentityMapper, Mapper};
use crate::api::partition::{HashPartitioner, Partitioner};
use crate::api::reduce::{CountReducer, IdentityReducer, LongSumReducer, Reducer};
use crate::config::configuration::Configuration;
use crate::framework::errors::FerrumConduitError;
use std::collections::HashMap;
use std::fmt;
use tracing::debug;

/// The host extension points a job can bind user code to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ExtensionKind {
    Mapper,
    Reducer,
    Combiner,
    Partitioner,
    SortComparator,
    GroupingComparator,
    InputFormat,
}

impl ExtensionKind {
    pub const ALL: [ExtensionKind; 7] = [
        ExtensionKind::Mapper,
        ExtensionKind::Reducer,
        ExtensionKind::Combiner,
        ExtensionKind::Partitioner,
        ExtensionKind::SortComparator,
        ExtensionKind::GroupingComparator,
        ExtensionKind::InputFormat,
    ];

    /// The job property holding the bound implementation name.
    pub fn config_key(&self) -> &'static str {
        match self {
            ExtensionKind::Mapper => "conduit.mapper",
            ExtensionKind::Reducer => "conduit.reducer",
            ExtensionKind::Combiner => "conduit.combiner",
            ExtensionKind::Partitioner => "conduit.partitioner",
            ExtensionKind::SortComparator => "conduit.sort_comparator",
            ExtensionKind::GroupingComparator => "conduit.grouping_comparator",
            ExtensionKind::InputFormat => "conduit.input_format",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ExtensionKind::Mapper => "mapper",
            ExtensionKind::Reducer => "reducer",
            ExtensionKind::Combiner => "combiner",
            ExtensionKind::Partitioner => "partitioner",
            ExtensionKind::SortComparator => "sort comparator",
            ExtensionKind::GroupingComparator => "grouping comparator",
            ExtensionKind::InputFormat => "input format",
        }
    }
}

impl fmt::Display for ExtensionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

type Factory<T> = Box<dyn Fn() -> Box<T> + Send + Sync>;

/// Name to factory tables, one per extension point.
///
/// Populated once at process start by the job binary; task processes run the
/// same binary, so the same names resolve on both sides.
#[derive(Default)]
pub struct Registry {
    mappers: HashMap<String, Factory<dyn Mapper>>,
    reducers: HashMap<String, Factory<dyn Reducer>>,
    partitioners: HashMap<String, Factory<dyn Partitioner>>,
    comparators: HashMap<String, Factory<dyn RawComparator>>,
    input_formats: HashMap<String, Factory<dyn InputFormat>>,
}

impl Registry {
    pub fn new() -> Self {
        Registry::default()
    }

    /// A registry with the stock implementations under `conduit::*` names.
    pub fn with_builtins() -> Self {
        let mut registry = Registry::new();
        registry
            .register_mapper("conduit::identity_mapper", || IdentityMapper)
            .register_reducer("conduit::identity_reducer", || IdentityReducer)
            .register_reducer("conduit::count_reducer", || CountReducer)
            .register_reducer("conduit::long_sum_reducer", || LongSumReducer)
            .register_partitioner("conduit::hash_partitioner", || HashPartitioner)
            .register_comparator("conduit::bytes_comparator", || BytesComparator);
        registry
    }

    pub fn register_mapper<M, F>(&mut self, name: &str, factory: F) -> &mut Self
    where
        M: Mapper + 'static,
        F: Fn() -> M + Send + Sync + 'static,
    {
        self.mappers.insert(
            name.to_string(),
            Box::new(move || -> Box<dyn Mapper> { Box::new(factory()) }),
        );
        self
    }

    /// Reducers and combiners share one table.
    pub fn register_reducer<R, F>(&mut self, name: &str, factory: F) -> &mut Self
    where
        R: Reducer + 'static,
        F: Fn() -> R + Send + Sync + 'static,
    {
        self.reducers.insert(
            name.to_string(),
            Box::new(move || -> Box<dyn Reducer> { Box::new(factory()) }),
        );
        self
    }

    pub fn register_partitioner<P, F>(&mut self, name: &str, factory: F) -> &mut Self
    where
        P: Partitioner + 'static,
        F: Fn() -> P + Send + Sync + 'static,
    {
        self.partitioners.insert(
            name.to_string(),
            Box::new(move || -> Box<dyn Partitioner> { Box::new(factory()) }),
        );
        self
    }

    /// Sort and grouping comparators share one table.
    pub fn register_comparator<C, F>(&mut self, name: &str, factory: F) -> &mut Self
    where
        C: RawComparator + 'static,
        F: Fn() -> C + Send + Sync + 'static,
    {
        self.comparators.insert(
            name.to_string(),
            Box::new(move || -> Box<dyn RawComparator> { Box::new(factory()) }),
        );
        self
    }

    pub fn register_input_format<I, F>(&mut self, name: &str, factory: F) -> &mut Self
    where
        I: InputFormat + 'static,
        F: Fn() -> I + Send + Sync + 'static,
    {
        self.input_formats.insert(
            name.to_string(),
            Box::new(move || -> Box<dyn InputFormat> { Box::new(factory()) }),
        );
        self
    }

    pub fn contains(&self, kind: ExtensionKind, name: &str) -> bool {
        match kind {
            ExtensionKind::Mapper => self.mappers.contains_key(name),
            ExtensionKind::Reducer | ExtensionKind::Combiner => self.reducers.contains_key(name),
            ExtensionKind::Partitioner => self.partitioners.contains_key(name),
            ExtensionKind::SortComparator | ExtensionKind::GroupingComparator => {
                self.comparators.contains_key(name)
            }
            ExtensionKind::InputFormat => self.input_formats.contains_key(name),
        }
    }

    pub fn create_mapper(&self, configuration: &Configuration) -> Result<Box<dyn Mapper>, FerrumConduitError> {
        let name = bound_name(configuration, ExtensionKind::Mapper)?;
        instantiate(&self.mappers, ExtensionKind::Mapper, name)
    }

    /// `kind` is either [`ExtensionKind::Reducer`] or [`ExtensionKind::Combiner`].
    pub fn create_reducer(
        &self,
        configuration: &Configuration,
        kind: ExtensionKind,
    ) -> Result<Box<dyn Reducer>, FerrumConduitError> {
        let name = bound_name(configuration, kind)?;
        instantiate(&self.reducers, kind, name)
    }

    pub fn create_partitioner(
        &self,
        configuration: &Configuration,
    ) -> Result<Box<dyn Partitioner>, FerrumConduitError> {
        let name = bound_name(configuration, ExtensionKind::Partitioner)?;
        instantiate(&self.partitioners, ExtensionKind::Partitioner, name)
    }

    /// `kind` is either [`ExtensionKind::SortComparator`] or
    /// [`ExtensionKind::GroupingComparator`].
    pub fn create_comparator(
        &self,
        configuration: &Configuration,
        kind: ExtensionKind,
    ) -> Result<Box<dyn RawComparator>, FerrumConduitError> {
        let name = bound_name(configuration, kind)?;
        instantiate(&self.comparators, kind, name)
    }

    pub fn create_input_format(
        &self,
        configuration: &Configuration,
    ) -> Result<Box<dyn InputFormat>, FerrumConduitError> {
        let name = bound_name(configuration, ExtensionKind::InputFormat)?;
        instantiate(&self.input_formats, ExtensionKind::InputFormat, name)
    }
}

fn bound_name(configuration: &Configuration, kind: ExtensionKind) -> Result<&str, FerrumConduitError> {
    configuration.get_required(kind.config_key())
}

fn instantiate<T: ?Sized>(
    table: &HashMap<String, Factory<T>>,
    kind: ExtensionKind,
    name: &str,
) -> Result<Box<T>, FerrumConduitError> {
    match table.get(name) {
        Some(factory) => {
            debug!("instantiating {} {}", kind, name);
            Ok(factory())
        }
        None => Err(FerrumConduitError::ConfigError(format!(
            "Cannot load {} {}: no such implementation is registered",
            kind, name
        ))),
    }
}
