use crate::api::compare::RawComparator;
use crate::api::context::TaskContext;
use crate::api::input::{InputFormat, InputSplit, RecordReader};
use crate::api::map::Mapper;
use crate::api::partition::Partitioner;
use crate::api::reduce::{Reducer, Values};
use crate::config::configuration::Configuration;
use crate::core::registry::{ExtensionKind, Registry};
use crate::framework::errors::{FerrumConduitError, Result, TaskError};
use std::cmp::Ordering;
use tracing::debug;

/// Lifecycle of a task scoped proxy. `Processing` repeats once per record or
/// key group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyState {
    Uninitialized,
    SetupComplete,
    Processing,
    CleanupComplete,
}

impl ProxyState {
    fn describe(&self) -> &'static str {
        match self {
            ProxyState::Uninitialized => "uninitialized",
            ProxyState::SetupComplete => "set up",
            ProxyState::Processing => "processing",
            ProxyState::CleanupComplete => "cleaned up",
        }
    }

    fn is_active(&self) -> bool {
        matches!(self, ProxyState::SetupComplete | ProxyState::Processing)
    }
}

fn lifecycle(kind: ExtensionKind, operation: &'static str, state: ProxyState) -> TaskError {
    TaskError::Lifecycle {
        kind,
        operation,
        state: state.describe(),
    }
}

/// Runs the bound mapper for one map task.
pub struct MapperProxy<'r> {
    registry: &'r Registry,
    instance: Option<Box<dyn Mapper>>,
    state: ProxyState,
}

impl<'r> MapperProxy<'r> {
    pub fn new(registry: &'r Registry) -> Self {
        MapperProxy {
            registry,
            instance: None,
            state: ProxyState::Uninitialized,
        }
    }

    pub fn state(&self) -> ProxyState {
        self.state
    }

    /// Resolves the bound mapper from the task configuration and calls its
    /// `setup`.
    pub fn setup(&mut self, ctx: &mut TaskContext<'_>) -> Result<()> {
        if self.state != ProxyState::Uninitialized {
            return Err(lifecycle(ExtensionKind::Mapper, "setup", self.state).into());
        }
        let instance = self.instance.insert(self.registry.create_mapper(ctx.configuration())?);
        instance
            .setup(ctx)
            .map_err(|err| TaskError::failed(ExtensionKind::Mapper, "setup", err))?;
        self.state = ProxyState::SetupComplete;
        Ok(())
    }

    pub fn map(&mut self, key: String, value: String, ctx: &mut TaskContext<'_>) -> Result<()> {
        let instance = match (&mut self.instance, self.state.is_active()) {
            (Some(instance), true) => instance,
            _ => return Err(lifecycle(ExtensionKind::Mapper, "map", self.state).into()),
        };
        instance
            .map(key, value, ctx)
            .map_err(|err| TaskError::failed(ExtensionKind::Mapper, "map", err))?;
        self.state = ProxyState::Processing;
        Ok(())
    }

    pub fn cleanup(&mut self, ctx: &mut TaskContext<'_>) -> Result<()> {
        let instance = match (&mut self.instance, self.state.is_active()) {
            (Some(instance), true) => instance,
            _ => return Err(lifecycle(ExtensionKind::Mapper, "cleanup", self.state).into()),
        };
        instance
            .cleanup(ctx)
            .map_err(|err| TaskError::failed(ExtensionKind::Mapper, "cleanup", err))?;
        self.state = ProxyState::CleanupComplete;
        Ok(())
    }

    /// Drives the whole task: setup, one `map` per record, cleanup.
    pub fn run<I, E>(&mut self, ctx: &mut TaskContext<'_>, records: I) -> Result<()>
    where
        I: IntoIterator<Item = std::result::Result<(String, String), E>>,
        FerrumConduitError: From<E>,
    {
        self.setup(ctx)?;
        for record in records {
            let (key, value) = record?;
            self.map(key, value, ctx)?;
        }
        self.cleanup(ctx)
    }
}

/// Runs the bound reducer, or the bound combiner, for one task.
pub struct ReducerProxy<'r> {
    registry: &'r Registry,
    kind: ExtensionKind,
    instance: Option<Box<dyn Reducer>>,
    state: ProxyState,
}

impl<'r> ReducerProxy<'r> {
    pub fn new(registry: &'r Registry) -> Self {
        Self::with_kind(registry, ExtensionKind::Reducer)
    }

    pub fn combiner(registry: &'r Registry) -> Self {
        Self::with_kind(registry, ExtensionKind::Combiner)
    }

    fn with_kind(registry: &'r Registry, kind: ExtensionKind) -> Self {
        ReducerProxy {
            registry,
            kind,
            instance: None,
            state: ProxyState::Uninitialized,
        }
    }

    pub fn kind(&self) -> ExtensionKind {
        self.kind
    }

    pub fn state(&self) -> ProxyState {
        self.state
    }

    pub fn setup(&mut self, ctx: &mut TaskContext<'_>) -> Result<()> {
        if self.state != ProxyState::Uninitialized {
            return Err(lifecycle(self.kind, "setup", self.state).into());
        }
        let kind = self.kind;
        let instance = self
            .instance
            .insert(self.registry.create_reducer(ctx.configuration(), kind)?);
        instance
            .setup(ctx)
            .map_err(|err| TaskError::failed(kind, "setup", err))?;
        self.state = ProxyState::SetupComplete;
        Ok(())
    }

    pub fn reduce(&mut self, key: String, values: Values<'_>, ctx: &mut TaskContext<'_>) -> Result<()> {
        let kind = self.kind;
        let instance = match (&mut self.instance, self.state.is_active()) {
            (Some(instance), true) => instance,
            _ => return Err(lifecycle(kind, "reduce", self.state).into()),
        };
        instance
            .reduce(key, values, ctx)
            .map_err(|err| TaskError::failed(kind, "reduce", err))?;
        self.state = ProxyState::Processing;
        Ok(())
    }

    pub fn cleanup(&mut self, ctx: &mut TaskContext<'_>) -> Result<()> {
        let kind = self.kind;
        let instance = match (&mut self.instance, self.state.is_active()) {
            (Some(instance), true) => instance,
            _ => return Err(lifecycle(kind, "cleanup", self.state).into()),
        };
        instance
            .cleanup(ctx)
            .map_err(|err| TaskError::failed(kind, "cleanup", err))?;
        self.state = ProxyState::CleanupComplete;
        Ok(())
    }
}

/// Forwards partition calls. Built from a configuration handle rather than a
/// task context, so the implementation is only created on first use.
pub struct PartitionerProxy<'r> {
    registry: &'r Registry,
    configuration: Configuration,
    instance: Option<Box<dyn Partitioner>>,
}

impl<'r> PartitionerProxy<'r> {
    pub fn new(registry: &'r Registry, configuration: &Configuration) -> Self {
        PartitionerProxy {
            registry,
            configuration: configuration.clone(),
            instance: None,
        }
    }

    pub fn partition(&mut self, key: &str, value: &str, num_partitions: u32) -> Result<u32> {
        let instance = match self.instance.take() {
            Some(instance) => instance,
            None => self.registry.create_partitioner(&self.configuration)?,
        };
        let instance = self.instance.insert(instance);
        let partition = instance
            .partition(key, value, num_partitions)
            .map_err(|err| TaskError::failed(ExtensionKind::Partitioner, "partition", err))?;
        Ok(partition)
    }
}

/// Forwards raw key comparisons for the sort or the grouping comparator
/// binding.
pub struct ComparatorProxy<'r> {
    registry: &'r Registry,
    kind: ExtensionKind,
    configuration: Configuration,
    instance: Option<Box<dyn RawComparator>>,
}

impl<'r> ComparatorProxy<'r> {
    pub fn sort(registry: &'r Registry, configuration: &Configuration) -> Self {
        Self::with_kind(registry, ExtensionKind::SortComparator, configuration)
    }

    pub fn grouping(registry: &'r Registry, configuration: &Configuration) -> Self {
        Self::with_kind(registry, ExtensionKind::GroupingComparator, configuration)
    }

    fn with_kind(registry: &'r Registry, kind: ExtensionKind, configuration: &Configuration) -> Self {
        ComparatorProxy {
            registry,
            kind,
            configuration: configuration.clone(),
            instance: None,
        }
    }

    pub fn kind(&self) -> ExtensionKind {
        self.kind
    }

    pub fn compare_raw(
        &mut self,
        b1: &[u8],
        s1: usize,
        l1: usize,
        b2: &[u8],
        s2: usize,
        l2: usize,
    ) -> Result<Ordering> {
        let kind = self.kind;
        let instance = match self.instance.take() {
            Some(instance) => instance,
            None => self.registry.create_comparator(&self.configuration, kind)?,
        };
        let instance = self.instance.insert(instance);
        let ordering = instance
            .compare_raw(b1, s1, l1, b2, s2, l2)
            .map_err(|err| TaskError::failed(kind, "compare_raw", err))?;
        Ok(ordering)
    }

    pub fn compare(&mut self, a: &[u8], b: &[u8]) -> Result<Ordering> {
        self.compare_raw(a, 0, a.len(), b, 0, b.len())
    }
}

/// Forwards split enumeration and reader construction to the bound input
/// format.
pub struct InputFormatProxy<'r> {
    registry: &'r Registry,
    instance: Option<Box<dyn InputFormat>>,
}

impl<'r> InputFormatProxy<'r> {
    pub fn new(registry: &'r Registry) -> Self {
        InputFormatProxy {
            registry,
            instance: None,
        }
    }

    fn instance(&mut self, configuration: &Configuration) -> Result<&mut Box<dyn InputFormat>> {
        let instance = match self.instance.take() {
            Some(instance) => instance,
            None => self.registry.create_input_format(configuration)?,
        };
        Ok(self.instance.insert(instance))
    }

    pub fn splits(&mut self, configuration: &Configuration) -> Result<Vec<InputSplit>> {
        let splits = self
            .instance(configuration)?
            .splits(configuration)
            .map_err(|err| TaskError::failed(ExtensionKind::InputFormat, "splits", err))?;
        debug!("input format produced {} splits", splits.len());
        Ok(splits)
    }

    pub fn create_record_reader(
        &mut self,
        split: &InputSplit,
        configuration: &Configuration,
    ) -> Result<RecordReaderProxy> {
        let reader = self
            .instance(configuration)?
            .create_record_reader(split, configuration)
            .map_err(|err| {
                TaskError::failed(ExtensionKind::InputFormat, "create_record_reader", err)
            })?;
        Ok(RecordReaderProxy::new(reader))
    }
}

/// Wraps a user record reader and refuses to read after `close`.
pub struct RecordReaderProxy {
    inner: Box<dyn RecordReader>,
    closed: bool,
}

impl RecordReaderProxy {
    pub fn new(inner: Box<dyn RecordReader>) -> Self {
        RecordReaderProxy {
            inner,
            closed: false,
        }
    }

    pub fn next_key_value(&mut self) -> std::result::Result<bool, TaskError> {
        if self.closed {
            return Err(TaskError::Closed);
        }
        self.inner
            .next_key_value()
            .map_err(|err| TaskError::failed(ExtensionKind::InputFormat, "next_key_value", err))
    }

    pub fn current_key(&self) -> Option<&str> {
        self.inner.current_key()
    }

    pub fn current_value(&self) -> Option<&str> {
        self.inner.current_value()
    }

    pub fn progress(&self) -> f32 {
        self.inner.progress().clamp(0.0, 1.0)
    }

    pub fn close(&mut self) -> std::result::Result<(), TaskError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.inner
            .close()
            .map_err(|err| TaskError::failed(ExtensionKind::InputFormat, "close", err))
    }
}
