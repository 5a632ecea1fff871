use crate::api::context::{RecordWriter, TaskContext};
use crate::api::input::InputSplit;
use crate::api::reduce::Values;
use crate::config::configuration::Configuration;
use crate::core::job::{carries_partition_field, NUM_REDUCES_KEY};
use crate::core::proxy::{
    ComparatorProxy, InputFormatProxy, MapperProxy, PartitionerProxy, RecordReaderProxy,
    ReducerProxy,
};
use crate::core::registry::{ExtensionKind, Registry};
use crate::framework::errors::{FerrumConduitError, Result, TaskError};
use bytes::{BufMut, BytesMut};
use std::cmp::Ordering;
use std::io::{self, BufRead, Lines, Write};
use std::iter::Peekable;
use tracing::{debug, info};

/// When true, map input lines are split into key and value at the first tab
/// instead of being keyed by their byte offset.
pub const MAP_INPUT_KEY_VALUE_KEY: &str = "conduit.map.input.key_value";

const SEPARATOR: u8 = b'\t';

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskType {
    Map,
    Combine,
    Reduce,
}

/// Writes records in the streaming text protocol: `key\tvalue` lines on the
/// output stream, `reporter:` lines on the diagnostics stream.
pub struct StreamingWriter<'r, W, E> {
    output: W,
    diagnostics: E,
    buffer: BytesMut,
    partitioner: Option<(PartitionerProxy<'r>, u32)>,
}

impl<'r, W: Write + Send, E: Write + Send> StreamingWriter<'r, W, E> {
    pub fn new(output: W, diagnostics: E) -> Self {
        StreamingWriter {
            output,
            diagnostics,
            buffer: BytesMut::with_capacity(256),
            partitioner: None,
        }
    }

    /// Prefixes every record with the partition `partitioner` picks out of
    /// `partitions`, as an extra leading key field.
    pub fn partitioned(mut self, partitioner: PartitionerProxy<'r>, partitions: u32) -> Self {
        self.partitioner = Some((partitioner, partitions));
        self
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.output.flush()?;
        self.diagnostics.flush()
    }
}

impl<W: Write + Send, E: Write + Send> RecordWriter for StreamingWriter<'_, W, E> {
    fn write(&mut self, key: &str, value: &str) -> io::Result<()> {
        if key.contains(['\t', '\n']) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("record key {:?} contains a tab or a newline", key),
            ));
        }
        if value.contains('\n') {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("record value {:?} contains a newline", value),
            ));
        }

        self.buffer.clear();
        if let Some((partitioner, partitions)) = &mut self.partitioner {
            let partition = partitioner
                .partition(key, value, *partitions)
                .map_err(|err| io::Error::other(err.to_string()))?;
            if partition >= *partitions {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("partition {} of key {:?} is not below {}", partition, key, partitions),
                ));
            }
            self.buffer.extend_from_slice(partition.to_string().as_bytes());
            self.buffer.put_u8(SEPARATOR);
        }
        self.buffer.extend_from_slice(key.as_bytes());
        self.buffer.put_u8(SEPARATOR);
        self.buffer.extend_from_slice(value.as_bytes());
        self.buffer.put_u8(b'\n');
        self.output.write_all(&self.buffer)
    }

    fn increment_counter(&mut self, group: &str, counter: &str, amount: i64) -> io::Result<()> {
        writeln!(self.diagnostics, "reporter:counter:{},{},{}", group, counter, amount)
    }

    fn set_status(&mut self, status: &str) -> io::Result<()> {
        writeln!(self.diagnostics, "reporter:status:{}", status)
    }
}

fn split_record(line: &str) -> (String, String) {
    match line.split_once(SEPARATOR as char) {
        Some((key, value)) => (key.to_string(), value.to_string()),
        None => (line.to_string(), String::new()),
    }
}

/// Input lines as records. Keys are either the byte offset of the line or
/// the text before the first tab.
pub struct LineRecords<R> {
    input: R,
    offset: u64,
    split_key_value: bool,
    skip_partition: bool,
    line: String,
}

impl<R: BufRead> LineRecords<R> {
    pub fn new(input: R, split_key_value: bool) -> Self {
        LineRecords {
            input,
            offset: 0,
            split_key_value,
            skip_partition: false,
            line: String::new(),
        }
    }

    /// Drops the partition field map tasks put in front of each key.
    pub fn skip_partition(mut self, skip: bool) -> Self {
        self.skip_partition = skip;
        self
    }
}

impl<R: BufRead> Iterator for LineRecords<R> {
    type Item = std::result::Result<(String, String), TaskError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.line.clear();
        let read = match self.input.read_line(&mut self.line) {
            Ok(0) => return None,
            Ok(read) => read,
            Err(err) => return Some(Err(TaskError::Io(err))),
        };
        let start = self.offset;
        self.offset += read as u64;

        let mut line = self.line.trim_end_matches(['\n', '\r']);
        if self.skip_partition {
            line = line.split_once(SEPARATOR as char).map_or("", |(_, rest)| rest);
        }
        if self.split_key_value {
            Some(Ok(split_record(line)))
        } else {
            Some(Ok((start.to_string(), line.to_string())))
        }
    }
}

/// Records of the splits named by the input lines, read through the bound
/// input format. Each line is an [`InputSplit`] descriptor.
pub struct SplitRecords<'r, 'c, R> {
    descriptors: Lines<R>,
    format: InputFormatProxy<'r>,
    configuration: &'c Configuration,
    reader: Option<(InputSplit, RecordReaderProxy)>,
}

impl<'r, 'c, R: BufRead> SplitRecords<'r, 'c, R> {
    pub fn new(registry: &'r Registry, configuration: &'c Configuration, descriptors: R) -> Self {
        SplitRecords {
            descriptors: descriptors.lines(),
            format: InputFormatProxy::new(registry),
            configuration,
            reader: None,
        }
    }

    /// Opens the reader of the next split. `false` once the input holds no
    /// more descriptors.
    fn open_next(&mut self) -> Result<bool> {
        for line in self.descriptors.by_ref() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let split = InputSplit::from_descriptor(&line)
                .map_err(|err| TaskError::failed(ExtensionKind::InputFormat, "read split", err))?;
            let reader = self.format.create_record_reader(&split, self.configuration)?;
            debug!("reading split {} at {}", split.location, split.start);
            self.reader = Some((split, reader));
            return Ok(true);
        }
        Ok(false)
    }
}

impl<R: BufRead> Iterator for SplitRecords<'_, '_, R> {
    type Item = Result<(String, String)>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some((split, reader)) = &mut self.reader {
                match reader.next_key_value() {
                    Ok(true) => {
                        let key = reader.current_key().unwrap_or_default().to_string();
                        let value = reader.current_value().unwrap_or_default().to_string();
                        return Some(Ok((key, value)));
                    }
                    Ok(false) => {
                        debug!("split {} done at {:.2}", split.location, reader.progress());
                        let closed = reader.close();
                        self.reader = None;
                        if let Err(err) = closed {
                            return Some(Err(err.into()));
                        }
                    }
                    Err(err) => return Some(Err(err.into())),
                }
            }
            match self.open_next() {
                Ok(true) => {}
                Ok(false) => return None,
                Err(err) => return Some(Err(err)),
            }
        }
    }
}

/// Stable merge sort by key under a comparator that may fail.
fn sort_records(
    mut records: Vec<(String, String)>,
    comparator: &mut ComparatorProxy<'_>,
) -> Result<Vec<(String, String)>> {
    if records.len() <= 1 {
        return Ok(records);
    }
    let right = records.split_off(records.len() / 2);
    let mut left = sort_records(records, comparator)?.into_iter().peekable();
    let mut right = sort_records(right, comparator)?.into_iter().peekable();

    let mut merged = Vec::with_capacity(left.len() + right.len());
    loop {
        let take_left = match (left.peek(), right.peek()) {
            (Some((l, _)), Some((r, _))) => {
                comparator.compare(r.as_bytes(), l.as_bytes())? != Ordering::Less
            }
            (Some(_), None) => true,
            (None, Some(_)) => false,
            (None, None) => break,
        };
        merged.extend(if take_left { left.next() } else { right.next() });
    }
    Ok(merged)
}

fn same_group(grouping: &mut Option<ComparatorProxy<'_>>, key: &str, next: &str) -> Result<bool> {
    match grouping {
        Some(comparator) => Ok(comparator.compare(key.as_bytes(), next.as_bytes())? == Ordering::Equal),
        None => Ok(key == next),
    }
}

/// The values of one key group, pulled from the sorted input as the reducer
/// asks for them.
struct GroupValues<'g, 'r, I: Iterator> {
    records: &'g mut Peekable<I>,
    grouping: &'g mut Option<ComparatorProxy<'r>>,
    error: &'g mut Option<FerrumConduitError>,
    key: &'g str,
    first: Option<String>,
}

impl<I> Iterator for GroupValues<'_, '_, I>
where
    I: Iterator<Item = std::result::Result<(String, String), TaskError>>,
{
    type Item = String;

    fn next(&mut self) -> Option<String> {
        if let Some(first) = self.first.take() {
            return Some(first);
        }
        if self.error.is_some() {
            return None;
        }
        if matches!(self.records.peek(), Some(Err(_))) {
            if let Some(Err(err)) = self.records.next() {
                *self.error = Some(err.into());
            }
            return None;
        }
        let belongs = match self.records.peek() {
            Some(Ok((next_key, _))) => same_group(self.grouping, self.key, next_key),
            _ => Ok(false),
        };
        match belongs {
            Ok(true) => match self.records.next() {
                Some(Ok((_, value))) => Some(value),
                _ => None,
            },
            Ok(false) => None,
            Err(err) => {
                *self.error = Some(err);
                None
            }
        }
    }
}

/// Feeds sorted `key\tvalue` records to a reducer or combiner, one call per
/// key group. Values the reducer leaves unread are skipped before the next
/// group starts.
pub fn reduce_groups<I>(
    proxy: &mut ReducerProxy<'_>,
    grouping: &mut Option<ComparatorProxy<'_>>,
    ctx: &mut TaskContext<'_>,
    records: I,
) -> Result<u64>
where
    I: Iterator<Item = std::result::Result<(String, String), TaskError>>,
{
    let mut records = records.peekable();
    let mut error = None;
    let mut groups = 0u64;

    proxy.setup(ctx)?;
    while let Some(record) = records.next() {
        let (key, first) = record?;
        let mut values = GroupValues {
            records: &mut records,
            grouping: &mut *grouping,
            error: &mut error,
            key: &key,
            first: Some(first),
        };
        proxy.reduce(key.clone(), Values::new(&mut values), ctx)?;
        values.for_each(drop);
        if let Some(err) = error.take() {
            return Err(err);
        }
        groups += 1;
    }
    proxy.cleanup(ctx)?;
    Ok(groups)
}

/// Number of reduce partitions map output is spread over, `None` for jobs
/// without a shuffle.
fn shuffle_partitions(configuration: &Configuration) -> Result<Option<u32>> {
    if !carries_partition_field(configuration) {
        return Ok(None);
    }
    match configuration.get_long(NUM_REDUCES_KEY)?.unwrap_or(1) {
        0 => Ok(None),
        reduces => u32::try_from(reduces).map(Some).map_err(|_| {
            FerrumConduitError::ConfigError(format!("{} is {}", NUM_REDUCES_KEY, reduces))
        }),
    }
}

/// Entry point of a task process launched by the host.
pub fn run_task<R, W, E>(
    task_type: TaskType,
    registry: &Registry,
    configuration: &Configuration,
    input: R,
    output: W,
    diagnostics: E,
) -> Result<()>
where
    R: BufRead,
    W: Write + Send,
    E: Write + Send,
{
    let mut writer = StreamingWriter::new(output, diagnostics);
    if task_type != TaskType::Reduce {
        if let Some(partitions) = shuffle_partitions(configuration)? {
            debug!("partitioning map output over {} reduces", partitions);
            writer = writer.partitioned(PartitionerProxy::new(registry, configuration), partitions);
        }
    }
    {
        let mut ctx = TaskContext::new(configuration, &mut writer);
        match task_type {
            TaskType::Map => {
                let mut mapper = MapperProxy::new(registry);
                if configuration.get(ExtensionKind::InputFormat.config_key()).is_some() {
                    debug!("map task, reading splits through the bound input format");
                    mapper.run(&mut ctx, SplitRecords::new(registry, configuration, input))?;
                } else {
                    let split = configuration
                        .get_boolean(MAP_INPUT_KEY_VALUE_KEY)?
                        .unwrap_or(false);
                    debug!("map task, key/value input: {}", split);
                    mapper.run(&mut ctx, LineRecords::new(input, split))?;
                }
            }
            TaskType::Combine | TaskType::Reduce => {
                let mut proxy = match task_type {
                    TaskType::Combine => ReducerProxy::combiner(registry),
                    _ => ReducerProxy::new(registry),
                };
                let mut grouping = configuration
                    .get(ExtensionKind::GroupingComparator.config_key())
                    .map(|_| ComparatorProxy::grouping(registry, configuration));
                let records = LineRecords::new(input, true)
                    .skip_partition(carries_partition_field(configuration));

                let groups = if configuration
                    .get(ExtensionKind::SortComparator.config_key())
                    .is_some()
                {
                    let mut sort = ComparatorProxy::sort(registry, configuration);
                    let records = sort_records(records.collect::<std::result::Result<_, _>>()?, &mut sort)?;
                    debug!("sorted {} records with the sort comparator", records.len());
                    reduce_groups(&mut proxy, &mut grouping, &mut ctx, records.into_iter().map(Ok))?
                } else {
                    reduce_groups(&mut proxy, &mut grouping, &mut ctx, records)?
                };
                info!("{} task processed {} key groups", proxy.kind(), groups);
            }
        }
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::compare::RawComparator;
    use crate::api::context::CollectingWriter;
    use crate::api::input::{InputFormat, RecordReader};
    use crate::api::partition::Partitioner;
    use crate::api::reduce::Reducer;
    use std::io::Cursor;

    /// Groups keys on their first character only.
    struct PrefixComparator;

    impl RawComparator for PrefixComparator {
        fn compare_raw(
            &mut self,
            b1: &[u8],
            s1: usize,
            _l1: usize,
            b2: &[u8],
            s2: usize,
            _l2: usize,
        ) -> anyhow::Result<Ordering> {
            Ok(b1[s1].cmp(&b2[s2]))
        }
    }

    /// Only ever looks at the first value of a group.
    struct FirstValueReducer;

    impl Reducer for FirstValueReducer {
        fn reduce(&mut self, key: String, mut values: Values<'_>, ctx: &mut TaskContext<'_>) -> anyhow::Result<()> {
            if let Some(value) = values.next() {
                ctx.write(key, value)?;
            }
            Ok(())
        }
    }

    /// Descending byte order.
    struct ReverseComparator;

    impl RawComparator for ReverseComparator {
        fn compare_raw(
            &mut self,
            b1: &[u8],
            s1: usize,
            l1: usize,
            b2: &[u8],
            s2: usize,
            l2: usize,
        ) -> anyhow::Result<Ordering> {
            Ok(b2[s2..s2 + l2].cmp(&b1[s1..s1 + l1]))
        }
    }

    /// Partitions by key length.
    struct LengthPartitioner;

    impl Partitioner for LengthPartitioner {
        fn partition(&mut self, key: &str, _value: &str, num_partitions: u32) -> anyhow::Result<u32> {
            Ok(key.len() as u32 % num_partitions)
        }
    }

    struct OutOfRangePartitioner;

    impl Partitioner for OutOfRangePartitioner {
        fn partition(&mut self, _key: &str, _value: &str, num_partitions: u32) -> anyhow::Result<u32> {
            Ok(num_partitions)
        }
    }

    /// Every split holds the numbers `start..start + length`.
    struct RangeInputFormat;

    struct RangeReader {
        location: String,
        next: u64,
        end: u64,
        current: Option<String>,
    }

    impl RecordReader for RangeReader {
        fn next_key_value(&mut self) -> anyhow::Result<bool> {
            if self.next >= self.end {
                self.current = None;
                return Ok(false);
            }
            self.current = Some(self.next.to_string());
            self.next += 1;
            Ok(true)
        }

        fn current_key(&self) -> Option<&str> {
            self.current.as_ref().map(|_| self.location.as_str())
        }

        fn current_value(&self) -> Option<&str> {
            self.current.as_deref()
        }

        fn progress(&self) -> f32 {
            if self.next >= self.end {
                1.0
            } else {
                0.5
            }
        }
    }

    impl InputFormat for RangeInputFormat {
        fn splits(&mut self, _configuration: &Configuration) -> anyhow::Result<Vec<InputSplit>> {
            Ok(vec![InputSplit::new("first", 0, 2), InputSplit::new("second", 10, 1)])
        }

        fn create_record_reader(
            &mut self,
            split: &InputSplit,
            _configuration: &Configuration,
        ) -> anyhow::Result<Box<dyn RecordReader>> {
            Ok(Box::new(RangeReader {
                location: split.location.clone(),
                next: split.start,
                end: split.start + split.length,
                current: None,
            }))
        }
    }

    fn registry() -> Registry {
        let mut registry = Registry::with_builtins();
        registry
            .register_comparator("test::prefix_comparator", || PrefixComparator)
            .register_comparator("test::reverse_comparator", || ReverseComparator)
            .register_reducer("test::first_value_reducer", || FirstValueReducer)
            .register_partitioner("test::length_partitioner", || LengthPartitioner)
            .register_partitioner("test::out_of_range_partitioner", || OutOfRangePartitioner)
            .register_input_format("test::range_input_format", || RangeInputFormat);
        registry
    }

    fn partitioned_job() -> Configuration {
        let mut configuration = Configuration::new();
        configuration.set(ExtensionKind::Mapper.config_key(), "conduit::identity_mapper");
        configuration.set(ExtensionKind::Combiner.config_key(), "conduit::long_sum_reducer");
        configuration.set(ExtensionKind::Reducer.config_key(), "conduit::long_sum_reducer");
        configuration.set(ExtensionKind::Partitioner.config_key(), "test::length_partitioner");
        configuration.set(NUM_REDUCES_KEY, 3i64);
        configuration.set(MAP_INPUT_KEY_VALUE_KEY, true);
        configuration
    }

    fn run(task_type: TaskType, configuration: &Configuration, input: &str) -> (String, String) {
        let registry = registry();
        let mut output = Vec::new();
        let mut diagnostics = Vec::new();
        run_task(
            task_type,
            &registry,
            configuration,
            Cursor::new(input.as_bytes().to_vec()),
            &mut output,
            &mut diagnostics,
        )
        .unwrap();
        (
            String::from_utf8(output).unwrap(),
            String::from_utf8(diagnostics).unwrap(),
        )
    }

    #[test]
    fn map_task_keys_lines_by_byte_offset() {
        let mut configuration = Configuration::new();
        configuration.set(ExtensionKind::Mapper.config_key(), "conduit::identity_mapper");

        let (output, _) = run(TaskType::Map, &configuration, "alpha\nbeta\r\ngamma");
        assert_eq!(output, "0\talpha\n6\tbeta\n12\tgamma\n");
    }

    #[test]
    fn map_task_can_split_key_value_lines() {
        let mut configuration = Configuration::new();
        configuration.set(ExtensionKind::Mapper.config_key(), "conduit::identity_mapper");
        configuration.set(MAP_INPUT_KEY_VALUE_KEY, true);

        let (output, _) = run(TaskType::Map, &configuration, "k1\tv1\nk2\n");
        assert_eq!(output, "k1\tv1\nk2\t\n");
    }

    #[test]
    fn reduce_task_groups_consecutive_keys() {
        let mut configuration = Configuration::new();
        configuration.set(ExtensionKind::Reducer.config_key(), "conduit::count_reducer");

        let (output, _) = run(TaskType::Reduce, &configuration, "k1\tv1\nk1\tv2\nk2\tv3\n");
        assert_eq!(output, "k1\t2\nk2\t1\n");
    }

    #[test]
    fn unread_values_do_not_leak_into_the_next_group() {
        let mut configuration = Configuration::new();
        configuration.set(ExtensionKind::Reducer.config_key(), "test::first_value_reducer");

        let (output, _) = run(TaskType::Reduce, &configuration, "a\t1\na\t2\na\t3\nb\t4\n");
        assert_eq!(output, "a\t1\nb\t4\n");
    }

    #[test]
    fn grouping_comparator_decides_group_boundaries() {
        let mut configuration = Configuration::new();
        configuration.set(ExtensionKind::Reducer.config_key(), "conduit::count_reducer");
        configuration.set(
            ExtensionKind::GroupingComparator.config_key(),
            "test::prefix_comparator",
        );

        let (output, _) = run(TaskType::Reduce, &configuration, "a1\tx\na2\ty\nb1\tz\n");
        assert_eq!(output, "a1\t2\nb1\t1\n");
    }

    #[test]
    fn combine_task_uses_the_combiner_binding() {
        let mut configuration = Configuration::new();
        configuration.set(ExtensionKind::Combiner.config_key(), "conduit::long_sum_reducer");

        let (output, _) = run(TaskType::Combine, &configuration, "w\t1\nw\t1\nz\t5\n");
        assert_eq!(output, "w\t2\nz\t5\n");
    }

    #[test]
    fn reducer_failures_stop_the_task() {
        let mut configuration = Configuration::new();
        configuration.set(ExtensionKind::Reducer.config_key(), "conduit::long_sum_reducer");

        let registry = registry();
        let err = run_task(
            TaskType::Reduce,
            &registry,
            &configuration,
            Cursor::new(b"w\tnot-a-number\n".to_vec()),
            Vec::new(),
            Vec::new(),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            FerrumConduitError::Task(TaskError::Failed {
                kind: ExtensionKind::Reducer,
                operation: "reduce",
                ..
            })
        ));
    }

    #[test]
    fn counters_use_the_reporter_protocol() {
        let mut output = Vec::new();
        let mut diagnostics = Vec::new();
        let mut writer = StreamingWriter::new(&mut output, &mut diagnostics);
        writer.increment_counter("words", "seen", 3).unwrap();
        writer.set_status("halfway").unwrap();
        drop(writer);

        assert!(output.is_empty());
        assert_eq!(
            String::from_utf8(diagnostics).unwrap(),
            "reporter:counter:words,seen,3\nreporter:status:halfway\n"
        );
    }

    #[test]
    fn reduce_groups_reports_group_count() {
        let registry = registry();
        let mut configuration = Configuration::new();
        configuration.set(ExtensionKind::Reducer.config_key(), "conduit::identity_reducer");
        let mut writer = CollectingWriter::new();
        let mut ctx = TaskContext::new(&configuration, &mut writer);
        let mut proxy = ReducerProxy::new(&registry);
        let records = vec![
            Ok(("k1".to_string(), "v1".to_string())),
            Ok(("k1".to_string(), "v2".to_string())),
            Ok(("k2".to_string(), "v3".to_string())),
        ];

        let groups = reduce_groups(&mut proxy, &mut None, &mut ctx, records.into_iter()).unwrap();
        assert_eq!(groups, 2);
        assert_eq!(writer.records.len(), 3);
    }

    #[test]
    fn map_task_reads_splits_through_the_bound_input_format() {
        let registry = registry();
        let mut configuration = Configuration::new();
        configuration.set(ExtensionKind::Mapper.config_key(), "conduit::identity_mapper");
        configuration.set(ExtensionKind::InputFormat.config_key(), "test::range_input_format");

        let descriptors: String = InputFormatProxy::new(&registry)
            .splits(&configuration)
            .unwrap()
            .iter()
            .map(|split| format!("{}\n", split.to_descriptor().unwrap()))
            .collect();
        let (output, _) = run(TaskType::Map, &configuration, &descriptors);
        assert_eq!(output, "first\t0\nfirst\t1\nsecond\t10\n");
    }

    #[test]
    fn malformed_split_descriptors_fail_the_map_task() {
        let mut configuration = Configuration::new();
        configuration.set(ExtensionKind::InputFormat.config_key(), "test::range_input_format");
        configuration.set(ExtensionKind::Mapper.config_key(), "conduit::identity_mapper");

        let registry = registry();
        let err = run_task(
            TaskType::Map,
            &registry,
            &configuration,
            Cursor::new(b"first\tzero\t2\n".to_vec()),
            Vec::new(),
            Vec::new(),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            FerrumConduitError::Task(TaskError::Failed {
                kind: ExtensionKind::InputFormat,
                ..
            })
        ));
    }

    #[test]
    fn bound_partitioner_travels_as_a_leading_key_field() {
        let configuration = partitioned_job();

        let (mapped, _) = run(TaskType::Map, &configuration, "ab\t1\nabc\t2\nab\t3\n");
        assert_eq!(mapped, "2\tab\t1\n0\tabc\t2\n2\tab\t3\n");

        let (combined, _) = run(TaskType::Combine, &configuration, "0\tabc\t2\n2\tab\t1\n2\tab\t3\n");
        assert_eq!(combined, "0\tabc\t2\n2\tab\t4\n");

        let (reduced, _) = run(TaskType::Reduce, &configuration, "2\tab\t4\n2\tab\t1\n");
        assert_eq!(reduced, "ab\t5\n");
    }

    #[test]
    fn map_only_jobs_ignore_the_partitioner() {
        let mut configuration = partitioned_job();
        configuration.unset(ExtensionKind::Reducer.config_key());

        let (mapped, _) = run(TaskType::Map, &configuration, "ab\t1\n");
        assert_eq!(mapped, "ab\t1\n");
    }

    #[test]
    fn partitions_outside_the_reduce_count_fail_the_map() {
        let mut configuration = partitioned_job();
        configuration.set(
            ExtensionKind::Partitioner.config_key(),
            "test::out_of_range_partitioner",
        );

        let registry = registry();
        let err = run_task(
            TaskType::Map,
            &registry,
            &configuration,
            Cursor::new(b"ab\t1\n".to_vec()),
            Vec::new(),
            Vec::new(),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            FerrumConduitError::Task(TaskError::Failed {
                kind: ExtensionKind::Mapper,
                operation: "map",
                ..
            })
        ));
    }

    #[test]
    fn sort_comparator_orders_the_reduce_input() {
        let mut configuration = Configuration::new();
        configuration.set(ExtensionKind::Reducer.config_key(), "conduit::count_reducer");
        configuration.set(
            ExtensionKind::SortComparator.config_key(),
            "test::reverse_comparator",
        );

        let (output, _) = run(TaskType::Reduce, &configuration, "a\t1\nb\t2\na\t3\nc\t4\n");
        assert_eq!(output, "c\t1\nb\t1\na\t2\n");
    }

    #[test]
    fn records_that_would_break_lines_are_rejected() {
        let mut output = Vec::new();
        let mut writer = StreamingWriter::new(&mut output, Vec::new());

        for (key, value) in [("a\tb", "v"), ("a\nb", "v"), ("k", "one\ntwo")] {
            let err = writer.write(key, value).unwrap_err();
            assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
        }
        writer.write("k", "tabs\tare fine").unwrap();
        drop(writer);
        assert_eq!(String::from_utf8(output).unwrap(), "k\ttabs\tare fine\n");
    }
}
