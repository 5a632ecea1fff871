use crate::config::configuration::Configuration;
use std::io;

/// Sink for the records a task emits. The streaming runner writes to stdout,
/// tests collect into memory.
pub trait RecordWriter: Send {
    fn write(&mut self, key: &str, value: &str) -> io::Result<()>;

    fn increment_counter(&mut self, _group: &str, _counter: &str, _amount: i64) -> io::Result<()> {
        Ok(())
    }

    fn set_status(&mut self, _status: &str) -> io::Result<()> {
        Ok(())
    }
}

/// Output/context handle passed to every mapper and reducer call.
pub struct TaskContext<'a> {
    configuration: &'a Configuration,
    writer: &'a mut dyn RecordWriter,
}

impl<'a> TaskContext<'a> {
    pub fn new(configuration: &'a Configuration, writer: &'a mut dyn RecordWriter) -> Self {
        TaskContext {
            configuration,
            writer,
        }
    }

    /// The job configuration, as the submitting process left it.
    pub fn configuration(&self) -> &Configuration {
        self.configuration
    }

    pub fn write(&mut self, key: impl AsRef<str>, value: impl AsRef<str>) -> io::Result<()> {
        self.writer.write(key.as_ref(), value.as_ref())
    }

    pub fn increment_counter(&mut self, group: &str, counter: &str, amount: i64) -> io::Result<()> {
        self.writer.increment_counter(group, counter, amount)
    }

    pub fn set_status(&mut self, status: &str) -> io::Result<()> {
        self.writer.set_status(status)
    }
}

/// Keeps everything in memory, in emission order.
#[derive(Debug, Default)]
pub struct CollectingWriter {
    pub records: Vec<(String, String)>,
    pub counters: Vec<(String, String, i64)>,
}

impl CollectingWriter {
    pub fn new() -> Self {
        CollectingWriter::default()
    }
}

impl RecordWriter for CollectingWriter {
    fn write(&mut self, key: &str, value: &str) -> io::Result<()> {
        self.records.push((key.to_string(), value.to_string()));
        Ok(())
    }

    fn increment_counter(&mut self, group: &str, counter: &str, amount: i64) -> io::Result<()> {
        self.counters
            .push((group.to_string(), counter.to_string(), amount));
        Ok(())
    }
}
