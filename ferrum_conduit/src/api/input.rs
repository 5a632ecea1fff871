use crate::config::configuration::Configuration;
use anyhow::bail;

/// Describes one chunk of job input handed to a single map task.
#[derive(Debug, Clone, PartialEq)]
pub struct InputSplit {
    pub location: String,
    pub start: u64,
    pub length: u64,
    pub hosts: Vec<String>,
}

impl InputSplit {
    pub fn new(location: impl Into<String>, start: u64, length: u64) -> Self {
        InputSplit {
            location: location.into(),
            start,
            length,
            hosts: Vec::new(),
        }
    }

    /// The one line form map tasks receive: location, start, length and the
    /// comma separated hosts, split by tabs.
    pub fn to_descriptor(&self) -> anyhow::Result<String> {
        if self.location.contains(['\t', '\n']) {
            bail!("split location {:?} does not fit on one line", self.location);
        }
        if let Some(host) = self.hosts.iter().find(|host| host.contains(['\t', '\n', ','])) {
            bail!("split host {:?} does not fit on one line", host);
        }
        Ok(format!(
            "{}\t{}\t{}\t{}",
            self.location,
            self.start,
            self.length,
            self.hosts.join(",")
        ))
    }

    pub fn from_descriptor(line: &str) -> anyhow::Result<Self> {
        let mut fields = line.trim_end_matches(['\n', '\r']).split('\t');
        let (Some(location), Some(start), Some(length)) = (fields.next(), fields.next(), fields.next())
        else {
            bail!("malformed split descriptor {:?}", line);
        };
        let hosts = fields
            .next()
            .unwrap_or_default()
            .split(',')
            .filter(|host| !host.is_empty())
            .map(str::to_string)
            .collect();
        Ok(InputSplit {
            location: location.to_string(),
            start: start.parse()?,
            length: length.parse()?,
            hosts,
        })
    }
}

pub trait RecordReader: Send {
    fn next_key_value(&mut self) -> anyhow::Result<bool>;

    fn current_key(&self) -> Option<&str>;

    fn current_value(&self) -> Option<&str>;

    /// Fraction of the split consumed so far, in `[0, 1]`.
    fn progress(&self) -> f32;

    fn close(&mut self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// User code behind the `input_format` binding.
pub trait InputFormat: Send {
    fn splits(&mut self, configuration: &Configuration) -> anyhow::Result<Vec<InputSplit>>;

    fn create_record_reader(
        &mut self,
        split: &InputSplit,
        configuration: &Configuration,
    ) -> anyhow::Result<Box<dyn RecordReader>>;
}
