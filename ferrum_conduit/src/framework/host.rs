use crate::config::host_config::HostConfig;
use crate::core::job::{
    carries_partition_field, JobSpec, DEFAULT_INPUT_FORMAT, DEFAULT_OUTPUT_FORMAT, INPUT_DIR_KEY,
    INPUT_FORMAT_KEY, LAZY_OUTPUT_FORMAT_KEY, OUTPUT_DIR_KEY, OUTPUT_FORMAT_KEY,
    SPLIT_INPUT_FORMAT,
};
use crate::core::proxy::InputFormatProxy;
use crate::core::registry::{ExtensionKind, Registry};
use crate::framework::errors::{FerrumConduitError, Result, TaskError};
use async_trait::async_trait;
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// The job-submission side of the host runtime.
#[async_trait]
pub trait HostRuntime: Send + Sync {
    /// Submits `job` and blocks until it finishes. `Ok(true)` means the job
    /// succeeded, `Ok(false)` that the host ran it and it failed.
    async fn wait_for_completion(&self, job: &JobSpec, verbose: bool) -> Result<bool>;
}

/// Properties that travel as streaming options instead of `-D` pairs.
const STREAMING_OPTION_KEYS: [&str; 5] = [
    INPUT_DIR_KEY,
    OUTPUT_DIR_KEY,
    INPUT_FORMAT_KEY,
    OUTPUT_FORMAT_KEY,
    LAZY_OUTPUT_FORMAT_KEY,
];

/// Bound for jobs that leave the mapper unset, mirroring the host default.
const IDENTITY_MAPPER: &str = "conduit::identity_mapper";

/// One split descriptor per map task.
const SPLIT_OPTIONS: [(&str, &str); 2] = [
    ("mapreduce.input.lineinputformat.linespermap", "1"),
    ("stream.map.input.ignoreKey", "true"),
];

/// Shuffle on the partition field map tasks put in front of the key.
const PARTITION_OPTIONS: [(&str, &str); 2] = [
    ("stream.num.map.output.key.fields", "2"),
    ("mapreduce.partition.keypartitioner.options", "-k1,1"),
];
const KEY_FIELD_PARTITIONER: &str = "org.apache.hadoop.mapred.lib.KeyFieldBasedPartitioner";

/// Where the split descriptors of a job bound to a registered input format
/// are staged.
pub fn splits_path(output: &str) -> String {
    format!("{}.splits", output.trim_end_matches('/'))
}

/// Runs jobs through `hadoop jar <streaming jar>`, with this binary as the
/// task command for every bound extension point.
pub struct StreamingHost {
    config: HostConfig,
    registry: Arc<Registry>,
}

impl StreamingHost {
    pub fn new(config: HostConfig, registry: Arc<Registry>) -> Self {
        StreamingHost { config, registry }
    }

    pub fn config(&self) -> &HostConfig {
        &self.config
    }

    fn task_command(&self) -> Result<String> {
        if !self.config.task_command.is_empty() {
            return Ok(self.config.task_command.clone());
        }
        let exe = std::env::current_exe()?;
        Ok(exe.to_string_lossy().into_owned())
    }

    /// Arguments passed to the hadoop binary for `job`.
    pub fn command_line(&self, job: &JobSpec) -> Result<Vec<String>> {
        let inputs = job.input_paths().ok_or_else(|| {
            FerrumConduitError::ArgumentError(format!("job {} has no input", job.name))
        })?;
        let output = job.output_path().ok_or_else(|| {
            FerrumConduitError::ArgumentError(format!("job {} has no output", job.name))
        })?;
        let task = self.task_command()?;

        let mut args = vec!["jar".to_string(), self.config.streaming_jar.clone()];

        // generic options have to precede the streaming ones
        for (key, value) in job.configuration.iter() {
            if STREAMING_OPTION_KEYS.contains(&key) {
                continue;
            }
            args.push("-D".to_string());
            args.push(format!("{}={}", key, value));
        }
        if job.binding(ExtensionKind::Mapper).is_none() {
            args.push("-D".to_string());
            args.push(format!("{}={}", ExtensionKind::Mapper.config_key(), IDENTITY_MAPPER));
        }
        let reads_splits = job.binding(ExtensionKind::InputFormat).is_some();
        let partitioned = carries_partition_field(&job.configuration);
        let mut extra = Vec::new();
        if reads_splits {
            extra.extend(SPLIT_OPTIONS);
        }
        if partitioned {
            extra.extend(PARTITION_OPTIONS);
        }
        for (key, value) in extra {
            args.push("-D".to_string());
            args.push(format!("{}={}", key, value));
        }
        if !self.config.task_files.is_empty() {
            args.push("-files".to_string());
            args.push(self.config.task_files.clone());
        }

        if reads_splits {
            args.push("-input".to_string());
            args.push(splits_path(output));
        } else {
            for input in inputs.split(',').filter(|path| !path.is_empty()) {
                args.push("-input".to_string());
                args.push(input.to_string());
            }
        }
        args.push("-output".to_string());
        args.push(output.to_string());

        args.push("-mapper".to_string());
        args.push(format!("{} task map", task));
        if job.binding(ExtensionKind::Combiner).is_some() {
            args.push("-combiner".to_string());
            args.push(format!("{} task combine", task));
        }
        if job.binding(ExtensionKind::Reducer).is_some() {
            args.push("-reducer".to_string());
            args.push(format!("{} task reduce", task));
        } else {
            args.push("-numReduceTasks".to_string());
            args.push("0".to_string());
        }
        if partitioned {
            args.push("-partitioner".to_string());
            args.push(KEY_FIELD_PARTITIONER.to_string());
        }

        let input_format = if reads_splits {
            SPLIT_INPUT_FORMAT
        } else {
            job.input_format()
        };
        if input_format != DEFAULT_INPUT_FORMAT {
            args.push("-inputformat".to_string());
            args.push(input_format.to_string());
        }
        if job.output_format() != DEFAULT_OUTPUT_FORMAT {
            args.push("-outputformat".to_string());
            args.push(job.output_format().to_string());
        }
        if job.is_lazy_output() {
            args.push("-lazyOutput".to_string());
        }
        Ok(args)
    }

    /// Asks the bound input format for the job's splits and writes their
    /// descriptors to `path` with `hadoop fs -put`.
    async fn stage_splits(&self, job: &JobSpec, path: &str) -> Result<()> {
        let splits = InputFormatProxy::new(&self.registry).splits(&job.configuration)?;
        let mut descriptors = String::new();
        for split in &splits {
            let line = split
                .to_descriptor()
                .map_err(|err| TaskError::failed(ExtensionKind::InputFormat, "splits", err))?;
            descriptors.push_str(&line);
            descriptors.push('\n');
        }
        if self.config.dry_run {
            info!("dry run, {} splits of job {} go to {}", splits.len(), job.name, path);
            return Ok(());
        }

        debug!("staging {} splits of job {} at {}", splits.len(), job.name, path);
        let mut child = Command::new(&self.config.hadoop_bin)
            .args(["fs", "-put", "-f", "-", path])
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|err| FerrumConduitError::HostError(err.to_string()))?;
        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(descriptors.as_bytes()).await?;
        }
        let output = child
            .wait_with_output()
            .await
            .map_err(|err| FerrumConduitError::HostError(err.to_string()))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(FerrumConduitError::HostError(format!(
                "could not stage splits of job {} at {}: {}",
                job.name,
                path,
                stderr.lines().last().unwrap_or_default()
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl HostRuntime for StreamingHost {
    async fn wait_for_completion(&self, job: &JobSpec, verbose: bool) -> Result<bool> {
        let args = self.command_line(job)?;
        if job.binding(ExtensionKind::InputFormat).is_some() {
            if let Some(output) = job.output_path() {
                self.stage_splits(job, &splits_path(output)).await?;
            }
        }
        if self.config.dry_run {
            info!(
                "dry run, job {} ({}): {} {}",
                job.name,
                job.id,
                self.config.hadoop_bin,
                args.join(" ")
            );
            return Ok(true);
        }

        info!("submitting job {} ({})", job.name, job.id);
        let mut command = Command::new(&self.config.hadoop_bin);
        command.args(&args).stdin(Stdio::null());

        if verbose {
            let status = command
                .stdout(Stdio::inherit())
                .stderr(Stdio::inherit())
                .status()
                .await
                .map_err(|err| FerrumConduitError::HostError(err.to_string()))?;
            return Ok(status.success());
        }

        let output = command
            .output()
            .await
            .map_err(|err| FerrumConduitError::HostError(err.to_string()))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!(
                "job {} exited with {}: {}",
                job.name,
                output.status,
                stderr.lines().last().unwrap_or_default()
            );
        }
        Ok(output.status.success())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::input::{InputFormat, InputSplit, RecordReader};
    use crate::config::configuration::Configuration;
    use crate::core::job::{Format, LAZY_OUTPUT_FORMAT};
    use crate::framework::dsl::{InputOptions, JobDefinition};

    struct TwoSplits;

    impl InputFormat for TwoSplits {
        fn splits(&mut self, _configuration: &Configuration) -> anyhow::Result<Vec<InputSplit>> {
            Ok(vec![InputSplit::new("a", 0, 10), InputSplit::new("b", 0, 5)])
        }

        fn create_record_reader(
            &mut self,
            _split: &InputSplit,
            _configuration: &Configuration,
        ) -> anyhow::Result<Box<dyn RecordReader>> {
            anyhow::bail!("not read on the submitting side")
        }
    }

    fn registry() -> Arc<Registry> {
        let mut registry = Registry::with_builtins();
        registry.register_input_format("test::two_splits", || TwoSplits);
        Arc::new(registry)
    }

    fn host() -> StreamingHost {
        StreamingHost::new(
            HostConfig {
                task_command: "/opt/jobs/word_count".to_string(),
                ..HostConfig::default()
            },
            registry(),
        )
    }

    fn option_value<'a>(args: &'a [String], flag: &str) -> &'a str {
        args[position(args, flag) + 1].as_str()
    }

    fn registered_input_job() -> JobSpec {
        let mut definition = JobDefinition::new(job());
        definition
            .input(
                "logs/day1",
                InputOptions {
                    format: Format::registered("test::two_splits"),
                },
            )
            .unwrap();
        definition.into_spec()
    }

    fn job() -> JobSpec {
        let mut job = JobSpec::new("word_count", &Configuration::new());
        job.configuration.set(INPUT_DIR_KEY, "in/a,in/b");
        job.configuration.set(OUTPUT_DIR_KEY, "out");
        job.configuration
            .set(ExtensionKind::Mapper.config_key(), "word_count::mapper");
        job
    }

    fn position(args: &[String], flag: &str) -> usize {
        args.iter().position(|arg| arg == flag).unwrap()
    }

    #[test]
    fn map_only_jobs_disable_reduce_tasks() {
        let args = host().command_line(&job()).unwrap();
        assert_eq!(args[0], "jar");
        assert_eq!(args[position(&args, "-mapper") + 1], "/opt/jobs/word_count task map");
        assert_eq!(args[position(&args, "-numReduceTasks") + 1], "0");
        assert!(!args.contains(&"-reducer".to_string()));
        assert!(args.contains(&"mapreduce.job.name=word_count".to_string()));
    }

    #[test]
    fn inputs_are_split_and_definitions_come_first() {
        let mut job = job();
        job.configuration
            .set(ExtensionKind::Reducer.config_key(), "conduit::count_reducer");
        let args = host().command_line(&job).unwrap();

        let inputs: Vec<&String> = args
            .iter()
            .enumerate()
            .filter(|(_, arg)| *arg == "-input")
            .map(|(i, _)| &args[i + 1])
            .collect();
        assert_eq!(inputs, vec!["in/a", "in/b"]);
        assert!(position(&args, "-D") < position(&args, "-input"));
        assert_eq!(args[position(&args, "-reducer") + 1], "/opt/jobs/word_count task reduce");
        assert!(!args.iter().any(|arg| arg.starts_with(INPUT_DIR_KEY)));
    }

    #[test]
    fn lazy_output_passes_the_wrapped_format() {
        let mut job = job();
        job.configuration.set(OUTPUT_FORMAT_KEY, LAZY_OUTPUT_FORMAT);
        job.configuration.set(
            LAZY_OUTPUT_FORMAT_KEY,
            "org.apache.hadoop.mapreduce.lib.output.SequenceFileOutputFormat",
        );
        let args = host().command_line(&job).unwrap();
        assert_eq!(
            args[position(&args, "-outputformat") + 1],
            "org.apache.hadoop.mapreduce.lib.output.SequenceFileOutputFormat"
        );
        assert!(args.contains(&"-lazyOutput".to_string()));
    }

    #[test]
    fn unbound_mapper_falls_back_to_identity() {
        let mut job = job();
        job.configuration.unset(ExtensionKind::Mapper.config_key());
        let args = host().command_line(&job).unwrap();
        assert!(args.contains(&"conduit.mapper=conduit::identity_mapper".to_string()));
    }

    #[test]
    fn missing_output_is_an_argument_error() {
        let mut job = job();
        job.configuration.unset(OUTPUT_DIR_KEY);
        let err = host().command_line(&job).unwrap_err();
        assert!(matches!(err, FerrumConduitError::ArgumentError(_)));
    }

    #[test]
    fn registered_input_formats_read_staged_split_descriptors() {
        let args = host().command_line(&registered_input_job()).unwrap();
        assert_eq!(option_value(&args, "-input"), "out.splits");
        assert_eq!(option_value(&args, "-inputformat"), SPLIT_INPUT_FORMAT);
        assert!(args.contains(&"mapreduce.input.lineinputformat.linespermap=1".to_string()));
        assert!(args.contains(&"stream.map.input.ignoreKey=true".to_string()));
        assert!(args.contains(&"conduit.input_format=test::two_splits".to_string()));
        assert!(!args.iter().any(|arg| arg == "logs/day1"));
    }

    #[test]
    fn bound_partitioners_shuffle_on_the_leading_key_field() {
        let mut job = job();
        job.configuration
            .set(ExtensionKind::Reducer.config_key(), "conduit::count_reducer");
        job.configuration
            .set(ExtensionKind::Partitioner.config_key(), "conduit::hash_partitioner");
        let args = host().command_line(&job).unwrap();

        assert_eq!(option_value(&args, "-partitioner"), KEY_FIELD_PARTITIONER);
        assert!(args.contains(&"stream.num.map.output.key.fields=2".to_string()));
        assert!(args.contains(&"mapreduce.partition.keypartitioner.options=-k1,1".to_string()));
        assert!(position(&args, "mapreduce.partition.keypartitioner.options=-k1,1") < position(&args, "-input"));

        job.configuration.unset(ExtensionKind::Reducer.config_key());
        let args = host().command_line(&job).unwrap();
        assert!(!args.contains(&"-partitioner".to_string()));
    }

    #[test]
    fn split_files_sit_next_to_the_output() {
        assert_eq!(splits_path("out/counts/"), "out/counts.splits");
        assert_eq!(splits_path("out"), "out.splits");
    }

    #[tokio::test]
    async fn dry_run_reports_success_without_launching() {
        let host = StreamingHost::new(
            HostConfig {
                hadoop_bin: "/nonexistent/hadoop".to_string(),
                dry_run: true,
                ..HostConfig::default()
            },
            registry(),
        );
        assert!(host.wait_for_completion(&job(), false).await.unwrap());
        assert!(host
            .wait_for_completion(&registered_input_job(), false)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn split_enumeration_failures_stop_the_submission() {
        let host = StreamingHost::new(
            HostConfig {
                hadoop_bin: "/nonexistent/hadoop".to_string(),
                dry_run: true,
                ..HostConfig::default()
            },
            Arc::new(Registry::with_builtins()),
        );
        let err = host
            .wait_for_completion(&registered_input_job(), false)
            .await
            .unwrap_err();
        assert!(matches!(err, FerrumConduitError::ConfigError(_)));
    }

    #[tokio::test]
    async fn missing_hadoop_binary_is_a_host_error() {
        let host = StreamingHost::new(
            HostConfig {
                hadoop_bin: "/nonexistent/hadoop".to_string(),
                task_command: "task".to_string(),
                ..HostConfig::default()
            },
            registry(),
        );
        let err = host.wait_for_completion(&job(), false).await.unwrap_err();
        assert!(matches!(err, FerrumConduitError::HostError(_)));

        let err = host
            .wait_for_completion(&registered_input_job(), false)
            .await
            .unwrap_err();
        assert!(matches!(err, FerrumConduitError::HostError(_)));
    }
}
