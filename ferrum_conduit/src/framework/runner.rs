use crate::config::configuration::Configuration;
use crate::core::driver;
use crate::core::job::{JobGroup, JOB_SETUP_SCRIPT_KEY};
use crate::core::registry::{ExtensionKind, Registry};
use crate::framework::dsl::ConfigurationDefinition;
use crate::framework::errors::{FerrumConduitError, Result};
use crate::framework::host::HostRuntime;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    let message = match payload.downcast::<String>() {
        Ok(message) => *message,
        Err(payload) => match payload.downcast_ref::<&str>() {
            Some(message) => message.to_string(),
            None => "unknown panic".to_string(),
        },
    };
    format!("setup panicked: {}", message)
}

/// Evaluates a job setup and drives the resulting tree on the host.
pub struct JobRunner<'r> {
    base: Configuration,
    registry: &'r Registry,
    host: Arc<dyn HostRuntime>,
    verbose: bool,
}

impl<'r> JobRunner<'r> {
    pub fn new(base: Configuration, registry: &'r Registry, host: Arc<dyn HostRuntime>) -> Self {
        JobRunner {
            base,
            registry,
            host,
            verbose: false,
        }
    }

    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Builds the job tree. Any failure, including a panic inside `setup`, a
    /// job without input or output and a binding to a name the registry does
    /// not know, is reported against `setup_script`.
    pub fn configure<F>(&self, setup_script: &str, arguments: Vec<String>, setup: F) -> Result<JobGroup>
    where
        F: FnOnce(&mut ConfigurationDefinition) -> Result<()>,
    {
        let script_name = Path::new(setup_script)
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| setup_script.to_string());

        let mut base = self.base.clone();
        base.set(JOB_SETUP_SCRIPT_KEY, script_name.as_str());

        let mut definition = ConfigurationDefinition::new(base, arguments);
        panic::catch_unwind(AssertUnwindSafe(|| setup(&mut definition)))
            .unwrap_or_else(|payload| Err(FerrumConduitError::ConfigError(panic_message(payload))))
            .and_then(|_| {
                let root = definition.into_root();
                self.check_jobs(&root)?;
                self.check_bindings(&root)?;
                Ok(root)
            })
            .map_err(|err| FerrumConduitError::job_configuration(setup_script, err))
    }

    fn check_jobs(&self, root: &JobGroup) -> Result<()> {
        for job in root.jobs() {
            if job.input_paths().map_or(true, str::is_empty) {
                return Err(FerrumConduitError::ConfigError(format!(
                    "job {} has no input",
                    job.name
                )));
            }
            if job.output_path().map_or(true, str::is_empty) {
                return Err(FerrumConduitError::ConfigError(format!(
                    "job {} has no output",
                    job.name
                )));
            }
            if job.binding(ExtensionKind::Reducer).is_none() {
                if let Some(partitioner) = job.binding(ExtensionKind::Partitioner) {
                    warn!(
                        "job {} has no reducer, partitioner {} will not be called",
                        job.name, partitioner
                    );
                }
            }
        }
        Ok(())
    }

    fn check_bindings(&self, root: &JobGroup) -> Result<()> {
        for job in root.jobs() {
            for (kind, name) in job.bindings() {
                if !self.registry.contains(kind, name) {
                    return Err(FerrumConduitError::ConfigError(format!(
                        "Cannot load {} {}: no such implementation is registered",
                        kind, name
                    )));
                }
            }
        }
        Ok(())
    }

    /// `Ok(true)` when every submitted job succeeded. Setup errors are
    /// returned before anything reaches the host.
    pub async fn run<F>(&self, setup_script: &str, arguments: Vec<String>, setup: F) -> Result<bool>
    where
        F: FnOnce(&mut ConfigurationDefinition) -> Result<()>,
    {
        let root = self.configure(setup_script, arguments, setup)?;
        info!(
            "running {} jobs from {}",
            root.jobs().len(),
            setup_script
        );
        Ok(driver::run(root, self.host.clone(), self.verbose).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::job::JobSpec;
    use crate::framework::dsl::{InputOptions, JobDefinition, OutputOptions};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct SucceedingHost {
        submitted: AtomicUsize,
    }

    #[async_trait]
    impl HostRuntime for SucceedingHost {
        async fn wait_for_completion(&self, _job: &JobSpec, _verbose: bool) -> Result<bool> {
            self.submitted.fetch_add(1, Ordering::SeqCst);
            Ok(true)
        }
    }

    fn runner(registry: &Registry) -> JobRunner<'_> {
        JobRunner::new(Configuration::new(), registry, Arc::new(SucceedingHost::default()))
    }

    fn in_and_out(job: &mut JobDefinition) -> Result<()> {
        job.input("in", InputOptions::default())?;
        job.output(Some("out"), OutputOptions::default())?;
        Ok(())
    }

    #[test]
    fn records_the_setup_script_base_name() {
        let registry = Registry::with_builtins();
        let root = runner(&registry)
            .configure("/jobs/word_count.yml", vec![], |conf| conf.job("wc", in_and_out))
            .unwrap();
        let jobs = root.jobs();
        assert_eq!(
            jobs[0].configuration.get(JOB_SETUP_SCRIPT_KEY),
            Some("word_count.yml")
        );
    }

    #[test]
    fn setup_errors_are_wrapped_with_the_script() {
        let registry = Registry::with_builtins();
        let err = runner(&registry)
            .configure("word_count.yml", vec![], |conf| {
                conf.job("wc", |job| job.output(None, OutputOptions::default()).map(|_| ()))
            })
            .unwrap_err();

        match err {
            FerrumConduitError::JobConfigurationError {
                script,
                message,
                source,
            } => {
                assert_eq!(script, "word_count.yml");
                assert!(message.contains("neither dir nor intermediate specified"));
                assert!(matches!(*source, FerrumConduitError::ArgumentError(_)));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn unknown_bindings_fail_before_submission() {
        let registry = Registry::with_builtins();
        let err = runner(&registry)
            .configure("setup", vec![], |conf| {
                conf.job("wc", |job| {
                    in_and_out(job)?;
                    job.set_mapper("missing::mapper");
                    Ok(())
                })
            })
            .unwrap_err();
        assert!(err.to_string().contains("missing::mapper"));
    }

    #[tokio::test]
    async fn run_reports_success() {
        let registry = Registry::with_builtins();
        let ok = runner(&registry)
            .run("setup", vec!["in".to_string()], |conf| {
                let input = conf.arguments()[0].clone();
                conf.job("wc", |job| {
                    job.input(input.as_str(), Default::default())?;
                    job.output(Some("out"), Default::default())?;
                    job.set_reducer("conduit::count_reducer");
                    Ok(())
                })
            })
            .await
            .unwrap();
        assert!(ok);
    }

    #[tokio::test]
    async fn jobs_without_output_fail_before_any_submission() {
        let registry = Registry::with_builtins();
        let host = Arc::new(SucceedingHost::default());
        let runner = JobRunner::new(Configuration::new(), &registry, host.clone());

        let result = runner
            .run("setup.yml", vec![], |conf| {
                conf.job("complete", in_and_out)?;
                conf.job("unfinished", |job| {
                    job.input("in", InputOptions::default())?;
                    Ok(())
                })
            })
            .await;

        match result {
            Err(FerrumConduitError::JobConfigurationError { message, .. }) => {
                assert!(message.contains("job unfinished has no output"));
            }
            other => panic!("unexpected result: {:?}", other),
        }
        assert_eq!(host.submitted.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn jobs_without_input_are_configuration_errors() {
        let registry = Registry::with_builtins();
        let err = runner(&registry)
            .configure("setup.yml", vec![], |conf| {
                conf.job("wc", |job| job.output(Some("out"), OutputOptions::default()).map(|_| ()))
            })
            .unwrap_err();
        assert!(err.to_string().contains("job wc has no input"));
    }

    #[test]
    fn panics_in_setup_are_configuration_errors() {
        let registry = Registry::with_builtins();
        let err = runner(&registry)
            .configure("word_count.yml", vec![], |conf| {
                let _input = conf.arguments()[0].clone();
                Ok(())
            })
            .unwrap_err();

        match err {
            FerrumConduitError::JobConfigurationError { script, message, .. } => {
                assert_eq!(script, "word_count.yml");
                assert!(message.contains("setup panicked"));
                assert!(message.contains("index out of bounds"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
