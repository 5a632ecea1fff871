use crate::core::job::{GroupKind, JobGroup, JobNode, JobSpec};
use crate::framework::host::HostRuntime;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tracing::{error, info, warn};

type NodeFuture = Pin<Box<dyn Future<Output = bool> + Send>>;

/// Runs the whole tree and reports whether every job that ran succeeded.
pub async fn run(root: JobGroup, host: Arc<dyn HostRuntime>, verbose: bool) -> bool {
    run_node(JobNode::Group(root), host, verbose).await
}

pub fn run_node(node: JobNode, host: Arc<dyn HostRuntime>, verbose: bool) -> NodeFuture {
    Box::pin(async move {
        match node {
            JobNode::Job(job) => run_job(job, host, verbose).await,
            JobNode::Group(group) => match group.kind {
                GroupKind::Sequence => run_sequence(group.members, host, verbose).await,
                GroupKind::Parallel => run_parallel(group.members, host, verbose).await,
            },
        }
    })
}

async fn run_job(job: Arc<JobSpec>, host: Arc<dyn HostRuntime>, verbose: bool) -> bool {
    match host.wait_for_completion(&job, verbose).await {
        Ok(true) => {
            info!("job {} completed", job.name);
            true
        }
        Ok(false) => {
            error!("job {} failed", job.name);
            false
        }
        Err(err) => {
            warn!("job {} could not be run: {}", job.name, err);
            false
        }
    }
}

/// Members run one after another; the first failure ends the sequence.
async fn run_sequence(members: Vec<JobNode>, host: Arc<dyn HostRuntime>, verbose: bool) -> bool {
    for member in members {
        if !run_node(member, host.clone(), verbose).await {
            return false;
        }
    }
    true
}

/// Every member is started at once and every one is awaited, even after a
/// sibling has failed.
async fn run_parallel(members: Vec<JobNode>, host: Arc<dyn HostRuntime>, verbose: bool) -> bool {
    let handles: Vec<_> = members
        .into_iter()
        .map(|member| tokio::spawn(run_node(member, host.clone(), verbose)))
        .collect();

    let mut success = true;
    for handle in handles {
        match handle.await {
            Ok(result) => success &= result,
            Err(err) => {
                error!("parallel member panicked: {}", err);
                success = false;
            }
        }
    }
    success
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::configuration::Configuration;
    use crate::framework::errors::{FerrumConduitError, Result};
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Records submissions; jobs named in `failing` report failure.
    struct ScriptedHost {
        failing: Vec<&'static str>,
        submitted: Mutex<Vec<String>>,
    }

    impl ScriptedHost {
        fn new(failing: Vec<&'static str>) -> Arc<Self> {
            Arc::new(ScriptedHost {
                failing,
                submitted: Mutex::new(Vec::new()),
            })
        }

        fn submitted(&self) -> Vec<String> {
            self.submitted.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl HostRuntime for ScriptedHost {
        async fn wait_for_completion(&self, job: &JobSpec, _verbose: bool) -> Result<bool> {
            self.submitted.lock().unwrap().push(job.name.clone());
            if job.name == "broken" {
                return Err(FerrumConduitError::HostError("unreachable cluster".to_string()));
            }
            Ok(!self.failing.contains(&job.name.as_str()))
        }
    }

    fn group(kind: GroupKind, names: &[&str]) -> JobGroup {
        let base = Configuration::new();
        let mut group = JobGroup::new(kind);
        for name in names {
            group.add_job(JobSpec::new(name, &base));
        }
        group
    }

    #[tokio::test]
    async fn sequence_succeeds_when_every_job_does() {
        let host = ScriptedHost::new(vec![]);
        let ok = run(group(GroupKind::Sequence, &["a", "b"]), host.clone(), false).await;
        assert!(ok);
        assert_eq!(host.submitted(), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn host_errors_count_as_failures() {
        let host = ScriptedHost::new(vec![]);
        let ok = run(group(GroupKind::Sequence, &["broken", "after"]), host.clone(), false).await;
        assert!(!ok);
        assert_eq!(host.submitted(), vec!["broken"]);
    }

    #[tokio::test]
    async fn nested_groups_follow_their_own_policy() {
        let host = ScriptedHost::new(vec!["p2"]);
        let mut root = group(GroupKind::Sequence, &["first"]);
        root.add_group(group(GroupKind::Parallel, &["p1", "p2"]));
        root.add_job(JobSpec::new("last", &Configuration::new()));

        let ok = run(root, host.clone(), false).await;
        assert!(!ok);
        let mut submitted = host.submitted();
        submitted.sort();
        assert_eq!(submitted, vec!["first", "p1", "p2"]);
    }

    #[tokio::test]
    async fn empty_groups_succeed() {
        let host = ScriptedHost::new(vec![]);
        assert!(run(JobGroup::sequence(), host.clone(), false).await);
        assert!(run(JobGroup::parallel(), host, false).await);
    }
}
