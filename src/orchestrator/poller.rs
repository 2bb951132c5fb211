//! Task convergence polling.

use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::provider::{Attachment, Container, NetworkInterface, ProviderClient, Task};

/// Outcome of polling a task list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConvergenceReport {
    /// Best-known view of every polled task.
    pub tasks: Vec<Task>,
    /// Number of describe rounds performed.
    pub rounds: u32,
    /// Whether every task reached its desired status.
    pub converged: bool,
}

/// Metadata aggregated from converged tasks.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskMetadata {
    /// Containers across all tasks.
    pub containers: Vec<Container>,
    /// Attachments across all tasks.
    pub attachments: Vec<Attachment>,
    /// Network interfaces referenced by the attachments.
    pub network_interfaces: Vec<NetworkInterface>,
}

/// Polls tasks at a fixed interval until they settle.
pub struct ConvergencePoller<'a> {
    /// Provider client.
    client: &'a dyn ProviderClient,
    /// Cluster the tasks run in.
    cluster: Option<&'a str>,
    /// Delay between rounds.
    interval: Duration,
}

impl<'a> ConvergencePoller<'a> {
    /// Creates a poller.
    #[must_use]
    pub const fn new(
        client: &'a dyn ProviderClient,
        cluster: Option<&'a str>,
        interval: Duration,
    ) -> Self {
        Self {
            client,
            cluster,
            interval,
        }
    }

    /// Polls until every task converges or `max_attempts` rounds are spent.
    ///
    /// Only tasks still pending are described again. Running out of attempts
    /// is not an error: the report is returned with `converged` unset.
    ///
    /// # Errors
    ///
    /// Returns an error if a describe call fails.
    pub async fn await_convergence(
        &self,
        task_arns: &[String],
        max_attempts: u32,
    ) -> Result<ConvergenceReport> {
        if task_arns.is_empty() {
            debug!("No tasks to poll");
            return Ok(ConvergenceReport {
                tasks: Vec::new(),
                rounds: 0,
                converged: true,
            });
        }

        let mut settled: Vec<Task> = Vec::new();
        let mut pending_arns = task_arns.to_vec();
        let mut pending: Vec<Task> = Vec::new();
        let mut rounds = 0;

        for attempt in 1..=max_attempts {
            rounds = attempt;
            let described = self
                .client
                .describe_tasks(self.cluster, &pending_arns)
                .await?;

            let missing = pending_arns
                .iter()
                .filter(|arn| !described.iter().any(|t| &t.task_arn == *arn))
                .count();
            if missing > 0 {
                warn!("{missing} tasks were not described and are no longer polled");
            }

            let (done, waiting): (Vec<Task>, Vec<Task>) =
                described.into_iter().partition(Task::is_converged);
            settled.extend(done);

            if waiting.is_empty() {
                info!("{} tasks converged after {attempt} rounds", settled.len());
                return Ok(ConvergenceReport {
                    tasks: settled,
                    rounds,
                    converged: true,
                });
            }

            debug!(
                "Round {attempt}/{max_attempts}: {} tasks still pending",
                waiting.len()
            );
            pending_arns = waiting.iter().map(|t| t.task_arn.clone()).collect();
            pending = waiting;

            if attempt < max_attempts {
                tokio::time::sleep(self.interval).await;
            }
        }

        warn!(
            "{} tasks did not converge after {rounds} rounds",
            pending.len()
        );
        settled.extend(pending);

        Ok(ConvergenceReport {
            tasks: settled,
            rounds,
            converged: false,
        })
    }

    /// Collects container, attachment and interface metadata from tasks.
    ///
    /// Interface ids are resolved in one batched describe call, skipped
    /// entirely when no attachment references an interface.
    ///
    /// # Errors
    ///
    /// Returns an error if the interface lookup fails.
    pub async fn aggregate(&self, tasks: &[Task]) -> Result<TaskMetadata> {
        let containers: Vec<Container> = tasks
            .iter()
            .flat_map(|t| t.containers.iter().cloned())
            .collect();
        let attachments: Vec<Attachment> = tasks
            .iter()
            .flat_map(|t| t.attachments.iter().cloned())
            .collect();

        let interface_ids: Vec<String> = attachments
            .iter()
            .flat_map(Attachment::network_interface_ids)
            .map(String::from)
            .collect();

        let network_interfaces = if interface_ids.is_empty() {
            Vec::new()
        } else {
            self.client
                .describe_network_interfaces(&interface_ids)
                .await?
        };

        Ok(TaskMetadata {
            containers,
            attachments,
            network_interfaces,
        })
    }
}

impl std::fmt::Debug for ConvergencePoller<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConvergencePoller")
            .field("backend", &self.client.backend_type())
            .field("cluster", &self.cluster)
            .field("interval", &self.interval)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeProvider, ProviderCall, RUNNING};

    fn arns(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| (*v).to_string()).collect()
    }

    fn describe_rounds(provider: &FakeProvider) -> Vec<Vec<String>> {
        provider
            .calls()
            .into_iter()
            .filter_map(|call| match call {
                ProviderCall::DescribeTasks(arns) => Some(arns),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_converges_in_exact_rounds() {
        let provider = FakeProvider::new();
        provider.with_tasks(&[("t1", 0), ("t2", 2)]);
        let poller = ConvergencePoller::new(&provider, None, Duration::ZERO);

        let report = poller
            .await_convergence(&arns(&["t1", "t2"]), 10)
            .await
            .expect("poll succeeds");

        assert!(report.converged);
        assert_eq!(report.rounds, 3);
        assert_eq!(report.tasks.len(), 2);
        assert!(
            report
                .tasks
                .iter()
                .all(|t| t.last_status.as_deref() == Some(RUNNING))
        );

        // Only the pending task is described after the first round.
        assert_eq!(
            describe_rounds(&provider),
            vec![arns(&["t1", "t2"]), arns(&["t2"]), arns(&["t2"])]
        );
    }

    #[tokio::test]
    async fn test_exhaustion_is_soft() {
        let provider = FakeProvider::new();
        provider.with_tasks(&[("t1", 0), ("t2", u32::MAX)]);
        let poller = ConvergencePoller::new(&provider, None, Duration::ZERO);

        let report = poller
            .await_convergence(&arns(&["t1", "t2"]), 4)
            .await
            .expect("exhaustion is not an error");

        assert!(!report.converged);
        assert_eq!(report.rounds, 4);
        assert_eq!(describe_rounds(&provider).len(), 4);
        assert_eq!(report.tasks.len(), 2);
    }

    #[tokio::test]
    async fn test_empty_task_list() {
        let provider = FakeProvider::new();
        let poller = ConvergencePoller::new(&provider, None, Duration::ZERO);

        let report = poller.await_convergence(&[], 10).await.expect("no tasks");
        assert!(report.converged);
        assert_eq!(report.rounds, 0);
        assert!(provider.calls().is_empty());
    }

    #[tokio::test]
    async fn test_undescribed_task_is_dropped() {
        let provider = FakeProvider::new();
        provider.with_tasks(&[("t1", 1)]);
        let poller = ConvergencePoller::new(&provider, None, Duration::ZERO);

        let report = poller
            .await_convergence(&arns(&["t1", "stopped"]), 5)
            .await
            .expect("poll succeeds");

        assert!(report.converged);
        assert_eq!(report.tasks.len(), 1);
        assert_eq!(
            describe_rounds(&provider),
            vec![arns(&["t1", "stopped"]), arns(&["t1"])]
        );
    }

    #[tokio::test]
    async fn test_describe_failure_is_raised() {
        let provider = FakeProvider::new();
        provider.with_tasks(&[("t1", 1)]);
        provider.fail_on("DescribeTasks");
        let poller = ConvergencePoller::new(&provider, None, Duration::ZERO);

        assert!(poller.await_convergence(&arns(&["t1"]), 3).await.is_err());
    }

    #[tokio::test]
    async fn test_aggregate_batches_interfaces() {
        let provider = FakeProvider::new();
        provider.with_tasks(&[("t1", 0), ("t2", 0)]);
        let poller = ConvergencePoller::new(&provider, None, Duration::ZERO);
        let report = poller
            .await_convergence(&arns(&["t1", "t2"]), 1)
            .await
            .expect("poll succeeds");
        provider.reset_calls();

        let metadata = poller.aggregate(&report.tasks).await.expect("aggregate");

        assert_eq!(metadata.containers.len(), 2);
        assert_eq!(metadata.attachments.len(), 2);
        assert_eq!(metadata.network_interfaces.len(), 2);
        assert_eq!(
            provider.calls(),
            vec![ProviderCall::DescribeNetworkInterfaces(arns(&[
                "eni-t1", "eni-t2"
            ]))]
        );
    }

    #[tokio::test]
    async fn test_aggregate_without_interfaces() {
        let provider = FakeProvider::new();
        let poller = ConvergencePoller::new(&provider, None, Duration::ZERO);

        let metadata = poller.aggregate(&[Task::default()]).await.expect("aggregate");
        assert!(metadata.network_interfaces.is_empty());
        assert!(provider.calls().is_empty());
    }
}
