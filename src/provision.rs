//! Instance provisioning.
//!
//! Creates an instance through a [`Provider`] and polls it until it is active
//! and has a public address. The whole flow runs in one spawned task bounded
//! by the provisioning deadline; the task reports a single tagged
//! [`ProvisionOutcome`] over a oneshot channel.
//!
//! Cancellation reaches the poller in both directions:
//! - when the deadline fires, the flow future is dropped, so an in-flight
//!   API call is abandoned and no further polls are issued;
//! - when the caller stops waiting (Ctrl-C, an outer timeout), dropping the
//!   wait aborts the task.

use std::fmt;
use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::error::{DevOpsMateError, Result};
use crate::provider::{InstanceRequest, Provider, ProviderError, ProviderInstance, ProviderTimeouts};

/// Everything the install steps need to reach a provisioned instance.
#[derive(Clone, PartialEq, Eq)]
pub struct InstanceConnection {
    pub instance_id: String,
    /// Public address of the instance
    pub address: IpAddr,
    /// Login user on the instance
    pub user: String,
    /// Local SSH private key used to authenticate
    pub credential_ref: PathBuf,
    /// Password generated by the provider for `user`
    pub generated_secret: String,
}

impl InstanceConnection {
    fn from_instance(instance: &ProviderInstance, address: IpAddr, credential_ref: PathBuf) -> Self {
        Self {
            instance_id: instance.id.clone(),
            address,
            user: instance.initial_user.clone(),
            credential_ref,
            generated_secret: instance.initial_password.clone(),
        }
    }

    /// `user@address` as passed to ssh.
    pub fn target(&self) -> String {
        format!("{}@{}", self.user, self.address)
    }
}

impl fmt::Debug for InstanceConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstanceConnection")
            .field("instance_id", &self.instance_id)
            .field("address", &self.address)
            .field("user", &self.user)
            .field("credential_ref", &self.credential_ref)
            .field("generated_secret", &"[redacted]")
            .finish()
    }
}

/// Result of one provisioning run.
#[derive(Debug)]
pub enum ProvisionOutcome {
    Ready(InstanceConnection),
    Failed(DevOpsMateError),
    /// The deadline fired first. `instance_id` is set when the instance had
    /// already been created and is now left running.
    TimedOut {
        elapsed: Duration,
        instance_id: Option<String>,
    },
}

impl ProvisionOutcome {
    pub fn into_result(self) -> Result<InstanceConnection> {
        match self {
            Self::Ready(connection) => Ok(connection),
            Self::Failed(e) => Err(e),
            Self::TimedOut {
                elapsed,
                instance_id,
            } => Err(DevOpsMateError::Timeout {
                elapsed,
                instance_id,
            }),
        }
    }
}

pub struct Provisioner {
    provider: Arc<dyn Provider>,
    deadline: Duration,
    poll_interval: Duration,
}

impl Provisioner {
    pub fn new(provider: Arc<dyn Provider>, timeouts: &ProviderTimeouts) -> Self {
        Self {
            provider,
            deadline: timeouts.instance_ready,
            poll_interval: timeouts.poll_interval,
        }
    }

    /// Create an instance and wait until it is reachable.
    ///
    /// The provider is asked to create the instance exactly once; any API
    /// error ends the run. A status that never turns active runs until the
    /// deadline.
    pub async fn provision(
        &self,
        request: InstanceRequest,
        ssh_key_path: PathBuf,
    ) -> Result<InstanceConnection> {
        self.run(request, ssh_key_path).await.into_result()
    }

    /// Like [`Provisioner::provision`] but returns the tagged outcome.
    pub async fn run(&self, request: InstanceRequest, ssh_key_path: PathBuf) -> ProvisionOutcome {
        let (tx, rx) = oneshot::channel();
        let created = Arc::new(OnceLock::new());
        let deadline = self.deadline;

        let flow = create_and_wait(
            self.provider.clone(),
            request,
            ssh_key_path,
            self.poll_interval,
            created.clone(),
        );

        let task = tokio::spawn(async move {
            let outcome = match tokio::time::timeout(deadline, flow).await {
                Ok(Ok(connection)) => ProvisionOutcome::Ready(connection),
                Ok(Err(e)) => ProvisionOutcome::Failed(e),
                Err(_) => {
                    let instance_id = created.get().cloned();
                    if let Some(id) = &instance_id {
                        tracing::warn!(
                            "Instance {} did not become active within {:?}; it was not destroyed",
                            id,
                            deadline
                        );
                    }
                    ProvisionOutcome::TimedOut {
                        elapsed: deadline,
                        instance_id,
                    }
                }
            };

            if tx.send(outcome).is_err() {
                tracing::debug!("Provisioning result discarded: caller stopped waiting");
            }
        });

        let _guard = AbortOnDrop(task);

        match rx.await {
            Ok(outcome) => outcome,
            Err(_) => ProvisionOutcome::Failed(DevOpsMateError::Other(anyhow::anyhow!(
                "provisioning task exited without reporting a result"
            ))),
        }
    }
}

/// Aborts the poller if the waiting future is dropped before it finishes.
struct AbortOnDrop(JoinHandle<()>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

async fn create_and_wait(
    provider: Arc<dyn Provider>,
    request: InstanceRequest,
    ssh_key_path: PathBuf,
    poll_interval: Duration,
    created: Arc<OnceLock<String>>,
) -> Result<InstanceConnection> {
    let resolved = provider
        .resolve_request(&request)
        .await
        .map_err(DevOpsMateError::InstanceConfig)?;

    let instance = provider
        .create_instance(&resolved)
        .await
        .map_err(DevOpsMateError::Create)?;
    let _ = created.set(instance.id.clone());

    tracing::info!(
        "Instance {} ({}) requested from {}, waiting for it to become active",
        instance.hostname,
        instance.id,
        provider.name()
    );

    loop {
        let current = provider
            .get_instance(&instance.id)
            .await
            .map_err(DevOpsMateError::Poll)?
            .ok_or_else(|| {
                DevOpsMateError::Poll(ProviderError::not_found("instance", &instance.id))
            })?;

        if let Some(address) = current.public_ip.filter(|_| current.is_ready()) {
            tracing::info!(
                "Instance {} is active at {} ({} after creation)",
                current.id,
                address,
                crate::utils::format_duration(current.age_secs(chrono::Utc::now()))
            );
            return Ok(InstanceConnection::from_instance(
                &current,
                address,
                ssh_key_path,
            ));
        }

        tracing::debug!(
            "Instance {} is {} (public IP: {})",
            current.id,
            current.status,
            current
                .public_ip
                .map(|ip| ip.to_string())
                .unwrap_or_else(|| "pending".to_string())
        );

        tokio::time::sleep(poll_interval).await;
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;
    use chrono::Utc;
    use tokio::time::Instant;

    use super::*;
    use crate::config::AppConfig;
    use crate::install::{default_steps, run_all, CommandOutput, RemoteExecutor, StepFailure};
    use crate::provider::{InstanceStatus, ProviderResult, ResolvedRequest};

    #[derive(Default)]
    struct MockProvider {
        fail_resolve: bool,
        fail_create: bool,
        fail_get: bool,
        /// (status, public ip) per poll; the last entry repeats
        polls: Mutex<VecDeque<(&'static str, Option<&'static str>)>>,
        create_calls: AtomicUsize,
        get_calls: AtomicUsize,
    }

    impl MockProvider {
        fn with_polls(polls: &[(&'static str, Option<&'static str>)]) -> Self {
            Self {
                polls: Mutex::new(polls.iter().copied().collect()),
                ..Default::default()
            }
        }

        fn instance(status: &str, ip: Option<&str>) -> ProviderInstance {
            ProviderInstance {
                id: "inst-1".to_string(),
                hostname: "devopsmate-test".to_string(),
                status: InstanceStatus::parse(status),
                public_ip: ip.map(|ip| ip.parse().unwrap()),
                initial_user: "civo".to_string(),
                initial_password: "pw123".to_string(),
                created_at: Utc::now(),
            }
        }
    }

    #[async_trait]
    impl Provider for MockProvider {
        fn name(&self) -> &'static str {
            "mock"
        }

        async fn resolve_request(
            &self,
            request: &InstanceRequest,
        ) -> ProviderResult<ResolvedRequest> {
            if self.fail_resolve {
                return Err(ProviderError::not_found("disk image", &request.disk_image));
            }
            Ok(ResolvedRequest {
                request: request.clone(),
                network_id: "net".to_string(),
                image_id: "img".to_string(),
            })
        }

        async fn create_instance(
            &self,
            _request: &ResolvedRequest,
        ) -> ProviderResult<ProviderInstance> {
            self.create_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_create {
                return Err(ProviderError::api(400, "quota_limit_reached"));
            }
            Ok(Self::instance("BUILDING", None))
        }

        async fn get_instance(&self, _id: &str) -> ProviderResult<Option<ProviderInstance>> {
            self.get_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_get {
                return Err(ProviderError::api(500, "internal_error"));
            }

            let mut polls = self.polls.lock().unwrap();
            let next = if polls.len() > 1 {
                polls.pop_front()
            } else {
                polls.front().copied()
            };
            Ok(next.map(|(status, ip)| Self::instance(status, ip)))
        }
    }

    fn timeouts(deadline: u64, poll: u64) -> ProviderTimeouts {
        ProviderTimeouts {
            instance_ready: Duration::from_secs(deadline),
            poll_interval: Duration::from_secs(poll),
            ..ProviderTimeouts::default()
        }
    }

    fn request() -> InstanceRequest {
        InstanceRequest::new("devopsmate-test", "LON1", "g3.medium")
    }

    #[tokio::test(start_paused = true)]
    async fn test_active_on_first_poll() {
        let provider = Arc::new(MockProvider::with_polls(&[("ACTIVE", Some("1.2.3.4"))]));
        let provisioner = Provisioner::new(provider.clone(), &timeouts(600, 5));

        let connection = provisioner
            .provision(request(), PathBuf::from("/keys/id_ed25519"))
            .await
            .unwrap();

        assert_eq!(connection.address, "1.2.3.4".parse::<IpAddr>().unwrap());
        assert_eq!(connection.credential_ref, PathBuf::from("/keys/id_ed25519"));
        assert_eq!(connection.generated_secret, "pw123");
        assert_eq!(connection.user, "civo");
        assert_eq!(connection.target(), "civo@1.2.3.4");
        assert_eq!(provider.create_calls.load(Ordering::SeqCst), 1);
        assert_eq!(provider.get_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pending_until_deadline_times_out() {
        let provider = Arc::new(MockProvider::with_polls(&[("PENDING", None)]));
        let provisioner = Provisioner::new(provider.clone(), &timeouts(5, 5));

        let start = Instant::now();
        let err = provisioner
            .provision(request(), PathBuf::from("/keys/id"))
            .await
            .unwrap_err();

        assert!(start.elapsed() <= Duration::from_secs(10));
        match err {
            DevOpsMateError::Timeout {
                elapsed,
                instance_id,
            } => {
                assert_eq!(elapsed, Duration::from_secs(5));
                assert_eq!(instance_id.as_deref(), Some("inst-1"));
            }
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_never_active_is_bounded_by_deadline() {
        let provider = Arc::new(MockProvider::with_polls(&[("BUILDING", None)]));
        let provisioner = Provisioner::new(provider.clone(), &timeouts(120, 5));

        let start = Instant::now();
        let outcome = provisioner.run(request(), PathBuf::from("/keys/id")).await;

        assert!(matches!(outcome, ProvisionOutcome::TimedOut { .. }));
        assert!(start.elapsed() >= Duration::from_secs(120));
        assert!(start.elapsed() <= Duration::from_secs(125));
        // polls at 0, 5, ..., 120
        assert!(provider.get_calls.load(Ordering::SeqCst) <= 25);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_stops_polling() {
        let provider = Arc::new(MockProvider::with_polls(&[("BUILDING", None)]));
        let provisioner = Provisioner::new(provider.clone(), &timeouts(10, 1));

        let outcome = provisioner.run(request(), PathBuf::from("/keys/id")).await;
        assert!(matches!(outcome, ProvisionOutcome::TimedOut { .. }));

        let calls = provider.get_calls.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(provider.get_calls.load(Ordering::SeqCst), calls);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_the_wait_aborts_the_poller() {
        let provider = Arc::new(MockProvider::with_polls(&[("BUILDING", None)]));
        let provisioner = Provisioner::new(provider.clone(), &timeouts(600, 1));

        let abandoned = tokio::time::timeout(
            Duration::from_secs(3),
            provisioner.provision(request(), PathBuf::from("/keys/id")),
        )
        .await;
        assert!(abandoned.is_err());

        let calls = provider.get_calls.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(provider.get_calls.load(Ordering::SeqCst), calls);
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_failure_skips_polling() {
        let provider = Arc::new(MockProvider {
            fail_create: true,
            ..MockProvider::with_polls(&[("ACTIVE", Some("1.2.3.4"))])
        });
        let provisioner = Provisioner::new(provider.clone(), &timeouts(600, 5));

        let start = Instant::now();
        let err = provisioner
            .provision(request(), PathBuf::from("/keys/id"))
            .await
            .unwrap_err();

        assert!(matches!(err, DevOpsMateError::Create(_)));
        assert!(start.elapsed() < Duration::from_secs(1));
        assert_eq!(provider.get_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_resolve_failure_is_instance_config_error() {
        let provider = Arc::new(MockProvider {
            fail_resolve: true,
            ..Default::default()
        });
        let provisioner = Provisioner::new(provider.clone(), &timeouts(600, 5));

        let err = provisioner
            .provision(request(), PathBuf::from("/keys/id"))
            .await
            .unwrap_err();

        assert!(matches!(err, DevOpsMateError::InstanceConfig(_)));
        assert_eq!(provider.create_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_error_ends_the_run() {
        let provider = Arc::new(MockProvider {
            fail_get: true,
            ..Default::default()
        });
        let provisioner = Provisioner::new(provider.clone(), &timeouts(600, 5));

        let err = provisioner
            .provision(request(), PathBuf::from("/keys/id"))
            .await
            .unwrap_err();

        assert!(matches!(err, DevOpsMateError::Poll(ProviderError::Api { .. })));
        assert_eq!(provider.get_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_vanished_instance_is_poll_error() {
        let provider = Arc::new(MockProvider::default());
        let provisioner = Provisioner::new(provider.clone(), &timeouts(600, 5));

        let err = provisioner
            .provision(request(), PathBuf::from("/keys/id"))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            DevOpsMateError::Poll(ProviderError::NotFound { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_active_without_address_keeps_polling() {
        let provider = Arc::new(MockProvider::with_polls(&[
            ("BUILDING", None),
            ("ACTIVE", None),
            ("ACTIVE", Some("10.0.0.9")),
        ]));
        let provisioner = Provisioner::new(provider.clone(), &timeouts(600, 5));

        let start = Instant::now();
        let connection = provisioner
            .provision(request(), PathBuf::from("/keys/id"))
            .await
            .unwrap();

        assert_eq!(connection.address.to_string(), "10.0.0.9");
        assert_eq!(provider.get_calls.load(Ordering::SeqCst), 3);
        assert!(start.elapsed() >= Duration::from_secs(10));
        assert!(start.elapsed() < Duration::from_secs(11));
    }

    /// Records the connection handed to every remote command.
    #[derive(Default)]
    struct ConnectionRecorder {
        seen: Mutex<Vec<InstanceConnection>>,
    }

    #[async_trait]
    impl RemoteExecutor for ConnectionRecorder {
        async fn execute(
            &self,
            connection: &InstanceConnection,
            _script: &str,
            _input: Option<&str>,
        ) -> std::result::Result<CommandOutput, StepFailure> {
            self.seen.lock().unwrap().push(connection.clone());
            Ok(CommandOutput::default())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_connection_reaches_every_install_step_unchanged() {
        let provider = Arc::new(MockProvider::with_polls(&[("ACTIVE", Some("1.2.3.4"))]));
        let provisioner = Provisioner::new(provider, &timeouts(600, 5));
        let key_path = PathBuf::from("/keys/id_ed25519");

        let connection = provisioner
            .provision(request(), key_path.clone())
            .await
            .unwrap();

        let recorder = ConnectionRecorder::default();
        let steps = default_steps(&AppConfig::default(), None);
        run_all(&steps, &connection, &recorder).await.unwrap();

        let seen = recorder.seen.lock().unwrap();
        assert_eq!(seen.len(), steps.len());
        for received in seen.iter() {
            assert_eq!(received, &connection);
            assert_eq!(received.address, "1.2.3.4".parse::<IpAddr>().unwrap());
            assert_eq!(received.credential_ref, key_path);
            assert_eq!(received.generated_secret, "pw123");
        }
    }

    #[test]
    fn test_connection_debug_redacts_secret() {
        let connection = InstanceConnection {
            instance_id: "inst-1".to_string(),
            address: "1.2.3.4".parse().unwrap(),
            user: "civo".to_string(),
            credential_ref: PathBuf::from("/keys/id"),
            generated_secret: "pw123".to_string(),
        };

        let debug = format!("{:?}", connection);
        assert!(!debug.contains("pw123"));
        assert!(debug.contains("[redacted]"));
    }
}
