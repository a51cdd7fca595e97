//! The built-in install steps.
//!
//! Every step runs as the instance's login user and escalates with `sudo`
//! where the package manager needs it. Scripts start with `set -e` so the
//! first failing command fails the step.

use async_trait::async_trait;

use super::InstallStep;
use crate::config::{AppConfig, ClusterConfig};
use crate::utils::{redact, shell_quote};

const SCRIPT_PRELUDE: &str = "set -e\nexport DEBIAN_FRONTEND=noninteractive\n";

fn script(body: &str) -> String {
    format!("{}{}", SCRIPT_PRELUDE, body)
}

/// Jenkins from the upstream Debian repository, with a JDK.
#[derive(Debug, Clone, Copy, Default)]
pub struct JenkinsStep;

#[async_trait]
impl InstallStep for JenkinsStep {
    fn name(&self) -> &'static str {
        "Jenkins"
    }

    fn script(&self) -> String {
        script(
            r#"sudo apt-get update -y
sudo apt-get install -y openjdk-11-jdk wget
wget -q -O - https://pkg.jenkins.io/debian/jenkins.io.key | sudo apt-key add -
echo "deb http://pkg.jenkins.io/debian-stable binary/" | sudo tee /etc/apt/sources.list.d/jenkins.list
sudo apt-get update -y
sudo apt-get install -y jenkins
sudo systemctl start jenkins
"#,
        )
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SonarQubeStep;

#[async_trait]
impl InstallStep for SonarQubeStep {
    fn name(&self) -> &'static str {
        "SonarQube"
    }

    fn script(&self) -> String {
        script("sudo apt-get install -y sonarqube\n")
    }
}

/// Cloud Native Buildpacks `pack` CLI.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuildpacksStep;

#[async_trait]
impl InstallStep for BuildpacksStep {
    fn name(&self) -> &'static str {
        "Buildpacks"
    }

    fn script(&self) -> String {
        script("curl -s https://buildpacks.io/install.sh | sudo bash\n")
    }
}

/// Installs the Civo CLI on the instance and creates a managed Kubernetes
/// cluster from there, then saves its kubeconfig and checks the nodes.
#[derive(Clone)]
pub struct ManagedClusterStep {
    cluster: ClusterConfig,
    region: String,
    api_key: Option<String>,
}

impl ManagedClusterStep {
    pub fn new(cluster: ClusterConfig, region: impl Into<String>) -> Self {
        Self {
            cluster,
            region: region.into(),
            api_key: None,
        }
    }

    /// Key saved into the remote `civo` CLI. It is passed on stdin, never in
    /// the script. Without one the CLI must already be authenticated on the
    /// instance.
    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key.filter(|k| !k.is_empty());
        self
    }

    fn render(&self) -> String {
        let name = shell_quote(&self.cluster.name);
        let mut body = String::new();

        // Read the key before anything else can consume stdin
        if self.api_key.is_some() {
            body.push_str("IFS= read -r CIVO_API_KEY\n");
        }
        body.push_str("curl -sL https://cli.civo.com/install | sudo bash\n");
        if self.api_key.is_some() {
            body.push_str("civo apikey save devopsmate \"$CIVO_API_KEY\"\n");
            body.push_str("unset CIVO_API_KEY\n");
            body.push_str("civo apikey current devopsmate\n");
        }

        body.push_str(&format!("civo region current {}\n", shell_quote(&self.region)));
        body.push_str(&format!(
            "civo kubernetes create {} --size={} --nodes={} --wait\n",
            name,
            shell_quote(&self.cluster.size),
            self.cluster.nodes
        ));
        body.push_str("mkdir -p ~/.kube\n");
        body.push_str(&format!(
            "civo kubernetes config {} --save --local-path ~/.kube/config\n",
            name
        ));
        body.push_str(
            "command -v kubectl >/dev/null 2>&1 || sudo snap install kubectl --classic\n",
        );
        body.push_str("kubectl get nodes\n");

        script(&body)
    }
}

impl std::fmt::Debug for ManagedClusterStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManagedClusterStep")
            .field("cluster", &self.cluster)
            .field("region", &self.region)
            .field("api_key", &self.api_key.as_deref().map(redact))
            .finish()
    }
}

#[async_trait]
impl InstallStep for ManagedClusterStep {
    fn name(&self) -> &'static str {
        "Civo Kubernetes"
    }

    fn script(&self) -> String {
        self.render()
    }

    fn secret_input(&self) -> Option<String> {
        self.api_key.clone()
    }
}

/// The fixed install sequence: Jenkins, SonarQube, Buildpacks, then the
/// managed cluster.
pub fn default_steps(config: &AppConfig, api_key: Option<String>) -> Vec<Box<dyn InstallStep>> {
    vec![
        Box::new(JenkinsStep),
        Box::new(SonarQubeStep),
        Box::new(BuildpacksStep),
        Box::new(
            ManagedClusterStep::new(config.cluster.clone(), config.region.clone())
                .with_api_key(api_key),
        ),
    ]
}
