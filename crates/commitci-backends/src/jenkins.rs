//! Jenkins job-scheduling backend.
//!
//! The dispatcher job polls every branch of the component repository and runs
//! `commitci consider-build`; each worker job is parameterised with the commit
//! metadata and runs `commitci build`. Both fetch the support code from the
//! configured platform source before running.

use askama::Template;
use async_trait::async_trait;
use commitci_config::{SchedulerEndpoint, SystemConfig};
use commitci_core::{CommitDescriptor, Error, JobScheduler, PlatformSource, Result};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use tracing::{debug, info};
use url::Url;

/// Parameters every worker job accepts.
pub const WORKER_PARAMETERS: [&str; 4] =
    ["COMMIT_HASH", "COMMIT_BRANCH", "COMMIT_DESCRIPTION", "STAGING"];

const SCM_POLL_SPEC: &str = "H/5 * * * *";

#[derive(Template)]
#[template(path = "jenkins/dispatcher.xml")]
struct DispatcherJobXml<'a> {
    component: &'a str,
    slave: &'a str,
    repository: &'a str,
    poll_spec: &'a str,
    command: &'a str,
}

#[derive(Template)]
#[template(path = "jenkins/worker.xml")]
struct WorkerJobXml<'a> {
    component: &'a str,
    branch: &'a str,
    branch_spec: &'a str,
    slave: &'a str,
    repository: &'a str,
    parameters: &'a [&'a str],
    command: &'a str,
}

/// Jenkins scheduler talking to the remote JSON/XML API.
pub struct JenkinsScheduler {
    client: Client,
    endpoint: SchedulerEndpoint,
    credentials: Option<(String, String)>,
    config: SystemConfig,
}

impl JenkinsScheduler {
    /// Create a scheduler for `endpoint`. Credentials come from the
    /// `scheduler` section of the configuration; the token is read from the
    /// environment variable it names.
    pub fn new(endpoint: SchedulerEndpoint, config: SystemConfig) -> Result<Self> {
        let credentials = match (&config.scheduler.user, &config.scheduler.token_env) {
            (Some(user), Some(token_env)) => {
                let token = std::env::var(token_env).map_err(|_| {
                    Error::Configuration(format!(
                        "scheduler token variable {} is not set",
                        token_env
                    ))
                })?;
                Some((user.clone(), token))
            }
            (Some(_), None) => {
                return Err(Error::Configuration(
                    "scheduler user configured without token-env".to_string(),
                ));
            }
            _ => None,
        };

        let client = Client::builder()
            .user_agent(concat!("commitci/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Internal(e.to_string()))?;

        Ok(Self {
            client,
            endpoint,
            credentials,
            config,
        })
    }

    fn url(&self, path: &str) -> Result<Url> {
        self.endpoint
            .url()
            .join(path)
            .map_err(|e| Error::Configuration(format!("invalid scheduler path {}: {}", path, e)))
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let builder = self.client.request(method, url);
        match &self.credentials {
            Some((user, token)) => builder.basic_auth(user, Some(token)),
            None => builder,
        }
    }

    async fn send(&self, builder: RequestBuilder, action: &str) -> Result<Response> {
        builder
            .send()
            .await
            .map_err(|e| Error::Scheduling(format!("{}: cannot reach scheduler: {}", action, e)))
    }

    async fn rejected(response: Response, action: &str) -> Error {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        Error::Scheduling(format!("{} rejected ({}): {}", action, status, body.trim()))
    }

    async fn job_exists(&self, name: &str) -> Result<bool> {
        let url = self.url(&format!("job/{}/api/json", name))?;
        let response = self
            .send(self.request(Method::GET, url), "job lookup")
            .await?;
        match response.status() {
            status if status.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            _ => Err(Self::rejected(response, "job lookup").await),
        }
    }

    /// Returns whether the job was created; a 400 means it already exists.
    async fn create_job(&self, name: &str, xml: String) -> Result<bool> {
        let mut url = self.url("createItem")?;
        url.query_pairs_mut().append_pair("name", name);
        let response = self
            .send(
                self.request(Method::POST, url)
                    .header(reqwest::header::CONTENT_TYPE, "application/xml")
                    .body(xml),
                "job creation",
            )
            .await?;
        match response.status() {
            status if status.is_success() => Ok(true),
            StatusCode::BAD_REQUEST => Ok(false),
            _ => Err(Self::rejected(response, "job creation").await),
        }
    }

    async fn update_job(&self, name: &str, xml: String) -> Result<()> {
        let url = self.url(&format!("job/{}/config.xml", name))?;
        let response = self
            .send(
                self.request(Method::POST, url)
                    .header(reqwest::header::CONTENT_TYPE, "application/xml")
                    .body(xml),
                "job update",
            )
            .await?;
        if !response.status().is_success() {
            return Err(Self::rejected(response, "job update").await);
        }
        Ok(())
    }

    fn platform_clone_script(&self, platform: &PlatformSource) -> String {
        format!(
            "set -eu\nrm -rf platform\ngit clone --depth 1 --branch {} {} platform\n",
            shell_quote(&platform.branch),
            shell_quote(&self.config.platform_repository_url(&platform.account)),
        )
    }

    fn dispatcher_xml(
        &self,
        component: &str,
        slave: &str,
        platform: &PlatformSource,
    ) -> Result<String> {
        let command = format!(
            "{}branch=\"${{GIT_BRANCH#origin/}}\"\n\
             commitci --config platform/commitci.kdl --checkout-root \"$WORKSPACE\" \
             consider-build {} --branch \"$branch\" --hash \"$GIT_COMMIT\" \
             --slave {} --platform-account {} --platform-branch {} --config-file {}\n",
            self.platform_clone_script(platform),
            shell_quote(component),
            shell_quote(slave),
            shell_quote(&platform.account),
            shell_quote(&platform.branch),
            shell_quote(&self.config.staging_config),
        );
        let repository = self.config.repository_url(component);
        DispatcherJobXml {
            component,
            slave,
            repository: &repository,
            poll_spec: SCM_POLL_SPEC,
            command: &command,
        }
        .render()
        .map_err(|e| Error::Internal(format!("dispatcher job template: {}", e)))
    }

    fn worker_xml(
        &self,
        component: &str,
        branch: &str,
        slave: &str,
        platform: &PlatformSource,
    ) -> Result<String> {
        let command = format!(
            "{}staging_flag=\"\"\n\
             if [ \"${{STAGING:-false}}\" = \"true\" ]; then staging_flag=\"--staging\"; fi\n\
             commitci --config platform/commitci.kdl --checkout-root \"$WORKSPACE\" \
             build {} --branch \"$COMMIT_BRANCH\" --hash \"$COMMIT_HASH\" \
             --description \"$COMMIT_DESCRIPTION\" \
             --report \"$WORKSPACE/commitci-report.txt\" $staging_flag\n",
            self.platform_clone_script(platform),
            shell_quote(component),
        );
        let repository = self.config.repository_url(component);
        let branch_spec = format!("*/{}", branch);
        WorkerJobXml {
            component,
            branch,
            branch_spec: &branch_spec,
            slave,
            repository: &repository,
            parameters: &WORKER_PARAMETERS,
            command: &command,
        }
        .render()
        .map_err(|e| Error::Internal(format!("worker job template: {}", e)))
    }
}

/// Single-quote a value for POSIX sh.
fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

#[async_trait]
impl JobScheduler for JenkinsScheduler {
    fn name(&self) -> &'static str {
        "jenkins"
    }

    async fn node_exists(&self, slave: &str) -> Result<bool> {
        let url = self.url(&format!("computer/{}/api/json", slave))?;
        let response = self
            .send(self.request(Method::GET, url), "node lookup")
            .await?;
        match response.status() {
            status if status.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            _ => Err(Self::rejected(response, "node lookup").await),
        }
    }

    async fn ensure_dispatcher_job(
        &self,
        component: &str,
        slave: &str,
        platform: &PlatformSource,
    ) -> Result<()> {
        let name = self.config.jobs.dispatcher_job(component);
        let xml = self.dispatcher_xml(component, slave, platform)?;

        if self.job_exists(&name).await? {
            info!(job = %name, "Updating dispatcher job");
            self.update_job(&name, xml).await
        } else {
            info!(job = %name, "Creating dispatcher job");
            if !self.create_job(&name, xml.clone()).await? {
                // Created concurrently by someone else; re-apply our config.
                self.update_job(&name, xml).await?;
            }
            Ok(())
        }
    }

    async fn remove_dispatcher_job(&self, component: &str) -> Result<()> {
        let name = self.config.jobs.dispatcher_job(component);
        let url = self.url(&format!("job/{}/doDelete", name))?;
        let response = self
            .send(self.request(Method::POST, url), "job removal")
            .await?;
        match response.status() {
            // Jenkins answers a successful delete with a redirect.
            status if status.is_success() || status.is_redirection() => {
                info!(job = %name, "Dispatcher job removed");
                Ok(())
            }
            StatusCode::NOT_FOUND => {
                debug!(job = %name, "Dispatcher job already absent");
                Ok(())
            }
            _ => Err(Self::rejected(response, "job removal").await),
        }
    }

    async fn ensure_worker_job(
        &self,
        component: &str,
        branch: &str,
        slave: &str,
        platform: &PlatformSource,
    ) -> Result<()> {
        let name = self.config.jobs.worker_job(component, branch);
        if self.job_exists(&name).await? {
            debug!(job = %name, "Worker job exists");
            return Ok(());
        }

        let xml = self.worker_xml(component, branch, slave, platform)?;
        if self.create_job(&name, xml).await? {
            info!(job = %name, "Worker job created");
            return Ok(());
        }

        // 400 from createItem: fine if a concurrent dispatch created it.
        if self.job_exists(&name).await? {
            debug!(job = %name, "Worker job created concurrently");
            Ok(())
        } else {
            Err(Error::Scheduling(format!(
                "job creation rejected for {}",
                name
            )))
        }
    }

    async fn trigger_worker_job(
        &self,
        component: &str,
        branch: &str,
        commit: &CommitDescriptor,
        staging: bool,
    ) -> Result<()> {
        let name = self.config.jobs.worker_job(component, branch);
        let mut url = self.url(&format!("job/{}/buildWithParameters", name))?;
        url.query_pairs_mut()
            .append_pair("COMMIT_HASH", commit.hash.as_deref().unwrap_or(""))
            .append_pair("COMMIT_BRANCH", &commit.branch)
            .append_pair(
                "COMMIT_DESCRIPTION",
                commit.description.as_deref().unwrap_or(""),
            )
            .append_pair("STAGING", if staging { "true" } else { "false" });

        let response = self
            .send(self.request(Method::POST, url), "job trigger")
            .await?;
        if !response.status().is_success() {
            return Err(Self::rejected(response, "job trigger").await);
        }

        info!(job = %name, staging, "Worker job triggered");
        Ok(())
    }
}
