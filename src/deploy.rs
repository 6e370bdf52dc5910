//! Image build and publish: docker build, ECR login, repository create,
//! tag and push. Steps run in order and the first failure stops the run.

use crate::utils::error::{Result, TradeError};
use async_trait::async_trait;
use std::fmt;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

pub const REPOSITORY_EXISTS: &str = "RepositoryAlreadyExistsException";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployConfig {
    pub account_id: String,
    pub region: String,
    pub repository: String,
    pub image: String,
    pub tag: String,
    pub dockerfile: String,
    pub context: String,
    pub platform: Option<String>,
}

impl DeployConfig {
    pub fn registry(&self) -> String {
        format!("{}.dkr.ecr.{}.amazonaws.com", self.account_id, self.region)
    }

    pub fn local_image(&self) -> String {
        format!("{}:{}", self.image, self.tag)
    }

    pub fn remote_image(&self) -> String {
        format!("{}/{}:{}", self.registry(), self.repository, self.tag)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
}

impl CommandSpec {
    fn new(program: &str, args: &[&str]) -> Self {
        Self {
            program: program.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
        }
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.program, self.args.join(" "))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeployStep {
    Run {
        name: &'static str,
        command: CommandSpec,
        /// stderr marker that still counts as success
        tolerate: Option<&'static str>,
    },
    /// stdout of `source` becomes stdin of `sink`
    Pipe {
        name: &'static str,
        source: CommandSpec,
        sink: CommandSpec,
    },
}

impl DeployStep {
    pub fn name(&self) -> &'static str {
        match self {
            DeployStep::Run { name, .. } | DeployStep::Pipe { name, .. } => *name,
        }
    }
}

pub fn plan(config: &DeployConfig) -> Vec<DeployStep> {
    let local = config.local_image();
    let remote = config.remote_image();
    let registry = config.registry();

    let mut build = vec!["build"];
    if let Some(platform) = config.platform.as_deref() {
        build.extend(["--platform", platform]);
    }
    build.extend([
        "-t",
        local.as_str(),
        "-f",
        config.dockerfile.as_str(),
        config.context.as_str(),
    ]);

    vec![
        DeployStep::Run {
            name: "build",
            command: CommandSpec::new("docker", &build),
            tolerate: None,
        },
        DeployStep::Pipe {
            name: "login",
            source: CommandSpec::new(
                "aws",
                &["ecr", "get-login-password", "--region", config.region.as_str()],
            ),
            sink: CommandSpec::new(
                "docker",
                &["login", "--username", "AWS", "--password-stdin", registry.as_str()],
            ),
        },
        DeployStep::Run {
            name: "create-repository",
            command: CommandSpec::new(
                "aws",
                &[
                    "ecr",
                    "create-repository",
                    "--repository-name",
                    config.repository.as_str(),
                    "--region",
                    config.region.as_str(),
                ],
            ),
            tolerate: Some(REPOSITORY_EXISTS),
        },
        DeployStep::Run {
            name: "tag",
            command: CommandSpec::new("docker", &["tag", local.as_str(), remote.as_str()]),
            tolerate: None,
        },
        DeployStep::Run {
            name: "push",
            command: CommandSpec::new("docker", &["push", remote.as_str()]),
            tolerate: None,
        },
    ]
}

#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    pub success: bool,
    pub stdout: Vec<u8>,
    pub stderr: String,
}

#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, command: &CommandSpec, stdin: Option<&[u8]>) -> Result<CommandOutput>;
}

#[derive(Debug, Clone, Default)]
pub struct ProcessRunner;

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(&self, command: &CommandSpec, stdin: Option<&[u8]>) -> Result<CommandOutput> {
        let mut child = Command::new(&command.program)
            .args(&command.args)
            .stdin(if stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| TradeError::CommandError {
                command: command.to_string(),
                message: e.to_string(),
            })?;

        if let (Some(input), Some(mut pipe)) = (stdin, child.stdin.take()) {
            pipe.write_all(input).await?;
            // drop closes stdin so the child sees EOF
            drop(pipe);
        }

        let output = child.wait_with_output().await?;
        Ok(CommandOutput {
            success: output.status.success(),
            stdout: output.stdout,
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

fn failed(command: &CommandSpec, output: &CommandOutput) -> TradeError {
    TradeError::CommandError {
        command: command.to_string(),
        message: output.stderr.trim().to_string(),
    }
}

pub async fn run_step<R: CommandRunner + ?Sized>(runner: &R, step: &DeployStep) -> Result<()> {
    match step {
        DeployStep::Run {
            command, tolerate, ..
        } => {
            let output = runner.run(command, None).await?;
            if output.success {
                return Ok(());
            }
            match tolerate {
                Some(marker) if output.stderr.contains(marker) => {
                    tracing::info!("{} already done ({}), continuing", step.name(), marker);
                    Ok(())
                }
                _ => Err(failed(command, &output)),
            }
        }
        DeployStep::Pipe { source, sink, .. } => {
            let produced = runner.run(source, None).await?;
            if !produced.success {
                return Err(failed(source, &produced));
            }
            let consumed = runner.run(sink, Some(&produced.stdout)).await?;
            if !consumed.success {
                return Err(failed(sink, &consumed));
            }
            Ok(())
        }
    }
}

pub async fn deploy<R: CommandRunner + ?Sized>(runner: &R, config: &DeployConfig) -> Result<String> {
    for step in plan(config) {
        tracing::info!("🚀 {}", step.name());
        run_step(runner, &step).await?;
    }

    let remote = config.remote_image();
    tracing::info!("✅ Pushed {}", remote);
    Ok(remote)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn config() -> DeployConfig {
        DeployConfig {
            account_id: "123456789012".into(),
            region: "ap-northeast-2".into(),
            repository: "rebalancer".into(),
            image: "rebalancer-local".into(),
            tag: "v1".into(),
            dockerfile: "Dockerfile".into(),
            context: ".".into(),
            platform: Some("linux/amd64".into()),
        }
    }

    struct ScriptedRunner {
        seen: Mutex<Vec<(String, Option<Vec<u8>>)>>,
        fail_on: Option<(&'static str, &'static str)>,
    }

    impl ScriptedRunner {
        fn new(fail_on: Option<(&'static str, &'static str)>) -> Self {
            Self {
                seen: Mutex::new(Vec::new()),
                fail_on,
            }
        }
    }

    #[async_trait]
    impl CommandRunner for ScriptedRunner {
        async fn run(&self, command: &CommandSpec, stdin: Option<&[u8]>) -> Result<CommandOutput> {
            let line = command.to_string();
            self.seen
                .lock()
                .unwrap()
                .push((line.clone(), stdin.map(|s| s.to_vec())));

            if let Some((needle, stderr)) = self.fail_on {
                if line.contains(needle) {
                    return Ok(CommandOutput {
                        success: false,
                        stdout: Vec::new(),
                        stderr: stderr.to_string(),
                    });
                }
            }

            Ok(CommandOutput {
                success: true,
                stdout: if line.contains("get-login-password") {
                    b"ecr-password".to_vec()
                } else {
                    Vec::new()
                },
                stderr: String::new(),
            })
        }
    }

    #[test]
    fn test_plan_order_and_targets() {
        let steps = plan(&config());
        let names: Vec<&str> = steps.iter().map(|s| s.name()).collect();
        assert_eq!(names, vec!["build", "login", "create-repository", "tag", "push"]);

        match &steps[0] {
            DeployStep::Run { command, .. } => assert_eq!(
                command.to_string(),
                "docker build --platform linux/amd64 -t rebalancer-local:v1 -f Dockerfile ."
            ),
            other => panic!("unexpected step {:?}", other),
        }
        match &steps[4] {
            DeployStep::Run { command, .. } => assert_eq!(
                command.args,
                vec!["push", "123456789012.dkr.ecr.ap-northeast-2.amazonaws.com/rebalancer:v1"]
            ),
            other => panic!("unexpected step {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_login_pipes_password_and_existing_repo_is_ok() {
        let runner = ScriptedRunner::new(Some((
            "create-repository",
            "An error occurred (RepositoryAlreadyExistsException)",
        )));

        let pushed = deploy(&runner, &config()).await.unwrap();
        assert!(pushed.ends_with("/rebalancer:v1"));

        let seen = runner.seen.lock().unwrap();
        assert_eq!(seen.len(), 6);
        let login = seen.iter().find(|(l, _)| l.starts_with("docker login")).unwrap();
        assert_eq!(login.1.as_deref(), Some(&b"ecr-password"[..]));
    }

    #[tokio::test]
    async fn test_failure_stops_the_sequence() {
        let runner = ScriptedRunner::new(Some(("docker tag", "no such image")));

        let err = deploy(&runner, &config()).await.unwrap_err();
        assert!(matches!(err, TradeError::CommandError { ref message, .. } if message == "no such image"));

        let seen = runner.seen.lock().unwrap();
        assert!(!seen.iter().any(|(l, _)| l.starts_with("docker push")));
    }
}
