//! 客户端侧提交
//!
//! 作业图在编排器本机由 Flink 客户端（`flink run`）构建，入口类在本机执行，
//! 所以 `--config` 指向的作业描述和 `pipeline.jars` 里的暂存文件都是有效的本地路径。
//! 客户端把这些 jar 连同作业图一起上传到会话集群，集群不需要访问编排器的磁盘。

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use dataflow_domain::{JarSubmission, LaunchConfiguration};
use dataflow_errors::{OrchestratorError, OrchestratorResult};
use tokio::process::Command;
use tracing::{debug, info, warn};

/// `flink run` 在 detached 模式下输出 `Job has been submitted with JobID <id>`
pub fn parse_job_id(output: &str) -> Option<String> {
    output.lines().rev().find_map(|line| {
        let (_, rest) = line.split_once("JobID")?;
        let id = rest.split_whitespace().next()?;
        (id.len() == 32 && id.chars().all(|c| c.is_ascii_hexdigit())).then(|| id.to_string())
    })
}

pub fn local_jar_path(jar_uri: &str) -> OrchestratorResult<PathBuf> {
    let url = url::Url::parse(jar_uri)
        .map_err(|e| OrchestratorError::validation(format!("无效的制品地址 {jar_uri}: {e}")))?;
    url.to_file_path()
        .map_err(|_| OrchestratorError::validation(format!("制品地址不是本地文件: {jar_uri}")))
}

pub struct FlinkCliLauncher {
    program: PathBuf,
    timeout: Duration,
}

impl FlinkCliLauncher {
    pub fn new(program: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }

    /// 启动配置逐项以 `-D` 传入，运行时 jar 之后是程序参数
    pub fn command_args(
        launch: &LaunchConfiguration,
        submission: &JarSubmission,
    ) -> OrchestratorResult<Vec<String>> {
        let jar_path = local_jar_path(&submission.jar_uri)?;

        let mut args = vec![
            "run".to_string(),
            "--target".to_string(),
            launch.deployment_target.clone(),
            "--detached".to_string(),
        ];
        for (key, value) in launch.to_flat_map() {
            args.push(format!("-D{key}={value}"));
        }
        args.push("--class".to_string());
        args.push(submission.entry_class.clone());
        args.push(jar_path.display().to_string());
        args.extend(submission.program_args.iter().cloned());
        Ok(args)
    }

    /// 提交前确认作业描述和 classpath 上的文件都在本机
    async fn check_local_inputs(
        launch: &LaunchConfiguration,
        submission: &JarSubmission,
    ) -> OrchestratorResult<()> {
        let mut paths = vec![submission.spec_file.clone()];
        for uri in &launch.classpath {
            paths.push(local_jar_path(uri)?);
        }
        for path in paths {
            if !tokio::fs::try_exists(&path).await? {
                return Err(OrchestratorError::submission(
                    &launch.run_name,
                    format!("提交所需的本地文件不存在: {}", path.display()),
                ));
            }
        }
        Ok(())
    }

    pub async fn submit(
        &self,
        launch: &LaunchConfiguration,
        submission: &JarSubmission,
    ) -> OrchestratorResult<String> {
        Self::check_local_inputs(launch, submission).await?;
        let args = Self::command_args(launch, submission)?;
        debug!("启动引擎客户端: {} {:?}", self.program.display(), args);

        let child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                OrchestratorError::submission(
                    &launch.run_name,
                    format!("启动引擎客户端 {} 失败: {e}", self.program.display()),
                )
            })?;

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| {
                OrchestratorError::submission(
                    &launch.run_name,
                    format!("引擎客户端在 {:?} 内未完成提交", self.timeout),
                )
            })?
            .map_err(|e| {
                OrchestratorError::submission(&launch.run_name, format!("等待引擎客户端失败: {e}"))
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !output.status.success() {
            warn!("引擎客户端退出码 {:?}: {}", output.status.code(), stderr.trim());
            return Err(OrchestratorError::submission(
                &launch.run_name,
                format!("引擎客户端退出码 {:?}: {}", output.status.code(), stderr.trim()),
            ));
        }

        let run_id = parse_job_id(&stdout).ok_or_else(|| {
            OrchestratorError::submission(
                &launch.run_name,
                format!("无法从客户端输出解析运行实例 id: {}", stdout.trim()),
            )
        })?;
        info!("作业 {} 已由客户端提交，运行实例 {}", launch.run_name, run_id);
        Ok(run_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dataflow_domain::{JobAttrKind, JobAttribute, REMOTE_TARGET};
    use std::collections::BTreeMap;
    use std::path::Path;

    fn file_uri(path: &Path) -> String {
        url::Url::from_file_path(path).unwrap().to_string()
    }

    fn launch(classpath: Vec<String>) -> LaunchConfiguration {
        LaunchConfiguration {
            run_name: "j2".to_string(),
            address: "10.0.0.5".to_string(),
            port: 6123,
            rest_port: 8081,
            classpath,
            deployment_target: REMOTE_TARGET.to_string(),
            engine_options: BTreeMap::new(),
        }
    }

    #[test]
    fn test_parse_job_id() {
        let output = "Job has been submitted with JobID 6c3b3e5d9d0ab5cfeb1e3b1e4f3d0c3a\n";
        assert_eq!(
            parse_job_id(output).as_deref(),
            Some("6c3b3e5d9d0ab5cfeb1e3b1e4f3d0c3a")
        );
        assert_eq!(parse_job_id("JobID not-a-job-id"), None);
        assert_eq!(parse_job_id(""), None);
    }

    #[test]
    fn test_local_jar_path_requires_file_uri() {
        assert_eq!(
            local_jar_path("file:///opt/seatunnel/lib/core.jar").unwrap(),
            PathBuf::from("/opt/seatunnel/lib/core.jar")
        );
        assert!(local_jar_path("http://repo/core.jar").is_err());
        assert!(local_jar_path("not a uri").is_err());
    }

    #[test]
    fn test_command_args() {
        let launch = launch(vec![
            "file:///opt/seatunnel/lib/seatunnel-core-flink.jar".to_string(),
            "file:///tmp/stage/1/lib.jar".to_string(),
        ]);
        let submission = JarSubmission::new(
            "file:///opt/seatunnel/lib/seatunnel-core-flink.jar",
            "org.apache.seatunnel.core.flink.SeatunnelFlink",
            Path::new("/tmp/stage/1/j2.json"),
            &[JobAttribute::new(JobAttrKind::JobAttr, "dt", "2024-01-01")],
        );

        let args = FlinkCliLauncher::command_args(&launch, &submission).unwrap();
        assert_eq!(&args[..4], &["run", "--target", "remote", "--detached"]);
        assert!(args.contains(&"-Drest.port=8081".to_string()));
        assert!(args.contains(&"-Djobmanager.rpc.address=10.0.0.5".to_string()));
        assert!(args.contains(
            &"-Dpipeline.jars=file:///opt/seatunnel/lib/seatunnel-core-flink.jar;file:///tmp/stage/1/lib.jar"
                .to_string()
        ));
        let class_at = args.iter().position(|a| a == "--class").unwrap();
        assert_eq!(
            &args[class_at..],
            &[
                "--class",
                "org.apache.seatunnel.core.flink.SeatunnelFlink",
                "/opt/seatunnel/lib/seatunnel-core-flink.jar",
                "--config",
                "/tmp/stage/1/j2.json",
                "--variable",
                "dt=2024-01-01",
            ]
        );
    }

    #[tokio::test]
    async fn test_missing_local_input_fails_before_launch() {
        let dir = tempfile::tempdir().unwrap();
        let spec = dir.path().join("j2.json");
        std::fs::write(&spec, "{}").unwrap();
        let runtime = dir.path().join("core.jar");
        std::fs::write(&runtime, b"core").unwrap();

        let launcher = FlinkCliLauncher::new("/definitely/not/flink", Duration::from_secs(5));
        let launch = launch(vec![
            file_uri(&runtime),
            file_uri(&dir.path().join("gone.jar")),
        ]);
        let submission = JarSubmission::new(file_uri(&runtime), "Main", &spec, &[]);

        match launcher.submit(&launch, &submission).await {
            Err(OrchestratorError::Submission { message, .. }) => {
                assert!(message.contains("gone.jar"))
            }
            other => panic!("expected submission error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unstartable_launcher_is_submission_error() {
        let dir = tempfile::tempdir().unwrap();
        let spec = dir.path().join("j2.json");
        std::fs::write(&spec, "{}").unwrap();
        let runtime = dir.path().join("core.jar");
        std::fs::write(&runtime, b"core").unwrap();

        let launcher = FlinkCliLauncher::new("/definitely/not/flink", Duration::from_secs(5));
        let submission = JarSubmission::new(file_uri(&runtime), "Main", &spec, &[]);

        assert!(matches!(
            launcher
                .submit(&launch(vec![file_uri(&runtime)]), &submission)
                .await,
            Err(OrchestratorError::Submission { .. })
        ));
    }
}
