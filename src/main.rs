use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dataflow::app::Application;
use dataflow::shutdown::{wait_for_shutdown_signal, ShutdownManager};
use dataflow_config::{AppConfig, LogLevel, OutputFormat};
use dataflow_dispatcher::RunOutcome;
use dataflow_domain::RunRequest;
use dataflow_infrastructure::init_logging;
use serde_json::json;
use tracing::{error, info, warn};

/// 数据集成作业提交与生命周期编排
#[derive(Parser, Debug)]
#[command(name = "dataflow")]
#[command(version = "1.0.0")]
#[command(about = "数据集成作业提交与生命周期编排")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// 配置文件路径，未指定时依次查找默认位置
    #[arg(short, long)]
    config: Option<String>,

    /// 日志级别，覆盖配置文件
    #[arg(short, long)]
    log_level: Option<LogLevel>,

    /// 日志格式 (json/pretty)，覆盖配置文件
    #[arg(long)]
    log_format: Option<OutputFormat>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// 绑定集群和资源后运行作业：定时批作业注册调度，其余立即提交
    Run {
        /// 作业ID
        #[arg(long)]
        job: i64,
        /// 集群ID
        #[arg(long)]
        cluster: i64,
        /// 资源ID，逗号分隔
        #[arg(long = "resources", value_delimiter = ',')]
        resources: Vec<i64>,
    },
    /// 撤销调度并停止作业的所有运行实例
    Stop {
        #[arg(long)]
        job: i64,
    },
    /// 只撤销作业的定时调度
    Unschedule {
        #[arg(long)]
        job: i64,
    },
    /// 刷新并显示作业运行实例的状态
    Status {
        #[arg(long)]
        job: i64,
    },
    /// 常驻运行，按调度触发作业
    Serve,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = AppConfig::load(cli.config.as_deref()).with_context(|| match &cli.config {
        Some(path) => format!("加载配置文件失败: {path}"),
        None => "加载配置失败".to_string(),
    })?;
    if let Some(level) = cli.log_level {
        config.observability.log_level = level;
    }
    if let Some(format) = cli.log_format {
        config.observability.log_format = format;
    }

    init_logging(
        config.observability.log_level,
        config.observability.log_format,
    )
    .context("初始化日志系统失败")?;

    let app = Application::new(config).await?;

    match cli.command {
        Commands::Run {
            job,
            cluster,
            resources,
        } => {
            let request = RunRequest {
                job_id: job,
                cluster_id: cluster,
                resource_ids: resources,
            };
            let output = match app.run_job(&request).await? {
                RunOutcome::Scheduled { key, preflight } => json!({
                    "outcome": "scheduled",
                    "schedule_key": key.to_string(),
                    "launch": preflight,
                }),
                RunOutcome::Submitted(instance) => json!({
                    "outcome": "submitted",
                    "instance": instance,
                }),
            };
            print_json(&output)?;
        }
        Commands::Stop { job } => {
            let report = app.stop_job(job).await?;
            print_json(&json!({ "job_id": job, "stopped": report.stopped }))?;
        }
        Commands::Unschedule { job } => {
            let removed = app.unschedule_job(job).await?;
            print_json(&json!({ "job_id": job, "removed": removed }))?;
        }
        Commands::Status { job } => {
            let instances = app.job_status(job).await?;
            print_json(&json!({ "job_id": job, "instances": instances }))?;
        }
        Commands::Serve => serve(app).await?,
    }

    Ok(())
}

async fn serve(app: Application) -> Result<()> {
    info!("启动调度服务");
    let shutdown_manager = ShutdownManager::new();
    let shutdown_rx = shutdown_manager.subscribe().await;

    let app_handle = tokio::spawn(async move {
        if let Err(e) = app.serve(shutdown_rx).await {
            error!("调度服务运行失败: {e}");
        }
    });

    wait_for_shutdown_signal().await;
    info!("收到关闭信号，开始优雅关闭...");
    shutdown_manager.shutdown().await;

    match tokio::time::timeout(Duration::from_secs(30), app_handle).await {
        Ok(Ok(())) => info!("调度服务已优雅关闭"),
        Ok(Err(e)) => error!("调度服务关闭时发生错误: {e}"),
        Err(_) => warn!("调度服务关闭超时，强制退出"),
    }
    Ok(())
}

fn print_json(value: &serde_json::Value) -> Result<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(value).context("序列化输出失败")?
    );
    Ok(())
}
