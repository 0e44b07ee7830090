//! bot-media-cache：聊天机器人 `vd` 命令的本地媒体缓存。
//!
//! 代码结构（读代码入口）：
//! - `base_system`：配置/日志/临时文件清理等基础设施
//! - `media_cache`：内容寻址下载缓存（一次性下载、持久化索引、轮转预取、随机挑选）
//! - `sources`：各分组的 URL 来源列表
//! - `command`：`vd` 聊天命令与消息发送边界

use anyhow::{Result, anyhow};
use clap::{Parser, Subcommand};
use std::path::Path;

mod base_system;
mod command;
mod media_cache;
mod sources;

use base_system::config::load_config;
use base_system::context::Config;
use base_system::logging::{LogOptions, LogSystem};
use command::{ConsoleSender, ThreadTarget, VdModule};
use media_cache::{Group, MediaCache, PrefetchRunner, ReqwestClient, RoundRobin};
use sources::SourceLists;
use tracing::{error, info};

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Parser)]
#[command(name = "bot-media-cache")]
#[command(about = "Media prefetch cache for the `vd` chat command")]
struct Cli {
    /// 启用调试日志输出
    #[arg(long, global = true, default_value_t = false)]
    debug: bool,

    /// 显示版本信息后退出
    #[arg(long, default_value_t = false)]
    version: bool,

    /// 数据目录路径（用于存放 config.yml、logs 与缓存目录）
    #[arg(long, global = true)]
    data_dir: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// 按来源列表轮转预取全部分组（默认）
    Prefetch {
        /// 不显示进度条
        #[arg(long, default_value_t = false)]
        no_progress: bool,
    },
    /// 下载单个 URL 到指定分组
    Fetch { group: Group, url: String },
    /// 随机挑选一个已缓存文件
    Pick { group: Group },
    /// 显示各分组缓存状态
    Status,
    /// 在控制台执行 `vd` 聊天命令
    Vd { args: Vec<String> },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.version {
        println!("bot-media-cache v{}", VERSION);
        return Ok(());
    }

    let data_dir = cli.data_dir.as_deref().map(Path::new);
    let _log = init_logging(cli.debug, data_dir)?;
    let config = load_config(data_dir).map_err(|e| anyhow!(e.to_string()))?;
    info!(target: "startup", "当前版本: v{}", VERSION);

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    let command = cli.command.unwrap_or(Command::Prefetch { no_progress: false });
    rt.block_on(run(command, config))
}

async fn run(command: Command, config: Config) -> Result<()> {
    let client = ReqwestClient::from_config(&config)?;
    let open = |client: ReqwestClient| MediaCache::open(config.cache_settings(), client);

    match command {
        Command::Vd { args } => run_vd(&args, &config, client).await?,
        Command::Prefetch { no_progress } => {
            let cache = open(client)?;
            let queue = match SourceLists::load(&config) {
                Ok(lists) => lists.into_queue(),
                Err(err) => {
                    error!("加载来源列表失败: {err}");
                    RoundRobin::new(Group::ALL.map(|g| (g, Vec::<String>::new())))
                }
            };
            let report = PrefetchRunner::new(cache, config.prefetch_workers())
                .with_progress(!no_progress)
                .run(queue)
                .await;
            println!("预取完成：成功 {}，失败 {}", report.succeeded, report.failed);
        }
        Command::Fetch { group, url } => {
            let cache = open(client)?;
            let path = cache.fetch(&url, group).await?;
            println!("{}", path.display());
        }
        Command::Pick { group } => match open(client)?.pick_for_group(group) {
            Some(path) => println!("{}", path.display()),
            None => println!("{group}: 暂无已缓存文件"),
        },
        Command::Status => {
            let cache = open(client)?;
            println!("缓存目录: {}", cache.settings().root.display());
            for group in Group::ALL {
                let c = cache.counts(group);
                println!(
                    "{group:<6} done {:>4} ({:.1} MB)  pending {:>4}  error {:>4}",
                    c.done,
                    c.done_bytes as f64 / (1024.0 * 1024.0),
                    c.pending,
                    c.error
                );
            }
        }
    }
    Ok(())
}

/// 与宿主加载插件时相同：打开缓存并在后台预取，先响应命令，再等待预取结束。
async fn run_vd(args: &[String], config: &Config, client: ReqwestClient) -> Result<()> {
    let mut module = VdModule::on_load(config, client)?;
    let outcome = module
        .run(args, &ThreadTarget::new("console"), &ConsoleSender)
        .await;
    info!(?outcome, "vd finished");

    if let Some(prefetch) = module.take_prefetch() {
        let report = prefetch.await?;
        println!("预取完成：成功 {}，失败 {}", report.succeeded, report.failed);
    }
    Ok(())
}

fn init_logging(debug: bool, base_dir: Option<&Path>) -> Result<LogSystem> {
    let opts = LogOptions {
        debug,
        ..LogOptions::default()
    };
    LogSystem::init_with_base(opts, base_dir).map_err(|e| anyhow!(e))
}
