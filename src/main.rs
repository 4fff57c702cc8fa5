use anyhow::Result;
use auto_marking::utils::logging;
use auto_marking::{App, Config};
use tracing::warn;

#[tokio::main]
async fn main() -> Result<()> {
    // 加载配置
    let (config, rejected) = Config::from_env();

    // 初始化日志
    logging::init(config.verbose_logging);
    for entry in &rejected {
        warn!("环境变量 {} 的值 '{}' 无法解析，使用默认值", entry.name, entry.value);
    }

    // 初始化并运行应用
    let stats = App::initialize(config).await?.run().await?;

    if stats.failed_exams > 0 {
        anyhow::bail!("{} 份试卷评阅失败", stats.failed_exams);
    }

    Ok(())
}
