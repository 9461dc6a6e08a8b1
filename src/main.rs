//! 翻译覆盖层预览程序
//!
//! 读取 HTML 文件，按估算的排版执行一次立即的视口翻译，输出处理后的文档。

use std::fs;
use std::process;
use std::rc::Rc;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use reader_overlay::dom::{html_to_dom, inner_html};
use reader_overlay::env::{logging::LogLevel, EnvVar};
use reader_overlay::overlay::{
    ConfigManager, DisplayMode, EchoService, OverlayConfig, OverlayEngine, OverlayResult,
    StaticLayout, TranslationService,
};

#[derive(Parser, Debug)]
#[command(name = "reader-overlay", version, about = "Preview the viewport-aware translation overlay")]
struct Cli {
    /// 输入 HTML 文件
    input: String,

    /// 显示模式: off, translation-only, original-only, bilingual
    #[arg(short, long, default_value = "bilingual")]
    mode: String,

    /// 视口高度
    #[arg(long, default_value_t = 800.0)]
    viewport_height: f32,

    /// 滚动偏移
    #[arg(long, default_value_t = 0.0)]
    scroll: f32,

    /// 估算排版使用的行高
    #[arg(long, default_value_t = 24.0)]
    line_height: f32,

    /// 估算排版使用的每行字符数
    #[arg(long, default_value_t = 80)]
    chars_per_line: usize,

    /// DeepLX 兼容接口地址
    #[arg(long, conflicts_with = "echo")]
    deeplx: Option<String>,

    /// 使用离线的大写回显服务
    #[arg(long)]
    echo: bool,

    /// 文档字符集
    #[arg(long, default_value = "utf-8")]
    encoding: String,

    /// 配置文件路径
    #[arg(short, long)]
    config: Option<String>,
}

fn init_logging() {
    let level = LogLevel::get().unwrap_or_else(|_| "info".to_string());
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(cli: &Cli) -> OverlayResult<OverlayConfig> {
    let manager = match &cli.config {
        Some(path) => ConfigManager::from_path(path)?,
        None => ConfigManager::new()?,
    };
    let mut config = manager.into_config();
    if let Some(url) = &cli.deeplx {
        config.api_url = url.clone();
    }
    config.validate()?;
    Ok(config)
}

fn build_service(cli: &Cli, config: &OverlayConfig) -> OverlayResult<Arc<dyn TranslationService>> {
    if cli.echo {
        return Ok(Arc::new(EchoService));
    }

    #[cfg(feature = "deeplx")]
    {
        Ok(Arc::new(reader_overlay::overlay::DeepLxService::new(config)?))
    }

    #[cfg(not(feature = "deeplx"))]
    {
        let _ = config;
        tracing::warn!("未启用 deeplx 功能，使用回显服务");
        Ok(Arc::new(EchoService))
    }
}

async fn run(cli: Cli) -> OverlayResult<String> {
    let mode: DisplayMode = cli.mode.parse()?;
    let config = load_config(&cli)?;
    let service = build_service(&cli, &config)?;

    let bytes = fs::read(&cli.input)?;
    let dom = html_to_dom(&bytes, &cli.encoding)?;

    let layout = Rc::new(StaticLayout::new(cli.viewport_height));
    let mut engine = OverlayEngine::new(config, service, layout.clone())?;

    engine.observe_document(Some(&dom.document));
    layout.flow(engine.registry(), cli.line_height, cli.chars_per_line);
    layout.scroll_to(cli.scroll);

    engine.set_display_mode(mode);
    engine.request_for_viewport(true);
    engine.run_until_idle().await;

    let stats = engine.stats();
    tracing::info!(
        "完成: 单元 {} 个, 请求 {} 个 (当前 {} / 预读 {}), 成功 {} 个, 失败 {} 个",
        stats.units_observed,
        stats.requests(),
        stats.requests_current,
        stats.requests_lookahead,
        stats.completions,
        stats.failures
    );

    Ok(inner_html(&dom.document))
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();
    init_logging();

    match run(cli).await {
        Ok(html) => println!("{}", html),
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    }
}
