//! Context7 Enrich 命令行程序

use clap::{Parser, Subcommand};
use context7_enrich::cache::DocCache;
use context7_enrich::config::AppConfig;
use context7_enrich::enrich::{self, Enricher};
use context7_enrich::utils::validation::parse_library_list;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "context7-enrich")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "使用 Context7 库文档增强生成的提示词", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// 配置文件路径
    #[arg(short, long, global = true, default_value = "context7.toml")]
    config: PathBuf,

    /// 启用调试日志
    #[arg(short, long, global = true)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// 为指定步骤生成增强后的提示词
    Enrich {
        /// 工作流步骤，例如 03-system-template
        #[arg(short, long)]
        step: String,

        /// 提示词模板文件
        #[arg(short, long)]
        template: PathBuf,

        /// 之前步骤的输出文件（用于检测库）
        #[arg(short, long, num_args = 1..)]
        previous: Vec<PathBuf>,

        /// 强制使用的库列表，逗号分隔
        #[arg(short, long)]
        libraries: Option<String>,

        /// 输出文件（默认输出到标准输出）
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// 显示检测到的库
    Detect {
        /// 工作流步骤
        #[arg(short, long)]
        step: String,

        /// 之前步骤的输出文件
        #[arg(short, long, num_args = 1..)]
        previous: Vec<PathBuf>,

        /// 强制使用的库列表，逗号分隔
        #[arg(short, long)]
        libraries: Option<String>,
    },

    /// 管理文档缓存
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },

    /// 生成配置文件
    Config {
        /// 输出文件路径
        #[arg(short, long, default_value = "context7.toml")]
        output: PathBuf,

        /// 覆盖已存在的文件
        #[arg(short, long)]
        force: bool,
    },

    /// 显示版本信息
    Version,
}

#[derive(Subcommand)]
enum CacheAction {
    /// 列出已缓存的文档
    Show,
    /// 清空缓存
    Clear,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Enrich {
            step,
            template,
            previous,
            libraries,
            output,
        } => {
            let config = load_config(&cli.config, cli.debug)?;
            enrich_command(&config, &step, &template, &previous, libraries.as_deref(), output.as_deref()).await?;
        }
        Commands::Detect {
            step,
            previous,
            libraries,
        } => {
            let config = load_config(&cli.config, cli.debug)?;
            detect_command(&config, &step, &previous, libraries.as_deref())?;
        }
        Commands::Cache { action } => {
            let config = load_config(&cli.config, cli.debug)?;
            cache_command(&config, &action).await?;
        }
        Commands::Config { output, force } => {
            config_command(&output, force)?;
        }
        Commands::Version => {
            version_command();
        }
    }

    Ok(())
}

/// 加载配置并初始化日志系统
fn load_config(config_path: &Path, debug: bool) -> Result<AppConfig, Box<dyn std::error::Error>> {
    let file_config = if config_path.exists() {
        Some(AppConfig::from_file(config_path).map_err(|e| format!("加载配置文件失败: {e}"))?)
    } else {
        None
    };

    let env_config = AppConfig::from_env().map_err(|e| format!("读取环境变量配置失败: {e}"))?;
    let mut config = AppConfig::merge(file_config, Some(env_config));

    config
        .validate()
        .map_err(|e| format!("配置验证失败: {e}"))?;

    // debug 模式覆盖配置文件中的日志级别
    if debug {
        config.logging.level = "debug".to_string();
    }
    context7_enrich::init_logging_with_config(&config.logging)
        .map_err(|e| format!("初始化日志系统失败: {e}"))?;

    if config_path.exists() {
        tracing::debug!("从文件加载配置: {}", config_path.display());
    } else {
        tracing::debug!("配置文件不存在，使用默认配置: {}", config_path.display());
    }

    Ok(config)
}

/// 读取并拼接之前步骤的输出
fn read_previous(files: &[PathBuf]) -> Result<String, Box<dyn std::error::Error>> {
    let mut contents = Vec::with_capacity(files.len());
    for file in files {
        let text = std::fs::read_to_string(file)
            .map_err(|e| format!("读取文件失败 {}: {e}", file.display()))?;
        contents.push(text);
    }
    Ok(contents.join("\n"))
}

fn forced_libraries(libraries: Option<&str>) -> Result<Vec<String>, Box<dyn std::error::Error>> {
    match libraries {
        Some(list) => Ok(parse_library_list(list)?),
        None => Ok(Vec::new()),
    }
}

/// 增强命令
async fn enrich_command(
    config: &AppConfig,
    step: &str,
    template: &Path,
    previous: &[PathBuf],
    libraries: Option<&str>,
    output: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let prompt = std::fs::read_to_string(template)
        .map_err(|e| format!("读取模板失败 {}: {e}", template.display()))?;
    let previous = read_previous(previous)?;
    let forced = forced_libraries(libraries)?;

    let outcome = enrich::enrich_with_config(config, &prompt, step, &previous, &forced).await;

    for placeholder in &outcome.placeholders {
        eprintln!("⚠️  {placeholder}");
    }
    if outcome.auth_failed {
        eprintln!(
            "⚠️  Context7 认证失败，请检查环境变量 {} 中的 API Key",
            config.context7.api_key_env
        );
    }
    let enriched = outcome.prompt;

    match output {
        Some(path) => {
            std::fs::write(path, enriched).map_err(|e| format!("写入输出文件失败 {}: {e}", path.display()))?;
            eprintln!("增强后的提示词已写入: {}", path.display());
        }
        None => println!("{enriched}"),
    }

    Ok(())
}

/// 检测命令
fn detect_command(
    config: &AppConfig,
    step: &str,
    previous: &[PathBuf],
    libraries: Option<&str>,
) -> Result<(), Box<dyn std::error::Error>> {
    let previous = read_previous(previous)?;
    let forced = forced_libraries(libraries)?;
    let detected = Enricher::candidate_libraries(step, &previous, &forced);

    println!("{}", enrich::context_report(step, &detected, &config.cache.dir));
    Ok(())
}

/// 缓存管理命令
async fn cache_command(config: &AppConfig, action: &CacheAction) -> Result<(), Box<dyn std::error::Error>> {
    let mut cache = DocCache::new(&config.cache)?;

    match action {
        CacheAction::Show => {
            let docs = cache.cached_documents()?;
            if docs.is_empty() {
                println!("缓存为空: {}", cache.dir().display());
            } else {
                println!("📁 缓存目录: {}", cache.dir().display());
                for doc in &docs {
                    #[allow(clippy::cast_precision_loss)]
                    let size_kb = doc.size_bytes as f64 / 1024.0;
                    println!("  • {}: {size_kb:.1} KB", doc.cache_key);
                }
                println!("共 {} 个文档", docs.len());
            }
        }
        CacheAction::Clear => {
            cache.clear().await.map_err(|e| format!("清空缓存失败: {e}"))?;
            println!("缓存已清空: {}", cache.dir().display());
        }
    }

    Ok(())
}

/// 生成配置文件命令
fn config_command(output: &Path, force: bool) -> Result<(), Box<dyn std::error::Error>> {
    if output.exists() && !force {
        return Err(format!("配置文件已存在: {}，使用 --force 覆盖", output.display()).into());
    }

    let config = AppConfig::default();
    config
        .save_to_file(output)
        .map_err(|e| format!("保存配置文件失败: {e}"))?;

    println!("配置文件已生成: {}", output.display());
    println!("请根据需要编辑配置文件。");

    Ok(())
}

/// 版本命令
fn version_command() {
    println!("{} v{}", context7_enrich::NAME, context7_enrich::VERSION);
}
