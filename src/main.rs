use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use storyreel::api::{ElevenLabsClient, ImgurUploader, LtxEngine, LumaEngine, QwenClient};
use storyreel::config::{DEFAULT_MAX_ENVIRONMENTS, DEFAULT_MAX_SCENES};
use storyreel::engine::{RenderEngine, StillImageService};
use storyreel::video::Ffmpeg;
use storyreel::{
    CancelFlag, Config, EngineKind, GenerationOptions, Pipeline, PipelineSettings, Result, Services,
};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "storyreel")]
#[command(about = "Turn a story script into a continuous AI-generated video", long_about = None)]
struct Args {
    /// Story script file path
    #[arg(short = 'f', long)]
    script_file: PathBuf,

    /// Video generation engine
    #[arg(short, long, value_enum, default_value_t = EngineKind::Luma)]
    engine: EngineKind,

    /// Only generate scene metadata, skip rendering
    #[arg(long)]
    metadata_only: bool,

    #[arg(long)]
    skip_narration: bool,

    #[arg(long)]
    skip_sound_effects: bool,

    #[arg(long, default_value_t = DEFAULT_MAX_SCENES)]
    max_scenes: usize,

    #[arg(long, default_value_t = DEFAULT_MAX_ENVIRONMENTS)]
    max_environments: usize,

    /// Extra instructions for how environments should look
    #[arg(long)]
    env_prompt: Option<String>,

    /// Explicit list of environments to use (repeatable)
    #[arg(long = "environment")]
    environments: Vec<String>,

    /// Local image used as the first frame of the first scene
    #[arg(long, conflicts_with = "initial_image_prompt")]
    initial_image_path: Option<PathBuf>,

    /// Prompt for generating the first frame of the first scene
    #[arg(long)]
    initial_image_prompt: Option<String>,

    /// Root directory for generated runs
    #[arg(short, long)]
    output_root: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志，RUST_LOG 可覆盖默认级别
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .with_thread_ids(false)
        .with_level(true)
        .init();

    // 加载环境变量
    dotenvy::dotenv().ok();

    let args = Args::parse();

    let script = tokio::fs::read_to_string(&args.script_file)
        .await
        .context(format!("Failed to read script file: {}", args.script_file.display()))?;

    let mut config = Config::from_env();
    if let Some(root) = &args.output_root {
        config.output_root = root.clone();
    }

    let options = GenerationOptions {
        metadata_only: args.metadata_only,
        max_scenes: args.max_scenes,
        max_environments: args.max_environments,
        custom_env_prompt: args.env_prompt.clone(),
        custom_environments: (!args.environments.is_empty()).then(|| args.environments.clone()),
        skip_narration: args.skip_narration,
        skip_sound_effects: args.skip_sound_effects,
        initial_image_path: args.initial_image_path.clone(),
        initial_image_prompt: args.initial_image_prompt.clone(),
    };

    // 第一次 Ctrl-C 在场景边界停止，第二次立即退出
    let cancel = CancelFlag::new();
    let signal = cancel.clone();
    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            if signal.request() {
                error!("Second interrupt received, exiting immediately");
                std::process::exit(130);
            }
            warn!("Interrupt received, stopping after the current scene (press Ctrl-C again to abort)...");
        }
    });

    info!("Starting storyreel with engine {}...", args.engine);
    info!("Script length: {} characters", script.len());

    if let Err(e) = run_generation(&config, args.engine, &script, &options, cancel).await {
        error!("Video generation failed: {}", e);
        std::process::exit(1);
    }

    Ok(())
}

/// 只对本次运行实际用到的服务校验凭据
fn build_services(config: &Config, engine: EngineKind, options: &GenerationOptions) -> Result<Services> {
    let client = config.http_client()?;
    let renders = !options.metadata_only;
    let synthesizes = renders && !(options.skip_narration && options.skip_sound_effects);

    let key = |value: &Option<String>, name: &str, needed: bool| -> Result<String> {
        if needed {
            Ok(Config::require(value, name)?.to_string())
        } else {
            Ok(value.clone().unwrap_or_default())
        }
    };

    let qwen = Arc::new(QwenClient::new(
        key(&config.dashscope_api_key, "DASHSCOPE_API_KEY", true)?,
        client.clone(),
    ));

    let render: Arc<dyn RenderEngine> = match engine {
        EngineKind::Luma => Arc::new(LumaEngine::new(
            key(&config.luma_api_key, "LUMAAI_API_KEY", renders)?,
            client.clone(),
            config.poll_interval,
        )),
        EngineKind::Ltx => Arc::new(LtxEngine::new(
            key(&config.fal_key, "FAL_KEY", renders)?,
            client.clone(),
        )),
    };

    let stills = config.luma_api_key.as_ref().map(|luma_key| {
        Arc::new(LumaEngine::new(luma_key.clone(), client.clone(), config.poll_interval))
            as Arc<dyn StillImageService>
    });

    let uploader = Arc::new(ImgurUploader::new(
        key(&config.imgur_client_id, "IMGUR_CLIENT_ID", renders)?,
        client.clone(),
    ));

    let mut audio = ElevenLabsClient::new(
        key(&config.eleven_labs_api_key, "ELEVEN_LABS_API_KEY", synthesizes)?,
        client,
    );
    if let Some(voice) = &config.eleven_labs_voice_id {
        audio = audio.with_voice(voice.clone());
    }

    let toolkit = if renders {
        Ffmpeg::locate()?
    } else {
        Ffmpeg::with_paths("ffmpeg", "ffprobe")
    };

    Ok(Services {
        planner: qwen.clone(),
        narration_writer: qwen,
        engine: render,
        uploader,
        audio: Arc::new(audio),
        stills,
        toolkit: Arc::new(toolkit),
    })
}

async fn run_generation(
    config: &Config,
    engine: EngineKind,
    script: &str,
    options: &GenerationOptions,
    cancel: CancelFlag,
) -> Result<()> {
    let services = build_services(config, engine, options)?;
    let pipeline = Pipeline::new(services, PipelineSettings::from(config));

    let outcome = pipeline.generate(script, options, cancel).await?;

    info!("Run directory: {}", outcome.run_dir.display());
    println!("{}", outcome.metadata_json);

    for failure in &outcome.degraded {
        warn!(
            "Degraded [{}]{}: {}",
            failure.stage,
            failure.scene.map(|s| format!(" scene {}", s)).unwrap_or_default(),
            failure.message
        );
    }

    match outcome.final_video {
        Some(path) => info!("Video generation completed: {}", path.display()),
        None => info!("Scene metadata saved, rendering skipped"),
    }

    Ok(())
}
