//! Startup checks: writable directories, ffmpeg tools, speech model.

use clap::Parser;
use std::path::Path;
use std::process::Command;

use ugc_worker::WorkerConfig;

#[derive(Debug, Parser)]
#[command(name = "worker-selfcheck")]
#[command(about = "Check that the worker environment can run jobs")]
struct Args {
    /// Fail when no speech model is configured instead of only warning
    #[arg(long = "require-model", default_value_t = false)]
    require_model: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    dotenvy::dotenv().ok();
    let config = WorkerConfig::from_env();

    println!(
        "worker-selfcheck: starting with work_dir={}",
        config.work_dir.display()
    );
    ensure_dir(&config.work_dir).await?;
    ensure_dir(&config.output_dir).await?;
    ensure_tool("ffmpeg")?;
    ensure_tool("ffprobe")?;
    match &config.whisper_model_path {
        Some(model) => ensure_model(model)?,
        None if args.require_model => anyhow::bail!("WHISPER_MODEL_PATH not set"),
        None => println!("worker-selfcheck: WHISPER_MODEL_PATH not set, overlays disabled"),
    }

    println!("worker-selfcheck: ok");
    Ok(())
}

async fn ensure_dir(path: &Path) -> anyhow::Result<()> {
    tokio::fs::create_dir_all(path).await?;
    let marker = path.join(".selfcheck");
    tokio::fs::write(&marker, b"ok")
        .await
        .map_err(|e| anyhow::anyhow!("{} is not writable: {}", path.display(), e))?;
    tokio::fs::remove_file(&marker).await?;
    Ok(())
}

fn ensure_tool(name: &str) -> anyhow::Result<()> {
    let path = which::which(name).map_err(|e| anyhow::anyhow!("{} not available: {}", name, e))?;
    let output = Command::new(&path)
        .arg("-version")
        .output()
        .map_err(|e| anyhow::anyhow!("{} not runnable: {}", name, e))?;

    if !output.status.success() {
        return Err(anyhow::anyhow!("{} -version failed: {:?}", name, output.status));
    }
    Ok(())
}

fn ensure_model(path: &Path) -> anyhow::Result<()> {
    let meta = std::fs::metadata(path)
        .map_err(|e| anyhow::anyhow!("whisper model {} unreadable: {}", path.display(), e))?;
    if meta.len() == 0 {
        return Err(anyhow::anyhow!("whisper model {} is empty", path.display()));
    }
    println!("worker-selfcheck: whisper model {} ({} bytes)", path.display(), meta.len());
    Ok(())
}
