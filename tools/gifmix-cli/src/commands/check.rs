//! Check system capabilities.

use gifmix_common::config::{config_file_path, AppConfig};
use gifmix_render_engine::ffmpeg::engine_available;

pub async fn run(config: &AppConfig) -> anyhow::Result<()> {
    println!("gifmix System Check");
    println!("{}", "=".repeat(50));

    let config_path = config_file_path();
    if config_path.exists() {
        println!("[OK] Config: {}", config_path.display());
    } else {
        println!("[INFO] Config: defaults (no file at {})", config_path.display());
    }

    let ffmpeg_ok = engine_available(&config.engine.ffmpeg_path).await;
    if ffmpeg_ok {
        println!("[OK] ffmpeg: {}", config.engine.ffmpeg_path.display());
    } else {
        println!(
            "[FAIL] ffmpeg: {} not runnable. Install ffmpeg or set engine.ffmpeg_path",
            config.engine.ffmpeg_path.display()
        );
    }

    if engine_available(&config.engine.ffprobe_path).await {
        println!("[OK] ffprobe: {}", config.engine.ffprobe_path.display());
    } else {
        println!(
            "[WARN] ffprobe: {} not runnable. Pass --duration to export",
            config.engine.ffprobe_path.display()
        );
    }

    if config.catalog.resolved_api_key().is_some() {
        println!("[OK] Catalog API key configured");
    } else {
        println!(
            "[WARN] Catalog API key missing. Set {} to enable search",
            gifmix_common::config::CATALOG_API_KEY_ENV
        );
    }

    println!();
    if ffmpeg_ok {
        println!("All required capabilities are available. gifmix is ready.");
    } else {
        println!("Some required capabilities are missing. See above for fixes.");
    }

    Ok(())
}
