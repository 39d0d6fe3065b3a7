//! Show the playback duration of an animated GIF.

use std::sync::Arc;

use gifmix_render_engine::{DefaultFetcher, DurationResolver};

pub async fn run(uri: String) -> anyhow::Result<()> {
    let resolver = DurationResolver::new(Arc::new(DefaultFetcher::new()));
    let secs = resolver.resolve(&uri).await;

    if secs > 0.0 {
        println!("{uri}: {secs:.2}s");
    } else {
        println!("{uri}: unknown duration (not a decodable GIF?)");
    }

    Ok(())
}
