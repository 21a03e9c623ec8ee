use anyhow::Result;
use clap::Parser;
use lipsync_viz::logging::{self, LogTarget};

fn main() -> Result<()> {
    let cfg = lipsync_viz::config::Config::parse();
    if cfg.list_devices {
        logging::init(&cfg.log_level, LogTarget::Stderr)?;
        lipsync_viz::audio::list_input_devices()?;
        return Ok(());
    }

    let target = match cfg.log_file.as_deref() {
        Some(path) => LogTarget::File(path),
        None => LogTarget::Discard,
    };
    logging::init(&cfg.log_level, target)?;

    lipsync_viz::app::run(cfg)
}
