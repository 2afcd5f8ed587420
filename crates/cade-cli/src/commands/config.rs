use super::setup::load_config;
use anyhow::{Context, Result};
use std::path::Path;

pub fn run(explicit: Option<&Path>) -> Result<()> {
    let (path, config) = load_config(explicit)?;
    let rendered = toml::to_string_pretty(&config).context("Failed to render config")?;
    println!("# {}", path.display());
    print!("{rendered}");
    Ok(())
}
