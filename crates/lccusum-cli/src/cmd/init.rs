use anyhow::Context;
use lccusum_core::{config::Config, io, paths};
use std::path::Path;

pub fn run(root: &Path) -> anyhow::Result<()> {
    println!("Initializing lccusum in: {}", root.display());

    for dir in [paths::LCCUSUM_DIR, paths::TRAINEES_DIR] {
        let p = root.join(dir);
        io::ensure_dir(&p).with_context(|| format!("failed to create {}", p.display()))?;
    }

    let config_path = paths::config_path(root);
    if !config_path.exists() {
        let cfg = Config::starter().context("failed to build starter config")?;
        cfg.save(root).context("failed to write config.yaml")?;
        println!(
            "  created: {} ({} procedures)",
            paths::CONFIG_FILE,
            cfg.procedures.len()
        );
    } else {
        println!("  exists:  {}", paths::CONFIG_FILE);
    }

    Ok(())
}
