//! `visreg init`: write a default configuration file

use clap::Args;
use std::path::Path;
use visreg_common::VisregConfig;

#[derive(Args, Debug)]
pub struct InitArgs {
    /// Overwrite an existing file
    #[arg(long)]
    pub force: bool,
}

pub fn execute(args: InitArgs, path: &Path) -> anyhow::Result<()> {
    if path.exists() && !args.force {
        anyhow::bail!("{} already exists (use --force to overwrite)", path.display());
    }
    VisregConfig::default().save(path)?;
    println!("Wrote {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_writes_loadable_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("visreg.toml");

        execute(InitArgs { force: false }, &path).unwrap();
        assert_eq!(VisregConfig::load(&path).unwrap(), VisregConfig::default());
    }

    #[test]
    fn test_refuses_to_overwrite_without_force() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("visreg.toml");
        std::fs::write(&path, "[driver]\nport = 9999\n").unwrap();

        let err = execute(InitArgs { force: false }, &path).unwrap_err();
        assert!(err.to_string().contains("--force"));
        assert_eq!(VisregConfig::load(&path).unwrap().driver.port, 9999);

        execute(InitArgs { force: true }, &path).unwrap();
        assert_eq!(VisregConfig::load(&path).unwrap().driver.port, 4444);
    }
}
