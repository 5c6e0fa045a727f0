//! Configuration scaffolding for `agenda init`.
//!
//! Writes `~/.agenda/` from the bundled templates without overwriting
//! existing local files.

use anyhow::Result;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default)]
pub struct InitReport {
    pub root: PathBuf,
    pub created: Vec<PathBuf>,
    pub skipped: Vec<PathBuf>,
}

#[derive(Debug, Clone, Copy)]
struct TemplateFile {
    relative_path: &'static str,
    contents: &'static str,
}

const TEMPLATE_FILES: &[TemplateFile] = &[TemplateFile {
    relative_path: "config.toml",
    contents: include_str!("../../config-templates/config.toml"),
}];

pub async fn initialize(config_path: Option<PathBuf>) -> Result<InitReport> {
    let config_path = match config_path {
        Some(path) => path,
        None => crate::config::default_config_path()?,
    };
    let root = config_path
        .parent()
        .ok_or_else(|| anyhow::anyhow!("invalid config path: {}", config_path.display()))?
        .to_path_buf();
    initialize_at_root(&root).await
}

pub async fn initialize_at_root(root: &Path) -> Result<InitReport> {
    tokio::fs::create_dir_all(root)
        .await
        .map_err(|e| anyhow::anyhow!("create config root {}: {e}", root.display()))?;

    let mut report = InitReport {
        root: root.to_path_buf(),
        ..InitReport::default()
    };

    for template in TEMPLATE_FILES {
        let target = root.join(template.relative_path);
        match tokio::fs::metadata(&target).await {
            Ok(_) => report.skipped.push(target),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                tokio::fs::write(&target, template.contents)
                    .await
                    .map_err(|e| {
                        anyhow::anyhow!("write config template {}: {e}", target.display())
                    })?;
                report.created.push(target);
            }
            Err(err) => {
                return Err(anyhow::anyhow!(
                    "inspect config path {}: {err}",
                    target.display()
                ));
            }
        }
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AgendaConfig;

    #[tokio::test]
    async fn init_creates_templates_when_missing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = dir.path().join("agenda");
        let report = initialize_at_root(&root).await.expect("init succeeds");

        assert_eq!(report.created.len(), TEMPLATE_FILES.len());
        assert!(report.skipped.is_empty());
        assert!(root.join("config.toml").exists());
    }

    #[tokio::test]
    async fn init_is_idempotent_and_never_overwrites() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "# mine\n").expect("seed existing config");

        let report = initialize(Some(path.clone())).await.expect("init succeeds");
        assert!(report.created.is_empty(), "existing file must be kept");
        assert_eq!(report.skipped, vec![path.clone()]);
        assert_eq!(
            std::fs::read_to_string(&path).expect("read back"),
            "# mine\n"
        );
    }

    #[test]
    fn bundled_template_is_a_valid_config() {
        let cfg = AgendaConfig::parse(TEMPLATE_FILES[0].contents).expect("template parses");
        cfg.validate().expect("template validates");
        assert_eq!(cfg.agent.freshness_ttl_secs, 120);
    }
}
