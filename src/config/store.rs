// src/config/store.rs

use crate::{config::ExternalConfig, error::AppResult};
use anyhow::Context;
use log::{debug, info};
use std::{fs, io::Write, path::Path};
use tempfile::NamedTempFile;

pub(crate) fn load_or_create_external_config(config_path: &Path) -> AppResult<ExternalConfig> {
    if config_path.is_file() {
        let content = fs::read_to_string(config_path)
            .with_context(|| format!("读取配置文件 '{}' 失败", config_path.display()))?;
        let config = serde_json::from_str(&content)
            .with_context(|| format!("解析配置文件 '{}' 失败", config_path.display()))?;
        debug!("已加载配置文件: {}", config_path.display());
        Ok(config)
    } else {
        info!("配置文件 {:?} 不存在，将创建默认配置。", config_path);
        let config = ExternalConfig::default();
        save_external_config(config_path, &config)?;
        Ok(config)
    }
}

/// 原子写入配置：先写同目录临时文件并 fsync，再整体替换，避免掉电后配置损坏。
pub(crate) fn save_external_config(config_path: &Path, config: &ExternalConfig) -> AppResult<()> {
    let dir = match config_path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;

    let json_content = serde_json::to_string_pretty(config)?;
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(json_content.as_bytes())?;
    tmp.as_file().sync_all()?;
    tmp.persist(config_path)?;
    debug!("配置已保存至: {}", config_path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn creates_default_file_when_missing() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let cfg = load_or_create_external_config(&path).unwrap();
        assert_eq!(cfg, ExternalConfig::default());
        assert!(path.is_file());
    }

    #[test]
    fn corrupt_file_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(load_or_create_external_config(&path).is_err());
    }

    #[test]
    fn save_then_load_preserves_changes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        let mut cfg = ExternalConfig::default();
        cfg.esp_ip = "192.168.4.1".into();
        save_external_config(&path, &cfg).unwrap();
        let loaded = load_or_create_external_config(&path).unwrap();
        assert_eq!(loaded.esp_ip, "192.168.4.1");
    }
}
