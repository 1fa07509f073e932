mod types;

pub use types::*;

use anyhow::{Context, Result};
use std::path::Path;

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let mut config: Config = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    validate_config(&config)?;

    prepare_tiers(&mut config);

    Ok(config)
}

/// Load config from default locations or return default config
pub fn load_config_or_default(custom_path: Option<&Path>) -> Result<Config> {
    if let Some(path) = custom_path {
        return load_config(path);
    }

    // Try default locations
    let default_paths = [
        "./config.toml",
        "./mp4forge.toml",
        "~/.config/mp4forge/config.toml",
        "/etc/mp4forge/config.toml",
    ];

    for path_str in default_paths {
        let path = shellexpand::tilde(path_str);
        let path = Path::new(path.as_ref());
        if path.exists() {
            return load_config(path);
        }
    }

    // Return default config if no file found
    let mut config = Config::default();
    prepare_tiers(&mut config);
    Ok(config)
}

/// The tier walk expects ascending width thresholds; sort once at load
/// so selection never has to.
fn prepare_tiers(config: &mut Config) {
    for table in [
        &mut config.video.bitrate_ceilings,
        &mut config.video.max_rate,
        &mut config.video.min_rate,
        &mut config.video.buf_size,
    ] {
        table.sort_by_key(|tier| tier.max_width);
    }
}

/// Validate configuration
fn validate_config(config: &Config) -> Result<()> {
    if config.video.codecs.is_empty() {
        anyhow::bail!("At least one accepted video codec is required");
    }
    if config.audio.codecs.is_empty() {
        anyhow::bail!("At least one accepted audio codec is required");
    }
    if config.subtitle.codecs.is_empty() {
        anyhow::bail!("At least one accepted subtitle codec is required");
    }

    if config.output.extension.is_empty() {
        anyhow::bail!("Output extension cannot be empty");
    }

    if let Some(jobs) = config.process.jobs {
        if jobs == 0 {
            anyhow::bail!("process.jobs cannot be 0");
        }
    }

    // Configured tool paths should exist when given
    for (name, path) in [
        ("ffmpeg", &config.tools.ffmpeg),
        ("ffprobe", &config.tools.ffprobe),
    ] {
        if let Some(path) = path {
            if !path.exists() {
                tracing::warn!("Configured {} path does not exist: {:?}", name, path);
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_config_is_valid() {
        let config = Config::default();
        assert!(validate_config(&config).is_ok());
        assert_eq!(config.output.format, "mp4");
        assert!(config.output.delete_source);
        assert_eq!(config.audio.bitrate_per_channel, 256);
    }

    #[test]
    fn tiers_are_sorted_on_load() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[video]
bitrate_ceilings = [
    {{ max_width = 3840, kbps = 20000 }},
    {{ max_width = 1280, kbps = 5000 }},
    {{ max_width = 1920, kbps = 8000 }},
]
"#
        )
        .unwrap();

        let config = load_config(file.path()).unwrap();
        let widths: Vec<u32> = config
            .video
            .bitrate_ceilings
            .iter()
            .map(|t| t.max_width)
            .collect();
        assert_eq!(widths, vec![1280, 1920, 3840]);
    }

    #[test]
    fn empty_codec_list_is_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[video]\ncodecs = []").unwrap();
        assert!(load_config(file.path()).is_err());
    }

    #[test]
    fn policy_snapshot_carries_sections() {
        let mut config = Config::default();
        config.output.format = "mkv".to_string();
        config.audio.max_channels = Some(6);

        let policy = config.policy();
        assert!(!policy.is_mp4());
        assert_eq!(policy.audio.max_channels, Some(6));
        assert!(!policy.force_convert);
    }
}
