use fluxbeat::audio::flux::{DEFAULT_THRESHOLD_MULTIPLIER, DEFAULT_THRESHOLD_WINDOW_SIZE};
use fluxbeat::{BandConfig, WindowKind};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub analysis: AnalysisConfig,
    #[serde(default)]
    pub bands: Vec<BandEntry>,
}

#[derive(Debug, Deserialize)]
pub struct AnalysisConfig {
    #[serde(default = "default_fft_size")]
    pub fft_size: usize,
    #[serde(default)]
    pub window: WindowKind,
    #[serde(default = "default_threshold_multiplier")]
    pub threshold_multiplier: f32,
    #[serde(default = "default_threshold_window_size")]
    pub threshold_window_size: usize,
}

/// One `[[bands]]` table; thresholds fall back to `[analysis]`.
#[derive(Debug, Deserialize)]
pub struct BandEntry {
    pub name: String,
    pub min_frequency: Option<f32>,
    pub max_frequency: Option<f32>,
    pub threshold_multiplier: Option<f32>,
    pub threshold_window_size: Option<usize>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            fft_size: default_fft_size(),
            window: WindowKind::default(),
            threshold_multiplier: default_threshold_multiplier(),
            threshold_window_size: default_threshold_window_size(),
        }
    }
}

fn default_fft_size() -> usize { 1024 }
fn default_threshold_multiplier() -> f32 { DEFAULT_THRESHOLD_MULTIPLIER }
fn default_threshold_window_size() -> usize { DEFAULT_THRESHOLD_WINDOW_SIZE }

impl Config {
    /// Band configs for a clip; the bass/mid/high trio when none are listed.
    pub fn band_configs(&self, sample_rate: u32) -> Vec<BandConfig> {
        let a = &self.analysis;
        if self.bands.is_empty() {
            return BandConfig::default_bands(a.fft_size, sample_rate)
                .into_iter()
                .map(|b| b.with_threshold(a.threshold_multiplier, a.threshold_window_size))
                .collect();
        }

        self.bands
            .iter()
            .map(|entry| BandConfig {
                name: entry.name.clone(),
                fft_size: a.fft_size,
                sample_rate,
                min_frequency: entry.min_frequency,
                max_frequency: entry.max_frequency,
                threshold_multiplier: entry.threshold_multiplier.unwrap_or(a.threshold_multiplier),
                threshold_window_size: entry.threshold_window_size.unwrap_or(a.threshold_window_size),
            })
            .collect()
    }
}

pub fn parse_config(content: &str) -> Result<Config, toml::de::Error> {
    toml::from_str(content)
}

pub fn load_config(path: &Path) -> Option<Config> {
    let content = std::fs::read_to_string(path).ok()?;
    match parse_config(&content) {
        Ok(cfg) => Some(cfg),
        Err(e) => {
            log::warn!("Invalid config {}: {}", path.display(), e);
            None
        }
    }
}

/// Explicit path, else ./fluxbeat.toml, else the user config directories.
pub fn find_config(explicit: Option<PathBuf>) -> Option<PathBuf> {
    explicit.or_else(|| {
        let local = PathBuf::from("fluxbeat.toml");
        if local.exists() {
            return Some(local);
        }
        if let Some(home) = dirs::home_dir() {
            let xdg = home.join(".config").join("fluxbeat").join("config.toml");
            if xdg.exists() {
                return Some(xdg);
            }
        }
        if let Some(config_dir) = dirs::config_dir() {
            let platform = config_dir.join("fluxbeat").join("config.toml");
            if platform.exists() {
                return Some(platform);
            }
        }
        None
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let cfg = parse_config("").unwrap();
        let bands = cfg.band_configs(44100);

        assert_eq!(cfg.analysis.fft_size, 1024);
        assert_eq!(cfg.analysis.window, WindowKind::Hamming);
        assert_eq!(bands.len(), 3);
        assert_eq!(bands[0].name, "bass");
        assert_eq!(bands[0].threshold_window_size, 50);
        assert_eq!(bands[2].max_frequency, Some(20000.0));
    }

    #[test]
    fn test_custom_bands_inherit_thresholds() {
        let cfg = parse_config(
            r#"
            [analysis]
            fft_size = 2048
            window = "hann"
            threshold_multiplier = 2.0

            [[bands]]
            name = "kick"
            min_frequency = 40.0
            max_frequency = 120.0
            threshold_window_size = 20

            [[bands]]
            name = "all"
            "#,
        )
        .unwrap();
        let bands = cfg.band_configs(48000);

        assert_eq!(cfg.analysis.window, WindowKind::Hann);
        assert_eq!(bands.len(), 2);
        assert_eq!(bands[0].fft_size, 2048);
        assert_eq!(bands[0].sample_rate, 48000);
        assert_eq!(bands[0].threshold_multiplier, 2.0);
        assert_eq!(bands[0].threshold_window_size, 20);
        assert_eq!(bands[1].threshold_window_size, 50);
        assert!(!bands[1].is_filtered());
    }

    #[test]
    fn test_bad_window_name_rejected() {
        assert!(parse_config("[analysis]\nwindow = \"triangle\"").is_err());
    }

    #[test]
    fn test_missing_file_is_none() {
        assert!(load_config(Path::new("/nonexistent/fluxbeat.toml")).is_none());
    }
}
