use std::path::PathBuf;

use affect_core::AffectConfig;

use crate::error::Result;

#[derive(Debug, Clone)]
pub struct ReplayConfig {
    /// JSON-lines frame file; stdin when unset
    pub input: Option<PathBuf>,
    /// Report destination; stdout when unset
    pub output: Option<PathBuf>,
    pub log_level: String,
    /// Daily log file directory, set when `ENABLE_FILE_LOGS` is on
    pub log_dir: Option<PathBuf>,
    pub affect: AffectConfig,
}

impl ReplayConfig {
    /// Reads `.env` if present, then `AFFECT_INPUT`, `AFFECT_OUTPUT`,
    /// `RUST_LOG`, `ENABLE_FILE_LOGS`/`LOG_DIR` and the `AFFECT_*` pipeline
    /// overrides.
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv();

        let path = |key: &str| {
            std::env::var(key)
                .ok()
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from)
        };
        let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
        let file_logs = std::env::var("ENABLE_FILE_LOGS").is_ok_and(|v| v == "true" || v == "1");
        let log_dir = file_logs.then(|| path("LOG_DIR").unwrap_or_else(|| PathBuf::from("./logs")));

        Ok(Self {
            input: path("AFFECT_INPUT"),
            output: path("AFFECT_OUTPUT"),
            log_level,
            log_dir,
            affect: AffectConfig::from_env()?,
        })
    }

    /// Positional `[input] [output]` arguments take precedence over the environment.
    pub fn with_args(mut self, mut args: impl Iterator<Item = String>) -> Self {
        if let Some(input) = args.next() {
            self.input = Some(PathBuf::from(input));
        }
        if let Some(output) = args.next() {
            self.output = Some(PathBuf::from(output));
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_override_paths() {
        let config = ReplayConfig {
            input: Some(PathBuf::from("env.jsonl")),
            output: None,
            log_level: "info".to_string(),
            log_dir: None,
            affect: AffectConfig::default(),
        }
        .with_args(vec!["frames.jsonl".to_string()].into_iter());
        assert_eq!(config.input, Some(PathBuf::from("frames.jsonl")));
        assert!(config.output.is_none());
    }
}
