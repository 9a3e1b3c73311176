use crate::{EngineError, Result};
use log::warn;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Downloader executables we know how to drive, in preference order.
const DOWNLOADER_NAMES: [&str; 2] = ["yt-dlp", "youtube-dl"];

#[derive(Debug, Clone, Default, Deserialize)]
struct ExecutableEntry {
    path: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    executables: HashMap<String, ExecutableEntry>,
    video_cache_directory: String,
    #[serde(default = "default_update_video_cache")]
    update_video_cache: bool,
}

fn default_update_video_cache() -> bool {
    true
}

/// Resolved player configuration.
///
/// The downloader is located exactly once, here; nothing downstream probes
/// the filesystem or PATH again.
#[derive(Debug, Clone)]
pub struct Config {
    pub video_cache_directory: PathBuf,
    pub downloader: Option<PathBuf>,
    pub update_video_cache: bool,
}

impl Config {
    pub fn new(
        video_cache_directory: PathBuf,
        downloader: Option<PathBuf>,
        update_video_cache: bool,
    ) -> Self {
        Self {
            video_cache_directory,
            downloader,
            update_video_cache,
        }
    }

    pub fn load(path: &Path) -> Result<Config> {
        let bytes = std::fs::read(path)?;
        let parsed: ConfigFile =
            serde_json::from_slice(&bytes).map_err(|e| EngineError::ConfigInvalid {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;
        if parsed.video_cache_directory.trim().is_empty() {
            return Err(EngineError::ConfigInvalid {
                path: path.to_path_buf(),
                reason: "video_cache_directory is empty".to_string(),
            });
        }

        let downloader = resolve_downloader(&parsed.executables);
        Ok(Config {
            video_cache_directory: PathBuf::from(parsed.video_cache_directory),
            downloader,
            update_video_cache: parsed.update_video_cache,
        })
    }
}

fn resolve_downloader(executables: &HashMap<String, ExecutableEntry>) -> Option<PathBuf> {
    resolve_downloader_with_path(executables, std::env::var_os("PATH").as_deref())
}

fn resolve_downloader_with_path(
    executables: &HashMap<String, ExecutableEntry>,
    path_var: Option<&std::ffi::OsStr>,
) -> Option<PathBuf> {
    for name in DOWNLOADER_NAMES {
        if let Some(configured) = executables.get(name).and_then(|e| e.path.as_deref()) {
            let path = PathBuf::from(configured);
            if path.is_file() {
                return Some(path);
            }
            warn!(
                "configured path for {name} does not exist: {}",
                path.display()
            );
        }
        if let Some(found) = find_in_path(name, path_var) {
            return Some(found);
        }
    }
    None
}

fn find_in_path(binary: &str, path_var: Option<&std::ffi::OsStr>) -> Option<PathBuf> {
    let path_var = path_var?;
    for dir in std::env::split_paths(path_var) {
        if dir.as_os_str().is_empty() {
            continue;
        }
        let candidate = dir.join(binary);
        if candidate.is_file() {
            return Some(candidate);
        }
        if cfg!(windows) {
            let candidate = dir.join(format!("{binary}.exe"));
            if candidate.is_file() {
                return Some(candidate);
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(unix)]
    fn touch_executable(path: &Path) {
        use std::os::unix::fs::PermissionsExt;
        std::fs::write(path, "#!/bin/sh\n").expect("write");
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).expect("chmod");
    }

    #[test]
    fn load_reads_cache_directory_and_toggle() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config_path = dir.path().join("config.json");
        std::fs::write(
            &config_path,
            r#"{"video_cache_directory": "/tmp/videos", "update_video_cache": false}"#,
        )
        .expect("write config");

        let config = Config::load(&config_path).expect("load");
        assert_eq!(config.video_cache_directory, PathBuf::from("/tmp/videos"));
        assert!(!config.update_video_cache);
    }

    #[test]
    fn load_defaults_update_video_cache_to_on() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config_path = dir.path().join("config.json");
        std::fs::write(&config_path, r#"{"video_cache_directory": "/tmp/videos"}"#)
            .expect("write config");

        let config = Config::load(&config_path).expect("load");
        assert!(config.update_video_cache);
    }

    #[test]
    fn load_rejects_empty_cache_directory() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config_path = dir.path().join("config.json");
        std::fs::write(&config_path, r#"{"video_cache_directory": "  "}"#).expect("write config");

        let err = Config::load(&config_path).expect_err("must fail");
        assert!(
            err.to_string().contains("video_cache_directory is empty"),
            "unexpected error: {err}"
        );
    }

    #[test]
    fn load_rejects_malformed_json() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config_path = dir.path().join("config.json");
        std::fs::write(&config_path, "not json").expect("write config");

        assert!(Config::load(&config_path).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn explicit_downloader_path_wins_when_it_exists() {
        let dir = tempfile::tempdir().expect("tempdir");
        let tool = dir.path().join("yt-dlp");
        touch_executable(&tool);

        let mut executables = HashMap::new();
        executables.insert(
            "yt-dlp".to_string(),
            ExecutableEntry {
                path: Some(tool.to_string_lossy().to_string()),
            },
        );
        assert_eq!(resolve_downloader_with_path(&executables, None), Some(tool));
    }

    #[cfg(unix)]
    #[test]
    fn path_probe_finds_a_downloader_on_the_search_path() {
        let dir = tempfile::tempdir().expect("tempdir");
        let tool = dir.path().join("youtube-dl");
        touch_executable(&tool);

        let path_var =
            std::env::join_paths([dir.path().to_path_buf()]).expect("join search path");
        assert_eq!(
            resolve_downloader_with_path(&HashMap::new(), Some(&path_var)),
            Some(tool)
        );
    }

    #[test]
    fn missing_downloader_resolves_to_none() {
        // An explicit path that does not exist falls through to the PATH
        // probe; with no search path and nothing relevant configured,
        // resolution gives None.
        let mut executables = HashMap::new();
        executables.insert(
            "vlc".to_string(),
            ExecutableEntry {
                path: Some("/nonexistent/vlc".to_string()),
            },
        );
        assert_eq!(resolve_downloader_with_path(&executables, None), None);
    }
}
