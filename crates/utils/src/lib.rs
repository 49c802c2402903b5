use std::path::PathBuf;

use directories::ProjectDirs;

pub mod diff;
pub mod response;
pub mod text;

const APP_NAME: &str = "prompt-eval";

fn project_dirs() -> Option<ProjectDirs> {
    if cfg!(debug_assertions) {
        ProjectDirs::from("dev", "prompt-eval-dev", APP_NAME)
    } else {
        ProjectDirs::from("dev", "prompt-eval", APP_NAME)
    }
}

/// Scratch space for uploads.
///
/// ✔ macOS → ~/Library/Caches/...
/// ✔ Linux → ~/.cache/prompt-eval (respects XDG_CACHE_HOME)
/// ✔ Windows → %LOCALAPPDATA%\...
///
/// Falls back to the system temp dir when the OS reports no home directory.
pub fn cache_dir() -> PathBuf {
    match project_dirs() {
        Some(proj) => proj.cache_dir().to_path_buf(),
        None => {
            tracing::warn!("No home directory found, using temp dir for cache");
            std::env::temp_dir().join(APP_NAME)
        }
    }
}

/// Default location of `config.json`, overridable with `PROMPT_EVAL_CONFIG`.
pub fn config_path() -> PathBuf {
    if let Ok(path) = std::env::var("PROMPT_EVAL_CONFIG") {
        return PathBuf::from(path);
    }
    match project_dirs() {
        Some(proj) => proj.config_dir().join("config.json"),
        None => std::env::temp_dir().join(APP_NAME).join("config.json"),
    }
}
