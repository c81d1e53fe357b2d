pub mod error;

pub use error::*;

use std::path::PathBuf;

/// Loam's per-user config directory
pub fn get_config_dir() -> Result<PathBuf> {
    let config_dir = dirs::config_dir()
        .ok_or(ConfigError::ConfigDirNotFound)?
        .join("loam");

    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir)?;
    }

    Ok(config_dir)
}

/// Locate the stack file for the current project.
///
/// Search order:
/// 1. LOAM_STACK_PATH environment variable (direct path)
/// 2. current directory: stack.local.kdl, .stack.local.kdl, stack.kdl, .stack.kdl
/// 3. ./.loam/ directory, same filenames
/// 4. ~/.config/loam/stack.kdl (global fallback)
pub fn find_stack_file() -> Result<PathBuf> {
    if let Ok(stack_path) = std::env::var("LOAM_STACK_PATH") {
        let path = PathBuf::from(stack_path);
        if path.exists() {
            return Ok(path);
        }
    }

    let current_dir = std::env::current_dir()?;
    let candidates = [
        "stack.local.kdl",
        ".stack.local.kdl",
        "stack.kdl",
        ".stack.kdl",
    ];

    for filename in &candidates {
        let path = current_dir.join(filename);
        if path.exists() {
            return Ok(path);
        }
    }

    let loam_dir = current_dir.join(".loam");
    if loam_dir.is_dir() {
        for filename in &candidates {
            let path = loam_dir.join(filename);
            if path.exists() {
                return Ok(path);
            }
        }
    }

    if let Some(config_dir) = dirs::config_dir() {
        let global_stack = config_dir.join("loam").join("stack.kdl");
        if global_stack.exists() {
            return Ok(global_stack);
        }
    }

    Err(ConfigError::StackFileNotFound)
}
