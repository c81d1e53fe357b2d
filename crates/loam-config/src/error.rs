use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("config directory not found")]
    ConfigDirNotFound,

    #[error(
        "no stack file found. Checked:\n\
        - current directory: stack.kdl, stack.local.kdl, .stack.kdl, .stack.local.kdl\n\
        - ./.loam/ directory\n\
        - ~/.config/loam/stack.kdl\n\
        or set LOAM_STACK_PATH to the file directly"
    )]
    StackFileNotFound,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ConfigError>;
