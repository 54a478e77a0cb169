use crate::check::PortConflict;
use dev_service_core::ServiceError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ContainerError {
    #[error(
        "Cannot connect to Docker: {0}\n\nHint:\n  • Make sure the Docker daemon is running\n  • Check that `docker ps` works"
    )]
    DockerConnectionFailed(String),

    #[error("Docker API error: {0}")]
    DockerApiError(String),

    #[error("Failed to run `{command}`: {message}")]
    ProcessSpawn { command: String, message: String },

    #[error("Command `{command}` failed with {}", describe_exit(.code))]
    ProcessFailed { command: String, code: Option<i32> },

    #[error("{}", describe_conflicts(.0))]
    PortsAllocated(Vec<PortConflict>),

    #[error(transparent)]
    Service(#[from] ServiceError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ContainerError {
    /// プロセスに渡す終了コード（外部コマンドの失敗ならそのコード）
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ProcessFailed {
                code: Some(code), ..
            } => *code,
            _ => 1,
        }
    }
}

fn describe_exit(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {}", code),
        None => "no exit code (terminated by signal)".to_string(),
    }
}

fn describe_conflicts(conflicts: &[PortConflict]) -> String {
    let mut message = String::from("Required port(s) are already allocated:");
    for conflict in conflicts {
        message.push('\n');
        message.push_str(&conflict.to_string());
    }
    message
}

impl From<bollard::errors::Error> for ContainerError {
    fn from(err: bollard::errors::Error) -> Self {
        let err_str = err.to_string();
        // 接続エラーの可能性をチェック
        if err_str.contains("Connection refused")
            || err_str.contains("No such file or directory")
            || err_str.contains("Socket not found")
        {
            ContainerError::DockerConnectionFailed(err_str)
        } else {
            ContainerError::DockerApiError(err_str)
        }
    }
}

pub type Result<T> = std::result::Result<T, ContainerError>;
