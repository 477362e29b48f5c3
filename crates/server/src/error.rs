use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};

use openclaw_services::{
    GitServiceError, HumanLoopError, MessageServiceError, PrError, ReviewServiceError, RunnerError,
    SessionServiceError, TaskServiceError, TeamServiceError,
};
use openclaw_utils::response::ApiResponse;

/// Boundary error with the rigid status-code policy: 404 missing entity,
/// 409 state conflict, 422 semantic request error, 429 budget exceeded.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    BudgetExceeded(String),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::BudgetExceeded(_) => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Database(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self, "internal server error");
        }
        (status, Json(ApiResponse::<()>::error(self.to_string()))).into_response()
    }
}

impl From<TaskServiceError> for ApiError {
    fn from(e: TaskServiceError) -> Self {
        match e {
            TaskServiceError::NotFound => ApiError::NotFound(e.to_string()),
            TaskServiceError::InvalidTransition { .. } | TaskServiceError::DependencyBlocked(_) => {
                ApiError::Conflict(e.to_string())
            }
            TaskServiceError::Validation(_) => ApiError::Validation(e.to_string()),
            TaskServiceError::Database(db) => ApiError::Database(db),
        }
    }
}

impl From<TeamServiceError> for ApiError {
    fn from(e: TeamServiceError) -> Self {
        match e {
            TeamServiceError::OrgNotFound
            | TeamServiceError::TeamNotFound
            | TeamServiceError::AgentNotFound => ApiError::NotFound(e.to_string()),
            TeamServiceError::DuplicateKey(_) => ApiError::Conflict(e.to_string()),
            TeamServiceError::Database(db) => ApiError::Database(db),
        }
    }
}

impl From<MessageServiceError> for ApiError {
    fn from(e: MessageServiceError) -> Self {
        match e {
            MessageServiceError::NotFound => ApiError::NotFound(e.to_string()),
            MessageServiceError::Validation(_) => ApiError::Validation(e.to_string()),
            MessageServiceError::Database(db) => ApiError::Database(db),
        }
    }
}

impl From<SessionServiceError> for ApiError {
    fn from(e: SessionServiceError) -> Self {
        match e {
            SessionServiceError::AgentNotFound | SessionServiceError::SessionNotFound => {
                ApiError::NotFound(e.to_string())
            }
            SessionServiceError::BudgetExceeded { .. } => ApiError::BudgetExceeded(e.to_string()),
            SessionServiceError::Database(db) => ApiError::Database(db),
        }
    }
}

impl From<HumanLoopError> for ApiError {
    fn from(e: HumanLoopError) -> Self {
        match e {
            HumanLoopError::NotFound | HumanLoopError::AgentNotFound => {
                ApiError::NotFound(e.to_string())
            }
            HumanLoopError::AlreadyResolved(_) => ApiError::Conflict(e.to_string()),
            HumanLoopError::Database(db) => ApiError::Database(db),
        }
    }
}

impl From<ReviewServiceError> for ApiError {
    fn from(e: ReviewServiceError) -> Self {
        match e {
            ReviewServiceError::TaskNotFound | ReviewServiceError::ReviewNotFound => {
                ApiError::NotFound(e.to_string())
            }
            ReviewServiceError::AlreadyResolved(_) | ReviewServiceError::MergeNotAllowed => {
                ApiError::Conflict(e.to_string())
            }
            ReviewServiceError::Task(inner) => inner.into(),
            ReviewServiceError::Database(db) => ApiError::Database(db),
        }
    }
}

impl From<GitServiceError> for ApiError {
    fn from(e: GitServiceError) -> Self {
        match e {
            GitServiceError::TaskNotFound
            | GitServiceError::RepoNotFound
            | GitServiceError::FileNotFound(_) => ApiError::NotFound(e.to_string()),
            GitServiceError::NoBranch => ApiError::Conflict(e.to_string()),
            GitServiceError::Database(db) => ApiError::Database(db),
            GitServiceError::CommandFailed { .. } | GitServiceError::Io(_) => {
                ApiError::Internal(e.to_string())
            }
        }
    }
}

impl From<PrError> for ApiError {
    fn from(e: PrError) -> Self {
        match e {
            PrError::TaskNotFound | PrError::RepoNotFound => ApiError::NotFound(e.to_string()),
            PrError::GhUnavailable | PrError::CreateFailed(_) | PrError::Io(_) => {
                ApiError::Internal(e.to_string())
            }
            PrError::Database(db) => ApiError::Database(db),
        }
    }
}

impl From<RunnerError> for ApiError {
    fn from(e: RunnerError) -> Self {
        match e {
            RunnerError::AgentNotFound | RunnerError::TaskNotFound => {
                ApiError::NotFound(e.to_string())
            }
            RunnerError::AdapterUnavailable { .. } | RunnerError::Adapter(_) => {
                ApiError::Validation(e.to_string())
            }
            RunnerError::Session(inner) => inner.into(),
            RunnerError::Database(db) => ApiError::Database(db),
        }
    }
}
