use serde::{Deserialize, Serialize};

use crate::core::error::ScoringError;
use crate::core::region::UnknownRegion;

/// 评分 API 错误类型，FRB 友好的设计
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoringApiError {
    pub error_type: String,
    pub message: String,
}

impl ScoringApiError {
    pub(crate) fn lock_poisoned(e: impl std::fmt::Display) -> Self {
        Self {
            error_type: "LockPoisoned".to_string(),
            message: format!("会话锁已损坏: {}", e),
        }
    }
}

impl From<ScoringError> for ScoringApiError {
    fn from(e: ScoringError) -> Self {
        Self {
            error_type: e.kind().to_string(),
            message: e.to_string(),
        }
    }
}

impl From<UnknownRegion> for ScoringApiError {
    fn from(e: UnknownRegion) -> Self {
        Self {
            error_type: "UnknownRegion".to_string(),
            message: e.to_string(),
        }
    }
}

impl std::fmt::Display for ScoringApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.error_type, self.message)
    }
}

impl std::error::Error for ScoringApiError {}
