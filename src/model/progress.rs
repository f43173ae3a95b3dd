use serde::Serialize;

use crate::model::matrix::ElementKey;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ProgressStatus {
    Missing,
    Partial,
    Complete,
}

impl ProgressStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ProgressStatus::Missing => "missing",
            ProgressStatus::Partial => "partial",
            ProgressStatus::Complete => "complete",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProgressRecord {
    pub sample: String,
    pub element: ElementKey,
    pub status: ProgressStatus,
    pub included: bool,
}
