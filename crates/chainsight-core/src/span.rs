//! Span records delivered by the collector.

use serde::{Deserialize, Serialize};

use crate::level::{canonical_level, LevelError, LevelPath};

/// One recorded call-leg of a trace.
///
/// Client and server sides of the same call edge share a level path and are
/// told apart by `is_receiver`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Span {
    /// Trace this span belongs to.
    #[serde(alias = "traceId")]
    pub trace_id: String,
    /// Dotted path of the enclosing level, empty for the entry level.
    #[serde(default, alias = "parentLevel")]
    pub parent_level: String,
    /// Index among siblings at `parent_level`.
    #[serde(default, alias = "levelId")]
    pub level_id: u32,
    /// Logical endpoint (URL, RPC method, SQL statement, ...).
    #[serde(alias = "viewPointId")]
    pub view_point_id: String,
    #[serde(default, alias = "userId")]
    pub user_id: Option<String>,
    #[serde(default, alias = "applicationId")]
    pub application_id: Option<String>,
    /// Server side of a call edge.
    #[serde(default, alias = "isReceiver")]
    pub is_receiver: bool,
    /// Unix timestamp (milliseconds) when the call started.
    #[serde(default, alias = "startDate")]
    pub start_time: i64,
    #[serde(default, alias = "cost")]
    pub cost_ms: u64,
    /// Zero when the call succeeded.
    #[serde(default, alias = "statusCode")]
    pub status_code: i32,
    #[serde(default, alias = "exceptionStack")]
    pub exception_stack: Option<String>,
    #[serde(default, alias = "businessKey")]
    pub business_key: Option<String>,
}

impl Span {
    pub fn new(
        trace_id: impl Into<String>,
        parent_level: impl Into<String>,
        level_id: u32,
        view_point_id: impl Into<String>,
    ) -> Self {
        Self {
            trace_id: trace_id.into(),
            parent_level: parent_level.into(),
            level_id,
            view_point_id: view_point_id.into(),
            user_id: None,
            application_id: None,
            is_receiver: false,
            start_time: 0,
            cost_ms: 0,
            status_code: 0,
            exception_stack: None,
            business_key: None,
        }
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_cost(mut self, cost_ms: u64) -> Self {
        self.cost_ms = cost_ms;
        self
    }

    pub fn with_status(mut self, status_code: i32) -> Self {
        self.status_code = status_code;
        self
    }

    pub fn with_exception(mut self, stack: impl Into<String>) -> Self {
        self.exception_stack = Some(stack.into());
        self
    }

    pub fn with_business_key(mut self, key: impl Into<String>) -> Self {
        self.business_key = Some(key.into());
        self
    }

    pub fn receiver(mut self) -> Self {
        self.is_receiver = true;
        self
    }

    /// Canonical dotted path as text, the tree builder's sort key.
    pub fn level_desc(&self) -> String {
        canonical_level(&self.parent_level, self.level_id)
    }

    pub fn level_path(&self) -> Result<LevelPath, LevelError> {
        LevelPath::of(&self.parent_level, self.level_id)
    }

    /// The trace entry span: empty parent level and level id zero.
    pub fn is_entry(&self) -> bool {
        self.parent_level.trim().is_empty() && self.level_id == 0
    }

    pub fn is_failed(&self) -> bool {
        self.status_code != 0
            || self
                .exception_stack
                .as_deref()
                .is_some_and(|s| !s.trim().is_empty())
    }
}
