//! Client-side error reports: classification and running counts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};

/// How many classified reports are kept for inspection
const RECENT_REPORTS: usize = 100;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientErrorReport {
    #[serde(default)]
    pub error_id: Option<String>,
    pub message: String,
    #[serde(default)]
    pub stack: Option<String>,
    #[serde(default)]
    pub component_stack: Option<String>,
    #[serde(default)]
    pub context: Option<String>,
    #[serde(default)]
    pub user_agent: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub retry_count: u32,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub player_id: Option<String>,
    #[serde(default)]
    pub game_state: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Network,
    Validation,
    Ui,
    GameLogic,
    Authentication,
    Unknown,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Network => "network",
            Category::Validation => "validation",
            Category::Ui => "ui",
            Category::GameLogic => "game_logic",
            Category::Authentication => "authentication",
            Category::Unknown => "unknown",
        }
    }
}

fn mentions(text: Option<&str>, keywords: &[&str]) -> bool {
    match text {
        Some(text) => {
            let lower = text.to_lowercase();
            keywords.iter().any(|k| lower.contains(k))
        }
        None => false,
    }
}

impl ClientErrorReport {
    pub fn severity(&self) -> Severity {
        let message = Some(self.message.as_str());
        if mentions(message, &["crash", "fatal", "panic", "segfault"])
            || mentions(self.stack.as_deref(), &["crash", "fatal", "panic", "segfault"])
        {
            return Severity::Critical;
        }
        if mentions(message, &["timeout", "network", "connection", "failed"]) || self.retry_count > 3
        {
            return Severity::High;
        }
        if mentions(message, &["warning", "deprecated", "fallback"]) {
            return Severity::Medium;
        }
        Severity::Low
    }

    pub fn category(&self) -> Category {
        let message = Some(self.message.as_str());
        let context = self.context.as_deref();

        let network = ["network", "connection", "timeout", "fetch", "websocket"];
        if mentions(message, &network) || mentions(context, &network) {
            return Category::Network;
        }
        if mentions(message, &["validation", "invalid", "required", "format"]) {
            return Category::Validation;
        }
        let ui = ["component", "render", "props", "state"];
        if mentions(message, &ui) || mentions(self.component_stack.as_deref(), &ui) {
            return Category::Ui;
        }
        let game = ["game", "session", "player", "door", "score"];
        if mentions(message, &game) || mentions(context, &game) {
            return Category::GameLogic;
        }
        if mentions(message, &["auth", "unauthorized", "forbidden", "token"]) {
            return Category::Authentication;
        }
        Category::Unknown
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassifiedReport {
    pub report_id: String,
    pub severity: Severity,
    pub category: Category,
    pub received_at: DateTime<Utc>,
    pub report: ClientErrorReport,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ErrorReportStats {
    pub total: u64,
    pub by_severity: BTreeMap<String, u64>,
    pub by_category: BTreeMap<String, u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_received_at: Option<DateTime<Utc>>,
}

/// Running tally of received reports
#[derive(Debug, Default)]
pub struct ErrorReportLog {
    stats: ErrorReportStats,
    recent: VecDeque<ClassifiedReport>,
}

impl ErrorReportLog {
    pub fn record(&mut self, report: ClientErrorReport) -> ClassifiedReport {
        let classified = ClassifiedReport {
            report_id: report
                .error_id
                .clone()
                .unwrap_or_else(|| ulid::Ulid::new().to_string()),
            severity: report.severity(),
            category: report.category(),
            received_at: Utc::now(),
            report,
        };

        self.stats.total += 1;
        *self
            .stats
            .by_severity
            .entry(classified.severity.as_str().to_string())
            .or_insert(0) += 1;
        *self
            .stats
            .by_category
            .entry(classified.category.as_str().to_string())
            .or_insert(0) += 1;
        self.stats.last_received_at = Some(classified.received_at);

        if self.recent.len() == RECENT_REPORTS {
            self.recent.pop_front();
        }
        self.recent.push_back(classified.clone());
        classified
    }

    pub fn stats(&self) -> ErrorReportStats {
        self.stats.clone()
    }

    pub fn recent(&self) -> impl Iterator<Item = &ClassifiedReport> {
        self.recent.iter()
    }
}
