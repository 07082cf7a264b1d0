//! Group snapshot model.

use serde::{Deserialize, Serialize};
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// Read-only copy of a `groups` row.
///
/// Fetched independently of the context list, so `name` may differ from the
/// `group_name` carried by the context if the group was renamed in between.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct GroupSnapshot {
    pub id: String,
    pub name: String,
    /// Display color (hex), used by the calendar and roster views
    #[serde(default)]
    pub color_code: Option<String>,
    /// e.g. "road", "mtb", "cyclocross"
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub level_required: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub is_active: Option<bool>,
}
