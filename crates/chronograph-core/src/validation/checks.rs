//! Per-file checks
//!
//! Records are inspected as raw JSON objects rather than decoded into
//! [`Node`](crate::Node)/[`Edge`](crate::Edge), so a single bad field is
//! reported precisely instead of failing the whole file.

use std::path::Path;

use chrono::{DateTime, Utc};
use itertools::Itertools;
use serde_json::{Map, Value};

use super::{FileReport, IssueKind, Severity};
use crate::error::{ChronoError, Result};
use crate::model::EntityKind;
use crate::types::{is_zero_time, Timestamp};

/// Lenient view of one version record
struct RawRecord<'a> {
    fields: &'a Map<String, Value>,
}

impl<'a> RawRecord<'a> {
    fn text(&self, key: &str) -> Option<&'a str> {
        self.fields
            .get(key)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    }

    /// `Ok(None)` when absent/empty, `Err` when present but unparseable
    fn timestamp(&self, key: &str) -> std::result::Result<Option<Timestamp>, String> {
        match self.fields.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(s)) if s.is_empty() => Ok(None),
            Some(Value::String(s)) => DateTime::parse_from_rfc3339(s)
                .map(|t| Some(t.with_timezone(&Utc)))
                .map_err(|e| format!("{} {:?} is not RFC 3339: {}", key, s, e)),
            Some(other) => Err(format!("{} must be a string, found {}", key, other)),
        }
    }
}

/// Validate one history file.
///
/// Malformed content is reported in the returned [`FileReport`]; only a
/// failed read is an error.
pub fn validate_file(path: &Path, kind: EntityKind) -> Result<FileReport> {
    let mut report = FileReport::new(path, kind);
    let bytes = std::fs::read(path).map_err(|e| ChronoError::io(path, e))?;

    let records: Vec<Value> = match serde_json::from_slice(&bytes) {
        Ok(Value::Array(records)) => records,
        Ok(_) => {
            report.push(Severity::Error, IssueKind::Malformed, None, "expected a JSON array of versions");
            return Ok(report);
        }
        Err(e) => {
            report.push(Severity::Error, IssueKind::Malformed, None, format!("invalid JSON: {}", e));
            return Ok(report);
        }
    };
    report.versions = records.len();

    if records.is_empty() {
        report.push(Severity::Error, IssueKind::EmptyHistory, None, "history has no versions");
        return Ok(report);
    }

    let mut ids = Vec::with_capacity(records.len());
    let mut starts = Vec::with_capacity(records.len());
    let mut current = 0usize;
    let mut entity_type = None;

    for (i, value) in records.iter().enumerate() {
        let Value::Object(fields) = value else {
            report.push(Severity::Error, IssueKind::Malformed, Some(i), "version is not a JSON object");
            continue;
        };
        let record = RawRecord { fields };

        if let Some(id) = record.text("id") {
            ids.push(id);
        } else {
            report.push(Severity::Error, IssueKind::MissingField, Some(i), "id is empty");
        }
        match record.text("type") {
            Some(t) => {
                entity_type.get_or_insert(t);
            }
            None => report.push(Severity::Error, IssueKind::MissingField, Some(i), "type is empty"),
        }
        match fields.get("data") {
            None => report.push(Severity::Error, IssueKind::MissingField, Some(i), "data is missing"),
            Some(Value::Object(_)) | Some(Value::Null) => {}
            Some(_) => report.push(Severity::Error, IssueKind::Malformed, Some(i), "data is not an object"),
        }

        if kind == EntityKind::Edge {
            check_endpoints(&record, i, &mut report);
        }

        let (open, start) = check_window(&record, i, &mut report);
        if open {
            current += 1;
        }
        if let Some(start) = start {
            starts.push(start);
        }
    }

    if ids.iter().unique().count() > 1 {
        report.push(
            Severity::Error,
            IssueKind::IdMismatch,
            None,
            format!("versions carry different ids: {}", ids.iter().unique().join(", ")),
        );
    }

    for dup in starts.iter().duplicates() {
        report.push(
            Severity::Error,
            IssueKind::DuplicateValidFrom,
            None,
            format!("several versions start at {}", dup.to_rfc3339()),
        );
    }

    match current {
        1 => {}
        0 => report.push(Severity::Warning, IssueKind::CurrentCount, None, "no current version"),
        n => report.push(
            Severity::Error,
            IssueKind::CurrentCount,
            None,
            format!("{} current versions", n),
        ),
    }

    check_location(path, kind, ids.first().copied(), entity_type, &mut report);
    Ok(report)
}

fn check_endpoints(record: &RawRecord<'_>, i: usize, report: &mut FileReport) {
    let source = record.text("source_id");
    let target = record.text("target_id");
    if source.is_none() {
        report.push(Severity::Error, IssueKind::MissingField, Some(i), "source_id is empty");
    }
    if target.is_none() {
        report.push(Severity::Error, IssueKind::MissingField, Some(i), "target_id is empty");
    }
    if let (Some(s), Some(t)) = (source, target) {
        if s == t {
            report.push(
                Severity::Error,
                IssueKind::SelfReference,
                Some(i),
                format!("edge points at itself ({})", s),
            );
        }
    }
}

/// Returns whether the version is open and its `valid_from`, if usable
fn check_window(record: &RawRecord<'_>, i: usize, report: &mut FileReport) -> (bool, Option<Timestamp>) {
    let mut required = |key: &str| match record.timestamp(key) {
        Ok(Some(t)) if !is_zero_time(&t) => Some(t),
        Ok(_) => {
            report.push(Severity::Error, IssueKind::MissingField, Some(i), format!("{} is empty", key));
            None
        }
        Err(msg) => {
            report.push(Severity::Error, IssueKind::BadTimestamp, Some(i), msg);
            None
        }
    };
    let created_at = required("created_at");
    let valid_from = required("valid_from");

    let valid_until = match record.timestamp("valid_until") {
        Ok(t) => t.filter(|t| !is_zero_time(t)),
        Err(msg) => {
            report.push(Severity::Error, IssueKind::BadTimestamp, Some(i), msg);
            // Unknown end: count it as closed so it cannot mask another
            // current version.
            return (false, valid_from);
        }
    };

    if let (Some(created), Some(from)) = (created_at, valid_from) {
        if created > from {
            report.push(
                Severity::Error,
                IssueKind::TemporalOrder,
                Some(i),
                format!("created_at {} is after valid_from {}", created.to_rfc3339(), from.to_rfc3339()),
            );
        }
    }
    if let (Some(from), Some(until)) = (valid_from, valid_until) {
        if until <= from {
            report.push(
                Severity::Error,
                IssueKind::TemporalOrder,
                Some(i),
                format!("valid_until {} is not after valid_from {}", until.to_rfc3339(), from.to_rfc3339()),
            );
        }
    }
    (valid_until.is_none(), valid_from)
}

fn check_location(
    path: &Path,
    kind: EntityKind,
    id: Option<&str>,
    entity_type: Option<&str>,
    report: &mut FileReport,
) {
    let stem = path.file_stem().and_then(|s| s.to_str());
    if let (Some(stem), Some(id)) = (stem, id) {
        if stem != id {
            report.push(
                Severity::Warning,
                IssueKind::Location,
                None,
                format!("file name {} does not match id {}", stem, id),
            );
        }
    }
    if kind == EntityKind::Node {
        let dir = path
            .parent()
            .and_then(Path::file_name)
            .and_then(|s| s.to_str());
        if let (Some(dir), Some(t)) = (dir, entity_type) {
            if dir != t {
                report.push(
                    Severity::Warning,
                    IssueKind::Location,
                    None,
                    format!("node of type {} stored under {}/", t, dir),
                );
            }
        }
    }
}
