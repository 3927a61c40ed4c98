//! Canonical event rendering for hashing.
//!
//! Every chain-relevant field is rendered in one fixed order. The rendering
//! is deliberately brittle: changing the field order, the null tokens or the
//! key sorting changes every hash computed after the change, so any revision
//! here must be versioned against existing ledgers.

use chrono::SecondsFormat;
use serde_json::Value;
use std::collections::BTreeMap;
use vigil_audit_types::NormalizedEvent;

/// Render a record into its canonical hashing form.
///
/// Fields appear as `name=value;` pairs in a fixed order. Absent strings
/// render as the empty string, absent numbers as the literal token `null`
/// (the two are not interchangeable: an empty-string rendering of a numeric
/// field would hash differently). The `details` map closes the string with
/// its keys sorted lexicographically; timestamps render as RFC 3339 UTC at
/// fixed microsecond precision so equal instants always render identically.
pub fn canonical(record: &NormalizedEvent) -> String {
    let mut out = String::with_capacity(256);

    push_field(
        &mut out,
        "occurredAt",
        &record
            .occurred_at
            .to_rfc3339_opts(SecondsFormat::Micros, true),
    );
    push_field(&mut out, "sourceService", &record.source_service);
    push_field(
        &mut out,
        "sourceInstance",
        record.source_instance.as_deref().unwrap_or(""),
    );
    push_field(&mut out, "eventType", &record.event_type);
    push_field(&mut out, "outcome", &record.outcome.to_string());
    push_field(&mut out, "severity", &record.severity.to_string());
    push_field(&mut out, "actorUserId", &number_token(record.actor_user_id));
    push_field(
        &mut out,
        "actorRole",
        record.actor_role.as_deref().unwrap_or(""),
    );
    push_field(
        &mut out,
        "actorEmail",
        record.actor_email.as_deref().unwrap_or(""),
    );
    push_field(&mut out, "ip", record.ip.as_deref().unwrap_or(""));
    push_field(
        &mut out,
        "userAgent",
        record.user_agent.as_deref().unwrap_or(""),
    );
    push_field(
        &mut out,
        "deviceId",
        record.device_id.as_deref().unwrap_or(""),
    );
    push_field(
        &mut out,
        "sessionId",
        record.session_id.as_deref().unwrap_or(""),
    );
    push_field(&mut out, "patientId", &number_token(record.patient_id));
    push_field(&mut out, "recordId", &number_token(record.record_id));
    push_field(
        &mut out,
        "targetUserId",
        &number_token(record.target_user_id),
    );
    push_field(&mut out, "requestId", &record.request_id);
    push_field(&mut out, "traceId", record.trace_id.as_deref().unwrap_or(""));
    push_field(&mut out, "spanId", record.span_id.as_deref().unwrap_or(""));

    out.push_str("details=");
    out.push_str(&canonical_details(&record.details));

    out
}

fn push_field(out: &mut String, name: &str, value: &str) {
    out.push_str(name);
    out.push('=');
    out.push_str(value);
    out.push(';');
}

fn number_token(value: Option<i64>) -> String {
    match value {
        Some(n) => n.to_string(),
        None => "null".to_string(),
    }
}

/// Render the details map with sorted keys as `{"k":"v",...}`.
///
/// Values coerce to their plain string representation: strings render
/// unquoted-as-content, numbers and booleans via their display form, nulls
/// as `null`, and any non-scalar as compact JSON. Neither keys nor values
/// are escaped, so this rendering is deterministic but not parseable JSON;
/// a numeric `1` and the string `"1"` render identically.
fn canonical_details(details: &BTreeMap<String, Value>) -> String {
    if details.is_empty() {
        return "{}".to_string();
    }

    let mut out = String::from("{");
    for (i, (key, value)) in details.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push('"');
        out.push_str(key);
        out.push_str("\":\"");
        out.push_str(&scalar_text(value));
        out.push('"');
    }
    out.push('}');
    out
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}
