//! Normalization of the camera's SEI JSON.
//!
//! Cameras run different firmware builds, so every field is optional and
//! loosely typed: numbers may arrive as strings, timestamps in any of four
//! units, boxes with negative or fractional coordinates. Everything here is
//! total; bad values degrade to zero or to the supplied fallback.

use serde_json::{Map, Value};

use crate::models::{BoundingBox, PersonEvent, PersonEventKind, PersonState, TelemetrySnapshot};

/// 2000-01-01T00:00:00Z in Unix milliseconds.
pub const EPOCH_MS_MIN: f64 = 946_684_800_000.0;

/// 2100-01-01T00:00:00Z in Unix milliseconds.
pub const EPOCH_MS_MAX: f64 = 4_102_444_800_000.0;

/// Read a finite number from a JSON number or numeric string.
pub fn finite_number(value: Option<&Value>) -> Option<f64> {
    let n = match value? {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        Value::Bool(b) => f64::from(u8::from(*b)),
        _ => return None,
    };
    n.is_finite().then_some(n)
}

/// Round half up to `decimals` places.
fn round_to(n: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (n * factor + 0.5).floor() / factor
}

/// Clamp to `[0, 100]` and keep one decimal. Missing values become 0.
pub fn clamp_percent(value: Option<&Value>) -> f64 {
    let n = finite_number(value).unwrap_or(0.0);
    round_to(n.clamp(0.0, 100.0), 1)
}

/// Clamp to `[0, 1]` and keep three decimals. Missing values become 0.
pub fn clamp_unit(value: Option<&Value>) -> f64 {
    let n = finite_number(value).unwrap_or(0.0);
    round_to(n.clamp(0.0, 1.0), 3)
}

/// Interpret a timestamp in ms, s, µs or ns by magnitude.
///
/// Anything outside 2000–2100 in every unit, non-positive, or missing
/// returns `fallback`.
pub fn normalize_timestamp_ms(value: Option<&Value>, fallback: i64) -> i64 {
    let Some(n) = finite_number(value) else {
        return fallback;
    };
    if n <= 0.0 {
        return fallback;
    }

    let in_range = |scale: f64| n >= EPOCH_MS_MIN * scale && n <= EPOCH_MS_MAX * scale;
    if in_range(1.0) {
        n.floor() as i64
    } else if in_range(1e-3) {
        (n * 1e3).floor() as i64
    } else if in_range(1e3) {
        (n / 1e3).floor() as i64
    } else if in_range(1e6) {
        (n / 1e6).floor() as i64
    } else {
        fallback
    }
}

fn non_negative_int(value: Option<&Value>) -> u32 {
    // `as` saturates at u32::MAX.
    finite_number(value).unwrap_or(0.0).floor().max(0.0) as u32
}

/// Box coordinates floored and clamped at zero.
pub fn normalize_bbox(value: Option<&Value>) -> BoundingBox {
    let empty = Map::new();
    let obj = value.and_then(Value::as_object).unwrap_or(&empty);
    BoundingBox {
        x: non_negative_int(obj.get("x")),
        y: non_negative_int(obj.get("y")),
        w: non_negative_int(obj.get("w")),
        h: non_negative_int(obj.get("h")),
    }
}

/// Build a snapshot from the payload's `device` object.
pub fn telemetry_from_device(device: &Map<String, Value>) -> TelemetrySnapshot {
    let fixed = |key: &str, decimals: i32| {
        round_to(finite_number(device.get(key)).unwrap_or(0.0), decimals)
    };
    let cpu_core_pct = device
        .get("cpu_core_pct")
        .and_then(Value::as_array)
        .map(|cores| cores.iter().map(|c| clamp_percent(Some(c))).collect())
        .unwrap_or_default();

    TelemetrySnapshot {
        cpu_pct: clamp_percent(device.get("cpu_pct")),
        cpu_core_pct,
        memory_pct: clamp_percent(device.get("mem_pct")),
        storage_pct: clamp_percent(device.get("storage_pct")),
        memory_used_mb: fixed("mem_used_mb", 1),
        memory_total_mb: fixed("mem_total_mb", 1),
        storage_used_gb: fixed("storage_used_gb", 2),
        storage_total_gb: fixed("storage_total_gb", 2),
    }
}

/// Build the current person state from the payload's `person` object.
pub fn person_state(person: &Map<String, Value>, fallback_ts: i64) -> PersonState {
    let bbox = normalize_bbox(person.get("bbox"));
    let flagged = person.get("active").is_some_and(truthy);
    PersonState {
        active: flagged && bbox.has_area(),
        score: clamp_unit(person.get("score")),
        ts: normalize_timestamp_ms(person.get("ts"), fallback_ts),
        bbox,
    }
}

/// Build a person event from one entry of the payload's `events` array.
///
/// Returns `None` for other event types and for boxes without area.
pub fn person_event(event: &Value, fallback_ts: i64) -> Option<PersonEvent> {
    let obj = event.as_object()?;
    let kind = obj.get("type").and_then(Value::as_str).unwrap_or_default();
    if !kind.eq_ignore_ascii_case("person_detected") && !kind.eq_ignore_ascii_case("person") {
        return None;
    }

    let bbox = normalize_bbox(obj.get("bbox"));
    if !bbox.has_area() {
        return None;
    }

    Some(PersonEvent {
        kind: PersonEventKind::PersonDetected,
        ts: normalize_timestamp_ms(obj.get("ts"), fallback_ts),
        score: clamp_unit(obj.get("score")),
        bbox,
    })
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const NOW: i64 = 1_750_000_000_000;

    #[test]
    fn percent_clamps_and_rounds() {
        assert_eq!(clamp_percent(Some(&json!(42.34))), 42.3);
        assert_eq!(clamp_percent(Some(&json!(-5))), 0.0);
        assert_eq!(clamp_percent(Some(&json!(180.2))), 100.0);
        assert_eq!(clamp_percent(Some(&json!("12.26"))), 12.3);
        assert_eq!(clamp_percent(Some(&json!("n/a"))), 0.0);
        assert_eq!(clamp_percent(None), 0.0);
    }

    #[test]
    fn unit_clamps_to_three_decimals() {
        assert_eq!(clamp_unit(Some(&json!(0.12345))), 0.123);
        assert_eq!(clamp_unit(Some(&json!(1.7))), 1.0);
        assert_eq!(clamp_unit(Some(&json!(-0.2))), 0.0);
    }

    #[test]
    fn timestamp_units() {
        let ms = 1_718_000_000_123i64;
        assert_eq!(normalize_timestamp_ms(Some(&json!(ms)), NOW), ms);
        assert_eq!(normalize_timestamp_ms(Some(&json!(1_718_000_000)), NOW), 1_718_000_000_000);
        assert_eq!(normalize_timestamp_ms(Some(&json!(1_718_000_000.5)), NOW), 1_718_000_000_500);
        assert_eq!(
            normalize_timestamp_ms(Some(&json!(1_718_000_000_123_456i64)), NOW),
            ms
        );
        assert_eq!(
            normalize_timestamp_ms(Some(&json!(1_718_000_000_123_456_789i64)), NOW),
            ms
        );
    }

    #[test]
    fn timestamp_fallbacks() {
        assert_eq!(normalize_timestamp_ms(None, NOW), NOW);
        assert_eq!(normalize_timestamp_ms(Some(&json!(0)), NOW), NOW);
        assert_eq!(normalize_timestamp_ms(Some(&json!(-10)), NOW), NOW);
        assert_eq!(normalize_timestamp_ms(Some(&json!(12345)), NOW), NOW);
        assert_eq!(normalize_timestamp_ms(Some(&json!("soon")), NOW), NOW);
    }

    #[test]
    fn bbox_floors_and_clamps() {
        let b = normalize_bbox(Some(&json!({"x": -3, "y": 4.9, "w": "10", "h": 20.2})));
        assert_eq!(b, BoundingBox { x: 0, y: 4, w: 10, h: 20 });
        assert_eq!(normalize_bbox(Some(&json!("garbage"))), BoundingBox::default());
        assert_eq!(normalize_bbox(None), BoundingBox::default());
    }

    #[test]
    fn device_snapshot() {
        let device = json!({
            "cpu_pct": 42.3,
            "cpu_core_pct": [10.04, 120, "x"],
            "mem_pct": 55.56,
            "storage_pct": 12,
            "mem_used_mb": 512.26,
            "mem_total_mb": 1024,
            "storage_used_gb": 3.14159,
            "storage_total_gb": "32"
        });
        let snap = telemetry_from_device(device.as_object().unwrap());
        assert_eq!(snap.cpu_pct, 42.3);
        assert_eq!(snap.cpu_core_pct, vec![10.0, 100.0, 0.0]);
        assert_eq!(snap.memory_pct, 55.6);
        assert_eq!(snap.storage_pct, 12.0);
        assert_eq!(snap.memory_used_mb, 512.3);
        assert_eq!(snap.memory_total_mb, 1024.0);
        assert_eq!(snap.storage_used_gb, 3.14);
        assert_eq!(snap.storage_total_gb, 32.0);
    }

    #[test]
    fn empty_device_is_all_zero() {
        let snap = telemetry_from_device(&Map::new());
        assert_eq!(snap, TelemetrySnapshot::default());
    }

    #[test]
    fn person_without_area_is_inactive() {
        let person = json!({"active": true, "score": 0.8, "bbox": {"x": 1, "y": 1, "w": 0, "h": 9}});
        let state = person_state(person.as_object().unwrap(), NOW);
        assert!(!state.active);
        assert_eq!(state.score, 0.8);
        assert_eq!(state.ts, NOW);
    }

    #[test]
    fn person_active_with_area() {
        let person = json!({"active": 1, "ts": 1_718_000_000, "bbox": {"x": 1, "y": 1, "w": 5, "h": 9}});
        let state = person_state(person.as_object().unwrap(), NOW);
        assert!(state.active);
        assert_eq!(state.ts, 1_718_000_000_000);
    }

    #[test]
    fn person_event_filtering() {
        let ok = json!({"type": "PERSON_DETECTED", "ts": 1_718_000_000_000i64, "score": 0.91,
                        "bbox": {"x": 10, "y": 20, "w": 30, "h": 40}});
        let evt = person_event(&ok, NOW).unwrap();
        assert_eq!(evt.kind, PersonEventKind::PersonDetected);
        assert_eq!(evt.ts, 1_718_000_000_000);
        assert_eq!(evt.score, 0.91);

        let alias = json!({"type": "person", "bbox": {"w": 1, "h": 1}});
        assert_eq!(person_event(&alias, NOW).unwrap().ts, NOW);

        let other = json!({"type": "motion", "bbox": {"w": 1, "h": 1}});
        assert!(person_event(&other, NOW).is_none());

        let flat = json!({"type": "person", "bbox": {"w": 1, "h": 0}});
        assert!(person_event(&flat, NOW).is_none());

        assert!(person_event(&json!("person"), NOW).is_none());
    }
}
