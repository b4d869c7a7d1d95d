//! Pure JSON-document transforms: the generic shallow-merge patch, the
//! calendar normalization, inventory normalization, and give-item
//! normalization/inference (§4.3, §4.4). None of these functions touch a
//! `Store` — they are unit- and property-tested directly.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use turn_types::InventoryItem;

/// The calendar `description` cap (§4.3).
pub const CALENDAR_DESCRIPTION_MAX_CHARS: usize = 200;
/// Calendar list size cap (§4.3: "keep last 10").
const CALENDAR_MAX_ENTRIES: usize = 10;
/// Cap on an `origin` string inferred from narration (§4.3).
const ORIGIN_FROM_NARRATION_MAX_CHARS: usize = 120;

/// Shallow-merge `patch` onto `base`: a `null` value removes the key,
/// anything else replaces it wholesale (§4.3). Nested objects are never
/// deep-merged.
pub fn apply_patch(base: &Map<String, Value>, patch: &Map<String, Value>) -> Map<String, Value> {
	let mut result = base.clone();
	for (key, value) in patch {
		if value.is_null() {
			result.remove(key);
		} else {
			result.insert(key.clone(), value.clone());
		}
	}
	result
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalendarEvent {
	pub name: String,
	pub fire_day: i64,
	pub description: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub created_day: Option<i64>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub created_hour: Option<i64>,
}

const CALENDAR_KEY: &str = "calendar";

fn read_calendar(state: &Map<String, Value>) -> Vec<CalendarEvent> {
	state
		.get(CALENDAR_KEY)
		.and_then(|v| serde_json::from_value(v.clone()).ok())
		.unwrap_or_default()
}

fn write_calendar(state: &mut Map<String, Value>, calendar: Vec<CalendarEvent>) {
	state.insert(
		CALENDAR_KEY.to_string(),
		serde_json::to_value(calendar).expect("calendar events are always serializable"),
	);
}

/// The campaign's notion of "today", derived from whatever the calendar
/// entries themselves already carry. The core has no independent day
/// counter; `current_day`/`current_hour` are read from `state` directly by
/// callers that track them (outside this function's concern) — here we
/// accept them as parameters since `apply_calendar_update` is pure.
pub fn apply_calendar_update(
	state: &Map<String, Value>,
	update: Option<&turn_ports::CalendarUpdate>,
	current_day: i64,
	current_hour: i64,
) -> Map<String, Value> {
	let Some(update) = update else {
		return state.clone();
	};

	let mut calendar = read_calendar(state);

	if !update.remove.is_empty() {
		let remove_lower: Vec<String> = update.remove.iter().map(|s| s.to_lowercase()).collect();
		calendar.retain(|e| !remove_lower.contains(&e.name.to_lowercase()));
	}

	if !update.add.is_empty() {
		for add in &update.add {
			let fire_day = resolve_fire_day(add, current_day, current_hour);
			calendar.push(CalendarEvent {
				name: add.name.clone(),
				fire_day,
				description: truncate_chars(&add.description, CALENDAR_DESCRIPTION_MAX_CHARS),
				created_day: Some(current_day),
				created_hour: Some(current_hour),
			});
		}
		calendar = dedupe_by_name_keep_latest(calendar);
	}

	if calendar.len() > CALENDAR_MAX_ENTRIES {
		let drop = calendar.len() - CALENDAR_MAX_ENTRIES;
		calendar.drain(0..drop);
	}

	let mut result = state.clone();
	write_calendar(&mut result, calendar);
	result
}

fn resolve_fire_day(add: &turn_ports::CalendarEventAdd, current_day: i64, current_hour: i64) -> i64 {
	if let Some(fire_day) = add.fire_day {
		return fire_day.max(1);
	}
	let remaining = add.time_remaining.unwrap_or(0);
	let fire_day = match add.time_unit {
		Some(turn_ports::TimeUnit::Hours) => current_day + (current_hour + remaining) / 24,
		_ => current_day + remaining,
	};
	fire_day.max(1)
}

fn dedupe_by_name_keep_latest(entries: Vec<CalendarEvent>) -> Vec<CalendarEvent> {
	let mut seen = std::collections::HashSet::new();
	let mut kept_reversed = Vec::with_capacity(entries.len());
	for entry in entries.into_iter().rev() {
		let key = entry.name.to_lowercase();
		if seen.insert(key) {
			kept_reversed.push(entry);
		}
	}
	kept_reversed.reverse();
	kept_reversed
}

fn truncate_chars(s: &str, max_chars: usize) -> String {
	s.chars().take(max_chars).collect()
}

/// Derive an `origin` string for an inventory item added via `inventory_add`
/// with no explicit origin: the first sentence of `narration`, capped at
/// 120 characters (§4.3).
pub fn origin_from_narration(narration: &str) -> String {
	let first_sentence = narration.split(['.', '!', '?']).next().unwrap_or(narration).trim();
	truncate_chars(first_sentence, ORIGIN_FROM_NARRATION_MAX_CHARS)
}

/// Apply `inventory_add`/`inventory_remove` to an existing inventory list,
/// deduplicating case-insensitively (§4.3).
pub fn apply_inventory_delta(
	existing: &[InventoryItem],
	add: &[String],
	remove: &[String],
	narration: &str,
) -> Vec<InventoryItem> {
	let mut items = existing.to_vec();

	if !remove.is_empty() {
		let remove_lower: Vec<String> = remove.iter().map(|s| s.to_lowercase()).collect();
		items.retain(|item| !remove_lower.contains(&item.name.to_lowercase()));
	}

	for name in add {
		let already_present = items.iter().any(|item| item.name.to_lowercase() == name.to_lowercase());
		if !already_present {
			items.push(InventoryItem { name: name.clone(), origin: origin_from_narration(narration) });
		}
	}

	dedupe_inventory(items)
}

fn dedupe_inventory(items: Vec<InventoryItem>) -> Vec<InventoryItem> {
	let mut seen = std::collections::HashSet::new();
	let mut result = Vec::with_capacity(items.len());
	for item in items {
		if seen.insert(item.name.to_lowercase()) {
			result.push(item);
		}
	}
	result
}

#[cfg(test)]
mod tests {
	use super::*;
	use proptest::prelude::*;
	use serde_json::json;

	#[test]
	fn apply_patch_removes_null_keys() {
		let base = Map::from_iter([("a".to_string(), json!(1)), ("b".to_string(), json!(2))]);
		let patch = Map::from_iter([("a".to_string(), Value::Null), ("c".to_string(), json!(3))]);
		let result = apply_patch(&base, &patch);
		assert_eq!(result.get("a"), None);
		assert_eq!(result.get("b"), Some(&json!(2)));
		assert_eq!(result.get("c"), Some(&json!(3)));
	}

	#[test]
	fn apply_patch_replaces_nested_objects_wholesale() {
		let base = Map::from_iter([("room".to_string(), json!({"name": "hall", "lit": true}))]);
		let patch = Map::from_iter([("room".to_string(), json!({"name": "hall"}))]);
		let result = apply_patch(&base, &patch);
		assert_eq!(result.get("room"), Some(&json!({"name": "hall"})));
	}

	#[test]
	fn calendar_add_resolves_relative_days() {
		let state = Map::new();
		let update = turn_ports::CalendarUpdate {
			add: vec![turn_ports::CalendarEventAdd {
				name: "Eclipse".to_string(),
				description: "A dark omen".to_string(),
				fire_day: None,
				time_remaining: Some(2),
				time_unit: Some(turn_ports::TimeUnit::Days),
			}],
			remove: vec![],
		};
		let result = apply_calendar_update(&state, Some(&update), 5, 0);
		let calendar = read_calendar(&result);
		assert_eq!(calendar.len(), 1);
		assert_eq!(calendar[0].fire_day, 7);
	}

	#[test]
	fn calendar_caps_at_ten_entries() {
		let mut state = Map::new();
		let seeded: Vec<CalendarEvent> = (0..12)
			.map(|i| CalendarEvent {
				name: format!("event-{i}"),
				fire_day: i,
				description: String::new(),
				created_day: None,
				created_hour: None,
			})
			.collect();
		write_calendar(&mut state, seeded);
		let result = apply_calendar_update(&state, None, 0, 0);
		assert_eq!(read_calendar(&result).len(), 10);
	}

	#[test]
	fn inventory_delta_dedupes_case_insensitively() {
		let existing = vec![InventoryItem { name: "Torch".to_string(), origin: "found it".to_string() }];
		let result = apply_inventory_delta(&existing, &["torch".to_string()], &[], "You grab a torch.");
		assert_eq!(result.len(), 1);
	}

	#[test]
	fn inventory_delta_removes_case_insensitively() {
		let existing = vec![InventoryItem { name: "Torch".to_string(), origin: "found it".to_string() }];
		let result = apply_inventory_delta(&existing, &[], &["TORCH".to_string()], "");
		assert!(result.is_empty());
	}

	proptest! {
		#[test]
		fn apply_patch_never_panics(keys in proptest::collection::vec("[a-z]{1,5}", 0..8)) {
			let mut base = Map::new();
			let mut patch = Map::new();
			for (i, key) in keys.iter().enumerate() {
				base.insert(key.clone(), json!(i));
				if i % 2 == 0 {
					patch.insert(key.clone(), Value::Null);
				} else {
					patch.insert(key.clone(), json!(i * 2));
				}
			}
			let _ = apply_patch(&base, &patch);
		}

		#[test]
		fn calendar_never_exceeds_cap(names in proptest::collection::vec("[a-z]{1,8}", 0..20)) {
			let state = Map::new();
			let update = turn_ports::CalendarUpdate {
				add: names.into_iter().map(|name| turn_ports::CalendarEventAdd {
					name,
					description: String::new(),
					fire_day: Some(1),
					time_remaining: None,
					time_unit: None,
				}).collect(),
				remove: vec![],
			};
			let result = apply_calendar_update(&state, Some(&update), 1, 0);
			prop_assert!(read_calendar(&result).len() <= CALENDAR_MAX_ENTRIES);
		}
	}
}
