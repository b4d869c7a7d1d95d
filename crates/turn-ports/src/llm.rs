use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A calendar-add entry inside `StateUpdate::calendar_update` (§4.3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalendarEventAdd {
	pub name: String,
	pub description: String,
	/// Exactly one of `fire_day` or `time_remaining`+`time_unit` is
	/// expected; `apply_calendar_update` resolves either into an absolute
	/// `fire_day`.
	pub fire_day: Option<i64>,
	pub time_remaining: Option<i64>,
	pub time_unit: Option<TimeUnit>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeUnit {
	Days,
	Hours,
}

/// The calendar portion of `state_update`, handled specially by
/// `apply_calendar_update` rather than the generic shallow merge (§4.3).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CalendarUpdate {
	#[serde(default)]
	pub add: Vec<CalendarEventAdd>,
	#[serde(default)]
	pub remove: Vec<String>,
}

/// The raw `state_update` map from the LLM. `calendar_update`, if present,
/// is pulled out and routed to `apply_calendar_update`; everything else is
/// shallow-merged via `apply_patch` (§4.2 step C.4).
#[derive(Debug, Clone, Default)]
pub struct StateUpdate {
	pub fields: Map<String, Value>,
	pub calendar_update: Option<CalendarUpdate>,
}

/// `llm.timer_instruction` (§4.2 step C.10, §6.1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimerInstruction {
	pub delay_seconds: i64,
	pub event_text: String,
	pub interruptible: bool,
	pub interrupt_action: Option<String>,
}

/// `llm.give_item` (§4.4, §6.1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GiveItemRequest {
	pub item: String,
	pub to_actor_id: Option<String>,
	pub to_discord_mention: Option<String>,
}

/// `player_state_update`'s inventory-affecting fields, layered on top of
/// the generic shallow merge (§4.3 Inventory normalization).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlayerStateUpdate {
	#[serde(default)]
	pub fields: Map<String, Value>,
	#[serde(default)]
	pub inventory_add: Vec<String>,
	#[serde(default)]
	pub inventory_remove: Vec<String>,
}

/// The full structured response from the LLM for one turn (§6.1).
#[derive(Debug, Clone)]
pub struct LlmTurnOutput {
	pub narration: String,
	pub state_update: StateUpdate,
	pub summary_update: Option<String>,
	pub xp_awarded: i64,
	pub player_state_update: PlayerStateUpdate,
	pub scene_image_prompt: Option<String>,
	pub timer_instruction: Option<TimerInstruction>,
	pub character_updates: Map<String, Value>,
	pub give_item: Option<GiveItemRequest>,
}
