//! The give-item transfer (§4.4): moving an inventory entry between two
//! players' inventories, plus the heuristic fallback that recovers a
//! transfer the LLM described in narration but did not structure.

use turn_types::InventoryItem;

/// Move the first case-insensitive match of `item_name` out of `source`
/// and into `target`, unless it is already present there. Returns `None`
/// (no-op) if `source` does not carry the item (§4.4: "If not present,
/// no-op").
pub fn transfer_item(
	source: &[InventoryItem],
	target: &[InventoryItem],
	item_name: &str,
	source_actor_label: &str,
) -> Option<(Vec<InventoryItem>, Vec<InventoryItem>)> {
	let idx = source.iter().position(|i| i.name.eq_ignore_ascii_case(item_name))?;
	let mut source = source.to_vec();
	let item = source.remove(idx);

	let mut target = target.to_vec();
	let already_present = target.iter().any(|i| i.name.eq_ignore_ascii_case(&item.name));
	if !already_present {
		target.push(InventoryItem {
			name: item.name,
			origin: format!("Received from {source_actor_label}"),
		});
	}
	Some((source, target))
}

const GIVE_VERBS: &[&str] = &["gives", "give", "hands", "hand", "tosses", "toss", "passes", "pass"];
const REFUSAL_PHRASES: &[&str] =
	&["refuses", "declines", "won't take", "does not take", "doesn't take"];

pub struct InferredGiveItem {
	pub item: String,
	pub target_label: String,
}

/// Best-effort recovery when the LLM returned no explicit `give_item` but
/// the narration plausibly describes one (§4.4 "Heuristic fallback").
/// `other_actor_labels` are the names/mentions of every other actor
/// present in the scene, used to find exactly one addressee.
pub fn infer_give_item(
	narration: &str,
	inventory_before: &[InventoryItem],
	inventory_after: &[InventoryItem],
	other_actor_labels: &[String],
) -> Option<InferredGiveItem> {
	if inventory_before.len() != inventory_after.len() + 1 {
		return None;
	}
	let missing: Vec<&InventoryItem> = inventory_before
		.iter()
		.filter(|before| !inventory_after.iter().any(|after| after.name.eq_ignore_ascii_case(&before.name)))
		.collect();
	let [item] = missing.as_slice() else { return None };

	let lower = narration.to_lowercase();
	if !GIVE_VERBS.iter().any(|verb| lower.contains(verb)) {
		return None;
	}
	if REFUSAL_PHRASES.iter().any(|phrase| lower.contains(phrase)) {
		return None;
	}

	let mentioned: Vec<&String> =
		other_actor_labels.iter().filter(|label| lower.contains(&label.to_lowercase())).collect();
	let [target] = mentioned.as_slice() else { return None };

	Some(InferredGiveItem { item: item.name.clone(), target_label: (*target).clone() })
}

#[cfg(test)]
mod tests {
	use super::*;

	fn item(name: &str) -> InventoryItem {
		InventoryItem { name: name.to_string(), origin: "test".to_string() }
	}

	#[test]
	fn transfer_pops_case_insensitive_match() {
		let source = vec![item("Rusty Key")];
		let (source_after, target_after) = transfer_item(&source, &[], "rusty key", "Alice").unwrap();
		assert!(source_after.is_empty());
		assert_eq!(target_after[0].name, "Rusty Key");
		assert_eq!(target_after[0].origin, "Received from Alice");
	}

	#[test]
	fn transfer_is_noop_when_item_absent() {
		let source = vec![item("Torch")];
		assert!(transfer_item(&source, &[], "rusty key", "Alice").is_none());
	}

	#[test]
	fn transfer_does_not_duplicate_existing_target_item() {
		let source = vec![item("Torch")];
		let target = vec![item("torch")];
		let (_, target_after) = transfer_item(&source, &target, "torch", "Alice").unwrap();
		assert_eq!(target_after.len(), 1);
	}

	#[test]
	fn infers_transfer_from_narration() {
		let before = vec![item("Torch"), item("Rusty Key")];
		let after = vec![item("Torch")];
		let others = vec!["Bob".to_string()];
		let inferred =
			infer_give_item("Alice hands the rusty key to Bob.", &before, &after, &others).unwrap();
		assert_eq!(inferred.item, "Rusty Key");
		assert_eq!(inferred.target_label, "Bob");
	}

	#[test]
	fn refusal_phrase_blocks_inference() {
		let before = vec![item("Torch"), item("Rusty Key")];
		let after = vec![item("Torch")];
		let others = vec!["Bob".to_string()];
		assert!(infer_give_item(
			"Alice offers the rusty key, but Bob refuses it.",
			&before,
			&after,
			&others
		)
		.is_none());
	}

	#[test]
	fn ambiguous_addressee_blocks_inference() {
		let before = vec![item("Torch"), item("Rusty Key")];
		let after = vec![item("Torch")];
		let others = vec!["Bob".to_string(), "Carol".to_string()];
		assert!(infer_give_item("Alice hands the key over.", &before, &after, &others).is_none());
	}
}
