//! Short status lines shown to the user while a tool runs.
//!
//! Purely cosmetic. Nothing in the loop depends on the wording.

use serde_json::Value;

/// Human-readable status line for a pending tool invocation.
pub fn preamble_for(name: &str, input: &Value) -> String {
    match name {
        "search_exercises" => {
            let targets = exercise_targets(input);
            if targets.is_empty() {
                "Looking for exercises...".to_string()
            } else {
                format!("Looking for exercises targeting {}...", join_with_and(&targets))
            }
        }
        "get_nutritional_info" => match str_field(input, "ingredient_name") {
            Some(food) => format!("Looking up nutrition info for {food}..."),
            None => "Looking up nutrition info...".to_string(),
        },
        "create_workout_plan" => match str_field(input, "description") {
            Some(plan) => format!("Creating workout plan \"{plan}\"..."),
            None => "Creating a workout plan...".to_string(),
        },
        "add_exercise_to_plan" => {
            match (input.get("sets").and_then(Value::as_u64), input.get("reps").and_then(Value::as_u64)) {
                (Some(sets), Some(reps)) => {
                    format!("Adding {sets}x{reps} to your workout plan...")
                }
                _ => "Adding an exercise to your workout plan...".to_string(),
            }
        }
        "get_latest_activity" => "Fetching your latest activity...".to_string(),
        "get_activities" => match str_field(input, "type") {
            Some(kind) => format!("Fetching your recent {} activities...", kind.to_lowercase()),
            None => "Fetching your recent activities...".to_string(),
        },
        "get_activity_detail" => "Fetching activity details...".to_string(),
        "get_context" => "Checking your saved preferences...".to_string(),
        "set_context" => match str_field(input, "key") {
            Some(key) => format!("Remembering your {key}..."),
            None => "Saving your preference...".to_string(),
        },
        other => format!("Using {}...", other.replace(['_', '-'], " ")),
    }
}

fn str_field<'a>(input: &'a Value, key: &str) -> Option<&'a str> {
    input
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// Muscle targets from `muscle_names` (list) or `muscle_group` (single).
fn exercise_targets(input: &Value) -> Vec<&str> {
    if let Some(names) = input.get("muscle_names").and_then(Value::as_array) {
        return names
            .iter()
            .filter_map(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect();
    }
    str_field(input, "muscle_group").into_iter().collect()
}

/// "A", "A and B", "A, B and C".
fn join_with_and(items: &[&str]) -> String {
    match items {
        [] => String::new(),
        [only] => only.to_string(),
        [init @ .., last] => format!("{} and {last}", init.join(", ")),
    }
}
