use serde_json::Value;

/// Log target for audit events. Route it separately with e.g. `RUST_LOG=audit=info`.
pub const TARGET: &str = "audit";

/// Record a state-changing action by `actor_id` on a target entity.
///
/// Start, escalate and close events are the natural hooks for an external
/// notifier; this module only writes them to the log.
pub fn log(actor_id: i64, action: &str, target_type: &str, target_id: i64, details: Value) {
    let entry = serde_json::json!({
        "actor_id": actor_id,
        "action": action,
        "target_type": target_type,
        "target_id": target_id,
        "details": details,
    });
    log::info!(target: TARGET, "{entry}");
}
