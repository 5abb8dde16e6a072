//! End-to-end turns against the in-memory store and a scripted
//! interpreter: the full Understand → Think → Act → Reply → Summarize
//! path, the quick bypass, rerouted reads, batch persistence, linked-child
//! mutations, and job durability across a simulated disconnect.

use std::sync::Arc;

use serde_json::{json, Value};

use alfred_core::jobs::JobStatus;
use alfred_core::{Alfred, Mode, ScriptedInterpreter, TurnRequest};
use alfred_domain::config::AlfredConfig;
use alfred_tools::store::{EntityStore, MemoryStore};
use alfred_tools::{Filter, FilterOp, ToolGate};

struct Harness {
    alfred: Alfred,
    interp: Arc<ScriptedInterpreter>,
    store: Arc<MemoryStore>,
    _dir: tempfile::TempDir,
}

fn harness() -> Harness {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();

    let dir = tempfile::tempdir().unwrap();
    let interp = Arc::new(ScriptedInterpreter::new());
    let store = Arc::new(MemoryStore::new());
    let alfred = Alfred::new(
        AlfredConfig::default(),
        interp.clone(),
        store.clone(),
        dir.path(),
    )
    .unwrap();
    Harness {
        alfred,
        interp,
        store,
        _dir: dir,
    }
}

fn request(user_id: &str, message: &str, mode: Mode) -> TurnRequest {
    TurnRequest {
        user_id: user_id.into(),
        user_message: message.into(),
        mode,
        ui_changes: vec![],
    }
}

fn understand(processed: &str) -> Value {
    json!({"processed_message": processed})
}

fn read_step(id: &str, table: &str, group: u32) -> Value {
    json!({
        "step_id": id,
        "step_type": "read",
        "subdomain": table,
        "group": group,
        "description": format!("read {table}")
    })
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Scenario: empty pantry
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn empty_pantry_read_is_a_complete_answer() {
    let h = harness();
    h.interp.push(understand("list pantry"));
    h.interp.push(json!({
        "decision": "plan_direct",
        "goal": "show the pantry",
        "steps": [read_step("s1", "pantry_items", 0)]
    }));
    h.interp
        .push(json!({"action": "tool_call", "tool": "db_read", "table": "pantry_items"}));
    h.interp
        .push(json!({"action": "step_complete", "summary": "pantry is empty"}));
    h.interp.push(json!({
        "response": "Your pantry is empty.",
        "next_step": "Want me to start a shopping list?"
    }));

    let result = h
        .alfred
        .run_turn(request("u1", "what is in my pantry?", Mode::Plan))
        .await
        .unwrap();

    assert_eq!(result.response, "Your pantry is empty.");
    assert!(result.active_context.is_empty(), "no refs should be added");

    let record = h.alfred.conversations().get("u1").unwrap();
    assert!(record.registry.is_empty());
    assert_eq!(record.turns.len(), 1);
    let summary = &record.turns[0].execution_summary;
    assert_eq!(summary.steps_completed, 1);
    assert_eq!(summary.steps_total, 1);
    assert_eq!(summary.tools_called, 1);
    assert!(summary.errors.is_empty());
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Scenario: exclude by name
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn exclusion_uses_curation_and_a_positive_list() {
    let h = harness();

    // A prior turn loaded nine recipes.
    let mut record = h.alfred.conversations().load_or_create("u2");
    let labels = [
        "Cod stew",
        "Cod cakes",
        "Lentil soup",
        "Pasta bake",
        "Green curry",
        "Tofu bowls",
        "Cod tacos",
        "Fried rice",
        "Shakshuka",
    ];
    for label in labels {
        let id = uuid::Uuid::new_v4().to_string();
        record.registry.register_read(&id, "recipe", Some(label), 0);
    }
    h.alfred.conversations().upsert(record);

    h.interp.push(json!({
        "processed_message": "skip the cod recipes",
        "entity_curation": {
            "drop_refs": ["recipe_1", "recipe_2", "recipe_7"]
        }
    }));
    let keep = ["recipe_3", "recipe_4", "recipe_5", "recipe_6", "recipe_8", "recipe_9"];
    h.interp.push(json!({
        "decision": "plan_direct",
        "goal": "narrow the candidates",
        "steps": [{
            "step_id": "s1",
            "step_type": "analyze",
            "subdomain": "recipes",
            "group": 0,
            "description": "keep only the non-cod recipes",
            "inputs": keep
        }]
    }));
    h.interp.push(json!({
        "action": "step_complete",
        "summary": "{\"kept\": [\"recipe_3\",\"recipe_4\",\"recipe_5\",\"recipe_6\",\"recipe_8\",\"recipe_9\"]}"
    }));
    h.interp
        .push(json!({"response": "Noted; six recipes remain in play."}));

    let result = h
        .alfred
        .run_turn(request("u2", "skip the cod ones", Mode::Plan))
        .await
        .unwrap();
    assert!(result.response.contains("six"));

    let record = h.alfred.conversations().get("u2").unwrap();
    // Exclusion happened without touching the store and without writes.
    assert_eq!(record.turns[0].execution_summary.tools_called, 0);
    // The refs themselves survive the drop; only their content is evicted.
    assert!(record.registry.resolve("recipe_1").is_some());

    // The plan consumed a positive keep-list, not a negated pattern.
    let requests = h.interp.requests();
    assert!(requests[1].user.contains("recipe_3"));
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Scenario: generate then save
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn generate_then_save_promotes_every_artifact() {
    let h = harness();
    h.interp.push(understand("create and save 3 cod recipes"));
    h.interp.push(json!({
        "decision": "plan_direct",
        "goal": "draft and persist three cod recipes",
        "steps": [
            {
                "step_id": "s1",
                "step_type": "generate",
                "subdomain": "recipes",
                "group": 0,
                "description": "draft three cod recipes"
            },
            {
                "step_id": "s2",
                "step_type": "write",
                "subdomain": "recipes",
                "group": 1,
                "description": "persist the drafts",
                "batch": true,
                "inputs": ["s1"]
            }
        ]
    }));
    h.interp.push(json!({
        "action": "step_complete",
        "summary": "drafted three recipes",
        "artifacts": [
            {"name": "Cod cakes", "servings": 4, "instructions": "Form and fry."},
            {"name": "Miso cod", "servings": 2, "instructions": "Marinate and broil."},
            {"name": "Cod tacos", "servings": 3, "instructions": "Grill and assemble."}
        ]
    }));
    h.interp.push(json!({
        "action": "tool_call",
        "tool": "db_create",
        "table": "recipes",
        "original_refs": ["gen_recipe_1", "gen_recipe_2", "gen_recipe_3"]
    }));
    h.interp
        .push(json!({"action": "step_complete", "summary": "all three saved"}));
    h.interp.push(json!({
        "response": "Saved three cod recipes: Cod cakes, Miso cod, and Cod tacos."
    }));

    let result = h
        .alfred
        .run_turn(request("u3", "create 3 cod recipes and save them", Mode::Plan))
        .await
        .unwrap();
    assert!(result.response.contains("Saved three"));
    assert_eq!(h.store.row_count("recipes"), 3);

    let record = h.alfred.conversations().get("u3").unwrap();
    let summary = &record.turns[0].execution_summary;
    assert_eq!(summary.artifacts_generated.len(), 3);
    assert_eq!(summary.artifacts_saved.len(), 3);
    assert_eq!(summary.steps_completed, 2);

    // Each gen ref promoted to a sibling alias that resolves to the row.
    let registry = &record.registry;
    let sibling = registry.promoted_sibling("gen_recipe_1").unwrap();
    assert_eq!(sibling, "recipe_4");
    assert_eq!(registry.resolve("gen_recipe_1"), registry.resolve("recipe_4"));

    // Reading it back yields the promoted alias, not a new ref.
    let mut registry = record.registry.clone();
    let mut gate = ToolGate::new(&mut registry, h.store.as_ref(), 2);
    let outcome = gate
        .db_read(
            "recipes",
            vec![Filter::new("name", FilterOp::Eq, json!("Cod cakes"))],
        )
        .await;
    assert!(outcome.ok);
    let rows = outcome.rows.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["id"], "recipe_4");
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Scenario: disconnect mid-turn
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn disconnect_does_not_cancel_the_turn() {
    let h = harness();
    h.interp.push(understand("list pantry"));
    h.interp.push(json!({
        "decision": "plan_direct",
        "goal": "show the pantry",
        "steps": [read_step("s1", "pantry_items", 0)]
    }));
    h.interp
        .push(json!({"action": "tool_call", "tool": "db_read", "table": "pantry_items"}));
    h.interp
        .push(json!({"action": "step_complete", "summary": "empty"}));
    h.interp.push(json!({"response": "Your pantry is empty."}));

    let (job_id, rx) = h
        .alfred
        .start_turn(request("u4", "what is in my pantry?", Mode::Plan))
        .unwrap();
    // The client drops right after job_started.
    drop(rx);

    // Poll until the job completes.
    let mut job = None;
    for _ in 0..100 {
        if let Some(j) = h.alfred.poll_job(&job_id) {
            if j.status.is_terminal() {
                job = Some(j);
                break;
            }
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }
    let job = job.expect("job never reached a terminal status");
    assert_eq!(job.status, JobStatus::Complete);
    assert_eq!(job.output.unwrap()["response"], "Your pantry is empty.");

    // Acknowledge: a timestamp, not a status change.
    let acked = h.alfred.ack_job(&job_id).unwrap();
    assert!(acked.acknowledged_at.is_some());
    assert_eq!(acked.status, JobStatus::Complete);
    assert!(h.alfred.ack_job(&job_id).is_err());
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Scenario: show me the recipe (pending artifact)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn pending_artifact_read_is_rerouted_and_shown() {
    let h = harness();

    let mut record = h.alfred.conversations().load_or_create("u5");
    record.registry.register_generated(
        "recipe",
        "Miso cod",
        json!({
            "name": "Miso cod",
            "servings": 2,
            "instructions": "Marinate 30 minutes, broil 8."
        }),
        0,
    );
    h.alfred.conversations().upsert(record);

    h.interp.push(json!({
        "processed_message": "show the generated recipe",
        "entity_mentions": [{
            "raw_text": "that recipe",
            "entity_type": "recipe",
            "resolved_ref": "gen_recipe_1",
            "confidence": "high",
            "resolution": "exact"
        }]
    }));
    h.interp.push(json!({
        "decision": "plan_direct",
        "goal": "show the draft",
        "steps": [read_step("s1", "recipes", 0)]
    }));
    h.interp.push(json!({
        "action": "tool_call",
        "tool": "db_read",
        "table": "recipes",
        "filters": [{"field": "id", "op": "=", "value": "gen_recipe_1"}]
    }));
    h.interp
        .push(json!({"action": "step_complete", "summary": "found the draft"}));
    h.interp.push(json!({
        "response": "Miso cod (generated but not yet saved): marinate 30 minutes, broil 8."
    }));

    let result = h
        .alfred
        .run_turn(request("u5", "show me that recipe", Mode::Plan))
        .await
        .unwrap();

    assert!(result.response.contains("generated but not yet saved"));
    // The store was never touched; the registry answered the read.
    assert_eq!(h.store.row_count("recipes"), 0);

    // Reply's prompt carried the full artifact.
    let reply_request = h.interp.requests().last().unwrap().clone();
    assert!(reply_request.user.contains("Marinate 30 minutes"));
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Scenario: ingredient swap (linked-child mutation)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn ingredient_swap_is_three_child_table_writes() {
    let h = harness();

    let recipe_id = h.store.seed(
        "recipes",
        json!({"name": "Gai lan stir fry", "instructions": "Stir fry the gai lan."}),
    );
    let ingredient_id = h.store.seed(
        "recipe_ingredients",
        json!({"recipe_id": recipe_id, "name": "gai lan", "quantity": 2, "unit": "heads"}),
    );

    let mut record = h.alfred.conversations().load_or_create("u6");
    record
        .registry
        .register_read(&recipe_id, "recipe", Some("Gai lan stir fry"), 0);
    record
        .registry
        .register_read(&ingredient_id, "ingredient", Some("gai lan"), 0);
    h.alfred.conversations().upsert(record);

    h.interp.push(understand("swap gai lan for broccoli"));
    h.interp.push(json!({
        "decision": "plan_direct",
        "goal": "swap the ingredient",
        "steps": [
            {
                "step_id": "s1",
                "step_type": "write",
                "subdomain": "recipe_ingredients",
                "group": 0,
                "description": "remove the gai lan row",
                "inputs": ["ingredient_1"]
            },
            {
                "step_id": "s2",
                "step_type": "write",
                "subdomain": "recipe_ingredients",
                "group": 1,
                "description": "add the broccoli row",
                "inputs": ["recipe_1"]
            },
            {
                "step_id": "s3",
                "step_type": "write",
                "subdomain": "recipes",
                "group": 2,
                "description": "update the instructions to mention broccoli",
                "inputs": ["recipe_1"]
            }
        ]
    }));
    h.interp.push(json!({
        "action": "tool_call",
        "tool": "db_delete",
        "table": "recipe_ingredients",
        "filters": [{"field": "id", "op": "=", "value": "ingredient_1"}]
    }));
    h.interp
        .push(json!({"action": "step_complete", "summary": "gai lan removed"}));
    h.interp.push(json!({
        "action": "tool_call",
        "tool": "db_create",
        "table": "recipe_ingredients",
        "payloads": [{"recipe_id": "recipe_1", "name": "broccoli", "quantity": 2, "unit": "heads"}]
    }));
    h.interp
        .push(json!({"action": "step_complete", "summary": "broccoli added"}));
    h.interp.push(json!({
        "action": "tool_call",
        "tool": "db_update",
        "table": "recipes",
        "filters": [{"field": "id", "op": "=", "value": "recipe_1"}],
        "patch": {"instructions": "Stir fry the broccoli."}
    }));
    h.interp
        .push(json!({"action": "step_complete", "summary": "instructions updated"}));
    h.interp
        .push(json!({"response": "Swapped gai lan for broccoli and updated the steps."}));

    let result = h
        .alfred
        .run_turn(request("u6", "use broccoli instead of gai lan", Mode::Plan))
        .await
        .unwrap();
    assert!(result.response.contains("Swapped"));

    // The child table changed; the parent only got its instructions patch.
    let ingredients = h.store.read("recipe_ingredients", &[]).await.unwrap();
    assert_eq!(ingredients.len(), 1);
    assert_eq!(ingredients[0]["name"], "broccoli");
    assert_eq!(ingredients[0]["recipe_id"], json!(recipe_id));

    let recipes = h.store.read("recipes", &[]).await.unwrap();
    assert_eq!(recipes[0]["instructions"], "Stir fry the broccoli.");

    let record = h.alfred.conversations().get("u6").unwrap();
    let summary = &record.turns[0].execution_summary;
    assert_eq!(summary.entities_deleted, vec!["ingredient_1"]);
    assert_eq!(summary.entities_updated, vec!["recipe_1"]);
    assert_eq!(summary.entities_created.len(), 1);
    assert_eq!(summary.steps_completed, 3);

    // Real identifiers were in play the whole turn; none leaked into a
    // prompt.
    for req in h.interp.requests() {
        assert!(!alfred_context::views::contains_canonical_id(&req.system));
        assert!(!alfred_context::views::contains_canonical_id(&req.user));
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Quick path
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn quick_mode_answers_with_a_single_call() {
    let h = harness();
    h.store.seed("pantry_items", json!({"name": "rice", "quantity": 2, "unit": "kg"}));

    h.interp.push(json!({
        "processed_message": "list pantry",
        "quick_mode": true,
        "quick_mode_confidence": "high"
    }));
    h.interp.push(json!({
        "action": "tool_call",
        "tool": "db_read",
        "table": "pantry_items"
    }));
    h.interp
        .push(json!({"response": "You have 2 kg of rice (saved)."}));

    let result = h
        .alfred
        .run_turn(request("u7", "what's in my pantry?", Mode::Plan))
        .await
        .unwrap();

    assert!(result.response.contains("rice"));
    // Understand, quick, reply: exactly three interpreter calls.
    assert_eq!(h.interp.requests().len(), 3);

    let record = h.alfred.conversations().get("u7").unwrap();
    assert_eq!(record.turns[0].execution_summary.tools_called, 1);
    assert_eq!(record.registry.label("pantry_item_1"), Some("rice"));
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Failure surface
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn partial_linked_write_surfaces_the_gap() {
    let h = harness();
    h.interp.push(understand("save the stew and its parts"));
    h.interp.push(json!({
        "decision": "plan_direct",
        "goal": "create the recipe and its ingredient",
        "steps": [
            {
                "step_id": "s1",
                "step_type": "write",
                "subdomain": "recipes",
                "group": 0,
                "description": "create the parent recipe"
            },
            {
                "step_id": "s2",
                "step_type": "write",
                "subdomain": "recipe_ingredients",
                "group": 1,
                "description": "create the ingredient rows"
            }
        ]
    }));
    h.interp.push(json!({
        "action": "tool_call",
        "tool": "db_create",
        "table": "recipes",
        "payloads": [{"name": "Lentil stew"}]
    }));
    h.interp
        .push(json!({"action": "step_complete", "summary": "parent created"}));
    // The second write points at a ref that does not exist.
    h.interp.push(json!({
        "action": "tool_call",
        "tool": "db_create",
        "table": "recipe_ingredients",
        "payloads": [{"recipe_id": "recipe_99", "name": "lentils"}]
    }));
    h.interp.push(json!({
        "action": "blocked",
        "reason": "the parent ref recipe_99 is unknown",
        "code": "UNKNOWN_REF"
    }));
    h.interp.push(json!({
        "response": "I saved Lentil stew, but could not attach its ingredients."
    }));

    let result = h
        .alfred
        .run_turn(request("u8", "save the stew", Mode::Plan))
        .await
        .unwrap();

    assert!(result.response.contains("could not"));
    // Parent persisted, child did not.
    assert_eq!(h.store.row_count("recipes"), 1);
    assert_eq!(h.store.row_count("recipe_ingredients"), 0);

    let record = h.alfred.conversations().get("u8").unwrap();
    let summary = &record.turns[0].execution_summary;
    assert_eq!(summary.steps_completed, 1);
    assert!(summary.errors.iter().any(|e| e.contains("UNKNOWN_REF")));
}

#[tokio::test]
async fn unsupported_modes_are_rejected_up_front() {
    let h = harness();
    let err = h
        .alfred
        .start_turn(request("u9", "let's cook together", Mode::Cook))
        .unwrap_err();
    assert!(err.to_string().contains("outside the core"));
    // No interpreter call, no job.
    assert_eq!(h.interp.requests().len(), 0);
    assert!(h.alfred.jobs().list_for_user("u9", 10).is_empty());
}

#[tokio::test]
async fn interpreter_outage_fails_the_job_with_a_diagnostic() {
    let h = harness();
    // No scripted responses at all: every node's call fails.
    let err = h
        .alfred
        .run_turn(request("u11", "anything", Mode::Plan))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("interpreter unavailable"));

    let jobs = h.alfred.jobs().list_for_user("u11", 10);
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].status, JobStatus::Failed);
    assert!(jobs[0].error.as_deref().unwrap().contains("interpreter"));

    // Summarize still ran: the turn left an audit record.
    let record = h.alfred.conversations().get("u11").unwrap();
    assert_eq!(record.turns.len(), 1);
    assert!(!record.turns[0].execution_summary.errors.is_empty());
}

#[tokio::test]
async fn propose_waits_for_confirmation() {
    let h = harness();
    h.interp.push(understand("plan a week of dinners"));
    h.interp.push(json!({
        "decision": "propose",
        "goal": "weekly dinner plan",
        "proposal_message": "I can draft five dinners around what you have; confirm and I'll start."
    }));
    h.interp.push(json!({
        "response": "I can draft five dinners around what you have. Shall I go ahead?"
    }));

    let result = h
        .alfred
        .run_turn(request("u10", "plan my week", Mode::Plan))
        .await
        .unwrap();

    assert!(result.response.contains("Shall I go ahead?"));
    let record = h.alfred.conversations().get("u10").unwrap();
    // Nothing executed, nothing written.
    assert_eq!(record.turns[0].execution_summary.tools_called, 0);
    assert_eq!(record.turns[0].execution_summary.steps_total, 0);
}
