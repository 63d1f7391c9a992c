//! Console integration tests against the in-memory engine.
//!
//! Inventory used throughout:
//! - `A` (`base:1`) is a root with children `B` (untagged) and `D` (`tool:1`)
//! - `C` (`app:1`) is built on `B`
//! - `E` (`other:1`) stands alone

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::sync::Arc;

use berth_common::error::BerthError;
use berth_common::launch::LaunchSpec;
use berth_common::types::{ContainerId, ContainerRecord, ImageId, ImageRecord, ListScope};
use berth_engine::client::EngineClient;
use berth_engine::client::memory::MemoryEngine;
use berth_engine::console::Console;
use berth_engine::outcome::{StepAction, StepStatus};

const A: &str = "sha256:aaaa0001";
const B: &str = "sha256:bbbb0002";
const C: &str = "sha256:cccc0003";
const D: &str = "sha256:dddd0004";
const E: &str = "sha256:eeee0005";

fn image(id: &str, parent: Option<&str>, tag: Option<&str>) -> ImageRecord {
    let mut record = ImageRecord::new(id, parent);
    record.repo_tags = tag.map(|t| vec![t.to_string()]).unwrap_or_default();
    record
}

fn container(id: &str, image_id: &str, name: &str) -> ContainerRecord {
    let mut record = ContainerRecord::new(id, image_id);
    record.name = name.to_string();
    record
}

fn inventory(containers: Vec<ContainerRecord>) -> Arc<MemoryEngine> {
    Arc::new(MemoryEngine::from_snapshot(
        vec![
            image(A, None, Some("base:1")),
            image(B, Some(A), None),
            image(C, Some(B), Some("app:1")),
            image(D, Some(A), Some("tool:1")),
            image(E, None, Some("other:1")),
        ],
        containers,
    ))
}

fn remaining_images(engine: &MemoryEngine) -> Vec<String> {
    engine
        .images()
        .expect("images")
        .into_iter()
        .map(|i| i.id.to_string())
        .collect()
}

// ── Listing and resolution ───────────────────────────────────────────

#[test]
fn listings_follow_scope() {
    let engine = inventory(vec![
        container("c1111111", C, "web").running_with_pid(11),
        container("c2222222", E, "batch"),
    ]);
    let console = Console::new(engine);

    assert_eq!(console.containers(ListScope::Active).expect("ps").len(), 1);
    assert_eq!(console.containers(ListScope::All).expect("ps -a").len(), 2);
    assert_eq!(console.images(ListScope::Active).expect("images").len(), 4);
    assert_eq!(console.images(ListScope::All).expect("images -a").len(), 5);
}

#[test]
fn image_resolves_by_tag_or_unique_prefix() {
    let console = Console::new(inventory(Vec::new()));
    assert_eq!(console.resolve_image("app:1").expect("tag"), ImageId::new(C));
    assert_eq!(console.resolve_image("bbbb").expect("prefix"), ImageId::new(B));
    assert_eq!(
        console.resolve_image("sha256:dddd").expect("full prefix"),
        ImageId::new(D)
    );
}

#[test]
fn image_resolution_errors() {
    let console = Console::new(inventory(Vec::new()));
    assert!(matches!(
        console.resolve_image("bb"),
        Err(BerthError::Config { .. })
    ));
    assert!(console.resolve_image("ffff").unwrap_err().is_not_found());

    let err = console.resolve_image("sha256:").unwrap_err();
    assert!(err.to_string().contains("ambiguous"));
}

#[test]
fn container_resolves_by_name_or_prefix() {
    let console = Console::new(inventory(vec![
        container("c1111111", C, "web"),
        container("c1112222", C, "db"),
    ]));
    assert_eq!(
        console.resolve_container("db").expect("name").id,
        ContainerId::new("c1112222")
    );
    assert_eq!(
        console.resolve_container("c1111").expect("prefix").name,
        "web"
    );
    assert!(console.resolve_container("c111").is_err());
    assert!(console.resolve_container("zzzz").unwrap_err().is_not_found());
}

#[test]
fn image_exists_by_tag_prefix() {
    let console = Console::new(inventory(Vec::new()));
    assert!(console.image_exists_by_name("app").expect("lookup"));
    assert!(console.image_exists_by_name("tool:1").expect("lookup"));
    assert!(!console.image_exists_by_name("nginx").expect("lookup"));
}

// ── Planning ─────────────────────────────────────────────────────────

#[test]
fn plan_for_root_lists_descendants_first() {
    let console = Console::new(inventory(Vec::new()));
    let plan = console.plan_deletion("base:1").expect("plan");
    let ids: Vec<&str> = plan.images.iter().map(ImageId::as_str).collect();
    assert_eq!(ids, vec![C, D, B, A]);
    assert!(plan.containers.is_empty());
}

#[test]
fn plan_sees_stopped_containers_on_grandchildren() {
    let console = Console::new(inventory(vec![
        container("c1111111", C, "web"),
        container("c2222222", E, "batch"),
    ]));
    let plan = console.plan_deletion("aaaa").expect("plan");
    assert_eq!(plan.containers.len(), 1);
    assert_eq!(plan.containers[0].name, "web");
    assert!(plan.requires_container_removal());
}

#[test]
fn plan_for_unknown_image_is_not_found() {
    let console = Console::new(inventory(Vec::new()));
    assert!(console.plan_deletion("missing:1").unwrap_err().is_not_found());
}

// ── Execution ────────────────────────────────────────────────────────

#[test]
fn executing_plan_stops_removes_then_deletes() {
    let engine = inventory(vec![
        container("c1111111", C, "web").running_with_pid(11),
        container("c3333333", D, "tools"),
        container("c2222222", E, "batch"),
    ]);
    let console = Console::new(engine.clone());
    let plan = console.plan_deletion("base:1").expect("plan");
    let report = console.execute_plan(&plan);

    assert!(report.succeeded(), "{:?}", report.steps);
    assert_eq!(report.steps_for(StepAction::StopContainer).count(), 1);
    assert_eq!(report.steps_for(StepAction::RemoveContainer).count(), 2);
    assert_eq!(report.steps_for(StepAction::RemoveImage).count(), 4);

    let first_image = report
        .steps
        .iter()
        .position(|s| s.action == StepAction::RemoveImage)
        .expect("image step");
    assert!(
        report.steps[..first_image]
            .iter()
            .all(|s| s.action != StepAction::RemoveImage)
    );

    assert_eq!(remaining_images(&engine), vec![E]);
    let left: Vec<String> = engine
        .containers()
        .expect("containers")
        .into_iter()
        .map(|c| c.name)
        .collect();
    assert_eq!(left, vec!["batch"]);
}

#[test]
fn failed_stop_skips_removal_and_images() {
    let engine = inventory(vec![container("c1111111", C, "web").running_with_pid(11)]);
    engine.fail_on("stop_container", "c1111111").expect("inject");
    let console = Console::new(engine.clone());

    let plan = console.plan_deletion("app:1").expect("plan");
    let report = console.execute_plan(&plan);

    assert!(!report.succeeded());
    assert_eq!(report.failures().count(), 1);
    let removal = report
        .steps_for(StepAction::RemoveContainer)
        .next()
        .expect("removal step");
    assert!(matches!(removal.status, StepStatus::Skipped { .. }));
    assert!(
        report
            .steps_for(StepAction::RemoveImage)
            .all(|s| matches!(s.status, StepStatus::Skipped { .. }))
    );
    assert_eq!(remaining_images(&engine).len(), 5);
}

#[test]
fn failed_container_removal_skips_images() {
    let engine = inventory(vec![container("c1111111", C, "web")]);
    engine.fail_on("remove_container", "c1111111").expect("inject");
    let console = Console::new(engine.clone());

    let report = console.execute_plan(&console.plan_deletion("app:1").expect("plan"));
    assert_eq!(report.failures().count(), 1);
    let image_step = report
        .steps_for(StepAction::RemoveImage)
        .next()
        .expect("image step");
    assert_eq!(image_step.target, C);
    assert!(matches!(image_step.status, StepStatus::Skipped { .. }));
}

#[test]
fn engine_conflict_is_reported_per_image() {
    let engine = inventory(Vec::new());
    let console = Console::new(engine.clone());
    let plan = console.plan_deletion("bbbb").expect("plan");

    // Appears between planning and execution.
    let late = LaunchSpec {
        image: "app:1".into(),
        name: Some("late".into()),
        ..LaunchSpec::default()
    };
    let _ = engine.create_container(&late).expect("create");

    let report = console.execute_plan(&plan);
    let failures: Vec<&str> = report.failures().map(|s| s.target.as_str()).collect();
    assert_eq!(failures, vec![C, B]);
    assert!(report.failures().all(|s| s.to_string().contains("in use")));
    assert_eq!(remaining_images(&engine).len(), 5);
}

#[test]
fn parent_pruned_by_engine_is_reported_as_skipped() {
    let engine = Arc::new(
        MemoryEngine::from_snapshot(
            vec![
                image(A, None, Some("base:1")),
                image(B, Some(A), None),
                image(C, Some(B), Some("app:1")),
                image(D, Some(A), Some("tool:1")),
                image(E, None, Some("other:1")),
            ],
            Vec::new(),
        )
        .with_pruning(),
    );
    let console = Console::new(engine.clone());
    let report = console.execute_plan(&console.plan_deletion("base:1").expect("plan"));

    assert!(report.succeeded(), "{:?}", report.steps);
    let statuses: Vec<(&str, bool)> = report
        .steps_for(StepAction::RemoveImage)
        .map(|s| {
            (
                s.target.as_str(),
                matches!(&s.status, StepStatus::Skipped { reason } if reason == "already removed"),
            )
        })
        .collect();
    assert_eq!(
        statuses,
        vec![(C, false), (D, false), (B, true), (A, false)]
    );
    assert_eq!(remaining_images(&engine), vec![E]);
}

// ── Fan-out ──────────────────────────────────────────────────────────

#[test]
fn start_all_skips_running_containers() {
    let engine = inventory(vec![
        container("c1111111", C, "web").running_with_pid(11),
        container("c2222222", E, "batch"),
        container("c3333333", D, "tools"),
    ]);
    let console = Console::new(engine.clone());
    let ids: Vec<ContainerId> = ["c1111111", "c2222222", "c3333333"]
        .into_iter()
        .map(ContainerId::new)
        .collect();

    let report = console.start_all(&ids).expect("start");
    assert!(report.succeeded());
    assert_eq!(report.steps.len(), 3);
    let skipped = report
        .steps
        .iter()
        .filter(|s| matches!(s.status, StepStatus::Skipped { .. }))
        .count();
    assert_eq!(skipped, 1);
    assert!(engine.containers().expect("containers").iter().all(|c| c.running));
}

#[test]
fn stop_all_reports_each_container() {
    let engine = inventory(vec![
        container("c1111111", C, "web").running_with_pid(11),
        container("c2222222", E, "batch").running_with_pid(12),
    ]);
    engine.fail_on("stop_container", "c2222222").expect("inject");
    let console = Console::new(engine.clone());

    let ids = vec![
        ContainerId::new("c1111111"),
        ContainerId::new("c2222222"),
        ContainerId::new("c9999999"),
    ];
    let report = console.stop_all(&ids).expect("stop");
    assert_eq!(report.steps.len(), 3);
    assert_eq!(report.failures().count(), 2);

    let running: Vec<String> = engine
        .containers()
        .expect("containers")
        .into_iter()
        .filter(|c| c.running)
        .map(|c| c.name)
        .collect();
    assert_eq!(running, vec!["batch"]);
}

#[test]
fn remove_containers_refuses_running() {
    let engine = inventory(vec![
        container("c1111111", C, "web").running_with_pid(11),
        container("c2222222", E, "batch"),
    ]);
    let console = Console::new(engine);
    let report =
        console.remove_containers(&[ContainerId::new("c1111111"), ContainerId::new("c2222222")]);
    let failed: Vec<&str> = report.failures().map(|s| s.label.as_str()).collect();
    assert_eq!(failed, vec!["c1111111"]);
}

// ── Inspection and dry runs ──────────────────────────────────────────

#[test]
fn pid_only_for_running_containers() {
    let console = Console::new(inventory(vec![
        container("c1111111", C, "web").running_with_pid(4242),
        container("c2222222", E, "batch"),
    ]));
    assert_eq!(console.pid_of(&ContainerId::new("c1111111")).expect("pid"), 4242);
    assert!(matches!(
        console.pid_of(&ContainerId::new("c2222222")),
        Err(BerthError::Config { .. })
    ));
}

#[test]
fn dry_run_leaves_engine_untouched() {
    let engine = inventory(vec![container("c1111111", C, "web").running_with_pid(11)]);
    let console = Console::new(engine.clone());

    let rehearsal = console.dry_run().expect("dry run");
    let plan = rehearsal.plan_deletion("base:1").expect("plan");
    let report = rehearsal.execute_plan(&plan);
    assert!(report.succeeded());
    assert_eq!(rehearsal.images(ListScope::All).expect("images").len(), 1);

    assert_eq!(remaining_images(&engine).len(), 5);
    assert!(engine.containers().expect("containers")[0].running);
}
