//! Lock-File Emitter: turns a validated, merged front-matter head
//! plus its resolved action pins into the deterministic CI workflow YAML
//! document, written via write-then-atomic-rename so a crash mid-write
//! never leaves a half-written lock file at the conventional path.

use std::io::Write as _;
use std::path::Path;

use aw_types::error::AwError;
use aw_types::lock::{
    ACTIVATION_JOB, AGENT_JOB, ConcurrencyBlock, Job, LockFile, LockHeaderShadow, OnBlock,
    PinAnnotation, Step,
};
use aw_types::pin::ActionPin;
use aw_types::workflow::{MergedFrontMatter, SandboxAgent, WorkflowHead, WorkflowId};
use indexmap::IndexMap;

use crate::safeoutputs::{self, SafeOutputJobSpec};

/// A custom job declared by the workflow author, passed through from the
/// body/front-matter verbatim aside from `needs` rewiring relative to
/// `activation`/`agent`.
#[derive(Debug, Clone)]
pub struct CustomJob {
    pub name: String,
    pub job: Job,
    /// Whether this job must complete before `agent` runs (a pre-gate) or
    /// after it.
    pub runs_before_agent: bool,
}

pub struct EmitInput<'a> {
    pub workflow_id: WorkflowId,
    pub source_path: &'a Path,
    pub engine_id: &'a str,
    pub merged: &'a MergedFrontMatter,
    pub pins: &'a [ActionPin],
    pub custom_jobs: &'a [CustomJob],
    pub custom_steps_include_checkout: bool,
}

/// Build the in-memory [`LockFile`] plus the annotations the post-process
/// pass needs to append version comments. Does not touch the filesystem.
pub fn build(input: &EmitInput<'_>) -> Result<(LockFile, Vec<PinAnnotation>), AwError> {
    let head = &input.merged.head;

    let on = build_on_block(head);
    let permissions = build_permissions_block(head);
    let concurrency = Some(build_concurrency(&input.workflow_id, head));
    let env: IndexMap<String, String> = head.env.clone().into_iter().collect();

    let mut jobs = IndexMap::new();
    let (pre_gate_names, post_gate_jobs): (Vec<&CustomJob>, Vec<&CustomJob>) = (
        input.custom_jobs.iter().filter(|j| j.runs_before_agent).collect(),
        input.custom_jobs.iter().filter(|j| !j.runs_before_agent).collect(),
    );

    jobs.insert(ACTIVATION_JOB.to_string(), build_activation_job(head));

    for job in &pre_gate_names {
        jobs.insert(job.name.clone(), job.job.clone());
    }

    let mut agent_needs = vec![ACTIVATION_JOB.to_string()];
    agent_needs.extend(pre_gate_names.iter().map(|j| j.name.clone()));

    let wants_checkout = input.custom_steps_include_checkout
        || requires_checkout(head, input.custom_steps_include_checkout);
    let checkout_pin = input
        .pins
        .iter()
        .find(|pin| pin.reference.repo == "actions/checkout");
    jobs.insert(
        AGENT_JOB.to_string(),
        build_agent_job(head, agent_needs, wants_checkout, input.engine_id, checkout_pin),
    );

    let safe_output_specs = safeoutputs::configure(head);
    for spec in &safe_output_specs {
        jobs.insert(spec.job_name.clone(), build_safe_output_job(spec));
    }

    for job in &post_gate_jobs {
        jobs.insert(job.name.clone(), job.job.clone());
    }

    let lock = LockFile {
        on,
        permissions,
        concurrency,
        env,
        jobs,
        header: LockHeaderShadow {
            workflow_id: Some(input.workflow_id.clone()),
        },
    };

    let annotations = input
        .pins
        .iter()
        .map(|pin| PinAnnotation {
            bare_reference: format!("{}@{}", pin.reference.repo, pin.sha),
            version_comment: pin.resolved_version.clone(),
        })
        .collect();

    Ok((lock, annotations))
}

fn build_permissions_block(head: &WorkflowHead) -> IndexMap<String, String> {
    let mut out = IndexMap::new();
    for (resource, level) in &head.permissions.0 {
        let rendered = match level {
            aw_types::workflow::PermissionLevel::None => "none",
            aw_types::workflow::PermissionLevel::Read => "read",
            aw_types::workflow::PermissionLevel::Write => "write",
        };
        out.insert(resource.clone(), rendered.to_string());
    }
    out
}

/// Derive the concurrency key deterministically from the workflow id when
/// the author didn't supply an explicit expression: stable across
/// recompiles, which the determinism property requires.
fn build_concurrency(workflow_id: &WorkflowId, head: &WorkflowHead) -> ConcurrencyBlock {
    let group = head.concurrency.clone().unwrap_or_else(|| {
        if head.on.command.is_some() {
            format!("aw-{}-${{{{ github.event.issue.number || github.event.pull_request.number }}}}", workflow_id.0)
        } else {
            format!("aw-{}", workflow_id.0)
        }
    });
    ConcurrencyBlock {
        group,
        cancel_in_progress: true,
    }
}

/// Expand `on.command` into its event-specific form, collapsing to a single
/// event when the command is the workflow's only trigger.
fn build_on_block(head: &WorkflowHead) -> OnBlock {
    let mut out: IndexMap<String, serde_yaml::Value> = IndexMap::new();
    let triggers = &head.on;

    if let Some(filter) = &triggers.issues {
        out.insert("issues".to_string(), event_filter_value(filter));
    }
    if let Some(filter) = &triggers.issue_comment {
        out.insert("issue_comment".to_string(), event_filter_value(filter));
    }
    if let Some(filter) = &triggers.pull_request {
        out.insert("pull_request".to_string(), event_filter_value(filter));
    }
    if let Some(filter) = &triggers.pull_request_review_comment {
        out.insert(
            "pull_request_review_comment".to_string(),
            event_filter_value(filter),
        );
    }
    if let Some(schedule) = &triggers.schedule {
        let entries: Vec<serde_yaml::Value> = schedule
            .iter()
            .map(|s| {
                let mut m = serde_yaml::Mapping::new();
                m.insert("cron".into(), s.cron.clone().into());
                serde_yaml::Value::Mapping(m)
            })
            .collect();
        out.insert("schedule".to_string(), serde_yaml::Value::Sequence(entries));
    }
    if let Some(filter) = &triggers.workflow_dispatch {
        out.insert("workflow_dispatch".to_string(), event_filter_value(filter));
    }
    if let Some(filter) = &triggers.workflow_run {
        out.insert("workflow_run".to_string(), event_filter_value(filter));
    }

    if let Some(command) = &triggers.command {
        for event_name in command.resolved_events() {
            let entry = out
                .entry(event_name.to_string())
                .or_insert_with(|| serde_yaml::Value::Mapping(serde_yaml::Mapping::new()));
            if let serde_yaml::Value::Mapping(m) = entry {
                m.insert(
                    "types".into(),
                    serde_yaml::Value::Sequence(
                        command_activity_types(event_name)
                            .iter()
                            .map(|t| (*t).into())
                            .collect(),
                    ),
                );
            }
        }
    }

    OnBlock(out)
}

/// Activity types a command trigger's `/name` body match should listen on
/// for each comment-bearing event. `issues`/`pull_request` only carry a
/// body at creation or edit time (`created` is not one of their activity
/// types); only the two comment events have `created`.
fn command_activity_types(event_name: &str) -> &'static [&'static str] {
    match event_name {
        "issues" => &["opened", "edited", "reopened"],
        "issue_comment" => &["created", "edited"],
        "pull_request" => &["opened", "edited", "reopened"],
        "pull_request_review_comment" => &["created", "edited"],
        _ => &["created"],
    }
}

fn event_filter_value(filter: &aw_types::workflow::EventFilter) -> serde_yaml::Value {
    if filter.types.is_empty() {
        serde_yaml::Value::Null
    } else {
        let mut m = serde_yaml::Mapping::new();
        m.insert(
            "types".into(),
            serde_yaml::Value::Sequence(filter.types.iter().cloned().map(Into::into).collect()),
        );
        serde_yaml::Value::Mapping(m)
    }
}

/// The checkout action reference every compile resolves through the
/// Action Pin Cache whenever `wants_checkout` holds, so the emitted step
/// is never left with an unpinned tag.
pub const CHECKOUT_ACTION_REF: &str = "actions/checkout@v4";

/// A checkout step is added when custom steps don't already
/// include one AND (an imported agent file is required OR effective
/// permissions grant `contents: read`).
pub fn requires_checkout(head: &WorkflowHead, custom_steps_have_checkout: bool) -> bool {
    if custom_steps_have_checkout {
        return false;
    }
    let has_imports = !head.imports.is_empty();
    let grants_contents_read = matches!(
        head.permissions.get("contents"),
        aw_types::workflow::PermissionLevel::Read | aw_types::workflow::PermissionLevel::Write
    );
    has_imports || grants_contents_read
}

fn build_activation_job(head: &WorkflowHead) -> Job {
    let mut steps = vec![Step::run("echo 'activation ok'").named("activation")];

    if !head.roles.is_empty() {
        let roles_csv = head
            .roles
            .iter()
            .map(|r| format!("{r:?}").to_lowercase())
            .collect::<Vec<_>>()
            .join(",");
        steps.push(
            Step::run(format!("aw-role-check --allow {roles_csv}"))
                .named("enforce role check"),
        );
    }

    if head.on.workflow_run.is_some() {
        steps.push(
            Step::run("aw-repo-safety-check")
                .named("enforce repository-safety check for workflow_run"),
        );
    }

    Job {
        needs: Vec::new(),
        runs_on: "ubuntu-latest".to_string(),
        condition: None,
        permissions: IndexMap::new(),
        env: IndexMap::new(),
        steps,
        timeout_minutes: Some(5),
    }
}

fn build_agent_job(
    head: &WorkflowHead,
    needs: Vec<String>,
    wants_checkout: bool,
    engine_id: &str,
    checkout_pin: Option<&ActionPin>,
) -> Job {
    let mut steps = Vec::new();

    if wants_checkout {
        // `checkout_pin` is resolved by the compiler up front whenever
        // `requires_checkout` holds (see `compiler::extract_action_references`);
        // its absence here means the pin cache was never asked, which is a
        // caller bug rather than something to paper over silently.
        let pin = checkout_pin.expect("checkout required but no checkout pin was resolved");
        steps.push(
            Step::uses(format!("{}@{}", pin.reference.repo, pin.sha)).named("checkout"),
        );
    }

    steps.push(Step::run(format!("aw-setup-engine --engine {engine_id}")).named("set up engine"));

    if head.sandbox_agent != SandboxAgent::None {
        steps.push(
            Step::run("aw-gateway-up --port-map 8080:8080")
                .named("launch tool gateway")
                .with_if("true"),
        );
    }

    steps.push(Step::run(format!("aw-run-agent --engine {engine_id}")).named("run agent"));
    steps.push(Step::run("aw-collect-outputs").named("collect outputs"));

    Job {
        needs,
        runs_on: "ubuntu-latest".to_string(),
        condition: build_command_condition(head),
        permissions: IndexMap::new(),
        env: IndexMap::new(),
        steps,
        timeout_minutes: Some(30),
    }
}

/// The GitHub Actions expression field each comment-bearing event exposes
/// its slash-command body under.
fn command_body_field(event: &str) -> &'static str {
    match event {
        "issues" => "github.event.issue.body",
        "issue_comment" | "pull_request_review_comment" => "github.event.comment.body",
        "pull_request" => "github.event.pull_request.body",
        other => unreachable!("unexpected comment-bearing event {other}"),
    }
}

/// Command-trigger expansion: collapses to a single `contains(...)`
/// check when the command is the workflow's only trigger over its full
/// default event set, otherwise expands to an event-name-aware compound so a
/// recognized command only fires the agent on the events it was scoped to
/// and every other trigger (schedule, workflow_dispatch, a subset of comment
/// events the author didn't select) passes through untouched.
fn build_command_condition(head: &WorkflowHead) -> Option<String> {
    let command = head.on.command.as_ref()?;
    let resolved = command.resolved_events();
    let is_sole_trigger = head.on.issues.is_none()
        && head.on.issue_comment.is_none()
        && head.on.pull_request.is_none()
        && head.on.pull_request_review_comment.is_none()
        && head.on.schedule.is_none()
        && head.on.workflow_dispatch.is_none()
        && head.on.workflow_run.is_none();

    if is_sole_trigger && resolved.len() == aw_types::workflow::CommandTrigger::ALL_COMMENT_EVENTS.len() {
        return Some(format!("contains(github.event.*.body, '/{}')", command.name));
    }

    let mut clauses: Vec<String> = resolved
        .iter()
        .map(|event| {
            format!(
                "(github.event_name == '{event}' && contains({}, '/{}'))",
                command_body_field(event),
                command.name
            )
        })
        .collect();
    let all_events = aw_types::workflow::CommandTrigger::ALL_COMMENT_EVENTS.join(", ");
    clauses.push(format!("!(github.event_name in {{{all_events}}})"));

    Some(format!("({})", clauses.join(" || ")))
}

fn build_safe_output_job(spec: &SafeOutputJobSpec) -> Job {
    let env: IndexMap<String, String> = spec.env.clone().into_iter().collect();
    let mut job_env = env;
    job_env.insert("GITHUB_TOKEN".to_string(), spec.token_expression.clone());

    Job {
        needs: vec![AGENT_JOB.to_string()],
        runs_on: "ubuntu-latest".to_string(),
        condition: Some(spec.condition.clone()),
        permissions: IndexMap::new(),
        env: job_env,
        steps: vec![Step::run(format!("aw-apply-safe-output --kind {}", spec.kind.job_name()))
            .named(format!("apply {}", spec.job_name))],
        timeout_minutes: Some(10),
    }
}

/// Serialize `lock` to YAML, append the header comment block, post-process
/// bare pin references into their annotated form, and write the result to
/// `path` via write-then-atomic-rename.
pub fn write(
    path: &Path,
    lock: &LockFile,
    annotations: &[PinAnnotation],
    source_path: &Path,
    engine_id: &str,
) -> Result<(), AwError> {
    let mut yaml = serde_yaml::to_string(lock).map_err(|e| AwError::Emit {
        path: path.to_path_buf(),
        message: format!("failed to serialize lock file: {e}"),
    })?;

    for annotation in annotations {
        let bare_line = format!("uses: {}", annotation.bare_reference);
        let annotated_line = format!(
            "uses: {} # {}",
            annotation.bare_reference, annotation.version_comment
        );
        yaml = yaml.replace(&bare_line, &annotated_line);
    }

    let header = render_header(source_path, engine_id, &lock.header);
    let document = format!("{header}\n{yaml}");

    atomic_write(path, document.as_bytes()).map_err(|e| AwError::Emit {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

fn render_header(source_path: &Path, engine_id: &str, header: &LockHeaderShadow) -> String {
    let relative = source_path.to_string_lossy().replace('\\', "/");
    let workflow_id = header
        .workflow_id
        .as_ref()
        .map(|id| id.0.clone())
        .unwrap_or_default();
    format!(
        "# generated by aw -- do not edit by hand\n# source: {relative}\n# workflow: {workflow_id}\n# engine: {engine_id}"
    )
}

fn atomic_write(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir)?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(contents)?;
    tmp.flush()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use aw_types::workflow::CommandTrigger;

    fn head_with_command() -> WorkflowHead {
        let mut head = WorkflowHead::default();
        head.on.command = Some(CommandTrigger {
            name: "triage".to_string(),
            events: vec![],
        });
        head
    }

    #[test]
    fn concurrency_key_is_stable_and_namespaced() {
        let id = WorkflowId("triage".to_string());
        let group1 = build_concurrency(&id, &head_with_command()).group;
        let group2 = build_concurrency(&id, &head_with_command()).group;
        assert_eq!(group1, group2);
        assert!(group1.contains("triage"));
    }

    #[test]
    fn checkout_required_when_imports_present() {
        let mut head = WorkflowHead::default();
        head.imports = vec!["shared/triage.md".to_string()];
        assert!(requires_checkout(&head, false));
    }

    #[test]
    fn checkout_skipped_when_custom_steps_already_have_one() {
        let head = WorkflowHead::default();
        assert!(!requires_checkout(&head, true));
    }

    #[test]
    fn command_trigger_expands_into_comment_events() {
        let head = head_with_command();
        let on = build_on_block(&head);
        assert!(on.0.contains_key("issues"));
        assert!(on.0.contains_key("issue_comment"));
        assert!(on.0.contains_key("pull_request"));
        assert!(on.0.contains_key("pull_request_review_comment"));
    }

    #[test]
    fn command_trigger_uses_per_event_activity_types() {
        let head = head_with_command();
        let on = build_on_block(&head);
        let types_of = |event: &str| -> Vec<String> {
            match &on.0[event] {
                serde_yaml::Value::Mapping(m) => m["types"]
                    .as_sequence()
                    .unwrap()
                    .iter()
                    .map(|v| v.as_str().unwrap().to_string())
                    .collect(),
                _ => panic!("expected a mapping with types for {event}"),
            }
        };
        assert_eq!(types_of("issues"), vec!["opened", "edited", "reopened"]);
        assert_eq!(types_of("pull_request"), vec!["opened", "edited", "reopened"]);
        assert_eq!(types_of("issue_comment"), vec!["created", "edited"]);
        assert_eq!(
            types_of("pull_request_review_comment"),
            vec!["created", "edited"]
        );
    }

    #[test]
    fn command_condition_collapses_to_single_form_when_sole_trigger() {
        let head = head_with_command();
        let condition = build_command_condition(&head).unwrap();
        assert_eq!(condition, "contains(github.event.*.body, '/triage')");
    }

    #[test]
    fn command_condition_expands_to_event_aware_form_alongside_other_triggers() {
        let mut head = head_with_command();
        head.on.schedule = Some(vec![aw_types::workflow::ScheduleEntry {
            cron: "0 9 * * 1-5".to_string(),
        }]);
        let condition = build_command_condition(&head).unwrap();
        assert!(condition.starts_with('('));
        assert!(condition.contains("github.event_name == 'issues'"));
        assert!(condition.contains("github.event.issue.body"));
        assert!(condition.contains("github.event_name == 'issue_comment'"));
        assert!(condition.contains("github.event.comment.body"));
        assert!(condition.contains("!(github.event_name in {issues, issue_comment, pull_request, pull_request_review_comment})"));
    }

    #[test]
    fn command_condition_expands_when_events_are_filtered_even_without_other_triggers() {
        let mut head = WorkflowHead::default();
        head.on.command = Some(CommandTrigger {
            name: "mybot".to_string(),
            events: vec!["issues".to_string()],
        });
        let condition = build_command_condition(&head).unwrap();
        assert!(condition.contains("github.event_name == 'issues'"));
        assert!(!condition.contains("issue_comment'"));
    }

    #[test]
    fn no_command_condition_when_workflow_has_no_command_trigger() {
        let head = WorkflowHead::default();
        assert!(build_command_condition(&head).is_none());
    }

    #[test]
    fn jobs_are_ordered_activation_then_agent_then_safe_outputs() {
        let mut head = WorkflowHead::default();
        head.safe_outputs.insert(
            "add-comment".into(),
            aw_types::safe_output::SafeOutputDeclaration::default(),
        );
        let merged = MergedFrontMatter {
            head,
            contributors: vec![],
        };
        let input = EmitInput {
            workflow_id: WorkflowId("triage".into()),
            source_path: Path::new("triage.md"),
            engine_id: "claude",
            merged: &merged,
            pins: &[],
            custom_jobs: &[],
            custom_steps_include_checkout: false,
        };
        let (lock, _) = build(&input).unwrap();
        let names: Vec<_> = lock.jobs.keys().cloned().collect();
        assert_eq!(names[0], "activation");
        assert_eq!(names[1], "agent");
        assert_eq!(names[2], "add_comment");
    }

    #[test]
    fn empty_triggers_yield_empty_on_block() {
        let head = WorkflowHead::default();
        assert!(build_on_block(&head).0.is_empty());
    }

    #[test]
    fn checkout_step_uses_the_resolved_pin_not_a_bare_tag() {
        let mut head = WorkflowHead::default();
        head.imports = vec!["shared/triage.md".to_string()];
        let merged = MergedFrontMatter {
            head,
            contributors: vec![],
        };
        let pin = ActionPin {
            reference: aw_types::pin::ActionRef::parse("actions/checkout@v4").unwrap(),
            sha: "a".repeat(40),
            resolved_version: "v4.2.2".to_string(),
            source: aw_types::pin::PinSource::Fallback,
        };
        let input = EmitInput {
            workflow_id: WorkflowId("triage".into()),
            source_path: Path::new("triage.md"),
            engine_id: "claude",
            merged: &merged,
            pins: std::slice::from_ref(&pin),
            custom_jobs: &[],
            custom_steps_include_checkout: false,
        };
        let (lock, annotations) = build(&input).unwrap();
        let checkout_step = &lock.jobs["agent"].steps[0];
        assert_eq!(
            checkout_step.uses.as_deref(),
            Some(format!("actions/checkout@{}", "a".repeat(40)).as_str())
        );
        assert_eq!(annotations.len(), 1);
        assert_eq!(annotations[0].version_comment, "v4.2.2");
    }

    #[test]
    #[should_panic(expected = "checkout required but no checkout pin was resolved")]
    fn checkout_required_without_a_resolved_pin_panics_rather_than_emitting_a_placeholder() {
        let mut head = WorkflowHead::default();
        head.imports = vec!["shared/triage.md".to_string()];
        let merged = MergedFrontMatter {
            head,
            contributors: vec![],
        };
        let input = EmitInput {
            workflow_id: WorkflowId("triage".into()),
            source_path: Path::new("triage.md"),
            engine_id: "claude",
            merged: &merged,
            pins: &[],
            custom_jobs: &[],
            custom_steps_include_checkout: false,
        };
        let _ = build(&input);
    }
}
