//! Generation, archiving and refinement through ProgramGenerator

mod common;

use std::sync::Arc;

use anyhow::Result;
use tempfile::TempDir;

use common::{equipment, executor, goals, profile, test_config, ScriptedEvaluator};
use orca_lift::dag::{PlanBuilder, RunContext, TaskRole};
use orca_lift::deliberation::SpecialistKind;
use orca_lift::model::{GoalStatement, Periodization, RevisionPoint};
use orca_lift::{
    Error, JsonRenderer, PipelineError, PlanError, ProgramGenerator, ProgramRenderer, RunArchive,
    RunStatus,
};

fn generator(tmp: &TempDir) -> Result<ProgramGenerator> {
    Ok(ProgramGenerator::new(
        executor(Arc::new(ScriptedEvaluator::new()), test_config()),
        SpecialistKind::default_roster(),
    )?
    .with_archive(RunArchive::new(tmp.path())?))
}

#[tokio::test]
async fn test_generate_produces_a_valid_program() -> Result<()> {
    let tmp = TempDir::new()?;
    let ctx = generator(&tmp)?
        .generate(profile(), goals(), equipment())
        .await?;

    let program = ctx.program().unwrap();
    program.program.validate().map_err(anyhow::Error::msg)?;
    assert_eq!(program.program.weeks.len(), 4);
    assert_eq!(program.program.days_per_week(), 4);
    assert_eq!(program.program.periodization, Periodization::Undulating);
    assert!(program.program.weeks[3].deload);

    // The restricted lift never reaches the final program
    let names: Vec<&str> = program
        .program
        .weeks
        .iter()
        .flat_map(|w| w.days.iter())
        .flat_map(|d| d.exercises.iter())
        .map(|e| e.name.as_str())
        .collect();
    assert!(!names.contains(&"Deadlift"));
    assert!(names.contains(&"Romanian Deadlift"));

    let rendered = JsonRenderer.render(program)?;
    assert!(rendered.contains("\"goals\""));
    Ok(())
}

#[tokio::test]
async fn test_every_run_is_archived() -> Result<()> {
    let tmp = TempDir::new()?;
    let generator = generator(&tmp)?;
    let ctx = generator.generate(profile(), goals(), equipment()).await?;

    let archive = RunArchive::new(tmp.path())?;
    let runs = archive.list()?;
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].run_id, ctx.run_id());
    assert!(runs[0].has_program);
    assert_eq!(runs[0].succeeded, 9);

    // Prefix lookup without the "run-" part
    let short = &ctx.run_id()["run-".len()..];
    let snapshot = archive.load(short)?;
    assert_eq!(snapshot.status, RunStatus::Succeeded);
    assert_eq!(snapshot.program(), ctx.program());
    assert_eq!(snapshot.deliberations, ctx.deliberations);

    let restored = RunContext::from_snapshot(snapshot)?;
    assert_eq!(restored.run_id(), ctx.run_id());
    assert_eq!(restored.dag.len(), ctx.dag.len());
    assert_eq!(restored.program(), ctx.program());
    Ok(())
}

#[tokio::test]
async fn test_failed_runs_are_archived_too() -> Result<()> {
    let tmp = TempDir::new()?;
    let mut evaluator = ScriptedEvaluator::new();
    for kind in SpecialistKind::default_roster() {
        evaluator = evaluator.fail_specialist(kind);
    }
    let generator = ProgramGenerator::new(
        executor(Arc::new(evaluator), test_config()),
        SpecialistKind::default_roster(),
    )?
    .with_archive(RunArchive::new(tmp.path())?);

    let err = generator
        .generate(profile(), goals(), equipment())
        .await
        .unwrap_err();
    let PipelineError::Execution(failure) = err else {
        panic!("expected an execution failure");
    };
    assert!(matches!(failure.cause, Error::InsufficientDeliberation { .. }));

    let archive = RunArchive::new(tmp.path())?;
    let snapshot = archive.load(failure.context.run_id())?;
    assert_eq!(snapshot.status, RunStatus::Failed);
    assert!(snapshot.program().is_none());
    assert!(snapshot.errors.iter().any(|e| !e.recoverable));
    Ok(())
}

#[tokio::test]
async fn test_invalid_request_is_rejected_before_running() -> Result<()> {
    let tmp = TempDir::new()?;
    let generator = generator(&tmp)?;

    let err = generator
        .generate(profile(), GoalStatement::new("too long").with_weeks(12), equipment())
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::Plan(PlanError::InvalidGoals(_))));
    assert!(err.context().is_none());
    assert!(RunArchive::new(tmp.path())?.list()?.is_empty());

    assert!(matches!(
        ProgramGenerator::new(
            executor(Arc::new(ScriptedEvaluator::new()), test_config()),
            vec![]
        ),
        Err(PlanError::EmptyRoster)
    ));
    Ok(())
}

#[test]
fn test_cyclic_plan_is_rejected() -> Result<()> {
    let plan = PlanBuilder::new()
        .task("a", "A", TaskRole::UserAnalysis)
        .task("b", "B", TaskRole::FrameworkDesign)
        .dependency("a", "b")
        .dependency("b", "a")
        .build_unchecked();

    assert!(matches!(plan.build_dag(), Err(PlanError::Cycle { .. })));
    Ok(())
}

#[tokio::test]
async fn test_refinement_reenters_deliberation() -> Result<()> {
    let tmp = TempDir::new()?;
    let generator = generator(&tmp)?;
    let first = generator.generate(profile(), goals(), equipment()).await?;
    let archive = RunArchive::new(tmp.path())?;
    let prior = archive.load(first.run_id())?;

    let refined = generator
        .refine_from(&prior, "less volume please")
        .await?;

    assert_ne!(refined.run_id(), first.run_id());
    assert_eq!(refined.parent_run.as_deref(), Some(first.run_id()));
    assert_eq!(refined.iteration, 1);
    assert!(refined.dag.tasks().all(|t| t.id.starts_with("ref1-")));
    assert_eq!(refined.phases.len(), 5);
    assert_eq!(refined.deliberations["ref1-arbiter"].entries.len(), 4);

    // Hypertrophy owns volume and asked for fewer sets
    let program = refined.program().unwrap();
    let bench = program.program.weeks[0].days[0]
        .exercises
        .iter()
        .find(|e| e.name == "Bench Press")
        .unwrap();
    assert_eq!((bench.sets, bench.reps_min, bench.reps_max), (3, 8, 12));

    // A second refinement builds on the first and never reuses ids
    let refined_snapshot = archive.load(refined.run_id())?;
    let again = generator.refine_from(&refined_snapshot, "more deload").await?;
    assert_eq!(again.iteration, 2);
    assert!(again.dag.tasks().all(|t| t.id.starts_with("ref2-")));

    assert_eq!(archive.list()?.len(), 3);
    Ok(())
}

#[tokio::test]
async fn test_refining_a_run_without_program_fails() -> Result<()> {
    let tmp = TempDir::new()?;
    let mut evaluator = ScriptedEvaluator::new();
    for kind in SpecialistKind::default_roster() {
        evaluator = evaluator.fail_specialist(kind);
    }
    let failing = ProgramGenerator::new(
        executor(Arc::new(evaluator), test_config()),
        SpecialistKind::default_roster(),
    )?
    .with_archive(RunArchive::new(tmp.path())?);
    let err = failing
        .generate(profile(), goals(), equipment())
        .await
        .unwrap_err();
    let run_id = err.context().unwrap().run_id().to_string();

    let prior = RunArchive::new(tmp.path())?.load(&run_id)?;
    let err = generator(&tmp)?
        .refine_from(&prior, "anything")
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        PipelineError::Plan(PlanError::NoPriorProgram(id)) if id == run_id
    ));

    let generated = generator(&tmp)?.generate(profile(), goals(), equipment()).await?;
    let ok_prior = RunArchive::new(tmp.path())?.load(generated.run_id())?;
    assert!(matches!(
        generator(&tmp)?.refine_from(&ok_prior, "   ").await,
        Err(PipelineError::Plan(PlanError::InvalidGoals(_)))
    ));
    Ok(())
}

#[tokio::test]
async fn test_revision_keeps_trained_weeks() -> Result<()> {
    let tmp = TempDir::new()?;
    let generator = generator(&tmp)?;
    let first = generator.generate(profile(), goals(), equipment()).await?;
    let archive = RunArchive::new(tmp.path())?;
    let prior = archive.load(first.run_id())?;
    let before = prior.program().unwrap().program.clone();

    let point = RevisionPoint::new(3, 2);
    let revised = generator
        .revise_from(&prior, point, "less volume please")
        .await?;

    assert_eq!(revised.parent_run.as_deref(), Some(first.run_id()));
    assert_eq!(revised.iteration, 1);
    assert_eq!(revised.inputs.revision, Some(point));
    assert!(revised.dag.tasks().all(|t| t.id.starts_with("rev1-")));
    assert_eq!(revised.deliberations["rev1-arbiter"].entries.len(), 4);

    let after = &revised.program().unwrap().program;
    assert_eq!(after.weeks.len(), before.weeks.len());
    assert_eq!(after.weeks[0], before.weeks[0]);
    assert_eq!(after.weeks[1], before.weeks[1]);
    // Day 1 of week 3 was trained; day 2 onwards is open
    assert_eq!(after.weeks[2].days[0], before.weeks[2].days[0]);

    let bench = |week: usize| {
        after.weeks[week].days[0]
            .exercises
            .iter()
            .find(|e| e.name == "Bench Press")
            .map(|e| (e.sets, e.reps_min, e.reps_max))
    };
    assert_eq!(bench(2), Some((4, 8, 12)));
    assert_eq!(bench(3), Some((3, 8, 12)));
    assert!(after.weeks[3].deload);

    assert_eq!(archive.list()?.len(), 2);
    Ok(())
}

#[tokio::test]
async fn test_revision_point_must_fall_inside_the_program() -> Result<()> {
    let tmp = TempDir::new()?;
    let generator = generator(&tmp)?;
    let first = generator.generate(profile(), goals(), equipment()).await?;
    let archive = RunArchive::new(tmp.path())?;
    let prior = archive.load(first.run_id())?;

    for point in [
        RevisionPoint::new(0, 1),
        RevisionPoint::new(5, 1),
        RevisionPoint::new(2, 0),
        RevisionPoint::new(2, 5),
    ] {
        let err = generator.revise_from(&prior, point, "reshuffle").await.unwrap_err();
        assert!(
            matches!(err, PipelineError::Plan(PlanError::InvalidRevisionPoint(_))),
            "{:?} accepted",
            point
        );
    }
    // Rejected before running, so nothing new was archived
    assert_eq!(archive.list()?.len(), 1);

    // Revising from the very start with no reason still works
    let whole = generator
        .revise_from(&prior, RevisionPoint::new(1, 1), "")
        .await?;
    assert_eq!(
        whole.inputs.instruction.as_deref(),
        Some("Revise from week 1, day 1")
    );
    Ok(())
}
