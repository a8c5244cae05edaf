//! Shared fixtures and a scripted evaluator for integration tests
#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use orca_lift::dag::{TaskInput, TaskOutput};
use orca_lift::deliberation::SpecialistKind;
use orca_lift::model::{
    EquipmentInventory, EquipmentType, ExperienceLevel, FitnessGoal, GoalStatement, Limitation,
    Severity, UserProfile,
};
use orca_lift::{Arbiter, Evaluator, EvaluatorError, Executor, ExecutorConfig, PolicyKind, RuleEvaluator};

pub fn profile() -> UserProfile {
    UserProfile {
        name: "Sam".into(),
        experience_level: ExperienceLevel::Intermediate,
        goals: vec![FitnessGoal::Strength],
        schedule_days: 4,
        session_duration: 60,
        strength_levels: vec![],
        limitations: vec![Limitation {
            description: "Cranky lower back".into(),
            affected_exercises: vec!["Deadlift".into()],
            severity: Severity::Moderate,
        }],
        age: Some(34),
        body_weight: None,
        notes: String::new(),
    }
}

pub fn goals() -> GoalStatement {
    GoalStatement::new("get stronger on the big lifts").with_weeks(4)
}

pub fn equipment() -> EquipmentInventory {
    EquipmentInventory::new(vec![
        EquipmentType::Barbell,
        EquipmentType::Dumbbell,
        EquipmentType::Cable,
    ])
}

/// Fast retries so paused-clock tests stay readable
pub fn test_config() -> ExecutorConfig {
    ExecutorConfig {
        max_retries: 2,
        base_backoff: Duration::from_millis(10),
        max_backoff: Duration::from_millis(40),
        task_timeout: Duration::from_secs(5),
        phase_concurrency: 4,
    }
}

pub fn executor(evaluator: Arc<dyn Evaluator>, config: ExecutorConfig) -> Executor {
    Executor::new(evaluator, Arbiter::new(PolicyKind::DomainPriority.build()), config)
}

/// Rule evaluator with injectable failures and latency, recording every attempt
#[derive(Default)]
pub struct ScriptedEvaluator {
    inner: RuleEvaluator,
    failing: HashSet<SpecialistKind>,
    flaky: Mutex<HashMap<String, usize>>,
    always_transient: HashSet<String>,
    rate_limited: Mutex<HashMap<String, (usize, Duration)>>,
    delays: HashMap<String, Duration>,
    calls: Mutex<Vec<String>>,
    invocations: AtomicUsize,
}

impl ScriptedEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Specialist answers with a contract violation every time
    pub fn fail_specialist(mut self, kind: SpecialistKind) -> Self {
        self.failing.insert(kind);
        self
    }

    /// First `times` attempts of tasks with this role slug fail transiently
    pub fn flaky(self, slug: &str, times: usize) -> Self {
        self.flaky
            .lock()
            .unwrap()
            .insert(slug.to_string(), times);
        self
    }

    /// First `times` attempts are rate limited with the given retry hint
    pub fn rate_limited(self, slug: &str, times: usize, retry_after: Duration) -> Self {
        self.rate_limited
            .lock()
            .unwrap()
            .insert(slug.to_string(), (times, retry_after));
        self
    }

    pub fn always_transient(mut self, slug: &str) -> Self {
        self.always_transient.insert(slug.to_string());
        self
    }

    pub fn slow(mut self, slug: &str, delay: Duration) -> Self {
        self.delays.insert(slug.to_string(), delay);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_for(&self, task_id: &str) -> usize {
        self.calls().iter().filter(|c| *c == task_id).count()
    }

    pub fn invocations(&self) -> usize {
        self.invocations.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Evaluator for ScriptedEvaluator {
    async fn invoke(&self, input: &TaskInput) -> Result<TaskOutput, EvaluatorError> {
        self.invocations.fetch_add(1, Ordering::SeqCst);
        self.calls.lock().unwrap().push(input.task_id.clone());
        let slug = input.role.slug();

        if let Some(delay) = self.delays.get(&slug) {
            tokio::time::sleep(*delay).await;
        }

        if let orca_lift::dag::TaskRole::Specialist { kind, .. } = input.role {
            if self.failing.contains(&kind) {
                return Err(EvaluatorError::ContractViolation(format!(
                    "{} returned garbage",
                    kind.slug()
                )));
            }
        }

        if self.always_transient.contains(&slug) {
            return Err(EvaluatorError::Transient("connection reset".into()));
        }

        {
            let mut limited = self.rate_limited.lock().unwrap();
            if let Some((remaining, retry_after)) = limited.get_mut(&slug) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(EvaluatorError::RateLimited {
                        retry_after: Some(*retry_after),
                    });
                }
            }
        }

        {
            let mut flaky = self.flaky.lock().unwrap();
            if let Some(remaining) = flaky.get_mut(&slug) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(EvaluatorError::Transient("connection reset".into()));
                }
            }
        }

        self.inner.invoke(input).await
    }
}
