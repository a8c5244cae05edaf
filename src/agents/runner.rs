use std::path::PathBuf;
use std::process::Stdio;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::process::Command;

use super::prompts;
use super::Evaluator;
use crate::dag::{TaskInput, TaskOutput, TaskRole};
use crate::deliberation::{Opinion, Proposal};
use crate::error::EvaluatorError;
use crate::model::{ProgramDraft, UserAnalysis};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Model {
    Opus,
    #[default]
    Sonnet,
    Haiku,
}

impl Model {
    pub fn as_str(&self) -> &'static str {
        match self {
            Model::Opus => "opus",
            Model::Sonnet => "sonnet",
            Model::Haiku => "haiku",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CliOptions {
    pub model: Model,
    pub system_prompt: Option<String>,
    pub allowed_tools: Option<Vec<String>>,
}

#[derive(Debug, Clone)]
pub struct CliOutput {
    pub response: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl CliOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

#[derive(Debug, Clone)]
pub struct CliRunner {
    claude_path: PathBuf,
    working_dir: PathBuf,
}

impl CliRunner {
    pub fn new(working_dir: PathBuf) -> Self {
        Self {
            claude_path: PathBuf::from("claude"),
            working_dir,
        }
    }

    pub fn with_claude_path(mut self, path: PathBuf) -> Self {
        self.claude_path = path;
        self
    }

    /// Run the claude CLI once in print mode
    pub async fn run(&self, prompt: &str, options: CliOptions) -> Result<CliOutput> {
        let mut cmd = Command::new(&self.claude_path);
        cmd.current_dir(&self.working_dir);
        cmd.arg("--print");
        cmd.arg("--model").arg(options.model.as_str());

        if let Some(ref system_prompt) = options.system_prompt {
            cmd.arg("--system-prompt").arg(system_prompt);
        }

        if let Some(ref tools) = options.allowed_tools {
            for tool in tools {
                cmd.arg("--allowedTools").arg(tool);
            }
        }

        // Prompt is positional and must come last
        cmd.arg(prompt);

        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        // Dropped futures (timeout, cancel) must not leave the child running
        cmd.kill_on_drop(true);

        tracing::debug!("Running claude CLI: {:?}", cmd);

        let output = cmd
            .output()
            .await
            .context("Failed to execute claude CLI")?;

        let response = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();

        if !stderr.is_empty() {
            tracing::warn!("claude stderr: {}", stderr);
        }

        Ok(CliOutput {
            response,
            stderr,
            exit_code: output.status.code().unwrap_or(-1),
        })
    }
}

/// Evaluator that asks the claude CLI for each external task's artifact
pub struct ClaudeEvaluator {
    runner: CliRunner,
    model: Model,
}

impl ClaudeEvaluator {
    pub fn new(runner: CliRunner, model: Model) -> Self {
        Self { runner, model }
    }
}

#[async_trait]
impl Evaluator for ClaudeEvaluator {
    async fn invoke(&self, input: &TaskInput) -> Result<TaskOutput, EvaluatorError> {
        let options = CliOptions {
            model: self.model,
            system_prompt: Some(prompts::system_prompt(&input.role)),
            // Pure text generation
            allowed_tools: Some(Vec::new()),
        };
        let prompt = prompts::task_prompt(input);

        let output = self
            .runner
            .run(&prompt, options)
            .await
            .map_err(|e| classify_spawn_error(&e))?;

        if !output.success() {
            return Err(classify_failure(&output));
        }

        parse_output(&input.role, &output.response).map_err(EvaluatorError::ContractViolation)
    }
}

/// A missing or non-executable binary will not fix itself between retries
fn classify_spawn_error(error: &anyhow::Error) -> EvaluatorError {
    let permanent = error
        .chain()
        .filter_map(|cause| cause.downcast_ref::<std::io::Error>())
        .any(|io| {
            matches!(
                io.kind(),
                std::io::ErrorKind::NotFound | std::io::ErrorKind::PermissionDenied
            )
        });
    if permanent {
        EvaluatorError::Unavailable(format!("{:#}", error))
    } else {
        EvaluatorError::Transient(format!("{:#}", error))
    }
}

fn classify_failure(output: &CliOutput) -> EvaluatorError {
    let text = format!("{}\n{}", output.stderr, output.response).to_lowercase();
    if text.contains("rate limit") || text.contains("429") || text.contains("overloaded") {
        EvaluatorError::RateLimited { retry_after: None }
    } else {
        EvaluatorError::Transient(format!(
            "claude exited with {}: {}",
            output.exit_code,
            output.stderr.trim()
        ))
    }
}

/// Outermost `{...}` span of a response, tolerating prose or fences around it
fn extract_json(response: &str) -> Option<&str> {
    let start = response.find('{')?;
    let end = response.rfind('}')?;
    (end > start).then(|| &response[start..=end])
}

#[derive(Deserialize)]
struct OpinionBody {
    #[serde(default)]
    summary: String,
    #[serde(default)]
    proposals: Vec<Proposal>,
}

fn parse_output(role: &TaskRole, response: &str) -> Result<TaskOutput, String> {
    let json = extract_json(response).ok_or_else(|| "response has no JSON object".to_string())?;
    let malformed = |e: serde_json::Error| format!("malformed {}: {}", TaskOutput::expected_for(role), e);

    match role {
        TaskRole::UserAnalysis => serde_json::from_str::<UserAnalysis>(json)
            .map(TaskOutput::UserAnalysis)
            .map_err(malformed),
        TaskRole::FrameworkDesign => serde_json::from_str::<ProgramDraft>(json)
            .map(TaskOutput::Draft)
            .map_err(malformed),
        TaskRole::Specialist { kind, .. } => {
            let body: OpinionBody = serde_json::from_str(json).map_err(malformed)?;
            // The signer comes from the task, never from the model
            Ok(TaskOutput::Opinion(Opinion {
                specialist: *kind,
                summary: body.summary,
                proposals: body.proposals,
            }))
        }
        other => Err(format!("{} is not an external role", other.slug())),
    }
}
