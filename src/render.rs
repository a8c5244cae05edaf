//! Output formats for a synthesized program.
//!
//! Text DSL rendering lives outside this crate; it plugs in through
//! [`ProgramRenderer`].

use anyhow::Result;

use crate::model::FinalProgram;

pub trait ProgramRenderer {
    fn render(&self, program: &FinalProgram) -> Result<String>;
}

/// Pretty-printed JSON, the CLI's default output
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonRenderer;

impl ProgramRenderer for JsonRenderer {
    fn render(&self, program: &FinalProgram) -> Result<String> {
        Ok(serde_json::to_string_pretty(program)?)
    }
}
