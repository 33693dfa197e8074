use std::fmt::Write;

use crate::error::Result;
use crate::gpu::{ProgramHandle, ProgramSource, RenderBackend};
use crate::settings::DebugSettings;

/// A compiled program. A shader that failed to compile under lenient settings stays around as
/// a non-ready no-op.
#[derive(Debug)]
pub struct Shader {
    label: String,
    program: Option<ProgramHandle>,
}

impl Shader {
    pub fn compile(
        ctx: &mut dyn RenderBackend,
        source: &ProgramSource,
        debug: &DebugSettings,
    ) -> Result<Self> {
        match ctx.create_program(source) {
            Ok(program) => {
                log::debug!("Compiled program '{}'", source.label);
                Ok(Self {
                    label: source.label.to_string(),
                    program: Some(program),
                })
            }
            Err(err) if debug.throw_on_shader_error => Err(err),
            Err(err) => {
                log::warn!("{err}");
                log::debug!("Source of '{}':\n{}", source.label, numbered_source(&source.source));
                Ok(Self {
                    label: source.label.to_string(),
                    program: None,
                })
            }
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn is_ready(&self) -> bool {
        self.program.is_some()
    }

    pub fn program(&self) -> Option<ProgramHandle> {
        self.program
    }

    /// Binds the program; `false` when the shader is not ready.
    pub fn bind(&self, ctx: &mut dyn RenderBackend) -> bool {
        match self.program {
            Some(program) => {
                ctx.use_program(program);
                true
            }
            None => false,
        }
    }

    pub fn dispose(&mut self, ctx: &mut dyn RenderBackend) {
        if let Some(program) = self.program.take() {
            ctx.destroy_program(program);
        }
    }
}

fn numbered_source(source: &str) -> String {
    let mut out = String::with_capacity(source.len() + source.len() / 8);
    for (number, line) in source.lines().enumerate() {
        let _ = writeln!(out, "{:4}: {}", number + 1, line);
    }
    out
}
