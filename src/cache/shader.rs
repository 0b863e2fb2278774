//! Shader Compilation
//!
//! User WGSL is compiled with the builtin-uniform preamble prepended, so
//! every shader can read `builtins.time`, `builtins.resolution` and
//! friends without declaring them. Sources are parsed and validated with
//! naga before anything touches the device; diagnostics carry locations
//! mapped back to user-visible lines (the preamble is subtracted). Only a
//! clean source becomes a `wgpu::ShaderModule`, created inside a validation
//! error scope so a device-side rejection turns into a diagnostic instead
//! of an uncaptured error.

use xxhash_rust::xxh3::xxh3_64;

use crate::analyze::ProgramMap;
use crate::blueprint::ShaderId;
use crate::builtins::{BUILTIN_PREAMBLE, PREAMBLE_LINES};
use crate::cache::{Dispose, ResourceCompiler};
use crate::context::GpuContext;

// ─── Diagnostics ──────────────────────────────────────────────────────────────

/// Severity of one compiler message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticSeverity {
    Info,
    Warning,
    Error,
}

/// One compiler message, located in user-visible source coordinates.
///
/// `line` and `column` are 1-based; all location fields are zero when the
/// compiler could not attribute the message to a source range.
#[derive(Debug, Clone)]
pub struct ShaderDiagnostic {
    pub severity: DiagnosticSeverity,
    pub message: String,
    pub line: u32,
    pub column: u32,
    /// Byte offset of the range start within the user source.
    pub offset: u32,
    /// Byte length of the range.
    pub length: u32,
}

impl ShaderDiagnostic {
    fn error(message: String, location: Option<naga::SourceLocation>) -> Self {
        match location {
            Some(loc) => Self {
                severity: DiagnosticSeverity::Error,
                message,
                // Locations address the preamble-prefixed source; shift
                // them back into user coordinates. Anything naga pins on
                // the preamble itself is clamped to line 1.
                line: loc.line_number.saturating_sub(PREAMBLE_LINES).max(1),
                column: loc.line_position,
                offset: loc.offset.saturating_sub(BUILTIN_PREAMBLE.len() as u32),
                length: loc.length,
            },
            None => Self {
                severity: DiagnosticSeverity::Error,
                message,
                line: 0,
                column: 0,
                offset: 0,
                length: 0,
            },
        }
    }
}

// ─── Source checking ──────────────────────────────────────────────────────────

/// Result of the device-free naga pass over one user source.
struct SourceCheck {
    full_source: String,
    diagnostics: Vec<ShaderDiagnostic>,
    entry_points: Vec<String>,
}

impl SourceCheck {
    fn is_clean(&self) -> bool {
        self.diagnostics
            .iter()
            .all(|d| d.severity != DiagnosticSeverity::Error)
    }
}

/// Parses and validates `source` with the builtin preamble prepended.
fn check_source(source: &str) -> SourceCheck {
    let full_source = format!("{BUILTIN_PREAMBLE}{source}");

    let module = match naga::front::wgsl::parse_str(&full_source) {
        Ok(module) => module,
        Err(error) => {
            let diagnostic = ShaderDiagnostic::error(
                error.message().to_string(),
                error.location(&full_source),
            );
            return SourceCheck {
                full_source,
                diagnostics: vec![diagnostic],
                entry_points: Vec::new(),
            };
        }
    };

    let entry_points = module
        .entry_points
        .iter()
        .map(|entry| entry.name.clone())
        .collect();

    let mut validator = naga::valid::Validator::new(
        naga::valid::ValidationFlags::all(),
        naga::valid::Capabilities::all(),
    );
    let diagnostics = match validator.validate(&module) {
        Ok(_) => Vec::new(),
        Err(error) => {
            let diagnostic = ShaderDiagnostic::error(
                error.as_inner().to_string(),
                error.location(&full_source),
            );
            vec![diagnostic]
        }
    };

    SourceCheck {
        full_source,
        diagnostics,
        entry_points,
    }
}

// ─── Compiled shaders ─────────────────────────────────────────────────────────

/// One compiled shader generation entry.
pub struct CompiledShader {
    /// `None` when any error-severity diagnostic was produced.
    pub module: Option<wgpu::ShaderModule>,
    /// Every message the compile produced, usable module or not.
    pub diagnostics: Vec<ShaderDiagnostic>,
    /// Entry-point names reflected from the parsed module, for link-time
    /// checks.
    pub entry_points: Vec<String>,
    source_hash: u64,
}

impl CompiledShader {
    /// Whether `name` is an entry point of the compiled module.
    #[must_use]
    pub fn has_entry_point(&self, name: &str) -> bool {
        self.entry_points.iter().any(|entry| entry == name)
    }
}

impl Dispose for CompiledShader {
    // Shader modules hold no destroyable GPU allocation; dropping the last
    // handle releases them.
    fn dispose(&self) {}
}

// ─── Compiler strategy ────────────────────────────────────────────────────────

/// Descriptor snapshot of one shader source.
pub struct ShaderDescriptor {
    name: String,
    source: String,
    source_hash: u64,
}

/// [`ResourceCompiler`] strategy for shader modules.
pub struct ShaderCompiler;

impl ResourceCompiler for ShaderCompiler {
    type Key = ShaderId;
    type Descriptor = ShaderDescriptor;
    type Output = CompiledShader;

    const KIND: &'static str = "shaders";

    fn enumerate(map: &ProgramMap) -> Vec<(Self::Key, Self::Descriptor)> {
        map.shaders
            .iter()
            .map(|(id, shader)| {
                (
                    id.clone(),
                    ShaderDescriptor {
                        name: shader.name.clone(),
                        source: shader.source.clone(),
                        source_hash: xxh3_64(shader.source.as_bytes()),
                    },
                )
            })
            .collect()
    }

    fn needs_recompile(desc: &Self::Descriptor, existing: &Self::Output) -> bool {
        desc.source_hash != existing.source_hash
    }

    async fn compile(
        gpu: &GpuContext,
        key: &Self::Key,
        desc: Self::Descriptor,
        _map: &ProgramMap,
    ) -> Self::Output {
        let check = check_source(&desc.source);
        let clean = check.is_clean();
        let mut diagnostics = check.diagnostics;

        let module = if clean {
            let scope = gpu.device.push_error_scope(wgpu::ErrorFilter::Validation);
            let module = gpu.device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(&desc.name),
                source: wgpu::ShaderSource::Wgsl(check.full_source.into()),
            });
            match scope.pop().await {
                None => Some(module),
                Some(error) => {
                    diagnostics.push(ShaderDiagnostic::error(error.to_string(), None));
                    None
                }
            }
        } else {
            None
        };

        if module.is_none() {
            log::warn!("shader {key} ({}) failed to compile", desc.name);
        }

        CompiledShader {
            module,
            diagnostics,
            entry_points: check.entry_points,
            source_hash: desc.source_hash,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID_PAIR: &str = "\
@vertex
fn vs_main(@builtin(vertex_index) index: u32) -> @builtin(position) vec4<f32> {
    let x = f32(i32(index) - 1);
    let y = f32(i32(index & 1u) * 2 - 1);
    return vec4<f32>(x, y, 0.0, 1.0);
}

@fragment
fn fs_main() -> @location(0) vec4<f32> {
    return vec4<f32>(builtins.time, 0.0, 0.0, 1.0);
}
";

    #[test]
    fn clean_source_reflects_entry_points() {
        let check = check_source(VALID_PAIR);
        assert!(check.is_clean());
        assert_eq!(check.entry_points, vec!["vs_main", "fs_main"]);
    }

    #[test]
    fn builtins_are_visible_without_declaration() {
        // fs_main above reads builtins.time; a clean check proves the
        // preamble is wired through.
        assert!(check_source(VALID_PAIR).is_clean());
    }

    #[test]
    fn syntax_error_maps_to_user_line() {
        // Error on user-visible line 3.
        let source = "\
@fragment
fn fs_main() -> @location(0) vec4<f32> {
    return vec4<f32>(1.0,;
}
";
        let check = check_source(source);
        assert!(!check.is_clean());
        assert_eq!(check.diagnostics.len(), 1);
        assert_eq!(check.diagnostics[0].severity, DiagnosticSeverity::Error);
        assert_eq!(check.diagnostics[0].line, 3);
        assert!(check.diagnostics[0].column > 0);
    }

    #[test]
    fn type_error_is_reported_with_location() {
        let source = "\
@fragment
fn fs_main() -> @location(0) vec4<f32> {
    let x: vec4<f32> = 1.0;
    return x;
}
";
        let check = check_source(source);
        assert!(!check.is_clean());
        assert!(check.diagnostics[0].line >= 1);
    }

    #[test]
    fn offsets_address_user_source() {
        let source = "@fragment fn fs_main() -> @location(0) vec4<f32> { return 1; }";
        let check = check_source(source);
        assert!(!check.is_clean());
        let diagnostic = &check.diagnostics[0];
        assert!((diagnostic.offset as usize) < source.len());
    }
}
