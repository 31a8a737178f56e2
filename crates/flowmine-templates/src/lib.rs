//! flowmine-templates - workflow chain templates
//!
//! Built-in chains, a caller-owned registry of named chains, and the
//! synthesizer that turns discovered patterns into new chains.

mod builtin;
mod registry;
mod synthesizer;

pub use builtin::{builtin_chains, full_cycle, milestone_complete, project_setup, quick_fix};
pub use registry::{resolve_variables, template_file_name, TemplateRegistry};
pub use synthesizer::{
    export_pattern, generate_template, synthesize, BatchFailure, BatchReport, TemplateSynthesizer,
};
