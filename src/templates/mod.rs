// Prompt templates for onboarding, synthesis and profile refinement

pub mod builtin;
pub mod engine;

pub use builtin::{opening_message, persona_prompt, CLOSING_MESSAGE, FALLBACK_REPLY};
pub use engine::render_builtin;
