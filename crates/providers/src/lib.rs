//! HTTP collaborators for uipilot.
//!
//! - [`OpenAiCompatDecisionMaker`] implements `uipilot_core::DecisionMaker`
//!   against any OpenAI-compatible chat-completions endpoint.
//! - [`MoondreamPointer`] implements `uipilot_core::PointingService`.

pub mod moondream;
pub mod openai_compat;

pub use moondream::MoondreamPointer;
pub use openai_compat::OpenAiCompatDecisionMaker;
