//! Request orchestration for Jarvis.
//!
//! A user utterance goes through a fixed pipeline:
//!
//! 1. **Classify** it with keyword rules ([`IntentClassifier`])
//! 2. **Build** a fresh conversation: persona prompt + utterance
//! 3. **First model call** with the capability catalog, forcing a tool when
//!    the classifier found one
//! 4. **Execute** any requested tools and append their results
//! 5. **Second model call** to phrase the final reply
//!
//! See [`Orchestrator::respond`].

pub mod intent;
pub mod orchestrator;
pub mod prompt;

pub use intent::{Capability, Classification, IntentClassifier, MatchReason};
pub use orchestrator::Orchestrator;
pub use prompt::build_system_prompt;
