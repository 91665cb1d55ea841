//! Reply generation
//!
//! Multi-turn prompt assembly, the inference provider abstraction with its
//! hosted and offline implementations, and the response composer that turns
//! a context bundle into a labelled reply.

pub mod composer;
pub mod conversation;
pub mod inference;
pub mod providers;

pub use composer::{ComposedReply, Confidence, GenerationStatus, ResponseComposer};
pub use conversation::{Conversation, ConversationMessage, MessageRole};
pub use inference::{
    FinishReason, InferenceError, InferenceOptions, InferenceProvider, InferenceResponse, Usage,
};
pub use providers::{
    inference_provider_from_env, CloudInferenceProvider, ExtractiveInferenceProvider, LlmProvider,
};
