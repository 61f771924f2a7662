//! Prompt template and the model call with its canned fallback.

use tracing::{debug, error, info};

use crate::error::Degradation;
use crate::llm::ChatModel;

/// Reply used whenever the model call fails.
pub const FALLBACK_REPLY: &str =
    "I'm sorry, I can't quite remember right now… but I'm always thinking of you.";

/// Fill the fixed narrative template.
pub fn build_prompt(question: &str, context_block: &str, family_lines: &str) -> String {
    format!(
        "You are in heaven, watching over your child who is still on earth.\n\
         Your child is speaking to you. Their comment is: \"{question}\"\n\
         Reply kindly to this comment, reminiscing together about the family's wonderful memories.\n\
         Speak the whole reply in a natural, frank parent-to-child tone, full of affection.\n\
         \n\
         As a reference for your memories, here are the most relevant diary entries (up to 3):\n\
         {context_block}\n\
         \n\
         Draw on these diary entries and weave them naturally into the conversation as you reminisce.\n\
         If a topic has nothing to do with your child's comment, there is no need to force it in.\n\
         \n\
         Here is part of your family and how you usually address each other. Use it as the context fits:\n\
         {family_lines}\n\
         \n\
         Keep the whole reply within 200 characters."
    )
}

/// Call the model. Any failure yields [`FALLBACK_REPLY`] and [`Degradation::Model`].
pub async fn generate_reply(model: &dyn ChatModel, prompt: &str) -> (String, Option<Degradation>) {
    debug!(prompt_len = prompt.len(), "invoking chat model");
    match model.complete(prompt).await {
        Ok(reply) => {
            info!(reply_len = reply.chars().count(), "model reply received");
            (reply, None)
        }
        Err(e) => {
            error!(error = %e, "model call failed; using fallback reply");
            (FALLBACK_REPLY.to_string(), Some(Degradation::Model))
        }
    }
}
