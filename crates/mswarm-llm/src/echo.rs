use futures::future::BoxFuture;

use mswarm_core::error::Result;
use mswarm_core::traits::TextCompletion;

/// Offline completion that answers with the prompt itself. Lets swarms run
/// end to end without a model endpoint.
#[derive(Debug, Default, Clone, Copy)]
pub struct EchoCompletion;

impl TextCompletion for EchoCompletion {
    fn invoke(&self, prompt: String) -> BoxFuture<'_, Result<String>> {
        Box::pin(async move { Ok(prompt) })
    }

    fn name(&self) -> &str {
        "echo"
    }
}
