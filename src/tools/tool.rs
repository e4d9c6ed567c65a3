use async_trait::async_trait;
use serde_json::Value;

use crate::error::VoiceError;
use crate::protocol::FunctionDeclaration;

/// A locally executable operation the backend may request by name.
///
/// `call` receives the untyped argument payload from the wire. Anything
/// that goes wrong — missing arguments, network failure, a rejecting
/// calendar store — is a `ToolDispatch` error, which the registry turns
/// into a structured failure response.
#[async_trait]
pub trait CalendarTool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    /// JSON schema of the argument object, as declared to the backend.
    fn parameters(&self) -> Value;

    async fn call(&self, args: Value) -> Result<Value, VoiceError>;

    fn declaration(&self) -> FunctionDeclaration {
        FunctionDeclaration {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters(),
        }
    }
}
