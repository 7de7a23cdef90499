use std::time::Duration;

use async_trait::async_trait;

use helmsman_core::domain::capability::CapabilityGroup;

use super::{Capability, CapabilityArgs, CapabilityError, ParameterKind, ParameterSpec};
use crate::context::ExecutionContext;

pub const MAX_WAIT_SECS: i64 = 600;

/// Pauses the exchange, typically to let a restart settle before re-checking.
pub struct Wait;

#[async_trait]
impl Capability for Wait {
    fn name(&self) -> &str {
        "wait"
    }

    fn description(&self) -> &str {
        "Wait for a number of seconds before continuing"
    }

    fn group(&self) -> CapabilityGroup {
        CapabilityGroup::Utility
    }

    fn parameters(&self) -> &[ParameterSpec] {
        const PARAMETERS: &[ParameterSpec] =
            &[ParameterSpec::required("time", ParameterKind::Integer, "Seconds to wait")];
        PARAMETERS
    }

    async fn execute(
        &self,
        ctx: &ExecutionContext,
        args: &CapabilityArgs,
    ) -> Result<String, CapabilityError> {
        let seconds = args.integer("time")?;
        if !(0..=MAX_WAIT_SECS).contains(&seconds) {
            return Err(CapabilityError::InvalidArguments(format!(
                "`time` must be between 0 and {MAX_WAIT_SECS} seconds"
            )));
        }

        ctx.sleep(Duration::from_secs(seconds as u64)).await?;
        Ok(format!("Waited for {seconds} seconds"))
    }
}
