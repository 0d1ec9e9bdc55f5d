//! Calls handlers and decides the status of an invocation response.

use super::handler::{Arguments, InvocationContext, InvocationObserver};
use super::registry::RegisteredOperation;
use super::result::InvocationResult;
use crate::error::ServiceError;
use crate::model::ServiceModel;
use http::StatusCode;
use tracing::{debug, instrument, warn};

/// Runs one operation: notifies the observer, calls the handler, and checks the
/// result against the declared return type.
#[instrument(skip_all, fields(operation = %operation.definition.qualified_name()))]
pub async fn invoke(
    model: &ServiceModel,
    observer: &dyn InvocationObserver,
    operation: &RegisteredOperation,
    ctx: InvocationContext,
    args: Arguments,
) -> Result<InvocationResult, ServiceError> {
    let name = operation.definition.qualified_name();
    debug!(?args, "Invoking");
    observer.invoked(&name);
    let result = operation.handler.invoke(ctx, args).await?;

    let result = result
        .conform(operation.definition.return_type.as_ref(), model)
        .map_err(|message| {
            warn!(%message, "Handler returned a mismatched result");
            ServiceError::internal(message)
        })?;
    if !matches!(result, InvocationResult::Void) {
        observer.result_fetched(&name);
    }
    Ok(result)
}

/// 204 for void and null results; 200 otherwise, including empty collections.
pub fn status_for(result: &InvocationResult) -> StatusCode {
    if matches!(result, InvocationResult::Void) || result.is_null() {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::OK
    }
}
