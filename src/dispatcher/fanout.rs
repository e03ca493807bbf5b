use std::any::Any;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::error::{MediatorError, Result};
use crate::ids::DispatchId;
use crate::invoker::InvokerCache;
use crate::registry::NotificationBinding;
use crate::services::ServiceProvider;

/// Invoke every handler in registration order, one at a time, sharing one
/// scope. Stops at the first failure.
///
/// Returns the number of handlers invoked.
///
/// Handler failures are wrapped in [`MediatorError::NotificationHandler`].
/// A handler type the scope cannot resolve is a configuration error, wrapped
/// in [`MediatorError::NotificationService`]. Both name the handler and the
/// notification type.
pub(super) async fn fan_out(
    provider: &dyn ServiceProvider,
    invokers: &InvokerCache,
    handlers: &[NotificationBinding],
    notification: &(dyn Any + Send + Sync),
    cancel: &CancellationToken,
    dispatch_id: DispatchId,
) -> Result<usize> {
    if handlers.is_empty() {
        return Ok(0);
    }

    let scope = provider.begin_scope();
    for (position, binding) in handlers.iter().enumerate() {
        let invoker = invokers.notification_invoker(binding);
        let handler = scope
            .resolve_any(binding.handler_type())
            .map_err(|source| MediatorError::NotificationService {
                handler: binding.handler_type().name(),
                notification_type: binding.notification_type().name(),
                source: Box::new(source),
            })?;

        debug!(
            dispatch_id = %dispatch_id,
            notification_type = %binding.notification_type(),
            handler_type = %binding.handler_type(),
            position = position,
            "Notification handler start"
        );

        if let Err(err) = invoker.invoke(handler, notification, cancel).await {
            let source = MediatorError::from(err);
            error!(
                dispatch_id = %dispatch_id,
                notification_type = %binding.notification_type(),
                handler_type = %binding.handler_type(),
                position = position,
                skipped = handlers.len() - position - 1,
                error = %source,
                "Notification handler failed"
            );
            return Err(MediatorError::NotificationHandler {
                handler: binding.handler_type().name(),
                notification_type: binding.notification_type().name(),
                source: Box::new(source),
            });
        }
    }

    Ok(handlers.len())
}
