//! In-process transport: hands the event to a registered callback.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use async_trait::async_trait;
use es_common::{DeliveryResult, DomainEvent};
use es_subscription::Subscription;
use tracing::warn;

use super::TransportStrategy;

/// Receiver for in-process deliveries
pub trait EventCallback: Send + Sync {
    fn on_event(&self, subscription: &Subscription, event: &DomainEvent) -> anyhow::Result<()>;
}

struct FnCallback<F>(F);

impl<F> EventCallback for FnCallback<F>
where
    F: Fn(&Subscription, &DomainEvent) -> anyhow::Result<()> + Send + Sync,
{
    fn on_event(&self, subscription: &Subscription, event: &DomainEvent) -> anyhow::Result<()> {
        (self.0)(subscription, event)
    }
}

/// Errors and panics raised by the callback become permanent failures;
/// an in-process receiver is not expected to recover on retry.
pub struct CallbackTransport {
    name: String,
    callback: Arc<dyn EventCallback>,
}

impl CallbackTransport {
    pub fn new(name: impl Into<String>, callback: Arc<dyn EventCallback>) -> Self {
        Self { name: name.into(), callback }
    }

    pub fn from_fn<F>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&Subscription, &DomainEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Self::new(name, Arc::new(FnCallback(f)))
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}

#[async_trait]
impl TransportStrategy for CallbackTransport {
    fn name(&self) -> &str {
        &self.name
    }

    async fn deliver(&self, subscription: &Subscription, event: &DomainEvent) -> DeliveryResult {
        match catch_unwind(AssertUnwindSafe(|| self.callback.on_event(subscription, event))) {
            Ok(Ok(())) => DeliveryResult::success(),
            Ok(Err(e)) => {
                warn!(
                    transport = %self.name,
                    subscription_id = %subscription.id(),
                    error = %e,
                    "Callback rejected event"
                );
                DeliveryResult::permanent(format!("Callback error: {:#}", e))
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                warn!(
                    transport = %self.name,
                    subscription_id = %subscription.id(),
                    panic = message,
                    "Callback panicked"
                );
                DeliveryResult::permanent(format!("Callback panicked: {}", message))
            }
        }
    }
}
