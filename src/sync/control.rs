use super::dispatcher::CommandDispatcher;
use super::observer::Subscription;
use super::reconciler::Reconciler;
use super::state::{CanonicalState, ControlId, DeviceId};
use crate::binding::{ControlBinding, WidgetValue};
use log::debug;
use std::sync::Arc;

/// A widget bound to one control of a remote device.
///
/// Dropping the handle tears the binding down.
pub struct ControlHandle {
    reconciler: Arc<Reconciler>,
    subscription: Option<Subscription>,
    dispatcher: Arc<CommandDispatcher>,
}

impl ControlHandle {
    pub(crate) fn new(
        reconciler: Arc<Reconciler>,
        subscription: Subscription,
        dispatcher: Arc<CommandDispatcher>,
    ) -> Self {
        Self {
            reconciler,
            subscription: Some(subscription),
            dispatcher,
        }
    }

    pub fn id(&self) -> ControlId {
        self.reconciler.id()
    }

    pub fn device(&self) -> &DeviceId {
        self.reconciler.device()
    }

    pub fn binding(&self) -> ControlBinding {
        self.reconciler.binding()
    }

    /// Forward a user gesture. Must be called on the UI context.
    pub fn on_local_intent(&self, input: WidgetValue) -> bool {
        self.reconciler.on_local_intent(input)
    }

    pub fn enable(&self) {
        self.reconciler.enable();
    }

    pub fn is_enabled(&self) -> bool {
        self.reconciler.is_enabled()
    }

    pub fn is_bound(&self) -> bool {
        self.subscription.is_some()
    }

    pub fn last_applied(&self) -> CanonicalState {
        self.reconciler.last_applied()
    }

    /// Unsubscribe, cancel any coalesced intent and close the command route.
    /// A command already being sent completes, but its outcome is ignored.
    pub fn teardown(&mut self) {
        let Some(subscription) = self.subscription.take() else {
            return;
        };
        self.reconciler.shutdown();
        subscription.cancel();
        if self.reconciler.binding().is_writable() {
            self.dispatcher.close(self.device(), self.id());
        }
        debug!("[Sync] {} {} torn down", self.device(), self.id());
    }
}

impl Drop for ControlHandle {
    fn drop(&mut self) {
        self.teardown();
    }
}
