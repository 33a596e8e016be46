use chrono::Utc;
use fbpcore::{
    Component, ComponentContext, ComponentError, ComponentState, ComponentStatus, EventBus,
    ExecutionEvent, FaultKind, FlowError, NetworkId, RuntimeFault,
};
use futures::future::BoxFuture;
use futures::FutureExt;
use std::any::Any;
use std::future::IntoFuture;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;
use tokio::task::JoinSet;

/// A fully wired component, ready to be spawned
pub(crate) struct Launch {
    pub name: String,
    pub component: Box<dyn Component>,
    pub ctx: ComponentContext,
    pub status: Arc<ComponentStatus>,
}

pub(crate) fn completion() -> (CompletionSignal, Completion) {
    let (tx, rx) = watch::channel(None);
    (CompletionSignal { tx }, Completion { rx })
}

/// Fires the completion handle. Consumed on use, so it fires once.
pub(crate) struct CompletionSignal {
    tx: watch::Sender<Option<Vec<RuntimeFault>>>,
}

impl CompletionSignal {
    fn complete(self, faults: Vec<RuntimeFault>) {
        self.tx.send_replace(Some(faults));
    }
}

/// Resolves once every component of the network has terminated.
///
/// Cloneable; awaiting it directly is the same as calling [`Completion::wait`].
#[derive(Debug, Clone)]
pub struct Completion {
    rx: watch::Receiver<Option<Vec<RuntimeFault>>>,
}

impl Completion {
    pub fn is_complete(&self) -> bool {
        self.rx.borrow().is_some()
    }

    /// Faults collected so far; empty until completion
    pub fn faults(&self) -> Vec<RuntimeFault> {
        self.rx.borrow().clone().unwrap_or_default()
    }

    /// Wait for network completion.
    ///
    /// Returns `FlowError::Faulted` if any component failed or panicked.
    pub async fn wait(&self) -> Result<(), FlowError> {
        let mut rx = self.rx.clone();
        let faults = {
            let outcome = rx
                .wait_for(Option::is_some)
                .await
                .map_err(|_| FlowError::Abandoned)?;
            outcome.clone().unwrap_or_default()
        };
        if faults.is_empty() {
            Ok(())
        } else {
            Err(FlowError::Faulted(faults))
        }
    }
}

impl IntoFuture for Completion {
    type Output = Result<(), FlowError>;
    type IntoFuture = BoxFuture<'static, Self::Output>;

    fn into_future(self) -> Self::IntoFuture {
        async move { self.wait().await }.boxed()
    }
}

/// Spawn one task per component plus a supervisor that joins them all
/// and fires `signal` exactly once.
pub(crate) fn start(
    network_id: NetworkId,
    launches: Vec<Launch>,
    events: Arc<EventBus>,
    signal: CompletionSignal,
) {
    let started = Instant::now();
    let total = launches.len();
    tracing::info!(%network_id, components = total, "starting network");
    events.emit(ExecutionEvent::NetworkStarted {
        network_id,
        components: total,
        timestamp: Utc::now(),
    });

    if launches.is_empty() {
        finish(network_id, &events, started, signal, Vec::new());
        return;
    }

    let statuses: Vec<Arc<ComponentStatus>> =
        launches.iter().map(|launch| launch.status.clone()).collect();
    let mut tasks = JoinSet::new();
    for launch in launches {
        launch.status.advance(ComponentState::Running);
        tasks.spawn(run_component(launch));
    }

    tokio::spawn(async move {
        let mut faults = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(None) => {}
                Ok(Some(fault)) => {
                    tracing::error!(%network_id, component = %fault.component, error = %fault.kind, "component faulted");
                    events.emit(ExecutionEvent::ComponentFailed {
                        network_id,
                        component: fault.component.clone(),
                        error: fault.kind.to_string(),
                        timestamp: Utc::now(),
                    });
                    faults.push(fault);
                }
                Err(join_error) => {
                    tracing::error!(%network_id, error = %join_error, "component task aborted");
                }
            }
        }

        // Only aborted tasks can still be short of Terminated here.
        for status in &statuses {
            status.advance(ComponentState::Terminated);
        }
        finish(network_id, &events, started, signal, faults);
    });
}

async fn run_component(launch: Launch) -> Option<RuntimeFault> {
    let Launch {
        name,
        mut component,
        ctx,
        status,
    } = launch;
    tracing::debug!(component = %name, "component running");

    let outcome = AssertUnwindSafe(component.execute(ctx)).catch_unwind().await;
    status.advance(ComponentState::Draining);

    // Dropping the instance releases any port it kept, closing its outputs.
    let released = std::panic::catch_unwind(AssertUnwindSafe(move || drop(component)));

    let kind = match outcome {
        Ok(Ok(())) => None,
        // Downstream hung up or the network was cancelled: an orderly stop.
        Ok(Err(ComponentError::PortClosed(port))) => {
            tracing::debug!(component = %name, %port, "every receiver is gone; stopping");
            None
        }
        Ok(Err(ComponentError::Cancelled)) => {
            tracing::debug!(component = %name, "stopped by cancellation");
            None
        }
        Ok(Err(error)) => Some(FaultKind::Failed(error)),
        Err(panic) => Some(FaultKind::Panicked(panic_message(panic.as_ref()))),
    }
    .or_else(|| {
        released
            .err()
            .map(|panic| FaultKind::Panicked(panic_message(panic.as_ref())))
    });

    status.advance(ComponentState::Terminated);
    kind.map(|kind| RuntimeFault {
        component: name,
        kind,
    })
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn finish(
    network_id: NetworkId,
    events: &EventBus,
    started: Instant,
    signal: CompletionSignal,
    faults: Vec<RuntimeFault>,
) {
    let duration_ms = started.elapsed().as_millis() as u64;
    tracing::info!(%network_id, duration_ms, faults = faults.len(), "network completed");
    events.emit(ExecutionEvent::NetworkCompleted {
        network_id,
        success: faults.is_empty(),
        faults: faults.len(),
        duration_ms,
        timestamp: Utc::now(),
    });
    signal.complete(faults);
}
