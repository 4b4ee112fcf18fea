//! Cluster service launcher

use std::sync::Arc;
use tracing::{error, info, warn};

use super::{
    Control, LauncherHandle, NodeInfo, OverlayStatus, ServiceBackend, ServiceSpec, ServiceState,
};
use crate::actor::{self, mailbox, ActorHandle, Inbox};
use crate::observable::{Observable, ObservableRef};
use crate::observer::Observer;

/// Actor owning the `service` observable
///
/// Waits until both the node and the overlay are known, then asks the
/// backend to (re)create the service on every change of either. A failed
/// attempt resets the observable.
pub struct ServiceLauncher {
    backend: Arc<dyn ServiceBackend>,
    observable: Observable<ServiceState>,
    node: ObservableRef<NodeInfo>,
    overlay: ObservableRef<OverlayStatus>,
    control: Inbox<Control>,
}

impl ServiceLauncher {
    pub fn spawn(
        backend: Arc<dyn ServiceBackend>,
        node: ObservableRef<NodeInfo>,
        overlay: ObservableRef<OverlayStatus>,
    ) -> (LauncherHandle<ServiceState>, ActorHandle<()>) {
        let (control, inbox) = mailbox("service_launcher");
        let observable = Observable::new("service");
        let handle = LauncherHandle::new("service_launcher", control, observable.observable_ref());

        let mut launcher = Self {
            backend,
            observable,
            node,
            overlay,
            control: inbox,
        };
        let join = actor::spawn("service_launcher", async move {
            launcher.observable.claim();
            launcher.run().await
        });

        (handle, join)
    }

    async fn run(mut self) {
        info!("service launcher started with {} backend", self.backend.name());

        let mut inputs = Observer::with_label(
            (self.node.clone(), self.overlay.clone()),
            "service_launcher",
        );
        if let Err(e) = inputs.subscribe().await {
            error!("service launcher cannot observe its inputs: {}", e);
            return;
        }

        loop {
            tokio::select! {
                biased;

                control = self.control.recv() => match control {
                    Some(Control::Stop) | None => break,
                },
                Some(request) = self.observable.next_request() => {
                    self.observable.handle_request(request);
                }
                joined = inputs.next() => match joined {
                    Some(Ok((node, overlay))) => self.apply(&node, &overlay).await,
                    Some(Err(e)) => warn!("service launcher: {}", e),
                    None => {
                        warn!("service inputs are gone, stopping service launcher");
                        break;
                    }
                },
            }
        }

        info!("service launcher stopped");
    }

    async fn apply(&mut self, node: &NodeInfo, overlay: &OverlayStatus) {
        let result = match ServiceSpec::for_node(node, overlay) {
            Ok(spec) => {
                info!(
                    "ensuring service {} as {:?} of {} initial members",
                    spec.name,
                    spec.membership,
                    spec.initial_cluster.len()
                );
                self.backend.ensure(&spec).await
            }
            Err(e) => Err(e.into()),
        };

        match result {
            Ok(state) => {
                info!("service {} running={}", state.name, state.running);
                if let Err(e) = self.observable.update(state) {
                    warn!("failed to publish service state: {}", e);
                }
            }
            Err(e) => {
                error!("service setup failed: {:#}", e);
                self.observable.reset();
            }
        }
    }
}
