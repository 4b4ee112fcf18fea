//! Overlay network launcher

use std::sync::Arc;
use tracing::{debug, error, info, warn};

use super::{Control, LauncherHandle, NodeInfo, OverlayNetwork, OverlayStatus};
use crate::actor::{self, mailbox, ActorHandle, Inbox};
use crate::observable::{Observable, ObservableRef};
use crate::observer::Observer;

/// Actor owning the `overlay` observable
///
/// Follows the node observable and re-runs the overlay backend on every
/// node change.
pub struct OverlayLauncher {
    network: Arc<dyn OverlayNetwork>,
    observable: Observable<OverlayStatus>,
    node: ObservableRef<NodeInfo>,
    control: Inbox<Control>,
}

impl OverlayLauncher {
    pub fn spawn(
        network: Arc<dyn OverlayNetwork>,
        node: ObservableRef<NodeInfo>,
    ) -> (LauncherHandle<OverlayStatus>, ActorHandle<()>) {
        let (control, inbox) = mailbox("overlay_launcher");
        let observable = Observable::new("overlay");
        let handle = LauncherHandle::new("overlay_launcher", control, observable.observable_ref());

        let mut launcher = Self {
            network,
            observable,
            node,
            control: inbox,
        };
        let join = actor::spawn("overlay_launcher", async move {
            launcher.observable.claim();
            launcher.run().await
        });

        (handle, join)
    }

    async fn run(mut self) {
        info!("overlay launcher started with {} backend", self.network.name());

        let mut node = Observer::with_label(self.node.clone(), "overlay_launcher");
        if let Err(e) = node.subscribe().await {
            error!("overlay launcher cannot observe node info: {}", e);
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
                joined = node.next() => match joined {
                    Some(Ok(info)) => self.apply(&info).await,
                    Some(Err(e)) => warn!("overlay launcher: {}", e),
                    None => {
                        warn!("node info is gone, stopping overlay launcher");
                        break;
                    }
                },
            }
        }

        info!("overlay launcher stopped");
    }

    async fn apply(&mut self, node: &NodeInfo) {
        debug!("ensuring overlay for {}", node.name);

        match self.network.ensure(node).await {
            Ok(status) => {
                info!("overlay {} up with ip {}", status.interface, status.overlay_ip);
                if let Err(e) = self.observable.update(status) {
                    warn!("failed to publish overlay status: {}", e);
                }
            }
            Err(e) => {
                error!("overlay setup failed: {:#}", e);
                self.observable.reset();
            }
        }
    }
}
