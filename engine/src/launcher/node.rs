//! Local node identity worker

use sdk::errors::EngineError;
use tracing::{info, warn};

use super::NodeInfo;
use crate::actor::{self, mailbox, ActorHandle, Inbox, Mailbox};
use crate::observable::{Observable, ObservableRef};

enum NodeCommand {
    Update(Box<NodeInfo>),
    Reset,
    Stop,
}

/// Handle used to feed node information to the worker
#[derive(Clone)]
pub struct NodeInfoHandle {
    commands: Mailbox<NodeCommand>,
    observable: ObservableRef<NodeInfo>,
}

impl NodeInfoHandle {
    pub fn update_node(&self, node: NodeInfo) -> Result<(), EngineError> {
        self.commands.send(NodeCommand::Update(Box::new(node)))
    }

    /// Withdraw the node information, e.g. after losing the master connection
    pub fn reset_node(&self) -> Result<(), EngineError> {
        self.commands.send(NodeCommand::Reset)
    }

    pub fn stop(&self) {
        let _ = self.commands.send(NodeCommand::Stop);
    }

    pub fn observable_ref(&self) -> ObservableRef<NodeInfo> {
        self.observable.clone()
    }
}

/// Actor owning the `node_info` observable
pub struct NodeInfoWorker {
    observable: Observable<NodeInfo>,
    inbox: Inbox<NodeCommand>,
}

impl NodeInfoWorker {
    pub fn spawn() -> (NodeInfoHandle, ActorHandle<()>) {
        let (commands, inbox) = mailbox("node_info_worker");
        let observable = Observable::new("node_info");
        let handle = NodeInfoHandle {
            commands,
            observable: observable.observable_ref(),
        };

        let mut worker = Self { observable, inbox };
        let join = actor::spawn("node_info_worker", async move {
            worker.observable.claim();
            worker.run().await
        });

        (handle, join)
    }

    async fn run(mut self) {
        info!("node info worker started");

        loop {
            tokio::select! {
                biased;

                command = self.inbox.recv() => match command {
                    Some(NodeCommand::Update(node)) => self.update(*node),
                    Some(NodeCommand::Reset) => self.observable.reset(),
                    Some(NodeCommand::Stop) | None => break,
                },
                Some(request) = self.observable.next_request() => {
                    self.observable.handle_request(request);
                }
            }
        }

        info!("node info worker stopped");
    }

    fn update(&mut self, node: NodeInfo) {
        if !node.grid.subnet.contains(node.overlay_ip) {
            warn!(
                "node {} overlay ip {} is outside grid subnet {}, withdrawing node info",
                node.name, node.overlay_ip, node.grid.subnet
            );
            self.observable.reset();
            return;
        }

        info!("node {} (#{}) in grid {}", node.name, node.node_number, node.grid.name);

        if let Err(e) = self.observable.update(node) {
            warn!("failed to publish node info: {}", e);
        }
    }
}
