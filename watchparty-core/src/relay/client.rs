//! Town client
//!
//! One TCP connection to a town server. A writer task drains outgoing
//! messages so pushes never block, and a reader task applies authoritative
//! area models to the local controllers in the order they arrive.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::frame::{read_frame, write_frame, RelayError};
use crate::controller::{SharedController, ViewingAreaController};
use crate::sync::{ClientMessage, InteractableCommand, PlayerId, ServerMessage, ViewingAreaModel};

/// Capacity of the model broadcast; slow subscribers skip older models
const MODEL_CHANNEL_CAPACITY: usize = 64;

/// Outbound side of the town connection, as seen by a playback engine
pub trait TownRelay: Send + Sync {
    /// Send a full snapshot of an area to the town. Fire-and-forget: delivery
    /// failures are logged and dropped.
    fn push_viewing_area_update(&self, model: ViewingAreaModel);
}

/// Commands sent to the writer task
#[derive(Debug)]
enum ClientCommand {
    Send(ClientMessage),
    Shutdown,
}

/// Handle to communicate with the running connection
#[derive(Clone)]
pub struct RelayHandle {
    command_tx: mpsc::UnboundedSender<ClientCommand>,
    next_command_id: Arc<AtomicU64>,
    pub player_id: PlayerId,
}

impl RelayHandle {
    pub fn enter_area(&self, area_id: &str) -> Result<(), RelayError> {
        self.send(ClientMessage::EnterArea {
            area_id: area_id.to_string(),
        })
    }

    pub fn leave_area(&self) -> Result<(), RelayError> {
        self.send(ClientMessage::LeaveArea)
    }

    /// Queue a command; returns the id its `CommandResult` will carry
    pub fn send_command(&self, command: InteractableCommand) -> Result<u64, RelayError> {
        let command_id = self.next_command_id.fetch_add(1, Ordering::Relaxed);
        self.send(ClientMessage::Command {
            command_id,
            command,
        })?;
        Ok(command_id)
    }

    pub fn shutdown(&self) {
        let _ = self.command_tx.send(ClientCommand::Shutdown);
    }

    fn send(&self, message: ClientMessage) -> Result<(), RelayError> {
        self.command_tx
            .send(ClientCommand::Send(message))
            .map_err(|_| RelayError::Closed)
    }
}

impl TownRelay for RelayHandle {
    fn push_viewing_area_update(&self, model: ViewingAreaModel) {
        let command = InteractableCommand::ViewingAreaUpdate {
            area_id: model.id.clone(),
            update: model,
        };
        if let Err(e) = self.send_command(command) {
            warn!("Dropping viewing area update: {}", e);
        }
    }
}

type ControllerMap = Arc<RwLock<HashMap<String, SharedController>>>;

/// A live connection to one town
pub struct TownClient {
    player_id: PlayerId,
    town_id: String,
    controllers: ControllerMap,
    models_tx: broadcast::Sender<ViewingAreaModel>,
    handle: RelayHandle,
    writer: JoinHandle<()>,
    reader: JoinHandle<()>,
}

impl TownClient {
    /// Connect and wait for the server's `Welcome`.
    ///
    /// Returns the client together with a relay handle for playback engines.
    pub async fn connect<A: ToSocketAddrs>(addr: A) -> Result<(Self, RelayHandle), RelayError> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        let (mut read_half, write_half) = stream.into_split();

        let (player_id, town_id, areas) = match read_frame::<ServerMessage, _>(&mut read_half).await? {
            ServerMessage::Welcome {
                player_id,
                town_id,
                areas,
            } => (player_id, town_id, areas),
            other => {
                return Err(RelayError::Protocol(format!(
                    "Expected Welcome, got {:?}",
                    other
                )))
            }
        };
        info!(
            "Joined town {} as {} ({} viewing areas)",
            town_id,
            player_id,
            areas.len()
        );

        let controllers: ControllerMap = Arc::new(RwLock::new(
            areas
                .into_iter()
                .map(|model| (model.id.clone(), ViewingAreaController::new(model).into_shared()))
                .collect(),
        ));
        let (models_tx, _) = broadcast::channel(MODEL_CHANNEL_CAPACITY);
        let (command_tx, command_rx) = mpsc::unbounded_channel();

        let handle = RelayHandle {
            command_tx,
            next_command_id: Arc::new(AtomicU64::new(1)),
            player_id: player_id.clone(),
        };

        let writer = tokio::spawn(run_writer(write_half, command_rx));
        let reader = tokio::spawn(run_reader(
            read_half,
            Arc::clone(&controllers),
            models_tx.clone(),
        ));

        let client = Self {
            player_id,
            town_id,
            controllers,
            models_tx,
            handle: handle.clone(),
            writer,
            reader,
        };
        Ok((client, handle))
    }

    pub fn player_id(&self) -> &str {
        &self.player_id
    }

    pub fn town_id(&self) -> &str {
        &self.town_id
    }

    /// Controller mirroring `area_id`, if the town has told us about it
    pub fn controller(&self, area_id: &str) -> Option<SharedController> {
        self.controllers.read().get(area_id).cloned()
    }

    /// Ids of every known area, sorted
    pub fn area_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.controllers.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Receive every area model after it has been applied locally
    pub fn subscribe_models(&self) -> broadcast::Receiver<ViewingAreaModel> {
        self.models_tx.subscribe()
    }

    pub fn handle(&self) -> RelayHandle {
        self.handle.clone()
    }

    /// Flush pending messages and stop both tasks
    pub async fn close(self) {
        self.handle.shutdown();
        if let Err(e) = self.writer.await {
            debug!("Writer task ended abnormally: {}", e);
        }
        self.reader.abort();
        info!("Left town {}", self.town_id);
    }
}

async fn run_writer(
    mut write_half: OwnedWriteHalf,
    mut command_rx: mpsc::UnboundedReceiver<ClientCommand>,
) {
    while let Some(command) = command_rx.recv().await {
        match command {
            ClientCommand::Send(message) => {
                if let Err(e) = write_frame(&mut write_half, &message).await {
                    warn!("Failed to send to town: {}", e);
                    break;
                }
            }
            ClientCommand::Shutdown => {
                debug!("Relay writer shutting down");
                break;
            }
        }
    }
    let _ = write_half.shutdown().await;
}

async fn run_reader(
    mut read_half: OwnedReadHalf,
    controllers: ControllerMap,
    models_tx: broadcast::Sender<ViewingAreaModel>,
) {
    loop {
        let message = match read_frame::<ServerMessage, _>(&mut read_half).await {
            Ok(message) => message,
            Err(RelayError::Protocol(e)) => {
                warn!("Ignoring malformed message from town: {}", e);
                continue;
            }
            Err(e) => {
                info!("Town connection closed: {}", e);
                break;
            }
        };

        match message {
            ServerMessage::AreaUpdate { area } => {
                apply_area_update(&controllers, &area);
                let _ = models_tx.send(area);
            }
            ServerMessage::CommandResult {
                command_id,
                error: Some(error),
            } => {
                warn!("Command {} rejected: {}", command_id, error);
            }
            ServerMessage::CommandResult { command_id, .. } => {
                debug!("Command {} accepted", command_id);
            }
            ServerMessage::Welcome { .. } => {
                warn!("Ignoring repeated Welcome");
            }
        }
    }
}

fn apply_area_update(controllers: &ControllerMap, area: &ViewingAreaModel) {
    // Clone the Arc out so listeners never run under the map lock
    let existing = controllers.read().get(&area.id).cloned();
    match existing {
        Some(controller) => controller.lock().apply_remote_update(area),
        None => {
            debug!("New viewing area {}", area.id);
            controllers.write().insert(
                area.id.clone(),
                ViewingAreaController::new(area.clone()).into_shared(),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    async fn listen() -> (TcpListener, std::net::SocketAddr) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        (listener, addr)
    }

    fn welcome() -> ServerMessage {
        ServerMessage::Welcome {
            player_id: "p1".to_string(),
            town_id: "TOWN-0001".to_string(),
            areas: vec![ViewingAreaModel::new("Area1")],
        }
    }

    #[tokio::test]
    async fn test_connect_builds_controllers_from_welcome() {
        let (listener, addr) = listen().await;
        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            write_frame(&mut socket, &welcome()).await.unwrap();
            // Hold the socket open until the client goes away
            let _ = read_frame::<ClientMessage, _>(&mut socket).await;
        });

        let (client, relay) = TownClient::connect(addr).await.unwrap();
        assert_eq!(client.player_id(), "p1");
        assert_eq!(relay.player_id, "p1");
        assert_eq!(client.town_id(), "TOWN-0001");
        assert_eq!(client.area_ids(), vec!["Area1".to_string()]);
        assert!(client.controller("Area1").is_some());
        assert!(client.controller("Nope").is_none());

        client.close().await;
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_connect_requires_welcome_first() {
        let (listener, addr) = listen().await;
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let message = ServerMessage::AreaUpdate {
                area: ViewingAreaModel::new("Area1"),
            };
            write_frame(&mut socket, &message).await.unwrap();
        });

        let result = TownClient::connect(addr).await;
        assert!(matches!(result, Err(RelayError::Protocol(_))));
    }

    #[tokio::test]
    async fn test_push_and_remote_update() {
        let (listener, addr) = listen().await;
        let (received_tx, mut received_rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            write_frame(&mut socket, &welcome()).await.unwrap();

            let pushed: ClientMessage = read_frame(&mut socket).await.unwrap();
            received_tx.send(pushed).unwrap();

            let mut playing = ViewingAreaModel::new("Area1");
            playing.video = Some("v".to_string());
            playing.is_playing = true;
            playing.occupants = vec!["p1".to_string()];
            write_frame(&mut socket, &ServerMessage::AreaUpdate { area: playing })
                .await
                .unwrap();
            write_frame(
                &mut socket,
                &ServerMessage::AreaUpdate {
                    area: ViewingAreaModel::new("Area2"),
                },
            )
            .await
            .unwrap();
            let _ = read_frame::<ClientMessage, _>(&mut socket).await;
        });

        let (client, relay) = TownClient::connect(addr).await.unwrap();
        let mut models = client.subscribe_models();
        let controller = client.controller("Area1").unwrap();

        let mut model = controller.lock().to_model();
        model.video = Some("v".to_string());
        relay.push_viewing_area_update(model.clone());

        match received_rx.recv().await.unwrap() {
            ClientMessage::Command {
                command_id,
                command: InteractableCommand::ViewingAreaUpdate { area_id, update },
            } => {
                assert_eq!(command_id, 1);
                assert_eq!(area_id, "Area1");
                assert_eq!(update, model);
            }
            other => panic!("unexpected message {:?}", other),
        }

        let first = models.recv().await.unwrap();
        assert_eq!(first.id, "Area1");
        {
            let controller = controller.lock();
            assert!(controller.is_playing());
            assert_eq!(controller.video(), Some("v"));
            assert_eq!(controller.occupants(), ["p1".to_string()]);
        }

        let second = models.recv().await.unwrap();
        assert_eq!(second.id, "Area2");
        assert!(client.controller("Area2").is_some());

        client.close().await;
    }

    #[tokio::test]
    async fn test_handle_fails_after_close() {
        let (listener, addr) = listen().await;
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            write_frame(&mut socket, &welcome()).await.unwrap();
            let _ = read_frame::<ClientMessage, _>(&mut socket).await;
        });

        let (client, relay) = TownClient::connect(addr).await.unwrap();
        client.close().await;
        assert!(matches!(relay.leave_area(), Err(RelayError::Closed)));
    }
}
