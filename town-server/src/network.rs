//! Network handling for the town server
//!
//! One task owns the [`Town`] and applies connection events one at a time.
//! Each connection gets a reader loop feeding that task and a writer task
//! draining its outgoing messages. After every event the town task forwards
//! the area models the event produced to every client, in the order they
//! were emitted.

use crate::config::ServerConfig;
use crate::metrics::{truncate_id, LogLevel, Metrics, ServerStatus};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::error::Error;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast::error::TryRecvError;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};
use watchparty_core::ids::generate_player_id;
use watchparty_core::relay::{read_frame, write_frame, RelayError};
use watchparty_core::sync::{ClientMessage, PlayerId, ServerMessage};
use watchparty_core::{Town, TownEmitter, TownEvent};

/// Capacity of the town event channel
const TOWN_EVENT_CAPACITY: usize = 256;

pub type BoxError = Box<dyn Error + Send + Sync>;

/// Events sent from connections to the town task
#[derive(Debug)]
pub enum TownInput {
    Connected {
        player_id: PlayerId,
        tx: mpsc::UnboundedSender<ServerMessage>,
    },
    Message {
        player_id: PlayerId,
        message: ClientMessage,
    },
    Disconnected {
        player_id: PlayerId,
    },
}

/// Build the town from the configured map and serve it
pub async fn run_with_dashboard(
    config: ServerConfig,
    metrics: Arc<RwLock<Metrics>>,
) -> Result<(), BoxError> {
    info!("Town server starting...");

    let map_json = config.load_map_json()?;
    let town = Town::from_map_json(
        config.town_id.clone(),
        &map_json,
        TownEmitter::new(TOWN_EVENT_CAPACITY),
    )?;

    {
        let mut m = metrics.write();
        m.set_areas(&town.snapshot());
        m.log(
            LogLevel::Info,
            format!(
                "Town {} loaded from {} map: {} viewing areas",
                town.town_id(),
                config.map_name(),
                town.area_ids().len()
            ),
        );
    }

    let listener = TcpListener::bind(("0.0.0.0", config.tcp_port)).await?;
    info!("Listening on TCP:{}", config.tcp_port);
    {
        let mut m = metrics.write();
        m.status = ServerStatus::Running;
        m.log(LogLevel::Info, format!("Listening on TCP:{}", config.tcp_port));
    }

    serve(listener, town, metrics).await?;
    Ok(())
}

/// Run with plain logging (no dashboard)
pub async fn run_with_logging(
    config: ServerConfig,
    metrics: Arc<RwLock<Metrics>>,
) -> Result<(), BoxError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("town_server=info".parse()?)
                .add_directive("watchparty_core=info".parse()?),
        )
        .init();

    run_with_dashboard(config, metrics).await
}

/// Accept connections until the listener fails
pub async fn serve(
    listener: TcpListener,
    town: Town,
    metrics: Arc<RwLock<Metrics>>,
) -> std::io::Result<()> {
    let (input_tx, input_rx) = mpsc::unbounded_channel();
    tokio::spawn(run_town(town, input_rx, Arc::clone(&metrics)));

    loop {
        let (socket, addr) = listener.accept().await?;
        tokio::spawn(handle_connection(
            socket,
            addr,
            input_tx.clone(),
            Arc::clone(&metrics),
        ));
    }
}

async fn run_town(
    mut town: Town,
    mut input_rx: mpsc::UnboundedReceiver<TownInput>,
    metrics: Arc<RwLock<Metrics>>,
) {
    let mut events = town.emitter().subscribe();
    let mut clients: HashMap<PlayerId, mpsc::UnboundedSender<ServerMessage>> = HashMap::new();

    while let Some(input) = input_rx.recv().await {
        let reply = match input {
            TownInput::Connected { player_id, tx } => {
                town.add_player(&player_id);
                let welcome = ServerMessage::Welcome {
                    player_id: player_id.clone(),
                    town_id: town.town_id().to_string(),
                    areas: town.snapshot(),
                };
                let _ = tx.send(welcome);
                clients.insert(player_id, tx);
                None
            }
            TownInput::Message { player_id, message } => {
                handle_message(&mut town, &player_id, message, &metrics)
                    .map(|reply| (player_id, reply))
            }
            TownInput::Disconnected { player_id } => {
                clients.remove(&player_id);
                if let Err(e) = town.remove_player(&player_id) {
                    debug!("Disconnect of {}: {}", player_id, e);
                }
                None
            }
        };

        fan_out(&mut events, &clients, &metrics);

        if let Some((player_id, reply)) = reply {
            if let Some(tx) = clients.get(&player_id) {
                let _ = tx.send(reply);
            }
        }
    }
    debug!("Town task stopped");
}

/// Apply one client message; returns the reply for the sender, if any
fn handle_message(
    town: &mut Town,
    player_id: &str,
    message: ClientMessage,
    metrics: &Arc<RwLock<Metrics>>,
) -> Option<ServerMessage> {
    match message {
        ClientMessage::EnterArea { area_id } => {
            match town.enter_area(player_id, &area_id) {
                Ok(()) => info!("{} entered {}", player_id, area_id),
                Err(e) => warn!("{} could not enter {}: {}", player_id, area_id, e),
            }
            None
        }
        ClientMessage::LeaveArea => {
            if let Err(e) = town.leave_area(player_id) {
                warn!("{} could not leave area: {}", player_id, e);
            }
            None
        }
        ClientMessage::Command {
            command_id,
            command,
        } => {
            let error = match town.handle_command(&command) {
                Ok(_) => {
                    metrics.write().command_handled();
                    None
                }
                Err(e) => {
                    warn!("Command {} from {} rejected: {}", command_id, player_id, e);
                    metrics.write().command_rejected(player_id, &e.to_string());
                    Some(e.to_string())
                }
            };
            Some(ServerMessage::CommandResult { command_id, error })
        }
    }
}

/// Forward every pending town event to every client
fn fan_out(
    events: &mut broadcast::Receiver<TownEvent>,
    clients: &HashMap<PlayerId, mpsc::UnboundedSender<ServerMessage>>,
    metrics: &Arc<RwLock<Metrics>>,
) {
    loop {
        match events.try_recv() {
            Ok(TownEvent::InteractableUpdate(area)) => {
                metrics.write().broadcast_sent(&area);
                for tx in clients.values() {
                    let _ = tx.send(ServerMessage::AreaUpdate { area: area.clone() });
                }
            }
            Err(TryRecvError::Lagged(skipped)) => {
                warn!("Dropped {} town events", skipped);
            }
            Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
        }
    }
}

async fn handle_connection(
    socket: TcpStream,
    addr: SocketAddr,
    input_tx: mpsc::UnboundedSender<TownInput>,
    metrics: Arc<RwLock<Metrics>>,
) {
    let player_id = generate_player_id();
    let short_id = truncate_id(&player_id);
    if let Err(e) = socket.set_nodelay(true) {
        debug!("Could not set TCP_NODELAY for {}: {}", addr, e);
    }
    let (mut read_half, mut write_half) = socket.into_split();
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerMessage>();

    info!("Client connected: {} from {}", short_id, addr);
    metrics
        .write()
        .client_connected(&player_id, &addr.to_string());

    if input_tx
        .send(TownInput::Connected {
            player_id: player_id.clone(),
            tx,
        })
        .is_err()
    {
        warn!("Town task is gone, dropping {}", short_id);
        return;
    }

    let writer = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            if let Err(e) = write_frame(&mut write_half, &message).await {
                debug!("Write failed: {}", e);
                break;
            }
        }
    });

    loop {
        match read_frame::<ClientMessage, _>(&mut read_half).await {
            Ok(message) => {
                let input = TownInput::Message {
                    player_id: player_id.clone(),
                    message,
                };
                if input_tx.send(input).is_err() {
                    break;
                }
            }
            Err(RelayError::Protocol(e)) => {
                warn!("Malformed message from {}: {}", short_id, e);
                metrics
                    .write()
                    .log(LogLevel::Warning, format!("Malformed message from {}", short_id));
            }
            Err(e) => {
                debug!("Connection {} ended: {}", short_id, e);
                break;
            }
        }
    }

    let _ = input_tx.send(TownInput::Disconnected {
        player_id: player_id.clone(),
    });
    writer.abort();

    info!("Client disconnected: {}", short_id);
    metrics.write().client_disconnected(&player_id);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BUILTIN_MAP;
    use std::time::Duration;
    use tokio::time::timeout;
    use watchparty_core::sync::{InteractableCommand, ViewingAreaModel};
    use watchparty_core::{TownClient, TownRelay};

    const WAIT: Duration = Duration::from_secs(5);

    fn test_metrics() -> Arc<RwLock<Metrics>> {
        let config = ServerConfig {
            use_dashboard: false,
            tcp_port: 0,
            town_id: "TEST".to_string(),
            map_path: None,
        };
        Arc::new(RwLock::new(Metrics::new(&config)))
    }

    async fn start_server() -> (SocketAddr, Arc<RwLock<Metrics>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let town = Town::from_map_json("TEST", BUILTIN_MAP, TownEmitter::new(64)).unwrap();
        let metrics = test_metrics();
        tokio::spawn(serve(listener, town, Arc::clone(&metrics)));
        (addr, metrics)
    }

    async fn next_model(rx: &mut broadcast::Receiver<ViewingAreaModel>) -> ViewingAreaModel {
        timeout(WAIT, rx.recv()).await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn test_update_reaches_other_client() {
        let (addr, metrics) = start_server().await;
        let (alice, alice_relay) = TownClient::connect(addr).await.unwrap();
        let (bob, _bob_relay) = TownClient::connect(addr).await.unwrap();
        assert_eq!(alice.area_ids(), vec!["Cinema".to_string(), "Lounge".to_string()]);
        assert_ne!(alice.player_id(), bob.player_id());

        let mut bob_models = bob.subscribe_models();

        alice_relay.enter_area("Cinema").unwrap();
        let entered = next_model(&mut bob_models).await;
        assert_eq!(entered.id, "Cinema");
        assert_eq!(entered.occupants, vec![alice.player_id().to_string()]);

        let mut model = alice.controller("Cinema").unwrap().lock().to_model();
        model.video = Some("https://www.youtube.com/watch?v=abc".to_string());
        model.is_playing = true;
        alice_relay.push_viewing_area_update(model);

        let updated = next_model(&mut bob_models).await;
        assert_eq!(updated.video.as_deref(), Some("https://www.youtube.com/watch?v=abc"));
        {
            let cinema = bob.controller("Cinema").unwrap();
            let cinema = cinema.lock();
            assert!(cinema.is_playing());
            assert_eq!(cinema.video(), Some("https://www.youtube.com/watch?v=abc"));
        }

        // Last occupant disconnecting clears the video for everyone
        alice.close().await;
        let cleared = next_model(&mut bob_models).await;
        assert_eq!(cleared.id, "Cinema");
        assert_eq!(cleared.video, None);
        assert!(cleared.occupants.is_empty());

        {
            let m = metrics.read();
            assert_eq!(m.commands_handled, 1);
            assert_eq!(m.total_clients, 2);
            assert!(m.broadcasts_sent >= 3);
        }
        bob.close().await;
    }

    #[tokio::test]
    async fn test_rejected_command_and_bad_frame() {
        let (addr, metrics) = start_server().await;
        let mut socket = TcpStream::connect(addr).await.unwrap();

        let welcome: ServerMessage = read_frame(&mut socket).await.unwrap();
        assert!(matches!(welcome, ServerMessage::Welcome { ref areas, .. } if areas.len() == 2));

        // Garbage is skipped, the connection stays up
        let garbage = b"{oops";
        tokio::io::AsyncWriteExt::write_all(&mut socket, &(garbage.len() as u32).to_be_bytes())
            .await
            .unwrap();
        tokio::io::AsyncWriteExt::write_all(&mut socket, garbage)
            .await
            .unwrap();

        let unknown = ClientMessage::Command {
            command_id: 7,
            command: InteractableCommand::Unrecognized,
        };
        write_frame(&mut socket, &unknown).await.unwrap();
        let result: ServerMessage = timeout(WAIT, read_frame(&mut socket)).await.unwrap().unwrap();
        match result {
            ServerMessage::CommandResult { command_id, error } => {
                assert_eq!(command_id, 7);
                assert_eq!(error.as_deref(), Some("Unknown command type"));
            }
            other => panic!("unexpected message {:?}", other),
        }

        let missing = ClientMessage::Command {
            command_id: 8,
            command: InteractableCommand::ViewingAreaUpdate {
                area_id: "Nowhere".to_string(),
                update: ViewingAreaModel::new("Nowhere"),
            },
        };
        write_frame(&mut socket, &missing).await.unwrap();
        let result: ServerMessage = timeout(WAIT, read_frame(&mut socket)).await.unwrap().unwrap();
        assert!(matches!(
            result,
            ServerMessage::CommandResult { command_id: 8, error: Some(_) }
        ));

        assert_eq!(metrics.read().commands_rejected, 2);
    }

    #[tokio::test]
    async fn test_accepted_command_is_broadcast_before_result() {
        let (addr, _metrics) = start_server().await;
        let mut socket = TcpStream::connect(addr).await.unwrap();
        let _welcome: ServerMessage = read_frame(&mut socket).await.unwrap();

        let mut update = ViewingAreaModel::new("Lounge");
        update.video = Some("v".to_string());
        let command = ClientMessage::Command {
            command_id: 1,
            command: InteractableCommand::ViewingAreaUpdate {
                area_id: "Lounge".to_string(),
                update,
            },
        };
        write_frame(&mut socket, &command).await.unwrap();

        let first: ServerMessage = timeout(WAIT, read_frame(&mut socket)).await.unwrap().unwrap();
        match first {
            ServerMessage::AreaUpdate { area } => {
                assert_eq!(area.id, "Lounge");
                assert_eq!(area.video.as_deref(), Some("v"));
            }
            other => panic!("unexpected message {:?}", other),
        }
        let second: ServerMessage = timeout(WAIT, read_frame(&mut socket)).await.unwrap().unwrap();
        assert_eq!(
            second,
            ServerMessage::CommandResult {
                command_id: 1,
                error: None
            }
        );
    }
}
