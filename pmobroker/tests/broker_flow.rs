//! Tests de flux du broker, sans socket réel
//!
//! La poignée du broker expose exactement ce que les pompes socket
//! utilisent (`connect` / `frame` / `disconnect`) : on pilote la boucle
//! directement et on observe les canaux sortants.

use pmobroker::{Broker, BrokerOptions, ConnId};
use pmowire::{Envelope, Role};
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::timeout;

async fn recv(rx: &mut UnboundedReceiver<String>) -> Envelope {
    let frame = timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("no frame within deadline")
        .expect("outbound channel closed");
    pmowire::parse(&frame).expect("broker must emit valid frames")
}

fn join(handle: &pmobroker::BrokerHandle, conn_id: ConnId, room: &str, role: Role) {
    handle.frame(
        conn_id,
        Envelope::Join {
            room_id: room.to_string(),
            role,
        }
        .to_json(),
    );
}

#[tokio::test]
async fn test_pad_hit_fans_out_to_room_including_sender() {
    let handle = Broker::spawn(BrokerOptions::default());

    let (renderer, mut renderer_rx) = handle.connect();
    let (controller, mut controller_rx) = handle.connect();
    join(&handle, renderer, "studio", Role::Renderer);
    join(&handle, controller, "studio", Role::Controller);

    // L'arrivée du contrôleur publie un request-sync à toute la room.
    assert_eq!(recv(&mut renderer_rx).await, Envelope::RequestSync);
    assert_eq!(recv(&mut controller_rx).await, Envelope::RequestSync);

    let hit = Envelope::PadHit {
        pad_index: 3,
        velocity: Some(100),
    };
    handle.frame(controller, hit.to_json());

    // Le renderer ET l'émetteur reçoivent la trame.
    assert_eq!(recv(&mut renderer_rx).await, hit);
    assert_eq!(recv(&mut controller_rx).await, hit);
}

#[tokio::test]
async fn test_fan_out_preserves_sender_order() {
    let handle = Broker::spawn(BrokerOptions::default());

    let (sender, mut sender_rx) = handle.connect();
    let (observer, mut observer_rx) = handle.connect();
    join(&handle, sender, "studio", Role::Controller);
    join(&handle, observer, "studio", Role::Controller);

    // Drainer les request-sync des deux arrivées.
    assert_eq!(recv(&mut sender_rx).await, Envelope::RequestSync);
    assert_eq!(recv(&mut sender_rx).await, Envelope::RequestSync);
    assert_eq!(recv(&mut observer_rx).await, Envelope::RequestSync);

    for pad_index in 0..10 {
        handle.frame(
            sender,
            Envelope::PadHit {
                pad_index,
                velocity: None,
            }
            .to_json(),
        );
    }

    for pad_index in 0..10 {
        assert_eq!(
            recv(&mut observer_rx).await,
            Envelope::PadHit {
                pad_index,
                velocity: None
            }
        );
    }
}

#[tokio::test]
async fn test_late_join_convergence() {
    let handle = Broker::spawn(BrokerOptions::default());

    // Le renderer est là en premier et publie son état.
    let (renderer, mut renderer_rx) = handle.connect();
    join(&handle, renderer, "studio", Role::Renderer);

    let state = Envelope::SyncState {
        tempo: 140,
        pad_mappings: [(0u8, "kick".to_string())].into_iter().collect(),
    };
    handle.frame(renderer, state.to_json());
    assert_eq!(recv(&mut renderer_rx).await, state);

    // Un contrôleur arrive : le broker demande une resynchronisation.
    let (controller, mut controller_rx) = handle.connect();
    join(&handle, controller, "studio", Role::Controller);
    assert_eq!(recv(&mut renderer_rx).await, Envelope::RequestSync);
    assert_eq!(recv(&mut controller_rx).await, Envelope::RequestSync);

    // Le renderer répond : le contrôleur converge en un aller-retour.
    handle.frame(renderer, state.to_json());
    assert_eq!(recv(&mut controller_rx).await, state);
}

#[tokio::test]
async fn test_sync_state_requires_renderer_role() {
    let handle = Broker::spawn(BrokerOptions::default());

    let (renderer, mut renderer_rx) = handle.connect();
    let (controller, mut controller_rx) = handle.connect();
    join(&handle, renderer, "studio", Role::Renderer);
    join(&handle, controller, "studio", Role::Controller);
    assert_eq!(recv(&mut renderer_rx).await, Envelope::RequestSync);
    assert_eq!(recv(&mut controller_rx).await, Envelope::RequestSync);

    let forged = Envelope::SyncState {
        tempo: 200,
        pad_mappings: Default::default(),
    };
    handle.frame(controller, forged.to_json());

    // L'usurpateur reçoit une erreur...
    assert_eq!(
        recv(&mut controller_rx).await,
        Envelope::Error {
            message: "Only renderer can sync state".into()
        }
    );
    // ... et personne d'autre ne voit la trame.
    assert!(renderer_rx.try_recv().is_err());
}

#[tokio::test]
async fn test_operations_require_join() {
    let handle = Broker::spawn(BrokerOptions::default());
    let (conn, mut rx) = handle.connect();

    handle.frame(
        conn,
        Envelope::PadHit {
            pad_index: 0,
            velocity: None,
        }
        .to_json(),
    );
    assert_eq!(
        recv(&mut rx).await,
        Envelope::Error {
            message: "Not joined".into()
        }
    );

    handle.frame(conn, Envelope::TempoChange { tempo: 120 }.to_json());
    assert_eq!(
        recv(&mut rx).await,
        Envelope::Error {
            message: "Not joined".into()
        }
    );
}

#[tokio::test]
async fn test_malformed_frame_gets_error_and_keeps_socket() {
    let handle = Broker::spawn(BrokerOptions::default());
    let (conn, mut rx) = handle.connect();

    handle.frame(conn, "{broken json".to_string());
    assert_eq!(
        recv(&mut rx).await,
        Envelope::Error {
            message: "Invalid message format".into()
        }
    );

    // Le socket reste utilisable : un join passe toujours.
    join(&handle, conn, "studio", Role::Controller);
    assert_eq!(recv(&mut rx).await, Envelope::RequestSync);
}

#[tokio::test]
async fn test_heartbeat_gets_pong_to_sender_only() {
    let handle = Broker::spawn(BrokerOptions::default());

    let (first, mut first_rx) = handle.connect();
    let (second, mut second_rx) = handle.connect();
    join(&handle, first, "studio", Role::Controller);
    join(&handle, second, "studio", Role::Controller);
    assert_eq!(recv(&mut first_rx).await, Envelope::RequestSync);
    assert_eq!(recv(&mut first_rx).await, Envelope::RequestSync);
    assert_eq!(recv(&mut second_rx).await, Envelope::RequestSync);

    handle.frame(first, Envelope::Heartbeat.to_json());
    assert_eq!(recv(&mut first_rx).await, Envelope::Pong);
    assert!(second_rx.try_recv().is_err());
}

#[tokio::test]
async fn test_switching_rooms_leaves_previous_one() {
    let handle = Broker::spawn(BrokerOptions::default());

    let (stayer, mut stayer_rx) = handle.connect();
    let (mover, mut mover_rx) = handle.connect();
    join(&handle, stayer, "room-a", Role::Controller);
    join(&handle, mover, "room-a", Role::Controller);
    assert_eq!(recv(&mut stayer_rx).await, Envelope::RequestSync);
    assert_eq!(recv(&mut stayer_rx).await, Envelope::RequestSync);
    assert_eq!(recv(&mut mover_rx).await, Envelope::RequestSync);

    // Changement de room : une connexion n'appartient qu'à une room.
    join(&handle, mover, "room-b", Role::Controller);
    assert_eq!(recv(&mut mover_rx).await, Envelope::RequestSync);

    let hit = Envelope::PadHit {
        pad_index: 7,
        velocity: None,
    };
    handle.frame(stayer, hit.to_json());
    assert_eq!(recv(&mut stayer_rx).await, hit);

    // L'ancien membre de room-a ne voit plus rien.
    assert!(mover_rx.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn test_stale_connection_is_swept() {
    let handle = Broker::spawn(BrokerOptions {
        heartbeat_timeout: Duration::from_millis(100),
        sweep_interval: Duration::from_millis(50),
    });

    let (_conn, mut rx) = handle.connect();

    // Aucune trame : au-delà de la fenêtre, le broker ferme la connexion
    // (le canal sortant tombe, la tâche d'écriture fermerait le socket).
    let closed = timeout(Duration::from_secs(5), rx.recv()).await;
    assert_eq!(closed.expect("sweep must close the connection"), None);
}

#[tokio::test(start_paused = true)]
async fn test_heartbeats_keep_connection_alive() {
    let handle = Broker::spawn(BrokerOptions::default());
    let (conn, mut rx) = handle.connect();

    // Cadence client de 25 s contre une fenêtre de 30 s : cinq minutes
    // d'inactivité métier sans fermeture.
    for _ in 0..12 {
        tokio::time::sleep(Duration::from_secs(25)).await;
        handle.frame(conn, Envelope::Heartbeat.to_json());
        assert_eq!(recv(&mut rx).await, Envelope::Pong);
    }

    handle.frame(conn, Envelope::Heartbeat.to_json());
    assert_eq!(recv(&mut rx).await, Envelope::Pong);
}
