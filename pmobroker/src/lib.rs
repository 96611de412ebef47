//! # pmobroker - Fan-out de rooms pour PMOPads
//!
//! Le broker est l'autorité du protocole : il valide chaque trame,
//! applique le contrat des rôles (seul le renderer publie `sync-state`),
//! fait converger les arrivées tardives (un `request-sync` est publié à
//! chaque arrivée de contrôleur) et ferme les connexions muettes au-delà
//! de la fenêtre de heartbeat.
//!
//! ## Architecture
//!
//! Une seule tâche possède tout l'état (fiches de connexion + registre
//! des rooms) et consomme une file d'événements `Open` / `Frame` /
//! `Closed` alimentée par les pompes socket. Le fan-out écrit dans le
//! canal sortant de chaque abonné, drainé par la tâche d'écriture du
//! socket : l'ordre par abonné est l'ordre de dispatch de la boucle.
//!
//! Le broker ne regarde jamais le contenu métier des `pad-hit` au-delà
//! des bornes, et le protocole ne transporte aucun timestamp client : il
//! n'y a pas d'horloge cliente à laquelle faire confiance.
//!
//! ## Montage
//!
//! ```rust,ignore
//! use pmobroker::{BrokerOptions, PadBrokerServerExt};
//! use pmoserver::ServerBuilder;
//!
//! let mut server = ServerBuilder::new_configured().build();
//! let broker = server.register_pad_broker(BrokerOptions::default()).await;
//! server.start().await;
//! ```

pub mod broker;
pub mod config_ext;
pub mod connection;
pub mod registry;
pub mod server_ext;
pub mod ws;

pub use broker::{Broker, BrokerEvent, BrokerHandle, BrokerOptions};
pub use config_ext::BrokerConfigExt;
pub use connection::{ConnId, RoomConnection};
pub use registry::RoomRegistry;
pub use server_ext::PadBrokerServerExt;
