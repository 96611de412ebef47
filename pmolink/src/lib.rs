//! # pmolink - Transport client vers le broker PMOPads
//!
//! Chaque nœud (renderer ou contrôleur) possède un [`PadLink`] : un objet
//! qui encapsule le socket WebSocket, la reconnexion avec backoff
//! exponentiel (1 s doublé jusqu'à 30 s, remis à zéro sur succès), la file
//! FIFO des messages émis hors connexion, et le heartbeat de 25 s qui
//! reste sous la fenêtre de vie de 30 s du broker.
//!
//! Le `pong` du broker n'est pas requis pour rester connecté : c'est le
//! timeout du broker qui gouverne la vie de la connexion.
//!
//! ## Exemple
//!
//! ```rust,ignore
//! use pmolink::{LinkEvent, LinkOptions, PadLink};
//! use pmowire::{Envelope, Role};
//!
//! let options = LinkOptions::new("ws://localhost:5174/ws", "studio", Role::Controller);
//! let (link, mut events) = PadLink::connect(options);
//!
//! link.send(Envelope::PadHit { pad_index: 3, velocity: Some(100) });
//!
//! while let Some(event) = events.recv().await {
//!     if let LinkEvent::Message(envelope) = event {
//!         println!("broker -> {:?}", envelope);
//!     }
//! }
//! ```

mod backoff;
pub mod config_ext;
mod link;

pub use backoff::Backoff;
pub use config_ext::LinkConfigExt;
pub use link::{LinkEvent, LinkOptions, PadLink};
