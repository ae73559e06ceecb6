//! `wrtc-call` is a peer-to-peer video call client built on top of the
//! [webrtc](https://webrtc.rs) library:
//! - A signaling relay exchanges `login`, `offer`, `answer`, `candidate` and `leave` messages with
//!   a rendezvous server over a WebSocket, using the same JSON format as browser clients.
//! - The relay drives a peer connection: it forwards session descriptions and ICE candidates
//!   verbatim and re-arms a fresh connection after every call.
//! - Everything the user should see (login outcome, remote video, chat text, alerts) is reported
//!   as a stream of [CallEvent]s.
//!
//! Media capture and the peer connection are consumed through the [MediaSource] and
//! [Connector]/[PeerAdapter] traits, with webrtc-rs backed implementations provided.
//!
//! # Examples
//!
//! ```rust,no_run
//! use wrtc_call::{start, CallEvent, Error, Options, SampleMedia};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Error> {
//!     // connect to the rendezvous server at ws://localhost:8888
//!     let (relay, mut events, _task) = start(Options::default(), SampleMedia::new()).await?;
//!     relay.login("alice")?;
//!
//!     while let Some(event) = events.recv().await {
//!         match event {
//!             CallEvent::LoggedIn => relay.call("bob")?,
//!             CallEvent::Received(text) => println!("recv: {}", text),
//!             CallEvent::Alert(text) => eprintln!("{}", text),
//!             _ => {}
//!         }
//!     }
//!     Ok(())
//! }
//! ```

pub mod adapter;
pub mod config;
pub mod data_channel;
pub mod error;
pub mod media;
pub mod message;
pub mod peer_connection;
pub mod relay;
pub mod session;
pub mod signaling;

pub use adapter::{Connector, PeerAdapter, PeerEvent, PeerEvents, RemoteTrack};
pub use config::{OfferPolicy, Options};
pub use data_channel::DataChannel;
pub use error::Error;
pub use media::{LocalMedia, MediaSource, SampleMedia};
pub use message::Message;
pub use peer_connection::{PeerConnection, RtcConnector};
pub use relay::{start, CallEvent, Command, Relay, RelayHandle};
pub use session::{ConnectionState, Session};
