//! Transport adapters: framing, inbound listener, grid publishers, PCD replay.

pub mod pcd;
pub mod publisher;
pub mod receiver;
pub mod wire;

pub use pcd::{load_pcd, parse_pcd};
pub use publisher::{ChannelPublisher, GridPublisher, TcpGridPublisher};
pub use receiver::{FrameReceiver, InboundMessage, dispatch};
pub use wire::{FrameReader, MAX_FRAME_LEN, decode, encode, write_frame};
