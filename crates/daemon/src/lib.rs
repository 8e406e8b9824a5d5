//! # diskbridge Daemon Library
//!
//! Host side of the diskbridge link: lets a remote peer browse the host's
//! disks, partitions and files and pull file content, one command byte at a
//! time.
//!
//! ## Overview
//!
//! - **Hierarchy**: disks → partitions → files, populated lazily from `lsblk`
//!   and the partition mount points
//! - **Engine**: per-session selection state and a dispatcher that turns
//!   command bytes into name frames or file streams
//! - **Streaming**: files are staged and sent in 1024-byte chunks
//! - **Transport**: any blocking duplex byte channel; the daemon binary
//!   serves TCP
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                     Server (tokio)                       │
//! │   accept ──▶ spawn_blocking(Session::run)                │
//! ├──────────────────────────────────────────────────────────┤
//! │  Session driver                                          │
//! │   recv byte ─▶ Dispatcher ─▶ Names / Files ─▶ send       │
//! │                   │                    │                 │
//! │          ┌────────┴───────┐   ┌────────┴────────┐        │
//! │          │ Selection      │   │  FileStreamer   │        │
//! │          │ Hierarchy      │   │  (staged copy)  │        │
//! │          │ StorageAdapter │   └─────────────────┘        │
//! │          └────────┬───────┘                              │
//! │             StorageEnumerator (lsblk, read_dir)          │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use daemon::channel::TcpChannel;
//! use daemon::engine::Dispatcher;
//! use daemon::files::FileStreamer;
//! use daemon::session::{Session, SessionOptions};
//! use daemon::storage::{Capacity, LsblkEnumerator, StorageAdapter};
//!
//! fn main() -> anyhow::Result<()> {
//!     let listener = std::net::TcpListener::bind("127.0.0.1:7420")?;
//!     let (stream, _) = listener.accept()?;
//!
//!     let adapter = StorageAdapter::new(LsblkEnumerator::locate("lsblk")?, "/mnt/disks");
//!     let dispatcher = Dispatcher::new(adapter, Capacity::default());
//!     let streamer = FileStreamer::new(std::env::temp_dir().join("diskbridge-staging"));
//!
//!     let report = Session::new(
//!         TcpChannel::new(stream)?,
//!         dispatcher,
//!         streamer,
//!         SessionOptions::default(),
//!     )
//!     .run();
//!     println!("served {} commands", report.commands);
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`config`]: Configuration loading and defaults
//! - [`logging`]: Tracing subscriber setup
//! - [`storage`]: Hierarchy model and storage enumeration
//! - [`engine`]: Selection state and command dispatch
//! - [`files`]: Chunked file streaming
//! - [`channel`]: Byte channel abstraction and bindings
//! - [`session`]: Per-connection command loop
//! - [`server`]: TCP listener

pub mod channel;
pub mod config;
pub mod engine;
pub mod files;
pub mod logging;
pub mod server;
pub mod session;
pub mod storage;

// Re-export protocol for convenience
pub use protocol;

// Re-export config types for convenience
pub use config::Config;

// Re-export engine types for convenience
pub use engine::{Dispatcher, Request, Response, Selection};

// Re-export storage types for convenience
pub use storage::{Hierarchy, LsblkEnumerator, StorageAdapter, StorageEnumerator};

// Re-export session types for convenience
pub use session::{Session, SessionEnd, SessionOptions, SessionReport};

// Re-export server types for convenience
pub use server::{Server, SessionFactory};
