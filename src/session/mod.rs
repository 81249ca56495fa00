//! Session Module
//!
//! Client sessions over named pipes.
//!
//! ## Flow
//! ```text
//!   register FIFO ──► intake thread ──► DispatchQueue ──► session workers
//!                     (Server)          (bounded ring)    (SessionHandler)
//! ```
//!
//! The intake thread opens a registering client's three FIFOs, answers its
//! CONNECT, records it in the [`ClientRegistry`] and queues the session. A
//! session worker then owns the session until the client disconnects or
//! hangs up, and always tears down the client's subscriptions on the way out.

mod client;
mod handler;
mod queue;
mod server;

pub use client::{Client, ClientRegistry, ClientState, Session};
pub use handler::{SessionEnd, SessionHandler};
pub use queue::DispatchQueue;
pub use server::{Server, ServerHandle};
