//! TCP/UDP relay engine: the client-role and server-role state machines
//! (C6), their accept loops (C7), the UDP relay (C8), and the cipher
//! framing adapter that lets both reuse the shared bidirectional-copy
//! buffer algorithm.

pub mod acceptor;
pub mod cipher_stream;
pub mod client;
pub mod server;
pub mod stage;
pub mod udp;

pub use stage::Stage;
