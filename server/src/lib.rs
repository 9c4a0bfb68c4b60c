//! Chat relay server over two transports.
//!
//! - [`server_listener`] and [`client_handler`] accept stream connections and
//!   run one relay task per participant against a [`registry_tcp::TcpRegistry`].
//! - [`server_datagram`] drives a [`registry_udp::UdpRegistry`] from a single
//!   receive loop.
//! - [`names`] is the name roster both registries admit into, and
//!   [`delivery`] fans lines out to everyone but the originator.

pub mod error;
pub mod names;
pub mod server_types;
pub mod transport;

// fan out
pub mod delivery;

// connection oriented
pub mod client_handler;
pub mod registry_tcp;
pub mod server_listener;

// connectionless
pub mod registry_udp;
pub mod server_datagram;

pub use error::RelayError;
pub use registry_tcp::TcpRegistry;
pub use registry_udp::UdpRegistry;
pub use server_datagram::UdpServer;
pub use server_listener::TcpServer;
pub use server_types::{ClientId, Dispatch, RelayEnd};
pub use transport::DatagramTransport;
