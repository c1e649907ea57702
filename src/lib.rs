//! Library half of the UART bridge / TCP fan-out server, split out of `main`
//! the way `dougborg-AirHound` separates its portable scanning/protocol logic
//! from the platform binary — it lets `tests/` exercise the acceptor,
//! broadcaster, and session machinery over real loopback sockets without a
//! UART attached.

pub mod acceptor;
pub mod broadcaster;
pub mod commands;
pub mod config;
pub mod error;
pub mod protocol;
pub mod reaper;
pub mod sample;
pub mod scavenger;
pub mod session;
pub mod supervisor;
pub mod transport;
pub mod types;
