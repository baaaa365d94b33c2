//! Swap parsing: AMM program detection, token allow-list, transaction
//! interpretation.

mod programs;
mod swap_parser;
mod tokens;

pub use programs::{is_amm_program, venue_for_program};
pub use swap_parser::SwapParser;
pub use tokens::{TokenMeta, TokenRegistry, WSOL_MINT};
