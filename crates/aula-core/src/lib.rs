pub mod actions;
pub mod catalog;
pub mod gateway;
pub mod identity;
pub mod ledger;
pub mod persistence;
pub mod reducer;
pub mod state;

pub use actions::*;
pub use reducer::*;
pub use state::*;
