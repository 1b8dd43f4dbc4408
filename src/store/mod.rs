//! Persistence gateway for player records

pub mod players;
pub mod supabase;

pub use players::{PlayerRecord, PlayerStore};
pub use supabase::SupabaseClient;
