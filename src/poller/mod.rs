pub mod clan;
pub mod league;
pub mod registry;

pub use clan::ClanPoller;
pub use league::LeaguePoller;
