pub mod members;
pub mod results;
pub mod rounds;

pub use members::{LeagueRoster, RefreshOutcome};
pub use results::ResultAggregator;
pub use rounds::{LeagueState, RoundTracker};
