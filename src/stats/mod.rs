pub mod collector;
pub mod db;

pub use collector::{Channel, ChannelStats, CollectedStats, Msg, StatsCollector};
pub use db::{MsgRow, StatsDb, StatsDbError, StatsRow};
