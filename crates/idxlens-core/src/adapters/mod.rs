mod fixture;
mod gateway;

pub use fixture::{FixtureDataset, FixtureSource};
pub use gateway::GatewayAdapter;
