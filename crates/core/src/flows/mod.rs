pub mod builder;
pub mod conditions;
pub mod executor;

pub use builder::build_flow;
pub use conditions::is_satisfied;
pub use executor::{record_approval, record_rejection, Decision, DecisionOutcome};
