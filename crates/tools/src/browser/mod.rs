//! Remote browser capability: CDP wire client, page driver, session registry.

pub mod cdp;
pub mod page;
pub mod session;
