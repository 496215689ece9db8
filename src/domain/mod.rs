pub mod customer;
pub mod payment;
pub mod plan;
pub mod renewal;
pub mod reseller;
pub mod server;

pub use customer::*;
pub use payment::*;
pub use plan::*;
pub use renewal::*;
pub use reseller::*;
pub use server::*;
