pub mod carts;
pub mod inventory;
pub mod notifications;
pub mod orders;
pub mod settlement;
pub mod vouchers;
