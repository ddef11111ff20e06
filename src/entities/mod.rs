pub mod cart;
pub mod cart_item;
pub mod email_log;
pub mod order;
pub mod order_item;
pub mod order_status_history;
pub mod product;
pub mod voucher;

pub use cart::Entity as Cart;
pub use cart_item::Entity as CartItem;
pub use email_log::Entity as EmailLog;
pub use order::Entity as Order;
pub use order_item::Entity as OrderItem;
pub use order_status_history::Entity as OrderStatusHistory;
pub use product::Entity as Product;
pub use voucher::Entity as Voucher;
