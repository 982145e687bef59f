pub mod audit_logs;
pub mod cart_items;
pub mod carts;
pub mod categories;
pub mod order_items;
pub mod orders;
pub mod payments;
pub mod products;
pub mod users;

pub use audit_logs::Entity as AuditLogs;
pub use cart_items::Entity as CartItems;
pub use carts::Entity as Carts;
pub use categories::Entity as Categories;
pub use order_items::Entity as OrderItems;
pub use orders::{Entity as Orders, OrderStatus};
pub use payments::{Entity as Payments, PaymentMethod, PaymentStatus};
pub use products::Entity as Products;
pub use users::Entity as Users;
