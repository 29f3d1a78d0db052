pub mod message;
pub mod order;
pub mod promo;

pub use message::{ContactMessage, MessageKind};
pub use order::{
    generate_order_number, items_subtotal, Customer, DeliveryOutcome, Order, OrderItem,
    OrderStatus, PaymentMethod, MAX_ORDER_AMOUNT, ORDER_NUMBER_PREFIX,
};
pub use promo::{PromoBook, PromoCode};
