//! Payment intent creation shared by the server and the function entry points.

pub mod amount;
pub mod intent;
pub mod metadata;
pub mod stripe;

pub use amount::{to_minor_units, MinorAmount, MIN_CHARGE_MINOR_UNITS};
pub use intent::{CreatePaymentIntentRequest, PaymentIntentCreated, PaymentIntentService};
pub use stripe::{PaymentProcessor, StripePaymentProcessor};
