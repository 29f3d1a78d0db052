use std::fmt::Write;

use crate::models::{ContactMessage, Order, PaymentMethod};

/// Plain-text order summary for the orders channel.
pub fn format_order(order: &Order) -> String {
    let mut out = String::new();
    let method = match order.payment_method {
        PaymentMethod::Card => "Card (paid)",
        PaymentMethod::Cod => "Cash on delivery (unpaid)",
    };
    let c = &order.customer;

    let _ = writeln!(out, "New order {}", order.order_number);
    let _ = writeln!(out, "Date: {}", order.created_at.format("%Y-%m-%d %H:%M UTC"));
    let _ = writeln!(out);
    let _ = writeln!(out, "Customer: {}", c.name);
    let _ = writeln!(out, "Phone: {}", c.phone);
    let _ = writeln!(out, "Email: {}", c.email);
    let _ = writeln!(out, "Address: {}, {} {}", c.street, c.city, c.zip);
    let _ = writeln!(out);
    for item in &order.items {
        match item.line_total() {
            Some(line) => {
                let _ = writeln!(out, "- {} x{} = {}", item.name, item.qty, line);
            }
            None => {
                let _ = writeln!(out, "- {} x{} @ {}", item.name, item.qty, item.price);
            }
        }
    }
    let _ = writeln!(out);
    let _ = writeln!(out, "Subtotal: {}", order.subtotal);
    if !order.discount.is_zero() {
        match &order.promo_code {
            Some(code) => {
                let _ = writeln!(out, "Discount ({}): -{}", code, order.discount);
            }
            None => {
                let _ = writeln!(out, "Discount: -{}", order.discount);
            }
        }
    }
    let _ = writeln!(out, "Total: {}", order.total);
    let _ = write!(out, "Payment: {}", method);
    out
}

/// Summary of a contact message or support ticket.
pub fn format_message(message: &ContactMessage) -> String {
    let mut out = String::new();
    let heading = match message.kind {
        crate::models::MessageKind::Contact => "New contact message",
        crate::models::MessageKind::Ticket => "New support ticket",
    };

    let _ = writeln!(out, "{}", heading);
    let _ = writeln!(out, "From: {}", message.name);
    if let Some(email) = message.email.as_deref().filter(|e| !e.trim().is_empty()) {
        let _ = writeln!(out, "Email: {}", email);
    }
    if let Some(phone) = message.phone.as_deref().filter(|p| !p.trim().is_empty()) {
        let _ = writeln!(out, "Phone: {}", phone);
    }
    if let Some(subject) = message.subject.as_deref().filter(|s| !s.trim().is_empty()) {
        let _ = writeln!(out, "Subject: {}", subject);
    }
    let _ = writeln!(out);
    let _ = write!(out, "{}", message.message.trim());
    out
}
