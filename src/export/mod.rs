//! CSV export of stored orders and contact messages.

use chrono::{DateTime, Utc};
use serde_json::Value;
use std::cmp::Ordering;
use tracing::{info, instrument};

use crate::store::{Document, TieredStore, MESSAGES_COLLECTION, ORDERS_COLLECTION};

/// Spreadsheet apps need it to detect UTF-8 with right-to-left text.
pub const UTF8_BOM: &str = "\u{FEFF}";
const LINE_END: &str = "\r\n";

pub const ORDER_HEADERS: [&str; 15] = [
    "Order Number",
    "Date",
    "Customer Name",
    "Email",
    "Phone",
    "City",
    "Street",
    "Zip",
    "Items",
    "Subtotal",
    "Discount",
    "Promo Code",
    "Total",
    "Payment Method",
    "Status",
];

pub const MESSAGE_HEADERS: [&str; 7] = ["Date", "Type", "Name", "Email", "Phone", "Subject", "Message"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportKind {
    Orders,
    Messages,
}

impl ExportKind {
    pub fn collection(&self) -> &'static str {
        match self {
            ExportKind::Orders => ORDERS_COLLECTION,
            ExportKind::Messages => MESSAGES_COLLECTION,
        }
    }

    pub fn file_name(&self, at: DateTime<Utc>) -> String {
        let stem = match self {
            ExportKind::Orders => "orders",
            ExportKind::Messages => "messages",
        };
        format!("{}-{}.csv", stem, at.format("%Y-%m-%d"))
    }

    /// Renders `docs` as a CSV document, newest first.
    pub fn render(&self, docs: Vec<Document>) -> String {
        match self {
            ExportKind::Orders => render(&ORDER_HEADERS, docs, order_row),
            ExportKind::Messages => render(&MESSAGE_HEADERS, docs, message_row),
        }
    }
}

/// A rendered export ready to download or upload.
#[derive(Debug, Clone)]
pub struct CsvExport {
    pub file_name: String,
    pub content: String,
    pub rows: usize,
}

/// Reads a whole collection through the tiered store and renders it.
#[instrument(skip(store))]
pub async fn export(store: &TieredStore, kind: ExportKind) -> CsvExport {
    let docs = store.list(kind.collection()).await;
    let rows = docs.len();
    let content = kind.render(docs);
    info!(rows, collection = kind.collection(), "CSV export rendered");
    CsvExport {
        file_name: kind.file_name(Utc::now()),
        content,
        rows,
    }
}

fn render(headers: &[&str], mut docs: Vec<Document>, row: fn(&Document) -> Vec<String>) -> String {
    sort_newest_first(&mut docs);

    let mut out = String::from(UTF8_BOM);
    push_line(&mut out, headers.iter().map(|h| h.to_string()));
    for doc in &docs {
        push_line(&mut out, row(doc));
    }
    out
}

fn push_line(out: &mut String, fields: impl IntoIterator<Item = String>) {
    let line = fields
        .into_iter()
        .map(|f| escape_field(&f))
        .collect::<Vec<_>>()
        .join(",");
    out.push_str(&line);
    out.push_str(LINE_END);
}

/// Stable: documents with equal timestamps keep their relative order.
/// Documents without a readable `createdAt` go last.
pub fn sort_newest_first(docs: &mut [Document]) {
    docs.sort_by(|a, b| match (a.created_at(), b.created_at()) {
        (Some(a), Some(b)) => b.cmp(&a),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    });
}

/// Quotes fields holding a comma, quote or line break; doubles embedded quotes.
pub fn escape_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// Parses CSV text back into records. Accepts a leading BOM and CRLF or LF endings.
pub fn parse_csv(input: &str) -> Vec<Vec<String>> {
    let input = input.strip_prefix(UTF8_BOM).unwrap_or(input);
    let mut records = Vec::new();
    let mut record = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' if chars.peek() == Some(&'"') => {
                    field.push('"');
                    chars.next();
                }
                '"' => in_quotes = false,
                other => field.push(other),
            }
            continue;
        }
        match c {
            '"' => in_quotes = true,
            ',' => record.push(std::mem::take(&mut field)),
            '\r' if chars.peek() == Some(&'\n') => {}
            '\n' => {
                record.push(std::mem::take(&mut field));
                records.push(std::mem::take(&mut record));
            }
            other => field.push(other),
        }
    }
    if !field.is_empty() || !record.is_empty() {
        record.push(field);
        records.push(record);
    }
    records
}

fn order_row(doc: &Document) -> Vec<String> {
    let f = &doc.fields;
    let customer = f.get("customer");
    let customer_field = |key: &str| text(customer.and_then(|c| c.get(key)));

    vec![
        f.get("orderNumber")
            .and_then(Value::as_str)
            .unwrap_or(doc.id.as_str())
            .to_string(),
        date(doc),
        customer_field("name"),
        customer_field("email"),
        customer_field("phone"),
        customer_field("city"),
        customer_field("street"),
        customer_field("zip"),
        items(f.get("items")),
        text(f.get("subtotal")),
        text(f.get("discount")),
        text(f.get("promoCode")),
        text(f.get("total")),
        text(f.get("paymentMethod")),
        f.get("status")
            .and_then(Value::as_str)
            .unwrap_or("pending")
            .to_string(),
    ]
}

fn message_row(doc: &Document) -> Vec<String> {
    let f = &doc.fields;
    vec![
        date(doc),
        text(f.get("type")),
        text(f.get("name")),
        text(f.get("email")),
        text(f.get("phone")),
        text(f.get("subject")),
        text(f.get("message")),
    ]
}

fn date(doc: &Document) -> String {
    match doc.created_at() {
        Some(at) => at.format("%Y-%m-%d %H:%M").to_string(),
        None => text(doc.fields.get("createdAt")),
    }
}

/// `"MX Scooter x2; Charger x1"`
fn items(value: Option<&Value>) -> String {
    let Some(Value::Array(items)) = value else {
        return text(value);
    };
    items
        .iter()
        .map(|item| {
            let name = text(item.get("name"));
            match item.get("qty").and_then(Value::as_u64) {
                Some(qty) => format!("{} x{}", name, qty),
                None => name,
            }
        })
        .collect::<Vec<_>>()
        .join("; ")
}

fn text(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(Value::Bool(b)) => b.to_string(),
        Some(Value::Number(n)) => number(n),
        Some(Value::Array(values)) => values
            .iter()
            .map(|v| text(Some(v)))
            .collect::<Vec<_>>()
            .join(", "),
        Some(other @ Value::Object(_)) => other.to_string(),
    }
}

/// Whole amounts stored as doubles print without a trailing `.0`.
fn number(n: &serde_json::Number) -> String {
    match (n.as_i64(), n.as_f64()) {
        (Some(i), _) => i.to_string(),
        (None, Some(f)) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", f as i64),
        _ => n.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn order_doc(id: &str, created_at: &str, name: &str) -> Document {
        Document::from_record(
            id,
            &json!({
                "orderNumber": id,
                "createdAt": created_at,
                "customer": {
                    "name": name, "email": "a@b.co", "phone": "050",
                    "city": "Haifa", "street": "Herzl 1", "zip": "31000"
                },
                "items": [{ "id": "mx-1", "name": "MX Scooter", "qty": 2, "price": 1899.0 }],
                "subtotal": 3798.0,
                "discount": 0.0,
                "total": 3798.0,
                "paymentMethod": "cod"
            }),
        )
        .unwrap()
    }

    #[test]
    fn escapes_only_when_needed() {
        assert_eq!(escape_field("plain"), "plain");
        assert_eq!(escape_field("a,b"), "\"a,b\"");
        assert_eq!(escape_field("say \"hi\""), "\"say \"\"hi\"\"\"");
        assert_eq!(escape_field("two\nlines"), "\"two\nlines\"");
    }

    #[test]
    fn header_row_is_fixed_and_prefixed_with_bom() {
        let csv = ExportKind::Orders.render(vec![]);
        assert!(csv.starts_with(UTF8_BOM));
        assert_eq!(
            csv.trim_start_matches(UTF8_BOM),
            "Order Number,Date,Customer Name,Email,Phone,City,Street,Zip,Items,Subtotal,Discount,Promo Code,Total,Payment Method,Status\r\n"
        );
    }

    #[test]
    fn orders_render_newest_first_with_defaults() {
        let docs = vec![
            order_doc("MX-OLD", "2026-01-01T08:00:00Z", "Old"),
            order_doc("MX-NEW", "2026-02-01T08:00:00Z", "Levi, Dana"),
        ];
        let records = parse_csv(&ExportKind::Orders.render(docs));

        assert_eq!(records.len(), 3);
        assert_eq!(records[1][0], "MX-NEW");
        assert_eq!(records[1][1], "2026-02-01 08:00");
        assert_eq!(records[1][2], "Levi, Dana");
        assert_eq!(records[1][8], "MX Scooter x2");
        assert_eq!(records[1][9], "3798");
        assert_eq!(records[1][13], "cod");
        assert_eq!(records[1][14], "pending");
        assert_eq!(records[2][0], "MX-OLD");
    }

    #[test]
    fn equal_timestamps_keep_input_order() {
        let docs = vec![
            order_doc("MX-A", "2026-01-01T08:00:00Z", "A"),
            order_doc("MX-B", "2026-01-01T08:00:00Z", "B"),
            order_doc("MX-C", "not a date", "C"),
            order_doc("MX-D", "2026-01-01T08:00:00Z", "D"),
        ];
        let records = parse_csv(&ExportKind::Orders.render(docs));
        let ids: Vec<&str> = records[1..].iter().map(|r| r[0].as_str()).collect();
        assert_eq!(ids, ["MX-A", "MX-B", "MX-D", "MX-C"]);
    }

    #[test]
    fn message_export_uses_its_own_header() {
        let doc = Document::from_record(
            "m1",
            &json!({
                "type": "ticket",
                "name": "Omar",
                "message": "Line one\nLine \"two\"",
                "createdAt": "2026-03-01T10:00:00Z"
            }),
        )
        .unwrap();
        let records = parse_csv(&ExportKind::Messages.render(vec![doc]));
        assert_eq!(records[0], MESSAGE_HEADERS);
        assert_eq!(records[1][1], "ticket");
        assert_eq!(records[1][6], "Line one\nLine \"two\"");
    }

    #[test]
    fn file_name_carries_the_date() {
        let at = DateTime::parse_from_rfc3339("2026-10-16T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(ExportKind::Orders.file_name(at), "orders-2026-10-16.csv");
    }
}
