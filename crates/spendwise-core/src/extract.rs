//! Field extraction from raw OCR provider responses
//!
//! OCR vendors return very different JSON documents for the same receipt.
//! [`extract`] normalizes them into an [`ExtractedReceipt`]. Extraction never
//! fails: anything that can't be read degrades to a default value, and
//! [`ExtractedReceipt::is_empty`] tells callers when nothing useful came out.

use std::sync::LazyLock;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::models::ReceiptItem;

/// Store name used when no line of the receipt looks like a merchant
pub const UNKNOWN_STORE: &str = "미지정";

/// Number of leading text lines scanned for a merchant name
const MERCHANT_SCAN_LINES: usize = 5;

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%Y.%m.%d"];
const TIME_FORMATS: &[&str] = &["%H:%M:%S", "%H:%M"];

/// Lines that are never a merchant name
static EXCLUDED_LINE_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"^\[.*\]$",
        r"^영수증$",
        r"(?i)^receipt$",
        r"^\d{4}[-/.]\d{2}[-/.]\d{2}",
        r"^[\d,]+원?$",
        r"^[\d\s\-\(\)]+$",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("valid regex"))
    .collect()
});

static NUMBER_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+(?:\.\d+)?").expect("valid regex"));

/// Vendor response shapes the extractor understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VendorFormat {
    /// Azure Document Intelligence prebuilt-receipt
    Azure,
    /// Naver CLOVA OCR receipt model
    Clova,
    /// Already in the canonical field layout
    Normalized,
    Unknown,
}

impl VendorFormat {
    /// Detect the response shape from its top-level keys
    pub fn detect(raw: &Value) -> Self {
        if raw.get("analyzeResult").is_some() || raw.get("documents").is_some() {
            Self::Azure
        } else if raw
            .get("images")
            .and_then(|images| images.get(0))
            .and_then(|image| image.get("receipt"))
            .is_some()
        {
            Self::Clova
        } else if raw.get("store_name").is_some() || raw.get("total_amount").is_some() {
            Self::Normalized
        } else {
            Self::Unknown
        }
    }
}

/// Structured fields pulled out of an OCR response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedReceipt {
    pub store_name: String,
    pub store_address: Option<String>,
    pub store_phone_number: Option<String>,
    pub date: NaiveDateTime,
    pub total_amount: f64,
    pub items: Vec<ReceiptItem>,
}

impl ExtractedReceipt {
    fn empty() -> Self {
        Self {
            store_name: UNKNOWN_STORE.to_string(),
            store_address: None,
            store_phone_number: None,
            date: Utc::now().naive_utc(),
            total_amount: 0.0,
            items: Vec::new(),
        }
    }

    /// True when every field fell back to its default
    pub fn is_empty(&self) -> bool {
        self.store_name == UNKNOWN_STORE
            && self.store_address.is_none()
            && self.store_phone_number.is_none()
            && self.total_amount == 0.0
            && self.items.is_empty()
    }

    /// Line item with the highest price, used as the classification hint
    pub fn most_expensive_item(&self) -> Option<&ReceiptItem> {
        self.items
            .iter()
            .filter(|item| item.price > 0.0)
            .max_by(|a, b| a.price.total_cmp(&b.price))
    }
}

/// Extract receipt fields from any supported vendor response
pub fn extract(raw: &Value) -> ExtractedReceipt {
    let format = VendorFormat::detect(raw);
    debug!("Extracting receipt fields from {:?} response", format);

    match format {
        VendorFormat::Azure => extract_azure(raw),
        VendorFormat::Clova => extract_clova(raw),
        VendorFormat::Normalized => extract_normalized(raw),
        VendorFormat::Unknown => ExtractedReceipt::empty(),
    }
}

// ============================================================================
// Azure Document Intelligence
// ============================================================================

fn extract_azure(raw: &Value) -> ExtractedReceipt {
    let result = raw.get("analyzeResult").unwrap_or(raw);
    let fields = result
        .get("documents")
        .and_then(|docs| docs.get(0))
        .and_then(|doc| doc.get("fields"));

    let field = |name: &str| fields.and_then(|f| f.get(name));

    let lines: Vec<&str> = result
        .get("pages")
        .and_then(|pages| pages.get(0))
        .and_then(|page| page.get("lines"))
        .and_then(Value::as_array)
        .map(|lines| {
            lines
                .iter()
                .filter_map(|line| line.get("content").and_then(Value::as_str))
                .collect()
        })
        .unwrap_or_default();

    let store_name = field("MerchantName")
        .and_then(azure_text)
        .or_else(|| field("Merchant").and_then(azure_text))
        .or_else(|| merchant_from_lines(&lines))
        .unwrap_or_else(|| UNKNOWN_STORE.to_string());

    let date_text = field("TransactionDate").and_then(|f| {
        f.get("valueDate")
            .and_then(Value::as_str)
            .map(String::from)
            .or_else(|| azure_text(f))
    });
    let time_text = field("TransactionTime").and_then(|f| {
        f.get("valueTime")
            .and_then(Value::as_str)
            .map(String::from)
            .or_else(|| azure_text(f))
    });

    let items = field("Items")
        .and_then(|f| f.get("valueArray"))
        .and_then(Value::as_array)
        .map(|entries| entries.iter().filter_map(azure_item).collect())
        .unwrap_or_default();

    ExtractedReceipt {
        store_name,
        store_address: field("MerchantAddress").and_then(azure_text),
        store_phone_number: field("MerchantPhoneNumber").and_then(azure_text),
        date: parse_date_time(date_text.as_deref(), time_text.as_deref()),
        total_amount: field("Total").map(azure_amount).unwrap_or(0.0),
        items,
    }
}

/// Text of an Azure field: the recognized content, then the typed string value
fn azure_text(field: &Value) -> Option<String> {
    field
        .get("content")
        .and_then(Value::as_str)
        .or_else(|| field.get("valueString").and_then(Value::as_str))
        .or_else(|| field.get("valuePhoneNumber").and_then(Value::as_str))
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
}

fn azure_amount(field: &Value) -> f64 {
    field
        .get("valueCurrency")
        .and_then(|c| c.get("amount"))
        .and_then(Value::as_f64)
        .or_else(|| field.get("valueNumber").and_then(Value::as_f64))
        .or_else(|| field.as_f64())
        .or_else(|| field.get("content").and_then(Value::as_str).and_then(last_number))
        .unwrap_or(0.0)
}

fn azure_item(entry: &Value) -> Option<ReceiptItem> {
    let obj = entry.get("valueObject")?;
    let name = obj
        .get("Description")
        .or_else(|| obj.get("Name"))
        .and_then(azure_text)?;
    let price = obj
        .get("TotalPrice")
        .or_else(|| obj.get("Price"))
        .map(azure_amount)
        .unwrap_or(0.0);
    let quantity = obj
        .get("Quantity")
        .map(azure_amount)
        .filter(|q| *q > 0.0)
        .unwrap_or(1.0);

    Some(ReceiptItem {
        name,
        price,
        quantity,
    })
}

// ============================================================================
// Naver CLOVA
// ============================================================================

fn extract_clova(raw: &Value) -> ExtractedReceipt {
    let image = raw.get("images").and_then(|images| images.get(0));
    let result = image
        .and_then(|i| i.get("receipt"))
        .and_then(|r| r.get("result"));
    let store = result.and_then(|r| r.get("storeInfo"));
    let payment = result.and_then(|r| r.get("paymentInfo"));

    let lines: Vec<&str> = image
        .and_then(|i| i.get("fields"))
        .and_then(Value::as_array)
        .map(|fields| {
            fields
                .iter()
                .filter_map(|f| f.get("inferText").and_then(Value::as_str))
                .collect()
        })
        .unwrap_or_default();

    let store_name = store
        .and_then(|s| s.get("name"))
        .and_then(clova_text)
        .or_else(|| store.and_then(|s| s.get("subName")).and_then(clova_text))
        .or_else(|| merchant_from_lines(&lines))
        .unwrap_or_else(|| UNKNOWN_STORE.to_string());

    let first_text = |node: Option<&Value>| {
        node.and_then(Value::as_array)
            .and_then(|list| list.first())
            .and_then(clova_text)
    };

    let date_text = payment.and_then(|p| p.get("date")).and_then(clova_date);
    let time_text = payment.and_then(|p| p.get("time")).and_then(clova_time);

    let total_amount = result
        .and_then(|r| r.get("totalPrice"))
        .and_then(|t| t.get("price"))
        .map(clova_amount)
        .unwrap_or(0.0);

    let items = result
        .and_then(|r| r.get("subResults"))
        .and_then(Value::as_array)
        .map(|subs| {
            subs.iter()
                .filter_map(|sub| sub.get("items").and_then(Value::as_array))
                .flatten()
                .filter_map(clova_item)
                .collect()
        })
        .unwrap_or_default();

    ExtractedReceipt {
        store_name,
        store_address: first_text(store.and_then(|s| s.get("addresses"))),
        store_phone_number: first_text(store.and_then(|s| s.get("tel"))),
        date: parse_date_time(date_text.as_deref(), time_text.as_deref()),
        total_amount,
        items,
    }
}

/// Text of a CLOVA node: the formatted value, then the raw inferred text
fn clova_text(node: &Value) -> Option<String> {
    node.get("formatted")
        .and_then(|f| f.get("value"))
        .and_then(Value::as_str)
        .or_else(|| node.get("text").and_then(Value::as_str))
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
}

fn clova_date(node: &Value) -> Option<String> {
    let formatted = node.get("formatted");
    let part = |key: &str| {
        formatted
            .and_then(|f| f.get(key))
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    };
    match (part("year"), part("month"), part("day")) {
        (Some(y), Some(m), Some(d)) => Some(format!("{}-{}-{}", y, m, d)),
        _ => clova_text(node),
    }
}

fn clova_time(node: &Value) -> Option<String> {
    let formatted = node.get("formatted");
    let part = |key: &str| {
        formatted
            .and_then(|f| f.get(key))
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    };
    match (part("hour"), part("minute")) {
        (Some(h), Some(m)) => Some(format!("{}:{}:{}", h, m, part("second").unwrap_or("00"))),
        _ => clova_text(node),
    }
}

fn clova_amount(node: &Value) -> f64 {
    clova_text(node)
        .as_deref()
        .and_then(last_number)
        .unwrap_or(0.0)
}

fn clova_item(item: &Value) -> Option<ReceiptItem> {
    let name = item.get("name").and_then(clova_text)?;
    let price = item
        .get("price")
        .and_then(|p| p.get("price"))
        .map(clova_amount)
        .unwrap_or(0.0);
    let quantity = item
        .get("count")
        .map(clova_amount)
        .filter(|q| *q > 0.0)
        .unwrap_or(1.0);

    Some(ReceiptItem {
        name,
        price,
        quantity,
    })
}

// ============================================================================
// Normalized
// ============================================================================

fn extract_normalized(raw: &Value) -> ExtractedReceipt {
    let text = |key: &str| {
        raw.get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
    };

    let lines: Vec<&str> = raw
        .get("lines")
        .and_then(Value::as_array)
        .map(|lines| lines.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();

    let store_name = text("store_name")
        .filter(|name| name != UNKNOWN_STORE)
        .or_else(|| merchant_from_lines(&lines))
        .unwrap_or_else(|| UNKNOWN_STORE.to_string());

    let date = text("date");
    let (date_part, time_part) = match date.as_deref() {
        Some(d) => split_date_time(d),
        None => (None, None),
    };

    let items = raw
        .get("items")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| {
                    let name = item
                        .get("name")
                        .and_then(Value::as_str)
                        .map(str::trim)
                        .filter(|s| !s.is_empty())?;
                    Some(ReceiptItem {
                        name: name.to_string(),
                        price: item.get("price").map(json_amount).unwrap_or(0.0),
                        quantity: item
                            .get("quantity")
                            .map(json_amount)
                            .filter(|q| *q > 0.0)
                            .unwrap_or(1.0),
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    ExtractedReceipt {
        store_name,
        store_address: text("store_address"),
        store_phone_number: text("store_phone_number"),
        date: parse_date_time(date_part, time_part),
        total_amount: raw.get("total_amount").map(json_amount).unwrap_or(0.0),
        items,
    }
}

fn json_amount(value: &Value) -> f64 {
    value
        .as_f64()
        .or_else(|| value.as_str().and_then(last_number))
        .unwrap_or(0.0)
}

/// Split "2024-03-01 12:30:00" / "2024-03-01T12:30:00" into date and time parts
fn split_date_time(s: &str) -> (Option<&str>, Option<&str>) {
    let s = s.trim();
    match s.find(|c: char| c == 'T' || c == ' ') {
        Some(idx) => (Some(&s[..idx]), Some(s[idx + 1..].trim())),
        None => (Some(s), None),
    }
}

// ============================================================================
// Shared parsing rules
// ============================================================================

/// First plausible merchant line among the leading text lines
fn merchant_from_lines(lines: &[&str]) -> Option<String> {
    lines
        .iter()
        .take(MERCHANT_SCAN_LINES)
        .map(|line| line.trim())
        .find(|line| {
            line.chars().count() >= 2
                && !EXCLUDED_LINE_PATTERNS.iter().any(|re| re.is_match(line))
        })
        .map(|line| {
            debug!("Merchant name taken from text line: {}", line);
            line.to_string()
        })
}

/// Last numeric token in free text, ignoring thousands separators
fn last_number(text: &str) -> Option<f64> {
    let cleaned = text.replace(',', "");
    NUMBER_TOKEN
        .find_iter(&cleaned)
        .last()
        .and_then(|m| m.as_str().parse().ok())
}

fn parse_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
}

fn parse_time(s: &str) -> Option<NaiveTime> {
    let s = s.trim();
    TIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveTime::parse_from_str(s, fmt).ok())
}

/// Combine date and time independently; a bad time means midnight, a bad
/// date means now
fn parse_date_time(date: Option<&str>, time: Option<&str>) -> NaiveDateTime {
    match date.and_then(parse_date) {
        Some(d) => d.and_time(time.and_then(parse_time).unwrap_or(NaiveTime::MIN)),
        None => Utc::now().naive_utc(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;
    use serde_json::json;

    fn azure(fields: Value, lines: &[&str]) -> Value {
        let lines: Vec<Value> = lines.iter().map(|l| json!({ "content": l })).collect();
        json!({
            "status": "succeeded",
            "analyzeResult": {
                "documents": [{ "docType": "receipt.retailMeal", "fields": fields }],
                "pages": [{ "lines": lines }]
            }
        })
    }

    #[test]
    fn test_detect_formats() {
        assert_eq!(VendorFormat::detect(&azure(json!({}), &[])), VendorFormat::Azure);
        assert_eq!(
            VendorFormat::detect(&json!({"images": [{"receipt": {"result": {}}}]})),
            VendorFormat::Clova
        );
        assert_eq!(
            VendorFormat::detect(&json!({"store_name": "A", "total_amount": 1})),
            VendorFormat::Normalized
        );
        assert_eq!(VendorFormat::detect(&json!({"foo": 1})), VendorFormat::Unknown);
    }

    #[test]
    fn test_azure_full_fields() {
        let raw = azure(
            json!({
                "MerchantName": { "type": "string", "valueString": "스타벅스 강남점", "content": "스타벅스 강남점" },
                "MerchantAddress": { "content": "서울 강남구 테헤란로 1" },
                "MerchantPhoneNumber": { "valuePhoneNumber": "+8221234567", "content": "02-123-4567" },
                "TransactionDate": { "valueDate": "2024-03-15", "content": "2024.03.15" },
                "TransactionTime": { "valueTime": "13:45:10", "content": "13:45:10" },
                "Total": { "valueCurrency": { "amount": 12500.0, "currencyCode": "KRW" }, "content": "12,500" },
                "Items": { "valueArray": [
                    { "valueObject": {
                        "Description": { "content": "아메리카노" },
                        "Quantity": { "valueNumber": 2 },
                        "TotalPrice": { "valueCurrency": { "amount": 9000.0 } }
                    }},
                    { "valueObject": {
                        "Description": { "content": "쿠키" },
                        "TotalPrice": { "content": "3,500" }
                    }},
                    { "valueObject": { "TotalPrice": { "valueNumber": 100 } } }
                ]}
            }),
            &[],
        );

        let r = extract(&raw);
        assert_eq!(r.store_name, "스타벅스 강남점");
        assert_eq!(r.store_address.as_deref(), Some("서울 강남구 테헤란로 1"));
        assert_eq!(r.store_phone_number.as_deref(), Some("02-123-4567"));
        assert_eq!(r.date.to_string(), "2024-03-15 13:45:10");
        assert_eq!(r.total_amount, 12500.0);
        assert_eq!(r.items.len(), 2, "nameless items are skipped");
        assert_eq!(r.items[0].quantity, 2.0);
        assert_eq!(r.items[1].price, 3500.0);
        assert_eq!(r.most_expensive_item().unwrap().name, "아메리카노");
        assert!(!r.is_empty());
    }

    #[test]
    fn test_merchant_alternate_field_then_lines() {
        let raw = azure(json!({ "Merchant": { "content": "이마트" } }), &["[영수증]"]);
        assert_eq!(extract(&raw).store_name, "이마트");

        let raw = azure(
            json!({}),
            &[
                "[영수증]",
                "RECEIPT",
                "2024-03-15 12:00",
                "12,000원",
                "(02) 123-4567",
                "김밥천국",
            ],
        );
        // Only the first five lines are scanned
        assert_eq!(extract(&raw).store_name, UNKNOWN_STORE);

        let raw = azure(json!({}), &["영수증", "A", "  GS25 역삼점  ", "서울"]);
        assert_eq!(extract(&raw).store_name, "GS25 역삼점");
    }

    #[test]
    fn test_date_fallbacks() {
        let raw = azure(
            json!({
                "TransactionDate": { "content": "2024/01/02" },
                "TransactionTime": { "content": "오후 3시" }
            }),
            &[],
        );
        let r = extract(&raw);
        assert_eq!(r.date.to_string(), "2024-01-02 00:00:00");

        let raw = azure(
            json!({
                "TransactionDate": { "content": "2024.01.02" },
                "TransactionTime": { "content": "09:30" }
            }),
            &[],
        );
        assert_eq!(extract(&raw).date.hour(), 9);

        let before = Utc::now().naive_utc() - chrono::Duration::seconds(5);
        let raw = azure(json!({ "TransactionDate": { "content": "어제" } }), &[]);
        assert!(extract(&raw).date >= before, "unparsable date falls back to now");
    }

    #[test]
    fn test_total_from_free_text() {
        let raw = azure(json!({ "Total": { "content": "합계 1,234 원 / 카드 12,000" } }), &[]);
        assert_eq!(extract(&raw).total_amount, 12000.0);

        let raw = azure(json!({ "Total": { "content": "없음" } }), &[]);
        assert_eq!(extract(&raw).total_amount, 0.0);
    }

    #[test]
    fn test_clova_receipt() {
        let raw = json!({
            "version": "V2",
            "images": [{
                "receipt": { "result": {
                    "storeInfo": {
                        "name": { "text": "씨유", "formatted": { "value": "CU" } },
                        "addresses": [{ "text": "서울시 마포구" }],
                        "tel": [{ "text": "02-000-0000", "formatted": { "value": "020000000" } }]
                    },
                    "paymentInfo": {
                        "date": { "text": "24.05.01", "formatted": { "year": "2024", "month": "05", "day": "01" } },
                        "time": { "text": "18:20", "formatted": { "hour": "18", "minute": "20", "second": "" } }
                    },
                    "subResults": [{ "items": [
                        { "name": { "text": "삼각김밥" }, "count": { "text": "2" },
                          "price": { "price": { "text": "2,400" } } },
                        { "count": { "text": "1" } }
                    ]}],
                    "totalPrice": { "price": { "text": "2,400", "formatted": { "value": "2400" } } }
                }}
            }]
        });

        let r = extract(&raw);
        assert_eq!(r.store_name, "CU");
        assert_eq!(r.store_address.as_deref(), Some("서울시 마포구"));
        assert_eq!(r.store_phone_number.as_deref(), Some("020000000"));
        assert_eq!(r.date.to_string(), "2024-05-01 18:20:00");
        assert_eq!(r.total_amount, 2400.0);
        assert_eq!(r.items.len(), 1);
        assert_eq!(r.items[0].quantity, 2.0);
    }

    #[test]
    fn test_normalized_payload() {
        let raw = json!({
            "store_name": "교보문고",
            "date": "2024-02-10T10:15:00",
            "total_amount": "32,000",
            "items": [{ "name": "Rust 프로그래밍", "price": 32000 }]
        });
        let r = extract(&raw);
        assert_eq!(r.store_name, "교보문고");
        assert_eq!(r.date.to_string(), "2024-02-10 10:15:00");
        assert_eq!(r.total_amount, 32000.0);
        assert_eq!(r.items[0].quantity, 1.0);
    }

    #[test]
    fn test_unknown_payload_is_empty() {
        let r = extract(&json!({ "unexpected": true }));
        assert!(r.is_empty());
        assert_eq!(r.store_name, UNKNOWN_STORE);
        assert_eq!(r.total_amount, 0.0);
    }
}
